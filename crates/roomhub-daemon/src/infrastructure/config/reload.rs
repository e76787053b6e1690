//! Modification-time polling and hot reload of watched config files.
//!
//! Each watched file gets its own [`Reloader`]. The reloader polls the file's
//! mtime, debounces bursts of writes (editors save in several steps), parses,
//! and applies only when the parsed value actually differs from what is
//! currently live. A file that fails to parse leaves the previous value in
//! place.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ConfigError;

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEBOUNCE: Duration = Duration::from_millis(100);

type ParseFn<T> = Box<dyn Fn(&std::path::Path) -> Result<T, ConfigError> + Send>;
type ApplyFn<T> = Box<dyn Fn(Arc<T>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReloadState {
    Idle,
    /// A change was seen; apply once the mtime stops moving past the
    /// debounce deadline.
    PendingApply { deadline: Instant },
}

/// Watches one config file and pushes parsed updates through an apply
/// callback.
pub struct Reloader<T> {
    path: PathBuf,
    parse: ParseFn<T>,
    apply: ApplyFn<T>,
    last_applied: Arc<T>,
    last_mtime: Option<SystemTime>,
    /// False until the first poll. The first observed mtime is the state the
    /// startup load already read, so it must not trigger a reload.
    primed: bool,
    state: ReloadState,
}

impl<T: PartialEq + Send + Sync + 'static> Reloader<T> {
    pub fn new(path: PathBuf, initial: Arc<T>, parse: ParseFn<T>, apply: ApplyFn<T>) -> Self {
        Self {
            path,
            parse,
            apply,
            last_applied: initial,
            last_mtime: None,
            primed: false,
            state: ReloadState::Idle,
        }
    }

    fn mtime(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .ok()
    }

    /// One poll step. Safe to drive from a test at any cadence.
    pub fn poll_once(&mut self) {
        let mtime = self.mtime();

        if !self.primed {
            self.primed = true;
            self.last_mtime = mtime;
            return;
        }

        if mtime != self.last_mtime {
            self.last_mtime = mtime;
            self.state = ReloadState::PendingApply {
                deadline: Instant::now() + DEBOUNCE,
            };
            debug!(path = %self.path.display(), "config change detected, debouncing");
        }

        if let ReloadState::PendingApply { deadline } = self.state {
            if Instant::now() >= deadline {
                self.state = ReloadState::Idle;
                self.try_apply();
            }
        }
    }

    fn try_apply(&mut self) {
        let parsed = match (self.parse)(&self.path) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %self.path.display(), "reload rejected, keeping previous config: {e}");
                return;
            }
        };
        if parsed == *self.last_applied {
            debug!(path = %self.path.display(), "reload produced identical config, skipping");
            return;
        }
        let parsed = Arc::new(parsed);
        self.last_applied = Arc::clone(&parsed);
        info!(path = %self.path.display(), "config reloaded");
        (self.apply)(parsed);
    }

    /// Polls until the stop signal fires.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once();
                    // A detected change is applied after the short debounce
                    // rather than a full poll interval later.
                    if matches!(self.state, ReloadState::PendingApply { .. }) {
                        tokio::time::sleep(DEBOUNCE).await;
                        self.poll_once();
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
            }
        }
    }
}
