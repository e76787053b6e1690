//! Input reader: raw device events → logical-button edges.
//!
//! The raw source is abstracted behind [`RawEventSource`] so the decode and
//! reconnect logic runs unchanged over the Linux evdev implementation and the
//! scripted source used in tests. The reader tolerates device absence and
//! reconnects with jittered exponential backoff until told to stop; no input
//! failure is ever fatal.

use std::io;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use roomhub_core::Edge;

use self::backoff::Backoff;
use self::decode::Decoder;

pub mod backoff;
pub mod decode;
#[cfg(target_os = "linux")]
pub mod evdev_source;
pub mod mock;

/// A raw event as produced by the input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEvent {
    /// Miscellaneous scan identifier (EV_MSC/MSC_SCAN); updates decoder
    /// context only.
    Scan(u32),
    /// Primary key event. Values 1/0 are Down/Up; 2 is hardware auto-repeat.
    Key { code: u16, value: i32 },
    /// Anything else (sync markers, LEDs, ...); ignored.
    Other,
}

/// Trait abstracting raw event production.
///
/// The production implementation reads evdev; tests use
/// [`mock::ScriptedSource`].
#[async_trait]
pub trait RawEventSource: Send {
    /// Returns the next raw event. Any error is treated as a disconnect.
    async fn next_event(&mut self) -> io::Result<RawEvent>;
}

/// Optional hooks fired on connection state transitions, for resetting
/// external affordances (for example a status LED or a published
/// availability flag).
#[derive(Default)]
pub struct ConnectionHooks {
    pub on_connect: Option<Box<dyn Fn() + Send>>,
    pub on_disconnect: Option<Box<dyn Fn() + Send>>,
}

impl ConnectionHooks {
    fn fire_connect(&self) {
        if let Some(hook) = &self.on_connect {
            hook();
        }
    }

    fn fire_disconnect(&self) {
        if let Some(hook) = &self.on_disconnect {
            hook();
        }
    }
}

/// Runs the read/reconnect loop over an injectable source opener.
///
/// `open` is called for every (re)connection attempt; an `Err` and a source
/// whose `next_event` fails are both treated as a disconnect followed by a
/// backoff wait. Decoded edges are handed to `on_button`. Returns when the
/// stop signal fires.
pub async fn run_with<S, O, F>(
    mapping: std::collections::HashMap<String, String>,
    mut open: O,
    mut on_button: F,
    mut stop: watch::Receiver<bool>,
    hooks: ConnectionHooks,
    mut backoff: Backoff,
) where
    S: RawEventSource,
    O: FnMut() -> io::Result<S> + Send,
    F: FnMut(String, Edge) + Send,
{
    // Each down transition is logged exactly once, not once per retry.
    let mut down_logged = false;

    loop {
        if *stop.borrow() {
            break;
        }

        match open() {
            Ok(mut source) => {
                backoff.reset();
                down_logged = false;
                info!("input device connected");
                hooks.fire_connect();

                // Fresh decoder per connection: stale scan context from a
                // previous session must not pair with new key events.
                let mut decoder = Decoder::new(mapping.clone());
                let reason = pump(&mut source, &mut decoder, &mut on_button, &mut stop).await;

                match reason {
                    PumpExit::Stopped => break,
                    PumpExit::SourceError(e) => {
                        down_logged = true;
                        warn!("input device disconnected: {e}");
                        hooks.fire_disconnect();
                    }
                }
            }
            Err(e) => {
                if down_logged {
                    debug!("input device still unavailable: {e}");
                } else {
                    down_logged = true;
                    warn!("input device unavailable: {e}; retrying with backoff");
                    hooks.fire_disconnect();
                }
            }
        }

        let delay = backoff.next_delay();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = stop.changed() => {
                if *stop.borrow() {
                    break;
                }
            }
        }
    }
    info!("input reader stopping");
}

/// Production reader over an evdev device node.
#[cfg(target_os = "linux")]
pub async fn run(
    path: std::path::PathBuf,
    grab: bool,
    mapping: std::collections::HashMap<String, String>,
    on_button: impl FnMut(String, Edge) + Send,
    stop: watch::Receiver<bool>,
    hooks: ConnectionHooks,
) {
    run_with(
        mapping,
        move || evdev_source::EvdevSource::open(&path, grab),
        on_button,
        stop,
        hooks,
        Backoff::default(),
    )
    .await;
}

enum PumpExit {
    Stopped,
    SourceError(io::Error),
}

async fn pump<S, F>(
    source: &mut S,
    decoder: &mut Decoder,
    on_button: &mut F,
    stop: &mut watch::Receiver<bool>,
) -> PumpExit
where
    S: RawEventSource,
    F: FnMut(String, Edge) + Send,
{
    loop {
        tokio::select! {
            event = source.next_event() => {
                match event {
                    Ok(raw) => {
                        if let Some((button, edge)) = decoder.feed(raw) {
                            on_button(button, edge);
                        }
                    }
                    Err(e) => return PumpExit::SourceError(e),
                }
            }
            _ = stop.changed() => {
                if *stop.borrow() {
                    return PumpExit::Stopped;
                }
            }
        }
    }
}
