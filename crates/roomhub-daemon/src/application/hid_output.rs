//! Output state machine: logical key/control intents → hardware reports.
//!
//! Two independent sub-machines share one transport:
//!
//! - **Keyboard** (page 0x07): up to six currently-down usage codes plus a
//!   modifier mask. Edges only; the host's typematic handles repeats.
//! - **Consumer** (page 0x0C): a single active usage. A "down" is re-sent on
//!   a steady cadence until the explicit "up", so a host-side idle/debounce
//!   timeout cannot misread a held control as released.
//!
//! Both sides de-duplicate: a rebuilt report identical to the last one sent
//! on that channel is dropped. All transport calls are best-effort; the hot
//! path never raises.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use roomhub_core::report::{consumer_report, keyboard_report, KeySlots, KEYBOARD_REPORT_LEN};

/// Cadence of the consumer steady-repeat. 120–150 ms works well on links
/// with a 15 ms connection interval and latency 4.
pub const CONSUMER_REPEAT_MS: u64 = 150;

/// Floor for the steady-repeat cadence.
const MIN_REPEAT_MS: u64 = 60;

/// Hold duration of the `*_tap` conveniences.
pub const TAP_HOLD_MS: u64 = 40;

/// Contract the BLE peripheral stack implements.
///
/// `is_subscribed` is an explicit capability: the stack reports whether the
/// host has subscribed to report notifications, and the state machine skips
/// transport calls until it has.
pub trait HidTransport: Send + Sync {
    fn send_keyboard_report(&self, report: &[u8; KEYBOARD_REPORT_LEN]) -> Result<(), String>;
    fn send_consumer_report(&self, payload: &[u8; 2]) -> Result<(), String>;
    fn is_subscribed(&self) -> bool;
}

/// The stateful report generator in front of a [`HidTransport`].
pub struct HidOutput {
    transport: Arc<dyn HidTransport>,
    keys: KeySlots,
    modifiers: u8,
    last_keyboard: Option<[u8; KEYBOARD_REPORT_LEN]>,
    consumer_usage: u16,
    last_consumer: Option<[u8; 2]>,
    repeat_task: Option<JoinHandle<()>>,
    repeat_every: Duration,
}

impl HidOutput {
    pub fn new(transport: Arc<dyn HidTransport>) -> Self {
        Self::with_repeat_cadence(transport, Duration::from_millis(CONSUMER_REPEAT_MS))
    }

    pub fn with_repeat_cadence(transport: Arc<dyn HidTransport>, every: Duration) -> Self {
        Self {
            transport,
            keys: KeySlots::new(),
            modifiers: 0,
            last_keyboard: None,
            consumer_usage: 0,
            last_consumer: None,
            repeat_task: None,
            repeat_every: every.max(Duration::from_millis(MIN_REPEAT_MS)),
        }
    }

    // ── Keyboard (edge-only; host handles typematic) ──────────────────────────

    pub fn key_down(&mut self, code: u8, modifiers: u8) {
        self.keys.press(code);
        self.modifiers = modifiers;
        self.send_keyboard();
    }

    /// Releases a specific code, or everything when `code` is `None`.
    pub fn key_up(&mut self, code: Option<u8>) {
        match code {
            Some(c) => self.keys.release(c),
            None => {
                if self.keys.is_empty() {
                    return;
                }
                self.keys.clear();
            }
        }
        self.send_keyboard();
    }

    pub async fn keyboard_tap(&mut self, code: u8, modifiers: u8) {
        self.key_down(code, modifiers);
        tokio::time::sleep(Duration::from_millis(TAP_HOLD_MS)).await;
        self.key_up(Some(code));
    }

    // ── Consumer (steady reassert while held) ─────────────────────────────────

    /// Sends the consumer "down" and starts the steady repeat. A second
    /// `consumer_down` supersedes the first: its repeat task is cancelled and
    /// joined before the new one starts.
    pub async fn consumer_down(&mut self, usage: u16) {
        self.stop_repeat().await;
        self.consumer_usage = usage;
        self.send_consumer();
        self.start_repeat();
    }

    /// Stops the repeat and sends the neutral payload.
    pub async fn consumer_up(&mut self) {
        self.stop_repeat().await;
        self.consumer_usage = 0;
        self.send_consumer();
    }

    /// Down, a fixed hold, then up.
    pub async fn consumer_tap(&mut self, usage: u16, hold: Duration) {
        self.consumer_down(usage).await;
        tokio::time::sleep(hold).await;
        self.consumer_up().await;
    }

    /// Cancels the repeat task and releases anything still held, so nothing
    /// stays latched on the host across a restart.
    pub async fn close(&mut self) {
        self.stop_repeat().await;
        if !self.keys.is_empty() || self.modifiers != 0 {
            self.keys.clear();
            self.modifiers = 0;
            self.send_keyboard();
        }
        if self.consumer_usage != 0 {
            self.consumer_usage = 0;
            self.send_consumer();
        }
        self.last_keyboard = None;
        self.last_consumer = None;
    }

    // ── Builders and senders ──────────────────────────────────────────────────

    fn send_keyboard(&mut self) {
        let report = keyboard_report(self.modifiers, &self.keys);
        if Some(report) == self.last_keyboard {
            return;
        }
        self.last_keyboard = Some(report);
        if !self.transport.is_subscribed() {
            trace!("keyboard report withheld: host not subscribed");
            return;
        }
        if let Err(e) = self.transport.send_keyboard_report(&report) {
            debug!("keyboard report send failed: {e}");
        }
    }

    fn send_consumer(&mut self) {
        let payload = consumer_report(self.consumer_usage);
        if Some(payload) == self.last_consumer {
            return;
        }
        self.last_consumer = Some(payload);
        if !self.transport.is_subscribed() {
            trace!("consumer report withheld: host not subscribed");
            return;
        }
        if let Err(e) = self.transport.send_consumer_report(&payload) {
            debug!("consumer report send failed: {e}");
        }
    }

    fn start_repeat(&mut self) {
        let transport = Arc::clone(&self.transport);
        let payload = consumer_report(self.consumer_usage);
        let every = self.repeat_every;
        // First tick is delayed so the initial DOWN is not duplicated. Each
        // tick re-sends the identical payload, bypassing de-duplication.
        self.repeat_task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                if !transport.is_subscribed() {
                    continue;
                }
                if let Err(e) = transport.send_consumer_report(&payload) {
                    debug!("consumer reassert failed: {e}");
                }
            }
        }));
    }

    async fn stop_repeat(&mut self) {
        if let Some(task) = self.repeat_task.take() {
            task.abort();
            // Join so no cancelled tick can still fire afterwards.
            let _ = task.await;
        }
    }
}
