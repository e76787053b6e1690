//! Out-of-band text commands, independent of the button-edge path.
//!
//! The broker bridge delivers `"category:action"` strings (for example
//! `atv:off` from an automation); the router spawns the matching macro so a
//! multi-second sequence never blocks dispatch. Macros drive the same HID
//! output state machine as the dispatcher, shared behind an async mutex.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use super::hid_output::HidOutput;
use super::ControlMsg;

// Consumer usages (page 0x0C) used by the media-player power sequences.
const U_STOP: u16 = 0x00B7;
const U_MENU: u16 = 0x0040;
const U_AC_HOME: u16 = 0x0223;
const U_POWER: u16 = 0x0030;

/// Delay between the taps of a macro sequence.
const INTER_KEY_DELAY: Duration = Duration::from_millis(400);

/// Tap hold duration within macro sequences.
const MACRO_TAP_HOLD: Duration = Duration::from_millis(40);

/// Routes text commands to their macro collaborators.
pub struct CommandRouter {
    hid: Arc<Mutex<HidOutput>>,
    /// systemd unit restarted by `sys:restart`.
    service_unit: String,
    /// Lane into the dispatcher for `activity:<name>` echoes.
    control_tx: mpsc::UnboundedSender<ControlMsg>,
}

impl CommandRouter {
    pub fn new(
        hid: Arc<Mutex<HidOutput>>,
        service_unit: impl Into<String>,
        control_tx: mpsc::UnboundedSender<ControlMsg>,
    ) -> Self {
        Self {
            hid,
            service_unit: service_unit.into(),
            control_tx,
        }
    }

    /// Parses and routes one `"category:action"` command.
    ///
    /// Unknown commands are logged and ignored; this path is driven by
    /// external input and must never fail the caller.
    pub fn handle_text_command(&self, text: &str) {
        let Some((category, action)) = text.trim().split_once(':') else {
            warn!("malformed command {text:?} (expected category:action)");
            return;
        };

        match (category, action) {
            ("atv", "on") => {
                info!("queued media-player power-on");
                let hid = Arc::clone(&self.hid);
                tokio::spawn(media_power_on(hid));
            }
            ("atv", "off") => {
                info!("queued media-player power-off");
                let hid = Arc::clone(&self.hid);
                tokio::spawn(media_power_off(hid, INTER_KEY_DELAY));
            }
            ("activity", name) if !name.trim().is_empty() => {
                // The activity authority's echo; the dispatcher applies it
                // on its own task.
                let _ = self
                    .control_tx
                    .send(ControlMsg::SetActivity(name.trim().to_string()));
            }
            ("sys", "restart") => {
                info!("queued service restart");
                let unit = self.service_unit.clone();
                tokio::spawn(restart_unit(unit));
            }
            _ => warn!("unknown command {category}:{action}"),
        }
    }
}

/// Power-on sequence: power tap, settle, menu tap to land in the UI.
pub async fn media_power_on(hid: Arc<Mutex<HidOutput>>) {
    hid.lock().await.consumer_tap(U_POWER, MACRO_TAP_HOLD).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    hid.lock().await.consumer_tap(U_MENU, MACRO_TAP_HOLD).await;
}

/// Power-off sequence: stop, home twice, menu twice, then a long power hold.
pub async fn media_power_off(hid: Arc<Mutex<HidOutput>>, inter_key: Duration) {
    for usage in [U_STOP, U_AC_HOME, U_AC_HOME, U_MENU, U_MENU] {
        hid.lock().await.consumer_tap(usage, MACRO_TAP_HOLD).await;
        tokio::time::sleep(inter_key).await;
    }
    hid.lock()
        .await
        .consumer_tap(U_POWER, Duration::from_secs(2))
        .await;
}

async fn restart_unit(unit: String) {
    match tokio::process::Command::new("systemctl")
        .args(["restart", &unit])
        .status()
        .await
    {
        Ok(status) if status.success() => info!("restarted {unit}"),
        Ok(status) => warn!("systemctl restart {unit} exited with {status}"),
        Err(e) => warn!("failed to run systemctl restart {unit}: {e}"),
    }
}
