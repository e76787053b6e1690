//! Linux evdev implementation of [`RawEventSource`].

use std::io;
use std::path::Path;

use async_trait::async_trait;
use evdev::{Device, EventStream, InputEventKind, MiscType};
use tracing::{info, warn};

use super::{RawEvent, RawEventSource};

/// Raw events from a grabbed evdev character device.
pub struct EvdevSource {
    stream: EventStream,
}

impl EvdevSource {
    /// Opens the device node and optionally grabs it for exclusive access.
    ///
    /// A failed grab (typically missing CAP_SYS_ADMIN or a competing reader)
    /// is not fatal: events still flow, they are just also delivered to other
    /// subscribers, so we log and carry on.
    pub fn open(path: &Path, grab: bool) -> io::Result<Self> {
        let mut device = Device::open(path)?;
        let name = device.name().unwrap_or("<unnamed>").to_string();
        if grab {
            match device.grab() {
                Ok(()) => info!(device = %name, "grabbed input device"),
                Err(e) => warn!(device = %name, "grab failed, reading shared: {e}"),
            }
        }
        let stream = device.into_event_stream()?;
        Ok(Self { stream })
    }
}

#[async_trait]
impl RawEventSource for EvdevSource {
    async fn next_event(&mut self) -> io::Result<RawEvent> {
        let ev = self.stream.next_event().await?;
        let raw = match ev.kind() {
            InputEventKind::Misc(MiscType::MSC_SCAN) => RawEvent::Scan(ev.value() as u32),
            InputEventKind::Key(key) => RawEvent::Key {
                code: key.code(),
                value: ev.value(),
            },
            _ => RawEvent::Other,
        };
        Ok(raw)
    }
}
