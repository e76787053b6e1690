//! Default output sink implementations.
//!
//! The BLE GATT HID service and the broker client live outside this daemon;
//! these sinks log the traffic that would cross those boundaries so the
//! dispatch path runs end to end on hosts without the peripherals attached.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::application::dispatch::{GestureSink, ServiceSink};
use crate::application::hid_output::HidTransport;

/// HID transport that records reports to the log instead of a BLE link.
///
/// Always reports a subscribed host so keyboard and consumer traffic is
/// visible during bring-up.
pub struct LoggingHidTransport;

impl HidTransport for LoggingHidTransport {
    fn send_keyboard_report(&self, report: &[u8; 8]) -> Result<(), String> {
        debug!(report = ?report, "keyboard report");
        Ok(())
    }

    fn send_consumer_report(&self, report: &[u8; 2]) -> Result<(), String> {
        debug!(report = ?report, "consumer report");
        Ok(())
    }

    fn is_subscribed(&self) -> bool {
        true
    }
}

/// Service sink that logs calls under the room topic prefix.
pub struct LoggingServiceSink {
    room: String,
}

impl LoggingServiceSink {
    pub fn new(room: impl Into<String>) -> Self {
        Self { room: room.into() }
    }
}

#[async_trait]
impl ServiceSink for LoggingServiceSink {
    async fn publish_service_call(
        &self,
        domain: &str,
        service: &str,
        data: &Map<String, Value>,
    ) -> Result<(), String> {
        let data = Value::Object(data.clone());
        info!(
            room = %self.room,
            %domain,
            %service,
            %data,
            "service call"
        );
        Ok(())
    }

    async fn publish_activity_intent(&self, activity: &str) -> Result<(), String> {
        info!(room = %self.room, %activity, "activity intent");
        Ok(())
    }
}

/// Gesture sink that logs instead of driving the media-player client.
pub struct LoggingGestureSink;

#[async_trait]
impl GestureSink for LoggingGestureSink {
    async fn tap(&self, key: &str) -> Result<(), String> {
        info!(%key, "gesture tap");
        Ok(())
    }

    async fn hold(&self, key: &str, duration: Option<Duration>) -> Result<(), String> {
        info!(%key, ?duration, "gesture hold");
        Ok(())
    }

    async fn double_tap(&self, key: &str) -> Result<(), String> {
        info!(%key, "gesture double tap");
        Ok(())
    }
}
