//! Scripted in-memory event source for reader tests.

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;

use super::{RawEvent, RawEventSource};

/// Replays a fixed script of raw events, then fails as if the device
/// disconnected.
pub struct ScriptedSource {
    events: VecDeque<RawEvent>,
}

impl ScriptedSource {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self {
            events: events.into(),
        }
    }
}

#[async_trait]
impl RawEventSource for ScriptedSource {
    async fn next_event(&mut self) -> io::Result<RawEvent> {
        match self.events.pop_front() {
            Some(ev) => Ok(ev),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "scripted source exhausted",
            )),
        }
    }
}
