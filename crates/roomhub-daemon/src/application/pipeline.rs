//! Bounded event pipeline between the input reader and the dispatcher.
//!
//! The queue decouples the device read loop from dispatch: `push` never
//! blocks the reader. Under sustained overload the oldest *unprocessed*
//! entry is evicted to admit the new one, trading completeness for
//! freshness in that one case only. A single consumer drains the queue in
//! arrival order and bounds each dispatch with a timeout, so one stuck or
//! failing event can never stall the pipeline.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use roomhub_core::Edge;

use super::dispatch::Dispatcher;
use super::ControlMsg;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 128;

/// Upper bound on a single dispatch call.
pub const DISPATCH_TIMEOUT: Duration = Duration::from_millis(300);

/// One logical-button edge in flight.
#[derive(Debug, Clone)]
pub struct ButtonEvent {
    pub button: String,
    pub edge: Edge,
    pub enqueued_at: Instant,
}

/// Bounded FIFO with evict-oldest overflow, single consumer.
pub struct EventPipeline {
    queue: Mutex<VecDeque<ButtonEvent>>,
    notify: Notify,
    capacity: usize,
    evicted: AtomicU64,
}

impl EventPipeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    /// Enqueues an edge, evicting the oldest unprocessed entry if the queue
    /// is full. Never blocks.
    pub fn push(&self, button: String, edge: Edge) {
        let event = ButtonEvent {
            button,
            edge,
            enqueued_at: Instant::now(),
        };
        {
            let mut queue = self.queue.lock().expect("pipeline lock poisoned");
            if queue.len() == self.capacity {
                let dropped = queue.pop_front();
                let total = self.evicted.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(d) = dropped {
                    warn!(
                        "pipeline full; evicted {} {} ({total} evictions so far)",
                        d.button, d.edge
                    );
                }
            }
            queue.push_back(event);
        }
        self.notify.notify_one();
    }

    /// Dequeues the next event, waiting if the queue is empty.
    pub async fn pop(&self) -> ButtonEvent {
        loop {
            let notified = self.notify.notified();
            if let Some(event) = self.queue.lock().expect("pipeline lock poisoned").pop_front()
            {
                return event;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().expect("pipeline lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of events evicted by overflow.
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    fn drain(&self) -> Vec<ButtonEvent> {
        self.queue
            .lock()
            .expect("pipeline lock poisoned")
            .drain(..)
            .collect()
    }
}

/// Drains the pipeline and the control lane into the dispatcher until the
/// stop signal fires.
///
/// This task is the sole mutator of dispatcher state. Dispatch errors and
/// timeouts are logged and the loop moves on; nothing here stops on a bad
/// event.
pub async fn run_consumer(
    pipeline: std::sync::Arc<EventPipeline>,
    mut control_rx: mpsc::UnboundedReceiver<ControlMsg>,
    mut dispatcher: Dispatcher,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = pipeline.pop() => {
                let queued_for = event.enqueued_at.elapsed();
                if queued_for > DISPATCH_TIMEOUT {
                    debug!("{} {} sat queued for {queued_for:?}", event.button, event.edge);
                }
                match tokio::time::timeout(
                    DISPATCH_TIMEOUT,
                    dispatcher.handle(&event.button, event.edge),
                )
                .await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("dispatch of {} {} failed: {e}", event.button, event.edge),
                    Err(_) => warn!(
                        "dispatch of {} {} exceeded {DISPATCH_TIMEOUT:?}; moving on",
                        event.button, event.edge
                    ),
                }
            }
            msg = control_rx.recv() => {
                match msg {
                    Some(msg) => dispatcher.apply_control(msg).await,
                    // Unreachable while the dispatcher holds its own sender
                    // for hold timers; treated as a shutdown if it happens.
                    None => {
                        debug!("control lane closed");
                        break;
                    }
                }
            }
            _ = stop.changed() => {
                if *stop.borrow() {
                    break;
                }
            }
        }
    }
    info!("pipeline consumer stopping");
    dispatcher.shutdown().await;
}
