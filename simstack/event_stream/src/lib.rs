#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Run lifecycle events and observer fan-out.
//!
//! Delivery is fire-and-forget: a slow observer never stalls the
//! orchestration. Each observer gets its own bounded queue; when the queue is
//! full the new event is dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Kind of a lifecycle event emitted during one run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Plan produced, carries the full plan.
    Plan,
    /// A variant's dispatch started.
    SimStart,
    /// A variant's dispatch completed, carries the merged result.
    SimComplete,
    /// Critique produced, carries the analysis.
    Analysis,
    /// Run finished, carries the plan id.
    Done,
    /// Unexpected run-time failure after the run was acknowledged.
    Error,
}

impl EventKind {
    /// Wire label for logging.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::SimStart => "sim_start",
            Self::SimComplete => "sim_complete",
            Self::Analysis => "analysis",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

/// Envelope delivered to observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// RFC3339 UTC timestamp.
    #[serde(rename = "ts")]
    pub timestamp: String,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub payload: Value,
}

impl StreamEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn now(kind: EventKind, payload: Value) -> Self {
        Self {
            kind,
            timestamp: chrono::Utc::now().to_rfc3339(),
            payload,
        }
    }
}

/// Event sink interface.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publishes an event. Implementations must not block on observer
    /// progress.
    async fn publish(&self, event: StreamEvent) -> Result<()>;
}

struct ObserverSlot {
    sender: mpsc::Sender<StreamEvent>,
}

/// Receiving end of one observer subscription.
pub struct EventTap {
    id: Uuid,
    receiver: mpsc::Receiver<StreamEvent>,
}

impl EventTap {
    /// Subscription id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Awaits the next event; `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }

    /// Non-blocking poll for the next event.
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.receiver.try_recv().ok()
    }
}

/// Fan-out hub with one bounded queue per observer.
///
/// Drop policy is drop-new: when an observer's queue is full the event being
/// published is discarded for that observer and the dropped counter is
/// incremented. Disconnected observers are evicted on the next publish.
pub struct EventHub {
    capacity: usize,
    observers: Mutex<Vec<ObserverSlot>>,
    dropped: AtomicU64,
}

impl EventHub {
    /// Creates a hub with the given per-observer queue capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            observers: Mutex::new(Vec::new()),
            dropped: AtomicU64::new(0),
        }
    }

    /// Registers a new observer.
    #[must_use]
    pub fn subscribe(&self) -> EventTap {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = Uuid::new_v4();
        self.observers.lock().push(ObserverSlot { sender });
        EventTap { id, receiver }
    }

    /// Total events discarded because an observer queue was full.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of connected observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.lock().len()
    }

    fn fan_out(&self, event: &StreamEvent) {
        let mut observers = self.observers.lock();
        observers.retain(|slot| match slot.sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

#[async_trait]
impl EventSink for EventHub {
    async fn publish(&self, event: StreamEvent) -> Result<()> {
        self.fan_out(&event);
        Ok(())
    }
}

/// File-backed sink appending events as JSON lines (durable event log).
pub struct JsonlEventSink {
    path: std::path::PathBuf,
}

impl JsonlEventSink {
    /// Creates a sink appending to the given path.
    pub fn new(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl EventSink for JsonlEventSink {
    async fn publish(&self, event: StreamEvent) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let data = serde_json::to_vec(&event)?;
        file.write_all(&data).await?;
        file.write_all(b"\n").await?;
        file.flush().await?;
        Ok(())
    }
}

/// In-memory sink retaining every published event (test observer).
#[derive(Default)]
pub struct CollectorSink {
    events: Mutex<Vec<StreamEvent>>,
}

impl CollectorSink {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of events received so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StreamEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventSink for CollectorSink {
    async fn publish(&self, event: StreamEvent) -> Result<()> {
        self.events.lock().push(event);
        Ok(())
    }
}
