//! Event types for the FIQ event system
//!
//! The queue publishes every job lifecycle change on an [`EventBus`].
//! Renderers subscribe and rebuild their view from the stream, or poll the
//! queue snapshot directly.

mod job_types;

pub use job_types::{FailureKind, JobStatus};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Queue event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QueueEvent {
    /// A job was created in `pending`
    JobEnqueued {
        job_id: Uuid,
        display_name: String,
        source_path: String,
        size_bytes: u64,
        timestamp: DateTime<Utc>,
    },

    /// A job moved between lifecycle states
    JobStatusChanged {
        job_id: Uuid,
        old_status: JobStatus,
        new_status: JobStatus,
        /// Set when `new_status` is `error`
        error_message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Progress of an active job advanced
    JobProgress {
        job_id: Uuid,
        /// Percentage (0.0 - 100.0)
        progress: f64,
        timestamp: DateTime<Utc>,
    },

    /// A terminal job was retried as a new attempt
    JobRetried {
        original_job_id: Uuid,
        new_job_id: Uuid,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },

    /// Terminal jobs were removed from the queue
    QueueCleared {
        removed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// Job the event concerns, if it concerns a single job
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            Self::JobEnqueued { job_id, .. }
            | Self::JobStatusChanged { job_id, .. }
            | Self::JobProgress { job_id, .. } => Some(*job_id),
            Self::JobRetried { new_job_id, .. } => Some(*new_job_id),
            Self::QueueCleared { .. } => None,
        }
    }
}

/// Broadcast channel for queue events
///
/// Cloning an `EventBus` yields another handle to the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before slow subscribers
    ///   start losing the oldest ones
    ///
    /// # Examples
    ///
    /// ```
    /// use fiq_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: QueueEvent,
    ) -> Result<usize, broadcast::error::SendError<QueueEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// # Examples
    ///
    /// ```
    /// use fiq_common::events::{EventBus, QueueEvent};
    ///
    /// let event_bus = EventBus::new(16);
    ///
    /// // OK if no one is listening
    /// event_bus.emit_lossy(QueueEvent::QueueCleared {
    ///     removed: 0,
    ///     timestamp: chrono::Utc::now(),
    /// });
    /// ```
    pub fn emit_lossy(&self, event: QueueEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
