//! Event types for the Lectio event system
//!
//! Provides shared event definitions and EventBus for Lectio services.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Lectio event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission. Job states travel as strings so this crate stays free of
/// service-side model types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EvalEvent {
    /// Evaluation job accepted and queued for execution
    ///
    /// Triggers:
    /// - SSE: show a new job in progress views
    JobSubmitted {
        /// Evaluation job UUID
        job_id: Uuid,
        /// Number of segments submitted
        segment_count: usize,
        /// When the job was submitted
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Job moved to a new pipeline state
    ///
    /// Triggers:
    /// - SSE: update state badge / progress milestone
    JobStateChanged {
        /// Evaluation job UUID
        job_id: Uuid,
        /// State before the transition
        old_state: String,
        /// State after the transition
        new_state: String,
        /// Progress percentage after the transition (0-100)
        progress_percent: u8,
        /// When the transition happened
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Per-segment progress during the classification phase
    ///
    /// Emitted as segments resolve; lossy delivery is acceptable.
    ///
    /// Triggers:
    /// - SSE: update progress bar between milestones
    ClassificationProgress {
        /// Evaluation job UUID
        job_id: Uuid,
        /// Segments resolved so far
        current: usize,
        /// Total segments in the job
        total: usize,
        /// Progress percentage (0-100, across the whole job)
        percentage: u8,
        /// Elapsed time in seconds
        elapsed_seconds: u64,
        /// Estimated remaining time in seconds (if computable)
        estimated_remaining_seconds: Option<u64>,
        /// When progress was measured
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Job reached a successful terminal state (COMPLETED or PARTIAL)
    ///
    /// Triggers:
    /// - SSE: show completion notification and final results link
    JobCompleted {
        /// Evaluation job UUID
        job_id: Uuid,
        /// Terminal state name ("COMPLETED" or "PARTIAL")
        state: String,
        /// Fraction of segments successfully classified (0.0-1.0)
        classified_fraction: f64,
        /// Job duration in seconds
        duration_seconds: u64,
        /// When the job finished
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Job failed with a fatal error
    ///
    /// Triggers:
    /// - SSE: show error notification
    JobFailed {
        /// Evaluation job UUID
        job_id: Uuid,
        /// Error message details
        error_message: String,
        /// When the job failed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Job cancelled by user request
    ///
    /// Triggers:
    /// - SSE: show cancellation notification
    JobCancelled {
        /// Evaluation job UUID
        job_id: Uuid,
        /// Segments resolved before cancellation
        segments_classified: usize,
        /// When the job was cancelled
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl EvalEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            EvalEvent::JobSubmitted { .. } => "JobSubmitted",
            EvalEvent::JobStateChanged { .. } => "JobStateChanged",
            EvalEvent::ClassificationProgress { .. } => "ClassificationProgress",
            EvalEvent::JobCompleted { .. } => "JobCompleted",
            EvalEvent::JobFailed { .. } => "JobFailed",
            EvalEvent::JobCancelled { .. } => "JobCancelled",
        }
    }

    /// Job the event refers to
    pub fn job_id(&self) -> Uuid {
        match self {
            EvalEvent::JobSubmitted { job_id, .. }
            | EvalEvent::JobStateChanged { job_id, .. }
            | EvalEvent::ClassificationProgress { job_id, .. }
            | EvalEvent::JobCompleted { job_id, .. }
            | EvalEvent::JobFailed { job_id, .. }
            | EvalEvent::JobCancelled { job_id, .. } => *job_id,
        }
    }
}

/// Central event distribution bus for application-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Capacity Recommendations
///
/// - Production: 1000
/// - Testing: 10-100
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EvalEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Returns a receiver that will receive all events emitted after
    /// subscription. Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<EvalEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: EvalEvent,
    ) -> Result<usize, broadcast::error::SendError<EvalEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Used for high-frequency progress events where delivery is best-effort.
    pub fn emit_lossy(&self, event: EvalEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    ///
    /// Useful for debugging and monitoring
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
