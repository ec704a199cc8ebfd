//! Evaluation job lifecycle
//!
//! State machine:
//!
//! ```text
//! PENDING ──> CLASSIFYING ──> METRICS ──> PATTERN_MATCHING ──> COACHING ──> COMPLETED
//!    │             │ │
//!    │             │ └────────> PARTIAL        (classified fraction below threshold)
//!    │             └──────────> CANCELLED      (also reachable from PENDING)
//!    └──────────────────────────> FAILED       (reachable from every non-terminal state)
//! ```
//!
//! COMPLETED, PARTIAL, FAILED and CANCELLED are terminal. Progress percent
//! moves monotonically and jumps to a fixed milestone when a stage is entered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::classification::SegmentOutcome;
use super::feedback::CoachingFeedback;
use super::parameters::EvaluationParameters;
use super::report::{MetricsReport, PatternMatch};
use super::segment::LessonContext;

/// Lifecycle state of an evaluation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Classifying,
    Metrics,
    PatternMatching,
    Coaching,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 9] = [
        JobState::Pending,
        JobState::Classifying,
        JobState::Metrics,
        JobState::PatternMatching,
        JobState::Coaching,
        JobState::Completed,
        JobState::Partial,
        JobState::Failed,
        JobState::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Classifying => "CLASSIFYING",
            JobState::Metrics => "METRICS",
            JobState::PatternMatching => "PATTERN_MATCHING",
            JobState::Coaching => "COACHING",
            JobState::Completed => "COMPLETED",
            JobState::Partial => "PARTIAL",
            JobState::Failed => "FAILED",
            JobState::Cancelled => "CANCELLED",
        }
    }

    /// No further transitions leave a terminal state
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Partial | JobState::Failed | JobState::Cancelled
        )
    }

    /// Legal transition check
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Pending, Classifying) => true,
            (Classifying, Metrics) => true,
            (Classifying, Partial) => true,
            (Metrics, PatternMatching) => true,
            (PatternMatching, Coaching) => true,
            (Coaching, Completed) => true,
            // Failure is reachable from every non-terminal state
            (from, Failed) => !from.is_terminal(),
            // Cancellation only interrupts the pre-metrics phases
            (Pending, Cancelled) | (Classifying, Cancelled) => true,
            _ => false,
        }
    }

    /// Progress milestone applied when this state is entered
    pub fn entry_progress(self) -> Option<u8> {
        match self {
            JobState::Classifying => Some(10),
            JobState::Metrics => Some(60),
            JobState::PatternMatching => Some(75),
            JobState::Coaching => Some(90),
            JobState::Completed | JobState::Partial => Some(100),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Record of one state change, for events and logs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub job_id: Uuid,
    pub old_state: JobState,
    pub new_state: JobState,
    pub transitioned_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum JobStateError {
    #[error("illegal job state transition: {from} -> {to}")]
    IllegalTransition { from: JobState, to: JobState },
}

/// Outputs accumulated as the pipeline stages complete
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classifications: Option<Vec<SegmentOutcome>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_match: Option<PatternMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coaching: Option<CoachingFeedback>,
}

/// One submitted lesson evaluation, tracked from submission to completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationJob {
    pub job_id: Uuid,
    pub state: JobState,
    pub progress_percent: u8,
    pub context: LessonContext,
    pub parameters: EvaluationParameters,
    pub segment_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub stage_results: StageResults,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationJob {
    pub fn new(context: LessonContext, parameters: EvaluationParameters, segment_count: usize) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            state: JobState::Pending,
            progress_percent: 0,
            context,
            parameters,
            segment_count,
            created_at: Utc::now(),
            ended_at: None,
            stage_results: StageResults::default(),
            error: None,
        }
    }

    /// Move to `next`, enforcing the transition matrix
    ///
    /// Entering a terminal state stamps `ended_at`; entering a state with a
    /// progress milestone raises `progress_percent` to it.
    pub fn transition_to(&mut self, next: JobState) -> Result<StateTransition, JobStateError> {
        if !self.state.can_transition_to(next) {
            return Err(JobStateError::IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        let old_state = self.state;
        self.state = next;
        if let Some(milestone) = next.entry_progress() {
            self.set_progress(milestone);
        }
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        Ok(StateTransition {
            job_id: self.job_id,
            old_state,
            new_state: next,
            transitioned_at: self.ended_at.unwrap_or_else(Utc::now),
        })
    }

    /// Monotonic progress update: never moves backward
    pub fn set_progress(&mut self, percent: u8) {
        self.progress_percent = self.progress_percent.max(percent.min(100));
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Seconds since submission
    pub fn age_seconds(&self) -> u64 {
        (Utc::now() - self.created_at).num_seconds().max(0) as u64
    }
}
