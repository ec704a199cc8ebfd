//! Data model shared across the evaluation pipeline

pub mod classification;
pub mod feedback;
pub mod job;
pub mod parameters;
pub mod report;
pub mod segment;

pub use classification::{
    classified_count, CategoryTriple, Classification, CognitiveLevel, ContextType, SegmentOutcome,
    Stage, UnclassifiedReason, CELL_COUNT,
};
pub use feedback::{CoachingFeedback, FeedbackProvenance};
pub use job::{EvaluationJob, JobState, JobStateError, StageResults, StateTransition};
pub use parameters::EvaluationParameters;
pub use report::{Metric, MetricCategory, MetricStatus, MetricsReport, PatternMatch};
pub use segment::{validate_submission, LessonContext, Segment};
