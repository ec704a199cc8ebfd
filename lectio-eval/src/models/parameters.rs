//! Per-job evaluation parameters
//!
//! Every field has a serde default so callers can submit a partial (or
//! absent) `parameters` object and get sensible behavior.

use serde::{Deserialize, Serialize};

fn default_vote_count() -> usize {
    3
}

fn default_vote_retries() -> u32 {
    2
}

fn default_classified_threshold() -> f64 {
    0.7
}

fn default_max_concurrent_calls() -> usize {
    4
}

fn default_min_pattern_segments() -> usize {
    5
}

fn default_call_timeout_secs() -> u64 {
    30
}

/// Tunable knobs for a single evaluation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationParameters {
    /// Independent classification votes cast per segment
    #[serde(default = "default_vote_count")]
    pub vote_count: usize,
    /// Retries per vote call after the initial attempt
    #[serde(default = "default_vote_retries")]
    pub vote_retries: u32,
    /// Minimum classified fraction for the job to proceed past classification
    #[serde(default = "default_classified_threshold")]
    pub classified_threshold: f64,
    /// Concurrent provider calls allowed within this job
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    /// Classified segments below this count flag the pattern match low-confidence
    #[serde(default = "default_min_pattern_segments")]
    pub min_pattern_segments: usize,
    /// Timeout for a single provider call, seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Overall cap on the classification phase, seconds (None = unbounded)
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,
}

impl EvaluationParameters {
    /// Votes needed for a strict majority: floor(vote_count / 2) + 1
    pub fn majority_threshold(&self) -> usize {
        self.vote_count / 2 + 1
    }
}

impl Default for EvaluationParameters {
    fn default() -> Self {
        Self {
            vote_count: default_vote_count(),
            vote_retries: default_vote_retries(),
            classified_threshold: default_classified_threshold(),
            max_concurrent_calls: default_max_concurrent_calls(),
            min_pattern_segments: default_min_pattern_segments(),
            call_timeout_secs: default_call_timeout_secs(),
            job_timeout_secs: None,
        }
    }
}
