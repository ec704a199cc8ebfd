//! Metric and pattern-match result types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Position of a raw value relative to its optimal range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Low,
    Optimal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricCategory {
    TimeDistribution,
    ContextDistribution,
    CognitiveComplexity,
    InteractionQuality,
    Composite,
}

/// One evaluated metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub category: MetricCategory,
    pub raw_value: f64,
    /// 0..=100, 100 inside the optimal range, linear falloff to the bounds
    pub normalized_score: f64,
    pub status: MetricStatus,
}

/// Full metric report for one lesson
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub metrics: Vec<Metric>,
    /// Composite overall score, mean of the individual normalized scores
    pub overall: Metric,
    pub classified_count: usize,
    pub total_count: usize,
    /// Set when the classified fraction fell below the job threshold
    pub incomplete: bool,
}

impl MetricsReport {
    pub fn get(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }
}

/// Cosine-similarity comparison against the ideal pattern library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatch {
    pub best_pattern_id: String,
    pub best_pattern_name: String,
    pub best_similarity: f64,
    /// Similarity per pattern id, deterministic ordering
    pub all_similarities: BTreeMap<String, f64>,
    /// Classified segment count fell below `min_pattern_segments`
    pub low_confidence: bool,
    pub classified_count: usize,
}
