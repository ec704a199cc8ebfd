//! Coaching feedback document
//!
//! The feedback body is produced by a text-generation model and accepted only
//! after schema validation; when generation fails the service substitutes a
//! deterministic metrics-derived fallback. `provenance` records which path
//! produced the document and is added by the service, never by the model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a feedback document came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackProvenance {
    /// Model output that passed schema validation
    Generated,
    /// Deterministic metrics-derived substitute
    Fallback,
}

/// Structured coaching feedback for one evaluated lesson
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoachingFeedback {
    pub overall_assessment: String,
    pub strengths: Vec<String>,
    pub growth_areas: Vec<String>,
    pub priority_actions: Vec<String>,
    #[serde(default)]
    pub pedagogical_recommendations: BTreeMap<String, String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub next_session_goals: Vec<String>,
    pub provenance: FeedbackProvenance,
}

/// Content fields only, mirroring what the model is allowed to emit
#[derive(Debug, Deserialize)]
struct FeedbackDraft {
    overall_assessment: String,
    strengths: Vec<String>,
    growth_areas: Vec<String>,
    priority_actions: Vec<String>,
    pedagogical_recommendations: BTreeMap<String, String>,
    #[serde(default)]
    resources: Vec<String>,
    #[serde(default)]
    next_session_goals: Vec<String>,
}

impl CoachingFeedback {
    /// Build from a JSON value that already passed schema validation
    pub fn from_validated(
        value: &serde_json::Value,
        provenance: FeedbackProvenance,
    ) -> Result<Self, serde_json::Error> {
        let draft: FeedbackDraft = serde_json::from_value(value.clone())?;
        Ok(Self {
            overall_assessment: draft.overall_assessment,
            strengths: draft.strengths,
            growth_areas: draft.growth_areas,
            priority_actions: draft.priority_actions,
            pedagogical_recommendations: draft.pedagogical_recommendations,
            resources: draft.resources,
            next_session_goals: draft.next_session_goals,
            provenance,
        })
    }
}
