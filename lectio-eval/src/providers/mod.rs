//! Language-model provider abstraction
//!
//! The pipeline talks to an OpenAI-compatible chat-completions endpoint
//! through two narrow traits so tests can substitute scripted
//! implementations without any network.

pub mod openai;

pub use openai::ChatCompletionsClient;

use async_trait::async_trait;

use crate::models::{CategoryTriple, LessonContext};

/// Errors surfaced by provider calls
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider request timed out")]
    Timeout,

    #[error("provider returned unexpected status {0}")]
    UnexpectedStatus(u16),

    #[error("provider reply was malformed: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Request(err.to_string())
        }
    }
}

/// Casts one classification vote for a transcript segment
#[async_trait]
pub trait SegmentClassifier: Send + Sync {
    async fn classify_segment(
        &self,
        text: &str,
        context: &LessonContext,
    ) -> Result<CategoryTriple, ProviderError>;
}

/// Produces a free-form JSON document from a prompt pair
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_json(&self, system: &str, user: &str) -> Result<String, ProviderError>;
}

/// Extract the first JSON object embedded in a model reply
///
/// Tolerates markdown code fences and prose around the object; returns None
/// when no parseable object is present.
pub fn extract_json_object(reply: &str) -> Option<serde_json::Value> {
    let mut body = reply.trim();
    if let Some(stripped) = body.strip_prefix("```json") {
        body = stripped;
    } else if let Some(stripped) = body.strip_prefix("```") {
        body = stripped;
    }
    if let Some(stripped) = body.strip_suffix("```") {
        body = stripped;
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&body[start..=end]).ok()
}
