//! OpenAI-compatible chat-completions client
//!
//! Speaks the `/v1/chat/completions` wire format, which covers OpenAI
//! itself as well as Ollama, vLLM and most local inference servers. One
//! client instance serves both pipeline roles: segment classification
//! (low temperature, small replies) and feedback generation (higher
//! temperature, full JSON documents).
//!
//! Rate limiting is enforced client-side with a token bucket shared by
//! every caller holding the same instance; each request waits for a
//! permit before hitting the network.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;

use lectio_common::config::ProviderConfig;

use super::{extract_json_object, ProviderError, SegmentClassifier, TextGenerator};
use crate::models::{CategoryTriple, CognitiveLevel, ContextType, LessonContext, Stage};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}

/// HTTP client for an OpenAI-compatible completion endpoint
pub struct ChatCompletionsClient {
    /// HTTP client with configured timeouts
    client: Client,
    settings: ProviderConfig,
    /// Token bucket enforcing `requests_per_second` across all callers
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl ChatCompletionsClient {
    /// Create a client from resolved provider settings
    ///
    /// # Panics
    /// Panics if the HTTP client cannot be built (should not happen with
    /// valid settings).
    pub fn new(settings: ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("Failed to build HTTP client");

        let per_second = settings.requests_per_second.max(1);
        let rate_limiter = RateLimiter::direct(Quota::per_second(
            NonZeroU32::new(per_second).expect("clamped to at least 1"),
        ));

        Self {
            client,
            settings,
            rate_limiter,
        }
    }

    /// Send one chat-completions exchange and return the reply text
    async fn chat(
        &self,
        model: &str,
        system: &str,
        user: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, ProviderError> {
        // Wait for a rate-limit permit before touching the network
        self.rate_limiter.until_ready().await;

        let url = format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        );
        let body = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature,
            max_tokens,
            stream: false,
        };

        tracing::debug!("Provider request: model={} url={}", model, url);

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = self.settings.api_key.as_deref() {
            if !key.is_empty() {
                request = request.bearer_auth(key);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::UnexpectedStatus(status.as_u16()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(format!("invalid completion body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Malformed("completion had no choices".to_string()))
    }
}

/// Build the classification system prompt for a lesson context
fn classification_system_prompt(context: &LessonContext) -> String {
    format!(
        "You classify one utterance from a classroom lesson transcript.\n\
         The lesson: subject \"{}\", grade \"{}\", language \"{}\".\n\
         Reply with ONLY a JSON object, no prose:\n\
         {{\"stage\": ..., \"context\": ..., \"level\": ...}}\n\
         stage: lesson phase, one of \"intro\", \"development\", \"closing\"\n\
         context: discourse act, one of \"question\", \"explanation\", \"feedback\", \
         \"management\", \"other\"\n\
         level: cognitive demand, one of \"L1\" (recall), \"L2\" (understand), \
         \"L3\" (apply/analyze), \"L4\" (evaluate), \"L5\" (create)",
        context.subject, context.grade, context.language
    )
}

/// Parse a `{"stage", "context", "level"}` object out of a model reply
fn parse_triple(reply: &str) -> Result<CategoryTriple, ProviderError> {
    let value = extract_json_object(reply)
        .ok_or_else(|| ProviderError::Malformed(format!("no JSON object in reply: {}", reply)))?;

    let field = |name: &str| -> Result<String, ProviderError> {
        value
            .get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed(format!("missing \"{}\" field", name)))
    };

    let stage = Stage::from_label(&field("stage")?)
        .ok_or_else(|| ProviderError::Malformed(format!("unknown stage in reply: {}", reply)))?;
    let context = ContextType::from_label(&field("context")?)
        .ok_or_else(|| ProviderError::Malformed(format!("unknown context in reply: {}", reply)))?;
    let level = CognitiveLevel::from_label(&field("level")?)
        .ok_or_else(|| ProviderError::Malformed(format!("unknown level in reply: {}", reply)))?;

    Ok(CategoryTriple::new(stage, context, level))
}

#[async_trait]
impl SegmentClassifier for ChatCompletionsClient {
    async fn classify_segment(
        &self,
        text: &str,
        context: &LessonContext,
    ) -> Result<CategoryTriple, ProviderError> {
        let system = classification_system_prompt(context);
        let reply = self
            .chat(
                &self.settings.classify_model,
                &system,
                text,
                self.settings.classify_temperature,
                128,
            )
            .await?;
        parse_triple(&reply)
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn generate_json(&self, system: &str, user: &str) -> Result<String, ProviderError> {
        self.chat(&self.settings.generate_model, system, user, 0.7, 1024)
            .await
    }
}
