//! lectio-eval - Classroom Discourse Evaluation Microservice
//!
//! **Module Identity:**
//! - Name: lectio-eval (Discourse Evaluation)
//! - Port: 5830 (default)
//!
//! Accepts transcribed lesson segments, classifies each into the
//! stage/context/cognitive-level taxonomy via an LLM provider, derives
//! deterministic discourse metrics, matches the observed distribution
//! against ideal patterns, and generates coaching feedback.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use lectio_common::config::load_config;
use lectio_common::events::EventBus;
use lectio_eval::providers::openai::ChatCompletionsClient;
use lectio_eval::providers::{SegmentClassifier, TextGenerator};
use lectio_eval::services::patterns::PatternLibrary;
use lectio_eval::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config(None)?;

    // Initialize tracing; RUST_LOG overrides the configured level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!(
                    "lectio_eval={0},lectio_common={0}",
                    config.logging.level
                ))
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting lectio-eval (Discourse Evaluation) microservice");
    info!("Port: {}", config.server.port);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve provider settings (ENV overrides TOML)
    let provider = lectio_eval::config::resolve_provider(&config);
    info!(
        base_url = %provider.base_url,
        classify_model = %provider.classify_model,
        generate_model = %provider.generate_model,
        "Provider configured"
    );

    // Pattern library: TOML file when configured, built-in defaults otherwise
    let patterns = match &config.patterns.file {
        Some(path) => {
            let library = PatternLibrary::from_toml_file(Path::new(path))?;
            info!(path = %path, count = library.len(), "Loaded ideal patterns from file");
            library
        }
        None => {
            let library = PatternLibrary::builtin();
            info!(count = library.len(), "Using built-in ideal patterns");
            library
        }
    };

    // One HTTP client serves both provider roles
    let client = Arc::new(ChatCompletionsClient::new(provider.clone()));
    let classifier: Arc<dyn SegmentClassifier> = client.clone();
    let generator: Arc<dyn TextGenerator> = client;

    // Create event bus for SSE broadcasting
    let event_bus = EventBus::new(1000);
    info!("Event bus initialized");

    let state = AppState::new(
        classifier,
        generator,
        Arc::new(patterns),
        event_bus,
        provider.max_concurrent_requests,
    );

    let app = lectio_eval::build_router(state);

    let addr = format!("127.0.0.1:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
