//! lectio-eval library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::EvaluationJob;
use crate::providers::{SegmentClassifier, TextGenerator};
use crate::services::patterns::PatternLibrary;
use lectio_common::events::EventBus;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// All evaluation jobs this process has accepted
    pub jobs: Arc<RwLock<HashMap<Uuid, EvaluationJob>>>,
    /// Cancellation tokens for active evaluation jobs
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Provider used for segment classification calls
    pub classifier: Arc<dyn SegmentClassifier>,
    /// Provider used for coaching feedback generation
    pub generator: Arc<dyn TextGenerator>,
    /// Ideal pattern library for distribution matching
    pub patterns: Arc<PatternLibrary>,
    /// Service-wide cap on in-flight provider calls
    pub admission: Arc<Semaphore>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        classifier: Arc<dyn SegmentClassifier>,
        generator: Arc<dyn TextGenerator>,
        patterns: Arc<PatternLibrary>,
        event_bus: EventBus,
        max_concurrent_requests: usize,
    ) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            event_bus,
            classifier,
            generator,
            patterns,
            admission: Arc::new(Semaphore::new(max_concurrent_requests.max(1))),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::evaluation_routes())
        .route("/evaluation/events", get(api::evaluation_event_stream))
        .merge(api::health_routes())
        .with_state(state)
}
