//! HTTP API handlers for lectio-eval
//!
//! REST endpoints for the evaluation workflow plus an SSE stream for
//! progress events.

pub mod health;
pub mod jobs;
pub mod sse;

pub use health::health_routes;
pub use jobs::evaluation_routes;
pub use sse::evaluation_event_stream;
