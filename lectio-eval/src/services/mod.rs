//! Pipeline stage services
//!
//! `classifier`, `metrics`, `patterns` and `coaching` implement the four
//! pipeline stages; `orchestrator` sequences them; `voting` and `schema`
//! are the pure primitives underneath.

pub mod classifier;
pub mod coaching;
pub mod metrics;
pub mod orchestrator;
pub mod patterns;
pub mod schema;
pub mod voting;
