//! # Lectio Common Library
//!
//! Shared code for Lectio evaluation services including:
//! - Event types (EvalEvent enum) and the EventBus
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
