//! Configuration resolution for lectio-eval
//!
//! Provides two-tier provider configuration resolution with ENV → TOML
//! priority. The TOML file supplies defaults; environment variables
//! override individual settings at startup.

use lectio_common::config::{ProviderConfig, ServiceConfig};
use tracing::{info, warn};

pub const ENV_BASE_URL: &str = "LECTIO_PROVIDER_BASE_URL";
pub const ENV_API_KEY: &str = "LECTIO_PROVIDER_API_KEY";
pub const ENV_CLASSIFY_MODEL: &str = "LECTIO_CLASSIFY_MODEL";
pub const ENV_GENERATE_MODEL: &str = "LECTIO_GENERATE_MODEL";

/// Resolve effective provider settings from 2-tier configuration
///
/// **Priority:** ENV → TOML
pub fn resolve_provider(config: &ServiceConfig) -> ProviderConfig {
    let mut provider = config.provider.clone();

    if let Some(value) = env_value(ENV_BASE_URL) {
        info!(base_url = %value, "Provider base URL loaded from environment variable");
        provider.base_url = value;
    }

    let toml_key_set = provider
        .api_key
        .as_deref()
        .map(is_valid_value)
        .unwrap_or(false);
    let env_key = env_value(ENV_API_KEY);

    // Warn if multiple sources (potential misconfiguration)
    if env_key.is_some() && toml_key_set {
        warn!(
            "Provider API key found in multiple sources: environment, TOML. \
             Using environment (highest priority)."
        );
    }

    if let Some(value) = env_key {
        info!("Provider API key loaded from environment variable");
        provider.api_key = Some(value);
    } else if toml_key_set {
        info!("Provider API key loaded from TOML config");
    }

    if let Some(value) = env_value(ENV_CLASSIFY_MODEL) {
        info!(model = %value, "Classification model loaded from environment variable");
        provider.classify_model = value;
    }

    if let Some(value) = env_value(ENV_GENERATE_MODEL) {
        info!(model = %value, "Generation model loaded from environment variable");
        provider.generate_model = value;
    }

    provider
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| is_valid_value(v))
}

/// Validate a setting value (non-empty, non-whitespace)
pub fn is_valid_value(value: &str) -> bool {
    !value.trim().is_empty()
}
