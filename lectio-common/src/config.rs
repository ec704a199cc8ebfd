//! Configuration loading and config file resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Service configuration loaded from a TOML file
///
/// All sections are optional; missing sections fall back to defaults so a
/// service can start with no config file at all (environment variables can
/// still override individual values, see the service-side resolution).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub patterns: PatternsConfig,
}

/// `[provider]` section: external language-model endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible chat completions endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key; empty/absent means unauthenticated (local inference server)
    pub api_key: Option<String>,
    /// Model used for segment classification calls
    #[serde(default = "default_classify_model")]
    pub classify_model: String,
    /// Model used for coaching generation calls
    #[serde(default = "default_generate_model")]
    pub generate_model: String,
    /// Sampling temperature for classification (kept low for stable votes)
    #[serde(default = "default_classify_temperature")]
    pub classify_temperature: f64,
    /// Maximum provider requests per second
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    /// Admission gate size: provider calls in flight at once, across all jobs
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

/// `[server]` section
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

/// `[logging]` section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log filter directive (e.g. "info", "lectio_eval=debug")
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// `[patterns]` section: ideal-pattern library override
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PatternsConfig {
    /// Path to a TOML file replacing the builtin pattern library.
    /// Absent means the compiled-in library is used.
    pub file: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_classify_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_generate_model() -> String {
    "qwen2.5:14b".to_string()
}

fn default_classify_temperature() -> f64 {
    0.1
}

fn default_requests_per_second() -> u32 {
    8
}

fn default_max_concurrent_requests() -> usize {
    4
}

fn default_port() -> u16 {
    5830
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            classify_model: default_classify_model(),
            generate_model: default_generate_model(),
            classify_temperature: default_classify_temperature(),
            requests_per_second: default_requests_per_second(),
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Resolve the config file path following priority order:
/// 1. Explicit path argument (highest priority)
/// 2. LECTIO_CONFIG environment variable
/// 3. Platform config directory (~/.config/lectio/config.toml)
/// 4. System-wide /etc/lectio/config.toml (Linux only)
///
/// Returns `None` if no config file exists at any location; callers then run
/// on compiled defaults.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(path) = std::env::var("LECTIO_CONFIG") {
        return Some(PathBuf::from(path));
    }

    if let Some(user_config) = dirs::config_dir().map(|d| d.join("lectio").join("config.toml")) {
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/lectio/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Load service configuration
///
/// Missing file (when no explicit path was given) yields pure defaults.
/// An explicit or environment-specified path that cannot be read or parsed
/// is a hard error; silently ignoring a named config file hides typos.
pub fn load_config(explicit: Option<&str>) -> Result<ServiceConfig> {
    let Some(path) = resolve_config_path(explicit) else {
        tracing::info!("No config file found, using defaults");
        return Ok(ServiceConfig::default());
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
    let config: ServiceConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

    tracing::info!(path = %path.display(), "Loaded configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.port, 5830);
        assert_eq!(config.logging.level, "info");
        assert!(config.provider.api_key.is_none());
        assert_eq!(config.provider.requests_per_second, 8);
        assert_eq!(config.provider.max_concurrent_requests, 4);
        assert!(config.patterns.file.is_none());
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[provider]
base_url = "https://api.example.com/v1"
api_key = "sk-test"
classify_temperature = 0.0

[server]
port = 9000
"#
        )
        .unwrap();

        let config = load_config(Some(file.path().to_str().unwrap())).unwrap();
        assert_eq!(config.provider.base_url, "https://api.example.com/v1");
        assert_eq!(config.provider.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.provider.classify_temperature, 0.0);
        assert_eq!(config.server.port, 9000);
        // Unspecified values keep their defaults
        assert_eq!(config.provider.classify_model, "qwen2.5:7b");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_explicit_missing_file_is_error() {
        let result = load_config(Some("/nonexistent/lectio-config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not [valid toml").unwrap();
        let result = load_config(Some(file.path().to_str().unwrap()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    #[serial]
    fn test_env_var_path_resolution() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 7777").unwrap();

        std::env::set_var("LECTIO_CONFIG", file.path());
        let resolved = resolve_config_path(None);
        std::env::remove_var("LECTIO_CONFIG");

        assert_eq!(resolved, Some(file.path().to_path_buf()));
    }

    #[test]
    #[serial]
    fn test_explicit_path_beats_env_var() {
        std::env::set_var("LECTIO_CONFIG", "/tmp/from-env.toml");
        let resolved = resolve_config_path(Some("/tmp/explicit.toml"));
        std::env::remove_var("LECTIO_CONFIG");

        assert_eq!(resolved, Some(PathBuf::from("/tmp/explicit.toml")));
    }
}
