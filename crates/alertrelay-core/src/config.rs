//! Configuration management for AlertRelay
//!
//! Settings are layered: built-in defaults, then an optional config file
//! (TOML, YAML or JSON), then `ALERTRELAY__SECTION__KEY` environment
//! variables. Channel definitions live in a separate JSON document so that
//! their camelCase setting names survive untouched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::ChannelConfig;

/// Prefix of environment overrides
pub const ENV_PREFIX: &str = "ALERTRELAY";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Template configuration
    pub templates: TemplatesConfig,

    /// Dispatch configuration
    pub dispatch: DispatchConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// JSON file holding the list of channel configurations
    pub channels_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path` (if any) and the environment.
    ///
    /// A `.env` file in the working directory is read first.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Ok(env_file) = dotenvy::dotenv() {
            debug!(path = %env_file.display(), "Loaded .env file");
        }

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let loaded: Config = builder
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| Error::config(e.to_string()))?;

        Ok(loaded.resolve_relative_to(path.and_then(Path::parent)))
    }

    /// Make file references relative to the config file's directory
    fn resolve_relative_to(mut self, base: Option<&Path>) -> Self {
        let Some(base) = base else {
            return self;
        };
        let resolve = |p: &PathBuf| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.clone()
            }
        };
        self.channels_file = self.channels_file.as_ref().map(resolve);
        self.templates.files = self.templates.files.iter().map(resolve).collect();
        self
    }

    /// Read the configured channel list; no file means no channels
    pub fn load_channels(&self) -> Result<Vec<ChannelConfig>> {
        let Some(path) = &self.channels_file else {
            return Ok(Vec::new());
        };
        let raw = std::fs::read_to_string(path)?;
        let channels: Vec<ChannelConfig> = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), count = channels.len(), "Loaded channel configurations");
        Ok(channels)
    }
}

/// Template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplatesConfig {
    /// Base URL of the alerting UI, used for rule links
    pub external_url: String,
    /// Extra template files, registered under their file stem
    pub files: Vec<PathBuf>,
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            external_url: "http://localhost:3000/".to_string(),
            files: Vec::new(),
        }
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: format!("alertrelay/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.templates.external_url, "http://localhost:3000/");
        assert_eq!(config.dispatch.timeout, Duration::from_secs(30));
        assert!(config.dispatch.user_agent.starts_with("alertrelay/"));
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.load_channels().unwrap().is_empty());
    }

    #[test]
    fn test_load_from_file_with_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("alertrelay.toml");
        std::fs::write(
            &config_path,
            r#"
channels_file = "channels.json"

[templates]
external_url = "https://grafana.example.com/"
files = ["team.hbs"]

[dispatch]
timeout = "5s"

[logging]
format = "json"
"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("channels.json"),
            r#"[{"uid": "u1", "name": "ops", "type": "line", "settings": {"token": "t"}, "disableResolveMessage": true}]"#,
        )
        .unwrap();

        let config = Config::load(Some(&config_path)).unwrap();
        assert_eq!(config.templates.external_url, "https://grafana.example.com/");
        assert_eq!(config.templates.files, vec![dir.path().join("team.hbs")]);
        assert_eq!(config.dispatch.timeout, Duration::from_secs(5));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");

        let channels = config.load_channels().unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].kind, "line");
        assert!(channels[0].disable_resolve_message);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/alertrelay.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
