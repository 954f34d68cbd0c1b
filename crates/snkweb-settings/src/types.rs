//! Settings data types.
//!
//! Every struct is `#[serde(default)]` so a partial settings file only needs
//! the keys it overrides.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Smallest poll interval accepted, in milliseconds.
pub const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Root settings for the search client.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SnkSettings {
    /// Base HTTP(S) URL of the search service, e.g. `https://nk.example.com`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// REST transport settings.
    pub http: HttpSettings,
    /// WebSocket search settings.
    pub search: SearchSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl SnkSettings {
    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.endpoint {
            let url = url::Url::parse(endpoint).map_err(|e| {
                SettingsError::InvalidValue(format!("endpoint '{endpoint}': {e}"))
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(SettingsError::InvalidValue(format!(
                    "endpoint '{endpoint}' must use http or https"
                )));
            }
            if url.host_str().is_none() {
                return Err(SettingsError::InvalidValue(format!(
                    "endpoint '{endpoint}' has no host"
                )));
            }
        }
        if self.search.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(SettingsError::InvalidValue(format!(
                "search.pollIntervalMs must be at least {MIN_POLL_INTERVAL_MS}, got {}",
                self.search.poll_interval_ms
            )));
        }
        if !self.search.ws_path.starts_with('/') {
            return Err(SettingsError::InvalidValue(format!(
                "search.wsPath must start with '/', got '{}'",
                self.search.ws_path
            )));
        }
        Ok(())
    }
}

/// REST transport settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpSettings {
    /// Whole-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// TCP/TLS connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            user_agent: concat!("snkweb/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// WebSocket search settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchSettings {
    /// Path of the search socket, appended to the endpoint.
    pub ws_path: String,
    /// Delay between two entry-count polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Channel topics subscribed right after the socket opens.
    pub subscriptions: Vec<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            ws_path: "/api/ws/search".to_string(),
            poll_interval_ms: 1_000,
            subscriptions: ["PONG", "parse", "search", "attach"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Log verbosity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace-level (most verbose).
    Trace,
    /// Debug-level.
    Debug,
    /// Info-level (default).
    #[default]
    Info,
    /// Warning-level.
    Warn,
    /// Error-level.
    Error,
}

impl LogLevel {
    /// Convert to a tracing filter string.
    pub fn as_filter_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    pub level: LogLevel,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
