//! Configuration loading and constants.
//!
//! Loads application configuration from an optional TOML file, then applies
//! environment overrides (`PORT`, `PROBE_*`, ...). `AppConfig` is the root
//! configuration struct containing all settings.

use const_format::formatcp;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// HTTP Response Headers
// =============================================================================

/// Probe results are point-in-time diagnostics and must never be served from a cache
pub const CACHE_CONTROL_NO_STORE: &str = "no-store";

/// Content type of every monitoring response
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

// =============================================================================
// HTTP Server Defaults
// =============================================================================

/// Default bind address
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Default listening port (overridden by `PORT`)
pub const DEFAULT_HTTP_PORT: u16 = 8080;

// =============================================================================
// Probe Defaults
// =============================================================================

/// Default probe executable, resolved relative to the working directory
pub const DEFAULT_PROBE_EXECUTABLE: &str = "./elasticsearch-health-check.sh";

/// Default wall-clock budget for a single probe run (4 minutes)
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 240;

/// Time between SIGTERM and SIGKILL when a probe overruns its budget
pub const DEFAULT_KILL_GRACE_MILLIS: u64 = 2000;

/// Per-stream capture limit (4 MiB)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 4 * 1024 * 1024;

/// Largest accepted probe budget (1 day)
pub const MAX_PROBE_TIMEOUT_SECS: u64 = 86_400;

/// Upper bound on waiting for output pipes to close once the probe is gone
pub const PROBE_DRAIN_TIMEOUT_MILLIS: u64 = 1000;

// =============================================================================
// Governor Defaults
// =============================================================================

/// Default number of probes allowed to run at once
pub const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Default time a request may wait for a slot before it is rejected.
/// Zero means reject immediately when all slots are taken.
pub const DEFAULT_QUEUE_TIMEOUT_MILLIS: u64 = 5000;

/// In-flight requests get the full probe budget plus this margin to finish on shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = DEFAULT_PROBE_TIMEOUT_SECS + 10;

// =============================================================================
// Default Paths and Strings
// =============================================================================

/// Default configuration file path (only read if it exists)
pub const DEFAULT_CONFIG_PATH: &str = "config/es-monitor.toml";

/// Credential file whose permissions are tightened on startup
pub const DEFAULT_CREDENTIAL_PATH: &str = "/root/.ssh/id_rsa";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "es_monitor=info,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Title line of every probe report
pub const REPORT_TITLE: &str = "Elasticsearch Monitoring";

/// Prefix used when rendering the report header
pub const REPORT_HEADER_PREFIX: &str = formatcp!("{} - Mode: ", REPORT_TITLE);

// =============================================================================
// Environment Variables
// =============================================================================

pub const ENV_PORT: &str = "PORT";
pub const ENV_PROBE_EXECUTABLE: &str = "PROBE_EXECUTABLE";
pub const ENV_PROBE_TIMEOUT_SECONDS: &str = "PROBE_TIMEOUT_SECONDS";
pub const ENV_PROBE_MAX_CONCURRENT: &str = "PROBE_MAX_CONCURRENT";
pub const ENV_PROBE_QUEUE_TIMEOUT_MILLIS: &str = "PROBE_QUEUE_TIMEOUT_MILLIS";
pub const ENV_CREDENTIAL_FILE: &str = "CREDENTIAL_FILE";
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub http: HttpServerConfig,
    /// Probe executable and its limits
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Concurrency limits for probe runs
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "HttpServerConfig::default_host")]
    pub host: String,
    #[serde(default = "HttpServerConfig::default_port")]
    pub port: u16,
    /// How long in-flight requests may run after a shutdown signal
    #[serde(default = "HttpServerConfig::default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: Self::default_host(),
            port: Self::default_port(),
            shutdown_timeout_seconds: Self::default_shutdown_timeout(),
        }
    }
}

impl HttpServerConfig {
    fn default_host() -> String {
        DEFAULT_HTTP_HOST.to_string()
    }

    fn default_port() -> u16 {
        DEFAULT_HTTP_PORT
    }

    fn default_shutdown_timeout() -> u64 {
        DEFAULT_SHUTDOWN_TIMEOUT_SECS
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }
}

/// Probe executable configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Path to the health-check executable
    #[serde(default = "ProbeConfig::default_executable")]
    pub executable: PathBuf,
    /// Wall-clock budget per run in seconds (default: 240)
    #[serde(default = "ProbeConfig::default_timeout")]
    pub timeout_seconds: u64,
    /// Delay between SIGTERM and SIGKILL on timeout
    #[serde(default = "ProbeConfig::default_kill_grace")]
    pub kill_grace_millis: u64,
    /// Maximum bytes kept per output stream
    #[serde(default = "ProbeConfig::default_max_output")]
    pub max_output_bytes: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            executable: Self::default_executable(),
            timeout_seconds: Self::default_timeout(),
            kill_grace_millis: Self::default_kill_grace(),
            max_output_bytes: Self::default_max_output(),
        }
    }
}

impl ProbeConfig {
    fn default_executable() -> PathBuf {
        PathBuf::from(DEFAULT_PROBE_EXECUTABLE)
    }

    fn default_timeout() -> u64 {
        DEFAULT_PROBE_TIMEOUT_SECS
    }

    fn default_kill_grace() -> u64 {
        DEFAULT_KILL_GRACE_MILLIS
    }

    fn default_max_output() -> usize {
        DEFAULT_MAX_OUTPUT_BYTES
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_millis)
    }
}

/// Concurrency governor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GovernorConfig {
    /// Maximum probes running at once (default: 4)
    #[serde(default = "GovernorConfig::default_max_concurrent")]
    pub max_concurrent: usize,
    /// How long a request waits for a free slot; 0 rejects immediately
    #[serde(default = "GovernorConfig::default_queue_timeout")]
    pub queue_timeout_millis: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: Self::default_max_concurrent(),
            queue_timeout_millis: Self::default_queue_timeout(),
        }
    }
}

impl GovernorConfig {
    fn default_max_concurrent() -> usize {
        DEFAULT_MAX_CONCURRENT
    }

    fn default_queue_timeout() -> u64 {
        DEFAULT_QUEUE_TIMEOUT_MILLIS
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_millis)
    }
}

/// Credential file handled at startup
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    /// File whose permissions are restricted to the owner. `None` skips the step.
    #[serde(default = "CredentialConfig::default_path")]
    pub path: Option<PathBuf>,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
        }
    }
}

impl CredentialConfig {
    fn default_path() -> Option<PathBuf> {
        Some(PathBuf::from(DEFAULT_CREDENTIAL_PATH))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

impl AppConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML text and validate it.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, otherwise from the default path when it exists,
    /// otherwise start from built-in defaults. Environment overrides are applied last.
    pub fn resolve(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH)?,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from an environment-style lookup, then re-validate.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_PORT) {
            self.http.port = parse_env(ENV_PORT, &port)?;
        }
        if let Some(executable) = lookup(ENV_PROBE_EXECUTABLE) {
            self.probe.executable = PathBuf::from(executable);
        }
        if let Some(timeout) = lookup(ENV_PROBE_TIMEOUT_SECONDS) {
            self.probe.timeout_seconds = parse_env(ENV_PROBE_TIMEOUT_SECONDS, &timeout)?;
        }
        if let Some(max) = lookup(ENV_PROBE_MAX_CONCURRENT) {
            self.governor.max_concurrent = parse_env(ENV_PROBE_MAX_CONCURRENT, &max)?;
        }
        if let Some(wait) = lookup(ENV_PROBE_QUEUE_TIMEOUT_MILLIS) {
            self.governor.queue_timeout_millis = parse_env(ENV_PROBE_QUEUE_TIMEOUT_MILLIS, &wait)?;
        }
        if let Some(path) = lookup(ENV_CREDENTIAL_FILE) {
            // An empty value disables the credential step
            self.credentials.path = (!path.is_empty()).then(|| PathBuf::from(path));
        }
        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            self.logging.format = format;
        }

        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.governor.max_concurrent == 0 {
            return Err(ConfigError::Validation(
                "governor.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.probe.timeout_seconds == 0 {
            return Err(ConfigError::Validation(
                "probe.timeout_seconds must be at least 1".to_string(),
            ));
        }
        if self.probe.timeout_seconds > MAX_PROBE_TIMEOUT_SECS {
            return Err(ConfigError::Validation(format!(
                "probe.timeout_seconds must be at most {}",
                MAX_PROBE_TIMEOUT_SECS
            )));
        }
        if self.probe.max_output_bytes == 0 {
            return Err(ConfigError::Validation(
                "probe.max_output_bytes must be at least 1".to_string(),
            ));
        }
        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Validation(format!(
                "logging.format must be \"text\" or \"json\", got \"{}\"",
                self.logging.format
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
    #[error("Invalid value for {key}: {value:?}")]
    Env { key: String, value: String },
}
