//! Configuration for the apexlog access layer

use std::time::Duration;

/// Floor for the combined-output cap; smaller configured values are raised
pub const MIN_OUTPUT_CAP_BYTES: usize = 1024 * 1024;

/// Default combined stdout/stderr cap for CLI invocations
pub const DEFAULT_OUTPUT_CAP_BYTES: usize = 10 * 1024 * 1024;

/// Default timeout for CLI invocations
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(120);

/// How long a cached log listing stays fresh
pub const LIST_CACHE_TTL: Duration = Duration::from_millis(3000);

/// Longest line prefix retained per log in the head cache
pub const HEAD_CACHE_MAX_LINES: usize = 100;

/// Most distinct logs retained in the head cache before FIFO eviction
pub const HEAD_CACHE_MAX_ENTRIES: usize = 200;

/// Tunables for the access layer.
///
/// `Default` gives production values; `from_env` applies `APEXLOG_*`
/// overrides on top. Constructed once and shared by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessConfig {
    /// Salesforce REST API version, without the leading `v`
    pub api_version: String,
    /// Timeout applied to CLI invocations
    pub exec_timeout: Duration,
    /// Configured combined-output cap for CLI invocations
    pub output_cap_bytes: usize,
    /// TTL for the log-listing cache
    pub list_cache_ttl: Duration,
    /// Longest line prefix retained per log
    pub head_cache_max_lines: usize,
    /// Most distinct logs retained before FIFO eviction
    pub head_cache_max_entries: usize,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            api_version: "64.0".to_string(),
            exec_timeout: DEFAULT_EXEC_TIMEOUT,
            output_cap_bytes: DEFAULT_OUTPUT_CAP_BYTES,
            list_cache_ttl: LIST_CACHE_TTL,
            head_cache_max_lines: HEAD_CACHE_MAX_LINES,
            head_cache_max_entries: HEAD_CACHE_MAX_ENTRIES,
        }
    }
}

impl AccessConfig {
    /// Build a config from defaults plus `APEXLOG_*` environment overrides.
    ///
    /// Recognized variables: `APEXLOG_API_VERSION`,
    /// `APEXLOG_EXEC_TIMEOUT_SECS`, `APEXLOG_OUTPUT_CAP_BYTES`.
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(version) = std::env::var("APEXLOG_API_VERSION")
            && !version.trim().is_empty()
        {
            config.api_version = version.trim().to_string();
        }

        if let Ok(raw) = std::env::var("APEXLOG_EXEC_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => config.exec_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(%raw, "ignoring invalid APEXLOG_EXEC_TIMEOUT_SECS"),
            }
        }

        if let Ok(raw) = std::env::var("APEXLOG_OUTPUT_CAP_BYTES") {
            match raw.trim().parse::<usize>() {
                Ok(bytes) => config.output_cap_bytes = bytes,
                Err(_) => tracing::warn!(%raw, "ignoring invalid APEXLOG_OUTPUT_CAP_BYTES"),
            }
        }

        config
    }

    /// The output cap actually enforced: never below [`MIN_OUTPUT_CAP_BYTES`]
    #[must_use]
    pub fn effective_output_cap(&self) -> usize {
        self.output_cap_bytes.max(MIN_OUTPUT_CAP_BYTES)
    }
}
