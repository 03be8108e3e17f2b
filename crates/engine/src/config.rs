//! Engine configuration.
//!
//! Supports programmatic construction, command-line arguments, and
//! environment variable overrides.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `HFS_ENGINE_BASE_URL` | http://localhost:8080/fhir | Base for `fullUrl` and links |
//! | `HFS_ENGINE_DEFAULT_PAGE_SIZE` | 20 | `_count` when absent |
//! | `HFS_ENGINE_MAX_PAGE_SIZE` | 100 | Upper clamp for `_count` |
//! | `HFS_ENGINE_MAX_FAN_OUT` | 8 | Concurrent sub-queries per request |
//! | `HFS_ENGINE_MAX_CHAIN_DEPTH` | 2 | Hops allowed in chained parameters |
//! | `HFS_ENGINE_MAX_CHAIN_RESULTS` | 1000 | Ids collected per chained sub-query |
//! | `HFS_ENGINE_MAX_INCLUDE_RESULTS` | 1000 | Resources per included type or reverse include |
//! | `HFS_ENGINE_REQUEST_TIMEOUT` | 30s | Per-search deadline |
//! | `HFS_ENGINE_ALLOW_ID_WITH_FILTERS` | false | Accept `_id` next to other filters |
//! | `HFS_ENGINE_LOG_LEVEL` | info | Log level |
//!
//! # Example
//!
//! ```rust
//! use helios_engine::EngineConfig;
//!
//! let config = EngineConfig {
//!     base_url: "https://fhir.example.org/r4".to_string(),
//!     max_fan_out: 4,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use clap::Parser;

/// Engine configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "hfs-engine")]
#[command(about = "FHIR search and transaction engine")]
pub struct EngineConfig {
    /// Base URL used for `fullUrl` values and paging links.
    #[arg(
        long,
        env = "HFS_ENGINE_BASE_URL",
        default_value = "http://localhost:8080/fhir"
    )]
    pub base_url: String,

    /// Page size when `_count` is absent.
    #[arg(long, env = "HFS_ENGINE_DEFAULT_PAGE_SIZE", default_value = "20")]
    pub default_page_size: u32,

    /// Largest page size a client may request.
    #[arg(long, env = "HFS_ENGINE_MAX_PAGE_SIZE", default_value = "100")]
    pub max_page_size: u32,

    /// Maximum concurrent sub-queries per search request.
    #[arg(long, env = "HFS_ENGINE_MAX_FAN_OUT", default_value = "8")]
    pub max_fan_out: usize,

    /// Maximum hops in a chained or `_has` parameter.
    #[arg(long, env = "HFS_ENGINE_MAX_CHAIN_DEPTH", default_value = "2")]
    pub max_chain_depth: usize,

    /// Maximum ids collected from one chained sub-query.
    #[arg(long, env = "HFS_ENGINE_MAX_CHAIN_RESULTS", default_value = "1000")]
    pub max_chain_results: usize,

    /// Maximum resources included per target type or per `_revinclude`.
    #[arg(long, env = "HFS_ENGINE_MAX_INCLUDE_RESULTS", default_value = "1000")]
    pub max_include_results: usize,

    /// Deadline for a whole search request (e.g. `30s`, `1500ms`).
    #[arg(
        long,
        env = "HFS_ENGINE_REQUEST_TIMEOUT",
        default_value = "30s",
        value_parser = humantime::parse_duration
    )]
    pub request_timeout: Duration,

    /// Accept `_id` combined with other filter parameters.
    #[arg(long, env = "HFS_ENGINE_ALLOW_ID_WITH_FILTERS", default_value = "false")]
    pub allow_id_with_filters: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, env = "HFS_ENGINE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/fhir".to_string(),
            default_page_size: 20,
            max_page_size: 100,
            max_fan_out: 8,
            max_chain_depth: 2,
            max_chain_results: 1000,
            max_include_results: 1000,
            request_timeout: Duration::from_secs(30),
            allow_id_with_filters: false,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Returns the base URL without a trailing slash.
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if url::Url::parse(&self.base_url).is_err() {
            errors.push(format!("Base URL is not absolute: {}", self.base_url));
        }

        if self.default_page_size == 0 {
            errors.push("Default page size cannot be 0".to_string());
        }

        if self.default_page_size > self.max_page_size {
            errors.push("Default page size cannot exceed max page size".to_string());
        }

        if self.max_fan_out == 0 {
            errors.push("Max fan-out cannot be 0".to_string());
        }

        if self.max_chain_results == 0 {
            errors.push("Max chain results cannot be 0".to_string());
        }

        if self.request_timeout.is_zero() {
            errors.push("Request timeout cannot be 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Creates a configuration suitable for testing.
    pub fn for_testing() -> Self {
        Self {
            base_url: "http://test.local/fhir".to_string(),
            request_timeout: Duration::from_secs(5),
            log_level: "debug".to_string(),
            ..Default::default()
        }
    }
}
