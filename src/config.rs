//! Configuration for Quarry.
//!
//! Defines the client-wide configuration, the retry/backoff schedule,
//! and per-query option overrides, with support for loading from TOML.

use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

use crate::error::{QuarryError, Result};

/// Client-wide configuration for a [`QueryClient`](crate::QueryClient).
///
/// All fields have defaults except `output_bucket`, which must name the
/// object-storage location the execution service writes output to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Object-storage URI for query output, e.g. `s3://my-bucket/results/`.
    #[serde(default)]
    pub output_bucket: String,

    /// Database queries run against when the request does not name one.
    #[serde(default = "default_db")]
    pub db: String,

    /// Data catalog; the service default applies when unset.
    #[serde(default)]
    pub catalog: Option<String>,

    /// Workgroup executions are billed to.
    #[serde(default = "default_workgroup")]
    pub workgroup: String,

    /// Rows per page. Zero requests the service's default page size.
    #[serde(default)]
    pub page_size: u32,

    /// Poll retry/backoff schedule.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Fetch results as structured pages from the execution service.
    /// When false, the raw output object is downloaded from storage and
    /// parsed as CSV instead.
    #[serde(default = "default_true")]
    pub format_json: bool,

    /// Attach execution statistics to the envelope.
    #[serde(default)]
    pub get_stats: bool,

    /// Omit `items` entirely when the result has zero rows.
    #[serde(default)]
    pub ignore_empty: bool,

    /// Skip result retrieval; return only execution id and output location.
    #[serde(default)]
    pub skip_results: bool,

    /// Poll until terminal. When false, return right after submission.
    #[serde(default = "default_true")]
    pub wait_for_results: bool,

    /// Keep dotted column names flat instead of expanding them into
    /// nested JSON objects.
    #[serde(default)]
    pub flat_keys: bool,

    /// Allow the service to reuse a prior execution's cached output.
    #[serde(default)]
    pub result_reuse: bool,

    /// Maximum age of a reusable result, in minutes.
    #[serde(default = "default_reuse_max_age")]
    pub result_reuse_max_age_minutes: u32,

    /// Delete the output object after the final page has been read.
    #[serde(default)]
    pub delete_output_after_read: bool,

    /// Literal token the output uses for NULL. The empty/absent cell is
    /// always treated as NULL regardless of this setting.
    #[serde(default)]
    pub null_sentinel: Option<String>,
}

fn default_db() -> String {
    "default".to_string()
}

fn default_workgroup() -> String {
    "primary".to_string()
}

fn default_reuse_max_age() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            output_bucket: String::new(),
            db: default_db(),
            catalog: None,
            workgroup: default_workgroup(),
            page_size: 0,
            retry: RetryConfig::default(),
            format_json: true,
            get_stats: false,
            ignore_empty: false,
            skip_results: false,
            wait_for_results: true,
            flat_keys: false,
            result_reuse: false,
            result_reuse_max_age_minutes: default_reuse_max_age(),
            delete_output_after_read: false,
            null_sentinel: None,
        }
    }
}

impl ClientConfig {
    /// Creates a config with the given output bucket and defaults for
    /// everything else.
    pub fn new(output_bucket: impl Into<String>) -> Self {
        Self {
            output_bucket: output_bucket.into(),
            ..Default::default()
        }
    }

    /// Sets the default database.
    pub fn with_db(mut self, db: impl Into<String>) -> Self {
        self.db = db.into();
        self
    }

    /// Sets the data catalog.
    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    /// Sets the workgroup.
    pub fn with_workgroup(mut self, workgroup: impl Into<String>) -> Self {
        self.workgroup = workgroup.into();
        self
    }

    /// Sets the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sets the retry schedule.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enables statistics collection.
    pub fn with_stats(mut self) -> Self {
        self.get_stats = true;
        self
    }

    /// Enables result reuse with the given maximum age.
    pub fn with_result_reuse(mut self, max_age_minutes: u32) -> Self {
        self.result_reuse = true;
        self.result_reuse_max_age_minutes = max_age_minutes;
        self
    }

    /// Loads configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| QuarryError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            QuarryError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Validates that the config can back a client: the output bucket
    /// must be present and a parseable URI.
    pub fn validate(&self) -> Result<()> {
        if self.output_bucket.trim().is_empty() {
            return Err(QuarryError::config(
                "output_bucket is required (e.g. \"s3://my-bucket/results/\")",
            ));
        }
        self.output_location()?;
        Ok(())
    }

    /// Parses the output bucket into a URL.
    pub fn output_location(&self) -> Result<Url> {
        Url::parse(&self.output_bucket).map_err(|e| {
            QuarryError::config(format!(
                "Invalid output_bucket '{}': {e}",
                self.output_bucket
            ))
        })
    }

    /// Returns a copy with per-query options applied on top.
    pub fn merged(&self, options: &QueryOptions) -> Self {
        let mut merged = self.clone();
        if let Some(page_size) = options.page_size {
            merged.page_size = page_size;
        }
        if let Some(get_stats) = options.get_stats {
            merged.get_stats = get_stats;
        }
        if let Some(skip_results) = options.skip_results {
            merged.skip_results = skip_results;
        }
        if let Some(ignore_empty) = options.ignore_empty {
            merged.ignore_empty = ignore_empty;
        }
        if let Some(result_reuse) = options.result_reuse {
            merged.result_reuse = result_reuse;
        }
        if let Some(max_age) = options.result_reuse_max_age_minutes {
            merged.result_reuse_max_age_minutes = max_age;
        }
        merged
    }
}

/// Backoff schedule for the status poll loop.
///
/// Delays start at `initial_delay_ms`, double on every non-terminal
/// poll, and are capped at `max_delay_ms`; `max_attempts` bounds the
/// total number of polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_max_attempts() -> u32 {
    20
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetryConfig {
    /// Creates a schedule with the given base delay and attempt bound.
    pub fn new(initial_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            initial_delay_ms,
            max_attempts,
            ..Default::default()
        }
    }

    /// Sets the delay cap.
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Returns the sleep before poll attempt `attempt` (zero-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let exp = attempt.min(16);
        let delay = self
            .initial_delay_ms
            .saturating_mul(1u64 << exp)
            .min(self.max_delay_ms);
        std::time::Duration::from_millis(delay)
    }
}

/// Per-query overrides, applied on top of the client config.
///
/// Unset fields inherit the client-wide value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryOptions {
    pub page_size: Option<u32>,
    pub get_stats: Option<bool>,
    pub skip_results: Option<bool>,
    pub ignore_empty: Option<bool>,
    pub result_reuse: Option<bool>,
    pub result_reuse_max_age_minutes: Option<u32>,
}

impl QueryOptions {
    /// Enables result reuse for this query with the given maximum age.
    pub fn with_result_reuse(mut self, max_age_minutes: u32) -> Self {
        self.result_reuse = Some(true);
        self.result_reuse_max_age_minutes = Some(max_age_minutes);
        self
    }

    /// Sets the page size for this query.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Requests execution statistics for this query.
    pub fn with_stats(mut self) -> Self {
        self.get_stats = Some(true);
        self
    }
}
