use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 2500;
pub const DEFAULT_SOFT_HEAP_LIMIT: i64 = 8 * 1024 * 1024;
pub const DEFAULT_PROGRESS_INTERVAL: i32 = 4;
pub const DEFAULT_STATEMENT_CACHE_CAPACITY: usize = 16;
pub const DEFAULT_OBJECT_ARRAY_CHUNK_ROWS: usize = 500;

/// Options shared by every connection a [`crate::HandleRegistry`] opens.
///
/// Unknown JSON fields are rejected; missing ones fall back to the defaults:
/// ```rust
/// use sqlite_bridge::RegistryOptions;
///
/// let opts = RegistryOptions::from_json(r#"{ "busy_timeout_ms": 100 }"#).unwrap();
/// assert_eq!(opts.busy_timeout().as_millis(), 100);
/// assert_eq!(opts.progress_interval, 4);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryOptions {
    pub busy_timeout_ms: u64,
    pub soft_heap_limit: i64,
    /// Engine instructions between cancellation checks.
    pub progress_interval: i32,
    pub statement_cache_capacity: usize,
    pub object_array_chunk_rows: usize,
    /// Forward routine engine log codes (OK, CONSTRAINT, SCHEMA) as well as failures.
    pub verbose_engine_log: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            soft_heap_limit: DEFAULT_SOFT_HEAP_LIMIT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            statement_cache_capacity: DEFAULT_STATEMENT_CACHE_CAPACITY,
            object_array_chunk_rows: DEFAULT_OBJECT_ARRAY_CHUNK_ROWS,
            verbose_engine_log: false,
        }
    }
}

impl RegistryOptions {
    #[must_use]
    pub fn builder() -> RegistryOptionsBuilder {
        RegistryOptionsBuilder::new()
    }

    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Parse options from JSON and validate them.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Config` if the JSON is malformed or a value is out of range.
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        let opts: RegistryOptions = serde_json::from_str(json)
            .map_err(|e| BridgeError::Config(format!("invalid registry options: {e}")))?;
        opts.validate()?;
        Ok(opts)
    }

    /// # Errors
    ///
    /// Returns `BridgeError::Config` for a non-positive progress interval, a zero chunk size,
    /// or a negative heap limit.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.progress_interval <= 0 {
            return Err(BridgeError::Config(format!(
                "progress_interval must be positive, got {}",
                self.progress_interval
            )));
        }
        if self.object_array_chunk_rows == 0 {
            return Err(BridgeError::Config(
                "object_array_chunk_rows must be at least 1".into(),
            ));
        }
        if self.soft_heap_limit < 0 {
            return Err(BridgeError::Config(format!(
                "soft_heap_limit must not be negative, got {}",
                self.soft_heap_limit
            )));
        }
        Ok(())
    }
}

/// Fluent builder for registry options.
#[derive(Debug, Clone, Default)]
pub struct RegistryOptionsBuilder {
    opts: RegistryOptions,
}

impl RegistryOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.opts.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[must_use]
    pub fn soft_heap_limit(mut self, bytes: i64) -> Self {
        self.opts.soft_heap_limit = bytes;
        self
    }

    #[must_use]
    pub fn progress_interval(mut self, instructions: i32) -> Self {
        self.opts.progress_interval = instructions;
        self
    }

    #[must_use]
    pub fn statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.opts.statement_cache_capacity = capacity;
        self
    }

    #[must_use]
    pub fn object_array_chunk_rows(mut self, rows: usize) -> Self {
        self.opts.object_array_chunk_rows = rows;
        self
    }

    #[must_use]
    pub fn verbose_engine_log(mut self, verbose: bool) -> Self {
        self.opts.verbose_engine_log = verbose;
        self
    }

    #[must_use]
    pub fn finish(self) -> RegistryOptions {
        self.opts
    }
}
