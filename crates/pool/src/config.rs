//! Pool configuration
//!
//! Configuration can be built in code or loaded from environment variables.

use std::env;

use serde::{Deserialize, Serialize};

/// Concurrency limit value meaning "one slot per logical CPU"
pub const AUTO_CONCURRENCY: usize = 0;

/// Number of logical CPUs on this host (at least 1)
pub fn available_parallelism() -> usize {
    num_cpus::get().max(1)
}

/// Resolve a requested limit, mapping [`AUTO_CONCURRENCY`] to the host default
pub fn resolve_concurrency(limit: usize) -> usize {
    if limit == AUTO_CONCURRENCY {
        available_parallelism()
    } else {
        limit
    }
}

/// Pool configuration
///
/// # Example
///
/// ```
/// use boundpool::PoolConfig;
///
/// let config = PoolConfig::new()
///     .with_name("encoder")
///     .with_max_concurrency(4);
///
/// assert_eq!(config.resolved_concurrency(), 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PoolConfig {
    /// Pool name, attached to every log line the pool emits
    pub name: String,

    /// Maximum number of concurrently executing tasks (0 = auto)
    pub max_concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            name: "pool".to_string(),
            max_concurrency: AUTO_CONCURRENCY,
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `BOUNDPOOL_NAME`: pool name (default: `pool`)
    /// - `BOUNDPOOL_MAX_CONCURRENCY`: concurrency limit, `0` for auto (default: auto)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let name = lookup("BOUNDPOOL_NAME")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.name);

        let max_concurrency = lookup("BOUNDPOOL_MAX_CONCURRENCY")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(defaults.max_concurrency);

        Self {
            name,
            max_concurrency,
        }
    }

    /// Set the pool name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set maximum concurrency (0 = auto)
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Effective concurrency limit, never zero
    pub fn resolved_concurrency(&self) -> usize {
        resolve_concurrency(self.max_concurrency)
    }
}
