//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] controls limits, per-backend time budgets, health
//! re-probing, object listing bounds, content previews and caching. The
//! defaults suit an interactive caller; every field can be overridden from
//! a TOML file via [`SearchConfig::load`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Configuration shared by the orchestrator and its backends.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Result limit used when a request does not specify one.
    pub default_limit: usize,
    /// Largest limit a request may ask for.
    pub max_limit: usize,
    /// Outer time budget for one backend's `search` call, in seconds.
    pub search_timeout_secs: u64,
    /// Time budget for one backend health probe, in seconds.
    pub health_timeout_secs: u64,
    /// Minimum age of a failed health record before the orchestrator
    /// re-probes it ahead of a search. Set to 0 to re-probe on every call.
    pub health_recheck_secs: u64,
    /// Upper bound on keys the object-listing backend enumerates per search.
    pub listing_max_keys: usize,
    /// Keys requested per listing page.
    pub listing_page_size: usize,
    /// Bytes read from the head of an object for a content preview.
    pub preview_bytes: usize,
    /// How many top results receive a content preview.
    pub preview_max_results: usize,
    /// How long to cache envelopes in seconds. Set to 0 to disable caching.
    pub cache_ttl_seconds: u64,
    /// Maximum number of cached envelopes.
    pub cache_max_entries: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 1000,
            search_timeout_secs: 30,
            health_timeout_secs: 5,
            health_recheck_secs: 60,
            listing_max_keys: 1000,
            listing_page_size: 1000,
            preview_bytes: 512,
            preview_max_results: 10,
            cache_ttl_seconds: 0,
            cache_max_entries: 100,
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `max_limit` must be greater than 0
    /// - `default_limit` must be in `1..=max_limit`
    /// - `search_timeout_secs` and `health_timeout_secs` must be greater than 0
    /// - `listing_page_size` and `listing_max_keys` must be greater than 0
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_limit == 0 {
            return Err(SearchError::Config(
                "max_limit must be greater than 0".into(),
            ));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(SearchError::Config(format!(
                "default_limit must be between 1 and max_limit ({})",
                self.max_limit
            )));
        }
        if self.search_timeout_secs == 0 {
            return Err(SearchError::Config(
                "search_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.health_timeout_secs == 0 {
            return Err(SearchError::Config(
                "health_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.listing_page_size == 0 || self.listing_max_keys == 0 {
            return Err(SearchError::Config(
                "listing_page_size and listing_max_keys must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a configuration from TOML text.
    ///
    /// Missing keys fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the text is not valid TOML or the
    /// resulting configuration fails [`SearchConfig::validate`].
    pub fn from_toml_str(text: &str) -> Result<Self, SearchError> {
        let config: Self = toml::from_str(text)
            .map_err(|e| SearchError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, SearchError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SearchError::Config(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&text)
    }

    /// Outer per-backend search budget.
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    /// Per-probe health check budget.
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    /// Age after which a failed health record is re-probed.
    pub fn health_recheck(&self) -> Duration {
        Duration::from_secs(self.health_recheck_secs)
    }
}
