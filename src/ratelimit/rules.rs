//! Per-route limit selection.
//!
//! Routes are matched by exact path first. Entries ending in `*` match any
//! path starting with the part before the `*`; the longest such prefix
//! wins. Anything else falls back to the default limit.

use std::collections::HashMap;

use crate::config::RateLimitingConfig;

/// Limits for request paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLimits {
    default_limit: u64,
    exact: HashMap<String, u64>,
    /// Sorted longest prefix first
    prefixes: Vec<(String, u64)>,
}

impl RouteLimits {
    /// Create a table with only a default limit.
    pub fn new(default_limit: u64) -> Self {
        Self {
            default_limit,
            exact: HashMap::new(),
            prefixes: Vec::new(),
        }
    }

    /// Build the table from the rate limiting section of the configuration.
    pub fn from_config(config: &RateLimitingConfig) -> Self {
        config
            .routes
            .iter()
            .fold(Self::new(config.default_limit), |limits, (path, limit)| {
                limits.with_route(path, *limit)
            })
    }

    /// Add or replace the limit for a path or `prefix*` pattern.
    pub fn with_route(mut self, pattern: &str, limit: u64) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => {
                self.prefixes.retain(|(p, _)| p != prefix);
                self.prefixes.push((prefix.to_string(), limit));
                self.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
            }
            None => {
                self.exact.insert(pattern.to_string(), limit);
            }
        }
        self
    }

    pub fn default_limit(&self) -> u64 {
        self.default_limit
    }

    /// The limit that applies to `path`.
    pub fn limit_for(&self, path: &str) -> u64 {
        if let Some(limit) = self.exact.get(path) {
            return *limit;
        }
        self.prefixes
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map_or(self.default_limit, |(_, limit)| *limit)
    }
}
