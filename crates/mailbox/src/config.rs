/*
 * SPDX-FileCopyrightText: 2024 A3Mailer Project
 *
 * SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-SEL
 */

//! Engine configuration.
//!
//! Loaded from TOML or built in code; validated before the engine starts.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the mailbox engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Database URL or file path handed to the store.
    pub database_url: String,

    /// Namespace root under which shared mailboxes appear, keyed by owner
    /// email. Fixed per deployment, independent of the per-user mode.
    pub shared_root: String,

    /// Hierarchy delimiter used in composed namespace paths.
    pub delimiter: String,

    /// Refresh interval for the domain cache background task, in seconds.
    pub cache_refresh_secs: u64,

    /// Maximum number of entries returned by audit queries.
    pub audit_query_limit: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "mailbox.db".to_string(),
            shared_root: "Shared".to_string(),
            delimiter: "/".to_string(),
            cache_refresh_secs: 300,
            audit_query_limit: 1000,
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document into a configuration.
    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    /// Validates the configuration, returning a description of the first
    /// problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("database_url must not be empty".to_string());
        }
        if self.shared_root.is_empty() || self.shared_root.contains(&self.delimiter) {
            return Err("shared_root must be a single path component".to_string());
        }
        if self.delimiter.len() != 1 {
            return Err("delimiter must be a single character".to_string());
        }
        if self.cache_refresh_secs == 0 {
            return Err("cache_refresh_secs must be positive".to_string());
        }
        Ok(())
    }

    pub fn cache_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.cache_refresh_secs)
    }
}
