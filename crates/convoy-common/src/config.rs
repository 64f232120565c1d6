//! Reconciler configuration
//!
//! Poll cadence and per-operation timeouts. Values come from a YAML document
//! or from `CONVOY_*` environment variables; anything unset keeps its default.

use std::time::Duration;

use serde::Deserialize;

use crate::Error;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_MUTATION_TIMEOUT_SECS: u64 = 90 * 60;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 5 * 60;

/// Timing configuration for one reconciler
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconcilerConfig {
    /// Delay between polls of a long-running operation
    pub poll_interval_secs: u64,
    /// Budget for a create, including the post-create read
    pub create_timeout_secs: u64,
    /// Budget for each long-running operation of an update
    pub update_timeout_secs: u64,
    /// Budget for a delete
    pub delete_timeout_secs: u64,
    /// Budget for each plain read or credential listing
    pub read_timeout_secs: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            create_timeout_secs: DEFAULT_MUTATION_TIMEOUT_SECS,
            update_timeout_secs: DEFAULT_MUTATION_TIMEOUT_SECS,
            delete_timeout_secs: DEFAULT_MUTATION_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
        }
    }
}

impl ReconcilerConfig {
    /// Defaults overlaid with `CONVOY_*` environment variables
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse a YAML document; missing keys keep their defaults
    pub fn from_yaml(input: &str) -> Result<Self, Error> {
        let config: Self = if input.trim().is_empty() {
            Self::default()
        } else {
            crate::yaml::from_yaml(input, "ReconcilerConfig")?
        };
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let mut config = Self::default();
        for (key, slot) in [
            ("CONVOY_POLL_INTERVAL_SECS", &mut config.poll_interval_secs),
            ("CONVOY_CREATE_TIMEOUT_SECS", &mut config.create_timeout_secs),
            ("CONVOY_UPDATE_TIMEOUT_SECS", &mut config.update_timeout_secs),
            ("CONVOY_DELETE_TIMEOUT_SECS", &mut config.delete_timeout_secs),
            ("CONVOY_READ_TIMEOUT_SECS", &mut config.read_timeout_secs),
        ] {
            if let Some(raw) = lookup(key) {
                *slot = raw.trim().parse().map_err(|_| {
                    Error::validation_for_field(
                        "config",
                        key,
                        format!("expected a whole number of seconds, got '{raw}'"),
                    )
                })?;
            }
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.poll_interval_secs == 0 {
            return Err(Error::validation_for_field(
                "config",
                "pollIntervalSecs",
                "poll interval must be at least one second",
            ));
        }
        for (field, value) in [
            ("createTimeoutSecs", self.create_timeout_secs),
            ("updateTimeoutSecs", self.update_timeout_secs),
            ("deleteTimeoutSecs", self.delete_timeout_secs),
            ("readTimeoutSecs", self.read_timeout_secs),
        ] {
            if value < self.poll_interval_secs {
                return Err(Error::validation_for_field(
                    "config",
                    field,
                    format!("timeout ({value}s) is shorter than the poll interval"),
                ));
            }
        }
        Ok(())
    }

    /// Delay between operation polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Create budget
    pub fn create_timeout(&self) -> Duration {
        Duration::from_secs(self.create_timeout_secs)
    }

    /// Per-operation update budget
    pub fn update_timeout(&self) -> Duration {
        Duration::from_secs(self.update_timeout_secs)
    }

    /// Delete budget
    pub fn delete_timeout(&self) -> Duration {
        Duration::from_secs(self.delete_timeout_secs)
    }

    /// Read budget
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
