//! Store configuration.
//!
//! [`StoreConfig`] can be deserialized from a host's own configuration, read
//! from a flat settings map, or read from environment variables:
//! - `RECSTORE_STORAGE_LOCATION`: SQLite file path or `:memory:` (default: ":memory:")
//! - `RECSTORE_MAX_FETCH_SIZE`: hard cap on rows per listing (default: 50)
//! - `RECSTORE_READONLY`: refuse all writes when true (default: false)

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::StorageError;

/// Location that selects a private in-memory SQLite database.
pub const MEMORY_LOCATION: &str = ":memory:";

/// Default cap on rows returned by one listing.
pub const DEFAULT_MAX_FETCH_SIZE: usize = 50;

/// Largest accepted fetch cap. Listings fetch one row past the cap and
/// SQLite binds the row limit as an `i64`.
pub const MAX_FETCH_SIZE_LIMIT: usize = (i64::MAX - 1) as usize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub storage_location: String,
    pub max_fetch_size: usize,
    pub readonly: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            storage_location: MEMORY_LOCATION.to_string(),
            max_fetch_size: DEFAULT_MAX_FETCH_SIZE,
            readonly: false,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn at(location: impl Into<String>) -> Self {
        StoreConfig {
            storage_location: location.into(),
            ..Self::default()
        }
    }

    /// Reads `storage_location`, `storage_max_fetch_size` and `readonly` from
    /// a flat settings map. Missing keys keep their defaults.
    pub fn from_settings(settings: &HashMap<String, String>) -> Result<Self, StorageError> {
        let mut config = StoreConfig::default();
        if let Some(location) = settings.get("storage_location") {
            config.storage_location = location.clone();
        }
        if let Some(size) = settings.get("storage_max_fetch_size") {
            config.max_fetch_size = parse_fetch_size(size)?;
        }
        if let Some(flag) = settings.get("readonly") {
            config.readonly = parse_flag("readonly", flag)?;
        }
        Ok(config)
    }

    /// Reads configuration from `RECSTORE_*` environment variables.
    pub fn from_env() -> Result<Self, StorageError> {
        let mut settings = HashMap::new();
        for (var, key) in [
            ("RECSTORE_STORAGE_LOCATION", "storage_location"),
            ("RECSTORE_MAX_FETCH_SIZE", "storage_max_fetch_size"),
            ("RECSTORE_READONLY", "readonly"),
        ] {
            if let Ok(value) = std::env::var(var) {
                settings.insert(key.to_string(), value);
            }
        }
        Self::from_settings(&settings)
    }

    /// Checks values that bypassed the parsers, e.g. a deserialized config.
    pub fn validate(&self) -> Result<(), StorageError> {
        check_fetch_size(self.max_fetch_size)?;
        Ok(())
    }

    /// Sets the fetch cap, which must be in `1..=MAX_FETCH_SIZE_LIMIT`.
    pub fn with_max_fetch_size(mut self, max_fetch_size: usize) -> Result<Self, StorageError> {
        self.max_fetch_size = check_fetch_size(max_fetch_size)?;
        Ok(self)
    }

    pub fn with_readonly(mut self, readonly: bool) -> Self {
        self.readonly = readonly;
        self
    }
}

fn parse_fetch_size(raw: &str) -> Result<usize, StorageError> {
    match raw.trim().parse::<usize>() {
        Ok(size) => check_fetch_size(size),
        Err(_) => Err(StorageError::Config {
            reason: format!("storage_max_fetch_size must be a positive integer, got '{}'", raw),
        }),
    }
}

/// Accepts a fetch cap in `1..=MAX_FETCH_SIZE_LIMIT`.
pub fn check_fetch_size(size: usize) -> Result<usize, StorageError> {
    if size == 0 || size > MAX_FETCH_SIZE_LIMIT {
        return Err(StorageError::Config {
            reason: format!(
                "storage_max_fetch_size must be between 1 and {}, got {}",
                MAX_FETCH_SIZE_LIMIT, size
            ),
        });
    }
    Ok(size)
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, StorageError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(StorageError::Config {
            reason: format!("{} must be a boolean, got '{}'", key, raw),
        }),
    }
}
