//! Configuration for the floe loader.

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::Path;

pub use floe_core::config::{InterpolationResult, interpolate, load_yaml, parse_yaml};
pub use floe_core::{KB, MB, MetricsConfig, StorageConfig};

use floe_core::error::{ConfigError, InvalidSnafu, StorageError};
use floe_core::storage::ObjectRef;

use crate::ingest::DEFAULT_CHUNK_SIZE;
use crate::pipeline::DEFAULT_CONCURRENCY;
use crate::policy::MappingPolicyConfig;
use crate::runlog::AuditTable;

/// Warehouse backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum WarehouseConfig {
    /// Keep tables in process memory.
    #[default]
    Memory,
    /// Write schema snapshots and NDJSON rows below `path`.
    Dump { path: String },
}

/// Message queue backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum QueueConfig {
    #[default]
    Memory,
    /// Write one JSON file per message below `path`.
    Dump { path: String },
}

/// Load run tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadConfig {
    /// Import worker count.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Maximum rows per insert call.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Message packing limits for the enqueue path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnqueueConfig {
    /// Maximum objects per message.
    #[serde(default = "default_count_limit")]
    pub count_limit: usize,
    /// Maximum cumulative object size per message, in MiB.
    #[serde(default = "default_size_limit_mb")]
    pub size_limit_mb: usize,
}

fn default_count_limit() -> usize {
    128
}

fn default_size_limit_mb() -> usize {
    4
}

impl Default for EnqueueConfig {
    fn default() -> Self {
        Self {
            count_limit: default_count_limit(),
            size_limit_mb: default_size_limit_mb(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    /// Table receiving one row per load run. Auditing is off when unset.
    #[serde(default)]
    pub audit: Option<AuditTable>,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub enqueue: EnqueueConfig,
    #[serde(default)]
    pub policy: MappingPolicyConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config: Config = load_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = parse_yaml(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.load.concurrency > 0,
            InvalidSnafu {
                message: "load.concurrency must be positive"
            }
        );
        ensure!(
            self.load.chunk_size > 0,
            InvalidSnafu {
                message: "load.chunk_size must be positive"
            }
        );
        ensure!(
            self.enqueue.count_limit > 0,
            InvalidSnafu {
                message: "enqueue.count_limit must be positive"
            }
        );
        ensure!(
            self.enqueue.size_limit_mb > 0,
            InvalidSnafu {
                message: "enqueue.size_limit_mb must be positive"
            }
        );

        if let WarehouseConfig::Dump { path } = &self.warehouse {
            location(path).map_err(|e| invalid(format!("warehouse.path: {e}")))?;
        }
        if let QueueConfig::Dump { path } = &self.queue {
            location(path).map_err(|e| invalid(format!("queue.path: {e}")))?;
        }
        Ok(())
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}

/// Resolve a configured location to an object reference.
///
/// URLs are parsed as-is; anything else is a local path, made absolute
/// against the working directory.
pub fn location(path: &str) -> Result<ObjectRef, StorageError> {
    if path.contains("://") {
        return ObjectRef::parse(path);
    }

    let absolute = std::path::absolute(path).map_err(|_| StorageError::InvalidUrl {
        url: path.to_string(),
    })?;
    ObjectRef::parse(&absolute.to_string_lossy())
}
