//! Error types shared by the floe capabilities.
//!
//! Each external collaborator (object storage, warehouse, policy evaluator,
//! message queue) reports failures through its own enum so callers can tell
//! a missing table from a failed insert without string matching.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during object storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid object URL format.
    #[snafu(display("Invalid object URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed: {source}"))]
    ObjectStore { source: object_store::Error },

    /// Backend could not be configured for a bucket.
    #[snafu(display("Failed to configure {scheme} backend for bucket '{bucket}': {source}"))]
    BackendConfig {
        scheme: String,
        bucket: String,
        source: object_store::Error,
    },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// A configured value is out of range or inconsistent.
    #[snafu(display("Invalid configuration: {message}"))]
    Invalid { message: String },
}

// ============ Warehouse Errors ============

/// Errors returned by a [`Warehouse`](crate::warehouse::Warehouse) backend.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WarehouseError {
    /// The table does not exist.
    #[snafu(display("Table {dataset}.{table} not found"))]
    TableNotFound { dataset: String, table: String },

    /// The table already exists (create raced with another writer).
    #[snafu(display("Table {dataset}.{table} already exists"))]
    TableExists { dataset: String, table: String },

    /// Optimistic-concurrency update lost against a concurrent writer.
    #[snafu(display("Table {dataset}.{table} was modified concurrently (etag {expected} != {actual})"))]
    EtagMismatch {
        dataset: String,
        table: String,
        expected: String,
        actual: String,
    },

    /// Insert was rejected by the backend.
    #[snafu(display("Insert into {dataset}.{table} failed: {message}"))]
    Insert {
        dataset: String,
        table: String,
        message: String,
    },

    /// Query failed.
    #[snafu(display("Query failed: {message}"))]
    Query { message: String },

    /// Failed to serialize rows or metadata.
    #[snafu(display("Failed to serialize warehouse payload: {source}"))]
    Serialize { source: serde_json::Error },

    /// Underlying storage failed (file-dumping backends).
    #[snafu(display("Warehouse storage error: {source}"))]
    WarehouseStorage { source: StorageError },
}

impl WarehouseError {
    /// Check if this error means the table does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WarehouseError::TableNotFound { .. })
    }
}

/// A table partition unit other than hour, day, month or year.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub), display("unknown partition unit '{unit}'"))]
pub struct UnknownPartitionUnit {
    unit: String,
}

impl UnknownPartitionUnit {
    /// The rejected unit name.
    pub fn unit(&self) -> &str {
        &self.unit
    }
}

// ============ Policy Errors ============

/// Errors returned by a [`PolicyEvaluator`](crate::policy::PolicyEvaluator).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PolicyError {
    /// No rule is registered for the query path.
    #[snafu(display("No policy found for query '{path}'"))]
    QueryNotFound { path: String },

    /// The policy failed while evaluating the input.
    #[snafu(display("Policy '{path}' evaluation failed: {message}"))]
    Evaluation { path: String, message: String },

    /// The policy output did not match the expected shape.
    #[snafu(display("Policy '{path}' returned malformed output: {source}"))]
    Decode {
        path: String,
        source: serde_json::Error,
    },
}

// ============ Queue Errors ============

/// Errors returned by a [`MessageQueue`](crate::queue::MessageQueue).
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// The queue rejected the message.
    #[snafu(display("Failed to publish message: {message}"))]
    Publish { message: String },

    /// Failed to write a dumped message.
    #[snafu(display("Failed to dump message: {source}"))]
    Dump { source: StorageError },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to parse metrics address.
    #[snafu(display("Failed to parse metrics address: {source}"))]
    AddressParse { source: std::net::AddrParseError },

    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}
