//! Error types for the floe loader.

use snafu::prelude::*;
use std::fmt;

// Re-export capability errors
pub use floe_core::error::{ConfigError, PolicyError, QueueError, StorageError, WarehouseError};
pub use floe_core::warehouse::UnknownPartitionUnit;

/// Errors that can occur while reading and decoding a source object.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReaderError {
    /// Failed to download the object.
    #[snafu(display("Failed to open {object}: {source}"))]
    Open {
        object: String,
        source: StorageError,
    },

    /// The source descriptor names a compression kind we cannot decode.
    #[snafu(display("Unsupported compression '{kind}'"))]
    UnsupportedCompression { kind: String },

    /// The source descriptor names a parser we do not have.
    #[snafu(display("Unsupported parser '{kind}'"))]
    UnsupportedParser { kind: String },

    /// Decompression failed.
    #[snafu(display("Failed to decompress {object} as {codec}: {message}"))]
    Decompress {
        object: String,
        codec: &'static str,
        message: String,
    },

    /// A JSON value in the stream could not be decoded.
    #[snafu(display("Failed to decode JSON in {object} after {decoded} values: {source}"))]
    JsonDecode {
        object: String,
        decoded: usize,
        source: serde_json::Error,
    },
}

/// A Structured Log emitted by the policy was rejected.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ValidationError {
    /// Dataset identifier is empty or contains invalid characters.
    #[snafu(display("Invalid dataset name '{dataset}'"))]
    InvalidDataset { dataset: String },

    /// Table identifier is empty or contains invalid characters.
    #[snafu(display("Invalid table name '{table}'"))]
    InvalidTable { table: String },

    /// Timestamp is NaN or infinite.
    #[snafu(display("Timestamp {value} is not a finite number"))]
    NonFiniteTimestamp { value: f64 },

    /// Timestamp cannot be represented.
    #[snafu(display("Timestamp {value} is out of range"))]
    TimestampOutOfRange { value: f64 },

    /// The data payload is not a JSON object.
    #[snafu(display("Log data must be a JSON object, got {kind}"))]
    DataNotObject { kind: &'static str },
}

/// Failure of one source during import.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ImportError {
    /// Reading or decoding the object failed.
    #[snafu(display("{source}"))]
    Read { source: ReaderError },

    /// The policy could not transform a raw record.
    #[snafu(display("Policy failed on {object} row {row}: {source}"))]
    Transform {
        object: String,
        row: u64,
        source: PolicyError,
    },

    /// A Structured Log did not validate.
    #[snafu(display("Invalid log #{index} on {object} row {row}: {source}"))]
    Validation {
        object: String,
        row: u64,
        index: usize,
        source: ValidationError,
    },

    /// The worker processing this source panicked.
    #[snafu(display("Import of {object} panicked: {message}"))]
    WorkerPanicked { object: String, message: String },
}

/// Every failure of an import run.
///
/// Non-empty whenever it is returned; each entry corresponds to one failed
/// source.
#[derive(Debug)]
pub struct ImportFailures {
    pub errors: Vec<ImportError>,
}

impl fmt::Display for ImportFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} source(s) failed", self.errors.len())?;
        for (i, e) in self.errors.iter().enumerate() {
            write!(f, "{} {e}", if i == 0 { ":" } else { ";" })?;
        }
        Ok(())
    }
}

impl std::error::Error for ImportFailures {}

/// Errors that can occur while evolving a destination table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SchemaError {
    /// No schema could be inferred from the records.
    #[snafu(display("Failed to infer schema for {destination}: {source}"))]
    Inference {
        destination: String,
        source: arrow_schema::ArrowError,
    },

    /// The destination's partition unit is unknown.
    #[snafu(display("Invalid partition for {destination}: {source}"))]
    Partition {
        destination: String,
        source: UnknownPartitionUnit,
    },

    /// Fetching the table metadata failed.
    #[snafu(display("Failed to get metadata of {destination}: {source}"))]
    GetMetadata {
        destination: String,
        source: WarehouseError,
    },

    /// Creating the table failed.
    #[snafu(display("Failed to create table {destination}: {source}"))]
    CreateTable {
        destination: String,
        source: WarehouseError,
    },

    /// Updating the table schema failed.
    #[snafu(display("Failed to update schema of {destination}: {source}"))]
    UpdateTable {
        destination: String,
        source: WarehouseError,
    },

    /// The table kept changing under us.
    #[snafu(display("Gave up evolving {destination} after {attempts} concurrent modifications"))]
    Contended {
        destination: String,
        attempts: usize,
    },

    /// Failed to serialize a schema snapshot.
    #[snafu(display("Failed to serialize schema: {source}"))]
    SchemaJson { source: serde_json::Error },
}

/// Errors that can occur while ingesting one destination.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestError {
    /// Schema evolution failed before any insert.
    #[snafu(display("{source}"))]
    Evolve { source: SchemaError },

    /// A chunk insert failed; earlier chunks stay committed.
    #[snafu(display(
        "Failed to insert chunk {chunk} into {destination} ({inserted} rows already inserted): {source}"
    ))]
    InsertChunk {
        destination: String,
        chunk: usize,
        inserted: usize,
        source: WarehouseError,
    },
}

/// Errors returned by a load run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LoadError {
    /// One or more sources failed to import.
    #[snafu(display("Import failed: {source}"))]
    Import { source: ImportFailures },

    /// A destination failed to ingest.
    #[snafu(display("Ingest into {destination} failed: {source}"))]
    Ingest {
        destination: String,
        source: IngestError,
    },

    /// Object URL could not be parsed.
    #[snafu(display("{source}"))]
    ObjectUrl { source: StorageError },

    /// Object attributes could not be fetched.
    #[snafu(display("Failed to get attributes of {object}: {source}"))]
    ObjectAttrs {
        object: String,
        source: StorageError,
    },

    /// The policy could not turn the storage event into sources.
    #[snafu(display("Failed to convert event for {object} into sources: {source}"))]
    EventToSources {
        object: String,
        source: PolicyError,
    },
}

/// Errors returned by the enqueue path.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EnqueueError {
    /// Object URL could not be parsed.
    #[snafu(display("{source}"))]
    EnqueueUrl { source: StorageError },

    /// Listing a prefix failed.
    #[snafu(display("Failed to list {prefix}: {source}"))]
    ListPrefix {
        prefix: String,
        source: StorageError,
    },

    /// Fetching object attributes failed.
    #[snafu(display("Failed to get attributes of {object}: {source}"))]
    EnqueueAttrs {
        object: String,
        source: StorageError,
    },

    /// Failed to encode a message.
    #[snafu(display("Failed to encode message: {source}"))]
    EncodeMessage { source: serde_json::Error },

    /// The queue rejected a message.
    #[snafu(display("{source}"))]
    PublishMessage { source: QueueError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_failures_lists_every_error() {
        let failures = ImportFailures {
            errors: vec![
                ImportError::WorkerPanicked {
                    object: "memory://b/a".into(),
                    message: "boom".into(),
                },
                ImportError::Read {
                    source: ReaderError::UnsupportedCompression {
                        kind: "lz4".into(),
                    },
                },
            ],
        };

        assert_eq!(
            failures.to_string(),
            "2 source(s) failed: Import of memory://b/a panicked: boom; Unsupported compression 'lz4'"
        );
    }
}
