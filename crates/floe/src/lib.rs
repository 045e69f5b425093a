//! floe: Load log objects from object storage into an analytical warehouse.
//!
//! This crate handles:
//! - Importing source objects concurrently (download, decompress, decode)
//! - Transforming every raw record through a policy into structured logs
//! - Building validated records with deterministic IDs
//! - Evolving destination table schemas additively
//! - Inserting records in bounded chunks and auditing each run
//! - Packing object URLs into queue messages for downstream loads

pub mod cli;
pub mod clients;
pub mod config;
pub mod enqueue;
pub mod error;
pub mod ingest;
pub mod load;
pub mod model;
pub mod pipeline;
pub mod policy;
pub mod record;
pub mod runlog;
pub mod schema;
pub mod source;

// Re-export commonly used items
pub use cli::{CliArgs, Command};
pub use clients::Clients;
pub use config::Config;
pub use enqueue::{EnqueueSummary, Enqueuer};
pub use error::{EnqueueError, LoadError};
pub use load::{LoadOutcome, Loader};
pub use model::{Compression, Destination, LoadRequest, ParserKind, RecordSet, Source};
pub use pipeline::{ImportOutcome, ImportScheduler, SourceImporter};
pub use policy::{MappingPolicy, MappingPolicyConfig};
pub use runlog::AuditTable;

// Re-export from floe-core
pub use floe_core::{MB, MetricsConfig, StorageConfig, init_tracing};
