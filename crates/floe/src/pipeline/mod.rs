//! Concurrent import of load requests.

pub mod importer;
pub mod scheduler;

pub use importer::SourceImporter;
pub use scheduler::{DEFAULT_CONCURRENCY, ImportOutcome, ImportScheduler};
