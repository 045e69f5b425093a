//! floe-core: Shared capabilities for the floe loader.
//!
//! - `storage/` - Object storage access over `object_store` (GCS, S3, local, in-memory)
//! - `warehouse/` - Analytical warehouse capability with in-memory and file-dumping backends
//! - `policy/` - Policy evaluation capability
//! - `queue/` - Message queue capability
//! - `metrics/` - Prometheus metrics and internal events
//! - `config/` - YAML loading with environment variable interpolation
//! - `error` - Error types for every capability

pub mod config;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod queue;
pub mod storage;
pub mod tracing;
pub mod warehouse;

// Re-export commonly used items
pub use config::{KB, MB, MetricsConfig, StorageConfig};
pub use error::{ConfigError, MetricsError, PolicyError, QueueError, StorageError, WarehouseError};
pub use policy::{MemoryPolicy, PolicyEvaluator, PolicyEvaluatorExt, PolicyEvaluatorRef};
pub use queue::{DumpQueue, MemoryQueue, MessageId, MessageQueue, MessageQueueRef};
pub use storage::{ObjectAttrs, ObjectRef, ObjectStorage, ObjectStorageRef, Scheme, StoragePool};
pub use tracing::init_tracing;
pub use warehouse::{
    DumpWarehouse, MemoryWarehouse, PartitionUnit, TableMetadata, TableMetadataUpdate,
    TimePartitioning, Warehouse, WarehouseRef,
};
