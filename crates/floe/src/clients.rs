//! Capability clients built from configuration.

use std::sync::Arc;

use floe_core::error::{ConfigError, StorageError};
use floe_core::{
    DumpQueue, DumpWarehouse, MemoryQueue, MemoryWarehouse, MessageQueueRef, ObjectStorageRef,
    PolicyEvaluatorRef, StoragePool, WarehouseRef,
};

use crate::config::{Config, QueueConfig, WarehouseConfig, location};
use crate::policy::MappingPolicy;

/// The external collaborators one run talks to.
#[derive(Clone)]
pub struct Clients {
    pub storage: ObjectStorageRef,
    pub warehouse: WarehouseRef,
    pub policy: PolicyEvaluatorRef,
    pub queue: MessageQueueRef,
}

impl Clients {
    /// Build every client named by the configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let storage: ObjectStorageRef = Arc::new(StoragePool::new(config.storage.clone()));

        let warehouse: WarehouseRef = match &config.warehouse {
            WarehouseConfig::Memory => Arc::new(MemoryWarehouse::new()),
            WarehouseConfig::Dump { path } => {
                let base = location(path).map_err(|e| invalid("warehouse.path", e))?;
                Arc::new(DumpWarehouse::new(storage.clone(), base))
            }
        };

        let queue: MessageQueueRef = match &config.queue {
            QueueConfig::Memory => Arc::new(MemoryQueue::new()),
            QueueConfig::Dump { path } => {
                let dir = location(path).map_err(|e| invalid("queue.path", e))?;
                Arc::new(DumpQueue::new(storage.clone(), dir))
            }
        };

        Ok(Self {
            storage,
            warehouse,
            policy: Arc::new(MappingPolicy::new(config.policy.clone())),
            queue,
        })
    }
}

fn invalid(key: &str, e: StorageError) -> ConfigError {
    ConfigError::Invalid {
        message: format!("{key}: {e}"),
    }
}
