//! In-process warehouse used by tests and dry runs.

use arrow_schema::SchemaRef;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::WarehouseError;

use super::{
    RowStream, TableMetadata, TableMetadataUpdate, Warehouse, parse_table_query,
};

/// One recorded [`Warehouse::insert`] call.
#[derive(Debug, Clone)]
pub struct InsertCall {
    pub dataset: String,
    pub table: String,
    pub schema: SchemaRef,
    pub rows: Vec<Value>,
}

#[derive(Debug)]
struct MemoryTable {
    metadata: TableMetadata,
    version: u64,
    rows: Vec<Value>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<(String, String), MemoryTable>,
    inserts: Vec<InsertCall>,
    /// Remaining successful inserts per table before inserts start failing.
    insert_budget: HashMap<(String, String), usize>,
    metadata_failures: HashMap<(String, String), String>,
}

/// Warehouse that keeps tables and insert calls in memory.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

fn key(dataset: &str, table: &str) -> (String, String) {
    (dataset.to_string(), table.to_string())
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All insert calls, in the order they were made.
    pub fn inserts(&self) -> Vec<InsertCall> {
        self.state().inserts.clone()
    }

    /// Insert calls made against one table.
    pub fn inserts_into(&self, dataset: &str, table: &str) -> Vec<InsertCall> {
        self.state()
            .inserts
            .iter()
            .filter(|c| c.dataset == dataset && c.table == table)
            .cloned()
            .collect()
    }

    /// Current metadata of a table, if it exists.
    pub fn table(&self, dataset: &str, table: &str) -> Option<TableMetadata> {
        self.state()
            .tables
            .get(&key(dataset, table))
            .map(|t| t.metadata.clone())
    }

    /// Let `successes` more inserts into the table succeed, then reject the rest.
    pub fn fail_inserts_after(&self, dataset: &str, table: &str, successes: usize) {
        self.state()
            .insert_budget
            .insert(key(dataset, table), successes);
    }

    /// Make metadata lookups for the table fail with a backend error.
    pub fn fail_metadata(&self, dataset: &str, table: &str, message: &str) {
        self.state()
            .metadata_failures
            .insert(key(dataset, table), message.to_string());
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn insert(
        &self,
        dataset: &str,
        table: &str,
        schema: &SchemaRef,
        rows: Vec<Value>,
    ) -> Result<(), WarehouseError> {
        let mut state = self.state();
        let k = key(dataset, table);

        if let Some(budget) = state.insert_budget.get_mut(&k) {
            if *budget == 0 {
                return Err(WarehouseError::Insert {
                    dataset: dataset.to_string(),
                    table: table.to_string(),
                    message: "insert rejected".to_string(),
                });
            }
            *budget -= 1;
        }

        let Some(stored) = state.tables.get_mut(&k) else {
            return Err(WarehouseError::TableNotFound {
                dataset: dataset.to_string(),
                table: table.to_string(),
            });
        };
        stored.rows.extend(rows.iter().cloned());

        state.inserts.push(InsertCall {
            dataset: dataset.to_string(),
            table: table.to_string(),
            schema: schema.clone(),
            rows,
        });
        Ok(())
    }

    async fn get_metadata(
        &self,
        dataset: &str,
        table: &str,
    ) -> Result<TableMetadata, WarehouseError> {
        let state = self.state();
        let k = key(dataset, table);

        if let Some(message) = state.metadata_failures.get(&k) {
            return Err(WarehouseError::Query {
                message: message.clone(),
            });
        }

        state
            .tables
            .get(&k)
            .map(|t| TableMetadata {
                etag: t.version.to_string(),
                ..t.metadata.clone()
            })
            .ok_or_else(|| WarehouseError::TableNotFound {
                dataset: dataset.to_string(),
                table: table.to_string(),
            })
    }

    async fn create_table(
        &self,
        dataset: &str,
        table: &str,
        metadata: &TableMetadata,
    ) -> Result<(), WarehouseError> {
        let mut state = self.state();
        let k = key(dataset, table);

        if state.tables.contains_key(&k) {
            return Err(WarehouseError::TableExists {
                dataset: dataset.to_string(),
                table: table.to_string(),
            });
        }

        state.tables.insert(
            k,
            MemoryTable {
                metadata: TableMetadata {
                    etag: "1".to_string(),
                    ..metadata.clone()
                },
                version: 1,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    async fn update_table(
        &self,
        dataset: &str,
        table: &str,
        update: &TableMetadataUpdate,
        etag: &str,
    ) -> Result<(), WarehouseError> {
        let mut state = self.state();
        let Some(stored) = state.tables.get_mut(&key(dataset, table)) else {
            return Err(WarehouseError::TableNotFound {
                dataset: dataset.to_string(),
                table: table.to_string(),
            });
        };

        let current = stored.version.to_string();
        if current != etag {
            return Err(WarehouseError::EtagMismatch {
                dataset: dataset.to_string(),
                table: table.to_string(),
                expected: etag.to_string(),
                actual: current,
            });
        }

        if let Some(schema) = &update.schema {
            stored.metadata.schema = schema.clone();
        }
        stored.version += 1;
        stored.metadata.etag = stored.version.to_string();
        Ok(())
    }

    async fn query(&self, query: &str) -> Result<RowStream, WarehouseError> {
        let (dataset, table) = parse_table_query(query)?;
        let rows = self
            .state()
            .tables
            .get(&key(dataset, table))
            .map(|t| t.rows.clone())
            .ok_or_else(|| WarehouseError::TableNotFound {
                dataset: dataset.to_string(),
                table: table.to_string(),
            })?;

        Ok(futures::stream::iter(rows.into_iter().map(Ok)).boxed())
    }
}
