//! Schema Manager: infers, merges and applies destination table schemas.

pub mod evolution;
pub mod inference;

pub use evolution::{SchemaMerge, merge_schemas};
pub use inference::{TIMESTAMP_FIELD, envelope_schema, infer_table_schema, sort_fields};

use arrow_schema::{Schema, SchemaRef};
use snafu::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

use floe_core::emit;
use floe_core::metrics::events::{SchemaChange, TableSchemaChanged};
use floe_core::WarehouseError;
use floe_core::warehouse::{
    PartitionUnit, TableMetadata, TableMetadataUpdate, TimePartitioning, WarehouseRef,
};

use crate::error::{
    ContendedSnafu, CreateTableSnafu, GetMetadataSnafu, InferenceSnafu, PartitionSnafu, SchemaError,
    SchemaJsonSnafu, UpdateTableSnafu,
};
use crate::model::{Destination, LogRecord};

/// Attempts before giving up on a table that keeps changing concurrently.
const MAX_ATTEMPTS: usize = 3;

/// Serialize a schema as deterministic JSON.
pub fn schema_json(schema: &Schema) -> Result<String, SchemaError> {
    serde_json::to_string(schema).context(SchemaJsonSnafu)
}

/// Time partitioning requested by a destination, if any.
pub fn time_partitioning(
    destination: &Destination,
) -> Result<Option<TimePartitioning>, SchemaError> {
    destination
        .partition
        .as_deref()
        .map(|unit| {
            let unit: PartitionUnit = unit.parse().context(PartitionSnafu {
                destination: destination.to_string(),
            })?;
            Ok(TimePartitioning {
                field: TIMESTAMP_FIELD.to_string(),
                unit,
            })
        })
        .transpose()
}

/// Creates destination tables and evolves their schemas additively.
pub struct SchemaManager {
    warehouse: WarehouseRef,
}

impl SchemaManager {
    pub fn new(warehouse: WarehouseRef) -> Self {
        Self { warehouse }
    }

    /// Make the table of `destination` able to hold `records`.
    ///
    /// Returns the schema the table has afterwards.
    pub async fn evolve(
        &self,
        destination: &Destination,
        records: &[LogRecord],
    ) -> Result<SchemaRef, SchemaError> {
        let target = destination.to_string();
        let partitioning = time_partitioning(destination)?;
        let inferred = Arc::new(
            infer_table_schema(records).context(InferenceSnafu {
                destination: &target,
            })?,
        );
        let Destination { dataset, table, .. } = destination;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.warehouse.get_metadata(dataset, table).await {
                Ok(metadata) => {
                    let merge = merge_schemas(&metadata.schema, &inferred);
                    if !merge.conflicts.is_empty() {
                        warn!(
                            target = %target,
                            fields = ?merge.conflicts,
                            "Keeping existing column types that differ from inferred types"
                        );
                    }
                    if merge.is_unchanged() {
                        debug!(target = %target, "Table schema already up to date");
                        return Ok(metadata.schema);
                    }

                    let schema = Arc::new(merge.schema);
                    let update = TableMetadataUpdate {
                        schema: Some(Arc::clone(&schema)),
                    };
                    match self
                        .warehouse
                        .update_table(dataset, table, &update, &metadata.etag)
                        .await
                    {
                        Ok(()) => {
                            info!(
                                target = %target,
                                new_fields = merge.added.len(),
                                field_names = ?merge.added,
                                "Schema evolution: adding new fields"
                            );
                            emit!(TableSchemaChanged {
                                change: SchemaChange::Updated,
                                target,
                            });
                            return Ok(schema);
                        }
                        Err(WarehouseError::EtagMismatch { .. }) => {
                            warn!(target = %target, attempt, "Table changed during update, retrying");
                        }
                        Err(source) => {
                            return Err(source).context(UpdateTableSnafu {
                                destination: target,
                            });
                        }
                    }
                }
                Err(e) if e.is_not_found() => {
                    let metadata = TableMetadata {
                        schema: Arc::clone(&inferred),
                        time_partitioning: partitioning.clone(),
                        etag: String::new(),
                    };
                    match self.warehouse.create_table(dataset, table, &metadata).await {
                        Ok(()) => {
                            info!(
                                target = %target,
                                partition = ?partitioning.as_ref().map(|p| p.unit),
                                "Created table"
                            );
                            emit!(TableSchemaChanged {
                                change: SchemaChange::Created,
                                target,
                            });
                            return Ok(inferred);
                        }
                        Err(WarehouseError::TableExists { .. }) => {
                            warn!(target = %target, attempt, "Table created concurrently, retrying");
                        }
                        Err(source) => {
                            return Err(source).context(CreateTableSnafu {
                                destination: target,
                            });
                        }
                    }
                }
                Err(source) => {
                    return Err(source).context(GetMetadataSnafu {
                        destination: target,
                    });
                }
            }
        }

        ContendedSnafu {
            destination: target,
            attempts: MAX_ATTEMPTS,
        }
        .fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_schema::{DataType, Fields};
    use chrono::Utc;
    use floe_core::MemoryWarehouse;
    use floe_core::warehouse::Warehouse;
    use serde_json::{Value, json};

    fn records(values: Vec<Value>) -> Vec<LogRecord> {
        values
            .into_iter()
            .map(|v| LogRecord {
                id: "x".into(),
                timestamp: Utc::now(),
                ingested_at: Utc::now(),
                ingest_id: String::new(),
                data: v.as_object().cloned().unwrap(),
            })
            .collect()
    }

    fn data_fields(schema: &Schema) -> Fields {
        match schema.field_with_name("data").unwrap().data_type() {
            DataType::Struct(fields) => fields.clone(),
            other => panic!("unexpected data type {other}"),
        }
    }

    #[tokio::test]
    async fn test_creates_missing_table_with_partitioning() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let manager = SchemaManager::new(warehouse.clone());
        let destination = Destination::new("logs", "events").with_partition("day");

        let schema = manager
            .evolve(&destination, &records(vec![json!({"a": 1})]))
            .await
            .unwrap();

        let metadata = warehouse.get_metadata("logs", "events").await.unwrap();
        assert_eq!(metadata.schema, schema);
        let partitioning = metadata.time_partitioning.unwrap();
        assert_eq!(partitioning.field, "timestamp");
        assert_eq!(partitioning.unit, PartitionUnit::Day);
    }

    #[tokio::test]
    async fn test_unknown_partition_unit_fails_before_any_call() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let manager = SchemaManager::new(warehouse.clone());
        let destination = Destination::new("logs", "events").with_partition("week");

        let err = manager
            .evolve(&destination, &records(vec![json!({"a": 1})]))
            .await
            .unwrap_err();

        assert!(matches!(err, SchemaError::Partition { .. }));
        assert!(warehouse.get_metadata("logs", "events").await.is_err());
    }

    #[tokio::test]
    async fn test_evolution_only_appends() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let manager = SchemaManager::new(warehouse.clone());
        let destination = Destination::new("logs", "events");

        let first = manager
            .evolve(&destination, &records(vec![json!({"a": 1, "b": {"x": "s"}})]))
            .await
            .unwrap();
        let etag = warehouse.get_metadata("logs", "events").await.unwrap().etag;

        // "a" now looks like a string and "b.x" is missing; neither may change.
        let second = manager
            .evolve(&destination, &records(vec![json!({"a": "str", "b": {"y": true}, "c": 1.5})]))
            .await
            .unwrap();

        let before = data_fields(&first);
        let after = data_fields(&second);
        for (i, field) in before.iter().enumerate() {
            assert_eq!(after[i].name(), field.name());
        }
        assert_eq!(after[0].data_type(), &DataType::Int64);
        let names: Vec<_> = after.iter().map(|f| f.name().as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        let DataType::Struct(b) = after[1].data_type() else {
            panic!("b should be a struct");
        };
        let b_names: Vec<_> = b.iter().map(|f| f.name().as_str()).collect();
        assert_eq!(b_names, vec!["x", "y"]);

        let metadata = warehouse.get_metadata("logs", "events").await.unwrap();
        assert_ne!(metadata.etag, etag);
        assert_eq!(metadata.schema, second);
    }

    #[tokio::test]
    async fn test_no_update_when_nothing_is_new() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let manager = SchemaManager::new(warehouse.clone());
        let destination = Destination::new("logs", "events");

        manager
            .evolve(&destination, &records(vec![json!({"a": 1, "b": 2})]))
            .await
            .unwrap();
        let etag = warehouse.get_metadata("logs", "events").await.unwrap().etag;

        manager
            .evolve(&destination, &records(vec![json!({"a": 1})]))
            .await
            .unwrap();
        assert_eq!(warehouse.get_metadata("logs", "events").await.unwrap().etag, etag);
    }

    #[tokio::test]
    async fn test_metadata_failure_is_reported() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        warehouse.fail_metadata("logs", "events", "backend down");
        let manager = SchemaManager::new(warehouse);

        let err = manager
            .evolve(&Destination::new("logs", "events"), &records(vec![json!({})]))
            .await
            .unwrap_err();
        assert!(matches!(err, SchemaError::GetMetadata { .. }));
    }

    #[test]
    fn test_schema_json_is_stable() {
        let a = infer_table_schema(&records(vec![json!({"b": 1, "a": 2})])).unwrap();
        let b = infer_table_schema(&records(vec![json!({"a": 2, "b": 1})])).unwrap();
        assert_eq!(schema_json(&a).unwrap(), schema_json(&b).unwrap());
    }
}
