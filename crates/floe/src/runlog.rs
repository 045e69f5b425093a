//! Run Logger: the Load Log lifecycle and its audit table.

use arrow_schema::{DataType, Field, Fields, Schema, SchemaRef, TimeUnit};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use floe_core::emit;
use floe_core::metrics::events::{AuditWriteFailed, LoadCompleted, Outcome};
use floe_core::WarehouseError;
use floe_core::warehouse::{TableMetadata, WarehouseRef};

use crate::error::LoadError;
use crate::model::LoadLog;

/// Table the Load Logs are written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditTable {
    pub dataset: String,
    pub table: String,
}

fn timestamp() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
}

fn list_of(fields: Vec<Field>) -> DataType {
    DataType::List(Arc::new(Field::new(
        "item",
        DataType::Struct(Fields::from(fields)),
        true,
    )))
}

/// Schema of the audit table.
pub fn audit_schema() -> Schema {
    let source = vec![
        Field::new("bucket", DataType::Utf8, false),
        Field::new("object", DataType::Utf8, false),
        Field::new(
            "source",
            DataType::Struct(Fields::from(vec![
                Field::new("parser", DataType::Utf8, false),
                Field::new("schema", DataType::Utf8, false),
                Field::new("compress", DataType::Utf8, false),
            ])),
            false,
        ),
        Field::new("row_count", DataType::Int64, false),
        Field::new("success", DataType::Boolean, false),
        Field::new("error", DataType::Utf8, true),
        Field::new("started_at", timestamp(), false),
        Field::new("finished_at", timestamp(), false),
    ];
    let ingest = vec![
        Field::new("ingest_id", DataType::Utf8, false),
        Field::new("dataset", DataType::Utf8, false),
        Field::new("table", DataType::Utf8, false),
        Field::new("record_count", DataType::Int64, false),
        Field::new("table_schema", DataType::Utf8, false),
        Field::new("success", DataType::Boolean, false),
        Field::new("error", DataType::Utf8, true),
        Field::new("started_at", timestamp(), false),
        Field::new("finished_at", timestamp(), false),
    ];

    Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("sources", list_of(source), true),
        Field::new("ingests", list_of(ingest), true),
        Field::new("success", DataType::Boolean, false),
        Field::new("error", DataType::Utf8, true),
        Field::new("started_at", timestamp(), false),
        Field::new("finished_at", timestamp(), false),
    ])
}

/// Allocates Load Logs and persists them when runs finish.
pub struct RunLogger {
    warehouse: WarehouseRef,
    audit: Option<AuditTable>,
}

impl RunLogger {
    pub fn new(warehouse: WarehouseRef, audit: Option<AuditTable>) -> Self {
        Self { warehouse, audit }
    }

    /// Open a Load Log for a new run.
    pub fn start(&self) -> LoadLog {
        let now = Utc::now();
        LoadLog {
            id: Uuid::new_v4().to_string(),
            sources: Vec::new(),
            ingests: Vec::new(),
            success: false,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    /// Close the Load Log with the run's result and write it to the audit table.
    ///
    /// Audit failures are logged; they never change the run's result.
    pub async fn finish(&self, log: &mut LoadLog, result: &Result<(), LoadError>) {
        log.finished_at = Utc::now();
        log.success = result.is_ok();
        log.error = result.as_ref().err().map(ToString::to_string);

        let duration = (log.finished_at - log.started_at).to_std().unwrap_or_default();
        emit!(LoadCompleted {
            outcome: Outcome::from_result(result),
            duration,
        });
        info!(
            run_id = %log.id,
            success = log.success,
            sources = log.sources.len(),
            ingests = log.ingests.len(),
            error = log.error.as_deref().unwrap_or(""),
            elapsed_ms = duration.as_millis() as u64,
            "Load finished"
        );

        if let Some(audit) = &self.audit
            && let Err(e) = self.write(audit, log).await
        {
            let table = format!("{}.{}", audit.dataset, audit.table);
            error!(
                run_id = %log.id,
                table = %table,
                error = %e,
                "Failed to write load log"
            );
            emit!(AuditWriteFailed);
        }
    }

    async fn write(&self, audit: &AuditTable, log: &LoadLog) -> Result<(), WarehouseError> {
        let schema = self.setup_table(audit).await?;
        let row = serde_json::to_value(log)
            .map_err(|source| WarehouseError::Serialize { source })?;
        self.warehouse
            .insert(&audit.dataset, &audit.table, &schema, vec![row])
            .await
    }

    /// Fetch the audit table schema, creating the table when missing.
    async fn setup_table(&self, audit: &AuditTable) -> Result<SchemaRef, WarehouseError> {
        match self.warehouse.get_metadata(&audit.dataset, &audit.table).await {
            Ok(metadata) => Ok(metadata.schema),
            Err(e) if e.is_not_found() => {
                let schema = Arc::new(audit_schema());
                let metadata = TableMetadata::new(Arc::clone(&schema));
                match self
                    .warehouse
                    .create_table(&audit.dataset, &audit.table, &metadata)
                    .await
                {
                    Ok(()) | Err(WarehouseError::TableExists { .. }) => Ok(schema),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ImportFailures;
    use floe_core::MemoryWarehouse;

    fn audit() -> AuditTable {
        AuditTable {
            dataset: "floe".into(),
            table: "load_logs".into(),
        }
    }

    #[tokio::test]
    async fn test_run_ids_are_unique_v4() {
        let logger = RunLogger::new(Arc::new(MemoryWarehouse::new()), None);
        let a = logger.start();
        let b = logger.start();
        assert_ne!(a.id, b.id);
        assert_eq!(Uuid::parse_str(&a.id).unwrap().get_version_num(), 4);
    }

    #[tokio::test]
    async fn test_finish_writes_audit_row_and_creates_table() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let logger = RunLogger::new(warehouse.clone(), Some(audit()));

        let mut log = logger.start();
        logger.finish(&mut log, &Ok(())).await;

        assert!(log.success);
        assert!(log.finished_at >= log.started_at);
        let table = warehouse.table("floe", "load_logs").unwrap();
        assert_eq!(table.schema.as_ref(), &audit_schema());
        let inserts = warehouse.inserts_into("floe", "load_logs");
        assert_eq!(inserts.len(), 1);
        assert_eq!(inserts[0].rows[0]["id"], log.id.as_str());
        assert_eq!(inserts[0].rows[0]["success"], true);
    }

    #[tokio::test]
    async fn test_failed_run_records_error() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let logger = RunLogger::new(warehouse.clone(), Some(audit()));

        let mut log = logger.start();
        let result = Err(LoadError::Import {
            source: ImportFailures { errors: Vec::new() },
        });
        logger.finish(&mut log, &result).await;

        assert!(!log.success);
        assert!(log.error.as_deref().unwrap().starts_with("Import failed"));
        let row = &warehouse.inserts_into("floe", "load_logs")[0].rows[0];
        assert_eq!(row["success"], false);
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_panic_or_change_result() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        warehouse.fail_metadata("floe", "load_logs", "down");
        let logger = RunLogger::new(warehouse.clone(), Some(audit()));

        let mut log = logger.start();
        logger.finish(&mut log, &Ok(())).await;

        assert!(log.success);
        assert!(warehouse.inserts().is_empty());
    }

    #[tokio::test]
    async fn test_no_audit_table_configured() {
        let warehouse = Arc::new(MemoryWarehouse::new());
        let logger = RunLogger::new(warehouse.clone(), None);
        let mut log = logger.start();
        logger.finish(&mut log, &Ok(())).await;
        assert!(warehouse.inserts().is_empty());
    }
}
