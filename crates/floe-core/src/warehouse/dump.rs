//! File-dumping warehouse.
//!
//! Writes each table as a directory under a base location:
//!
//! ```text
//! {base}/{dataset}/{table}/_table.json           schema, partitioning, version
//! {base}/{dataset}/{table}/rows-{ts}-{seq}.ndjson one file per insert call
//! ```
//!
//! Useful for local runs and for inspecting what a load would have written.

use arrow_schema::{Schema, SchemaRef};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snafu::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::{SerializeSnafu, WarehouseError, WarehouseStorageSnafu};
use crate::storage::{ObjectRef, ObjectStorageRef};

use super::{
    RowStream, TableMetadata, TableMetadataUpdate, TimePartitioning, Warehouse, parse_table_query,
};

const TABLE_FILE: &str = "_table.json";

#[derive(Debug, Serialize, Deserialize)]
struct StoredTable {
    schema: Schema,
    #[serde(default)]
    time_partitioning: Option<TimePartitioning>,
    version: u64,
}

/// Warehouse that writes NDJSON rows and table definitions to object storage.
pub struct DumpWarehouse {
    storage: ObjectStorageRef,
    base: ObjectRef,
    seq: AtomicU64,
}

impl std::fmt::Debug for DumpWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DumpWarehouse<{}>", self.base)
    }
}

impl DumpWarehouse {
    pub fn new(storage: ObjectStorageRef, base: ObjectRef) -> Self {
        Self {
            storage,
            base,
            seq: AtomicU64::new(0),
        }
    }

    fn table_dir(&self, dataset: &str, table: &str) -> String {
        let base = self.base.name().trim_end_matches('/');
        if base.is_empty() {
            format!("{dataset}/{table}")
        } else {
            format!("{base}/{dataset}/{table}")
        }
    }

    fn table_file(&self, dataset: &str, table: &str) -> ObjectRef {
        self.base
            .with_name(format!("{}/{TABLE_FILE}", self.table_dir(dataset, table)))
    }

    async fn read_table(&self, dataset: &str, table: &str) -> Result<StoredTable, WarehouseError> {
        match self.storage.open(&self.table_file(dataset, table)).await {
            Ok(bytes) => serde_json::from_slice(&bytes).context(SerializeSnafu),
            Err(e) if e.is_not_found() => Err(WarehouseError::TableNotFound {
                dataset: dataset.to_string(),
                table: table.to_string(),
            }),
            Err(source) => Err(WarehouseError::WarehouseStorage { source }),
        }
    }

    async fn write_table(
        &self,
        dataset: &str,
        table: &str,
        stored: &StoredTable,
    ) -> Result<(), WarehouseError> {
        let json = serde_json::to_vec_pretty(stored).context(SerializeSnafu)?;
        self.storage
            .put(&self.table_file(dataset, table), Bytes::from(json))
            .await
            .context(WarehouseStorageSnafu)
    }
}

#[async_trait]
impl Warehouse for DumpWarehouse {
    async fn insert(
        &self,
        dataset: &str,
        table: &str,
        _schema: &SchemaRef,
        rows: Vec<Value>,
    ) -> Result<(), WarehouseError> {
        // Rejects inserts into tables that were never created
        self.read_table(dataset, table).await?;

        let mut ndjson = Vec::new();
        for row in &rows {
            serde_json::to_writer(&mut ndjson, row).context(SerializeSnafu)?;
            ndjson.push(b'\n');
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let name = format!(
            "{}/rows-{}-{seq:06}.ndjson",
            self.table_dir(dataset, table),
            Utc::now().format("%Y%m%dT%H%M%S%.f")
        );
        let object = self.base.with_name(name);

        self.storage
            .put(&object, Bytes::from(ndjson))
            .await
            .context(WarehouseStorageSnafu)?;
        debug!("Dumped {} rows to {}", rows.len(), object);
        Ok(())
    }

    async fn get_metadata(
        &self,
        dataset: &str,
        table: &str,
    ) -> Result<TableMetadata, WarehouseError> {
        let stored = self.read_table(dataset, table).await?;
        Ok(TableMetadata {
            schema: Arc::new(stored.schema),
            time_partitioning: stored.time_partitioning,
            etag: stored.version.to_string(),
        })
    }

    async fn create_table(
        &self,
        dataset: &str,
        table: &str,
        metadata: &TableMetadata,
    ) -> Result<(), WarehouseError> {
        match self.read_table(dataset, table).await {
            Ok(_) => {
                return Err(WarehouseError::TableExists {
                    dataset: dataset.to_string(),
                    table: table.to_string(),
                });
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let stored = StoredTable {
            schema: metadata.schema.as_ref().clone(),
            time_partitioning: metadata.time_partitioning.clone(),
            version: 1,
        };
        self.write_table(dataset, table, &stored).await
    }

    async fn update_table(
        &self,
        dataset: &str,
        table: &str,
        update: &TableMetadataUpdate,
        etag: &str,
    ) -> Result<(), WarehouseError> {
        let mut stored = self.read_table(dataset, table).await?;
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
            stored.schema = schema.as_ref().clone();
        }
        stored.version += 1;
        self.write_table(dataset, table, &stored).await
    }

    async fn query(&self, query: &str) -> Result<RowStream, WarehouseError> {
        let (dataset, table) = parse_table_query(query)?;
        self.read_table(dataset, table).await?;

        let dir = self.base.with_name(self.table_dir(dataset, table));
        let files = self
            .storage
            .list(&dir)
            .await
            .context(WarehouseStorageSnafu)?;

        let mut rows = Vec::new();
        for file in files {
            let is_rows = file
                .object
                .name()
                .rsplit('/')
                .next()
                .is_some_and(|n| n.starts_with("rows-"));
            if !is_rows {
                continue;
            }

            let bytes = self
                .storage
                .open(&file.object)
                .await
                .context(WarehouseStorageSnafu)?;
            for line in bytes.split(|b| *b == b'\n').filter(|l| !l.is_empty()) {
                rows.push(serde_json::from_slice(line).context(SerializeSnafu));
            }
        }

        Ok(futures::stream::iter(rows).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePool;
    use arrow_schema::{DataType, Field};
    use futures::TryStreamExt;
    use serde_json::json;

    fn warehouse() -> DumpWarehouse {
        let storage: ObjectStorageRef = Arc::new(StoragePool::default());
        DumpWarehouse::new(storage, ObjectRef::parse("memory://dump/out").unwrap())
    }

    fn schema(fields: &[&str]) -> SchemaRef {
        Arc::new(Schema::new(
            fields
                .iter()
                .map(|f| Field::new(*f, DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ))
    }

    #[tokio::test]
    async fn test_table_lifecycle() {
        let wh = warehouse();
        assert!(wh.get_metadata("ds", "t").await.unwrap_err().is_not_found());

        wh.create_table("ds", "t", &TableMetadata::new(schema(&["a"])))
            .await
            .unwrap();
        let md = wh.get_metadata("ds", "t").await.unwrap();
        assert_eq!(md.etag, "1");

        let update = TableMetadataUpdate {
            schema: Some(schema(&["a", "b"])),
        };
        wh.update_table("ds", "t", &update, &md.etag).await.unwrap();
        let md = wh.get_metadata("ds", "t").await.unwrap();
        assert_eq!(md.schema.fields().len(), 2);
        assert_eq!(md.etag, "2");
    }

    #[tokio::test]
    async fn test_insert_and_query_rows() {
        let wh = warehouse();
        wh.create_table("ds", "t", &TableMetadata::new(schema(&["a"])))
            .await
            .unwrap();
        wh.insert("ds", "t", &schema(&["a"]), vec![json!({"a": "1"})])
            .await
            .unwrap();
        wh.insert("ds", "t", &schema(&["a"]), vec![json!({"a": "2"})])
            .await
            .unwrap();

        let rows: Vec<Value> = wh.query("ds.t").await.unwrap().try_collect().await.unwrap();
        assert_eq!(rows, vec![json!({"a": "1"}), json!({"a": "2"})]);
    }

    #[tokio::test]
    async fn test_create_twice_fails() {
        let wh = warehouse();
        let md = TableMetadata::new(schema(&["a"]));
        wh.create_table("ds", "t", &md).await.unwrap();
        assert!(matches!(
            wh.create_table("ds", "t", &md).await,
            Err(WarehouseError::TableExists { .. })
        ));
    }
}
