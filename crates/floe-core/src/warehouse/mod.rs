//! Analytical warehouse capability.
//!
//! Table schemas are Arrow schemas; rows are JSON objects shaped like the
//! schema. Backends implement [`Warehouse`]; [`MemoryWarehouse`] keeps
//! everything in process and [`DumpWarehouse`] writes NDJSON files through
//! object storage.

mod dump;
mod memory;

pub use dump::DumpWarehouse;
pub use memory::{InsertCall, MemoryWarehouse};

use arrow_schema::SchemaRef;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use crate::error::UnknownPartitionUnit;
use crate::error::{UnknownPartitionUnitSnafu, WarehouseError};

/// Time bucketing granularity of a partitioned table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionUnit {
    Hour,
    Day,
    Month,
    Year,
}

impl PartitionUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionUnit::Hour => "hour",
            PartitionUnit::Day => "day",
            PartitionUnit::Month => "month",
            PartitionUnit::Year => "year",
        }
    }
}

impl fmt::Display for PartitionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartitionUnit {
    type Err = UnknownPartitionUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hour" => Ok(PartitionUnit::Hour),
            "day" => Ok(PartitionUnit::Day),
            "month" => Ok(PartitionUnit::Month),
            "year" => Ok(PartitionUnit::Year),
            other => UnknownPartitionUnitSnafu { unit: other }.fail(),
        }
    }
}

/// Time partitioning on a timestamp column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePartitioning {
    pub field: String,
    pub unit: PartitionUnit,
}

/// Table definition as stored by the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMetadata {
    pub schema: SchemaRef,
    pub time_partitioning: Option<TimePartitioning>,
    /// Version tag for optimistic concurrency; assigned by the backend.
    pub etag: String,
}

impl TableMetadata {
    pub fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            time_partitioning: None,
            etag: String::new(),
        }
    }
}

/// Changes applied by [`Warehouse::update_table`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableMetadataUpdate {
    pub schema: Option<SchemaRef>,
}

/// Rows returned by [`Warehouse::query`].
pub type RowStream = BoxStream<'static, Result<Value, WarehouseError>>;

/// A reference-counted warehouse handle.
pub type WarehouseRef = Arc<dyn Warehouse>;

/// Destination of structured records.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Append rows to a table.
    async fn insert(
        &self,
        dataset: &str,
        table: &str,
        schema: &SchemaRef,
        rows: Vec<Value>,
    ) -> Result<(), WarehouseError>;

    /// Fetch table metadata; fails with [`WarehouseError::TableNotFound`] if absent.
    async fn get_metadata(&self, dataset: &str, table: &str)
    -> Result<TableMetadata, WarehouseError>;

    /// Create a table.
    async fn create_table(
        &self,
        dataset: &str,
        table: &str,
        metadata: &TableMetadata,
    ) -> Result<(), WarehouseError>;

    /// Apply an update if the table is still at `etag`.
    async fn update_table(
        &self,
        dataset: &str,
        table: &str,
        update: &TableMetadataUpdate,
        etag: &str,
    ) -> Result<(), WarehouseError>;

    /// Run a query and stream its rows.
    async fn query(&self, query: &str) -> Result<RowStream, WarehouseError>;
}

/// Split a `dataset.table` reference, the query form understood by the
/// in-process backends.
pub(crate) fn parse_table_query(query: &str) -> Result<(&str, &str), WarehouseError> {
    query
        .trim()
        .split_once('.')
        .filter(|(d, t)| !d.is_empty() && !t.is_empty() && !t.contains('.'))
        .ok_or_else(|| WarehouseError::Query {
            message: format!("expected 'dataset.table', got '{query}'"),
        })
}
