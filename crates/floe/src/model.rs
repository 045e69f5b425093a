//! Domain types flowing through a load run.

use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

use floe_core::storage::ObjectRef;

/// Compression of a source object.
///
/// Unknown names are kept so the importer can reject them per source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
    Unsupported(String),
}

impl From<String> for Compression {
    fn from(s: String) -> Self {
        match s.as_str() {
            "" | "none" => Compression::None,
            "gzip" => Compression::Gzip,
            "zstd" => Compression::Zstd,
            _ => Compression::Unsupported(s),
        }
    }
}

impl From<Compression> for String {
    fn from(c: Compression) -> Self {
        match c {
            Compression::None => "none".to_string(),
            Compression::Gzip => "gzip".to_string(),
            Compression::Zstd => "zstd".to_string(),
            Compression::Unsupported(s) => s,
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Compression::from(s.to_string()))
    }
}

/// Format of a source object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ParserKind {
    /// Concatenated or newline separated JSON values.
    #[default]
    Json,
    Unsupported(String),
}

impl From<String> for ParserKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "" | "json" => ParserKind::Json,
            _ => ParserKind::Unsupported(s),
        }
    }
}

impl From<ParserKind> for String {
    fn from(p: ParserKind) -> Self {
        match p {
            ParserKind::Json => "json".to_string(),
            ParserKind::Unsupported(s) => s,
        }
    }
}

impl std::str::FromStr for ParserKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ParserKind::from(s.to_string()))
    }
}

/// How to interpret one raw object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    #[serde(default)]
    pub parser: ParserKind,
    /// Schema name; selects the policy query `schema.<name>`.
    pub schema: String,
    #[serde(default)]
    pub compress: Compression,
}

impl Source {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            parser: ParserKind::Json,
            schema: schema.into(),
            compress: Compression::None,
        }
    }

    pub fn with_compression(mut self, compress: Compression) -> Self {
        self.compress = compress;
        self
    }

    /// Policy query path transforming raw records of this source.
    pub fn query_path(&self) -> String {
        format!("schema.{}", self.schema)
    }
}

/// One object to load and how to read it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadRequest {
    pub object: ObjectRef,
    pub source: Source,
}

impl LoadRequest {
    pub fn new(object: ObjectRef, source: Source) -> Self {
        Self { object, source }
    }
}

/// Warehouse table a record is loaded into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub dataset: String,
    pub table: String,
    /// Time partition unit name, checked when the table is created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

impl Destination {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
            partition: None,
        }
    }

    pub fn with_partition(mut self, unit: impl Into<String>) -> Self {
        self.partition = Some(unit.into());
        self
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// One row emitted by the policy for a raw record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredLog {
    /// Policy-assigned ID; missing, null or empty means derive one.
    #[serde(default)]
    pub id: Option<String>,
    /// Unix epoch seconds.
    pub timestamp: f64,
    pub data: Value,
    #[serde(flatten)]
    pub destination: Destination,
    #[serde(default)]
    pub schema: String,
}

/// Output of a `schema.<name>` policy query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyOutput {
    #[serde(default)]
    pub logs: Vec<StructuredLog>,
}

/// Output of the `event` policy query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventOutput {
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// A validated record ready for the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    /// Empty until the record is stamped by an ingest.
    pub ingest_id: String,
    pub data: Map<String, Value>,
}

impl LogRecord {
    /// Render the record as a warehouse row.
    pub fn to_row(&self) -> Value {
        json!({
            "id": self.id,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            "ingested_at": self.ingested_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            "ingest_id": self.ingest_id,
            "data": self.data,
        })
    }
}

/// Records grouped by destination, in first-seen destination order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSet {
    records: IndexMap<Destination, Vec<LogRecord>>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, destination: Destination, record: LogRecord) {
        self.records.entry(destination).or_default().push(record);
    }

    /// Append every destination of `other`, keeping its record order.
    pub fn merge(&mut self, other: RecordSet) {
        for (destination, records) in other.records {
            self.records.entry(destination).or_default().extend(records);
        }
    }

    pub fn get(&self, destination: &Destination) -> Option<&[LogRecord]> {
        self.records.get(destination).map(Vec::as_slice)
    }

    /// Number of destinations.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records across all destinations.
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Destination, &Vec<LogRecord>)> {
        self.records.iter()
    }
}

impl IntoIterator for RecordSet {
    type Item = (Destination, Vec<LogRecord>);
    type IntoIter = indexmap::map::IntoIter<Destination, Vec<LogRecord>>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

/// Outcome of importing one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceLog {
    pub bucket: String,
    pub object: String,
    pub source: Source,
    pub row_count: u64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SourceLog {
    pub fn start(request: &LoadRequest) -> Self {
        let now = Utc::now();
        Self {
            bucket: request.object.bucket().to_string(),
            object: request.object.name().to_string(),
            source: request.source.clone(),
            row_count: 0,
            success: false,
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn finish(&mut self, error: Option<String>) {
        self.finished_at = Utc::now();
        self.success = error.is_none();
        self.error = error;
    }
}

/// Outcome of ingesting one destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestLog {
    pub ingest_id: String,
    pub dataset: String,
    pub table: String,
    pub record_count: u64,
    /// Finalized table schema as JSON; empty if evolution failed.
    pub table_schema: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Audit record of one load run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadLog {
    pub id: String,
    pub sources: Vec<SourceLog>,
    pub ingests: Vec<IngestLog>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}
