//! Internal events emitted by the load pipeline.
//!
//! The `target` label carries the schema name for source-side events and
//! `dataset.table` for destination-side events.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Outcome label shared by several events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Failed => "failed",
        }
    }

    pub fn from_result<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            Outcome::Success
        } else {
            Outcome::Failed
        }
    }
}

/// A source object was downloaded.
pub struct ObjectDownloaded {
    pub bytes: u64,
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for ObjectDownloaded {
    fn emit(self) {
        trace!(bytes = self.bytes, target = %self.target, "Object downloaded");
        counter!("floe_object_bytes_read_total", "target" => self.target.clone())
            .increment(self.bytes);
        histogram!("floe_object_download_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

/// Raw records decoded from a source object.
pub struct RawRecordsDecoded {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RawRecordsDecoded {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Raw records decoded");
        counter!("floe_raw_records_total", "target" => self.target).increment(self.count);
    }
}

/// The policy produced no structured logs for a raw record.
pub struct EmptyPolicyOutput {
    pub target: String,
}

impl InternalEvent for EmptyPolicyOutput {
    fn emit(self) {
        trace!(target = %self.target, "Empty policy output");
        counter!("floe_empty_policy_output_total", "target" => self.target).increment(1);
    }
}

/// A source finished importing.
pub struct SourceImported {
    pub outcome: Outcome,
    pub target: String,
}

impl InternalEvent for SourceImported {
    fn emit(self) {
        trace!(outcome = self.outcome.as_str(), target = %self.target, "Source imported");
        counter!(
            "floe_sources_total",
            "outcome" => self.outcome.as_str(),
            "target" => self.target
        )
        .increment(1);
    }
}

/// Log records built for a destination.
pub struct RecordsBuilt {
    pub count: u64,
    pub target: String,
}

impl InternalEvent for RecordsBuilt {
    fn emit(self) {
        trace!(count = self.count, target = %self.target, "Records built");
        counter!("floe_records_built_total", "target" => self.target).increment(self.count);
    }
}

/// Kind of table schema change.
#[derive(Debug, Clone, Copy)]
pub enum SchemaChange {
    Created,
    Updated,
}

impl SchemaChange {
    fn as_str(&self) -> &'static str {
        match self {
            SchemaChange::Created => "created",
            SchemaChange::Updated => "updated",
        }
    }
}

/// A destination table was created or its schema extended.
pub struct TableSchemaChanged {
    pub change: SchemaChange,
    pub target: String,
}

impl InternalEvent for TableSchemaChanged {
    fn emit(self) {
        trace!(change = self.change.as_str(), target = %self.target, "Table schema changed");
        counter!(
            "floe_table_schema_changes_total",
            "change" => self.change.as_str(),
            "target" => self.target
        )
        .increment(1);
    }
}

/// One insert call against the warehouse.
pub struct InsertChunk {
    pub rows: u64,
    pub outcome: Outcome,
    pub duration: Duration,
    pub target: String,
}

impl InternalEvent for InsertChunk {
    fn emit(self) {
        trace!(rows = self.rows, outcome = self.outcome.as_str(), target = %self.target, "Insert chunk");
        counter!(
            "floe_insert_chunks_total",
            "outcome" => self.outcome.as_str(),
            "target" => self.target.clone()
        )
        .increment(1);
        if self.outcome == Outcome::Success {
            counter!("floe_rows_inserted_total", "target" => self.target.clone())
                .increment(self.rows);
        }
        histogram!("floe_insert_seconds", "target" => self.target)
            .record(self.duration.as_secs_f64());
    }
}

/// A load run finished.
pub struct LoadCompleted {
    pub outcome: Outcome,
    pub duration: Duration,
}

impl InternalEvent for LoadCompleted {
    fn emit(self) {
        trace!(outcome = self.outcome.as_str(), "Load completed");
        counter!("floe_loads_total", "outcome" => self.outcome.as_str()).increment(1);
        histogram!("floe_load_seconds").record(self.duration.as_secs_f64());
    }
}

/// Writing the audit record for a run failed.
pub struct AuditWriteFailed;

impl InternalEvent for AuditWriteFailed {
    fn emit(self) {
        trace!("Audit write failed");
        counter!("floe_audit_write_failures_total").increment(1);
    }
}

/// Messages published on the enqueue path.
pub struct MessagesPublished {
    pub count: u64,
    pub objects: u64,
}

impl InternalEvent for MessagesPublished {
    fn emit(self) {
        trace!(count = self.count, objects = self.objects, "Messages published");
        counter!("floe_messages_published_total").increment(self.count);
        counter!("floe_objects_enqueued_total").increment(self.objects);
    }
}
