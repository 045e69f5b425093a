//! Schema inference from pending records.
//!
//! Column types come from Arrow's JSON inference, which widens every field to
//! the most general type seen across all samples. Fields are then sorted by
//! name at every depth so identical input always serializes identically.

use arrow_json::reader::infer_json_schema_from_iterator;
use arrow_schema::{ArrowError, DataType, Field, FieldRef, Fields, Schema, TimeUnit};
use serde_json::Value;
use std::sync::Arc;

use crate::model::LogRecord;

/// Column holding the record ID.
pub const ID_FIELD: &str = "id";
/// Column holding the event time; also the time partitioning field.
pub const TIMESTAMP_FIELD: &str = "timestamp";
/// Column holding the time the record was built.
pub const INGESTED_AT_FIELD: &str = "ingested_at";
/// Column holding the ingest run ID.
pub const INGEST_ID_FIELD: &str = "ingest_id";
/// Struct column holding the policy's data payload.
pub const DATA_FIELD: &str = "data";

fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
}

/// Table schema for records whose payloads have the given fields.
pub fn envelope_schema(data: Fields) -> Schema {
    Schema::new(vec![
        Field::new(ID_FIELD, DataType::Utf8, false),
        Field::new(TIMESTAMP_FIELD, timestamp_type(), false),
        Field::new(INGESTED_AT_FIELD, timestamp_type(), false),
        Field::new(INGEST_ID_FIELD, DataType::Utf8, false),
        Field::new(DATA_FIELD, DataType::Struct(data), false),
    ])
}

/// Infer the payload fields of `records`, sorted by name.
pub fn infer_data_fields(records: &[LogRecord]) -> Result<Fields, ArrowError> {
    let values = records
        .iter()
        .map(|r| Ok::<_, ArrowError>(Value::Object(r.data.clone())));
    let schema = infer_json_schema_from_iterator(values)?;
    Ok(sort_fields(&typed_fields(schema.fields())))
}

/// Drop fields whose only samples were empty arrays.
///
/// Arrow infers `[]` as `List(Null)`; such a column could never take the
/// element type seen later because evolution does not retype.
pub fn typed_fields(fields: &Fields) -> Fields {
    fields
        .iter()
        .filter_map(|f| {
            let data_type = typed_type(f.data_type())?;
            Some(Arc::new(f.as_ref().clone().with_data_type(data_type)))
        })
        .collect()
}

fn typed_type(data_type: &DataType) -> Option<DataType> {
    match data_type {
        DataType::Null => None,
        DataType::Struct(children) => Some(DataType::Struct(typed_fields(children))),
        DataType::List(item) => typed_type(item.data_type())
            .map(|t| DataType::List(Arc::new(item.as_ref().clone().with_data_type(t)))),
        DataType::LargeList(item) => typed_type(item.data_type())
            .map(|t| DataType::LargeList(Arc::new(item.as_ref().clone().with_data_type(t)))),
        other => Some(other.clone()),
    }
}

/// Infer the full table schema of `records`.
pub fn infer_table_schema(records: &[LogRecord]) -> Result<Schema, ArrowError> {
    Ok(envelope_schema(infer_data_fields(records)?))
}

/// Sort fields by name, recursing into structs and list items.
pub fn sort_fields(fields: &Fields) -> Fields {
    let mut sorted: Vec<FieldRef> = fields.iter().map(|f| Arc::new(sort_field(f))).collect();
    sorted.sort_by(|a, b| a.name().cmp(b.name()));
    Fields::from(sorted)
}

fn sort_field(field: &Field) -> Field {
    field.clone().with_data_type(sort_type(field.data_type()))
}

fn sort_type(data_type: &DataType) -> DataType {
    match data_type {
        DataType::Struct(children) => DataType::Struct(sort_fields(children)),
        DataType::List(item) => DataType::List(Arc::new(sort_field(item))),
        DataType::LargeList(item) => DataType::LargeList(Arc::new(sort_field(item))),
        other => other.clone(),
    }
}
