//! Record Builder: turns one Structured Log into a validated Log Record.
//!
//! - The ID is the policy's when non-empty, otherwise a UUIDv5 of
//!   (bucket, object name, output index) so reprocessing an object yields
//!   identical IDs and the warehouse can de-duplicate retries.
//! - The timestamp keeps the integral seconds and the `fmod(v, 1.0)`
//!   remainder as signed nanoseconds.
//! - Null leaves are stripped at every depth; a column cannot be typed from
//!   null-only samples.

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use uuid::Uuid;

use floe_core::storage::ObjectRef;

use crate::error::ValidationError;
use crate::model::{Destination, LogRecord, StructuredLog};

static DATASET_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"));
static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

/// Deterministic ID for the `index`-th log emitted from a raw record of an object.
pub fn log_id(bucket: &str, name: &str, index: usize) -> String {
    let key = format!("{bucket}/{name}#{index}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

/// Convert epoch seconds into a timestamp.
///
/// Negative inputs are not normalized: `-1.5` is `-1s` plus `-500ms`.
pub fn resolve_timestamp(value: f64) -> Result<DateTime<Utc>, ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteTimestamp { value });
    }

    let out_of_range = || ValidationError::TimestampOutOfRange { value };

    // i64 seconds overflow chrono long before they overflow i64
    if value.abs() >= i64::MAX as f64 {
        return Err(out_of_range());
    }
    let secs = value.trunc() as i64;
    let nanos = ((value % 1.0) * 1e9).round() as i64;

    let seconds = TimeDelta::try_seconds(secs).ok_or_else(out_of_range)?;
    DateTime::<Utc>::UNIX_EPOCH
        .checked_add_signed(seconds)
        .and_then(|t| t.checked_add_signed(TimeDelta::nanoseconds(nanos)))
        .ok_or_else(out_of_range)
}

/// Remove null object entries and null array elements at every depth.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(strip_object(map)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other,
    }
}

fn strip_object(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k, strip_nulls(v)))
        .collect()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check the parts of a Structured Log the builder cannot repair.
pub fn validate(log: &StructuredLog) -> Result<(), ValidationError> {
    let Destination { dataset, table, .. } = &log.destination;
    if !DATASET_NAME.is_match(dataset) {
        return Err(ValidationError::InvalidDataset {
            dataset: dataset.clone(),
        });
    }
    if !TABLE_NAME.is_match(table) {
        return Err(ValidationError::InvalidTable {
            table: table.clone(),
        });
    }
    if !log.timestamp.is_finite() {
        return Err(ValidationError::NonFiniteTimestamp {
            value: log.timestamp,
        });
    }
    if !log.data.is_object() {
        return Err(ValidationError::DataNotObject {
            kind: kind_of(&log.data),
        });
    }
    Ok(())
}

/// Build the record for the `index`-th log emitted from a raw record of `object`.
pub fn build(
    log: StructuredLog,
    object: &ObjectRef,
    index: usize,
    ingested_at: DateTime<Utc>,
) -> Result<(Destination, LogRecord), ValidationError> {
    validate(&log)?;

    let timestamp = resolve_timestamp(log.timestamp)?;
    let id = match log.id {
        Some(id) if !id.is_empty() => id,
        _ => log_id(object.bucket(), object.name(), index),
    };
    let data = match log.data {
        Value::Object(map) => strip_object(map),
        other => {
            return Err(ValidationError::DataNotObject {
                kind: kind_of(&other),
            });
        }
    };

    let record = LogRecord {
        id,
        timestamp,
        ingested_at,
        ingest_id: String::new(),
        data,
    };
    Ok((log.destination, record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object() -> ObjectRef {
        ObjectRef::parse("gs://logs-bucket/2024/01/01/a.json.gz").unwrap()
    }

    fn structured(data: Value) -> StructuredLog {
        StructuredLog {
            id: None,
            timestamp: 1_700_000_000.25,
            data,
            destination: Destination::new("logs", "events"),
            schema: "test".into(),
        }
    }

    fn has_null_leaf(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Array(items) => items.iter().any(has_null_leaf),
            Value::Object(map) => map.values().any(has_null_leaf),
            _ => false,
        }
    }

    #[test]
    fn test_id_is_deterministic() {
        let a = log_id("b", "o", 3);
        assert_eq!(a, log_id("b", "o", 3));
        assert_ne!(a, log_id("b", "o", 4));
        assert_ne!(a, log_id("b", "other", 3));
        assert_eq!(Uuid::parse_str(&a).unwrap().get_version_num(), 5);
    }

    #[test]
    fn test_policy_id_is_kept() {
        let mut log = structured(json!({}));
        log.id = Some("given".into());
        let (_, record) = build(log, &object(), 0, Utc::now()).unwrap();
        assert_eq!(record.id, "given");
    }

    #[test]
    fn test_missing_id_is_derived_from_object_and_index() {
        let (_, first) = build(structured(json!({})), &object(), 1, Utc::now()).unwrap();
        let (_, again) = build(structured(json!({})), &object(), 1, Utc::now()).unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(first.id, log_id("logs-bucket", "2024/01/01/a.json.gz", 1));
    }

    #[test]
    fn test_empty_id_is_derived() {
        let mut log = structured(json!({}));
        log.id = Some(String::new());
        let (_, record) = build(log, &object(), 2, Utc::now()).unwrap();
        assert_eq!(record.id, log_id("logs-bucket", "2024/01/01/a.json.gz", 2));
    }

    #[test]
    fn test_timestamp_fraction_becomes_nanos() {
        for v in [0.0, 1.0, 1.5, 1_700_000_000.25, 1_700_000_000.123_456, 42.999_999_999] {
            let ts = resolve_timestamp(v).unwrap();
            let expected_secs = v.trunc() as i64;
            let expected_nanos = ((v % 1.0) * 1e9).round() as i64;
            let total = ts.timestamp() as i128 * 1_000_000_000 + ts.timestamp_subsec_nanos() as i128;
            assert_eq!(
                total,
                expected_secs as i128 * 1_000_000_000 + expected_nanos as i128,
                "value {v}"
            );
        }
    }

    #[test]
    fn test_timestamp_quarter_second() {
        let ts = resolve_timestamp(1_700_000_000.25).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_nanos(), 250_000_000);
    }

    // Pre-1970 values keep the sign on both parts; pinned, not normalized.
    #[test]
    fn test_negative_timestamp_is_not_normalized() {
        let ts = resolve_timestamp(-1.5).unwrap();
        assert_eq!(ts.timestamp_micros(), -1_500_000);

        let ts = resolve_timestamp(-0.25).unwrap();
        assert_eq!(ts.timestamp_millis(), -250);
    }

    #[test]
    fn test_timestamp_rejects_non_finite_and_huge() {
        assert!(matches!(
            resolve_timestamp(f64::NAN),
            Err(ValidationError::NonFiniteTimestamp { .. })
        ));
        assert!(matches!(
            resolve_timestamp(f64::INFINITY),
            Err(ValidationError::NonFiniteTimestamp { .. })
        ));
        assert!(matches!(
            resolve_timestamp(1e300),
            Err(ValidationError::TimestampOutOfRange { .. })
        ));
        assert!(matches!(
            resolve_timestamp(1e17),
            Err(ValidationError::TimestampOutOfRange { .. })
        ));
    }

    #[test]
    fn test_nulls_are_stripped_at_every_depth() {
        let data = json!({
            "a": null,
            "b": 1,
            "c": {"d": null, "e": {"f": null, "g": "x"}},
            "h": [null, {"i": null, "j": 2}, [null, 3]],
        });
        let (_, record) = build(structured(data), &object(), 0, Utc::now()).unwrap();
        let data = Value::Object(record.data);

        assert!(!has_null_leaf(&data));
        assert_eq!(
            data,
            json!({"b": 1, "c": {"e": {"g": "x"}}, "h": [{"j": 2}, [3]]})
        );
    }

    #[test]
    fn test_validation() {
        let mut log = structured(json!({}));
        log.destination.dataset = String::new();
        assert!(matches!(validate(&log), Err(ValidationError::InvalidDataset { .. })));

        let mut log = structured(json!({}));
        log.destination.table = "bad table".into();
        assert!(matches!(validate(&log), Err(ValidationError::InvalidTable { .. })));

        let mut log = structured(json!({}));
        log.destination.table = "table-2024".into();
        assert!(validate(&log).is_ok());

        let log = structured(json!([1, 2]));
        assert!(matches!(
            validate(&log),
            Err(ValidationError::DataNotObject { kind: "array" })
        ));
    }
}
