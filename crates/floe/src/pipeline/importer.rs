//! Source Importer: one load request in, a partial Record Set out.

use chrono::Utc;
use snafu::prelude::*;
use std::time::Instant;
use tracing::{debug, warn};

use floe_core::emit;
use floe_core::metrics::events::{
    EmptyPolicyOutput, ObjectDownloaded, Outcome, RawRecordsDecoded, RecordsBuilt, SourceImported,
};
use floe_core::{ObjectStorageRef, PolicyEvaluatorExt, PolicyEvaluatorRef};

use crate::error::{ImportError, OpenSnafu, ReadSnafu, TransformSnafu, ValidationSnafu};
use crate::model::{LoadRequest, PolicyOutput, RecordSet, SourceLog};
use crate::record;
use crate::source::read_records;

/// Downloads, decodes and transforms single sources.
#[derive(Clone)]
pub struct SourceImporter {
    storage: ObjectStorageRef,
    policy: PolicyEvaluatorRef,
}

impl SourceImporter {
    pub fn new(storage: ObjectStorageRef, policy: PolicyEvaluatorRef) -> Self {
        Self { storage, policy }
    }

    /// Import one source.
    ///
    /// The Source Log is always returned and counts every raw record that was
    /// attempted. On failure the records built so far are dropped.
    pub async fn import(&self, request: &LoadRequest) -> (SourceLog, Result<RecordSet, ImportError>) {
        let mut log = SourceLog::start(request);
        let result = self.import_records(request, &mut log).await;

        log.finish(result.as_ref().err().map(ToString::to_string));
        emit!(SourceImported {
            outcome: Outcome::from_result(&result),
            target: request.source.schema.clone(),
        });
        (log, result)
    }

    async fn import_records(
        &self,
        request: &LoadRequest,
        log: &mut SourceLog,
    ) -> Result<RecordSet, ImportError> {
        let object = request.object.to_string();
        let target = &request.source.schema;

        let start = Instant::now();
        let data = self
            .storage
            .open(&request.object)
            .await
            .context(OpenSnafu { object: &object })
            .context(ReadSnafu)?;
        emit!(ObjectDownloaded {
            bytes: data.len() as u64,
            duration: start.elapsed(),
            target: target.clone(),
        });

        let rows = read_records(&object, &data, &request.source).context(ReadSnafu)?;
        emit!(RawRecordsDecoded {
            count: rows.len() as u64,
            target: target.clone(),
        });

        let query = request.source.query_path();
        let ingested_at = Utc::now();
        let mut records = RecordSet::new();

        for row in rows {
            log.row_count += 1;

            let output: PolicyOutput = self
                .policy
                .query_as(&query, &row)
                .await
                .context(TransformSnafu {
                    object: &object,
                    row: log.row_count,
                })?;

            if output.logs.is_empty() {
                warn!(target = %target, object = %object, row = log.row_count, "No log data in policy output");
                emit!(EmptyPolicyOutput {
                    target: target.clone(),
                });
                continue;
            }

            for (index, structured) in output.logs.into_iter().enumerate() {
                let (destination, record) =
                    record::build(structured, &request.object, index, ingested_at).context(
                        ValidationSnafu {
                            object: &object,
                            row: log.row_count,
                            index,
                        },
                    )?;
                records.push(destination, record);
            }
        }

        emit!(RecordsBuilt {
            count: records.record_count() as u64,
            target: target.clone(),
        });
        debug!(
            target = %target,
            object = %object,
            rows = log.row_count,
            records = records.record_count(),
            destinations = records.len(),
            "Imported source"
        );
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReaderError, ValidationError};
    use crate::model::{Destination, Source};
    use bytes::Bytes;
    use floe_core::storage::{ObjectRef, ObjectStorage};
    use floe_core::{MemoryPolicy, StoragePool};
    use serde_json::{Value, json};
    use std::sync::Arc;

    /// Policy emitting one log per raw record, or none when `skip` is set.
    fn policy() -> MemoryPolicy {
        MemoryPolicy::new().with_rule("schema.test", |row: &Value| {
            if row.get("skip").is_some() {
                return Ok(json!({"logs": []}));
            }
            let table = row.get("table").and_then(Value::as_str).unwrap_or("events");
            Ok(json!({"logs": [{
                "id": row.get("id"),
                "timestamp": row["ts"],
                "data": row,
                "dataset": "logs",
                "table": table,
            }]}))
        })
    }

    async fn importer_with(objects: &[(&str, &'static [u8])]) -> SourceImporter {
        let storage = Arc::new(StoragePool::default());
        for (url, body) in objects {
            storage
                .put(&ObjectRef::parse(url).unwrap(), Bytes::from_static(body))
                .await
                .unwrap();
        }
        SourceImporter::new(storage, Arc::new(policy()))
    }

    fn request(url: &str) -> LoadRequest {
        LoadRequest::new(ObjectRef::parse(url).unwrap(), Source::new("test"))
    }

    #[tokio::test]
    async fn test_import_counts_rows_and_skips_empty_output() {
        let importer = importer_with(&[(
            "memory://b/a.json",
            b"{\"ts\":1,\"v\":1}\n{\"skip\":true}\n{\"ts\":2,\"v\":2}\n",
        )])
        .await;

        let (log, result) = importer.import(&request("memory://b/a.json")).await;
        let records = result.unwrap();

        assert!(log.success);
        assert_eq!(log.row_count, 3);
        assert_eq!(log.bucket, "b");
        assert_eq!(log.object, "a.json");
        assert_eq!(records.record_count(), 2);
        let events = records.get(&Destination::new("logs", "events")).unwrap();
        assert_eq!(events[0].data["v"], 1);
        assert_eq!(events[1].data["v"], 2);
    }

    #[tokio::test]
    async fn test_null_policy_id_falls_back_to_derived_id() {
        let importer = importer_with(&[(
            "memory://b/a.json",
            b"{\"ts\":1,\"id\":null}\n{\"ts\":2,\"id\":\"given\"}\n",
        )])
        .await;

        let (log, result) = importer.import(&request("memory://b/a.json")).await;
        let records = result.unwrap();

        assert!(log.success);
        let events = records.get(&Destination::new("logs", "events")).unwrap();
        assert_eq!(events[0].id, crate::record::log_id("b", "a.json", 0));
        assert_eq!(events[1].id, "given");
    }

    #[tokio::test]
    async fn test_validation_failure_aborts_source() {
        let importer = importer_with(&[(
            "memory://b/a.json",
            b"{\"ts\":1}\n{\"ts\":2,\"table\":\"bad table\"}\n{\"ts\":3}\n",
        )])
        .await;

        let (log, result) = importer.import(&request("memory://b/a.json")).await;
        let err = result.unwrap_err();

        assert!(matches!(
            err,
            ImportError::Validation {
                row: 2,
                index: 0,
                source: ValidationError::InvalidTable { .. },
                ..
            }
        ));
        assert!(!log.success);
        assert_eq!(log.row_count, 2);
        assert!(log.error.unwrap().contains("bad table"));
    }

    #[tokio::test]
    async fn test_missing_object() {
        let importer = importer_with(&[]).await;
        let (log, result) = importer.import(&request("memory://b/missing.json")).await;

        assert!(matches!(
            result,
            Err(ImportError::Read {
                source: ReaderError::Open { .. }
            })
        ));
        assert_eq!(log.row_count, 0);
        assert!(!log.success);
    }

    #[tokio::test]
    async fn test_policy_failure_aborts_source() {
        let importer = importer_with(&[("memory://b/a.json", b"{\"ts\":1}\n")]).await;
        let mut req = request("memory://b/a.json");
        req.source.schema = "unknown".into();

        let (log, result) = importer.import(&req).await;
        assert!(matches!(result, Err(ImportError::Transform { row: 1, .. })));
        assert_eq!(log.row_count, 1);
    }
}
