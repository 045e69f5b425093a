//! Load runs: import, evolve, ingest and audit.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use snafu::prelude::*;
use tracing::{info, warn};
use uuid::Uuid;

use floe_core::storage::{ObjectAttrs, ObjectRef};
use floe_core::{ObjectStorageRef, PolicyEvaluatorExt, PolicyEvaluatorRef};

use crate::clients::Clients;
use crate::config::LoadConfig;
use crate::error::{
    EventToSourcesSnafu, EvolveSnafu, ImportSnafu, IngestError, IngestSnafu, LoadError,
    ObjectAttrsSnafu, ObjectUrlSnafu,
};
use crate::ingest::BatchIngestor;
use crate::model::{Destination, EventOutput, IngestLog, LoadLog, LoadRequest, LogRecord};
use crate::pipeline::{ImportScheduler, SourceImporter};
use crate::runlog::{AuditTable, RunLogger};
use crate::schema::{SchemaManager, schema_json};

/// Policy query turning a storage event into sources.
pub const EVENT_QUERY: &str = "event";

/// Result of a load run. The Load Log is complete whether or not the run failed.
#[derive(Debug)]
pub struct LoadOutcome {
    pub log: LoadLog,
    pub result: Result<(), LoadError>,
}

impl LoadOutcome {
    pub fn into_result(self) -> Result<LoadLog, LoadError> {
        self.result.map(|()| self.log)
    }
}

fn event_time(t: Option<DateTime<Utc>>) -> Value {
    t.map_or(Value::Null, |t| {
        Value::String(t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
    })
}

/// Storage event handed to the `event` policy query.
fn storage_event(object: &ObjectRef, attrs: &ObjectAttrs) -> Value {
    json!({
        "kind": "storage#object",
        "bucket": object.bucket(),
        "name": object.name(),
        "size": attrs.size.to_string(),
        "content_type": attrs.content_type,
        "etag": attrs.checksum,
        "generation": attrs.generation,
        "time_created": event_time(attrs.created),
        "updated": event_time(attrs.updated),
    })
}

/// Runs loads against one set of clients.
pub struct Loader {
    storage: ObjectStorageRef,
    policy: PolicyEvaluatorRef,
    scheduler: ImportScheduler,
    schemas: SchemaManager,
    ingestor: BatchIngestor,
    runlog: RunLogger,
}

impl Loader {
    pub fn new(clients: &Clients, config: &LoadConfig, audit: Option<AuditTable>) -> Self {
        let importer = SourceImporter::new(clients.storage.clone(), clients.policy.clone());
        Self {
            storage: clients.storage.clone(),
            policy: clients.policy.clone(),
            scheduler: ImportScheduler::new(importer, config.concurrency),
            schemas: SchemaManager::new(clients.warehouse.clone()),
            ingestor: BatchIngestor::new(clients.warehouse.clone(), config.chunk_size),
            runlog: RunLogger::new(clients.warehouse.clone(), audit),
        }
    }

    /// Load every request.
    ///
    /// Any failed source aborts the run before ingestion. Destinations are
    /// ingested one at a time; the first failing destination stops the run
    /// and destinations ingested before it stay committed.
    pub async fn load(&self, requests: Vec<LoadRequest>) -> LoadOutcome {
        let mut log = self.runlog.start();
        info!(run_id = %log.id, requests = requests.len(), "Load started");

        let result = self.run(requests, &mut log).await;
        self.runlog.finish(&mut log, &result).await;
        LoadOutcome { log, result }
    }

    async fn run(&self, requests: Vec<LoadRequest>, log: &mut LoadLog) -> Result<(), LoadError> {
        let outcome = self.scheduler.run(requests).await;
        log.sources = outcome.sources;
        if let Some(failures) = outcome.error {
            return Err(failures).context(ImportSnafu);
        }

        for (destination, records) in outcome.records {
            let (ingest, result) = self.ingest_destination(&destination, records).await;
            log.ingests.push(ingest);
            result.context(IngestSnafu {
                destination: destination.to_string(),
            })?;
        }
        Ok(())
    }

    async fn ingest_destination(
        &self,
        destination: &Destination,
        mut records: Vec<LogRecord>,
    ) -> (IngestLog, Result<(), IngestError>) {
        let started_at = Utc::now();
        let mut log = IngestLog {
            ingest_id: Uuid::new_v4().to_string(),
            dataset: destination.dataset.clone(),
            table: destination.table.clone(),
            record_count: records.len() as u64,
            table_schema: String::new(),
            success: false,
            error: None,
            started_at,
            finished_at: started_at,
        };

        let result: Result<(), IngestError> = async {
            let schema = self
                .schemas
                .evolve(destination, &records)
                .await
                .context(EvolveSnafu)?;
            log.table_schema = schema_json(&schema).context(EvolveSnafu)?;
            self.ingestor
                .ingest(destination, &schema, &log.ingest_id, &mut records)
                .await
        }
        .await;

        log.finished_at = Utc::now();
        log.success = result.is_ok();
        log.error = result.as_ref().err().map(ToString::to_string);
        if let Err(e) = &result {
            warn!(target = %destination, ingest_id = %log.ingest_id, error = %e, "Ingest failed");
        }
        (log, result)
    }

    /// Load a single object, asking the policy which sources it holds.
    pub async fn load_object(&self, url: &str) -> Result<LoadLog, LoadError> {
        let object = ObjectRef::parse(url).context(ObjectUrlSnafu)?;
        let attrs = self
            .storage
            .attrs(&object)
            .await
            .context(ObjectAttrsSnafu { object: url })?;

        let output: EventOutput = self
            .policy
            .query_as(EVENT_QUERY, &storage_event(&object, &attrs))
            .await
            .context(EventToSourcesSnafu { object: url })?;

        if output.sources.is_empty() {
            warn!(object = %object, "No sources for object");
        }
        let requests = output
            .sources
            .into_iter()
            .map(|source| LoadRequest::new(object.clone(), source))
            .collect();

        self.load(requests).await.into_result()
    }
}
