//! Import Scheduler: bounded fan-out over load requests and fan-in merge.
//!
//! A fixed pool of workers drains a shared request queue. Each worker hands
//! back its own partial Record Set, so nothing is merged until every worker
//! has been joined.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::error::{ImportError, ImportFailures};
use crate::model::{LoadRequest, RecordSet, SourceLog};

use super::importer::SourceImporter;

/// Default number of concurrent source imports.
pub const DEFAULT_CONCURRENCY: usize = 32;

/// Merged result of an import run.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    /// Records of every successful source.
    pub records: RecordSet,
    /// One log per request, in completion order.
    pub sources: Vec<SourceLog>,
    /// Set iff at least one source failed.
    pub error: Option<ImportFailures>,
}

/// Runs source imports under a fixed concurrency budget.
pub struct ImportScheduler {
    importer: SourceImporter,
    concurrency: usize,
}

impl ImportScheduler {
    pub fn new(importer: SourceImporter, concurrency: usize) -> Self {
        Self {
            importer,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(&self, requests: Vec<LoadRequest>) -> ImportOutcome {
        let total = requests.len();
        if total == 0 {
            return ImportOutcome::default();
        }

        // Every channel holds all N items so no send ever waits.
        let (request_tx, request_rx) = mpsc::channel(total);
        for request in requests {
            let _ = request_tx.send(request).await;
        }
        drop(request_tx);
        let request_rx = Arc::new(Mutex::new(request_rx));

        let (result_tx, mut result_rx) = mpsc::channel::<(SourceLog, Option<RecordSet>)>(total);
        let (error_tx, mut error_rx) = mpsc::channel::<ImportError>(total);

        let workers = self.concurrency.min(total);
        debug!("Importing {total} sources with {workers} workers");

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            let importer = self.importer.clone();
            let request_rx = Arc::clone(&request_rx);
            let result_tx = result_tx.clone();
            let error_tx = error_tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let next = request_rx.lock().await.recv().await;
                    let Some(request) = next else {
                        break;
                    };

                    let (log, result) = import_guarded(&importer, &request).await;
                    let (records, error) = match result {
                        Ok(records) => (Some(records), None),
                        Err(e) => {
                            warn!(worker, object = %request.object, error = %e, "Source import failed");
                            (None, Some(e))
                        }
                    };

                    // Receivers outlive the workers; these sends cannot fail or wait.
                    let _ = result_tx.send((log, records)).await;
                    if let Some(e) = error {
                        let _ = error_tx.send(e).await;
                    }
                }
            }));
        }
        drop(result_tx);
        drop(error_tx);

        // Barrier: nothing is read until every worker is done.
        for handle in futures::future::join_all(handles).await {
            if let Err(e) = handle {
                warn!(error = %e, "Import worker terminated abnormally");
            }
        }

        let mut outcome = ImportOutcome::default();
        while let Some((log, records)) = result_rx.recv().await {
            outcome.sources.push(log);
            if let Some(records) = records {
                outcome.records.merge(records);
            }
        }

        let mut errors = Vec::new();
        while let Some(e) = error_rx.recv().await {
            errors.push(e);
        }
        if !errors.is_empty() {
            outcome.error = Some(ImportFailures { errors });
        }

        info!(
            sources = outcome.sources.len(),
            failed = outcome.error.as_ref().map_or(0, |e| e.errors.len()),
            records = outcome.records.record_count(),
            destinations = outcome.records.len(),
            "Import finished"
        );
        outcome
    }
}

/// Run one import, turning a panic into a failure of that request.
async fn import_guarded(
    importer: &SourceImporter,
    request: &LoadRequest,
) -> (SourceLog, Result<RecordSet, ImportError>) {
    match AssertUnwindSafe(importer.import(request)).catch_unwind().await {
        Ok(done) => done,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            let error = ImportError::WorkerPanicked {
                object: request.object.to_string(),
                message,
            };
            let mut log = SourceLog::start(request);
            log.finish(Some(error.to_string()));
            (log, Err(error))
        }
    }
}
