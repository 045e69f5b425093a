//! Batch Ingestor: sized insert calls for one destination.

use arrow_schema::SchemaRef;
use std::time::Instant;
use tracing::{debug, info};

use floe_core::emit;
use floe_core::metrics::events::{InsertChunk, Outcome};
use floe_core::warehouse::WarehouseRef;

use crate::error::IngestError;
use crate::model::{Destination, LogRecord};

/// Maximum rows per insert call.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Inserts a destination's records in fixed-size chunks.
pub struct BatchIngestor {
    warehouse: WarehouseRef,
    chunk_size: usize,
}

impl BatchIngestor {
    pub fn new(warehouse: WarehouseRef, chunk_size: usize) -> Self {
        Self {
            warehouse,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Stamp `records` with `ingest_id` and insert them in order.
    ///
    /// Stops at the first failing chunk. Chunks inserted before it stay.
    pub async fn ingest(
        &self,
        destination: &Destination,
        schema: &SchemaRef,
        ingest_id: &str,
        records: &mut [LogRecord],
    ) -> Result<(), IngestError> {
        let target = destination.to_string();
        let mut inserted = 0;

        for record in records.iter_mut() {
            record.ingest_id = ingest_id.to_string();
        }

        for (chunk, batch) in records.chunks(self.chunk_size).enumerate() {
            let rows = batch.iter().map(LogRecord::to_row).collect::<Vec<_>>();

            let start = Instant::now();
            let result = self
                .warehouse
                .insert(&destination.dataset, &destination.table, schema, rows)
                .await;
            emit!(InsertChunk {
                rows: batch.len() as u64,
                outcome: Outcome::from_result(&result),
                duration: start.elapsed(),
                target: target.clone(),
            });

            if let Err(source) = result {
                return Err(IngestError::InsertChunk {
                    destination: target,
                    chunk,
                    inserted,
                    source,
                });
            }
            inserted += batch.len();
            debug!(target = %target, chunk, rows = batch.len(), "Inserted chunk");
        }

        info!(target = %target, rows = inserted, "Inserted records");
        Ok(())
    }
}
