//! Enqueue path: pack object URLs into queue messages.
//!
//! Each message is a JSON array of object URLs, bounded by an object count
//! and a cumulative object size so one downstream load stays small.

use bytes::Bytes;
use snafu::prelude::*;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use floe_core::emit;
use floe_core::metrics::events::MessagesPublished;
use floe_core::storage::{ObjectAttrs, ObjectRef};
use floe_core::{MB, MessageQueueRef, ObjectStorageRef};

use crate::config::EnqueueConfig;
use crate::error::{
    EncodeMessageSnafu, EnqueueAttrsSnafu, EnqueueError, EnqueueUrlSnafu, ListPrefixSnafu,
    PublishMessageSnafu,
};

/// What an enqueue call published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueSummary {
    /// Objects enqueued.
    pub count: u64,
    /// Total size of the enqueued objects in bytes.
    pub size: u64,
    /// Messages published.
    pub messages: u64,
    pub elapsed: Duration,
}

/// Publishes batches of objects to a queue.
pub struct Enqueuer {
    storage: ObjectStorageRef,
    queue: MessageQueueRef,
    count_limit: usize,
    size_limit: u64,
}

/// Accumulates objects into one message.
#[derive(Default)]
struct Batch {
    urls: Vec<String>,
    size: u64,
}

impl Enqueuer {
    pub fn new(storage: ObjectStorageRef, queue: MessageQueueRef, config: &EnqueueConfig) -> Self {
        Self {
            storage,
            queue,
            count_limit: config.count_limit.max(1),
            size_limit: (config.size_limit_mb * MB) as u64,
        }
    }

    /// Enqueue every object named by `urls`.
    ///
    /// A URL whose name is empty or ends with `/` is a prefix and expands to
    /// every object below it.
    pub async fn enqueue(&self, urls: &[String]) -> Result<EnqueueSummary, EnqueueError> {
        let start = Instant::now();
        let mut summary = EnqueueSummary::default();
        let mut batch = Batch::default();

        for url in urls {
            for attrs in self.expand(url).await? {
                let fits_count = batch.urls.len() < self.count_limit;
                let fits_size = batch.size + attrs.size <= self.size_limit;
                if !batch.urls.is_empty() && !(fits_count && fits_size) {
                    self.publish(std::mem::take(&mut batch), &mut summary).await?;
                }

                summary.count += 1;
                summary.size += attrs.size;
                batch.size += attrs.size;
                batch.urls.push(attrs.object.to_string());
            }
        }
        if !batch.urls.is_empty() {
            self.publish(batch, &mut summary).await?;
        }

        summary.elapsed = start.elapsed();
        info!(
            object_count = summary.count,
            object_size = summary.size,
            messages = summary.messages,
            elapsed = ?summary.elapsed,
            "Enqueue request is completed"
        );
        Ok(summary)
    }

    async fn expand(&self, url: &str) -> Result<Vec<ObjectAttrs>, EnqueueError> {
        let object = ObjectRef::parse(url).context(EnqueueUrlSnafu)?;
        if object.name().is_empty() || object.name().ends_with('/') {
            let found = self
                .storage
                .list(&object)
                .await
                .context(ListPrefixSnafu { prefix: url })?;
            debug!(prefix = %url, objects = found.len(), "Listed prefix");
            return Ok(found);
        }

        let attrs = self
            .storage
            .attrs(&object)
            .await
            .context(EnqueueAttrsSnafu { object: url })?;
        Ok(vec![attrs])
    }

    async fn publish(&self, batch: Batch, summary: &mut EnqueueSummary) -> Result<(), EnqueueError> {
        let payload = serde_json::to_vec(&batch.urls).context(EncodeMessageSnafu)?;
        let id = self
            .queue
            .publish(Bytes::from(payload))
            .await
            .context(PublishMessageSnafu)?;

        summary.messages += 1;
        emit!(MessagesPublished {
            count: 1,
            objects: batch.urls.len() as u64,
        });
        debug!(message_id = %id, objects = batch.urls.len(), bytes = batch.size, "Published message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_core::storage::ObjectStorage;
    use floe_core::{MemoryQueue, StoragePool};
    use std::sync::Arc;

    async fn setup(objects: &[(&str, usize)]) -> (Arc<StoragePool>, Arc<MemoryQueue>) {
        let storage = Arc::new(StoragePool::default());
        for (url, size) in objects {
            storage
                .put(&ObjectRef::parse(url).unwrap(), Bytes::from(vec![b'x'; *size]))
                .await
                .unwrap();
        }
        (storage, Arc::new(MemoryQueue::new()))
    }

    async fn messages(queue: &MemoryQueue) -> Vec<Vec<String>> {
        queue
            .messages()
            .await
            .iter()
            .map(|m| serde_json::from_slice(m).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_count_limit_splits_messages() {
        let objects: Vec<(String, usize)> = (0..5).map(|i| (format!("memory://b/logs/{i}"), 1)).collect();
        let refs: Vec<(&str, usize)> = objects.iter().map(|(u, s)| (u.as_str(), *s)).collect();
        let (storage, queue) = setup(&refs).await;

        let config = EnqueueConfig {
            count_limit: 2,
            size_limit_mb: 4,
        };
        let enqueuer = Enqueuer::new(storage, queue.clone(), &config);
        let summary = enqueuer
            .enqueue(&["memory://b/logs/".to_string()])
            .await
            .unwrap();

        assert_eq!(summary.count, 5);
        assert_eq!(summary.size, 5);
        assert_eq!(summary.messages, 3);
        let sizes: Vec<_> = messages(&queue).await.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_size_limit_splits_messages() {
        let big = 3 * MB;
        let (storage, queue) = setup(&[
            ("memory://b/a", big),
            ("memory://b/b", big),
            ("memory://b/c", 10),
        ])
        .await;

        let enqueuer = Enqueuer::new(storage, queue.clone(), &EnqueueConfig::default());
        let urls: Vec<String> = ["a", "b", "c"].iter().map(|n| format!("memory://b/{n}")).collect();
        let summary = enqueuer.enqueue(&urls).await.unwrap();

        assert_eq!(summary.messages, 2);
        assert_eq!(
            messages(&queue).await,
            vec![
                vec!["memory://b/a".to_string()],
                vec!["memory://b/b".to_string(), "memory://b/c".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_oversized_object_gets_its_own_message() {
        let (storage, queue) = setup(&[("memory://b/huge", 5 * MB)]).await;
        let enqueuer = Enqueuer::new(storage, queue.clone(), &EnqueueConfig::default());

        let summary = enqueuer.enqueue(&["memory://b/huge".to_string()]).await.unwrap();
        assert_eq!(summary.messages, 1);
    }

    #[tokio::test]
    async fn test_missing_object_fails() {
        let (storage, queue) = setup(&[]).await;
        let enqueuer = Enqueuer::new(storage, queue, &EnqueueConfig::default());
        let err = enqueuer
            .enqueue(&["memory://b/missing".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EnqueueError::EnqueueAttrs { .. }));
    }
}
