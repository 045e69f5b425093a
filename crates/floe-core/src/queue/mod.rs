//! Message queue capability.
//!
//! Used by the enqueue path to hand batches of object URLs to downstream
//! loaders. [`MemoryQueue`] keeps messages in process; [`DumpQueue`] writes
//! one file per message.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use snafu::prelude::*;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{DumpSnafu, QueueError};
use crate::storage::{ObjectRef, ObjectStorageRef};

/// Identifier assigned to a published message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference-counted queue handle.
pub type MessageQueueRef = Arc<dyn MessageQueue>;

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn publish(&self, data: Bytes) -> Result<MessageId, QueueError>;
}

/// In-process queue that records every published payload.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    messages: Mutex<Vec<Bytes>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads published so far, in order.
    pub async fn messages(&self) -> Vec<Bytes> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn publish(&self, data: Bytes) -> Result<MessageId, QueueError> {
        let mut messages = self.messages.lock().await;
        messages.push(data);
        Ok(MessageId(messages.len().to_string()))
    }
}

/// Queue that writes each message as a file under a directory.
pub struct DumpQueue {
    storage: ObjectStorageRef,
    dir: ObjectRef,
    seq: AtomicU64,
}

impl fmt::Debug for DumpQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DumpQueue<{}>", self.dir)
    }
}

impl DumpQueue {
    pub fn new(storage: ObjectStorageRef, dir: ObjectRef) -> Self {
        Self {
            storage,
            dir,
            seq: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl MessageQueue for DumpQueue {
    async fn publish(&self, data: Bytes) -> Result<MessageId, QueueError> {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let id = format!("{}-{seq:06}", Utc::now().format("%Y%m%dT%H%M%S%.f"));

        let dir = self.dir.name().trim_end_matches('/');
        let name = if dir.is_empty() {
            format!("{id}.json")
        } else {
            format!("{dir}/{id}.json")
        };
        let object = self.dir.with_name(name);

        self.storage.put(&object, data).await.context(DumpSnafu)?;
        debug!("Dumped message to {}", object);
        Ok(MessageId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoragePool;

    #[tokio::test]
    async fn test_memory_queue_records_messages() {
        let queue = MemoryQueue::new();
        let first = queue.publish(Bytes::from_static(b"a")).await.unwrap();
        let second = queue.publish(Bytes::from_static(b"b")).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(
            queue.messages().await,
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]
        );
    }

    #[tokio::test]
    async fn test_dump_queue_writes_one_file_per_message() {
        let storage: ObjectStorageRef = Arc::new(StoragePool::default());
        let dir = ObjectRef::parse("memory://queue/out").unwrap();
        let queue = DumpQueue::new(storage.clone(), dir.clone());

        queue.publish(Bytes::from_static(b"[1]")).await.unwrap();
        queue.publish(Bytes::from_static(b"[2]")).await.unwrap();

        let files = storage.list(&dir).await.unwrap();
        assert_eq!(files.len(), 2);
        let body = storage.open(&files[0].object).await.unwrap();
        assert_eq!(body, Bytes::from_static(b"[1]"));
    }
}
