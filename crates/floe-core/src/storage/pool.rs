//! `object_store` backed [`ObjectStorage`] implementation.
//!
//! One `ObjectStore` is built per bucket on first use and cached, so every
//! source in a run shares the same HTTP connection pool for that bucket.

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::StorageConfig;
use crate::error::{BackendConfigSnafu, ObjectStoreSnafu, StorageError};

use super::{ObjectAttrs, ObjectRef, ObjectStorage, Scheme};

/// Pool of per-bucket object stores.
#[derive(Default)]
pub struct StoragePool {
    config: StorageConfig,
    stores: RwLock<HashMap<String, Arc<dyn ObjectStore>>>,
}

impl std::fmt::Debug for StoragePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoragePool").finish_non_exhaustive()
    }
}

fn bucket_key(scheme: Scheme, bucket: &str) -> String {
    format!("{}://{}", scheme.as_str(), bucket)
}

fn meta_to_attrs(object: &ObjectRef, meta: ObjectMeta) -> ObjectAttrs {
    ObjectAttrs {
        object: object.with_name(meta.location.to_string()),
        size: meta.size as u64,
        content_type: None,
        checksum: meta.e_tag,
        created: None,
        updated: Some(meta.last_modified),
        generation: meta.version,
    }
}

impl StoragePool {
    /// Create an empty pool using the given backend options.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// Register a pre-built store for a bucket, replacing any cached one.
    pub async fn register(&self, scheme: Scheme, bucket: &str, store: Arc<dyn ObjectStore>) {
        self.stores
            .write()
            .await
            .insert(bucket_key(scheme, bucket), store);
    }

    async fn store_for(&self, object: &ObjectRef) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let key = bucket_key(object.scheme(), object.bucket());

        if let Some(store) = self.stores.read().await.get(&key) {
            return Ok(store.clone());
        }

        let mut stores = self.stores.write().await;
        // Another task may have built it while we waited for the write lock
        if let Some(store) = stores.get(&key) {
            return Ok(store.clone());
        }

        debug!("Building object store for {key}");
        let store = self.build_store(object.scheme(), object.bucket())?;
        stores.insert(key, store.clone());
        Ok(store)
    }

    fn build_store(&self, scheme: Scheme, bucket: &str) -> Result<Arc<dyn ObjectStore>, StorageError> {
        let context = || BackendConfigSnafu {
            scheme: scheme.as_str(),
            bucket,
        };

        let store: Arc<dyn ObjectStore> = match scheme {
            Scheme::Gcs => {
                let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
                for (key, value) in &self.config.gcs {
                    builder = builder.with_config(key.parse().context(context())?, value);
                }
                Arc::new(builder.build().context(context())?)
            }
            Scheme::S3 => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                for (key, value) in &self.config.s3 {
                    builder = builder.with_config(key.parse().context(context())?, value);
                }
                Arc::new(builder.build().context(context())?)
            }
            Scheme::File => Arc::new(LocalFileSystem::new()),
            Scheme::Memory => Arc::new(InMemory::new()),
        };
        Ok(store)
    }
}

#[async_trait]
impl ObjectStorage for StoragePool {
    async fn open(&self, object: &ObjectRef) -> Result<Bytes, StorageError> {
        let store = self.store_for(object).await?;
        let start = Instant::now();

        let bytes = store
            .get(&Path::from(object.name()))
            .await
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)?;

        debug!(
            "Read {} ({} bytes) in {:?}",
            object,
            bytes.len(),
            start.elapsed()
        );
        Ok(bytes)
    }

    async fn attrs(&self, object: &ObjectRef) -> Result<ObjectAttrs, StorageError> {
        let store = self.store_for(object).await?;
        let meta = store
            .head(&Path::from(object.name()))
            .await
            .context(ObjectStoreSnafu)?;
        Ok(meta_to_attrs(object, meta))
    }

    async fn list(&self, prefix: &ObjectRef) -> Result<Vec<ObjectAttrs>, StorageError> {
        let store = self.store_for(prefix).await?;
        let path = (!prefix.name().is_empty()).then(|| Path::from(prefix.name()));

        let metas: Vec<ObjectMeta> = store
            .list(path.as_ref())
            .try_collect()
            .await
            .context(ObjectStoreSnafu)?;

        let mut attrs: Vec<ObjectAttrs> = metas
            .into_iter()
            .map(|meta| meta_to_attrs(prefix, meta))
            .collect();
        attrs.sort_by(|a, b| a.object.name().cmp(b.object.name()));
        Ok(attrs)
    }

    async fn put(&self, object: &ObjectRef, data: Bytes) -> Result<(), StorageError> {
        let store = self.store_for(object).await?;
        store
            .put(&Path::from(object.name()), PutPayload::from(data))
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip_and_attrs() {
        let pool = StoragePool::default();
        let obj = ObjectRef::parse("memory://bucket/logs/a.json").unwrap();

        pool.put(&obj, Bytes::from_static(b"{\"a\":1}")).await.unwrap();

        let data = pool.open(&obj).await.unwrap();
        assert_eq!(&data[..], b"{\"a\":1}");

        let attrs = pool.attrs(&obj).await.unwrap();
        assert_eq!(attrs.size, 7);
        assert_eq!(attrs.object, obj);
    }

    #[tokio::test]
    async fn test_missing_object_is_not_found() {
        let pool = StoragePool::default();
        let obj = ObjectRef::parse("memory://bucket/missing.json").unwrap();

        let err = pool.open(&obj).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_prefix_sorted() {
        let pool = StoragePool::default();
        for name in ["logs/b.json", "logs/a.json", "other/c.json"] {
            let obj = ObjectRef::new(Scheme::Memory, "bucket", name);
            pool.put(&obj, Bytes::from_static(b"{}")).await.unwrap();
        }

        let prefix = ObjectRef::new(Scheme::Memory, "bucket", "logs");
        let listed = pool.list(&prefix).await.unwrap();
        let names: Vec<_> = listed.iter().map(|a| a.object.name().to_string()).collect();
        assert_eq!(names, vec!["logs/a.json", "logs/b.json"]);
    }

    #[tokio::test]
    async fn test_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/app.json");
        let obj = ObjectRef::parse(path.to_str().unwrap()).unwrap();

        let pool = StoragePool::default();
        pool.put(&obj, Bytes::from_static(b"{}")).await.unwrap();
        assert_eq!(&pool.open(&obj).await.unwrap()[..], b"{}");
    }

    #[tokio::test]
    async fn test_registered_store_is_used() {
        let pool = StoragePool::default();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        store
            .put(&Path::from("x.json"), PutPayload::from_static(b"[]"))
            .await
            .unwrap();
        pool.register(Scheme::Gcs, "bucket", store).await;

        let obj = ObjectRef::parse("gs://bucket/x.json").unwrap();
        assert_eq!(&pool.open(&obj).await.unwrap()[..], b"[]");
    }
}
