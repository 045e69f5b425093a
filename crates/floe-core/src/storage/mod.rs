//! Object storage capability.
//!
//! Source objects are addressed by [`ObjectRef`] (scheme, bucket, name) and
//! read through the [`ObjectStorage`] trait. [`StoragePool`] is the
//! `object_store` backed implementation covering GCS, S3, the local
//! filesystem and in-memory buckets.

mod pool;
mod url;

pub use pool::StoragePool;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::StorageError;

/// Storage backend addressed by an object URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Gcs,
    S3,
    File,
    Memory,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Gcs => "gs",
            Scheme::S3 => "s3",
            Scheme::File => "file",
            Scheme::Memory => "memory",
        }
    }
}

/// Location of one object (or, with an empty name, a prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    scheme: Scheme,
    bucket: String,
    name: String,
}

impl ObjectRef {
    pub fn new(scheme: Scheme, bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scheme,
            bucket: bucket.into(),
            name: name.into(),
        }
    }

    /// Parse an object URL such as `gs://bucket/path/to/object`.
    pub fn parse(url: &str) -> Result<Self, StorageError> {
        url::parse(url)
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Bucket name; empty for local files.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same bucket, different object name.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self::new(self.scheme, self.bucket.clone(), name)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme {
            Scheme::File => write!(f, "file:///{}", self.name),
            scheme => write!(f, "{}://{}/{}", scheme.as_str(), self.bucket, self.name),
        }
    }
}

impl FromStr for ObjectRef {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ObjectRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Object metadata as reported by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectAttrs {
    pub object: ObjectRef,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<String>,
}

/// A reference-counted object storage handle.
pub type ObjectStorageRef = Arc<dyn ObjectStorage>;

/// Read access to source objects.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Read the full contents of an object.
    async fn open(&self, object: &ObjectRef) -> Result<Bytes, StorageError>;

    /// Fetch object metadata without reading its contents.
    async fn attrs(&self, object: &ObjectRef) -> Result<ObjectAttrs, StorageError>;

    /// List objects whose name starts with `prefix.name()`.
    async fn list(&self, prefix: &ObjectRef) -> Result<Vec<ObjectAttrs>, StorageError>;

    /// Write an object, replacing any existing one.
    async fn put(&self, object: &ObjectRef, data: Bytes) -> Result<(), StorageError>;
}
