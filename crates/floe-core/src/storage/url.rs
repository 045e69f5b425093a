//! Object URL parsing.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::StorageError;

use super::{ObjectRef, Scheme};

static BUCKET_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<scheme>[gG][sS]|[sS]3[aA]?|memory)://(?P<bucket>[A-Za-z0-9\-_\.]+)(/(?P<key>.*))?$")
        .expect("bucket URL pattern is valid")
});

static FILE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(file://)?/(?P<path>.*)$").expect("file URL pattern is valid")
});

/// Parse `gs://`, `s3://`, `memory://`, `file:///` or absolute path URLs.
///
/// The object name may be empty, in which case the reference denotes a
/// bucket (or directory) prefix.
pub(super) fn parse(url: &str) -> Result<ObjectRef, StorageError> {
    if let Some(caps) = BUCKET_URL.captures(url) {
        let scheme = match caps["scheme"].to_ascii_lowercase().as_str() {
            "gs" => Scheme::Gcs,
            "memory" => Scheme::Memory,
            _ => Scheme::S3,
        };
        let name = caps.name("key").map(|m| m.as_str()).unwrap_or("");
        return Ok(ObjectRef::new(scheme, &caps["bucket"], name));
    }

    if let Some(caps) = FILE_URL.captures(url) {
        return Ok(ObjectRef::new(Scheme::File, "", &caps["path"]));
    }

    Err(StorageError::InvalidUrl {
        url: url.to_string(),
    })
}
