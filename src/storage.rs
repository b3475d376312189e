//! Object-storage listing provider.
//!
//! The object-listing backend and the content-preview step read buckets
//! through [`ObjectStore`]. Real deployments plug in their own S3 client;
//! [`MemoryObjectStore`] serves fixtures and offline catalogs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// One listed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_class: Option<String>,
}

impl ObjectEntry {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
            storage_class: None,
        }
    }

    pub fn with_last_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(modified);
        self
    }

    pub fn with_storage_class(mut self, class: impl Into<String>) -> Self {
        self.storage_class = Some(class.into());
        self
    }
}

/// One page of a listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    pub bucket: String,
    pub prefix: String,
    /// Upper bound on entries in this page.
    pub max_keys: usize,
    /// Token returned by the previous page, if any.
    pub continuation: Option<String>,
}

/// One page of listed objects.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<ObjectEntry>,
    /// Present when more entries follow.
    pub next_continuation: Option<String>,
}

/// Paginated bucket listing plus the reads needed for previews.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of objects under `request.bucket` + `request.prefix`,
    /// in key order.
    async fn list_objects(&self, request: &ListRequest) -> Result<ListPage, SearchError>;

    /// Read at most `max_bytes` from the start of an object.
    async fn read_head(&self, bucket: &str, key: &str, max_bytes: usize) -> Result<Vec<u8>, SearchError>;

    /// Cheap reachability check used by health probes.
    async fn probe(&self) -> Result<(), SearchError>;
}

#[derive(Debug, Clone)]
struct StoredObject {
    entry: ObjectEntry,
    body: Vec<u8>,
}

/// In-process [`ObjectStore`] keyed by bucket then key.
///
/// Continuation tokens are the last key of the previous page.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: RwLock<BTreeMap<String, BTreeMap<String, StoredObject>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) an object with an empty body.
    pub fn insert(&self, bucket: &str, entry: ObjectEntry) {
        self.insert_with_body(bucket, entry, Vec::new());
    }

    /// Add (or replace) an object with the given body.
    pub fn insert_with_body(&self, bucket: &str, entry: ObjectEntry, body: impl Into<Vec<u8>>) {
        let mut buckets = self
            .buckets
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        buckets.entry(bucket.to_owned()).or_default().insert(
            entry.key.clone(),
            StoredObject {
                entry,
                body: body.into(),
            },
        );
    }

    /// Builder-style variant of [`MemoryObjectStore::insert`] for fixtures.
    pub fn with_objects<I>(self, bucket: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = ObjectEntry>,
    {
        for entry in entries {
            self.insert(bucket, entry);
        }
        self
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_objects(&self, request: &ListRequest) -> Result<ListPage, SearchError> {
        let buckets = self
            .buckets
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let objects = buckets
            .get(&request.bucket)
            .ok_or_else(|| SearchError::Storage(format!("bucket '{}' not found", request.bucket)))?;

        let page_size = request.max_keys.max(1);
        let mut entries = objects
            .range::<String, _>((
                request
                    .continuation
                    .clone()
                    .map_or(std::ops::Bound::Unbounded, std::ops::Bound::Excluded),
                std::ops::Bound::Unbounded,
            ))
            .filter(|(key, _)| key.starts_with(&request.prefix))
            .map(|(_, stored)| stored.entry.clone())
            .take(page_size + 1)
            .collect::<Vec<_>>();

        let next_continuation = if entries.len() > page_size {
            entries.truncate(page_size);
            entries.last().map(|e| e.key.clone())
        } else {
            None
        };
        Ok(ListPage {
            entries,
            next_continuation,
        })
    }

    async fn read_head(&self, bucket: &str, key: &str, max_bytes: usize) -> Result<Vec<u8>, SearchError> {
        let buckets = self
            .buckets
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let stored = buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| SearchError::Storage(format!("s3://{bucket}/{key} not found")))?;
        Ok(stored.body.iter().take(max_bytes).copied().collect())
    }

    async fn probe(&self) -> Result<(), SearchError> {
        Ok(())
    }
}
