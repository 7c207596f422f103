//! In-memory object store
//!
//! Behaves like a single S3 bucket with strong consistency. Every request
//! is recorded so callers can assert exactly which store calls an operation
//! issued.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Mutex;

use async_trait::async_trait;
use jiff::Timestamp;

use crate::error::{Error, Result};
use crate::traits::{DeleteOutcome, ListRequest, ListResult, ObjectMeta, ObjectStore, ObjectSummary};

/// A request received by a [`MemoryStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Head(String),
    List { prefix: String, delimiter: bool },
    Get(String),
    Put(String),
    PutIfAbsent(String),
    Copy { src: String, dst: String },
    Delete(String),
    DeleteBatch(Vec<String>),
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: Timestamp,
}

/// Bucket held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    calls: Mutex<Vec<StoreCall>>,
    page_limit: Option<usize>,
    failing_copies: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap every LIST page at `limit` entries regardless of `max_keys`
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = Some(limit.max(1));
        self
    }

    /// Seed an object without recording a call
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.lock_objects().insert(
            key.into(),
            StoredObject {
                data: data.into(),
                last_modified: Timestamp::now(),
            },
        );
    }

    /// Make every COPY whose source is `src_key` fail with a network error
    pub fn fail_copy_of(&self, src_key: impl Into<String>) {
        lock(&self.failing_copies).push(src_key.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock_objects().contains_key(key)
    }

    /// All keys currently stored, in order
    pub fn keys(&self) -> Vec<String> {
        self.lock_objects().keys().cloned().collect()
    }

    /// Requests received so far, in arrival order
    pub fn calls(&self) -> Vec<StoreCall> {
        lock(&self.calls).clone()
    }

    /// Number of recorded requests matching `pred`
    pub fn count(&self, pred: impl Fn(&StoreCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| pred(c)).count()
    }

    pub fn heads_of(&self, key: &str) -> usize {
        self.count(|c| matches!(c, StoreCall::Head(k) if k == key))
    }

    pub fn lists_of(&self, prefix: &str) -> usize {
        self.count(|c| matches!(c, StoreCall::List { prefix: p, .. } if p == prefix))
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    fn record(&self, call: StoreCall) {
        lock(&self.calls).push(call);
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>> {
        lock(&self.objects)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    // A panic while holding the guard cannot leave the map half-updated.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Entry {
    Object(ObjectSummary),
    Prefix(String),
}

impl Entry {
    fn key(&self) -> &str {
        match self {
            Entry::Object(o) => &o.key,
            Entry::Prefix(p) => p,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, key: &str) -> Result<ObjectMeta> {
        self.record(StoreCall::Head(key.to_string()));
        let objects = self.lock_objects();
        let object = objects
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        Ok(ObjectMeta::new(key, object.data.len() as u64).with_last_modified(object.last_modified))
    }

    async fn list_objects(&self, request: &ListRequest) -> Result<ListResult> {
        self.record(StoreCall::List {
            prefix: request.prefix.clone(),
            delimiter: request.delimiter.is_some(),
        });

        let objects = self.lock_objects();
        let mut entries: Vec<Entry> = Vec::new();
        for (key, object) in objects.range(request.prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&request.prefix) else {
                break;
            };
            let grouped = request
                .delimiter
                .as_deref()
                .and_then(|d| rest.find(d).map(|pos| pos + d.len()));
            match grouped {
                Some(end) => {
                    let prefix = format!("{}{}", request.prefix, &rest[..end]);
                    if !matches!(entries.last(), Some(Entry::Prefix(p)) if *p == prefix) {
                        entries.push(Entry::Prefix(prefix));
                    }
                }
                None => entries.push(Entry::Object(ObjectSummary {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    last_modified: Some(object.last_modified),
                })),
            }
        }

        if let Some(token) = &request.continuation_token {
            entries.retain(|e| e.key() > token.as_str());
        }

        let mut limit = usize::try_from(request.max_keys.max(1)).unwrap_or(1);
        if let Some(cap) = self.page_limit {
            limit = limit.min(cap);
        }
        let truncated = entries.len() > limit;
        entries.truncate(limit);

        let mut result = ListResult {
            truncated,
            continuation_token: if truncated {
                entries.last().map(|e| e.key().to_string())
            } else {
                None
            },
            ..Default::default()
        };
        for entry in entries {
            match entry {
                Entry::Object(o) => result.objects.push(o),
                Entry::Prefix(p) => result.common_prefixes.push(p),
            }
        }
        Ok(result)
    }

    async fn get_object(&self, key: &str, range: Option<Range<u64>>) -> Result<Vec<u8>> {
        self.record(StoreCall::Get(key.to_string()));
        let objects = self.lock_objects();
        let object = objects
            .get(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        let len = object.data.len() as u64;
        let range = range.unwrap_or(0..len);
        let start = range.start.min(len) as usize;
        let end = range.end.min(len) as usize;
        Ok(object.data[start..end.max(start)].to_vec())
    }

    async fn put_object(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.record(StoreCall::Put(key.to_string()));
        self.insert(key, data);
        Ok(())
    }

    async fn put_object_if_absent(&self, key: &str, data: Vec<u8>) -> Result<bool> {
        self.record(StoreCall::PutIfAbsent(key.to_string()));
        let mut objects = self.lock_objects();
        if objects.contains_key(key) {
            return Ok(false);
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                last_modified: Timestamp::now(),
            },
        );
        Ok(true)
    }

    async fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<()> {
        self.record(StoreCall::Copy {
            src: src_key.to_string(),
            dst: dst_key.to_string(),
        });
        if lock(&self.failing_copies).iter().any(|k| k == src_key) {
            return Err(Error::Network(format!("injected copy failure for {src_key}")));
        }
        let mut objects = self.lock_objects();
        let object = objects
            .get(src_key)
            .cloned()
            .ok_or_else(|| Error::NotFound(src_key.to_string()))?;
        objects.insert(
            dst_key.to_string(),
            StoredObject {
                last_modified: Timestamp::now(),
                ..object
            },
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.record(StoreCall::Delete(key.to_string()));
        self.lock_objects().remove(key);
        Ok(())
    }

    async fn delete_objects(&self, keys: Vec<String>) -> Result<DeleteOutcome> {
        self.record(StoreCall::DeleteBatch(keys.clone()));
        let mut objects = self.lock_objects();
        for key in &keys {
            objects.remove(key);
        }
        Ok(DeleteOutcome {
            deleted: keys,
            failed: Vec::new(),
        })
    }
}
