//! ObjectStore trait definition
//!
//! This trait is the only thing the filesystem layer knows about the
//! backing store. Implementations report a missing key as
//! [`Error::NotFound`](crate::Error::NotFound); every other error is treated
//! as fatal by the callers.

use std::ops::Range;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Largest batch accepted by a single multi-object delete
pub const MAX_DELETE_BATCH: usize = 1000;

/// Metadata returned by a HEAD request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Object key
    pub key: String,

    /// Size in bytes
    pub size: u64,

    /// Last modified timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,

    /// ETag (usually MD5 for single-part uploads)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl ObjectMeta {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
            etag: None,
        }
    }

    pub fn with_last_modified(mut self, ts: Timestamp) -> Self {
        self.last_modified = Some(ts);
        self
    }
}

/// One object entry of a LIST page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
}

impl ObjectSummary {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
        }
    }
}

/// Parameters of a single LIST call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Only keys starting with this prefix are returned
    pub prefix: String,

    /// Delimiter for grouping into common prefixes (usually "/")
    pub delimiter: Option<String>,

    /// Maximum number of entries (objects plus prefixes) per page
    pub max_keys: i32,

    /// Opaque token from the previous page
    pub continuation_token: Option<String>,
}

impl ListRequest {
    /// One level below `prefix`, grouped by `/`
    pub fn shallow(prefix: impl Into<String>, max_keys: i32) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: Some("/".to_string()),
            max_keys,
            continuation_token: None,
        }
    }

    /// Every key below `prefix`
    pub fn recursive(prefix: impl Into<String>, max_keys: i32) -> Self {
        Self {
            prefix: prefix.into(),
            delimiter: None,
            max_keys,
            continuation_token: None,
        }
    }

    /// The request for the page following `previous`
    pub fn continue_from(&self, previous: &ListResult) -> Self {
        Self {
            continuation_token: previous.continuation_token.clone(),
            ..self.clone()
        }
    }
}

/// Result of a list operation (one page)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResult {
    /// Object entries, in key order
    pub objects: Vec<ObjectSummary>,

    /// Grouped sub-prefixes (only with a delimiter)
    pub common_prefixes: Vec<String>,

    /// Whether the result is truncated (more items available)
    pub truncated: bool,

    /// Continuation token for pagination
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

impl ListResult {
    /// Number of entries of any kind in this page
    pub fn entry_count(&self) -> usize {
        self.objects.len() + self.common_prefixes.len()
    }

    /// Append the entries of a following page
    pub fn absorb(&mut self, next: ListResult) {
        self.objects.extend(next.objects);
        self.common_prefixes.extend(next.common_prefixes);
        self.truncated = next.truncated;
        self.continuation_token = next.continuation_token;
    }
}

/// Per-key result of a batch delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted: Vec<String>,
    pub failed: Vec<String>,
}

/// Trait for S3-compatible storage operations scoped to one bucket
///
/// This trait is implemented by the S3 adapter and the in-memory store and
/// can be mocked for testing.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get object metadata
    async fn head_object(&self, key: &str) -> Result<ObjectMeta>;

    /// List one page of objects
    async fn list_objects(&self, request: &ListRequest) -> Result<ListResult>;

    /// Get object content, optionally a byte range of it
    async fn get_object(&self, key: &str, range: Option<Range<u64>>) -> Result<Vec<u8>>;

    /// Store an object, replacing any existing one
    async fn put_object(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Store an object only if the key is absent; `false` if it existed
    async fn put_object_if_absent(&self, key: &str, data: Vec<u8>) -> Result<bool>;

    /// Server-side copy within the bucket
    async fn copy_object(&self, src_key: &str, dst_key: &str) -> Result<()>;

    /// Delete a single object
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Delete up to [`MAX_DELETE_BATCH`] objects
    async fn delete_objects(&self, keys: Vec<String>) -> Result<DeleteOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_request_continue_from() {
        let request = ListRequest::shallow("dir/", 2);
        let page = ListResult {
            truncated: true,
            continuation_token: Some("token2".into()),
            ..Default::default()
        };
        let next = request.continue_from(&page);
        assert_eq!(next.prefix, "dir/");
        assert_eq!(next.delimiter.as_deref(), Some("/"));
        assert_eq!(next.continuation_token.as_deref(), Some("token2"));
    }

    #[test]
    fn test_list_result_absorb() {
        let mut first = ListResult {
            objects: vec![ObjectSummary::new("dir/", 0)],
            truncated: true,
            continuation_token: Some("t".into()),
            ..Default::default()
        };
        first.absorb(ListResult {
            common_prefixes: vec!["dir/sub/".into()],
            ..Default::default()
        });
        assert_eq!(first.entry_count(), 2);
        assert!(!first.truncated);
        assert!(first.continuation_token.is_none());
    }
}
