//! Object read and write streams
//!
//! Writers buffer everything and upload once on [`ObjectWriter::close`].
//! Readers fetch fixed-size ranged parts and keep a bounded number of part
//! fetches in flight. Both take a permit from the filesystem's transfer pool
//! for every request they make.

use std::ops::Range;
use std::sync::Arc;

use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{Error, Result};
use crate::path::FsPath;
use crate::traits::ObjectStore;

/// Output stream of a newly created file
pub struct ObjectWriter {
    store: Arc<dyn ObjectStore>,
    transfer: Arc<Semaphore>,
    path: FsPath,
    key: String,
    buffer: Vec<u8>,
}

impl ObjectWriter {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        transfer: Arc<Semaphore>,
        path: FsPath,
        key: String,
    ) -> Self {
        Self {
            store,
            transfer,
            path,
            key,
            buffer: Vec::new(),
        }
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Bytes buffered so far
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn write(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Upload the buffered content and return its size
    ///
    /// An existing object at the key is replaced.
    pub async fn close(self) -> Result<u64> {
        let _permit = self
            .transfer
            .acquire()
            .await
            .map_err(|_| Error::General("transfer pool closed".into()))?;
        let size = self.buffer.len() as u64;
        self.store.put_object(&self.key, self.buffer).await?;
        debug!(key = %self.key, size, "Uploaded");
        Ok(size)
    }
}

/// Input stream of an existing file
pub struct ObjectReader {
    store: Arc<dyn ObjectStore>,
    transfer: Arc<Semaphore>,
    path: FsPath,
    key: String,
    len: u64,
    part_size: u64,
    read_ahead: usize,
}

impl ObjectReader {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        transfer: Arc<Semaphore>,
        path: FsPath,
        key: String,
        len: u64,
    ) -> Self {
        Self {
            store,
            transfer,
            path,
            key,
            len,
            part_size: 8 * 1024 * 1024,
            read_ahead: 1,
        }
    }

    /// Part size and read-ahead depth; zero values are raised to one
    pub fn with_parts(mut self, part_size: u64, read_ahead: usize) -> Self {
        self.part_size = part_size.max(1);
        self.read_ahead = read_ahead.max(1);
        self
    }

    pub fn path(&self) -> &FsPath {
        &self.path
    }

    /// Length of the file when it was opened
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read a byte range, clamped to the file length
    pub async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>> {
        let end = range.end.min(self.len);
        if range.start >= end {
            return Ok(Vec::new());
        }
        let _permit = self
            .transfer
            .acquire()
            .await
            .map_err(|_| Error::General("transfer pool closed".into()))?;
        self.store.get_object(&self.key, Some(range.start..end)).await
    }

    /// Stream the parts in order, prefetching up to the read-ahead depth
    pub fn parts(&self) -> impl Stream<Item = Result<Vec<u8>>> + '_ {
        stream::iter(part_ranges(self.len, self.part_size))
            .map(move |range| self.read_range(range))
            .buffered(self.read_ahead)
    }

    /// Read the whole file
    pub async fn read_to_end(&self) -> Result<Vec<u8>> {
        let capacity = usize::try_from(self.len).unwrap_or(0);
        self.parts()
            .try_fold(Vec::with_capacity(capacity), |mut acc, part| async move {
                acc.extend_from_slice(&part);
                Ok(acc)
            })
            .await
    }
}

/// Byte ranges of the parts of a `len`-byte object, in order
fn part_ranges(len: u64, part: u64) -> impl Iterator<Item = Range<u64>> {
    (0..len.div_ceil(part)).map(move |i| i * part..((i + 1) * part).min(len))
}
