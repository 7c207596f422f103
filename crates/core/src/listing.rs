//! Lazy directory listings
//!
//! Pages are pulled from the store one at a time. The next page is requested
//! only once every entry of the current one has been handed out, and only if
//! the store said the previous page was truncated.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, Stream};
use tracing::debug;

use crate::error::Result;
use crate::path::FsPath;
use crate::probe::ProbeSet;
use crate::resolver::resolve_key;
use crate::status::{DirEmptiness, FileStatus, PathStatus};
use crate::traits::{ListRequest, ListResult, ObjectStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Children of one directory, sub-directories included
    Status { resolve_directories: bool },
    /// Files only, at any depth when the request has no delimiter
    Files,
}

/// Pull-based iterator over [`FileStatus`] entries
pub struct DirectoryListing {
    store: Arc<dyn ObjectStore>,
    dir_key: String,
    mode: Mode,
    next_request: Option<ListRequest>,
    pending: VecDeque<FileStatus>,
}

impl DirectoryListing {
    /// Listing of a path that is a file: the file itself
    pub(crate) fn single(store: Arc<dyn ObjectStore>, status: FileStatus) -> Self {
        Self {
            store,
            dir_key: String::new(),
            mode: Mode::Files,
            next_request: None,
            pending: VecDeque::from([status]),
        }
    }

    /// Immediate children of the directory at `dir_key`
    pub(crate) fn children(
        store: Arc<dyn ObjectStore>,
        dir_key: String,
        page_size: i32,
        resolve_directories: bool,
    ) -> Self {
        Self {
            store,
            next_request: Some(ListRequest::shallow(dir_key.clone(), page_size)),
            dir_key,
            mode: Mode::Status {
                resolve_directories,
            },
            pending: VecDeque::new(),
        }
    }

    /// Files below the directory at `dir_key`, recursively or not
    pub(crate) fn files(
        store: Arc<dyn ObjectStore>,
        dir_key: String,
        page_size: i32,
        recursive: bool,
    ) -> Self {
        let request = if recursive {
            ListRequest::recursive(dir_key.clone(), page_size)
        } else {
            ListRequest::shallow(dir_key.clone(), page_size)
        };
        Self {
            store,
            next_request: Some(request),
            dir_key,
            mode: Mode::Files,
            pending: VecDeque::new(),
        }
    }

    /// Next entry, fetching a new page when the current one is used up
    pub async fn next(&mut self) -> Result<Option<FileStatus>> {
        loop {
            if let Some(status) = self.pending.pop_front() {
                return Ok(Some(status));
            }
            let Some(request) = self.next_request.take() else {
                return Ok(None);
            };

            let page = self.store.list_objects(&request).await?;
            debug!(
                prefix = %request.prefix,
                objects = page.objects.len(),
                prefixes = page.common_prefixes.len(),
                truncated = page.truncated,
                "Fetched listing page"
            );
            if page.truncated {
                if page.continuation_token.is_some() {
                    self.next_request = Some(request.continue_from(&page));
                } else {
                    debug!(prefix = %request.prefix, "Truncated page without continuation token");
                }
            }
            self.accept(page).await?;
        }
    }

    async fn accept(&mut self, page: ListResult) -> Result<()> {
        for object in page.objects {
            // Markers: the listed directory's own, or any in a recursive listing
            if object.key == self.dir_key || object.key.ends_with('/') {
                continue;
            }
            self.pending.push_back(FileStatus::new(
                FsPath::from_key(&object.key),
                PathStatus::File {
                    size: object.size,
                    last_modified: object.last_modified,
                },
            ));
        }

        let Mode::Status {
            resolve_directories,
        } = self.mode
        else {
            return Ok(());
        };
        for prefix in page.common_prefixes {
            if prefix == self.dir_key {
                continue;
            }
            let status = if resolve_directories {
                let key = prefix.trim_end_matches('/');
                resolve_key(self.store.as_ref(), key, ProbeSet::ALL, false).await?
            } else {
                PathStatus::directory(DirEmptiness::Unknown)
            };
            self.pending
                .push_back(FileStatus::new(FsPath::from_key(&prefix), status));
        }
        Ok(())
    }

    /// Stop after the current entry; no further pages are requested
    fn exhaust(&mut self) {
        self.next_request = None;
        self.pending.clear();
    }

    /// Drain every remaining entry
    pub async fn collect(mut self) -> Result<Vec<FileStatus>> {
        let mut entries = Vec::new();
        while let Some(status) = self.next().await? {
            entries.push(status);
        }
        Ok(entries)
    }

    /// Adapt into a stream that ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<FileStatus>> + Send {
        stream::unfold(self, |mut listing| async move {
            match listing.next().await {
                Ok(Some(status)) => Some((Ok(status), listing)),
                Ok(None) => None,
                Err(e) => {
                    listing.exhaust();
                    Some((Err(e), listing))
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::{MemoryStore, StoreCall};
    use crate::traits::MockObjectStore;
    use futures::StreamExt;

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store.insert("dir/", "");
        store.insert("dir/a.txt", "aaa");
        store.insert("dir/b.txt", "bb");
        store.insert("dir/sub/", "");
        store.insert("dir/sub/c.txt", "c");
        store.insert("dir/implicit/d.txt", "d");
        Arc::new(store)
    }

    fn names(entries: &[FileStatus]) -> Vec<String> {
        entries.iter().map(|e| e.path.to_string()).collect()
    }

    #[tokio::test]
    async fn test_children_skip_own_marker() {
        let store = store();
        let listing = DirectoryListing::children(store.clone(), "dir/".into(), 1000, false);
        let entries = listing.collect().await.unwrap();
        assert_eq!(
            names(&entries),
            vec!["/dir/a.txt", "/dir/b.txt", "/dir/implicit", "/dir/sub"]
        );
        assert!(entries[0].is_file());
        assert_eq!(entries[0].len(), 3);
        assert_eq!(entries[3].status.emptiness(), Some(DirEmptiness::Unknown));
        assert_eq!(store.lists_of("dir/"), 1);
    }

    #[tokio::test]
    async fn test_pages_fetched_lazily() {
        let store = store();
        let mut listing = DirectoryListing::children(store.clone(), "dir/".into(), 2, false);
        assert_eq!(store.lists_of("dir/"), 0);

        // "dir/" and "dir/a.txt" make up the first page
        let first = listing.next().await.unwrap().unwrap();
        assert_eq!(first.path.to_string(), "/dir/a.txt");
        assert_eq!(store.lists_of("dir/"), 1);

        let second = listing.next().await.unwrap().unwrap();
        assert_eq!(second.path.to_string(), "/dir/b.txt");
        assert_eq!(store.lists_of("dir/"), 2);

        let rest = listing.collect().await.unwrap();
        assert_eq!(names(&rest), vec!["/dir/implicit", "/dir/sub"]);
        assert_eq!(store.lists_of("dir/"), 3);
    }

    #[tokio::test]
    async fn test_resolved_directories() {
        let store = store();
        let listing = DirectoryListing::children(store.clone(), "dir/".into(), 1000, true);
        let entries = listing.collect().await.unwrap();
        let sub = entries.iter().find(|e| e.path.name() == "sub").unwrap();
        assert!(sub.is_dir());
        assert!(sub.status.last_modified().is_some());
        assert_eq!(store.heads_of("dir/sub"), 1);
    }

    #[tokio::test]
    async fn test_single_file_listing() {
        let store = store();
        let status = FileStatus::new(
            FsPath::from_key("dir/a.txt"),
            PathStatus::File {
                size: 3,
                last_modified: None,
            },
        );
        let entries = DirectoryListing::single(store.clone(), status.clone())
            .collect()
            .await
            .unwrap();
        assert_eq!(entries, vec![status]);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recursive_files_skip_markers() {
        let store = store();
        let entries = DirectoryListing::files(store.clone(), "dir/".into(), 2, true)
            .collect()
            .await
            .unwrap();
        assert_eq!(
            names(&entries),
            vec!["/dir/a.txt", "/dir/b.txt", "/dir/implicit/d.txt", "/dir/sub/c.txt"]
        );
        assert!(store.count(|c| matches!(c, StoreCall::List { delimiter: false, .. })) >= 3);
    }

    #[tokio::test]
    async fn test_shallow_files_only() {
        let store = store();
        let entries = DirectoryListing::files(store.clone(), "dir/".into(), 1000, false)
            .collect()
            .await
            .unwrap();
        assert_eq!(names(&entries), vec!["/dir/a.txt", "/dir/b.txt"]);
    }

    #[tokio::test]
    async fn test_stream_ends_after_error() {
        let mut mock = MockObjectStore::new();
        mock.expect_list_objects()
            .times(1)
            .returning(|_| Err(Error::Network("reset".into())));
        let listing = DirectoryListing::children(Arc::new(mock), "dir/".into(), 10, false);

        let results: Vec<_> = listing.into_stream().collect().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::Network(_))));
    }
}
