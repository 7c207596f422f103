//! Directory emulation over a flat object store
//!
//! [`ObjectFileSystem`] gives one bucket filesystem semantics. A directory
//! exists when it is the root, when its marker object `dir/` exists, or when
//! any key starts with `dir/`. Nothing is cached: every operation resolves
//! the paths it touches again.
//!
//! Renames are a copy followed by a delete and are not atomic. A failure in
//! the middle of a directory rename can leave keys under both names.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::FsConfig;
use crate::copy::DirectoryCopy;
use crate::error::{Error, Result};
use crate::listing::DirectoryListing;
use crate::path::{FsPath, dir_key, parse_location};
use crate::probe::ProbeSet;
use crate::resolver::resolve_key;
use crate::status::{DirEmptiness, FileStatus, PathStatus};
use crate::stream::{ObjectReader, ObjectWriter};
use crate::traits::{ListRequest, MAX_DELETE_BATCH, ObjectStore};

/// URI scheme of qualified paths
pub const SCHEME: &str = "s3";

/// A bucket seen as a hierarchical filesystem
pub struct ObjectFileSystem {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    working_dir: FsPath,
    config: FsConfig,
    transfer_pool: Arc<Semaphore>,
    copy_pool: Arc<Semaphore>,
}

impl ObjectFileSystem {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, config: FsConfig) -> Result<Self> {
        config.validate()?;
        let working_dir = FsPath::parse(&config.working_dir)?;
        Ok(Self {
            store,
            bucket: bucket.into(),
            working_dir,
            transfer_pool: Arc::new(Semaphore::new(config.transfer_threads)),
            copy_pool: Arc::new(Semaphore::new(config.max_copy_threads)),
            config,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn working_directory(&self) -> &FsPath {
        &self.working_dir
    }

    /// Change the working directory; relative paths resolve against the current one
    ///
    /// The directory does not have to exist.
    pub fn set_working_directory(&mut self, path: &FsPath) {
        self.working_dir = path.qualify(&self.working_dir);
        debug!(working_dir = %self.working_dir, "Working directory changed");
    }

    /// Parse user input (`/a/b`, `a/b` or `s3://bucket/a/b`) into an absolute path
    pub fn qualify(&self, input: &str) -> Result<FsPath> {
        let location = parse_location(input)?;
        if let Some(bucket) = &location.bucket
            && *bucket != self.bucket
        {
            return Err(Error::InvalidPath(format!(
                "Wrong bucket in '{input}', expected {}",
                self.bucket
            )));
        }
        Ok(location.path.qualify(&self.working_dir))
    }

    /// Fully qualified URI of a path
    pub fn uri(&self, path: &FsPath) -> String {
        format!("{SCHEME}://{}{}", self.bucket, path.qualify(&self.working_dir))
    }

    fn absolute(&self, path: &FsPath) -> FsPath {
        path.qualify(&self.working_dir)
    }

    /// Resolve a path with the given probes
    ///
    /// # Panics
    ///
    /// When `need_empty` is set but `probes` does not include a LIST.
    pub async fn resolve(&self, path: &FsPath, probes: ProbeSet, need_empty: bool) -> Result<PathStatus> {
        let path = self.absolute(path);
        resolve_key(self.store.as_ref(), &path.to_key(), probes, need_empty).await
    }

    /// Status of an existing path
    pub async fn get_file_status(&self, path: &FsPath) -> Result<FileStatus> {
        let path = self.absolute(path);
        match self.resolve(&path, ProbeSet::ALL, false).await? {
            PathStatus::NotFound => Err(no_such_path(&path)),
            status => Ok(FileStatus::new(path, status)),
        }
    }

    pub async fn exists(&self, path: &FsPath) -> Result<bool> {
        Ok(self.resolve(path, ProbeSet::ALL, false).await?.exists())
    }

    pub async fn is_directory(&self, path: &FsPath) -> Result<bool> {
        Ok(self.resolve(path, ProbeSet::DIRECTORIES, false).await?.is_dir())
    }

    pub async fn is_file(&self, path: &FsPath) -> Result<bool> {
        Ok(self.resolve(path, ProbeSet::FILE, false).await?.is_file())
    }

    /// Lazy listing of a directory's children, or of a file itself
    ///
    /// With `resolve_directories` each sub-directory is resolved in full
    /// instead of being reported with unknown emptiness.
    pub async fn list_status_iter(&self, path: &FsPath, resolve_directories: bool) -> Result<DirectoryListing> {
        let status = self.get_file_status(path).await?;
        if status.is_file() {
            return Ok(DirectoryListing::single(Arc::clone(&self.store), status));
        }
        Ok(DirectoryListing::children(
            Arc::clone(&self.store),
            dir_key(&status.path.to_key()),
            self.config.max_paging_keys,
            resolve_directories,
        ))
    }

    /// All children of a directory, or the file itself
    pub async fn list_status(&self, path: &FsPath) -> Result<Vec<FileStatus>> {
        self.list_status_iter(path, false).await?.collect().await
    }

    /// Files below a directory, or the file itself
    pub async fn list_files(&self, path: &FsPath, recursive: bool) -> Result<DirectoryListing> {
        let status = self.get_file_status(path).await?;
        if status.is_file() {
            return Ok(DirectoryListing::single(Arc::clone(&self.store), status));
        }
        Ok(DirectoryListing::files(
            Arc::clone(&self.store),
            dir_key(&status.path.to_key()),
            self.config.max_paging_keys,
            recursive,
        ))
    }

    /// Open a writer for a new file
    ///
    /// Missing parent directories are not created; they exist implicitly
    /// once the file is written.
    pub async fn create(&self, path: &FsPath, overwrite: bool) -> Result<ObjectWriter> {
        let path = self.absolute(path);
        // Overwriting does not care whether a file is already there.
        let probes = if overwrite { ProbeSet::DIRECTORIES } else { ProbeSet::ALL };
        match self.resolve(&path, probes, false).await? {
            PathStatus::Directory { .. } => {
                return Err(Error::AlreadyExists(format!("{path} is a directory")));
            }
            PathStatus::File { .. } if !overwrite => {
                return Err(Error::AlreadyExists(format!("{path} already exists")));
            }
            _ => {}
        }
        self.check_no_file_ancestor(&path).await?;
        debug!(path = %path, overwrite, "Creating file");
        let key = path.to_key();
        Ok(ObjectWriter::new(
            Arc::clone(&self.store),
            Arc::clone(&self.transfer_pool),
            path,
            key,
        ))
    }

    /// Walk up from the parent until a directory; any file on the way fails
    async fn check_no_file_ancestor(&self, path: &FsPath) -> Result<()> {
        for ancestor in path.ancestors() {
            match self.resolve(&ancestor, ProbeSet::ALL, false).await? {
                PathStatus::Directory { .. } => break,
                PathStatus::File { .. } => {
                    return Err(Error::NotADirectory(format!(
                        "Can't create {path}, ancestor {ancestor} is a file"
                    )));
                }
                PathStatus::NotFound => {}
            }
        }
        Ok(())
    }

    /// Like [`create`](Self::create), but the parent directory must exist
    pub async fn create_non_recursive(&self, path: &FsPath, overwrite: bool) -> Result<ObjectWriter> {
        let path = self.absolute(path);
        if let Some(parent) = path.parent() {
            match self.resolve(&parent, ProbeSet::ALL, false).await? {
                PathStatus::NotFound => {
                    return Err(Error::NotFound(format!("Parent directory {parent} does not exist")));
                }
                PathStatus::File { .. } => {
                    return Err(Error::NotADirectory(format!("Parent {parent} is a file")));
                }
                PathStatus::Directory { .. } => {}
            }
        }
        self.create(&path, overwrite).await
    }

    /// Open a reader for an existing file
    pub async fn open(&self, path: &FsPath) -> Result<ObjectReader> {
        let path = self.absolute(path);
        match self.resolve(&path, ProbeSet::FILE, false).await? {
            PathStatus::File { size, .. } => {
                let key = path.to_key();
                Ok(ObjectReader::new(
                    Arc::clone(&self.store),
                    Arc::clone(&self.transfer_pool),
                    path,
                    key,
                    size,
                )
                .with_parts(self.config.part_size, self.config.max_read_ahead_parts))
            }
            PathStatus::Directory { .. } => Err(Error::IsADirectory(format!("Can't open {path}"))),
            PathStatus::NotFound => {
                // Only the failure path pays for telling directories apart.
                if self.resolve(&path, ProbeSet::DIRECTORIES, false).await?.is_dir() {
                    Err(Error::IsADirectory(format!("Can't open {path}")))
                } else {
                    Err(no_such_path(&path))
                }
            }
        }
    }

    /// Delete a file or directory
    ///
    /// Returns `false` when nothing exists at the path. After a successful
    /// delete the parent directory is kept alive by a marker if needed.
    pub async fn delete(&self, path: &FsPath, recursive: bool) -> Result<bool> {
        let path = self.absolute(path);
        if path.is_root() {
            return self.delete_root(recursive).await;
        }

        let key = path.to_key();
        match self.resolve(&path, ProbeSet::ALL, true).await? {
            PathStatus::NotFound => {
                debug!(path = %path, "Delete of missing path");
                return Ok(false);
            }
            PathStatus::File { .. } => {
                info!(path = %path, "Deleting file");
                self.store.delete_object(&key).await?;
            }
            PathStatus::Directory { emptiness, .. } => {
                let marker = dir_key(&key);
                if recursive {
                    info!(path = %path, "Deleting directory recursively");
                    self.delete_tree(&marker).await?;
                } else if emptiness == DirEmptiness::Empty {
                    info!(path = %path, "Deleting empty directory");
                    self.store.delete_object(&marker).await?;
                } else {
                    return Err(Error::DirectoryNotEmpty(path.to_string()));
                }
            }
        }

        if let Some(parent) = path.parent() {
            self.create_fake_directory_if_necessary(&parent).await?;
        }
        Ok(true)
    }

    async fn delete_root(&self, recursive: bool) -> Result<bool> {
        let probe = self.store.list_objects(&ListRequest::recursive("", 1)).await?;
        if probe.entry_count() == 0 {
            debug!(bucket = %self.bucket, "Delete of root in empty bucket");
            return Ok(true);
        }
        if recursive {
            info!(bucket = %self.bucket, "Root of a non-empty bucket is never deleted, nothing removed");
            return Ok(true);
        }
        Err(Error::CannotDeleteRoot(self.bucket.clone()))
    }

    /// Delete every key starting with `prefix`, page by page
    async fn delete_tree(&self, prefix: &str) -> Result<()> {
        let mut next = Some(ListRequest::recursive(prefix, self.config.max_paging_keys));
        let mut deleted = 0usize;
        while let Some(request) = next.take() {
            let page = self.store.list_objects(&request).await?;
            if page.truncated && page.continuation_token.is_some() {
                next = Some(request.continue_from(&page));
            }
            let keys: Vec<String> = page.objects.into_iter().map(|o| o.key).collect();
            for batch in keys.chunks(MAX_DELETE_BATCH) {
                let outcome = self.store.delete_objects(batch.to_vec()).await?;
                if let Some(first) = outcome.failed.first() {
                    return Err(Error::General(format!(
                        "Failed to delete {} of {} keys under {prefix}, first: {first}",
                        outcome.failed.len(),
                        batch.len()
                    )));
                }
                deleted += outcome.deleted.len();
            }
        }
        debug!(prefix, deleted, "Deleted tree");
        Ok(())
    }

    /// Write a marker for `path` unless the directory still exists
    ///
    /// Run after removing a child so the parent does not vanish with its
    /// last entry. The root needs no marker.
    pub async fn create_fake_directory_if_necessary(&self, path: &FsPath) -> Result<()> {
        let path = self.absolute(path);
        if path.is_root() {
            return Ok(());
        }
        let marker = dir_key(&path.to_key());
        if self.config.put_if_absent {
            if self.resolve(&path, ProbeSet::FILE, false).await?.is_file() {
                warn!(path = %path, "Parent is a file, no marker written");
                return Ok(());
            }
            let created = self.store.put_object_if_absent(&marker, Vec::new()).await?;
            debug!(key = %marker, created, "Fake directory checked");
        } else {
            match self.resolve(&path, ProbeSet::ALL, false).await? {
                PathStatus::NotFound => {
                    self.store.put_object(&marker, Vec::new()).await?;
                    debug!(key = %marker, "Fake directory created");
                }
                PathStatus::File { .. } => {
                    warn!(path = %path, "Parent is a file, no marker written");
                }
                PathStatus::Directory { .. } => {}
            }
        }
        Ok(())
    }

    /// Create a directory and, implicitly, its missing ancestors
    pub async fn mkdirs(&self, path: &FsPath) -> Result<bool> {
        let path = self.absolute(path);
        match self.resolve(&path, ProbeSet::ALL, false).await? {
            PathStatus::Directory { .. } => return Ok(true),
            PathStatus::File { .. } => {
                return Err(Error::AlreadyExists(format!("Path is a file: {path}")));
            }
            PathStatus::NotFound => {}
        }

        for ancestor in path.ancestors() {
            match self.resolve(&ancestor, ProbeSet::ALL, false).await? {
                PathStatus::Directory { .. } => break,
                PathStatus::File { .. } => {
                    return Err(Error::AlreadyExists(format!(
                        "Can't make directory for path {ancestor}, it is a file"
                    )));
                }
                PathStatus::NotFound => {}
            }
        }

        let marker = dir_key(&path.to_key());
        self.store.put_object(&marker, Vec::new()).await?;
        debug!(key = %marker, "Directory created");
        Ok(true)
    }

    /// Rename a file or directory
    ///
    /// A directory destination receives the source under its own name.
    /// Returns `false`, without touching the store, for the root and for a
    /// destination inside the source; and returns `false` when a copy
    /// failed, in which case the source is left in place.
    pub async fn rename(&self, src: &FsPath, dst: &FsPath) -> Result<bool> {
        let src = self.absolute(src);
        let dst = self.absolute(dst);
        if src.is_root() {
            debug!("Rename of root refused");
            return Ok(false);
        }
        if src.is_ancestor_of(&dst) {
            debug!(src = %src, dst = %dst, "Rename into own subtree refused");
            return Ok(false);
        }

        let src_status = self.resolve(&src, ProbeSet::ALL, false).await?;
        if !src_status.exists() {
            return Err(no_such_path(&src));
        }

        let target = match self.resolve(&dst, ProbeSet::ALL, false).await? {
            PathStatus::NotFound => {
                let parent = dst.parent().unwrap_or_else(FsPath::root);
                match self.resolve(&parent, ProbeSet::ALL, false).await? {
                    PathStatus::Directory { .. } => dst,
                    PathStatus::File { .. } => {
                        return Err(Error::NotADirectory(format!(
                            "Destination parent {parent} is a file"
                        )));
                    }
                    PathStatus::NotFound => return Err(no_such_path(&parent)),
                }
            }
            _ if dst == src => return Ok(!src_status.is_dir()),
            PathStatus::Directory { .. } => {
                let composed = dst.join(src.name());
                if composed == src {
                    return Ok(!src_status.is_dir());
                }
                match self.resolve(&composed, ProbeSet::ALL, true).await? {
                    PathStatus::Directory { .. } if src_status.is_file() => {
                        return Err(Error::AlreadyExists(format!("{composed} is a directory")));
                    }
                    PathStatus::File { .. } => {
                        return Err(Error::AlreadyExists(format!("{composed} is a file")));
                    }
                    PathStatus::Directory {
                        emptiness: DirEmptiness::NotEmpty,
                        ..
                    } => {
                        return Err(Error::AlreadyExists(format!("{composed} is a non-empty directory")));
                    }
                    _ => composed,
                }
            }
            PathStatus::File { .. } => {
                return Err(Error::AlreadyExists(format!("{dst} already exists")));
            }
        };

        info!(src = %src, dst = %target, "Renaming");
        if src_status.is_file() {
            self.store.copy_object(&src.to_key(), &target.to_key()).await?;
        } else if !self.copy_directory(&src, &target).await? {
            warn!(src = %src, dst = %target, "Directory copy failed, source kept");
            return Ok(false);
        }
        self.delete(&src, true).await?;
        Ok(true)
    }

    /// Copy every key below `src` to the same relative key below `dst`
    ///
    /// Returns `false` if `dst` lies inside `src` or any copy failed.
    pub async fn copy_directory(&self, src: &FsPath, dst: &FsPath) -> Result<bool> {
        let src_prefix = dir_key(&self.absolute(src).to_key());
        let dst_prefix = dir_key(&self.absolute(dst).to_key());
        if dst_prefix.starts_with(&src_prefix) {
            return Ok(false);
        }

        self.store.put_object(&dst_prefix, Vec::new()).await?;

        let mut copy = DirectoryCopy::new(
            Arc::clone(&self.store),
            Arc::clone(&self.copy_pool),
            self.config.max_concurrent_copy_tasks_per_dir,
        );
        let mut next = Some(ListRequest::recursive(src_prefix.as_str(), self.config.max_paging_keys));
        'pages: while let Some(request) = next.take() {
            let page = match self.store.list_objects(&request).await {
                Ok(page) => page,
                Err(e) => {
                    copy.finish().await;
                    return Err(e);
                }
            };
            if page.truncated && page.continuation_token.is_some() {
                next = Some(request.continue_from(&page));
            }
            for object in page.objects {
                let Some(relative) = object.key.strip_prefix(&src_prefix) else {
                    continue;
                };
                let target = format!("{dst_prefix}{relative}");
                if !copy.submit(object.key, target).await {
                    break 'pages;
                }
            }
        }

        let submitted = copy.submitted();
        let succeeded = copy.finish().await;
        debug!(src = %src_prefix, dst = %dst_prefix, submitted, succeeded, "Directory copied");
        Ok(succeeded)
    }
}

fn no_such_path(path: &FsPath) -> Error {
    Error::NotFound(format!("No such file or directory: {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreCall};
    use crate::traits::{DeleteOutcome, ListResult, MockObjectStore, ObjectMeta, ObjectSummary};
    use jiff::Timestamp;

    fn p(s: &str) -> FsPath {
        FsPath::parse(s).unwrap()
    }

    fn filesystem(store: &Arc<MemoryStore>) -> ObjectFileSystem {
        ObjectFileSystem::new(store.clone(), "bucket", FsConfig::default()).unwrap()
    }

    fn setup(keys: &[(&str, &str)]) -> (Arc<MemoryStore>, ObjectFileSystem) {
        let store = Arc::new(MemoryStore::new());
        for (key, data) in keys {
            store.insert(*key, *data);
        }
        let fs = filesystem(&store);
        (store, fs)
    }

    async fn write(fs: &ObjectFileSystem, path: &str, data: &[u8]) {
        let mut writer = fs.create(&p(path), true).await.unwrap();
        writer.write(data);
        writer.close().await.unwrap();
    }

    fn not_found() -> Result<ObjectMeta> {
        Err(Error::NotFound("missing".into()))
    }

    #[tokio::test]
    async fn test_missing_path_status() {
        let (_store, fs) = setup(&[]);
        let err = fs.get_file_status(&p("/nope")).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("No such file or directory: /nope"));
        assert!(!fs.exists(&p("/nope")).await.unwrap());
    }

    #[tokio::test]
    async fn test_root_is_directory_without_store_calls() {
        let (store, fs) = setup(&[("a", "x")]);
        for probes in [ProbeSet::NONE, ProbeSet::FILE, ProbeSet::ALL] {
            assert!(fs.resolve(&p("/"), probes, false).await.unwrap().is_dir());
        }
        assert!(fs.get_file_status(&p("/")).await.unwrap().is_dir());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_type_predicates() {
        let (_store, fs) = setup(&[("dir/", ""), ("dir/f", "x")]);
        assert!(fs.is_directory(&p("/dir")).await.unwrap());
        assert!(!fs.is_file(&p("/dir")).await.unwrap());
        assert!(fs.is_file(&p("/dir/f")).await.unwrap());
        assert!(!fs.is_directory(&p("/dir/f")).await.unwrap());
        assert!(fs.exists(&p("/dir/f")).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_path_is_false_every_time() {
        let (_store, fs) = setup(&[]);
        assert!(!fs.delete(&p("/missing"), false).await.unwrap());
        assert!(!fs.delete(&p("/missing"), true).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_then_status() {
        let (_store, fs) = setup(&[]);
        write(&fs, "/dir/data.bin", &[7u8; 300]).await;

        let status = fs.get_file_status(&p("/dir/data.bin")).await.unwrap();
        assert!(status.is_file());
        assert_eq!(status.len(), 300);
        assert!(fs.is_directory(&p("/dir")).await.unwrap());
    }

    #[tokio::test]
    async fn test_mkdirs_then_emptiness() {
        let (_store, fs) = setup(&[]);
        assert!(fs.mkdirs(&p("/a/b")).await.unwrap());

        let status = fs.resolve(&p("/a/b"), ProbeSet::DIRECTORIES, true).await.unwrap();
        assert_eq!(status.emptiness(), Some(DirEmptiness::Empty));

        write(&fs, "/a/b/c.txt", b"c").await;
        let status = fs.resolve(&p("/a/b"), ProbeSet::DIRECTORIES, true).await.unwrap();
        assert_eq!(status.emptiness(), Some(DirEmptiness::NotEmpty));
    }

    #[tokio::test]
    async fn test_mkdirs_writes_one_marker() {
        let (store, fs) = setup(&[]);
        assert!(fs.mkdirs(&p("/x/y/z")).await.unwrap());
        assert_eq!(store.keys(), vec!["x/y/z/".to_string()]);
        assert!(fs.is_directory(&p("/x/y")).await.unwrap());

        // existing directory
        store.clear_calls();
        assert!(fs.mkdirs(&p("/x/y")).await.unwrap());
        assert_eq!(store.count(|c| matches!(c, StoreCall::Put(_))), 0);
    }

    #[tokio::test]
    async fn test_mkdirs_on_file_fails() {
        let (_store, fs) = setup(&[("f", "x")]);
        let err = fs.mkdirs(&p("/f")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let err = fs.mkdirs(&p("/f/sub/dir")).await.unwrap_err();
        assert!(err.to_string().contains("Can't make directory for path /f, it is a file"));
    }

    #[tokio::test]
    async fn test_create_overwrite_probes_directories_only() {
        let (store, fs) = setup(&[]);
        fs.create(&p("/a.txt"), true).await.unwrap();

        assert_eq!(store.heads_of("a.txt"), 0);
        assert_eq!(store.heads_of("a.txt/"), 1);
        assert_eq!(store.lists_of("a.txt/"), 1);
        assert_eq!(store.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_create_no_overwrite_existing_file() {
        let mut mock = MockObjectStore::new();
        mock.expect_head_object()
            .withf(|key| key == "a.txt")
            .times(1)
            .returning(|key| {
                let modified: Timestamp = "2017-07-07T00:00:00Z".parse().unwrap();
                Ok(ObjectMeta::new(key, 12).with_last_modified(modified))
            });
        mock.expect_list_objects().times(0);

        let fs = ObjectFileSystem::new(Arc::new(mock), "bucket", FsConfig::default()).unwrap();
        let err = fs.create(&p("/a.txt"), false).await.err().unwrap();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert!(err.to_string().contains("/a.txt already exists"));
    }

    #[tokio::test]
    async fn test_create_on_directory_fails() {
        let (_store, fs) = setup(&[("dir/", "")]);
        let err = fs.create(&p("/dir"), true).await.err().unwrap();
        assert!(err.to_string().contains("is a directory"));
        assert!(fs.create(&p("/"), true).await.is_err());
    }

    #[tokio::test]
    async fn test_create_overwrite_replaces_file() {
        let (_store, fs) = setup(&[("f", "old content")]);
        write(&fs, "/f", b"new").await;
        assert_eq!(fs.get_file_status(&p("/f")).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_non_recursive_needs_parent() {
        let (_store, fs) = setup(&[("file", "x"), ("dir/", "")]);

        let err = fs.create_non_recursive(&p("/missing/a"), true).await.err().unwrap();
        assert!(err.is_not_found());

        let err = fs.create_non_recursive(&p("/file/a"), true).await.err().unwrap();
        assert!(matches!(err, Error::NotADirectory(_)));

        let writer = fs.create_non_recursive(&p("/dir/a"), false).await.unwrap();
        assert_eq!(writer.key(), "dir/a");
    }

    #[tokio::test]
    async fn test_delete_sole_file_recreates_parent_marker() {
        let (store, fs) = setup(&[("testdir/a.txt", "a")]);
        assert!(fs.delete(&p("/testdir/a.txt"), true).await.unwrap());

        assert_eq!(store.heads_of("testdir/a.txt"), 1);
        assert_eq!(store.heads_of("testdir/a.txt/"), 0);
        assert_eq!(store.lists_of("testdir/a.txt/"), 0);
        assert_eq!(store.count(|c| matches!(c, StoreCall::Delete(_))), 1);
        assert_eq!(store.heads_of("testdir/"), 1);
        assert_eq!(store.lists_of("testdir/"), 1);
        assert_eq!(store.count(|c| *c == StoreCall::Put("testdir/".into())), 1);

        let status = fs.get_file_status(&p("/testdir")).await.unwrap();
        assert!(status.is_dir());
    }

    #[tokio::test]
    async fn test_create_below_file_fails() {
        let (store, fs) = setup(&[("f", "x")]);
        let err = fs.create(&p("/f/child"), true).await.err().unwrap();
        assert!(matches!(err, Error::NotADirectory(_)));
        assert!(err.to_string().contains("ancestor /f is a file"));

        let err = fs.create(&p("/f/a/b"), false).await.err().unwrap();
        assert!(matches!(err, Error::NotADirectory(_)));
        assert_eq!(store.keys(), vec!["f".to_string()]);
    }

    #[tokio::test]
    async fn test_fake_directory_never_shadows_file() {
        // a child written below a file by another client
        let (store, fs) = setup(&[("f", "x"), ("f/child", "c")]);
        assert!(fs.delete(&p("/f/child"), false).await.unwrap());
        assert_eq!(store.keys(), vec!["f".to_string()]);

        let store = Arc::new(MemoryStore::new());
        store.insert("f", "x");
        store.insert("f/child", "c");
        let config = FsConfig {
            put_if_absent: true,
            ..Default::default()
        };
        let fs = ObjectFileSystem::new(store.clone(), "bucket", config).unwrap();
        assert!(fs.delete(&p("/f/child"), false).await.unwrap());
        assert_eq!(store.count(|c| matches!(c, StoreCall::PutIfAbsent(_))), 0);
        assert_eq!(store.keys(), vec!["f".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_with_sibling_needs_no_marker() {
        let (store, fs) = setup(&[("d/a", "a"), ("d/b", "b")]);
        assert!(fs.delete(&p("/d/a"), false).await.unwrap());
        assert_eq!(store.count(|c| matches!(c, StoreCall::Put(_))), 0);
        assert_eq!(store.keys(), vec!["d/b".to_string()]);
    }

    #[tokio::test]
    async fn test_conditional_put_marker_policy() {
        let store = Arc::new(MemoryStore::new());
        store.insert("testdir/a.txt", "a");
        let config = FsConfig {
            put_if_absent: true,
            ..Default::default()
        };
        let fs = ObjectFileSystem::new(store.clone(), "bucket", config).unwrap();

        assert!(fs.delete(&p("/testdir/a.txt"), false).await.unwrap());
        assert_eq!(store.count(|c| *c == StoreCall::PutIfAbsent("testdir/".into())), 1);
        assert_eq!(store.heads_of("testdir/"), 0);
        assert!(store.contains("testdir/"));
    }

    #[tokio::test]
    async fn test_delete_directory_recursively() {
        let (store, fs) = setup(&[
            ("testdir/", ""),
            ("testdir/a.txt", "a"),
            ("testdir/sub/b.txt", "b"),
            ("other", "o"),
        ]);
        assert!(fs.delete(&p("/testdir/"), true).await.unwrap());

        assert_eq!(store.keys(), vec!["other".to_string()]);
        assert_eq!(store.count(|c| matches!(c, StoreCall::DeleteBatch(_))), 1);
        // parent is the root, which needs no marker
        assert_eq!(store.count(|c| matches!(c, StoreCall::Put(_))), 0);
    }

    #[tokio::test]
    async fn test_recursive_delete_batches_large_directories() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..2500 {
            store.insert(format!("big/{i:05}"), "");
        }
        let fs = filesystem(&store);
        assert!(fs.delete(&p("/big"), true).await.unwrap());

        let batches: Vec<usize> = store
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::DeleteBatch(keys) => Some(keys.len()),
                _ => None,
            })
            .collect();
        assert_eq!(batches, vec![1000, 1000, 500]);
        assert!(store.keys().is_empty());
    }

    #[tokio::test]
    async fn test_delete_non_empty_directory_needs_recursive() {
        let (store, fs) = setup(&[("dir/", ""), ("dir/f", "x")]);
        let err = fs.delete(&p("/dir"), false).await.unwrap_err();
        assert!(matches!(err, Error::DirectoryNotEmpty(_)));
        assert_eq!(store.keys().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_empty_directory_removes_marker() {
        let (store, fs) = setup(&[("parent/", ""), ("parent/dir/", "")]);
        assert!(fs.delete(&p("/parent/dir"), false).await.unwrap());
        assert_eq!(store.keys(), vec!["parent/".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_root() {
        let (store, fs) = setup(&[]);
        assert!(fs.delete(&p("/"), false).await.unwrap());

        store.insert("keep", "x");
        assert!(fs.delete(&p("/"), true).await.unwrap());
        assert!(store.contains("keep"));

        let err = fs.delete(&p("/"), false).await.unwrap_err();
        assert!(matches!(err, Error::CannotDeleteRoot(ref b) if b == "bucket"));
    }

    #[tokio::test]
    async fn test_batch_delete_failure_is_error() {
        let mut mock = MockObjectStore::new();
        mock.expect_head_object().returning(|_| not_found());
        mock.expect_list_objects()
            .withf(|req| req.delimiter.is_some())
            .returning(|_| {
                Ok(ListResult {
                    objects: vec![ObjectSummary::new("dir/a", 1), ObjectSummary::new("dir/b", 1)],
                    ..Default::default()
                })
            });
        mock.expect_list_objects()
            .withf(|req| req.delimiter.is_none())
            .times(1)
            .returning(|_| {
                Ok(ListResult {
                    objects: vec![ObjectSummary::new("dir/a", 1), ObjectSummary::new("dir/b", 1)],
                    ..Default::default()
                })
            });
        mock.expect_delete_objects().times(1).returning(|keys| {
            Ok(DeleteOutcome {
                deleted: vec![keys[0].clone()],
                failed: vec![keys[1].clone()],
            })
        });
        mock.expect_put_object().times(0);

        let fs = ObjectFileSystem::new(Arc::new(mock), "bucket", FsConfig::default()).unwrap();
        let err = fs.delete(&p("/dir"), true).await.unwrap_err();
        assert!(err.to_string().contains("first: dir/b"));
    }

    #[tokio::test]
    async fn test_store_failure_propagates_from_delete() {
        let mut mock = MockObjectStore::new();
        mock.expect_head_object()
            .returning(|_| Err(Error::Network("timed out".into())));
        mock.expect_delete_object().times(0);

        let fs = ObjectFileSystem::new(Arc::new(mock), "bucket", FsConfig::default()).unwrap();
        let err = fs.delete(&p("/a"), true).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
    }

    #[tokio::test]
    async fn test_rename_into_own_subtree_refused() {
        let (store, fs) = setup(&[("src/", ""), ("src/f", "x")]);
        assert!(!fs.rename(&p("/src"), &p("/src/inner/dst")).await.unwrap());
        assert!(!fs.rename(&p("/"), &p("/elsewhere")).await.unwrap());
        assert_eq!(store.count(|c| matches!(c, StoreCall::Copy { .. })), 0);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rename_directory() {
        let (store, fs) = setup(&[("srcdir/", ""), ("srcdir/file.txt", "hello")]);
        assert!(fs.rename(&p("/srcdir"), &p("/destdir")).await.unwrap());

        let copies: Vec<(String, String)> = store
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::Copy { src, dst } => Some((src, dst)),
                _ => None,
            })
            .collect();
        assert_eq!(copies.len(), 2);
        assert!(copies.contains(&("srcdir/".into(), "destdir/".into())));
        assert!(copies.contains(&("srcdir/file.txt".into(), "destdir/file.txt".into())));

        assert!(fs.get_file_status(&p("/srcdir")).await.unwrap_err().is_not_found());
        let moved = fs.get_file_status(&p("/destdir/file.txt")).await.unwrap();
        assert!(moved.is_file());
        assert_eq!(moved.len(), 5);
    }

    #[tokio::test]
    async fn test_rename_file_into_directory() {
        let (store, fs) = setup(&[("a/f.txt", "f"), ("b/", "")]);
        assert!(fs.rename(&p("/a/f.txt"), &p("/b")).await.unwrap());
        assert!(store.contains("b/f.txt"));
        assert!(!store.contains("a/f.txt"));
        // source parent kept alive
        assert!(store.contains("a/"));
    }

    #[tokio::test]
    async fn test_rename_directory_into_directory() {
        let (store, fs) = setup(&[("src/", ""), ("src/x", "x"), ("dst/", "")]);
        assert!(fs.rename(&p("/src"), &p("/dst")).await.unwrap());
        assert!(store.contains("dst/src/x"));
        assert!(!store.contains("src/x"));
    }

    #[tokio::test]
    async fn test_rename_onto_existing_file_fails() {
        let (_store, fs) = setup(&[("a", "a"), ("b", "b")]);
        let err = fs.rename(&p("/a"), &p("/b")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_rename_into_directory_with_taken_name_fails() {
        let (_store, fs) = setup(&[("f", "x"), ("dir/f", "y"), ("src/", ""), ("src/1", "1"), ("dir/src/2", "2")]);
        let err = fs.rename(&p("/f"), &p("/dir")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));

        let err = fs.rename(&p("/src"), &p("/dir")).await.unwrap_err();
        assert!(err.to_string().contains("non-empty directory"));
    }

    #[tokio::test]
    async fn test_rename_file_onto_empty_directory_of_same_name_fails() {
        let (store, fs) = setup(&[("f", "x"), ("d/", ""), ("d/f/", "")]);
        let err = fs.rename(&p("/f"), &p("/d")).await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(store.count(|c| matches!(c, StoreCall::Copy { .. })), 0);
        assert_eq!(store.keys(), vec!["d/", "d/f/", "f"]);

        // a directory may still land on an empty one
        store.insert("src/", "");
        store.insert("src/1", "1");
        store.insert("d/src/", "");
        assert!(fs.rename(&p("/src"), &p("/d")).await.unwrap());
        assert!(store.contains("d/src/1"));
    }

    #[tokio::test]
    async fn test_rename_to_missing_parent_fails() {
        let (_store, fs) = setup(&[("a", "a"), ("file", "x")]);
        let err = fs.rename(&p("/a"), &p("/nowhere/b")).await.unwrap_err();
        assert!(err.is_not_found());

        let err = fs.rename(&p("/a"), &p("/file/b")).await.unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_rename_missing_source_fails() {
        let (_store, fs) = setup(&[]);
        let err = fs.rename(&p("/nothing"), &p("/b")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_rename_to_itself() {
        let (store, fs) = setup(&[("f", "x"), ("d/", "")]);
        assert!(fs.rename(&p("/f"), &p("/f")).await.unwrap());
        assert!(!fs.rename(&p("/d"), &p("/d")).await.unwrap());
        assert!(store.contains("f"));
        assert!(store.contains("d/"));
    }

    #[tokio::test]
    async fn test_rename_keeps_source_when_copy_fails() {
        let (store, fs) = setup(&[("src/", ""), ("src/a", "a"), ("src/b", "b")]);
        store.fail_copy_of("src/a");

        assert!(!fs.rename(&p("/src"), &p("/dst")).await.unwrap());
        assert!(store.contains("src/a"));
        assert!(store.contains("src/b"));
        assert_eq!(store.count(|c| matches!(c, StoreCall::Delete(_) | StoreCall::DeleteBatch(_))), 0);
    }

    #[tokio::test]
    async fn test_rename_file_copy_error_propagates() {
        let (store, fs) = setup(&[("a", "a")]);
        store.fail_copy_of("a");
        let err = fs.rename(&p("/a"), &p("/b")).await.unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert!(store.contains("a"));
    }

    #[tokio::test]
    async fn test_copy_directory_refuses_nested_target() {
        let (store, fs) = setup(&[("src/a", "a")]);
        assert!(!fs.copy_directory(&p("/src"), &p("/src/deeper")).await.unwrap());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_copy_directory_across_pages() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..12 {
            store.insert(format!("src/{i:02}"), "x");
        }
        let config = FsConfig {
            max_paging_keys: 5,
            max_concurrent_copy_tasks_per_dir: 2,
            ..Default::default()
        };
        let fs = ObjectFileSystem::new(store.clone(), "bucket", config).unwrap();

        assert!(fs.copy_directory(&p("/src"), &p("/dst")).await.unwrap());
        assert!(store.contains("dst/"));
        for i in 0..12 {
            assert!(store.contains(&format!("dst/{i:02}")));
        }
        assert_eq!(store.lists_of("src/"), 3);
    }

    #[tokio::test]
    async fn test_list_status() {
        let (_store, fs) = setup(&[("dir/", ""), ("dir/a", "aa"), ("dir/sub/b", "b")]);
        let entries = fs.list_status(&p("/dir")).await.unwrap();
        let names: Vec<String> = entries.iter().map(|e| e.path.to_string()).collect();
        assert_eq!(names, vec!["/dir/a", "/dir/sub"]);
        assert!(entries[1].is_dir());

        let single = fs.list_status(&p("/dir/a")).await.unwrap();
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].len(), 2);

        assert!(fs.list_status(&p("/none")).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_list_root() {
        let (_store, fs) = setup(&[("a", "a"), ("d/b", "b")]);
        let entries = fs.list_status(&p("/")).await.unwrap();
        let names: Vec<String> = entries.iter().map(|e| e.path.to_string()).collect();
        assert_eq!(names, vec!["/a", "/d"]);
    }

    #[tokio::test]
    async fn test_list_files_recursive() {
        let (_store, fs) = setup(&[("dir/", ""), ("dir/a", "a"), ("dir/sub/", ""), ("dir/sub/b", "b")]);
        let files = fs.list_files(&p("/dir"), true).await.unwrap().collect().await.unwrap();
        let names: Vec<String> = files.iter().map(|e| e.path.to_string()).collect();
        assert_eq!(names, vec!["/dir/a", "/dir/sub/b"]);

        let files = fs.list_files(&p("/dir"), false).await.unwrap().collect().await.unwrap();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_open_and_read() {
        let (_store, fs) = setup(&[("dir/f", "file content")]);
        let reader = fs.open(&p("/dir/f")).await.unwrap();
        assert_eq!(reader.len(), 12);
        assert_eq!(reader.read_to_end().await.unwrap(), b"file content");

        let err = fs.open(&p("/dir")).await.err().unwrap();
        assert!(matches!(err, Error::IsADirectory(_)));
        let err = fs.open(&p("/")).await.err().unwrap();
        assert!(matches!(err, Error::IsADirectory(_)));
        let err = fs.open(&p("/dir/none")).await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_working_directory() {
        let store = Arc::new(MemoryStore::new());
        store.insert("home/user/notes.txt", "n");
        let mut fs = filesystem(&store);
        assert_eq!(fs.working_directory(), &FsPath::root());

        fs.set_working_directory(&p("home/user"));
        assert_eq!(fs.working_directory(), &p("/home/user"));
        assert!(fs.is_file(&p("notes.txt")).await.unwrap());
        assert_eq!(fs.qualify("../other").unwrap(), p("/home/other"));
        assert_eq!(fs.uri(&p("notes.txt")), "s3://bucket/home/user/notes.txt");
    }

    #[tokio::test]
    async fn test_configured_working_directory() {
        let config = FsConfig {
            working_dir: "/data".into(),
            ..Default::default()
        };
        let fs = ObjectFileSystem::new(Arc::new(MemoryStore::new()), "bucket", config).unwrap();
        assert_eq!(fs.qualify("x").unwrap(), p("/data/x"));
    }

    #[test]
    fn test_qualify_checks_bucket() {
        let fs = ObjectFileSystem::new(Arc::new(MemoryStore::new()), "bucket", FsConfig::default()).unwrap();
        assert_eq!(fs.qualify("s3://bucket/a/b").unwrap(), p("/a/b"));
        assert!(matches!(fs.qualify("s3://other/a"), Err(Error::InvalidPath(_))));
    }

    #[tokio::test]
    #[should_panic(expected = "without a LIST probe")]
    async fn test_emptiness_requires_list_probe() {
        let (_store, fs) = setup(&[]);
        let _ = fs.resolve(&p("/dir"), ProbeSet::DIRECTORIES.without(crate::probe::Probe::List), true).await;
    }
}
