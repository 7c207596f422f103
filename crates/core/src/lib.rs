//! bfs-core: hierarchical filesystem semantics over a flat object store
//!
//! This crate provides the core functionality for bucketfs, including:
//! - Configuration and store profile management
//! - Path parsing and path-to-key mapping
//! - ObjectStore trait for the backing store, plus an in-memory implementation
//! - Path status resolution driven by probe sets
//! - Directory emulation: create, delete, rename, mkdirs and listings
//!
//! This crate is designed to be independent of any specific S3 SDK,
//! allowing for easy testing and alternative backends.

pub mod config;
pub mod copy;
pub mod error;
pub mod fs;
pub mod listing;
pub mod memory;
pub mod path;
pub mod probe;
pub mod profile;
pub mod resolver;
pub mod status;
pub mod stream;
pub mod traits;

pub use config::{Config, ConfigManager, FsConfig};
pub use error::{Error, Result};
pub use fs::ObjectFileSystem;
pub use listing::DirectoryListing;
pub use memory::MemoryStore;
pub use path::{FsPath, Location, dir_key, parse_location};
pub use probe::{Probe, ProbeSet};
pub use profile::{ListVersion, Profile, ProfileManager};
pub use status::{DirEmptiness, FileStatus, PathStatus};
pub use stream::{ObjectReader, ObjectWriter};
pub use traits::{DeleteOutcome, ListRequest, ListResult, ObjectMeta, ObjectStore, ObjectSummary};
