//! Resolved path classifications

use jiff::Timestamp;
use serde::Serialize;

use crate::path::FsPath;

/// Whether a directory has content besides its own marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DirEmptiness {
    Empty,
    NotEmpty,
    /// Not requested by the caller, so not determined
    Unknown,
}

/// What a path denotes in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathStatus {
    File {
        size: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_modified: Option<Timestamp>,
    },
    Directory {
        emptiness: DirEmptiness,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_modified: Option<Timestamp>,
    },
    NotFound,
}

impl PathStatus {
    pub fn directory(emptiness: DirEmptiness) -> Self {
        PathStatus::Directory {
            emptiness,
            last_modified: None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, PathStatus::File { .. })
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, PathStatus::Directory { .. })
    }

    pub fn exists(&self) -> bool {
        !matches!(self, PathStatus::NotFound)
    }

    /// File length; zero for directories
    pub fn len(&self) -> u64 {
        match self {
            PathStatus::File { size, .. } => *size,
            _ => 0,
        }
    }

    pub fn emptiness(&self) -> Option<DirEmptiness> {
        match self {
            PathStatus::Directory { emptiness, .. } => Some(*emptiness),
            _ => None,
        }
    }

    pub fn last_modified(&self) -> Option<Timestamp> {
        match self {
            PathStatus::File { last_modified, .. }
            | PathStatus::Directory { last_modified, .. } => *last_modified,
            PathStatus::NotFound => None,
        }
    }
}

/// A path together with its resolved status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileStatus {
    #[serde(serialize_with = "serialize_path")]
    pub path: FsPath,
    #[serde(flatten)]
    pub status: PathStatus,
}

impl FileStatus {
    pub fn new(path: FsPath, status: PathStatus) -> Self {
        Self { path, status }
    }

    pub fn is_file(&self) -> bool {
        self.status.is_file()
    }

    pub fn is_dir(&self) -> bool {
        self.status.is_dir()
    }

    pub fn len(&self) -> u64 {
        self.status.len()
    }

    /// Human-readable size, empty for directories
    pub fn size_human(&self) -> String {
        match self.status {
            PathStatus::File { size, .. } => humansize::format_size(size, humansize::BINARY),
            _ => String::new(),
        }
    }
}

fn serialize_path<S: serde::Serializer>(path: &FsPath, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(path)
}
