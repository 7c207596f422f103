//! Error types for bfs-core
//!
//! A single error type is shared by the store adapters and the filesystem
//! layer. `NotFound` doubles as the control-flow signal used while probing.

use thiserror::Error;

/// Result type alias for bfs-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for bfs-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid path format
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Profile not found
    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    /// Profile already exists
    #[error("Profile already exists: {0}")]
    ProfileExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Authentication or authorization failure reported by the store
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Key or path does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure talking to the store
    #[error("Network error: {0}")]
    Network(String),

    /// Target path already exists (file or directory)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// An ancestor or target that must be a directory is a file
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A file operation was attempted on a directory
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// Non-recursive removal of a directory with content
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// The bucket root cannot be removed
    #[error("Cannot delete root path of bucket {0}")]
    CannotDeleteRoot(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether this error is the store's "no such key" signal
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidPath(_) | Error::Config(_) | Error::InvalidUrl(_) => 2, // UsageError
            Error::Network(_) => 3,                                                // NetworkError
            Error::Auth(_) => 4,                                                   // AuthError
            Error::NotFound(_) | Error::ProfileNotFound(_) => 5,                   // NotFound
            Error::AlreadyExists(_)
            | Error::NotADirectory(_)
            | Error::IsADirectory(_)
            | Error::DirectoryNotEmpty(_)
            | Error::CannotDeleteRoot(_)
            | Error::ProfileExists(_) => 6, // Conflict
            _ => 1,                         // GeneralError
        }
    }
}
