//! Path parsing and key mapping
//!
//! Filesystem paths are hierarchical (`/a/b/c`); object keys are flat
//! (`a/b/c`). An absolute path maps to exactly one key by dropping the
//! leading separator. A directory marker lives at the key plus a trailing
//! slash.

use std::fmt;
use std::str::FromStr;

use url::Url;

use crate::error::{Error, Result};

/// Path separator shared by paths and keys
pub const SEPARATOR: char = '/';

/// A normalized hierarchical path
///
/// Relative paths are only meaningful once qualified against a working
/// directory, see [`FsPath::qualify`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsPath {
    absolute: bool,
    components: Vec<String>,
}

impl FsPath {
    /// The filesystem root `/`
    pub fn root() -> Self {
        Self {
            absolute: true,
            components: Vec::new(),
        }
    }

    /// Parse a path string, collapsing `.`, `..` and repeated separators
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::InvalidPath("Path cannot be empty".into()));
        }

        let absolute = path.starts_with(SEPARATOR);
        let mut parsed = Self {
            absolute,
            components: Vec::new(),
        };
        parsed.push_components(path);
        Ok(parsed)
    }

    /// Build the absolute path that corresponds to an object key
    pub fn from_key(key: &str) -> Self {
        let mut path = Self::root();
        path.push_components(key);
        path
    }

    fn push_components(&mut self, raw: &str) {
        for part in raw.split(SEPARATOR) {
            match part {
                "" | "." => {}
                ".." => match self.components.last() {
                    Some(last) if last != ".." => {
                        self.components.pop();
                    }
                    // `/..` is still `/`
                    _ if self.absolute => {}
                    _ => self.components.push(part.to_string()),
                },
                _ => self.components.push(part.to_string()),
            }
        }
    }

    /// Whether the path starts at the root
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// Whether this is the root path
    pub fn is_root(&self) -> bool {
        self.absolute && self.components.is_empty()
    }

    /// Final component, empty for the root
    pub fn name(&self) -> &str {
        self.components.last().map(String::as_str).unwrap_or("")
    }

    /// Number of components below the root
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Get the parent path (one level up)
    ///
    /// Returns `None` for the root and for an empty relative path.
    pub fn parent(&self) -> Option<Self> {
        if self.components.is_empty() {
            return None;
        }
        let mut components = self.components.clone();
        components.pop();
        Some(Self {
            absolute: self.absolute,
            components,
        })
    }

    /// Iterate over the strict ancestors, nearest first, ending at the root
    pub fn ancestors(&self) -> impl Iterator<Item = FsPath> {
        std::iter::successors(self.parent(), FsPath::parent)
    }

    /// Join a relative child path
    pub fn join(&self, child: &str) -> Self {
        let mut joined = self.clone();
        joined.push_components(child);
        joined
    }

    /// Resolve this path against a working directory
    ///
    /// Absolute paths are returned unchanged.
    pub fn qualify(&self, working_dir: &FsPath) -> Self {
        if self.absolute {
            return self.clone();
        }
        let mut qualified = if working_dir.absolute {
            working_dir.clone()
        } else {
            working_dir.qualify(&Self::root())
        };
        qualified.push_components(&self.components.join("/"));
        qualified
    }

    /// Whether `self` is a strict ancestor of `other`
    pub fn is_ancestor_of(&self, other: &FsPath) -> bool {
        self.absolute == other.absolute
            && other.components.len() > self.components.len()
            && other.components.starts_with(&self.components)
    }

    /// Object key for this path (no leading separator, root is empty)
    ///
    /// Only meaningful for absolute paths.
    pub fn to_key(&self) -> String {
        self.components.join("/")
    }
}

impl fmt::Display for FsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "/{}", self.components.join("/"))
        } else if self.components.is_empty() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.components.join("/"))
        }
    }
}

impl FromStr for FsPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Append the directory-marker slash to a non-empty key
pub fn dir_key(key: &str) -> String {
    if key.is_empty() || key.ends_with(SEPARATOR) {
        key.to_string()
    } else {
        format!("{key}{SEPARATOR}")
    }
}

/// A path optionally scoped to a bucket, as typed by a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// URI scheme, if the input was a URI
    pub scheme: Option<String>,
    /// Bucket named by the URI authority
    pub bucket: Option<String>,
    /// Path within the bucket
    pub path: FsPath,
}

/// Parse either a plain path (`/a/b`, `a/b`) or a URI (`s3://bucket/a/b`)
pub fn parse_location(input: &str) -> Result<Location> {
    let Some((scheme, rest)) = input.split_once("://") else {
        return Ok(Location {
            scheme: None,
            bucket: None,
            path: FsPath::parse(input)?,
        });
    };

    // Validate scheme and authority; the path part is kept verbatim so that
    // keys are not percent-encoded.
    let url = Url::parse(input)?;
    let bucket = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::InvalidPath(format!("Missing bucket in '{input}'")))?
        .to_string();

    let raw_path = rest.find(SEPARATOR).map(|pos| &rest[pos..]).unwrap_or("/");

    Ok(Location {
        scheme: Some(scheme.to_string()),
        bucket: Some(bucket),
        path: FsPath::parse(raw_path)?,
    })
}
