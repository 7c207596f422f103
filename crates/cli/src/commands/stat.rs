//! stat command - Show the status of a path
//!
//! Resolves the path the way every filesystem operation does: as a file,
//! then as a directory marker, then as a prefix with children.

use std::fmt;

use bfs_core::{FileStatus, PathStatus};
use clap::Args;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use super::{fail, mount};

/// Show the status of a path
#[derive(Args, Debug)]
pub struct StatArgs {
    /// Path (s3://bucket/path)
    pub path: String,
}

#[derive(Debug, Serialize)]
struct StatOutput {
    uri: String,
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_human: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<String>,
}

impl StatOutput {
    fn new(uri: String, status: &FileStatus) -> Self {
        let name = if status.path.is_root() {
            "/".to_string()
        } else {
            status.path.name().to_string()
        };
        let (kind, size_bytes, size_human) = match status.status {
            PathStatus::File { size, .. } => ("file", Some(size), Some(status.size_human())),
            _ => ("directory", None, None),
        };
        Self {
            uri,
            name,
            kind,
            size_bytes,
            size_human,
            last_modified: status.status.last_modified().map(|ts| ts.to_string()),
        }
    }
}

impl fmt::Display for StatOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Name      : {}", self.name)?;
        writeln!(f, "URI       : {}", self.uri)?;
        write!(f, "Type      : {}", self.kind)?;
        if let (Some(bytes), Some(human)) = (self.size_bytes, &self.size_human) {
            write!(f, "\nSize      : {human} ({bytes} bytes)")?;
        }
        if let Some(modified) = &self.last_modified {
            write!(f, "\nModified  : {modified}")?;
        }
        Ok(())
    }
}

/// Execute the stat command
pub async fn execute(args: StatArgs, output_config: OutputConfig, profile: Option<&str>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let (fs, path) = match mount(&args.path, profile).await {
        Ok(mounted) => mounted,
        Err(e) => return fail(&formatter, &e),
    };

    match fs.get_file_status(&path).await {
        Ok(status) => {
            formatter.output(&StatOutput::new(fs.uri(&path), &status));
            ExitCode::Success
        }
        Err(e) => fail(&formatter, &e),
    }
}
