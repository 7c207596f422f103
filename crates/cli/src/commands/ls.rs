//! ls command - List a directory
//!
//! Lists the immediate children of a directory, or every file below it with
//! `--recursive`. Listing a file shows just that file.

use bfs_core::{FileStatus, FsPath};
use clap::Args;
use comfy_table::{Cell, CellAlignment, Table, presets};
use futures::TryStreamExt;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use super::{fail, mount};

/// List a directory
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Path (s3://bucket/path)
    pub path: String,

    /// List every file below the directory instead of its children
    #[arg(short, long)]
    pub recursive: bool,

    /// Resolve the marker of each sub-directory to report its modification time
    #[arg(long)]
    pub resolve: bool,

    /// Summarize output (show totals only)
    #[arg(long)]
    pub summarize: bool,
}

/// Output structure for ls command (JSON format)
#[derive(Debug, Serialize)]
struct LsOutput {
    items: Vec<LsEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Summary>,
}

#[derive(Debug, Serialize)]
struct LsEntry {
    name: String,
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<String>,
}

#[derive(Debug, Serialize)]
struct Summary {
    total_files: usize,
    total_directories: usize,
    total_size_bytes: u64,
    total_size_human: String,
}

impl Summary {
    fn of(entries: &[FileStatus]) -> Self {
        let total_files = entries.iter().filter(|e| e.is_file()).count();
        let total_size_bytes = entries.iter().map(FileStatus::len).sum();
        Self {
            total_files,
            total_directories: entries.len() - total_files,
            total_size_bytes,
            total_size_human: humansize::format_size(total_size_bytes, humansize::BINARY),
        }
    }
}

/// Name of an entry relative to the listed path
fn relative_name(base: &FsPath, entry: &FsPath) -> String {
    if base == entry {
        return entry.name().to_string();
    }
    let prefix = if base.is_root() {
        "/".to_string()
    } else {
        format!("{base}/")
    };
    let full = entry.to_string();
    full.strip_prefix(&prefix).unwrap_or(&full).to_string()
}

fn entry_of(base: &FsPath, status: &FileStatus) -> LsEntry {
    LsEntry {
        name: relative_name(base, &status.path),
        kind: if status.is_dir() { "directory" } else { "file" },
        size_bytes: status.is_file().then(|| status.len()),
        last_modified: status.status.last_modified().map(|ts| ts.to_string()),
    }
}

fn render_table(formatter: &Formatter, base: &FsPath, entries: &[FileStatus]) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    for status in entries {
        let modified = status
            .status
            .last_modified()
            .map(|ts| ts.strftime("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let name = relative_name(base, &status.path);
        let name = if status.is_dir() {
            formatter.directory_name(&format!("{name}/"))
        } else {
            name
        };
        table.add_row(vec![
            Cell::new(modified),
            Cell::new(status.size_human()).set_alignment(CellAlignment::Right),
            Cell::new(name),
        ]);
    }
    table
}

/// Execute the ls command
pub async fn execute(args: LsArgs, output_config: OutputConfig, profile: Option<&str>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let (fs, path) = match mount(&args.path, profile).await {
        Ok(mounted) => mounted,
        Err(e) => return fail(&formatter, &e),
    };

    let listing = if args.recursive {
        fs.list_files(&path, true).await
    } else {
        fs.list_status_iter(&path, args.resolve).await
    };
    let entries: Vec<FileStatus> = match listing {
        Ok(listing) => match listing.into_stream().try_collect().await {
            Ok(entries) => entries,
            Err(e) => return fail(&formatter, &e),
        },
        Err(e) => return fail(&formatter, &e),
    };

    let summary = args.summarize.then(|| Summary::of(&entries));

    if formatter.is_json() {
        let output = LsOutput {
            items: entries.iter().map(|e| entry_of(&path, e)).collect(),
            summary,
        };
        formatter.json(&output);
        return ExitCode::Success;
    }

    if !args.summarize && !entries.is_empty() {
        formatter.println(&render_table(&formatter, &path, &entries).to_string());
    }
    if let Some(summary) = summary {
        formatter.println(&format!(
            "Total: {} files, {} directories, {}",
            summary.total_files, summary.total_directories, summary.total_size_human
        ));
    }
    ExitCode::Success
}
