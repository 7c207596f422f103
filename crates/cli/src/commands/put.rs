//! put command - Write a file
//!
//! Reads a local file, or stdin when no source is given, and writes it to
//! the target path. Missing parent directories are implied by the key.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tokio::io::AsyncReadExt;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use super::{fail, mount};

/// Write a local file or stdin to a path
#[derive(Args, Debug)]
pub struct PutArgs {
    /// Destination path (s3://bucket/path)
    pub target: String,

    /// Local file to upload; stdin when omitted or "-"
    pub source: Option<PathBuf>,

    /// Fail if the destination already exists
    #[arg(long)]
    pub no_overwrite: bool,
}

#[derive(Debug, Serialize)]
struct PutOutput {
    status: &'static str,
    target: String,
    size_bytes: u64,
    size_human: String,
}

async fn read_source(source: Option<&PathBuf>) -> std::io::Result<Vec<u8>> {
    match source {
        Some(path) if path.as_os_str() != "-" => tokio::fs::read(path).await,
        _ => {
            let mut data = Vec::new();
            tokio::io::stdin().read_to_end(&mut data).await?;
            Ok(data)
        }
    }
}

/// Execute the put command
pub async fn execute(args: PutArgs, output_config: OutputConfig, profile: Option<&str>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let (fs, path) = match mount(&args.target, profile).await {
        Ok(mounted) => mounted,
        Err(e) => return fail(&formatter, &e),
    };

    // Refuse before reading a possibly long stdin
    let mut writer = match fs.create(&path, !args.no_overwrite).await {
        Ok(writer) => writer,
        Err(e) => return fail(&formatter, &e),
    };

    let data = match read_source(args.source.as_ref()).await {
        Ok(data) => data,
        Err(e) => {
            formatter.error(&format!("Failed to read input: {e}"));
            return ExitCode::GeneralError;
        }
    };
    writer.write(&data);

    let size = match writer.close().await {
        Ok(size) => size,
        Err(e) => return fail(&formatter, &e),
    };

    let output = PutOutput {
        status: "success",
        target: fs.uri(&path),
        size_bytes: size,
        size_human: humansize::format_size(size, humansize::BINARY),
    };
    if formatter.is_json() {
        formatter.json(&output);
    } else {
        formatter.success(&format!("{} ({})", output.target, output.size_human));
    }
    ExitCode::Success
}
