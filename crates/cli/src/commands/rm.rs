//! rm command - Remove a file or directory
//!
//! Non-empty directories need `--recursive`. Removing the last entry of a
//! directory leaves a marker behind so the directory itself survives.

use clap::Args;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

use super::{fail, mount};

/// Remove a file or directory
#[derive(Args, Debug)]
pub struct RmArgs {
    /// Path to remove (s3://bucket/path)
    pub path: String,

    /// Remove directories and their contents
    #[arg(short, long)]
    pub recursive: bool,

    /// Do not fail when the path does not exist
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct RmOutput {
    status: &'static str,
    removed: Option<String>,
}

/// Execute the rm command
pub async fn execute(args: RmArgs, output_config: OutputConfig, profile: Option<&str>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let (fs, path) = match mount(&args.path, profile).await {
        Ok(mounted) => mounted,
        Err(e) => return fail(&formatter, &e),
    };
    let uri = fs.uri(&path);

    let spinner = args
        .recursive
        .then(|| ProgressBar::spinner(formatter.config(), &format!("Removing {uri}")));
    let result = fs.delete(&path, args.recursive).await;
    drop(spinner);

    match result {
        Ok(true) => {
            if formatter.is_json() {
                formatter.json(&RmOutput {
                    status: "success",
                    removed: Some(uri),
                });
            } else {
                formatter.success(&format!("Removed {uri}"));
            }
            ExitCode::Success
        }
        Ok(false) if args.force => {
            if formatter.is_json() {
                formatter.json(&RmOutput {
                    status: "success",
                    removed: None,
                });
            }
            ExitCode::Success
        }
        Ok(false) => {
            formatter.error(&format!("No such file or directory: {uri}"));
            ExitCode::NotFound
        }
        Err(e) => fail(&formatter, &e),
    }
}
