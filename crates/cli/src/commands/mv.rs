//! mv command - Rename a file or directory
//!
//! Both paths must be in the same bucket. Moving onto an existing directory
//! places the source inside it. Directory renames copy every object and
//! only remove the source once all copies have succeeded.

use clap::Args;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

use super::{fail, mount};

/// Rename a file or directory
#[derive(Args, Debug)]
pub struct MvArgs {
    /// Source path (s3://bucket/path)
    pub source: String,

    /// Destination path in the same bucket (s3://bucket/path or a path relative to the root)
    pub target: String,
}

#[derive(Debug, Serialize)]
struct MvOutput {
    status: &'static str,
    source: String,
    target: String,
}

/// Execute the mv command
pub async fn execute(args: MvArgs, output_config: OutputConfig, profile: Option<&str>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let (fs, src) = match mount(&args.source, profile).await {
        Ok(mounted) => mounted,
        Err(e) => return fail(&formatter, &e),
    };
    let dst = match fs.qualify(&args.target) {
        Ok(dst) => dst,
        Err(e) => return fail(&formatter, &e),
    };
    let (source, target) = (fs.uri(&src), fs.uri(&dst));

    let spinner = ProgressBar::spinner(formatter.config(), &format!("Renaming {source}"));
    let result = fs.rename(&src, &dst).await;
    drop(spinner);

    match result {
        Ok(true) => {
            if formatter.is_json() {
                formatter.json(&MvOutput {
                    status: "success",
                    source,
                    target,
                });
            } else {
                formatter.success(&format!("{source} -> {target}"));
            }
            ExitCode::Success
        }
        Ok(false) => {
            formatter.error(&format!("Cannot rename {source} to {target}"));
            ExitCode::GeneralError
        }
        Err(e) => fail(&formatter, &e),
    }
}
