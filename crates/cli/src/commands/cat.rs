//! cat command - Print the contents of a file
//!
//! The file is fetched in ranged parts with a bounded read-ahead and
//! written to stdout as the parts arrive.

use std::pin::pin;

use clap::Args;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use super::{fail, mount};

/// Print the contents of a file
#[derive(Args, Debug)]
pub struct CatArgs {
    /// File path (s3://bucket/path)
    pub path: String,
}

/// Execute the cat command
pub async fn execute(args: CatArgs, output_config: OutputConfig, profile: Option<&str>) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let (fs, path) = match mount(&args.path, profile).await {
        Ok(mounted) => mounted,
        Err(e) => return fail(&formatter, &e),
    };

    let reader = match fs.open(&path).await {
        Ok(reader) => reader,
        Err(e) => return fail(&formatter, &e),
    };

    let mut stdout = tokio::io::stdout();
    let mut parts = pin!(reader.parts());
    while let Some(part) = parts.next().await {
        let part = match part {
            Ok(part) => part,
            Err(e) => return fail(&formatter, &e),
        };
        if let Err(e) = stdout.write_all(&part).await {
            formatter.error(&format!("Failed to write output: {e}"));
            return ExitCode::GeneralError;
        }
    }
    if let Err(e) = stdout.flush().await {
        formatter.error(&format!("Failed to write output: {e}"));
        return ExitCode::GeneralError;
    }

    ExitCode::Success
}
