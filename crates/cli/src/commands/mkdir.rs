//! mkdir command - Create directories
//!
//! Missing parents are created along the way. Only the deepest directory
//! gets a marker object; its ancestors exist implicitly as prefixes.

use clap::Args;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use super::{fail, mount};

/// Create directories and their missing parents
#[derive(Args, Debug)]
pub struct MkdirArgs {
    /// Directories to create (s3://bucket/path)
    #[arg(required = true)]
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize)]
struct MkdirOutput {
    status: &'static str,
    created: Vec<String>,
}

/// Execute the mkdir command
pub async fn execute(args: MkdirArgs, output_config: OutputConfig, profile: Option<&str>) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let mut created = Vec::with_capacity(args.paths.len());

    for target in &args.paths {
        let (fs, path) = match mount(target, profile).await {
            Ok(mounted) => mounted,
            Err(e) => return fail(&formatter, &e),
        };
        if let Err(e) = fs.mkdirs(&path).await {
            return fail(&formatter, &e);
        }
        let uri = fs.uri(&path);
        formatter.success(&format!("Created directory {uri}"));
        created.push(uri);
    }

    if formatter.is_json() {
        formatter.json(&MkdirOutput {
            status: "success",
            created,
        });
    }
    ExitCode::Success
}
