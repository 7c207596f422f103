//! CLI command definitions and execution
//!
//! Every command that touches a bucket takes `s3://bucket/path` arguments,
//! mounts the bucket with [`mount`] and reports failures through
//! [`fail`], which maps the error onto an exit code.

use std::sync::Arc;

use bfs_core::config::Defaults;
use bfs_core::fs::SCHEME;
use bfs_core::{ConfigManager, Error, FsPath, ObjectFileSystem, ProfileManager, Result, parse_location};
use bfs_s3::S3Store;
use clap::{Parser, Subcommand};
use tracing::debug;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

mod cat;
mod completions;
mod ls;
mod mkdir;
mod mv;
mod profile;
mod put;
mod rm;
mod stat;

/// bfs - hierarchical filesystem view of an S3 bucket
///
/// Directories are emulated with marker objects and key prefixes, so the
/// usual file operations work on any S3-compatible store.
#[derive(Parser, Debug)]
#[command(name = "bfs")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true, default_value = "false")]
    pub no_color: bool,

    /// Disable progress spinners
    #[arg(long, global = true, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, default_value = "false")]
    pub quiet: bool,

    /// Enable debug logging
    #[arg(long, global = true, default_value = "false")]
    pub debug: bool,

    /// Store profile to use instead of the configured default
    #[arg(long, global = true, env = "BFS_PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the status of a path
    Stat(stat::StatArgs),

    /// List a directory
    Ls(ls::LsArgs),

    /// Create directories and their missing parents
    Mkdir(mkdir::MkdirArgs),

    /// Remove a file or directory
    Rm(rm::RmArgs),

    /// Rename a file or directory
    Mv(mv::MvArgs),

    /// Write a local file or stdin to a path
    Put(put::PutArgs),

    /// Print the contents of a file
    Cat(cat::CatArgs),

    /// Check the type of a path; exits 0 when the check holds, 1 otherwise
    Test(test::TestArgs),

    /// Manage store profiles
    #[command(subcommand)]
    Profile(profile::ProfileCommands),

    /// Generate shell completion scripts
    Completions(completions::CompletionsArgs),
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    // An unreadable config file is reported by the command that mounts a bucket.
    let defaults = ConfigManager::new()
        .and_then(|manager| manager.load())
        .map(|config| config.defaults)
        .unwrap_or_default();
    if defaults.color == "always" && !cli.no_color {
        console::set_colors_enabled(true);
        console::set_colors_enabled_stderr(true);
    }
    let output_config = output_config(&cli, &defaults);
    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Stat(args) => stat::execute(args, output_config, profile).await,
        Commands::Ls(args) => ls::execute(args, output_config, profile).await,
        Commands::Mkdir(args) => mkdir::execute(args, output_config, profile).await,
        Commands::Rm(args) => rm::execute(args, output_config, profile).await,
        Commands::Mv(args) => mv::execute(args, output_config, profile).await,
        Commands::Put(args) => put::execute(args, output_config, profile).await,
        Commands::Cat(args) => cat::execute(args, output_config, profile).await,
        Commands::Test(args) => test::execute(args, output_config, profile).await,
        Commands::Profile(cmd) => profile::execute(cmd, output_config).await,
        Commands::Completions(args) => completions::execute(args),
    }
}

/// Command-line flags win; the configured defaults can only switch features off
fn output_config(cli: &Cli, defaults: &Defaults) -> OutputConfig {
    OutputConfig {
        json: cli.json || defaults.output == "json",
        no_color: cli.no_color || defaults.color == "never",
        no_progress: cli.no_progress || !defaults.progress,
        quiet: cli.quiet,
    }
}

/// Bucket named by an `s3://bucket/path` argument
fn bucket_of(target: &str) -> Result<String> {
    let location = parse_location(target)?;
    match (location.scheme.as_deref(), location.bucket) {
        (Some(SCHEME), Some(bucket)) => Ok(bucket),
        _ => Err(Error::InvalidPath(format!(
            "Expected {SCHEME}://bucket/path, got '{target}'"
        ))),
    }
}

/// Open the filesystem of the bucket named by `target` and resolve the path in it
pub(crate) async fn mount(target: &str, profile: Option<&str>) -> Result<(ObjectFileSystem, FsPath)> {
    let bucket = bucket_of(target)?;

    let config_manager = ConfigManager::new()?;
    let config = config_manager.load()?;
    let profile = ProfileManager::with_config_manager(config_manager).select(profile)?;
    debug!(profile = %profile.name, endpoint = %profile.endpoint, %bucket, "Mounting bucket");

    let store = S3Store::new(&profile, bucket.clone()).await?;
    let fs = ObjectFileSystem::new(Arc::new(store), bucket, config.fs)?;
    let path = fs.qualify(target)?;
    Ok((fs, path))
}

/// Report a failed operation and pick its exit code
pub(crate) fn fail(formatter: &Formatter, error: &Error) -> ExitCode {
    formatter.error(&error.to_string());
    ExitCode::from_error(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_bucket_of_uri() {
        assert_eq!(bucket_of("s3://data/a/b").unwrap(), "data");
        assert_eq!(bucket_of("s3://data").unwrap(), "data");
    }

    #[test]
    fn test_bucket_of_rejects_plain_paths() {
        assert!(matches!(bucket_of("/a/b"), Err(Error::InvalidPath(_))));
        assert!(matches!(bucket_of("a/b"), Err(Error::InvalidPath(_))));
        assert!(matches!(bucket_of("gs://data/a"), Err(Error::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_mount_rejects_plain_path_before_loading_config() {
        let err = mount("/local/file", None).await.err().expect("mount should fail");
        assert_eq!(ExitCode::from_error(&err), ExitCode::UsageError);
    }

    #[test]
    fn test_output_config_falls_back_to_configured_defaults() {
        let cli = Cli::try_parse_from(["bfs", "ls", "s3://b/dir"]).unwrap();
        let plain = output_config(&cli, &Defaults::default());
        assert!(!plain.json);
        assert!(!plain.no_color);
        assert!(!plain.no_progress);

        let defaults = Defaults {
            output: "json".to_string(),
            color: "never".to_string(),
            progress: false,
            profile: None,
        };
        let configured = output_config(&cli, &defaults);
        assert!(configured.json);
        assert!(configured.no_color);
        assert!(configured.no_progress);
        assert!(!configured.quiet);
    }

    #[test]
    fn test_output_flags_override_configured_defaults() {
        let cli = Cli::try_parse_from(["bfs", "--json", "--no-color", "--no-progress", "ls", "s3://b"])
            .unwrap();
        let config = output_config(&cli, &Defaults::default());
        assert!(config.json);
        assert!(config.no_color);
        assert!(config.no_progress);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bfs", "ls", "s3://b/dir", "--json", "--profile", "dev"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.profile.as_deref(), Some("dev"));
        assert!(matches!(cli.command, Commands::Ls(_)));
    }
}
