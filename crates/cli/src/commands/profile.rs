//! Profile management commands
//!
//! Profiles are named references to S3-compatible storage endpoints,
//! including connection details, credentials and the LIST dialect.

use bfs_core::{ConfigManager, ListVersion, Profile, ProfileManager, Result};
use clap::{Subcommand, ValueEnum};
use comfy_table::{Table, presets};
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

use super::fail;

/// Profile subcommands for managing storage endpoints
#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Add or update a profile
    Set(SetArgs),

    /// List all configured profiles
    List,

    /// Remove a profile
    Remove(RemoveArgs),
}

/// LIST dialect accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListVersionArg {
    V1,
    V2,
}

impl From<ListVersionArg> for ListVersion {
    fn from(arg: ListVersionArg) -> Self {
        match arg {
            ListVersionArg::V1 => ListVersion::V1,
            ListVersionArg::V2 => ListVersion::V2,
        }
    }
}

/// Arguments for the `profile set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Profile name (e.g., "local", "prod")
    pub name: String,

    /// S3 endpoint URL (e.g., "http://localhost:9000", "https://s3.amazonaws.com")
    pub endpoint: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// AWS region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Bucket lookup style
    #[arg(long, default_value = "auto", value_parser = ["auto", "path", "dns"])]
    pub bucket_lookup: String,

    /// LIST API version spoken by the endpoint
    #[arg(long, value_enum, default_value = "v2")]
    pub list_version: ListVersionArg,

    /// Use this profile when no --profile is given
    #[arg(long)]
    pub default: bool,
}

/// Arguments for the `profile remove` command
#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Name of the profile to remove
    pub name: String,
}

/// Profile information for output (without secrets)
#[derive(Debug, Serialize)]
struct ProfileInfo {
    name: String,
    endpoint: String,
    region: String,
    bucket_lookup: String,
    list_version: ListVersion,
    default: bool,
}

impl ProfileInfo {
    fn new(profile: &Profile, default: Option<&str>) -> Self {
        Self {
            name: profile.name.clone(),
            endpoint: profile.endpoint.clone(),
            region: profile.region.clone(),
            bucket_lookup: profile.bucket_lookup.clone(),
            list_version: profile.list_version,
            default: default == Some(profile.name.as_str()),
        }
    }
}

#[derive(Debug, Serialize)]
struct ProfileListOutput {
    profiles: Vec<ProfileInfo>,
}

#[derive(Debug, Serialize)]
struct ProfileOperationOutput {
    success: bool,
    profile: String,
    message: String,
}

/// Execute a profile subcommand
pub async fn execute(cmd: ProfileCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let config_manager = match ConfigManager::new() {
        Ok(cm) => cm,
        Err(e) => return fail(&formatter, &e),
    };

    let result = match cmd {
        ProfileCommands::Set(args) => execute_set(args, config_manager, &formatter),
        ProfileCommands::List => execute_list(config_manager, &formatter),
        ProfileCommands::Remove(args) => execute_remove(args, config_manager, &formatter),
    };
    match result {
        Ok(()) => ExitCode::Success,
        Err(e) => fail(&formatter, &e),
    }
}

fn report(formatter: &Formatter, profile: &str, message: String) {
    if formatter.is_json() {
        formatter.json(&ProfileOperationOutput {
            success: true,
            profile: profile.to_string(),
            message,
        });
    } else {
        formatter.success(&message);
    }
}

fn execute_set(args: SetArgs, config_manager: ConfigManager, formatter: &Formatter) -> Result<()> {
    if args.name.is_empty() {
        return Err(bfs_core::Error::Config("Profile name cannot be empty".into()));
    }

    let mut profile = Profile::new(&args.name, &args.endpoint, &args.access_key, &args.secret_key);
    profile.region = args.region;
    profile.bucket_lookup = args.bucket_lookup;
    profile.list_version = args.list_version.into();

    let manager = ProfileManager::with_config_manager(config_manager.clone());
    manager.set(profile)?;

    if args.default {
        let mut config = config_manager.load()?;
        config.defaults.profile = Some(args.name.clone());
        config_manager.save(&config)?;
    }

    report(formatter, &args.name, format!("Profile '{}' configured", args.name));
    Ok(())
}

fn execute_list(config_manager: ConfigManager, formatter: &Formatter) -> Result<()> {
    let config = config_manager.load()?;
    let default = config.defaults.profile.as_deref();
    let profiles: Vec<ProfileInfo> = config
        .profiles
        .iter()
        .map(|p| ProfileInfo::new(p, default))
        .collect();

    if formatter.is_json() {
        formatter.json(&ProfileListOutput { profiles });
        return Ok(());
    }
    if profiles.is_empty() {
        formatter.println("No profiles configured");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_header(vec!["NAME", "ENDPOINT", "REGION", "LOOKUP", "LIST"]);
    for info in &profiles {
        let name = if info.default {
            format!("{} *", info.name)
        } else {
            info.name.clone()
        };
        let list = match info.list_version {
            ListVersion::V1 => "v1",
            ListVersion::V2 => "v2",
        };
        table.add_row(vec![
            name,
            info.endpoint.clone(),
            info.region.clone(),
            info.bucket_lookup.clone(),
            list.to_string(),
        ]);
    }
    formatter.println(&table.to_string());
    Ok(())
}

fn execute_remove(args: RemoveArgs, config_manager: ConfigManager, formatter: &Formatter) -> Result<()> {
    ProfileManager::with_config_manager(config_manager.clone()).remove(&args.name)?;

    let mut config = config_manager.load()?;
    if config.defaults.profile.as_deref() == Some(args.name.as_str()) {
        config.defaults.profile = None;
        config_manager.save(&config)?;
    }

    report(formatter, &args.name, format!("Profile '{}' removed", args.name));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, ConfigManager) {
        let dir = TempDir::new().unwrap();
        let config_manager = ConfigManager::with_path(dir.path().join("config.toml"));
        (dir, config_manager)
    }

    fn quiet() -> Formatter {
        Formatter::new(OutputConfig {
            quiet: true,
            ..Default::default()
        })
    }

    fn set_args(name: &str, default: bool) -> SetArgs {
        SetArgs {
            name: name.into(),
            endpoint: "http://localhost:9000".into(),
            access_key: "key".into(),
            secret_key: "secret".into(),
            region: "us-east-1".into(),
            bucket_lookup: "path".into(),
            list_version: ListVersionArg::V1,
            default,
        }
    }

    #[test]
    fn test_set_default_then_remove() {
        let (_dir, config_manager) = manager();
        execute_set(set_args("local", true), config_manager.clone(), &quiet()).unwrap();

        let config = config_manager.load().unwrap();
        assert_eq!(config.defaults.profile.as_deref(), Some("local"));
        assert_eq!(config.profiles[0].list_version, ListVersion::V1);

        let remove = RemoveArgs {
            name: "local".into(),
        };
        execute_remove(remove, config_manager.clone(), &quiet()).unwrap();
        let config = config_manager.load().unwrap();
        assert!(config.profiles.is_empty());
        assert!(config.defaults.profile.is_none());
    }

    #[test]
    fn test_remove_unknown_profile() {
        let (_dir, config_manager) = manager();
        let remove = RemoveArgs {
            name: "ghost".into(),
        };
        let err = execute_remove(remove, config_manager, &quiet()).unwrap_err();
        assert_eq!(ExitCode::from_error(&err), ExitCode::NotFound);
    }

    #[test]
    fn test_profile_info_hides_secrets() {
        let profile = Profile::new("p", "http://e", "key", "secret");
        let json = serde_json::to_string(&ProfileInfo::new(&profile, Some("p"))).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("\"default\":true"));
        assert!(json.contains("\"list_version\":\"v2\""));
    }
}
