//! Profile management
//!
//! Profiles are named references to S3-compatible storage endpoints,
//! including connection details, credentials and listing dialect.

use serde::{Deserialize, Serialize};

use crate::config::ConfigManager;
use crate::error::{Error, Result};

/// LIST API dialect spoken by the endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListVersion {
    /// ListObjects with `marker`
    V1,
    /// ListObjectsV2 with continuation tokens
    #[default]
    V2,
}

/// A profile represents a named S3-compatible storage endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Unique name for this profile
    pub name: String,

    /// S3 endpoint URL
    pub endpoint: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,

    /// Bucket lookup style: "auto", "path", or "dns"
    #[serde(default = "default_bucket_lookup")]
    pub bucket_lookup: String,

    /// LIST dialect
    #[serde(default)]
    pub list_version: ListVersion,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket_lookup() -> String {
    "auto".to_string()
}

impl Profile {
    /// Create a new profile with required fields
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            region: default_region(),
            bucket_lookup: default_bucket_lookup(),
            list_version: ListVersion::default(),
        }
    }

    /// Whether requests address buckets by path rather than virtual host
    pub fn force_path_style(&self) -> bool {
        // "auto" means path style, which every S3-compatible server accepts
        self.bucket_lookup != "dns"
    }
}

/// Manager for profile operations
pub struct ProfileManager {
    config_manager: ConfigManager,
}

impl ProfileManager {
    /// Create a new ProfileManager with a specific ConfigManager
    pub fn with_config_manager(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    /// Create a new ProfileManager using the default config location
    pub fn new() -> Result<Self> {
        let config_manager = ConfigManager::new()?;
        Ok(Self { config_manager })
    }

    /// List all configured profiles
    pub fn list(&self) -> Result<Vec<Profile>> {
        let config = self.config_manager.load()?;
        Ok(config.profiles)
    }

    /// Get a profile by name
    pub fn get(&self, name: &str) -> Result<Profile> {
        let config = self.config_manager.load()?;
        config
            .profiles
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| Error::ProfileNotFound(name.to_string()))
    }

    /// Resolve the profile to use: the named one, else the configured
    /// default, else the only profile there is
    pub fn select(&self, name: Option<&str>) -> Result<Profile> {
        let config = self.config_manager.load()?;
        let wanted = name.map(str::to_string).or(config.defaults.profile);
        match wanted {
            Some(name) => config
                .profiles
                .into_iter()
                .find(|p| p.name == name)
                .ok_or(Error::ProfileNotFound(name)),
            None => {
                let mut profiles = config.profiles;
                if profiles.len() == 1 {
                    Ok(profiles.remove(0))
                } else {
                    Err(Error::Config(
                        "No profile selected; pass --profile or set defaults.profile".into(),
                    ))
                }
            }
        }
    }

    /// Add or update a profile
    pub fn set(&self, profile: Profile) -> Result<()> {
        let mut config = self.config_manager.load()?;

        config.profiles.retain(|p| p.name != profile.name);
        config.profiles.push(profile);

        self.config_manager.save(&config)
    }

    /// Add a profile, failing if the name is taken
    pub fn add(&self, profile: Profile) -> Result<()> {
        if self.exists(&profile.name)? {
            return Err(Error::ProfileExists(profile.name));
        }
        self.set(profile)
    }

    /// Remove a profile
    pub fn remove(&self, name: &str) -> Result<()> {
        let mut config = self.config_manager.load()?;
        let original_len = config.profiles.len();

        config.profiles.retain(|p| p.name != name);

        if config.profiles.len() == original_len {
            return Err(Error::ProfileNotFound(name.to_string()));
        }

        self.config_manager.save(&config)
    }

    /// Check if a profile exists
    pub fn exists(&self, name: &str) -> Result<bool> {
        let config = self.config_manager.load()?;
        Ok(config.profiles.iter().any(|p| p.name == name))
    }
}
