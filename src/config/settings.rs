//! Configuration settings management
//!
//! This module handles loading configuration from multiple sources
//! and validating it before the controller is built.

use crate::error::{BlobDiskError, Result};
use crate::utils::retry::Backoff;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which part of the cluster this process runs as.
///
/// Only the control plane pre-warms the account pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessRole {
    ControlPlane,
    #[default]
    Node,
}

/// Tuning knobs for the shared account pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum number of shared accounts the pool may grow to
    pub max_accounts: usize,
    /// Disks a single shared account should hold before it counts as full
    pub max_disks_per_account: i32,
    /// Average utilization above which a new account is provisioned
    pub growth_threshold: f64,
    /// Pause after creating an account before its state is polled
    #[serde(with = "crate::utils::serde_duration")]
    pub settle_delay: Duration,
    /// How long a caller waits for another caller's readiness validation
    #[serde(with = "crate::utils::serde_duration")]
    pub readiness_wait: Duration,
    /// Polling schedule for account provisioning
    pub provisioning_backoff: Backoff,
    /// Polling schedule for detach confirmation
    pub detach_backoff: Backoff,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_accounts: 100,
            max_disks_per_account: 60,
            growth_threshold: 0.5,
            settle_delay: Duration::from_secs(25),
            readiness_wait: Duration::from_secs(60),
            provisioning_backoff: Backoff::default(),
            detach_backoff: Backoff::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub subscription_id: String,
    pub resource_group: String,
    pub location: String,
    pub storage_endpoint_suffix: String,
    pub role: ProcessRole,
    pub pool: PoolSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            subscription_id: String::new(),
            resource_group: String::new(),
            location: "eastus".to_string(),
            storage_endpoint_suffix: "core.windows.net".to_string(),
            role: ProcessRole::default(),
            pool: PoolSettings::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        if self.subscription_id.is_empty() {
            return Err(BlobDiskError::config("Subscription ID is required"));
        }

        if self.resource_group.is_empty() {
            return Err(BlobDiskError::config("Resource group is required"));
        }

        if self.location.is_empty() {
            return Err(BlobDiskError::config("Location is required"));
        }

        if self.storage_endpoint_suffix.is_empty() {
            return Err(BlobDiskError::config("Storage endpoint suffix is required"));
        }

        let pool = &self.pool;
        if !(pool.growth_threshold > 0.0 && pool.growth_threshold <= 1.0) {
            return Err(BlobDiskError::config(format!(
                "growth_threshold must be in (0, 1], got {}",
                pool.growth_threshold
            )));
        }

        if pool.max_accounts == 0 || pool.max_accounts > 999 {
            return Err(BlobDiskError::config(
                "max_accounts must be between 1 and 999",
            ));
        }

        if pool.max_disks_per_account <= 0 {
            return Err(BlobDiskError::config(
                "max_disks_per_account must be greater than zero",
            ));
        }

        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        #[cfg(any(target_os = "linux", target_os = "macos"))]
        {
            let config_dir = if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
                PathBuf::from(xdg_config_home)
            } else {
                let home_dir = std::env::var("HOME")
                    .map_err(|_| BlobDiskError::config("HOME environment variable not set"))?;
                PathBuf::from(home_dir).join(".config")
            };
            Ok(config_dir.join("blobdisk").join("blobdisk.toml"))
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos")))]
        {
            let config_dir = dirs::config_dir()
                .ok_or_else(|| BlobDiskError::config("Unable to determine config directory"))?;
            Ok(config_dir.join("blobdisk").join("blobdisk.toml"))
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| BlobDiskError::serialization(e.to_string()))
    }

    /// Write these settings to `path`, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }
}

/// Load configuration without validating it
///
/// Sources in priority order:
/// 1. Environment variables (`BLOBDISK_*`, nested with `__`)
/// 2. Configuration file at `path`, if it exists
/// 3. Default values
pub fn load_settings_from(path: Option<&Path>) -> Result<Settings> {
    let mut builder =
        config::Config::builder().add_source(config::Config::try_from(&Settings::default())?);

    if let Some(path) = path {
        builder = builder.add_source(
            config::File::from(path)
                .format(config::FileFormat::Toml)
                .required(false),
        );
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BLOBDISK")
            .separator("__")
            .try_parsing(true),
    );

    let mut settings: Settings = builder.build()?.try_deserialize()?;
    load_from_env(&mut settings);
    Ok(settings)
}

/// Well-known Azure variables fill in whatever is still unset
fn load_from_env(settings: &mut Settings) {
    if settings.subscription_id.is_empty() {
        if let Ok(value) = std::env::var("AZURE_SUBSCRIPTION_ID") {
            settings.subscription_id = value;
        }
    }

    if settings.resource_group.is_empty() {
        if let Ok(value) = std::env::var("AZURE_RESOURCE_GROUP") {
            settings.resource_group = value;
        }
    }
}
