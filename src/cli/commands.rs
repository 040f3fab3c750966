//! CLI commands and argument parsing
//!
//! This module defines the command-line interface structure using clap,
//! and runs each command against a controller backed by Azure.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tabled::Tabled;

use crate::config::{ProcessRole, Settings};
use crate::disk::BlobDiskController;
use crate::error::{BlobDiskError, Result};
use crate::pool::hash_disk_uri;
use crate::storage::SkuClass;
use crate::utils::format::{OutputFormat, TableFormatter};

#[derive(Parser)]
#[command(name = "blobdisk")]
#[command(about = "Pooled page-blob disks for Azure virtual machines")]
#[command(version, author)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Disable colored table headers
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file to use instead of the default location
    #[arg(long, global = true, env = "BLOBDISK_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and pre-warm the storage account pool
    Pool {
        #[command(subcommand)]
        command: PoolCommands,
    },
    /// Create, delete, attach and detach disks
    Disk {
        #[command(subcommand)]
        command: DiskCommands,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum PoolCommands {
    /// List the accounts in the pool
    List,
    /// Provision the initial accounts of an empty pool and wait for them
    Warm,
}

#[derive(Subcommand)]
pub enum DiskCommands {
    /// Create a disk and print its URI
    Create {
        /// Disk name, used as the blob name
        name: String,
        /// Storage SKU (e.g. Premium_LRS, Standard_LRS)
        #[arg(long, default_value = "Standard_LRS")]
        sku: SkuClass,
        /// Disk size in GiB
        #[arg(long)]
        size_gib: u64,
        /// Put the disk in an account of its own
        #[arg(long)]
        dedicated: bool,
    },
    /// Delete a disk
    Delete {
        /// Disk URI
        uri: String,
        /// The disk was created with --dedicated; delete its whole account
        #[arg(long)]
        forced: bool,
    },
    /// Attach a disk to a node
    Attach {
        /// Virtual machine name
        node: String,
        /// Disk URI
        uri: String,
        /// Host caching mode (None, ReadOnly, ReadWrite)
        #[arg(long, default_value = "None")]
        caching: String,
    },
    /// Detach a disk from a node
    Detach {
        /// Virtual machine name
        node: String,
        /// Disk URI
        uri: String,
    },
    /// Check whether a disk is free of leases
    Lease {
        /// Disk URI
        uri: String,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
    /// Write the current configuration to the configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    pub async fn execute(self, settings: Settings) -> Result<()> {
        let formatter = TableFormatter::new(self.format, self.no_color);

        match self.command {
            Commands::Pool { command } => execute_pool_command(command, settings, &formatter).await,
            Commands::Disk { command } => execute_disk_command(command, settings).await,
            Commands::Config { command } => {
                execute_config_command(command, &settings, self.config, &formatter)
            }
        }
    }
}

async fn execute_pool_command(
    command: PoolCommands,
    mut settings: Settings,
    formatter: &TableFormatter,
) -> Result<()> {
    let warm = matches!(command, PoolCommands::Warm);
    if warm {
        settings.role = ProcessRole::ControlPlane;
    }

    let controller = BlobDiskController::with_azure(&settings)?;
    controller.refresh_pool().await?;

    if warm {
        let started = controller.bootstrap().await;
        if started == 0 {
            println!("Pool already has accounts, nothing to warm");
        } else {
            println!("Provisioning {started} accounts...");
            controller.wait_for_bootstrap().await;
        }
    }

    let rows = controller.pool().snapshot().await;
    println!("{}", formatter.format_table(&rows)?);
    Ok(())
}

async fn execute_disk_command(command: DiskCommands, settings: Settings) -> Result<()> {
    let controller = BlobDiskController::with_azure(&settings)?;

    match command {
        DiskCommands::Create {
            name,
            sku,
            size_gib,
            dedicated,
        } => {
            controller.refresh_pool().await?;
            let uri = controller
                .create_disk(&name, sku, size_gib, dedicated)
                .await?;
            println!("✅ Created disk '{name}'");
            println!("   URI: {uri}");
        }
        DiskCommands::Delete { uri, forced } => {
            controller.refresh_pool().await?;
            if controller.delete_disk(&uri, forced).await? {
                println!("✅ Deleted disk {uri}");
            } else {
                println!("Disk {uri} did not exist");
            }
        }
        DiskCommands::Attach { node, uri, caching } => {
            let lun = controller.attach_disk(&node, &uri, &caching).await?;
            println!("✅ Attached {uri} to {node} at LUN {lun}");
        }
        DiskCommands::Detach { node, uri } => {
            controller.detach_disk(&node, &hash_disk_uri(&uri)).await?;
            println!("✅ Detached {uri} from {node}");
        }
        DiskCommands::Lease { uri } => {
            if controller.disk_has_no_lease(&uri).await? {
                println!("{uri} has no lease");
            } else {
                println!("{uri} is leased or cannot be checked");
            }
        }
    }

    Ok(())
}

fn execute_config_command(
    command: ConfigCommands,
    settings: &Settings,
    config_path: Option<PathBuf>,
    formatter: &TableFormatter,
) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => Settings::get_config_path()?,
    };

    match command {
        ConfigCommands::Show => execute_config_show(settings, formatter),
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Init { force } => {
            if path.exists() && !force {
                return Err(BlobDiskError::config(format!(
                    "{} already exists, use --force to overwrite",
                    path.display()
                )));
            }
            settings.save_to(&path)?;
            println!("✅ Wrote configuration to {}", path.display());
            if let Err(e) = settings.validate() {
                println!("⚠️  {e}");
            }
            Ok(())
        }
    }
}

fn execute_config_show(settings: &Settings, formatter: &TableFormatter) -> Result<()> {
    #[derive(Tabled, Serialize)]
    struct ConfigItem {
        #[tabled(rename = "Setting")]
        key: &'static str,
        #[tabled(rename = "Value")]
        value: String,
    }

    fn or_unset(value: &str) -> String {
        if value.is_empty() {
            "<not set>".to_string()
        } else {
            value.to_string()
        }
    }

    let pool = &settings.pool;
    let items = vec![
        ConfigItem {
            key: "subscription_id",
            value: or_unset(&settings.subscription_id),
        },
        ConfigItem {
            key: "resource_group",
            value: or_unset(&settings.resource_group),
        },
        ConfigItem {
            key: "location",
            value: or_unset(&settings.location),
        },
        ConfigItem {
            key: "storage_endpoint_suffix",
            value: settings.storage_endpoint_suffix.clone(),
        },
        ConfigItem {
            key: "role",
            value: format!("{:?}", settings.role),
        },
        ConfigItem {
            key: "pool.max_accounts",
            value: pool.max_accounts.to_string(),
        },
        ConfigItem {
            key: "pool.max_disks_per_account",
            value: pool.max_disks_per_account.to_string(),
        },
        ConfigItem {
            key: "pool.growth_threshold",
            value: pool.growth_threshold.to_string(),
        },
        ConfigItem {
            key: "pool.settle_delay",
            value: format!("{:?}", pool.settle_delay),
        },
        ConfigItem {
            key: "pool.readiness_wait",
            value: format!("{:?}", pool.readiness_wait),
        },
        ConfigItem {
            key: "pool.provisioning_backoff",
            value: format!(
                "{:?} x{} over {} steps (cap {:?})",
                pool.provisioning_backoff.initial,
                pool.provisioning_backoff.factor,
                pool.provisioning_backoff.steps,
                pool.provisioning_backoff.cap
            ),
        },
        ConfigItem {
            key: "pool.detach_backoff",
            value: format!(
                "{:?} x{} over {} steps (cap {:?})",
                pool.detach_backoff.initial,
                pool.detach_backoff.factor,
                pool.detach_backoff.steps,
                pool.detach_backoff.cap
            ),
        },
    ];

    println!("{}", formatter.format_table(&items)?);

    if let Err(e) = settings.validate() {
        println!("\n⚠️  {e}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_disk_create() {
        let cli = Cli::try_parse_from([
            "blobdisk",
            "disk",
            "create",
            "data-1",
            "--sku",
            "premium_lrs",
            "--size-gib",
            "10",
        ])
        .unwrap();

        match cli.command {
            Commands::Disk {
                command:
                    DiskCommands::Create {
                        name,
                        sku,
                        size_gib,
                        dedicated,
                    },
            } => {
                assert_eq!(name, "data-1");
                assert_eq!(sku, SkuClass::PremiumLrs);
                assert_eq!(size_gib, 10);
                assert!(!dedicated);
            }
            _ => panic!("expected disk create"),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_sku() {
        assert!(Cli::try_parse_from([
            "blobdisk",
            "disk",
            "create",
            "d",
            "--sku",
            "Ultra_LRS",
            "--size-gib",
            "1"
        ])
        .is_err());
    }

    #[test]
    fn test_parse_config_init() {
        let cli = Cli::try_parse_from(["blobdisk", "config", "init", "--force"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Init { force: true }
            }
        ));
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["blobdisk", "pool", "list", "--format", "json", "--debug"])
            .unwrap();
        assert!(cli.debug);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Commands::Pool {
                command: PoolCommands::List
            }
        ));
    }
}
