//! Deterministic names for pooled accounts, containers, blobs and disks
//!
//! Every process in a cluster derives the same names from the same
//! subscription, resource group and location, so the pool can be
//! rebuilt from a remote listing without any separate registry.

use crate::config::Settings;
use crate::error::{BlobDiskError, Result};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Prefix shared by all pooled account names
const POOL_ACCOUNT_PREFIX: &str = "pvc";

/// Prefix of accounts that hold exactly one dedicated disk
const DEDICATED_ACCOUNT_PREFIX: &str = "p";

/// Width of the zero-padded sequence suffix on pooled account names
pub const ACCOUNT_SUFFIX_WIDTH: usize = 3;

/// Highest sequence number that still fits the suffix width
pub const MAX_ACCOUNT_NUMBER: u32 = 999;

pub const VHD_EXTENSION: &str = ".vhd";

/// Short, lowercase, account-name-safe digest of `input`
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    hex::encode(&digest[..8])
}

/// Digest used to refer to a disk URI across the attach/detach boundary
pub fn hash_disk_uri(uri: &str) -> String {
    let digest = Sha256::digest(uri.as_bytes());
    hex::encode(&digest[..16])
}

/// Immutable naming scheme of one cluster, computed once from settings
#[derive(Debug, Clone)]
pub struct ClusterNaming {
    subscription_id: String,
    resource_group: String,
    container: String,
    account_prefix: String,
    account_pattern: Regex,
}

impl ClusterNaming {
    pub fn new(subscription_id: &str, resource_group: &str, location: &str) -> Result<Self> {
        let hash = short_hash(&format!("{resource_group}{location}{subscription_id}"));
        let account_prefix = format!("{POOL_ACCOUNT_PREFIX}{hash}");
        let account_pattern = Regex::new(&format!(
            r"^{}\d{{{}}}$",
            regex::escape(&account_prefix),
            ACCOUNT_SUFFIX_WIDTH
        ))?;

        Ok(Self {
            subscription_id: subscription_id.to_string(),
            resource_group: resource_group.to_string(),
            container: hash,
            account_prefix,
            account_pattern,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(
            &settings.subscription_id,
            &settings.resource_group,
            &settings.location,
        )
    }

    /// Container every pooled account stores its VHDs in
    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn account_prefix(&self) -> &str {
        &self.account_prefix
    }

    /// Whether `name` belongs to this cluster's shared pool
    pub fn is_pool_account(&self, name: &str) -> bool {
        self.account_pattern.is_match(name)
    }

    /// Pooled account name for sequence number `num`
    pub fn account_name_for(&self, num: u32) -> String {
        format!(
            "{}{:0width$}",
            self.account_prefix,
            num,
            width = ACCOUNT_SUFFIX_WIDTH
        )
    }

    /// Sequence number of a pooled account name
    pub fn account_number(&self, name: &str) -> Option<u32> {
        if !self.is_pool_account(name) {
            return None;
        }
        name[name.len() - ACCOUNT_SUFFIX_WIDTH..].parse().ok()
    }

    /// Account name for a disk that gets an account to itself
    pub fn dedicated_account_name(&self, disk_name: &str) -> String {
        format!(
            "{DEDICATED_ACCOUNT_PREFIX}{}",
            short_hash(&format!(
                "{}{}{}",
                self.subscription_id, self.resource_group, disk_name
            ))
        )
    }
}

/// Longest disk name accepted, the DNS subdomain limit volume names share
pub const MAX_DISK_NAME_LEN: usize = 253;

/// Reject disk names that would not survive a trip through a disk URI
///
/// Names are ASCII letters, digits, `-`, `_` and `.`, and begin and end
/// with a letter or digit.
pub fn validate_disk_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_DISK_NAME_LEN {
        return Err(BlobDiskError::invalid_argument(format!(
            "disk name must be 1 to {MAX_DISK_NAME_LEN} characters long"
        )));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(BlobDiskError::invalid_argument(format!(
            "disk name '{name}' contains invalid character '{c}'"
        )));
    }

    let edge_ok = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    if !edge_ok(name.chars().next()) || !edge_ok(name.chars().last()) {
        return Err(BlobDiskError::invalid_argument(format!(
            "disk name '{name}' must begin and end with a letter or digit"
        )));
    }

    Ok(())
}

pub fn blob_name(disk_name: &str) -> String {
    format!("{disk_name}{VHD_EXTENSION}")
}

/// The pieces of a disk URI this crate cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskLocation {
    pub account: String,
    pub container: String,
    pub blob: String,
}

impl DiskLocation {
    pub fn uri(&self, endpoint_suffix: &str) -> String {
        format!(
            "https://{}.blob.{}/{}/{}",
            self.account, endpoint_suffix, self.container, self.blob
        )
    }

    /// Split `https://{account}.blob.{suffix}/{container}/{blob}`
    pub fn parse(disk_uri: &str) -> Result<Self> {
        let url = url::Url::parse(disk_uri).map_err(|e| BlobDiskError::InvalidDiskUri {
            uri: disk_uri.to_string(),
            reason: e.to_string(),
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| BlobDiskError::invalid_disk_uri(disk_uri, "missing host"))?;
        let account = host
            .split('.')
            .next()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| BlobDiskError::invalid_disk_uri(disk_uri, "missing account"))?;

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();
        let (container, blob) = match segments.as_slice() {
            [container, rest @ ..] if !rest.is_empty() => (*container, rest.join("/")),
            _ => {
                return Err(BlobDiskError::invalid_disk_uri(
                    disk_uri,
                    "expected /{container}/{blob}",
                ))
            }
        };

        Ok(Self {
            account: account.to_string(),
            container: container.to_string(),
            blob,
        })
    }
}
