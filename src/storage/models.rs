//! Data models for storage account and blob operations

use crate::error::BlobDiskError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Replication/performance tier of a storage account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkuClass {
    #[serde(rename = "Standard_LRS")]
    StandardLrs,
    #[serde(rename = "Standard_GRS")]
    StandardGrs,
    #[serde(rename = "Standard_RAGRS")]
    StandardRagrs,
    #[serde(rename = "Standard_ZRS")]
    StandardZrs,
    #[serde(rename = "Premium_LRS")]
    PremiumLrs,
    #[serde(rename = "Premium_ZRS")]
    PremiumZrs,
}

impl SkuClass {
    pub const ALL: [SkuClass; 6] = [
        SkuClass::StandardLrs,
        SkuClass::StandardGrs,
        SkuClass::StandardRagrs,
        SkuClass::StandardZrs,
        SkuClass::PremiumLrs,
        SkuClass::PremiumZrs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SkuClass::StandardLrs => "Standard_LRS",
            SkuClass::StandardGrs => "Standard_GRS",
            SkuClass::StandardRagrs => "Standard_RAGRS",
            SkuClass::StandardZrs => "Standard_ZRS",
            SkuClass::PremiumLrs => "Premium_LRS",
            SkuClass::PremiumZrs => "Premium_ZRS",
        }
    }
}

impl fmt::Display for SkuClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkuClass {
    type Err = BlobDiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SkuClass::ALL
            .into_iter()
            .find(|sku| sku.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BlobDiskError::invalid_argument(format!("unknown SKU '{s}'")))
    }
}

/// Provisioning state reported by the management plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningState {
    Creating,
    ResolvingDNS,
    Succeeded,
    #[serde(other)]
    Unknown,
}

/// An account as seen in a listing
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSummary {
    pub name: String,
    pub sku: SkuClass,
}

/// Request for creating a storage account
#[derive(Debug, Clone)]
pub struct AccountCreateRequest {
    pub name: String,
    pub sku: SkuClass,
    pub location: String,
    pub tags: HashMap<String, String>,
}

/// Name and shared key of a storage account
#[derive(Clone)]
pub struct AccountCredentials {
    pub name: String,
    pub key: Zeroizing<String>,
}

impl AccountCredentials {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: Zeroizing::new(key.into()),
        }
    }
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("name", &self.name)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Request for writing an empty page blob
#[derive(Debug, Clone)]
pub struct PageBlobCreateRequest {
    pub container: String,
    pub blob: String,
    pub size: u64,
    pub tags: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sku_parse() {
        assert_eq!("Premium_LRS".parse::<SkuClass>().unwrap(), SkuClass::PremiumLrs);
        assert_eq!("standard_lrs".parse::<SkuClass>().unwrap(), SkuClass::StandardLrs);
        assert!("Basic".parse::<SkuClass>().is_err());
    }

    #[test]
    fn test_sku_serde_names() {
        let json = serde_json::to_string(&SkuClass::PremiumLrs).unwrap();
        assert_eq!(json, "\"Premium_LRS\"");
    }

    #[test]
    fn test_provisioning_state_tolerates_unknown_values() {
        let state: ProvisioningState = serde_json::from_str("\"Deleting\"").unwrap();
        assert_eq!(state, ProvisioningState::Unknown);
        let state: ProvisioningState = serde_json::from_str("\"Succeeded\"").unwrap();
        assert_eq!(state, ProvisioningState::Succeeded);
    }

    #[test]
    fn test_credentials_debug_redacts_key() {
        let creds = AccountCredentials::new("acct", "super-secret");
        assert!(!format!("{creds:?}").contains("super-secret"));
    }
}
