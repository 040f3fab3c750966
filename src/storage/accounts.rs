//! Storage account management operations
//!
//! The [`AccountOperations`] trait is the boundary to the management plane;
//! [`AzureAccountOperations`] implements it on top of the ARM REST API.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::models::{AccountCreateRequest, AccountSummary, ProvisioningState, SkuClass};
use crate::auth::provider::AzureAuthProvider;
use crate::error::{BlobDiskError, Result};
use crate::utils::arm::ArmClient;

const STORAGE_API_VERSION: &str = "2023-01-01";

/// Trait for storage account operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountOperations: Send + Sync {
    /// List every storage account in the resource group
    async fn list_accounts(&self) -> Result<Vec<AccountSummary>>;

    /// Provisioning state of an account, `None` if it does not exist
    async fn get_account_state(&self, name: &str) -> Result<Option<ProvisioningState>>;

    /// Start creating an account; completion is asynchronous
    async fn create_account(&self, request: &AccountCreateRequest) -> Result<()>;

    /// Delete an account and everything in it
    async fn delete_account(&self, name: &str) -> Result<()>;

    /// Shared keys of an account, in the order the service returns them
    async fn list_keys(&self, name: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmList<T> {
    value: Option<Vec<T>>,
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StorageAccountResource {
    name: Option<String>,
    sku: Option<SkuResource>,
    properties: Option<StorageAccountProperties>,
}

#[derive(Debug, Deserialize)]
struct SkuResource {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageAccountProperties {
    provisioning_state: Option<ProvisioningState>,
}

#[derive(Debug, Deserialize)]
struct ListKeysResult {
    keys: Option<Vec<StorageAccountKey>>,
}

#[derive(Debug, Deserialize)]
struct StorageAccountKey {
    value: Option<String>,
}

/// Azure storage account operations implementation
pub struct AzureAccountOperations {
    arm: ArmClient,
}

impl AzureAccountOperations {
    pub fn new(
        auth_provider: Arc<dyn AzureAuthProvider>,
        subscription_id: String,
        resource_group: String,
    ) -> Result<Self> {
        Ok(Self {
            arm: ArmClient::new(auth_provider, subscription_id, resource_group)?,
        })
    }

    fn account_url(&self, name: &str, action: Option<&str>) -> String {
        let path = match action {
            Some(action) => format!("Microsoft.Storage/storageAccounts/{name}/{action}"),
            None => format!("Microsoft.Storage/storageAccounts/{name}"),
        };
        self.arm.resource_url(&path, STORAGE_API_VERSION)
    }
}

#[async_trait]
impl AccountOperations for AzureAccountOperations {
    async fn list_accounts(&self) -> Result<Vec<AccountSummary>> {
        let mut url = Some(
            self.arm
                .resource_url("Microsoft.Storage/storageAccounts", STORAGE_API_VERSION),
        );
        let mut accounts = Vec::new();

        while let Some(next) = url.take() {
            let response = self
                .arm
                .get(&next)
                .await
                .map_err(|e| BlobDiskError::remote_list(e.to_string()))?;
            if !response.is_success() {
                return Err(BlobDiskError::remote_list(response.into_error().to_string()));
            }

            let page: ArmList<StorageAccountResource> = response.json()?;
            let value = page
                .value
                .ok_or_else(|| BlobDiskError::remote_list("empty account list result"))?;

            for resource in value {
                let (Some(name), Some(sku)) = (resource.name, resource.sku) else {
                    debug!("Skipping storage account without name or SKU");
                    continue;
                };
                match sku.name.parse::<SkuClass>() {
                    Ok(sku) => accounts.push(AccountSummary { name, sku }),
                    Err(_) => debug!("Skipping storage account {name} with SKU {}", sku.name),
                }
            }

            url = page.next_link;
        }

        Ok(accounts)
    }

    async fn get_account_state(&self, name: &str) -> Result<Option<ProvisioningState>> {
        let response = self.arm.get(&self.account_url(name, None)).await?;
        if response.is_not_found() {
            return Ok(None);
        }

        let resource: StorageAccountResource = response.json()?;
        Ok(Some(
            resource
                .properties
                .and_then(|p| p.provisioning_state)
                .unwrap_or(ProvisioningState::Unknown),
        ))
    }

    async fn create_account(&self, request: &AccountCreateRequest) -> Result<()> {
        let body = json!({
            "sku": { "name": request.sku.as_str() },
            "kind": "StorageV2",
            "location": request.location,
            "tags": request.tags,
        });

        let url = self.account_url(&request.name, None);
        let response = self.arm.send(Method::PUT, &url, Some(&body)).await?;
        if !response.is_success() {
            return Err(BlobDiskError::azure_api(format!(
                "Create storage account {}: {}",
                request.name,
                response.into_error()
            )));
        }

        Ok(())
    }

    async fn delete_account(&self, name: &str) -> Result<()> {
        let url = self.account_url(name, None);
        let response = self.arm.send::<Value>(Method::DELETE, &url, None).await?;

        match response.status {
            200 | 202 | 204 => Ok(()),
            404 => Err(BlobDiskError::account_not_found(name)),
            _ => Err(BlobDiskError::azure_api(format!(
                "Delete of storage account '{name}' failed: {}",
                response.into_error()
            ))),
        }
    }

    async fn list_keys(&self, name: &str) -> Result<Vec<String>> {
        let url = self.account_url(name, Some("listKeys"));
        let response = self.arm.send::<Value>(Method::POST, &url, None).await?;
        if response.is_not_found() {
            return Err(BlobDiskError::account_not_found(name));
        }
        if !response.is_success() {
            return Err(response.into_error());
        }

        let result: ListKeysResult = response.json()?;
        let keys: Vec<String> = result
            .keys
            .unwrap_or_default()
            .into_iter()
            .filter_map(|k| k.value)
            .collect();
        if keys.is_empty() {
            warn!("Storage account {name} returned no keys");
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_account_listing() {
        let body = r#"{
            "value": [
                {"name": "pvcabc001", "sku": {"name": "Premium_LRS", "tier": "Premium"},
                 "properties": {"provisioningState": "Succeeded"}},
                {"name": "other", "sku": {"name": "Standard_LRS"}}
            ],
            "nextLink": "https://management.azure.com/next"
        }"#;

        let page: ArmList<StorageAccountResource> = serde_json::from_str(body).unwrap();
        let value = page.value.unwrap();
        assert_eq!(value.len(), 2);
        assert_eq!(value[0].name.as_deref(), Some("pvcabc001"));
        assert_eq!(
            value[0].properties.as_ref().unwrap().provisioning_state,
            Some(ProvisioningState::Succeeded)
        );
        assert!(value[1].properties.is_none());
        assert_eq!(page.next_link.as_deref(), Some("https://management.azure.com/next"));
    }

    #[test]
    fn test_parse_list_keys() {
        let body = r#"{"keys":[{"keyName":"key1","value":"aaa","permissions":"FULL"},{"keyName":"key2","value":"bbb"}]}"#;
        let result: ListKeysResult = serde_json::from_str(body).unwrap();
        let keys: Vec<_> = result.keys.unwrap().into_iter().filter_map(|k| k.value).collect();
        assert_eq!(keys, vec!["aaa", "bbb"]);
    }
}
