//! Authentication provider trait and implementations
//!
//! This module defines the authentication provider trait used to obtain
//! Azure Resource Manager tokens, and the default credential chain.

use async_trait::async_trait;
use azure_core::auth::{AccessToken, TokenCredential};
use azure_identity::{DefaultAzureCredential, TokenCredentialOptions};
use std::sync::Arc;

use crate::error::{BlobDiskError, Result};

/// Scope for Azure Resource Manager calls
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";

/// Trait for Azure authentication providers
#[async_trait]
pub trait AzureAuthProvider: Send + Sync {
    /// Get an access token for the specified scopes
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken>;
}

/// Default Azure Credential Provider using DefaultAzureCredential
pub struct DefaultAzureCredentialProvider {
    credential: Arc<DefaultAzureCredential>,
}

impl DefaultAzureCredentialProvider {
    pub fn new() -> Result<Self> {
        let credential = Arc::new(
            DefaultAzureCredential::create(TokenCredentialOptions::default()).map_err(|e| {
                BlobDiskError::authentication(format!(
                    "Failed to create DefaultAzureCredential: {e}"
                ))
            })?,
        );

        Ok(Self { credential })
    }
}

#[async_trait]
impl AzureAuthProvider for DefaultAzureCredentialProvider {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken> {
        self.credential
            .get_token(scopes)
            .await
            .map_err(|e| BlobDiskError::authentication(format!("Failed to get token: {e}")))
    }
}

/// Create the default authentication provider
pub fn create_default_auth_provider() -> Result<Arc<dyn AzureAuthProvider>> {
    Ok(Arc::new(DefaultAzureCredentialProvider::new()?))
}
