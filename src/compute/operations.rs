//! Virtual machine disk-attachment operations

use async_trait::async_trait;
use reqwest::Method;
use std::sync::Arc;
use tracing::debug;

use super::models::{InstanceDescriptor, InstancePatch};
use crate::auth::provider::AzureAuthProvider;
use crate::error::{BlobDiskError, Result};
use crate::utils::arm::ArmClient;

const COMPUTE_API_VERSION: &str = "2023-03-01";

/// Trait for reading and patching a node's disk attachments
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InstanceOperations: Send + Sync {
    async fn get_instance(&self, node: &str) -> Result<InstanceDescriptor>;

    /// Replace the node's data disk list
    async fn patch_instance(&self, node: &str, patch: &InstancePatch) -> Result<()>;

    /// Whether a disk with the given URI hash is still listed on the node
    async fn is_disk_attached(&self, hashed_uri: &str, node: &str) -> Result<bool> {
        let instance = self.get_instance(node).await?;
        Ok(instance
            .data_disks()
            .iter()
            .any(|disk| disk.matches_hash(hashed_uri)))
    }
}

/// Azure virtual machine implementation
pub struct AzureInstanceOperations {
    arm: ArmClient,
}

impl AzureInstanceOperations {
    pub fn new(
        auth_provider: Arc<dyn AzureAuthProvider>,
        subscription_id: String,
        resource_group: String,
    ) -> Result<Self> {
        Ok(Self {
            arm: ArmClient::new(auth_provider, subscription_id, resource_group)?,
        })
    }

    fn instance_url(&self, node: &str) -> String {
        self.arm.resource_url(
            &format!("Microsoft.Compute/virtualMachines/{node}"),
            COMPUTE_API_VERSION,
        )
    }
}

#[async_trait]
impl InstanceOperations for AzureInstanceOperations {
    async fn get_instance(&self, node: &str) -> Result<InstanceDescriptor> {
        let response = self.arm.get(&self.instance_url(node)).await?;
        if response.is_not_found() {
            return Err(BlobDiskError::azure_api(format!(
                "Virtual machine '{node}' not found"
            )));
        }
        response.json()
    }

    async fn patch_instance(&self, node: &str, patch: &InstancePatch) -> Result<()> {
        debug!(
            "Patching node {node} with {} data disks",
            patch.data_disks().len()
        );
        let response = self
            .arm
            .send(Method::PATCH, &self.instance_url(node), Some(patch))
            .await?;
        if !response.is_success() {
            return Err(BlobDiskError::azure_api(format!(
                "Update of virtual machine '{node}' failed: {}",
                response.into_error()
            )));
        }
        Ok(())
    }
}
