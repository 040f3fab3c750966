//! Page blob operations against a storage account's blob service
//!
//! [`BlobOperations`] is the data-plane boundary. [`AzureBlobOperations`]
//! implements it with `azure_storage_blobs`, authenticating with the
//! account's shared key.

use async_trait::async_trait;
use azure_core::request_options::Metadata;
use azure_core::StatusCode;
use azure_storage::{CloudLocation, StorageCredentials};
use azure_storage_blobs::prelude::*;
use bytes::Bytes;
use futures::TryStreamExt;
use std::collections::HashMap;
use tracing::debug;

use super::models::{AccountCredentials, PageBlobCreateRequest};
use crate::error::{BlobDiskError, Result};

/// Endpoint suffix of the public Azure cloud
const PUBLIC_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Trait for blob data-plane operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobOperations: Send + Sync {
    /// Create a private container; `Ok(false)` if it already existed
    async fn create_container_if_absent(
        &self,
        creds: &AccountCredentials,
        container: &str,
    ) -> Result<bool>;

    /// Create an empty page blob of `request.size` bytes
    async fn put_page_blob(
        &self,
        creds: &AccountCredentials,
        request: &PageBlobCreateRequest,
    ) -> Result<()>;

    /// Write 512-byte aligned `data` at `offset`
    async fn put_page(
        &self,
        creds: &AccountCredentials,
        container: &str,
        blob: &str,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<()>;

    /// Delete a blob; `Ok(false)` if there was nothing to delete
    async fn delete_blob_if_exists(
        &self,
        creds: &AccountCredentials,
        container: &str,
        blob: &str,
    ) -> Result<bool>;

    /// Replace a blob's metadata; fails while another party holds a lease
    async fn set_blob_metadata(
        &self,
        creds: &AccountCredentials,
        container: &str,
        blob: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<()>;

    /// Names of all blobs in a container
    async fn list_blobs(&self, creds: &AccountCredentials, container: &str)
        -> Result<Vec<String>>;
}

/// Azure blob service implementation
pub struct AzureBlobOperations {
    endpoint_suffix: String,
}

impl AzureBlobOperations {
    pub fn new(endpoint_suffix: impl Into<String>) -> Self {
        Self {
            endpoint_suffix: endpoint_suffix.into(),
        }
    }

    fn container_client(&self, creds: &AccountCredentials, container: &str) -> ContainerClient {
        let credentials =
            StorageCredentials::access_key(creds.name.clone(), creds.key.to_string());

        let builder = if self.endpoint_suffix == PUBLIC_ENDPOINT_SUFFIX {
            ClientBuilder::new(creds.name.clone(), credentials)
        } else {
            ClientBuilder::with_location(
                CloudLocation::Custom {
                    account: creds.name.clone(),
                    uri: format!("https://{}.blob.{}", creds.name, self.endpoint_suffix),
                },
                credentials,
            )
        };

        builder.container_client(container.to_string())
    }
}

fn has_status(error: &azure_core::Error, status: StatusCode) -> bool {
    error
        .as_http_error()
        .is_some_and(|http_error| http_error.status() == status)
}

fn to_metadata(values: &HashMap<String, String>) -> Metadata {
    let mut metadata = Metadata::new();
    for (key, value) in values {
        metadata.insert(key.clone(), value.clone());
    }
    metadata
}

#[async_trait]
impl BlobOperations for AzureBlobOperations {
    async fn create_container_if_absent(
        &self,
        creds: &AccountCredentials,
        container: &str,
    ) -> Result<bool> {
        match self.container_client(creds, container).create().await {
            Ok(_) => Ok(true),
            Err(e) if has_status(&e, StatusCode::Conflict) => Ok(false),
            Err(e) => Err(BlobDiskError::azure_api(format!(
                "Failed to create container {container} on account {}: {e}",
                creds.name
            ))),
        }
    }

    async fn put_page_blob(
        &self,
        creds: &AccountCredentials,
        request: &PageBlobCreateRequest,
    ) -> Result<()> {
        self.container_client(creds, &request.container)
            .blob_client(request.blob.clone())
            .put_page_blob(u128::from(request.size))
            .metadata(to_metadata(&request.tags))
            .await
            .map_err(|e| {
                BlobDiskError::azure_api(format!(
                    "Failed to put page blob {} on account {}: {e}",
                    request.blob, creds.name
                ))
            })?;
        Ok(())
    }

    async fn put_page(
        &self,
        creds: &AccountCredentials,
        container: &str,
        blob: &str,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<()> {
        if data.is_empty() {
            return Err(BlobDiskError::invalid_argument("cannot put an empty page"));
        }
        let end = offset + data.len() as u64 - 1;
        let range = BA512Range::new(offset, end)?;

        self.container_client(creds, container)
            .blob_client(blob.to_string())
            .put_page(range, Bytes::from(data))
            .await
            .map_err(|e| {
                BlobDiskError::azure_api(format!(
                    "Failed to put page at {offset} of {blob} on account {}: {e}",
                    creds.name
                ))
            })?;
        Ok(())
    }

    async fn delete_blob_if_exists(
        &self,
        creds: &AccountCredentials,
        container: &str,
        blob: &str,
    ) -> Result<bool> {
        match self
            .container_client(creds, container)
            .blob_client(blob.to_string())
            .delete()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if has_status(&e, StatusCode::NotFound) => {
                debug!("Blob {blob} on account {} was already gone", creds.name);
                Ok(false)
            }
            Err(e) => Err(BlobDiskError::azure_api(format!(
                "Failed to delete blob {blob} on account {}: {e}",
                creds.name
            ))),
        }
    }

    async fn set_blob_metadata(
        &self,
        creds: &AccountCredentials,
        container: &str,
        blob: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<()> {
        self.container_client(creds, container)
            .blob_client(blob.to_string())
            .set_metadata()
            .metadata(to_metadata(metadata))
            .await?;
        Ok(())
    }

    async fn list_blobs(
        &self,
        creds: &AccountCredentials,
        container: &str,
    ) -> Result<Vec<String>> {
        let mut stream = self.container_client(creds, container).list_blobs().into_stream();
        let mut names = Vec::new();

        while let Some(page) = stream.try_next().await.map_err(|e| {
            BlobDiskError::azure_api(format!(
                "Failed to list blobs in {container} on account {}: {e}",
                creds.name
            ))
        })? {
            names.extend(page.blobs.blobs().map(|blob| blob.name.clone()));
        }

        Ok(names)
    }
}
