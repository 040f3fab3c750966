//! Thin Azure Resource Manager REST client
//!
//! Shared by the storage-account and virtual-machine adapters: builds
//! resource-group scoped URLs, attaches bearer tokens, and turns ARM
//! error bodies into [`BlobDiskError`]s.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::auth::provider::{AzureAuthProvider, ARM_SCOPE};
use crate::error::{BlobDiskError, Result};
use crate::utils::network::{classify_network_error, create_http_client, NetworkConfig};
use crate::utils::retry::{retry_with_backoff, RetryOptions};

const ARM_ENDPOINT: &str = "https://management.azure.com";

/// Raw ARM response: status plus body text
#[derive(Debug)]
pub struct ArmResponse {
    pub status: u16,
    pub body: String,
}

impl ArmResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            BlobDiskError::serialization(format!("Failed to parse ARM response: {e}"))
        })
    }

    /// Error for a non-success response
    pub fn into_error(self) -> BlobDiskError {
        parse_azure_error(self.status, &self.body)
    }
}

pub struct ArmClient {
    auth_provider: Arc<dyn AzureAuthProvider>,
    http_client: Client,
    subscription_id: String,
    resource_group: String,
}

impl ArmClient {
    pub fn new(
        auth_provider: Arc<dyn AzureAuthProvider>,
        subscription_id: String,
        resource_group: String,
    ) -> Result<Self> {
        let http_client = create_http_client(&NetworkConfig::default())?;
        Ok(Self {
            auth_provider,
            http_client,
            subscription_id,
            resource_group,
        })
    }

    /// URL of a resource under this client's resource group
    pub fn resource_url(&self, provider_path: &str, api_version: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/{}?api-version={}",
            ARM_ENDPOINT, self.subscription_id, self.resource_group, provider_path, api_version
        )
    }

    async fn create_headers(&self) -> Result<HeaderMap> {
        let token = self.auth_provider.get_token(&[ARM_SCOPE]).await?;
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.token.secret())).map_err(|e| {
                BlobDiskError::authentication(format!("Invalid token format: {e}"))
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    /// Issue one request; non-2xx statuses are returned, not converted
    pub async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<ArmResponse> {
        let headers = self.create_headers().await?;
        let mut request = self.http_client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| classify_network_error(&e, url))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| classify_network_error(&e, url))?;

        Ok(ArmResponse { status, body })
    }

    /// GET with retries on transient failures; 404 is passed through
    pub async fn get(&self, url: &str) -> Result<ArmResponse> {
        retry_with_backoff(
            move || async move {
                let response = self.send::<Value>(Method::GET, url, None).await?;
                if response.is_success() || response.is_not_found() {
                    Ok(response)
                } else {
                    Err(response.into_error())
                }
            },
            RetryOptions::default(),
        )
        .await
    }
}

/// Parse Azure error response
pub fn parse_azure_error(status: u16, body: &str) -> BlobDiskError {
    if let Ok(error_json) = serde_json::from_str::<Value>(body) {
        if let Some(message) = error_json
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
        {
            return BlobDiskError::azure_api(format!("HTTP {status}: {message}"));
        }
    }
    BlobDiskError::azure_api(format!("HTTP {status}: {body}"))
}
