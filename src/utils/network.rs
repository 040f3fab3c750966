use crate::error::{BlobDiskError, Result};
use reqwest::Client;
use std::time::Duration;

/// Configuration for HTTP client with proper timeouts
pub struct NetworkConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
            user_agent: format!("blobdisk/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Create a properly configured HTTP client with timeouts
pub fn create_http_client(config: &NetworkConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .user_agent(&config.user_agent)
        .build()
        .map_err(|e| BlobDiskError::network(format!("Failed to create HTTP client: {e}")))
}

/// Map a reqwest failure against an ARM endpoint to a BlobDiskError
pub fn classify_network_error(error: &reqwest::Error, url: &str) -> BlobDiskError {
    let resource = extract_resource_name_from_url(url);

    if error.is_timeout() {
        return BlobDiskError::connection_timeout(format!(
            "Request for '{resource}' timed out"
        ));
    }

    if error.is_connect() {
        return BlobDiskError::network(format!(
            "Failed to connect to Azure Resource Manager for '{resource}': {error}"
        ));
    }

    if let Some(status) = error.status() {
        match status.as_u16() {
            503 => {
                return BlobDiskError::network(format!(
                    "Azure Resource Manager is temporarily unavailable (503) for '{resource}'"
                ))
            }
            502 | 504 => {
                return BlobDiskError::network(format!(
                    "Gateway error ({}) when accessing '{resource}'",
                    status.as_u16()
                ))
            }
            _ => {}
        }
    }

    BlobDiskError::network(format!("Network error when accessing '{resource}': {error}"))
}

/// Last path segment of an ARM URL, without the query string
fn extract_resource_name_from_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        if let Some(last) = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        {
            return last.to_string();
        }
    }

    "unknown-resource".to_string()
}

/// Check if an error is worth retrying
pub fn is_retryable_error(error: &BlobDiskError) -> bool {
    match error {
        BlobDiskError::ConnectionTimeout(_) => true,
        BlobDiskError::NetworkError(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("timeout")
                || msg_lower.contains("temporar")
                || msg_lower.contains("503")
                || msg_lower.contains("502")
                || msg_lower.contains("504")
        }
        BlobDiskError::AzureApiError(msg) => {
            let msg_lower = msg.to_lowercase();
            msg_lower.contains("http 429")
                || msg_lower.contains("http 503")
                || msg_lower.contains("http 502")
                || msg_lower.contains("http 504")
                || msg_lower.contains("throttled")
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_resource_name_from_url() {
        let url = "https://management.azure.com/subscriptions/s/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/pvcabc001?api-version=2023-01-01";
        assert_eq!(extract_resource_name_from_url(url), "pvcabc001");
        assert_eq!(extract_resource_name_from_url("not a url"), "unknown-resource");
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error(&BlobDiskError::connection_timeout("timeout")));
        assert!(is_retryable_error(&BlobDiskError::azure_api("HTTP 429: Too many requests")));
        assert!(!is_retryable_error(&BlobDiskError::azure_api("HTTP 404: missing")));
        assert!(!is_retryable_error(&BlobDiskError::Timeout));
    }
}
