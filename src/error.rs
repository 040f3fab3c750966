use thiserror::Error;

/// Main error type for blobdisk operations
#[derive(Debug, Error)]
pub enum BlobDiskError {
    #[error("Failed to list storage accounts: {0}")]
    RemoteListError(String),

    #[error("Cannot create new storage account, current count {current} reached max {max}")]
    CapacityExceeded { current: usize, max: usize },

    #[error("Storage account '{account}' was not provisioned in time")]
    ProvisioningTimeout { account: String },

    #[error("Timed out waiting to validate readiness of storage account '{account}'")]
    ReadinessTimeout { account: String },

    #[error("Disk {uri} still has a lease on it, will not attach to node {node}")]
    DiskLeased { uri: String, node: String },

    #[error("Node {node} uses managed disks, cannot attach blob disk {disk}")]
    UnsupportedNodeMode { node: String, disk: String },

    #[error("Storage account not found: {name}")]
    AccountNotFound { name: String },

    #[error("Invalid disk URI '{uri}': {reason}")]
    InvalidDiskUri { uri: String, reason: String },

    #[error("No free LUN on node {node} (capacity {capacity})")]
    NoFreeLun { node: String, capacity: u32 },

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Azure API error: {0}")]
    AzureApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Configuration loading error: {0}")]
    ConfigLoadError(#[from] config::ConfigError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation timeout")]
    Timeout,

    #[error("Operation cancelled")]
    Cancelled,
}

impl BlobDiskError {
    pub fn remote_list<S: Into<String>>(msg: S) -> Self {
        Self::RemoteListError(msg.into())
    }

    pub fn provisioning_timeout<S: Into<String>>(account: S) -> Self {
        Self::ProvisioningTimeout {
            account: account.into(),
        }
    }

    pub fn readiness_timeout<S: Into<String>>(account: S) -> Self {
        Self::ReadinessTimeout {
            account: account.into(),
        }
    }

    pub fn disk_leased<S: Into<String>>(uri: S, node: S) -> Self {
        Self::DiskLeased {
            uri: uri.into(),
            node: node.into(),
        }
    }

    pub fn unsupported_node_mode<S: Into<String>>(node: S, disk: S) -> Self {
        Self::UnsupportedNodeMode {
            node: node.into(),
            disk: disk.into(),
        }
    }

    pub fn account_not_found<S: Into<String>>(name: S) -> Self {
        Self::AccountNotFound { name: name.into() }
    }

    pub fn invalid_disk_uri<S: Into<String>>(uri: S, reason: S) -> Self {
        Self::InvalidDiskUri {
            uri: uri.into(),
            reason: reason.into(),
        }
    }

    pub fn authentication<S: Into<String>>(msg: S) -> Self {
        Self::AuthenticationError(msg.into())
    }

    pub fn azure_api<S: Into<String>>(msg: S) -> Self {
        Self::AzureApiError(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::NetworkError(msg.into())
    }

    pub fn connection_timeout<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionTimeout(msg.into())
    }

    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        Self::SerializationError(msg.into())
    }

    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

/// Result type alias for blobdisk operations
pub type Result<T> = std::result::Result<T, BlobDiskError>;

/// Convert Azure Core errors to BlobDiskError
impl From<azure_core::Error> for BlobDiskError {
    fn from(error: azure_core::Error) -> Self {
        Self::AzureApiError(error.to_string())
    }
}
