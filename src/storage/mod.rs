//! Azure Storage account and blob operations
//!
//! This module provides the remote boundaries the pool and disk controller
//! drive: account management through Resource Manager and page blob
//! operations through the blob service.

pub mod accounts;
pub mod blobs;
pub mod models;

// Re-export commonly used types
pub use accounts::{AccountOperations, AzureAccountOperations};
pub use blobs::{AzureBlobOperations, BlobOperations};
pub use models::*;
