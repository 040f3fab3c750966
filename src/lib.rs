//! blobdisk - pooled page-blob disks for Azure virtual machines
//!
//! Places VHD-backed page blobs into a self-growing pool of storage
//! accounts and attaches them to, or detaches them from, compute nodes.

pub mod auth;
mod bootstrap;
pub mod cli;
pub mod compute;
pub mod config;
pub mod disk;
pub mod error;
pub mod pool;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use disk::BlobDiskController;
pub use error::{BlobDiskError, Result};
