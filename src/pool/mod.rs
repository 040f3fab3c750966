//! Storage account pool
//!
//! Naming, per-account cached state and the placement/growth logic.

pub mod manager;
pub mod naming;
pub mod state;

pub use manager::AccountPool;
pub use naming::{blob_name, hash_disk_uri, validate_disk_name, ClusterNaming, DiskLocation};
pub use state::{AccountSnapshot, AccountState};
