//! Compute node disk attachment
//!
//! Typed instance documents, the [`InstanceOperations`] boundary and LUN
//! selection.

pub mod lun;
pub mod models;
pub mod operations;

pub use lun::{find_free_lun, lun_capacity};
pub use models::{DataDisk, InstanceDescriptor, InstancePatch, NodeDiskMode};
pub use operations::{AzureInstanceOperations, InstanceOperations};
