//! Utility functions module
//!
//! This module contains HTTP client construction, retry and polling
//! logic, table formatting, and serde helpers.

pub mod arm;
pub mod format;
pub mod network;
pub mod retry;
pub mod serde_duration;

pub use format::*;
pub use network::*;
pub use retry::*;
