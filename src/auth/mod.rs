//! Authentication module
//!
//! Token acquisition for Azure Resource Manager requests.

pub mod provider;

pub use provider::*;
