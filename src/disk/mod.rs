//! Blob disk lifecycle and VHD encoding

pub mod controller;
pub mod vhd;

pub use controller::BlobDiskController;
pub use vhd::{VhdFooter, FOOTER_SIZE};
