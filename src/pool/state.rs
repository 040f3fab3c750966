//! Per-account cached state

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tabled::Tabled;
use tokio::sync::{Mutex, OnceCell};
use zeroize::Zeroizing;

use crate::storage::SkuClass;

/// Disk count value meaning "not known, list the container to find out"
pub const UNKNOWN_DISK_COUNT: i32 = -1;

/// Cached view of one storage account
///
/// The key is fetched at most once. The disk count is a hint for placement
/// only and may drift from the remote listing until the next recount.
pub struct AccountState {
    name: String,
    sku: SkuClass,
    key: OnceCell<Zeroizing<String>>,
    disk_count: AtomicI32,
    container_created: AtomicBool,
    readiness: Mutex<()>,
}

impl AccountState {
    pub fn new(name: impl Into<String>, sku: SkuClass) -> Self {
        Self {
            name: name.into(),
            sku,
            key: OnceCell::new(),
            disk_count: AtomicI32::new(UNKNOWN_DISK_COUNT),
            container_created: AtomicBool::new(false),
            readiness: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sku(&self) -> SkuClass {
        self.sku
    }

    pub(crate) fn key_cell(&self) -> &OnceCell<Zeroizing<String>> {
        &self.key
    }

    /// Serializes readiness polling for this account
    pub(crate) fn readiness_gate(&self) -> &Mutex<()> {
        &self.readiness
    }

    pub fn cached_disk_count(&self) -> Option<i32> {
        let count = self.disk_count.load(Ordering::Acquire);
        (count >= 0).then_some(count)
    }

    pub fn set_disk_count(&self, count: i32) {
        self.disk_count.store(count.max(0), Ordering::Release);
    }

    pub fn invalidate_disk_count(&self) {
        self.disk_count.store(UNKNOWN_DISK_COUNT, Ordering::Release);
    }

    /// Add one disk to a known count; an unknown count stays unknown
    pub fn increment_disk_count(&self) -> Option<i32> {
        self.disk_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count >= 0).then(|| count.saturating_add(1))
            })
            .ok()
            .map(|previous| previous + 1)
    }

    /// Remove one disk from a known, non-zero count
    pub fn decrement_disk_count(&self) -> Option<i32> {
        self.disk_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                (count > 0).then(|| count - 1)
            })
            .ok()
            .map(|previous| previous - 1)
    }

    pub fn is_container_created(&self) -> bool {
        self.container_created.load(Ordering::Acquire)
    }

    pub fn mark_container_created(&self) {
        self.container_created.store(true, Ordering::Release);
    }

    pub fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            name: self.name.clone(),
            sku: self.sku.to_string(),
            disks: self
                .cached_disk_count()
                .map(|count| count.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            container_created: self.is_container_created(),
        }
    }
}

impl fmt::Debug for AccountState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountState")
            .field("name", &self.name)
            .field("sku", &self.sku)
            .field("key_cached", &self.key.initialized())
            .field("disk_count", &self.disk_count)
            .field("container_created", &self.container_created)
            .finish()
    }
}

/// Read-only row describing one cached account
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct AccountSnapshot {
    #[tabled(rename = "Account")]
    pub name: String,
    #[tabled(rename = "SKU")]
    pub sku: String,
    #[tabled(rename = "Disks")]
    pub disks: String,
    #[tabled(rename = "Container")]
    pub container_created: bool,
}
