//! Blob disk lifecycle: create, delete, attach and detach
//!
//! Disks are page blobs holding a fixed VHD. Shared disks live in pooled
//! accounts chosen by [`AccountPool`]; dedicated disks get an account to
//! themselves. Attachments exist only on the node's instance document.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::vhd::{VhdFooter, FOOTER_SIZE};
use crate::auth::provider::create_default_auth_provider;
use crate::bootstrap::Bootstrap;
use crate::compute::{
    find_free_lun, lun_capacity, AzureInstanceOperations, DataDisk, InstanceOperations,
    InstancePatch, NodeDiskMode,
};
use crate::config::{ProcessRole, Settings};
use crate::error::{BlobDiskError, Result};
use crate::pool::{blob_name, validate_disk_name, AccountPool, ClusterNaming, DiskLocation};
use crate::storage::{
    AccountOperations, AzureAccountOperations, AzureBlobOperations, BlobOperations,
    PageBlobCreateRequest, SkuClass,
};
use crate::utils::retry::{poll_until, Backoff};

const GIB: u64 = 1 << 30;

/// Metadata put on every disk blob
pub const DISK_CREATED_BY: (&str, &str) = ("created-by", "k8s-azure-DataDisk");

/// Metadata written to test a blob for a lease
const LEASE_MARKER: (&str, &str) = ("azureddcheck", "ok");

pub struct BlobDiskController {
    naming: Arc<ClusterNaming>,
    endpoint_suffix: String,
    role: ProcessRole,
    detach_backoff: Backoff,
    pool: Arc<AccountPool>,
    blobs_api: Arc<dyn BlobOperations>,
    instances_api: Arc<dyn InstanceOperations>,
    node_gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    bootstrapped: AtomicBool,
    bootstrap: Mutex<Bootstrap>,
    shutdown: watch::Sender<bool>,
}

impl BlobDiskController {
    pub fn new(
        settings: &Settings,
        accounts_api: Arc<dyn AccountOperations>,
        blobs_api: Arc<dyn BlobOperations>,
        instances_api: Arc<dyn InstanceOperations>,
    ) -> Result<Self> {
        let naming = Arc::new(ClusterNaming::from_settings(settings)?);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let pool = AccountPool::new(settings, naming.clone(), accounts_api, blobs_api.clone())
            .with_shutdown(shutdown_rx);

        Ok(Self {
            naming,
            endpoint_suffix: settings.storage_endpoint_suffix.clone(),
            role: settings.role,
            detach_backoff: settings.pool.detach_backoff.clone(),
            pool: Arc::new(pool),
            blobs_api,
            instances_api,
            node_gates: Mutex::new(HashMap::new()),
            bootstrapped: AtomicBool::new(false),
            bootstrap: Mutex::new(Bootstrap::idle()),
            shutdown,
        })
    }

    /// Controller backed by the Azure management and blob APIs
    pub fn with_azure(settings: &Settings) -> Result<Self> {
        let auth_provider = create_default_auth_provider()?;
        let accounts_api = AzureAccountOperations::new(
            auth_provider.clone(),
            settings.subscription_id.clone(),
            settings.resource_group.clone(),
        )?;
        let instances_api = AzureInstanceOperations::new(
            auth_provider,
            settings.subscription_id.clone(),
            settings.resource_group.clone(),
        )?;
        let blobs_api = AzureBlobOperations::new(settings.storage_endpoint_suffix.clone());

        Self::new(
            settings,
            Arc::new(accounts_api),
            Arc::new(blobs_api),
            Arc::new(instances_api),
        )
    }

    pub fn pool(&self) -> &Arc<AccountPool> {
        &self.pool
    }

    pub fn naming(&self) -> &ClusterNaming {
        &self.naming
    }

    pub async fn refresh_pool(&self) -> Result<()> {
        self.pool.refresh().await
    }

    /// Pre-warm the pool in the background, at most once per controller
    ///
    /// Only a control-plane process bootstraps. Call after
    /// [`refresh_pool`](Self::refresh_pool) so an existing pool is seen.
    /// The spawned tasks belong to the controller and run until they finish,
    /// [`shutdown`](Self::shutdown) is called, or the controller is dropped.
    /// Returns the number of accounts being provisioned.
    pub async fn bootstrap(&self) -> usize {
        if self.role != ProcessRole::ControlPlane {
            debug!("Not a control-plane process, skipping pool bootstrap");
            return 0;
        }
        if self.bootstrapped.swap(true, Ordering::AcqRel) {
            debug!("Pool bootstrap already ran");
            return 0;
        }

        let started = Bootstrap::start(self.pool.clone()).await;
        let count = started.len();
        *self.bootstrap.lock().await = started;
        count
    }

    /// Wait for background bootstrap tasks to finish
    pub async fn wait_for_bootstrap(&self) {
        let running = std::mem::replace(&mut *self.bootstrap.lock().await, Bootstrap::idle());
        running.join().await;
    }

    /// Cancel in-flight polling loops and abort outstanding bootstrap tasks
    pub async fn shutdown(&self) {
        self.shutdown.send_replace(true);
        let running = std::mem::replace(&mut *self.bootstrap.lock().await, Bootstrap::idle());
        running.shutdown().await;
    }

    fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Create a disk and return its URI
    pub async fn create_disk(
        &self,
        name: &str,
        sku: SkuClass,
        size_gib: u64,
        dedicated: bool,
    ) -> Result<String> {
        validate_disk_name(name)?;
        let data_size = size_gib
            .checked_mul(GIB)
            .filter(|size| *size > 0)
            .ok_or_else(|| {
                BlobDiskError::invalid_argument(format!("invalid disk size {size_gib} GiB"))
            })?;

        let account = if dedicated {
            let account = self.naming.dedicated_account_name(name);
            self.pool.provision_account(&account, sku, false).await?;
            account
        } else {
            self.pool.find_or_create_account_for_new_disk(sku).await?
        };

        let location = DiskLocation {
            account,
            container: self.naming.container().to_string(),
            blob: blob_name(name),
        };
        let creds = self.pool.credentials(&location.account).await?;

        let request = PageBlobCreateRequest {
            container: location.container.clone(),
            blob: location.blob.clone(),
            size: data_size + FOOTER_SIZE as u64,
            tags: HashMap::from([(
                DISK_CREATED_BY.0.to_string(),
                DISK_CREATED_BY.1.to_string(),
            )]),
        };
        self.blobs_api.put_page_blob(&creds, &request).await?;

        let footer = VhdFooter::fixed(data_size).encode();
        if let Err(e) = self
            .blobs_api
            .put_page(&creds, &location.container, &location.blob, data_size, footer)
            .await
        {
            warn!(
                "Failed to write VHD footer of {} on {}: {e}",
                location.blob, location.account
            );
            if let Err(cleanup) = self
                .blobs_api
                .delete_blob_if_exists(&creds, &location.container, &location.blob)
                .await
            {
                warn!(
                    "Failed to clean up blob {} on {}: {cleanup}",
                    location.blob, location.account
                );
            }
            return Err(e);
        }

        if !dedicated {
            self.pool.record_disk_added(&location.account).await;
        }

        let uri = location.uri(&self.endpoint_suffix);
        info!("Created disk {uri} ({size_gib} GiB, {sku})");
        Ok(uri)
    }

    /// Delete a disk; `Ok(false)` if its blob was already gone
    ///
    /// A forced disk owns its account, so the whole account goes.
    pub async fn delete_disk(&self, uri: &str, was_forced: bool) -> Result<bool> {
        let location = DiskLocation::parse(uri)?;

        if was_forced {
            self.pool.delete_account(&location.account).await?;
            info!("Deleted dedicated disk {uri} with its account");
            return Ok(true);
        }

        let creds = self.pool.credentials(&location.account).await?;
        let deleted = self
            .blobs_api
            .delete_blob_if_exists(&creds, &location.container, &location.blob)
            .await;

        match &deleted {
            Ok(true) => {
                info!("Deleted disk {uri}");
                self.pool.record_disk_removed(&location.account).await;
            }
            Ok(false) | Err(_) => {
                if let Some(account) = self.pool.get(&location.account).await {
                    account.invalidate_disk_count();
                }
            }
        }

        deleted
    }

    /// Whether nothing holds a lease on the disk's blob
    ///
    /// Disks outside the pool container cannot be checked and are assumed
    /// free. For pooled disks any failed write counts as a lease.
    pub async fn disk_has_no_lease(&self, uri: &str) -> Result<bool> {
        let location = DiskLocation::parse(uri)?;
        if location.container != self.naming.container() {
            debug!("Disk {uri} is outside the pool container, assuming no lease");
            return Ok(true);
        }

        let creds = match self.pool.credentials(&location.account).await {
            Ok(creds) => creds,
            Err(e) => {
                debug!("Cannot check lease on {uri}: {e}");
                return Ok(false);
            }
        };

        let marker = HashMap::from([(LEASE_MARKER.0.to_string(), LEASE_MARKER.1.to_string())]);
        match self
            .blobs_api
            .set_blob_metadata(&creds, &location.container, &location.blob, &marker)
            .await
        {
            Ok(()) => Ok(true),
            Err(e) => {
                debug!("Lease check on {uri} failed: {e}");
                Ok(false)
            }
        }
    }

    async fn node_gate(&self, node: &str) -> Arc<Mutex<()>> {
        self.node_gates
            .lock()
            .await
            .entry(node.to_string())
            .or_default()
            .clone()
    }

    /// Forget a node's gate once nobody else holds it
    async fn release_node_gate(&self, node: &str, gate: Arc<Mutex<()>>) {
        drop(gate);
        let mut gates = self.node_gates.lock().await;
        if gates
            .get(node)
            .is_some_and(|gate| Arc::strong_count(gate) == 1)
        {
            gates.remove(node);
        }
    }

    #[cfg(test)]
    async fn tracked_node_gates(&self) -> usize {
        self.node_gates.lock().await.len()
    }

    /// Attach a disk to a node and return its LUN
    ///
    /// Returns as soon as the node accepted the update; the node side is
    /// expected to wait for the device.
    pub async fn attach_disk(&self, node: &str, uri: &str, caching: &str) -> Result<u32> {
        if !self.disk_has_no_lease(uri).await? {
            return Err(BlobDiskError::disk_leased(uri, node));
        }
        let location = DiskLocation::parse(uri)?;
        let disk_name = location
            .blob
            .rsplit('/')
            .next()
            .unwrap_or(&location.blob)
            .to_string();

        let gate = self.node_gate(node).await;
        let attached = {
            let _guard = gate.lock().await;
            self.attach_locked(node, uri, &disk_name, caching).await
        };
        self.release_node_gate(node, gate).await;

        let lun = attached?;
        info!("Attached disk {uri} to node {node} at LUN {lun}");
        Ok(lun)
    }

    async fn attach_locked(
        &self,
        node: &str,
        uri: &str,
        disk_name: &str,
        caching: &str,
    ) -> Result<u32> {
        let instance = self.instances_api.get_instance(node).await?;
        let (vm_size, mut data_disks) = match instance.disk_mode() {
            NodeDiskMode::Unmanaged {
                vm_size,
                data_disks,
            } => (vm_size, data_disks),
            NodeDiskMode::Managed => {
                return Err(BlobDiskError::unsupported_node_mode(node, disk_name));
            }
        };

        let lun = find_free_lun(&vm_size, &data_disks).ok_or_else(|| BlobDiskError::NoFreeLun {
            node: node.to_string(),
            capacity: lun_capacity(&vm_size),
        })?;

        data_disks.push(DataDisk::attach_vhd(disk_name, uri, caching, lun));
        self.instances_api
            .patch_instance(node, &InstancePatch::with_data_disks(data_disks))
            .await?;
        Ok(lun)
    }

    /// Detach the disk whose URI hashes to `hashed_uri` from a node
    ///
    /// A disk that is not listed on the node counts as detached. After the
    /// update the removal is confirmed on a best-effort basis only.
    pub async fn detach_disk(&self, node: &str, hashed_uri: &str) -> Result<()> {
        let gate = self.node_gate(node).await;
        let detached = {
            let _guard = gate.lock().await;
            self.detach_locked(node, hashed_uri).await
        };
        self.release_node_gate(node, gate).await;

        let removed = detached?;
        if removed.is_empty() {
            info!("Disk {hashed_uri} is not attached to node {node}, nothing to detach");
            return Ok(());
        }

        let uri = removed.iter().find_map(|disk| disk.vhd_uri());
        self.confirm_detach(node, hashed_uri, uri).await;
        Ok(())
    }

    /// Patch out the matching entries and return them
    async fn detach_locked(&self, node: &str, hashed_uri: &str) -> Result<Vec<DataDisk>> {
        let instance = self.instances_api.get_instance(node).await?;
        let (removed, kept): (Vec<DataDisk>, Vec<DataDisk>) = instance
            .properties
            .storage_profile
            .data_disks
            .into_iter()
            .partition(|disk| disk.matches_hash(hashed_uri));

        if !removed.is_empty() {
            self.instances_api
                .patch_instance(node, &InstancePatch::with_data_disks(kept))
                .await?;
        }
        Ok(removed)
    }

    async fn confirm_detach(&self, node: &str, hashed_uri: &str, uri: Option<&str>) {
        let instances_api = &self.instances_api;
        let detached = poll_until(
            &self.detach_backoff,
            Some(self.shutdown_signal()),
            move || async move { Ok(!instances_api.is_disk_attached(hashed_uri, node).await?) },
        )
        .await;

        let error = match detached {
            Ok(()) => {
                info!("Disk {hashed_uri} detached from node {node}");
                return;
            }
            Err(e) => e,
        };

        let Some(uri) = uri else {
            warn!("Could not confirm detach of {hashed_uri} from node {node}: {error}");
            return;
        };

        warn!("Could not confirm detach of {uri} from node {node} ({error}), waiting for its lease");
        let released = poll_until(
            &self.detach_backoff,
            Some(self.shutdown_signal()),
            move || async move { self.disk_has_no_lease(uri).await },
        )
        .await;

        match released {
            Ok(()) => info!("Lease on {uri} released after detach from node {node}"),
            Err(e) => warn!("Neither attachment state nor lease of {uri} converged: {e}"),
        }
    }
}
