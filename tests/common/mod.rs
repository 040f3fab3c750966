//! In-memory stand-in for the Azure management, blob and compute APIs

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blobdisk::compute::{DataDisk, InstanceDescriptor, InstanceOperations, InstancePatch};
use blobdisk::config::{ProcessRole, Settings};
use blobdisk::pool::ClusterNaming;
use blobdisk::storage::{
    AccountCreateRequest, AccountCredentials, AccountOperations, AccountSummary, BlobOperations,
    PageBlobCreateRequest, ProvisioningState, SkuClass,
};
use blobdisk::utils::retry::Backoff;
use blobdisk::{BlobDiskController, BlobDiskError, Result};

pub const SUBSCRIPTION: &str = "sub-test";
pub const RESOURCE_GROUP: &str = "rg-test";
pub const LOCATION: &str = "eastus";

pub fn fast_backoff() -> Backoff {
    Backoff {
        initial: Duration::from_millis(1),
        factor: 1.5,
        steps: 8,
        cap: Duration::from_millis(5),
    }
}

pub fn settings() -> Settings {
    let mut settings = Settings {
        subscription_id: SUBSCRIPTION.to_string(),
        resource_group: RESOURCE_GROUP.to_string(),
        location: LOCATION.to_string(),
        role: ProcessRole::ControlPlane,
        ..Settings::default()
    };
    settings.pool.settle_delay = Duration::ZERO;
    settings.pool.readiness_wait = Duration::from_secs(5);
    settings.pool.provisioning_backoff = fast_backoff();
    settings.pool.detach_backoff = fast_backoff();
    settings
}

pub fn naming() -> ClusterNaming {
    ClusterNaming::new(SUBSCRIPTION, RESOURCE_GROUP, LOCATION).unwrap()
}

pub fn controller(cloud: &Arc<FakeCloud>, settings: &Settings) -> BlobDiskController {
    BlobDiskController::new(settings, cloud.clone(), cloud.clone(), cloud.clone()).unwrap()
}

#[derive(Debug, Default)]
struct FakeAccount {
    sku: Option<SkuClass>,
    creating_polls_left: u32,
    containers: HashMap<String, BTreeMap<String, u64>>,
}

#[derive(Debug, Clone)]
struct FakeNode {
    vm_size: String,
    managed: bool,
    disks: Vec<DataDisk>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageWrite {
    pub blob: String,
    pub offset: u64,
    pub len: usize,
}

/// Shared fake cloud with call counters
#[derive(Default)]
pub struct FakeCloud {
    accounts: Mutex<HashMap<String, FakeAccount>>,
    nodes: Mutex<HashMap<String, FakeNode>>,
    leased: Mutex<HashSet<String>>,
    page_writes: Mutex<Vec<PageWrite>>,
    /// Answers of "Creating" every newly created account gives first
    pub creating_polls: AtomicU32,
    pub fail_list: AtomicBool,
    pub fail_put_page: AtomicBool,
    pub ignore_patches: AtomicBool,
    pub create_calls: AtomicUsize,
    pub container_create_calls: AtomicUsize,
    pub state_calls: AtomicUsize,
    pub patch_calls: AtomicUsize,
}

impl FakeCloud {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// An account that already exists with `disks` blobs in `container`
    pub fn seed_account(&self, name: &str, sku: SkuClass, container: &str, disks: usize) {
        let blobs = (0..disks)
            .map(|i| (format!("seed-{i}.vhd"), 1u64 << 30))
            .collect();
        let account = FakeAccount {
            sku: Some(sku),
            creating_polls_left: 0,
            containers: HashMap::from([(container.to_string(), blobs)]),
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(name.to_string(), account);
    }

    /// An account that reports "Creating" for the next `polls` state reads
    pub fn seed_provisioning_account(&self, name: &str, sku: SkuClass, polls: u32) {
        let account = FakeAccount {
            sku: Some(sku),
            creating_polls_left: polls,
            containers: HashMap::new(),
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(name.to_string(), account);
    }

    pub fn seed_node(&self, node: &str, vm_size: &str, managed: bool) {
        self.nodes.lock().unwrap().insert(
            node.to_string(),
            FakeNode {
                vm_size: vm_size.to_string(),
                managed,
                disks: Vec::new(),
            },
        );
    }

    pub fn lease(&self, account: &str, blob: &str) {
        self.leased
            .lock()
            .unwrap()
            .insert(format!("{account}/{blob}"));
    }

    pub fn has_account(&self, name: &str) -> bool {
        self.accounts.lock().unwrap().contains_key(name)
    }

    pub fn account_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.accounts.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn account_sku(&self, name: &str) -> Option<SkuClass> {
        self.accounts.lock().unwrap().get(name).and_then(|a| a.sku)
    }

    pub fn blob_names(&self, account: &str, container: &str) -> Vec<String> {
        self.accounts
            .lock()
            .unwrap()
            .get(account)
            .and_then(|a| a.containers.get(container))
            .map(|blobs| blobs.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn blob_size(&self, account: &str, container: &str, blob: &str) -> Option<u64> {
        self.accounts
            .lock()
            .unwrap()
            .get(account)
            .and_then(|a| a.containers.get(container))
            .and_then(|blobs| blobs.get(blob).copied())
    }

    pub fn page_writes(&self) -> Vec<PageWrite> {
        self.page_writes.lock().unwrap().clone()
    }

    pub fn node_disks(&self, node: &str) -> Vec<DataDisk> {
        self.nodes
            .lock()
            .unwrap()
            .get(node)
            .map(|n| n.disks.clone())
            .unwrap_or_default()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn with_container<T>(
        &self,
        creds: &AccountCredentials,
        container: &str,
        f: impl FnOnce(&mut BTreeMap<String, u64>) -> T,
    ) -> Result<T> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&creds.name)
            .ok_or_else(|| BlobDiskError::account_not_found(creds.name.clone()))?;
        let blobs = account.containers.get_mut(container).ok_or_else(|| {
            BlobDiskError::azure_api(format!("HTTP 404: container {container} not found"))
        })?;
        Ok(f(blobs))
    }
}

#[async_trait]
impl AccountOperations for FakeCloud {
    async fn list_accounts(&self) -> Result<Vec<AccountSummary>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BlobDiskError::network("connection reset by peer"));
        }
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(name, account)| {
                account.sku.map(|sku| AccountSummary {
                    name: name.clone(),
                    sku,
                })
            })
            .collect())
    }

    async fn get_account_state(&self, name: &str) -> Result<Option<ProvisioningState>> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        let mut accounts = self.accounts.lock().unwrap();
        Ok(accounts.get_mut(name).map(|account| {
            if account.creating_polls_left > 0 {
                account.creating_polls_left -= 1;
                ProvisioningState::Creating
            } else {
                ProvisioningState::Succeeded
            }
        }))
    }

    async fn create_account(&self, request: &AccountCreateRequest) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let polls = self.creating_polls.load(Ordering::SeqCst);
        self.accounts
            .lock()
            .unwrap()
            .entry(request.name.clone())
            .or_insert_with(|| FakeAccount {
                sku: Some(request.sku),
                creating_polls_left: polls,
                containers: HashMap::new(),
            });
        Ok(())
    }

    async fn delete_account(&self, name: &str) -> Result<()> {
        self.accounts
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| BlobDiskError::account_not_found(name))
    }

    async fn list_keys(&self, name: &str) -> Result<Vec<String>> {
        if self.has_account(name) {
            Ok(vec![format!("key-{name}"), format!("key2-{name}")])
        } else {
            Err(BlobDiskError::account_not_found(name))
        }
    }
}

#[async_trait]
impl BlobOperations for FakeCloud {
    async fn create_container_if_absent(
        &self,
        creds: &AccountCredentials,
        container: &str,
    ) -> Result<bool> {
        self.container_create_calls.fetch_add(1, Ordering::SeqCst);
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&creds.name)
            .ok_or_else(|| BlobDiskError::account_not_found(creds.name.clone()))?;
        if account.containers.contains_key(container) {
            return Ok(false);
        }
        account
            .containers
            .insert(container.to_string(), BTreeMap::new());
        Ok(true)
    }

    async fn put_page_blob(
        &self,
        creds: &AccountCredentials,
        request: &PageBlobCreateRequest,
    ) -> Result<()> {
        self.with_container(creds, &request.container, |blobs| {
            blobs.insert(request.blob.clone(), request.size);
        })
    }

    async fn put_page(
        &self,
        creds: &AccountCredentials,
        container: &str,
        blob: &str,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<()> {
        if self.fail_put_page.load(Ordering::SeqCst) {
            return Err(BlobDiskError::azure_api("HTTP 500: injected page failure"));
        }
        let size = self
            .with_container(creds, container, |blobs| blobs.get(blob).copied())?
            .ok_or_else(|| BlobDiskError::azure_api(format!("HTTP 404: blob {blob}")))?;
        if offset % 512 != 0 || offset + data.len() as u64 > size {
            return Err(BlobDiskError::azure_api("HTTP 416: invalid page range"));
        }
        self.page_writes.lock().unwrap().push(PageWrite {
            blob: blob.to_string(),
            offset,
            len: data.len(),
        });
        Ok(())
    }

    async fn delete_blob_if_exists(
        &self,
        creds: &AccountCredentials,
        container: &str,
        blob: &str,
    ) -> Result<bool> {
        self.with_container(creds, container, |blobs| blobs.remove(blob).is_some())
    }

    async fn set_blob_metadata(
        &self,
        creds: &AccountCredentials,
        container: &str,
        blob: &str,
        _metadata: &HashMap<String, String>,
    ) -> Result<()> {
        if self
            .leased
            .lock()
            .unwrap()
            .contains(&format!("{}/{blob}", creds.name))
        {
            return Err(BlobDiskError::azure_api("HTTP 412: there is currently a lease"));
        }
        let exists = self.with_container(creds, container, |blobs| blobs.contains_key(blob))?;
        if exists {
            Ok(())
        } else {
            Err(BlobDiskError::azure_api(format!("HTTP 404: blob {blob}")))
        }
    }

    async fn list_blobs(
        &self,
        creds: &AccountCredentials,
        container: &str,
    ) -> Result<Vec<String>> {
        self.with_container(creds, container, |blobs| blobs.keys().cloned().collect())
    }
}

#[async_trait]
impl InstanceOperations for FakeCloud {
    async fn get_instance(&self, node: &str) -> Result<InstanceDescriptor> {
        let node_state = self
            .nodes
            .lock()
            .unwrap()
            .get(node)
            .cloned()
            .ok_or_else(|| BlobDiskError::azure_api(format!("Virtual machine '{node}' not found")))?;

        let os_disk = if node_state.managed {
            json!({"managedDisk": {"storageAccountType": "Premium_LRS"}})
        } else {
            json!({"vhd": {"uri": format!("https://os.blob.core.windows.net/vhds/{node}.vhd")}})
        };
        let descriptor = json!({
            "name": node,
            "location": LOCATION,
            "resources": [{"id": "extension"}],
            "properties": {
                "hardwareProfile": {"vmSize": node_state.vm_size},
                "storageProfile": {"osDisk": os_disk, "dataDisks": node_state.disks}
            }
        });
        Ok(serde_json::from_value(descriptor)?)
    }

    async fn patch_instance(&self, node: &str, patch: &InstancePatch) -> Result<()> {
        self.patch_calls.fetch_add(1, Ordering::SeqCst);
        if self.ignore_patches.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut nodes = self.nodes.lock().unwrap();
        let node_state = nodes
            .get_mut(node)
            .ok_or_else(|| BlobDiskError::azure_api(format!("Virtual machine '{node}' not found")))?;
        node_state.disks = patch.data_disks().to_vec();
        Ok(())
    }
}
