//! Shared storage account pool
//!
//! [`AccountPool`] caches the cluster's storage accounts and decides where a
//! new disk lands. It grows the pool once the average utilization of an SKU
//! crosses the configured threshold, and makes sure every account it hands
//! out is provisioned and has the default container.
//!
//! The cache is never authoritative. Every operation tolerates drift from
//! the remote listing, which is why most of them are phrased as "ensure".

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::naming::{ClusterNaming, MAX_ACCOUNT_NUMBER};
use super::state::{AccountSnapshot, AccountState};
use crate::config::{PoolSettings, Settings};
use crate::error::{BlobDiskError, Result};
use crate::storage::{
    AccountCreateRequest, AccountCredentials, AccountOperations, BlobOperations,
    ProvisioningState, SkuClass,
};
use crate::utils::retry::poll_until;

/// Tag put on every account this pool creates
pub const ACCOUNT_CREATED_BY: (&str, &str) = ("created-by", "azure-dd");

pub struct AccountPool {
    settings: PoolSettings,
    location: String,
    naming: Arc<ClusterNaming>,
    accounts_api: Arc<dyn AccountOperations>,
    blobs_api: Arc<dyn BlobOperations>,
    accounts: RwLock<HashMap<String, Arc<AccountState>>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl AccountPool {
    pub fn new(
        settings: &Settings,
        naming: Arc<ClusterNaming>,
        accounts_api: Arc<dyn AccountOperations>,
        blobs_api: Arc<dyn BlobOperations>,
    ) -> Self {
        Self {
            settings: settings.pool.clone(),
            location: settings.location.clone(),
            naming,
            accounts_api,
            blobs_api,
            accounts: RwLock::new(HashMap::new()),
            shutdown: None,
        }
    }

    /// Stop provisioning polls when `shutdown` flips to `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn naming(&self) -> &ClusterNaming {
        &self.naming
    }

    /// Rebuild the cache from the remote listing
    ///
    /// Only accounts named after this cluster's pool pattern are adopted.
    /// Every adopted account starts with an unknown disk count.
    pub async fn refresh(&self) -> Result<()> {
        let listed = self.accounts_api.list_accounts().await.map_err(|e| match e {
            BlobDiskError::RemoteListError(_) => e,
            other => BlobDiskError::remote_list(other.to_string()),
        })?;

        let fresh: HashMap<String, Arc<AccountState>> = listed
            .into_iter()
            .filter(|account| self.naming.is_pool_account(&account.name))
            .map(|account| {
                let state = Arc::new(AccountState::new(account.name.clone(), account.sku));
                (account.name, state)
            })
            .collect();

        info!("Account pool refreshed with {} accounts", fresh.len());
        *self.accounts.write().await = fresh;
        Ok(())
    }

    pub async fn get(&self, name: &str) -> Option<Arc<AccountState>> {
        self.accounts.read().await.get(name).cloned()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }

    /// Number of cached accounts that belong to the shared pool
    pub async fn pool_account_count(&self) -> usize {
        self.accounts
            .read()
            .await
            .keys()
            .filter(|name| self.naming.is_pool_account(name))
            .count()
    }

    /// Pool accounts of one SKU, in name order
    async fn pool_accounts_of(&self, sku: SkuClass) -> Vec<Arc<AccountState>> {
        let mut matching: Vec<Arc<AccountState>> = self
            .accounts
            .read()
            .await
            .values()
            .filter(|account| account.sku() == sku && self.naming.is_pool_account(account.name()))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name().cmp(b.name()));
        matching
    }

    /// Insert a descriptor unless one is already cached
    async fn adopt(&self, name: &str, sku: SkuClass) -> Arc<AccountState> {
        self.accounts
            .write()
            .await
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AccountState::new(name, sku)))
            .clone()
    }

    /// Pick the account a new disk of `sku` should be written to
    ///
    /// An empty account is returned as soon as it is seen. Otherwise the
    /// least loaded account wins, unless placing one more disk would push
    /// the average utilization of the SKU over the growth threshold and the
    /// pool may still grow. When it may not, the least loaded account is
    /// returned even if it is at its ceiling.
    pub async fn find_or_create_account_for_new_disk(&self, sku: SkuClass) -> Result<String> {
        let candidates = self.pool_accounts_of(sku).await;
        if candidates.is_empty() {
            debug!("No {sku} account in pool, provisioning one");
            return self.provision_next_account(sku).await;
        }

        let ceiling = self.settings.max_disks_per_account;
        let mut total: i64 = 0;
        let mut least_loaded: Option<(&str, i32)> = None;

        for account in &candidates {
            let count = self.disk_count(account.name()).await?;
            if count == 0 {
                debug!("Account {} has no disks, using it", account.name());
                return Ok(account.name().to_string());
            }

            total += i64::from(count);
            if least_loaded.map_or(true, |(_, least)| count < least) {
                least_loaded = Some((account.name(), count));
            }
        }

        let capacity = candidates.len() as f64 * f64::from(ceiling);
        let utilization = (total + 1) as f64 / capacity;
        let Some((least_name, least_count)) = least_loaded else {
            return self.provision_next_account(sku).await;
        };

        if utilization > self.settings.growth_threshold {
            let pool_size = self.pool_account_count().await;
            if pool_size < self.settings.max_accounts {
                info!(
                    "Average utilization of {sku} accounts would reach {utilization:.2}, growing pool"
                );
                return self.provision_next_account(sku).await;
            }

            warn!(
                "Pool is at {pool_size} accounts, placing disk on {least_name} \
                 ({least_count}/{ceiling} disks) despite utilization {utilization:.2}"
            );
        }

        Ok(least_name.to_string())
    }

    async fn provision_next_account(&self, sku: SkuClass) -> Result<String> {
        let name = self
            .naming
            .account_name_for(self.next_account_suffix_number().await?);
        self.provision_account(&name, sku, true).await?;
        Ok(name)
    }

    /// One more than the highest sequence number among cached pool accounts
    ///
    /// Fails once that number no longer fits the three-digit suffix, since
    /// such a name would fall outside the pool pattern.
    pub async fn next_account_suffix_number(&self) -> Result<u32> {
        let accounts = self.accounts.read().await;
        let numbers: Vec<u32> = accounts
            .keys()
            .filter_map(|name| self.naming.account_number(name))
            .collect();

        let next = numbers.iter().copied().max().unwrap_or(0) + 1;
        if next > MAX_ACCOUNT_NUMBER {
            return Err(BlobDiskError::CapacityExceeded {
                current: numbers.len(),
                max: MAX_ACCOUNT_NUMBER as usize,
            });
        }
        Ok(next)
    }

    /// Create the account unless it already exists, then ensure its container
    ///
    /// Safe to call concurrently for the same name: the losing caller finds
    /// the account already there and only ensures the container.
    pub async fn provision_account(
        &self,
        name: &str,
        sku: SkuClass,
        enforce_max_count: bool,
    ) -> Result<()> {
        if self.accounts_api.get_account_state(name).await?.is_some() {
            debug!("Storage account {name} already exists");
            self.adopt(name, sku).await;
        } else {
            if enforce_max_count {
                let current = self.pool_account_count().await;
                let max = self.settings.max_accounts;
                if current >= max {
                    return Err(BlobDiskError::CapacityExceeded { current, max });
                }
            }

            info!(
                "Creating storage account {name} ({sku}) in {}",
                self.location
            );
            let request = AccountCreateRequest {
                name: name.to_string(),
                sku,
                location: self.location.clone(),
                tags: HashMap::from([(
                    ACCOUNT_CREATED_BY.0.to_string(),
                    ACCOUNT_CREATED_BY.1.to_string(),
                )]),
            };
            self.accounts_api.create_account(&request).await?;
            self.adopt(name, sku).await;

            sleep(self.settings.settle_delay).await;
        }

        self.ensure_default_container(name).await
    }

    /// Make sure the account is provisioned and holds the pool container
    ///
    /// Only one caller polls the provisioning state of a given account;
    /// concurrent callers wait on the account's readiness gate and return
    /// once the first one has created the container.
    pub async fn ensure_default_container(&self, name: &str) -> Result<()> {
        let account = self
            .get(name)
            .await
            .ok_or_else(|| BlobDiskError::account_not_found(name))?;
        if account.is_container_created() {
            return Ok(());
        }

        let state = self
            .accounts_api
            .get_account_state(name)
            .await?
            .ok_or_else(|| BlobDiskError::account_not_found(name))?;

        if state == ProvisioningState::Succeeded {
            return self.create_default_container(&account).await;
        }

        let _gate = timeout(self.settings.readiness_wait, account.readiness_gate().lock())
            .await
            .map_err(|_| BlobDiskError::readiness_timeout(name))?;
        if account.is_container_created() {
            return Ok(());
        }

        debug!("Waiting for storage account {name} to finish provisioning");
        let accounts_api = &self.accounts_api;
        poll_until(
            &self.settings.provisioning_backoff,
            self.shutdown.clone(),
            move || async move {
                Ok(accounts_api.get_account_state(name).await? == Some(ProvisioningState::Succeeded))
            },
        )
        .await
        .map_err(|e| match e {
            BlobDiskError::Timeout => BlobDiskError::provisioning_timeout(name),
            other => other,
        })?;

        self.create_default_container(&account).await
    }

    async fn create_default_container(&self, account: &AccountState) -> Result<()> {
        let creds = self.credentials(account.name()).await?;
        let created = self
            .blobs_api
            .create_container_if_absent(&creds, self.naming.container())
            .await?;
        if created {
            info!(
                "Created container {} on storage account {}",
                self.naming.container(),
                account.name()
            );
        }
        account.mark_container_created();
        Ok(())
    }

    /// Disks in the account's pool container, listed on first use
    pub async fn disk_count(&self, name: &str) -> Result<i32> {
        let account = self
            .get(name)
            .await
            .ok_or_else(|| BlobDiskError::account_not_found(name))?;
        if let Some(count) = account.cached_disk_count() {
            return Ok(count);
        }

        self.ensure_default_container(name).await?;
        let creds = self.credentials(name).await?;
        let blobs = self
            .blobs_api
            .list_blobs(&creds, self.naming.container())
            .await?;

        let count = i32::try_from(blobs.len()).unwrap_or(i32::MAX);
        account.set_disk_count(count);
        debug!("Storage account {name} holds {count} disks");
        Ok(count)
    }

    /// Count one more disk on `name`, if its count is known
    pub async fn record_disk_added(&self, name: &str) {
        if let Some(account) = self.get(name).await {
            account.increment_disk_count();
        }
    }

    /// Reconcile the cached count after a disk was deleted from `name`
    ///
    /// A known count loses one. An unknown count is listed again, which
    /// already reflects the deletion. Failures are logged and swallowed.
    pub async fn record_disk_removed(&self, name: &str) {
        let Some(account) = self.get(name).await else {
            warn!("Storage account {name} is not in the pool cache, skipping disk count update");
            return;
        };

        if account.cached_disk_count().is_some() {
            account.decrement_disk_count();
            return;
        }

        if let Err(e) = self.disk_count(name).await {
            warn!("Failed to recount disks on storage account {name}: {e}");
        }
    }

    /// First shared key of the account, cached on the descriptor
    pub async fn account_key(&self, name: &str) -> Result<Zeroizing<String>> {
        match self.get(name).await {
            Some(account) => account
                .key_cell()
                .get_or_try_init(|| self.fetch_key(name))
                .await
                .cloned(),
            None => self.fetch_key(name).await,
        }
    }

    async fn fetch_key(&self, name: &str) -> Result<Zeroizing<String>> {
        let keys = self.accounts_api.list_keys(name).await?;
        keys.into_iter()
            .next()
            .map(Zeroizing::new)
            .ok_or_else(|| {
                BlobDiskError::azure_api(format!("Storage account {name} has no access keys"))
            })
    }

    pub async fn credentials(&self, name: &str) -> Result<AccountCredentials> {
        let key = self.account_key(name).await?;
        Ok(AccountCredentials::new(name, key.as_str()))
    }

    /// Delete the account remotely and drop its descriptor
    pub async fn delete_account(&self, name: &str) -> Result<()> {
        info!("Deleting storage account {name}");
        self.accounts_api.delete_account(name).await?;
        self.accounts.write().await.remove(name);
        Ok(())
    }

    /// Cached accounts in name order, for display
    pub async fn snapshot(&self) -> Vec<AccountSnapshot> {
        let mut rows: Vec<AccountSnapshot> = self
            .accounts
            .read()
            .await
            .values()
            .map(|account| account.snapshot())
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }
}
