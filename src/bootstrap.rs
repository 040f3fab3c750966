//! One-time pool pre-warming
//!
//! On an empty pool the control plane provisions one premium and one
//! standard account in the background, so the first disk request does not
//! pay for account creation. The controller that starts the tasks keeps the
//! [`Bootstrap`] holding them, so dropping a return value never cancels them.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::pool::AccountPool;
use crate::storage::SkuClass;

/// Accounts created on an empty pool, by sequence number
const WARM_ACCOUNTS: [(u32, SkuClass); 2] =
    [(1, SkuClass::PremiumLrs), (2, SkuClass::StandardLrs)];

pub(crate) struct Bootstrap {
    tasks: JoinSet<()>,
}

impl Bootstrap {
    /// A bootstrap with nothing to do
    pub fn idle() -> Self {
        Self {
            tasks: JoinSet::new(),
        }
    }

    /// Spawn provisioning tasks if the (already refreshed) pool is empty
    pub async fn start(pool: Arc<AccountPool>) -> Self {
        let existing = pool.pool_account_count().await;
        if existing > 0 {
            info!("Account pool already has {existing} accounts, skipping bootstrap");
            return Self::idle();
        }

        let mut tasks = JoinSet::new();
        for (number, sku) in WARM_ACCOUNTS {
            let pool = pool.clone();
            let name = pool.naming().account_name_for(number);
            info!("Bootstrapping storage account {name} ({sku})");

            tasks.spawn(async move {
                match pool.provision_account(&name, sku, true).await {
                    Ok(()) => info!("Bootstrapped storage account {name}"),
                    Err(e) => warn!("Failed to bootstrap storage account {name}: {e}"),
                }
            });
        }

        Self { tasks }
    }

    /// Number of tasks still owned
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every task to finish
    pub async fn join(mut self) {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!("Bootstrap task did not complete: {e}");
            }
        }
    }

    /// Abort outstanding tasks and wait for them to stop
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
    }
}
