//! In-memory wallet store
//!
//! Reference [`WalletStore`] used by tests and the `memory` backend. Follows
//! the same versioning rules as the RocksDB store.

use crate::{
    error::Result,
    storage::{check_distinct, check_version, WalletStore},
    types::Wallet,
};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Map-backed wallet store
#[derive(Debug, Default)]
pub struct MemoryWalletStore {
    wallets: RwLock<HashMap<String, Wallet>>,
}

impl MemoryWalletStore {
    /// Create empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored wallets
    pub fn len(&self) -> usize {
        self.wallets.read().len()
    }

    /// Whether the store holds no wallets
    pub fn is_empty(&self) -> bool {
        self.wallets.read().is_empty()
    }
}

impl WalletStore for MemoryWalletStore {
    fn get(&self, user_id: &str) -> Result<Option<Wallet>> {
        Ok(self.wallets.read().get(user_id).cloned())
    }

    fn create(&self, wallet: Wallet) -> Result<Wallet> {
        let mut wallets = self.wallets.write();
        if let Some(existing) = wallets.get(wallet.user_id.as_str()) {
            return Ok(existing.clone());
        }
        check_version(&wallet, None)?;
        wallets.insert(wallet.user_id.to_string(), wallet.clone());
        Ok(wallet)
    }

    fn save_all(&self, batch: &[Wallet]) -> Result<()> {
        check_distinct(batch)?;
        let mut wallets = self.wallets.write();

        // Validate every row before touching any
        for wallet in batch {
            let stored = wallets.get(wallet.user_id.as_str()).map(|w| w.version);
            check_version(wallet, stored)?;
        }
        for wallet in batch {
            wallets.insert(wallet.user_id.to_string(), wallet.clone());
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<Wallet>> {
        Ok(self.wallets.read().values().cloned().collect())
    }

    fn remove(&self, user_id: &str) -> Result<bool> {
        Ok(self.wallets.write().remove(user_id).is_some())
    }
}
