//! Wallet persistence
//!
//! [`WalletStore`] is the seam between the ledger engine and durable storage.
//! Rows are keyed by user id and carry a `version` that counts committed
//! writes; a write is accepted only when it is exactly one version ahead of
//! the stored row (a missing row counts as version 0).
//!
//! # Column Families (RocksDB)
//!
//! - `wallets` - Wallet rows (key: user_id, value: bincode)

use crate::{
    error::{Error, Result},
    types::Wallet,
    Config,
};
use parking_lot::Mutex;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use std::collections::HashSet;
use std::sync::Arc;

/// Column family names
const CF_WALLETS: &str = "wallets";

/// Durable keyed storage of wallet records
pub trait WalletStore: Send + Sync + std::fmt::Debug {
    /// Load a wallet
    fn get(&self, user_id: &str) -> Result<Option<Wallet>>;

    /// Insert `wallet` unless a row already exists; returns the stored row
    ///
    /// The new wallet must carry version 1.
    fn create(&self, wallet: Wallet) -> Result<Wallet>;

    /// Versioned write of a single wallet
    fn save(&self, wallet: &Wallet) -> Result<()> {
        self.save_all(std::slice::from_ref(wallet))
    }

    /// Versioned all-or-nothing write of several wallets
    fn save_all(&self, wallets: &[Wallet]) -> Result<()>;

    /// All wallets, in no particular order
    fn list(&self) -> Result<Vec<Wallet>>;

    /// Delete a wallet; returns whether it existed
    fn remove(&self, user_id: &str) -> Result<bool>;
}

/// Check that `wallet` is exactly one write ahead of the stored version
pub(crate) fn check_version(wallet: &Wallet, stored_version: Option<u64>) -> Result<()> {
    let current = stored_version.unwrap_or(0);
    if wallet.version != current + 1 {
        return Err(Error::Conflict(format!(
            "{}: stored version {}, write carries {}",
            wallet.user_id, current, wallet.version
        )));
    }
    Ok(())
}

/// Reject batches naming the same wallet twice
pub(crate) fn check_distinct(wallets: &[Wallet]) -> Result<()> {
    let mut seen = HashSet::with_capacity(wallets.len());
    for wallet in wallets {
        if !seen.insert(wallet.user_id.as_str()) {
            return Err(Error::Conflict(format!(
                "{} appears twice in one commit",
                wallet.user_id
            )));
        }
    }
    Ok(())
}

/// RocksDB-backed wallet store
pub struct RocksWalletStore {
    db: Arc<DB>,

    /// Serializes version check + write
    commit_lock: Mutex<()>,

    /// Fsync every commit
    sync_writes: bool,
}

impl std::fmt::Debug for RocksWalletStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksWalletStore")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl RocksWalletStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(
            CF_WALLETS,
            Self::cf_options_wallets(),
        )];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB wallet store at {:?}", path);

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Mutex::new(()),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn cf_options_wallets() -> Options {
        let mut opts = Options::default();
        // Wallets are read on every operation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(CF_WALLETS)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", CF_WALLETS)))
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }

    fn read(&self, user_id: &str) -> Result<Option<Wallet>> {
        let cf = self.cf_handle()?;
        match self.db.get_cf(cf, user_id.as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }
}

impl WalletStore for RocksWalletStore {
    fn get(&self, user_id: &str) -> Result<Option<Wallet>> {
        self.read(user_id)
    }

    fn create(&self, wallet: Wallet) -> Result<Wallet> {
        let _commit = self.commit_lock.lock();

        if let Some(existing) = self.read(wallet.user_id.as_str())? {
            return Ok(existing);
        }
        check_version(&wallet, None)?;

        let cf = self.cf_handle()?;
        let value = bincode::serialize(&wallet)?;
        self.db
            .put_cf_opt(cf, wallet.user_id.as_str().as_bytes(), &value, &self.write_options())?;

        tracing::debug!(user_id = %wallet.user_id, "Wallet row created");
        Ok(wallet)
    }

    fn save_all(&self, wallets: &[Wallet]) -> Result<()> {
        check_distinct(wallets)?;
        let _commit = self.commit_lock.lock();

        let cf = self.cf_handle()?;
        let mut batch = WriteBatch::default();
        for wallet in wallets {
            let stored = self.read(wallet.user_id.as_str())?;
            check_version(wallet, stored.map(|w| w.version))?;
            batch.put_cf(cf, wallet.user_id.as_str().as_bytes(), bincode::serialize(wallet)?);
        }

        // Atomic commit
        self.db.write_opt(batch, &self.write_options())?;

        tracing::debug!(rows = wallets.len(), "Wallet rows committed");
        Ok(())
    }

    fn list(&self) -> Result<Vec<Wallet>> {
        let cf = self.cf_handle()?;
        let mut wallets = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            wallets.push(bincode::deserialize(&value)?);
        }
        Ok(wallets)
    }

    fn remove(&self, user_id: &str) -> Result<bool> {
        let _commit = self.commit_lock.lock();

        if self.read(user_id)?.is_none() {
            return Ok(false);
        }
        let cf = self.cf_handle()?;
        self.db
            .delete_cf_opt(cf, user_id.as_bytes(), &self.write_options())?;
        tracing::info!(user_id, "Wallet row removed");
        Ok(true)
    }
}
