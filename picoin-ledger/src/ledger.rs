//! Ledger engine
//!
//! This module ties together storage, rate limiting, wallet locks and the
//! level policy into the earn / spend / transfer API.
//!
//! Every mutating operation follows the same shape:
//!
//! 1. Validate the request (positive amount, non-empty ids)
//! 2. Admit it through the [`RateLimiter`]
//! 3. Acquire the lock of every wallet involved, in user-id order
//! 4. Load, mutate a copy, check invariants
//! 5. Commit all touched wallets in one versioned write
//!
//! A rejection at any step leaves stored state untouched and records no
//! transaction.
//!
//! # Example
//!
//! ```no_run
//! use picoin_ledger::{Config, LedgerEngine, MemoryWalletStore};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! fn main() -> picoin_ledger::Result<()> {
//!     let engine = LedgerEngine::new(Arc::new(MemoryWalletStore::new()), &Config::default())?;
//!
//!     engine.open_wallet("alice")?;
//!     engine.earn("alice", Decimal::from(25), "Correct prediction", None)?;
//!
//!     Ok(())
//! }
//! ```

use crate::{
    config::Config,
    ids::TransactionIdGenerator,
    leveling::LevelPolicy,
    locks::WalletLocks,
    metrics::Metrics,
    rate_limit::{RateLimitStatus, RateLimiter},
    storage::WalletStore,
    types::{
        Receipt, Transaction, TransactionPage, TransactionType, TransferReceipt,
        UserId, Wallet, META_FROM_USER_ID, META_TO_USER_ID, META_TRANSFER_ID,
    },
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Wallet ledger engine
pub struct LedgerEngine {
    /// Wallet persistence
    store: Arc<dyn WalletStore>,

    /// Admission control for mutations
    limiter: RateLimiter,

    /// Per-wallet exclusive locks
    locks: WalletLocks,

    /// Transaction id source
    ids: Box<dyn TransactionIdGenerator>,

    /// Level thresholds and bonuses
    levels: LevelPolicy,

    /// Coins credited to new wallets
    welcome_bonus: Decimal,

    /// Maximum wait for a wallet lock
    lock_timeout: Duration,

    /// Prometheus metrics
    metrics: Metrics,
}

impl std::fmt::Debug for LedgerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEngine")
            .field("store", &self.store)
            .field("welcome_bonus", &self.welcome_bonus)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl LedgerEngine {
    /// Create engine over `store`
    pub fn new(store: Arc<dyn WalletStore>, config: &Config) -> Result<Self> {
        config.validate()?;
        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;

        Ok(Self {
            store,
            limiter: RateLimiter::new(&config.rate_limit),
            locks: WalletLocks::new(),
            ids: config.policy.id_format.generator(),
            levels: LevelPolicy::new(&config.policy),
            welcome_bonus: config.policy.welcome_bonus,
            lock_timeout: config.locking.acquire_timeout(),
            metrics,
        })
    }

    /// Replace the transaction id generator
    pub fn with_id_generator(mut self, ids: Box<dyn TransactionIdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Underlying store (read access for queries)
    pub fn store(&self) -> &Arc<dyn WalletStore> {
        &self.store
    }

    /// Engine metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Load a wallet without creating it
    pub fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>> {
        self.store.get(user_id)
    }

    /// Load a wallet, creating it with the welcome bonus if absent
    pub fn open_wallet(&self, user_id: &str) -> Result<Wallet> {
        ensure_user_id(user_id)?;
        if let Some(wallet) = self.store.get(user_id)? {
            return Ok(wallet);
        }

        self.locks.with_locked(&[user_id], self.lock_timeout, || {
            // Another caller may have created it while we waited
            if let Some(wallet) = self.store.get(user_id)? {
                return Ok(wallet);
            }

            let mut wallet = self.new_wallet(user_id, Utc::now())?;
            wallet.check_invariants()?;
            wallet.version = 1;
            let wallet = self.store.create(wallet)?;

            self.metrics.record_wallet_created();
            tracing::info!(user_id, balance = %wallet.balance, "Wallet created");
            Ok(wallet)
        })
    }

    /// Credit `amount` to an existing wallet
    pub fn earn(
        &self,
        user_id: &str,
        amount: Decimal,
        description: &str,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<Receipt> {
        let started = Instant::now();
        let result = self.earn_inner(user_id, amount, description, metadata.unwrap_or_default());
        self.observe("earn", started, &result);
        result
    }

    /// Debit `amount` from an existing wallet
    pub fn spend(
        &self,
        user_id: &str,
        amount: Decimal,
        description: &str,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<Receipt> {
        let started = Instant::now();
        let result = self.spend_inner(user_id, amount, description, metadata.unwrap_or_default());
        self.observe("spend", started, &result);
        result
    }

    /// Move `amount` from one wallet to another
    ///
    /// The sender must exist. A missing recipient is created with the
    /// welcome bonus as part of the same commit, unlike `earn` and `spend`
    /// which never create wallets.
    pub fn transfer(
        &self,
        from_user_id: &str,
        to_user_id: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<TransferReceipt> {
        let started = Instant::now();
        let result = self.transfer_inner(from_user_id, to_user_id, amount, description);
        self.observe("transfer", started, &result);
        result
    }

    /// Credit purchased coins
    pub fn purchase(
        &self,
        user_id: &str,
        amount: Decimal,
        payment_method: &str,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<Receipt> {
        let mut merged = HashMap::new();
        merged.insert("type".to_string(), "purchase".to_string());
        merged.insert("paymentMethod".to_string(), payment_method.to_string());
        merged.extend(metadata.unwrap_or_default());

        let description = format!("Purchased {} Pi Coins via {}", amount, payment_method);

        let started = Instant::now();
        let result = self.earn_inner(user_id, amount, &description, merged);
        self.observe("purchase", started, &result);
        result
    }

    /// Unlock an achievement; adding one twice is a no-op
    pub fn add_achievement(&self, user_id: &str, achievement: &str) -> Result<Wallet> {
        ensure_user_id(user_id)?;
        if achievement.trim().is_empty() {
            return Err(Error::InvalidRequest("achievement is required".to_string()));
        }

        self.locks.with_locked(&[user_id], self.lock_timeout, || {
            let mut wallet = self.load(user_id)?;
            if !wallet.add_achievement(achievement) {
                return Ok(wallet);
            }
            wallet.updated_at = Utc::now();

            let mut committed = self.commit(vec![wallet])?;
            tracing::info!(user_id, achievement, "Achievement unlocked");
            Ok(committed.remove(0))
        })
    }

    /// Newest-first page of a wallet history; unknown users get an empty page
    pub fn transaction_history(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<TransactionPage> {
        Ok(self
            .store
            .get(user_id)?
            .map(|wallet| wallet.history(limit, offset))
            .unwrap_or_default())
    }

    /// Whether `transaction_id` belongs to the wallet of `user_id`
    pub fn validate_transaction(&self, user_id: &str, transaction_id: &str) -> Result<bool> {
        Ok(self
            .store
            .get(user_id)?
            .map(|wallet| wallet.find_transaction(transaction_id).is_some())
            .unwrap_or(false))
    }

    /// Pretty JSON dump of a wallet
    pub fn export_wallet(&self, user_id: &str) -> Result<Option<String>> {
        match self.store.get(user_id)? {
            Some(wallet) => Ok(Some(serde_json::to_string_pretty(&wallet)?)),
            None => Ok(None),
        }
    }

    /// Replace a wallet with an exported dump
    pub fn import_wallet(&self, user_id: &str, data: &str) -> Result<Wallet> {
        ensure_user_id(user_id)?;
        let mut wallet: Wallet = serde_json::from_str(data)?;

        if wallet.user_id.as_str() != user_id {
            return Err(Error::InvalidWallet(format!(
                "dump belongs to {}, not {}",
                wallet.user_id, user_id
            )));
        }
        wallet
            .check_invariants()
            .map_err(|e| Error::InvalidWallet(e.to_string()))?;
        if let Some(tx) = wallet
            .transactions
            .iter()
            .find(|tx| tx.amount <= Decimal::ZERO || tx.user_id != wallet.user_id)
        {
            return Err(Error::InvalidWallet(format!("invalid transaction {}", tx.id)));
        }

        self.locks.with_locked(&[user_id], self.lock_timeout, || {
            let current = self.store.get(user_id)?.map(|w| w.version).unwrap_or(0);
            wallet.version = current + 1;
            self.store.save(&wallet)?;

            tracing::info!(user_id, transactions = wallet.transactions.len(), "Wallet imported");
            Ok(wallet)
        })
    }

    /// Delete a wallet and its rate-limit history (administrative)
    pub fn reset_wallet(&self, user_id: &str) -> Result<bool> {
        self.locks.with_locked(&[user_id], self.lock_timeout, || {
            let removed = self.store.remove(user_id)?;
            self.limiter.reset(user_id);
            if removed {
                tracing::warn!(user_id, "Wallet reset");
            }
            Ok(removed)
        })
    }

    /// Rate-limit introspection; does not consume quota
    pub fn rate_limit_status(&self, user_id: &str) -> RateLimitStatus {
        self.limiter.status(user_id)
    }

    /// Drop rate-limit history that has left the window; returns users purged
    pub fn purge_idle(&self) -> usize {
        let purged = self.limiter.purge_idle();
        if purged > 0 {
            tracing::debug!(purged, "Purged idle rate-limit entries");
        }
        purged
    }

    // Operation bodies

    fn earn_inner(
        &self,
        user_id: &str,
        amount: Decimal,
        description: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Receipt> {
        ensure_positive(amount)?;
        ensure_user_id(user_id)?;
        self.admit(&[user_id])?;

        self.locks.with_locked(&[user_id], self.lock_timeout, || {
            let mut wallet = self.load(user_id)?;
            let now = Utc::now();

            let transaction = Transaction::completed(
                self.ids.next_id(),
                wallet.user_id.clone(),
                amount,
                TransactionType::Earn,
                description,
                metadata,
                now,
            );
            wallet.credit(transaction.clone())?;
            self.level_up(&mut wallet, now)?;

            let wallet = self.commit(vec![wallet])?.remove(0);
            Ok(Receipt {
                wallet,
                transaction,
            })
        })
    }

    fn spend_inner(
        &self,
        user_id: &str,
        amount: Decimal,
        description: &str,
        metadata: HashMap<String, String>,
    ) -> Result<Receipt> {
        ensure_positive(amount)?;
        ensure_user_id(user_id)?;
        self.admit(&[user_id])?;

        self.locks.with_locked(&[user_id], self.lock_timeout, || {
            let mut wallet = self.load(user_id)?;
            let transaction = Transaction::completed(
                self.ids.next_id(),
                wallet.user_id.clone(),
                amount,
                TransactionType::Spend,
                description,
                metadata,
                Utc::now(),
            );
            wallet.debit(transaction.clone())?;

            let wallet = self.commit(vec![wallet])?.remove(0);
            Ok(Receipt {
                wallet,
                transaction,
            })
        })
    }

    fn transfer_inner(
        &self,
        from_user_id: &str,
        to_user_id: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<TransferReceipt> {
        ensure_positive(amount)?;
        ensure_user_id(from_user_id)?;
        ensure_user_id(to_user_id)?;
        if from_user_id == to_user_id {
            return Err(Error::InvalidTransfer(format!(
                "sender and recipient are both {}",
                from_user_id
            )));
        }
        self.admit(&[from_user_id, to_user_id])?;

        // Fixed global order: no deadlock between opposite-direction transfers
        let (receipt, recipient_created) =
            self.locks
                .with_locked(&[from_user_id, to_user_id], self.lock_timeout, || {
                    self.apply_transfer(from_user_id, to_user_id, amount, description)
                })?;

        if recipient_created {
            self.metrics.record_wallet_created();
        }
        tracing::info!(
            transfer_id = %receipt.transfer_id,
            from = from_user_id,
            to = to_user_id,
            %amount,
            recipient_created,
            "Transfer committed"
        );
        Ok(receipt)
    }

    /// Transfer body; both wallet locks are held by the caller
    fn apply_transfer(
        &self,
        from_user_id: &str,
        to_user_id: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<(TransferReceipt, bool)> {
        let mut from_wallet = self.load(from_user_id)?;
        from_wallet.ensure_funds(amount)?;

        let now = Utc::now();
        let (mut to_wallet, recipient_created) = match self.store.get(to_user_id)? {
            Some(wallet) => (wallet, false),
            None => (self.new_wallet(to_user_id, now)?, true),
        };

        let transfer_id = self.ids.next_id();

        let mut debit_meta = HashMap::new();
        debit_meta.insert(META_TO_USER_ID.to_string(), to_user_id.to_string());
        debit_meta.insert(META_TRANSFER_ID.to_string(), transfer_id.to_string());

        let mut credit_meta = HashMap::new();
        credit_meta.insert(META_FROM_USER_ID.to_string(), from_user_id.to_string());
        credit_meta.insert(META_TRANSFER_ID.to_string(), transfer_id.to_string());

        from_wallet.debit(Transaction::completed(
            transfer_id.leg("debit"),
            from_wallet.user_id.clone(),
            amount,
            TransactionType::Transfer,
            format!("Transfer to {}: {}", to_user_id, description),
            debit_meta,
            now,
        ))?;
        to_wallet.credit(Transaction::completed(
            transfer_id.leg("credit"),
            to_wallet.user_id.clone(),
            amount,
            TransactionType::Transfer,
            format!("Transfer from {}: {}", from_user_id, description),
            credit_meta,
            now,
        ))?;

        // Sender's total earned is untouched, so only the recipient can level
        self.level_up(&mut to_wallet, now)?;

        let mut committed = self.commit(vec![from_wallet, to_wallet])?;
        let to_wallet = committed.remove(1);
        let from_wallet = committed.remove(0);

        Ok((
            TransferReceipt {
                from_wallet,
                to_wallet,
                transfer_id,
            },
            recipient_created,
        ))
    }

    // Helpers

    fn new_wallet(&self, user_id: &str, now: DateTime<Utc>) -> Result<Wallet> {
        let mut wallet = Wallet::with_welcome_bonus(
            UserId::new(user_id),
            self.welcome_bonus,
            self.ids.next_id(),
            now,
        );
        self.level_up(&mut wallet, now)?;
        Ok(wallet)
    }

    fn level_up(&self, wallet: &mut Wallet, now: DateTime<Utc>) -> Result<()> {
        let applied = self.levels.apply(wallet, self.ids.as_ref(), now)?;
        if !applied.is_empty() {
            self.metrics.record_level_ups(applied.len());
        }
        Ok(())
    }

    fn load(&self, user_id: &str) -> Result<Wallet> {
        self.store
            .get(user_id)?
            .ok_or_else(|| Error::WalletNotFound(user_id.to_string()))
    }

    fn admit(&self, user_ids: &[&str]) -> Result<()> {
        if self.limiter.check_and_record_all(user_ids) {
            return Ok(());
        }
        let who = user_ids.join(", ");
        tracing::warn!(users = %who, "Transaction rate limit exceeded");
        Err(Error::RateLimited(who))
    }

    /// Check invariants, bump versions and write all wallets at once
    fn commit(&self, mut wallets: Vec<Wallet>) -> Result<Vec<Wallet>> {
        for wallet in &mut wallets {
            wallet.check_invariants()?;
            wallet.version += 1;
        }
        self.store.save_all(&wallets)?;
        Ok(wallets)
    }

    fn observe<T>(&self, operation: &str, started: Instant, result: &Result<T>) {
        match result {
            Ok(_) => self
                .metrics
                .record_operation(operation, started.elapsed().as_secs_f64()),
            Err(e) => {
                self.metrics.record_rejection(e);
                if e.is_business_rule() {
                    tracing::warn!(operation, error = %e, "Operation rejected");
                } else {
                    tracing::error!(operation, error = %e, "Operation failed");
                }
            }
        }
    }
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(amount));
    }
    Ok(())
}

fn ensure_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(Error::InvalidRequest("userId is required".to_string()));
    }
    Ok(())
}
