//! Core types for the wallet ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode rows, JSON on the wire)
//! - Exact arithmetic (Decimal for coin amounts)
//! - Append-only history (transactions never change once pushed)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Achievement granted to every freshly created wallet
pub const NEW_USER_ACHIEVEMENT: &str = "new_user";

/// Description of the welcome-bonus transaction
pub const WELCOME_BONUS_DESCRIPTION: &str = "Welcome bonus";

/// Metadata key naming the recipient on a transfer debit
pub const META_TO_USER_ID: &str = "toUserId";

/// Metadata key naming the sender on a transfer credit
pub const META_FROM_USER_ID: &str = "fromUserId";

/// Metadata key shared by both legs of a transfer
pub const META_TRANSFER_ID: &str = "transferId";

/// Wallet owner identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Opaque transaction identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(String);

impl TransactionId {
    /// Create new transaction ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derive the id of one transfer leg (`<transfer>_debit`, `<transfer>_credit`)
    pub fn leg(&self, suffix: &str) -> Self {
        Self(format!("{}_{}", self.0, suffix))
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of balance-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Coins credited (rewards, purchases, bonuses)
    Earn,
    /// Coins debited
    Spend,
    /// One leg of a wallet-to-wallet transfer
    Transfer,
}

/// Settlement status of a transaction
///
/// Every operation settles synchronously, so only `Completed` is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Not yet settled
    Pending,
    /// Settled
    Completed,
    /// Settlement failed
    Failed,
}

/// Immutable record of a single balance-affecting event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique transaction ID
    pub id: TransactionId,

    /// Wallet owner
    pub user_id: UserId,

    /// Amount (always positive)
    pub amount: Decimal,

    /// Transaction type
    #[serde(rename = "type")]
    pub tx_type: TransactionType,

    /// Human readable description
    pub description: String,

    /// When the transaction was recorded
    pub timestamp: DateTime<Utc>,

    /// Settlement status
    pub status: TransactionStatus,

    /// Opaque caller metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Transaction {
    /// Build a completed transaction
    pub fn completed(
        id: TransactionId,
        user_id: UserId,
        amount: Decimal,
        tx_type: TransactionType,
        description: impl Into<String>,
        metadata: HashMap<String, String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            amount,
            tx_type,
            description: description.into(),
            timestamp,
            status: TransactionStatus::Completed,
            metadata,
        }
    }

    /// Transfer id shared by both legs, if this is a transfer leg
    pub fn transfer_id(&self) -> Option<&str> {
        self.metadata.get(META_TRANSFER_ID).map(String::as_str)
    }
}

/// Per-user ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Owner (immutable)
    pub user_id: UserId,

    /// Spendable coins
    pub balance: Decimal,

    /// Lifetime credits
    pub total_earned: Decimal,

    /// Lifetime debits
    pub total_spent: Decimal,

    /// Transaction history, newest last
    pub transactions: Vec<Transaction>,

    /// Current level (>= 1)
    pub level: u32,

    /// Unlocked badges, in unlock order
    pub achievements: Vec<String>,

    /// Number of committed writes (0 = never persisted)
    #[serde(default)]
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Empty, unpersisted wallet at level 1
    pub fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: Decimal::ZERO,
            total_earned: Decimal::ZERO,
            total_spent: Decimal::ZERO,
            transactions: Vec::new(),
            level: 1,
            achievements: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fresh wallet with the welcome bonus and `new_user` achievement applied
    pub fn with_welcome_bonus(
        user_id: UserId,
        bonus: Decimal,
        bonus_tx_id: TransactionId,
        now: DateTime<Utc>,
    ) -> Self {
        let mut wallet = Self::empty(user_id.clone(), now);
        // Empty wallet: the bonus is the whole balance, nothing to overflow
        if bonus > Decimal::ZERO {
            wallet.balance = bonus;
            wallet.total_earned = bonus;
            wallet.transactions.push(Transaction::completed(
                bonus_tx_id,
                user_id,
                bonus,
                TransactionType::Earn,
                WELCOME_BONUS_DESCRIPTION,
                HashMap::new(),
                now,
            ));
        }
        wallet.add_achievement(NEW_USER_ACHIEVEMENT);
        wallet
    }

    /// Apply a credit: balance and total earned grow by the amount
    ///
    /// Fails with `Overflow`, leaving the wallet untouched, when either
    /// total would leave the `Decimal` range.
    pub fn credit(&mut self, transaction: Transaction) -> crate::Result<()> {
        let balance = self.checked(self.balance.checked_add(transaction.amount), &transaction)?;
        let total_earned =
            self.checked(self.total_earned.checked_add(transaction.amount), &transaction)?;

        self.balance = balance;
        self.total_earned = total_earned;
        self.updated_at = transaction.timestamp;
        self.transactions.push(transaction);
        Ok(())
    }

    /// Apply a debit, refusing to go below zero
    pub fn debit(&mut self, transaction: Transaction) -> crate::Result<()> {
        self.ensure_funds(transaction.amount)?;
        let balance = self.checked(self.balance.checked_sub(transaction.amount), &transaction)?;
        let total_spent =
            self.checked(self.total_spent.checked_add(transaction.amount), &transaction)?;

        self.balance = balance;
        self.total_spent = total_spent;
        self.updated_at = transaction.timestamp;
        self.transactions.push(transaction);
        Ok(())
    }

    fn checked(&self, value: Option<Decimal>, transaction: &Transaction) -> crate::Result<Decimal> {
        value.ok_or_else(|| {
            crate::Error::Overflow(format!(
                "{}: {:?} of {} exceeds the representable range",
                self.user_id, transaction.tx_type, transaction.amount
            ))
        })
    }

    /// Fail with `InsufficientBalance` unless `amount` can be debited
    pub fn ensure_funds(&self, amount: Decimal) -> crate::Result<()> {
        if amount > self.balance {
            return Err(crate::Error::InsufficientBalance {
                user_id: self.user_id.to_string(),
                balance: self.balance,
                requested: amount,
            });
        }
        Ok(())
    }

    /// Add an achievement; returns false if it was already unlocked
    pub fn add_achievement(&mut self, achievement: impl Into<String>) -> bool {
        let achievement = achievement.into();
        if self.achievements.contains(&achievement) {
            return false;
        }
        self.achievements.push(achievement);
        true
    }

    /// Whether an achievement is unlocked
    pub fn has_achievement(&self, achievement: &str) -> bool {
        self.achievements.iter().any(|a| a == achievement)
    }

    /// Find a transaction by ID
    pub fn find_transaction(&self, id: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.id.as_str() == id)
    }

    /// Newest-first page of the history
    pub fn history(&self, limit: usize, offset: usize) -> TransactionPage {
        // Reverse first so equal timestamps keep newest-inserted first under the stable sort
        let mut ordered: Vec<&Transaction> = self.transactions.iter().rev().collect();
        ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        TransactionPage {
            transactions: ordered.into_iter().skip(offset).take(limit).cloned().collect(),
            total: self.transactions.len(),
        }
    }

    /// Verify balance, totals and level are mutually consistent
    pub fn check_invariants(&self) -> crate::Result<()> {
        if self.balance < Decimal::ZERO {
            return Err(crate::Error::InvariantViolation(format!(
                "{}: negative balance {}",
                self.user_id, self.balance
            )));
        }
        if self.total_earned < Decimal::ZERO || self.total_spent < Decimal::ZERO {
            return Err(crate::Error::InvariantViolation(format!(
                "{}: negative totals",
                self.user_id
            )));
        }
        if self.balance != self.total_earned - self.total_spent {
            return Err(crate::Error::InvariantViolation(format!(
                "{}: balance {} != earned {} - spent {}",
                self.user_id, self.balance, self.total_earned, self.total_spent
            )));
        }
        if self.level < 1 {
            return Err(crate::Error::InvariantViolation(format!(
                "{}: level must be at least 1",
                self.user_id
            )));
        }
        Ok(())
    }
}

/// Result of a single-wallet mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Wallet after the commit
    pub wallet: Wallet,

    /// The transaction requested by the caller (level bonuses are in the wallet history)
    pub transaction: Transaction,
}

/// Result of a transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    /// Sender after the commit
    pub from_wallet: Wallet,

    /// Recipient after the commit
    pub to_wallet: Wallet,

    /// Id shared by both legs
    pub transfer_id: TransactionId,
}

/// Paginated slice of a wallet history
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionPage {
    /// Newest-first transactions
    pub transactions: Vec<Transaction>,

    /// Total number of transactions in the wallet
    pub total: usize,
}
