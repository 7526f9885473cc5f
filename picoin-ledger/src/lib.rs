//! Pi Coin Wallet Ledger
//!
//! Per-user coin wallets with earn, spend and atomic two-sided transfers,
//! sliding-window rate limiting, level-up bonuses and leaderboards.
//!
//! # Architecture
//!
//! - **Injected storage**: every engine owns a [`WalletStore`], no global state
//! - **Per-wallet locks**: mutations hold the wallet lock from read to commit
//! - **Versioned rows**: stores reject writes based on a stale version
//! - **Bounded leveling**: level-up bonuses run in a capped loop
//!
//! # Invariants
//!
//! - Non-negativity: `balance >= 0` for every wallet
//! - Conservation: `balance == total_earned - total_spent`
//! - Transfer atomicity: both legs commit or neither does
//! - Append-only: transactions are never modified or deleted

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod ids;
pub mod storage;
pub mod memory;
pub mod locks;
pub mod rate_limit;
pub mod leveling;
pub mod ledger;
pub mod leaderboard;
pub mod service;
pub mod error;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    Receipt, Transaction, TransactionId, TransactionPage, TransactionStatus, TransactionType,
    TransferReceipt, UserId, Wallet,
};
pub use storage::{RocksWalletStore, WalletStore};
pub use memory::MemoryWalletStore;
pub use rate_limit::{RateLimitStatus, RateLimiter};
pub use ledger::LedgerEngine;
pub use leaderboard::{Leaderboard, LeaderboardEntry, SortBy};
pub use service::WalletService;
pub use config::Config;
