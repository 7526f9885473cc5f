//! End-to-end ledger scenarios
//!
//! Covers the reference wallet flows against both stores: welcome bonus,
//! overdraft rejection, transfers to new users, level-up cascades, rate
//! limiting, durability across reopen and concurrent transfers.

use picoin_ledger::{
    config::StorageBackend, Config, Error, Leaderboard, LedgerEngine, MemoryWalletStore,
    RocksWalletStore, SortBy, TransactionType, WalletStore,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn d(value: i64) -> Decimal {
    Decimal::from(value)
}

fn memory_engine(config: &Config) -> (Arc<LedgerEngine>, Arc<dyn WalletStore>) {
    let store: Arc<dyn WalletStore> = Arc::new(MemoryWalletStore::new());
    let engine = LedgerEngine::new(store.clone(), config).unwrap();
    (Arc::new(engine), store)
}

#[test]
fn test_fresh_wallet_gets_welcome_bonus() {
    let (engine, _) = memory_engine(&Config::default());

    let wallet = engine.open_wallet("alice").unwrap();
    assert_eq!(wallet.balance, d(50));
    assert_eq!(wallet.total_earned, d(50));
    assert_eq!(wallet.total_spent, d(0));
    assert_eq!(wallet.level, 1);
    assert_eq!(wallet.achievements, vec!["new_user".to_string()]);
    assert_eq!(wallet.transactions.len(), 1);
    assert_eq!(wallet.transactions[0].description, "Welcome bonus");
    assert_eq!(wallet.transactions[0].tx_type, TransactionType::Earn);
}

#[test]
fn test_overdraft_rejected_and_state_kept() {
    let (engine, _) = memory_engine(&Config::default());
    engine.open_wallet("alice").unwrap();

    let receipt = engine.spend("alice", d(30), "hint", None).unwrap();
    assert_eq!(receipt.wallet.balance, d(20));

    let err = engine.spend("alice", d(25), "hint", None).unwrap_err();
    match err {
        Error::InsufficientBalance {
            balance, requested, ..
        } => {
            assert_eq!(balance, d(20));
            assert_eq!(requested, d(25));
        }
        other => panic!("unexpected error {:?}", other),
    }

    let wallet = engine.get_wallet("alice").unwrap().unwrap();
    assert_eq!(wallet.balance, d(20));
    assert_eq!(wallet.total_spent, d(30));
    assert_eq!(wallet.transactions.len(), 2);
}

#[test]
fn test_transfer_to_new_user() {
    let (engine, _) = memory_engine(&Config::default());
    engine.open_wallet("alice").unwrap();

    let receipt = engine.transfer("alice", "bob", d(40), "gift").unwrap();
    assert_eq!(receipt.from_wallet.balance, d(10));
    assert_eq!(receipt.to_wallet.balance, d(90));
    assert_eq!(receipt.to_wallet.total_earned, d(90));
    assert!(receipt.to_wallet.achievements.contains(&"new_user".to_string()));

    // Stored rows match the receipt
    assert_eq!(engine.get_wallet("alice").unwrap().unwrap(), receipt.from_wallet);
    assert_eq!(engine.get_wallet("bob").unwrap().unwrap(), receipt.to_wallet);
}

/// Σ_{j=2..=level} j * 10
fn level_bonus_total(level: u32) -> Decimal {
    (2..=level).map(|j| Decimal::from(j * 10)).sum()
}

#[test]
fn test_ten_earns_follow_level_formula() {
    let (engine, _) = memory_engine(&Config::default());
    engine.open_wallet("alice").unwrap();

    for i in 1..=10i64 {
        let wallet = engine
            .earn("alice", d(100), "Correct prediction", None)
            .unwrap()
            .wallet;

        if i == 1 {
            assert_eq!(wallet.level, 2);
            assert_eq!(wallet.balance, d(170));
        }
        if i == 2 {
            assert_eq!(wallet.level, 4);
            assert_eq!(wallet.total_earned, d(340));
        }

        let bonuses = wallet
            .transactions
            .iter()
            .filter(|t| t.description.ends_with("achievement bonus"))
            .count();
        assert_eq!(bonuses as u32, wallet.level - 1);
        assert_eq!(
            wallet.total_earned,
            d(50) + d(100 * i) + level_bonus_total(wallet.level)
        );
        assert_eq!(wallet.balance, wallet.total_earned);
        wallet.check_invariants().unwrap();
    }
}

#[test]
fn test_level_cascade_is_capped_per_operation() {
    let mut config = Config::default();
    config.policy.max_level_ups_per_operation = 3;
    let (engine, _) = memory_engine(&config);
    engine.open_wallet("alice").unwrap();

    let wallet = engine.earn("alice", d(5_000), "jackpot", None).unwrap().wallet;
    assert_eq!(wallet.level, 4);

    // The next credit continues where the cap stopped
    let wallet = engine.earn("alice", d(1), "tip", None).unwrap().wallet;
    assert_eq!(wallet.level, 7);
}

#[test]
fn test_eleventh_operation_rate_limited() {
    let (engine, _) = memory_engine(&Config::default());
    engine.open_wallet("alice").unwrap();

    for _ in 0..10 {
        engine.earn("alice", d(1), "tap", None).unwrap();
    }
    let before = engine.get_wallet("alice").unwrap().unwrap();

    let err = engine.earn("alice", d(1), "tap", None).unwrap_err();
    assert!(matches!(err, Error::RateLimited(_)));
    assert!(err.is_retryable());
    assert_eq!(engine.get_wallet("alice").unwrap().unwrap(), before);

    let status = engine.rate_limit_status("alice");
    assert!(status.is_limited);
    assert_eq!(status.remaining, 0);

    // Other users keep their own quota
    engine.open_wallet("bob").unwrap();
    engine.earn("bob", d(1), "tap", None).unwrap();
}

#[test]
fn test_admitted_again_after_window() {
    let mut config = Config::default();
    config.rate_limit.max_transactions = 2;
    config.rate_limit.window_ms = 200;
    let (engine, _) = memory_engine(&config);
    engine.open_wallet("alice").unwrap();

    engine.earn("alice", d(1), "tap", None).unwrap();
    engine.spend("alice", d(1), "tap", None).unwrap();
    assert!(matches!(
        engine.earn("alice", d(1), "tap", None),
        Err(Error::RateLimited(_))
    ));

    thread::sleep(Duration::from_millis(250));
    engine.earn("alice", d(1), "tap", None).unwrap();
}

#[test]
fn test_transfer_charges_both_users_quota() {
    let mut config = Config::default();
    config.rate_limit.max_transactions = 1;
    let (engine, _) = memory_engine(&config);
    engine.open_wallet("alice").unwrap();
    engine.open_wallet("bob").unwrap();

    engine.earn("bob", d(1), "tap", None).unwrap();

    // bob is exhausted, so the transfer fails without charging alice
    assert!(matches!(
        engine.transfer("alice", "bob", d(5), "gift"),
        Err(Error::RateLimited(_))
    ));
    assert_eq!(engine.rate_limit_status("alice").recent_count, 0);
    engine.spend("alice", d(5), "hint", None).unwrap();
}

#[test]
fn test_rocksdb_wallets_survive_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.data_dir = temp_dir.path().to_path_buf();
    config.storage.backend = StorageBackend::RocksDb;

    {
        let store: Arc<dyn WalletStore> = Arc::new(RocksWalletStore::open(&config).unwrap());
        let engine = LedgerEngine::new(store, &config).unwrap();
        engine.open_wallet("alice").unwrap();
        engine.transfer("alice", "bob", d(40), "gift").unwrap();
        engine.earn("bob", d(15), "quiz", None).unwrap();
    }

    let store: Arc<dyn WalletStore> = Arc::new(RocksWalletStore::open(&config).unwrap());
    let engine = LedgerEngine::new(store.clone(), &config).unwrap();

    let alice = engine.get_wallet("alice").unwrap().unwrap();
    let bob = engine.get_wallet("bob").unwrap().unwrap();
    assert_eq!(alice.balance, d(10));
    // 90 + 15 crosses the first threshold: +20 bonus
    assert_eq!(bob.balance, d(125));
    assert_eq!(bob.level, 2);
    assert_eq!(bob.version, 2);

    // Writes continue from the persisted version
    engine.spend("bob", d(5), "hint", None).unwrap();
    assert_eq!(engine.get_wallet("bob").unwrap().unwrap().version, 3);

    let board = Leaderboard::new(store);
    let top = board.top(10, SortBy::Balance).unwrap();
    assert_eq!(top[0].user_id, "bob");
    assert_eq!(board.total_supply().unwrap(), d(10 + 120));
}

#[test]
fn test_concurrent_open_creates_single_wallet() {
    let (engine, _) = memory_engine(&Config::default());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || engine.open_wallet("alice").unwrap())
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().balance, d(50));
    }

    let wallet = engine.get_wallet("alice").unwrap().unwrap();
    assert_eq!(wallet.transactions.len(), 1);
    assert_eq!(engine.metrics().wallets_created.get(), 1);
}

#[test]
fn test_concurrent_opposite_transfers_conserve_supply() {
    let mut config = Config::default();
    config.rate_limit.max_transactions = 10_000;
    // Received transfers count as earnings; keep level bonuses out of the supply
    config.policy.level_bonus_step = Decimal::ZERO;
    let (engine, store) = memory_engine(&config);
    engine.open_wallet("alice").unwrap();
    engine.open_wallet("bob").unwrap();

    let handles: Vec<_> = [("alice", "bob"), ("bob", "alice")]
        .into_iter()
        .map(|(from, to)| {
            let engine = engine.clone();
            thread::spawn(move || {
                let mut committed = 0;
                for _ in 0..200 {
                    match engine.transfer(from, to, d(1), "ping") {
                        Ok(_) => committed += 1,
                        Err(Error::InsufficientBalance { .. }) => {}
                        Err(e) => panic!("unexpected error {:?}", e),
                    }
                }
                committed
            })
        })
        .collect();

    let committed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(committed > 0);

    let alice = store.get("alice").unwrap().unwrap();
    let bob = store.get("bob").unwrap().unwrap();
    assert_eq!(alice.balance + bob.balance, d(100));
    alice.check_invariants().unwrap();
    bob.check_invariants().unwrap();
    assert_eq!(alice.transactions.len() + bob.transactions.len(), 2 + 2 * committed);
}

#[test]
fn test_concurrent_spends_never_overdraw() {
    let mut config = Config::default();
    config.rate_limit.max_transactions = 10_000;
    let (engine, _) = memory_engine(&config);
    engine.open_wallet("alice").unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            thread::spawn(move || {
                (0..30)
                    .filter(|_| engine.spend("alice", d(1), "hint", None).is_ok())
                    .count()
            })
        })
        .collect();

    let spent: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(spent, 50);
    assert_eq!(engine.get_wallet("alice").unwrap().unwrap().balance, d(0));
}
