//! Level-up policy
//!
//! A wallet at level `N` moves to `N + 1` once `total_earned` reaches
//! `N * threshold_step`. Each level-up unlocks `level_<N+1>` and credits a
//! bonus of `(N + 1) * bonus_step`, which can itself cross the next
//! threshold. The loop is capped per operation; remaining level-ups are
//! picked up by the next credit to the wallet.

use crate::{
    config::PolicyConfig,
    ids::TransactionIdGenerator,
    types::{Transaction, TransactionType, Wallet},
    Error, Result,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// One applied level-up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelUp {
    /// Level reached
    pub level: u32,
    /// Bonus credited
    pub bonus: Decimal,
}

/// Achievement name for reaching `level`
pub fn level_achievement(level: u32) -> String {
    format!("level_{}", level)
}

/// Level thresholds and bonuses
#[derive(Debug, Clone)]
pub struct LevelPolicy {
    threshold_step: Decimal,
    bonus_step: Decimal,
    max_level_ups: u32,
}

impl LevelPolicy {
    /// Create from coin policy
    pub fn new(config: &PolicyConfig) -> Self {
        Self {
            threshold_step: config.level_threshold_step,
            bonus_step: config.level_bonus_step,
            max_level_ups: config.max_level_ups_per_operation,
        }
    }

    /// Total earned needed to leave `level`; `None` when out of range
    pub fn threshold(&self, level: u32) -> Option<Decimal> {
        Decimal::from(level).checked_mul(self.threshold_step)
    }

    /// Bonus paid on reaching `level`; `None` when out of range
    pub fn bonus(&self, level: u32) -> Option<Decimal> {
        Decimal::from(level).checked_mul(self.bonus_step)
    }

    /// Whether the wallet has crossed its current threshold
    pub fn is_due(&self, wallet: &Wallet) -> bool {
        self.threshold(wallet.level)
            .map_or(false, |threshold| wallet.total_earned >= threshold)
    }

    /// Apply due level-ups to `wallet`, at most `max_level_ups` of them
    ///
    /// An `Overflow` error leaves `wallet` partially updated; callers
    /// discard it instead of committing.
    pub fn apply(
        &self,
        wallet: &mut Wallet,
        ids: &dyn TransactionIdGenerator,
        now: DateTime<Utc>,
    ) -> Result<Vec<LevelUp>> {
        let mut applied = Vec::new();

        while self.is_due(wallet) {
            if applied.len() as u32 >= self.max_level_ups {
                tracing::warn!(
                    user_id = %wallet.user_id,
                    level = wallet.level,
                    cap = self.max_level_ups,
                    "Level-up cap reached for this operation"
                );
                break;
            }

            let level = wallet.level.checked_add(1).ok_or_else(|| {
                Error::Overflow(format!("{}: level {}", wallet.user_id, wallet.level))
            })?;
            let bonus = self.bonus(level).ok_or_else(|| {
                Error::Overflow(format!("{}: level {} bonus", wallet.user_id, level))
            })?;

            wallet.level = level;
            wallet.add_achievement(level_achievement(level));

            if bonus > Decimal::ZERO {
                let mut metadata = HashMap::new();
                metadata.insert("type".to_string(), "level_bonus".to_string());
                metadata.insert("level".to_string(), level.to_string());

                wallet.credit(Transaction::completed(
                    ids.next_id(),
                    wallet.user_id.clone(),
                    bonus,
                    TransactionType::Earn,
                    format!("Level {} achievement bonus", level),
                    metadata,
                    now,
                ))?;
            }

            tracing::info!(user_id = %wallet.user_id, level, %bonus, "Wallet leveled up");
            applied.push(LevelUp { level, bonus });
        }

        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UuidIdGenerator;
    use crate::types::{TransactionId, UserId};

    fn wallet_with_earned(amount: i64) -> Wallet {
        let mut wallet = Wallet::empty(UserId::new("alice"), Utc::now());
        wallet.credit(Transaction::completed(
            TransactionId::new("seed"),
            wallet.user_id.clone(),
            Decimal::from(amount),
            TransactionType::Earn,
            "seed",
            HashMap::new(),
            Utc::now(),
        ))
        .unwrap();
        wallet
    }

    #[test]
    fn test_no_level_up_below_threshold() {
        let policy = LevelPolicy::new(&PolicyConfig::default());
        let mut wallet = wallet_with_earned(99);

        assert!(policy.apply(&mut wallet, &UuidIdGenerator, Utc::now()).unwrap().is_empty());
        assert_eq!(wallet.level, 1);
        assert_eq!(wallet.transactions.len(), 1);
    }

    #[test]
    fn test_single_level_up() {
        let policy = LevelPolicy::new(&PolicyConfig::default());
        let mut wallet = wallet_with_earned(150);

        let ups = policy.apply(&mut wallet, &UuidIdGenerator, Utc::now()).unwrap();
        assert_eq!(
            ups,
            vec![LevelUp {
                level: 2,
                bonus: Decimal::from(20)
            }]
        );
        assert_eq!(wallet.level, 2);
        assert_eq!(wallet.balance, Decimal::from(170));
        assert!(wallet.has_achievement("level_2"));
        assert_eq!(wallet.transactions.last().unwrap().description, "Level 2 achievement bonus");
    }

    #[test]
    fn test_bonus_cascades_into_next_level() {
        let policy = LevelPolicy::new(&PolicyConfig::default());
        // 270 -> level 3 (+30 = 300) -> level 4 (+40 = 340)
        let mut wallet = wallet_with_earned(270);
        wallet.level = 2;

        let ups = policy.apply(&mut wallet, &UuidIdGenerator, Utc::now()).unwrap();
        assert_eq!(ups.len(), 2);
        assert_eq!(wallet.level, 4);
        assert_eq!(wallet.total_earned, Decimal::from(340));
        wallet.check_invariants().unwrap();
    }

    #[test]
    fn test_cap_bounds_runaway_cascade() {
        let config = PolicyConfig {
            max_level_ups_per_operation: 5,
            ..PolicyConfig::default()
        };
        let policy = LevelPolicy::new(&config);
        let mut wallet = wallet_with_earned(100_000);

        let ups = policy.apply(&mut wallet, &UuidIdGenerator, Utc::now()).unwrap();
        assert_eq!(ups.len(), 5);
        assert_eq!(wallet.level, 6);
        assert!(policy.is_due(&wallet));
    }

    #[test]
    fn test_zero_bonus_step_records_no_transaction() {
        let config = PolicyConfig {
            level_bonus_step: Decimal::ZERO,
            ..PolicyConfig::default()
        };
        let policy = LevelPolicy::new(&config);
        let mut wallet = wallet_with_earned(250);

        let ups = policy.apply(&mut wallet, &UuidIdGenerator, Utc::now()).unwrap();
        assert_eq!(ups.len(), 2);
        assert_eq!(wallet.transactions.len(), 1);
        assert!(wallet.has_achievement("level_3"));
    }

    #[test]
    fn test_bonus_overflow_is_an_error() {
        let policy = LevelPolicy::new(&PolicyConfig::default());
        let mut wallet = wallet_with_earned(1);
        wallet.balance = Decimal::MAX - Decimal::from(5);
        wallet.total_earned = wallet.balance;

        let err = policy
            .apply(&mut wallet, &UuidIdGenerator, Utc::now())
            .unwrap_err();
        assert!(matches!(err, Error::Overflow(_)));
    }

    #[test]
    fn test_unreachable_threshold_is_never_due() {
        let config = PolicyConfig {
            level_threshold_step: Decimal::MAX,
            ..PolicyConfig::default()
        };
        let policy = LevelPolicy::new(&config);
        let mut wallet = wallet_with_earned(1);
        wallet.level = 2;

        assert_eq!(policy.threshold(2), None);
        assert!(!policy.is_due(&wallet));
    }
}
