//! Transaction identifier generation

use crate::types::TransactionId;
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Produces unique opaque transaction identifiers
pub trait TransactionIdGenerator: Send + Sync + std::fmt::Debug {
    /// Next identifier
    fn next_id(&self) -> TransactionId;
}

/// Time-ordered identifiers (UUIDv7, simple hex form)
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl TransactionIdGenerator for UuidIdGenerator {
    fn next_id(&self) -> TransactionId {
        TransactionId::new(Uuid::now_v7().simple().to_string())
    }
}

/// Legacy 16-character alphanumeric identifiers
///
/// Millisecond timestamp prefix followed by random characters, matching the
/// shape of ids already stored by the web client.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShortIdGenerator;

impl ShortIdGenerator {
    const LEN: usize = 16;
}

impl TransactionIdGenerator for ShortIdGenerator {
    fn next_id(&self) -> TransactionId {
        let millis = chrono::Utc::now().timestamp_millis().to_string();
        let mut id: String = millis.chars().rev().take(6).collect();
        id.extend(
            rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(Self::LEN - id.len())
                .map(char::from),
        );
        TransactionId::new(id)
    }
}

/// Configured identifier format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdFormat {
    /// [`UuidIdGenerator`]
    Uuid,
    /// [`ShortIdGenerator`]
    Short,
}

impl IdFormat {
    /// Build the generator for this format
    pub fn generator(self) -> Box<dyn TransactionIdGenerator> {
        match self {
            IdFormat::Uuid => Box::new(UuidIdGenerator),
            IdFormat::Short => Box::new(ShortIdGenerator),
        }
    }
}
