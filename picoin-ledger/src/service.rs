//! Wallet request handling
//!
//! [`WalletService`] maps the wallet routes onto the engine. Requests arrive
//! as [`Request`] values (JSON tagged by `op`) and always produce a
//! [`Response`]; failures carry the stable code from
//! [`Error::code`](crate::Error::code) instead of propagating.
//!
//! ```json
//! {"op":"earn","userId":"alice","amount":25,"description":"Correct prediction"}
//! {"success":true,"data":{"wallet":{...},"transaction":{...}}}
//! ```

use crate::{
    leaderboard::{Leaderboard, LeaderboardEntry, SortBy},
    rate_limit::RateLimitStatus,
    types::{Receipt, TransactionPage, TransferReceipt, Wallet},
    Error, LedgerEngine, Result,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Default page size for transaction history
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Default leaderboard size
pub const DEFAULT_LEADERBOARD_LIMIT: usize = 100;

/// Wallet request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    /// Fetch a wallet, creating it on first access
    #[serde(rename_all = "camelCase")]
    GetWallet {
        /// Wallet owner
        user_id: String,
    },

    /// Credit coins
    #[serde(rename_all = "camelCase")]
    Earn {
        /// Wallet owner
        user_id: String,
        /// Amount to credit
        #[serde(with = "rust_decimal::serde::float")]
        amount: Decimal,
        /// Reason shown in the history
        description: String,
        /// Caller metadata
        #[serde(default)]
        metadata: Option<HashMap<String, String>>,
    },

    /// Debit coins
    #[serde(rename_all = "camelCase")]
    Spend {
        /// Wallet owner
        user_id: String,
        /// Amount to debit
        #[serde(with = "rust_decimal::serde::float")]
        amount: Decimal,
        /// Reason shown in the history
        description: String,
        /// Caller metadata
        #[serde(default)]
        metadata: Option<HashMap<String, String>>,
    },

    /// Move coins between wallets
    #[serde(rename_all = "camelCase")]
    Transfer {
        /// Sender
        from_user_id: String,
        /// Recipient
        to_user_id: String,
        /// Amount to move
        #[serde(with = "rust_decimal::serde::float")]
        amount: Decimal,
        /// Reason shown on both legs
        description: String,
    },

    /// Page of the transaction history
    #[serde(rename_all = "camelCase")]
    Transactions {
        /// Wallet owner
        user_id: String,
        /// Page size
        #[serde(default)]
        limit: Option<usize>,
        /// Entries to skip
        #[serde(default)]
        offset: Option<usize>,
    },

    /// Ranked wallets
    #[serde(rename_all = "camelCase")]
    Leaderboard {
        /// Number of entries
        #[serde(default)]
        limit: Option<usize>,
        /// `balance` (default), `earned` or `totalEarned`
        #[serde(default)]
        sort_by: Option<String>,
    },

    /// Unlock an achievement
    #[serde(rename_all = "camelCase")]
    AddAchievement {
        /// Wallet owner
        user_id: String,
        /// Achievement name
        achievement: String,
    },

    /// Credit purchased coins
    #[serde(rename_all = "camelCase")]
    Purchase {
        /// Wallet owner
        user_id: String,
        /// Amount purchased
        #[serde(with = "rust_decimal::serde::float")]
        amount: Decimal,
        /// Payment method label
        payment_method: String,
        /// Caller metadata
        #[serde(default)]
        metadata: Option<HashMap<String, String>>,
    },

    /// Rate-limit introspection
    #[serde(rename_all = "camelCase")]
    RateLimitStatus {
        /// Wallet owner
        user_id: String,
    },

    /// Prometheus text exposition of the engine counters
    Metrics,
}

impl Request {
    /// Operation name for logs
    pub fn op(&self) -> &'static str {
        match self {
            Request::GetWallet { .. } => "getWallet",
            Request::Earn { .. } => "earn",
            Request::Spend { .. } => "spend",
            Request::Transfer { .. } => "transfer",
            Request::Transactions { .. } => "transactions",
            Request::Leaderboard { .. } => "leaderboard",
            Request::AddAchievement { .. } => "addAchievement",
            Request::Purchase { .. } => "purchase",
            Request::RateLimitStatus { .. } => "rateLimitStatus",
            Request::Metrics => "metrics",
        }
    }
}

/// Structured response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the operation succeeded
    pub success: bool,

    /// Result payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Human-readable failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Stable failure code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl Response {
    /// Successful response carrying `data`
    pub fn ok<T: Serialize>(data: &T) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                data: Some(value),
                error: None,
                code: None,
            },
            Err(e) => Self::from_error(&Error::Json(e)),
        }
    }

    /// Failed response for `error`
    pub fn from_error(error: &Error) -> Self {
        Self::failure(error.code(), error.to_string())
    }

    /// Failed response with an explicit code
    pub fn failure(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code.to_string()),
        }
    }
}

impl<T: Serialize> From<Result<T>> for Response {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Response::ok(&data),
            Err(e) => Response::from_error(&e),
        }
    }
}

/// Request handler over a ledger engine
#[derive(Debug, Clone)]
pub struct WalletService {
    engine: Arc<LedgerEngine>,
    leaderboard: Leaderboard,
}

impl WalletService {
    /// Create service over `engine`
    pub fn new(engine: Arc<LedgerEngine>) -> Self {
        let leaderboard = Leaderboard::new(engine.store().clone());
        Self {
            engine,
            leaderboard,
        }
    }

    /// Underlying engine
    pub fn engine(&self) -> &Arc<LedgerEngine> {
        &self.engine
    }

    /// `GET /wallet/:userId`
    pub fn get_wallet(&self, user_id: &str) -> Result<Wallet> {
        self.engine.open_wallet(user_id)
    }

    /// `POST /earn`
    pub fn earn(
        &self,
        user_id: &str,
        amount: Decimal,
        description: &str,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<Receipt> {
        self.engine.earn(user_id, amount, description, metadata)
    }

    /// `POST /spend`
    pub fn spend(
        &self,
        user_id: &str,
        amount: Decimal,
        description: &str,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<Receipt> {
        self.engine.spend(user_id, amount, description, metadata)
    }

    /// `POST /transfer`
    pub fn transfer(
        &self,
        from_user_id: &str,
        to_user_id: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<TransferReceipt> {
        self.engine
            .transfer(from_user_id, to_user_id, amount, description)
    }

    /// `GET /transactions/:userId`
    pub fn transactions(
        &self,
        user_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<TransactionPage> {
        self.engine.transaction_history(
            user_id,
            limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
            offset.unwrap_or(0),
        )
    }

    /// `GET /leaderboard`
    pub fn leaderboard(
        &self,
        limit: Option<usize>,
        sort_by: Option<&str>,
    ) -> Result<Vec<LeaderboardEntry>> {
        let sort_by = sort_by.map(SortBy::parse).unwrap_or_default();
        self.leaderboard
            .top(limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT), sort_by)
    }

    /// `POST /achievement`
    pub fn add_achievement(&self, user_id: &str, achievement: &str) -> Result<Wallet> {
        self.engine.add_achievement(user_id, achievement)
    }

    /// `POST /purchase`
    pub fn purchase(
        &self,
        user_id: &str,
        amount: Decimal,
        payment_method: &str,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<Receipt> {
        self.engine
            .purchase(user_id, amount, payment_method, metadata)
    }

    /// Quota introspection
    pub fn rate_limit_status(&self, user_id: &str) -> RateLimitStatus {
        self.engine.rate_limit_status(user_id)
    }

    /// `GET /metrics`
    pub fn metrics(&self) -> Result<String> {
        self.engine.metrics().render()
    }

    /// Route a request synchronously
    pub fn dispatch(&self, request: Request) -> Response {
        match request {
            Request::GetWallet { user_id } => self.get_wallet(&user_id).into(),
            Request::Earn {
                user_id,
                amount,
                description,
                metadata,
            } => self.earn(&user_id, amount, &description, metadata).into(),
            Request::Spend {
                user_id,
                amount,
                description,
                metadata,
            } => self.spend(&user_id, amount, &description, metadata).into(),
            Request::Transfer {
                from_user_id,
                to_user_id,
                amount,
                description,
            } => self
                .transfer(&from_user_id, &to_user_id, amount, &description)
                .into(),
            Request::Transactions {
                user_id,
                limit,
                offset,
            } => self.transactions(&user_id, limit, offset).into(),
            Request::Leaderboard { limit, sort_by } => {
                self.leaderboard(limit, sort_by.as_deref()).into()
            }
            Request::AddAchievement {
                user_id,
                achievement,
            } => self.add_achievement(&user_id, &achievement).into(),
            Request::Purchase {
                user_id,
                amount,
                payment_method,
                metadata,
            } => self
                .purchase(&user_id, amount, &payment_method, metadata)
                .into(),
            Request::RateLimitStatus { user_id } => Response::ok(&self.rate_limit_status(&user_id)),
            Request::Metrics => self.metrics().into(),
        }
    }

    /// Route a request on the blocking pool
    ///
    /// Engine calls may wait on wallet locks, so they stay off the async
    /// worker threads.
    pub async fn handle(&self, request: Request) -> Response {
        let op = request.op();
        let service = self.clone();

        match tokio::task::spawn_blocking(move || service.dispatch(request)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(op, error = %e, "Request handler panicked");
                Response::failure("internal", format!("{} failed", op))
            }
        }
    }

    /// Parse and route one JSON request line
    pub async fn handle_json(&self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => Response::from_error(&Error::InvalidRequest(e.to_string())),
        }
    }
}
