//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `picoin_operations_total{operation}` - Committed operations by kind
//! - `picoin_rejections_total{reason}` - Rejected operations by error code
//! - `picoin_level_ups_total` - Level-ups applied
//! - `picoin_operation_duration_seconds` - Histogram of operation latencies
//! - `picoin_wallets_created_total` - Wallets created

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Committed operations by kind
    pub operations_total: IntCounterVec,

    /// Rejections by error code
    pub rejections_total: IntCounterVec,

    /// Level-ups applied
    pub level_ups_total: IntCounter,

    /// Operation duration histogram
    pub operation_duration: Histogram,

    /// Wallets created
    pub wallets_created: IntCounter,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("level_ups_total", &self.level_ups_total.get())
            .field("wallets_created", &self.wallets_created.get())
            .finish_non_exhaustive()
    }
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let operations_total = IntCounterVec::new(
            Opts::new("picoin_operations_total", "Committed ledger operations"),
            &["operation"],
        )?;
        registry.register(Box::new(operations_total.clone()))?;

        let rejections_total = IntCounterVec::new(
            Opts::new("picoin_rejections_total", "Rejected ledger operations"),
            &["reason"],
        )?;
        registry.register(Box::new(rejections_total.clone()))?;

        let level_ups_total = IntCounter::new("picoin_level_ups_total", "Level-ups applied")?;
        registry.register(Box::new(level_ups_total.clone()))?;

        let operation_duration = Histogram::with_opts(
            HistogramOpts::new(
                "picoin_operation_duration_seconds",
                "Histogram of operation latencies",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0]),
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        let wallets_created = IntCounter::new("picoin_wallets_created_total", "Wallets created")?;
        registry.register(Box::new(wallets_created.clone()))?;

        Ok(Self {
            operations_total,
            rejections_total,
            level_ups_total,
            operation_duration,
            wallets_created,
            registry,
        })
    }

    /// Record a committed operation
    pub fn record_operation(&self, operation: &str, duration_seconds: f64) {
        self.operations_total.with_label_values(&[operation]).inc();
        self.operation_duration.observe(duration_seconds);
    }

    /// Record a rejected operation
    pub fn record_rejection(&self, error: &crate::Error) {
        self.rejections_total.with_label_values(&[error.code()]).inc();
    }

    /// Record applied level-ups
    pub fn record_level_ups(&self, count: usize) {
        self.level_ups_total.inc_by(count as u64);
    }

    /// Record wallet creation
    pub fn record_wallet_created(&self) {
        self.wallets_created.inc();
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text exposition format
    pub fn render(&self) -> crate::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry().gather(), &mut buffer)
            .map_err(|e| crate::Error::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| crate::Error::Metrics(e.to_string()))
    }
}
