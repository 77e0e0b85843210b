//! Reconciliation Port (Driven Port)
//!
//! Commit inconsistencies - a claim that no longer matched when the write
//! phase tried to confirm it after the trade service had already accepted
//! the order - cannot be recovered automatically. Retrying the write risks a
//! duplicate trade, and releasing the claim re-exposes the order. The only
//! safe move is to hand the order to an out-of-band reconciliation process.

use async_trait::async_trait;

/// Port for surfacing non-retryable submission anomalies.
#[async_trait]
pub trait ReconciliationPort: Send + Sync {
    /// Flag an order whose confirmed submission could not be recorded.
    ///
    /// `trade_reference_id` is the reference the trade service confirmed;
    /// the order row does not carry it.
    async fn flag_commit_inconsistency(
        &self,
        order_id: i64,
        trade_reference_id: i64,
        detail: &str,
    );
}

/// Default adapter: logs the anomaly at ERROR and nothing else. Operators
/// alert on this log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingReconciliationHook;

#[async_trait]
impl ReconciliationPort for LoggingReconciliationHook {
    async fn flag_commit_inconsistency(
        &self,
        order_id: i64,
        trade_reference_id: i64,
        detail: &str,
    ) {
        tracing::error!(
            order_id,
            trade_reference_id,
            detail,
            "Commit inconsistency: order confirmed by trade service but not recorded, \
             manual reconciliation required"
        );
    }
}
