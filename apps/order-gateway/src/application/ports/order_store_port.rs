//! Order Store Port (Driven Port)
//!
//! Interface to the order record store. The reservation operations are
//! conditional single-statement updates: the store's own row-level atomicity
//! serializes racing callers, so at most one caller ever observes a claim.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::domain::OrderRecord;

/// Order store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Could not reach the store or obtain a connection.
    #[error("store connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// A statement failed to execute.
    #[error("store query error: {message}")]
    Query {
        /// Error details.
        message: String,
    },

    /// A row could not be mapped back into an order record.
    #[error("corrupt order row {order_id}: {message}")]
    CorruptRow {
        /// The offending order id.
        order_id: i64,
        /// What failed to decode.
        message: String,
    },

    /// A required reference-data row (status, blotter) is missing.
    #[error("missing reference data: {message}")]
    MissingReferenceData {
        /// What was expected.
        message: String,
    },
}

/// One confirmed submission to apply in the write phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionConfirmation {
    /// The claimed order.
    pub order_id: i64,
    /// The positive reference confirmed by the trade service.
    pub trade_reference_id: i64,
}

/// Port for the order record store.
///
/// `reserve`, `commit` and `release` MUST each execute as a single
/// conditional update and report whether exactly one row matched. They must
/// never be implemented as read-then-compare-then-write, which reintroduces
/// the race the conditional update exists to close.
#[async_trait]
pub trait OrderStorePort: Send + Sync {
    /// Bulk-load orders by id set. Unknown ids are simply absent from the
    /// result; the caller detects them by comparing against the request.
    async fn find_all_by_ids(&self, ids: &[i64]) -> Result<Vec<OrderRecord>, StoreError>;

    /// Atomically claim an order for exclusive submission.
    ///
    /// Sets `trade_reference_id = -order_id` iff the order exists, is `NEW`
    /// and has no trade reference. Returns `true` iff this caller now owns
    /// the order.
    async fn reserve(&self, order_id: i64) -> Result<bool, StoreError>;

    /// Confirm a claimed order as submitted.
    ///
    /// Sets the positive trade reference and `SENT` status iff the row still
    /// carries the `-order_id` claim sentinel. A `false` return means the
    /// claim no longer matches - a fatal, non-retryable inconsistency for
    /// that order.
    async fn commit(&self, order_id: i64, trade_reference_id: i64) -> Result<bool, StoreError>;

    /// Release a claimed order back to the eligible state.
    ///
    /// Clears the claim sentinel, leaving the status at `NEW`, iff the row
    /// still carries `-order_id`.
    async fn release(&self, order_id: i64) -> Result<bool, StoreError>;

    /// Apply a batch of confirmed submissions in one multi-row update.
    ///
    /// Each row is still guarded by the claim-sentinel condition. Returns the
    /// number of rows updated; a shortfall against `confirmations.len()`
    /// means one or more claims no longer matched.
    async fn apply_submissions(
        &self,
        confirmations: &[SubmissionConfirmation],
    ) -> Result<u64, StoreError>;

    /// Resolve which of the given blotter ids exist.
    async fn resolve_blotters(&self, blotter_ids: &[i64]) -> Result<HashSet<i64>, StoreError>;
}
