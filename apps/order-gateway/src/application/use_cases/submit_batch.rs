//! Batch submission pipeline.
//!
//! One request moves through four stages: load and eligibility-check the
//! orders (read phase), claim each eligible order with a conditional update,
//! make exactly one bulk call to the trade service, then record the
//! confirmed submissions (write phase). The external call sits between the
//! two timed database phases and is never retried; exactly-once submission
//! rests on the claim sentinel, not on the transport.
//!
//! After the trade service has accepted an order there is no safe automatic
//! rollback. Claims are released only when the order was NOT accepted
//! externally; anything accepted but unrecordable is handed to
//! reconciliation.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::application::ports::{
    BulkTradeRequest, OrderStorePort, ReconciliationPort, SubmissionConfirmation,
    TradeOrderRequest, TradeServicePort,
};
use crate::domain::{
    BatchSubmitResponse, MAX_BATCH_SIZE, OrderRecord, OrderStatus, OrderSubmitResult,
    SubmissionOutcome,
};
use crate::resilience::{AdmissionController, OverloadDetector};

const ADMISSION_TIMEOUT_MESSAGE: &str = "admission queue timeout, system busy";
const RECONCILIATION_MESSAGE: &str =
    "confirmed by trade service but could not be recorded, flagged for reconciliation";

/// Pipeline timing and fan-out settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Budget for loading orders and reference data (default: 3s).
    #[serde(default = "default_read_phase_timeout_ms")]
    pub read_phase_timeout_ms: u64,
    /// Budget for recording results after the external call (default: 5s).
    #[serde(default = "default_write_phase_timeout_ms")]
    pub write_phase_timeout_ms: u64,
    /// Maximum concurrent claim attempts (default: 10).
    #[serde(default = "default_reserve_fanout")]
    pub reserve_fanout: usize,
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            read_phase_timeout_ms: default_read_phase_timeout_ms(),
            write_phase_timeout_ms: default_write_phase_timeout_ms(),
            reserve_fanout: default_reserve_fanout(),
        }
    }
}

const fn default_read_phase_timeout_ms() -> u64 {
    3_000
}

const fn default_write_phase_timeout_ms() -> u64 {
    5_000
}

const fn default_reserve_fanout() -> usize {
    10
}

/// Rejection issued before any order is examined. The batch response never
/// carries these; they map to their own transport-level replies.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubmitRejection {
    /// The request shape is unacceptable.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// What is wrong with the request.
        reason: String,
        /// True when the batch exceeds the size cap.
        oversized: bool,
    },

    /// The system is shedding load.
    #[error("system overloaded, retry later")]
    Overloaded {
        /// Suggested wait before retrying.
        retry_after: Duration,
    },
}

/// Orchestrates one batch submission end to end.
pub struct SubmitBatchUseCase<S, T, R>
where
    S: OrderStorePort,
    T: TradeServicePort,
    R: ReconciliationPort,
{
    store: Arc<S>,
    trade_service: Arc<T>,
    reconciliation: Arc<R>,
    admission: Arc<AdmissionController>,
    detector: Arc<OverloadDetector>,
    config: SubmissionConfig,
}

impl<S, T, R> SubmitBatchUseCase<S, T, R>
where
    S: OrderStorePort,
    T: TradeServicePort,
    R: ReconciliationPort,
{
    /// Wire the pipeline.
    pub fn new(
        store: Arc<S>,
        trade_service: Arc<T>,
        reconciliation: Arc<R>,
        admission: Arc<AdmissionController>,
        detector: Arc<OverloadDetector>,
        config: SubmissionConfig,
    ) -> Self {
        Self {
            store,
            trade_service,
            reconciliation,
            admission,
            detector,
            config,
        }
    }

    /// Submit a batch of order ids.
    ///
    /// Returns one result per requested id, in request order. `Err` means
    /// the request was rejected before any order was touched.
    pub async fn execute(
        &self,
        order_ids: &[i64],
    ) -> Result<BatchSubmitResponse, SubmitRejection> {
        if order_ids.is_empty() {
            return Err(SubmitRejection::InvalidRequest {
                reason: "order id list is empty".to_string(),
                oversized: false,
            });
        }
        if order_ids.len() > MAX_BATCH_SIZE {
            return Err(SubmitRejection::InvalidRequest {
                reason: format!(
                    "batch of {} orders exceeds the maximum of {MAX_BATCH_SIZE}",
                    order_ids.len()
                ),
                oversized: true,
            });
        }

        self.detector
            .check_admission(self.admission.utilization())
            .map_err(|retry_after| SubmitRejection::Overloaded { retry_after })?;

        info!(batch_size = order_ids.len(), "batch submission started");

        let mut slots: Vec<Option<OrderSubmitResult>> = vec![None; order_ids.len()];

        // Read phase: load orders and blotter reference data under one
        // bounded budget. A failure here fails the whole batch.
        let read = tokio::time::timeout(
            Duration::from_millis(self.config.read_phase_timeout_ms),
            self.read_phase(order_ids),
        )
        .await;

        let (orders, known_blotters) = match read {
            Ok(Ok(loaded)) => loaded,
            Ok(Err(message)) => return Ok(self.fail_whole_batch(order_ids, &message)),
            Err(_) => {
                return Ok(self.fail_whole_batch(order_ids, "timed out loading orders"));
            }
        };

        let mut candidates: Vec<(usize, OrderRecord)> = Vec::new();
        for (index, order_id) in order_ids.iter().enumerate() {
            match orders.get(order_id) {
                None => {
                    slots[index] =
                        Some(OrderSubmitResult::failure(*order_id, index, "order not found"));
                }
                Some(order) => {
                    let blotter_known = known_blotters.contains(&order.blotter_id);
                    match order.validate_for_submission(blotter_known) {
                        Ok(()) => candidates.push((index, order.clone())),
                        Err(reason) => {
                            slots[index] = Some(OrderSubmitResult::failure(
                                *order_id,
                                index,
                                reason.to_string(),
                            ));
                        }
                    }
                }
            }
        }

        if candidates.is_empty() {
            return Ok(self.finish(order_ids, slots));
        }

        // Claim stage: bounded fan-out of conditional updates. A false
        // return means some other submitter owns the order now.
        let fanout = self.config.reserve_fanout.max(1).min(candidates.len());
        let reservations: Vec<(usize, OrderRecord, Result<bool, String>)> =
            futures::stream::iter(candidates)
                .map(|(index, order)| async move {
                    let outcome = match self.admission.acquire().await {
                        None => Err(ADMISSION_TIMEOUT_MESSAGE.to_string()),
                        Some(_permit) => {
                            self.store.reserve(order.id).await.map_err(|e| e.to_string())
                        }
                    };
                    (index, order, outcome)
                })
                .buffer_unordered(fanout)
                .collect()
                .await;

        let mut claimed: Vec<(usize, OrderRecord)> = Vec::new();
        for (index, order, outcome) in reservations {
            match outcome {
                Ok(true) => claimed.push((index, order)),
                Ok(false) => {
                    slots[index] = Some(OrderSubmitResult::failure(
                        order.id,
                        index,
                        "could not claim order, likely submitted concurrently",
                    ));
                }
                Err(message) => {
                    slots[index] = Some(OrderSubmitResult::failure(order.id, index, message));
                }
            }
        }
        claimed.sort_unstable_by_key(|(index, _)| *index);

        if claimed.is_empty() {
            return Ok(self.finish(order_ids, slots));
        }

        // The external call carries the request index of every item so the
        // reply can be re-aligned even if the service reorders or drops
        // entries.
        let mut trades = Vec::with_capacity(claimed.len());
        let mut sendable: Vec<(usize, OrderRecord)> = Vec::with_capacity(claimed.len());
        for (index, order) in claimed {
            match TradeOrderRequest::from_order(&order, index) {
                Ok(item) => {
                    trades.push(item);
                    sendable.push((index, order));
                }
                Err(build_error) => {
                    // Eligibility already passed, so this is a defect; the
                    // claim still has to be handed back.
                    self.release_claim(order.id).await;
                    slots[index] = Some(OrderSubmitResult::failure(
                        order.id,
                        index,
                        build_error.to_string(),
                    ));
                }
            }
        }

        if sendable.is_empty() {
            return Ok(self.finish(order_ids, slots));
        }

        let reply = match self
            .trade_service
            .submit_bulk(BulkTradeRequest { trades })
            .await
        {
            Ok(reply) => reply,
            Err(call_error) => {
                // Structural failure: nothing was accepted, so every claim
                // is released and every sent order fails with the same
                // diagnostic.
                warn!(error = %call_error, "bulk trade call failed");
                let message = call_error.to_string();
                for (index, order) in &sendable {
                    self.release_claim(order.id).await;
                    slots[*index] =
                        Some(OrderSubmitResult::failure(order.id, *index, message.clone()));
                }
                return Ok(self.finish(order_ids, slots));
            }
        };

        let by_index = reply.by_request_index();
        let mut confirmations: Vec<(usize, SubmissionConfirmation)> = Vec::new();
        let mut rejected: Vec<(usize, i64, String)> = Vec::new();
        for (index, order) in &sendable {
            match by_index.get(index) {
                Some(result) if result.success => match result.trade_reference_id {
                    Some(reference) if reference > 0 => confirmations.push((
                        *index,
                        SubmissionConfirmation {
                            order_id: order.id,
                            trade_reference_id: reference,
                        },
                    )),
                    _ => rejected.push((
                        *index,
                        order.id,
                        "service reported success without a usable trade reference".to_string(),
                    )),
                },
                Some(result) => rejected.push((
                    *index,
                    order.id,
                    result
                        .message
                        .clone()
                        .unwrap_or_else(|| "rejected by trade service".to_string()),
                )),
                None => rejected.push((
                    *index,
                    order.id,
                    "no result returned for this order".to_string(),
                )),
            }
        }

        // Write phase: record confirmations and release rejected claims
        // under one bounded budget.
        let write = tokio::time::timeout(
            Duration::from_millis(self.config.write_phase_timeout_ms),
            self.write_phase(&confirmations, &rejected),
        )
        .await;

        match write {
            Ok(outcomes) => {
                for (index, result) in outcomes {
                    slots[index] = Some(result);
                }
            }
            Err(_) => {
                // The service accepted these orders; with recording timed
                // out their local state is unknown. Never release, never
                // re-run, hand everything to reconciliation.
                for (index, confirmation) in &confirmations {
                    self.reconciliation
                        .flag_commit_inconsistency(
                            confirmation.order_id,
                            confirmation.trade_reference_id,
                            "write phase timed out",
                        )
                        .await;
                    slots[*index] = Some(OrderSubmitResult::failure(
                        confirmation.order_id,
                        *index,
                        RECONCILIATION_MESSAGE,
                    ));
                }
                for (index, order_id, message) in &rejected {
                    tracing::error!(
                        order_id,
                        "release skipped after write-phase timeout, claim may be stuck"
                    );
                    slots[*index] =
                        Some(OrderSubmitResult::failure(*order_id, *index, message.clone()));
                }
            }
        }

        Ok(self.finish(order_ids, slots))
    }

    /// Assemble the final response and feed the overload detector: an
    /// overall FAILURE counts as a failure, anything else as a success.
    fn finish(
        &self,
        order_ids: &[i64],
        slots: Vec<Option<OrderSubmitResult>>,
    ) -> BatchSubmitResponse {
        let response = Self::finalize(order_ids, slots);
        info!(
            outcome = %response.outcome,
            successful = response.successful,
            failed = response.failed,
            "batch submission finished"
        );

        if response.outcome == SubmissionOutcome::Failure {
            self.detector.record_failure();
        } else {
            self.detector.record_success();
        }

        response
    }

    /// Load the requested orders and resolve their blotters, admission-gated.
    async fn read_phase(
        &self,
        order_ids: &[i64],
    ) -> Result<(HashMap<i64, OrderRecord>, HashSet<i64>), String> {
        let Some(_permit) = self.admission.acquire().await else {
            return Err(ADMISSION_TIMEOUT_MESSAGE.to_string());
        };

        let orders = self
            .store
            .find_all_by_ids(order_ids)
            .await
            .map_err(|e| e.to_string())?;

        let mut blotter_ids: Vec<i64> = orders.iter().map(|o| o.blotter_id).collect();
        blotter_ids.sort_unstable();
        blotter_ids.dedup();

        let known_blotters = self
            .store
            .resolve_blotters(&blotter_ids)
            .await
            .map_err(|e| e.to_string())?;

        Ok((orders.into_iter().map(|o| (o.id, o)).collect(), known_blotters))
    }

    /// Record confirmations and release rejected claims.
    async fn write_phase(
        &self,
        confirmations: &[(usize, SubmissionConfirmation)],
        rejected: &[(usize, i64, String)],
    ) -> Vec<(usize, OrderSubmitResult)> {
        let mut outcomes = Vec::with_capacity(confirmations.len() + rejected.len());

        if !confirmations.is_empty() {
            outcomes.extend(self.record_confirmations(confirmations).await);
        }

        for (index, order_id, message) in rejected {
            self.release_claim(*order_id).await;
            outcomes.push((
                *index,
                OrderSubmitResult::failure(*order_id, *index, message.clone()),
            ));
        }

        outcomes
    }

    /// Persist confirmed submissions: a single commit for one order, one
    /// batched update otherwise. Any shortfall is diagnosed row by row.
    async fn record_confirmations(
        &self,
        confirmations: &[(usize, SubmissionConfirmation)],
    ) -> Vec<(usize, OrderSubmitResult)> {
        let Some(_permit) = self.admission.acquire().await else {
            return self
                .flag_all(confirmations, "no admission slot to record submissions")
                .await;
        };

        let applied = if confirmations.len() == 1 {
            let (_, confirmation) = confirmations[0];
            self.store
                .commit(confirmation.order_id, confirmation.trade_reference_id)
                .await
                .map(u64::from)
        } else {
            let batch: Vec<SubmissionConfirmation> =
                confirmations.iter().map(|(_, c)| *c).collect();
            self.store.apply_submissions(&batch).await
        };

        match applied {
            Err(store_error) => {
                self.flag_all(
                    confirmations,
                    &format!("store error while recording submissions: {store_error}"),
                )
                .await
            }
            Ok(updated) if updated == confirmations.len() as u64 => confirmations
                .iter()
                .map(|(index, c)| {
                    (
                        *index,
                        OrderSubmitResult::success(c.order_id, *index, c.trade_reference_id),
                    )
                })
                .collect(),
            Ok(updated) => {
                warn!(
                    expected = confirmations.len(),
                    updated, "submission recording shortfall"
                );
                self.diagnose_shortfall(confirmations).await
            }
        }
    }

    /// Re-read the confirmed rows to tell applied updates from lost claims.
    /// The batched update is never blindly re-run; rows already `SENT` with
    /// the expected reference are successes, anything else goes to
    /// reconciliation.
    async fn diagnose_shortfall(
        &self,
        confirmations: &[(usize, SubmissionConfirmation)],
    ) -> Vec<(usize, OrderSubmitResult)> {
        let ids: Vec<i64> = confirmations.iter().map(|(_, c)| c.order_id).collect();
        let rows: HashMap<i64, OrderRecord> = match self.store.find_all_by_ids(&ids).await {
            Ok(rows) => rows.into_iter().map(|o| (o.id, o)).collect(),
            Err(store_error) => {
                return self
                    .flag_all(
                        confirmations,
                        &format!("diagnostic read failed: {store_error}"),
                    )
                    .await;
            }
        };

        let mut outcomes = Vec::with_capacity(confirmations.len());
        for (index, confirmation) in confirmations {
            let recorded = rows.get(&confirmation.order_id).is_some_and(|row| {
                row.status == OrderStatus::Sent
                    && row.trade_reference_id == Some(confirmation.trade_reference_id)
            });

            if recorded {
                outcomes.push((
                    *index,
                    OrderSubmitResult::success(
                        confirmation.order_id,
                        *index,
                        confirmation.trade_reference_id,
                    ),
                ));
            } else {
                self.reconciliation
                    .flag_commit_inconsistency(
                        confirmation.order_id,
                        confirmation.trade_reference_id,
                        "claim no longer matched when recording the confirmed submission",
                    )
                    .await;
                outcomes.push((
                    *index,
                    OrderSubmitResult::failure(
                        confirmation.order_id,
                        *index,
                        RECONCILIATION_MESSAGE,
                    ),
                ));
            }
        }
        outcomes
    }

    /// Flag every confirmation for reconciliation with one shared detail.
    async fn flag_all(
        &self,
        confirmations: &[(usize, SubmissionConfirmation)],
        detail: &str,
    ) -> Vec<(usize, OrderSubmitResult)> {
        let mut outcomes = Vec::with_capacity(confirmations.len());
        for (index, confirmation) in confirmations {
            self.reconciliation
                .flag_commit_inconsistency(
                    confirmation.order_id,
                    confirmation.trade_reference_id,
                    detail,
                )
                .await;
            outcomes.push((
                *index,
                OrderSubmitResult::failure(confirmation.order_id, *index, RECONCILIATION_MESSAGE),
            ));
        }
        outcomes
    }

    /// Hand a claim back. A failed release leaves the order stuck in the
    /// claimed state, which only an operator can clean up, so it is logged
    /// at ERROR.
    async fn release_claim(&self, order_id: i64) {
        let released = match self.admission.acquire().await {
            None => {
                tracing::error!(order_id, "no admission slot to release claim, claim may be stuck");
                return;
            }
            Some(_permit) => self.store.release(order_id).await,
        };

        match released {
            Ok(true) => {}
            Ok(false) => {
                tracing::error!(order_id, "claim did not match on release, claim may be stuck");
            }
            Err(store_error) => {
                tracing::error!(order_id, error = %store_error, "release failed, claim may be stuck");
            }
        }
    }

    /// Fail every requested order with one message. Used for whole-batch
    /// read-phase failures, which also count against the overload detector.
    fn fail_whole_batch(&self, order_ids: &[i64], message: &str) -> BatchSubmitResponse {
        warn!(message, "batch failed before reaching the trade service");
        self.detector.record_failure();
        let results = order_ids
            .iter()
            .enumerate()
            .map(|(index, order_id)| OrderSubmitResult::failure(*order_id, index, message))
            .collect();
        BatchSubmitResponse::from_results(results)
    }

    /// Turn the slot array into the final index-aligned response.
    fn finalize(
        order_ids: &[i64],
        slots: Vec<Option<OrderSubmitResult>>,
    ) -> BatchSubmitResponse {
        let results = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    OrderSubmitResult::failure(
                        order_ids[index],
                        index,
                        "no result produced for this order",
                    )
                })
            })
            .collect();
        BatchSubmitResponse::from_results(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        BulkTradeResult, StoreError, TradeBatchStatus, TradeOrderResult, TradeServiceError,
    };
    use crate::domain::OrderType;
    use crate::infrastructure::persistence::InMemoryOrderStore;
    use crate::resilience::{AdmissionConfig, OverloadConfig, OverloadState};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum TradeBehavior {
        /// Accept every item with reference 1000 + request index.
        EchoSuccess,
        /// Fail the whole call.
        Structural(TradeServiceError),
        /// Return this reply verbatim.
        Reply(BulkTradeResult),
    }

    struct StubTradeService {
        behavior: TradeBehavior,
        calls: AtomicUsize,
        captured: Mutex<Vec<BulkTradeRequest>>,
    }

    impl StubTradeService {
        fn new(behavior: TradeBehavior) -> Self {
            Self {
                behavior,
                calls: AtomicUsize::new(0),
                captured: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TradeServicePort for StubTradeService {
        async fn submit_bulk(
            &self,
            request: BulkTradeRequest,
        ) -> Result<BulkTradeResult, TradeServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.captured.lock().unwrap().push(request.clone());

            match &self.behavior {
                TradeBehavior::EchoSuccess => {
                    let results: Vec<TradeOrderResult> = request
                        .trades
                        .iter()
                        .map(|t| TradeOrderResult {
                            request_index: t.request_index,
                            success: true,
                            trade_reference_id: Some(1_000 + t.request_index as i64),
                            message: None,
                        })
                        .collect();
                    Ok(BulkTradeResult {
                        status: TradeBatchStatus::Complete,
                        total_requested: results.len(),
                        successful: results.len(),
                        failed: 0,
                        results,
                    })
                }
                TradeBehavior::Structural(err) => Err(err.clone()),
                TradeBehavior::Reply(reply) => Ok(reply.clone()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingReconciliation {
        flags: Mutex<Vec<(i64, i64, String)>>,
    }

    #[async_trait]
    impl ReconciliationPort for RecordingReconciliation {
        async fn flag_commit_inconsistency(
            &self,
            order_id: i64,
            trade_reference_id: i64,
            detail: &str,
        ) {
            self.flags
                .lock()
                .unwrap()
                .push((order_id, trade_reference_id, detail.to_string()));
        }
    }

    /// Store whose write phase loses every claim, for inconsistency tests.
    struct CommitLossStore {
        inner: InMemoryOrderStore,
    }

    #[async_trait]
    impl OrderStorePort for CommitLossStore {
        async fn find_all_by_ids(&self, ids: &[i64]) -> Result<Vec<OrderRecord>, StoreError> {
            self.inner.find_all_by_ids(ids).await
        }
        async fn reserve(&self, order_id: i64) -> Result<bool, StoreError> {
            self.inner.reserve(order_id).await
        }
        async fn commit(&self, _order_id: i64, _reference: i64) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn release(&self, order_id: i64) -> Result<bool, StoreError> {
            self.inner.release(order_id).await
        }
        async fn apply_submissions(
            &self,
            _confirmations: &[SubmissionConfirmation],
        ) -> Result<u64, StoreError> {
            Ok(0)
        }
        async fn resolve_blotters(
            &self,
            blotter_ids: &[i64],
        ) -> Result<std::collections::HashSet<i64>, StoreError> {
            self.inner.resolve_blotters(blotter_ids).await
        }
    }

    /// Store that cannot be read at all.
    struct BrokenStore;

    #[async_trait]
    impl OrderStorePort for BrokenStore {
        async fn find_all_by_ids(&self, _ids: &[i64]) -> Result<Vec<OrderRecord>, StoreError> {
            Err(StoreError::Connection {
                message: "connection refused".to_string(),
            })
        }
        async fn reserve(&self, _order_id: i64) -> Result<bool, StoreError> {
            Err(StoreError::Connection {
                message: "connection refused".to_string(),
            })
        }
        async fn commit(&self, _order_id: i64, _reference: i64) -> Result<bool, StoreError> {
            Err(StoreError::Connection {
                message: "connection refused".to_string(),
            })
        }
        async fn release(&self, _order_id: i64) -> Result<bool, StoreError> {
            Err(StoreError::Connection {
                message: "connection refused".to_string(),
            })
        }
        async fn apply_submissions(
            &self,
            _confirmations: &[SubmissionConfirmation],
        ) -> Result<u64, StoreError> {
            Err(StoreError::Connection {
                message: "connection refused".to_string(),
            })
        }
        async fn resolve_blotters(
            &self,
            _blotter_ids: &[i64],
        ) -> Result<std::collections::HashSet<i64>, StoreError> {
            Err(StoreError::Connection {
                message: "connection refused".to_string(),
            })
        }
    }

    fn order(id: i64) -> OrderRecord {
        OrderRecord {
            id,
            status: OrderStatus::New,
            trade_reference_id: None,
            portfolio_id: "PORT-1".to_string(),
            security_id: "SEC-1".to_string(),
            order_type: OrderType::Market,
            quantity: dec!(10),
            limit_price: None,
            order_timestamp: Some(Utc::now()),
            blotter_id: 1,
            version: 0,
        }
    }

    fn pipeline<S: OrderStorePort, T: TradeServicePort>(
        store: Arc<S>,
        service: Arc<T>,
    ) -> (
        SubmitBatchUseCase<S, T, RecordingReconciliation>,
        Arc<RecordingReconciliation>,
        Arc<OverloadDetector>,
    ) {
        let reconciliation = Arc::new(RecordingReconciliation::default());
        let detector = Arc::new(OverloadDetector::new(OverloadConfig::default()));
        let admission = Arc::new(AdmissionController::new(&AdmissionConfig {
            permits: 25,
            acquire_timeout_ms: 200,
        }));
        let use_case = SubmitBatchUseCase::new(
            store,
            service,
            Arc::clone(&reconciliation),
            admission,
            Arc::clone(&detector),
            SubmissionConfig::default(),
        );
        (use_case, reconciliation, detector)
    }

    #[tokio::test]
    async fn submits_full_batch_successfully() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.add(order(1));
        store.add(order(2));
        store.add(order(3));
        let service = Arc::new(StubTradeService::new(TradeBehavior::EchoSuccess));
        let (use_case, _, detector) = pipeline(Arc::clone(&store), Arc::clone(&service));

        let response = use_case.execute(&[1, 2, 3]).await.unwrap();

        assert_eq!(response.outcome, SubmissionOutcome::Success);
        assert_eq!(response.successful, 3);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
        for (index, result) in response.results.iter().enumerate() {
            assert_eq!(result.request_index, index);
            assert!(result.success);
        }

        let row = store.get(2).unwrap();
        assert_eq!(row.status, OrderStatus::Sent);
        assert_eq!(row.trade_reference_id, Some(1_001));
        assert_eq!(detector.state(), OverloadState::Closed);
    }

    #[tokio::test]
    async fn single_order_batch_commits_individually() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.add(order(7));
        let service = Arc::new(StubTradeService::new(TradeBehavior::EchoSuccess));
        let (use_case, _, _) = pipeline(Arc::clone(&store), service);

        let response = use_case.execute(&[7]).await.unwrap();

        assert_eq!(response.outcome, SubmissionOutcome::Success);
        assert_eq!(store.get(7).unwrap().trade_reference_id, Some(1_000));
    }

    #[tokio::test]
    async fn rejects_empty_and_oversized_batches() {
        let store = Arc::new(InMemoryOrderStore::new());
        let service = Arc::new(StubTradeService::new(TradeBehavior::EchoSuccess));
        let (use_case, _, _) = pipeline(store, Arc::clone(&service));

        let empty = use_case.execute(&[]).await.unwrap_err();
        assert!(matches!(
            empty,
            SubmitRejection::InvalidRequest { oversized: false, .. }
        ));

        let too_many: Vec<i64> = (1..=101).collect();
        let oversized = use_case.execute(&too_many).await.unwrap_err();
        assert!(matches!(
            oversized,
            SubmitRejection::InvalidRequest { oversized: true, .. }
        ));

        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sheds_load_while_detector_open() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.add(order(1));
        let service = Arc::new(StubTradeService::new(TradeBehavior::EchoSuccess));
        let (use_case, _, detector) = pipeline(store, Arc::clone(&service));

        detector.force_open();
        let rejection = use_case.execute(&[1]).await.unwrap_err();
        assert!(matches!(rejection, SubmitRejection::Overloaded { .. }));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn ineligible_orders_fail_in_place_and_eligible_ones_proceed() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.add(order(1));
        let mut sent = order(2);
        sent.status = OrderStatus::Sent;
        sent.trade_reference_id = Some(500);
        store.add(sent);
        // Order 3 does not exist.
        let service = Arc::new(StubTradeService::new(TradeBehavior::EchoSuccess));
        let (use_case, _, _) = pipeline(Arc::clone(&store), Arc::clone(&service));

        let response = use_case.execute(&[1, 2, 3]).await.unwrap();

        assert_eq!(response.outcome, SubmissionOutcome::Partial);
        assert!(response.results[0].success);
        assert!(!response.results[1].success);
        assert!(response.results[1].message.contains("SENT"));
        assert!(!response.results[2].success);
        assert!(response.results[2].message.contains("not found"));

        // Only the eligible order went out.
        let captured = service.captured.lock().unwrap();
        assert_eq!(captured[0].trades.len(), 1);
        assert_eq!(captured[0].trades[0].request_index, 0);
    }

    #[tokio::test]
    async fn all_ineligible_batch_skips_external_call() {
        let store = Arc::new(InMemoryOrderStore::new());
        let service = Arc::new(StubTradeService::new(TradeBehavior::EchoSuccess));
        let (use_case, _, detector) = pipeline(store, Arc::clone(&service));

        let response = use_case.execute(&[1, 2]).await.unwrap();

        assert_eq!(response.outcome, SubmissionOutcome::Failure);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        // Outcome feedback applies even when nothing went out.
        assert_eq!(detector.metrics().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn duplicate_ids_submit_once() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.add(order(1));
        let service = Arc::new(StubTradeService::new(TradeBehavior::EchoSuccess));
        let (use_case, _, _) = pipeline(Arc::clone(&store), Arc::clone(&service));

        let response = use_case.execute(&[1, 1]).await.unwrap();

        assert_eq!(response.outcome, SubmissionOutcome::Partial);
        assert_eq!(response.successful, 1);
        assert_eq!(response.failed, 1);
        assert_eq!(service.captured.lock().unwrap()[0].trades.len(), 1);
    }

    #[tokio::test]
    async fn structural_failure_releases_all_claims() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.add(order(1));
        store.add(order(2));
        let service = Arc::new(StubTradeService::new(TradeBehavior::Structural(
            TradeServiceError::Network {
                message: "connection reset".to_string(),
            },
        )));
        let (use_case, _, detector) = pipeline(Arc::clone(&store), service);

        let response = use_case.execute(&[1, 2]).await.unwrap();

        assert_eq!(response.outcome, SubmissionOutcome::Failure);
        for result in &response.results {
            assert!(result.message.contains("connection reset"));
        }
        // Claims were handed back; both orders are eligible again.
        assert!(store.get(1).unwrap().is_eligible());
        assert!(store.get(2).unwrap().is_eligible());
        assert_eq!(detector.metrics().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn per_item_rejection_releases_only_that_claim() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.add(order(1));
        store.add(order(2));
        let service = Arc::new(StubTradeService::new(TradeBehavior::Reply(BulkTradeResult {
            status: TradeBatchStatus::Partial,
            total_requested: 2,
            successful: 1,
            failed: 1,
            results: vec![
                TradeOrderResult {
                    request_index: 0,
                    success: true,
                    trade_reference_id: Some(600),
                    message: None,
                },
                TradeOrderResult {
                    request_index: 1,
                    success: false,
                    trade_reference_id: None,
                    message: Some("insufficient buying power".to_string()),
                },
            ],
        })));
        let (use_case, _, _) = pipeline(Arc::clone(&store), service);

        let response = use_case.execute(&[1, 2]).await.unwrap();

        assert_eq!(response.outcome, SubmissionOutcome::Partial);
        assert!(response.results[0].success);
        assert_eq!(response.results[0].trade_reference_id, Some(600));
        assert!(response.results[1].message.contains("buying power"));

        assert_eq!(store.get(1).unwrap().status, OrderStatus::Sent);
        assert!(store.get(2).unwrap().is_eligible());
    }

    #[tokio::test]
    async fn missing_reply_entry_synthesizes_failure_and_releases() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.add(order(1));
        store.add(order(2));
        // Reply covers only index 0; index 1 is a hole.
        let service = Arc::new(StubTradeService::new(TradeBehavior::Reply(BulkTradeResult {
            status: TradeBatchStatus::Partial,
            total_requested: 2,
            successful: 1,
            failed: 1,
            results: vec![TradeOrderResult {
                request_index: 0,
                success: true,
                trade_reference_id: Some(601),
                message: None,
            }],
        })));
        let (use_case, _, _) = pipeline(Arc::clone(&store), service);

        let response = use_case.execute(&[1, 2]).await.unwrap();

        assert!(response.results[0].success);
        assert!(response.results[1].message.contains("no result returned"));
        assert!(store.get(2).unwrap().is_eligible());
    }

    #[tokio::test]
    async fn lost_claim_after_acceptance_goes_to_reconciliation() {
        let inner = InMemoryOrderStore::new();
        inner.add(order(1));
        inner.add(order(2));
        let store = Arc::new(CommitLossStore { inner });
        let service = Arc::new(StubTradeService::new(TradeBehavior::EchoSuccess));
        let (use_case, reconciliation, _) = pipeline(store, service);

        let response = use_case.execute(&[1, 2]).await.unwrap();

        assert_eq!(response.outcome, SubmissionOutcome::Failure);
        for result in &response.results {
            assert!(result.message.contains("reconciliation"));
        }

        let flags = reconciliation.flags.lock().unwrap();
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].0, 1);
        assert_eq!(flags[0].1, 1_000);
    }

    #[tokio::test]
    async fn store_outage_fails_whole_batch_and_feeds_detector() {
        let store = Arc::new(BrokenStore);
        let service = Arc::new(StubTradeService::new(TradeBehavior::EchoSuccess));
        let (use_case, _, detector) = pipeline(store, Arc::clone(&service));

        let response = use_case.execute(&[1, 2, 3]).await.unwrap();

        assert_eq!(response.outcome, SubmissionOutcome::Failure);
        assert_eq!(response.results.len(), 3);
        for result in &response.results {
            assert!(result.message.contains("connection refused"));
        }
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert_eq!(detector.metrics().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn success_without_reference_is_released_not_committed() {
        let store = Arc::new(InMemoryOrderStore::new());
        store.add(order(1));
        let service = Arc::new(StubTradeService::new(TradeBehavior::Reply(BulkTradeResult {
            status: TradeBatchStatus::Complete,
            total_requested: 1,
            successful: 1,
            failed: 0,
            results: vec![TradeOrderResult {
                request_index: 0,
                success: true,
                trade_reference_id: None,
                message: None,
            }],
        })));
        let (use_case, _, _) = pipeline(Arc::clone(&store), service);

        let response = use_case.execute(&[1]).await.unwrap();

        assert_eq!(response.outcome, SubmissionOutcome::Failure);
        assert!(response.results[0].message.contains("trade reference"));
        assert!(store.get(1).unwrap().is_eligible());
    }
}
