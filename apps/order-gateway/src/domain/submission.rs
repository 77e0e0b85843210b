//! Per-order submission results and batch-level aggregation.
//!
//! The request index, an order id's zero-based position in the submission
//! request, is the sole correlation key across the pipeline. Results are
//! always reported in request order regardless of internal processing order.

use serde::{Deserialize, Serialize};

/// Overall outcome of a batch, computed purely from counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionOutcome {
    /// Every requested order was submitted.
    Success,
    /// Some orders were submitted, some failed.
    Partial,
    /// No order was submitted, or the request itself was invalid.
    Failure,
}

impl std::fmt::Display for SubmissionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Partial => write!(f, "PARTIAL"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Outcome for a single order within a batch. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSubmitResult {
    /// The requested order id.
    pub order_id: i64,
    /// Zero-based position in the original request.
    pub request_index: usize,
    /// Whether this order was submitted.
    pub success: bool,
    /// Human-readable reason, always present on failure.
    pub message: String,
    /// Confirmed trade reference, present only on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_reference_id: Option<i64>,
}

impl OrderSubmitResult {
    /// A successful submission with its confirmed trade reference.
    #[must_use]
    pub fn success(order_id: i64, request_index: usize, trade_reference_id: i64) -> Self {
        Self {
            order_id,
            request_index,
            success: true,
            message: "submitted".to_string(),
            trade_reference_id: Some(trade_reference_id),
        }
    }

    /// A failed submission with a reason.
    #[must_use]
    pub fn failure(order_id: i64, request_index: usize, message: impl Into<String>) -> Self {
        Self {
            order_id,
            request_index,
            success: false,
            message: message.into(),
            trade_reference_id: None,
        }
    }
}

/// Aggregated response for one submission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmitResponse {
    /// How many orders the request asked to submit.
    pub total_requested: usize,
    /// How many were submitted.
    pub successful: usize,
    /// How many failed.
    pub failed: usize,
    /// Overall outcome.
    pub outcome: SubmissionOutcome,
    /// One result per requested order, in request order.
    pub results: Vec<OrderSubmitResult>,
}

impl BatchSubmitResponse {
    /// Aggregate per-order results into a batch response.
    ///
    /// `results` must already be index-aligned with the original request.
    #[must_use]
    pub fn from_results(results: Vec<OrderSubmitResult>) -> Self {
        let total_requested = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let failed = total_requested - successful;

        let outcome = if successful == total_requested && total_requested > 0 {
            SubmissionOutcome::Success
        } else if successful == 0 {
            SubmissionOutcome::Failure
        } else {
            SubmissionOutcome::Partial
        };

        Self {
            total_requested,
            successful,
            failed,
            outcome,
            results,
        }
    }

    /// Response for a request rejected before any order was examined.
    #[must_use]
    pub fn validation_failure() -> Self {
        Self {
            total_requested: 0,
            successful: 0,
            failed: 0,
            outcome: SubmissionOutcome::Failure,
            results: Vec::new(),
        }
    }
}
