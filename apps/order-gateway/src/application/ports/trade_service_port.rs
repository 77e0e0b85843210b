//! Trade Service Port (Driven Port)
//!
//! One bulk call per batch. Every item carries its request index so the
//! reply can be re-aligned with the request even if the service reorders or
//! omits entries.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::OrderRecord;

/// Request item for one order, positioned by request index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOrderRequest {
    /// Zero-based position in the submission request.
    pub request_index: usize,
    /// Owning portfolio.
    pub portfolio_id: String,
    /// Pricing mode, `MARKET` or `LIMIT`.
    pub order_type: String,
    /// Traded security.
    pub security_id: String,
    /// Quantity.
    pub quantity: Decimal,
    /// Limit price for limit orders.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    /// When the order was placed.
    pub order_timestamp: DateTime<Utc>,
    /// Owning blotter.
    pub blotter_id: i64,
}

/// Programming-error guard raised when a required field is missing at
/// build time. Eligibility filtering has already run by then, so hitting
/// this means a bug upstream, not a bad order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TradeRequestBuildError {
    /// Portfolio id is blank.
    #[error("order {order_id}: portfolio id is required")]
    MissingPortfolioId {
        /// The offending order.
        order_id: i64,
    },

    /// Security id is blank.
    #[error("order {order_id}: security id is required")]
    MissingSecurityId {
        /// The offending order.
        order_id: i64,
    },

    /// Quantity is not positive.
    #[error("order {order_id}: positive quantity is required")]
    MissingQuantity {
        /// The offending order.
        order_id: i64,
    },

    /// Order timestamp is missing.
    #[error("order {order_id}: order timestamp is required")]
    MissingTimestamp {
        /// The offending order.
        order_id: i64,
    },
}

impl TradeOrderRequest {
    /// Build the outbound item for an order.
    pub fn from_order(
        order: &OrderRecord,
        request_index: usize,
    ) -> Result<Self, TradeRequestBuildError> {
        if order.portfolio_id.trim().is_empty() {
            return Err(TradeRequestBuildError::MissingPortfolioId { order_id: order.id });
        }
        if order.security_id.trim().is_empty() {
            return Err(TradeRequestBuildError::MissingSecurityId { order_id: order.id });
        }
        if order.quantity <= Decimal::ZERO {
            return Err(TradeRequestBuildError::MissingQuantity { order_id: order.id });
        }
        let order_timestamp = order
            .order_timestamp
            .ok_or(TradeRequestBuildError::MissingTimestamp { order_id: order.id })?;

        Ok(Self {
            request_index,
            portfolio_id: order.portfolio_id.clone(),
            order_type: order.order_type.as_str().to_string(),
            security_id: order.security_id.clone(),
            quantity: order.quantity,
            limit_price: order.limit_price,
            order_timestamp,
            blotter_id: order.blotter_id,
        })
    }
}

/// One outbound bulk submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTradeRequest {
    /// Ordered per-order items.
    pub trades: Vec<TradeOrderRequest>,
}

/// Top-level status of a structurally complete bulk reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeBatchStatus {
    /// Every item succeeded.
    Complete,
    /// Items succeeded and failed.
    Partial,
}

/// Per-item reply from the trade service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeOrderResult {
    /// Echoed request index.
    pub request_index: usize,
    /// Whether this item was accepted.
    pub success: bool,
    /// Confirmed trade reference on success.
    pub trade_reference_id: Option<i64>,
    /// Service-side reason on failure.
    pub message: Option<String>,
}

/// Structurally complete bulk reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTradeResult {
    /// Top-level status.
    pub status: TradeBatchStatus,
    /// Items the service claims to have received.
    pub total_requested: usize,
    /// Items accepted.
    pub successful: usize,
    /// Items rejected.
    pub failed: usize,
    /// Per-item results; may be reordered or incomplete.
    pub results: Vec<TradeOrderResult>,
}

impl BulkTradeResult {
    /// Index the reply by request index. The service is never trusted to
    /// return one result per input; callers synthesize failures for holes.
    /// On duplicate indices the first result wins.
    #[must_use]
    pub fn by_request_index(self) -> HashMap<usize, TradeOrderResult> {
        let mut map = HashMap::with_capacity(self.results.len());
        for result in self.results {
            map.entry(result.request_index).or_insert(result);
        }
        map
    }
}

/// Structural failure of the bulk call itself, as opposed to a per-item
/// failure returned inside a successful call. Every order that was part of
/// the call fails with the same diagnostic.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TradeServiceError {
    /// The service refused the request shape (4xx).
    #[error("trade service rejected the request: {message}")]
    BadRequest {
        /// Service-provided detail.
        message: String,
    },

    /// The service failed internally (5xx).
    #[error("trade service server error (status {status})")]
    ServerError {
        /// HTTP status code.
        status: u16,
    },

    /// The service could not be reached.
    #[error("trade service unreachable: {message}")]
    Network {
        /// Transport-level detail.
        message: String,
    },

    /// The reply body could not be decoded.
    #[error("malformed trade service reply: {message}")]
    MalformedReply {
        /// Decode failure detail.
        message: String,
    },

    /// The service reported a top-level non-success status.
    #[error("trade service rejected the batch: {status}")]
    BatchRejected {
        /// The reported status.
        status: String,
    },
}

/// Port for the trade service's bulk submission endpoint.
#[async_trait]
pub trait TradeServicePort: Send + Sync {
    /// Issue exactly one bulk submission call.
    async fn submit_bulk(
        &self,
        request: BulkTradeRequest,
    ) -> Result<BulkTradeResult, TradeServiceError>;
}
