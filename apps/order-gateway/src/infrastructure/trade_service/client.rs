//! HTTP client for the trade service's bulk submission endpoint.
//!
//! The response status line is classified before the body is touched: 4xx is
//! a request-shape defect, 5xx a service-side fault, and anything that fails
//! to decode a malformed reply. A decoded body whose top-level status is
//! neither `COMPLETE` nor `PARTIAL` is treated as a whole-batch rejection.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::ports::{
    BulkTradeRequest, BulkTradeResult, TradeBatchStatus, TradeOrderResult, TradeServiceError,
    TradeServicePort,
};

use super::config::TradeServiceConfig;

/// Wire shape of the bulk reply. The status arrives as free text so an
/// unrecognized value can be surfaced as a batch rejection instead of a
/// decode failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkReplyWire {
    status: String,
    #[serde(default)]
    total_requested: usize,
    #[serde(default)]
    successful: usize,
    #[serde(default)]
    failed: usize,
    #[serde(default)]
    results: Vec<TradeOrderResult>,
}

/// `reqwest`-based implementation of `TradeServicePort`.
#[derive(Debug, Clone)]
pub struct HttpTradeServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTradeServiceClient {
    /// Build a client with bounded connect and request timeouts.
    pub fn new(config: &TradeServiceConfig) -> Result<Self, TradeServiceError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(std::time::Duration::from_millis(config.connect_timeout_ms))
            .build()
            .map_err(|e| TradeServiceError::Network {
                message: format!("failed to build http client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl TradeServicePort for HttpTradeServiceClient {
    async fn submit_bulk(
        &self,
        request: BulkTradeRequest,
    ) -> Result<BulkTradeResult, TradeServiceError> {
        let url = format!("{}/v1/trades/bulk", self.base_url);
        let idempotency_key = Uuid::new_v4();

        debug!(
            url = %url,
            trades = request.trades.len(),
            idempotency_key = %idempotency_key,
            "submitting bulk trade request"
        );

        let response = self
            .http
            .post(&url)
            .header("Idempotency-Key", idempotency_key.to_string())
            .json(&request)
            .send()
            .await
            .map_err(|e| TradeServiceError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "trade service rejected request");
            return Err(TradeServiceError::BadRequest { message: body });
        }
        if status.is_server_error() {
            warn!(status = status.as_u16(), "trade service server error");
            return Err(TradeServiceError::ServerError {
                status: status.as_u16(),
            });
        }

        let wire: BulkReplyWire =
            response
                .json()
                .await
                .map_err(|e| TradeServiceError::MalformedReply {
                    message: e.to_string(),
                })?;

        let batch_status = match wire.status.as_str() {
            "COMPLETE" => TradeBatchStatus::Complete,
            "PARTIAL" => TradeBatchStatus::Partial,
            other => {
                warn!(status = %other, "trade service rejected batch");
                return Err(TradeServiceError::BatchRejected {
                    status: other.to_string(),
                });
            }
        };

        debug!(
            successful = wire.successful,
            failed = wire.failed,
            "bulk trade reply received"
        );

        Ok(BulkTradeResult {
            status: batch_status,
            total_requested: wire.total_requested,
            successful: wire.successful,
            failed: wire.failed,
            results: wire.results,
        })
    }
}
