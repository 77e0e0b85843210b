//! HTTP request DTOs.

use serde::{Deserialize, Serialize};

/// Request to submit a batch of orders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBatchRequest {
    /// Order ids to submit, in the caller's chosen order. Results come back
    /// aligned with this list.
    pub order_ids: Vec<i64>,
}
