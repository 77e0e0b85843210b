//! Driven ports - interfaces the submission pipeline calls out through.

pub mod order_store_port;
pub mod reconciliation_port;
pub mod trade_service_port;

pub use order_store_port::{OrderStorePort, StoreError, SubmissionConfirmation};
pub use reconciliation_port::{LoggingReconciliationHook, ReconciliationPort};
pub use trade_service_port::{
    BulkTradeRequest, BulkTradeResult, TradeBatchStatus, TradeOrderRequest, TradeOrderResult,
    TradeRequestBuildError, TradeServiceError, TradeServicePort,
};
