//! Trade service adapters.

pub mod client;
pub mod config;

pub use client::HttpTradeServiceClient;
pub use config::TradeServiceConfig;
