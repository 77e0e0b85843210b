//! Infrastructure adapters - HTTP surface, order store, trade service.

pub mod http;
pub mod persistence;
pub mod trade_service;
