//! Configuration structs with serde defaults.

pub mod database;
pub mod server;

pub use database::DatabaseConfig;
pub use server::ServerConfig;
