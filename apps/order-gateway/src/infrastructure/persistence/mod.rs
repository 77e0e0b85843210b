//! Order store adapters.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryOrderStore;
pub use sqlite::SqliteOrderStore;
