//! Database module for authflow
//!
//! Storage traits used by the auth flows, plus a PostgreSQL implementation
//! (SQLx) and a process-local one.

pub mod memory;
pub mod models;
pub mod pool;
pub mod postgres;
pub mod store;

// Re-export commonly used items
pub use memory::MemoryStore;
pub use models::*;
pub use pool::{DbConfig, DbError, create_pool, create_pool_with_migrations};
pub use postgres::PgStore;
pub use store::{AuthStore, CredentialStore, StoreError, TokenStore};

// Re-export sqlx types that might be needed
pub use sqlx::PgPool;
