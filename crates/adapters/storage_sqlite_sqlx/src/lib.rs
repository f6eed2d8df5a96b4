//! # thingrules-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the `RuleStore` port defined in `thingrules-app::ports`
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Store rule documents as JSON text, untouched; parsing and legacy
//!   migration happen in the engine
//!
//! ## Dependency rule
//! Depends on `thingrules-app` (for port traits) and `thingrules-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

pub mod error;
pub mod pool;
pub mod rule_store;

pub use pool::{Config, Database};
pub use rule_store::SqliteRuleStore;
