//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The pool/connection traits the request lifecycle is written against
//! - The sqlx-backed pool for MySQL, PostgreSQL and SQLite
//! - Database dispatch macros for reducing code duplication

#[macro_use]
pub mod macros;
pub mod pool;

pub use pool::{ConnectionPool, DbConnection, DbPool, PooledConnection};
