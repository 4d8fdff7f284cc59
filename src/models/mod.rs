//! Data models.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;

pub use connection::{ConnectionConfig, ConnectionConfigError, DatabaseType, TransactionOutcome};
