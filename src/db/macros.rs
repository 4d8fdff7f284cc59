//! Database dispatch macros for reducing code duplication.
//!
//! This module provides declarative macros that generate database-specific
//! match arms while maintaining linear readability. The macros expand at
//! compile time with zero runtime overhead.

/// Macro for generating database dispatch match arms.
///
/// Works for any enum in [`crate::db::pool`] whose variants are named
/// `MySql`, `Postgres` and `SQLite` (`DbPool`, `DbConnection`).
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(DbConnection, conn, {
///     MySql(c) => do_mysql(c),
///     Postgres(c) => do_postgres(c),
///     SQLite(c) => do_sqlite(c),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($ty:ident, $value:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $crate::db::pool::$ty::$variant($p) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
