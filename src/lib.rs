//! Request-scoped database connections.
//!
//! Each request passing through the connection middleware gets one pooled
//! connection (optionally inside a transaction) for its whole lifetime. Before
//! the response is handed back, the transaction is committed and the connection
//! is returned to the pool, exactly once.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod scope;
pub mod transport;

pub use config::{CompletionPolicy, Config, LifecycleOptions};
pub use db::{ConnectionPool, DbConnection, DbPool, PooledConnection};
pub use error::{DbError, DbResult};
pub use scope::{ConnectionLifecycle, RequestContext};
pub use transport::{RequestConnection, connection_middleware};
