//! Request-scoped connection management.
//!
//! - [`RequestContext`]: the per-request slot holding at most one connection
//! - [`CompletionInterceptor`]: ends the transaction and releases the connection
//!   exactly once, before the response is handed back
//! - [`ConnectionLifecycle`]: the pipeline stage tying the two together

pub mod context;
mod diagnostics;
pub mod interceptor;
pub mod lifecycle;

pub use context::{ConnectionHandle, RequestContext};
pub use interceptor::CompletionInterceptor;
pub use lifecycle::ConnectionLifecycle;
