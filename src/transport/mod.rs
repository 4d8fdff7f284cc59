//! HTTP layer.
//!
//! - [`middleware`]: the axum middleware and extractor that plug the connection
//!   lifecycle into any router
//! - [`routes`] and [`http`]: the demo server built on top of them

pub mod http;
pub mod middleware;
pub mod routes;

pub use http::HttpTransport;
pub use middleware::{RequestConnection, connection_middleware};
