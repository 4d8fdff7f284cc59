//! Routes served by the demo server.

use crate::db::DbPool;
use crate::error::DbResult;
use crate::scope::ConnectionLifecycle;
use crate::transport::middleware::{RequestConnection, connection_middleware};
use axum::{Json, Router, middleware, routing::get};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct VersionResponse {
    pub request_id: String,
    pub database: &'static str,
    pub server_version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub request_id: String,
    pub connection_attached: bool,
    pub transaction_active: bool,
}

/// Build the application router.
///
/// `/health` sits outside the connection middleware and never touches the pool.
pub fn router(lifecycle: Arc<ConnectionLifecycle<DbPool>>) -> Router {
    Router::new()
        .route("/version", get(version))
        .route("/status", get(status))
        .layer(middleware::from_fn_with_state(
            lifecycle,
            connection_middleware::<DbPool>,
        ))
        .route("/health", get(health))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn version(RequestConnection(ctx): RequestConnection) -> DbResult<Json<VersionResponse>> {
    let mut handle = ctx.connection().await?;
    let database = handle.connection().db_type().display_name();
    let server_version = handle.connection_mut().server_version().await?;

    Ok(Json(VersionResponse {
        request_id: ctx.request_id().to_string(),
        database,
        server_version,
    }))
}

async fn status(RequestConnection(ctx): RequestConnection) -> Json<StatusResponse> {
    Json(StatusResponse {
        request_id: ctx.request_id().to_string(),
        connection_attached: ctx.is_attached().await,
        transaction_active: ctx.transaction_active().await,
    })
}
