//! axum integration for the connection lifecycle.
//!
//! ```ignore
//! let lifecycle = Arc::new(ConnectionLifecycle::connect(&config, options).await?);
//! let app = Router::new()
//!     .route("/orders", post(create_order))
//!     .layer(middleware::from_fn_with_state(lifecycle, connection_middleware::<DbPool>));
//! ```
//!
//! Handlers reach the request's connection through the [`RequestConnection`]
//! extractor.

use crate::config::CompletionPolicy;
use crate::db::{ConnectionPool, DbConnection, PooledConnection};
use crate::error::DbError;
use crate::scope::{ConnectionLifecycle, RequestContext};
use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::ops::Deref;
use std::sync::Arc;
use tracing::{debug, warn};

/// Middleware holding one pooled connection for the duration of a request.
///
/// Acquisition and `BEGIN` failures short-circuit into the error's JSON
/// response; downstream handlers are not called.
pub async fn connection_middleware<P: ConnectionPool>(
    State(lifecycle): State<Arc<ConnectionLifecycle<P>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let context = match request
        .extensions()
        .get::<RequestContext<P::Connection>>()
        .cloned()
    {
        Some(context) => context,
        None => {
            let context = RequestContext::new();
            request.extensions_mut().insert(context.clone());
            context
        }
    };

    let policy = lifecycle.options().completion;
    let downstream = context.clone();

    lifecycle
        .handle(&context, move |error| async move {
            if let Some(err) = error {
                warn!(
                    request_id = %downstream.request_id(),
                    error = %err,
                    retryable = err.is_retryable(),
                    "Request rejected before reaching handlers"
                );
                return err.into_response();
            }

            let response = next.run(request).await;

            let status = response.status();
            if policy == CompletionPolicy::RollbackOnErrorStatus
                && (status.is_client_error() || status.is_server_error())
                && downstream.mark_rollback_only().await
            {
                debug!(
                    request_id = %downstream.request_id(),
                    status = status.as_u16(),
                    "Error response, transaction marked rollback-only"
                );
            }
            response
        })
        .await
}

/// Extractor for the request's [`RequestContext`].
///
/// Rejects with [`DbError::MissingContext`] when the route is not behind
/// [`connection_middleware`].
#[derive(Debug)]
pub struct RequestConnection<C = DbConnection>(pub RequestContext<C>);

impl<C> Deref for RequestConnection<C> {
    type Target = RequestContext<C>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S, C> FromRequestParts<S> for RequestConnection<C>
where
    S: Send + Sync,
    C: PooledConnection,
{
    type Rejection = DbError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext<C>>()
            .cloned()
            .map(RequestConnection)
            .ok_or(DbError::MissingContext)
    }
}
