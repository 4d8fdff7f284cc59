//! Completion interceptor.
//!
//! Installed ahead of connection acquisition, the interceptor sits between the
//! downstream pipeline and the finished response. [`CompletionInterceptor::complete`]
//! ends any open transaction, releases the connection, and only then hands the
//! response back. It consumes the interceptor, so cleanup can run at most once.
//!
//! # Drop Behavior
//!
//! If the interceptor is dropped without `complete` being called (the request
//! future was cancelled, or a handler panicked), the `Drop` implementation
//! spawns a tokio task that rolls back any open transaction and releases the
//! connection. Outside a tokio runtime nothing runs and the pool reclaims the
//! connection when it is dropped.

use crate::db::PooledConnection;
use crate::models::TransactionOutcome;
use crate::scope::context::{ConnectionHandle, RequestContext};
use crate::scope::diagnostics::Diagnostics;
use tracing::{debug, warn};

pub struct CompletionInterceptor<C: PooledConnection> {
    context: RequestContext<C>,
    diagnostics: Diagnostics,
    armed: bool,
}

impl<C: PooledConnection> CompletionInterceptor<C> {
    pub(crate) fn install(context: RequestContext<C>, diagnostics: Diagnostics) -> Self {
        diagnostics.log("completion interceptor installed");
        Self {
            context,
            diagnostics,
            armed: true,
        }
    }

    /// Finish the request's connection, then return the payload unchanged.
    pub async fn complete<R>(self, payload: R) -> R {
        self.complete_with_outcome(payload).await.0
    }

    /// Like [`CompletionInterceptor::complete`], also reporting how the
    /// transaction ended.
    pub async fn complete_with_outcome<R>(mut self, payload: R) -> (R, TransactionOutcome) {
        self.armed = false;
        self.diagnostics.log("completion called");

        let Some(handle) = self.context.take().await else {
            self.diagnostics.log("no connection attached, completing");
            return (payload, TransactionOutcome::None);
        };

        let outcome = finish(handle, &self.diagnostics).await;
        (payload, outcome)
    }
}

impl<C: PooledConnection> Drop for CompletionInterceptor<C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let context = self.context.clone();
        let diagnostics = self.diagnostics.clone();
        runtime.spawn(async move {
            let Some(mut handle) = context.take().await else {
                return;
            };
            diagnostics.warn("request dropped before completion, releasing connection");
            if handle.transaction_active() {
                handle.mark_rollback_only();
            }
            let outcome = finish(handle, &diagnostics).await;
            warn!(
                request_id = %context.request_id(),
                outcome = ?outcome,
                "Connection released via Drop"
            );
        });
    }
}

/// End the transaction if one is open, then release the connection.
async fn finish<C: PooledConnection>(
    mut handle: ConnectionHandle<C>,
    diagnostics: &Diagnostics,
) -> TransactionOutcome {
    let outcome = if handle.transaction_active() {
        end_transaction(&mut handle, diagnostics).await
    } else {
        diagnostics.log("no transaction in progress");
        TransactionOutcome::None
    };

    diagnostics.log("releasing connection, completing");
    debug!(
        held_ms = handle.held_for().as_millis() as u64,
        outcome = ?outcome,
        "Releasing request connection"
    );
    handle.release();
    outcome
}

/// Best effort: a failed COMMIT/ROLLBACK is logged and never fails the response.
async fn end_transaction<C: PooledConnection>(
    handle: &mut ConnectionHandle<C>,
    diagnostics: &Diagnostics,
) -> TransactionOutcome {
    let (statement, ended) = if handle.is_rollback_only() {
        ("ROLLBACK", TransactionOutcome::RolledBack)
    } else {
        ("COMMIT", TransactionOutcome::Committed)
    };

    diagnostics.log(&format!("calling {statement} on the current transaction"));
    let result = handle.connection_mut().execute(statement).await;
    handle.set_transaction_active(false);

    let outcome = match result {
        Ok(()) => ended,
        Err(e) => {
            diagnostics.warn(&format!("error when calling {statement}: {e}"));
            TransactionOutcome::Failed
        }
    };
    diagnostics.log("transaction finished");
    outcome
}
