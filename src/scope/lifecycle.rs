//! Per-request connection lifecycle.
//!
//! [`ConnectionLifecycle::handle`] is the pipeline stage: it installs the
//! completion interceptor, acquires a connection, optionally starts a
//! transaction, then advances the pipeline through `proceed`. Whatever the
//! pipeline produces goes back through the interceptor before it is returned.
//!
//! `proceed` receives `Some(error)` when acquisition or `BEGIN` failed; that is
//! the pipeline's error channel. Each step is awaited in order, so downstream
//! work never starts before the connection (and its transaction) is ready.

use crate::config::LifecycleOptions;
use crate::db::{ConnectionPool, DbPool, PooledConnection};
use crate::error::{DbError, DbResult};
use crate::models::ConnectionConfig;
use crate::scope::context::{ConnectionHandle, RequestContext};
use crate::scope::diagnostics::Diagnostics;
use crate::scope::interceptor::CompletionInterceptor;
use std::future::Future;

pub struct ConnectionLifecycle<P: ConnectionPool> {
    pool: P,
    options: LifecycleOptions,
}

impl<P: ConnectionPool> ConnectionLifecycle<P> {
    pub fn new(pool: P, options: LifecycleOptions) -> Self {
        Self { pool, options }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    /// Run one request through the connection lifecycle.
    ///
    /// If `context` already holds a connection (an outer stage acquired it),
    /// this calls `proceed(None)` and does nothing else.
    pub async fn handle<R, F, Fut>(&self, context: &RequestContext<P::Connection>, proceed: F) -> R
    where
        F: FnOnce(Option<DbError>) -> Fut,
        Fut: Future<Output = R>,
    {
        let diagnostics = Diagnostics::new(self.options.log.clone(), context.request_id());
        diagnostics.log("entry");

        if context.is_attached().await {
            diagnostics.log("connection already attached");
            return proceed(None).await;
        }

        let interceptor = CompletionInterceptor::install(context.clone(), diagnostics.clone());
        let error = self.open(context, &diagnostics).await.err();
        let payload = proceed(error).await;
        interceptor.complete(payload).await
    }

    /// Acquire and attach a connection, starting a transaction when configured.
    async fn open(
        &self,
        context: &RequestContext<P::Connection>,
        diagnostics: &Diagnostics,
    ) -> DbResult<()> {
        diagnostics.log("getting new connection");
        let connection = match self.pool.acquire().await {
            Ok(connection) => connection,
            Err(e) => {
                diagnostics.log(&format!("error when getting new connection: {e}"));
                return Err(e);
            }
        };
        diagnostics.log("got connection");

        if let Err(rejected) = context.attach(ConnectionHandle::new(connection)).await {
            rejected.release();
            return Err(DbError::AlreadyAttached);
        }

        if !self.options.transaction {
            diagnostics.log("no transaction needed");
            return Ok(());
        }

        diagnostics.log("starting transaction");
        let begin = {
            let mut handle = context.connection().await?;
            // Marked before the await: if the request is dropped while BEGIN is
            // in flight, the drop fallback must still roll back.
            handle.set_transaction_active(true);
            let result = handle.connection_mut().execute("BEGIN").await;
            if result.is_err() {
                handle.set_transaction_active(false);
            }
            result
        };

        match begin {
            Ok(()) => {
                diagnostics.log("transaction started");
                Ok(())
            }
            Err(e) => {
                diagnostics.log(&format!("error when starting transaction: {e}"));
                // Downstream must not see a connection that is back in the pool.
                if let Some(handle) = context.take().await {
                    handle.release();
                }
                Err(DbError::transaction("BEGIN", e.to_string()))
            }
        }
    }
}

impl ConnectionLifecycle<DbPool> {
    /// Build the sqlx pool described by `config` and wrap it.
    pub async fn connect(config: &ConnectionConfig, options: LifecycleOptions) -> DbResult<Self> {
        let pool = DbPool::connect(config).await?;
        Ok(Self::new(pool, options))
    }
}

impl<P: ConnectionPool> std::fmt::Debug for ConnectionLifecycle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLifecycle")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
