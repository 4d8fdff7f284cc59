//! Per-request connection holder.
//!
//! A [`RequestContext`] is created once per request and cloned into the places
//! that need it: the lifecycle middleware, its completion interceptor, and the
//! request extensions where handlers pick it up. Clones share one slot; nothing
//! is shared between requests.

use crate::db::PooledConnection;
use crate::error::{DbError, DbResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

/// A connection attached to a request, with its transaction state.
#[derive(Debug)]
pub struct ConnectionHandle<C> {
    connection: C,
    transaction_active: bool,
    rollback_only: bool,
    acquired_at: Instant,
}

impl<C: PooledConnection> ConnectionHandle<C> {
    pub(crate) fn new(connection: C) -> Self {
        Self {
            connection,
            transaction_active: false,
            rollback_only: false,
            acquired_at: Instant::now(),
        }
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// The live connection, for issuing queries inside the request.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// True between a successful `BEGIN` and the end of the request.
    pub fn transaction_active(&self) -> bool {
        self.transaction_active
    }

    /// Set after a handler ends the transaction itself, so completion does not
    /// issue a second `COMMIT`.
    pub fn set_transaction_active(&mut self, active: bool) {
        self.transaction_active = active;
    }

    /// Ask completion to `ROLLBACK` instead of `COMMIT`.
    pub fn mark_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Time since the connection was acquired.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    pub(crate) fn release(self) {
        self.connection.release();
    }
}

/// Slot holding at most one [`ConnectionHandle`] for the lifetime of a request.
pub struct RequestContext<C> {
    request_id: Arc<str>,
    slot: Arc<Mutex<Option<ConnectionHandle<C>>>>,
}

impl<C> Clone for RequestContext<C> {
    fn clone(&self) -> Self {
        Self {
            request_id: Arc::clone(&self.request_id),
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<C> std::fmt::Debug for RequestContext<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .finish_non_exhaustive()
    }
}

impl<C: PooledConnection> RequestContext<C> {
    pub fn new() -> Self {
        Self {
            request_id: generate_request_id().into(),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Identifier used to correlate this request's log lines.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub async fn is_attached(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Whether the attached connection has an open transaction. False when
    /// nothing is attached.
    pub async fn transaction_active(&self) -> bool {
        self.slot
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| handle.transaction_active)
    }

    /// Lock and borrow the attached connection.
    ///
    /// Hold the guard only while issuing queries; completion waits for it.
    pub async fn connection(&self) -> DbResult<MappedMutexGuard<'_, ConnectionHandle<C>>> {
        let guard = self.slot.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_mut()).map_err(|_| DbError::NoConnection)
    }

    /// Mark the attached transaction rollback-only. Returns false when there is
    /// no connection to mark.
    pub async fn mark_rollback_only(&self) -> bool {
        match self.slot.lock().await.as_mut() {
            Some(handle) => {
                handle.mark_rollback_only();
                true
            }
            None => false,
        }
    }

    /// Attach a handle. A rejected handle is given back so its connection can
    /// still be released.
    pub(crate) async fn attach(
        &self,
        handle: ConnectionHandle<C>,
    ) -> Result<(), ConnectionHandle<C>> {
        let mut slot = self.slot.lock().await;
        if slot.is_some() {
            return Err(handle);
        }
        *slot = Some(handle);
        Ok(())
    }

    /// Detach the handle, leaving the slot empty.
    pub(crate) async fn take(&self) -> Option<ConnectionHandle<C>> {
        self.slot.lock().await.take()
    }
}

impl<C: PooledConnection> Default for RequestContext<C> {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}
