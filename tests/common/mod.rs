//! Shared test helpers: a pool that records every driver call.

#![allow(dead_code)]

use db_request_scope::config::LifecycleOptions;
use db_request_scope::db::{ConnectionPool, PooledConnection};
use db_request_scope::error::{DbError, DbResult};
use db_request_scope::scope::ConnectionLifecycle;
use std::sync::{Arc, Mutex};

/// Ordered record of acquire/execute/release calls across all connections.
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }
}

/// Which driver calls should fail.
#[derive(Clone, Copy, Default)]
pub struct Failures {
    pub acquire: bool,
    pub begin: bool,
    /// `BEGIN` reaches the server but its reply never arrives.
    pub begin_hangs: bool,
    pub commit: bool,
}

#[derive(Clone, Default)]
pub struct RecordingPool {
    pub log: EventLog,
    pub failures: Failures,
}

pub struct RecordingConnection {
    log: EventLog,
    failures: Failures,
}

impl RecordingPool {
    pub fn new(failures: Failures) -> Self {
        Self {
            log: EventLog::default(),
            failures,
        }
    }
}

impl ConnectionPool for RecordingPool {
    type Connection = RecordingConnection;

    async fn acquire(&self) -> DbResult<RecordingConnection> {
        self.log.push("acquire");
        if self.failures.acquire {
            return Err(DbError::connection(
                "too many connections",
                "Raise max_connections",
            ));
        }
        Ok(RecordingConnection {
            log: self.log.clone(),
            failures: self.failures,
        })
    }
}

impl PooledConnection for RecordingConnection {
    async fn execute(&mut self, sql: &str) -> DbResult<()> {
        self.log.push(sql);
        match sql {
            "BEGIN" if self.failures.begin_hangs => std::future::pending().await,
            "BEGIN" if self.failures.begin => Err(DbError::database(
                "cannot start a transaction within a transaction",
                None,
                "Check for an open transaction",
            )),
            "COMMIT" if self.failures.commit => Err(DbError::database(
                "deferred constraint violated",
                Some("23503".to_string()),
                "Check foreign keys",
            )),
            _ => Ok(()),
        }
    }

    fn release(self) {
        self.log.push("release");
    }
}

/// Messages delivered to a lifecycle log sink.
#[derive(Clone, Default)]
pub struct SinkMessages(Arc<Mutex<Vec<String>>>);

impl SinkMessages {
    pub fn messages(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.lock().unwrap().iter().any(|m| m.contains(needle))
    }
}

/// Build a lifecycle over a recording pool, with a sink capturing its messages.
pub fn recording_lifecycle(
    transaction: bool,
    failures: Failures,
) -> (ConnectionLifecycle<RecordingPool>, EventLog, SinkMessages) {
    let pool = RecordingPool::new(failures);
    let log = pool.log.clone();
    let sink = SinkMessages::default();
    let sink_messages = sink.clone();
    let options = LifecycleOptions::new()
        .with_transaction(transaction)
        .with_log(move |message| sink_messages.0.lock().unwrap().push(message.to_string()));
    (ConnectionLifecycle::new(pool, options), log, sink)
}
