//! Lifecycle messages for one request.
//!
//! Every step is emitted as a `tracing` event carrying the request id, and
//! mirrored as a plain string to the optional [`LogSink`].

use crate::config::LogSink;
use tracing::{debug, warn};

#[derive(Clone)]
pub(crate) struct Diagnostics {
    sink: Option<LogSink>,
    request_id: String,
}

impl Diagnostics {
    pub(crate) fn new(sink: Option<LogSink>, request_id: impl Into<String>) -> Self {
        Self {
            sink,
            request_id: request_id.into(),
        }
    }

    pub(crate) fn log(&self, message: &str) {
        debug!(request_id = %self.request_id, "{}", message);
        self.emit(message);
    }

    /// Same as [`Diagnostics::log`], but at warn level.
    pub(crate) fn warn(&self, message: &str) {
        warn!(request_id = %self.request_id, "{}", message);
        self.emit(message);
    }

    fn emit(&self, message: &str) {
        if let Some(sink) = &self.sink {
            sink(message);
        }
    }
}
