//! The logging collaborator errors are reported to.

use crate::events::EmitterId;

/// Sink for problems the bus recovers from on its own: failed state
/// fetches and attempts to dispose the default emitter.
pub trait ErrorLog: Send + Sync {
    fn error(&self, message: &str);
}

/// [`ErrorLog`] that forwards to `tracing::error!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorLog;

impl ErrorLog for TracingErrorLog {
    fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }
}

/// Report a problem tagged with the emitter it happened in.
pub(crate) fn report(log: &dyn ErrorLog, emitter: &EmitterId, message: &str) {
    log.error(&format!("Problem encountered in emitter {emitter}: {message}"));
}
