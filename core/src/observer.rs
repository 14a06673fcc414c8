//! Observer capability interface for connection lifecycle events.
//!
//! # Design
//! Every method has a default body, so implementers override only the
//! events they care about. Defaults emit `tracing` trace events and
//! otherwise do nothing; with no subscriber installed they cost almost
//! nothing, and with one they give a verbosity-gated log of the
//! connection's lifecycle.

use crate::connection::PendingProcess;
use crate::error::ErrorKind;

/// Callbacks fired by a [`Connection`](crate::connection::Connection).
///
/// `connection_lost` / `connection_regained` fire exactly once per
/// connectivity transition, never on repeated identical outcomes.
/// `loading_started` / `loading_stopped` bracket every dispatch attempt;
/// `loading_stopped` always precedes outcome interpretation.
pub trait ConnectionObserver: Send + Sync {
    fn connection_lost(&self) {
        tracing::trace!("connection lost");
    }

    fn connection_regained(&self) {
        tracing::trace!("connection regained");
    }

    fn loading_started(&self) {
        tracing::trace!("loading started");
    }

    fn loading_stopped(&self) {
        tracing::trace!("loading stopped");
    }

    /// A response could not be used; `kind` says why. Fired for decode
    /// failures on the typed dispatch paths.
    fn error_encountered(&self, kind: ErrorKind) {
        tracing::trace!(%kind, "error encountered");
    }

    /// Gate before the success handler runs. Returning `false` drops the
    /// response silently: the handler is not invoked and no error is
    /// reported.
    fn response_is_valid(&self, _bytes: &[u8], _process: &PendingProcess) -> bool {
        true
    }
}
