//! Events from a worker thread to its controller.

use crate::diagnostics::Diagnostic;

/// Identifies which worker an event came from. Controllers that own several
/// concurrent live-coding sessions key their reactions on this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub id: u64,
    pub name: String,
}

/// Messages from a worker to its controller, delivered asynchronously over
/// a channel drained by the controller's own event loop.
///
/// Per worker lifetime: any number of `Error` events (the interpreter
/// variant can fail repeatedly while staying alive), at most one `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The worker reached `Finished` through a normal, user-requested stop.
    Done {
        worker: WorkerIdentity,
        last_output: String,
    },
    /// One failure report from `open`, `reload`, `invoke`, or the sink.
    Error {
        worker: WorkerIdentity,
        diagnostic: Diagnostic,
    },
}

impl WorkerEvent {
    pub fn worker(&self) -> &WorkerIdentity {
        match self {
            WorkerEvent::Done { worker, .. } => worker,
            WorkerEvent::Error { worker, .. } => worker,
        }
    }
}
