//! Embedded execution contexts.
//!
//! A context wraps one persistent interpreter or compiler session. Two
//! variants share the same contract: [`glicol::GlicolContext`] executes a
//! live-coding patch and synthesizes PCM buffers; [`shader::ShaderContext`]
//! compiles shader source into a program object and aggregates compiler
//! diagnostics. Opening is a per-variant constructor (`open`); everything
//! after that goes through [`ExecutionContext`].

pub mod glicol;
pub mod runtime;
pub mod shader;

#[cfg(feature = "glow")]
pub mod glow_backend;

use crate::buffer::OutputBuffer;
use crate::diagnostics::Diagnostic;

/// Opaque handle to a compiled program object owned by a shader backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHandle(pub u32);

/// What one successful execution attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// A buffer of output bytes ready for the sink.
    Buffer(OutputBuffer),
    /// A compiled program object; the presenter draws with it, nothing is
    /// pushed to the sink.
    Program(ProgramHandle),
}

/// Result of one `invoke`. Exactly one variant per attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Produced(Artifact),
    Failed(Diagnostic),
    /// The session ended on its own; the worker stops without an error.
    Aborted,
}

/// One interpreter/compiler session.
///
/// The session is exclusively owned by one worker thread; at most one
/// execution attempt is ever in flight. A failed `invoke` must leave the
/// session usable for the next `invoke` (non-fatal isolation), whereas a
/// failed `reload` is fatal to that attempt and surfaces immediately.
pub trait ExecutionContext {
    /// Human-readable identifier bound at `open`.
    fn name(&self) -> &str;

    /// Execute one unit of work against the session.
    ///
    /// There is no cancellation point inside a single call: user code runs
    /// unbounded, and termination takes effect only between iterations.
    fn invoke(&mut self) -> ExecutionOutcome;

    /// Replace the session's active source without destroying accumulated
    /// session state. Subsequent `invoke` calls observe the new code.
    fn reload(&mut self, code: &str) -> Result<(), Diagnostic>;

    /// Release the session. Native resources are also released if the
    /// context is dropped without an explicit close.
    fn close(self)
    where
        Self: Sized,
    {
    }
}
