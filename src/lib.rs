//! liveloop — live coding execution engine.
//!
//! A user edits source text while it runs; the engine hot-swaps to the new
//! code without losing continuity of output. Each session is one
//! [`LiveWorker`] on its own thread, owning one embedded execution context
//! (a [`GlicolContext`] interpreter session producing PCM, or a
//! [`ShaderContext`] compiling shader source) and one [`OutputSink`] with a
//! bounded-buffer backpressure protocol. Context failures become
//! [`WorkerEvent`]s on a channel the controller drains; they never crash
//! the host process.
//!
//! ```no_run
//! use liveloop::{GlicolContext, LiveWorker, RingSink};
//!
//! let (sink, _consumer) = RingSink::with_default_capacity();
//! let mut worker = LiveWorker::new(
//!     |unit: &liveloop::CodeUnit| GlicolContext::open(unit.name(), unit.source_text(), 44_100),
//!     sink,
//! );
//! worker.initialize("session", "out: sin 440")?;
//! worker.start()?;
//! worker.submit_code("out: sin 440 >> mul 0.5")?;
//! worker.terminate();
//! # Ok::<(), liveloop::WorkerError>(())
//! ```
//!
//! Known limit, kept by design: there is no timeout or preemption inside a
//! single `invoke`, so a misbehaving script can stall its worker thread
//! indefinitely. Termination takes effect between iterations only.

pub mod buffer;
pub mod code;
pub mod config;
pub mod context;
pub mod diagnostics;
pub mod messages;
pub mod sink;
pub mod worker;

pub use buffer::{OutputBuffer, AUDIO_BUFFER_BYTES, FRAMES_PER_BUFFER};
pub use code::CodeUnit;
pub use config::WorkerConfig;
pub use context::glicol::GlicolContext;
pub use context::shader::{ShaderBackend, ShaderContext};
pub use context::{Artifact, ExecutionContext, ExecutionOutcome, ProgramHandle};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use messages::{WorkerEvent, WorkerIdentity};
pub use sink::ring::RingSink;
pub use sink::{OutputSink, SinkError};
pub use worker::{LiveWorker, WorkerError, WorkerState, WorkerStats};

#[cfg(feature = "device")]
pub use sink::device::{open_default, DeviceStream};

#[cfg(feature = "glow")]
pub use context::glow_backend::GlowCompiler;
