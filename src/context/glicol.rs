//! Interpreter-variant execution context backed by the Glicol engine.
//!
//! One [`GlicolContext`] owns one persistent Glicol session. Each `invoke`
//! synthesizes a 128-frame block from session-global state and packs it as
//! interleaved stereo 16-bit PCM. Hot-swapping goes through the engine's
//! own code diffing, so accumulated node state survives a `reload`.

use glicol::Engine;

use crate::buffer::{sample_to_i16, OutputBuffer, CHANNELS, FRAMES_PER_BUFFER};
use crate::context::runtime::RuntimeGuard;
use crate::context::{Artifact, ExecutionContext, ExecutionOutcome};
use crate::diagnostics::Diagnostic;

/// A persistent Glicol interpreter session.
pub struct GlicolContext {
    name: String,
    engine: Engine<FRAMES_PER_BUFFER>,
    /// The standalone engine feeds silence into `~input`.
    silence: [f32; FRAMES_PER_BUFFER],
    _runtime: RuntimeGuard,
}

impl std::fmt::Debug for GlicolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlicolContext")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl GlicolContext {
    /// Create the session and load `code` into it.
    ///
    /// Fails with `EmptySource` before touching the engine, or with
    /// `LoadFailure` when the initial code does not parse.
    pub fn open(name: &str, code: &str, sample_rate: u32) -> Result<Self, Diagnostic> {
        if code.trim().is_empty() {
            return Err(Diagnostic::empty_source());
        }

        let runtime = RuntimeGuard::acquire();
        let mut engine = Engine::<FRAMES_PER_BUFFER>::new();
        engine.set_sr(sample_rate as usize);
        engine.set_bpm(120.0);
        engine.update_with_code(code);

        let mut ctx = Self {
            name: name.to_string(),
            engine,
            silence: [0.0; FRAMES_PER_BUFFER],
            _runtime: runtime,
        };

        // The engine reports parse failures on the next processed block, so
        // run one probe block to surface them at open time.
        let (_, console) = ctx.engine.next_block(vec![&ctx.silence[..]]);
        if let Some(message) = console_error(&console) {
            return Err(Diagnostic::load_failure(message, None));
        }

        tracing::debug!(name = %ctx.name, sample_rate, "glicol session opened");
        Ok(ctx)
    }

    fn interleave(buffers: &[impl std::ops::Deref<Target = [f32]>]) -> OutputBuffer {
        let mut samples = [0i16; FRAMES_PER_BUFFER * CHANNELS];
        if !buffers.is_empty() {
            let left: &[f32] = &buffers[0];
            // Mono engines duplicate the single channel.
            let right: &[f32] = if buffers.len() > 1 {
                &buffers[1]
            } else {
                &buffers[0]
            };
            for i in 0..FRAMES_PER_BUFFER.min(left.len()) {
                samples[i * 2] = sample_to_i16(left[i]);
            }
            for i in 0..FRAMES_PER_BUFFER.min(right.len()) {
                samples[i * 2 + 1] = sample_to_i16(right[i]);
            }
        }
        OutputBuffer::from_interleaved_i16(&samples)
    }
}

impl ExecutionContext for GlicolContext {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&mut self) -> ExecutionOutcome {
        let (buffers, console) = self.engine.next_block(vec![&self.silence[..]]);
        if let Some(message) = console_error(&console) {
            // The engine keeps the last good graph, so the session stays
            // usable for the next invoke.
            return ExecutionOutcome::Failed(Diagnostic::runtime_failure(message));
        }
        ExecutionOutcome::Produced(Artifact::Buffer(Self::interleave(&buffers)))
    }

    fn reload(&mut self, code: &str) -> Result<(), Diagnostic> {
        if code.trim().is_empty() {
            return Err(Diagnostic::empty_source());
        }
        // Parse failures surface on the next invoke; until then the old
        // graph keeps running, which is what a live session wants mid-edit.
        self.engine.update_with_code(code);
        tracing::debug!(name = %self.name, "glicol code swapped");
        Ok(())
    }
}

/// Decode the engine's per-block error console.
///
/// Byte 0 is the error flag, byte 1 the error type, the NUL-terminated
/// message follows.
fn console_error(console: &[u8]) -> Option<String> {
    if console.first().copied().unwrap_or(0) == 0 {
        return None;
    }
    let body = console.get(2..).unwrap_or(&[]);
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    let message = String::from_utf8_lossy(&body[..end]).trim().to_string();
    if message.is_empty() {
        Some("Glicol reported an error without a message.".to_string())
    } else {
        Some(message)
    }
}
