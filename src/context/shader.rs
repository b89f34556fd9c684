//! Shader-compiler execution context.
//!
//! The GPU side is consumed through [`ShaderBackend`], a narrow compile
//! interface the host implements on top of its own rendering context (see
//! `glow_backend` for an OpenGL-backed one). [`ShaderContext`] owns the
//! current source and the last good program, recompiles on `invoke` after a
//! swap, and folds the compiler's info log into one aggregated diagnostic —
//! every reported error line is kept, never just the first.

use crate::context::{Artifact, ExecutionContext, ExecutionOutcome, ProgramHandle};
use crate::diagnostics::Diagnostic;

/// Narrow boundary to the host's shader compiler.
pub trait ShaderBackend {
    /// Compile and link `source` into a program object.
    ///
    /// `Err` carries the raw, possibly multi-line compiler info log.
    fn compile(&mut self, source: &str) -> Result<ProgramHandle, String>;

    /// Release a program produced by an earlier `compile`.
    fn release(&mut self, program: ProgramHandle) {
        let _ = program;
    }
}

/// A shader-compiler session over a [`ShaderBackend`].
pub struct ShaderContext<B: ShaderBackend> {
    name: String,
    backend: B,
    source: String,
    program: Option<ProgramHandle>,
    dirty: bool,
}

impl<B: ShaderBackend> std::fmt::Debug for ShaderContext<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderContext")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<B: ShaderBackend> ShaderContext<B> {
    /// Create the session and compile the initial source.
    ///
    /// A non-compiling initial source fails fast here; mid-session compile
    /// failures are `invoke`-time failures so the user can keep editing.
    pub fn open(name: &str, code: &str, mut backend: B) -> Result<Self, Diagnostic> {
        if code.trim().is_empty() {
            return Err(Diagnostic::empty_source());
        }
        let program = backend
            .compile(code)
            .map_err(|log| parse_info_log(&log))?;
        tracing::debug!(name, "shader session opened");
        Ok(Self {
            name: name.to_string(),
            backend,
            source: code.to_string(),
            program: Some(program),
            dirty: false,
        })
    }

    /// The program currently used for drawing, if any compile succeeded.
    pub fn current_program(&self) -> Option<ProgramHandle> {
        self.program
    }
}

impl<B: ShaderBackend> ExecutionContext for ShaderContext<B> {
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&mut self) -> ExecutionOutcome {
        if self.dirty {
            self.dirty = false;
            match self.backend.compile(&self.source) {
                Ok(program) => {
                    if let Some(old) = self.program.replace(program) {
                        self.backend.release(old);
                    }
                }
                Err(log) => {
                    // The last good program stays current; failure while
                    // editing is expected and must not stop the session.
                    return ExecutionOutcome::Failed(parse_info_log(&log));
                }
            }
        }
        match self.program {
            Some(program) => ExecutionOutcome::Produced(Artifact::Program(program)),
            None => ExecutionOutcome::Aborted,
        }
    }

    fn reload(&mut self, code: &str) -> Result<(), Diagnostic> {
        if code.trim().is_empty() {
            return Err(Diagnostic::empty_source());
        }
        self.source = code.to_string();
        self.dirty = true;
        tracing::debug!(name = %self.name, "shader source swapped");
        Ok(())
    }
}

impl<B: ShaderBackend> Drop for ShaderContext<B> {
    fn drop(&mut self) {
        if let Some(program) = self.program.take() {
            self.backend.release(program);
        }
    }
}

/// Aggregate a compiler info log into one diagnostic.
///
/// Keeps every non-empty log line in order, newline-joined, and tags the
/// diagnostic with the first line number the log attributes an error to.
pub fn parse_info_log(log: &str) -> Diagnostic {
    let mut lines = Vec::new();
    let mut first_line = None;
    for raw in log.lines() {
        let line = raw.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if first_line.is_none() {
            first_line = extract_line_number(line);
        }
        lines.push(line.to_string());
    }
    if lines.is_empty() {
        lines.push("Shader compilation failed with an empty log.".to_string());
    }
    Diagnostic::load_failure(lines.join("\n"), first_line)
}

/// Pull the source line out of one log line.
///
/// Understands `ERROR: <file>:<line>: message` (GLSL reference compiler,
/// most desktop drivers) and the `<file>:<line>(<col>): error:` form Mesa
/// emits.
fn extract_line_number(line: &str) -> Option<u32> {
    let rest = line
        .strip_prefix("ERROR:")
        .or_else(|| line.strip_prefix("WARNING:"))
        .unwrap_or(line)
        .trim_start();

    let mut fields = rest.splitn(3, ':');
    let file = fields.next()?.trim();
    let line_field = fields.next()?.trim();

    if file.is_empty() || !file.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let digits: String = line_field
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend that fails any source containing "bad" and hands out
    /// sequential program ids otherwise.
    struct MockBackend {
        next_id: u32,
        log: String,
        released: Vec<ProgramHandle>,
    }

    impl MockBackend {
        fn new(log: &str) -> Self {
            Self {
                next_id: 1,
                log: log.to_string(),
                released: Vec::new(),
            }
        }
    }

    impl ShaderBackend for MockBackend {
        fn compile(&mut self, source: &str) -> Result<ProgramHandle, String> {
            if source.contains("bad") {
                Err(self.log.clone())
            } else {
                let id = self.next_id;
                self.next_id += 1;
                Ok(ProgramHandle(id))
            }
        }

        fn release(&mut self, program: ProgramHandle) {
            self.released.push(program);
        }
    }

    const TWO_ERROR_LOG: &str = "ERROR: 0:1: '' :  #version required and missing.\nERROR: 0:4: 'This' : syntax error syntax error\n";

    #[test]
    fn info_log_keeps_every_error_line() {
        let diag = parse_info_log(TWO_ERROR_LOG);
        assert!(diag.message.contains("#version required and missing."));
        assert!(diag.message.contains("syntax error syntax error"));
        assert_eq!(diag.message.lines().count(), 2);
        assert_eq!(diag.line, Some(1));
    }

    #[test]
    fn line_number_extraction() {
        assert_eq!(
            extract_line_number("ERROR: 0:4: 'This' : syntax error"),
            Some(4)
        );
        assert_eq!(extract_line_number("0:7(12): error: bad thing"), Some(7));
        assert_eq!(extract_line_number("link failed"), None);
    }

    #[test]
    fn open_rejects_empty_source() {
        let err = ShaderContext::open("t", "", MockBackend::new("")).unwrap_err();
        assert_eq!(err.kind, crate::diagnostics::DiagnosticKind::EmptySource);
    }

    #[test]
    fn open_surfaces_aggregated_compile_errors() {
        let err = ShaderContext::open("t", "bad code", MockBackend::new(TWO_ERROR_LOG))
            .unwrap_err();
        assert_eq!(err.kind, crate::diagnostics::DiagnosticKind::LoadFailure);
        assert_eq!(err.line, Some(1));
        assert_eq!(err.message.lines().count(), 2);
    }

    #[test]
    fn reload_recompiles_on_next_invoke() {
        let mut ctx = ShaderContext::open("t", "ok v1", MockBackend::new("")).unwrap();
        let first = ctx.current_program().unwrap();
        ctx.reload("ok v2").unwrap();
        match ctx.invoke() {
            ExecutionOutcome::Produced(Artifact::Program(p)) => assert_ne!(p, first),
            other => panic!("expected new program, got {other:?}"),
        }
        // The replaced program was released.
        assert_eq!(ctx.backend.released, vec![first]);
    }

    #[test]
    fn failed_recompile_keeps_the_last_good_program() {
        let mut ctx =
            ShaderContext::open("t", "ok v1", MockBackend::new(TWO_ERROR_LOG)).unwrap();
        let good = ctx.current_program().unwrap();
        ctx.reload("bad v2").unwrap();

        match ctx.invoke() {
            ExecutionOutcome::Failed(diag) => assert_eq!(diag.line, Some(1)),
            other => panic!("expected failure, got {other:?}"),
        }
        // Subsequent invokes fall back to the last good program without
        // recompiling the broken source again.
        assert_eq!(
            ctx.invoke(),
            ExecutionOutcome::Produced(Artifact::Program(good))
        );
    }

    #[test]
    fn drop_releases_the_program() {
        use std::sync::{Arc, Mutex};

        struct SharedBackend {
            released: Arc<Mutex<Vec<ProgramHandle>>>,
        }

        impl ShaderBackend for SharedBackend {
            fn compile(&mut self, _source: &str) -> Result<ProgramHandle, String> {
                Ok(ProgramHandle(7))
            }
            fn release(&mut self, program: ProgramHandle) {
                self.released.lock().unwrap().push(program);
            }
        }

        let released = Arc::new(Mutex::new(Vec::new()));
        {
            let backend = SharedBackend {
                released: Arc::clone(&released),
            };
            let _ctx = ShaderContext::open("t", "ok", backend).unwrap();
        }
        assert_eq!(*released.lock().unwrap(), vec![ProgramHandle(7)]);
    }
}
