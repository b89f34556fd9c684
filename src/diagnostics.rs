//! Structured failure reports surfaced by execution contexts and workers.
//!
//! Every failure the engine can observe is folded into a [`Diagnostic`] so
//! the controller-facing error channel stays language-agnostic: the same
//! shape carries an interpreter exception, an aggregated shader compiler
//! log, or a synthetic engine condition such as a lost output device.

use thiserror::Error;

/// Classification of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Code text is empty; rejected before it ever reaches execution.
    EmptySource,
    /// Code failed to parse/compile/load.
    LoadFailure,
    /// Code loaded but faulted during a single invocation.
    RuntimeFailure,
    /// Synthetic report for a user-requested stop.
    UserTerminated,
    /// The output sink persistently refused writes.
    DeviceLost,
}

/// One failure report.
///
/// `line` is present only when the underlying context can attribute the
/// failure to a source line (shader compilers can, interpreter exceptions
/// generally cannot).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn empty_source() -> Self {
        Self {
            kind: DiagnosticKind::EmptySource,
            message: "Source is empty. Nothing to execute.".to_string(),
            line: None,
        }
    }

    pub fn load_failure(message: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            kind: DiagnosticKind::LoadFailure,
            message: message.into(),
            line,
        }
    }

    pub fn runtime_failure(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::RuntimeFailure,
            message: message.into(),
            line: None,
        }
    }

    pub fn user_terminated() -> Self {
        Self {
            kind: DiagnosticKind::UserTerminated,
            message: "User terminated.".to_string(),
            line: None,
        }
    }

    pub fn device_lost(consecutive_rejects: u32) -> Self {
        Self {
            kind: DiagnosticKind::DeviceLost,
            message: format!(
                "Output device stopped accepting data ({consecutive_rejects} consecutive rejected writes)."
            ),
            line: None,
        }
    }

    /// Line number with the `-1` sentinel used on the controller boundary
    /// when the failure is not attributable to a source line.
    pub fn line_or_sentinel(&self) -> i32 {
        self.line.map(|l| l as i32).unwrap_or(-1)
    }
}
