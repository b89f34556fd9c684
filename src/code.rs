//! Code revisions submitted by the controller.

/// One revision of user code.
///
/// A `CodeUnit` is immutable once submitted; editing produces a new unit
/// rather than mutating one that a worker may be executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    name: String,
    source_text: String,
}

impl CodeUnit {
    pub fn new(name: impl Into<String>, source_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_text: source_text.into(),
        }
    }

    /// Human-readable identifier, usually the session or file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }

    /// True when the source contains nothing but whitespace.
    pub fn is_empty(&self) -> bool {
        self.source_text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_source_counts_as_empty() {
        assert!(CodeUnit::new("t", "").is_empty());
        assert!(CodeUnit::new("t", "  \n\t").is_empty());
        assert!(!CodeUnit::new("t", "out: sin 440").is_empty());
    }
}
