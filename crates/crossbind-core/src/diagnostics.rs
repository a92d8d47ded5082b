//! Diagnostic messages.
//!
//! Generation warnings and runtime reports (caught managed exceptions,
//! overwritten pending exceptions, released objects) are collected as
//! [`Diagnostic`] values rather than written to a log.

use std::collections::VecDeque;
use std::fmt;

/// A single diagnostic message.
///
/// # Examples
///
/// ```
/// use crossbind_core::{Diagnostic, DiagnosticKind};
///
/// let diagnostic = Diagnostic::warning("generic instantiation requested twice")
///     .with_context("System.Collections.Generic.List<System.Int32>");
/// assert_eq!(
///     diagnostic.to_string(),
///     "System.Collections.Generic.List<System.Int32>: warning: generic instantiation requested twice"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// The severity level of this diagnostic
    pub kind: DiagnosticKind,
    /// The diagnostic message text
    pub message: String,
    /// Type, member or symbol the message is about, if any
    pub context: Option<String>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Info, message)
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(context) = &self.context {
            write!(f, "{context}: ")?;
        }
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// The severity level of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// An application-level failure that was caught and relayed.
    Error,
    /// Something that worked but may not do what was intended.
    Warning,
    /// Informational.
    Info,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Info => "info",
        })
    }
}

/// A collection of diagnostic messages.
///
/// With a capacity limit the collection behaves as a ring: the oldest
/// message is dropped when a new one would exceed the limit.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    diagnostics: VecDeque<Diagnostic>,
    limit: Option<usize>,
    has_errors: bool,
}

impl Diagnostics {
    /// Creates a new, unbounded, empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty collection that keeps at most `limit` messages.
    pub fn bounded(limit: usize) -> Self {
        Self {
            diagnostics: VecDeque::with_capacity(limit.min(64)),
            limit: Some(limit),
            has_errors: false,
        }
    }

    /// Adds a diagnostic to the collection.
    ///
    /// If the diagnostic is an error, this sets the internal error flag, which
    /// stays set even if the message itself is later dropped by the ring.
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        if diagnostic.kind == DiagnosticKind::Error {
            self.has_errors = true;
        }
        if let Some(limit) = self.limit {
            if limit == 0 {
                return;
            }
            while self.diagnostics.len() >= limit {
                self.diagnostics.pop_front();
            }
        }
        self.diagnostics.push_back(diagnostic);
    }

    /// Returns `true` if an error was ever added.
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::Warning)
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Removes all diagnostics and resets the error flag.
    pub fn clear(&mut self) {
        self.diagnostics.clear();
        self.has_errors = false;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.of_kind(DiagnosticKind::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.of_kind(DiagnosticKind::Warning)
    }

    fn of_kind(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Move every message of `other` into `self`.
    pub fn extend(&mut self, other: Diagnostics) {
        for diagnostic in other.diagnostics {
            self.add_diagnostic(diagnostic);
        }
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::collections::vec_deque::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_by_kind() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_diagnostic(Diagnostic::warning("a"));
        diagnostics.add_diagnostic(Diagnostic::error("b"));
        diagnostics.add_diagnostic(Diagnostic::info("c"));
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.warning_count(), 1);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn bounded_keeps_newest() {
        let mut diagnostics = Diagnostics::bounded(2);
        for i in 0..5 {
            diagnostics.add_diagnostic(Diagnostic::info(format!("{i}")));
        }
        let kept: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(kept, vec!["3", "4"]);
    }

    #[test]
    fn error_flag_survives_ring() {
        let mut diagnostics = Diagnostics::bounded(1);
        diagnostics.add_diagnostic(Diagnostic::error("boom"));
        diagnostics.add_diagnostic(Diagnostic::info("later"));
        assert_eq!(diagnostics.error_count(), 0);
        assert!(diagnostics.has_errors());
        diagnostics.clear();
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn display() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_diagnostic(Diagnostic::error("first").with_context("Init"));
        diagnostics.add_diagnostic(Diagnostic::warning("second"));
        assert_eq!(diagnostics.to_string(), "Init: error: first\nwarning: second");
    }
}
