//! Diagnostics collection for the compilation pipeline.
//!
//! This module provides types for collecting and reporting diagnostic messages
//! during whole-program optimization. Passes report unresolved references, rule
//! conflicts, and format-limit violations here instead of aborting mid-flight;
//! the driver checks for fatal entries after each pass and aborts between passes.
//!
//! # Architecture
//!
//! The [`Diagnostics`] container uses `boxcar::Vec` for thread-safe, lock-free
//! append operations, allowing diagnostics to be collected from parallel
//! per-method work items without synchronization overhead.
//!
//! # Key Components
//!
//! - [`Diagnostics`] - Thread-safe container for diagnostic entries
//! - [`Diagnostic`] - Individual diagnostic entry with severity and context
//! - [`DiagnosticSeverity`] - Severity level (Info, Warning, Error)
//! - [`DiagnosticCategory`] - Category of the diagnostic source
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use dexlens::diagnostics::{Diagnostics, DiagnosticCategory};
//! use std::sync::Arc;
//!
//! let diagnostics = Arc::new(Diagnostics::new());
//!
//! diagnostics.warning(
//!     DiagnosticCategory::Reference,
//!     "Missing class Lcom/example/Gone; referenced from Lcom/example/Main;",
//! );
//!
//! if diagnostics.has_errors() {
//!     eprintln!("Errors found: {}", diagnostics.error_count());
//! }
//! ```

use std::fmt;

use strum::Display;

/// Severity level of a diagnostic entry.
///
/// Determines how the diagnostic should be treated and displayed. Any
/// [`DiagnosticSeverity::Error`] entry is fatal: the driver aborts at the next
/// pass boundary and no output is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DiagnosticSeverity {
    /// Informational message, not indicating a problem.
    #[strum(serialize = "INFO")]
    Info,

    /// Warning about a suspicious but tolerable condition.
    ///
    /// Compilation continues and output is produced; warnings are emitted
    /// at the end of the run.
    #[strum(serialize = "WARN")]
    Warning,

    /// Error indicating the program cannot be compiled as requested.
    ///
    /// The pipeline finishes the current pass, then aborts without writing
    /// output.
    #[strum(serialize = "ERROR")]
    Error,
}

/// Category indicating the source or type of diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum DiagnosticCategory {
    /// Unresolved symbol references found during tree shaking.
    Reference,

    /// Conflicting or malformed keep rules.
    Rules,

    /// Issues raised while merging classes.
    Merging,

    /// Issues raised by IR transformation passes.
    Ir,

    /// Post-optimization format limits (methods per partition, etc.).
    Format,

    /// General pipeline issues not fitting other categories.
    General,
}

/// A single diagnostic entry with context information.
///
/// Contains the severity, category, message, and an optional symbol location
/// (a descriptor or qualified member string) for a diagnostic reported during
/// compilation.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level of this diagnostic.
    pub severity: DiagnosticSeverity,

    /// Category indicating the source of this diagnostic.
    pub category: DiagnosticCategory,

    /// Human-readable description of the issue.
    pub message: String,

    /// Optional symbol the diagnostic refers to, in descriptor form.
    pub location: Option<String>,
}

impl Diagnostic {
    /// Creates a new diagnostic entry.
    ///
    /// # Arguments
    ///
    /// * `severity` - Severity level of the diagnostic
    /// * `category` - Category of the diagnostic source
    /// * `message` - Human-readable description
    pub fn new(
        severity: DiagnosticSeverity,
        category: DiagnosticCategory,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            message: message.into(),
            location: None,
        }
    }

    /// Adds a symbol location to the diagnostic.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.category, self.message)?;

        if let Some(location) = &self.location {
            write!(f, " (at {location})")?;
        }

        Ok(())
    }
}

/// Thread-safe container for collecting diagnostic entries.
///
/// Uses `boxcar::Vec` internally for lock-free concurrent append operations.
/// Multiple worker threads can safely add diagnostics simultaneously. Reporting
/// never fails and never throws; fatal handling is the driver's job.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: boxcar::Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates a new empty diagnostics container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: boxcar::Vec::new(),
        }
    }

    /// Adds an informational diagnostic.
    pub fn info(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(DiagnosticSeverity::Info, category, message));
    }

    /// Adds a warning diagnostic.
    pub fn warning(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Warning,
            category,
            message,
        ));
    }

    /// Adds an error diagnostic.
    pub fn error(&self, category: DiagnosticCategory, message: impl Into<String>) {
        self.push(Diagnostic::new(
            DiagnosticSeverity::Error,
            category,
            message,
        ));
    }

    /// Adds a diagnostic entry directly.
    ///
    /// Use this for diagnostics that need a symbol location attached.
    pub fn push(&self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Returns true if any diagnostics have been collected.
    pub fn has_any(&self) -> bool {
        self.entries.count() > 0
    }

    /// Returns true if any error-level diagnostics have been collected.
    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, d)| d.severity == DiagnosticSeverity::Error)
    }

    /// Returns true if any warning-level diagnostics have been collected.
    pub fn has_warnings(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, d)| d.severity == DiagnosticSeverity::Warning)
    }

    /// Returns the total number of diagnostics.
    pub fn count(&self) -> usize {
        self.entries.count()
    }

    /// Returns the number of error-level diagnostics.
    pub fn error_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, d)| d.severity == DiagnosticSeverity::Error)
            .count()
    }

    /// Returns the number of warning-level diagnostics.
    pub fn warning_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, d)| d.severity == DiagnosticSeverity::Warning)
            .count()
    }

    /// Returns an iterator over all diagnostics in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().map(|(_, d)| d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_diagnostics() {
        let diagnostics = Diagnostics::new();
        assert!(!diagnostics.has_any());
        assert!(!diagnostics.has_errors());
        assert!(!diagnostics.has_warnings());
        assert_eq!(diagnostics.count(), 0);
    }

    #[test]
    fn test_severity_gating() {
        let diagnostics = Diagnostics::new();
        diagnostics.info(DiagnosticCategory::General, "note");
        diagnostics.warning(DiagnosticCategory::Reference, "missing class");

        assert!(diagnostics.has_any());
        assert!(diagnostics.has_warnings());
        assert!(!diagnostics.has_errors());

        diagnostics.error(DiagnosticCategory::Rules, "conflicting rules");
        assert!(diagnostics.has_errors());
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.count(), 3);
    }

    #[test]
    fn test_display_with_location() {
        let diagnostic = Diagnostic::new(
            DiagnosticSeverity::Warning,
            DiagnosticCategory::Reference,
            "missing class",
        )
        .with_location("Lcom/example/Gone;");

        let rendered = diagnostic.to_string();
        assert!(rendered.contains("WARN"));
        assert!(rendered.contains("Reference"));
        assert!(rendered.contains("Lcom/example/Gone;"));
    }

    #[test]
    fn test_concurrent_append() {
        use std::sync::Arc;

        let diagnostics = Arc::new(Diagnostics::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let shared = Arc::clone(&diagnostics);
            handles.push(std::thread::spawn(move || {
                for i in 0..100 {
                    shared.info(DiagnosticCategory::General, format!("entry {i}"));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(diagnostics.count(), 400);
    }
}
