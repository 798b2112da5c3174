//! Utilities for collecting compiler diagnostics.
//!
//! Every user-visible failure in the compiler is a [`Diagnostic`] record
//! with a stable code, a severity, and an optional source span. Stages
//! accumulate diagnostics into a [`DiagnosticSet`] and return sentinel
//! values instead of raising errors.

#![warn(missing_docs)]

pub mod codes;
#[cfg(test)]
pub(crate) mod tests;

use std::fmt::{Display, Formatter};

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

/// An enumeration of possible severity levels.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum Severity {
    /// An informational message.
    Info,
    /// A warning.
    #[default]
    Warning,
    /// An error. The current stage records it and skips the failing
    /// entity, but continues with its peers.
    Error,
    /// A fatal error. The invocation stops at the next stage boundary.
    Fatal,
}

impl Severity {
    /// Returns the log level corresponding to this severity.
    #[inline]
    pub const fn as_tracing_level(&self) -> tracing::Level {
        match *self {
            Self::Info => tracing::Level::INFO,
            Self::Warning => tracing::Level::WARN,
            Self::Error | Self::Fatal => tracing::Level::ERROR,
        }
    }

    /// Returns `true` if the severity is [`Severity::Error`] or
    /// [`Severity::Fatal`].
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(*self, Self::Error | Self::Fatal)
    }

    /// Rank used by the deterministic ordering contract.
    ///
    /// More severe diagnostics sort first.
    #[inline]
    pub const fn rank(&self) -> u8 {
        match *self {
            Self::Fatal => 0,
            Self::Error => 1,
            Self::Warning => 2,
            Self::Info => 3,
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// The canonical identity of an authoring file.
///
/// A [`FileId`] is the normalized absolute path of the file: `.` and `..`
/// components collapsed, no symlink resolution. Two imports that normalize
/// to the same path are the same file.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct FileId(ArcStr);

impl FileId {
    /// Creates a file ID from an already-normalized path string.
    pub fn new(path: impl Into<ArcStr>) -> Self {
        Self(path.into())
    }

    /// The file ID used for diagnostics whose file is not known.
    pub fn unknown() -> Self {
        Self(ArcStr::new())
    }

    /// Returns `true` if this is the unknown-file sentinel.
    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.0.is_empty()
    }

    /// The normalized path as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_unknown() {
            write!(f, "<unknown>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// A line/column position, 1-based.
#[derive(
    Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct LineCol {
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub col: u32,
}

impl LineCol {
    /// Creates a new position.
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

/// A source span within an authoring file.
#[derive(Clone, Debug, Default, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// The file this span points into.
    pub file: FileId,
    /// Start position (inclusive).
    pub start: LineCol,
    /// End position (inclusive).
    pub end: LineCol,
}

impl Span {
    /// Creates a new span.
    pub fn new(file: FileId, start: LineCol, end: LineCol) -> Self {
        Self { file, start, end }
    }

    /// Creates a zero-width span at the given position.
    pub fn point(file: FileId, pos: LineCol) -> Self {
        Self {
            file,
            start: pos,
            end: pos,
        }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start.line, self.start.col)
    }
}

/// A secondary span attached to a diagnostic.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Label {
    /// Where the label points.
    pub span: Span,
    /// What the label says.
    pub message: ArcStr,
}

/// A suggested textual replacement.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct FixIt {
    /// The span to replace.
    pub span: Span,
    /// The replacement text.
    pub replacement: ArcStr,
}

/// A single diagnostic record.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable code of the form `DOMAIN-NNN`. See [`codes`].
    pub code: ArcStr,
    /// Severity of the diagnostic.
    pub severity: Severity,
    /// Primary message.
    pub message: ArcStr,
    /// Primary span, if the diagnostic has a source location.
    pub span: Option<Span>,
    /// Secondary labels.
    pub labels: Vec<Label>,
    /// Free-form notes rendered after the message.
    pub notes: Vec<ArcStr>,
    /// What the user can do to resolve the issue.
    pub help: Option<ArcStr>,
    /// Suggested replacements.
    pub fixits: Vec<FixIt>,
    /// The stage that produced the diagnostic (`"ast"`, `"graphir"`, ...).
    pub source: ArcStr,
}

impl Diagnostic {
    /// Creates a new diagnostic with the given code, severity, and message.
    pub fn new(code: &'static str, severity: Severity, message: impl Into<ArcStr>) -> Self {
        Self {
            code: ArcStr::from(code),
            severity,
            message: message.into(),
            span: None,
            labels: Vec::new(),
            notes: Vec::new(),
            help: None,
            fixits: Vec::new(),
            source: ArcStr::new(),
        }
    }

    /// Shorthand for a [`Severity::Error`] diagnostic.
    pub fn error(code: &'static str, message: impl Into<ArcStr>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    /// Shorthand for a [`Severity::Warning`] diagnostic.
    pub fn warning(code: &'static str, message: impl Into<ArcStr>) -> Self {
        Self::new(code, Severity::Warning, message)
    }

    /// Shorthand for a [`Severity::Info`] diagnostic.
    pub fn info(code: &'static str, message: impl Into<ArcStr>) -> Self {
        Self::new(code, Severity::Info, message)
    }

    /// Shorthand for a [`Severity::Fatal`] diagnostic.
    pub fn fatal(code: &'static str, message: impl Into<ArcStr>) -> Self {
        Self::new(code, Severity::Fatal, message)
    }

    /// Sets the primary span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Sets the primary span if one is available.
    pub fn with_span_opt(mut self, span: Option<Span>) -> Self {
        self.span = span;
        self
    }

    /// Attaches a secondary label.
    pub fn with_label(mut self, span: Span, message: impl Into<ArcStr>) -> Self {
        self.labels.push(Label {
            span,
            message: message.into(),
        });
        self
    }

    /// Attaches a note.
    pub fn with_note(mut self, note: impl Into<ArcStr>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Attaches a help message.
    pub fn with_help(mut self, help: impl Into<ArcStr>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Attaches a suggested replacement.
    pub fn with_fixit(mut self, span: Span, replacement: impl Into<ArcStr>) -> Self {
        self.fixits.push(FixIt {
            span,
            replacement: replacement.into(),
        });
        self
    }

    /// Records the stage that produced this diagnostic.
    pub fn with_source(mut self, source: impl Into<ArcStr>) -> Self {
        self.source = source.into();
        self
    }

    /// The key implementing the deterministic ordering contract:
    /// `(file, start.line, start.col, severity rank, code, message)`.
    ///
    /// Diagnostics without spans sort after those with spans; diagnostics
    /// whose file is unknown sort last.
    fn order_key(&self) -> (u8, &str, u32, u32, u8, &str, &str) {
        let (group, file, line, col) = match &self.span {
            Some(span) if !span.file.is_unknown() => {
                (0, span.file.as_str(), span.start.line, span.start.col)
            }
            None => (1, "", 0, 0),
            Some(span) => (2, span.file.as_str(), span.start.line, span.start.col),
        };
        (
            group,
            file,
            line,
            col,
            self.severity.rank(),
            &self.code,
            &self.message,
        )
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.span {
            Some(span) => write!(
                f,
                "{}: {}[{}]: {}",
                span, self.severity, self.code, self.message
            )?,
            None => write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?,
        }
        for label in &self.labels {
            write!(f, "\n  {}: {}", label.span, label.message)?;
        }
        for note in &self.notes {
            write!(f, "\n  note: {}", note)?;
        }
        if let Some(help) = &self.help {
            write!(f, "\n  help: {}", help)?;
        }
        Ok(())
    }
}

/// A collection of diagnostics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DiagnosticSet {
    diagnostics: Vec<Diagnostic>,
    num_errors: usize,
    num_warnings: usize,
}

impl DiagnosticSet {
    /// Creates a new, empty diagnostic set.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the given diagnostic to the set, logging it at the level
    /// corresponding to its severity.
    pub fn add(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Info => {
                tracing::event!(tracing::Level::INFO, code = %diagnostic.code, "{}", diagnostic)
            }
            Severity::Warning => {
                tracing::event!(tracing::Level::WARN, code = %diagnostic.code, "{}", diagnostic)
            }
            Severity::Error | Severity::Fatal => {
                tracing::event!(tracing::Level::ERROR, code = %diagnostic.code, "{}", diagnostic)
            }
        }
        match diagnostic.severity {
            Severity::Error | Severity::Fatal => self.num_errors += 1,
            Severity::Warning => self.num_warnings += 1,
            Severity::Info => (),
        }
        self.diagnostics.push(diagnostic);
    }

    /// Moves all diagnostics from `other` into this set.
    pub fn merge(&mut self, other: DiagnosticSet) {
        self.num_errors += other.num_errors;
        self.num_warnings += other.num_warnings;
        self.diagnostics.extend(other.diagnostics);
    }

    /// Returns an iterator over all diagnostics in the set.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// The number of diagnostics in this set.
    #[inline]
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    /// Returns `true` if this set is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Returns `true` if this set contains an error or fatal diagnostic.
    #[inline]
    pub fn has_error(&self) -> bool {
        self.num_errors > 0
    }

    /// Returns `true` if this set contains a fatal diagnostic.
    pub fn has_fatal(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Fatal)
    }

    /// The number of error and fatal diagnostics in this set.
    #[inline]
    pub fn num_errors(&self) -> usize {
        self.num_errors
    }

    /// Returns `true` if this set contains a warning.
    #[inline]
    pub fn has_warning(&self) -> bool {
        self.num_warnings > 0
    }

    /// The number of warnings in this set.
    #[inline]
    pub fn num_warnings(&self) -> usize {
        self.num_warnings
    }

    /// Sorts the set into the deterministic rendering order.
    ///
    /// The order is `(file, start.line, start.col, severity rank, code,
    /// message)`. Diagnostics without spans sort after those with spans;
    /// diagnostics whose file is unknown sort last. The sort is stable, so
    /// diagnostics identical under the key keep their emission order.
    pub fn sort(&mut self) {
        self.diagnostics
            .sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    }

    /// Returns `true` if any diagnostic in the set carries the given code.
    pub fn contains_code(&self, code: &str) -> bool {
        self.diagnostics.iter().any(|d| d.code == code)
    }
}

impl IntoIterator for DiagnosticSet {
    type Item = Diagnostic;
    type IntoIter = <Vec<Diagnostic> as IntoIterator>::IntoIter;
    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

impl Display for DiagnosticSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for diagnostic in self.diagnostics.iter() {
            writeln!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}
