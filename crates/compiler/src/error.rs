//! Source locations, diagnostics and driver errors
//!
//! All user-facing diagnostics carry a [`Location`] and render as
//! `file:line:column: message` on stderr. Passes append to a shared
//! [`Diagnostics`] sink so a single run can report several errors before
//! the pipeline gives up on a file.

use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

/// Position of a token or AST node in a source file.
///
/// Lines and columns are 1-indexed for display. Synthesized nodes (implicit
/// casts, merged declarations) reuse the location of the construct that
/// produced them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Rc<PathBuf>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: Rc<PathBuf>, line: usize, column: usize) -> Self {
        Location { file, line, column }
    }

    /// Location for nodes that have no source position of their own.
    pub fn none() -> Self {
        Location {
            file: Rc::new(PathBuf::new()),
            line: 0,
            column: 0,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One positioned message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Location,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{}: {}: {}", self.location, tag, self.message)
    }
}

/// Collector shared by the parser and the semantic passes.
///
/// Errors are accumulated rather than returned one at a time; a pass runs
/// to completion, then the pipeline asks `has_errors()` before moving on.
#[derive(Debug, Default)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn error(&mut self, location: Location, message: impl Into<String>) {
        self.errors += 1;
        self.diagnostics.push(Diagnostic {
            severity: Severity::Error,
            location,
            message: message.into(),
        });
    }

    pub fn warn(&mut self, location: Location, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            location,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Print everything collected so far to stderr, with a trailing summary
    /// line when errors occurred.
    pub fn print_to_stderr(&self) {
        for diagnostic in &self.diagnostics {
            eprintln!("{}", diagnostic);
        }
        if self.errors > 0 {
            let plural = if self.errors == 1 { "" } else { "s" };
            eprintln!("{} error{} generated.", self.errors, plural);
        }
    }
}

/// Driver-level failure taxonomy.
///
/// Syntax and semantic failures carry only a count; the individual
/// diagnostics have already been pushed into [`Diagnostics`].
#[derive(Debug)]
pub enum CompileError {
    /// Bad command-line usage.
    Options(String),
    /// Source not found / unreadable / output not writable.
    File(String),
    /// Lexer or parser rejected the input.
    Syntax(usize),
    /// A resolution or type checking pass rejected the input.
    Semantic(usize),
    /// External assembler/linker failed to launch or exited non-zero.
    Ipc(String),
    /// Invariant violation inside a phase; a compiler bug.
    Internal(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Options(msg) => {
                write!(f, "{}\ntry --help for usage", msg)
            }
            CompileError::File(msg) => write!(f, "{}", msg),
            CompileError::Syntax(n) => write!(f, "compile failed with {} syntax error(s)", n),
            CompileError::Semantic(n) => write!(f, "compile failed with {} semantic error(s)", n),
            CompileError::Ipc(msg) => write!(f, "{}", msg),
            CompileError::Internal(msg) => write!(f, "internal compiler error: {}", msg),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<std::io::Error> for CompileError {
    fn from(e: std::io::Error) -> Self {
        CompileError::File(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: usize, column: usize) -> Location {
        Location::new(Rc::new(PathBuf::from("t.cb")), line, column)
    }

    #[test]
    fn test_diagnostic_format() {
        let mut diags = Diagnostics::new();
        diags.error(loc(3, 14), "undefined reference to x");
        let rendered: Vec<String> = diags.iter().map(|d| d.to_string()).collect();
        assert_eq!(rendered, vec!["t.cb:3:14: error: undefined reference to x"]);
    }

    #[test]
    fn test_warning_does_not_count_as_error() {
        let mut diags = Diagnostics::new();
        diags.warn(loc(1, 1), "integer literal overflows int");
        assert!(!diags.has_errors());
        diags.error(loc(2, 5), "duplicate member name");
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
    }
}
