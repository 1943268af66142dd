//! Engine error taxonomy and parse diagnostics.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors the session engine surfaces to its caller. None of these are
/// fatal to the engine itself; it always returns to an idle, usable state.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The script file could not be opened, or its header block never
    /// terminates. Fatal to selecting that script only.
    #[error("unreadable script descriptor {path}: {reason}")]
    DescriptorUnreadable { path: PathBuf, reason: String },

    /// Start was requested while the session is not ready to execute,
    /// or while a run is already in progress.
    #[error("script session is not ready to execute")]
    NotReady,

    /// The interpreter process could not be spawned.
    #[error("failed to launch {program}: {source}")]
    LaunchFailure {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// A non-fatal problem found on one line of a descriptor header. The parser
/// collects these and keeps going rather than aborting the whole file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    /// 1-based line number within the script file.
    pub line_no: usize,
    pub kind: DiagnosticKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A fixed-position header line or declaration line that does not match
    /// the expected shape.
    MalformedHeader(String),
    /// A declaration line with a type tag outside the recognized set.
    UnknownArgumentType(String),
    /// A declaration line reusing a key already defined in this script.
    DuplicateKey(String),
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::MalformedHeader(msg) => {
                write!(f, "line {}: malformed header: {}", self.line_no, msg)
            }
            DiagnosticKind::UnknownArgumentType(tag) => {
                write!(f, "line {}: unknown argument type '{}'", self.line_no, tag)
            }
            DiagnosticKind::DuplicateKey(key) => {
                write!(f, "line {}: duplicate argument key '{}'", self.line_no, key)
            }
        }
    }
}
