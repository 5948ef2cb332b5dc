//! Configuration and runtime errors.

use std::error::Error;
use std::fmt;

use crate::regex::CompileError;

/// Errors that can occur while parsing a `replace_filter`/
/// `replace_filter_types` directive at startup.
#[derive(Debug)]
pub enum ConfigError {
    /// The pattern failed to parse or compile.
    Regex(CompileError),
    /// An unrecognized flag letter was given (only `i` and `g` are known).
    UnknownFlag(char),
    /// `replace_filter` was declared twice in the same scope.
    DuplicateDirective,
    /// `replace_filter_types` named a MIME type twice in the same directive.
    DuplicateType(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Regex(err) => write!(f, "failed to parse or compile pattern: {err}"),
            ConfigError::UnknownFlag(c) => write!(f, "specifies an unrecognized regex flag: {c:?}"),
            ConfigError::DuplicateDirective => write!(f, "is duplicate"),
            ConfigError::DuplicateType(ty) => write!(f, "duplicate MIME type: {ty}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Regex(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CompileError> for ConfigError {
    fn from(err: CompileError) -> Self {
        ConfigError::Regex(err)
    }
}

/// Errors that can occur while a request's body is being scanned.
///
/// This is the one semantic runtime error unique to the core (§7d); the VM
/// adapter itself is infallible by construction (pattern validity is
/// already established at `compile` time, see [`ConfigError::Regex`]) and
/// allocation failure has no recoverable representation in safe Rust, so
/// neither has a variant here.
#[derive(Debug)]
pub enum FilterError {
    /// The VM asked to rewind past bytes already handed to the host
    /// (§7d: "general look-ahead not supported").
    LookBehindPastEmitted {
        /// The rewind target the VM reported.
        to: u64,
        /// The absolute offset of the first byte of the current buffer.
        stream_pos: u64,
    },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::LookBehindPastEmitted { to, stream_pos } => write!(
                f,
                "general look-ahead not supported: {to} < {stream_pos}"
            ),
        }
    }
}

impl Error for FilterError {}
