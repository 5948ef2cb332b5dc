//! The regex sub-system: parsing and compiling a pattern into a
//! [`Program`], and executing that program against a stream via the
//! resumable [`PikeVm`].

mod compiler;
mod pikevm;
mod program;

use std::error::Error;
use std::fmt;

pub(crate) use program::{Inst, Program};
pub use compiler::compile;
pub use pikevm::{PikeVm, Verdict};

/// Errors from parsing or compiling a pattern.
#[derive(Debug)]
pub enum CompileError {
    /// `regex-syntax` rejected the pattern text outright.
    Parse(String),
    /// The pattern parsed but uses a construct this VM cannot execute
    /// (general look-around beyond the two stream anchors; see §1's
    /// non-goals).
    Unsupported(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Parse(msg) => write!(f, "pattern parse error: {msg}"),
            CompileError::Unsupported(msg) => write!(f, "unsupported pattern construct: {msg}"),
        }
    }
}

impl Error for CompileError {}
