#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
//! Streaming regex body replacement for an HTTP response filter chain.
//!
//! A configured pattern is matched against a response body as it streams
//! through in chunks, with every match (or only the first, depending on
//! configuration) replaced by a literal. Matching never backtracks and
//! never needs the whole body in memory at once: a resumable virtual
//! machine carries partial-match state from one chunk to the next, and
//! bytes that might still turn out to be part of a match are withheld in
//! a small pending chain rather than copied through speculatively.
//!
//! [`ScopeConfig`] holds one scope's compiled directives,
//! [`decide_on_headers`] decides whether a given response qualifies, and
//! [`FilterContext`] does the actual per-request scanning. Everything
//! HTTP — header parsing, connection handling, request routing — is
//! left to the embedding host; this crate only implements the body
//! filter itself.

pub use buffer::{BufFlags, Buffer, Shadow};
pub use chains::ChainSet;
pub use config::{MimeTypes, ReplaceDirective, ScopeConfig, DEFAULT_MIME_TYPES};
pub use error::{ConfigError, FilterError};
pub use filter::{FilterContext, FilterStatus};
pub use host::{decide_on_headers, headers_to_clear, HeaderDecision, ResponseHeaders};
pub use offset::AbsOffset;
pub use pending::{Pending, PendingEntry};
pub use regex::CompileError;

mod buffer;
mod chains;
mod config;
mod error;
mod filter;
mod host;
mod offset;
mod pending;
mod regex;
