//! The `on_headers` half of the host filter contract (§6).
//!
//! Everything else about HTTP header handling — parsing a response line,
//! the header table itself, subrequest plumbing — is the host's problem;
//! this module only answers the two questions the core needs answered
//! before it will attach a [`crate::filter::FilterContext`] to a request:
//! does the configured pattern apply to this response's content type, and
//! is there any body to rewrite at all.

use crate::config::ScopeConfig;

/// The handful of response properties `on_headers` actually consults.
#[derive(Debug, Clone, Copy)]
pub struct ResponseHeaders<'a> {
    /// The response's `Content-Type`, with any `; charset=...` parameter
    /// already stripped by the host.
    pub content_type: &'a str,
    /// The declared `Content-Length`, if the host knows it yet. `Some(0)`
    /// and `None` are treated differently: a zero-length body never gets
    /// a context attached (nothing to rewrite); an unknown length might.
    pub content_length: Option<u64>,
    /// Whether this is the main request, as opposed to an internal
    /// subrequest — header mutation only ever applies to the former.
    pub is_main_request: bool,
}

/// What `on_headers` decided for this response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderDecision {
    /// Attach a context and scan the body.
    Attach,
    /// Let the body pass through untouched; no context is attached.
    Skip,
}

/// Implements §6's `on_headers` gating: a pattern must be configured, the
/// body must be non-empty, and the content type must be in the configured
/// (or inherited default) MIME set.
pub fn decide_on_headers(headers: &ResponseHeaders<'_>, scope: &ScopeConfig) -> HeaderDecision {
    if scope.replace().is_none() {
        return HeaderDecision::Skip;
    }
    if headers.content_length == Some(0) {
        return HeaderDecision::Skip;
    }
    if !scope.types().contains(headers.content_type) {
        return HeaderDecision::Skip;
    }
    HeaderDecision::Attach
}

/// Header names the host must clear once a context is attached, since the
/// rewritten body's length is no longer known in advance. Only applies on
/// the main request — subrequests don't carry these headers downstream on
/// their own.
pub fn headers_to_clear(decision: HeaderDecision, is_main_request: bool) -> &'static [&'static str] {
    if decision == HeaderDecision::Attach && is_main_request {
        &["Content-Length", "Last-Modified"]
    } else {
        &[]
    }
}
