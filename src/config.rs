//! Parses the two configuration directives (§6) into a compiled,
//! request-independent filter: `replace_filter` (the pattern/replacement/
//! flags) and `replace_filter_types` (the MIME gate).
//!
//! Both operate on already-tokenized argument lists, mirroring how a host's
//! config-file reader would have split a directive line into words before
//! handing them to this module — this is not a general config file parser.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::ConfigError;
use crate::regex::{compile, Program};

/// The host's default MIME set a `replace_filter_types` directive merges
/// into (absent the host's default set being overridden at an outer
/// scope, every location compares against at least this).
pub const DEFAULT_MIME_TYPES: &[&str] = &["text/html"];

/// A compiled `replace_filter` directive: the pattern the VM adapter is
/// built from, the literal replacement, and whether only the first match
/// is replaced.
#[derive(Debug, Clone)]
pub struct ReplaceDirective {
    pub(crate) program: Arc<Program>,
    pub(crate) replacement: Bytes,
    pub(crate) once: bool,
}

impl ReplaceDirective {
    /// Parses `replace_filter <pattern> <replacement> [<flags>]`.
    ///
    /// `flags` is a single string of letters: `i` case-insensitive, `g`
    /// global (replace every match rather than only the first — the
    /// default is first-match-only, i.e. `once = true`). An unrecognized
    /// letter is a configuration error.
    pub fn parse(pattern: &str, replacement: &str, flags: &str) -> Result<Self, ConfigError> {
        let mut case_insensitive = false;
        let mut global = false;
        for c in flags.chars() {
            match c {
                'i' => case_insensitive = true,
                'g' => global = true,
                other => return Err(ConfigError::UnknownFlag(other)),
            }
        }

        let program = compile(pattern, case_insensitive)?;
        Ok(ReplaceDirective {
            program: Arc::new(program),
            replacement: Bytes::copy_from_slice(replacement.as_bytes()),
            once: !global,
        })
    }
}

/// A `replace_filter_types` directive: the set of MIME types the filter
/// applies to. Defaults to the host's HTML default set and merges with
/// whatever the outer scope declared.
#[derive(Debug, Clone)]
pub struct MimeTypes {
    types: HashSet<String>,
}

impl Default for MimeTypes {
    fn default() -> Self {
        MimeTypes { types: DEFAULT_MIME_TYPES.iter().map(|s| s.to_string()).collect() }
    }
}

impl MimeTypes {
    /// An empty set carrying none of the host's defaults — used while
    /// parsing a directive that is about to list its own types explicitly.
    pub fn empty() -> Self {
        MimeTypes { types: HashSet::new() }
    }

    /// Parses `replace_filter_types <mime> ...`. Listing the same type
    /// twice within one directive is a configuration error.
    pub fn parse<'a>(mimes: impl IntoIterator<Item = &'a str>) -> Result<Self, ConfigError> {
        let mut set = MimeTypes::empty();
        for mime in mimes {
            set.add(mime)?;
        }
        Ok(set)
    }

    fn add(&mut self, mime: &str) -> Result<(), ConfigError> {
        if !self.types.insert(mime.to_ascii_lowercase()) {
            return Err(ConfigError::DuplicateType(mime.to_string()));
        }
        Ok(())
    }

    /// Merges in whatever the outer scope already accepted — directives
    /// are additive down the scope chain, never a full override.
    pub fn merge_with_outer(&mut self, outer: &MimeTypes) {
        self.types.extend(outer.types.iter().cloned());
    }

    pub fn contains(&self, mime: &str) -> bool {
        self.types.contains(&mime.to_ascii_lowercase())
    }
}

/// One configuration scope's worth of directives (e.g. one `server` or
/// `location` block). `replace_filter` may be declared at most once per
/// scope; declaring it twice is a configuration error instead of the
/// second silently overriding the first.
#[derive(Debug, Clone, Default)]
pub struct ScopeConfig {
    replace: Option<ReplaceDirective>,
    types: Option<MimeTypes>,
}

impl ScopeConfig {
    pub fn new() -> Self {
        ScopeConfig::default()
    }

    pub fn set_replace_filter(&mut self, pattern: &str, replacement: &str, flags: &str) -> Result<(), ConfigError> {
        if self.replace.is_some() {
            return Err(ConfigError::DuplicateDirective);
        }
        self.replace = Some(ReplaceDirective::parse(pattern, replacement, flags)?);
        Ok(())
    }

    pub fn set_replace_filter_types<'a>(&mut self, mimes: impl IntoIterator<Item = &'a str>) -> Result<(), ConfigError> {
        self.types = Some(MimeTypes::parse(mimes)?);
        Ok(())
    }

    /// Merges this scope with its parent: an unset `replace_filter` is
    /// inherited wholesale, and the MIME set is additive (falling back to
    /// the host's HTML default set when neither scope declared one).
    pub fn merge(&mut self, outer: &ScopeConfig) {
        if self.replace.is_none() {
            self.replace = outer.replace.clone();
        }
        let mut types = self.types.clone().unwrap_or_default();
        if let Some(outer_types) = &outer.types {
            types.merge_with_outer(outer_types);
        }
        self.types = Some(types);
    }

    pub fn replace(&self) -> Option<&ReplaceDirective> {
        self.replace.as_ref()
    }

    pub fn types(&self) -> MimeTypes {
        self.types.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn parses_flags() {
        let d = ReplaceDirective::parse("abc", "X", "ig").expect("parses");
        assert!(!d.once);
    }

    #[test]
    fn defaults_to_once_true_without_g_flag() {
        let d = ReplaceDirective::parse("abc", "X", "").expect("parses");
        assert!(d.once);
    }

    #[test]
    fn rejects_unknown_flag() {
        let err = ReplaceDirective::parse("abc", "X", "z").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFlag('z')));
    }

    #[test]
    fn rejects_duplicate_directive_in_same_scope() {
        let mut scope = ScopeConfig::new();
        scope.set_replace_filter("a", "b", "").expect("first declaration");
        let err = scope.set_replace_filter("c", "d", "").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateDirective));
    }

    #[test]
    fn rejects_duplicate_mime_type_in_one_directive() {
        let err = MimeTypes::parse(["text/html", "text/html"]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateType(_)));
    }

    #[test]
    fn types_default_to_host_html_set() {
        let scope = ScopeConfig::new();
        assert!(scope.types().contains("text/html"));
        assert!(!scope.types().contains("application/json"));
    }

    #[test]
    fn merge_inherits_replace_and_unions_types() {
        let mut outer = ScopeConfig::new();
        outer.set_replace_filter("foo", "bar", "").expect("parses");
        outer.set_replace_filter_types(["text/html"]).expect("parses");

        let mut inner = ScopeConfig::new();
        inner.set_replace_filter_types(["application/xml"]).expect("parses");
        inner.merge(&outer);

        assert!(inner.replace().is_some());
        assert!(inner.types().contains("text/html"));
        assert!(inner.types().contains("application/xml"));
    }
}
