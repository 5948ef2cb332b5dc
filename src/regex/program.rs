//! Byte-code emitted by [`crate::regex::compiler`] and executed by
//! [`crate::regex::pikevm`].

/// One instruction of a compiled pattern.
///
/// The instruction set is the minimum a Thompson construction needs: byte
/// tests that consume one byte, splits/jumps for epsilon transitions, the
/// two stream anchors the filter can actually observe, and a terminal
/// `Match`. Every non-terminal instruction carries its own continuation
/// target explicitly (no instruction ever falls through to "the next one in
/// the vector") so fragments can be spliced in any order during
/// compilation. There is no capture-saving instruction: per §1's
/// non-goals the replacer never interpolates capture groups, so only the
/// overall match's start and end are ever read back out.
#[derive(Debug, Clone)]
pub(crate) enum Inst {
    /// Consume one byte if it falls in any of the given inclusive ranges,
    /// then continue at `next`.
    Ranges { ranges: Vec<(u8, u8)>, next: usize },
    /// Unconditional epsilon transition to `next`.
    Jmp(usize),
    /// Fork into two threads, `a` preferred over `b` (earlier in
    /// thread-list priority order, i.e. greedy-first).
    Split(usize, usize),
    /// Succeeds only when the current position is the first byte of the
    /// stream, then continues at `next`.
    StartAnchor(usize),
    /// Succeeds only when the current position is the end of the stream
    /// (`eof` was set on the call that reaches it), then continues at
    /// `next`.
    EndAnchor(usize),
    /// Terminal: a match has been found ending at the current position.
    Match,
}

/// A placeholder continuation target patched in once the following
/// fragment's entry point is known.
pub(crate) const DANGLING: usize = usize::MAX;

/// A compiled pattern: a flat instruction vector plus its entry point.
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) insts: Vec<Inst>,
    pub(crate) start: usize,
    /// Set when the pattern is anchored to the start of the stream (e.g.
    /// `^abc`), which lets the VM stop spawning new unanchored search
    /// threads once the very first position has been tried.
    pub(crate) anchored_start: bool,
}

impl Program {
    pub(crate) fn len(&self) -> usize {
        self.insts.len()
    }
}
