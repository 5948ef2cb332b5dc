//! A resumable, non-backtracking regular expression matcher.
//!
//! This is a Thompson-construction / Pike's-algorithm VM: at any instant it
//! holds a breadth-first list of live threads, each a `(pc, start)` pair,
//! and advances every thread by exactly one byte per step. Unlike a
//! backtracking engine it never re-reads a byte once consumed, which is
//! what makes it safe to feed a stream one chunk at a time. A brand-new
//! "search" thread is spawned at the lowest priority on every byte
//! position (unless the pattern is start-anchored and that position isn't
//! zero), which gives unanchored, leftmost-first search for free instead
//! of requiring a separate outer loop.
//!
//! Thread priority encodes "leftmost, then greedy-first": threads are
//! always processed and inserted in an order where an earlier-starting or
//! more-greedy thread outranks a later one, and reaching `Match` while
//! walking the list in priority order prunes every thread after it for
//! that round, exactly as described in Russ Cox's account of the
//! algorithm.

use std::sync::Arc;

use crate::offset::AbsOffset;

use super::program::Inst;
use super::Program;

/// The result of feeding a chunk of bytes to the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// A match is confirmed final: no live thread could have produced a
    /// different or longer one.
    Match(AbsOffset, AbsOffset),
    /// Not yet resolved. `from` is the earliest position any surviving
    /// thread could still match from; `to` is a lower bound on how far a
    /// match might extend, normally the position reached by the end of
    /// this call. `to` is `None` only when the adapter declines to compute
    /// an exact bound, in which case the caller should treat it as "at
    /// least through the end of the chunk just consumed" — this adapter
    /// always tracks an exact position, so it always returns `Some`.
    Partial(AbsOffset, Option<AbsOffset>),
    /// No match exists in the consumed prefix and none ever will: the
    /// pattern is anchored to the start of the stream and that position
    /// has already been tried and failed, or the program can never reach
    /// `Match` at all.
    NoMatch,
}

struct Thread {
    pc: usize,
    start: AbsOffset,
}

/// Computes the epsilon closure of a set of seed `(pc, start)` pairs,
/// pushing every reachable consuming thread into `out` and recording the
/// best `Match` reached along the way into `matched`.
///
/// Seeds are processed in priority order; the moment a seed's closure
/// reaches `Match`, every seed after it is skipped (Pike pruning). Returns
/// once all eligible seeds have been processed or one of them pruned the
/// rest.
fn closure(
    program: &Program,
    seeds: impl IntoIterator<Item = (usize, AbsOffset)>,
    pos: AbsOffset,
    eof: bool,
    matched: &mut Option<(AbsOffset, AbsOffset)>,
    out: &mut Vec<Thread>,
) {
    let mut visited = vec![false; program.len()];
    for (pc, start) in seeds {
        let pruned = add_thread(program, pc, start, pos, eof, &mut visited, out, matched);
        if pruned {
            break;
        }
    }
}

/// Follows epsilon transitions from `pc` until a consuming instruction or
/// `Match` is reached. Returns `true` if `Match` was reached, signalling
/// the caller to stop considering lower-priority alternatives.
fn add_thread(
    program: &Program,
    pc: usize,
    start: AbsOffset,
    pos: AbsOffset,
    eof: bool,
    visited: &mut [bool],
    out: &mut Vec<Thread>,
    matched: &mut Option<(AbsOffset, AbsOffset)>,
) -> bool {
    if visited[pc] {
        return false;
    }
    visited[pc] = true;

    match &program.insts[pc] {
        Inst::Jmp(next) => add_thread(program, *next, start, pos, eof, visited, out, matched),
        Inst::Split(a, b) => {
            let pruned = add_thread(program, *a, start, pos, eof, visited, out, matched);
            if pruned {
                return true;
            }
            add_thread(program, *b, start, pos, eof, visited, out, matched)
        }
        Inst::StartAnchor(next) => {
            if pos == AbsOffset::ZERO {
                add_thread(program, *next, start, pos, eof, visited, out, matched)
            } else {
                false
            }
        }
        Inst::EndAnchor(next) => {
            if eof {
                add_thread(program, *next, start, pos, eof, visited, out, matched)
            } else {
                false
            }
        }
        Inst::Ranges { .. } => {
            out.push(Thread { pc, start });
            false
        }
        Inst::Match => {
            *matched = Some((start, pos));
            true
        }
    }
}

/// A resumable matcher bound to one compiled [`Program`].
///
/// One `PikeVm` is created per request body scan and fed successive
/// chunks via [`PikeVm::step`]; it carries whatever thread state is still
/// live across calls, so the caller never needs to re-scan bytes it has
/// already handed over (other than the handful the VM may have looked at
/// internally to disambiguate a greedy match — see `step`'s doc comment).
pub struct PikeVm {
    program: Arc<Program>,
    threads: Vec<Thread>,
    pos: AbsOffset,
    matched: Option<(AbsOffset, AbsOffset)>,
    /// Set once no future input can possibly produce a match (an anchored
    /// pattern whose anchor position has already passed, or a program with
    /// no reachable `Match` at all).
    dead: bool,
}

impl PikeVm {
    /// Builds a fresh matcher starting at the beginning of the stream.
    pub fn new(program: Arc<Program>) -> Self {
        let mut matched = None;
        let mut threads = Vec::new();
        closure(&program, [(program.start, AbsOffset::ZERO)], AbsOffset::ZERO, false, &mut matched, &mut threads);
        PikeVm { program, threads, pos: AbsOffset::ZERO, matched, dead: false }
    }

    /// The position the VM considers itself fed up to. After a `Match`
    /// verdict this is exactly the match's `to`, never further — any bytes
    /// the VM peeked at internally to confirm the match are "unconsumed"
    /// again as far as the caller is concerned.
    pub fn pos(&self) -> AbsOffset {
        self.pos
    }

    fn start_seed(&self, pos: AbsOffset) -> Option<(usize, AbsOffset)> {
        if self.program.anchored_start && pos != AbsOffset::ZERO {
            None
        } else {
            Some((self.program.start, pos))
        }
    }

    /// Feeds up to `chunk.len()` more bytes to the matcher, stopping early
    /// as soon as a verdict can be given. `eof` says no further bytes will
    /// ever follow this chunk.
    ///
    /// A greedy pattern (`a+`, say) cannot know a match is over until it
    /// sees a byte that doesn't extend it, so `step` may internally look
    /// one byte past the eventual match end before returning `Match`. That
    /// byte is *not* counted as consumed: [`PikeVm::pos`] stays at the
    /// match's `to`, and the caller is expected to feed that same byte
    /// again as part of whatever comes after the match (exactly as if this
    /// call had simply returned before reaching it).
    pub fn step(&mut self, chunk: &[u8], eof: bool) -> Verdict {
        if self.dead {
            return Verdict::NoMatch;
        }

        let mut i = 0;
        loop {
            if self.threads.is_empty() {
                // A match may already be sitting in `self.matched` from a
                // previous closure pass (a zero-width match with no
                // surviving consuming thread to keep the search alive).
                // That has to be reported before we try to reseed, or it
                // is lost silently and the caller sees a false `NoMatch`.
                if let Some((from, to)) = self.matched {
                    self.reset_after_match(to);
                    return Verdict::Match(from, to);
                }
                match self.start_seed(self.pos) {
                    Some((pc, start)) => {
                        let mut threads = Vec::new();
                        closure(&self.program, [(pc, start)], self.pos, false, &mut self.matched, &mut threads);
                        self.threads = threads;
                    }
                    None => {
                        self.dead = true;
                        return Verdict::NoMatch;
                    }
                }
                if self.threads.is_empty() {
                    if let Some((from, to)) = self.matched {
                        self.reset_after_match(to);
                        return Verdict::Match(from, to);
                    }
                    self.dead = true;
                    return Verdict::NoMatch;
                }
            }

            if i >= chunk.len() {
                break;
            }
            let byte = chunk[i];
            i += 1;
            let next_pos = self.pos.advance(1);

            let mut visited = vec![false; self.program.len()];
            let mut next = Vec::new();
            let mut pruned = false;
            for t in &self.threads {
                if pruned {
                    break;
                }
                if let Inst::Ranges { ranges, next: np } = &self.program.insts[t.pc] {
                    if ranges.iter().any(|&(lo, hi)| byte >= lo && byte <= hi) {
                        pruned = add_thread(&self.program, *np, t.start, next_pos, false, &mut visited, &mut next, &mut self.matched);
                    }
                }
            }
            // A freshly spawned search thread starts at `next_pos`, strictly
            // after every thread already carried forward, so it is always
            // lower priority than any match those already recorded. Once
            // `self.matched` holds a result, spawning one here could only
            // overwrite it with a later (lower-priority, non-leftmost) one.
            if !pruned && self.matched.is_none() {
                if let Some((pc, start)) = self.start_seed(next_pos) {
                    add_thread(&self.program, pc, start, next_pos, false, &mut visited, &mut next, &mut self.matched);
                }
            }

            self.threads = next;
            self.pos = next_pos;

            if let Some((from, to)) = self.matched {
                if self.threads.is_empty() {
                    self.reset_after_match(to);
                    return Verdict::Match(from, to);
                }
            }
        }

        if eof {
            self.finish_at_eof();
            if let Some((from, to)) = self.matched {
                self.reset_after_match(to);
                return Verdict::Match(from, to);
            }
            self.dead = true;
            return Verdict::NoMatch;
        }

        let from = self.threads.iter().map(|t| t.start).min().unwrap_or(self.pos);
        Verdict::Partial(from, Some(self.pos))
    }

    /// Runs one more epsilon closure pass with `eof` true, so that any
    /// thread sitting just before an `EndAnchor` can resolve, then lets
    /// everything else die (no further bytes are coming for them to
    /// consume).
    fn finish_at_eof(&mut self) {
        let mut visited = vec![false; self.program.len()];
        let mut discard = Vec::new();
        for t in &self.threads {
            let pruned = add_thread(&self.program, t.pc, t.start, self.pos, true, &mut visited, &mut discard, &mut self.matched);
            if pruned {
                break;
            }
        }
        self.threads.clear();
    }

    /// Moves the matcher one byte past its current position without
    /// treating that byte as scanned, and restarts the search from there.
    ///
    /// Used by the driver after emitting a zero-width match: without this,
    /// the very next `step` call would rediscover the identical zero-width
    /// match at the identical position forever. The skipped byte itself
    /// still has to reach the output (the driver copies it verbatim); this
    /// call only keeps the VM's absolute position in sync with that.
    pub fn force_advance(&mut self) {
        let next = self.pos.advance(1);
        self.reset_after_match(next);
    }

    /// Rolls internal state back to exactly `to` and starts a fresh search
    /// from there, discarding whatever lookahead was needed to confirm the
    /// match that just ended.
    fn reset_after_match(&mut self, to: AbsOffset) {
        self.pos = to;
        self.matched = None;
        self.dead = false;
        self.threads = match self.start_seed(to) {
            Some((pc, start)) => {
                let mut threads = Vec::new();
                closure(&self.program, [(pc, start)], to, false, &mut self.matched, &mut threads);
                threads
            }
            None => Vec::new(),
        };
    }
}
