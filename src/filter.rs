//! The streaming scan driver (§4.2/§4.3): interleaves the VM adapter
//! (`crate::regex`) with a sliding view over the input chain, the pending
//! chain (`crate::pending`) for withheld bytes, and the egress chains
//! (`crate::chains`) for downstream handoff.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, trace};

use crate::buffer::{Buffer, BufFlags};
use crate::chains::ChainSet;
use crate::config::ReplaceDirective;
use crate::error::FilterError;
use crate::offset::AbsOffset;
use crate::pending::{Pending, PendingEntry};
use crate::regex::{PikeVm, Verdict};

/// Which half of the driver is currently active for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Consulting the VM on every buffer, looking for matches.
    Scanning,
    /// The VM will never be consulted again this request: either it
    /// declared `NoMatch`, or `once` was satisfied by an earlier match.
    /// Every remaining buffer is copied straight to output (§4.2, §9's
    /// note on the `vm_done` short-circuit).
    PassThrough,
}

/// What `on_body` accomplished this call, mirroring §6's exit codes minus
/// `again`: this driver always drains every buffer handed to it before
/// returning (§5, "runs to a quiescent point and returns"), so there is
/// never unfinished work left over from the *same* call for it to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    /// Still scanning (or just finished scanning) with no declared verdict
    /// ruling out further matches.
    Ok,
    /// The pattern can never match again for the rest of this response —
    /// either the VM is exhausted, or `once` was already satisfied.
    Declined,
}

/// Per-request scanning state. Created when a context is attached (§6
/// `on_headers`, via [`crate::host::decide_on_headers`]) and fed the
/// request body's buffers through [`FilterContext::on_body`].
pub struct FilterContext {
    replacement: Bytes,
    once: bool,
    vm: PikeVm,
    pending: Pending,
    chains: ChainSet,
    in_queue: VecDeque<Buffer>,
    mode: Mode,
    stream_pos: AbsOffset,
    /// Set after a zero-width match. The next byte fed to the VM must
    /// first be copied out manually and the VM force-advanced past it, or
    /// the identical zero-width match repeats at the identical position
    /// forever (see [`PikeVm::force_advance`]).
    owe_skip_byte: bool,
    next_input_id: u64,
}

impl FilterContext {
    /// Builds a fresh scanning context bound to one compiled directive.
    /// Many contexts may share the same `directive` (one per concurrent
    /// request; the directive itself is config-scoped and outlives all of
    /// them).
    pub fn new(directive: &ReplaceDirective) -> Self {
        FilterContext {
            replacement: directive.replacement.clone(),
            once: directive.once,
            vm: PikeVm::new(Arc::clone(&directive.program)),
            pending: Pending::new(),
            chains: ChainSet::new(),
            in_queue: VecDeque::new(),
            mode: Mode::Scanning,
            stream_pos: AbsOffset::ZERO,
            owe_skip_byte: false,
            next_input_id: 0,
        }
    }

    /// Feeds a newly arrived input chain to the filter, scanning what it
    /// can and returning the buffers ready to hand downstream (§4.5).
    pub fn on_body(
        &mut self,
        input: impl IntoIterator<Item = Buffer>,
    ) -> Result<(VecDeque<Buffer>, FilterStatus), FilterError> {
        self.chains.release_busy_head();

        for buf in input {
            let id = self.next_input_id;
            self.next_input_id += 1;
            self.in_queue.push_back(buf.with_id(id));
        }

        while let Some(buf) = self.in_queue.pop_front() {
            let data_emitted = match self.mode {
                Mode::PassThrough => self.pass_through(&buf),
                Mode::Scanning => self.scan_buffer(&buf)?,
            };
            self.finish_buffer(buf, data_emitted);
        }

        let out = self.chains.send_downstream();
        let status = match self.mode {
            Mode::Scanning => FilterStatus::Ok,
            Mode::PassThrough => FilterStatus::Declined,
        };
        Ok((out, status))
    }

    /// Copies `buf`'s whole live window straight to output, pinning it via
    /// shadow. Returns whether anything was actually emitted (an empty
    /// special buffer emits nothing).
    fn pass_through(&mut self, buf: &Buffer) -> bool {
        self.emit_verbatim(buf, buf.pos(), buf.last())
    }

    /// Runs the VM over `buf` from its start to its end, handling every
    /// verdict along the way (§4.3). May switch to [`Mode::PassThrough`]
    /// partway through. Returns whether anything was emitted for `buf`.
    ///
    /// Reaching `pos == last` while still `Scanning` is not necessarily the
    /// end of this buffer's business with the VM: a buffer that is also
    /// `last_buf` (special or not) may have a match or zero-width
    /// resolution sitting exactly at its final byte, and the only way to
    /// learn that is to feed the VM one more `eof = true` step with
    /// whatever's left (possibly nothing). We track this with
    /// `forced_final_step` so we still run at most one such iteration rather
    /// than looping forever on an empty buffer, and gate it on still
    /// `Scanning` so a `NoMatch`/`once`
    /// pass-through already decided earlier in this same call can't be
    /// reopened.
    fn scan_buffer(&mut self, buf: &Buffer) -> Result<bool, FilterError> {
        let mut cursor = buf.pos();
        let mut data_emitted = false;
        let mut forced_final_step = false;

        loop {
            if cursor >= buf.last() {
                if buf.is_last_buf() && self.mode == Mode::Scanning && !forced_final_step {
                    forced_final_step = true;
                } else {
                    break;
                }
            }

            if self.owe_skip_byte {
                if cursor < buf.last() {
                    data_emitted |= self.emit_verbatim(buf, cursor, cursor + 1);
                    cursor += 1;
                }
                self.vm.force_advance();
                self.owe_skip_byte = false;
                continue;
            }

            let eof = buf.is_last_buf();
            let chunk = buf.slice(cursor, buf.last());
            let verdict = self.vm.step(&chunk, eof);
            trace!(?verdict, stream_pos = %self.stream_pos, cursor, "scan verdict");

            match verdict {
                Verdict::Match(from, to) => {
                    if from == to {
                        data_emitted |= self.flush_pending();
                        let at = self.rel_of(buf, from);
                        data_emitted |= self.emit_verbatim(buf, cursor, at);
                        self.emit_replacement();
                        data_emitted = true;
                        cursor = at;
                        if self.once {
                            data_emitted |= self.enter_pass_through(buf, cursor);
                            cursor = buf.last();
                        } else {
                            self.owe_skip_byte = true;
                        }
                    } else if to < self.stream_pos {
                        error!(to = %to, stream_pos = %self.stream_pos, "match rewinds past already-emitted bytes");
                        return Err(FilterError::LookBehindPastEmitted {
                            to: to.get(),
                            stream_pos: self.stream_pos.get(),
                        });
                    } else if from >= self.stream_pos {
                        data_emitted |= self.flush_pending();
                        let copy_end = self.rel_of(buf, from);
                        data_emitted |= self.emit_verbatim(buf, cursor, copy_end);
                        cursor = self.rel_of(buf, to);
                        self.emit_replacement();
                        data_emitted = true;
                        if self.once {
                            data_emitted |= self.enter_pass_through(buf, cursor);
                            cursor = buf.last();
                        }
                    } else {
                        // from < stream_pos <= to: the match reaches back
                        // into bytes already withheld in `pending`.
                        self.pending.discard_overlap(from);
                        data_emitted |= self.flush_pending();
                        cursor = self.rel_of(buf, to);
                        self.emit_replacement();
                        data_emitted = true;
                        if self.once {
                            data_emitted |= self.enter_pass_through(buf, cursor);
                            cursor = buf.last();
                        }
                    }
                }
                Verdict::Partial(from, to_opt) => {
                    let to = to_opt.unwrap_or_else(|| self.stream_pos.advance(buf.last() - cursor));
                    if from == to {
                        // `from == to` means the earliest surviving thread
                        // was only just spawned at the current position:
                        // nothing before it — including anything still
                        // withheld in `pending` — can be part of a future
                        // match, so it is all dead and safe to flush.
                        data_emitted |= self.flush_pending();
                        let at = self.rel_of(buf, from);
                        data_emitted |= self.emit_verbatim(buf, cursor, at);
                        cursor = at;
                    } else if from >= self.stream_pos {
                        data_emitted |= self.flush_pending();
                        let copy_end = self.rel_of(buf, from);
                        data_emitted |= self.emit_verbatim(buf, cursor, copy_end);
                        let tail = buf.slice(copy_end, buf.last());
                        let tail = self.alloc_buf(tail);
                        self.pending.push(PendingEntry { buffer: tail, abs_from: from, abs_to: to });
                        cursor = buf.last();
                    } else {
                        debug_assert_eq!(cursor, buf.pos(), "a partial reaching into pending can only start a buffer");
                        let carried = self.pending.split_for_partial(from);
                        data_emitted |= self.flush_pending();
                        for entry in carried {
                            self.pending.push(entry);
                        }
                        let whole = buf.slice(buf.pos(), buf.last());
                        let whole = self.alloc_buf(whole);
                        self.pending.push(PendingEntry { buffer: whole, abs_from: self.stream_pos, abs_to: to });
                        cursor = buf.last();
                    }
                }
                Verdict::NoMatch => {
                    data_emitted |= self.flush_pending();
                    data_emitted |= self.enter_pass_through(buf, cursor);
                    cursor = buf.last();
                }
            }
        }

        // `buf` was the last buffer of the body and we still drained out of
        // the loop in `Scanning` mode: no verdict ever resolved to `NoMatch`
        // (an always-matching pattern like `x*` never will, it keeps
        // producing fresh zero-width matches forever). No further input can
        // ever arrive, so there is nothing left for the VM to usefully say;
        // declare the request settled instead of leaving it `Scanning`
        // forever with no buffer left to advance it.
        if buf.is_last_buf() && self.mode == Mode::Scanning {
            debug!(stream_pos = %self.stream_pos, "end of stream reached while still scanning; no further matches are possible");
            self.mode = Mode::PassThrough;
            self.owe_skip_byte = false;
        }

        Ok(data_emitted)
    }

    /// Converts an absolute offset known to lie within `buf`'s live window
    /// into an index into `buf`'s own data.
    fn rel_of(&self, buf: &Buffer, abs: AbsOffset) -> usize {
        buf.pos() + self.stream_pos.distance_to(abs)
    }

    /// Wraps `data` as an output buffer, preferring a recycled cell off the
    /// free list over allocating a fresh one (§4.4/SPEC_FULL.md §C.5).
    fn alloc_buf(&mut self, data: Bytes) -> Buffer {
        match self.chains.take_free() {
            Some(recycled) => recycled.reuse(data),
            None => Buffer::from_bytes(data),
        }
    }

    /// Emits `buf[start..end)` as a zero-copy output buffer shadowing
    /// `buf`. Returns `false` (and emits nothing) for an empty range.
    fn emit_verbatim(&mut self, buf: &Buffer, start: usize, end: usize) -> bool {
        if end <= start {
            return false;
        }
        let slice = buf.slice(start, end);
        let out = self.alloc_buf(slice).with_shadow(buf.id());
        self.chains.push_out(out);
        true
    }

    /// Emits the configured replacement literal: a shared `Bytes` clone
    /// with no shadow, since it outlives every request (§5 "Resources").
    fn emit_replacement(&mut self) {
        let out = self.alloc_buf(self.replacement.clone());
        self.chains.push_out(out);
    }

    /// Drains `pending` to output in order. Returns whether anything was
    /// actually flushed.
    fn flush_pending(&mut self) -> bool {
        if self.pending.is_empty() {
            return false;
        }
        let mut flushed = VecDeque::new();
        self.pending.flush_into(&mut flushed);
        self.chains.extend_out(flushed);
        true
    }

    /// Switches into pass-through mode and flushes `buf`'s remainder
    /// verbatim. Returns whether anything was emitted.
    fn enter_pass_through(&mut self, buf: &Buffer, cursor: usize) -> bool {
        debug!(stream_pos = %self.stream_pos, "switching to pass-through mode");
        self.mode = Mode::PassThrough;
        self.emit_verbatim(buf, cursor, buf.last())
    }

    /// Per-buffer retirement bookkeeping (§4.2, §4.4): advances
    /// `stream_pos` past real (non-special) buffers, and synthesizes a
    /// sync buffer carrying forward end-of-stream/flush signalling when
    /// this buffer's own flags demanded it but nothing was emitted for it.
    fn finish_buffer(&mut self, buf: Buffer, data_emitted: bool) {
        if !buf.is_special() {
            self.stream_pos = self.stream_pos.advance(buf.last() - buf.pos());
        }

        let propagate = buf.flags
            & (BufFlags::LAST_BUF | BufFlags::FLUSH | BufFlags::SYNC | BufFlags::LAST_IN_CHAIN | BufFlags::RECYCLED);
        if !propagate.is_empty() && !data_emitted {
            self.chains.push_out(Buffer::special(propagate).with_shadow(buf.id()));
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config::ReplaceDirective;

    fn ctx(pattern: &str, replacement: &str, flags: &str) -> FilterContext {
        let directive = ReplaceDirective::parse(pattern, replacement, flags).expect("parses");
        FilterContext::new(&directive)
    }

    fn collect(out: VecDeque<Buffer>) -> Vec<u8> {
        out.iter().flat_map(|b| b.live().to_vec()).collect()
    }

    fn mem(bytes: &'static [u8]) -> Buffer {
        Buffer::from_bytes(Bytes::from_static(bytes))
    }

    fn last(bytes: &'static [u8]) -> Buffer {
        let mut b = mem(bytes);
        b.flags |= BufFlags::LAST_BUF;
        b
    }

    #[test]
    fn cross_buffer_match_s1() {
        let mut c = ctx("abc", "X", "");
        let (out1, status1) = c.on_body([mem(b"ab")]).expect("ok");
        assert!(collect(out1).is_empty());
        assert_eq!(status1, FilterStatus::Ok);
        let (out2, status2) = c.on_body([last(b"cdef")]).expect("ok");
        assert_eq!(collect(out2), b"Xdef");
        assert_eq!(status2, FilterStatus::Declined);
    }

    #[test]
    fn greedy_partial_across_buffers_s2() {
        let mut c = ctx("a+", "Z", "g");
        let (out1, _) = c.on_body([mem(b"aaa")]).expect("ok");
        assert!(collect(out1).is_empty());
        let (out2, _) = c.on_body([last(b"aab")]).expect("ok");
        assert_eq!(collect(out2), b"Zb");
    }

    #[test]
    fn empty_replacement_contiguous_matches_s3() {
        let mut c = ctx("foo", "", "g");
        let (out1, _) = c.on_body([mem(b"xfo")]).expect("ok");
        assert_eq!(collect(out1), b"x");
        let (out2, _) = c.on_body([last(b"oyfoo")]).expect("ok");
        assert_eq!(collect(out2), b"y");
    }

    #[test]
    fn replacement_longer_than_match_s4() {
        let mut c = ctx("x", "yy", "g");
        let (out1, _) = c.on_body([mem(b"axa")]).expect("ok");
        assert_eq!(collect(out1), b"ayya");
        let (out2, _) = c.on_body([last(b"x")]).expect("ok");
        assert_eq!(collect(out2), b"yy");
    }

    #[test]
    fn partial_match_rescission_s5() {
        let mut c = ctx("abcd", "Q", "g");
        let mut all = Vec::new();
        for chunk in [&b"a"[..], b"b", b"c", b"e"] {
            let (out, _) = c.on_body([mem(chunk)]).expect("ok");
            all.extend(collect(out));
        }
        let (out, _) = c.on_body([last(b"abcd")]).expect("ok");
        all.extend(collect(out));
        assert_eq!(all, b"abceQ");
    }

    #[test]
    fn special_buffer_then_last_buf_flush_s6() {
        let mut c = ctx("a", "A", "g");
        let special = Buffer::special(BufFlags::FLUSH);
        let (out1, _) = c.on_body([special]).expect("ok");
        assert!(collect(out1).is_empty());
        let (out2, _) = c.on_body([last(b"aa")]).expect("ok");
        assert_eq!(collect(out2), b"AA");
    }

    #[test]
    fn once_semantics_stop_after_first_match() {
        let mut c = ctx("a", "X", "");
        let (out, status) = c.on_body([last(b"aaa")]).expect("ok");
        assert_eq!(collect(out), b"Xaa");
        assert_eq!(status, FilterStatus::Declined);
    }

    #[test]
    fn pass_through_when_pattern_never_matches() {
        let mut c = ctx("zzz", "Q", "g");
        let (out, status) = c.on_body([last(b"hello world")]).expect("ok");
        assert_eq!(collect(out), b"hello world");
        assert_eq!(status, FilterStatus::Declined);
    }

    #[test]
    fn zero_width_pattern_inserts_between_every_byte_without_looping() {
        let mut c = ctx("x*", "_", "g");
        let (out, _) = c.on_body([last(b"ab")]).expect("ok");
        assert_eq!(collect(out), b"_a_b_");
    }

    #[test]
    fn trailing_empty_special_last_buf_resolves_an_open_partial_match() {
        // "abcd" straddling a real buffer and a zero-content terminal
        // buffer: the only way the dangling partial ever gets to declare
        // itself a `NoMatch` and flush `abc` is if the empty special
        // `last_buf` buffer still gets to consult the VM once.
        let mut c = ctx("abcd", "Q", "g");
        let (out1, status1) = c.on_body([mem(b"abc")]).expect("ok");
        assert!(collect(out1).is_empty());
        assert_eq!(status1, FilterStatus::Ok);

        let (out2, status2) = c.on_body([Buffer::special(BufFlags::LAST_BUF)]).expect("ok");
        assert_eq!(collect(out2), b"abc");
        assert_eq!(status2, FilterStatus::Declined);
    }

    #[test]
    fn zero_width_match_immediately_before_trailing_special_last_buf_does_not_loop() {
        let mut c = ctx("x*", "_", "g");
        let (out1, _) = c.on_body([mem(b"a")]).expect("ok");
        assert_eq!(collect(out1), b"_a");

        let (out2, status2) = c.on_body([Buffer::special(BufFlags::LAST_BUF)]).expect("ok");
        assert_eq!(collect(out2), b"_");
        assert_eq!(status2, FilterStatus::Declined);
    }

    #[test]
    fn look_behind_past_emitted_bytes_is_an_error() {
        // A well-formed VM adapter never actually produces this (our
        // PikeVm's `from`/`to` always stay within what has been fed), so
        // this exercises the error path directly rather than via `ctx`.
        let mut c = ctx("a", "X", "g");
        c.stream_pos = AbsOffset::new(5);
        let err = c.scan_buffer(&mem(b"a")).unwrap_err();
        assert!(matches!(err, FilterError::LookBehindPastEmitted { .. }));
    }
}
