//! The pending chain: byte regions that have been scanned but withheld
//! from output because they might still be part of a match in progress.
//!
//! Each entry owns its bytes (they must outlive the input buffer they were
//! copied from) and carries its absolute `[abs_from, abs_to)` range as its
//! own fields, deliberately kept separate from [`crate::buffer::Buffer`]'s
//! `file_pos`/`file_last` (see `SPEC_FULL.md` §E) rather than overloading
//! them the way the source this was distilled from did.

use std::collections::VecDeque;

use crate::buffer::{Buffer, BufFlags};
use crate::offset::AbsOffset;

/// One withheld byte region.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub buffer: Buffer,
    pub abs_from: AbsOffset,
    pub abs_to: AbsOffset,
}

/// The pending chain itself: a prefix-ordered, non-overlapping queue of
/// [`PendingEntry`] values.
#[derive(Debug, Default)]
pub struct Pending {
    entries: VecDeque<PendingEntry>,
}

impl Pending {
    pub fn new() -> Self {
        Pending { entries: VecDeque::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a freshly copied region to the tail of the chain.
    pub fn push(&mut self, entry: PendingEntry) {
        if let Some(last) = self.entries.back() {
            debug_assert!(
                last.abs_to <= entry.abs_from,
                "pending entries must stay non-overlapping and ordered"
            );
        }
        self.entries.push_back(entry);
    }

    /// Drains every entry into `out`, in order, as plain output buffers.
    pub fn flush_into(&mut self, out: &mut VecDeque<Buffer>) {
        for entry in self.entries.drain(..) {
            let mut buf = entry.buffer;
            buf.flags |= BufFlags::TEMPORARY;
            out.push_back(buf);
        }
    }

    /// Implements the pending-overlap resolution used when a *confirmed*
    /// match (§4.3's `Match` handling) reaches back into pending: finds
    /// the first entry overlapping `[from, ..)` and either truncates it to
    /// the portion strictly before `from` (discarding everything after
    /// it), or — if it starts at or after `from` — discards it and
    /// everything after it outright. What survives is a strict prefix
    /// untouched by the match and safe to flush verbatim.
    pub fn discard_overlap(&mut self, from: AbsOffset) {
        let Some(idx) = self.entries.iter().position(|e| e.abs_to > from) else {
            return;
        };

        let mut overlapping = self.entries[idx].clone();
        self.entries.truncate(idx);

        if overlapping.abs_from < from {
            let keep = overlapping.abs_from.distance_to(from);
            overlapping.buffer.truncate_len(keep);
            overlapping.abs_to = from;
            self.entries.push_back(overlapping);
        }
    }

    /// Implements the pending-overlap resolution used when a *partial*
    /// match (§4.3's `Partial` handling) reaches back into pending: the
    /// portion of the first overlapping entry strictly before `from` stays
    /// behind (safe to flush), while `from` onward — plus every entry
    /// after it — is still possibly part of the in-progress match and is
    /// returned so the caller can fold it into the new pending chain
    /// alongside a fresh copy of the current buffer's remainder.
    pub fn split_for_partial(&mut self, from: AbsOffset) -> VecDeque<PendingEntry> {
        let Some(idx) = self.entries.iter().position(|e| e.abs_to > from) else {
            return VecDeque::new();
        };

        let tail = self.entries.split_off(idx);
        let mut tail_iter = tail.into_iter();
        let mut first = tail_iter.next().expect("idx was a valid position");

        let mut carried = VecDeque::new();
        if first.abs_from < from {
            let keep = first.abs_from.distance_to(from);
            let mut prefix = first.clone();
            prefix.buffer.truncate_len(keep);
            prefix.abs_to = from;
            self.entries.push_back(prefix);

            first.buffer.set_pos(first.buffer.pos() + keep);
            first.abs_from = from;
        }
        carried.push_back(first);
        carried.extend(tail_iter);
        carried
    }

    /// Total bytes currently withheld, for diagnostics and property tests.
    pub fn byte_len(&self) -> usize {
        self.entries.iter().map(|e| e.buffer.remaining()).sum()
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> &VecDeque<PendingEntry> {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;
    use bytes::Bytes;

    fn entry(from: u64, to: u64, bytes: &'static [u8]) -> PendingEntry {
        PendingEntry {
            buffer: Buffer::from_bytes(Bytes::from_static(bytes)),
            abs_from: AbsOffset::new(from),
            abs_to: AbsOffset::new(to),
        }
    }

    #[test]
    fn truncates_entry_that_starts_before_match() {
        let mut p = Pending::new();
        p.push(entry(0, 5, b"abcde"));
        p.discard_overlap(AbsOffset::new(3));
        assert_eq!(p.entries().len(), 1);
        assert_eq!(p.entries()[0].buffer.live(), b"abc");
        assert_eq!(p.entries()[0].abs_to, AbsOffset::new(3));
    }

    #[test]
    fn cuts_whole_entry_that_starts_at_or_after_match() {
        let mut p = Pending::new();
        p.push(entry(0, 2, b"ab"));
        p.push(entry(2, 5, b"cde"));
        p.discard_overlap(AbsOffset::new(2));
        assert_eq!(p.entries().len(), 1);
        assert_eq!(p.entries()[0].buffer.live(), b"ab");
    }

    #[test]
    fn untouched_prefix_survives_and_flushes_in_order() {
        let mut p = Pending::new();
        p.push(entry(0, 2, b"ab"));
        p.push(entry(2, 6, b"cdef"));
        p.discard_overlap(AbsOffset::new(4));
        assert_eq!(p.entries().len(), 2);
        assert_eq!(p.entries()[1].buffer.live(), b"cd");

        let mut out = VecDeque::new();
        p.flush_into(&mut out);
        let all: Vec<u8> = out.iter().flat_map(|b| b.live().to_vec()).collect();
        assert_eq!(all, b"abcd");
    }
}
