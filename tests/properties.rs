//! Property-based tests for the six quantified invariants of §8: byte
//! conservation, chunking independence, pass-through idempotence, and
//! `once` semantics. Feeds the same logical stream through the public
//! `FilterContext` API split into arbitrarily many (and arbitrarily sized,
//! including empty) input buffers, and checks the result against a naive
//! whole-stream reference replace.

use std::collections::VecDeque;

use bytes::Bytes;
use proptest::prelude::*;
use replace_filter::{BufFlags, Buffer, FilterContext, FilterStatus, ReplaceDirective};

const PATTERN: &str = "abc";
const REPLACEMENT: &[u8] = b"X";

/// A ground truth for what the filter is supposed to do to a whole,
/// unchunked stream: scan for non-overlapping occurrences of `PATTERN` left
/// to right, replacing each with `REPLACEMENT` (or only the first, if
/// `once`).
fn naive_replace(input: &[u8], once: bool) -> Vec<u8> {
    let pattern = PATTERN.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    let mut replaced = false;
    while i < input.len() {
        let can_replace = !once || !replaced;
        if can_replace && input[i..].starts_with(pattern) {
            out.extend_from_slice(REPLACEMENT);
            i += pattern.len();
            replaced = true;
        } else {
            out.push(input[i]);
            i += 1;
        }
    }
    out
}

/// Cuts `input` into chunks at `splits` (clamped into range, not
/// deduplicated, so adjacent equal split points yield an empty chunk
/// between them — the "empty buffers interleaved" case §8 calls out).
fn chunks_from_splits(input: &[u8], splits: &[usize]) -> Vec<Vec<u8>> {
    let len = input.len();
    let mut points: Vec<usize> = splits.iter().map(|&p| p.min(len)).collect();
    points.push(0);
    points.push(len);
    points.sort_unstable();

    let mut chunks = Vec::new();
    for w in points.windows(2) {
        chunks.push(input[w[0]..w[1]].to_vec());
    }
    chunks
}

/// Drives a fresh [`FilterContext`] over `chunks`, one input buffer per
/// chunk, the last one carrying `LAST_BUF`, collecting everything emitted.
///
/// A chunk that happens to be empty (a degenerate split point) is modeled
/// as a special buffer rather than a zero-content memory buffer: per the
/// glossary, a buffer with no live bytes carries only control flags, it is
/// never a "real" data buffer with nothing in it.
fn run_chunks(chunks: &[Vec<u8>], once: bool) -> Vec<u8> {
    let directive = ReplaceDirective::parse(PATTERN, "X", if once { "" } else { "g" }).expect("directive parses");
    let mut ctx = FilterContext::new(&directive);
    let mut out = Vec::new();

    let last_idx = chunks.len().saturating_sub(1);
    for (idx, chunk) in chunks.iter().enumerate() {
        let is_last = idx == last_idx;
        let buf = match (chunk.is_empty(), is_last) {
            (true, true) => Buffer::special(BufFlags::LAST_BUF),
            (true, false) => Buffer::special(BufFlags::empty()),
            (false, true) => last_buf(chunk),
            (false, false) => mem_buf(chunk),
        };
        let (produced, status) = ctx.on_body([buf]).expect("scans cleanly");
        out.extend(collect(produced));
        if is_last {
            assert_eq!(status, FilterStatus::Declined, "last buffer must resolve the request");
        }
    }
    out
}

fn mem_buf(bytes: &[u8]) -> Buffer {
    Buffer::from_bytes(Bytes::copy_from_slice(bytes))
}

fn last_buf(bytes: &[u8]) -> Buffer {
    let mut buf = mem_buf(bytes);
    buf.flags |= BufFlags::LAST_BUF;
    buf
}

fn collect(out: VecDeque<Buffer>) -> Vec<u8> {
    out.iter().flat_map(|b| b.live().to_vec()).collect()
}

/// Bytes drawn from a tiny alphabet so `PATTERN` actually occurs with
/// reasonable frequency in generated inputs — a uniform `u8` strategy would
/// almost never produce "abc".
fn stream() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop_oneof![Just(b'a'), Just(b'b'), Just(b'c'), Just(b'd')], 0..40)
}

fn stream_with_splits() -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
    with_splits(stream())
}

/// Bytes drawn from an alphabet disjoint from `PATTERN`'s letters, so no
/// chunking could ever assemble an occurrence of it.
fn stream_without_pattern() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop_oneof![Just(b'x'), Just(b'y'), Just(b'z')], 0..40)
}

fn stream_without_pattern_with_splits() -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
    with_splits(stream_without_pattern())
}

fn with_splits(inner: impl Strategy<Value = Vec<u8>>) -> impl Strategy<Value = (Vec<u8>, Vec<usize>)> {
    inner.prop_flat_map(|input| {
        let len = input.len();
        let splits = prop::collection::vec(0..=len, 0..8);
        (Just(input), splits)
    })
}

proptest! {
    /// Property 1 (byte conservation): whatever the chunking, the filter's
    /// concatenated output equals the same substitution applied to the
    /// whole stream at once.
    #[test]
    fn prop_byte_conservation_global((input, splits) in stream_with_splits()) {
        let chunks = chunks_from_splits(&input, &splits);
        let got = run_chunks(&chunks, false);
        let want = naive_replace(&input, false);
        prop_assert_eq!(got, want);
    }

    /// Property 6 (once semantics): with `once` set, at most the first
    /// match is replaced and everything after it — even further
    /// occurrences — passes through verbatim.
    #[test]
    fn prop_byte_conservation_once((input, splits) in stream_with_splits()) {
        let chunks = chunks_from_splits(&input, &splits);
        let got = run_chunks(&chunks, true);
        let want = naive_replace(&input, true);
        prop_assert_eq!(got, want);
    }

    /// Property 2 (chunking independence): two unrelated ways of splitting
    /// the same stream produce byte-identical output.
    #[test]
    fn prop_chunking_independence(
        input in stream(),
        splits_a in prop::collection::vec(0..usize::MAX, 0..8),
        splits_b in prop::collection::vec(0..usize::MAX, 0..8),
    ) {
        let chunks_a = chunks_from_splits(&input, &splits_a);
        let chunks_b = chunks_from_splits(&input, &splits_b);
        prop_assert_eq!(run_chunks(&chunks_a, false), run_chunks(&chunks_b, false));
    }

    /// Property 3 (pass-through idempotence): a stream with no possible
    /// occurrence of the pattern is emitted byte-for-byte unchanged,
    /// regardless of chunking.
    #[test]
    fn prop_pass_through_when_pattern_absent((input, splits) in stream_without_pattern_with_splits()) {
        let chunks = chunks_from_splits(&input, &splits);
        let got = run_chunks(&chunks, false);
        prop_assert_eq!(got, input);
    }
}
