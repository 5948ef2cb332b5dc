//! The buffer type shared by every chain in the filter (input, pending,
//! output, busy, free, special).

use bitflags::bitflags;
use bytes::Bytes;

use crate::offset::AbsOffset;

bitflags! {
    /// Per-buffer signalling flags, mirroring the handful of bits the host
    /// buffer type carries alongside its payload.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct BufFlags: u16 {
        /// Payload lives in memory (as opposed to being file-backed).
        const MEMORY       = 1 << 0;
        /// Payload is file-backed; `file_pos`/`file_last` are byte offsets
        /// into that file, not stream offsets.
        const IN_FILE      = 1 << 1;
        /// Downstream should flush whatever it has buffered after this.
        const FLUSH        = 1 << 2;
        /// This buffer carries no new bytes, only propagated flags.
        const SYNC         = 1 << 3;
        /// This is the last buffer of the logical body.
        const LAST_BUF     = 1 << 4;
        /// This is the last buffer of the current chain (but not
        /// necessarily of the body — more may arrive in a later call).
        const LAST_IN_CHAIN = 1 << 5;
        /// The buffer cell has been returned to the free list at least once
        /// and is being handed out again.
        const RECYCLED     = 1 << 6;
        /// Payload is owned and temporary (as opposed to a long-lived
        /// reference such as the shared replacement literal).
        const TEMPORARY    = 1 << 7;
        /// A zero-content buffer whose only purpose is to carry flags
        /// (flush/sync/last-buf markers travelling through `special`).
        const SPECIAL      = 1 << 8;
    }
}

/// A back-reference pinning the lifetime of the input buffer an output
/// buffer's bytes were sliced from, or whose end-of-stream signalling an
/// output buffer is carrying forward.
///
/// Retiring a buffer that holds a shadow releases whatever it points at
/// (see [`crate::chains::ChainSet::release_busy_head`]); we model "release"
/// directly rather than via a pointer the way the host's arena-owned
/// buffers do, since `Bytes` is already reference-counted and dropping the
/// shadow is enough to let the input buffer's storage free itself once
/// every clone is gone.
#[derive(Debug, Clone)]
pub struct Shadow {
    /// An opaque token identifying which input buffer is pinned, used only
    /// for diagnostics and tests; the actual pinning is done by `Bytes`'s
    /// own refcount on the shared storage.
    pub input_id: u64,
}

/// An opaque region of bytes flowing through the filter.
///
/// `file_pos`/`file_last` carry *file* byte offsets when [`BufFlags::IN_FILE`]
/// is set, and are otherwise unused scratch fields on ordinary memory
/// buffers — they are never repurposed to hold stream offsets the way the
/// original module's did. Pending-chain entries track their absolute
/// stream range separately in [`crate::pending::PendingEntry`] (see design
/// note in `SPEC_FULL.md` §E).
#[derive(Debug, Clone)]
pub struct Buffer {
    data: Bytes,
    pos: usize,
    last: usize,
    pub flags: BufFlags,
    pub shadow: Option<Shadow>,
    pub file_pos: AbsOffset,
    pub file_last: AbsOffset,
    /// Identity used only to build [`Shadow`] back-references; assigned by
    /// the driver as input buffers are admitted (see
    /// `FilterContext::on_body`), otherwise `0`.
    id: u64,
}

impl Buffer {
    /// Wraps `data` as a plain in-memory buffer spanning its full length.
    pub fn from_bytes(data: Bytes) -> Self {
        let last = data.len();
        Buffer { data, pos: 0, last, flags: BufFlags::MEMORY, shadow: None, file_pos: AbsOffset::ZERO, file_last: AbsOffset::ZERO, id: 0 }
    }

    /// Refills a recycled cell (typically one just pulled off the free
    /// list, see [`crate::chains::ChainSet::take_free`]) with fresh payload,
    /// instead of allocating a brand-new `Buffer` from scratch (SPEC_FULL.md
    /// §C.5). Keeps whatever flags the cell already carries (e.g.
    /// `RECYCLED`) and adds `MEMORY`; the shadow, which only ever pointed at
    /// whatever this cell shadowed last time around, is cleared.
    pub fn reuse(mut self, data: Bytes) -> Self {
        self.last = data.len();
        self.pos = 0;
        self.data = data;
        self.flags |= BufFlags::MEMORY;
        self.shadow = None;
        self
    }

    /// A zero-content buffer carrying only flags.
    pub fn special(flags: BufFlags) -> Self {
        Buffer {
            data: Bytes::new(),
            pos: 0,
            last: 0,
            flags: flags | BufFlags::SPECIAL,
            shadow: None,
            file_pos: AbsOffset::ZERO,
            file_last: AbsOffset::ZERO,
            id: 0,
        }
    }

    /// Tags this buffer with an identity for shadow back-references.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pins this buffer's shadow to the given input buffer identity.
    pub fn with_shadow(mut self, input_id: u64) -> Self {
        self.shadow = Some(Shadow { input_id });
        self
    }

    /// The live window `[pos, last)` into `data`.
    pub fn live(&self) -> &[u8] {
        &self.data[self.pos..self.last]
    }

    /// A cheap `Bytes` clone of `[pos, last)`, sharing the backing storage.
    pub fn live_bytes(&self) -> Bytes {
        self.data.slice(self.pos..self.last)
    }

    /// A cheap `Bytes` clone of an arbitrary sub-range of the live window,
    /// given as offsets from the start of `data` (not from `pos`).
    pub fn slice(&self, start: usize, end: usize) -> Bytes {
        self.data.slice(start..end)
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn last(&self) -> usize {
        self.last
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// The number of unscanned bytes remaining in this buffer.
    pub fn remaining(&self) -> usize {
        self.last - self.pos
    }

    /// Shrinks the live window to its first `new_len` bytes, keeping `pos`
    /// fixed. Used when a pending entry is truncated because a match
    /// started partway through it.
    pub fn truncate_len(&mut self, new_len: usize) {
        self.last = self.pos + new_len;
    }

    pub fn is_special(&self) -> bool {
        self.flags.contains(BufFlags::SPECIAL)
    }

    pub fn is_last_buf(&self) -> bool {
        self.flags.contains(BufFlags::LAST_BUF)
    }

    /// Whether downstream has finished with this buffer (its size has hit
    /// zero), the signal the retirement rule polls for.
    pub fn is_drained(&self) -> bool {
        self.last == self.pos
    }
}
