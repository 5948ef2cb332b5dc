//! The four egress chains — `out`, `busy`, `free`, `special` — and the
//! retirement rule that moves buffers between them (§4.4/§4.5).

use std::collections::VecDeque;

use tracing::trace;

use crate::buffer::{Buffer, BufFlags};

/// Bookkeeping for the egress side of the filter: buffers produced this
/// iteration, buffers downstream still holds, buffers available for
/// reuse, and zero-content special buffers waiting for the next real
/// buffer to retire alongside them.
#[derive(Debug, Default)]
pub struct ChainSet {
    out: VecDeque<Buffer>,
    busy: VecDeque<Buffer>,
    free: VecDeque<Buffer>,
    special: VecDeque<Buffer>,
}

impl ChainSet {
    pub fn new() -> Self {
        ChainSet::default()
    }

    pub fn push_out(&mut self, buf: Buffer) {
        self.out.push_back(buf);
    }

    pub fn extend_out(&mut self, bufs: impl IntoIterator<Item = Buffer>) {
        self.out.extend(bufs);
    }

    pub fn out_is_empty(&self) -> bool {
        self.out.is_empty()
    }

    /// Hands the accumulated `out` chain to the caller and starts tracking
    /// clones of it on `busy` until each buffer's size hits zero
    /// (downstream signals this by reading it down to empty).
    pub fn send_downstream(&mut self) -> VecDeque<Buffer> {
        let out: VecDeque<Buffer> = std::mem::take(&mut self.out);
        self.busy.extend(out.iter().cloned());
        out
    }

    /// Marks the current head of `busy` fully read, then applies the
    /// retirement rule as far as it will go: a zero-sized special buffer
    /// moves to `special`; a zero-sized data buffer first flushes the
    /// entire accumulated `special` chain onto `free`, then itself.
    pub fn release_busy_head(&mut self) {
        if let Some(front) = self.busy.front_mut() {
            let last = front.last();
            front.set_pos(last);
        }
        self.drain_busy();
    }

    fn drain_busy(&mut self) {
        while let Some(front) = self.busy.front() {
            if !front.is_drained() {
                break;
            }
            let buf = self.busy.pop_front().expect("front just checked non-empty");
            if buf.is_special() {
                trace!("retiring special buffer onto the special chain");
                self.special.push_back(buf);
            } else {
                let spliced = self.special.len();
                self.free.extend(self.special.drain(..));
                self.free.push_back(buf);
                trace!(spliced, "retiring data buffer, splicing special run onto free");
            }
        }
    }

    /// Pulls a recycled cell from `free`, if any, clearing it to an empty
    /// memory buffer ready for reuse. Callers that get `None` allocate a
    /// fresh one themselves.
    pub fn take_free(&mut self) -> Option<Buffer> {
        self.free.pop_front().map(|mut buf| {
            buf.flags = BufFlags::MEMORY | BufFlags::RECYCLED;
            buf.shadow = None;
            buf
        })
    }

    pub fn busy_len(&self) -> usize {
        self.busy.len()
    }

    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    pub fn special_len(&self) -> usize {
        self.special.len()
    }
}
