//! Absolute stream offsets.
//!
//! Match coordinates returned by the VM and stored in the pending chain are
//! positions in the *logical* response body, counted from its first byte.
//! They must never be confused with positions inside whatever buffer happens
//! to be in hand right now (`Buffer::pos`/`Buffer::last`, or a file's own byte
//! offsets when `Buffer` shadows file-backed data). Giving them a distinct
//! type makes that confusion a compile error instead of an off-by-one bug.

use std::fmt;
use std::ops::{Add, Sub};

/// A byte position in the logical response body, counted from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AbsOffset(u64);

impl AbsOffset {
    /// The offset of the first byte of the stream.
    pub const ZERO: AbsOffset = AbsOffset(0);

    /// Creates an absolute offset from a raw byte count.
    pub const fn new(value: u64) -> Self {
        AbsOffset(value)
    }

    /// Returns the raw byte count.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Returns `self + len`, as an absolute offset.
    pub fn advance(self, len: usize) -> Self {
        AbsOffset(self.0 + len as u64)
    }

    /// Returns the number of bytes between `self` and a later offset.
    ///
    /// Panics if `other` is before `self`; callers are expected to have
    /// already established the ordering.
    pub fn distance_to(self, other: AbsOffset) -> usize {
        (other.0 - self.0) as usize
    }
}

impl fmt::Display for AbsOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<usize> for AbsOffset {
    type Output = AbsOffset;

    fn add(self, rhs: usize) -> AbsOffset {
        AbsOffset(self.0 + rhs as u64)
    }
}

impl Sub<AbsOffset> for AbsOffset {
    type Output = i64;

    fn sub(self, rhs: AbsOffset) -> i64 {
        self.0 as i64 - rhs.0 as i64
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn advance_moves_forward_by_len() {
        let start = AbsOffset::new(10);
        assert_eq!(start.advance(5), AbsOffset::new(15));
    }

    #[test]
    fn distance_to_counts_bytes_between() {
        let a = AbsOffset::new(10);
        let b = AbsOffset::new(17);
        assert_eq!(a.distance_to(b), 7);
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(AbsOffset::new(3) < AbsOffset::new(4));
        assert_eq!(AbsOffset::ZERO, AbsOffset::new(0));
    }
}
