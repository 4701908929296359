/// RTP sequence number arithmetic (RFC 3550 §A.1)
///
/// Sequence numbers are 16-bit counters that wrap at 65536. Two numbers are
/// ordered by the shorter way around the circle: `a` is before `b` when
/// `b - a` (mod 2^16) lies in `1..0x8000`. Every ordering decision in the
/// jitter buffer goes through these helpers.

use std::cmp::Ordering;

/// Half of the sequence space. Distances at or above this flip direction.
const HALF_WINDOW: u16 = 0x8000;

/// Check if `a` is before `b` (handles wraparound)
///
/// Exactly half the space apart, the numerically larger value counts as
/// before, so every distinct pair is ordered one way.
#[inline]
pub fn seq_lt(a: u16, b: u16) -> bool {
    let diff = b.wrapping_sub(a);
    diff > 0 && (diff < HALF_WINDOW || (diff == HALF_WINDOW && a > b))
}

#[inline]
pub fn seq_le(a: u16, b: u16) -> bool {
    a == b || seq_lt(a, b)
}

#[inline]
pub fn seq_gt(a: u16, b: u16) -> bool {
    seq_lt(b, a)
}

/// Total ordering under the half-window rule.
///
/// Not transitive across more than half the space, so only use it on values
/// known to sit inside one window (the contents of a single jitter buffer).
pub fn seq_cmp(a: u16, b: u16) -> Ordering {
    if a == b {
        Ordering::Equal
    } else if seq_lt(a, b) {
        Ordering::Less
    } else {
        Ordering::Greater
    }
}

/// Forward distance from `from` to `to` (mod 2^16)
#[inline]
pub fn seq_distance(from: u16, to: u16) -> u16 {
    to.wrapping_sub(from)
}

/// True when `next` immediately follows `prev`, including 65535 -> 0
#[inline]
pub fn is_next(prev: u16, next: u16) -> bool {
    prev.wrapping_add(1) == next
}



/// Kani formal verification proofs
#[cfg(kani)]
mod kani_proofs {
    use super::*;

    #[kani::proof]
    fn lt_is_antisymmetric() {
        let a: u16 = kani::any();
        let b: u16 = kani::any();
        kani::assert(!(seq_lt(a, b) && seq_lt(b, a)), "lt must be antisymmetric");
    }

    #[kani::proof]
    fn distinct_values_are_ordered() {
        let a: u16 = kani::any();
        let b: u16 = kani::any();
        kani::assume(a != b);
        kani::assert(seq_lt(a, b) ^ seq_lt(b, a), "distinct values must be ordered one way");
    }

    #[kani::proof]
    fn successor_always_after() {
        let a: u16 = kani::any();
        kani::assert(seq_lt(a, a.wrapping_add(1)), "a + 1 must be after a");
    }
}
