mod assembler;
mod disassembler;
mod packet;
mod router;
mod session;

pub use packet::{RCPPacket, PAYLOAD, WINDOW};
pub use router::{Router, RouterConfig, Transport};
pub use session::Session;

use assembler::Assembler;
use disassembler::Disassembler;

/// True if `lhs` precedes `rhs` in sequence-number space, accounting for u32
/// wraparound. Mirrors the comparison TCP implementations use for SND/RCV
/// bookkeeping: a sequence is "old" if it sits more than half the number
/// space behind the one it's compared against.
fn wrapping_lt(lhs: u32, rhs: u32) -> bool {
    lhs.wrapping_sub(rhs) > (1u32 << 31)
}

/// `seq` is not older than `base` (`seq == base` counts as progress).
fn seq_advances(base: u32, seq: u32) -> bool {
    seq == base || wrapping_lt(base, seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_lt_handles_overflow() {
        assert!(wrapping_lt(u32::MAX, 0));
        assert!(!wrapping_lt(0, u32::MAX));
        assert!(wrapping_lt(5, 10));
        assert!(!wrapping_lt(10, 5));
    }

    #[test]
    fn seq_advances_allows_equal_and_forward() {
        assert!(seq_advances(10, 10));
        assert!(seq_advances(10, 11));
        assert!(!seq_advances(10, 9));
    }
}
