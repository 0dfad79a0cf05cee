//! Architectural widths and fixed register slots.

pub const REGISTER_COUNT: usize = 16;
pub const WORD_WIDTH: u32 = 16;

/// `r0`, always reads as zero and ignores writes.
pub const REG_ZERO: u8 = 0;
/// `r14`, written by `bl`/`jl` before the jump.
pub const REG_LR: u8 = 14;
/// `r15`, the stack pointer; also the sentinel value of the `c` field
/// that signals "read the next word as an immediate".
pub const REG_SP: u8 = 15;

/// Value of a `c` operand that means "an immediate word follows".
pub const SP_SENTINEL: u8 = REG_SP;

/// Maximum size of a program image, in 16-bit words (§6: strictly < 64 KiB).
pub const MAX_WORDS: usize = 32768;

/// Inclusive range for the `j` immediate used by `cex`'s shadow length and
/// by the count-op configurators' duration, per §7(iii).
pub const CEX_COUNT_RANGE: std::ops::RangeInclusive<u32> = 1..=7;
