//! The decoder (§4.3): the inverse of the encoder, plus the
//! predicate-shadow tracking state machine that spans the whole decoded
//! stream.

use crate::error::DecodeError;
use crate::instruction::{Instruction, Operands, PredTag};
use crate::isa::{self, Mnemonic, Operand};

fn gather(word: u16, bits: &[u8]) -> u32 {
    // Inverse of encode::scatter: bits are listed MSB-first; rebuild the
    // field value with its own MSB first.
    let mut value: u32 = 0;
    for bit in bits {
        value = (value << 1) | ((word >> bit) & 1) as u32;
    }
    value
}

fn set_operand(operands: &mut Operands, field: Operand, value: u32) {
    match field {
        Operand::A => operands.a = Some(value as u8),
        Operand::B => operands.b = Some(value as u8),
        Operand::C => operands.c = Some(value as u8),
        Operand::R => operands.r = Some(value as u8),
        Operand::S => operands.s = Some(value as u8),
        Operand::N => operands.n = Some(value as u8),
        Operand::J => operands.j = Some(value as u8),
        Operand::M => operands.m = Some(value as u8),
    }
}

/// Decodes a single instruction starting at `words[0]`, consuming a second
/// word as a signed/unsigned immediate if the mnemonic requires one.
/// Returns the instruction and the number of 16-bit words consumed.
pub fn decode_one(words: &[u16]) -> Result<(Instruction, u32), DecodeError> {
    let word = *words.first().ok_or(DecodeError::NoMatchingOpcode(0))?;
    let opcode = isa::decode_opcode(word).ok_or(DecodeError::NoMatchingOpcode(word))?;

    let mut operands = Operands::default();
    for (field, bits) in &opcode.fields {
        set_operand(&mut operands, *field, gather(word, bits));
    }

    let has_c_sentinel = operands.c == Some(crate::constants::SP_SENTINEL);
    let mut size = 1;
    if has_c_sentinel {
        let raw = *words.get(1).ok_or(DecodeError::NoMatchingOpcode(word))?;
        let value = if opcode.mnemonic.immediate_is_signed() {
            raw as i16 as i32
        } else {
            raw as i32
        };
        operands.imm = Some(crate::instruction::ImmOperand::Value(value));
        size = 2;
    }

    Ok((Instruction::new(opcode.mnemonic, operands), size))
}

/// Decodes a raw `m` value (terminator-bit plus lower flag bits, as
/// produced by the encoder's `cex` handling) into the ordered list of
/// follower tags, front-to-back. Shared by the decoder's display-only
/// [`ShadowTracker`] and the simulator's runtime `cond` register, since
/// both use the same bit-queue representation.
pub fn shadow_bits_from_m(m: u32) -> Vec<bool> {
    if m == 0 {
        return Vec::new();
    }
    let k = 31 - m.leading_zeros(); // position of the high terminator bit
    (0..k).map(|i| (m >> i) & 1 == 1).collect()
}

/// Tracks the predicate-shadow bit queue across a decoded instruction
/// stream (§4.3). `push` is called once per decoded instruction, in
/// order; it returns the tag that instruction should be stamped with.
#[derive(Clone, Debug, Default)]
pub struct ShadowTracker {
    queue: std::collections::VecDeque<bool>,
}

impl ShadowTracker {
    pub fn new() -> ShadowTracker {
        ShadowTracker::default()
    }

    /// Advances the tracker past one already-decoded instruction and
    /// returns the tag it should carry (`None` outside any shadow).
    pub fn advance(&mut self, instr: &Instruction) -> Option<PredTag> {
        let tag = self.queue.pop_front().map(|t| if t { PredTag::True } else { PredTag::False });

        if instr.mnemonic == Mnemonic::Cex {
            let m = instr.operands.m.unwrap_or(0) as u32;
            self.queue.extend(shadow_bits_from_m(m));
        } else if instr.mnemonic.is_compare_and_execute() {
            self.queue.push_back(true);
        }

        tag
    }

    pub fn is_active(&self) -> bool {
        !self.queue.is_empty()
    }
}

/// Decodes a whole byte stream (an even number of bytes, big-endian
/// words) into structured instructions, stamping each with its predicate
/// tag from the shadow tracker. `max_items` optionally stops decoding
/// early (§4.3's "max-items early termination").
pub fn decode_stream(bytes: &[u8], max_items: Option<usize>) -> Result<Vec<Instruction>, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    let words: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]])).collect();

    let mut out = Vec::new();
    let mut tracker = ShadowTracker::new();
    let mut i = 0usize;
    while i < words.len() {
        if let Some(max) = max_items {
            if out.len() >= max {
                break;
            }
        }
        let (mut instr, size) = decode_one(&words[i..])?;
        let tag = tracker.advance(&instr);
        instr.pred_tag = tag;
        out.push(instr);
        i += size as usize;
    }
    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_is_inverse_of_encode() {
        use crate::instruction::{ImmOperand, Operands};

        let instr = Instruction::new(
            Mnemonic::Add,
            Operands {
                a: Some(1),
                b: Some(0),
                c: Some(15),
                imm: Some(ImmOperand::Value(0x1234)),
                ..Default::default()
            },
        );
        let words = crate::encode::encode(&instr, &[]).unwrap();
        let (decoded, size) = decode_one(&words).unwrap();
        assert_eq!(size, 2);
        assert_eq!(decoded.mnemonic, Mnemonic::Add);
        assert_eq!(decoded.operands.a, Some(1));
        assert_eq!(decoded.operands.b, Some(0));
        assert_eq!(decoded.operands.c, Some(15));
    }

    #[test]
    fn cex_shadow_tags_two_followers() {
        // cex 2; add.t r1,zr,zr; add.f r2,zr,zr -- followers get t/f tags
        // drawn from m's decoded bits, per §8 scenario 3's shape.
        use crate::instruction::Operands;

        let cex = Instruction::new(Mnemonic::Cex, Operands { m: Some(0b110), ..Default::default() });
        let add1 = Instruction::new(Mnemonic::Add, Operands::default());
        let add2 = Instruction::new(Mnemonic::Add, Operands::default());

        let mut tracker = ShadowTracker::new();
        assert_eq!(tracker.advance(&cex), None);
        assert_eq!(tracker.advance(&add1), Some(PredTag::True));
        assert_eq!(tracker.advance(&add2), Some(PredTag::False));
        assert!(!tracker.is_active());
    }

    #[test]
    fn compare_and_execute_pushes_single_true_follower() {
        let eqx = Instruction::new(Mnemonic::Eqx, Operands::default());
        let mut tracker = ShadowTracker::new();
        assert_eq!(tracker.advance(&eqx), None);
        let follower = Instruction::new(Mnemonic::Add, Operands::default());
        assert_eq!(tracker.advance(&follower), Some(PredTag::True));
    }
}
