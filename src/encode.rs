//! The encoder (§4.2): turns one structured [`Instruction`] into its 1 or
//! 2 packed 16-bit words. A pure function of `(instruction, followers)` —
//! the follower slice is only consulted for the `m` field of `cex`, and is
//! never mutated, per the "follower peek" redesign note.

use crate::error::EncodeError;
use crate::instruction::{ImmOperand, Instruction};
use crate::isa::{self, Operand};

fn scatter(value: u64, bits: &[u8], out: &mut u16) {
    // bits are listed MSB-first, matching how the pattern is consumed
    // left-to-right (§4.1); the i-th listed bit gets the i-th bit of value
    // counting down from the field's own MSB.
    let width = bits.len();
    for (i, bit) in bits.iter().enumerate() {
        let src_bit = (width - 1 - i) as u32;
        if (value >> src_bit) & 1 == 1 {
            *out |= 1 << bit;
        }
    }
}

fn check_width(mnemonic: crate::isa::Mnemonic, operand: Operand, value: i64, width: u32) -> Result<(), EncodeError> {
    let max = if width == 0 { 0 } else { (1i64 << width) - 1 };
    if value < 0 || value > max {
        Err(EncodeError::OperandOverflow {
            mnemonic,
            operand,
            value,
            width,
        })
    } else {
        Ok(())
    }
}

fn operand_value(instr: &Instruction, op: Operand) -> Option<i64> {
    let o = &instr.operands;
    match op {
        Operand::A => o.a.map(|v| v as i64),
        Operand::B => o.b.map(|v| v as i64),
        Operand::C => o.c.map(|v| v as i64),
        Operand::R => o.r.map(|v| v as i64),
        Operand::S => o.s.map(|v| v as i64),
        Operand::N => o.n.map(|v| v as i64),
        Operand::J => o.j.map(|v| v as i64),
        Operand::M => o.m.map(|v| v as i64),
    }
}

/// Encodes one instruction. `followers` is the remainder of the
/// instruction stream (not including `instr`); only `cex`'s `m` field
/// consults it.
pub fn encode(instr: &Instruction, followers: &[Instruction]) -> Result<Vec<u16>, EncodeError> {
    let opcode = isa::opcode_of(instr.mnemonic);
    let mut word = opcode.value;

    for (field, bits) in &opcode.fields {
        if *field == Operand::M {
            // Only `cex` has an `m` field; the requested count is the
            // instruction's own `m` operand (the assembler's `cex <n>`
            // argument), and the actual per-follower bits come from the
            // next `k` instructions' predicate tags.
            let k = operand_value(instr, Operand::M).unwrap_or(0) as u32;
            if k as usize > followers.len() {
                return Err(EncodeError::MissingFollowers {
                    mnemonic: instr.mnemonic,
                    need: k,
                    have: followers.len() as u32,
                });
            }
            let mut mask_value: u64 = 1u64 << k;
            for (i, follower) in followers.iter().take(k as usize).enumerate() {
                let tag = follower
                    .pred_tag
                    .ok_or(EncodeError::MissingPredicateTag)?;
                if matches!(tag, crate::instruction::PredTag::True) {
                    mask_value |= 1 << i;
                }
            }
            check_width(instr.mnemonic, Operand::M, mask_value as i64, bits.len() as u32)?;
            scatter(mask_value, bits, &mut word);
            continue;
        }

        let value = operand_value(instr, *field).unwrap_or(0);
        check_width(instr.mnemonic, *field, value, bits.len() as u32)?;
        scatter(value as u64, bits, &mut word);
    }

    let mut out = vec![word];
    if instr.has_immediate() {
        let raw = match &instr.operands.imm {
            Some(ImmOperand::Value(v)) => *v,
            _ => 0,
        };
        let (lo, hi) = if instr.mnemonic.immediate_is_signed() {
            (i16::MIN as i32, i16::MAX as i32)
        } else {
            (0, u16::MAX as i32)
        };
        if raw < lo || raw > hi {
            return Err(EncodeError::OperandOverflow {
                mnemonic: instr.mnemonic,
                operand: Operand::C,
                value: raw as i64,
                width: 16,
            });
        }
        out.push(raw as u16);
    }

    Ok(out)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instruction::Operands;
    use crate::isa::Mnemonic;

    #[test]
    fn add_with_immediate_encodes_to_scenario_bytes() {
        // add r1, zr, 0x1234 -> 0x001F 0x1234 (§8 scenario 1).
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
        let words = encode(&instr, &[]).unwrap();
        assert_eq!(words, vec![0x001F, 0x1234]);
    }

    #[test]
    fn operand_overflow_is_rejected() {
        let instr = Instruction::new(
            Mnemonic::In,
            Operands {
                a: Some(1),
                n: Some(7), // only 2 bits wide, max 3
                ..Default::default()
            },
        );
        assert!(encode(&instr, &[]).is_err());
    }
}
