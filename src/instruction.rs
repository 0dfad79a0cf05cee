//! The structured instruction value (§3, §9): a tagged variant per
//! mnemonic holding exactly the operands that mnemonic needs, plus the
//! trace-only predicate tag and the display/order table synonym rewriting
//! constructs from.

use crate::isa::Mnemonic;
use std::fmt;

/// `.t`/`.f` suffix recorded on an instruction inside a predicate shadow.
/// Trace-only: it does not affect encoding beyond the assembler's
/// discipline check (§4.4) and is restamped by the decoder from the
/// shadow queue (§4.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PredTag {
    True,
    False,
}

impl fmt::Display for PredTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PredTag::True => ".t",
            PredTag::False => ".f",
        })
    }
}

/// Either a resolved register/literal operand value, or (assembler pass 1
/// only) an unresolved label reference kept as the source text so pass 2
/// can look it up once every label address is known (§4.4).
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImmOperand {
    Value(i32),
    /// `$name` — absolute reference.
    Absolute(String),
    /// `@name` — PC-relative reference.
    Relative(String),
    /// `$<num>f` / `@<num>f` — nearest local label strictly forward.
    LocalForward(u32, bool),
    /// `$<num>b` / `@<num>b` — nearest local label at-or-before.
    LocalBackward(u32, bool),
}

/// The operand bag for one instruction. Not every field is meaningful for
/// every mnemonic; which ones are is entirely determined by
/// `isa::opcode_of(mnemonic)`'s compiled field list.
#[derive(Clone, Debug, Default)]
pub struct Operands {
    pub a: Option<u8>,
    pub b: Option<u8>,
    pub c: Option<u8>,
    pub r: Option<u8>,
    pub s: Option<u8>,
    pub m: Option<u8>,
    pub n: Option<u8>,
    pub j: Option<u8>,
    /// Present iff this instruction carries a trailing immediate word
    /// (signalled by `c == sp` sentinel).
    pub imm: Option<ImmOperand>,
}

/// One fully parsed/decoded instruction.
#[derive(Clone, Debug)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub operands: Operands,
    pub pred_tag: Option<PredTag>,
}

impl Instruction {
    pub fn new(mnemonic: Mnemonic, operands: Operands) -> Instruction {
        Instruction {
            mnemonic,
            operands,
            pred_tag: None,
        }
    }

    pub fn with_tag(mut self, tag: Option<PredTag>) -> Instruction {
        self.pred_tag = tag;
        self
    }

    /// Number of 16-bit words this instruction occupies once encoded.
    pub fn size(&self) -> u32 {
        if self.has_immediate() {
            2
        } else {
            1
        }
    }

    pub fn has_immediate(&self) -> bool {
        self.operands.imm.is_some()
    }
}

/// Display order for operands, independent of encoding bit position:
/// `r, s, a, b, n, c, m, j` (per §4.1).
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        if let Some(tag) = self.pred_tag {
            write!(f, "{}", tag)?;
        }
        let mut parts = Vec::new();
        if let (Some(r), Some(s)) = (self.operands.r, self.operands.s) {
            parts.push(format!("{}..{}", crate::register::display_name(r), crate::register::display_name(s)));
        }
        if let Some(a) = self.operands.a {
            parts.push(crate::register::display_name(a).to_string());
        }
        if let Some(b) = self.operands.b {
            parts.push(crate::register::display_name(b).to_string());
        }
        if let Some(n) = self.operands.n {
            parts.push(format!("{}", n));
        }
        // An immediate, when present, occupies the c slot's display
        // position: the sentinel value encoded in `operands.c` alongside
        // it (`SP_SENTINEL`) is an encoding artifact, not a second operand.
        if let Some(ImmOperand::Value(v)) = &self.operands.imm {
            parts.push(format!("{}", v));
        } else if let Some(c) = self.operands.c {
            parts.push(crate::register::display_name(c).to_string());
        }
        if let Some(m) = self.operands.m {
            parts.push(format!("{:#x}", m));
        }
        if let Some(j) = self.operands.j {
            parts.push(format!("{}", j));
        }
        if !parts.is_empty() {
            write!(f, " {}", parts.join(","))?;
        }
        Ok(())
    }
}

/// Synonym rewriting (§4.1): performed after parsing, before encoding.
/// `bit`/`bitx` are accepted as legacy aliases of `any`/`anyx` per the
/// open-question resolution; `out1` is deliberately absent.
pub fn rewrite_synonym(name: &str) -> Option<&'static str> {
    match name {
        "mov" => Some("add"),
        "ret" => Some("j"),
        "nop" => Some("add"),
        "push" => Some("-st"),
        "pop" => Some("ld+"),
        "sll" => Some("add"),
        "bit" => Some("any"),
        "bitx" => Some("anyx"),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn synonyms_map_to_real_mnemonics() {
        for (_syn, target) in [
            ("mov", "add"),
            ("ret", "j"),
            ("nop", "add"),
            ("push", "-st"),
            ("pop", "ld+"),
            ("sll", "add"),
            ("bit", "any"),
            ("bitx", "anyx"),
        ] {
            assert!(Mnemonic::from_name(target).is_some());
        }
    }

    #[test]
    fn out1_is_not_a_mnemonic() {
        assert!(Mnemonic::from_name("out1").is_none());
    }
}
