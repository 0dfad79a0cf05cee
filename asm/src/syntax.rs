//! Per-mnemonic textual operand order (§4.5's prose, e.g. `add a,b,c[,imm]`)
//! — distinct from the encoder's bit-field order and from the
//! disassembler's pretty-print order (`r,s,a,b,n,c,m,j`, §4.1).

use vcpu16::{Mnemonic, Operand};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Slot {
    /// Must be a register.
    Reg(Operand),
    /// Register, or a literal/label — the latter selects the `sp`
    /// sentinel and an immediate word.
    RegOrImm(Operand),
    /// `r..s` register range.
    RegRange,
    /// A literal packed directly into the named field (`m`, `n`, `j`);
    /// never triggers the immediate-word mechanism.
    SmallImm(Operand),
}

pub fn slots(mnemonic: Mnemonic) -> &'static [Slot] {
    use Mnemonic::*;
    use Operand as Op;
    use Slot::*;
    match mnemonic {
        Add | Sub | And | Or | Xor | Andn => &[Reg(Op::A), Reg(Op::B), RegOrImm(Op::C)],
        Ld | St => &[Reg(Op::A), Reg(Op::B), RegOrImm(Op::C)],
        Ldm | Stm => &[RegRange, Reg(Op::B)],
        Not | Inc | Dec => &[Reg(Op::A), Reg(Op::B)],
        Addpc => &[Reg(Op::A), RegOrImm(Op::C)],
        Srl | Sra | Ror | Rol => &[Reg(Op::A), Reg(Op::B)],
        LdPreInc | LdPostInc | LdPreDec | LdPostDec => &[Reg(Op::A), Reg(Op::B)],
        StPreInc | StPostInc | StPreDec | StPostDec => &[Reg(Op::A), Reg(Op::B)],
        Eq | Ne | Lt | Ltu | Ge | Geu | Any | Eqx | Nex | Ltx | Ltux | Gex | Geux | Anyx => {
            &[Reg(Op::B), Reg(Op::C)]
        }
        Getp => &[Reg(Op::A)],
        Putp => &[RegOrImm(Op::C)],
        Cex => &[SmallImm(Op::M)],
        B | J | Bl | Jl => &[RegOrImm(Op::C)],
        Carry | Andp | Orp => &[SmallImm(Op::J)],
        In => &[Reg(Op::A), SmallImm(Op::N)],
        Out | Outn => &[SmallImm(Op::N), RegOrImm(Op::C)],
        Outp | Inp | Inpx => &[SmallImm(Op::N)],
        Utx => &[RegOrImm(Op::C)],
        Urx => &[Reg(Op::A)],
    }
}
