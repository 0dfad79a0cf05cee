//! Error taxonomy for the core crate: encoding failures (§7 kind iv) and
//! runtime/tick failures (§7 kind v). The assembler crate layers its own
//! lexical/syntactic/semantic errors (§7 kinds i-iii) on top of
//! `EncodeError` where assembly bottoms out in a failed encode.

use crate::isa::{Mnemonic, Operand};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{mnemonic} operand {operand:?} value {value} does not fit in {width} bits")]
    OperandOverflow {
        mnemonic: Mnemonic,
        operand: Operand,
        value: i64,
        width: u32,
    },
    #[error("{mnemonic} needs {need} predicated follower(s) but only {have} remain")]
    MissingFollowers { mnemonic: Mnemonic, need: u32, have: u32 },
    #[error("instruction inside a predicate shadow is missing its .t/.f tag")]
    MissingPredicateTag,
    #[error("absolute reference to multiply-defined label {0:?}")]
    MultiplyDefinedLabel(String),
    #[error("local label {0:?} may only be referenced relatively (@, not $)")]
    LocalAbsoluteReference(String),
    #[error("undefined label {0:?}")]
    UndefinedLabel(String),
    #[error("sp may never be encoded in the c operand of {0}")]
    SpInCSlot(Mnemonic),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no mnemonic's opcode pattern matches word {0:#06x}")]
    NoMatchingOpcode(u16),
    #[error("binary length {0} is odd; words are 2 bytes")]
    OddLength(usize),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TickError {
    #[error("read from uninitialized memory at address {0:#06x}")]
    UninitializedMemory(u16),
    #[error("read from empty UART input queue")]
    EmptyUartInput,
    #[error("tick budget of {0} exhausted before reaching @@END@@")]
    BudgetExhausted(u64),
    #[error("decode error at pc {pc:#06x}: {source}")]
    Decode {
        pc: u16,
        #[source]
        source: DecodeError,
    },
}
