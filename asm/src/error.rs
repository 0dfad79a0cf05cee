//! Assembler error taxonomy (§7 kinds i-iii), layered on top of the core
//! crate's [`vcpu16::EncodeError`] (kind iv) where assembly bottoms out in
//! a failed encode.

use crate::parser::Rule;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("{0}")]
    Lexical(Box<pest::error::Error<Rule>>),
    #[error("unknown directive {0:?}")]
    UnknownDirective(String),
    #[error("predicate-setting instruction {0} appears inside an active shadow (no nesting)")]
    ShadowNesting(String),
    #[error("instruction inside a predicate shadow is missing its .t/.f tag")]
    MissingPredicateTag,
    #[error("instruction outside a predicate shadow may not carry a .t/.f tag")]
    UnexpectedPredicateTag,
    #[error("cex count {0} is out of range 1..=7")]
    BadCexCount(u32),
    #[error("immediate {0} is out of range [-32768, 65535]")]
    ImmediateOutOfRange(i64),
    #[error("sp may never be written as a literal c operand")]
    SpInCSlot,
    #[error("unknown mnemonic {0:?}")]
    UnknownMnemonic(String),
    #[error("unknown register {0:?}")]
    UnknownRegister(String),
    #[error("absolute reference to multiply-defined label {0:?}")]
    MultiplyDefinedLabel(String),
    #[error("local label {0:?} may only be referenced relatively (@, not $)")]
    LocalAbsoluteReference(String),
    #[error("undefined label {0:?}")]
    UndefinedLabel(String),
    #[error("could not read included file {0:?}: {1}")]
    IncludeIo(String, String),
    #[error(transparent)]
    Encode(#[from] vcpu16::EncodeError),
}

impl From<pest::error::Error<Rule>> for AssembleError {
    fn from(err: pest::error::Error<Rule>) -> AssembleError {
        AssembleError::Lexical(Box::new(err))
    }
}
