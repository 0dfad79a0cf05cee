//! Core data model, ISA tables, encoder/decoder, and behavioural
//! simulator shared by the assembler, disassembler, simulator CLI, and
//! test generator crates.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod error;
pub mod instruction;
pub mod isa;
pub mod register;
pub mod sim;

pub use error::{DecodeError, EncodeError, TickError};
pub use instruction::{ImmOperand, Instruction, Operands, PredTag};
pub use isa::{CompiledOpcode, Mnemonic, Operand};
pub use register::RegisterFile;
pub use sim::{CountOpMode, Io, Sim};
