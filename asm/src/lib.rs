//! The assembler front-end: a line-oriented lexer/parser (via `pest`),
//! a two-pass label resolver, and a thin synonym-expansion layer over
//! the core crate's encoder. Each call to [`assemble`] starts from
//! completely fresh parser/label state — there is no shared mutable
//! default anywhere in this crate.
//!
//! ## Assembly language
//!
//! A program is a sequence of lines. Each line may start with a label
//! declaration (`name:`), followed by either a directive or an
//! instruction. Comments start with `#` and run to end of line.
//!
//! Registers are written `r0`-`r15`, or by alias `zr`, `lr`, `sp`.
//! Label references are `$name` (absolute address) or `@name` (address
//! relative to the referencing instruction); purely numeric names are
//! local and resolved to the nearest `@Nf`/`@Nb` definition instead.
//!
//! Directives: `.space <n>` reserves `n` zero words, `.org <addr>` pads
//! up to an absolute address, `.int <value>` emits one raw word,
//! `.include "path"` splices another file's lines in place (one level
//! deep; see [`assemble_file`]).
//!
//! Convenience synonyms (`mov`, `ret`, `nop`, `push`, `pop`, `sll`,
//! `bit`, `bitx`) expand to their base mnemonic before encoding.

pub mod error;
pub mod labels;
mod parser;
mod syntax;

pub use error::AssembleError;

use labels::LabelTable;
use parser::{Rule, VasmParser};
use pest::iterators::Pair;
use pest::Parser as PestParserTrait;
use std::path::{Path, PathBuf};
use syntax::Slot;
use vcpu16::{encode, register, ImmOperand, Instruction, Mnemonic, Operands, PredTag};

pub type Result<T> = std::result::Result<T, AssembleError>;

#[derive(Clone, Debug)]
enum OperandTok {
    Register(u8),
    RegisterRange(u8, u8),
    Imm(ImmOperand),
}

struct InstrSrc {
    mnemonic: Mnemonic,
    operands: Vec<OperandTok>,
    pred_tag: Option<PredTag>,
    addr: u32,
}

enum Item {
    Instr(InstrSrc),
    Space(u32),
    Org(u32),
    IntLiteral(i32),
}

/// Assembles a complete source string (after any `.include` has already
/// been expanded by the caller, see [`assemble_file`]) into a flat
/// big-endian word stream.
pub fn assemble(source: &str) -> Result<Vec<u16>> {
    let program = VasmParser::parse(Rule::program, source)?.next().unwrap();
    let (items, labels) = pass1(program)?;
    pass2(&items, &labels)
}

/// Assembles a file, expanding a single level of `.include "path"`
/// (paths resolved relative to `path`'s directory). Nested includes are
/// not supported.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Vec<u16>> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .map_err(|e| AssembleError::IncludeIo(path.display().to_string(), e.to_string()))?;
    let expanded = expand_includes(&source, path.parent())?;
    assemble(&expanded)
}

fn expand_includes(source: &str, base_dir: Option<&Path>) -> Result<String> {
    let mut out = String::new();
    for line in source.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix(".include") {
            let rest = rest.trim();
            if rest.len() >= 2 && rest.starts_with('"') && rest.ends_with('"') {
                let name = &rest[1..rest.len() - 1];
                let path = base_dir.map(|d| d.join(name)).unwrap_or_else(|| PathBuf::from(name));
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| AssembleError::IncludeIo(path.display().to_string(), e.to_string()))?;
                out.push_str(&contents);
                out.push('\n');
                continue;
            }
        }
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}

fn parse_int_lit_str(s: &str) -> Result<i32> {
    let (neg, rest) = match s.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, s),
    };
    let value = if let Some(h) = rest.strip_prefix("0x") {
        i64::from_str_radix(h, 16)
    } else if let Some(b) = rest.strip_prefix("0b") {
        i64::from_str_radix(b, 2)
    } else if let Some(o) = rest.strip_prefix("0o") {
        i64::from_str_radix(o, 8)
    } else {
        rest.parse::<i64>()
    }
    .map_err(|_| AssembleError::ImmediateOutOfRange(0))?;
    Ok(if neg { -value } else { value } as i32)
}

fn parse_char_inner(s: &str) -> i32 {
    if let Some(escaped) = s.strip_prefix('\\') {
        match escaped {
            "0" => 0,
            "t" => b'\t' as i32,
            "n" => b'\n' as i32,
            "\"" => b'"' as i32,
            "'" => b'\'' as i32,
            _ => 0,
        }
    } else {
        s.chars().next().map(|c| c as i32).unwrap_or(0)
    }
}

fn parse_literal(pair: Pair<Rule>) -> Result<i32> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::int_lit => parse_int_lit_str(inner.as_str()),
        Rule::char_lit => {
            let ch = inner.into_inner().next().unwrap();
            Ok(parse_char_inner(ch.as_str()))
        }
        _ => Err(AssembleError::ImmediateOutOfRange(0)),
    }
}

/// A directive argument that must be a numeric literal (`.space`,
/// `.org`, `.int`); a `"string"` argument there is a user error rather
/// than a grammar-level impossibility, since `directive_arg` admits both.
fn literal_arg(arg: Pair<Rule>) -> Result<i32> {
    let inner = arg.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::literal => parse_literal(inner),
        _ => Err(AssembleError::ImmediateOutOfRange(0)),
    }
}

fn parse_register(pair: Pair<Rule>) -> Result<u8> {
    register::parse_name(pair.as_str()).ok_or_else(|| AssembleError::UnknownRegister(pair.as_str().to_string()))
}

fn parse_label_ref(pair: Pair<Rule>) -> Result<OperandTok> {
    let absolute = pair.as_str().starts_with('$');
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::local_ref => {
            let text = inner.as_str();
            let (num, suffix) = text.split_at(text.len() - 1);
            if absolute {
                return Err(AssembleError::LocalAbsoluteReference(num.to_string()));
            }
            let n: u32 = num.parse().unwrap_or(0);
            let imm = if suffix == "f" {
                ImmOperand::LocalForward(n, false)
            } else {
                ImmOperand::LocalBackward(n, false)
            };
            Ok(OperandTok::Imm(imm))
        }
        Rule::ident => {
            let name = inner.as_str().to_string();
            let imm = if absolute { ImmOperand::Absolute(name) } else { ImmOperand::Relative(name) };
            Ok(OperandTok::Imm(imm))
        }
        other => unreachable!("label_ref has unexpected inner rule {:?}", other),
    }
}

fn parse_operand(pair: Pair<Rule>) -> Result<OperandTok> {
    let inner = pair.into_inner().next().unwrap();
    match inner.as_rule() {
        Rule::register_range => {
            let mut regs = inner.into_inner();
            let r = parse_register(regs.next().unwrap())?;
            let s = parse_register(regs.next().unwrap())?;
            Ok(OperandTok::RegisterRange(r, s))
        }
        Rule::register => Ok(OperandTok::Register(parse_register(inner)?)),
        Rule::label_ref => parse_label_ref(inner),
        Rule::literal => Ok(OperandTok::Imm(ImmOperand::Value(parse_literal(inner)?))),
        other => unreachable!("operand has unexpected inner rule {:?}", other),
    }
}

/// Expands a convenience synonym into its base mnemonic and the operand
/// list that base mnemonic expects. The name mapping itself is the core
/// crate's `rewrite_synonym` table; the operand shape for each one is
/// this crate's own responsibility, since the core table is name-only.
fn expand_synonym(name: &str, operands: Vec<OperandTok>) -> Result<(String, Vec<OperandTok>)> {
    let zr = OperandTok::Register(0);
    let sp = OperandTok::Register(15);
    let lr = OperandTok::Register(14);
    match name {
        "mov" => {
            let mut it = operands.into_iter();
            let a = it.next().ok_or_else(|| AssembleError::UnknownMnemonic("mov needs 2 operands".into()))?;
            let x = it.next().ok_or_else(|| AssembleError::UnknownMnemonic("mov needs 2 operands".into()))?;
            Ok(("add".to_string(), vec![a, zr, x]))
        }
        "ret" => Ok(("j".to_string(), vec![lr])),
        "nop" => Ok(("add".to_string(), vec![zr.clone(), zr.clone(), zr])),
        "push" => {
            let rs = operands
                .into_iter()
                .next()
                .ok_or_else(|| AssembleError::UnknownMnemonic("push needs 1 operand".into()))?;
            Ok(("-st".to_string(), vec![rs, sp]))
        }
        "pop" => {
            let rd = operands
                .into_iter()
                .next()
                .ok_or_else(|| AssembleError::UnknownMnemonic("pop needs 1 operand".into()))?;
            Ok(("ld+".to_string(), vec![rd, sp]))
        }
        "sll" => {
            let mut it = operands.into_iter();
            let a = it.next().ok_or_else(|| AssembleError::UnknownMnemonic("sll needs 2 operands".into()))?;
            let b = it.next().ok_or_else(|| AssembleError::UnknownMnemonic("sll needs 2 operands".into()))?;
            Ok(("add".to_string(), vec![a, b.clone(), b]))
        }
        "bit" => Ok(("any".to_string(), operands)),
        "bitx" => Ok(("anyx".to_string(), operands)),
        other => Ok((other.to_string(), operands)),
    }
}

fn pass1(program: Pair<Rule>) -> Result<(Vec<Item>, LabelTable)> {
    let mut items = Vec::new();
    let mut labels = LabelTable::new();
    let mut addr: u32 = 0;
    let mut shadow_remaining: u32 = 0;

    for line_pair in program.into_inner() {
        if line_pair.as_rule() != Rule::line {
            continue;
        }
        let mut label_name: Option<&str> = None;
        let mut statement: Option<Pair<Rule>> = None;
        for inner in line_pair.into_inner() {
            match inner.as_rule() {
                Rule::label_decl => {
                    label_name = Some(inner.into_inner().next().unwrap().as_str());
                }
                Rule::statement => statement = Some(inner),
                _ => {}
            }
        }

        if let Some(name) = label_name {
            labels.define(name, addr)?;
        }

        let statement = match statement {
            Some(s) => s,
            None => continue,
        };
        let inner = statement.into_inner().next().unwrap();
        match inner.as_rule() {
            Rule::directive => {
                let full = inner.as_str().to_string();
                let full = full.trim_start();
                let mut arg_pairs = inner.into_inner();
                let arg = arg_pairs.next().unwrap();
                if full.starts_with(".space") {
                    let n = literal_arg(arg)? as u32;
                    items.push(Item::Space(n));
                    addr += n;
                } else if full.starts_with(".org") {
                    let target = literal_arg(arg)? as u32;
                    items.push(Item::Org(target));
                    addr = target;
                } else if full.starts_with(".int") {
                    let v = literal_arg(arg)?;
                    items.push(Item::IntLiteral(v));
                    addr += 1;
                } else if full.starts_with(".include") {
                    return Err(AssembleError::UnknownDirective(
                        "nested .include is not supported".to_string(),
                    ));
                } else {
                    return Err(AssembleError::UnknownDirective(full.to_string()));
                }
            }
            Rule::instruction => {
                let mut parts = inner.into_inner();
                let mnemonic_pair = parts.next().unwrap();
                let mut pred_tag = None;
                let mut operand_toks = Vec::new();
                for p in parts {
                    match p.as_rule() {
                        Rule::pred_tag => {
                            pred_tag = Some(if p.as_str() == ".t" { PredTag::True } else { PredTag::False });
                        }
                        Rule::operand => operand_toks.push(parse_operand(p)?),
                        _ => {}
                    }
                }

                let (name, operand_toks) = expand_synonym(mnemonic_pair.as_str(), operand_toks)?;
                let mnemonic =
                    Mnemonic::from_name(&name).ok_or_else(|| AssembleError::UnknownMnemonic(name.clone()))?;

                let in_shadow = shadow_remaining > 0;
                if in_shadow && pred_tag.is_none() {
                    return Err(AssembleError::MissingPredicateTag);
                }
                if !in_shadow && pred_tag.is_some() {
                    return Err(AssembleError::UnexpectedPredicateTag);
                }
                if in_shadow && mnemonic.is_shadow_setter() {
                    return Err(AssembleError::ShadowNesting(mnemonic.name().to_string()));
                }
                if in_shadow {
                    shadow_remaining -= 1;
                }

                if mnemonic == Mnemonic::Cex {
                    let k = match operand_toks.first() {
                        Some(OperandTok::Imm(ImmOperand::Value(v))) => *v as u32,
                        _ => 0,
                    };
                    if !vcpu16::constants::CEX_COUNT_RANGE.contains(&k) {
                        return Err(AssembleError::BadCexCount(k));
                    }
                    shadow_remaining = k;
                } else if mnemonic.is_compare_and_execute() {
                    shadow_remaining = 1;
                }

                let has_imm_slot = syntax::slots(mnemonic).iter().any(|s| matches!(s, Slot::RegOrImm(_)));
                let uses_imm = operand_toks.iter().any(|t| matches!(t, OperandTok::Imm(_)));
                let size = if has_imm_slot && uses_imm { 2 } else { 1 };

                items.push(Item::Instr(InstrSrc {
                    mnemonic,
                    operands: operand_toks,
                    pred_tag,
                    addr,
                }));
                addr += size;
            }
            other => unreachable!("statement has unexpected inner rule {:?}", other),
        }
    }

    Ok((items, labels))
}

fn resolve_imm(imm: &ImmOperand, labels: &LabelTable, pc: u32) -> Result<i32> {
    // A `@`-relative reference only ever resolves against an instruction
    // that itself carries the immediate word being resolved here, so it
    // is always 2 words wide; the already-advanced pc the simulator adds
    // this offset to at runtime is therefore always `pc + 2`, not `pc + 1`.
    match imm {
        ImmOperand::Value(v) => Ok(*v),
        ImmOperand::Absolute(name) => Ok(labels.resolve_absolute(name)? as i32),
        ImmOperand::Relative(name) => {
            let addr = labels.resolve_global_address(name)?;
            Ok(addr as i32 - (pc as i32 + 2))
        }
        ImmOperand::LocalForward(num, _) => {
            let addr = labels.resolve_local_forward(&num.to_string(), pc)?;
            Ok(addr as i32 - (pc as i32 + 2))
        }
        ImmOperand::LocalBackward(num, _) => {
            let addr = labels.resolve_local_backward(&num.to_string(), pc)?;
            Ok(addr as i32 - (pc as i32 + 2))
        }
    }
}

fn set_reg_field(operands: &mut Operands, op: vcpu16::Operand, value: u8) {
    use vcpu16::Operand::*;
    match op {
        A => operands.a = Some(value),
        B => operands.b = Some(value),
        C => operands.c = Some(value),
        R => operands.r = Some(value),
        S => operands.s = Some(value),
        M => operands.m = Some(value),
        N => operands.n = Some(value),
        J => operands.j = Some(value),
    }
}

fn build_instruction(src: &InstrSrc, labels: &LabelTable) -> Result<Instruction> {
    let mut operands = Operands::default();
    let mut imm_value: Option<i32> = None;

    for (tok, slot) in src.operands.iter().zip(syntax::slots(src.mnemonic)) {
        match (slot, tok) {
            (Slot::Reg(op), OperandTok::Register(r)) => set_reg_field(&mut operands, *op, *r),
            (Slot::RegOrImm(op), OperandTok::Register(r)) => set_reg_field(&mut operands, *op, *r),
            (Slot::RegOrImm(op), OperandTok::Imm(imm)) => {
                set_reg_field(&mut operands, *op, vcpu16::constants::SP_SENTINEL);
                imm_value = Some(resolve_imm(imm, labels, src.addr)?);
            }
            (Slot::RegRange, OperandTok::RegisterRange(r, s)) => {
                operands.r = Some(*r);
                operands.s = Some(*s);
            }
            (Slot::SmallImm(op), OperandTok::Imm(ImmOperand::Value(v))) => {
                set_reg_field(&mut operands, *op, *v as u8);
            }
            _ => {
                return Err(AssembleError::UnknownMnemonic(format!(
                    "operand shape mismatch for {}",
                    src.mnemonic
                )))
            }
        }
    }

    if let Some(v) = imm_value {
        let (lo, hi) = if src.mnemonic.immediate_is_signed() {
            (i16::MIN as i32, i16::MAX as i32)
        } else {
            (0, u16::MAX as i32)
        };
        if v < lo || v > hi {
            return Err(AssembleError::ImmediateOutOfRange(v as i64));
        }
        operands.imm = Some(ImmOperand::Value(v));
    }

    Ok(Instruction::new(src.mnemonic, operands).with_tag(src.pred_tag))
}

/// Builds the resolved instruction sequence immediately following `from`,
/// for the encoder's `cex` follower lookup. Only `Instr` items count; a
/// shadow is never expected to span raw data.
fn following_instructions(items: &[Item], from: usize, labels: &LabelTable) -> Result<Vec<Instruction>> {
    let mut out = Vec::new();
    for item in &items[from..] {
        if let Item::Instr(src) = item {
            out.push(build_instruction(src, labels)?);
        }
    }
    Ok(out)
}

fn pass2(items: &[Item], labels: &LabelTable) -> Result<Vec<u16>> {
    let mut out_words = Vec::new();
    let mut running_addr: u32 = 0;

    for (i, item) in items.iter().enumerate() {
        match item {
            Item::Org(target) => {
                while running_addr < *target {
                    out_words.push(0);
                    running_addr += 1;
                }
            }
            Item::Space(n) => {
                for _ in 0..*n {
                    out_words.push(0);
                    running_addr += 1;
                }
            }
            Item::IntLiteral(v) => {
                out_words.push(*v as u16);
                running_addr += 1;
            }
            Item::Instr(src) => {
                let instr = build_instruction(src, labels)?;
                let followers = following_instructions(items, i + 1, labels)?;
                let words = encode::encode(&instr, &followers)?;
                running_addr += words.len() as u32;
                out_words.extend(words);
            }
        }
    }

    Ok(out_words)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn scenario_one_add_with_immediate() {
        let words = assemble("add r1, zr, 0x1234\n").unwrap();
        assert_eq!(words, vec![0x001F, 0x1234]);
    }

    #[test]
    fn fresh_parser_state_per_invocation() {
        let a = assemble("loop: b @loop\n").unwrap();
        let b = assemble("loop: b @loop\n").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn global_label_redefinition_is_rejected() {
        let err = assemble("a: add r1,zr,zr\na: add r2,zr,zr\n");
        assert!(err.is_err());
    }

    #[test]
    fn missing_predicate_tag_inside_shadow_is_rejected() {
        let err = assemble("cex 1\nadd r1,zr,zr\n");
        assert!(err.is_err());
    }

    #[test]
    fn shadow_tagged_add_assembles() {
        let words = assemble("cex 1\nadd.t r1,zr,zr\n").unwrap();
        assert!(!words.is_empty());
    }

    #[test]
    fn synonyms_assemble_like_their_targets() {
        let nop = assemble("nop\n").unwrap();
        let explicit = assemble("add zr,zr,zr\n").unwrap();
        assert_eq!(nop, explicit);
    }

    #[test]
    fn space_and_org_pad_with_zero_words() {
        let words = assemble(".space 2\n.org 4\n.int 7\n").unwrap();
        assert_eq!(words, vec![0, 0, 0, 0, 7]);
    }
}
