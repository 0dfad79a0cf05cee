//! The disassembler: recovers a structured, human-readable listing from
//! a binary image by decoding each instruction in turn and tracking the
//! same predicate-shadow state the assembler's discipline check enforces
//! (the decoder's [`vcpu16::decode::ShadowTracker`]).

use vcpu16::decode::{decode_one, ShadowTracker};
use vcpu16::DecodeError;

/// One decoded instruction: its address, the raw words it occupies, and
/// its rendered mnemonic/operand text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    pub addr: u16,
    pub words: Vec<u16>,
    pub text: String,
}

/// Decodes every instruction in `words`, in address order, stamping each
/// with its predicate tag from a fresh shadow tracker.
pub fn disassemble(words: &[u16]) -> Result<Vec<Line>, DecodeError> {
    let mut out = Vec::new();
    let mut tracker = ShadowTracker::new();
    let mut i = 0usize;
    while i < words.len() {
        let (mut instr, size) = decode_one(&words[i..])?;
        instr.pred_tag = tracker.advance(&instr);
        let addr = i as u16;
        let raw = words[i..i + size as usize].to_vec();
        out.push(Line { addr, words: raw, text: instr.to_string() });
        i += size as usize;
    }
    Ok(out)
}

fn addr_hex(addr: u16) -> String {
    format!("{:04X}", addr)
}

fn payload(line: &Line) -> String {
    let hex: Vec<String> = line.words.iter().map(|w| format!("{:04X}", w)).collect();
    format!("{}  {}", hex.join(" "), line.text)
}

/// Renders a decoded listing to text, one line per instruction. Runs of
/// three or more consecutive instructions with identical payload (same
/// words, same mnemonic/operand text) are collapsed into a single
/// `first * last` line, since only the address differs across the run.
pub fn format_lines(lines: &[Line]) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < lines.len() {
        let mut j = i + 1;
        while j < lines.len() && payload(&lines[j]) == payload(&lines[i]) {
            j += 1;
        }
        let run_len = j - i;
        if run_len >= 3 {
            out.push_str(&format!(
                "{} * {}:  {}\n",
                addr_hex(lines[i].addr),
                addr_hex(lines[j - 1].addr),
                payload(&lines[i])
            ));
        } else {
            for line in &lines[i..j] {
                out.push_str(&format!("{}:  {}\n", addr_hex(line.addr), payload(line)));
            }
        }
        i = j;
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use vcpu16::{Instruction, Mnemonic, Operands};

    #[test]
    fn scenario_one_add_with_immediate_disassembles() {
        let instr = Instruction::new(
            Mnemonic::Add,
            Operands {
                a: Some(1),
                b: Some(0),
                c: Some(15),
                imm: Some(vcpu16::ImmOperand::Value(0x1234)),
                ..Default::default()
            },
        );
        let words = vcpu16::encode::encode(&instr, &[]).unwrap();
        let lines = disassemble(&words).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].addr, 0);
        assert!(lines[0].text.starts_with("add"));
    }

    #[test]
    fn runs_of_three_identical_lines_are_merged() {
        let nop = Instruction::new(Mnemonic::Add, Operands::default());
        let words = vcpu16::encode::encode(&nop, &[]).unwrap();
        let mut program = Vec::new();
        for _ in 0..5 {
            program.extend(&words);
        }
        let lines = disassemble(&program).unwrap();
        let text = format_lines(&lines);
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains('*'));
    }

    #[test]
    fn short_runs_are_not_merged() {
        let nop = Instruction::new(Mnemonic::Add, Operands::default());
        let words = vcpu16::encode::encode(&nop, &[]).unwrap();
        let mut program = Vec::new();
        for _ in 0..2 {
            program.extend(&words);
        }
        let lines = disassemble(&program).unwrap();
        let text = format_lines(&lines);
        assert_eq!(text.lines().count(), 2);
    }
}
