//! The simulator CLI's I/O harness (§4.5, §6): a [`vcpu16::sim::Io`]
//! implementation backed by a pre-decoded instruction table, a flat
//! memory map, UART input/output queues, and scheduled pin events. Also
//! exposes the YAML test-script shape so `vgen16` can write scripts this
//! crate reads back, and can drive a `vcpu16::sim::Sim` as a reusable
//! oracle.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use vcpu16::decode::{decode_one, ShadowTracker};
use vcpu16::sim::{Io, Sim};
use vcpu16::{DecodeError, Instruction, TickError};

const END_MARKER: &[u8; 7] = b"@@END@@";

/// One scheduled pin-state change, as read from a YAML script's
/// `input_pin` list.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct PinEvent {
    pub time: u64,
    #[serde(default)]
    pub pins: HashMap<u8, bool>,
}

/// The YAML test-script shape (§6): every key optional. `vgen16` writes
/// these; this crate's CLI reads them back.
#[derive(Clone, Debug, Deserialize, Serialize, Default)]
pub struct Script {
    #[serde(default)]
    pub input: Vec<u16>,
    #[serde(default)]
    pub output: Vec<u16>,
    #[serde(default)]
    pub input_pin: Vec<PinEvent>,
}

/// Outcome of driving a [`Harness`] to completion or exhaustion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    /// The program reached `@@END@@` and transmitted this exit code.
    Exited(u16),
    /// The tick budget elapsed before the program reached `@@END@@`.
    BudgetExhausted,
}

/// A [`vcpu16::sim::Io`] implementation backed by a flat memory map, a
/// pre-decoded instruction table, and UART/pin queues.
///
/// The instruction table is built once from the whole image rather than
/// decoded fresh on each `fetch`. Predicate-shadow tags are a property
/// of decode-time program order — `ShadowTracker` walks the image
/// front-to-back exactly once — so decoding lazily at whatever address
/// a branch lands on would re-derive shadow state from the wrong
/// starting point instead of the program's real layout.
pub struct Harness {
    program: HashMap<u16, (Instruction, u32)>,
    mem: HashMap<u16, u16>,
    uart_in: VecDeque<u16>,
    uart_out: Vec<u16>,
    pending: Vec<u16>,
    pins: [bool; 4],
    pin_schedule: Vec<PinEvent>,
    tick: u64,
    awaiting_exit_code: bool,
    exit_code: Option<u16>,
}

impl Harness {
    pub fn new(words: &[u16]) -> Result<Harness, DecodeError> {
        Harness::with_input(words, Vec::new(), Vec::new())
    }

    pub fn with_input(words: &[u16], uart_in: Vec<u16>, pin_schedule: Vec<PinEvent>) -> Result<Harness, DecodeError> {
        let mut program = HashMap::new();
        let mut tracker = ShadowTracker::new();
        let mut i = 0usize;
        while i < words.len() {
            let (mut instr, size) = decode_one(&words[i..])?;
            instr.pred_tag = tracker.advance(&instr);
            program.insert(i as u16, (instr, size));
            i += size as usize;
        }
        Ok(Harness {
            program,
            mem: HashMap::new(),
            uart_in: uart_in.into(),
            uart_out: Vec::new(),
            pending: Vec::new(),
            pins: [false; 4],
            pin_schedule,
            tick: 0,
            awaiting_exit_code: false,
            exit_code: None,
        })
    }

    /// Seeds the memory map, for a generator (or test) that wants to
    /// pre-populate addresses the program will read before writing.
    pub fn set_mem(&mut self, addr: u16, value: u16) {
        self.mem.insert(addr, value);
    }

    pub fn uart_out(&self) -> &[u16] {
        &self.uart_out
    }

    pub fn exit_code(&self) -> Option<u16> {
        self.exit_code
    }

    fn apply_pin_schedule(&mut self) {
        for event in &self.pin_schedule {
            if event.time == self.tick {
                for (&n, &v) in &event.pins {
                    if let Some(slot) = self.pins.get_mut(n as usize) {
                        *slot = v;
                    }
                }
            }
        }
    }

    /// Drives `sim` through `self` until the program reaches `@@END@@`
    /// or `budget` ticks elapse, applying any scheduled pin events
    /// before each tick.
    pub fn run(&mut self, sim: &mut Sim, budget: u64) -> Result<RunOutcome, TickError> {
        for _ in 0..budget {
            self.apply_pin_schedule();
            sim.tick(self)?;
            self.tick += 1;
            if let Some(code) = self.exit_code {
                return Ok(RunOutcome::Exited(code));
            }
        }
        Ok(RunOutcome::BudgetExhausted)
    }
}

impl Io for Harness {
    fn fetch(&mut self, pc: u16) -> Result<(Instruction, u32), TickError> {
        self.program
            .get(&pc)
            .cloned()
            .ok_or(TickError::Decode { pc, source: DecodeError::NoMatchingOpcode(pc) })
    }

    fn read_mem(&mut self, addr: u16) -> Result<u16, TickError> {
        self.mem.get(&addr).copied().ok_or(TickError::UninitializedMemory(addr))
    }

    fn write_mem(&mut self, addr: u16, value: u16) {
        self.mem.insert(addr, value);
    }

    fn read_uart(&mut self) -> Result<u16, TickError> {
        self.uart_in.pop_front().ok_or(TickError::EmptyUartInput)
    }

    fn write_uart(&mut self, value: u16) {
        if self.awaiting_exit_code {
            self.exit_code = Some(value);
            self.awaiting_exit_code = false;
            return;
        }
        let low = (value & 0xff) as u8;
        if low == END_MARKER[self.pending.len()] {
            self.pending.push(value);
            if self.pending.len() == END_MARKER.len() {
                self.awaiting_exit_code = true;
                self.pending.clear();
            }
            return;
        }
        self.uart_out.append(&mut self.pending);
        if low == END_MARKER[0] {
            self.pending.push(value);
        } else {
            self.uart_out.push(value);
        }
    }

    fn read_pin(&mut self, n: u8) -> bool {
        self.pins.get(n as usize).copied().unwrap_or(false)
    }

    fn write_pin(&mut self, n: u8, value: bool) {
        if let Some(slot) = self.pins.get_mut(n as usize) {
            *slot = value;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use vcpu16::{ImmOperand, Instruction, Mnemonic, Operands};

    fn assemble_one(instr: &Instruction) -> Vec<u16> {
        vcpu16::encode::encode(instr, &[]).unwrap()
    }

    #[test]
    fn scenario_one_add_runs_to_completion() {
        let add = Instruction::new(
            Mnemonic::Add,
            Operands { a: Some(1), b: Some(0), c: Some(15), imm: Some(ImmOperand::Value(0x1234)), ..Default::default() },
        );
        let mut words = assemble_one(&add);
        words.extend(assemble_one(&Instruction::new(
            Mnemonic::B,
            Operands { c: Some(15), imm: Some(ImmOperand::Value(0)), ..Default::default() },
        )));
        let mut harness = Harness::new(&words).unwrap();
        let mut sim = Sim::new();
        let outcome = harness.run(&mut sim, 10).unwrap();
        assert_eq!(outcome, RunOutcome::BudgetExhausted);
        assert_eq!(sim.regs.read(1), 0x1234);
    }

    #[test]
    fn end_marker_is_excluded_from_uart_out_and_exit_code_captured() {
        let mut harness = Harness::new(&[]).unwrap();
        for byte in END_MARKER {
            harness.write_uart(*byte as u16);
        }
        assert!(harness.uart_out().is_empty());
        assert_eq!(harness.exit_code(), None);
        harness.write_uart(7);
        assert_eq!(harness.exit_code(), Some(7));
        assert!(harness.uart_out().is_empty());
    }

    #[test]
    fn ordinary_uart_writes_pass_through() {
        let mut harness = Harness::new(&[]).unwrap();
        harness.write_uart(0x41);
        harness.write_uart(0x42);
        assert_eq!(harness.uart_out(), &[0x41, 0x42]);
    }

    #[test]
    fn script_deserializes_with_all_keys_optional() {
        let script: Script = serde_yaml::from_str("input: [1, 2]\n").unwrap();
        assert_eq!(script.input, vec![1, 2]);
        assert!(script.output.is_empty());
        assert!(script.input_pin.is_empty());

        let empty: Script = serde_yaml::from_str("{}\n").unwrap();
        assert!(empty.input.is_empty());
    }
}
