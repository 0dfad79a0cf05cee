//! The behavioural simulator (§4.5): a single-stepping interpreter that
//! holds all architectural state and dispatches every side effect through
//! an [`Io`] capability object, so the same core serves both the `vsim16`
//! CLI and the `vgen16` test generator's oracle use (§9's capability
//! redesign note — the simulator is polymorphic only over the capability
//! set, never over its own state).

use crate::constants::{REG_LR, SP_SENTINEL};
use crate::error::TickError;
use crate::instruction::{ImmOperand, Instruction};
use crate::isa::Mnemonic;
use crate::register::RegisterFile;
use std::collections::VecDeque;

/// Capability interface the simulator dispatches every side effect
/// through. A test generator and a hardware scoreboard each implement
/// their own `Io`; the simulator never depends on which.
pub trait Io {
    /// Fetches and decodes the instruction at `pc`, returning it along
    /// with its size in words (1 or 2).
    fn fetch(&mut self, pc: u16) -> Result<(Instruction, u32), TickError>;
    fn read_mem(&mut self, addr: u16) -> Result<u16, TickError>;
    fn write_mem(&mut self, addr: u16, value: u16);
    fn read_uart(&mut self) -> Result<u16, TickError>;
    fn write_uart(&mut self, value: u16);
    fn read_pin(&mut self, n: u8) -> bool;
    fn write_pin(&mut self, n: u8, value: bool);

    /// Observer hooks; the hardware test bench's scoreboard contract
    /// listens on these. Default to no-ops.
    fn write_reg(&mut self, _reg: u8, _value: u16) {}
    fn write_pred(&mut self, _p: bool) {}
    fn write_cond(&mut self, _cond: &VecDeque<bool>) {}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CountOpMode {
    None,
    Carry,
    AndP,
    OrP,
}

/// All architectural state (§3), mutated only by [`Sim::tick`].
#[derive(Clone, Debug)]
pub struct Sim {
    pub regs: RegisterFile,
    pub pc: u16,
    pub p: bool,
    pub cond: VecDeque<bool>,
    pub cin: bool,
    pub count_op: CountOpMode,
    count_remaining: u32,
    count_just_set: bool,
    pub pins_out: [bool; 4],
    pub ticks: u64,
}

impl Default for Sim {
    fn default() -> Sim {
        Sim {
            regs: RegisterFile::new(),
            pc: 0,
            p: false,
            cond: VecDeque::new(),
            cin: false,
            count_op: CountOpMode::None,
            count_remaining: 0,
            count_just_set: false,
            pins_out: [false; 4],
            ticks: 0,
        }
    }
}

impl Sim {
    pub fn new() -> Sim {
        Sim::default()
    }

    /// Runs `tick` repeatedly until the tick budget is exhausted or a
    /// handler returns an error. Callers that want to stop at the
    /// `@@END@@` UART marker should use an [`Io`] that signals that
    /// condition back through `write_uart`/their own bookkeeping and
    /// break the loop themselves; `run` enforces only the budget.
    pub fn run(&mut self, io: &mut dyn Io, budget: u64) -> Result<(), TickError> {
        for _ in 0..budget {
            self.tick(io)?;
        }
        Ok(())
    }

    /// Executes exactly one instruction (§4.5's tick algorithm).
    pub fn tick(&mut self, io: &mut dyn Io) -> Result<(), TickError> {
        let fetch_pc = self.pc;
        let (instr, size) = io.fetch(fetch_pc)?;
        let next_pc = fetch_pc.wrapping_add(size as u16);

        let consumed = self.cond.pop_front();
        let execute = consumed.map_or(true, |bit| bit == self.p);

        let mut redirect = None;
        if execute {
            redirect = self.dispatch(io, &instr, next_pc)?;
        }

        self.pc = redirect.unwrap_or(next_pc);

        if self.count_just_set {
            self.count_just_set = false;
        } else if self.count_op != CountOpMode::None {
            self.count_remaining -= 1;
            if self.count_remaining == 0 {
                self.count_op = CountOpMode::None;
            }
        }

        self.ticks += 1;
        Ok(())
    }

    fn read_c_or_imm(&self, instr: &Instruction, signed: bool) -> i32 {
        match (instr.operands.c, &instr.operands.imm) {
            (Some(c), Some(ImmOperand::Value(v))) if c == SP_SENTINEL => *v,
            (Some(c), _) => {
                let raw = self.regs.read(c);
                if signed {
                    raw as i16 as i32
                } else {
                    raw as i32
                }
            }
            (None, Some(ImmOperand::Value(v))) => *v,
            (None, None) => 0,
            _ => 0,
        }
    }

    fn compare(&mut self, instr: &Instruction) -> bool {
        let b = self.regs.read(instr.operands.b.unwrap());
        let c = self.regs.read(instr.operands.c.unwrap());
        match instr.mnemonic {
            Mnemonic::Eq | Mnemonic::Eqx => b == c,
            Mnemonic::Ne | Mnemonic::Nex => b != c,
            Mnemonic::Lt | Mnemonic::Ltx => (b as i16) < (c as i16),
            Mnemonic::Ge | Mnemonic::Gex => (b as i16) >= (c as i16),
            Mnemonic::Ltu | Mnemonic::Ltux => b < c,
            Mnemonic::Geu | Mnemonic::Geux => b >= c,
            Mnemonic::Any | Mnemonic::Anyx => (b & c) != 0,
            _ => unreachable!("compare() called on non-comparison mnemonic"),
        }
    }

    /// Shifts/rotations step by exactly one bit, and writeback loads/stores
    /// step their base register by exactly one word: the 16-bit patterns
    /// for both (`aaaabbbb` plus 8 opcode bits) leave no spare field for a
    /// variable amount, so the step is architecturally fixed rather than
    /// read from an operand.
    fn fixed_step(&self) -> u32 {
        1
    }

    fn dispatch(&mut self, io: &mut dyn Io, instr: &Instruction, next_pc: u16) -> Result<Option<u16>, TickError> {
        use Mnemonic::*;
        let o = &instr.operands;

        match instr.mnemonic {
            Add | Sub | And | Or | Xor | Andn => {
                let b = self.regs.read(o.b.unwrap());
                let c = self.read_c_or_imm(instr, instr.mnemonic.immediate_is_signed());
                let c16 = c as u16;
                let (result, new_cin) = match instr.mnemonic {
                    Add => {
                        let cin_in = if self.count_op == CountOpMode::Carry { self.cin as u32 } else { 0 };
                        let sum = b as u32 + c16 as u32 + cin_in;
                        (sum as u16, sum > 0xffff)
                    }
                    Sub => {
                        let cin_in = if self.count_op == CountOpMode::Carry { self.cin as u32 } else { 0 };
                        let diff = b as i64 - c16 as i64 - cin_in as i64;
                        (diff as u16, diff < 0)
                    }
                    And => (b & c16, self.cin),
                    Or => (b | c16, self.cin),
                    Xor => (b ^ c16, self.cin),
                    Andn => (b & !c16, self.cin),
                    _ => unreachable!(),
                };
                self.set_reg(io, o.a.unwrap(), result);
                if matches!(instr.mnemonic, Add | Sub) {
                    self.cin = new_cin;
                }
                Ok(None)
            }
            Not => {
                let b = self.regs.read(o.b.unwrap());
                self.set_reg(io, o.a.unwrap(), !b);
                Ok(None)
            }
            Inc => {
                let b = self.regs.read(o.b.unwrap());
                self.set_reg(io, o.a.unwrap(), b.wrapping_add(1));
                Ok(None)
            }
            Dec => {
                let b = self.regs.read(o.b.unwrap());
                self.set_reg(io, o.a.unwrap(), b.wrapping_sub(1));
                Ok(None)
            }
            Addpc => {
                let c = self.read_c_or_imm(instr, true);
                self.set_reg(io, o.a.unwrap(), self.pc.wrapping_add(c as u16));
                Ok(None)
            }
            Srl | Sra | Ror | Rol => {
                let b = self.regs.read(o.b.unwrap());
                let amt = self.fixed_step();
                let (result, shifted_out) = match instr.mnemonic {
                    Srl => {
                        let out_bit = if amt > 0 { (b >> (amt - 1)) & 1 == 1 } else { self.cin };
                        let fill = if self.count_op == CountOpMode::Carry && self.cin { 0xffffu16 } else { 0 };
                        let shifted = b.checked_shr(amt).unwrap_or(0);
                        let fill_mask = if amt == 0 { 0 } else { !(u16::MAX >> amt) };
                        (shifted | (fill & fill_mask), out_bit)
                    }
                    Sra => {
                        let out_bit = if amt > 0 { (b >> (amt - 1)) & 1 == 1 } else { self.cin };
                        (((b as i16) >> amt.min(15)) as u16, out_bit)
                    }
                    Ror => {
                        let amt = amt % 16;
                        let out_bit = if amt > 0 { (b >> (amt - 1)) & 1 == 1 } else { self.cin };
                        (b.rotate_right(amt), out_bit)
                    }
                    Rol => {
                        let amt = amt % 16;
                        let out_bit = if amt > 0 { (b >> (16 - amt)) & 1 == 1 } else { self.cin };
                        (b.rotate_left(amt), out_bit)
                    }
                    _ => unreachable!(),
                };
                self.set_reg(io, o.a.unwrap(), result);
                self.cin = shifted_out;
                Ok(None)
            }
            Eq | Ne | Lt | Ltu | Ge | Geu | Any | Eqx | Nex | Ltx | Ltux | Gex | Geux | Anyx => {
                let result = self.compare(instr);
                let new_p = match self.count_op {
                    CountOpMode::AndP => self.p && result,
                    CountOpMode::OrP => self.p || result,
                    _ => result,
                };
                self.set_pred(io, new_p);
                if instr.mnemonic.is_compare_and_execute() {
                    self.cond.push_back(true);
                    self.notify_cond(io);
                }
                Ok(None)
            }
            Getp => {
                self.set_reg(io, o.a.unwrap(), self.p as u16);
                Ok(None)
            }
            Putp => {
                let v = self.read_c_or_imm(instr, false);
                self.set_pred(io, v & 1 == 1);
                Ok(None)
            }
            Cex => {
                let m = o.m.unwrap_or(0) as u32;
                self.cond = crate::decode::shadow_bits_from_m(m).into_iter().collect();
                self.notify_cond(io);
                Ok(None)
            }
            B => {
                let off = self.read_c_or_imm(instr, true);
                Ok(Some(next_pc.wrapping_add(off as u16)))
            }
            J => {
                let target = self.read_c_or_imm(instr, false);
                Ok(Some(target as u16))
            }
            Bl => {
                self.set_reg(io, REG_LR, self.next_pc_for_link(instr));
                let off = self.read_c_or_imm(instr, true);
                Ok(Some(next_pc.wrapping_add(off as u16)))
            }
            Jl => {
                self.set_reg(io, REG_LR, self.next_pc_for_link(instr));
                let target = self.read_c_or_imm(instr, false);
                Ok(Some(target as u16))
            }
            Carry | Andp | Orp => {
                self.count_op = match instr.mnemonic {
                    Carry => CountOpMode::Carry,
                    Andp => CountOpMode::AndP,
                    Orp => CountOpMode::OrP,
                    _ => unreachable!(),
                };
                self.count_remaining = o.j.unwrap_or(0) as u32;
                self.count_just_set = true;
                Ok(None)
            }
            Ld => self.load(io, instr, false),
            St => self.store(io, instr, false),
            LdPreInc | LdPostInc | LdPreDec | LdPostDec => self.load_writeback(io, instr),
            StPreInc | StPostInc | StPreDec | StPostDec => self.store_writeback(io, instr),
            Ldm => self.load_multiple(io, instr),
            Stm => self.store_multiple(io, instr),
            In => {
                let n = o.n.unwrap();
                let v = io.read_pin(n) as u16;
                self.set_reg(io, o.a.unwrap(), v);
                Ok(None)
            }
            Out => {
                let n = o.n.unwrap();
                let v = self.read_c_or_imm(instr, false);
                io.write_pin(n, v & 1 == 1);
                Ok(None)
            }
            Outn => {
                let n = o.n.unwrap();
                let v = self.read_c_or_imm(instr, false);
                io.write_pin(n, v & 1 == 0);
                Ok(None)
            }
            Outp => {
                io.write_pin(o.n.unwrap(), self.p);
                Ok(None)
            }
            Inp => {
                let v = io.read_pin(o.n.unwrap());
                self.set_pred(io, v);
                Ok(None)
            }
            Inpx => {
                let v = io.read_pin(o.n.unwrap());
                self.set_pred(io, v);
                self.cond.push_back(true);
                self.notify_cond(io);
                Ok(None)
            }
            Utx => {
                let v = self.read_c_or_imm(instr, false) as u16;
                io.write_uart(v);
                Ok(None)
            }
            Urx => {
                let v = io.read_uart()?;
                self.set_reg(io, o.a.unwrap(), v);
                Ok(None)
            }
        }
    }

    fn next_pc_for_link(&self, instr: &Instruction) -> u16 {
        self.pc.wrapping_add(instr.size() as u16)
    }

    fn load(&mut self, io: &mut dyn Io, instr: &Instruction, _wb: bool) -> Result<Option<u16>, TickError> {
        let o = &instr.operands;
        let base = self.regs.read(o.b.unwrap());
        let offset = self.read_c_or_imm(instr, true);
        let addr = base.wrapping_add(offset as u16);
        let value = io.read_mem(addr)?;
        self.set_reg(io, o.a.unwrap(), value);
        Ok(None)
    }

    fn store(&mut self, io: &mut dyn Io, instr: &Instruction, _wb: bool) -> Result<Option<u16>, TickError> {
        let o = &instr.operands;
        let base = self.regs.read(o.b.unwrap());
        let offset = self.read_c_or_imm(instr, true);
        let addr = base.wrapping_add(offset as u16);
        let data = self.regs.read(o.a.unwrap());
        io.write_mem(addr, data);
        Ok(None)
    }

    fn load_writeback(&mut self, io: &mut dyn Io, instr: &Instruction) -> Result<Option<u16>, TickError> {
        let o = &instr.operands;
        let b_reg = o.b.unwrap();
        let amount = self.fixed_step() as u16;
        let old_b = self.regs.read(b_reg);
        let (pre, increments) = match instr.mnemonic {
            Mnemonic::LdPreInc => (true, true),
            Mnemonic::LdPostInc => (false, true),
            Mnemonic::LdPreDec => (true, false),
            Mnemonic::LdPostDec => (false, false),
            _ => unreachable!(),
        };
        let delta = if increments { amount } else { amount.wrapping_neg() };
        let new_b = old_b.wrapping_add(delta);

        if pre {
            self.set_reg(io, b_reg, new_b);
        }
        let addr = if pre { new_b } else { old_b };
        let value = io.read_mem(addr)?;
        self.set_reg(io, o.a.unwrap(), value);
        if !pre {
            self.set_reg(io, b_reg, new_b);
        }
        Ok(None)
    }

    fn store_writeback(&mut self, io: &mut dyn Io, instr: &Instruction) -> Result<Option<u16>, TickError> {
        let o = &instr.operands;
        let b_reg = o.b.unwrap();
        let a_reg = o.a.unwrap();
        let amount = self.fixed_step() as u16;
        let old_b = self.regs.read(b_reg);
        let (pre, increments) = match instr.mnemonic {
            Mnemonic::StPreInc => (true, true),
            Mnemonic::StPostInc => (false, true),
            Mnemonic::StPreDec => (true, false),
            Mnemonic::StPostDec => (false, false),
            _ => unreachable!(),
        };
        let delta = if increments { amount } else { amount.wrapping_neg() };
        let new_b = old_b.wrapping_add(delta);

        // Read the data operand before any writeback, so b == a stores
        // the pre-writeback value (§4.5, demonstrated by §8 scenario 5).
        let data = self.regs.read(a_reg);

        if pre {
            self.set_reg(io, b_reg, new_b);
        }
        let addr = if pre { new_b } else { old_b };
        io.write_mem(addr, data);
        if !pre {
            self.set_reg(io, b_reg, new_b);
        }
        Ok(None)
    }

    fn load_multiple(&mut self, io: &mut dyn Io, instr: &Instruction) -> Result<Option<u16>, TickError> {
        let o = &instr.operands;
        let (r, s) = (o.r.unwrap(), o.s.unwrap());
        let mut addr = self.regs.read(o.b.unwrap());
        let mut reg = r;
        loop {
            let value = io.read_mem(addr)?;
            self.set_reg(io, reg, value);
            if reg == s {
                break;
            }
            reg = (reg + 1) % 16;
            addr = addr.wrapping_add(1);
        }
        Ok(None)
    }

    fn store_multiple(&mut self, io: &mut dyn Io, instr: &Instruction) -> Result<Option<u16>, TickError> {
        let o = &instr.operands;
        let (r, s) = (o.r.unwrap(), o.s.unwrap());
        let mut addr = self.regs.read(o.b.unwrap());
        let mut reg = r;
        loop {
            let value = self.regs.read(reg);
            io.write_mem(addr, value);
            if reg == s {
                break;
            }
            reg = (reg + 1) % 16;
            addr = addr.wrapping_add(1);
        }
        Ok(None)
    }

    fn set_reg(&mut self, io: &mut dyn Io, reg: u8, value: u16) {
        self.regs.write(reg, value);
        io.write_reg(reg, self.regs.read(reg));
    }

    fn set_pred(&mut self, io: &mut dyn Io, p: bool) {
        self.p = p;
        io.write_pred(p);
    }

    fn notify_cond(&mut self, io: &mut dyn Io) {
        let cond = self.cond.clone();
        io.write_cond(&cond);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instruction::Operands;
    use std::collections::HashMap;

    struct TestIo {
        program: HashMap<u16, Instruction>,
        mem: HashMap<u16, u16>,
        uart_in: VecDeque<u16>,
        uart_out: Vec<u16>,
    }

    impl Io for TestIo {
        fn fetch(&mut self, pc: u16) -> Result<(Instruction, u32), TickError> {
            let instr = self.program.get(&pc).cloned().expect("no instruction at pc");
            let size = instr.size();
            Ok((instr, size))
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
            self.uart_out.push(value);
        }
        fn read_pin(&mut self, _n: u8) -> bool {
            false
        }
        fn write_pin(&mut self, _n: u8, _value: bool) {}
    }

    #[test]
    fn scenario_one_add_with_immediate() {
        let mut io = TestIo {
            program: HashMap::new(),
            mem: HashMap::new(),
            uart_in: VecDeque::new(),
            uart_out: Vec::new(),
        };
        io.program.insert(
            0,
            Instruction::new(
                Mnemonic::Add,
                Operands {
                    a: Some(1),
                    b: Some(0),
                    c: Some(15),
                    imm: Some(ImmOperand::Value(0x1234)),
                    ..Default::default()
                },
            ),
        );
        let mut sim = Sim::new();
        sim.tick(&mut io).unwrap();
        assert_eq!(sim.regs.read(1), 0x1234);
        assert_eq!(sim.pc, 2);
    }

    #[test]
    fn scenario_five_store_post_increment_same_register() {
        let mut io = TestIo {
            program: HashMap::new(),
            mem: HashMap::new(),
            uart_in: VecDeque::new(),
            uart_out: Vec::new(),
        };
        io.program.insert(
            0,
            Instruction::new(
                Mnemonic::StPostInc,
                Operands {
                    a: Some(3),
                    b: Some(3),
                    imm: Some(ImmOperand::Value(1)),
                    ..Default::default()
                },
            ),
        );
        let mut sim = Sim::new();
        sim.regs.write(3, 0x100);
        sim.tick(&mut io).unwrap();
        assert_eq!(io.mem.get(&0x100), Some(&0x100));
        assert_eq!(sim.regs.read(3), 0x101);
    }

    #[test]
    fn scenario_four_eqx_sets_cond_and_skips_mismatched_follower() {
        let mut io = TestIo {
            program: HashMap::new(),
            mem: HashMap::new(),
            uart_in: VecDeque::new(),
            uart_out: Vec::new(),
        };
        io.program.insert(
            0,
            Instruction::new(Mnemonic::Eqx, Operands { b: Some(1), c: Some(2), ..Default::default() }),
        );
        io.program.insert(
            1,
            Instruction::new(
                Mnemonic::Add,
                Operands { a: Some(5), b: Some(0), c: Some(0), ..Default::default() },
            ),
        );
        let mut sim = Sim::new();
        sim.regs.write(1, 1);
        sim.regs.write(2, 2);
        sim.regs.write(5, 0xdead);
        sim.tick(&mut io).unwrap(); // eqx: 1 != 2, p = false, cond = [true]
        assert!(!sim.p);
        sim.tick(&mut io).unwrap(); // predicated add: bit(true) != p(false) -> skipped
        assert_eq!(sim.regs.read(5), 0xdead);
    }
}
