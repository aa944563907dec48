//! CPU module - 2A03 (6502 variant) implementation
//!
//! The NES uses a modified 6502 CPU without decimal mode. Instructions are
//! executed atomically on their first cycle; the remaining cycles of the
//! instruction are then burned one [`Cpu::tick`] at a time so the rest of the
//! system stays in lockstep.

use std::fmt;

#[cfg(feature = "cpu-trace")]
use log::trace;
use thiserror::Error;

use crate::opcodes::{self, AddressingMode, Operation};

/// NMI vector
pub const NMI_VECTOR: u16 = 0xFFFA;
/// Reset vector
pub const RESET_VECTOR: u16 = 0xFFFC;
/// IRQ/BRK vector
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Cycles taken by reset and by interrupt entry
const INTERRUPT_CYCLES: u32 = 7;

/// Bus trait for memory and I/O access
pub trait Bus {
    /// Read a byte from the given address
    fn read(&mut self, address: u16) -> u8;
    /// Write a byte to the given address
    fn write(&mut self, address: u16, value: u8);
    /// Level of the shared IRQ line
    fn irq_line(&mut self) -> bool {
        false
    }
}

/// 2A03 CPU registers
#[derive(Debug, Clone, Copy)]
pub struct CpuRegisters {
    pub a: u8,    // Accumulator
    pub x: u8,    // X index register
    pub y: u8,    // Y index register
    pub sp: u8,   // Stack pointer
    pub pc: u16,  // Program counter
}

impl Default for CpuRegisters {
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD, // Stack starts at $01FD
            pc: 0,    // Will be set by reset vector
        }
    }
}

/// CPU status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags(u8);

impl StatusFlags {
    pub const CARRY: u8 = 0b00000001;
    pub const ZERO: u8 = 0b00000010;
    pub const INTERRUPT: u8 = 0b00000100;
    pub const DECIMAL: u8 = 0b00001000;
    pub const BREAK: u8 = 0b00010000;
    pub const UNUSED: u8 = 0b00100000;
    pub const OVERFLOW: u8 = 0b01000000;
    pub const NEGATIVE: u8 = 0b10000000;

    /// Build from a raw byte. B is not a real flag and is dropped; bit 5 always reads set.
    pub fn new(flags: u8) -> Self {
        Self((flags & !Self::BREAK) | Self::UNUSED)
    }

    /// Raw register value (bit 5 set, B clear)
    pub fn bits(&self) -> u8 {
        self.0
    }

    /// Value pushed to the stack. B is set only for BRK and PHP.
    pub fn to_stack(&self, brk: bool) -> u8 {
        if brk {
            self.0 | Self::BREAK
        } else {
            self.0
        }
    }

    pub fn carry(&self) -> bool {
        (self.0 & Self::CARRY) != 0
    }

    pub fn zero(&self) -> bool {
        (self.0 & Self::ZERO) != 0
    }

    pub fn interrupt(&self) -> bool {
        (self.0 & Self::INTERRUPT) != 0
    }

    pub fn decimal(&self) -> bool {
        (self.0 & Self::DECIMAL) != 0
    }

    pub fn overflow(&self) -> bool {
        (self.0 & Self::OVERFLOW) != 0
    }

    pub fn negative(&self) -> bool {
        (self.0 & Self::NEGATIVE) != 0
    }

    pub fn set_carry(&mut self, val: bool) {
        self.set(Self::CARRY, val);
    }

    pub fn set_zero(&mut self, val: bool) {
        self.set(Self::ZERO, val);
    }

    pub fn set_interrupt(&mut self, val: bool) {
        self.set(Self::INTERRUPT, val);
    }

    pub fn set_decimal(&mut self, val: bool) {
        self.set(Self::DECIMAL, val);
    }

    pub fn set_overflow(&mut self, val: bool) {
        self.set(Self::OVERFLOW, val);
    }

    pub fn set_negative(&mut self, val: bool) {
        self.set(Self::NEGATIVE, val);
    }

    /// Set Z and N from a result byte
    pub fn set_zero_negative(&mut self, value: u8) {
        self.set_zero(value == 0);
        self.set_negative(value & 0x80 != 0);
    }

    fn set(&mut self, mask: u8, val: bool) {
        self.0 = if val { self.0 | mask } else { self.0 & !mask };
    }
}

impl Default for StatusFlags {
    fn default() -> Self {
        Self::new(Self::INTERRUPT)
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C:{} Z:{} I:{} D:{} V:{} N:{}",
            self.carry() as u8,
            self.zero() as u8,
            self.interrupt() as u8,
            self.decimal() as u8,
            self.overflow() as u8,
            self.negative() as u8
        )
    }
}

/// Resolved operand location
#[derive(Debug, Clone, Copy)]
enum Operand {
    None,
    Accumulator,
    Memory(u16),
}

/// Result of an ADC/SBC
struct ArithmeticOutput {
    result: u8,
    carry: bool,
    overflow: bool,
    negative: bool,
    zero: bool,
}

/// CPU emulator state
#[derive(Debug, Clone)]
pub struct Cpu {
    registers: CpuRegisters,
    status: StatusFlags,
    /// Remaining cycles for current instruction
    remaining_cycles: u32,
    /// Total cycles executed
    total_cycles: u64,
    /// Honour the D flag in ADC/SBC (generic 6502 only)
    decimal_mode: bool,
}

impl Cpu {
    /// Create a new 2A03 CPU instance
    pub fn new() -> Self {
        Self {
            registers: CpuRegisters::default(),
            status: StatusFlags::default(),
            remaining_cycles: 0,
            total_cycles: 0,
            decimal_mode: false,
        }
    }

    /// Create a generic 6502 whose ADC/SBC honour decimal mode
    pub fn with_decimal_mode() -> Self {
        Self {
            decimal_mode: true,
            ..Self::new()
        }
    }

    /// Reset the CPU and load PC from the reset vector
    pub fn reset(&mut self, bus: &mut impl Bus) {
        self.registers = CpuRegisters::default();
        self.status = StatusFlags::default();
        self.registers.pc = read_u16(bus, RESET_VECTOR);
        self.remaining_cycles = INTERRUPT_CYCLES;
        self.total_cycles = INTERRUPT_CYCLES as u64;
    }

    /// Get CPU registers
    pub fn registers(&self) -> &CpuRegisters {
        &self.registers
    }

    /// Get mutable CPU registers
    pub fn registers_mut(&mut self) -> &mut CpuRegisters {
        &mut self.registers
    }

    /// Get CPU status flags
    pub fn status(&self) -> &StatusFlags {
        &self.status
    }

    /// Get mutable CPU status flags
    pub fn status_mut(&mut self) -> &mut StatusFlags {
        &mut self.status
    }

    /// Processor status byte as shown by trace logs
    pub fn p_register(&self) -> u8 {
        self.status.bits()
    }

    /// Get total cycles executed
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Cycles left before the next instruction is fetched
    pub fn remaining_cycles(&self) -> u32 {
        self.remaining_cycles
    }

    /// Hold the CPU for extra cycles (OAM DMA, DMC fetches)
    pub fn stall(&mut self, cycles: u32) {
        self.remaining_cycles += cycles;
        self.total_cycles += cycles as u64;
    }

    /// Advance one CPU cycle, starting a new instruction at a boundary
    pub fn tick(&mut self, bus: &mut impl Bus) -> Result<(), CpuError> {
        if self.remaining_cycles == 0 {
            if bus.irq_line() && !self.status.interrupt() {
                self.interrupt_request(bus);
            } else {
                let cycles = self.step(bus)?;
                self.remaining_cycles += cycles;
            }
        }
        self.remaining_cycles = self.remaining_cycles.saturating_sub(1);
        Ok(())
    }

    /// Maskable interrupt. Ignored while the I flag is set.
    pub fn interrupt_request(&mut self, bus: &mut impl Bus) -> bool {
        if self.status.interrupt() {
            return false;
        }
        self.interrupt(bus, IRQ_VECTOR, false);
        true
    }

    /// Non-maskable interrupt
    pub fn non_maskable_interrupt(&mut self, bus: &mut impl Bus) {
        self.interrupt(bus, NMI_VECTOR, false);
    }

    fn interrupt(&mut self, bus: &mut impl Bus, vector: u16, brk: bool) {
        self.push_u16(bus, self.registers.pc);
        self.push(bus, self.status.to_stack(brk));
        self.status.set_interrupt(true);
        self.registers.pc = read_u16(bus, vector);
        if !brk {
            self.remaining_cycles += INTERRUPT_CYCLES;
            self.total_cycles += INTERRUPT_CYCLES as u64;
        }
    }

    /// Execute one whole instruction and return the cycles it costs
    pub fn step(&mut self, bus: &mut impl Bus) -> Result<u32, CpuError> {
        let pc = self.registers.pc;
        let opcode = bus.read(pc);
        let info = opcodes::decode(opcode).ok_or(CpuError::InvalidOpcode { opcode, pc })?;

        #[cfg(feature = "cpu-trace")]
        trace!(
            "{:04X}  {:02X}  {:?} {:?}  A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} CYC:{}",
            pc,
            opcode,
            info.operation,
            info.mode,
            self.registers.a,
            self.registers.x,
            self.registers.y,
            self.status.bits(),
            self.registers.sp,
            self.total_cycles
        );

        self.registers.pc = pc.wrapping_add(1);
        let (operand, page_crossed) = self.resolve(bus, info.mode);

        let mut cycles = info.cycles as u32;
        if page_crossed && info.page_cycle {
            cycles += 1;
        }
        cycles += self.execute(bus, info.operation, operand);

        self.total_cycles += cycles as u64;
        Ok(cycles)
    }

    /// Resolve the operand and advance PC past it
    fn resolve(&mut self, bus: &mut impl Bus, mode: AddressingMode) -> (Operand, bool) {
        let pc = self.registers.pc;
        self.registers.pc = pc.wrapping_add(mode.operand_bytes());

        match mode {
            AddressingMode::Implied => (Operand::None, false),
            AddressingMode::Accumulator => (Operand::Accumulator, false),
            AddressingMode::Immediate | AddressingMode::Relative => (Operand::Memory(pc), false),
            AddressingMode::ZeroPage => (Operand::Memory(bus.read(pc) as u16), false),
            AddressingMode::ZeroPageX => {
                let address = bus.read(pc).wrapping_add(self.registers.x);
                (Operand::Memory(address as u16), false)
            }
            AddressingMode::ZeroPageY => {
                let address = bus.read(pc).wrapping_add(self.registers.y);
                (Operand::Memory(address as u16), false)
            }
            AddressingMode::Absolute => (Operand::Memory(read_u16(bus, pc)), false),
            AddressingMode::AbsoluteX => {
                let base = read_u16(bus, pc);
                let address = base.wrapping_add(self.registers.x as u16);
                (Operand::Memory(address), page_crossed(base, address))
            }
            AddressingMode::AbsoluteY => {
                let base = read_u16(bus, pc);
                let address = base.wrapping_add(self.registers.y as u16);
                (Operand::Memory(address), page_crossed(base, address))
            }
            AddressingMode::Indirect => {
                let pointer = read_u16(bus, pc);
                // The high byte is fetched without carrying into the pointer's page
                let high_pointer = (pointer & 0xFF00) | (pointer.wrapping_add(1) & 0x00FF);
                let address = u16::from_le_bytes([bus.read(pointer), bus.read(high_pointer)]);
                (Operand::Memory(address), false)
            }
            AddressingMode::IndirectX => {
                let pointer = bus.read(pc).wrapping_add(self.registers.x);
                (Operand::Memory(read_zero_page_u16(bus, pointer)), false)
            }
            AddressingMode::IndirectY => {
                let pointer = bus.read(pc);
                let base = read_zero_page_u16(bus, pointer);
                let address = base.wrapping_add(self.registers.y as u16);
                (Operand::Memory(address), page_crossed(base, address))
            }
        }
    }

    /// Execute an operation; returns cycles beyond the table cost
    fn execute(&mut self, bus: &mut impl Bus, operation: Operation, operand: Operand) -> u32 {
        use Operation::*;

        match operation {
            LDA => {
                self.registers.a = self.load(bus, operand);
                self.status.set_zero_negative(self.registers.a);
            }
            LDX => {
                self.registers.x = self.load(bus, operand);
                self.status.set_zero_negative(self.registers.x);
            }
            LDY => {
                self.registers.y = self.load(bus, operand);
                self.status.set_zero_negative(self.registers.y);
            }
            STA => self.store(bus, operand, self.registers.a),
            STX => self.store(bus, operand, self.registers.x),
            STY => self.store(bus, operand, self.registers.y),

            TAX => {
                self.registers.x = self.registers.a;
                self.status.set_zero_negative(self.registers.x);
            }
            TAY => {
                self.registers.y = self.registers.a;
                self.status.set_zero_negative(self.registers.y);
            }
            TSX => {
                self.registers.x = self.registers.sp;
                self.status.set_zero_negative(self.registers.x);
            }
            TXA => {
                self.registers.a = self.registers.x;
                self.status.set_zero_negative(self.registers.a);
            }
            TXS => self.registers.sp = self.registers.x,
            TYA => {
                self.registers.a = self.registers.y;
                self.status.set_zero_negative(self.registers.a);
            }

            ADC => {
                let value = self.load(bus, operand);
                self.add(value);
            }
            SBC => {
                let value = self.load(bus, operand);
                self.subtract(value);
            }
            AND => {
                self.registers.a &= self.load(bus, operand);
                self.status.set_zero_negative(self.registers.a);
            }
            ORA => {
                self.registers.a |= self.load(bus, operand);
                self.status.set_zero_negative(self.registers.a);
            }
            EOR => {
                self.registers.a ^= self.load(bus, operand);
                self.status.set_zero_negative(self.registers.a);
            }
            BIT => {
                let value = self.load(bus, operand);
                self.status.set_zero(self.registers.a & value == 0);
                self.status.set_overflow(value & 0x40 != 0);
                self.status.set_negative(value & 0x80 != 0);
            }
            CMP => self.compare(bus, operand, self.registers.a),
            CPX => self.compare(bus, operand, self.registers.x),
            CPY => self.compare(bus, operand, self.registers.y),

            ASL => self.modify(bus, operand, |cpu, value| {
                cpu.status.set_carry(value & 0x80 != 0);
                value << 1
            }),
            LSR => self.modify(bus, operand, |cpu, value| {
                cpu.status.set_carry(value & 0x01 != 0);
                value >> 1
            }),
            ROL => self.modify(bus, operand, |cpu, value| {
                let carry_in = cpu.status.carry() as u8;
                cpu.status.set_carry(value & 0x80 != 0);
                (value << 1) | carry_in
            }),
            ROR => self.modify(bus, operand, |cpu, value| {
                let carry_in = (cpu.status.carry() as u8) << 7;
                cpu.status.set_carry(value & 0x01 != 0);
                (value >> 1) | carry_in
            }),
            INC => self.modify(bus, operand, |_, value| value.wrapping_add(1)),
            DEC => self.modify(bus, operand, |_, value| value.wrapping_sub(1)),
            INX => {
                self.registers.x = self.registers.x.wrapping_add(1);
                self.status.set_zero_negative(self.registers.x);
            }
            INY => {
                self.registers.y = self.registers.y.wrapping_add(1);
                self.status.set_zero_negative(self.registers.y);
            }
            DEX => {
                self.registers.x = self.registers.x.wrapping_sub(1);
                self.status.set_zero_negative(self.registers.x);
            }
            DEY => {
                self.registers.y = self.registers.y.wrapping_sub(1);
                self.status.set_zero_negative(self.registers.y);
            }

            BCC => return self.branch(bus, operand, !self.status.carry()),
            BCS => return self.branch(bus, operand, self.status.carry()),
            BEQ => return self.branch(bus, operand, self.status.zero()),
            BNE => return self.branch(bus, operand, !self.status.zero()),
            BMI => return self.branch(bus, operand, self.status.negative()),
            BPL => return self.branch(bus, operand, !self.status.negative()),
            BVS => return self.branch(bus, operand, self.status.overflow()),
            BVC => return self.branch(bus, operand, !self.status.overflow()),

            JMP => {
                if let Operand::Memory(address) = operand {
                    self.registers.pc = address;
                }
            }
            JSR => {
                if let Operand::Memory(address) = operand {
                    self.push_u16(bus, self.registers.pc.wrapping_sub(1));
                    self.registers.pc = address;
                }
            }
            RTS => self.registers.pc = self.pull_u16(bus).wrapping_add(1),
            RTI => {
                let flags = self.pull(bus);
                self.status = StatusFlags::new(flags);
                self.registers.pc = self.pull_u16(bus);
            }
            BRK => {
                // Skip the padding byte after BRK
                self.registers.pc = self.registers.pc.wrapping_add(1);
                self.interrupt(bus, IRQ_VECTOR, true);
            }

            PHA => self.push(bus, self.registers.a),
            PHP => self.push(bus, self.status.to_stack(true)),
            PLA => {
                self.registers.a = self.pull(bus);
                self.status.set_zero_negative(self.registers.a);
            }
            PLP => {
                let flags = self.pull(bus);
                self.status = StatusFlags::new(flags);
            }

            CLC => self.status.set_carry(false),
            SEC => self.status.set_carry(true),
            CLI => self.status.set_interrupt(false),
            SEI => self.status.set_interrupt(true),
            CLD => self.status.set_decimal(false),
            SED => self.status.set_decimal(true),
            CLV => self.status.set_overflow(false),
            NOP => {}
        }
        0
    }

    fn load(&mut self, bus: &mut impl Bus, operand: Operand) -> u8 {
        match operand {
            Operand::Memory(address) => bus.read(address),
            Operand::Accumulator => self.registers.a,
            Operand::None => 0,
        }
    }

    fn store(&mut self, bus: &mut impl Bus, operand: Operand, value: u8) {
        if let Operand::Memory(address) = operand {
            bus.write(address, value);
        }
    }

    /// Read-modify-write on memory or the accumulator; sets Z/N from the result
    fn modify(
        &mut self,
        bus: &mut impl Bus,
        operand: Operand,
        f: impl FnOnce(&mut Self, u8) -> u8,
    ) {
        let value = self.load(bus, operand);
        let result = f(self, value);
        match operand {
            Operand::Accumulator => self.registers.a = result,
            Operand::Memory(address) => bus.write(address, result),
            Operand::None => {}
        }
        self.status.set_zero_negative(result);
    }

    fn compare(&mut self, bus: &mut impl Bus, operand: Operand, register: u8) {
        let value = self.load(bus, operand);
        self.status.set_carry(register >= value);
        self.status.set_zero_negative(register.wrapping_sub(value));
    }

    fn branch(&mut self, bus: &mut impl Bus, operand: Operand, condition: bool) -> u32 {
        if !condition {
            return 0;
        }
        let offset = self.load(bus, operand) as i8;
        let from = self.registers.pc;
        let to = from.wrapping_add(offset as u16);
        self.registers.pc = to;
        if page_crossed(from, to) {
            2
        } else {
            1
        }
    }

    fn add(&mut self, value: u8) {
        let carry = self.status.carry() as u8;
        let output = if self.decimal_mode && self.status.decimal() {
            adc_decimal(self.registers.a, value, carry)
        } else {
            adc_binary(self.registers.a, value, carry)
        };
        self.apply(output);
    }

    fn subtract(&mut self, value: u8) {
        let carry = self.status.carry() as u8;
        let output = if self.decimal_mode && self.status.decimal() {
            sbc_decimal(self.registers.a, value, carry)
        } else {
            adc_binary(self.registers.a, !value, carry)
        };
        self.apply(output);
    }

    fn apply(&mut self, output: ArithmeticOutput) {
        self.registers.a = output.result;
        self.status.set_carry(output.carry);
        self.status.set_overflow(output.overflow);
        self.status.set_negative(output.negative);
        self.status.set_zero(output.zero);
    }

    fn push(&mut self, bus: &mut impl Bus, value: u8) {
        bus.write(0x0100 | self.registers.sp as u16, value);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
    }

    fn pull(&mut self, bus: &mut impl Bus) -> u8 {
        self.registers.sp = self.registers.sp.wrapping_add(1);
        bus.read(0x0100 | self.registers.sp as u16)
    }

    fn push_u16(&mut self, bus: &mut impl Bus, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.push(bus, high);
        self.push(bus, low);
    }

    fn pull_u16(&mut self, bus: &mut impl Bus) -> u16 {
        let low = self.pull(bus);
        let high = self.pull(bus);
        u16::from_le_bytes([low, high])
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

fn read_u16(bus: &mut impl Bus, address: u16) -> u16 {
    u16::from_le_bytes([bus.read(address), bus.read(address.wrapping_add(1))])
}

fn read_zero_page_u16(bus: &mut impl Bus, pointer: u8) -> u16 {
    u16::from_le_bytes([bus.read(pointer as u16), bus.read(pointer.wrapping_add(1) as u16)])
}

fn page_crossed(a: u16, b: u16) -> bool {
    (a & 0xFF00) != (b & 0xFF00)
}

fn adc_binary(a: u8, value: u8, carry: u8) -> ArithmeticOutput {
    let sum = a as u16 + value as u16 + carry as u16;
    let result = sum as u8;
    ArithmeticOutput {
        result,
        carry: sum > 0xFF,
        overflow: (!(a ^ value) & (a ^ result) & 0x80) != 0,
        negative: result & 0x80 != 0,
        zero: result == 0,
    }
}

/// NMOS BCD addition. Z comes from the binary sum; N and V from the
/// intermediate result before the high-nibble adjust.
fn adc_decimal(a: u8, value: u8, carry: u8) -> ArithmeticOutput {
    let binary = a.wrapping_add(value).wrapping_add(carry);
    let mut low = (a & 0x0F) as u16 + (value & 0x0F) as u16 + carry as u16;
    let mut high = (a >> 4) as u16 + (value >> 4) as u16;
    if low > 0x09 {
        low += 0x06;
    }
    if low > 0x0F {
        high += 1;
    }
    let intermediate = ((high << 4) as u8) | (low as u8 & 0x0F);
    let negative = intermediate & 0x80 != 0;
    let overflow = (!(a ^ value) & (a ^ intermediate) & 0x80) != 0;
    if high > 0x09 {
        high += 0x06;
    }
    ArithmeticOutput {
        result: ((high << 4) as u8) | (low as u8 & 0x0F),
        carry: high > 0x0F,
        overflow,
        negative,
        zero: binary == 0,
    }
}

/// NMOS BCD subtraction. Flags match the binary subtraction.
fn sbc_decimal(a: u8, value: u8, carry: u8) -> ArithmeticOutput {
    let flags = adc_binary(a, !value, carry);
    let borrow = 1 - carry as i16;
    let mut low = (a & 0x0F) as i16 - (value & 0x0F) as i16 - borrow;
    let mut high = (a >> 4) as i16 - (value >> 4) as i16;
    if low < 0 {
        low -= 0x06;
        high -= 1;
    }
    if high < 0 {
        high -= 0x06;
    }
    ArithmeticOutput {
        result: (((high << 4) | (low & 0x0F)) & 0xFF) as u8,
        ..flags
    }
}

/// CPU error types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("invalid opcode ${opcode:02X} at ${pc:04X}")]
    InvalidOpcode { opcode: u8, pc: u16 },
}
