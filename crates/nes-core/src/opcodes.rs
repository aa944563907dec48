//! 6502 opcode table
//!
//! One entry per opcode byte. Entries left as `None` are opcodes the 2A03 does
//! not document; decoding one is a fatal [`crate::cpu::CpuError`].

/// Instruction operation
#[allow(clippy::upper_case_acronyms)]
#[rustfmt::skip]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ADC, AND, ASL, BCC, BCS, BEQ, BIT, BMI, BNE, BPL, BRK, BVC, BVS, CLC,
    CLD, CLI, CLV, CMP, CPX, CPY, DEC, DEX, DEY, EOR, INC, INX, INY, JMP,
    JSR, LDA, LDX, LDY, LSR, NOP, ORA, PHA, PHP, PLA, PLP, ROL, ROR, RTI,
    RTS, SBC, SEC, SED, SEI, STA, STX, STY, TAX, TAY, TSX, TXA, TXS, TYA,
}

/// Addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

impl AddressingMode {
    /// Number of operand bytes following the opcode
    pub const fn operand_bytes(self) -> u16 {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 0,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect => 2,
            _ => 1,
        }
    }
}

/// CPU instruction info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionInfo {
    pub operation: Operation,
    pub mode: AddressingMode,
    /// Base cycle cost
    pub cycles: u8,
    /// Extra cycle if an indexed access crosses a page
    pub page_cycle: bool,
}

/// Decode table indexed by opcode byte
pub static INSTRUCTIONS: [Option<InstructionInfo>; 256] = build_table();

/// Look up an opcode
pub fn decode(opcode: u8) -> Option<InstructionInfo> {
    INSTRUCTIONS[opcode as usize]
}

const fn op(
    opcode: u8,
    operation: Operation,
    mode: AddressingMode,
    cycles: u8,
    page_cycle: bool,
) -> (u8, InstructionInfo) {
    (
        opcode,
        InstructionInfo {
            operation,
            mode,
            cycles,
            page_cycle,
        },
    )
}

const fn build_table() -> [Option<InstructionInfo>; 256] {
    let mut table = [None; 256];
    let mut i = 0;
    while i < OPCODES.len() {
        let (opcode, info) = OPCODES[i];
        table[opcode as usize] = Some(info);
        i += 1;
    }
    table
}

use AddressingMode::*;
use Operation::*;

#[rustfmt::skip]
const OPCODES: [(u8, InstructionInfo); 151] = [
    op(0x69, ADC, Immediate, 2, false), op(0x65, ADC, ZeroPage, 3, false),
    op(0x75, ADC, ZeroPageX, 4, false), op(0x6D, ADC, Absolute, 4, false),
    op(0x7D, ADC, AbsoluteX, 4, true), op(0x79, ADC, AbsoluteY, 4, true),
    op(0x61, ADC, IndirectX, 6, false), op(0x71, ADC, IndirectY, 5, true),

    op(0x29, AND, Immediate, 2, false), op(0x25, AND, ZeroPage, 3, false),
    op(0x35, AND, ZeroPageX, 4, false), op(0x2D, AND, Absolute, 4, false),
    op(0x3D, AND, AbsoluteX, 4, true), op(0x39, AND, AbsoluteY, 4, true),
    op(0x21, AND, IndirectX, 6, false), op(0x31, AND, IndirectY, 5, true),

    op(0x0A, ASL, Accumulator, 2, false), op(0x06, ASL, ZeroPage, 5, false),
    op(0x16, ASL, ZeroPageX, 6, false), op(0x0E, ASL, Absolute, 6, false),
    op(0x1E, ASL, AbsoluteX, 7, false),

    op(0x90, BCC, Relative, 2, false), op(0xB0, BCS, Relative, 2, false),
    op(0xF0, BEQ, Relative, 2, false), op(0x30, BMI, Relative, 2, false),
    op(0xD0, BNE, Relative, 2, false), op(0x10, BPL, Relative, 2, false),
    op(0x50, BVC, Relative, 2, false), op(0x70, BVS, Relative, 2, false),

    op(0x24, BIT, ZeroPage, 3, false), op(0x2C, BIT, Absolute, 4, false),

    op(0x00, BRK, Implied, 7, false),

    op(0x18, CLC, Implied, 2, false), op(0xD8, CLD, Implied, 2, false),
    op(0x58, CLI, Implied, 2, false), op(0xB8, CLV, Implied, 2, false),

    op(0xC9, CMP, Immediate, 2, false), op(0xC5, CMP, ZeroPage, 3, false),
    op(0xD5, CMP, ZeroPageX, 4, false), op(0xCD, CMP, Absolute, 4, false),
    op(0xDD, CMP, AbsoluteX, 4, true), op(0xD9, CMP, AbsoluteY, 4, true),
    op(0xC1, CMP, IndirectX, 6, false), op(0xD1, CMP, IndirectY, 5, true),

    op(0xE0, CPX, Immediate, 2, false), op(0xE4, CPX, ZeroPage, 3, false),
    op(0xEC, CPX, Absolute, 4, false),
    op(0xC0, CPY, Immediate, 2, false), op(0xC4, CPY, ZeroPage, 3, false),
    op(0xCC, CPY, Absolute, 4, false),

    op(0xC6, DEC, ZeroPage, 5, false), op(0xD6, DEC, ZeroPageX, 6, false),
    op(0xCE, DEC, Absolute, 6, false), op(0xDE, DEC, AbsoluteX, 7, false),
    op(0xCA, DEX, Implied, 2, false), op(0x88, DEY, Implied, 2, false),

    op(0x49, EOR, Immediate, 2, false), op(0x45, EOR, ZeroPage, 3, false),
    op(0x55, EOR, ZeroPageX, 4, false), op(0x4D, EOR, Absolute, 4, false),
    op(0x5D, EOR, AbsoluteX, 4, true), op(0x59, EOR, AbsoluteY, 4, true),
    op(0x41, EOR, IndirectX, 6, false), op(0x51, EOR, IndirectY, 5, true),

    op(0xE6, INC, ZeroPage, 5, false), op(0xF6, INC, ZeroPageX, 6, false),
    op(0xEE, INC, Absolute, 6, false), op(0xFE, INC, AbsoluteX, 7, false),
    op(0xE8, INX, Implied, 2, false), op(0xC8, INY, Implied, 2, false),

    op(0x4C, JMP, Absolute, 3, false), op(0x6C, JMP, Indirect, 5, false),
    op(0x20, JSR, Absolute, 6, false),

    op(0xA9, LDA, Immediate, 2, false), op(0xA5, LDA, ZeroPage, 3, false),
    op(0xB5, LDA, ZeroPageX, 4, false), op(0xAD, LDA, Absolute, 4, false),
    op(0xBD, LDA, AbsoluteX, 4, true), op(0xB9, LDA, AbsoluteY, 4, true),
    op(0xA1, LDA, IndirectX, 6, false), op(0xB1, LDA, IndirectY, 5, true),

    op(0xA2, LDX, Immediate, 2, false), op(0xA6, LDX, ZeroPage, 3, false),
    op(0xB6, LDX, ZeroPageY, 4, false), op(0xAE, LDX, Absolute, 4, false),
    op(0xBE, LDX, AbsoluteY, 4, true),

    op(0xA0, LDY, Immediate, 2, false), op(0xA4, LDY, ZeroPage, 3, false),
    op(0xB4, LDY, ZeroPageX, 4, false), op(0xAC, LDY, Absolute, 4, false),
    op(0xBC, LDY, AbsoluteX, 4, true),

    op(0x4A, LSR, Accumulator, 2, false), op(0x46, LSR, ZeroPage, 5, false),
    op(0x56, LSR, ZeroPageX, 6, false), op(0x4E, LSR, Absolute, 6, false),
    op(0x5E, LSR, AbsoluteX, 7, false),

    op(0xEA, NOP, Implied, 2, false),

    op(0x09, ORA, Immediate, 2, false), op(0x05, ORA, ZeroPage, 3, false),
    op(0x15, ORA, ZeroPageX, 4, false), op(0x0D, ORA, Absolute, 4, false),
    op(0x1D, ORA, AbsoluteX, 4, true), op(0x19, ORA, AbsoluteY, 4, true),
    op(0x01, ORA, IndirectX, 6, false), op(0x11, ORA, IndirectY, 5, true),

    op(0x48, PHA, Implied, 3, false), op(0x08, PHP, Implied, 3, false),
    op(0x68, PLA, Implied, 4, false), op(0x28, PLP, Implied, 4, false),

    op(0x2A, ROL, Accumulator, 2, false), op(0x26, ROL, ZeroPage, 5, false),
    op(0x36, ROL, ZeroPageX, 6, false), op(0x2E, ROL, Absolute, 6, false),
    op(0x3E, ROL, AbsoluteX, 7, false),

    op(0x6A, ROR, Accumulator, 2, false), op(0x66, ROR, ZeroPage, 5, false),
    op(0x76, ROR, ZeroPageX, 6, false), op(0x6E, ROR, Absolute, 6, false),
    op(0x7E, ROR, AbsoluteX, 7, false),

    op(0x40, RTI, Implied, 6, false), op(0x60, RTS, Implied, 6, false),

    op(0xE9, SBC, Immediate, 2, false), op(0xE5, SBC, ZeroPage, 3, false),
    op(0xF5, SBC, ZeroPageX, 4, false), op(0xED, SBC, Absolute, 4, false),
    op(0xFD, SBC, AbsoluteX, 4, true), op(0xF9, SBC, AbsoluteY, 4, true),
    op(0xE1, SBC, IndirectX, 6, false), op(0xF1, SBC, IndirectY, 5, true),

    op(0x38, SEC, Implied, 2, false), op(0xF8, SED, Implied, 2, false),
    op(0x78, SEI, Implied, 2, false),

    op(0x85, STA, ZeroPage, 3, false), op(0x95, STA, ZeroPageX, 4, false),
    op(0x8D, STA, Absolute, 4, false), op(0x9D, STA, AbsoluteX, 5, false),
    op(0x99, STA, AbsoluteY, 5, false), op(0x81, STA, IndirectX, 6, false),
    op(0x91, STA, IndirectY, 6, false),

    op(0x86, STX, ZeroPage, 3, false), op(0x96, STX, ZeroPageY, 4, false),
    op(0x8E, STX, Absolute, 4, false),
    op(0x84, STY, ZeroPage, 3, false), op(0x94, STY, ZeroPageX, 4, false),
    op(0x8C, STY, Absolute, 4, false),

    op(0xAA, TAX, Implied, 2, false), op(0xA8, TAY, Implied, 2, false),
    op(0xBA, TSX, Implied, 2, false), op(0x8A, TXA, Implied, 2, false),
    op(0x9A, TXS, Implied, 2, false), op(0x98, TYA, Implied, 2, false),
];
