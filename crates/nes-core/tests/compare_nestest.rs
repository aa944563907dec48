//! Compare CPU state against nestest.log
//!
//! Needs `tests/roms/nestest.nes` and `tests/roms/nestest.log`, so the test is
//! ignored by default (`cargo test -- --ignored` once they are in place). Runs the ROM in automation mode from $C000
//! and checks every official instruction up to the first unofficial one.

mod common;

use common::load_test_rom;
use nes_core::cpu::Cpu;
use nes_core::NesSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuState {
    pc: u16,
    a: u8,
    x: u8,
    y: u8,
    p: u8,
    sp: u8,
    cycles: u64,
}

impl From<&Cpu> for CpuState {
    fn from(cpu: &Cpu) -> Self {
        let registers = cpu.registers();
        Self {
            pc: registers.pc,
            a: registers.a,
            x: registers.x,
            y: registers.y,
            p: cpu.p_register(),
            sp: registers.sp,
            cycles: cpu.total_cycles(),
        }
    }
}

struct LogEntry {
    state: CpuState,
    unofficial: bool,
}

/// `C000  4C F5 C5  JMP $C5F5       A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:7`
fn parse_log_line(line: &str) -> Option<LogEntry> {
    let pc = u16::from_str_radix(line.get(0..4)?, 16).ok()?;
    // Unofficial opcodes are marked with '*' just before the mnemonic
    let unofficial = line.get(15..16)? == "*";
    let registers = line.get(line.find("A:")?..)?;
    let cycles = registers
        .get(registers.find("CYC:")? + 4..)?
        .trim()
        .parse()
        .ok()?;

    Some(LogEntry {
        state: CpuState {
            pc,
            a: parse_hex(registers, "A:")?,
            x: parse_hex(registers, "X:")?,
            y: parse_hex(registers, "Y:")?,
            p: parse_hex(registers, "P:")?,
            sp: parse_hex(registers, "SP:")?,
            cycles,
        },
        unofficial,
    })
}

fn parse_hex(s: &str, prefix: &str) -> Option<u8> {
    let start = s.find(prefix)? + prefix.len();
    u8::from_str_radix(s.get(start..start + 2)?, 16).ok()
}

#[test]
fn test_parse_log_line() {
    let entry = parse_log_line(
        "C72A  C9 00     CMP #$00                        A:40 X:00 Y:00 P:65 SP:FB PPU:  9,237 CYC:1030",
    )
    .unwrap();
    assert!(!entry.unofficial);
    assert_eq!(
        entry.state,
        CpuState {
            pc: 0xC72A,
            a: 0x40,
            x: 0x00,
            y: 0x00,
            p: 0x65,
            sp: 0xFB,
            cycles: 1030,
        }
    );

    let entry = parse_log_line(
        "C6BD  04 A9    *NOP $A9 = 00                    A:AA X:97 Y:4E P:EF SP:F5 PPU: 74,217 CYC:8421",
    )
    .unwrap();
    assert!(entry.unofficial);
}

#[test]
#[ignore = "needs tests/roms/nestest.nes and nestest.log"]
fn test_nestest_official_opcodes() {
    let rom = load_test_rom("nestest.nes");
    let log = load_test_rom("nestest.log");
    let log = String::from_utf8_lossy(&log);
    let entries: Vec<LogEntry> = log.lines().filter_map(parse_log_line).collect();
    assert!(!entries.is_empty(), "no entries parsed from nestest.log");
    assert_eq!(entries[0].state.pc, 0xC000);

    let mut system = NesSystem::from_rom(&rom).unwrap();
    // Keep the frame IRQ quiet; nestest clears I in places
    system.write_memory(0x4017, 0x40);
    system.cpu_mut().registers_mut().pc = 0xC000;

    let mut checked = 0;
    for (index, entry) in entries.iter().enumerate() {
        if entry.unofficial {
            break;
        }
        let actual = CpuState::from(system.cpu());
        assert_eq!(actual, entry.state, "mismatch at log line {}", index + 1);
        system.step_instruction().unwrap();
        checked += 1;
    }

    assert!(checked > 4000, "only {checked} instructions checked");
    // nestest reports the first failing official test in $02
    assert_eq!(system.read_memory(0x0002), 0x00);
}
