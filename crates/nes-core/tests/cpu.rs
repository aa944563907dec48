//! CPU tests for the NES emulator

mod common;

use common::FlatBus;
use nes_core::cpu::{Cpu, CpuError, StatusFlags};
use nes_core::opcodes;

fn boot(program: &[u8]) -> (Cpu, FlatBus) {
    let mut bus = FlatBus::with_program(program);
    let mut cpu = Cpu::new();
    cpu.reset(&mut bus);
    (cpu, bus)
}

#[test]
fn test_cpu_reset() {
    let (cpu, _) = boot(&[]);

    assert_eq!(cpu.registers().a, 0);
    assert_eq!(cpu.registers().x, 0);
    assert_eq!(cpu.registers().y, 0);
    assert_eq!(cpu.registers().sp, 0xFD);
    assert_eq!(cpu.registers().pc, 0x8000);
    assert_eq!(cpu.p_register(), 0x24);
    assert_eq!(cpu.total_cycles(), 7);
}

#[test]
fn test_status_flags() {
    let mut flags = StatusFlags::new(0xFF);
    assert!(flags.carry());
    assert!(flags.zero());
    assert!(flags.interrupt());
    assert!(flags.overflow());
    assert!(flags.negative());
    assert_eq!(flags.bits(), 0xEF);

    flags.set_carry(false);
    assert!(!flags.carry());

    flags.set_overflow(false);
    assert!(!flags.overflow());
}

#[test]
fn test_official_opcode_count() {
    let count = (0..=0xFFu8).filter(|&op| opcodes::decode(op).is_some()).count();
    assert_eq!(count, 151);
}

#[test]
fn test_load_sets_zero_and_negative() {
    for value in 0..=0xFFu8 {
        let (mut cpu, mut bus) = boot(&[0xA9, value]);
        assert_eq!(cpu.step(&mut bus).unwrap(), 2);
        assert_eq!(cpu.registers().a, value);
        assert_eq!(cpu.status().zero(), value == 0, "Z for {value:#04X}");
        assert_eq!(cpu.status().negative(), value & 0x80 != 0, "N for {value:#04X}");
    }
}

#[test]
fn test_adc_matches_binary_sum() {
    let (mut cpu, mut bus) = boot(&[]);
    for a in 0..=0xFFu8 {
        for m in (0..=0xFFu8).step_by(3) {
            bus.load(0x8000, &[0x69, m]);
            cpu.registers_mut().pc = 0x8000;
            cpu.registers_mut().a = a;
            cpu.status_mut().set_carry(false);
            cpu.step(&mut bus).unwrap();

            let sum = a as u16 + m as u16;
            let result = sum as u8;
            assert_eq!(cpu.registers().a, result);
            assert_eq!(cpu.status().carry(), sum > 0xFF);
            assert_eq!(
                cpu.status().overflow(),
                (a ^ result) & (m ^ result) & 0x80 != 0,
                "V for {a:#04X} + {m:#04X}"
            );
        }
    }
}

#[test]
fn test_pc_wraps_at_top_of_memory() {
    let (mut cpu, mut bus) = boot(&[]);
    bus.load(0xFFFF, &[0xEA]);
    cpu.registers_mut().pc = 0xFFFF;
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.registers().pc, 0x0000);
}

#[test]
fn test_stack_pointer_wraps() {
    // LDX #$00; TXS; LDA #$55; PHA; LDA #$00; PLA
    let (mut cpu, mut bus) = boot(&[0xA2, 0x00, 0x9A, 0xA9, 0x55, 0x48, 0xA9, 0x00, 0x68]);
    for _ in 0..4 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(bus.memory[0x0100], 0x55);
    assert_eq!(cpu.registers().sp, 0xFF);

    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.registers().sp, 0x00);
    assert_eq!(cpu.registers().a, 0x55);
}

#[test]
fn test_zero_page_indexed_wraps() {
    // LDX #$02; LDA $FF,X
    let (mut cpu, mut bus) = boot(&[0xA2, 0x02, 0xB5, 0xFF]);
    bus.memory[0x0001] = 0x77;
    bus.memory[0x0101] = 0x11;
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.step(&mut bus).unwrap(), 4);
    assert_eq!(cpu.registers().a, 0x77);
}

#[test]
fn test_indexed_indirect_pointer_wraps() {
    // LDA ($FF,X) with X = 0 takes the pointer from $FF and $00
    let (mut cpu, mut bus) = boot(&[0xA1, 0xFF]);
    bus.memory[0x00FF] = 0x34;
    bus.memory[0x0000] = 0x12;
    bus.memory[0x1234] = 0x99;
    assert_eq!(cpu.step(&mut bus).unwrap(), 6);
    assert_eq!(cpu.registers().a, 0x99);
}

#[test]
fn test_indirect_indexed_page_penalty() {
    // LDY #$01; LDA ($10),Y
    let (mut cpu, mut bus) = boot(&[0xA0, 0x01, 0xB1, 0x10]);
    bus.memory[0x0010] = 0xFF;
    bus.memory[0x0011] = 0x12;
    bus.memory[0x1300] = 0x42;
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.step(&mut bus).unwrap(), 6);
    assert_eq!(cpu.registers().a, 0x42);
}

#[test]
fn test_stores_and_rmw_take_fixed_cycles() {
    // LDX #$01; LDA #$07; STA $12FF,X; INC $12FF,X
    let (mut cpu, mut bus) = boot(&[0xA2, 0x01, 0xA9, 0x07, 0x9D, 0xFF, 0x12, 0xFE, 0xFF, 0x12]);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.step(&mut bus).unwrap(), 5);
    assert_eq!(bus.memory[0x1300], 0x07);
    assert_eq!(cpu.step(&mut bus).unwrap(), 7);
    assert_eq!(bus.memory[0x1300], 0x08);
}

#[test]
fn test_countdown_loop_cycles() {
    // LDX #$03; loop: DEX; BNE loop
    let (mut cpu, mut bus) = boot(&[0xA2, 0x03, 0xCA, 0xD0, 0xFD]);
    let mut cycles = 0;
    while cpu.registers().pc != 0x8005 {
        cycles += cpu.step(&mut bus).unwrap();
    }
    assert_eq!(cpu.registers().x, 0);
    // LDX 2 + DEX 3*2 + two taken branches 3 each + final branch 2
    assert_eq!(cycles, 16);
}

#[test]
fn test_branch_across_page() {
    let (mut cpu, mut bus) = boot(&[]);
    bus.load(0x80FD, &[0xD0, 0x02]);
    cpu.registers_mut().pc = 0x80FD;
    assert_eq!(cpu.step(&mut bus).unwrap(), 4);
    assert_eq!(cpu.registers().pc, 0x8101);
}

#[test]
fn test_php_plp_break_bit() {
    // PHP; LDA #$FF; PHA; PLP
    let (mut cpu, mut bus) = boot(&[0x08, 0xA9, 0xFF, 0x48, 0x28]);
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.memory[0x01FD], 0x24 | StatusFlags::BREAK);

    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(cpu.p_register(), 0xEF);
}

#[test]
fn test_irq_and_rti() {
    // CLI; NOP
    let (mut cpu, mut bus) = boot(&[0x58, 0xEA]);
    bus.load(0xFFFE, &[0x00, 0x90]);
    // INX; RTI
    bus.load(0x9000, &[0xE8, 0x40]);

    cpu.step(&mut bus).unwrap();
    assert!(cpu.interrupt_request(&mut bus));
    assert_eq!(cpu.registers().pc, 0x9000);
    assert!(cpu.status().interrupt());
    assert_eq!(bus.memory[0x01FD], 0x80);
    assert_eq!(bus.memory[0x01FC], 0x01);
    assert_eq!(bus.memory[0x01FB] & StatusFlags::BREAK, 0);

    // Masked while the handler runs
    assert!(!cpu.interrupt_request(&mut bus));

    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.registers().x, 1);
    assert_eq!(cpu.registers().pc, 0x8001);
    assert!(!cpu.status().interrupt());
}

#[test]
fn test_tick_takes_irq_at_instruction_boundary() {
    // CLI; then NOPs
    let (mut cpu, mut bus) = boot(&[0x58]);
    bus.load(0xFFFE, &[0x00, 0x90]);

    while cpu.registers().pc != 0x8001 {
        cpu.tick(&mut bus).unwrap();
    }
    bus.irq = true;
    while cpu.remaining_cycles() > 0 {
        cpu.tick(&mut bus).unwrap();
    }
    cpu.tick(&mut bus).unwrap();
    assert_eq!(cpu.registers().pc, 0x9000);
}

#[test]
fn test_stall_adds_cycles() {
    let (mut cpu, _) = boot(&[]);
    let before = cpu.total_cycles();
    cpu.stall(514);
    assert_eq!(cpu.total_cycles(), before + 514);
    assert_eq!(cpu.remaining_cycles(), 7 + 514);
}

#[test]
fn test_invalid_opcode_error() {
    let (mut cpu, mut bus) = boot(&[0x02]);
    let err = cpu.step(&mut bus).unwrap_err();
    assert_eq!(err, CpuError::InvalidOpcode { opcode: 0x02, pc: 0x8000 });
    assert_eq!(err.to_string(), "invalid opcode $02 at $8000");
}
