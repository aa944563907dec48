//! NES Core - Pure Rust NES emulator library
//!
//! This crate provides the core emulation logic for a Nintendo Entertainment System (NES).
//! It contains no window, audio device or input handling: callers feed controller
//! bytes in and take finished frames and audio samples out.

#![forbid(unsafe_code)]

/// CPU module containing the 2A03 (6502 variant) implementation
pub mod cpu;
/// 6502 opcode decode table
pub mod opcodes;
/// Memory bus and mapping
pub mod bus;
/// PPU (Picture Processing Unit) implementation
pub mod ppu;
/// APU (Audio Processing Unit) channels, frame sequencer and mixer
pub mod apu;
/// iNES image parsing
pub mod cartridge;
/// Cartridge mappers (NROM, MMC1, UxROM, CNROM)
pub mod mapper;
/// Standard controller
pub mod controller;
/// Crate-level errors
pub mod error;
/// Integration module for complete NES system
pub mod system;

pub use cartridge::{Cartridge, CartridgeError, Mirroring};
pub use cpu::CpuError;
pub use error::NesError;
pub use system::{NesConfig, NesSystem};
