//! NES System Integration
//!
//! This module integrates all NES components (CPU, PPU, APU, mapper) into a
//! working system. One machine cycle is three PPU dots, one APU cycle, one
//! mapper cycle and one CPU cycle, always in that order.

use log::info;

use crate::apu::{Apu, DEFAULT_SAMPLE_RATE};
use crate::bus::Bus;
use crate::cartridge::Cartridge;
use crate::cpu::{Bus as CpuBus, Cpu};
use crate::error::NesError;
use crate::mapper::Mapper;
use crate::ppu::Ppu;

/// System configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NesConfig {
    /// Audio output rate in Hz
    pub sample_rate: u32,
    /// Run a generic 6502 with BCD arithmetic instead of the 2A03
    pub decimal_mode: bool,
}

impl Default for NesConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            decimal_mode: false,
        }
    }
}

/// NES System - integrates all components
#[derive(Debug, Clone)]
pub struct NesSystem {
    cpu: Cpu,
    bus: Bus,
    /// Frame counter
    frame_count: u64,
    config: NesConfig,
}

impl NesSystem {
    /// Create a system with the default configuration and reset it
    pub fn new(cartridge: Cartridge) -> Result<Self, NesError> {
        Self::with_config(cartridge, NesConfig::default())
    }

    /// Create a system and reset it
    pub fn with_config(cartridge: Cartridge, config: NesConfig) -> Result<Self, NesError> {
        let mapper = Mapper::new(cartridge)?;
        let cpu = if config.decimal_mode {
            Cpu::with_decimal_mode()
        } else {
            Cpu::new()
        };
        let mut system = Self {
            cpu,
            bus: Bus::new(mapper, config.sample_rate),
            frame_count: 0,
            config,
        };
        system.reset();
        Ok(system)
    }

    /// Create a system from an iNES image
    pub fn from_rom(rom_data: &[u8]) -> Result<Self, NesError> {
        Self::new(Cartridge::from_rom(rom_data)?)
    }

    /// Swap in a new iNES image. On error the current cartridge keeps running.
    pub fn load_rom(&mut self, rom_data: &[u8]) -> Result<(), NesError> {
        let mapper = Mapper::new(Cartridge::from_rom(rom_data)?)?;
        self.bus = Bus::new(mapper, self.config.sample_rate);
        self.reset();
        Ok(())
    }

    /// Reset the NES system
    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset(&mut self.bus);
        self.frame_count = 0;
        info!(
            "reset: mapper {}, PC=${:04X}",
            self.bus.mapper().mapper_number(),
            self.cpu.registers().pc
        );
    }

    /// Advance one CPU cycle and the three PPU dots that go with it
    pub fn machine_cycle(&mut self) -> Result<(), NesError> {
        self.bus.tick_ppu();
        if self.bus.take_nmi() {
            self.cpu.non_maskable_interrupt(&mut self.bus);
        }
        self.bus.tick_ppu();
        self.bus.tick_ppu();

        self.bus.tick_apu();
        self.bus.tick_mapper();

        let stall = self.bus.take_stall();
        if stall > 0 {
            self.cpu.stall(stall);
        }
        self.cpu.tick(&mut self.bus)?;
        Ok(())
    }

    /// Run until the PPU finishes a frame
    pub fn run_frame(&mut self) -> Result<(), NesError> {
        loop {
            self.machine_cycle()?;
            if self.bus.ppu().frame_ready() {
                self.bus.clear_frame_ready();
                break;
            }
        }
        self.frame_count += 1;
        Ok(())
    }

    /// Run for N frames
    pub fn run_frames(&mut self, frames: u64) -> Result<(), NesError> {
        for _ in 0..frames {
            self.run_frame()?;
        }
        Ok(())
    }

    /// Run machine cycles until exactly one more instruction has executed
    pub fn step_instruction(&mut self) -> Result<(), NesError> {
        while self.cpu.remaining_cycles() > 0 {
            self.machine_cycle()?;
        }
        self.machine_cycle()?;
        while self.cpu.remaining_cycles() > 0 {
            self.machine_cycle()?;
        }
        Ok(())
    }

    /// Last completed frame, 256x240 packed 0x00RRGGBB
    pub fn frame_buffer(&self) -> &[u32] {
        self.bus.ppu().frame_buffer()
    }

    /// Audio produced since the last clear
    pub fn audio_samples(&self) -> &[f32] {
        self.bus.apu().samples()
    }

    pub fn clear_audio_samples(&mut self) {
        self.bus.apu_mut().clear_samples();
    }

    /// Set the buttons held on controller 1
    pub fn set_controller(&mut self, buttons: u8) {
        self.bus.set_controller(buttons);
    }

    /// Get CPU reference
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Get mutable CPU reference
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Get PPU reference
    pub fn ppu(&self) -> &Ppu {
        self.bus.ppu()
    }

    /// Get APU reference
    pub fn apu(&self) -> &Apu {
        self.bus.apu()
    }

    pub fn mapper(&self) -> &Mapper {
        self.bus.mapper()
    }

    pub fn config(&self) -> &NesConfig {
        &self.config
    }

    /// Get frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Read a byte from memory via the bus (with side effects)
    pub fn read_memory(&mut self, address: u16) -> u8 {
        self.bus.read(address)
    }

    /// Write a byte to memory via the bus
    pub fn write_memory(&mut self, address: u16, value: u8) {
        self.bus.write(address, value);
    }
}
