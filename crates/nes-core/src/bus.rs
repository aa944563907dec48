//! Memory bus and mapping
//!
//! The NES memory map:
//! $0000-$07FF - 2KB Internal RAM
//! $0800-$1FFF - RAM mirroring (repeats every $0800 bytes)
//! $2000-$2007 - PPU registers
//! $2008-$3FFF - PPU registers (mirrored every $08 bytes)
//! $4000-$4013 - APU registers
//! $4014       - OAM DMA
//! $4015       - APU status
//! $4016       - Controller
//! $4017       - APU frame counter (write), second controller (read)
//! $4018-$401F - Unused
//! $4020-$FFFF - Cartridge space, through the mapper

use log::warn;

use crate::apu::Apu;
use crate::controller::Controller;
use crate::cpu::Bus as CpuBus;
use crate::mapper::Mapper;
use crate::ppu::Ppu;

/// RAM size in bytes
pub const RAM_SIZE: usize = 2048; // 2KB

/// CPU cycles taken by an OAM DMA transfer
pub const OAM_DMA_CYCLES: u32 = 514;

/// CPU cycles taken by a DMC sample fetch
pub const DMC_FETCH_CYCLES: u32 = 4;

/// Memory bus structure
#[derive(Debug, Clone)]
pub struct Bus {
    /// 2KB internal RAM (with mirroring)
    ram: [u8; RAM_SIZE],
    ppu: Ppu,
    apu: Apu,
    mapper: Mapper,
    controller: Controller,
    /// CPU cycles owed to DMA, applied before the next CPU tick
    pending_stall: u32,
}

impl Bus {
    /// Create a bus around a cartridge mapper
    pub fn new(mapper: Mapper, sample_rate: u32) -> Self {
        Self {
            ram: [0; RAM_SIZE],
            ppu: Ppu::new(),
            apu: Apu::with_sample_rate(sample_rate),
            mapper,
            controller: Controller::new(),
            pending_stall: 0,
        }
    }

    /// Reset the chips on the bus. RAM and cartridge contents survive.
    pub fn reset(&mut self) {
        self.ppu.reset();
        self.apu.reset();
        self.controller = Controller::new();
        self.pending_stall = 0;
    }

    /// One PPU dot
    pub fn tick_ppu(&mut self) {
        self.ppu.tick(&mut self.mapper);
    }

    /// Return and clear the PPU's NMI edge
    pub fn take_nmi(&mut self) -> bool {
        self.ppu.take_nmi()
    }

    /// One APU cycle, serving any DMC sample fetch
    pub fn tick_apu(&mut self) {
        self.apu.tick();
        if let Some(address) = self.apu.dmc_fetch_address() {
            let value = self.read(address);
            self.apu.dmc_fill(value);
            self.pending_stall += DMC_FETCH_CYCLES;
        }
    }

    /// One mapper cycle
    pub fn tick_mapper(&mut self) {
        self.mapper.tick();
    }

    /// Return and clear the CPU cycles owed to DMA
    pub fn take_stall(&mut self) -> u32 {
        std::mem::take(&mut self.pending_stall)
    }

    pub fn clear_frame_ready(&mut self) {
        self.ppu.clear_frame_ready();
    }

    /// Set the buttons held on controller 1
    pub fn set_controller(&mut self, buttons: u8) {
        self.controller.set_buttons(buttons);
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn apu(&self) -> &Apu {
        &self.apu
    }

    pub fn apu_mut(&mut self) -> &mut Apu {
        &mut self.apu
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Internal RAM
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    fn oam_dma(&mut self, page: u8) {
        let base = (page as u16) << 8;
        for offset in 0..=0xFF {
            let value = self.read(base | offset);
            self.ppu.write_oam_dma(value);
        }
        self.pending_stall += OAM_DMA_CYCLES;
    }
}

impl CpuBus for Bus {
    /// Read a byte from the given address
    fn read(&mut self, address: u16) -> u8 {
        match address {
            // $0000-$1FFF - Internal RAM and mirrors
            0x0000..=0x1FFF => self.ram[(address & 0x07FF) as usize],
            // $2000-$3FFF - PPU registers, mirrored every 8 bytes
            0x2000..=0x3FFF => self.ppu.read_register(address, &self.mapper),
            0x4015 => self.apu.read_status(),
            0x4016 => self.controller.read(),
            // No second controller; bit 6 is open bus
            0x4017 => 0x40,
            // Write-only APU registers and the unused test range
            0x4000..=0x401F => 0,
            // $4020-$FFFF - Cartridge
            _ => self.mapper.read_cpu(address),
        }
    }

    /// Write a byte to the given address
    fn write(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x1FFF => self.ram[(address & 0x07FF) as usize] = value,
            0x2000..=0x3FFF => self.ppu.write_register(address, value, &mut self.mapper),
            0x4014 => self.oam_dma(value),
            0x4016 => self.controller.write(value),
            0x4000..=0x4013 | 0x4015 | 0x4017 => self.apu.write_register(address, value),
            0x4018..=0x401F => warn!("write ${:02X} to unused ${:04X}", value, address),
            _ => self.mapper.write_cpu(address, value),
        }
    }

    fn irq_line(&mut self) -> bool {
        self.apu.irq_pending()
    }
}
