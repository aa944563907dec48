#![allow(dead_code)]

use std::path::PathBuf;

use nes_core::cartridge::{CHR_BANK_SIZE, INES_MAGIC, PRG_BANK_SIZE};
use nes_core::cpu::Bus;

/// Directory holding optional third-party test ROMs
pub fn rom_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("roms")
}

/// Read a test ROM from `tests/roms/`; a missing file fails the test
pub fn load_test_rom(name: &str) -> Vec<u8> {
    let path = rom_dir().join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("failed to read {}: {e}", path.display()))
}

/// Builds iNES images in memory.
///
/// Code goes at the start of the last PRG bank, which every supported board
/// maps at $C000 after power-on. The reset vector points there and the NMI
/// vector points at $F000.
pub struct RomBuilder {
    mapper: u8,
    flags_6: u8,
    prg: Vec<u8>,
    chr: Vec<u8>,
}

impl RomBuilder {
    pub fn new(mapper: u8, prg_banks: usize, chr_banks: usize) -> Self {
        let mut builder = Self {
            mapper,
            flags_6: (mapper & 0x0F) << 4,
            prg: vec![0xEA; prg_banks * PRG_BANK_SIZE],
            chr: vec![0; chr_banks * CHR_BANK_SIZE],
        };
        builder.set_vector(0xFFFA, 0xF000);
        builder.set_vector(0xFFFC, 0xC000);
        builder.set_vector(0xFFFE, 0xF000);
        // RTI as the default interrupt handler
        builder.write_last_bank(0x3000, &[0x40]);
        builder
    }

    /// 16KB PRG, 8KB CHR ROM
    pub fn nrom() -> Self {
        Self::new(0, 1, 1)
    }

    pub fn program(mut self, code: &[u8]) -> Self {
        self.write_last_bank(0, code);
        self
    }

    pub fn nmi_handler(mut self, code: &[u8]) -> Self {
        self.write_last_bank(0x3000, code);
        self
    }

    pub fn vertical_mirroring(mut self) -> Self {
        self.flags_6 |= 0x01;
        self
    }

    /// Fill a 16KB PRG bank with a marker byte, keeping the vectors of the last one
    pub fn fill_prg_bank(mut self, bank: usize, value: u8) -> Self {
        let start = bank * PRG_BANK_SIZE;
        let end = if start + PRG_BANK_SIZE == self.prg.len() {
            self.prg.len() - 6
        } else {
            start + PRG_BANK_SIZE
        };
        self.prg[start..end].fill(value);
        self
    }

    /// Fill an 8KB CHR bank with a marker byte
    pub fn fill_chr_bank(mut self, bank: usize, value: u8) -> Self {
        let start = bank * CHR_BANK_SIZE;
        self.chr[start..start + CHR_BANK_SIZE].fill(value);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let prg_banks = (self.prg.len() / PRG_BANK_SIZE) as u8;
        let chr_banks = (self.chr.len() / CHR_BANK_SIZE) as u8;
        let mut rom = Vec::with_capacity(16 + self.prg.len() + self.chr.len());
        rom.extend_from_slice(&INES_MAGIC);
        rom.extend_from_slice(&[
            prg_banks,
            chr_banks,
            self.flags_6,
            self.mapper & 0xF0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
            0,
        ]);
        rom.extend_from_slice(&self.prg);
        rom.extend_from_slice(&self.chr);
        rom
    }

    fn write_last_bank(&mut self, offset: usize, bytes: &[u8]) {
        let start = self.prg.len() - PRG_BANK_SIZE + offset;
        self.prg[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn set_vector(&mut self, vector: u16, target: u16) {
        let offset = (vector as usize) & (PRG_BANK_SIZE - 1);
        self.write_last_bank(offset, &target.to_le_bytes());
    }
}

/// NROM image running `program` from $C000
pub fn nrom(program: &[u8]) -> Vec<u8> {
    RomBuilder::nrom().program(program).build()
}

/// 64KB of flat RAM for exercising the CPU on its own
pub struct FlatBus {
    pub memory: Vec<u8>,
    pub irq: bool,
}

impl FlatBus {
    /// Program loaded at $8000 with the reset vector pointing at it
    pub fn with_program(program: &[u8]) -> Self {
        let mut bus = Self::from_image(&[]);
        bus.load(0x8000, program);
        bus.load(0xFFFC, &[0x00, 0x80]);
        bus
    }

    /// Memory image loaded from $0000
    pub fn from_image(image: &[u8]) -> Self {
        let mut memory = vec![0; 0x10000];
        let len = image.len().min(memory.len());
        memory[..len].copy_from_slice(&image[..len]);
        Self { memory, irq: false }
    }

    pub fn load(&mut self, address: u16, bytes: &[u8]) {
        let start = address as usize;
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

impl Bus for FlatBus {
    fn read(&mut self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[address as usize] = value;
    }

    fn irq_line(&mut self) -> bool {
        self.irq
    }
}
