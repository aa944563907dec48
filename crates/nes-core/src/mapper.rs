//! Mapper support
//!
//! Translates CPU cartridge space ($4020-$FFFF) and PPU pattern/nametable space
//! ($0000-$3EFF) through board-specific bank registers. The supported boards are
//! a closed set, so they are variants of [`Board`] rather than trait objects.
//!
//! CPU side:
//! $4020-$5FFF - Expansion area (unused by these boards, reads 0)
//! $6000-$7FFF - 8KB PRG RAM
//! $8000-$FFFF - PRG ROM windows
//!
//! PPU side:
//! $0000-$1FFF - CHR ROM/RAM windows
//! $2000-$3EFF - Nametable RAM routed through [`Mirroring`]

mod mmc1;

pub use mmc1::Mmc1;

use log::debug;

use crate::cartridge::{Cartridge, CartridgeError, Mirroring, CHR_BANK_SIZE, PRG_BANK_SIZE};

/// PRG RAM size (8KB)
pub const PRG_RAM_SIZE: usize = 8 * 1024;

/// Nametable RAM size: four 1KB tables, only two used unless four-screen
pub const NAMETABLE_RAM_SIZE: usize = 4 * 1024;

/// Board-specific bank state
#[derive(Debug, Clone)]
pub enum Board {
    /// NROM - no bank switching
    Nrom,
    /// MMC1 - serial shift-register mapper
    Mmc1(Mmc1),
    /// UxROM - switchable 16KB at $8000, last bank fixed at $C000
    Uxrom { prg_bank: u8 },
    /// CNROM - switchable 8KB CHR
    Cnrom { chr_bank: u8 },
}

/// Cartridge hardware as seen from the CPU and PPU buses
#[derive(Debug, Clone)]
pub struct Mapper {
    board: Board,
    mapper_number: u8,
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    prg_ram: Vec<u8>,
    vram: Vec<u8>,
    /// Mirroring wired by the board, used unless the mapper controls it
    fixed_mirroring: Mirroring,
}

impl Mapper {
    /// Build the mapper described by a cartridge header
    pub fn new(cartridge: Cartridge) -> Result<Self, CartridgeError> {
        let chr_is_ram = cartridge.chr_is_ram();
        let (header, prg_rom, chr) = cartridge.into_parts();
        let mapper_number = header.mapper_number();

        let board = match mapper_number {
            0 => Board::Nrom,
            1 => Board::Mmc1(Mmc1::new()),
            2 => Board::Uxrom { prg_bank: 0 },
            3 => Board::Cnrom { chr_bank: 0 },
            n => return Err(CartridgeError::UnsupportedMapper(n)),
        };

        Ok(Self {
            board,
            mapper_number,
            prg_rom,
            chr,
            chr_is_ram,
            prg_ram: vec![0; PRG_RAM_SIZE],
            vram: vec![0; NAMETABLE_RAM_SIZE],
            fixed_mirroring: header.mirroring(),
        })
    }

    /// iNES mapper number
    pub fn mapper_number(&self) -> u8 {
        self.mapper_number
    }

    /// Current board state
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// PRG RAM contents (battery-backed on some carts)
    pub fn prg_ram(&self) -> &[u8] {
        &self.prg_ram
    }

    /// Current nametable arrangement
    pub fn mirroring(&self) -> Mirroring {
        match &self.board {
            // Four-screen boards ignore the mapper's mirroring control
            Board::Mmc1(mmc1) if self.fixed_mirroring != Mirroring::FourScreen => mmc1.mirroring(),
            _ => self.fixed_mirroring,
        }
    }

    /// Advance mapper timers by one CPU cycle
    pub fn tick(&mut self) {
        if let Board::Mmc1(mmc1) = &mut self.board {
            mmc1.tick();
        }
    }

    /// Read from cartridge space ($4020-$FFFF)
    pub fn read_cpu(&self, address: u16) -> u8 {
        match address {
            0x6000..=0x7FFF => {
                if self.prg_ram_enabled() {
                    self.prg_ram[(address & 0x1FFF) as usize]
                } else {
                    0
                }
            }
            0x8000..=0xFFFF => self.prg_rom[self.prg_offset(address) % self.prg_rom.len()],
            _ => 0,
        }
    }

    /// Write to cartridge space ($4020-$FFFF)
    pub fn write_cpu(&mut self, address: u16, value: u8) {
        match address {
            0x6000..=0x7FFF => {
                if self.prg_ram_enabled() {
                    self.prg_ram[(address & 0x1FFF) as usize] = value;
                }
            }
            0x8000..=0xFFFF => match &mut self.board {
                Board::Nrom => {}
                Board::Mmc1(mmc1) => mmc1.write(address, value),
                Board::Uxrom { prg_bank } => {
                    *prg_bank = value & 0x0F;
                    debug!("UxROM PRG bank {}", prg_bank);
                }
                Board::Cnrom { chr_bank } => {
                    *chr_bank = value & 0x03;
                    debug!("CNROM CHR bank {}", chr_bank);
                }
            },
            _ => {}
        }
    }

    /// Read from PPU space ($0000-$3EFF)
    pub fn read_ppu(&self, address: u16) -> u8 {
        let address = address & 0x3FFF;
        if address < 0x2000 {
            self.chr[self.chr_offset(address) % self.chr.len()]
        } else {
            self.vram[self.mirroring().nametable_offset(address)]
        }
    }

    /// Write to PPU space ($0000-$3EFF)
    pub fn write_ppu(&mut self, address: u16, value: u8) {
        let address = address & 0x3FFF;
        if address < 0x2000 {
            if self.chr_is_ram {
                let offset = self.chr_offset(address) % self.chr.len();
                self.chr[offset] = value;
            }
        } else {
            let offset = self.mirroring().nametable_offset(address);
            self.vram[offset] = value;
        }
    }

    fn prg_ram_enabled(&self) -> bool {
        match &self.board {
            Board::Mmc1(mmc1) => mmc1.prg_ram_enabled(),
            _ => true,
        }
    }

    /// Unmasked offset into PRG ROM for an address in $8000-$FFFF
    fn prg_offset(&self, address: u16) -> usize {
        let window = (address & 0x3FFF) as usize;
        let bank_count = self.prg_rom.len() / PRG_BANK_SIZE;
        match &self.board {
            Board::Nrom | Board::Cnrom { .. } => (address - 0x8000) as usize,
            Board::Mmc1(mmc1) => mmc1.prg_bank(address, bank_count) * PRG_BANK_SIZE + window,
            Board::Uxrom { prg_bank } => {
                let bank = if address < 0xC000 {
                    *prg_bank as usize % bank_count
                } else {
                    bank_count - 1
                };
                bank * PRG_BANK_SIZE + window
            }
        }
    }

    /// Unmasked offset into CHR for an address in $0000-$1FFF
    fn chr_offset(&self, address: u16) -> usize {
        match &self.board {
            Board::Nrom | Board::Uxrom { .. } => address as usize,
            Board::Mmc1(mmc1) => mmc1.chr_offset(address),
            Board::Cnrom { chr_bank } => *chr_bank as usize * CHR_BANK_SIZE + address as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::INES_MAGIC;

    fn cartridge(mapper: u8, prg_banks: u8, chr_banks: u8, flags_6: u8) -> Cartridge {
        let mut rom = Vec::new();
        rom.extend_from_slice(&INES_MAGIC);
        rom.push(prg_banks);
        rom.push(chr_banks);
        rom.push(flags_6 | (mapper << 4));
        rom.push(mapper & 0xF0);
        rom.extend_from_slice(&[0u8; 8]);
        for bank in 0..prg_banks {
            rom.extend(std::iter::repeat(bank).take(PRG_BANK_SIZE));
        }
        for bank in 0..chr_banks {
            rom.extend(std::iter::repeat(0x80 | bank).take(CHR_BANK_SIZE));
        }
        Cartridge::from_rom(&rom).unwrap()
    }

    #[test]
    fn test_unsupported_mapper() {
        let err = Mapper::new(cartridge(4, 1, 1, 0)).unwrap_err();
        assert_eq!(err, CartridgeError::UnsupportedMapper(4));
    }

    #[test]
    fn test_nrom_16k_mirrors() {
        let mapper = Mapper::new(cartridge(0, 1, 1, 0)).unwrap();
        assert_eq!(mapper.read_cpu(0x8000), 0);
        assert_eq!(mapper.read_cpu(0xC000), 0);
        assert_eq!(mapper.read_cpu(0xFFFF), 0);
    }

    #[test]
    fn test_nrom_32k_linear() {
        let mapper = Mapper::new(cartridge(0, 2, 1, 0)).unwrap();
        assert_eq!(mapper.read_cpu(0xBFFF), 0);
        assert_eq!(mapper.read_cpu(0xC000), 1);
    }

    #[test]
    fn test_prg_ram() {
        let mut mapper = Mapper::new(cartridge(0, 1, 1, 0)).unwrap();
        mapper.write_cpu(0x6123, 0x42);
        assert_eq!(mapper.read_cpu(0x6123), 0x42);
        assert_eq!(mapper.prg_ram()[0x123], 0x42);
    }

    #[test]
    fn test_expansion_area_reads_zero() {
        let mut mapper = Mapper::new(cartridge(0, 1, 1, 0)).unwrap();
        mapper.write_cpu(0x5000, 0x42);
        assert_eq!(mapper.read_cpu(0x5000), 0);
    }

    #[test]
    fn test_uxrom_switching() {
        let mut mapper = Mapper::new(cartridge(2, 4, 0, 0)).unwrap();
        assert_eq!(mapper.read_cpu(0x8000), 0);
        assert_eq!(mapper.read_cpu(0xC000), 3);

        mapper.write_cpu(0x8000, 0x02);
        assert_eq!(mapper.read_cpu(0x8000), 2);
        assert_eq!(mapper.read_cpu(0xFFFF), 3);

        // Bank index wraps at the bank count
        mapper.write_cpu(0xFFFF, 0x05);
        assert_eq!(mapper.read_cpu(0x8000), 1);
    }

    #[test]
    fn test_cnrom_switching() {
        let mut mapper = Mapper::new(cartridge(3, 1, 4, 0)).unwrap();
        assert_eq!(mapper.read_ppu(0x0000), 0x80);

        mapper.write_cpu(0x8000, 0x03);
        assert_eq!(mapper.read_ppu(0x0000), 0x83);
        assert_eq!(mapper.read_ppu(0x1FFF), 0x83);
    }

    #[test]
    fn test_chr_rom_is_read_only() {
        let mut mapper = Mapper::new(cartridge(0, 1, 1, 0)).unwrap();
        mapper.write_ppu(0x0010, 0x12);
        assert_eq!(mapper.read_ppu(0x0010), 0x80);
    }

    #[test]
    fn test_chr_ram_writable() {
        let mut mapper = Mapper::new(cartridge(0, 1, 0, 0)).unwrap();
        mapper.write_ppu(0x0010, 0x12);
        assert_eq!(mapper.read_ppu(0x0010), 0x12);
    }

    #[test]
    fn test_nametable_mirroring() {
        // Vertical: $2000 and $2800 share storage
        let mut mapper = Mapper::new(cartridge(0, 1, 1, 0x01)).unwrap();
        mapper.write_ppu(0x2005, 0x77);
        assert_eq!(mapper.read_ppu(0x2805), 0x77);
        assert_eq!(mapper.read_ppu(0x2405), 0x00);

        // Horizontal: $2000 and $2400 share storage
        let mut mapper = Mapper::new(cartridge(0, 1, 1, 0x00)).unwrap();
        mapper.write_ppu(0x2005, 0x77);
        assert_eq!(mapper.read_ppu(0x2405), 0x77);
        assert_eq!(mapper.read_ppu(0x2805), 0x00);
    }
}
