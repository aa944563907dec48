//! Cartridge image loading
//!
//! Parses iNES files into an immutable [`Cartridge`]. Bank switching lives in
//! [`crate::mapper`]; this module only knows how the image is laid out on disk.

use log::info;
use thiserror::Error;

/// iNES header size
pub const HEADER_SIZE: usize = 16;

/// Trainer size, present when flags 6 bit 2 is set
pub const TRAINER_SIZE: usize = 512;

/// PRG ROM bank size (16KB)
pub const PRG_BANK_SIZE: usize = 16 * 1024;

/// CHR ROM bank size (8KB)
pub const CHR_BANK_SIZE: usize = 8 * 1024;

/// Magic number: "NES\x1A"
pub const INES_MAGIC: [u8; 4] = [b'N', b'E', b'S', 0x1A];

/// Nametable mirroring arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    /// $2000/$2400 share one table, $2800/$2C00 the other
    Horizontal,
    /// $2000/$2800 share one table, $2400/$2C00 the other
    Vertical,
    /// All four windows show the first table
    SingleScreenLower,
    /// All four windows show the second table
    SingleScreenUpper,
    /// Four independent tables backed by cartridge RAM
    FourScreen,
}

impl Mirroring {
    /// Map a nametable address ($2000-$3EFF) to an offset into nametable RAM
    pub fn nametable_offset(self, address: u16) -> usize {
        let table = ((address >> 10) & 0x03) as usize;
        let physical = match self {
            Mirroring::Horizontal => table >> 1,
            Mirroring::Vertical => table & 0x01,
            Mirroring::SingleScreenLower => 0,
            Mirroring::SingleScreenUpper => 1,
            Mirroring::FourScreen => table,
        };
        physical * 0x400 + (address & 0x03FF) as usize
    }
}

/// iNES header structure
#[derive(Debug, Clone)]
pub struct InesHeader {
    /// PRG ROM size in 16KB units, as stored
    pub prg_rom_size: u8,
    /// CHR ROM size in 8KB units, as stored
    pub chr_rom_size: u8,
    /// Flags 6
    pub flags_6: u8,
    /// Flags 7
    pub flags_7: u8,
}

impl InesHeader {
    /// Parse an iNES header from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, CartridgeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CartridgeError::Truncated {
                expected: HEADER_SIZE,
                found: bytes.len(),
            });
        }

        if bytes[0..4] != INES_MAGIC {
            return Err(CartridgeError::InvalidHeader("missing NES<EOF> magic"));
        }

        Ok(Self {
            prg_rom_size: bytes[4],
            chr_rom_size: bytes[5],
            flags_6: bytes[6],
            flags_7: bytes[7],
        })
    }

    /// Number of 16KB PRG banks. A stored count of zero is treated as one.
    pub fn prg_banks(&self) -> usize {
        self.prg_rom_size.max(1) as usize
    }

    /// Number of 8KB CHR banks. Zero means the board carries CHR-RAM.
    pub fn chr_banks(&self) -> usize {
        self.chr_rom_size as usize
    }

    /// Get the mapper number from flags
    pub fn mapper_number(&self) -> u8 {
        (self.flags_6 >> 4) | (self.flags_7 & 0xF0)
    }

    /// Check if trainer is present
    pub fn has_trainer(&self) -> bool {
        (self.flags_6 & 0x04) != 0
    }

    /// Check if the PRG RAM is battery backed
    pub fn has_battery(&self) -> bool {
        (self.flags_6 & 0x02) != 0
    }

    /// Check if the board provides its own four-screen VRAM
    pub fn four_screen(&self) -> bool {
        (self.flags_6 & 0x08) != 0
    }

    /// Hard-wired mirroring selected by the header
    pub fn mirroring(&self) -> Mirroring {
        if self.four_screen() {
            Mirroring::FourScreen
        } else if (self.flags_6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        }
    }
}

/// Parsed cartridge image
#[derive(Debug, Clone)]
pub struct Cartridge {
    /// iNES header
    header: InesHeader,
    /// PRG ROM data
    prg_rom: Vec<u8>,
    /// CHR ROM data, or zeroed CHR RAM when the header declares none
    chr: Vec<u8>,
    /// Trainer data (if present)
    trainer: Option<Vec<u8>>,
}

impl Cartridge {
    /// Create a new cartridge from iNES ROM data
    pub fn from_rom(rom_data: &[u8]) -> Result<Self, CartridgeError> {
        let header = InesHeader::parse(rom_data)?;

        let mut offset = HEADER_SIZE;

        let trainer = if header.has_trainer() {
            let trainer_data = slice(rom_data, offset, TRAINER_SIZE)?.to_vec();
            offset += TRAINER_SIZE;
            Some(trainer_data)
        } else {
            None
        };

        let prg_rom_size = header.prg_banks() * PRG_BANK_SIZE;
        let prg_rom = slice(rom_data, offset, prg_rom_size)?.to_vec();
        offset += prg_rom_size;

        let chr = if header.chr_banks() == 0 {
            vec![0; CHR_BANK_SIZE]
        } else {
            slice(rom_data, offset, header.chr_banks() * CHR_BANK_SIZE)?.to_vec()
        };

        info!(
            "loaded cartridge: mapper {}, {}KB PRG, {}KB CHR{}, {:?} mirroring",
            header.mapper_number(),
            prg_rom.len() / 1024,
            chr.len() / 1024,
            if header.chr_banks() == 0 { " RAM" } else { "" },
            header.mirroring()
        );

        Ok(Self {
            header,
            prg_rom,
            chr,
            trainer,
        })
    }

    /// Get the iNES header
    pub fn header(&self) -> &InesHeader {
        &self.header
    }

    /// Get PRG ROM data
    pub fn prg_rom(&self) -> &[u8] {
        &self.prg_rom
    }

    /// Get CHR data (ROM or the initial RAM contents)
    pub fn chr(&self) -> &[u8] {
        &self.chr
    }

    /// True when the pattern tables are writable RAM
    pub fn chr_is_ram(&self) -> bool {
        self.header.chr_banks() == 0
    }

    /// Trainer bytes, if the image carries one
    pub fn trainer(&self) -> Option<&[u8]> {
        self.trainer.as_deref()
    }

    /// Mapper number from the header
    pub fn mapper_number(&self) -> u8 {
        self.header.mapper_number()
    }

    /// Hard-wired mirroring from the header
    pub fn mirroring(&self) -> Mirroring {
        self.header.mirroring()
    }

    pub(crate) fn into_parts(self) -> (InesHeader, Vec<u8>, Vec<u8>) {
        (self.header, self.prg_rom, self.chr)
    }
}

fn slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], CartridgeError> {
    data.get(offset..offset + len)
        .ok_or(CartridgeError::Truncated {
            expected: offset + len,
            found: data.len(),
        })
}

/// Cartridge error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartridgeError {
    #[error("invalid iNES header: {0}")]
    InvalidHeader(&'static str),
    #[error("truncated ROM image: expected {expected} bytes, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("unsupported mapper {0}")]
    UnsupportedMapper(u8),
}
