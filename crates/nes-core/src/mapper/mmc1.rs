//! MMC1 (mapper 1)
//!
//! Registers are loaded one bit at a time through a 5-bit shift register at
//! $8000-$FFFF. The fifth write commits the value to the register picked by
//! address bits 13-14:
//! $8000-$9FFF - Control (mirroring, PRG mode, CHR mode)
//! $A000-$BFFF - CHR bank 0
//! $C000-$DFFF - CHR bank 1
//! $E000-$FFFF - PRG bank (bit 4 disables PRG RAM)

use log::debug;

use crate::cartridge::Mirroring;

/// CPU cycles during which writes are ignored after a commit
const WRITE_LOCKOUT_CYCLES: u8 = 3;

/// MMC1 register state
#[derive(Debug, Clone)]
pub struct Mmc1 {
    shift: u8,
    shift_count: u8,
    control: u8,
    chr_bank_0: u8,
    chr_bank_1: u8,
    prg_bank: u8,
    lockout: u8,
}

impl Mmc1 {
    /// Power-on state: PRG mode 3 (last bank fixed at $C000)
    pub fn new() -> Self {
        Self {
            shift: 0,
            shift_count: 0,
            control: 0x0C,
            chr_bank_0: 0,
            chr_bank_1: 0,
            prg_bank: 0,
            lockout: 0,
        }
    }

    /// Control register
    pub fn control(&self) -> u8 {
        self.control
    }

    /// Bits loaded into the shift register so far
    pub fn shift_count(&self) -> u8 {
        self.shift_count
    }

    /// Partially assembled shift register value
    pub fn shift(&self) -> u8 {
        self.shift
    }

    /// CHR bank registers
    pub fn chr_banks(&self) -> (u8, u8) {
        (self.chr_bank_0, self.chr_bank_1)
    }

    /// PRG bank register
    pub fn prg_bank_register(&self) -> u8 {
        self.prg_bank
    }

    pub(super) fn tick(&mut self) {
        self.lockout = self.lockout.saturating_sub(1);
    }

    pub(super) fn write(&mut self, address: u16, value: u8) {
        if self.lockout > 0 {
            return;
        }

        if value & 0x80 != 0 {
            self.shift = 0;
            self.shift_count = 0;
            self.control |= 0x0C;
            return;
        }

        self.shift |= (value & 0x01) << self.shift_count;
        self.shift_count += 1;
        if self.shift_count < 5 {
            return;
        }

        let data = self.shift;
        match (address >> 13) & 0x03 {
            0 => self.control = data,
            1 => self.chr_bank_0 = data,
            2 => self.chr_bank_1 = data,
            _ => self.prg_bank = data,
        }
        debug!(
            "MMC1 ${:04X} <- {:05b} (control {:05b})",
            address & 0xE000,
            data,
            self.control
        );

        self.shift = 0;
        self.shift_count = 0;
        self.lockout = WRITE_LOCKOUT_CYCLES;
    }

    pub(super) fn mirroring(&self) -> Mirroring {
        match self.control & 0x03 {
            0 => Mirroring::SingleScreenLower,
            1 => Mirroring::SingleScreenUpper,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        }
    }

    pub(super) fn prg_ram_enabled(&self) -> bool {
        self.prg_bank & 0x10 == 0
    }

    /// 16KB bank index visible at `address`
    pub(super) fn prg_bank(&self, address: u16, bank_count: usize) -> usize {
        let bank = (self.prg_bank & 0x0F) as usize;
        let upper = address >= 0xC000;
        let selected = match (self.control >> 2) & 0x03 {
            0 | 1 => (bank & !1) | upper as usize,
            2 => {
                if upper {
                    bank
                } else {
                    0
                }
            }
            _ => {
                if upper {
                    bank_count - 1
                } else {
                    bank
                }
            }
        };
        selected % bank_count
    }

    /// Offset into CHR for a pattern-table address
    pub(super) fn chr_offset(&self, address: u16) -> usize {
        let window = (address & 0x0FFF) as usize;
        if self.control & 0x10 == 0 {
            (self.chr_bank_0 & 0x1E) as usize * 0x1000 + address as usize
        } else if address < 0x1000 {
            self.chr_bank_0 as usize * 0x1000 + window
        } else {
            self.chr_bank_1 as usize * 0x1000 + window
        }
    }
}

impl Default for Mmc1 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(mmc1: &mut Mmc1, address: u16, value: u8) {
        for bit in 0..5 {
            mmc1.write(address, (value >> bit) & 1);
        }
        for _ in 0..WRITE_LOCKOUT_CYCLES {
            mmc1.tick();
        }
    }

    #[test]
    fn test_reset_then_serial_load() {
        let mut mmc1 = Mmc1::new();
        for value in [0x80, 1, 0, 1, 0, 0] {
            mmc1.write(0x8000, value);
        }
        assert_eq!(mmc1.control(), 0b00101);
        assert_eq!(mmc1.shift_count(), 0);
        assert_eq!(mmc1.shift(), 0);
    }

    #[test]
    fn test_reset_forces_prg_mode_3() {
        let mut mmc1 = Mmc1::new();
        load(&mut mmc1, 0x8000, 0x00);
        assert_eq!(mmc1.control() & 0x0C, 0);

        mmc1.write(0x8000, 1);
        mmc1.write(0x8000, 0x80);
        assert_eq!(mmc1.control() & 0x0C, 0x0C);
        assert_eq!(mmc1.shift_count(), 0);
    }

    #[test]
    fn test_lockout_after_commit() {
        let mut mmc1 = Mmc1::new();
        for bit in 0..5 {
            mmc1.write(0xE000, (0x03 >> bit) & 1);
        }
        assert_eq!(mmc1.prg_bank_register(), 0x03);

        mmc1.write(0xE000, 1);
        assert_eq!(mmc1.shift_count(), 0);

        for _ in 0..WRITE_LOCKOUT_CYCLES {
            mmc1.tick();
        }
        mmc1.write(0xE000, 1);
        assert_eq!(mmc1.shift_count(), 1);
    }

    #[test]
    fn test_register_select() {
        let mut mmc1 = Mmc1::new();
        load(&mut mmc1, 0xA000, 0x04);
        load(&mut mmc1, 0xC000, 0x07);
        load(&mut mmc1, 0xE000, 0x12);
        assert_eq!(mmc1.chr_banks(), (0x04, 0x07));
        assert_eq!(mmc1.prg_bank_register(), 0x12);
        assert!(!mmc1.prg_ram_enabled());
    }

    #[test]
    fn test_prg_modes() {
        let mut mmc1 = Mmc1::new();
        load(&mut mmc1, 0xE000, 0x05);

        // Mode 3: switch $8000, fix last
        assert_eq!(mmc1.prg_bank(0x8000, 8), 5);
        assert_eq!(mmc1.prg_bank(0xC000, 8), 7);

        // Mode 2: fix first, switch $C000
        load(&mut mmc1, 0x8000, 0b01000);
        assert_eq!(mmc1.prg_bank(0x8000, 8), 0);
        assert_eq!(mmc1.prg_bank(0xC000, 8), 5);

        // Mode 0: 32KB, low bit ignored
        load(&mut mmc1, 0x8000, 0b00000);
        assert_eq!(mmc1.prg_bank(0x8000, 8), 4);
        assert_eq!(mmc1.prg_bank(0xC000, 8), 5);
    }

    #[test]
    fn test_chr_modes() {
        let mut mmc1 = Mmc1::new();
        load(&mut mmc1, 0xA000, 0x03);
        load(&mut mmc1, 0xC000, 0x05);

        // 8KB mode ignores bit 0 of CHR bank 0
        assert_eq!(mmc1.chr_offset(0x0000), 0x2000);
        assert_eq!(mmc1.chr_offset(0x1000), 0x3000);

        load(&mut mmc1, 0x8000, 0b11100);
        assert_eq!(mmc1.chr_offset(0x0000), 0x3000);
        assert_eq!(mmc1.chr_offset(0x1004), 0x5004);
    }

    #[test]
    fn test_mirroring_modes() {
        let mut mmc1 = Mmc1::new();
        let expected = [
            Mirroring::SingleScreenLower,
            Mirroring::SingleScreenUpper,
            Mirroring::Vertical,
            Mirroring::Horizontal,
        ];
        for (mode, mirroring) in expected.into_iter().enumerate() {
            load(&mut mmc1, 0x8000, 0x0C | mode as u8);
            assert_eq!(mmc1.mirroring(), mirroring);
        }
    }
}
