//! Standard controller on $4016
//!
//! The pad is a parallel-in, serial-out shift register. While the strobe bit is
//! high the register keeps reloading from the buttons; once it drops, each read
//! shifts out one button in the order A, B, Select, Start, Up, Down, Left, Right.

/// Button bits in the controller byte
pub const BUTTON_A: u8 = 0x01;
pub const BUTTON_B: u8 = 0x02;
pub const BUTTON_SELECT: u8 = 0x04;
pub const BUTTON_START: u8 = 0x08;
pub const BUTTON_UP: u8 = 0x10;
pub const BUTTON_DOWN: u8 = 0x20;
pub const BUTTON_LEFT: u8 = 0x40;
pub const BUTTON_RIGHT: u8 = 0x80;

/// Bit 6 of every read comes back set (open bus on the real console)
const OPEN_BUS: u8 = 0x40;

/// Standard NES controller
#[derive(Debug, Clone, Default)]
pub struct Controller {
    buttons: u8,
    shift: u8,
    strobe: bool,
}

impl Controller {
    /// Create a controller with no buttons held
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held buttons
    pub fn set_buttons(&mut self, buttons: u8) {
        self.buttons = buttons;
        if self.strobe {
            self.shift = buttons;
        }
    }

    /// Currently held buttons
    pub fn buttons(&self) -> u8 {
        self.buttons
    }

    /// $4016 write
    pub fn write(&mut self, value: u8) {
        self.strobe = value & 0x01 != 0;
        if self.strobe {
            self.shift = self.buttons;
        }
    }

    /// $4016 read
    pub fn read(&mut self) -> u8 {
        if self.strobe {
            return (self.buttons & 0x01) | OPEN_BUS;
        }
        let bit = self.shift & 0x01;
        // Empty shift register reads back as 1s
        self.shift = (self.shift >> 1) | 0x80;
        bit | OPEN_BUS
    }
}
