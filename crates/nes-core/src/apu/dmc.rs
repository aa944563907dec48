//! Delta modulation channel ($4010-$4013)
//!
//! The DMC pulls sample bytes from CPU memory. It cannot reach the bus itself,
//! so it publishes the address it wants through [`Dmc::fetch_address`] and the
//! bus answers with [`Dmc::fill`], stalling the CPU for the read.

/// Timer periods in CPU cycles
#[rustfmt::skip]
const RATES: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];

#[derive(Debug, Clone)]
pub struct Dmc {
    irq_enabled: bool,
    looping: bool,
    rate: u16,
    timer: u16,
    output_level: u8,
    sample_address: u16,
    sample_length: u16,
    current_address: u16,
    bytes_remaining: u16,
    sample_buffer: Option<u8>,
    shift: u8,
    bits_remaining: u8,
    silence: bool,
    irq: bool,
}

impl Dmc {
    pub fn new() -> Self {
        Self {
            irq_enabled: false,
            looping: false,
            rate: RATES[0],
            timer: 0,
            output_level: 0,
            sample_address: 0xC000,
            sample_length: 1,
            current_address: 0xC000,
            bytes_remaining: 0,
            sample_buffer: None,
            shift: 0,
            bits_remaining: 8,
            silence: true,
            irq: false,
        }
    }

    /// $4010: IRQ enable, loop, rate
    pub fn write_control(&mut self, value: u8) {
        self.irq_enabled = value & 0x80 != 0;
        if !self.irq_enabled {
            self.irq = false;
        }
        self.looping = value & 0x40 != 0;
        self.rate = RATES[(value & 0x0F) as usize];
    }

    /// $4011: direct load of the output level
    pub fn write_direct_load(&mut self, value: u8) {
        self.output_level = value & 0x7F;
    }

    /// $4012: sample address = $C000 + value * 64
    pub fn write_address(&mut self, value: u8) {
        self.sample_address = 0xC000 | ((value as u16) << 6);
    }

    /// $4013: sample length = value * 16 + 1
    pub fn write_length(&mut self, value: u8) {
        self.sample_length = ((value as u16) << 4) | 1;
    }

    /// $4015 bit 4
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.restart();
        }
    }

    fn restart(&mut self) {
        self.current_address = self.sample_address;
        self.bytes_remaining = self.sample_length;
    }

    /// Address of the next sample byte, when the buffer is empty
    pub fn fetch_address(&self) -> Option<u16> {
        (self.sample_buffer.is_none() && self.bytes_remaining > 0).then_some(self.current_address)
    }

    /// Deliver the byte read from [`Dmc::fetch_address`]
    pub fn fill(&mut self, value: u8) {
        self.sample_buffer = Some(value);
        self.current_address = if self.current_address == 0xFFFF {
            0x8000
        } else {
            self.current_address + 1
        };
        self.bytes_remaining = self.bytes_remaining.saturating_sub(1);
        if self.bytes_remaining == 0 {
            if self.looping {
                self.restart();
            } else if self.irq_enabled {
                self.irq = true;
            }
        }
    }

    /// Clocked every CPU cycle
    pub fn clock_timer(&mut self) {
        if self.timer > 0 {
            self.timer -= 1;
            return;
        }
        self.timer = self.rate - 1;

        if !self.silence {
            if self.shift & 0x01 != 0 {
                if self.output_level <= 125 {
                    self.output_level += 2;
                }
            } else if self.output_level >= 2 {
                self.output_level -= 2;
            }
        }
        self.shift >>= 1;
        self.bits_remaining -= 1;

        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            match self.sample_buffer.take() {
                Some(byte) => {
                    self.shift = byte;
                    self.silence = false;
                }
                None => self.silence = true,
            }
        }
    }

    /// 7-bit output level
    pub fn output(&self) -> u8 {
        self.output_level
    }

    /// Sample bytes still to be fetched
    pub fn active(&self) -> bool {
        self.bytes_remaining > 0
    }

    pub fn irq(&self) -> bool {
        self.irq
    }

    pub fn clear_irq(&mut self) {
        self.irq = false;
    }
}

impl Default for Dmc {
    fn default() -> Self {
        Self::new()
    }
}
