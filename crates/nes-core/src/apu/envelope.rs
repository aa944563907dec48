//! Envelope and length counter units shared by the pulse and noise channels
//! (the triangle uses the length counter only).

/// Length counter load values, indexed by the 5-bit field of $4003/$4007/$400B/$400F
#[rustfmt::skip]
pub const LENGTH_TABLE: [u8; 32] = [
    10, 254, 20, 2, 40, 4, 80, 6, 160, 8, 60, 10, 14, 12, 26, 14,
    12, 16, 24, 18, 48, 20, 96, 22, 192, 24, 72, 26, 16, 28, 32, 30,
];

/// Volume envelope, clocked on quarter frames
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    start: bool,
    divider: u8,
    decay: u8,
    /// Constant volume, or the divider period when decaying
    period: u8,
    looping: bool,
    constant: bool,
}

impl Envelope {
    /// Control bits shared by $4000/$4004/$400C
    pub fn write(&mut self, value: u8) {
        self.looping = value & 0x20 != 0;
        self.constant = value & 0x10 != 0;
        self.period = value & 0x0F;
    }

    pub fn restart(&mut self) {
        self.start = true;
    }

    pub fn clock(&mut self) {
        if self.start {
            self.start = false;
            self.decay = 15;
            self.divider = self.period;
        } else if self.divider == 0 {
            self.divider = self.period;
            if self.decay > 0 {
                self.decay -= 1;
            } else if self.looping {
                self.decay = 15;
            }
        } else {
            self.divider -= 1;
        }
    }

    /// Current output volume, 0-15
    pub fn volume(&self) -> u8 {
        if self.constant {
            self.period
        } else {
            self.decay
        }
    }
}

/// Length counter, clocked on half frames
#[derive(Debug, Clone, Default)]
pub struct LengthCounter {
    value: u8,
    halt: bool,
    enabled: bool,
}

impl LengthCounter {
    /// Load from the table; ignored while the channel is disabled in $4015
    pub fn load(&mut self, index: u8) {
        if self.enabled {
            self.value = LENGTH_TABLE[(index & 0x1F) as usize];
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.value = 0;
        }
    }

    pub fn set_halt(&mut self, halt: bool) {
        self.halt = halt;
    }

    pub fn clock(&mut self) {
        if !self.halt && self.value > 0 {
            self.value -= 1;
        }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn active(&self) -> bool {
        self.value > 0
    }
}
