//! Triangle channel ($4008-$400B)

use super::envelope::LengthCounter;

#[rustfmt::skip]
const SEQUENCE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0,
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15,
];

/// 32-step triangle gated by the linear and length counters
#[derive(Debug, Clone, Default)]
pub struct Triangle {
    /// Length halt and linear counter control share bit 7
    control: bool,
    linear_reload_value: u8,
    linear_counter: u8,
    linear_reload: bool,
    timer_period: u16,
    timer: u16,
    step: u8,
    length: LengthCounter,
}

impl Triangle {
    /// $4008: control flag and linear counter reload value
    pub fn write_control(&mut self, value: u8) {
        self.control = value & 0x80 != 0;
        self.length.set_halt(self.control);
        self.linear_reload_value = value & 0x7F;
    }

    /// $400A
    pub fn write_timer_low(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x0700) | value as u16;
    }

    /// $400B
    pub fn write_timer_high(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | ((value as u16 & 0x07) << 8);
        self.length.load(value >> 3);
        self.linear_reload = true;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.length.set_enabled(enabled);
    }

    /// Clocked every CPU cycle
    pub fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            if self.length.active() && self.linear_counter > 0 {
                self.step = (self.step + 1) & 0x1F;
            }
        } else {
            self.timer -= 1;
        }
    }

    pub fn clock_quarter_frame(&mut self) {
        if self.linear_reload {
            self.linear_counter = self.linear_reload_value;
        } else if self.linear_counter > 0 {
            self.linear_counter -= 1;
        }
        if !self.control {
            self.linear_reload = false;
        }
    }

    pub fn clock_half_frame(&mut self) {
        self.length.clock();
    }

    /// The sequencer holds its level when gated, so output never drops to 0 abruptly
    pub fn output(&self) -> u8 {
        SEQUENCE[self.step as usize]
    }

    pub fn length_active(&self) -> bool {
        self.length.active()
    }

    pub fn linear_counter(&self) -> u8 {
        self.linear_counter
    }
}
