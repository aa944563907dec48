//! Pulse channels ($4000-$4003, $4004-$4007)

use super::envelope::{Envelope, LengthCounter};

/// Duty waveforms: 12.5%, 25%, 50%, 25% negated
const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 1, 0, 0, 0, 0, 0, 0],
    [0, 1, 1, 0, 0, 0, 0, 0],
    [0, 1, 1, 1, 1, 0, 0, 0],
    [1, 0, 0, 1, 1, 1, 1, 1],
];

/// Which pulse unit; they differ only in sweep negation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseChannel {
    /// Negates with ones' complement
    One,
    /// Negates with two's complement
    Two,
}

/// Square wave with envelope, sweep and length counter
#[derive(Debug, Clone)]
pub struct Pulse {
    channel: PulseChannel,
    duty: u8,
    step: u8,
    timer_period: u16,
    timer: u16,
    envelope: Envelope,
    length: LengthCounter,
    sweep_enabled: bool,
    sweep_period: u8,
    sweep_negate: bool,
    sweep_shift: u8,
    sweep_divider: u8,
    sweep_reload: bool,
}

impl Pulse {
    pub fn new(channel: PulseChannel) -> Self {
        Self {
            channel,
            duty: 0,
            step: 0,
            timer_period: 0,
            timer: 0,
            envelope: Envelope::default(),
            length: LengthCounter::default(),
            sweep_enabled: false,
            sweep_period: 0,
            sweep_negate: false,
            sweep_shift: 0,
            sweep_divider: 0,
            sweep_reload: false,
        }
    }

    /// $4000/$4004: duty, length halt, envelope
    pub fn write_control(&mut self, value: u8) {
        self.duty = value >> 6;
        self.length.set_halt(value & 0x20 != 0);
        self.envelope.write(value);
    }

    /// $4001/$4005: sweep unit
    pub fn write_sweep(&mut self, value: u8) {
        self.sweep_enabled = value & 0x80 != 0;
        self.sweep_period = (value >> 4) & 0x07;
        self.sweep_negate = value & 0x08 != 0;
        self.sweep_shift = value & 0x07;
        self.sweep_reload = true;
    }

    /// $4002/$4006: timer low byte
    pub fn write_timer_low(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x0700) | value as u16;
    }

    /// $4003/$4007: length load and timer high bits; restarts the sequence
    pub fn write_timer_high(&mut self, value: u8) {
        self.timer_period = (self.timer_period & 0x00FF) | ((value as u16 & 0x07) << 8);
        self.length.load(value >> 3);
        self.step = 0;
        self.envelope.restart();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.length.set_enabled(enabled);
    }

    /// Clocked every other CPU cycle
    pub fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.timer_period;
            self.step = (self.step + 1) & 0x07;
        } else {
            self.timer -= 1;
        }
    }

    pub fn clock_quarter_frame(&mut self) {
        self.envelope.clock();
    }

    pub fn clock_half_frame(&mut self) {
        self.length.clock();

        if self.sweep_divider == 0 && self.sweep_enabled && self.sweep_shift > 0 && !self.muted() {
            self.timer_period = self.target_period();
        }
        if self.sweep_divider == 0 || self.sweep_reload {
            self.sweep_divider = self.sweep_period;
            self.sweep_reload = false;
        } else {
            self.sweep_divider -= 1;
        }
    }

    fn target_period(&self) -> u16 {
        let change = self.timer_period >> self.sweep_shift;
        if self.sweep_negate {
            let change = match self.channel {
                PulseChannel::One => change + 1,
                PulseChannel::Two => change,
            };
            self.timer_period.saturating_sub(change)
        } else {
            self.timer_period + change
        }
    }

    /// Sweep silences the channel whether or not it is enabled
    fn muted(&self) -> bool {
        self.timer_period < 8 || self.target_period() > 0x7FF
    }

    /// Current 4-bit output
    pub fn output(&self) -> u8 {
        if !self.length.active() || self.muted() || DUTY_TABLE[self.duty as usize][self.step as usize] == 0 {
            0
        } else {
            self.envelope.volume()
        }
    }

    pub fn length_active(&self) -> bool {
        self.length.active()
    }

    pub fn timer_period(&self) -> u16 {
        self.timer_period
    }
}
