//! Noise channel ($400C-$400F)

use super::envelope::{Envelope, LengthCounter};

/// Timer periods in APU cycles (half the CPU-cycle table)
#[rustfmt::skip]
const PERIODS: [u16; 16] = [
    2, 4, 8, 16, 32, 48, 64, 80, 101, 127, 190, 254, 381, 508, 1017, 2034,
];

/// 15-bit LFSR noise generator
#[derive(Debug, Clone)]
pub struct Noise {
    envelope: Envelope,
    length: LengthCounter,
    /// Short mode taps bit 6 instead of bit 1
    short_mode: bool,
    period: u16,
    timer: u16,
    shift: u16,
}

impl Noise {
    pub fn new() -> Self {
        Self {
            envelope: Envelope::default(),
            length: LengthCounter::default(),
            short_mode: false,
            period: PERIODS[0],
            timer: 0,
            shift: 1,
        }
    }

    /// $400C: length halt, envelope
    pub fn write_control(&mut self, value: u8) {
        self.length.set_halt(value & 0x20 != 0);
        self.envelope.write(value);
    }

    /// $400E: mode and period
    pub fn write_period(&mut self, value: u8) {
        self.short_mode = value & 0x80 != 0;
        self.period = PERIODS[(value & 0x0F) as usize];
    }

    /// $400F: length load
    pub fn write_length(&mut self, value: u8) {
        self.length.load(value >> 3);
        self.envelope.restart();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.length.set_enabled(enabled);
    }

    /// Clocked every other CPU cycle
    pub fn clock_timer(&mut self) {
        if self.timer == 0 {
            self.timer = self.period - 1;
            let tap = if self.short_mode { 6 } else { 1 };
            let feedback = (self.shift ^ (self.shift >> tap)) & 0x01;
            self.shift = (self.shift >> 1) | (feedback << 14);
        } else {
            self.timer -= 1;
        }
    }

    pub fn clock_quarter_frame(&mut self) {
        self.envelope.clock();
    }

    pub fn clock_half_frame(&mut self) {
        self.length.clock();
    }

    pub fn output(&self) -> u8 {
        if self.shift & 0x01 != 0 || !self.length.active() {
            0
        } else {
            self.envelope.volume()
        }
    }

    pub fn length_active(&self) -> bool {
        self.length.active()
    }

    /// Shift register contents
    pub fn shift_register(&self) -> u16 {
        self.shift
    }
}

impl Default for Noise {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lfsr_feedback() {
        let mut noise = Noise::new();
        noise.clock_timer();
        // 1 ^ 0 shifted into bit 14
        assert_eq!(noise.shift_register(), 0x4000);
    }

    #[test]
    fn test_lfsr_stays_15_bit() {
        let mut noise = Noise::new();
        noise.write_period(0x80);
        for _ in 0..10_000 {
            noise.clock_timer();
            assert!(noise.shift_register() < 0x8000);
            assert_ne!(noise.shift_register(), 0);
        }
    }

    /// Shifts until the register returns to its seed
    fn sequence_length(noise: &mut Noise) -> u32 {
        let mut shifts = 0;
        loop {
            // Period 2: the first clock shifts, the second reloads
            noise.clock_timer();
            noise.clock_timer();
            shifts += 1;
            if noise.shift_register() == 1 {
                return shifts;
            }
        }
    }

    #[test]
    fn test_lfsr_sequence_lengths() {
        let mut noise = Noise::new();
        assert_eq!(sequence_length(&mut noise), 32767);

        let mut noise = Noise::new();
        noise.write_period(0x80);
        assert_eq!(sequence_length(&mut noise), 93);
    }

    #[test]
    fn test_short_mode_taps_bit_6() {
        let mut noise = Noise::new();
        noise.write_period(0x80);
        for _ in 0..16 {
            noise.clock_timer();
        }
        // Eight shifts walk the seed down to bit 7
        assert_eq!(noise.shift_register(), 0x0080);
        noise.clock_timer();
        noise.clock_timer();
        assert_eq!(noise.shift_register(), 0x0040);
        noise.clock_timer();
        noise.clock_timer();
        // Bit 6 now feeds back
        assert_eq!(noise.shift_register(), 0x4020);
    }

    #[test]
    fn test_output_gated_by_bit_0() {
        let mut noise = Noise::new();
        noise.set_enabled(true);
        noise.write_control(0x3A);
        noise.write_length(0x08);
        assert_eq!(noise.output(), 0);
        noise.clock_timer();
        assert_eq!(noise.output(), 0x0A);
    }
}
