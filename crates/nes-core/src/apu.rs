//! APU (Audio Processing Unit) implementation
//!
//! The NES APU has five channels:
//! - Pulse 1 and Pulse 2 (square waves with sweep)
//! - Triangle (32-step, linear counter)
//! - Noise (15-bit shift register)
//! - DMC (delta modulation sample playback)
//!
//! A frame sequencer clocks envelopes and the triangle's linear counter on
//! quarter frames, and length counters and sweeps on half frames. Channel
//! outputs go through the nonlinear mixer once per CPU cycle and are averaged
//! down to the output sample rate.

mod dmc;
mod envelope;
mod noise;
mod pulse;
mod triangle;

pub use dmc::Dmc;
pub use envelope::{Envelope, LengthCounter, LENGTH_TABLE};
pub use noise::Noise;
pub use pulse::{Pulse, PulseChannel};
pub use triangle::Triangle;

use log::debug;

/// NTSC CPU clock in Hz
pub const CPU_CLOCK_HZ: u32 = 1_789_773;
/// Default output sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Frame sequencer steps, in CPU cycles
const STEP_1: u32 = 7457;
const STEP_2: u32 = 14913;
const STEP_3: u32 = 22371;
const STEP_4: u32 = 29829;
const STEP_5: u32 = 37281;
/// Sequence lengths in CPU cycles (14915 and 18641 APU cycles)
const FOUR_STEP_LENGTH: u32 = 29830;
const FIVE_STEP_LENGTH: u32 = 37282;

/// APU state
#[derive(Debug, Clone)]
pub struct Apu {
    pulse1: Pulse,
    pulse2: Pulse,
    triangle: Triangle,
    noise: Noise,
    dmc: Dmc,

    /// CPU cycles into the current sequence
    frame_cycle: u32,
    five_step: bool,
    irq_inhibit: bool,
    frame_irq: bool,
    /// Cycle counter for timing
    cycle_count: u64,

    sample_rate: u32,
    cycles_per_sample: f64,
    sample_clock: f64,
    accumulator: f32,
    accumulated: u32,
    samples: Vec<f32>,
}

impl Apu {
    /// Create a new APU instance at the default sample rate
    pub fn new() -> Self {
        Self::with_sample_rate(DEFAULT_SAMPLE_RATE)
    }

    /// Create an APU producing `sample_rate` samples per second
    pub fn with_sample_rate(sample_rate: u32) -> Self {
        let sample_rate = sample_rate.max(1);
        Self {
            pulse1: Pulse::new(PulseChannel::One),
            pulse2: Pulse::new(PulseChannel::Two),
            triangle: Triangle::default(),
            noise: Noise::new(),
            dmc: Dmc::new(),
            frame_cycle: 0,
            five_step: false,
            irq_inhibit: false,
            frame_irq: false,
            cycle_count: 0,
            sample_rate,
            cycles_per_sample: CPU_CLOCK_HZ as f64 / sample_rate as f64,
            sample_clock: 0.0,
            accumulator: 0.0,
            accumulated: 0,
            samples: Vec::new(),
        }
    }

    /// Reset the APU, keeping the sample rate
    pub fn reset(&mut self) {
        *self = Self::with_sample_rate(self.sample_rate);
    }

    /// Advance one CPU cycle
    pub fn tick(&mut self) {
        self.triangle.clock_timer();
        self.dmc.clock_timer();
        if self.cycle_count & 1 == 1 {
            self.pulse1.clock_timer();
            self.pulse2.clock_timer();
            self.noise.clock_timer();
        }
        self.cycle_count += 1;

        self.clock_frame_sequencer();
        self.resample();
    }

    fn clock_frame_sequencer(&mut self) {
        self.frame_cycle += 1;
        match (self.five_step, self.frame_cycle) {
            (_, STEP_1) | (_, STEP_3) => self.clock_quarter_frame(),
            (_, STEP_2) => {
                self.clock_quarter_frame();
                self.clock_half_frame();
            }
            (false, STEP_4) => {
                self.clock_quarter_frame();
                self.clock_half_frame();
                if !self.irq_inhibit {
                    self.frame_irq = true;
                }
            }
            (true, STEP_5) => {
                self.clock_quarter_frame();
                self.clock_half_frame();
            }
            _ => {}
        }

        let length = if self.five_step {
            FIVE_STEP_LENGTH
        } else {
            FOUR_STEP_LENGTH
        };
        if self.frame_cycle >= length {
            self.frame_cycle = 0;
        }
    }

    fn clock_quarter_frame(&mut self) {
        self.pulse1.clock_quarter_frame();
        self.pulse2.clock_quarter_frame();
        self.triangle.clock_quarter_frame();
        self.noise.clock_quarter_frame();
    }

    fn clock_half_frame(&mut self) {
        self.pulse1.clock_half_frame();
        self.pulse2.clock_half_frame();
        self.triangle.clock_half_frame();
        self.noise.clock_half_frame();
    }

    /// Box filter the per-cycle mix down to the output rate
    fn resample(&mut self) {
        self.accumulator += self.mix();
        self.accumulated += 1;
        self.sample_clock += 1.0;
        if self.sample_clock >= self.cycles_per_sample {
            self.sample_clock -= self.cycles_per_sample;
            self.samples.push(self.accumulator / self.accumulated as f32);
            self.accumulator = 0.0;
            self.accumulated = 0;
        }
    }

    /// Nonlinear mix of all channels, in [0, 1)
    pub fn mix(&self) -> f32 {
        let pulse = (self.pulse1.output() + self.pulse2.output()) as f32;
        let pulse_out = if pulse == 0.0 {
            0.0
        } else {
            95.88 / (8128.0 / pulse + 100.0)
        };

        let tnd = self.triangle.output() as f32 / 8227.0
            + self.noise.output() as f32 / 12241.0
            + self.dmc.output() as f32 / 22638.0;
        let tnd_out = if tnd == 0.0 {
            0.0
        } else {
            159.79 / (1.0 / tnd + 100.0)
        };

        pulse_out + tnd_out
    }

    /// CPU write to $4000-$4013, $4015 or $4017
    pub fn write_register(&mut self, address: u16, value: u8) {
        match address {
            0x4000 => self.pulse1.write_control(value),
            0x4001 => self.pulse1.write_sweep(value),
            0x4002 => self.pulse1.write_timer_low(value),
            0x4003 => self.pulse1.write_timer_high(value),
            0x4004 => self.pulse2.write_control(value),
            0x4005 => self.pulse2.write_sweep(value),
            0x4006 => self.pulse2.write_timer_low(value),
            0x4007 => self.pulse2.write_timer_high(value),
            0x4008 => self.triangle.write_control(value),
            0x400A => self.triangle.write_timer_low(value),
            0x400B => self.triangle.write_timer_high(value),
            0x400C => self.noise.write_control(value),
            0x400E => self.noise.write_period(value),
            0x400F => self.noise.write_length(value),
            0x4010 => self.dmc.write_control(value),
            0x4011 => self.dmc.write_direct_load(value),
            0x4012 => self.dmc.write_address(value),
            0x4013 => self.dmc.write_length(value),
            0x4015 => {
                self.pulse1.set_enabled(value & 0x01 != 0);
                self.pulse2.set_enabled(value & 0x02 != 0);
                self.triangle.set_enabled(value & 0x04 != 0);
                self.noise.set_enabled(value & 0x08 != 0);
                self.dmc.set_enabled(value & 0x10 != 0);
                self.dmc.clear_irq();
            }
            0x4017 => {
                self.five_step = value & 0x80 != 0;
                self.irq_inhibit = value & 0x40 != 0;
                if self.irq_inhibit {
                    self.frame_irq = false;
                }
                self.frame_cycle = 0;
                if self.five_step {
                    self.clock_quarter_frame();
                    self.clock_half_frame();
                }
                debug!(
                    "APU frame sequencer: {}-step, IRQ {}",
                    if self.five_step { 5 } else { 4 },
                    if self.irq_inhibit { "inhibited" } else { "enabled" }
                );
            }
            _ => {}
        }
    }

    /// $4015 read; clears the frame IRQ flag
    pub fn read_status(&mut self) -> u8 {
        let mut status = 0;
        if self.pulse1.length_active() {
            status |= 0x01;
        }
        if self.pulse2.length_active() {
            status |= 0x02;
        }
        if self.triangle.length_active() {
            status |= 0x04;
        }
        if self.noise.length_active() {
            status |= 0x08;
        }
        if self.dmc.active() {
            status |= 0x10;
        }
        if self.frame_irq {
            status |= 0x40;
        }
        if self.dmc.irq() {
            status |= 0x80;
        }
        self.frame_irq = false;
        status
    }

    /// Frame or DMC interrupt asserted
    pub fn irq_pending(&self) -> bool {
        self.frame_irq || self.dmc.irq()
    }

    /// Address the DMC wants read, if its sample buffer is empty
    pub fn dmc_fetch_address(&self) -> Option<u16> {
        self.dmc.fetch_address()
    }

    /// Deliver a DMC sample byte
    pub fn dmc_fill(&mut self, value: u8) {
        self.dmc.fill(value);
    }

    /// Samples produced since the last clear
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn clear_samples(&mut self) {
        self.samples.clear();
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn pulse1(&self) -> &Pulse {
        &self.pulse1
    }

    pub fn pulse2(&self) -> &Pulse {
        &self.pulse2
    }

    pub fn triangle(&self) -> &Triangle {
        &self.triangle
    }

    pub fn noise(&self) -> &Noise {
        &self.noise
    }

    pub fn dmc(&self) -> &Dmc {
        &self.dmc
    }

    /// Get total cycles
    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_output_at_power_on() {
        let mut apu = Apu::new();
        for _ in 0..1000 {
            apu.tick();
        }
        // Only the parked triangle contributes, as a constant level
        let first = apu.samples()[0];
        assert!(apu.samples().iter().all(|&sample| (sample - first).abs() < 1e-6));
        assert_eq!(apu.pulse1().output(), 0);
        assert_eq!(apu.noise().output(), 0);
    }

    #[test]
    fn test_sample_rate_conversion() {
        let mut apu = Apu::with_sample_rate(44_100);
        for _ in 0..CPU_CLOCK_HZ / 10 {
            apu.tick();
        }
        let count = apu.sample_count();
        assert!((4409..=4411).contains(&count), "got {count} samples");

        apu.clear_samples();
        assert_eq!(apu.sample_count(), 0);
    }

    #[test]
    fn test_frame_irq_four_step() {
        let mut apu = Apu::new();
        for _ in 0..STEP_4 - 1 {
            apu.tick();
        }
        assert!(!apu.irq_pending());
        apu.tick();
        assert!(apu.irq_pending());

        assert_eq!(apu.read_status() & 0x40, 0x40);
        assert!(!apu.irq_pending());
    }

    #[test]
    fn test_irq_inhibit() {
        let mut apu = Apu::new();
        apu.write_register(0x4017, 0x40);
        for _ in 0..FOUR_STEP_LENGTH * 2 {
            apu.tick();
        }
        assert!(!apu.irq_pending());
    }

    #[test]
    fn test_five_step_has_no_irq() {
        let mut apu = Apu::new();
        apu.write_register(0x4017, 0x80);
        for _ in 0..FIVE_STEP_LENGTH * 2 {
            apu.tick();
        }
        assert!(!apu.irq_pending());
    }

    #[test]
    fn test_status_reflects_length_counters() {
        let mut apu = Apu::new();
        apu.write_register(0x4015, 0x0F);
        apu.write_register(0x4003, 0x08);
        apu.write_register(0x400F, 0x08);
        assert_eq!(apu.read_status() & 0x0F, 0x09);

        apu.write_register(0x4015, 0x00);
        assert_eq!(apu.read_status() & 0x0F, 0x00);
    }

    #[test]
    fn test_length_counter_halts_at_zero() {
        let mut apu = Apu::new();
        apu.write_register(0x4015, 0x01);
        apu.write_register(0x4000, 0x10);
        // Index 3 loads 2
        apu.write_register(0x4003, 0x18);
        for _ in 0..FOUR_STEP_LENGTH {
            apu.tick();
        }
        assert_eq!(apu.read_status() & 0x01, 0);
    }

    #[test]
    fn test_mixer_range() {
        let mut apu = Apu::new();
        apu.write_register(0x4015, 0x0F);
        apu.write_register(0x4000, 0xFF);
        apu.write_register(0x4002, 0x40);
        apu.write_register(0x4003, 0x08);
        for _ in 0..10_000 {
            apu.tick();
            let mix = apu.mix();
            assert!((0.0..1.0).contains(&mix));
        }
    }
}
