//! Harmonic saturation
//!
//! Includes:
//! - Emphasis saturation network driven by a single 0-100 % amount
//! - Fixed-character tube saturators (subtle, heavy, extreme)
//! - One-pole DC blocker shared by both
//!
//! Network signal flow per channel:
//! pre-emphasis shelf → biased tanh shaper → cubic grit → DC blocker →
//! de-emphasis shelf → loudness compensation → dry/wet by amount.
//!
//! Loudness compensation matches the AC RMS of the shaper output for a
//! reference sine (peak `reference_level`) to the RMS of that sine. It is
//! evaluated once per amount change over a fixed set of phase points.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use vx_core::{LINEAR_FLOOR, Sample};

use crate::config::SaturationTuning;
use crate::shelf::ShelfFilter;
use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Phase points used for the loudness compensation reference
const COMPENSATION_POINTS: usize = 64;

/// One-pole DC-blocking high-pass: `y = x − x₁ + R·y₁`, `R = 1 − 2π·fc/fs`
#[derive(Debug, Clone)]
pub struct DcBlocker {
    freq: f64,
    coeff: f64,
    x1: f64,
    y1: f64,
}

impl DcBlocker {
    pub fn new(freq: f64, sample_rate: f64) -> Self {
        let mut blocker = Self {
            freq,
            coeff: 0.0,
            x1: 0.0,
            y1: 0.0,
        };
        blocker.set_sample_rate(sample_rate);
        blocker
    }

    pub fn coeff(&self) -> f64 {
        self.coeff
    }
}

impl Processor for DcBlocker {
    fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

impl MonoProcessor for DcBlocker {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let output = input - self.x1 + self.coeff * self.y1;
        self.x1 = input;
        self.y1 = output;
        output
    }
}

impl ProcessorConfig for DcBlocker {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.coeff = (1.0 - 2.0 * PI * self.freq / sample_rate).clamp(0.0, 1.0 - f64::EPSILON);
    }
}

/// Shaper settings derived from the amount
#[derive(Debug, Clone, Copy, PartialEq)]
struct ShaperParams {
    drive: f64,
    dc_offset: f64,
    // tanh(dc_offset · drive), subtracted to keep the output zero-centered
    bias: f64,
    grit: f64,
}

impl ShaperParams {
    fn for_amount(tuning: &SaturationTuning, amount: f64) -> Self {
        let drive = 1.0 + tuning.drive_range * amount;
        let dc_offset = tuning.dc_offset * amount;
        Self {
            drive,
            dc_offset,
            bias: (dc_offset * drive).tanh(),
            // Tapers to zero at full amount
            grit: tuning.grit * amount * (1.0 - amount.powi(4)),
        }
    }

    #[inline(always)]
    fn shape(&self, x: f64) -> f64 {
        let shaped = ((x + self.dc_offset) * self.drive).tanh() - self.bias;
        shaped + shaped * shaped * shaped * self.grit
    }

    /// Gain that brings the shaper's AC RMS for the reference sine back to
    /// the sine's own RMS
    fn compensation(&self, reference_level: f64) -> f64 {
        let mut sum = 0.0;
        let mut sum_squares = 0.0;
        for i in 0..COMPENSATION_POINTS {
            let phase = 2.0 * PI * (i as f64 + 0.5) / COMPENSATION_POINTS as f64;
            let y = self.shape(reference_level * phase.sin());
            sum += y;
            sum_squares += y * y;
        }

        let n = COMPENSATION_POINTS as f64;
        let mean = sum / n;
        let ac_rms = (sum_squares / n - mean * mean).max(0.0).sqrt();
        if ac_rms <= LINEAR_FLOOR {
            return 1.0;
        }
        (reference_level / std::f64::consts::SQRT_2) / ac_rms
    }
}

#[derive(Debug, Clone)]
struct NetworkChannel {
    emphasis: ShelfFilter,
    de_emphasis: ShelfFilter,
    dc_blocker: DcBlocker,
}

impl NetworkChannel {
    fn new(tuning: &SaturationTuning, sample_rate: f64) -> Self {
        Self {
            emphasis: ShelfFilter::high_boost(tuning.emphasis_freq, tuning.emphasis_db, sample_rate),
            de_emphasis: ShelfFilter::high_cut(tuning.emphasis_freq, tuning.emphasis_db, sample_rate),
            dc_blocker: DcBlocker::new(tuning.dc_block_freq, sample_rate),
        }
    }

    fn reset(&mut self) {
        self.emphasis.reset();
        self.de_emphasis.reset();
        self.dc_blocker.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.emphasis.set_sample_rate(sample_rate);
        self.de_emphasis.set_sample_rate(sample_rate);
        self.dc_blocker.set_sample_rate(sample_rate);
    }
}

/// Multi-channel emphasis saturation network
#[derive(Debug, Clone)]
pub struct SaturationNetwork {
    tuning: SaturationTuning,
    enabled: bool,
    amount: f64,
    params: ShaperParams,
    compensation: f64,
    channels: Vec<NetworkChannel>,
}

impl SaturationNetwork {
    /// Allocates per-channel filter state
    pub fn new(channels: usize, sample_rate: f64, tuning: SaturationTuning) -> Self {
        let mut network = Self {
            tuning,
            enabled: true,
            amount: 0.0,
            params: ShaperParams::for_amount(&tuning, 0.0),
            compensation: 1.0,
            channels: (0..channels).map(|_| NetworkChannel::new(&tuning, sample_rate)).collect(),
        };
        network.set_amount(0.0);
        network
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.enabled {
            self.reset();
        }
        self.enabled = enabled;
    }

    /// Amount as a fraction in [0, 1]
    pub fn set_amount(&mut self, amount: f64) {
        let amount = if amount.is_nan() { 0.0 } else { amount.clamp(0.0, 1.0) };
        if (amount > 0.0) != (self.amount > 0.0) {
            self.reset();
        }
        self.amount = amount;
        self.params = ShaperParams::for_amount(&self.tuning, amount);
        self.compensation = self.params.compensation(self.tuning.reference_level);
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    pub fn drive(&self) -> f64 {
        self.params.drive
    }

    pub fn grit(&self) -> f64 {
        self.params.grit
    }

    pub fn compensation(&self) -> f64 {
        self.compensation
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.enabled && self.amount > 0.0
    }

    /// Process one sample of `channel`. Channels beyond the allocated count
    /// pass through.
    #[inline]
    pub fn process(&mut self, channel: usize, input: Sample) -> Sample {
        if !self.is_active() {
            return input;
        }
        let Some(state) = self.channels.get_mut(channel) else {
            return input;
        };

        let a = self.amount;

        let boosted = state.emphasis.process_sample(input);
        let emphasized = input + (boosted - input) * a;

        let shaped = state.dc_blocker.process_sample(self.params.shape(emphasized));

        let cut = state.de_emphasis.process_sample(shaped);
        let wet = shaped + (cut - shaped) * a;

        input * (1.0 - a) + wet * self.compensation * a
    }

    /// Process one channel's block in place
    pub fn process_block(&mut self, channel: usize, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process(channel, *sample);
        }
    }
}

impl Processor for SaturationNetwork {
    fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
    }
}

impl ProcessorConfig for SaturationNetwork {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        for channel in &mut self.channels {
            channel.set_sample_rate(sample_rate);
        }
    }
}

/// Tube saturator personality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TubeCharacter {
    /// Gentle warmth, high thresholds
    #[default]
    Subtle,
    /// Warm, early and asymmetric clipping
    Heavy,
    /// Aggressive, clips almost immediately
    Extreme,
}

/// Two-region tube transfer curve constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TubeCurve {
    pub positive_threshold: f64,
    pub negative_threshold: f64,
    pub positive_drive: f64,
    pub positive_ceiling: f64,
    pub negative_drive: f64,
    pub negative_ceiling: f64,
    /// Cubic term below threshold
    pub warmth: f64,
}

impl TubeCurve {
    /// Soft-clip beyond each threshold, cubic soft knee in between
    #[inline(always)]
    pub fn apply(&self, x: f64) -> f64 {
        if x > self.positive_threshold {
            let excess = x - self.positive_threshold;
            self.positive_threshold + (excess * self.positive_drive).tanh() * self.positive_ceiling
        } else if x < -self.negative_threshold {
            let excess = x + self.negative_threshold;
            -self.negative_threshold + (excess * self.negative_drive).tanh() * self.negative_ceiling
        } else {
            x + x * x * x * self.warmth
        }
    }
}

impl TubeCharacter {
    pub fn curve(self) -> TubeCurve {
        match self {
            TubeCharacter::Subtle => TubeCurve {
                positive_threshold: 0.7,
                negative_threshold: 0.9,
                positive_drive: 2.0,
                positive_ceiling: 0.3,
                negative_drive: 1.5,
                negative_ceiling: 0.35,
                warmth: 0.05,
            },
            TubeCharacter::Heavy => TubeCurve {
                positive_threshold: 0.4,
                negative_threshold: 0.6,
                positive_drive: 2.5,
                positive_ceiling: 0.4,
                negative_drive: 2.0,
                negative_ceiling: 0.45,
                warmth: 0.15,
            },
            TubeCharacter::Extreme => TubeCurve {
                positive_threshold: 0.2,
                negative_threshold: 0.35,
                positive_drive: 3.0,
                positive_ceiling: 0.5,
                negative_drive: 2.5,
                negative_ceiling: 0.55,
                warmth: 0.3,
            },
        }
    }

    /// Default input drive
    pub fn default_drive(self) -> f64 {
        match self {
            TubeCharacter::Subtle => 1.5,
            TubeCharacter::Heavy => 5.0,
            TubeCharacter::Extreme => 9.0,
        }
    }

    /// Default output gain, offsets the level added by the default drive
    pub fn default_output_gain(self) -> f64 {
        match self {
            TubeCharacter::Subtle => 0.92,
            TubeCharacter::Heavy => 0.65,
            TubeCharacter::Extreme => 0.45,
        }
    }
}

/// Tube DC blocker corner
const TUBE_DC_BLOCK_FREQ: f64 = 5.0;

/// Fixed-character tube saturator, one per channel
#[derive(Debug, Clone)]
pub struct TubeSaturator {
    character: TubeCharacter,
    curve: TubeCurve,
    drive: f64,
    output_gain: f64,
    enabled: bool,
    dc_blocker: DcBlocker,
}

impl TubeSaturator {
    pub fn new(character: TubeCharacter, sample_rate: f64) -> Self {
        Self {
            character,
            curve: character.curve(),
            drive: character.default_drive(),
            output_gain: character.default_output_gain(),
            enabled: true,
            dc_blocker: DcBlocker::new(TUBE_DC_BLOCK_FREQ, sample_rate),
        }
    }

    pub fn character(&self) -> TubeCharacter {
        self.character
    }

    /// Input drive, 1.0 = clean. Clamped to at least 0.1.
    pub fn set_drive(&mut self, drive: f64) {
        self.drive = if drive.is_nan() { 1.0 } else { drive.max(0.1) };
    }

    pub fn drive(&self) -> f64 {
        self.drive
    }

    pub fn set_output_gain(&mut self, gain: f64) {
        self.output_gain = if gain.is_nan() { 1.0 } else { gain.max(0.0) };
    }

    pub fn output_gain(&self) -> f64 {
        self.output_gain
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Processor for TubeSaturator {
    fn reset(&mut self) {
        self.dc_blocker.reset();
    }
}

impl MonoProcessor for TubeSaturator {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        if !self.enabled {
            return input;
        }
        let saturated = self.curve.apply(input * self.drive);
        self.dc_blocker.process_sample(saturated) * self.output_gain
    }
}

impl ProcessorConfig for TubeSaturator {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.dc_blocker.set_sample_rate(sample_rate);
    }
}
