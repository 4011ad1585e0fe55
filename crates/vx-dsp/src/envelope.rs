//! Envelope detection for dynamics processing
//!
//! A one-pole follower fed by a blend of two detection sources:
//! - a smoothed RMS magnitude (musical, program-averaged)
//! - the instantaneous peak magnitude (transient grab)
//!
//! The grip control moves both the source blend and the attack coefficient,
//! from the user attack time at 0 % to a near-instant peak attack at 100 %.

use vx_core::{Sample, ms_to_samples, time_constant_coeff};

use crate::config::DetectorTuning;
use crate::{Processor, ProcessorConfig};

/// Per-sample detector input, derived across all channels
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectionLevel {
    /// Largest absolute sample across channels
    pub peak: f64,
    /// Mean of squared samples across channels
    pub mean_square: f64,
    /// Peak of the frame before any sidechain filtering, drives the
    /// silence reset
    pub raw_peak: f64,
}

impl DetectionLevel {
    #[inline]
    pub fn from_frame(frame: &[Sample]) -> Self {
        if frame.is_empty() {
            return Self::default();
        }

        let mut peak: f64 = 0.0;
        let mut sum_squares = 0.0;
        for &sample in frame {
            peak = peak.max(sample.abs());
            sum_squares += sample * sample;
        }

        Self {
            peak,
            mean_square: sum_squares / frame.len() as f64,
            raw_peak: peak,
        }
    }

    /// Replace the silence-detection peak with one taken from the
    /// unfiltered frame
    #[inline]
    pub fn with_raw_peak(self, raw_peak: f64) -> Self {
        Self { raw_peak, ..self }
    }

    /// The same frame after a linear gain has been applied
    #[inline]
    pub fn scaled(self, gain: f64) -> Self {
        Self {
            peak: self.peak * gain.abs(),
            mean_square: self.mean_square * gain * gain,
            raw_peak: self.raw_peak * gain.abs(),
        }
    }
}

/// Classic one-pole follow step: `coeff·env + (1 − coeff)·level`, using the
/// attack coefficient while the level is above the envelope.
#[inline(always)]
pub fn follow(envelope: f64, level: f64, attack_coeff: f64, release_coeff: f64) -> f64 {
    let coeff = if level > envelope {
        attack_coeff
    } else {
        release_coeff
    };
    coeff * envelope + (1.0 - coeff) * level
}

/// RMS/peak blended envelope follower
#[derive(Debug, Clone)]
pub struct EnvelopeDetector {
    attack_ms: f64,
    release_ms: f64,
    grip: f64,

    attack_coeff: f64,
    release_coeff: f64,
    peak_attack_coeff: f64,
    rms_coeff: f64,
    // Attack coefficient after the grip blend
    active_attack_coeff: f64,

    envelope: f64,
    mean_square: f64,
    silent_run: usize,
    silence_samples: usize,

    tuning: DetectorTuning,
    sample_rate: f64,
}

impl EnvelopeDetector {
    pub fn new(sample_rate: f64, tuning: DetectorTuning) -> Self {
        let mut detector = Self {
            attack_ms: 10.0,
            release_ms: 100.0,
            grip: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            peak_attack_coeff: 0.0,
            rms_coeff: 0.0,
            active_attack_coeff: 0.0,
            envelope: 0.0,
            mean_square: 0.0,
            silent_run: 0,
            silence_samples: 1,
            tuning,
            sample_rate,
        };
        detector.update_coeffs();
        detector
    }

    /// Set attack time in milliseconds (0 = instantaneous)
    pub fn set_attack_ms(&mut self, ms: f64) {
        self.attack_ms = ms.max(0.0);
        self.attack_coeff = time_constant_coeff(self.attack_ms, self.sample_rate);
        self.update_active_attack();
    }

    /// Set release time in milliseconds
    pub fn set_release_ms(&mut self, ms: f64) {
        self.release_ms = ms.max(0.0);
        self.release_coeff = time_constant_coeff(self.release_ms, self.sample_rate);
    }

    /// Set the RMS/peak blend, 0.0 = RMS with user attack, 1.0 = peak with
    /// instant attack
    pub fn set_grip(&mut self, grip: f64) {
        self.grip = grip.clamp(0.0, 1.0);
        self.update_active_attack();
    }

    pub fn grip(&self) -> f64 {
        self.grip
    }

    pub fn attack_coeff(&self) -> f64 {
        self.attack_coeff
    }

    pub fn release_coeff(&self) -> f64 {
        self.release_coeff
    }

    /// Attack coefficient actually used, after the grip blend
    pub fn active_attack_coeff(&self) -> f64 {
        self.active_attack_coeff
    }

    /// Current envelope level (linear, always ≥ 0)
    pub fn current(&self) -> f64 {
        self.envelope
    }

    fn update_coeffs(&mut self) {
        self.attack_coeff = time_constant_coeff(self.attack_ms, self.sample_rate);
        self.release_coeff = time_constant_coeff(self.release_ms, self.sample_rate);
        self.peak_attack_coeff = time_constant_coeff(self.tuning.peak_attack_ms, self.sample_rate);
        self.rms_coeff = time_constant_coeff(self.tuning.rms_window_ms, self.sample_rate);
        self.silence_samples = ms_to_samples(self.tuning.silence_hold_ms, self.sample_rate).max(1);
        self.update_active_attack();
    }

    fn update_active_attack(&mut self) {
        self.active_attack_coeff =
            self.attack_coeff + (self.peak_attack_coeff - self.attack_coeff) * self.grip;
    }

    /// Advance one sample and return the new envelope
    #[inline]
    pub fn process(&mut self, level: DetectionLevel) -> f64 {
        self.mean_square = self.rms_coeff * self.mean_square
            + (1.0 - self.rms_coeff) * level.mean_square.max(0.0);

        if level.raw_peak < self.tuning.silence_threshold {
            self.silent_run = self.silent_run.saturating_add(1);
        } else {
            self.silent_run = 0;
        }

        if self.silent_run >= self.silence_samples {
            // Effectively silent: drop straight to zero instead of decaying
            self.envelope = 0.0;
            self.mean_square = 0.0;
            return 0.0;
        }

        let rms = self.mean_square.sqrt();
        let detect = rms + (level.peak - rms) * self.grip;

        self.envelope = follow(
            self.envelope,
            detect,
            self.active_attack_coeff,
            self.release_coeff,
        )
        .max(0.0);
        self.envelope
    }
}

impl Processor for EnvelopeDetector {
    fn reset(&mut self) {
        self.envelope = 0.0;
        self.mean_square = 0.0;
        self.silent_run = 0;
    }
}

impl ProcessorConfig for EnvelopeDetector {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coeffs();
    }
}
