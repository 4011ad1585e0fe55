//! Noise gate with hold
//!
//! Runs its own fast-attack/slow-release follower on the mean absolute level
//! of the input frame. The resulting gain multiplies the signal before the
//! detector and the audio path see it, so a closed gate silences both.
//!
//! The level is the channel mean rather than the plain sum so the threshold
//! means the same thing at any channel count. A sum would read a correlated
//! stereo signal 6 dB hotter than the same signal in mono and open the gate
//! early on wide layouts.

use vx_core::{db_to_gain, ms_to_samples, time_constant_coeff};

use crate::config::GateTuning;
use crate::envelope::follow;
use crate::{Processor, ProcessorConfig};

/// Noise gate
#[derive(Debug, Clone)]
pub struct NoiseGate {
    tuning: GateTuning,
    enabled: bool,
    threshold_db: f64,
    threshold: f64,

    attack_coeff: f64,
    release_coeff: f64,
    close_coeff: f64,
    hold_samples: usize,

    envelope: f64,
    gain: f64,
    hold_counter: usize,
    open: bool,
}

impl NoiseGate {
    pub fn new(sample_rate: f64, tuning: GateTuning) -> Self {
        let mut gate = Self {
            tuning,
            enabled: true,
            threshold_db: tuning.off_threshold_db,
            threshold: db_to_gain(tuning.off_threshold_db),
            attack_coeff: 0.0,
            release_coeff: 0.0,
            close_coeff: 0.0,
            hold_samples: 0,
            envelope: 0.0,
            gain: 0.0,
            hold_counter: 0,
            open: false,
        };
        gate.set_sample_rate(sample_rate);
        gate
    }

    /// Capability switch; a disabled gate always returns unity gain
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Threshold in dB. At or below the off threshold the gate is inactive.
    pub fn set_threshold(&mut self, db: f64) {
        self.threshold_db = if db.is_nan() { self.tuning.off_threshold_db } else { db };
        self.threshold = db_to_gain(self.threshold_db);
    }

    pub fn threshold_db(&self) -> f64 {
        self.threshold_db
    }

    /// Whether the gate currently affects the signal
    #[inline]
    pub fn is_active(&self) -> bool {
        self.enabled && self.threshold_db > self.tuning.off_threshold_db
    }

    /// Open or held open
    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn envelope(&self) -> f64 {
        self.envelope
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn hold_samples(&self) -> usize {
        self.hold_samples
    }

    /// Advance one sample with the frame's mean absolute level and return the
    /// gate gain in [0, 1]
    #[inline]
    pub fn process(&mut self, level: f64) -> f64 {
        if !self.is_active() {
            return 1.0;
        }

        self.envelope = follow(self.envelope, level, self.attack_coeff, self.release_coeff);

        if self.envelope >= self.threshold {
            self.gain = 1.0;
            self.hold_counter = self.hold_samples;
            self.open = true;
        } else if self.hold_counter > 0 {
            self.hold_counter -= 1;
            self.gain = 1.0;
            self.open = true;
        } else {
            self.gain *= self.close_coeff;
            self.open = false;
        }

        self.gain
    }
}

impl Processor for NoiseGate {
    fn reset(&mut self) {
        self.envelope = 0.0;
        self.gain = 0.0;
        self.hold_counter = 0;
        self.open = false;
    }
}

impl ProcessorConfig for NoiseGate {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.attack_coeff = time_constant_coeff(self.tuning.attack_ms, sample_rate);
        self.release_coeff = time_constant_coeff(self.tuning.release_ms, sample_rate);
        self.close_coeff = time_constant_coeff(self.tuning.close_ms, sample_rate);
        self.hold_samples = ms_to_samples(self.tuning.hold_ms, sample_rate);
    }
}
