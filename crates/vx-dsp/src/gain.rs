//! Gain computation
//!
//! [`GainComputer`] is the static threshold/ratio/knee curve, a pure function
//! of the envelope level. [`Overshoot`] models the brief extra reduction a VCA
//! produces right after a fast rise in gain reduction. [`CompressionStage`]
//! chains a detector, the curve and the overshoot into one per-sample step.

use vx_core::{db_to_gain, gain_to_db, ms_to_samples, time_constant_coeff};

use crate::config::{DetectorTuning, OvershootTuning};
use crate::envelope::{DetectionLevel, EnvelopeDetector};
use crate::{Processor, ProcessorConfig};

/// Linear gain for a reduction given in dB
#[inline(always)]
pub fn reduction_to_gain(gr_db: f64) -> f64 {
    db_to_gain(-gr_db)
}

/// Static compression curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainComputer {
    threshold_db: f64,
    ratio: f64,
    knee_db: f64,
}

impl Default for GainComputer {
    fn default() -> Self {
        Self::new(-20.0, 4.0, 3.0)
    }
}

impl GainComputer {
    pub fn new(threshold_db: f64, ratio: f64, knee_db: f64) -> Self {
        let mut computer = Self {
            threshold_db: 0.0,
            ratio: 1.0,
            knee_db: 0.0,
        };
        computer.set_threshold(threshold_db);
        computer.set_ratio(ratio);
        computer.set_knee(knee_db);
        computer
    }

    pub fn set_threshold(&mut self, db: f64) {
        if db.is_finite() {
            self.threshold_db = db;
        }
    }

    /// Ratios below 1:1 are clamped to 1:1
    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = if ratio.is_nan() { 1.0 } else { ratio.max(1.0) };
    }

    pub fn set_knee(&mut self, db: f64) {
        self.knee_db = if db.is_nan() { 0.0 } else { db.max(0.0) };
    }

    pub fn threshold_db(&self) -> f64 {
        self.threshold_db
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn knee_db(&self) -> f64 {
        self.knee_db
    }

    /// `1 − 1/ratio`
    #[inline]
    pub fn slope(&self) -> f64 {
        1.0 - 1.0 / self.ratio
    }

    /// Gain reduction in dB for a linear envelope level
    #[inline]
    pub fn compute_gr_db(&self, envelope: f64) -> f64 {
        self.gr_for_level_db(gain_to_db(envelope))
    }

    /// Gain reduction in dB for a level already in dB
    #[inline]
    pub fn gr_for_level_db(&self, level_db: f64) -> f64 {
        let over_db = level_db - self.threshold_db;
        let half_knee = self.knee_db * 0.5;

        if self.knee_db > 0.0 && over_db.abs() <= half_knee {
            let x = over_db + half_knee;
            x * x / (2.0 * self.knee_db) * self.slope()
        } else if over_db > half_knee {
            over_db * self.slope()
        } else {
            0.0
        }
    }
}

/// VCA overshoot state
#[derive(Debug, Clone)]
pub struct Overshoot {
    enabled: bool,
    tuning: OvershootTuning,
    hold_samples: usize,
    decay_coeff: f64,

    prev_gr_db: f64,
    overshoot_db: f64,
    hold: usize,
}

impl Overshoot {
    pub fn new(sample_rate: f64, tuning: OvershootTuning) -> Self {
        let mut overshoot = Self {
            enabled: true,
            tuning,
            hold_samples: 0,
            decay_coeff: 0.0,
            prev_gr_db: 0.0,
            overshoot_db: 0.0,
            hold: 0,
        };
        overshoot.set_sample_rate(sample_rate);
        overshoot
    }

    /// A disabled overshoot passes gain reduction through unchanged
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.reset();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current extra reduction in dB
    pub fn current_db(&self) -> f64 {
        self.overshoot_db
    }

    pub fn hold_samples(&self) -> usize {
        self.hold_samples
    }

    /// Add the overshoot to this sample's gain reduction
    #[inline]
    pub fn process(&mut self, gr_db: f64) -> f64 {
        if !self.enabled {
            return gr_db;
        }

        let jump = gr_db - self.prev_gr_db;
        self.prev_gr_db = gr_db;

        if jump > self.tuning.jump_threshold_db {
            self.overshoot_db = self.tuning.amount_db;
            self.hold = self.hold_samples;
        } else if self.hold > 0 {
            self.hold -= 1;
        } else {
            self.overshoot_db *= self.decay_coeff;
            if self.overshoot_db < 1e-9 {
                self.overshoot_db = 0.0;
            }
        }

        gr_db + self.overshoot_db
    }
}

impl Processor for Overshoot {
    fn reset(&mut self) {
        self.prev_gr_db = 0.0;
        self.overshoot_db = 0.0;
        self.hold = 0;
    }
}

impl ProcessorConfig for Overshoot {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.hold_samples = ms_to_samples(self.tuning.hold_ms, sample_rate);
        self.decay_coeff = time_constant_coeff(self.tuning.decay_ms, sample_rate);
    }
}

/// Detector, static curve and overshoot run as one step.
///
/// The primary compressor and the stacked second stage are both instances of
/// this, each with its own state.
#[derive(Debug, Clone)]
pub struct CompressionStage {
    pub detector: EnvelopeDetector,
    pub computer: GainComputer,
    pub overshoot: Overshoot,
    gr_db: f64,
}

impl CompressionStage {
    pub fn new(sample_rate: f64, detector: DetectorTuning, overshoot: OvershootTuning) -> Self {
        Self {
            detector: EnvelopeDetector::new(sample_rate, detector),
            computer: GainComputer::default(),
            overshoot: Overshoot::new(sample_rate, overshoot),
            gr_db: 0.0,
        }
    }

    /// Total reduction (including overshoot) from the last processed sample
    pub fn gain_reduction_db(&self) -> f64 {
        self.gr_db
    }

    /// Advance one sample and return the total gain reduction in dB
    #[inline]
    pub fn process(&mut self, level: DetectionLevel) -> f64 {
        let envelope = self.detector.process(level);
        let static_gr = self.computer.compute_gr_db(envelope);
        self.gr_db = self.overshoot.process(static_gr);
        self.gr_db
    }
}

impl Processor for CompressionStage {
    fn reset(&mut self) {
        self.detector.reset();
        self.overshoot.reset();
        self.gr_db = 0.0;
    }
}

impl ProcessorConfig for CompressionStage {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.detector.set_sample_rate(sample_rate);
        self.overshoot.set_sample_rate(sample_rate);
    }
}
