//! Serial second compression stage
//!
//! A second detector and gain computer listen to the signal after the first
//! stage's gain has been applied. Its threshold and ratio are derived from the
//! primary settings and the stack amount:
//!
//! - `threshold₂ = threshold₁ · (1 + offset_scale · amount)`
//! - `ratio₂ = 1 + (ratio₁ − 1) · amount`
//!
//! A static makeup gain restores the extra reduction the offset introduces.
//! At amount 0 the stage is a no-op and its makeup is exactly unity.

use vx_core::db_to_gain;

use crate::config::{DetectorTuning, OvershootTuning, StackTuning};
use crate::envelope::DetectionLevel;
use crate::gain::CompressionStage;
use crate::{Processor, ProcessorConfig};

#[derive(Debug, Clone)]
pub struct StackStage {
    stage: CompressionStage,
    tuning: StackTuning,
    enabled: bool,
    amount: f64,

    primary_threshold_db: f64,
    primary_ratio: f64,
    makeup_gain: f64,
}

impl StackStage {
    pub fn new(
        sample_rate: f64,
        tuning: StackTuning,
        detector: DetectorTuning,
        overshoot: OvershootTuning,
    ) -> Self {
        let mut stack = Self {
            stage: CompressionStage::new(sample_rate, detector, overshoot),
            tuning,
            enabled: true,
            amount: 0.0,
            primary_threshold_db: -20.0,
            primary_ratio: 4.0,
            makeup_gain: 1.0,
        };
        stack.update_derived();
        stack
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled != self.enabled {
            self.stage.reset();
        }
        self.enabled = enabled;
    }

    /// Stack amount as a fraction in [0, 1]
    pub fn set_amount(&mut self, amount: f64) {
        let amount = if amount.is_nan() { 0.0 } else { amount.clamp(0.0, 1.0) };
        if (amount > 0.0) != (self.amount > 0.0) {
            // Entering or leaving the active range starts from clean state
            self.stage.reset();
        }
        self.amount = amount;
        self.update_derived();
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Follow the primary stage's curve
    pub fn set_primary(&mut self, threshold_db: f64, ratio: f64, knee_db: f64) {
        self.primary_threshold_db = threshold_db;
        self.primary_ratio = ratio.max(1.0);
        self.stage.computer.set_knee(knee_db);
        self.update_derived();
    }

    pub fn set_attack_ms(&mut self, ms: f64) {
        self.stage.detector.set_attack_ms(ms);
    }

    pub fn set_release_ms(&mut self, ms: f64) {
        self.stage.detector.set_release_ms(ms);
    }

    pub fn set_grip(&mut self, grip: f64) {
        self.stage.detector.set_grip(grip);
    }

    pub fn set_overshoot_enabled(&mut self, enabled: bool) {
        self.stage.overshoot.set_enabled(enabled);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.enabled && self.amount > 0.0
    }

    pub fn threshold_db(&self) -> f64 {
        self.stage.computer.threshold_db()
    }

    pub fn ratio(&self) -> f64 {
        self.stage.computer.ratio()
    }

    /// Threshold offset below the primary threshold, in dB (≥ 0)
    pub fn threshold_offset_db(&self) -> f64 {
        self.primary_threshold_db - self.threshold_db()
    }

    /// Static compensation gain (linear)
    pub fn makeup_gain(&self) -> f64 {
        if self.is_active() { self.makeup_gain } else { 1.0 }
    }

    fn update_derived(&mut self) {
        let threshold =
            self.primary_threshold_db * (1.0 + self.tuning.threshold_offset_scale * self.amount);
        let ratio = 1.0 + (self.primary_ratio - 1.0) * self.amount;
        self.stage.computer.set_threshold(threshold);
        self.stage.computer.set_ratio(ratio);

        let offset_db = self.primary_threshold_db - threshold;
        let makeup_db = offset_db * self.stage.computer.slope() * self.tuning.makeup_compensation;
        self.makeup_gain = db_to_gain(makeup_db);
    }

    /// Gain reduction in dB for the post-stage-1 detection level
    #[inline]
    pub fn process(&mut self, level: DetectionLevel) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        self.stage.process(level)
    }
}

impl Processor for StackStage {
    fn reset(&mut self) {
        self.stage.reset();
    }
}

impl ProcessorConfig for StackStage {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.stage.set_sample_rate(sample_rate);
    }
}
