//! Metering
//!
//! - Gain-reduction meter with tiered release
//! - Output peak meter with block-relative ballistics
//! - Running gain-reduction average for automatic makeup

use vx_core::{Sample, gain_to_db, time_constant_coeff};

use crate::config::{AutoMakeupTuning, MeterAttack, MeterTuning};

/// Gain-reduction meter, updated once per block with the block's peak
/// reduction in dB
#[derive(Debug, Clone)]
pub struct GainReductionMeter {
    tuning: MeterTuning,
    attack: MeterAttack,
    value: f64,
}

impl GainReductionMeter {
    pub fn new(tuning: MeterTuning, attack: MeterAttack) -> Self {
        Self {
            tuning,
            attack,
            value: 0.0,
        }
    }

    /// Current reading in dB (≥ 0)
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn update(&mut self, block_peak_db: f64) {
        let peak = if block_peak_db.is_finite() { block_peak_db.max(0.0) } else { 0.0 };

        if peak >= self.value {
            self.value = match self.attack {
                MeterAttack::Instant => peak,
                MeterAttack::Smoothed => {
                    self.tuning.gr_attack * self.value + (1.0 - self.tuning.gr_attack) * peak
                }
            };
            return;
        }

        // Release tier follows the incoming block, so a quiet block clears
        // the reading at once
        if peak < self.tuning.gr_snap_db {
            self.value = 0.0;
            return;
        }

        let coeff = if peak < self.tuning.gr_fast_zone_db {
            self.tuning.gr_fast_release
        } else {
            self.tuning.gr_slow_release
        };
        self.value = coeff * self.value + (1.0 - coeff) * peak;
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// Output peak meter in dB
#[derive(Debug, Clone)]
pub struct OutputLevelMeter {
    tuning: MeterTuning,
    value_db: f64,
}

impl OutputLevelMeter {
    pub fn new(tuning: MeterTuning) -> Self {
        Self {
            tuning,
            value_db: tuning.output_floor_db,
        }
    }

    /// Current reading in dB, never below the floor
    pub fn value_db(&self) -> f64 {
        self.value_db
    }

    /// Largest absolute sample across the given channel slices
    pub fn block_peak(channels: &[&mut [Sample]], frames: usize) -> f64 {
        channels
            .iter()
            .flat_map(|ch| ch[..frames.min(ch.len())].iter())
            .fold(0.0_f64, |peak, &x| peak.max(x.abs()))
    }

    /// Fold one block's peak into the reading. Time constants are relative
    /// to the block duration.
    pub fn update(&mut self, block_peak: f64, frames: usize, sample_rate: f64) {
        if frames == 0 {
            return;
        }

        let level_db = gain_to_db(block_peak).max(self.tuning.output_floor_db);
        // The meter runs at the block rate
        let blocks_per_second = sample_rate / frames as f64;
        let time_ms = if level_db > self.value_db {
            self.tuning.output_attack_ms
        } else {
            self.tuning.output_release_ms
        };
        let coeff = time_constant_coeff(time_ms, blocks_per_second);

        self.value_db = coeff * self.value_db + (1.0 - coeff) * level_db;
        self.value_db = self.value_db.max(self.tuning.output_floor_db);
    }

    pub fn reset(&mut self) {
        self.value_db = self.tuning.output_floor_db;
    }
}

/// One-pole average of the total gain reduction, feeding automatic makeup
#[derive(Debug, Clone)]
pub struct GainReductionAverage {
    tuning: AutoMakeupTuning,
    coeff: f64,
    average_db: f64,
}

impl GainReductionAverage {
    pub fn new(sample_rate: f64, tuning: AutoMakeupTuning) -> Self {
        Self {
            tuning,
            coeff: time_constant_coeff(tuning.average_ms, sample_rate),
            average_db: 0.0,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.coeff = time_constant_coeff(self.tuning.average_ms, sample_rate);
    }

    #[inline]
    pub fn process(&mut self, gr_db: f64) -> f64 {
        self.average_db = self.coeff * self.average_db + (1.0 - self.coeff) * gr_db;
        self.average_db
    }

    pub fn average_db(&self) -> f64 {
        self.average_db
    }

    /// Makeup in dB restoring the configured fraction of the average
    #[inline]
    pub fn makeup_db(&self) -> f64 {
        self.average_db * self.tuning.fraction
    }

    pub fn reset(&mut self) {
        self.average_db = 0.0;
    }
}
