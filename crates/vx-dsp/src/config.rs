//! Processor configuration
//!
//! One configuration-driven pipeline covers every product variant. Each
//! optional stage is switched by a capability flag; a disabled stage passes
//! signal through untouched and costs nothing. The empirically tuned
//! constants live in named tuning structs so they can be adjusted without
//! touching the algorithms.

use serde::{Deserialize, Serialize};
use vx_core::{VxError, VxResult};

use crate::saturation::TubeCharacter;

/// Largest block the processor accepts unless configured otherwise
pub const DEFAULT_MAX_FRAMES: usize = 4096;

/// How the gain-reduction meter rises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeterAttack {
    /// Snap to the block peak
    #[default]
    Instant,
    /// Fixed-coefficient rise toward the block peak
    Smoothed,
}

/// Single-knob threshold/ratio mapping.
///
/// `threshold_db = amount^threshold_exponent · threshold_floor_db`,
/// `ratio = 1 + amount · ratio_span`, with `amount` in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressCurve {
    pub threshold_floor_db: f64,
    pub threshold_exponent: f64,
    pub ratio_span: f64,
}

impl Default for CompressCurve {
    fn default() -> Self {
        Self {
            threshold_floor_db: -50.0,
            threshold_exponent: 0.2,
            ratio_span: 29.0,
        }
    }
}

impl CompressCurve {
    /// Map a normalized amount to `(threshold_db, ratio)`
    pub fn map(&self, amount: f64) -> (f64, f64) {
        let amount = if amount.is_nan() { 0.0 } else { amount.clamp(0.0, 1.0) };
        let threshold_db = amount.powf(self.threshold_exponent) * self.threshold_floor_db;
        let ratio = 1.0 + amount * self.ratio_span;
        (threshold_db, ratio)
    }
}

/// Serial second-stage derivation constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackTuning {
    /// Fraction of the primary threshold (in dB) added at full stack.
    /// 0.5 lowers a −20 dB threshold to −30 dB.
    pub threshold_offset_scale: f64,
    /// Fraction of the analytic second-stage reduction restored as makeup
    pub makeup_compensation: f64,
}

impl Default for StackTuning {
    fn default() -> Self {
        Self {
            threshold_offset_scale: 0.5,
            makeup_compensation: 1.0,
        }
    }
}

/// VCA overshoot constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OvershootTuning {
    /// Sample-to-sample rise in gain reduction that triggers an overshoot
    pub jump_threshold_db: f64,
    /// Extra reduction applied while the overshoot is active
    pub amount_db: f64,
    pub hold_ms: f64,
    pub decay_ms: f64,
}

impl Default for OvershootTuning {
    fn default() -> Self {
        Self {
            jump_threshold_db: 3.0,
            amount_db: 3.0,
            hold_ms: 0.5,
            decay_ms: 2.0,
        }
    }
}

/// Noise gate timing
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateTuning {
    pub attack_ms: f64,
    pub release_ms: f64,
    pub hold_ms: f64,
    /// Time constant of the closing fade
    pub close_ms: f64,
    /// Threshold at or below which the gate is off
    pub off_threshold_db: f64,
}

impl Default for GateTuning {
    fn default() -> Self {
        Self {
            attack_ms: 1.0,
            release_ms: 20.0,
            hold_ms: 50.0,
            close_ms: 100.0,
            off_threshold_db: -80.0,
        }
    }
}

/// Saturation network constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaturationTuning {
    pub emphasis_freq: f64,
    pub emphasis_db: f64,
    /// Extra drive at full amount (drive = 1 + amount · drive_range)
    pub drive_range: f64,
    /// Bias at full amount, scales linearly with amount
    pub dc_offset: f64,
    /// Cubic grit coefficient at full taper
    pub grit: f64,
    pub dc_block_freq: f64,
    /// Peak level of the sine the loudness compensation is matched against
    pub reference_level: f64,
}

impl Default for SaturationTuning {
    fn default() -> Self {
        Self {
            emphasis_freq: 3500.0,
            emphasis_db: 5.0,
            drive_range: 3.0,
            dc_offset: 0.15,
            grit: 0.12,
            dc_block_freq: 5.0,
            reference_level: 0.5,
        }
    }
}

/// Automatic makeup gain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoMakeupTuning {
    /// Time constant of the gain-reduction average
    pub average_ms: f64,
    /// Fraction of the averaged reduction restored
    pub fraction: f64,
}

impl Default for AutoMakeupTuning {
    fn default() -> Self {
        Self {
            average_ms: 100.0,
            fraction: 0.8,
        }
    }
}

/// Meter ballistics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterTuning {
    /// Below this reading the gain-reduction meter snaps to zero
    pub gr_snap_db: f64,
    /// Below this reading the fast release coefficient is used
    pub gr_fast_zone_db: f64,
    pub gr_fast_release: f64,
    pub gr_slow_release: f64,
    /// Rise coefficient for [`MeterAttack::Smoothed`]
    pub gr_attack: f64,
    pub output_attack_ms: f64,
    pub output_release_ms: f64,
    pub output_floor_db: f64,
}

impl Default for MeterTuning {
    fn default() -> Self {
        Self {
            gr_snap_db: 0.05,
            gr_fast_zone_db: 1.0,
            gr_fast_release: 0.5,
            gr_slow_release: 0.95,
            gr_attack: 0.3,
            output_attack_ms: 10.0,
            output_release_ms: 150.0,
            output_floor_db: -60.0,
        }
    }
}

/// Envelope detector constants
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorTuning {
    /// Averaging time of the RMS source
    pub rms_window_ms: f64,
    /// Attack time reached at full grip
    pub peak_attack_ms: f64,
    /// Peak level treated as silence
    pub silence_threshold: f64,
    /// Consecutive silence before the envelope is forced to zero
    pub silence_hold_ms: f64,
}

impl Default for DetectorTuning {
    fn default() -> Self {
        Self {
            rms_window_ms: 10.0,
            peak_attack_ms: 0.1,
            silence_threshold: 1e-5,
            silence_hold_ms: 1.0,
        }
    }
}

/// Complete processor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    // Stage flags
    pub gate: bool,
    pub lookahead: bool,
    pub stacking: bool,
    pub auto_makeup: bool,
    pub vca_overshoot: bool,
    /// 80 Hz high-pass on the detector path
    pub sidechain_highpass: bool,
    /// High-shelf boost on the detector path
    pub sidechain_emphasis: bool,
    pub saturation: bool,
    /// Tube saturator in front of the gate
    pub tube_prestage: Option<TubeCharacter>,
    pub meter_attack: MeterAttack,

    pub max_frames: usize,
    /// Makeup and mix smoothing time
    pub smoothing_ms: f64,

    pub compress_curve: CompressCurve,
    pub detector: DetectorTuning,
    pub overshoot: OvershootTuning,
    pub stack_tuning: StackTuning,
    pub gate_tuning: GateTuning,
    pub saturation_tuning: SaturationTuning,
    pub auto_makeup_tuning: AutoMakeupTuning,
    pub meter: MeterTuning,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            gate: true,
            lookahead: true,
            stacking: true,
            auto_makeup: true,
            vca_overshoot: true,
            sidechain_highpass: true,
            sidechain_emphasis: false,
            saturation: true,
            tube_prestage: None,
            meter_attack: MeterAttack::Instant,
            max_frames: DEFAULT_MAX_FRAMES,
            smoothing_ms: 20.0,
            compress_curve: CompressCurve::default(),
            detector: DetectorTuning::default(),
            overshoot: OvershootTuning::default(),
            stack_tuning: StackTuning::default(),
            gate_tuning: GateTuning::default(),
            saturation_tuning: SaturationTuning::default(),
            auto_makeup_tuning: AutoMakeupTuning::default(),
            meter: MeterTuning::default(),
        }
    }
}

impl CompressorConfig {
    /// Bare compressor: every optional stage off
    pub fn minimal() -> Self {
        Self {
            gate: false,
            lookahead: false,
            stacking: false,
            auto_makeup: false,
            vca_overshoot: false,
            sidechain_highpass: false,
            sidechain_emphasis: false,
            saturation: false,
            tube_prestage: None,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON configuration. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> VxResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        log::debug!("Loaded compressor config: {:?}", config);
        Ok(config)
    }

    pub fn to_json_string(&self) -> VxResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that would make time constants or buffers undefined
    pub fn validate(&self) -> VxResult<()> {
        if self.max_frames == 0 {
            return Err(VxError::Config("max_frames must be non-zero".into()));
        }

        let times = [
            ("smoothing_ms", self.smoothing_ms),
            ("detector.rms_window_ms", self.detector.rms_window_ms),
            ("detector.peak_attack_ms", self.detector.peak_attack_ms),
            ("detector.silence_hold_ms", self.detector.silence_hold_ms),
            ("overshoot.hold_ms", self.overshoot.hold_ms),
            ("overshoot.decay_ms", self.overshoot.decay_ms),
            ("gate_tuning.attack_ms", self.gate_tuning.attack_ms),
            ("gate_tuning.release_ms", self.gate_tuning.release_ms),
            ("gate_tuning.hold_ms", self.gate_tuning.hold_ms),
            ("gate_tuning.close_ms", self.gate_tuning.close_ms),
            ("auto_makeup_tuning.average_ms", self.auto_makeup_tuning.average_ms),
            ("meter.output_attack_ms", self.meter.output_attack_ms),
            ("meter.output_release_ms", self.meter.output_release_ms),
        ];
        for (name, value) in times {
            if !value.is_finite() || value < 0.0 {
                return Err(VxError::Config(format!("{name} must be a finite, non-negative time")));
            }
        }

        let sat = &self.saturation_tuning;
        if !(sat.reference_level > 0.0 && sat.reference_level.is_finite()) {
            return Err(VxError::Config("saturation_tuning.reference_level must be positive".into()));
        }
        if !(sat.emphasis_freq > 0.0 && sat.dc_block_freq > 0.0) {
            return Err(VxError::Config("saturation filter frequencies must be positive".into()));
        }
        if sat.drive_range < 0.0 || sat.dc_offset < 0.0 || sat.grit < 0.0 {
            return Err(VxError::Config("saturation drive, offset and grit must be non-negative".into()));
        }

        for (name, coeff) in [
            ("meter.gr_fast_release", self.meter.gr_fast_release),
            ("meter.gr_slow_release", self.meter.gr_slow_release),
            ("meter.gr_attack", self.meter.gr_attack),
        ] {
            if !(0.0..1.0).contains(&coeff) {
                return Err(VxError::Config(format!("{name} must be in [0, 1)")));
            }
        }

        if self.compress_curve.ratio_span < 0.0 {
            return Err(VxError::Config("compress_curve.ratio_span must be non-negative".into()));
        }

        Ok(())
    }
}
