//! Parameter table for the bus compressor
//!
//! The host sees a flat set of named scalar parameters. Every parameter has a
//! documented range, unit and default; writes outside the range are clamped
//! at the setter boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::VxError;

/// Parameter identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamId {
    /// Combined threshold + ratio control
    Compress,
    Threshold,
    Ratio,
    Knee,
    Attack,
    Release,
    MakeupGain,
    Mix,
    /// RMS/peak detection blend
    Grip,
    /// Saturation network amount
    Bite,
    /// Serial second-stage amount
    Stack,
    GateThreshold,
    /// Look-ahead step index
    Lookahead,
    AutoMakeup,
    Bypass,
    GainReductionMeter,
    OutputLevelMeter,
}

impl ParamId {
    /// Every parameter, in host enumeration order
    pub const ALL: [ParamId; 17] = [
        ParamId::Compress,
        ParamId::Threshold,
        ParamId::Ratio,
        ParamId::Knee,
        ParamId::Attack,
        ParamId::Release,
        ParamId::MakeupGain,
        ParamId::Mix,
        ParamId::Grip,
        ParamId::Bite,
        ParamId::Stack,
        ParamId::GateThreshold,
        ParamId::Lookahead,
        ParamId::AutoMakeup,
        ParamId::Bypass,
        ParamId::GainReductionMeter,
        ParamId::OutputLevelMeter,
    ];

    /// Number of parameters
    pub const COUNT: usize = Self::ALL.len();

    /// Position in [`ParamId::ALL`]
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// External (host-facing) identifier
    pub fn as_str(self) -> &'static str {
        match self {
            ParamId::Compress => "compress",
            ParamId::Threshold => "threshold",
            ParamId::Ratio => "ratio",
            ParamId::Knee => "knee",
            ParamId::Attack => "attack",
            ParamId::Release => "release",
            ParamId::MakeupGain => "makeupGain",
            ParamId::Mix => "mix",
            ParamId::Grip => "grip",
            ParamId::Bite => "bite",
            ParamId::Stack => "stack",
            ParamId::GateThreshold => "gateThreshold",
            ParamId::Lookahead => "lookahead",
            ParamId::AutoMakeup => "autoMakeup",
            ParamId::Bypass => "bypass",
            ParamId::GainReductionMeter => "gainReductionMeter",
            ParamId::OutputLevelMeter => "outputLevelMeter",
        }
    }

    /// Full specification of this parameter
    pub fn spec(self) -> ParamSpec {
        use ParamUnit::*;

        let (name, unit, range) = match self {
            ParamId::Compress => ("Compress", Percent, ParamRange::linear(0.0, 100.0, 0.0)),
            ParamId::Threshold => ("Threshold", Decibels, ParamRange::linear(-50.0, 0.0, -20.0)),
            ParamId::Ratio => ("Ratio", Ratio, ParamRange::logarithmic(1.0, 30.0, 4.0)),
            ParamId::Knee => ("Knee", Decibels, ParamRange::linear(0.0, 24.0, 3.0)),
            ParamId::Attack => ("Attack", Milliseconds, ParamRange::linear(0.0, 200.0, 10.0)),
            ParamId::Release => (
                "Release",
                Milliseconds,
                ParamRange::logarithmic(5.0, 5000.0, 100.0),
            ),
            ParamId::MakeupGain => ("Makeup Gain", Decibels, ParamRange::linear(-20.0, 50.0, 0.0)),
            ParamId::Mix => ("Mix", Percent, ParamRange::linear(0.0, 100.0, 100.0)),
            ParamId::Grip => ("Grip", Percent, ParamRange::linear(0.0, 100.0, 0.0)),
            ParamId::Bite => ("Bite", Percent, ParamRange::linear(0.0, 100.0, 25.0)),
            ParamId::Stack => ("Stack", Percent, ParamRange::linear(0.0, 100.0, 0.0)),
            ParamId::GateThreshold => (
                "Gate",
                Decibels,
                ParamRange::linear(-80.0, -20.0, -80.0),
            ),
            ParamId::Lookahead => ("Look-Ahead", Indexed, ParamRange::linear(0.0, 3.0, 0.0)),
            ParamId::AutoMakeup => ("Auto Makeup", Boolean, ParamRange::linear(0.0, 1.0, 0.0)),
            ParamId::Bypass => ("Bypass", Boolean, ParamRange::linear(0.0, 1.0, 0.0)),
            ParamId::GainReductionMeter => (
                "Gain Reduction",
                Decibels,
                ParamRange::linear(0.0, 60.0, 0.0),
            ),
            ParamId::OutputLevelMeter => (
                "Output Level",
                Decibels,
                ParamRange::linear(-60.0, 24.0, -60.0),
            ),
        };

        ParamSpec {
            id: self,
            name,
            unit,
            range,
            read_only: self.is_read_only(),
        }
    }

    /// Meters are computed by the processor and cannot be written
    pub fn is_read_only(self) -> bool {
        matches!(
            self,
            ParamId::GainReductionMeter | ParamId::OutputLevelMeter
        )
    }

    /// Clamp a raw value into this parameter's documented range
    #[inline]
    pub fn clamp(self, value: f64) -> f64 {
        self.spec().range.clamp(value)
    }

    /// Default value
    pub fn default_value(self) -> f64 {
        self.spec().range.default
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParamId {
    type Err = VxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ParamId::ALL
            .iter()
            .copied()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| VxError::UnknownParameter(s.to_string()))
    }
}

/// Display unit of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamUnit {
    Decibels,
    Milliseconds,
    Percent,
    Ratio,
    Boolean,
    Indexed,
}

/// Complete parameter description
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub id: ParamId,
    pub name: &'static str,
    pub unit: ParamUnit,
    pub range: ParamRange,
    pub read_only: bool,
}

/// Parameter range specification
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
    pub skew: ParamSkew,
}

impl ParamRange {
    pub fn linear(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            skew: ParamSkew::Linear,
        }
    }

    pub fn logarithmic(min: f64, max: f64, default: f64) -> Self {
        Self {
            min,
            max,
            default,
            skew: ParamSkew::Logarithmic,
        }
    }

    /// Clamp into range. NaN collapses to the default.
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            self.default
        } else {
            value.clamp(self.min, self.max)
        }
    }

    /// Denormalize a 0-1 value to actual value
    pub fn denormalize(&self, normalized: f64) -> f64 {
        let normalized = normalized.clamp(0.0, 1.0);
        match self.skew {
            ParamSkew::Linear => self.min + normalized * (self.max - self.min),
            ParamSkew::Logarithmic => {
                let log_min = self.min.ln();
                let log_max = self.max.ln();
                (log_min + normalized * (log_max - log_min)).exp()
            }
        }
    }

    /// Normalize an actual value to 0-1
    pub fn normalize(&self, value: f64) -> f64 {
        let clamped = self.clamp(value);
        match self.skew {
            ParamSkew::Linear => (clamped - self.min) / (self.max - self.min),
            ParamSkew::Logarithmic => {
                let log_min = self.min.ln();
                let log_max = self.max.ln();
                (clamped.ln() - log_min) / (log_max - log_min)
            }
        }
    }
}

/// Parameter skew type
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ParamSkew {
    Linear,
    Logarithmic,
}
