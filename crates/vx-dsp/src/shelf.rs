//! One-pole shelving filters via the bilinear transform
//!
//! Used for pre-/de-emphasis around the saturation waveshaper and for the
//! optional sidechain emphasis. The cut form is the exact algebraic inverse
//! of the boost form, so boost followed by cut at the same frequency and
//! gain reconstructs the input.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use vx_core::{Sample, db_to_gain};

use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Which end of the spectrum the shelf acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ShelfKind {
    /// Gain at DC, unity at Nyquist
    Low,
    /// Unity at DC, gain at Nyquist
    #[default]
    High,
}

/// Boost or its inverse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfMode {
    Boost,
    Cut,
}

/// One-pole shelf coefficients: `y = b0·x + b1·x1 − a1·y1`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShelfCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub a1: f64,
}

impl ShelfCoeffs {
    /// Boost form. `K = tan(π·fc/fs)`, `G = 10^(gain_db/20)`.
    pub fn boost(kind: ShelfKind, freq: f64, gain_db: f64, sample_rate: f64) -> Self {
        // Keep the prewarped frequency strictly below Nyquist
        let freq = freq.clamp(1.0, 0.49 * sample_rate);
        let k = (PI * freq / sample_rate).tan();
        let g = db_to_gain(gain_db);
        let norm = k + 1.0;

        match kind {
            ShelfKind::Low => Self {
                b0: (g * k + 1.0) / norm,
                b1: (g * k - 1.0) / norm,
                a1: (k - 1.0) / norm,
            },
            ShelfKind::High => Self {
                b0: (g + k) / norm,
                b1: (k - g) / norm,
                a1: (k - 1.0) / norm,
            },
        }
    }

    /// Cut form: the algebraic inverse of [`ShelfCoeffs::boost`]
    pub fn cut(kind: ShelfKind, freq: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::boost(kind, freq, gain_db, sample_rate).inverse()
    }

    /// Swap numerator and denominator, renormalized so the leading
    /// denominator coefficient stays 1
    pub fn inverse(&self) -> Self {
        Self {
            b0: 1.0 / self.b0,
            b1: self.a1 / self.b0,
            a1: self.b1 / self.b0,
        }
    }

    pub fn bypass() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            a1: 0.0,
        }
    }

    /// Pole location in the z-plane
    #[inline]
    pub fn pole(&self) -> f64 {
        -self.a1
    }

    /// Magnitude response at DC
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1) / (1.0 + self.a1)
    }

    /// Magnitude response at Nyquist
    pub fn nyquist_gain(&self) -> f64 {
        ((self.b0 - self.b1) / (1.0 - self.a1)).abs()
    }
}

impl Default for ShelfCoeffs {
    fn default() -> Self {
        Self::bypass()
    }
}

/// One-pole shelving filter with its own (x1, y1) history.
///
/// Instantiate one per channel.
#[derive(Debug, Clone)]
pub struct ShelfFilter {
    kind: ShelfKind,
    mode: ShelfMode,
    freq: f64,
    gain_db: f64,
    coeffs: ShelfCoeffs,
    x1: f64,
    y1: f64,
    sample_rate: f64,
}

impl ShelfFilter {
    pub fn new(kind: ShelfKind, mode: ShelfMode, freq: f64, gain_db: f64, sample_rate: f64) -> Self {
        let mut filter = Self {
            kind,
            mode,
            freq,
            gain_db,
            coeffs: ShelfCoeffs::bypass(),
            x1: 0.0,
            y1: 0.0,
            sample_rate,
        };
        filter.update_coeffs();
        filter
    }

    pub fn high_boost(freq: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::new(ShelfKind::High, ShelfMode::Boost, freq, gain_db, sample_rate)
    }

    pub fn high_cut(freq: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::new(ShelfKind::High, ShelfMode::Cut, freq, gain_db, sample_rate)
    }

    #[inline]
    pub fn coeffs(&self) -> &ShelfCoeffs {
        &self.coeffs
    }

    fn update_coeffs(&mut self) {
        self.coeffs = match self.mode {
            ShelfMode::Boost => {
                ShelfCoeffs::boost(self.kind, self.freq, self.gain_db, self.sample_rate)
            }
            ShelfMode::Cut => ShelfCoeffs::cut(self.kind, self.freq, self.gain_db, self.sample_rate),
        };
    }
}

impl Processor for ShelfFilter {
    fn reset(&mut self) {
        self.x1 = 0.0;
        self.y1 = 0.0;
    }
}

impl MonoProcessor for ShelfFilter {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let c = &self.coeffs;
        let output = c.b0 * input + c.b1 * self.x1 - c.a1 * self.y1;
        self.x1 = input;
        self.y1 = output;
        output
    }
}

impl ProcessorConfig for ShelfFilter {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coeffs();
    }
}
