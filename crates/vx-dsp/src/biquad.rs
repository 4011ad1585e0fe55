//! Biquad filter implementation using Transposed Direct Form II
//!
//! TDF-II is numerically optimal for floating-point arithmetic,
//! minimizing quantization noise and ensuring stability.
//!
//! Only the detector path uses these filters; program audio never passes
//! through them.

use std::f64::consts::{FRAC_1_SQRT_2, PI};
use vx_core::Sample;

use crate::{MonoProcessor, Processor, ProcessorConfig};

/// Sidechain high-pass corner frequency
pub const SIDECHAIN_HPF_FREQ: f64 = 80.0;

/// Butterworth Q
pub const BUTTERWORTH_Q: f64 = FRAC_1_SQRT_2;

/// Biquad coefficients
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Calculate highpass filter coefficients
    pub fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = (1.0 + cos_omega) / 2.0;
        let b1 = -(1.0 + cos_omega);
        let b2 = (1.0 + cos_omega) / 2.0;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Bypass (unity gain, no filtering)
    pub fn bypass() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Both poles inside the unit circle (stability triangle)
    pub fn is_stable(&self) -> bool {
        self.a2.abs() < 1.0 && self.a1.abs() < 1.0 + self.a2
    }

    /// Magnitude response at `freq`
    pub fn magnitude(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let (s1, c1) = w.sin_cos();
        let (s2, c2) = (2.0 * w).sin_cos();

        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);

        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

/// Transposed Direct Form II biquad filter
#[derive(Debug, Clone)]
pub struct BiquadTDF2 {
    coeffs: BiquadCoeffs,
    z1: f64,
    z2: f64,
    sample_rate: f64,
}

impl BiquadTDF2 {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            coeffs: BiquadCoeffs::bypass(),
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        }
    }

    /// Fixed 80 Hz Butterworth high-pass for the detector path
    pub fn sidechain_highpass(sample_rate: f64) -> Self {
        let mut filter = Self::new(sample_rate);
        filter.set_highpass(SIDECHAIN_HPF_FREQ, BUTTERWORTH_Q);
        filter
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Set as highpass filter
    pub fn set_highpass(&mut self, freq: f64, q: f64) {
        self.coeffs = BiquadCoeffs::highpass(freq, q, self.sample_rate);
    }
}

impl Processor for BiquadTDF2 {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for BiquadTDF2 {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let output = self.coeffs.b0 * input + self.z1;
        self.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.z2;
        self.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }
}

impl ProcessorConfig for BiquadTDF2 {
    /// The sidechain filter is the only configuration in use, so a rate
    /// change re-derives its high-pass coefficients.
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.set_highpass(SIDECHAIN_HPF_FREQ, BUTTERWORTH_Q);
    }
}
