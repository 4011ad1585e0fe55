//! vx-core: Shared types, parameter table and errors for the VX bus compressor
//!
//! This crate provides the foundational types used by the DSP crate and by
//! whatever host layer wraps it.

mod error;
mod params;

pub use error::*;
pub use params::*;

/// Type alias for audio samples (always f64 for maximum precision)
pub type Sample = f64;

/// Maximum number of channels a single processor instance accepts
pub const MAX_CHANNELS: usize = 8;

/// Linear floor used before taking a logarithm (≈ −120 dB)
pub const LINEAR_FLOOR: f64 = 1e-6;

/// Convert decibels to linear gain
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear gain to decibels, flooring the input at [`LINEAR_FLOOR`]
#[inline]
pub fn gain_to_db(gain: f64) -> f64 {
    20.0 * gain.max(LINEAR_FLOOR).log10()
}

/// One-pole smoothing coefficient for a time constant in milliseconds.
///
/// Returns `exp(-1 / (time_s * sample_rate))`. A non-positive time yields 0,
/// which makes the follower jump straight to its target.
#[inline]
pub fn time_constant_coeff(time_ms: f64, sample_rate: f64) -> f64 {
    if time_ms <= 0.0 || sample_rate <= 0.0 {
        0.0
    } else {
        (-1.0 / (time_ms * 0.001 * sample_rate)).exp()
    }
}

/// Convert a duration in milliseconds to a whole number of samples
#[inline]
pub fn ms_to_samples(ms: f64, sample_rate: f64) -> usize {
    (ms * 0.001 * sample_rate).round().max(0.0) as usize
}
