//! Parameter smoothing
//!
//! One-pole exponential smoothing for gain-type parameters (makeup, mix).
//! The target is an atomic word, so a control thread may write it while the
//! audio thread reads; the audio thread owns the smoothed value.

use std::sync::atomic::{AtomicU64, Ordering};

/// Differences below this snap to the target
const SETTLE_EPSILON: f64 = 1e-10;

/// Exponentially smoothed parameter
#[derive(Debug)]
pub struct SmoothedParam {
    /// Target value, written from any thread
    target: AtomicU64,
    current: f64,
    coeff: f64,
    smoothing_ms: f64,
    sample_rate: f64,
}

impl SmoothedParam {
    pub fn new(initial_value: f64, smoothing_ms: f64, sample_rate: f64) -> Self {
        let mut param = Self {
            target: AtomicU64::new(initial_value.to_bits()),
            current: initial_value,
            coeff: 1.0,
            smoothing_ms,
            sample_rate,
        };
        param.update_coeff();
        param
    }

    fn update_coeff(&mut self) {
        let samples = self.smoothing_ms * 0.001 * self.sample_rate;
        self.coeff = if samples <= 0.0 {
            1.0
        } else {
            // Reach ~63% of a step in `samples`
            1.0 - (-1.0 / samples).exp()
        };
    }

    pub fn set_smoothing_time(&mut self, time_ms: f64) {
        self.smoothing_ms = time_ms.max(0.0);
        self.update_coeff();
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coeff();
    }

    #[inline]
    pub fn set_target(&self, value: f64) {
        self.target.store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn target(&self) -> f64 {
        f64::from_bits(self.target.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Jump straight to `value`
    pub fn set_immediate(&mut self, value: f64) {
        self.current = value;
        self.target.store(value.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub fn is_smoothing(&self) -> bool {
        self.current != self.target()
    }

    /// Advance one sample
    #[inline]
    pub fn next(&mut self) -> f64 {
        let target = self.target();
        let diff = target - self.current;
        if diff.abs() < SETTLE_EPSILON {
            self.current = target;
        } else {
            self.current += self.coeff * diff;
        }
        self.current
    }

    /// Snap to the target
    pub fn reset(&mut self) {
        self.current = self.target();
    }
}

impl Clone for SmoothedParam {
    fn clone(&self) -> Self {
        Self {
            target: AtomicU64::new(self.target().to_bits()),
            current: self.current,
            coeff: self.coeff,
            smoothing_ms: self.smoothing_ms,
            sample_rate: self.sample_rate,
        }
    }
}
