//! vx-dsp: real-time bus compressor with integrated harmonic saturation
//!
//! Allocation-free, lock-free per-sample processing.
//!
//! ## Modules
//! - `shelf` - one-pole shelving filters (emphasis / de-emphasis)
//! - `biquad` - TDF-II biquad, 80 Hz Butterworth sidechain high-pass
//! - `envelope` - RMS/peak blended envelope detector with grip control
//! - `gain` - static knee/ratio curve and VCA overshoot model
//! - `gate` - noise gate with hold
//! - `lookahead` - per-channel look-ahead ring buffer
//! - `stack` - serial second compression stage
//! - `saturation` - emphasis saturation network and tube saturators
//! - `metering` - gain-reduction and output-level meters
//! - `smoothing` - one-pole parameter smoothing
//! - `config` - stage flags and tuning constants
//! - `processor` - the complete configuration-driven pipeline

pub mod biquad;
pub mod config;
pub mod envelope;
pub mod gain;
pub mod gate;
pub mod lookahead;
pub mod metering;
pub mod processor;
pub mod saturation;
pub mod shelf;
pub mod smoothing;
pub mod stack;

pub use config::CompressorConfig;
pub use processor::BusCompressor;

use vx_core::Sample;

/// Trait for all DSP processors
pub trait Processor: Send + Sync {
    /// Reset processor state
    fn reset(&mut self);

    /// Get latency in samples
    fn latency(&self) -> usize {
        0
    }
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

/// Processor configuration for sample rate changes
pub trait ProcessorConfig {
    fn set_sample_rate(&mut self, sample_rate: f64);
}
