//! Complete bus compressor pipeline
//!
//! Per frame:
//! tube pre-stage → gate → sidechain filtering → detector + gain computer
//! (+ overshoot) → stacked second stage → look-ahead delay on the audio path
//! → gain → saturation → makeup → dry/wet mix.
//! Meters are updated once per block.
//!
//! Host-facing calls (`initialize`, named parameter access, `process` buffer
//! validation) return [`VxResult`]. Everything inside the per-sample loop is
//! clamped instead of signalled, allocates nothing and never logs.

use vx_core::{MAX_CHANNELS, ParamId, Sample, VxError, VxResult, db_to_gain};

use crate::biquad::BiquadTDF2;
use crate::config::CompressorConfig;
use crate::envelope::DetectionLevel;
use crate::gain::{CompressionStage, reduction_to_gain};
use crate::gate::NoiseGate;
use crate::lookahead::{LookaheadDelay, LookaheadTime};
use crate::metering::{GainReductionAverage, GainReductionMeter, OutputLevelMeter};
use crate::saturation::{SaturationNetwork, TubeSaturator};
use crate::shelf::ShelfFilter;
use crate::smoothing::SmoothedParam;
use crate::stack::StackStage;
use crate::{MonoProcessor, Processor};

/// Sample rates below this are accepted with a warning
const MIN_RECOMMENDED_SAMPLE_RATE: f64 = 8000.0;

/// Everything that exists only once channel count and sample rate are known
#[derive(Debug, Clone)]
struct ProcessorState {
    channels: usize,
    sample_rate: f64,

    tube_prestage: Vec<TubeSaturator>,
    gate: NoiseGate,
    sidechain_highpass: Vec<BiquadTDF2>,
    sidechain_emphasis: Vec<ShelfFilter>,
    primary: CompressionStage,
    stack: StackStage,
    lookahead: LookaheadDelay,
    saturation: SaturationNetwork,

    gr_average: GainReductionAverage,
    makeup: SmoothedParam,
    mix: SmoothedParam,

    gr_meter: GainReductionMeter,
    output_meter: OutputLevelMeter,
}

impl ProcessorState {
    fn new(config: &CompressorConfig, channels: usize, sample_rate: f64) -> Self {
        let tube_prestage = match config.tube_prestage {
            Some(character) => (0..channels)
                .map(|_| TubeSaturator::new(character, sample_rate))
                .collect(),
            None => Vec::new(),
        };

        let sidechain_highpass = if config.sidechain_highpass {
            (0..channels)
                .map(|_| BiquadTDF2::sidechain_highpass(sample_rate))
                .collect()
        } else {
            Vec::new()
        };

        let sat = &config.saturation_tuning;
        let sidechain_emphasis = if config.sidechain_emphasis {
            (0..channels)
                .map(|_| ShelfFilter::high_boost(sat.emphasis_freq, sat.emphasis_db, sample_rate))
                .collect()
        } else {
            Vec::new()
        };

        let mut gate = NoiseGate::new(sample_rate, config.gate_tuning);
        gate.set_enabled(config.gate);

        let mut primary = CompressionStage::new(sample_rate, config.detector, config.overshoot);
        primary.overshoot.set_enabled(config.vca_overshoot);

        let mut stack = StackStage::new(
            sample_rate,
            config.stack_tuning,
            config.detector,
            config.overshoot,
        );
        stack.set_enabled(config.stacking);
        stack.set_overshoot_enabled(config.vca_overshoot);

        let mut saturation = SaturationNetwork::new(channels, sample_rate, config.saturation_tuning);
        saturation.set_enabled(config.saturation);

        Self {
            channels,
            sample_rate,
            tube_prestage,
            gate,
            sidechain_highpass,
            sidechain_emphasis,
            primary,
            stack,
            lookahead: LookaheadDelay::new(channels, sample_rate),
            saturation,
            gr_average: GainReductionAverage::new(sample_rate, config.auto_makeup_tuning),
            makeup: SmoothedParam::new(1.0, config.smoothing_ms, sample_rate),
            mix: SmoothedParam::new(1.0, config.smoothing_ms, sample_rate),
            gr_meter: GainReductionMeter::new(config.meter, config.meter_attack),
            output_meter: OutputLevelMeter::new(config.meter),
        }
    }

    fn reset(&mut self) {
        for tube in &mut self.tube_prestage {
            tube.reset();
        }
        self.gate.reset();
        for filter in &mut self.sidechain_highpass {
            filter.reset();
        }
        for filter in &mut self.sidechain_emphasis {
            filter.reset();
        }
        self.primary.reset();
        self.stack.reset();
        self.lookahead.reset();
        self.saturation.reset();
        self.gr_average.reset();
        self.makeup.reset();
        self.mix.reset();
        self.gr_meter.reset();
        self.output_meter.reset();
    }
}

/// Configuration-driven bus compressor
#[derive(Debug)]
pub struct BusCompressor {
    config: CompressorConfig,
    params: [f64; ParamId::COUNT],
    state: Option<ProcessorState>,
    bypass: bool,
    pending_reset: bool,
}

impl Default for BusCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl BusCompressor {
    pub fn new() -> Self {
        Self::with_config(CompressorConfig::default())
    }

    pub fn with_config(config: CompressorConfig) -> Self {
        let mut params = [0.0; ParamId::COUNT];
        for id in ParamId::ALL {
            params[id.index()] = id.default_value();
        }

        Self {
            config,
            params,
            state: None,
            bypass: false,
            pending_reset: false,
        }
    }

    pub fn config(&self) -> &CompressorConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn channels(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.channels)
    }

    pub fn sample_rate(&self) -> Option<f64> {
        self.state.as_ref().map(|s| s.sample_rate)
    }

    pub fn max_frames(&self) -> usize {
        self.config.max_frames
    }

    /// Allocate per-channel state for `channels` at `sample_rate` and apply
    /// the current parameter set. Any previous state is discarded.
    pub fn initialize(&mut self, channels: usize, sample_rate: f64) -> VxResult<()> {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            log::warn!("Rejected initialization: invalid sample rate {}", sample_rate);
            return Err(VxError::InvalidSampleRate(sample_rate));
        }
        if channels == 0 || channels > MAX_CHANNELS {
            log::warn!("Rejected initialization: invalid channel count {}", channels);
            return Err(VxError::InvalidChannelCount(channels));
        }
        if sample_rate < MIN_RECOMMENDED_SAMPLE_RATE {
            log::warn!(
                "Sample rate {} Hz is below {} Hz; filter corners may sit near Nyquist",
                sample_rate,
                MIN_RECOMMENDED_SAMPLE_RATE
            );
        }

        let mut state = ProcessorState::new(&self.config, channels, sample_rate);
        for id in ParamId::ALL {
            Self::apply_param(&self.config, &mut state, id, self.params[id.index()]);
        }
        state.makeup.reset();
        state.mix.reset();

        self.state = Some(state);
        self.pending_reset = false;

        log::info!(
            "BusCompressor initialized: {} ch @ {} Hz, latency {} samples",
            channels,
            sample_rate,
            self.latency_samples()
        );
        Ok(())
    }

    /// Release all per-channel state
    pub fn deinitialize(&mut self) {
        if self.state.take().is_some() {
            log::info!("BusCompressor deinitialized");
        }
    }

    /// Set a parameter by its external name
    pub fn set_parameter(&mut self, name: &str, value: f64) -> VxResult<()> {
        let id: ParamId = name.parse()?;
        self.set_param(id, value)
    }

    /// Read a parameter (including meters) by its external name
    pub fn get_parameter(&self, name: &str) -> VxResult<f64> {
        let id: ParamId = name.parse()?;
        Ok(self.get_param(id))
    }

    /// Set a parameter. Values are clamped to the documented range.
    pub fn set_param(&mut self, id: ParamId, value: f64) -> VxResult<()> {
        if id.is_read_only() {
            return Err(VxError::ReadOnlyParameter(id));
        }

        let mut value = id.clamp(value);
        if id == ParamId::Lookahead {
            value = value.round();
        }

        match id {
            ParamId::Bypass => {
                self.set_bypass(value >= 0.5);
                return Ok(());
            }
            ParamId::Compress => {
                // Writes threshold and ratio; a later direct write wins
                let (threshold, ratio) = self.config.compress_curve.map(value / 100.0);
                self.params[ParamId::Threshold.index()] = ParamId::Threshold.clamp(threshold);
                self.params[ParamId::Ratio.index()] = ParamId::Ratio.clamp(ratio);
            }
            _ => {}
        }
        self.params[id.index()] = value;

        if let Some(state) = self.state.as_mut() {
            Self::apply_param(&self.config, state, id, value);
        }
        Ok(())
    }

    pub fn get_param(&self, id: ParamId) -> f64 {
        match id {
            ParamId::Bypass => {
                if self.bypass {
                    1.0
                } else {
                    0.0
                }
            }
            ParamId::GainReductionMeter => self
                .state
                .as_ref()
                .map_or(0.0, |s| id.clamp(s.gr_meter.value())),
            ParamId::OutputLevelMeter => self
                .state
                .as_ref()
                .map_or(id.default_value(), |s| id.clamp(s.output_meter.value_db())),
            _ => self.params[id.index()],
        }
    }

    /// Push one parameter into the running state
    fn apply_param(config: &CompressorConfig, state: &mut ProcessorState, id: ParamId, value: f64) {
        match id {
            ParamId::Compress => {
                let (threshold, ratio) = config.compress_curve.map(value / 100.0);
                let threshold = ParamId::Threshold.clamp(threshold);
                let ratio = ParamId::Ratio.clamp(ratio);
                state.primary.computer.set_threshold(threshold);
                state.primary.computer.set_ratio(ratio);
                Self::sync_stack(state);
            }
            ParamId::Threshold => {
                state.primary.computer.set_threshold(value);
                Self::sync_stack(state);
            }
            ParamId::Ratio => {
                state.primary.computer.set_ratio(value);
                Self::sync_stack(state);
            }
            ParamId::Knee => {
                state.primary.computer.set_knee(value);
                Self::sync_stack(state);
            }
            ParamId::Attack => {
                state.primary.detector.set_attack_ms(value);
                state.stack.set_attack_ms(value);
            }
            ParamId::Release => {
                state.primary.detector.set_release_ms(value);
                state.stack.set_release_ms(value);
            }
            ParamId::Grip => {
                state.primary.detector.set_grip(value / 100.0);
                state.stack.set_grip(value / 100.0);
            }
            ParamId::MakeupGain => state.makeup.set_target(db_to_gain(value)),
            ParamId::Mix => state.mix.set_target(value / 100.0),
            ParamId::Bite => state.saturation.set_amount(value / 100.0),
            ParamId::Stack => state.stack.set_amount(value / 100.0),
            ParamId::GateThreshold => state.gate.set_threshold(value),
            ParamId::Lookahead => {
                let time = if config.lookahead {
                    LookaheadTime::from_index(value)
                } else {
                    LookaheadTime::Off
                };
                state.lookahead.set_time(time);
            }
            // Read in the process loop or owned by the processor itself
            ParamId::AutoMakeup
            | ParamId::Bypass
            | ParamId::GainReductionMeter
            | ParamId::OutputLevelMeter => {}
        }
    }

    fn sync_stack(state: &mut ProcessorState) {
        let computer = state.primary.computer;
        state
            .stack
            .set_primary(computer.threshold_db(), computer.ratio(), computer.knee_db());
    }

    /// Pass-through switch. Any transition resets all recursive state before
    /// the next processed block.
    pub fn set_bypass(&mut self, bypass: bool) {
        if bypass != self.bypass {
            self.bypass = bypass;
            self.pending_reset = true;
            log::debug!("BusCompressor bypass {}", if bypass { "on" } else { "off" });
        }
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Samples of delay the audio path currently adds
    pub fn latency_samples(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.lookahead.delay_samples())
    }

    /// Zero all recursive state, as after `initialize`
    pub fn reset(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.reset();
        }
        self.pending_reset = false;
    }

    fn validate_buffers(&self, lengths: impl Iterator<Item = usize>, count: usize, frames: usize) -> VxResult<()> {
        let state = self.state.as_ref().ok_or(VxError::NotInitialized)?;

        if count != state.channels {
            return Err(VxError::BufferMismatch {
                expected: state.channels,
                got: count,
            });
        }
        if frames > self.config.max_frames {
            return Err(VxError::FrameCountExceeded {
                max: self.config.max_frames,
                got: frames,
            });
        }
        for len in lengths {
            if len < frames {
                return Err(VxError::BufferMismatch {
                    expected: frames,
                    got: len,
                });
            }
        }
        Ok(())
    }

    /// Process `frames` samples from `inputs` into `outputs`.
    ///
    /// Channel counts must match the initialized count. For in-place
    /// processing use [`BusCompressor::process_in_place`].
    pub fn process(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
        frames: usize,
    ) -> VxResult<()> {
        self.validate_buffers(inputs.iter().map(|b| b.len()), inputs.len(), frames)?;
        self.validate_buffers(outputs.iter().map(|b| b.len()), outputs.len(), frames)?;

        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            output[..frames].copy_from_slice(&input[..frames]);
        }

        self.run(outputs, frames);
        Ok(())
    }

    /// Process `frames` samples of each channel buffer in place
    pub fn process_in_place(&mut self, buffers: &mut [&mut [Sample]], frames: usize) -> VxResult<()> {
        self.validate_buffers(buffers.iter().map(|b| b.len()), buffers.len(), frames)?;
        self.run(buffers, frames);
        Ok(())
    }

    fn run(&mut self, buffers: &mut [&mut [Sample]], frames: usize) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        if self.pending_reset {
            state.reset();
            self.pending_reset = false;
        }

        if self.bypass || frames == 0 {
            return;
        }

        let auto_makeup =
            self.config.auto_makeup && self.params[ParamId::AutoMakeup.index()] >= 0.5;
        let track_average = self.config.auto_makeup;

        Self::process_block(state, buffers, frames, auto_makeup, track_average);
    }

    fn process_block(
        state: &mut ProcessorState,
        buffers: &mut [&mut [Sample]],
        frames: usize,
        auto_makeup: bool,
        track_average: bool,
    ) {
        let channels = state.channels;
        let mut frame = [0.0; MAX_CHANNELS];
        let mut detect = [0.0; MAX_CHANNELS];
        let mut block_peak_gr: f64 = 0.0;

        for i in 0..frames {
            for (ch, buffer) in buffers.iter().enumerate().take(channels) {
                frame[ch] = buffer[i];
            }

            for (sample, tube) in frame.iter_mut().zip(state.tube_prestage.iter_mut()) {
                *sample = tube.process_sample(*sample);
            }

            if state.gate.is_active() {
                let level = frame[..channels].iter().map(|x| x.abs()).sum::<f64>() / channels as f64;
                let gate_gain = state.gate.process(level);
                for sample in &mut frame[..channels] {
                    *sample *= gate_gain;
                }
            }

            // Silence is judged on the gated frame before the sidechain
            // filters, which ring on after the input stops
            let raw_peak = frame[..channels].iter().fold(0.0_f64, |p, x| p.max(x.abs()));

            // Detector path
            detect[..channels].copy_from_slice(&frame[..channels]);
            for (sample, filter) in detect.iter_mut().zip(state.sidechain_highpass.iter_mut()) {
                *sample = filter.process_sample(*sample);
            }
            for (sample, filter) in detect.iter_mut().zip(state.sidechain_emphasis.iter_mut()) {
                *sample = filter.process_sample(*sample);
            }
            let level = DetectionLevel::from_frame(&detect[..channels]).with_raw_peak(raw_peak);

            let gr_primary = state.primary.process(level);
            let mut gain = reduction_to_gain(gr_primary);
            let mut gr_total = gr_primary;

            if state.stack.is_active() {
                let gr_stack = state.stack.process(level.scaled(gain));
                gain *= reduction_to_gain(gr_stack) * state.stack.makeup_gain();
                gr_total += gr_stack;
            }
            block_peak_gr = block_peak_gr.max(gr_total);

            let mut makeup = state.makeup.next();
            if track_average {
                state.gr_average.process(gr_total);
                if auto_makeup {
                    makeup *= db_to_gain(state.gr_average.makeup_db());
                }
            }
            let mix = state.mix.next();

            // Audio path: delayed gated signal, also used as the dry tap
            state.lookahead.process_frame(&mut frame[..channels]);

            for (ch, buffer) in buffers.iter_mut().enumerate().take(channels) {
                let dry = frame[ch];
                let wet = state.saturation.process(ch, dry * gain) * makeup;
                buffer[i] = dry * (1.0 - mix) + wet * mix;
            }
        }

        state.gr_meter.update(block_peak_gr);
        let peak = OutputLevelMeter::block_peak(buffers, frames);
        state.output_meter.update(peak, frames, state.sample_rate);
    }
}

impl Processor for BusCompressor {
    fn reset(&mut self) {
        BusCompressor::reset(self);
    }

    fn latency(&self) -> usize {
        self.latency_samples()
    }
}
