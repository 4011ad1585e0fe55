//! Pipeline scenario tests
//!
//! Drives the complete `BusCompressor` through its host-facing interface:
//! - steady-state gain reduction against the static curve
//! - bypass round-trip and state reset
//! - stacking identity and compounding
//! - look-ahead alignment
//! - gate, saturation, makeup and mix behaviour

use std::f64::consts::PI;

use approx::assert_abs_diff_eq;
use vx_core::{ParamId, Sample, db_to_gain, ms_to_samples};
use vx_dsp::{BusCompressor, CompressorConfig};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZE: usize = 512;

fn generate_sine(samples: usize, freq: f64, amplitude: f64) -> Vec<f64> {
    (0..samples)
        .map(|i| amplitude * (2.0 * PI * freq * i as f64 / SAMPLE_RATE).sin())
        .collect()
}

fn generate_noise(samples: usize, seed: u64, amplitude: f64) -> Vec<f64> {
    let mut state = seed;
    (0..samples)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            amplitude * ((state as f64 / u64::MAX as f64) * 2.0 - 1.0)
        })
        .collect()
}

fn rms(signal: &[f64]) -> f64 {
    (signal.iter().map(|x| x * x).sum::<f64>() / signal.len() as f64).sqrt()
}

/// Run every channel through `comp` in blocks of `block`
fn process_all(comp: &mut BusCompressor, input: &[Vec<f64>], block: usize) -> Vec<Vec<f64>> {
    let len = input[0].len();
    let mut output: Vec<Vec<f64>> = input.iter().map(|c| vec![0.0; c.len()]).collect();

    let mut start = 0;
    while start < len {
        let n = block.min(len - start);
        let ins: Vec<&[Sample]> = input.iter().map(|c| &c[start..start + n]).collect();
        let mut outs: Vec<&mut [Sample]> =
            output.iter_mut().map(|c| &mut c[start..start + n]).collect();
        comp.process(&ins, &mut outs, n).unwrap();
        start += n;
    }

    output
}

fn stereo(signal: Vec<f64>) -> Vec<Vec<f64>> {
    vec![signal.clone(), signal]
}

/// Compressor with the reference settings: −20 dB, 4:1, 3 dB knee,
/// 10 ms / 100 ms, no saturation
fn reference_compressor(grip: f64) -> BusCompressor {
    let mut comp = BusCompressor::new();
    comp.set_parameter("threshold", -20.0).unwrap();
    comp.set_parameter("ratio", 4.0).unwrap();
    comp.set_parameter("knee", 3.0).unwrap();
    comp.set_parameter("attack", 10.0).unwrap();
    comp.set_parameter("release", 100.0).unwrap();
    comp.set_parameter("grip", grip).unwrap();
    comp.set_parameter("bite", 0.0).unwrap();
    comp.initialize(2, SAMPLE_RATE).unwrap();
    comp
}

/// Unity-gain path: no compression, saturation or makeup
fn clean_compressor(channels: usize) -> BusCompressor {
    let mut comp = BusCompressor::new();
    comp.set_param(ParamId::Compress, 0.0).unwrap();
    comp.set_param(ParamId::Bite, 0.0).unwrap();
    comp.initialize(channels, SAMPLE_RATE).unwrap();
    comp
}

/// Every stage engaged
fn full_compressor() -> BusCompressor {
    let mut comp = BusCompressor::new();
    for (name, value) in [
        ("threshold", -24.0),
        ("ratio", 6.0),
        ("attack", 5.0),
        ("release", 80.0),
        ("grip", 40.0),
        ("bite", 60.0),
        ("stack", 40.0),
        ("lookahead", 1.0),
        ("gateThreshold", -60.0),
        ("makeupGain", 3.0),
        ("mix", 80.0),
        ("autoMakeup", 1.0),
    ] {
        comp.set_parameter(name, value).unwrap();
    }
    comp.initialize(2, SAMPLE_RATE).unwrap();
    comp
}

// ═══════════════════════════════════════════════════════════════════════════════
// GAIN COMPUTER
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_end_to_end_peak_gain_reduction() {
    let mut comp = reference_compressor(100.0);
    let input = stereo(generate_sine(48000, 1000.0, 1.0));
    process_all(&mut comp, &input, BLOCK_SIZE);

    // (0 − (−20)) · (1 − 1/4). The 15 dB figure needs peak detection;
    // the product default grip of 0 settles lower, see the RMS case below.
    let gr = comp.get_parameter("gainReductionMeter").unwrap();
    assert_abs_diff_eq!(gr, 15.0, epsilon = 0.5);
}

#[test]
fn test_end_to_end_rms_gain_reduction() {
    let mut comp = reference_compressor(0.0);
    let input = stereo(generate_sine(48000, 1000.0, 1.0));
    process_all(&mut comp, &input, BLOCK_SIZE);

    // Default grip: the detector sees the sine's RMS, 3 dB under its peak,
    // so the reference scenario reads about 12.76 dB instead of 15 dB
    let over_db = 20.0 * (1.0 / 2.0_f64.sqrt()).log10() + 20.0;
    let expected = over_db * (1.0 - 1.0 / 4.0);
    let gr = comp.get_parameter("gainReductionMeter").unwrap();
    assert_abs_diff_eq!(gr, expected, epsilon = 0.3);
}

#[test]
fn test_output_level_tracks_compression() {
    let mut comp = reference_compressor(100.0);
    let input = stereo(generate_sine(48000, 1000.0, 1.0));
    let output = process_all(&mut comp, &input, BLOCK_SIZE);

    let out_db = 20.0 * (rms(&output[0][24000..]) / rms(&input[0][24000..])).log10();
    assert_abs_diff_eq!(out_db, -15.0, epsilon = 0.5);

    let meter = comp.get_parameter("outputLevelMeter").unwrap();
    assert_abs_diff_eq!(meter, -15.0, epsilon = 0.5);
}

#[test]
fn test_below_threshold_is_untouched() {
    let mut comp = reference_compressor(100.0);
    let input = stereo(generate_sine(48000, 1000.0, 0.05));
    let output = process_all(&mut comp, &input, BLOCK_SIZE);

    assert_eq!(comp.get_param(ParamId::GainReductionMeter), 0.0);
    for (x, y) in input[0].iter().zip(&output[0]) {
        assert_abs_diff_eq!(x, y, epsilon = 1e-12);
    }
}

#[test]
fn test_compress_knob_increases_reduction() {
    let input = stereo(generate_sine(24000, 1000.0, 0.5));
    let mut previous = -1.0;

    for amount in [0.0, 25.0, 50.0, 75.0, 100.0] {
        let mut comp = BusCompressor::new();
        comp.set_parameter("compress", amount).unwrap();
        comp.set_parameter("bite", 0.0).unwrap();
        comp.initialize(2, SAMPLE_RATE).unwrap();
        process_all(&mut comp, &input, BLOCK_SIZE);

        let gr = comp.get_parameter("gainReductionMeter").unwrap();
        assert!(gr > previous, "compress {amount}: {gr} dB");
        previous = gr;
    }
}

#[test]
fn test_stereo_link() {
    let mut comp = reference_compressor(100.0);
    let loud = generate_sine(48000, 1000.0, 1.0);
    let quiet = generate_sine(48000, 1000.0, 0.01);
    let output = process_all(&mut comp, &[loud, quiet.clone()], BLOCK_SIZE);

    // The quiet channel is reduced by the loud channel's detector level
    let ratio_db = 20.0 * (rms(&output[1][24000..]) / rms(&quiet[24000..])).log10();
    assert_abs_diff_eq!(ratio_db, -15.0, epsilon = 0.5);
}

// ═══════════════════════════════════════════════════════════════════════════════
// BYPASS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_bypass_passes_input_through() {
    let mut comp = full_compressor();
    let warmup = stereo(generate_noise(24000, 7, 0.8));
    process_all(&mut comp, &warmup, BLOCK_SIZE);

    comp.set_bypass(true);
    let input = stereo(generate_noise(BLOCK_SIZE, 11, 0.8));
    let output = process_all(&mut comp, &input, BLOCK_SIZE);
    assert_eq!(output, input);
}

#[test]
fn test_bypass_round_trip_matches_fresh_instance() {
    let mut comp = full_compressor();
    let warmup = stereo(generate_noise(24000, 3, 0.9));
    process_all(&mut comp, &warmup, BLOCK_SIZE);

    comp.set_bypass(true);
    process_all(&mut comp, &warmup, BLOCK_SIZE);
    comp.set_bypass(false);

    let mut fresh = full_compressor();

    let input = stereo(generate_sine(4 * BLOCK_SIZE, 220.0, 0.9));
    let resumed = process_all(&mut comp, &input, BLOCK_SIZE);
    let expected = process_all(&mut fresh, &input, BLOCK_SIZE);
    assert_eq!(resumed, expected);
}

#[test]
fn test_reset_matches_fresh_instance() {
    let mut comp = full_compressor();
    process_all(&mut comp, &stereo(generate_noise(12000, 5, 1.0)), BLOCK_SIZE);
    comp.reset();

    let mut fresh = full_compressor();
    let input = stereo(generate_noise(2048, 9, 0.5));
    assert_eq!(
        process_all(&mut comp, &input, BLOCK_SIZE),
        process_all(&mut fresh, &input, BLOCK_SIZE)
    );
}

// ═══════════════════════════════════════════════════════════════════════════════
// STACKING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_stack_zero_matches_stacking_disabled() {
    let mut stacked = reference_compressor(50.0);
    stacked.set_parameter("stack", 0.0).unwrap();

    let mut disabled = BusCompressor::with_config(CompressorConfig {
        stacking: false,
        ..CompressorConfig::default()
    });
    for id in [ParamId::Threshold, ParamId::Ratio, ParamId::Knee, ParamId::Attack, ParamId::Release] {
        disabled.set_param(id, stacked.get_param(id)).unwrap();
    }
    disabled.set_param(ParamId::Grip, 50.0).unwrap();
    disabled.set_param(ParamId::Bite, 0.0).unwrap();
    disabled.initialize(2, SAMPLE_RATE).unwrap();

    let input = stereo(generate_noise(24000, 21, 1.0));
    assert_eq!(
        process_all(&mut stacked, &input, BLOCK_SIZE),
        process_all(&mut disabled, &input, BLOCK_SIZE)
    );
}

#[test]
fn test_stack_compounds_reduction() {
    let input = stereo(generate_sine(48000, 1000.0, 1.0));

    let mut single = reference_compressor(100.0);
    process_all(&mut single, &input, BLOCK_SIZE);
    let single_gr = single.get_param(ParamId::GainReductionMeter);

    for amount in [25.0, 50.0, 100.0] {
        let mut stacked = reference_compressor(100.0);
        stacked.set_parameter("stack", amount).unwrap();
        process_all(&mut stacked, &input, BLOCK_SIZE);
        let stacked_gr = stacked.get_param(ParamId::GainReductionMeter);
        assert!(
            stacked_gr > single_gr + 0.5,
            "stack {amount}: {stacked_gr} dB vs {single_gr} dB"
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOOK-AHEAD
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_lookahead_impulse_alignment() {
    for (step, delay) in [(1.0, 96), (2.0, 240), (3.0, 480)] {
        let mut comp = clean_compressor(2);
        comp.set_parameter("lookahead", step).unwrap();
        assert_eq!(comp.latency_samples(), delay);

        let k = 1000;
        let mut impulse = vec![0.0; 4096];
        impulse[k] = 1.0;
        let output = process_all(&mut comp, &stereo(impulse), BLOCK_SIZE);

        for (i, &y) in output[0].iter().enumerate() {
            let expected = if i == k + delay { 1.0 } else { 0.0 };
            assert_eq!(y, expected, "step {step} sample {i}");
        }
    }
}

#[test]
fn test_lookahead_reduces_before_transient() {
    let k = 2000;
    let delay = 480;
    let mut burst = vec![0.0; 8192];
    for (i, sample) in burst.iter_mut().enumerate().skip(k) {
        *sample = (2.0 * PI * 1000.0 * (i - k) as f64 / SAMPLE_RATE).cos();
    }
    let input = stereo(burst);

    let mut plain = reference_compressor(0.0);
    let without = process_all(&mut plain, &input, BLOCK_SIZE);

    let mut ahead = reference_compressor(0.0);
    ahead.set_parameter("lookahead", 3.0).unwrap();
    let with = process_all(&mut ahead, &input, BLOCK_SIZE);

    assert!(with[0][..k + delay].iter().all(|&x| x == 0.0));
    // The detector has been reacting for `delay` samples by the time the
    // transient reaches the output
    assert!(with[0][k + delay].abs() < 0.8 * without[0][k].abs());
}

// ═══════════════════════════════════════════════════════════════════════════════
// GATE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_gate_silences_noise_floor() {
    let mut comp = clean_compressor(2);
    comp.set_parameter("gateThreshold", -40.0).unwrap();

    let hiss = stereo(generate_noise(24000, 13, 0.001));
    let output = process_all(&mut comp, &hiss, BLOCK_SIZE);
    assert!(output.iter().flatten().all(|&x| x == 0.0));
}

#[test]
fn test_gate_opens_and_releases() {
    let mut comp = clean_compressor(1);
    comp.set_parameter("gateThreshold", -40.0).unwrap();

    let mut signal = generate_sine(4800, 1000.0, 0.5);
    signal.extend(generate_noise(48000, 17, 0.001));
    let output = process_all(&mut comp, &[signal.clone()], BLOCK_SIZE);

    // Open: the tone passes unchanged once the gate has opened
    for i in 100..4800 {
        assert_abs_diff_eq!(output[0][i], signal[i], epsilon = 1e-12);
    }
    // Released: the hiss is gone long after hold and fade
    let tail = &output[0][40000..];
    assert!(rms(tail) < 0.01 * rms(&signal[40000..]));
}

#[test]
fn test_gate_off_at_floor() {
    let mut comp = clean_compressor(1);
    comp.set_parameter("gateThreshold", -80.0).unwrap();
    let hiss = vec![generate_noise(4096, 19, 0.001)];
    assert_eq!(process_all(&mut comp, &hiss, BLOCK_SIZE), hiss);
}

// ═══════════════════════════════════════════════════════════════════════════════
// METERING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_gr_meter_clears_on_silence() {
    let mut comp = reference_compressor(100.0);
    process_all(&mut comp, &stereo(generate_sine(48000, 1000.0, 1.0)), BLOCK_SIZE);
    assert!(comp.get_param(ParamId::GainReductionMeter) > 14.0);

    // The first silent block still carries the release before the detector
    // resets; the next one reads zero
    let silence = stereo(vec![0.0; BLOCK_SIZE]);
    process_all(&mut comp, &silence, BLOCK_SIZE);
    process_all(&mut comp, &silence, BLOCK_SIZE);
    assert_eq!(comp.get_param(ParamId::GainReductionMeter), 0.0);
}

#[test]
fn test_silence_reset_ignores_sidechain_ringing() {
    assert!(CompressorConfig::default().sidechain_highpass);
    let mut comp = reference_compressor(100.0);
    process_all(&mut comp, &stereo(generate_sine(48000, 1000.0, 1.0)), BLOCK_SIZE);

    // Detector hold, then one more sample that must carry no reduction
    let hold = ms_to_samples(CompressorConfig::default().detector.silence_hold_ms, SAMPLE_RATE);
    process_all(&mut comp, &stereo(vec![0.0; hold]), BLOCK_SIZE);
    process_all(&mut comp, &stereo(vec![0.0; 1]), BLOCK_SIZE);
    assert_eq!(comp.get_param(ParamId::GainReductionMeter), 0.0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SATURATION, MAKEUP, MIX
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_clean_path_is_transparent() {
    let mut comp = clean_compressor(2);
    let input = stereo(generate_noise(8192, 23, 1.0));
    assert_eq!(process_all(&mut comp, &input, BLOCK_SIZE), input);
}

#[test]
fn test_bite_keeps_loudness() {
    let input = stereo(generate_sine(48000, 1000.0, 0.5));
    let input_rms = rms(&input[0][24000..]);

    for bite in [10.0, 25.0, 50.0, 75.0, 100.0] {
        let mut comp = clean_compressor(2);
        comp.set_parameter("bite", bite).unwrap();
        let output = process_all(&mut comp, &input, BLOCK_SIZE);

        let diff_db = 20.0 * (rms(&output[0][24000..]) / input_rms).log10();
        assert!(diff_db.abs() < 1.0, "bite {bite}: {diff_db:.2} dB");
        assert_ne!(output, input);
    }
}

#[test]
fn test_makeup_gain_settles() {
    let mut comp = clean_compressor(1);
    comp.set_parameter("makeupGain", 6.0).unwrap();

    let input = vec![generate_sine(48000, 500.0, 0.25)];
    let output = process_all(&mut comp, &input, BLOCK_SIZE);

    let gain = db_to_gain(6.0);
    for i in 47000..48000 {
        assert_abs_diff_eq!(output[0][i], input[0][i] * gain, epsilon = 1e-9);
    }
    // Smoothed, not stepped
    assert!(output[0][12].abs() < input[0][12].abs() * gain);
}

#[test]
fn test_zero_mix_returns_dry_signal() {
    let mut comp = reference_compressor(100.0);
    comp.set_parameter("bite", 100.0).unwrap();
    comp.set_parameter("mix", 0.0).unwrap();
    comp.initialize(2, SAMPLE_RATE).unwrap();

    let input = stereo(generate_sine(48000, 1000.0, 1.0));
    let output = process_all(&mut comp, &input, BLOCK_SIZE);
    assert_eq!(output, input);
    assert!(comp.get_param(ParamId::GainReductionMeter) > 10.0);
}

#[test]
fn test_auto_makeup_restores_level() {
    let input = stereo(generate_sine(48000, 1000.0, 1.0));

    let mut manual = reference_compressor(100.0);
    let manual_out = process_all(&mut manual, &input, BLOCK_SIZE);

    let mut auto = reference_compressor(100.0);
    auto.set_parameter("autoMakeup", 1.0).unwrap();
    let auto_out = process_all(&mut auto, &input, BLOCK_SIZE);

    // 80 % of ~15 dB is restored
    let diff_db = 20.0 * (rms(&auto_out[0][24000..]) / rms(&manual_out[0][24000..])).log10();
    assert_abs_diff_eq!(diff_db, 12.0, epsilon = 0.6);
}

#[test]
fn test_tube_prestage_colours_signal() {
    let mut comp = BusCompressor::with_config(CompressorConfig {
        tube_prestage: Some(vx_dsp::saturation::TubeCharacter::Heavy),
        ..CompressorConfig::default()
    });
    comp.set_param(ParamId::Compress, 0.0).unwrap();
    comp.set_param(ParamId::Bite, 0.0).unwrap();
    comp.initialize(2, SAMPLE_RATE).unwrap();

    let input = stereo(generate_sine(24000, 200.0, 0.5));
    let output = process_all(&mut comp, &input, BLOCK_SIZE);
    assert!(output.iter().flatten().all(|x| x.is_finite()));
    assert_ne!(output, input);
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROBUSTNESS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_finite_across_parameter_space() {
    let mut state: u64 = 0x5eed;
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 11) as f64 / (1u64 << 53) as f64
    };

    let writable: Vec<ParamId> = ParamId::ALL
        .into_iter()
        .filter(|id| !id.is_read_only() && *id != ParamId::Bypass)
        .collect();

    let input = stereo(generate_noise(4096, 29, 1.0));
    let mut loud = generate_sine(4096, 60.0, 1.0);
    loud.iter_mut().skip(2048).for_each(|x| *x = 0.0);
    let bursts = stereo(loud);

    for trial in 0..40 {
        let mut comp = BusCompressor::new();
        for &id in &writable {
            let range = id.spec().range;
            let value = match trial {
                0 => range.min,
                1 => range.max,
                _ => range.min + next() * (range.max - range.min),
            };
            comp.set_param(id, value).unwrap();
        }
        comp.initialize(2, SAMPLE_RATE).unwrap();

        for signal in [&input, &bursts] {
            let output = process_all(&mut comp, signal, 256);
            assert!(
                output.iter().flatten().all(|x| x.is_finite()),
                "non-finite output in trial {trial}"
            );
        }
        let gr = comp.get_param(ParamId::GainReductionMeter);
        assert!(gr.is_finite() && (0.0..=60.0).contains(&gr));
    }
}

#[test]
fn test_block_size_does_not_change_audio() {
    let input = stereo(generate_noise(6000, 31, 0.9));

    let mut reference = full_compressor();
    let expected = process_all(&mut reference, &input, 4096);

    for block in [1, 7, 64, 333] {
        let mut comp = full_compressor();
        assert_eq!(process_all(&mut comp, &input, block), expected, "block {block}");
    }
}

#[test]
fn test_supported_sample_rates() {
    for fs in [8000.0, 22050.0, 44100.0, 96000.0, 192000.0] {
        let mut comp = BusCompressor::new();
        comp.set_parameter("grip", 100.0).unwrap();
        comp.set_parameter("bite", 0.0).unwrap();
        comp.initialize(2, fs).unwrap();

        let n = fs as usize;
        let tone: Vec<f64> = (0..n)
            .map(|i| (2.0 * PI * 1000.0 * i as f64 / fs).sin())
            .collect();
        let output = process_all(&mut comp, &stereo(tone), 1024);
        assert!(output.iter().flatten().all(|x| x.is_finite()));

        let gr = comp.get_param(ParamId::GainReductionMeter);
        assert_abs_diff_eq!(gr, 15.0, epsilon = 1.0);
    }
}
