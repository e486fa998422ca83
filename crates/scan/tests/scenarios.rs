//! End-to-end sweeps against the deterministic mock receiver.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ps_scan::{plan_scan, DeviceInfo, ScanConfig, SpectrumAccumulator, SweepOutcome, SweepRunner};
use ps_sdr::mock::{MockRadio, MockSignal};
use ps_sdr::{Frequency, Radio};

fn device(rates: &[f64]) -> DeviceInfo {
    DeviceInfo {
        channel_count: 1,
        sample_rates: rates.to_vec(),
        native_format: "CS16".to_string(),
        full_scale: 32767.0,
    }
}

/// Single tuning, no crop, fft_size 8192: the whole band in one dwell.
#[test]
fn scenario_single_tuning_no_crop() {
    let rate = 8_192_000.0;
    let cfg = ScanConfig {
        start_frequency: 100_000_000,
        end_frequency: 100_000_000 + rate as Frequency,
        frequency_resolution: 1000,
        crop_ratio: 0.0,
        scan_time_s: 1,
        repetition_limit: 1,
        ..ScanConfig::default()
    };
    let plan = plan_scan(&cfg, &device(&[rate])).unwrap();
    assert_eq!(plan.tuning_count, 1);
    assert_eq!(plan.fft_size, 8192);
    assert_eq!(plan.power_buckets, 8192);

    let mut radio = MockRadio::new(&[rate], MockSignal::Silence);
    radio.start_stream(0).unwrap();
    let spectrum = SpectrumAccumulator::shared(&plan);
    let signals = Arc::new(AtomicUsize::new(0));

    let outcome =
        SweepRunner::new(&mut radio, &plan, 0, Arc::clone(&spectrum), signals).run(1);
    assert_eq!(outcome, SweepOutcome::Completed);

    let acc = spectrum.read().unwrap();
    assert!(acc.accumulation_count() >= 1, "no frames were accumulated");
    assert_eq!(radio.retunes, vec![plan.tuning_start]);
}

/// Several tunings with crop: centres step by the cropped bandwidth and the
/// retained spans tile the band without double-counting.
#[test]
fn scenario_cropped_tunings_tile_without_overlap() {
    let rate = 8_192_000.0;
    let cfg = ScanConfig {
        start_frequency: 100_000_000,
        end_frequency: 100_000_000 + (1.5 * rate) as Frequency,
        frequency_resolution: 1000,
        crop_ratio: 0.25,
        scan_time_s: 1,
        repetition_limit: 1,
        ..ScanConfig::default()
    };
    let plan = plan_scan(&cfg, &device(&[rate])).unwrap();
    assert!(plan.tuning_count >= 2);
    assert_eq!(plan.tuning_bandwidth, 6_144_000);

    let mut radio = MockRadio::new(&[rate], MockSignal::Constant { i: 16384, q: 0 });
    radio.start_stream(0).unwrap();
    let spectrum = SpectrumAccumulator::shared(&plan);
    let signals = Arc::new(AtomicUsize::new(0));

    let outcome =
        SweepRunner::new(&mut radio, &plan, 0, Arc::clone(&spectrum), signals).run(1);
    assert_eq!(outcome, SweepOutcome::Completed);

    // Tuning centres march up in steps of the cropped bandwidth
    let expected: Vec<Frequency> = (0..plan.tuning_count as Frequency)
        .map(|i| plan.tuning_start + i * plan.tuning_bandwidth)
        .collect();
    assert_eq!(radio.retunes, expected);

    let acc = spectrum.read().unwrap();

    // Each dwell reads whole 65536-pair blocks until the block timestamps
    // pass the deadline, and every block is a whole number of FFT frames.
    let block_us = (65536.0 / rate * 1e6) as i64;
    let blocks_per_dwell = (plan.dwell_time_us + block_us - 1) / block_us;
    let frames_per_tuning = blocks_per_dwell as u64 * (65536 / plan.fft_size as u64);
    // The last tuning's retained band overruns the top of the spectrum, so
    // only the first two tunings land in the accumulation.
    assert_eq!(acc.accumulation_count(), 2 * frames_per_tuning);

    // The constant carrier leaks into the buckets beside each tuning centre.
    // If any bucket were fed by two tunings it would hold twice this much.
    let single_tuning_peak = frames_per_tuning as f32 * 0.25 * 0.5 * plan.fft_size as f32;
    let carrier_peak = acc.power().iter().cloned().fold(0.0f32, f32::max);
    assert!(
        carrier_peak > 0.8 * single_tuning_peak && carrier_peak < 1.2 * single_tuning_peak,
        "peak {} outside the single-tuning envelope {}",
        carrier_peak,
        single_tuning_peak
    );
}

/// Continuous scan, one interrupt: the sweep in progress completes, then the
/// outer loop exits cleanly.
#[test]
fn scenario_interrupt_finishes_current_sweep() {
    let rate = 1_024_000.0;
    let cfg = ScanConfig {
        start_frequency: 100_000_000,
        end_frequency: 100_000_000 + 3 * rate as Frequency,
        frequency_resolution: 1000,
        crop_ratio: 0.0,
        scan_time_s: 1,
        repetition_limit: 0,
        ..ScanConfig::default()
    };
    let plan = plan_scan(&cfg, &device(&[rate])).unwrap();
    assert_eq!(plan.tuning_count, 3);

    let signals = Arc::new(AtomicUsize::new(0));
    let hook_signals = Arc::clone(&signals);
    // One Ctrl-C partway through the first tuning's dwell
    let mut radio = MockRadio::new(&[rate], MockSignal::Silence).with_read_hook(move |n| {
        if n == 3 {
            hook_signals.fetch_add(1, Ordering::Relaxed);
        }
    });
    radio.start_stream(0).unwrap();

    let spectrum = SpectrumAccumulator::shared(&plan);
    let outcome =
        SweepRunner::new(&mut radio, &plan, 0, Arc::clone(&spectrum), Arc::clone(&signals))
            .run(0);

    assert_eq!(outcome, SweepOutcome::Finished);
    assert_eq!(
        radio.retunes.len(),
        3,
        "the sweep under way should have visited every tuning exactly once"
    );
    assert!(spectrum.read().unwrap().accumulation_count() > 0);
}

/// A second interrupt abandons the tuning and returns immediately.
#[test]
fn scenario_second_interrupt_aborts() {
    let rate = 1_024_000.0;
    let cfg = ScanConfig {
        start_frequency: 100_000_000,
        end_frequency: 100_000_000 + 3 * rate as Frequency,
        frequency_resolution: 1000,
        crop_ratio: 0.0,
        scan_time_s: 1,
        repetition_limit: 0,
        ..ScanConfig::default()
    };
    let plan = plan_scan(&cfg, &device(&[rate])).unwrap();
    assert_eq!(plan.tuning_count, 3);

    let signals = Arc::new(AtomicUsize::new(0));
    let hook_signals = Arc::clone(&signals);
    // Two rapid Ctrl-Cs inside the first tuning's dwell
    let mut radio = MockRadio::new(&[rate], MockSignal::Silence).with_read_hook(move |n| {
        if n == 3 {
            hook_signals.fetch_add(2, Ordering::Relaxed);
        }
    });
    radio.start_stream(0).unwrap();

    let spectrum = SpectrumAccumulator::shared(&plan);
    let outcome =
        SweepRunner::new(&mut radio, &plan, 0, Arc::clone(&spectrum), Arc::clone(&signals))
            .run(0);

    assert_eq!(outcome, SweepOutcome::Aborted);
    assert_eq!(
        radio.retunes.len(),
        1,
        "the remaining tunings should never be visited"
    );
}

/// A tone 1 kHz above the tuning centre ends up in the bucket for
/// centre + 1 kHz, and that bucket holds the sweep's largest value.
#[test]
fn scenario_tone_detection() {
    let rate = 1_024_000.0;
    let cfg = ScanConfig {
        start_frequency: 100_000_000,
        end_frequency: 100_000_000 + rate as Frequency,
        frequency_resolution: 1000,
        crop_ratio: 0.0,
        scan_time_s: 1,
        repetition_limit: 1,
        ..ScanConfig::default()
    };
    let plan = plan_scan(&cfg, &device(&[rate])).unwrap();
    assert_eq!(plan.tuning_count, 1);
    assert_eq!(plan.frequency_resolution, 1000);

    let mut radio = MockRadio::new(
        &[rate],
        MockSignal::Tone {
            offset_hz: 1000.0,
            amplitude: 0.5,
        },
    );
    radio.start_stream(0).unwrap();
    let spectrum = SpectrumAccumulator::shared(&plan);
    let signals = Arc::new(AtomicUsize::new(0));

    let outcome =
        SweepRunner::new(&mut radio, &plan, 0, Arc::clone(&spectrum), signals).run(1);
    assert_eq!(outcome, SweepOutcome::Completed);

    let acc = spectrum.read().unwrap();
    assert!(acc.accumulation_count() > 0);

    let tone_frequency = plan.tuning_start + 1000;
    let expected_bucket =
        ((tone_frequency - plan.start_frequency) / plan.frequency_resolution) as usize;
    let peak_bucket = acc
        .power()
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
        .map(|(i, _)| i)
        .unwrap();
    assert_eq!(
        peak_bucket, expected_bucket,
        "tone expected in bucket {} but the peak is in {}",
        expected_bucket, peak_bucket
    );
}
