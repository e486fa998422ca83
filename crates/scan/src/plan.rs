use std::fmt;

use thiserror::Error;

use crate::config::ScanConfig;
use ps_sdr::Frequency;

/// Largest FFT is 2^16 points
pub const FFT_MAX_BITS: u32 = 16;
pub const MAX_FFT_SIZE: usize = 1 << FFT_MAX_BITS;
pub const MIN_FFT_SIZE: usize = 4;

/// Maximum number of I/Q pairs requested per stream read
pub const MAX_READ_PAIRS: usize = 1 << FFT_MAX_BITS;

/// Minimum time on each tuning, in microseconds
pub const MIN_DWELL_US: i64 = 100_000;

/// Cropping more than this just doesn't make sense
pub const MAX_CROP_RATIO: f64 = 0.6;

/// What we learned about the device after opening it.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub channel_count: usize,
    pub sample_rates: Vec<f64>,
    pub native_format: String,
    pub full_scale: f64,
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("no start frequency was given")]
    MissingStartFrequency,

    #[error("device reports no usable sample rate (cap {cap} Hz)")]
    NoUsableSampleRate { cap: Frequency },
}

/// The fully computed shape of one sweep: how the band is partitioned into
/// tunings, how long to dwell on each, and the FFT geometry. Immutable once
/// planned.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub sample_rate: f64,
    pub start_frequency: Frequency,
    pub end_frequency: Frequency,
    pub frequency_resolution: Frequency,
    pub crop_ratio: f64,

    /// Usable bandwidth contributed by one tuning, after cropping
    pub tuning_bandwidth: Frequency,
    /// Centre frequency of the first tuning
    pub tuning_start: Frequency,
    pub tuning_count: u32,
    pub dwell_time_us: i64,

    pub fft_size: usize,
    /// Length of the accumulated spectrum across the whole scan
    pub power_buckets: usize,
}

/// Work out how to conduct the scan. Pure: all device calls happened while
/// gathering `DeviceInfo`, and all logging of the result is up to the caller.
pub fn plan_scan(config: &ScanConfig, device: &DeviceInfo) -> Result<ScanPlan, PlanError> {
    let crop_ratio = config.crop_ratio.clamp(0.0, MAX_CROP_RATIO);

    if config.start_frequency <= 0 {
        return Err(PlanError::MissingStartFrequency);
    }

    // Highest supported rate not above the requested cap
    let cap = config.requested_sample_rate_cap;
    let mut sample_rate = 0.0f64;
    for &rate in &device.sample_rates {
        if rate > sample_rate && (cap == 0 || rate <= cap as f64) {
            sample_rate = rate;
        }
    }
    if sample_rate <= 0.0 {
        return Err(PlanError::NoUsableSampleRate { cap });
    }

    let mut start_frequency = config.start_frequency;
    let mut end_frequency = config.end_frequency;
    if end_frequency > 0 && end_frequency <= start_frequency {
        log::warn!("ignoring end frequency below start frequency");
        end_frequency = 0;
    }
    if end_frequency <= 0 {
        // Centre around the start frequency at maximum usable bandwidth
        let default_bandwidth = (sample_rate * (1.0 - crop_ratio)) as Frequency;
        end_frequency = start_frequency + default_bandwidth / 2;
        start_frequency = end_frequency - default_bandwidth;
    }

    let mut frequency_resolution = config.frequency_resolution;
    if frequency_resolution != 0
        && (sample_rate / frequency_resolution as f64).floor() > MAX_FFT_SIZE as f64
    {
        log::warn!(
            "requested frequency resolution is too small, using {}",
            (sample_rate / MAX_FFT_SIZE as f64).floor() as Frequency
        );
        frequency_resolution = 0;
    }
    if frequency_resolution == 0 {
        frequency_resolution = (sample_rate / MAX_FFT_SIZE as f64).floor() as Frequency;
        if frequency_resolution == 0 {
            frequency_resolution = 1;
        }
    }

    // Overscan at each end by half the crop amount
    let total_scan =
        end_frequency - start_frequency + (crop_ratio * sample_rate).floor() as Frequency;
    let tuning_bandwidth = (sample_rate * (1.0 - crop_ratio)).ceil() as Frequency;
    let tuning_start = start_frequency + tuning_bandwidth / 2;
    let tuning_count = (total_scan as f64 / tuning_bandwidth as f64).ceil() as u32;

    let mut dwell_time_us = 1_000_000i64 * config.scan_time_s as i64 / tuning_count as i64;
    if dwell_time_us < MIN_DWELL_US {
        dwell_time_us = MIN_DWELL_US;
    }

    // The resolution decides the FFT size, rounded up to a power of two,
    // then the actual resolution is recomputed from the size chosen.
    let samples_per_fft = (sample_rate / frequency_resolution as f64) as usize;
    let fft_size = samples_per_fft
        .next_power_of_two()
        .clamp(MIN_FFT_SIZE, MAX_FFT_SIZE);
    let frequency_resolution = ((sample_rate / fft_size as f64) as Frequency).max(1);

    let power_buckets = ((end_frequency - start_frequency + frequency_resolution - 1)
        / frequency_resolution) as usize;

    Ok(ScanPlan {
        sample_rate,
        start_frequency,
        end_frequency,
        frequency_resolution,
        crop_ratio,
        tuning_bandwidth,
        tuning_start,
        tuning_count,
        dwell_time_us,
        fft_size,
        power_buckets,
    })
}

impl ScanPlan {
    /// One-line report of the planned sweep, for the startup log.
    pub fn summary(&self, repetition_limit: u32) -> String {
        let repetitions = if repetition_limit == 0 {
            "continuously".to_string()
        } else if repetition_limit == 1 {
            "once".to_string()
        } else {
            format!("{} times", repetition_limit)
        };
        format!(
            "scan {} from {} to {} (covering {}Hz in steps of {}Hz) \
             in {} tuning{} at {}sps using {}Hz lasting {}ms each",
            repetitions,
            self.start_frequency,
            self.end_frequency,
            self.end_frequency - self.start_frequency,
            self.frequency_resolution,
            self.tuning_count,
            if self.tuning_count == 1 { "" } else { "s" },
            self.sample_rate,
            self.tuning_bandwidth,
            self.dwell_time_us / 1000,
        )
    }
}

impl fmt::Display for ScanPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate {} / fft {} / resolution {}Hz / {} buckets",
            self.sample_rate, self.fft_size, self.frequency_resolution, self.power_buckets
        )
    }
}
