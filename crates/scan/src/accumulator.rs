use std::sync::{Arc, RwLock};

use crate::plan::ScanPlan;
use ps_sdr::Frequency;

/// The accumulator behind the lock shared with the web publisher. The sweep
/// loop holds the write lock only while adding one frame; readers copy.
pub type SharedSpectrum = Arc<RwLock<SpectrumAccumulator>>;

/// Power accumulated over the entire scan, all tunings and repetitions.
///
/// One bucket per `frequency_resolution` Hz across
/// `[start_frequency, end_frequency)`. Each FFT frame contributes the bins
/// inside its tuning's retained bandwidth, translated from FFT bin order
/// (DC first, then positive offsets, then negative) to monotonically
/// increasing absolute frequency. The DC bin is discarded: it is contaminated
/// by the receiver LO, so the bucket at a tuning's exact centre receives
/// nothing from that tuning.
#[derive(Debug)]
pub struct SpectrumAccumulator {
    start_frequency: Frequency,
    frequency_resolution: Frequency,
    tuning_bandwidth: Frequency,
    fft_size: usize,
    power: Vec<f32>,
    accumulation_count: u64,
}

impl SpectrumAccumulator {
    pub fn new(plan: &ScanPlan) -> Self {
        Self {
            start_frequency: plan.start_frequency,
            frequency_resolution: plan.frequency_resolution,
            tuning_bandwidth: plan.tuning_bandwidth,
            fft_size: plan.fft_size,
            power: vec![0.0; plan.power_buckets],
            accumulation_count: 0,
        }
    }

    pub fn shared(plan: &ScanPlan) -> SharedSpectrum {
        Arc::new(RwLock::new(Self::new(plan)))
    }

    /// Add one magnitude frame captured at centre frequency `center`.
    ///
    /// `magnitudes` is in FFT bin order (see [`ps_dsp::SpectrumFft`]).
    /// Frames whose retained band falls outside the accumulated range are
    /// dropped; that happens at sweep edges and around interrupts and is not
    /// an error.
    pub fn add_frame(&mut self, magnitudes: &[f32], center: Frequency) {
        let lowest_retained = center - self.tuning_bandwidth / 2;
        let lowest_bin = (lowest_retained - self.start_frequency) / self.frequency_resolution;

        // A truncated resolution can make bandwidth/resolution exceed the
        // FFT length; never read bins the FFT does not have.
        let retained = ((self.tuning_bandwidth / self.frequency_resolution) as usize)
            .min(self.fft_size);

        if lowest_bin < 0 || lowest_bin as usize + retained > self.power.len() {
            return;
        }

        let base = lowest_bin as usize;
        let half = (retained / 2) as i64;
        for j in 0..retained {
            let offset_bins = j as i64 - half;
            if offset_bins == 0 {
                continue; // DC
            }
            let k = if offset_bins > 0 {
                offset_bins as usize
            } else {
                (self.fft_size as i64 + offset_bins) as usize
            };
            self.power[base + j] += magnitudes[k];
        }
        self.accumulation_count += 1;
    }

    /// How many frames have been accumulated since the last reset.
    pub fn accumulation_count(&self) -> u64 {
        self.accumulation_count
    }

    pub fn power(&self) -> &[f32] {
        &self.power
    }

    /// Clear the accumulation. Not called between sweep repetitions: letting
    /// power accumulate across repetitions converges toward a stable noise
    /// floor on long-running scans.
    pub fn reset(&mut self) {
        self.power.fill(0.0);
        self.accumulation_count = 0;
    }
}
