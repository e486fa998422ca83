use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ps_dsp::SpectrumFft;
use ps_sdr::{Frequency, Radio};

use crate::accumulator::SharedSpectrum;
use crate::plan::{ScanPlan, MAX_READ_PAIRS};
use crate::tuner::Tuner;

/// How a run of sweeps ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepOutcome {
    /// The configured number of repetitions completed
    Completed,
    /// An interrupt was seen; the sweep in progress was allowed to finish
    Finished,
    /// A second interrupt abandoned the sweep immediately
    Aborted,
}

/// Drives the whole acquisition: for each repetition, step the receiver
/// through every planned tuning, dwell on each while streaming blocks through
/// the FFT into the shared accumulator.
///
/// This is the only writer of the accumulator and the FFT state; the web
/// publisher only ever takes read-lock snapshots.
pub struct SweepRunner<'r> {
    radio: &'r mut dyn Radio,
    plan: &'r ScanPlan,
    channel: usize,
    tuner: Tuner,
    fft: SpectrumFft,
    spectrum: SharedSpectrum,
    signals: Arc<AtomicUsize>,
    read_buf: Vec<i16>,
}

impl<'r> SweepRunner<'r> {
    pub fn new(
        radio: &'r mut dyn Radio,
        plan: &'r ScanPlan,
        channel: usize,
        spectrum: SharedSpectrum,
        signals: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            radio,
            plan,
            channel,
            tuner: Tuner::new(channel),
            fft: SpectrumFft::new(plan.fft_size),
            spectrum,
            signals,
            read_buf: vec![0i16; MAX_READ_PAIRS * 2],
        }
    }

    fn signals_caught(&self) -> usize {
        self.signals.load(Ordering::Relaxed)
    }

    /// Run up to `repetition_limit` sweeps (0 means until interrupted).
    pub fn run(&mut self, repetition_limit: u32) -> SweepOutcome {
        let mut repetition = 0u32;
        loop {
            if repetition_limit != 0 && repetition >= repetition_limit {
                return SweepOutcome::Completed;
            }
            if self.signals_caught() >= 1 {
                return SweepOutcome::Finished;
            }
            if self.sweep_once() == SweepOutcome::Aborted {
                return SweepOutcome::Aborted;
            }
            repetition += 1;
        }
    }

    /// One pass over every tuning in the plan.
    fn sweep_once(&mut self) -> SweepOutcome {
        if let Err(e) = self.radio.set_sample_rate(self.channel, self.plan.sample_rate) {
            log::warn!("failed to set sample rate {}: {}", self.plan.sample_rate, e);
        }

        let mut frequency = self.plan.tuning_start;
        for _ in 0..self.plan.tuning_count {
            if self.signals_caught() > 1 {
                return SweepOutcome::Aborted;
            }

            if let Err(e) = self.tuner.retune(self.radio, frequency) {
                log::error!("{}", e);
                break; // abandon this sweep, try again next repetition
            }

            // The flush read during retune left last_time at the start of
            // this dwell.
            let deadline = self.tuner.last_time() + self.plan.dwell_time_us;
            while self.tuner.last_time() < deadline {
                if self.signals_caught() > 1 {
                    return SweepOutcome::Aborted;
                }
                if !self.acquire_block(frequency) {
                    break;
                }
            }

            frequency += self.plan.tuning_bandwidth;
        }
        SweepOutcome::Finished // one sweep finished; the caller decides whether to repeat
    }

    /// Read one block and push it through the FFT into the accumulator.
    /// Returns false when the tuning should be abandoned.
    fn acquire_block(&mut self, frequency: Frequency) -> bool {
        let block = match self.radio.read(&mut self.read_buf) {
            Ok(block) => block,
            Err(e) => {
                log::error!("error reading stream: {}", e);
                return false;
            }
        };
        self.tuner.record_read_time(block.timestamp_us);
        log::trace!(
            "received {} samples at {} ({})",
            block.pairs,
            block.timestamp_us,
            if block.hardware_time { "buffer time" } else { "clock time" },
        );

        let spectrum = &self.spectrum;
        self.fft.push(&self.read_buf[..block.pairs * 2], |magnitudes| {
            spectrum
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .add_frame(magnitudes, frequency);
        });
        true
    }
}
