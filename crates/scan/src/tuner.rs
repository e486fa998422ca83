use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::plan::MAX_READ_PAIRS;
use ps_sdr::{clock_time, ClockTime, Frequency, Radio, SdrError};

/// Settling time after a frequency change before the flush reads. Soapy does
/// not do this for us.
pub const RETUNE_SLEEP_US: u64 = 5_000;

/// How many discard reads to attempt before declaring the retune failed
const FLUSH_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum TuneError {
    #[error("failed to set frequency {frequency}Hz: {source}")]
    SetFrequency {
        frequency: Frequency,
        source: SdrError,
    },

    #[error("bad retune at {frequency}Hz: stream would not flush")]
    FlushFailed { frequency: Frequency },
}

/// Owns the acquisition clock cursors and drives each frequency change:
/// tune, settle, flush stale samples, then report ready.
pub struct Tuner {
    channel: usize,
    last_time: ClockTime,
    first_time: Option<ClockTime>,
    discard: Vec<i16>,
}

impl Tuner {
    pub fn new(channel: usize) -> Self {
        Self {
            channel,
            last_time: 0,
            first_time: None,
            discard: vec![0i16; MAX_READ_PAIRS * 2],
        }
    }

    /// Timestamp of the most recent read, flush reads included.
    pub fn last_time(&self) -> ClockTime {
        self.last_time
    }

    /// Timestamp of the very first successful read of the process.
    pub fn first_time(&self) -> Option<ClockTime> {
        self.first_time
    }

    /// Called by the acquisition loop after every data read.
    pub fn record_read_time(&mut self, timestamp_us: ClockTime) {
        self.last_time = timestamp_us;
        if self.first_time.is_none() {
            self.first_time = Some(timestamp_us);
        }
    }

    /// Move the receiver to `frequency` and flush the stale samples that
    /// follow a configuration change. On success `last_time` holds the flush
    /// read's timestamp and the new frequency is committed.
    pub fn retune(&mut self, radio: &mut dyn Radio, frequency: Frequency) -> Result<(), TuneError> {
        radio
            .set_frequency(self.channel, frequency)
            .map_err(|source| TuneError::SetFrequency { frequency, source })?;
        log::debug!("tuned to {}", frequency);

        // Wait for settling, then discard buffered pre-retune samples
        thread::sleep(Duration::from_micros(RETUNE_SLEEP_US));
        let flush_start = clock_time();

        for attempt in 0..FLUSH_ATTEMPTS {
            match radio.read(&mut self.discard) {
                Ok(block) => {
                    // A driver clock far in the past must not shorten the
                    // dwell that is measured from this timestamp.
                    self.record_read_time(block.timestamp_us.max(flush_start));
                    return Ok(());
                }
                Err(e) if e.is_transient() => {
                    log::debug!("flush read {} failed: {}", attempt + 1, e);
                }
                Err(e) => {
                    log::debug!("flush read failed hard: {}", e);
                }
            }
        }
        Err(TuneError::FlushFailed { frequency })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ps_sdr::mock::{MockRadio, MockSignal};

    #[test]
    fn test_retune_commits_frequency_and_time() {
        let mut radio = MockRadio::new(&[1_000_000.0], MockSignal::Silence);
        radio.start_stream(0).unwrap();
        let mut tuner = Tuner::new(0);

        tuner.retune(&mut radio, 433_000_000).unwrap();
        assert_eq!(radio.retunes, vec![433_000_000]);
        assert!(tuner.first_time().is_some());
        assert_eq!(tuner.first_time(), Some(tuner.last_time()));
    }

    #[test]
    fn test_flush_retries_then_succeeds() {
        let mut radio = MockRadio::new(&[1_000_000.0], MockSignal::Silence);
        radio.start_stream(0).unwrap();
        radio.fail_next_reads(2);
        let mut tuner = Tuner::new(0);

        tuner.retune(&mut radio, 100_000_000).unwrap();
        assert_eq!(radio.reads(), 3, "two failures then one good flush read");
    }

    #[test]
    fn test_flush_gives_up_after_three_failures() {
        let mut radio = MockRadio::new(&[1_000_000.0], MockSignal::Silence);
        radio.start_stream(0).unwrap();
        radio.fail_next_reads(3);
        let mut tuner = Tuner::new(0);

        let err = tuner.retune(&mut radio, 100_000_000).unwrap_err();
        assert!(matches!(err, TuneError::FlushFailed { .. }));
        assert!(tuner.first_time().is_none());
    }

    #[test]
    fn test_stale_driver_clock_cannot_zero_the_dwell() {
        let mut radio = MockRadio::new(&[1_000_000.0], MockSignal::Silence);
        radio.start_stream(0).unwrap();
        // Driver claims its buffers are from long ago
        radio.set_clock(-60_000_000);
        let mut tuner = Tuner::new(0);

        let before = clock_time();
        tuner.retune(&mut radio, 100_000_000).unwrap();
        assert!(
            tuner.last_time() >= before,
            "flush time {} predates the retune at {}",
            tuner.last_time(),
            before
        );
    }
}
