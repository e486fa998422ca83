// Copyright 2025-2026 CEMAXECUTER LLC

use std::f64::consts::TAU;

use crate::{ClockTime, Frequency, Radio, ReadBlock, SdrError};

/// What the mock receiver "hears" at baseband.
#[derive(Debug, Clone, Copy)]
pub enum MockSignal {
    Silence,
    /// Every pair is the same (i, q) value
    Constant { i: i16, q: i16 },
    /// Complex exponential at a fixed baseband offset, amplitude in [0, 1]
    Tone { offset_hz: f64, amplitude: f64 },
}

/// Deterministic in-memory receiver. Produces synthesised sample blocks with
/// hardware-style timestamps that advance at the configured sample rate, and
/// records every control call so tests can assert on the tuning sequence.
pub struct MockRadio {
    sample_rates: Vec<f64>,
    signal: MockSignal,
    sample_rate: f64,
    gain_db: f64,
    streaming: bool,
    now_us: ClockTime,
    phase: f64,
    reads: u64,
    fail_reads: usize,
    fail_read_at: Vec<u64>,
    read_hook: Option<Box<dyn FnMut(u64) + Send>>,
    /// Every frequency committed via set_frequency, in order
    pub retunes: Vec<Frequency>,
}

impl MockRadio {
    pub fn new(sample_rates: &[f64], signal: MockSignal) -> Self {
        Self {
            sample_rates: sample_rates.to_vec(),
            signal,
            sample_rate: sample_rates.first().copied().unwrap_or(0.0),
            gain_db: 0.0,
            streaming: false,
            // Far ahead of the process clock, so synthesised timestamps win
            // wherever a reader takes the later of the two
            now_us: 1_000_000_000_000,
            phase: 0.0,
            reads: 0,
            fail_reads: 0,
            fail_read_at: Vec::new(),
            read_hook: None,
            retunes: Vec::new(),
        }
    }

    /// Invoke `hook` with the 1-based read count before each read completes.
    /// Tests use this to trip interrupts at a known point in a sweep.
    pub fn with_read_hook(mut self, hook: impl FnMut(u64) + Send + 'static) -> Self {
        self.read_hook = Some(Box::new(hook));
        self
    }

    /// Make the next `n` reads fail with a driver error code.
    pub fn fail_next_reads(&mut self, n: usize) {
        self.fail_reads = n;
    }

    /// Make the `n`th read (1-based, counted from the first read ever) fail.
    pub fn fail_read_at(&mut self, n: u64) {
        self.fail_read_at.push(n);
    }

    /// Start the synthesised clock somewhere other than the default epoch.
    pub fn set_clock(&mut self, now_us: ClockTime) {
        self.now_us = now_us;
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn fill(&mut self, buf: &mut [i16], pairs: usize) {
        match self.signal {
            MockSignal::Silence => {
                buf[..pairs * 2].fill(0);
            }
            MockSignal::Constant { i, q } => {
                for p in 0..pairs {
                    buf[p * 2] = i;
                    buf[p * 2 + 1] = q;
                }
            }
            MockSignal::Tone { offset_hz, amplitude } => {
                let step = TAU * offset_hz / self.sample_rate;
                for p in 0..pairs {
                    buf[p * 2] = (self.phase.cos() * amplitude * 32767.0) as i16;
                    buf[p * 2 + 1] = (self.phase.sin() * amplitude * 32767.0) as i16;
                    self.phase = (self.phase + step) % TAU;
                }
            }
        }
    }
}

impl Radio for MockRadio {
    fn driver(&self) -> &str {
        "mock"
    }

    fn channel_count(&self) -> usize {
        1
    }

    fn sample_rates(&self, _channel: usize) -> Result<Vec<f64>, SdrError> {
        Ok(self.sample_rates.clone())
    }

    fn native_format(&self, _channel: usize) -> Result<(String, f64), SdrError> {
        Ok(("CS16".to_string(), 32767.0))
    }

    fn set_sample_rate(&mut self, _channel: usize, rate: f64) -> Result<(), SdrError> {
        self.sample_rate = rate;
        Ok(())
    }

    fn set_gain(&mut self, _channel: usize, gain_db: f64) -> Result<(), SdrError> {
        self.gain_db = gain_db;
        Ok(())
    }

    fn set_frequency(&mut self, _channel: usize, frequency: Frequency) -> Result<(), SdrError> {
        self.retunes.push(frequency);
        Ok(())
    }

    fn start_stream(&mut self, channel: usize) -> Result<(), SdrError> {
        if channel > 0 {
            return Err(SdrError::InvalidChannel {
                requested: channel,
                available: 1,
            });
        }
        self.streaming = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [i16]) -> Result<ReadBlock, SdrError> {
        self.reads += 1;
        let n = self.reads;
        if let Some(hook) = self.read_hook.as_mut() {
            hook(n);
        }
        if self.fail_reads > 0 {
            self.fail_reads -= 1;
            return Err(SdrError::Read { code: -1 });
        }
        if self.fail_read_at.contains(&n) {
            return Err(SdrError::Read { code: -1 });
        }
        if !self.streaming {
            return Err(SdrError::StreamInactive);
        }

        let pairs = buf.len() / 2;
        self.fill(buf, pairs);
        self.now_us += (pairs as f64 / self.sample_rate * 1e6) as ClockTime;
        Ok(ReadBlock {
            pairs,
            timestamp_us: self.now_us,
            hardware_time: true,
        })
    }

    fn stop_stream(&mut self) {
        self.streaming = false;
    }
}
