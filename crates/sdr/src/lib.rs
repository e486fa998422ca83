// Copyright 2025-2026 CEMAXECUTER LLC

pub mod mock;

#[cfg(feature = "soapysdr")]
pub mod soapy;

use std::sync::OnceLock;
use std::time::Instant;

use thiserror::Error;

/// Frequency in Hertz.
pub type Frequency = i64;

/// Microseconds since an arbitrary process-wide epoch. Monotonic within a run.
pub type ClockTime = i64;

/// One blocking stream read: how many interleaved I/Q pairs landed in the
/// buffer and when the driver says they were captured.
#[derive(Debug, Clone, Copy)]
pub struct ReadBlock {
    /// Number of complex sample pairs written to the buffer
    pub pairs: usize,
    /// Buffer timestamp in microseconds. When the driver does not stamp its
    /// buffers this is the monotonic clock at the time of the read.
    pub timestamp_us: ClockTime,
    /// Whether `timestamp_us` came from the hardware rather than the clock
    pub hardware_time: bool,
}

#[derive(Debug, Error)]
pub enum SdrError {
    #[error("SDR device not found: {0}")]
    DeviceNotFound(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("invalid channel {requested}: device has {available} channel(s)")]
    InvalidChannel { requested: usize, available: usize },

    #[error("stream read failed with code {code}")]
    Read { code: i32 },

    #[error("stream is not active")]
    StreamInactive,
}

impl SdrError {
    /// Read failures are retried by the caller; everything else is fatal.
    pub fn is_transient(&self) -> bool {
        matches!(self, SdrError::Read { .. })
    }
}

/// Capability surface over one receiver. All calls are synchronous; `read`
/// blocks for at most one second. Implementations deliver interleaved signed
/// 16-bit I/Q pairs.
pub trait Radio: Send {
    /// Short driver name for logs ("soapysdr", "mock", ...)
    fn driver(&self) -> &str;

    fn channel_count(&self) -> usize;

    /// Sample rates the device supports on this channel, in samples/second.
    fn sample_rates(&self, channel: usize) -> Result<Vec<f64>, SdrError>;

    /// Native stream format descriptor and its full-scale value.
    fn native_format(&self, channel: usize) -> Result<(String, f64), SdrError>;

    fn set_sample_rate(&mut self, channel: usize, rate: f64) -> Result<(), SdrError>;

    fn set_gain(&mut self, channel: usize, gain_db: f64) -> Result<(), SdrError>;

    fn set_frequency(&mut self, channel: usize, frequency: Frequency) -> Result<(), SdrError>;

    /// Set up and activate an RX stream in CS16 on the given channel.
    fn start_stream(&mut self, channel: usize) -> Result<(), SdrError>;

    /// Blocking read of up to `buf.len() / 2` sample pairs into `buf`
    /// (interleaved I, Q). A driver-level negative return surfaces as
    /// `SdrError::Read`, which callers treat as a soft failure.
    fn read(&mut self, buf: &mut [i16]) -> Result<ReadBlock, SdrError>;

    fn stop_stream(&mut self);
}

/// Monotonic clock in microseconds, counted from the first call in this
/// process. Used wherever a driver fails to stamp its buffers.
pub fn clock_time() -> ClockTime {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_micros() as ClockTime
}
