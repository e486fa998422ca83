use thiserror::Error;

use ps_sdr::Frequency;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid frequency specification: {0}")]
    InvalidFrequency(String),
}

/// Everything the user asked for, fixed before any device work starts.
/// Derived quantities live in [`crate::plan::ScanPlan`].
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// SoapySDR device args string; empty lets the driver pick
    pub sdr_name: String,
    pub sdr_channel: usize,
    pub gain_db: f64,

    /// Lowest frequency to report; must be positive
    pub start_frequency: Frequency,
    /// Highest frequency to report; 0 derives a band centred on the start
    pub end_frequency: Frequency,
    /// Hz per reported bin; 0 derives it from the sample rate
    pub frequency_resolution: Frequency,
    /// Upper limit on the device sample rate; 0 means unlimited
    pub requested_sample_rate_cap: Frequency,

    /// Number of sweeps to make; 0 scans continuously
    pub repetition_limit: u32,
    /// Wall-time target for one full sweep, in seconds
    pub scan_time_s: u32,

    /// Fraction of each tuning's bandwidth discarded at the edges
    pub crop_ratio: f64,

    /// Port for the web UI on localhost; 0 disables it
    pub web_port: u16,

    pub verbose: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            sdr_name: String::new(),
            sdr_channel: 0,
            gain_db: 0.0,
            start_frequency: 0,
            end_frequency: 0,
            frequency_resolution: 0,
            requested_sample_rate_cap: 0,
            repetition_limit: 0,
            scan_time_s: 10,
            crop_ratio: 0.25,
            web_port: 0,
            verbose: false,
        }
    }
}

/// Parse a frequency literal: a decimal number with an optional single
/// `k`/`K`, `m`/`M` or `g`/`G` suffix. Any other trailing character is an
/// error.
pub fn frequency_from_str(s: &str) -> Result<Frequency, ConfigError> {
    let invalid = || ConfigError::InvalidFrequency(s.to_string());

    let (number, multiplier) = match s.chars().last() {
        Some('k') | Some('K') => (&s[..s.len() - 1], 1e3),
        Some('m') | Some('M') => (&s[..s.len() - 1], 1e6),
        Some('g') | Some('G') => (&s[..s.len() - 1], 1e9),
        Some(_) => (s, 1.0),
        None => return Err(invalid()),
    };

    let value: f64 = number.parse().map_err(|_| invalid())?;
    Ok((value * multiplier) as Frequency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_suffixes() {
        assert_eq!(frequency_from_str("1k").unwrap(), 1_000);
        assert_eq!(frequency_from_str("2.5M").unwrap(), 2_500_000);
        assert_eq!(frequency_from_str("1g").unwrap(), 1_000_000_000);
        assert_eq!(frequency_from_str("100").unwrap(), 100);
        assert_eq!(frequency_from_str("433.92M").unwrap(), 433_920_000);
    }

    #[test]
    fn test_frequency_rejects_junk() {
        for bad in ["", "x", "100x", "1kk", "12.5q", "M"] {
            assert!(
                frequency_from_str(bad).is_err(),
                "'{}' should not parse",
                bad
            );
        }
    }

    #[test]
    fn test_frequency_plain_exponent() {
        assert_eq!(frequency_from_str("1e6").unwrap(), 1_000_000);
    }
}
