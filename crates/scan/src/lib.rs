pub mod accumulator;
pub mod config;
pub mod plan;
pub mod sweep;
pub mod tuner;

pub use accumulator::{SharedSpectrum, SpectrumAccumulator};
pub use config::{frequency_from_str, ScanConfig};
pub use plan::{plan_scan, DeviceInfo, PlanError, ScanPlan};
pub use sweep::{SweepOutcome, SweepRunner};

pub use ps_sdr::{ClockTime, Frequency};
