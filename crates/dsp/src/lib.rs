pub mod fft;
pub mod window;

pub use fft::SpectrumFft;
