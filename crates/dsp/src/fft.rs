use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::window;

/// Streaming windowed FFT over interleaved signed 16-bit I/Q pairs.
///
/// Samples are normalised to unit range, multiplied by a Hann window as they
/// arrive, and collected into a frame buffer. Each time the buffer fills, the
/// pre-planned forward FFT runs and one magnitude vector is emitted.
///
/// The magnitude vector is in FFT bin order: index 0 is DC, indices
/// `1..size/2` are positive baseband offsets, indices `size/2..size` wrap to
/// negative offsets. Consumers decide how to place (or drop) each bin.
pub struct SpectrumFft {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    window: Vec<f32>,
    frame: Vec<Complex32>,
    scratch: Vec<Complex32>,
    magnitudes: Vec<f32>,
    fill: usize,
}

impl SpectrumFft {
    /// Plan an FFT of the given size and precompute the window table.
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            size,
            window: window::hann(size),
            frame: vec![Complex32::new(0.0, 0.0); size],
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; size],
            fill: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Consume a block of interleaved I/Q pairs, invoking `on_frame` with the
    /// magnitude vector for every frame completed inside the block. Partial
    /// frames carry over to the next call.
    pub fn push(&mut self, iq: &[i16], mut on_frame: impl FnMut(&[f32])) {
        for pair in iq.chunks_exact(2) {
            let scale = self.window[self.fill] / 32768.0;
            self.frame[self.fill] =
                Complex32::new(pair[0] as f32 * scale, pair[1] as f32 * scale);
            self.fill += 1;

            if self.fill == self.size {
                self.fft
                    .process_with_scratch(&mut self.frame, &mut self.scratch);
                for (m, c) in self.magnitudes.iter_mut().zip(self.frame.iter()) {
                    *m = c.norm();
                }
                self.fill = 0;
                on_frame(&self.magnitudes);
            }
        }
    }
}
