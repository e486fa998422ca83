use std::f64::consts::PI;

/// Generate a symmetric Hann window of length `n` (period `n - 1`).
///
/// Computed once per plan and applied sample-by-sample as the FFT input
/// buffer fills.
pub fn hann(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|s| (0.5 * (1.0 - (2.0 * PI * s as f64 / denom).cos())) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_symmetry() {
        let w = hann(64);
        assert_eq!(w.len(), 64);
        for i in 0..32 {
            assert!(
                (w[i] - w[63 - i]).abs() < 1e-6,
                "asymmetry at index {}: {} != {}",
                i,
                w[i],
                w[63 - i]
            );
        }
    }

    #[test]
    fn test_hann_endpoints_and_peak() {
        let w = hann(65);
        assert!(w[0].abs() < 1e-6, "left edge should be zero, got {}", w[0]);
        assert!(w[64].abs() < 1e-6, "right edge should be zero, got {}", w[64]);
        // Odd length puts the peak exactly at the centre
        assert!((w[32] - 1.0).abs() < 1e-6, "peak should be 1.0, got {}", w[32]);
    }
}
