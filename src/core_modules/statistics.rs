// THEORY:
// The statistics pass is the measuring step of the pipeline. It walks the two
// sample slices in lockstep and classifies every sample (one channel of one
// pixel) by the magnitude of its absolute difference:
//
//   d > fail_threshold                     -> failure
//   warn_threshold < d <= fail_threshold   -> warning
//   otherwise                              -> clean
//
// Alongside the counts it accumulates the first and second moments of the
// error, from which mean absolute error, RMS error and PSNR follow. Samples
// are normalized, so the peak value used for PSNR is 1.0.

use serde::Serialize;

/// Peak sample value of a normalized buffer.
const PEAK_VALUE: f64 = 1.0;

/// The result of one comparison pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonStatistics {
    /// Number of samples whose difference exceeds the fail threshold.
    pub failures: u64,
    /// Number of samples above the warn threshold but not above the fail threshold.
    pub warnings: u64,
    /// Number of pixels with at least one failing channel.
    pub failing_pixels: u64,
    /// Number of samples compared (pixels times channels).
    pub samples: u64,
    /// Mean absolute error across every sample.
    pub mean_error: f64,
    /// Root-mean-square error across every sample.
    pub rms_error: f64,
    /// Peak signal-to-noise ratio in dB; infinite when the images are identical.
    pub psnr: f64,
    /// Largest single-sample difference.
    pub max_error: f64,
    /// Location of `max_error` as (x, y, channel).
    pub max_error_at: Option<(u32, u32, usize)>,
}

impl Default for ComparisonStatistics {
    fn default() -> Self {
        Self {
            failures: 0,
            warnings: 0,
            failing_pixels: 0,
            samples: 0,
            mean_error: 0.0,
            rms_error: 0.0,
            psnr: f64::INFINITY,
            max_error: 0.0,
            max_error_at: None,
        }
    }
}

impl ComparisonStatistics {
    /// Computes statistics for two interleaved buffers of equal layout.
    ///
    /// `width` and `channels` locate the maximum error; the slices are walked
    /// up to the length of the shorter one.
    pub fn compute(
        candidate: &[f32],
        baseline: &[f32],
        width: u32,
        channels: usize,
        fail_threshold: f64,
        warn_threshold: f64,
    ) -> Self {
        let mut stats = Self::default();
        if channels == 0 || width == 0 {
            return stats;
        }

        let mut sum_error = 0.0f64;
        let mut sum_squared_error = 0.0f64;
        let mut max_index: Option<usize> = None;

        for (pixel_index, (a, b)) in candidate
            .chunks_exact(channels)
            .zip(baseline.chunks_exact(channels))
            .enumerate()
        {
            let mut pixel_failed = false;
            for (channel, (x, y)) in a.iter().zip(b.iter()).enumerate() {
                let error = (*x as f64 - *y as f64).abs();
                stats.samples += 1;
                sum_error += error;
                sum_squared_error += error * error;

                if error > fail_threshold {
                    stats.failures += 1;
                    pixel_failed = true;
                } else if error > warn_threshold {
                    stats.warnings += 1;
                }

                if error > stats.max_error {
                    stats.max_error = error;
                    max_index = Some(pixel_index * channels + channel);
                }
            }
            if pixel_failed {
                stats.failing_pixels += 1;
            }
        }

        if stats.samples > 0 {
            let n = stats.samples as f64;
            stats.mean_error = sum_error / n;
            stats.rms_error = (sum_squared_error / n).sqrt();
        }
        stats.psnr = psnr(stats.rms_error);
        stats.max_error_at = max_index.map(|index| {
            let pixel = index / channels;
            let x = (pixel % width as usize) as u32;
            let y = (pixel / width as usize) as u32;
            (x, y, index % channels)
        });
        stats
    }

    pub fn passed(&self) -> bool {
        self.failures == 0
    }
}

/// PSNR in dB for normalized samples; `+inf` when `rms_error` is zero.
pub fn psnr(rms_error: f64) -> f64 {
    if rms_error > 0.0 {
        20.0 * (PEAK_VALUE / rms_error).log10()
    } else {
        f64::INFINITY
    }
}
