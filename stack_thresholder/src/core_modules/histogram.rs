// THEORY:
// The `Histogram` is the first step of automatic thresholding. It turns the
// millions of samples of one channel into a short, fixed-length list of counts
// that K-means can cluster cheaply.
//
// Key architectural principles:
// 1.  **Equal-width bins over a known range**: The range comes from the volume's
//     own bounds, either for the whole channel or for a single frame. A sample
//     `v` lands in bin `floor((v - min) * (bins - 1) / (max - min))`, so `min`
//     maps to bin 0 and `max` to the last bin.
// 2.  **Clamped**: A sample outside the range (only possible when the bounds
//     disagree with the data) is clamped into the first or last bin and counted
//     in the warning log. Non-finite samples are skipped.
// 3.  **Immutable**: Once built, a histogram is never modified. It is scratch
//     data that is dropped as soon as thresholds have been derived from it.

use crate::core_modules::volume::Volume;
use crate::error::{Result, ThresholdError};
use log::{debug, warn};

/// Default number of bins for intensity histograms.
pub const DEFAULT_BIN_PRECISION: usize = 255;

/// Counts of samples per equal-width intensity bin.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    counts: Vec<u64>,
    min: f64,
    max: f64,
    samples: u64,
}

impl Histogram {
    /// Bins `samples` into `bin_count` equal-width bins spanning `[min, max]`.
    pub fn build(
        samples: impl IntoIterator<Item = f64>,
        bin_count: usize,
        min: f64,
        max: f64,
    ) -> Result<Self> {
        let mut builder = HistogramBuilder::new(bin_count, min, max)?;
        samples.into_iter().for_each(|v| builder.add(v));
        Ok(builder.finish())
    }

    /// Global mode: every frame and slice of channel `c`, over the channel bounds.
    pub fn of_channel<V: Volume>(volume: &V, c: usize, bin_count: usize) -> Result<Self> {
        volume.check_channel(c)?;
        let (min, max) = volume.channel_bounds(c);
        let mut builder = HistogramBuilder::new(bin_count, min, max)?;
        for t in 0..volume.frame_count() {
            volume.visit_frame(c, t, |v| builder.add(v));
        }
        debug!("channel {c}: binned {} samples over [{min}, {max}]", builder.samples);
        Ok(builder.finish())
    }

    /// Per-frame mode: the slices of frame `t` only, over that frame's bounds.
    pub fn of_frame<V: Volume>(volume: &V, c: usize, t: usize, bin_count: usize) -> Result<Self> {
        volume.check_channel(c)?;
        if t >= volume.frame_count() {
            return Err(ThresholdError::InvalidInput(format!(
                "volume has no frame #{t} ({} frames)",
                volume.frame_count()
            )));
        }
        let (min, max) = volume.frame_channel_bounds(c, t);
        let mut builder = HistogramBuilder::new(bin_count, min, max)?;
        volume.visit_frame(c, t, |v| builder.add(v));
        debug!("channel {c}, frame {t}: binned {} samples over [{min}, {max}]", builder.samples);
        Ok(builder.finish())
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// The `(min, max)` intensity range the bins span.
    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Bins per intensity unit, `(bins - 1) / (max - min)`.
    pub fn bin_width(&self) -> f64 {
        bin_factor(self.counts.len(), self.min, self.max)
    }

    /// Number of samples counted; always equal to the sum of the counts.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn non_empty_bins(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }

    /// Maps a (possibly fractional) bin position back to intensity.
    pub fn bin_to_intensity(&self, position: f64) -> f64 {
        if self.counts.len() == 1 {
            return self.min;
        }
        self.min + position / self.bin_width()
    }
}

fn bin_factor(bin_count: usize, min: f64, max: f64) -> f64 {
    (bin_count - 1) as f64 / (max - min)
}

/// Incremental histogram construction, one sample at a time.
struct HistogramBuilder {
    counts: Vec<u64>,
    min: f64,
    max: f64,
    factor: f64,
    samples: u64,
    clamped: u64,
}

impl HistogramBuilder {
    fn new(bin_count: usize, min: f64, max: f64) -> Result<Self> {
        if bin_count == 0 {
            return Err(ThresholdError::InvalidInput(
                "histogram needs at least one bin".to_string(),
            ));
        }
        if !min.is_finite() || !max.is_finite() || max <= min {
            return Err(ThresholdError::DegenerateRange { min, max });
        }
        Ok(Self {
            counts: vec![0; bin_count],
            min,
            max,
            factor: bin_factor(bin_count, min, max),
            samples: 0,
            clamped: 0,
        })
    }

    fn add(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let last = self.counts.len() - 1;
        let position = ((value - self.min) * self.factor).floor();
        let bin = if position < 0.0 {
            self.clamped += 1;
            0
        } else if position > last as f64 {
            self.clamped += 1;
            last
        } else {
            position as usize
        };
        self.counts[bin] += 1;
        self.samples += 1;
    }

    fn finish(self) -> Histogram {
        if self.clamped > 0 {
            warn!(
                "{} of {} samples fell outside [{}, {}] and were clamped",
                self.clamped, self.samples, self.min, self.max
            );
        }
        Histogram {
            counts: self.counts,
            min: self.min,
            max: self.max,
            samples: self.samples,
        }
    }
}
