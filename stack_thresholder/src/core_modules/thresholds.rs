// THEORY:
// Thresholds are the only value that crosses from "figuring out the classes"
// into "labeling the voxels". This module produces them, from three sources:
//
// 1.  **Cluster centers**: sorted K-means centers are turned into cut points
//     halfway between neighbours, then mapped from bin space back to intensity.
// 2.  **Percentiles**: a value `p` in `[0, 100]` maps to `min + p * (max - min) / 100`
//     over either the whole channel or one frame.
// 3.  **Manual values**: taken as-is (sorted ascending).
//
// A `ThresholdSet` is always ascending and never empty, so `len + 1` classes are
// defined and class 0 is the background below the first cut. A `ThresholdTable`
// holds one set per time frame. In shared mode the same set is cloned into
// every slot, so editing one frame never leaks into another.

use crate::core_modules::histogram::Histogram;
use crate::core_modules::kmeans::kmeans::KMeansClusterer;
use crate::core_modules::volume::Volume;
use crate::error::{Result, ThresholdError};
use log::info;

/// Ascending intensity cut points defining `len + 1` classes.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    values: Vec<f64>,
}

impl ThresholdSet {
    /// Sorts `values` ascending. Empty or non-finite input is rejected.
    pub fn new(mut values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(ThresholdError::InvalidInput("no threshold(s) given".to_string()));
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(ThresholdError::InvalidInput(format!("threshold {bad} is not finite")));
        }
        values.sort_by(f64::total_cmp);
        Ok(Self { values })
    }

    /// Midpoints between consecutive sorted cluster centers, in intensity space.
    pub fn from_centers(mut centers: Vec<usize>, histogram: &Histogram) -> Result<Self> {
        if centers.len() < 2 {
            return Err(ThresholdError::InvalidInput(format!(
                "need at least two cluster centers, got {}",
                centers.len()
            )));
        }
        centers.sort_unstable();
        let values = centers
            .windows(2)
            .map(|pair| {
                let (low, high) = (pair[0] as f64, pair[1] as f64);
                histogram.bin_to_intensity(low + (high - low) / 2.0)
            })
            .collect();
        Ok(Self { values })
    }

    /// Converts percentiles of the `(min, max)` range to intensities.
    pub fn from_percentiles(percentiles: &[f64], bounds: (f64, f64)) -> Result<Self> {
        if let Some(&bad) = percentiles
            .iter()
            .find(|p| !(0.0..=100.0).contains(*p))
        {
            return Err(ThresholdError::OutOfRangeValue(bad));
        }
        let (min, max) = bounds;
        Self::new(
            percentiles
                .iter()
                .map(|p| min + p * (max - min) / 100.0)
                .collect(),
        )
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of classes these thresholds define, background included.
    pub fn class_count(&self) -> usize {
        self.values.len() + 1
    }
}

/// One `ThresholdSet` per time frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    frames: Vec<ThresholdSet>,
}

impl ThresholdTable {
    /// The same thresholds for every one of `frame_count` frames, cloned per frame.
    pub fn shared(set: &ThresholdSet, frame_count: usize) -> Self {
        Self {
            frames: vec![set.clone(); frame_count],
        }
    }

    pub fn per_frame(frames: Vec<ThresholdSet>) -> Self {
        Self { frames }
    }

    pub fn frame(&self, t: usize) -> Option<&ThresholdSet> {
        self.frames.get(t)
    }

    pub fn frame_mut(&mut self, t: usize) -> Option<&mut ThresholdSet> {
        self.frames.get_mut(t)
    }

    pub fn frames(&self) -> &[ThresholdSet] {
        &self.frames
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Highest label any frame can produce: the longest threshold list.
    pub fn max_label(&self) -> usize {
        self.frames.iter().map(ThresholdSet::len).max().unwrap_or(0)
    }

    /// Checks the table covers exactly `frame_count` frames.
    pub fn validate(&self, frame_count: usize) -> Result<()> {
        if self.frames.len() != frame_count {
            return Err(ThresholdError::InvalidInput(format!(
                "{} threshold frames given for a volume of {frame_count} frames",
                self.frames.len()
            )));
        }
        Ok(())
    }
}

/// Parameters for histogram K-means threshold derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KMeansParams {
    pub classes: usize,
    pub bin_precision: usize,
    pub max_iterations: usize,
}

impl KMeansParams {
    fn clusterer(&self) -> Result<KMeansClusterer> {
        if self.classes < 2 {
            return Err(ThresholdError::InvalidInput(format!(
                "k-means needs at least 2 classes, got {}",
                self.classes
            )));
        }
        Ok(KMeansClusterer::new(self.classes).with_max_iterations(self.max_iterations))
    }

    fn thresholds_of(&self, histogram: &Histogram) -> Result<ThresholdSet> {
        let centers = self.clusterer()?.cluster(histogram)?;
        ThresholdSet::from_centers(centers, histogram)
    }
}

/// K-means thresholds of channel `c` over the whole volume.
pub fn kmeans_thresholds<V: Volume>(
    volume: &V,
    c: usize,
    params: KMeansParams,
) -> Result<ThresholdSet> {
    params.clusterer()?;
    let histogram = Histogram::of_channel(volume, c, params.bin_precision)?;
    let set = params.thresholds_of(&histogram)?;
    info!("channel {c}: k-means thresholds {:?}", set.values());
    Ok(set)
}

/// K-means thresholds of channel `c` over frame `t` only.
pub fn kmeans_frame_thresholds<V: Volume>(
    volume: &V,
    c: usize,
    t: usize,
    params: KMeansParams,
) -> Result<ThresholdSet> {
    params.clusterer()?;
    let histogram = Histogram::of_frame(volume, c, t, params.bin_precision)?;
    let set = params.thresholds_of(&histogram)?;
    info!("channel {c}, frame {t}: k-means thresholds {:?}", set.values());
    Ok(set)
}

/// A full table: independent per-frame clustering, or one global set shared by all frames.
pub fn kmeans_table<V: Volume>(
    volume: &V,
    c: usize,
    independent: bool,
    params: KMeansParams,
) -> Result<ThresholdTable> {
    if independent {
        let frames = (0..volume.frame_count())
            .map(|t| kmeans_frame_thresholds(volume, c, t, params))
            .collect::<Result<Vec<_>>>()?;
        Ok(ThresholdTable::per_frame(frames))
    } else {
        let set = kmeans_thresholds(volume, c, params)?;
        Ok(ThresholdTable::shared(&set, volume.frame_count()))
    }
}

/// One K-means threshold set per channel, over the whole volume.
pub fn kmeans_all_channels<V: Volume>(
    volume: &V,
    params: KMeansParams,
) -> Result<Vec<ThresholdSet>> {
    (0..volume.channel_count())
        .map(|c| kmeans_thresholds(volume, c, params))
        .collect()
}

/// Percentile thresholds for every frame, over channel or per-frame bounds.
pub fn percentile_table<V: Volume>(
    volume: &V,
    c: usize,
    percentiles: &[f64],
    independent: bool,
) -> Result<ThresholdTable> {
    volume.check_channel(c)?;
    if independent {
        let frames = (0..volume.frame_count())
            .map(|t| {
                ThresholdSet::from_percentiles(percentiles, volume.frame_channel_bounds(c, t))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ThresholdTable::per_frame(frames))
    } else {
        let set = ThresholdSet::from_percentiles(percentiles, volume.channel_bounds(c))?;
        Ok(ThresholdTable::shared(&set, volume.frame_count()))
    }
}
