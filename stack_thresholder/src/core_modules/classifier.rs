// THEORY:
// The `VoxelClassifier` turns a threshold table into labels. Every voxel is
// classified on its own, using the thresholds of its frame, so frames can be
// processed in any order (or in parallel, see `parallel_pipeline`).
//
// The per-voxel rule, for ascending thresholds `thr`:
// - `value < thr[0]` is background, label 0.
// - with a single threshold, everything else is label 1.
// - otherwise the highest `j >= 1` with `value >= thr[j]` gives label `j + 1`,
//   and a value that clears only `thr[0]` is label 1.
// Boundaries are inclusive: a value equal to a threshold belongs to the class
// above it.
//
// Output comes in two flavours with explicit ownership:
// 1.  **Copy**: `classify` borrows the volume immutably and returns a new,
//     single-channel `LabeledVolume`.
// 2.  **In place**: `classify_in_place` takes `&mut` for the duration of the
//     call and overwrites the classified channel with labels. The source data
//     is gone afterwards.

use crate::core_modules::thresholds::{ThresholdSet, ThresholdTable};
use crate::core_modules::volume::{SampleType, Volume};
use crate::error::Result;
use log::debug;

pub type Label = u32;

/// Class of `value` under `thresholds`. A `ThresholdSet` is ascending and never
/// empty, so the rule below always has a first cut to compare against.
#[inline]
pub fn classify_value(value: f64, thresholds: &ThresholdSet) -> Label {
    let thr = thresholds.values();
    let Some(&first) = thr.first() else {
        return 0;
    };
    if value < first {
        return 0;
    }
    let top = thr.len() - 1;
    if top == 0 {
        return 1;
    }
    (1..=top)
        .rev()
        .find(|&j| value >= thr[j])
        .map_or(1, |j| (j + 1) as Label)
}

/// Single-channel class labels with the extent of the classified channel.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledVolume {
    width: usize,
    height: usize,
    sample_type: SampleType,
    max_label: usize,
    /// `frames[t][z]` is one row-major slice of labels.
    frames: Vec<Vec<Vec<Label>>>,
}

impl LabeledVolume {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn depth_at(&self, t: usize) -> usize {
        self.frames.get(t).map_or(0, Vec::len)
    }

    /// Sample precision of the channel the labels were computed from.
    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Highest label any frame could produce; the display bound for the output.
    pub fn max_label(&self) -> usize {
        self.max_label
    }

    pub fn label(&self, x: usize, y: usize, z: usize, t: usize) -> Label {
        self.frames[t][z][y * self.width + x]
    }

    pub fn slice(&self, z: usize, t: usize) -> &[Label] {
        &self.frames[t][z]
    }

    pub fn frames(&self) -> &[Vec<Vec<Label>>] {
        &self.frames
    }
}

/// Labels every slice of frame `t` of channel `c`.
pub fn classify_frame<V: Volume>(
    volume: &V,
    c: usize,
    t: usize,
    thresholds: &ThresholdSet,
) -> Vec<Vec<Label>> {
    let (width, height) = (volume.width(), volume.height());
    (0..volume.depth_at(t))
        .map(|z| {
            let mut slice = vec![0; width * height];
            for y in 0..height {
                for x in 0..width {
                    slice[y * width + x] = classify_value(volume.voxel(x, y, z, t, c), thresholds);
                }
            }
            slice
        })
        .collect()
}

/// Builds a new labeled volume from channel `c`, leaving the source untouched.
pub fn classify<V: Volume>(volume: &V, c: usize, table: &ThresholdTable) -> Result<LabeledVolume> {
    volume.check_channel(c)?;
    table.validate(volume.frame_count())?;

    let frames = table
        .frames()
        .iter()
        .enumerate()
        .map(|(t, thresholds)| {
            debug!("classifying frame {t} against {:?}", thresholds.values());
            classify_frame(volume, c, t, thresholds)
        })
        .collect();

    Ok(LabeledVolume::from_frames(volume, table, frames))
}

impl LabeledVolume {
    pub(crate) fn from_frames<V: Volume>(
        volume: &V,
        table: &ThresholdTable,
        frames: Vec<Vec<Vec<Label>>>,
    ) -> Self {
        Self {
            width: volume.width(),
            height: volume.height(),
            sample_type: volume.sample_type(),
            max_label: table.max_label(),
            frames,
        }
    }
}

/// Overwrites channel `c` with its labels. Returns the highest label any frame
/// could produce.
pub fn classify_in_place<V: Volume>(
    volume: &mut V,
    c: usize,
    table: &ThresholdTable,
) -> Result<usize> {
    volume.check_channel(c)?;
    table.validate(volume.frame_count())?;

    let (width, height) = (volume.width(), volume.height());
    for (t, thresholds) in table.frames().iter().enumerate() {
        debug!("classifying frame {t} in place against {:?}", thresholds.values());
        for z in 0..volume.depth_at(t) {
            for y in 0..height {
                for x in 0..width {
                    let label = classify_value(volume.voxel(x, y, z, t, c), thresholds);
                    volume.set_voxel(x, y, z, t, c, label as f64);
                }
            }
        }
    }
    Ok(table.max_label())
}
