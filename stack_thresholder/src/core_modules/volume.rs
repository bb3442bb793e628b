// THEORY:
// The `Volume` module is the seam between the thresholder and whatever program
// owns the image data. A volume is a stack of 2D planes indexed by
// (x, y, depth, time, channel). The thresholder only ever needs a handful of
// questions answered about it: how big is it, what is the value of one voxel,
// what are the intensity bounds of a channel, and (for in-place output) how to
// overwrite one voxel.
//
// Key architectural principles:
// 1.  **Collaborator, not owner**: The `Volume` trait is all the core consumes.
//     A host application implements it over its own container; the core never
//     allocates a full multi-channel copy.
// 2.  **Precision travels with the data**: Every volume reports a `SampleType`.
//     Labeled output records it, and in-place writes are stored at it.
// 3.  **Reference container**: `VoxelStack` is a plain in-memory implementation
//     used by the tester binary and the test suites. Frames may differ in depth.

use crate::error::{Result, ThresholdError};

/// Sample precision of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleType {
    #[default]
    U8,
    U16,
    F32,
    F64,
}

impl SampleType {
    /// Converts `value` to what a channel of this precision can actually hold.
    /// Integer types round and saturate.
    pub fn store(self, value: f64) -> f64 {
        match self {
            SampleType::U8 => value.round().clamp(0.0, u8::MAX as f64),
            SampleType::U16 => value.round().clamp(0.0, u16::MAX as f64),
            SampleType::F32 => value as f32 as f64,
            SampleType::F64 => value,
        }
    }

    /// Largest value representable, used to scale labels for display.
    pub fn max_value(self) -> f64 {
        match self {
            SampleType::U8 => u8::MAX as f64,
            SampleType::U16 => u16::MAX as f64,
            SampleType::F32 => f32::MAX as f64,
            SampleType::F64 => f64::MAX,
        }
    }
}

/// Read/write access to a 5D intensity volume (x, y, z, t, c).
pub trait Volume {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    /// Number of depth slices in frame `t`.
    fn depth_at(&self, t: usize) -> usize;
    fn frame_count(&self) -> usize;
    fn channel_count(&self) -> usize;
    fn sample_type(&self) -> SampleType;

    fn voxel(&self, x: usize, y: usize, z: usize, t: usize, c: usize) -> f64;
    fn set_voxel(&mut self, x: usize, y: usize, z: usize, t: usize, c: usize, value: f64);

    /// `(min, max)` of channel `c` over every frame and slice.
    fn channel_bounds(&self, c: usize) -> (f64, f64);
    /// `(min, max)` of channel `c` over the slices of frame `t`.
    fn frame_channel_bounds(&self, c: usize, t: usize) -> (f64, f64);

    /// Calls `visit` with every sample of channel `c` in frame `t`, slice by slice,
    /// row by row.
    fn visit_frame(&self, c: usize, t: usize, mut visit: impl FnMut(f64))
    where
        Self: Sized,
    {
        for z in 0..self.depth_at(t) {
            for y in 0..self.height() {
                for x in 0..self.width() {
                    visit(self.voxel(x, y, z, t, c));
                }
            }
        }
    }

    /// Fails with `InvalidInput` when `c` is not a channel of this volume.
    fn check_channel(&self, c: usize) -> Result<()>
    where
        Self: Sized,
    {
        if c >= self.channel_count() {
            return Err(ThresholdError::InvalidInput(format!(
                "volume has no channel #{c} ({} channels)",
                self.channel_count()
            )));
        }
        Ok(())
    }
}

/// An owned, in-memory volume. Each `(t, z, c)` plane is a row-major `Vec<f64>`.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelStack {
    width: usize,
    height: usize,
    channels: usize,
    sample_type: SampleType,
    /// `frames[t][z * channels + c]` is one plane of `width * height` samples.
    frames: Vec<Vec<Vec<f64>>>,
}

impl VoxelStack {
    /// A zero-filled stack where frame `t` has `depths[t]` slices.
    pub fn new(
        width: usize,
        height: usize,
        depths: &[usize],
        channels: usize,
        sample_type: SampleType,
    ) -> Result<Self> {
        Self::check_extent(width, height, channels)?;
        let plane_len = width * height;
        let frames = depths
            .iter()
            .map(|&depth| vec![vec![0.0; plane_len]; depth * channels])
            .collect();
        Ok(Self {
            width,
            height,
            channels,
            sample_type,
            frames,
        })
    }

    /// A zero-filled stack with the same depth in every frame.
    pub fn uniform(
        width: usize,
        height: usize,
        depth: usize,
        frames: usize,
        channels: usize,
        sample_type: SampleType,
    ) -> Result<Self> {
        Self::new(width, height, &vec![depth; frames], channels, sample_type)
    }

    /// A single-channel stack from planes: `frames[t][z]` holds `width * height`
    /// row-major samples.
    pub fn from_planes(
        width: usize,
        height: usize,
        sample_type: SampleType,
        frames: Vec<Vec<Vec<f64>>>,
    ) -> Result<Self> {
        Self::check_extent(width, height, 1)?;
        let plane_len = width * height;
        for (t, frame) in frames.iter().enumerate() {
            for (z, plane) in frame.iter().enumerate() {
                if plane.len() != plane_len {
                    return Err(ThresholdError::InvalidInput(format!(
                        "plane (t={t}, z={z}) has {} samples, expected {plane_len}",
                        plane.len()
                    )));
                }
            }
        }
        Ok(Self {
            width,
            height,
            channels: 1,
            sample_type,
            frames,
        })
    }

    fn check_extent(width: usize, height: usize, channels: usize) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(ThresholdError::InvalidInput(format!(
                "volume extent {width}x{height} is empty"
            )));
        }
        if channels == 0 {
            return Err(ThresholdError::InvalidInput(
                "volume must have at least one channel".to_string(),
            ));
        }
        Ok(())
    }

    /// The row-major samples of one plane.
    pub fn plane(&self, z: usize, t: usize, c: usize) -> &[f64] {
        &self.frames[t][z * self.channels + c]
    }

    pub fn plane_mut(&mut self, z: usize, t: usize, c: usize) -> &mut [f64] {
        let channels = self.channels;
        &mut self.frames[t][z * channels + c]
    }

    fn bounds_of<'a>(planes: impl Iterator<Item = &'a Vec<f64>>) -> (f64, f64) {
        let (min, max) = planes
            .flat_map(|plane| plane.iter())
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if min > max { (0.0, 0.0) } else { (min, max) }
    }
}

impl Volume for VoxelStack {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn depth_at(&self, t: usize) -> usize {
        self.frames.get(t).map_or(0, |frame| frame.len() / self.channels)
    }

    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    fn voxel(&self, x: usize, y: usize, z: usize, t: usize, c: usize) -> f64 {
        self.plane(z, t, c)[y * self.width + x]
    }

    fn set_voxel(&mut self, x: usize, y: usize, z: usize, t: usize, c: usize, value: f64) {
        let width = self.width;
        let stored = self.sample_type.store(value);
        self.plane_mut(z, t, c)[y * width + x] = stored;
    }

    fn channel_bounds(&self, c: usize) -> (f64, f64) {
        let channels = self.channels;
        Self::bounds_of(
            self.frames
                .iter()
                .flat_map(|frame| frame.iter().skip(c).step_by(channels)),
        )
    }

    fn frame_channel_bounds(&self, c: usize, t: usize) -> (f64, f64) {
        match self.frames.get(t) {
            Some(frame) => Self::bounds_of(frame.iter().skip(c).step_by(self.channels)),
            None => (0.0, 0.0),
        }
    }

    fn visit_frame(&self, c: usize, t: usize, mut visit: impl FnMut(f64)) {
        for z in 0..self.depth_at(t) {
            self.plane(z, t, c).iter().for_each(|&v| visit(v));
        }
    }
}
