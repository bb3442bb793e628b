// THEORY:
// This file is the main entry point for the `stack_thresholder` library crate.
// It defines the public API exposed to consumers such as the `stack_tester`
// command-line tool.
//
// The high-level interface is the `Thresholder` (and its async sibling, the
// `ParallelThresholder`) configured by a `ThresholderConfig`. The building
// blocks in `core_modules` (histograms, K-means, threshold sets, the
// classifier and region extraction) stay public for callers that need a single
// step, e.g. classifying with thresholds computed elsewhere.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use core_modules::classifier::{Label, LabeledVolume};
pub use core_modules::region::{Mask2D, Region, RegionShape};
pub use core_modules::thresholds::{ThresholdSet, ThresholdTable};
pub use core_modules::volume::{SampleType, Volume, VoxelStack};
pub use error::{Result, ThresholdError};
pub use parallel_pipeline::ParallelThresholder;
pub use pipeline::{
    MethodKind, OutputKind, Report, ThresholdMethod, Thresholder, ThresholderConfig,
};
