// Leaf components, in data-flow order: volume -> histogram -> kmeans ->
// thresholds -> classifier -> region_extractor.

pub mod volume;
pub mod histogram;
pub mod kmeans;
pub mod thresholds;
pub mod classifier;
pub mod region;
pub mod region_extractor;
pub mod utils;
