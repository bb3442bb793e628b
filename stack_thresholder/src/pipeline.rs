// THEORY:
// The `pipeline` module is the top-level API of the thresholder. It wraps the
// whole chain (histogram, K-means, threshold derivation, classification and
// region extraction) behind a single `Thresholder` driven by one config.
//
// Which thresholds are used is a tagged choice, `ThresholdMethod`:
// - `Manual` takes user thresholds, either as intensities or as percentiles of
//   the intensity range.
// - `KMeans` derives `classes - 1` thresholds from a histogram.
// `independent_frames` decides whether bounds / histograms are computed per
// time frame or once for the whole channel.
//
// Every call starts from scratch: no histogram, center or threshold survives
// from one call to the next.

use crate::core_modules::classifier::{self, LabeledVolume};
use crate::core_modules::histogram::DEFAULT_BIN_PRECISION;
use crate::core_modules::kmeans::kmeans::DEFAULT_MAX_ITERATIONS;
use crate::core_modules::region::Region;
use crate::core_modules::region_extractor::region_extractor;
use crate::core_modules::thresholds::{self, KMeansParams, ThresholdSet, ThresholdTable};
use crate::core_modules::volume::Volume;
use crate::error::{Result, ThresholdError};
use log::info;
use std::str::FromStr;

/// Where the thresholds come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdMethod {
    /// User thresholds; with `percentile` they are read as percentages of the
    /// intensity range rather than intensities.
    Manual { thresholds: Vec<f64>, percentile: bool },
    /// Histogram K-means with `classes` classes over `bin_precision` bins.
    KMeans { classes: usize, bin_precision: usize },
}

impl ThresholdMethod {
    pub fn kind(&self) -> MethodKind {
        match self {
            ThresholdMethod::Manual { .. } => MethodKind::Manual,
            ThresholdMethod::KMeans { .. } => MethodKind::KMeans,
        }
    }
}

/// The method name alone, as written in configuration or on a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Manual,
    KMeans,
}

impl FromStr for MethodKind {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manual" => Ok(MethodKind::Manual),
            "kmeans" | "k-means" | "k_means" => Ok(MethodKind::KMeans),
            other => Err(ThresholdError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Configuration for the Thresholder.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholderConfig {
    /// Channel of the volume to threshold.
    pub channel: usize,
    pub method: ThresholdMethod,
    /// Compute bounds and histograms per time frame instead of once per channel.
    pub independent_frames: bool,
    /// Cap on K-means iterations.
    pub max_iterations: usize,
}

impl Default for ThresholderConfig {
    fn default() -> Self {
        Self {
            channel: 0,
            method: ThresholdMethod::Manual {
                thresholds: vec![100.0, 200.0],
                percentile: false,
            },
            independent_frames: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl ThresholderConfig {
    /// K-means over the default bin precision.
    pub fn kmeans(classes: usize) -> Self {
        Self {
            method: ThresholdMethod::KMeans {
                classes,
                bin_precision: DEFAULT_BIN_PRECISION,
            },
            ..Self::default()
        }
    }

    pub fn manual(thresholds: Vec<f64>) -> Self {
        Self {
            method: ThresholdMethod::Manual {
                thresholds,
                percentile: false,
            },
            ..Self::default()
        }
    }

    pub fn percentiles(percentiles: Vec<f64>) -> Self {
        Self {
            method: ThresholdMethod::Manual {
                thresholds: percentiles,
                percentile: true,
            },
            ..Self::default()
        }
    }
}

/// What `Thresholder::run` should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Labels,
    Regions,
}

/// The result of `Thresholder::run`.
#[derive(Debug, Clone)]
pub enum Report {
    Labels(LabeledVolume),
    Regions(Vec<Region>),
}

/// The main, top-level struct of the thresholder.
#[derive(Debug, Clone)]
pub struct Thresholder {
    config: ThresholderConfig,
}

impl Thresholder {
    pub fn new(config: ThresholderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ThresholderConfig {
        &self.config
    }

    /// One threshold set per frame of `volume`.
    pub fn thresholds<V: Volume>(&self, volume: &V) -> Result<ThresholdTable> {
        let c = self.config.channel;
        volume.check_channel(c)?;
        let independent = self.config.independent_frames;

        let no_manual_values = matches!(
            &self.config.method,
            ThresholdMethod::Manual { thresholds, .. } if thresholds.is_empty()
        );
        if no_manual_values {
            return Err(ThresholdError::MissingThresholds { frame: 0 });
        }

        let table = match &self.config.method {
            ThresholdMethod::Manual {
                thresholds,
                percentile: true,
            } => thresholds::percentile_table(volume, c, thresholds, independent)?,
            ThresholdMethod::Manual {
                thresholds,
                percentile: false,
            } => {
                let set = ThresholdSet::new(thresholds.clone())?;
                ThresholdTable::shared(&set, volume.frame_count())
            }
            ThresholdMethod::KMeans {
                classes,
                bin_precision,
            } => {
                let params = KMeansParams {
                    classes: *classes,
                    bin_precision: *bin_precision,
                    max_iterations: self.config.max_iterations,
                };
                thresholds::kmeans_table(volume, c, independent, params)?
            }
        };

        info!(
            "{:?} thresholds on channel {c} for {} frame(s), up to {} classes",
            self.config.method.kind(),
            table.frame_count(),
            table.max_label() + 1
        );
        Ok(table)
    }

    /// A new labeled volume; `volume` is left untouched.
    pub fn label<V: Volume>(&self, volume: &V) -> Result<LabeledVolume> {
        let table = self.thresholds(volume)?;
        classifier::classify(volume, self.config.channel, &table)
    }

    /// Overwrites the configured channel of `volume` with labels and returns the
    /// highest label.
    pub fn label_in_place<V: Volume>(&self, volume: &mut V) -> Result<usize> {
        let table = self.thresholds(volume)?;
        classifier::classify_in_place(volume, self.config.channel, &table)
    }

    /// One region per (time, tier) that has any voxel.
    pub fn regions<V: Volume>(&self, volume: &V) -> Result<Vec<Region>> {
        let table = self.thresholds(volume)?;
        let labeled = classifier::classify(volume, self.config.channel, &table)?;
        region_extractor::extract(&labeled, &table)
    }

    pub fn run<V: Volume>(&self, volume: &V, output: OutputKind) -> Result<Report> {
        match output {
            OutputKind::Labels => self.label(volume).map(Report::Labels),
            OutputKind::Regions => self.regions(volume).map(Report::Regions),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::volume::{SampleType, VoxelStack};

    fn row(values: &[f64]) -> VoxelStack {
        let planes = vec![vec![values.to_vec()]];
        VoxelStack::from_planes(values.len(), 1, SampleType::U8, planes).unwrap()
    }

    #[test]
    fn method_names_parse() {
        assert_eq!("manual".parse::<MethodKind>().unwrap(), MethodKind::Manual);
        assert_eq!("K-Means".parse::<MethodKind>().unwrap(), MethodKind::KMeans);
        assert!(matches!(
            "otsu".parse::<MethodKind>(),
            Err(ThresholdError::UnsupportedMode(name)) if name == "otsu"
        ));
    }

    #[test]
    fn default_config_is_manual_100_200() {
        let config = ThresholderConfig::default();
        assert_eq!(config.method.kind(), MethodKind::Manual);
        assert_eq!(config.channel, 0);
        assert!(!config.independent_frames);
        assert_eq!(config.max_iterations, DEFAULT_MAX_ITERATIONS);
    }

    #[test]
    fn manual_labels_follow_inclusive_boundaries() {
        let volume = row(&[50.0, 99.0, 100.0, 150.0, 200.0, 250.0]);
        let labeled = Thresholder::new(ThresholderConfig::manual(vec![100.0, 200.0]))
            .label(&volume)
            .unwrap();
        assert_eq!(labeled.slice(0, 0), &[0, 0, 1, 1, 2, 2]);
        assert_eq!(labeled.max_label(), 2);
    }

    #[test]
    fn percentile_thresholds_use_channel_bounds() {
        let volume = row(&[0.0, 40.0, 60.0, 160.0, 200.0]);
        let thresholder = Thresholder::new(ThresholderConfig::percentiles(vec![25.0, 75.0]));
        let table = thresholder.thresholds(&volume).unwrap();
        assert_eq!(table.frame(0).unwrap().values(), &[50.0, 150.0]);
        assert_eq!(thresholder.label(&volume).unwrap().slice(0, 0), &[0, 0, 1, 2, 2]);
    }

    #[test]
    fn kmeans_splits_two_populations() {
        let volume = row(&[10.0, 12.0, 11.0, 10.0, 240.0, 238.0, 241.0]);
        let labeled = Thresholder::new(ThresholderConfig::kmeans(2)).label(&volume).unwrap();
        assert_eq!(labeled.slice(0, 0), &[0, 0, 0, 0, 1, 1, 1]);
    }

    #[test]
    fn kmeans_with_one_class_is_invalid() {
        let volume = row(&[1.0, 2.0]);
        let result = Thresholder::new(ThresholderConfig::kmeans(1)).label(&volume);
        assert!(matches!(result, Err(ThresholdError::InvalidInput(_))));
    }

    #[test]
    fn empty_manual_thresholds_fail_fast() {
        let volume = row(&[1.0, 2.0]);
        let result = Thresholder::new(ThresholderConfig::manual(Vec::new())).label(&volume);
        assert!(matches!(result, Err(ThresholdError::MissingThresholds { frame: 0 })));

        let thresholder = Thresholder::new(ThresholderConfig::percentiles(Vec::new()));
        let result = thresholder.thresholds(&volume);
        assert!(matches!(result, Err(ThresholdError::MissingThresholds { frame: 0 })));
    }

    #[test]
    fn bad_channel_fails_before_any_work() {
        let volume = row(&[1.0, 2.0]);
        let config = ThresholderConfig {
            channel: 1,
            ..ThresholderConfig::default()
        };
        assert!(matches!(
            Thresholder::new(config).thresholds(&volume),
            Err(ThresholdError::InvalidInput(_))
        ));
    }

    #[test]
    fn in_place_labels_overwrite_the_source() {
        let mut volume = row(&[50.0, 150.0, 250.0]);
        let max = Thresholder::new(ThresholderConfig::default())
            .label_in_place(&mut volume)
            .unwrap();
        assert_eq!(max, 2);
        assert_eq!(volume.plane(0, 0, 0), &[0.0, 1.0, 2.0]);
    }

    #[test]
    fn run_dispatches_on_output_kind() {
        let volume = row(&[0.0, 150.0, 250.0]);
        let thresholder = Thresholder::new(ThresholderConfig::default());
        match thresholder.run(&volume, OutputKind::Regions).unwrap() {
            Report::Regions(regions) => assert_eq!(regions.len(), 2),
            other => panic!("expected regions, got {other:?}"),
        }
        assert!(matches!(
            thresholder.run(&volume, OutputKind::Labels).unwrap(),
            Report::Labels(_)
        ));
    }
}
