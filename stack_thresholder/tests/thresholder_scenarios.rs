use stack_thresholder::core_modules::classifier::classify_value;
use stack_thresholder::core_modules::histogram::Histogram;
use stack_thresholder::core_modules::kmeans::kmeans::KMeansClusterer;
use stack_thresholder::{
    ParallelThresholder, RegionShape, SampleType, ThresholdError, ThresholdSet, Thresholder,
    ThresholderConfig, Volume, VoxelStack,
};
use std::sync::Arc;

fn set(values: &[f64]) -> ThresholdSet {
    ThresholdSet::new(values.to_vec()).unwrap()
}

fn blob_plane() -> Vec<f64> {
    let mut plane = vec![10.0; 25];
    for (x, y) in [(1, 1), (2, 1), (3, 1), (2, 2), (2, 3)] {
        plane[y * 5 + x] = 220.0;
    }
    plane
}

#[test]
fn two_masses_converge_between_bins_three_and_four() {
    let samples = std::iter::repeat_n(3.0, 10).chain(std::iter::repeat_n(4.0, 10));
    let histogram = Histogram::build(samples, 8, 0.0, 7.0).unwrap();
    assert_eq!(histogram.counts(), &[0, 0, 0, 10, 10, 0, 0, 0]);

    let centers = KMeansClusterer::new(2).cluster(&histogram).unwrap();
    assert_eq!(centers, vec![3, 4]);

    let thresholds = ThresholdSet::from_centers(centers, &histogram).unwrap();
    assert_eq!(thresholds.values(), &[3.5]);
}

#[test]
fn manual_thresholds_are_inclusive_at_each_boundary() {
    let thresholds = set(&[100.0, 200.0]);
    assert_eq!(classify_value(50.0, &thresholds), 0);
    assert_eq!(classify_value(99.0, &thresholds), 0);
    assert_eq!(classify_value(100.0, &thresholds), 1);
    assert_eq!(classify_value(150.0, &thresholds), 1);
    assert_eq!(classify_value(200.0, &thresholds), 2);
}

#[test]
fn single_threshold_splits_in_two() {
    let thresholds = set(&[128.0]);
    assert_eq!(classify_value(128.0, &thresholds), 1);
    assert_eq!(classify_value(127.0, &thresholds), 0);
    assert_eq!(classify_value(1e9, &thresholds), 1);
}

#[test]
fn a_value_on_a_threshold_takes_the_class_above_it() {
    let thresholds = set(&[3.0, 17.5, 40.0, 41.0]);
    for (j, &t) in thresholds.values().iter().enumerate() {
        assert_eq!(classify_value(t, &thresholds), j as u32 + 1);
    }
}

#[test]
fn percentiles_map_onto_the_intensity_range() {
    let set = ThresholdSet::from_percentiles(&[25.0, 75.0], (0.0, 200.0)).unwrap();
    assert_eq!(set.values(), &[50.0, 150.0]);

    let row = vec![0.0, 49.0, 50.0, 150.0, 200.0];
    let volume = VoxelStack::from_planes(5, 1, SampleType::U8, vec![vec![row]]).unwrap();
    let labeled = Thresholder::new(ThresholderConfig::percentiles(vec![25.0, 75.0]))
        .label(&volume)
        .unwrap();
    assert_eq!(labeled.slice(0, 0), &[0, 0, 1, 2, 2]);

    assert!(matches!(
        ThresholdSet::from_percentiles(&[120.0], (0.0, 200.0)),
        Err(ThresholdError::OutOfRangeValue(v)) if v == 120.0
    ));
}

#[test]
fn one_blob_yields_one_flat_region_and_nothing_for_empty_frames() {
    let frames = vec![vec![blob_plane()], vec![vec![10.0; 25]]];
    let volume = VoxelStack::from_planes(5, 5, SampleType::U8, frames).unwrap();
    let regions = Thresholder::new(ThresholderConfig::manual(vec![128.0]))
        .regions(&volume)
        .unwrap();

    assert_eq!(regions.len(), 1);
    let region = &regions[0];
    assert_eq!((region.time, region.tier), (0, 0));
    assert_eq!(region.voxel_count(), 5);
    match &region.shape {
        RegionShape::Flat { slice, mask } => {
            assert_eq!(*slice, 0);
            assert_eq!(mask.bounding_box(), Some(((1, 1), (3, 3))));
        }
        other => panic!("expected a flat region, got {other:?}"),
    }
    assert!(regions.iter().all(|r| r.time != 1));
}

#[test]
fn kmeans_labels_a_sixteen_bit_stack() {
    let frames = vec![vec![
        (0..16).map(|i| if i < 8 { 1000.0 } else { 40000.0 }).collect(),
        (0..16).map(|i| if i % 4 == 0 { 40000.0 } else { 1200.0 }).collect(),
    ]];
    let volume = VoxelStack::from_planes(4, 4, SampleType::U16, frames).unwrap();
    let labeled = Thresholder::new(ThresholderConfig::kmeans(2)).label(&volume).unwrap();

    assert_eq!(labeled.sample_type(), SampleType::U16);
    assert_eq!(labeled.max_label(), 1);
    assert_eq!(labeled.label(0, 0, 0, 0), 0);
    assert_eq!(labeled.label(0, 2, 0, 0), 1);
    assert_eq!(labeled.label(0, 0, 1, 0), 1);
    assert_eq!(labeled.label(1, 0, 1, 0), 0);
}

#[test]
fn in_place_labels_replace_the_channel() {
    let frames = vec![vec![blob_plane()]];
    let mut volume = VoxelStack::from_planes(5, 5, SampleType::U8, frames).unwrap();
    let max = Thresholder::new(ThresholderConfig::manual(vec![128.0]))
        .label_in_place(&mut volume)
        .unwrap();
    assert_eq!(max, 1);
    assert_eq!(volume.voxel(2, 2, 0, 0, 0), 1.0);
    assert_eq!(volume.voxel(0, 0, 0, 0, 0), 0.0);
}

#[tokio::test]
async fn parallel_regions_match_the_synchronous_ones() {
    let frames = vec![vec![blob_plane()], vec![blob_plane()]];
    let volume = VoxelStack::from_planes(5, 5, SampleType::U8, frames).unwrap();
    let config = ThresholderConfig {
        independent_frames: true,
        ..ThresholderConfig::kmeans(2)
    };
    let expected = Thresholder::new(config.clone()).regions(&volume).unwrap();
    let regions = ParallelThresholder::new(config)
        .with_workers(2)
        .regions(Arc::new(volume))
        .await
        .unwrap();

    assert_eq!(regions, expected);
    assert_eq!(regions.len(), 2);
}
