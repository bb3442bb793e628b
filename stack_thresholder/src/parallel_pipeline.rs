// THEORY:
// Time frames never depend on each other: per-frame histograms, per-frame
// K-means and per-frame classification only read their own frame. The
// `ParallelThresholder` exploits that by fanning frames out to blocking tokio
// tasks, at most `workers` at a time, and gathering the results back in frame
// order. The output is identical to the synchronous `Thresholder`.
//
// The volume is shared read-only through an `Arc`; in-place output is not
// offered here because it needs exclusive access to the whole volume.

use crate::core_modules::classifier::{self, Label, LabeledVolume};
use crate::core_modules::region::Region;
use crate::core_modules::region_extractor::region_extractor;
use crate::core_modules::thresholds::{self, KMeansParams, ThresholdTable};
use crate::core_modules::volume::Volume;
use crate::error::{Result, ThresholdError};
use crate::pipeline::{ThresholdMethod, Thresholder, ThresholderConfig};
use futures::future::join_all;
use log::debug;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub struct ParallelThresholder {
    thresholder: Thresholder,
    workers: usize,
}

impl ParallelThresholder {
    pub fn new(config: ThresholderConfig) -> Self {
        Self {
            thresholder: Thresholder::new(config),
            workers: num_cpus::get().max(1),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn config(&self) -> &ThresholderConfig {
        self.thresholder.config()
    }

    /// Runs `job(t)` for every frame on the blocking pool, `workers` at a time.
    async fn per_frame<T, F>(&self, frames: usize, job: F) -> Result<Vec<T>>
    where
        T: Send + 'static,
        F: Fn(usize) -> Result<T> + Send + Sync + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let job = Arc::new(job);

        let tasks = (0..frames).map(|t| {
            let semaphore = Arc::clone(&semaphore);
            let job = Arc::clone(&job);
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ThresholdError::Worker(e.to_string()))?;
                debug!("frame {t} dispatched");
                tokio::task::spawn_blocking(move || job(t))
                    .await
                    .map_err(|e| ThresholdError::Worker(e.to_string()))?
            }
        });

        join_all(tasks).await.into_iter().collect()
    }

    /// One threshold set per frame. Independent K-means clusters every frame on
    /// its own task; other modes run the synchronous derivation once.
    pub async fn thresholds<V>(&self, volume: Arc<V>) -> Result<ThresholdTable>
    where
        V: Volume + Send + Sync + 'static,
    {
        let config = self.config();
        let c = config.channel;
        volume.check_channel(c)?;

        match (&config.method, config.independent_frames) {
            (
                ThresholdMethod::KMeans {
                    classes,
                    bin_precision,
                },
                true,
            ) => {
                let params = KMeansParams {
                    classes: *classes,
                    bin_precision: *bin_precision,
                    max_iterations: config.max_iterations,
                };
                let shared = Arc::clone(&volume);
                let frames = self
                    .per_frame(volume.frame_count(), move |t| {
                        thresholds::kmeans_frame_thresholds(&*shared, c, t, params)
                    })
                    .await?;
                Ok(ThresholdTable::per_frame(frames))
            }
            _ => {
                let thresholder = self.thresholder.clone();
                let table = tokio::task::spawn_blocking(move || thresholder.thresholds(&*volume))
                    .await
                    .map_err(|e| ThresholdError::Worker(e.to_string()))??;
                Ok(table)
            }
        }
    }

    /// A new labeled volume, one classification task per frame.
    pub async fn label<V>(&self, volume: Arc<V>) -> Result<LabeledVolume>
    where
        V: Volume + Send + Sync + 'static,
    {
        let table = self.thresholds(Arc::clone(&volume)).await?;
        self.label_with(volume, &table).await
    }

    /// Labels `volume` against a table derived earlier, e.g. by `thresholds`.
    pub async fn label_with<V>(
        &self,
        volume: Arc<V>,
        table: &ThresholdTable,
    ) -> Result<LabeledVolume>
    where
        V: Volume + Send + Sync + 'static,
    {
        let c = self.config().channel;
        volume.check_channel(c)?;
        table.validate(volume.frame_count())?;

        let shared = Arc::clone(&volume);
        let sets = Arc::new(table.clone());
        let frames: Vec<Vec<Vec<Label>>> = self
            .per_frame(volume.frame_count(), move |t| {
                let set = sets
                    .frame(t)
                    .ok_or(ThresholdError::MissingThresholds { frame: t })?;
                Ok(classifier::classify_frame(&*shared, c, t, set))
            })
            .await?;

        Ok(LabeledVolume::from_frames(&*volume, table, frames))
    }

    /// One region per (time, tier), with classification fanned out per frame.
    pub async fn regions<V>(&self, volume: Arc<V>) -> Result<Vec<Region>>
    where
        V: Volume + Send + Sync + 'static,
    {
        let table = self.thresholds(Arc::clone(&volume)).await?;
        let labeled = self.label_with(volume, &table).await?;
        self.regions_from(&labeled, &table)
    }

    /// Regions of an already labeled volume and the table it was labeled with.
    pub fn regions_from(
        &self,
        labeled: &LabeledVolume,
        table: &ThresholdTable,
    ) -> Result<Vec<Region>> {
        region_extractor::extract(labeled, table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::thresholds::ThresholdSet;
    use crate::core_modules::volume::{SampleType, VoxelStack};

    fn drifting_stack() -> VoxelStack {
        // Three frames whose two populations drift upwards over time.
        let frames = (0..3)
            .map(|t| {
                let offset = 40.0 * t as f64;
                let plane: Vec<f64> = (0..16)
                    .map(|i| if i % 2 == 0 { 5.0 + offset } else { 60.0 + offset })
                    .collect();
                vec![plane.clone(), plane]
            })
            .collect();
        VoxelStack::from_planes(4, 4, SampleType::U8, frames).unwrap()
    }

    fn independent_kmeans() -> ThresholderConfig {
        ThresholderConfig {
            independent_frames: true,
            ..ThresholderConfig::kmeans(2)
        }
    }

    #[tokio::test]
    async fn matches_the_synchronous_thresholds() {
        let stack = drifting_stack();
        let thresholder = Thresholder::new(independent_kmeans());
        let expected = thresholder.thresholds(&stack).unwrap();

        let parallel = ParallelThresholder::new(independent_kmeans()).with_workers(2);
        let table = parallel.thresholds(Arc::new(stack)).await.unwrap();
        assert_eq!(table, expected);
        assert_eq!(table.frame_count(), 3);
    }

    #[tokio::test]
    async fn matches_the_synchronous_labels() {
        let stack = drifting_stack();
        let expected = Thresholder::new(independent_kmeans()).label(&stack).unwrap();

        let labeled = ParallelThresholder::new(independent_kmeans())
            .label(Arc::new(stack))
            .await
            .unwrap();
        assert_eq!(labeled, expected);
        assert_eq!(labeled.slice(1, 2)[..2], [0, 1]);
    }

    #[tokio::test]
    async fn shared_modes_delegate_to_the_synchronous_path() {
        let stack = Arc::new(drifting_stack());
        let parallel = ParallelThresholder::new(ThresholderConfig::manual(vec![50.0]));
        let regions = parallel.regions(Arc::clone(&stack)).await.unwrap();
        // Odd pixels clear 50 in every frame; even pixels only in frame 2.
        assert_eq!(regions.len(), 3);
        assert!(regions.iter().all(|r| r.tier == 0));
        assert_eq!(regions[2].voxel_count(), 32);
    }

    #[tokio::test]
    async fn one_table_serves_labels_and_regions() {
        let stack = Arc::new(drifting_stack());
        let parallel = ParallelThresholder::new(independent_kmeans()).with_workers(2);
        let table = parallel.thresholds(Arc::clone(&stack)).await.unwrap();

        let labeled = parallel.label_with(Arc::clone(&stack), &table).await.unwrap();
        assert_eq!(labeled, parallel.label(Arc::clone(&stack)).await.unwrap());

        let regions = parallel.regions_from(&labeled, &table).unwrap();
        assert_eq!(regions, parallel.regions(stack).await.unwrap());
        assert_eq!(regions.len(), 3);
    }

    #[tokio::test]
    async fn a_table_for_another_volume_is_rejected() {
        let parallel = ParallelThresholder::new(ThresholderConfig::manual(vec![50.0]));
        let table = ThresholdTable::shared(&ThresholdSet::new(vec![50.0]).unwrap(), 1);
        let result = parallel.label_with(Arc::new(drifting_stack()), &table).await;
        assert!(matches!(result, Err(ThresholdError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn bad_channel_is_reported() {
        let config = ThresholderConfig {
            channel: 3,
            ..independent_kmeans()
        };
        let parallel = ParallelThresholder::new(config);
        let result = parallel.thresholds(Arc::new(drifting_stack())).await;
        assert!(matches!(result, Err(ThresholdError::InvalidInput(_))));
    }

    #[test]
    fn worker_count_is_at_least_one() {
        let parallel = ParallelThresholder::new(ThresholderConfig::default()).with_workers(0);
        assert_eq!(parallel.workers(), 1);
        assert!(ParallelThresholder::new(ThresholderConfig::default()).workers() >= 1);
    }
}
