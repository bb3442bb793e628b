// THEORY:
// K-means over a 1D histogram. Instead of clustering every voxel, the clusterer
// clusters bin indices, each weighted by its count. That keeps a pass over the
// data proportional to the number of bins, not the number of voxels.
//
// Algorithm:
// 1.  **Init**: the k centers start evenly spaced strictly inside
//     `[0, len - 1]`: center `i` (1-based) is `floor((len - 1) * i / (k + 1))`.
// 2.  **Assign**: every bin goes to the nearest center. On a tie the center
//     found first in index order wins. Centers are not kept sorted while
//     iterating, so "first" is by slot, not by value.
// 3.  **Update**: each center moves to `floor(weighted_sum / weight)` of its
//     bins. A center that received no weight stays where it is.
// 4.  **Stop**: when no center moved. The iteration count is capped; hitting
//     the cap is reported as `NotConverged`.
//
// The result is returned in slot order, unsorted. Callers sort before deriving
// thresholds.

pub mod kmeans {
    use crate::core_modules::histogram::Histogram;
    use crate::error::{Result, ThresholdError};
    use log::debug;

    /// Default cap on K-means iterations.
    pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

    /// Clusters histogram bins into a fixed number of weighted centers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KMeansClusterer {
        k: usize,
        max_iterations: usize,
    }

    impl KMeansClusterer {
        pub fn new(k: usize) -> Self {
            Self {
                k,
                max_iterations: DEFAULT_MAX_ITERATIONS,
            }
        }

        pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
            self.max_iterations = max_iterations.max(1);
            self
        }

        pub fn k(&self) -> usize {
            self.k
        }

        /// Evenly spaced initial centers for a histogram of `len` bins.
        pub fn initial_centers(&self, len: usize) -> Vec<usize> {
            let span = len.saturating_sub(1) as f64;
            (1..=self.k)
                .map(|i| (span * i as f64 / (self.k + 1) as f64) as usize)
                .collect()
        }

        /// Clusters from the evenly spaced initial centers.
        pub fn cluster(&self, histogram: &Histogram) -> Result<Vec<usize>> {
            let seeds = self.initial_centers(histogram.len());
            self.cluster_with_seeds(histogram, seeds)
        }

        /// Clusters starting from caller-provided centers. Returns the settled
        /// centers in slot order.
        pub fn cluster_with_seeds(
            &self,
            histogram: &Histogram,
            seeds: Vec<usize>,
        ) -> Result<Vec<usize>> {
            let len = histogram.len();
            if self.k == 0 || self.k > len {
                return Err(ThresholdError::InvalidInput(format!(
                    "cannot form {} classes from {len} histogram bins",
                    self.k
                )));
            }
            if seeds.len() != self.k {
                return Err(ThresholdError::InvalidInput(format!(
                    "expected {} seed centers, got {}",
                    self.k,
                    seeds.len()
                )));
            }
            if let Some(&bad) = seeds.iter().find(|&&s| s >= len) {
                return Err(ThresholdError::InvalidInput(format!(
                    "seed center {bad} is outside [0, {}]",
                    len - 1
                )));
            }

            let counts = histogram.counts();
            let mut centers = seeds;
            let mut sums = vec![0.0f64; self.k];
            let mut weights = vec![0.0f64; self.k];

            for iteration in 1..=self.max_iterations {
                sums.iter_mut().for_each(|s| *s = 0.0);
                weights.iter_mut().for_each(|w| *w = 0.0);

                for (bin, &count) in counts.iter().enumerate() {
                    let class = nearest_center(&centers, bin);
                    let weight = count as f64;
                    sums[class] += bin as f64 * weight;
                    weights[class] += weight;
                }

                let mut converged = true;
                for (class, center) in centers.iter_mut().enumerate() {
                    if weights[class] == 0.0 {
                        debug!("k-means class {class} is empty, keeping center {center}");
                        continue;
                    }
                    let moved = (sums[class] / weights[class]) as usize;
                    if moved != *center {
                        converged = false;
                        *center = moved;
                    }
                }

                if converged {
                    debug!("k-means settled after {iteration} iterations: {centers:?}");
                    return Ok(centers);
                }
            }

            Err(ThresholdError::NotConverged {
                iterations: self.max_iterations,
            })
        }
    }

    /// Slot of the center closest to `bin`; the first slot wins ties.
    fn nearest_center(centers: &[usize], bin: usize) -> usize {
        let mut closest = 0;
        let mut best = usize::MAX;
        for (slot, &center) in centers.iter().enumerate() {
            let distance = bin.abs_diff(center);
            if distance < best {
                best = distance;
                closest = slot;
            }
        }
        closest
    }

}
