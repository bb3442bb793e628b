// THEORY:
// The `RegionExtractor` is the spatial grouping step. It reads a labeled
// volume and, for every time index and every tier, gathers the voxels carrying
// that tier's label into per-slice masks. Tiers with no voxels at all produce
// no region.
//
// It deliberately stops at "one region per tier": spatially disjoint blobs of
// the same tier stay in the same region. Splitting them apart is the job of a
// `LabelExtractor`, a connected-component collaborator. `FaceConnected` is the
// reference one: it grows blobs breadth-first from every unvisited voxel,
// through the 4 in-plane neighbours plus the same pixel on the adjacent slices
// present in the region.

pub mod region_extractor {
    use crate::core_modules::classifier::LabeledVolume;
    use crate::core_modules::region::{Mask2D, Region};
    use crate::core_modules::thresholds::ThresholdTable;
    use crate::error::{Result, ThresholdError};
    use log::debug;
    use std::collections::{BTreeMap, VecDeque};

    /// Per-tier, per-time regions of `labeled`, ordered by time then tier.
    pub fn extract(labeled: &LabeledVolume, table: &ThresholdTable) -> Result<Vec<Region>> {
        if table.frame_count() != labeled.frame_count() {
            return Err(ThresholdError::InvalidInput(format!(
                "{} threshold frames given for {} labeled frames",
                table.frame_count(),
                labeled.frame_count()
            )));
        }

        let (width, height) = (labeled.width(), labeled.height());
        let mut regions = Vec::new();

        for (t, thresholds) in table.frames().iter().enumerate() {
            let tiers = thresholds.len();

            // masks[tier] holds one mask per slice of this frame.
            let depth = labeled.depth_at(t);
            let mut masks: Vec<Vec<Mask2D>> = vec![vec![Mask2D::new(width, height); depth]; tiers];

            for z in 0..depth {
                for (i, &label) in labeled.slice(z, t).iter().enumerate() {
                    let label = label as usize;
                    if label == 0 || label > tiers {
                        continue;
                    }
                    masks[label - 1][z].bits_mut()[i] = true;
                }
            }

            for (tier, slices) in masks.into_iter().enumerate() {
                let slices = slices.into_iter().enumerate().collect();
                let threshold = thresholds.values()[tier];
                if let Some(region) = Region::from_slices(t, tier, threshold, slices) {
                    debug!("{}: {} voxels", region.name(), region.voxel_count());
                    regions.push(region);
                }
            }
        }

        Ok(regions)
    }

    /// Splits a region into one region per connected blob.
    pub trait LabelExtractor {
        fn split(&self, region: &Region) -> Vec<Region>;
    }

    /// Applies `extractor` to every region, keeping the input order.
    pub fn split_all<E>(extractor: &E, regions: &[Region]) -> Vec<Region>
    where
        E: LabelExtractor + ?Sized,
    {
        regions.iter().flat_map(|region| extractor.split(region)).collect()
    }

    /// 4-connected in plane, and connected to the same pixel on neighbouring slices.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct FaceConnected;

    impl LabelExtractor for FaceConnected {
        fn split(&self, region: &Region) -> Vec<Region> {
            let slices: BTreeMap<usize, &Mask2D> = region.slices().into_iter().collect();
            let Some((_, first)) = slices.first_key_value() else {
                return Vec::new();
            };
            let (width, height) = (first.width, first.height);

            let mut visited: BTreeMap<usize, Vec<bool>> =
                slices.keys().map(|&z| (z, vec![false; width * height])).collect();
            let mut blobs = Vec::new();

            for (&z, mask) in &slices {
                for start in 0..width * height {
                    if !mask.bits()[start] || visited[&z][start] {
                        continue;
                    }
                    let blob = grow_blob(&slices, &mut visited, (start % width, start / width, z));
                    let (time, tier) = (region.time, region.tier);
                    blobs.extend(Region::from_slices(time, tier, region.threshold, blob));
                }
            }
            blobs
        }
    }

    /// Breadth-first flood fill from `seed`, returning the blob as per-slice masks.
    fn grow_blob(
        slices: &BTreeMap<usize, &Mask2D>,
        visited: &mut BTreeMap<usize, Vec<bool>>,
        seed: (usize, usize, usize),
    ) -> Vec<(usize, Mask2D)> {
        let (width, height) = slices.values().next().map_or((0, 0), |m| (m.width, m.height));
        let mut blob: BTreeMap<usize, Mask2D> = BTreeMap::new();
        let mut queue = VecDeque::from([seed]);
        mark(visited, seed, width);

        while let Some((x, y, z)) = queue.pop_front() {
            blob.entry(z)
                .or_insert_with(|| Mask2D::new(width, height))
                .set(x, y, true);

            let mut neighbours = Vec::with_capacity(6);
            if x > 0 {
                neighbours.push((x - 1, y, z));
            }
            if x + 1 < width {
                neighbours.push((x + 1, y, z));
            }
            if y > 0 {
                neighbours.push((x, y - 1, z));
            }
            if y + 1 < height {
                neighbours.push((x, y + 1, z));
            }
            if z > 0 {
                neighbours.push((x, y, z - 1));
            }
            neighbours.push((x, y, z + 1));

            for (nx, ny, nz) in neighbours {
                let Some(mask) = slices.get(&nz) else { continue };
                let index = ny * width + nx;
                if mask.bits()[index] && !visited[&nz][index] {
                    mark(visited, (nx, ny, nz), width);
                    queue.push_back((nx, ny, nz));
                }
            }
        }

        blob.into_iter().collect()
    }

    fn mark(
        visited: &mut BTreeMap<usize, Vec<bool>>,
        (x, y, z): (usize, usize, usize),
        width: usize,
    ) {
        if let Some(plane) = visited.get_mut(&z) {
            plane[y * width + x] = true;
        }
    }

}
