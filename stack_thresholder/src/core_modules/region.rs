// THEORY:
// A `Region` is the spatial extent of one class at one time point. It is a
// "dumb" data container: a time index, the tier it represents, the threshold
// value at the bottom of that tier, and one boolean mask per non-empty slice.
//
// Key architectural principles:
// 1.  **Identity is (time, tier)**: tier `j` holds the voxels labeled `j + 1`;
//     background is never a region.
// 2.  **Flat or stacked**: a region that touches a single slice is a flat 2D
//     mask (it keeps the index of that slice); a region spread over several
//     slices is an ordered stack of per-slice masks. Empty slices are omitted.
// 3.  **Fresh every call**: regions are built from a labeled volume each time
//     they are asked for; nothing is cached between calls.

/// A 2D boolean mask with the spatial extent of the source volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask2D {
    pub width: usize,
    pub height: usize,
    bits: Vec<bool>,
}

impl Mask2D {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> bool {
        self.bits[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: bool) {
        self.bits[y * self.width + x] = value;
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub(crate) fn bits_mut(&mut self) -> &mut [bool] {
        &mut self.bits
    }

    /// Number of set pixels.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|&b| b)
    }

    /// Top-left and bottom-right corners (inclusive) of the set pixels.
    pub fn bounding_box(&self) -> Option<((usize, usize), (usize, usize))> {
        let mut corners: Option<((usize, usize), (usize, usize))> = None;
        for (i, _) in self.bits.iter().enumerate().filter(|(_, b)| **b) {
            let (x, y) = (i % self.width, i / self.width);
            corners = Some(match corners {
                None => ((x, y), (x, y)),
                Some(((x0, y0), (x1, y1))) => ((x0.min(x), y0.min(y)), (x1.max(x), y1.max(y))),
            });
        }
        corners
    }
}

/// The geometry of a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionShape {
    /// Exactly one non-empty slice.
    Flat { slice: usize, mask: Mask2D },
    /// Several non-empty slices, ordered by slice index.
    Stack(Vec<(usize, Mask2D)>),
}

/// One class (tier) at one time index.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub time: usize,
    /// Tier `j` holds the voxels labeled `j + 1`.
    pub tier: usize,
    /// The lower threshold of the tier.
    pub threshold: f64,
    pub shape: RegionShape,
}

impl Region {
    /// Builds a region from its non-empty slices, or `None` when there are none.
    pub fn from_slices(
        time: usize,
        tier: usize,
        threshold: f64,
        mut slices: Vec<(usize, Mask2D)>,
    ) -> Option<Self> {
        slices.retain(|(_, mask)| !mask.is_empty());
        slices.sort_by_key(|(z, _)| *z);
        let shape = match slices.len() {
            0 => return None,
            1 => {
                let (slice, mask) = slices.remove(0);
                RegionShape::Flat { slice, mask }
            }
            _ => RegionShape::Stack(slices),
        };
        Some(Self {
            time,
            tier,
            threshold,
            shape,
        })
    }

    /// Label value of the voxels in this region.
    pub fn label(&self) -> u32 {
        self.tier as u32 + 1
    }

    pub fn name(&self) -> String {
        format!("[T={}] Threshold: {}", self.time, self.threshold)
    }

    pub fn is_flat(&self) -> bool {
        matches!(self.shape, RegionShape::Flat { .. })
    }

    /// `(slice index, mask)` pairs in slice order, for either shape.
    pub fn slices(&self) -> Vec<(usize, &Mask2D)> {
        match &self.shape {
            RegionShape::Flat { slice, mask } => vec![(*slice, mask)],
            RegionShape::Stack(slices) => slices.iter().map(|(z, m)| (*z, m)).collect(),
        }
    }

    pub fn voxel_count(&self) -> usize {
        self.slices().iter().map(|(_, mask)| mask.count()).sum()
    }

    pub fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        self.slices()
            .iter()
            .any(|(slice, mask)| *slice == z && mask.get(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with(width: usize, height: usize, points: &[(usize, usize)]) -> Mask2D {
        let mut mask = Mask2D::new(width, height);
        for &(x, y) in points {
            mask.set(x, y, true);
        }
        mask
    }

    #[test]
    fn mask_counts_and_bounds() {
        let mask = mask_with(5, 5, &[(1, 1), (3, 2), (2, 4)]);
        assert_eq!(mask.count(), 3);
        assert!(!mask.is_empty());
        assert_eq!(mask.bounding_box(), Some(((1, 1), (3, 4))));
        assert_eq!(Mask2D::new(2, 2).bounding_box(), None);
    }

    #[test]
    fn one_slice_is_flat() {
        let region = Region::from_slices(
            2,
            0,
            12.5,
            vec![(0, Mask2D::new(3, 3)), (4, mask_with(3, 3, &[(1, 1)]))],
        )
        .unwrap();
        assert!(region.is_flat());
        assert_eq!(region.shape, RegionShape::Flat { slice: 4, mask: mask_with(3, 3, &[(1, 1)]) });
        assert_eq!(region.name(), "[T=2] Threshold: 12.5");
        assert_eq!(region.label(), 1);
        assert!(region.contains(1, 1, 4));
        assert!(!region.contains(1, 1, 0));
    }

    #[test]
    fn several_slices_stack_in_order() {
        let region = Region::from_slices(
            0,
            1,
            7.0,
            vec![(3, mask_with(2, 2, &[(0, 0)])), (1, mask_with(2, 2, &[(1, 1), (0, 1)]))],
        )
        .unwrap();
        assert!(!region.is_flat());
        let order: Vec<usize> = region.slices().iter().map(|(z, _)| *z).collect();
        assert_eq!(order, vec![1, 3]);
        assert_eq!(region.voxel_count(), 3);
    }

    #[test]
    fn no_non_empty_slice_means_no_region() {
        assert!(Region::from_slices(0, 0, 1.0, vec![(0, Mask2D::new(2, 2))]).is_none());
        assert!(Region::from_slices(0, 0, 1.0, Vec::new()).is_none());
    }
}
