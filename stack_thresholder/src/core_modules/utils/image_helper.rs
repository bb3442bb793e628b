pub mod image_helper {
    use crate::core_modules::classifier::LabeledVolume;
    use crate::core_modules::volume::{SampleType, VoxelStack};
    use crate::error::{Result, ThresholdError};
    use image::{ColorType, DynamicImage, ImageEncoder};
    use log::info;
    use std::path::{Path, PathBuf};

    /// Reads grayscale slices into a single-channel stack. `paths` are taken in
    /// order and split evenly into `frames` frames (slice index runs fastest).
    pub fn load_stack<P: AsRef<Path>>(paths: &[P], frames: usize) -> Result<VoxelStack> {
        if paths.is_empty() {
            return Err(ThresholdError::InvalidInput("no slice images given".to_string()));
        }
        if frames == 0 || paths.len() % frames != 0 {
            return Err(ThresholdError::InvalidInput(format!(
                "{} slices cannot be split into {frames} frames",
                paths.len()
            )));
        }

        let images = paths
            .iter()
            .map(|p| image::open(p.as_ref()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let (width, height) = (images[0].width(), images[0].height());
        if let Some(odd) = images.iter().position(|i| i.width() != width || i.height() != height) {
            return Err(ThresholdError::InvalidInput(format!(
                "slice {} is {}x{}, expected {width}x{height}",
                paths[odd].as_ref().display(),
                images[odd].width(),
                images[odd].height()
            )));
        }

        let sample_type = sample_type_of(images[0].color());
        let planes: Vec<Vec<f64>> = images.iter().map(|i| plane_of(i, sample_type)).collect();
        let depth = planes.len() / frames;
        let frames = planes.chunks(depth).map(<[Vec<f64>]>::to_vec).collect();

        info!("loaded {} slices of {width}x{height} ({sample_type:?})", paths.len());
        VoxelStack::from_planes(width as usize, height as usize, sample_type, frames)
    }

    fn sample_type_of(color: ColorType) -> SampleType {
        match color {
            ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
                SampleType::U16
            }
            ColorType::Rgb32F | ColorType::Rgba32F => SampleType::F32,
            _ => SampleType::U8,
        }
    }

    fn plane_of(img: &DynamicImage, sample_type: SampleType) -> Vec<f64> {
        match sample_type {
            SampleType::U16 => img.to_luma16().into_raw().into_iter().map(f64::from).collect(),
            SampleType::F32 | SampleType::F64 => {
                img.to_luma32f().into_raw().into_iter().map(f64::from).collect()
            }
            SampleType::U8 => img.to_luma8().into_raw().into_iter().map(f64::from).collect(),
        }
    }

    /// Writes one 8-bit PNG per `(t, z)` slice, named `<prefix>_t<t>_z<z>.png`.
    /// Labels are spread across `0..=255` so classes are distinguishable by eye.
    pub fn save_labels(labeled: &LabeledVolume, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let scale = 255 / labeled.max_label().clamp(1, 255) as u32;
        let (width, height) = (labeled.width() as u32, labeled.height() as u32);
        let mut written = Vec::new();

        for (t, frame) in labeled.frames().iter().enumerate() {
            for (z, slice) in frame.iter().enumerate() {
                let buffer: Vec<u8> = slice.iter().map(|&l| (l * scale).min(255) as u8).collect();
                let path = dir.join(format!("{prefix}_t{t}_z{z}.png"));
                save(&path, width, height, &buffer)?;
                written.push(path);
            }
        }

        info!("wrote {} label slices to {}", written.len(), dir.display());
        Ok(written)
    }

    pub fn save(path: &Path, width: u32, height: u32, buffer: &[u8]) -> Result<()> {
        let output = std::fs::File::create(path)?;
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(buffer, width, height, image::ExtendedColorType::L8)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::core_modules::classifier::classify;
    use crate::core_modules::thresholds::{ThresholdSet, ThresholdTable};
    use crate::core_modules::volume::{SampleType, Volume};
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("stack_thresholder_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).expect("Error creating scratch dir.");
        dir
    }

    fn gradient_slice(dir: &PathBuf, name: &str, width: u32, height: u32, offset: u8) -> PathBuf {
        let buffer: Vec<u8> = (0..width * height)
            .map(|i| (i as u8).wrapping_mul(8).saturating_add(offset))
            .collect();
        let path = dir.join(name);
        save(&path, width, height, &buffer).expect("Error Saving File.");
        path
    }

    #[test]
    fn round_trips_gradient_slices_into_frames() {
        let dir = scratch_dir("load");
        let paths: Vec<PathBuf> = (0..4)
            .map(|i| gradient_slice(&dir, &format!("slice_{i}.png"), 6, 4, i as u8))
            .collect();

        let stack = load_stack(&paths, 2).unwrap();
        assert_eq!(stack.width(), 6);
        assert_eq!(stack.height(), 4);
        assert_eq!(stack.frame_count(), 2);
        assert_eq!(stack.depth_at(0), 2);
        assert_eq!(stack.sample_type(), SampleType::U8);
        assert_eq!(stack.voxel(1, 0, 1, 1, 0), 8.0 + 3.0);
    }

    #[test]
    fn uneven_frame_split_is_rejected() {
        let dir = scratch_dir("uneven");
        let paths: Vec<PathBuf> = (0..3)
            .map(|i| gradient_slice(&dir, &format!("slice_{i}.png"), 2, 2, 0))
            .collect();
        assert!(load_stack(&paths, 2).is_err());
        assert!(load_stack::<PathBuf>(&[], 1).is_err());
    }

    #[test]
    fn mismatched_slice_sizes_are_rejected() {
        let dir = scratch_dir("sizes");
        let paths = vec![
            gradient_slice(&dir, "a.png", 4, 4, 0),
            gradient_slice(&dir, "b.png", 5, 4, 0),
        ];
        assert!(load_stack(&paths, 1).is_err());
    }

    #[test]
    fn saves_one_png_per_slice() {
        let dir = scratch_dir("save");
        let paths = vec![
            gradient_slice(&dir, "a.png", 8, 8, 0),
            gradient_slice(&dir, "b.png", 8, 8, 40),
        ];
        let stack = load_stack(&paths, 1).unwrap();
        let set = ThresholdSet::new(vec![100.0, 200.0]).unwrap();
        let labeled = classify(&stack, 0, &ThresholdTable::shared(&set, 1)).unwrap();

        let out = dir.join("labels");
        let written = save_labels(&labeled, &out, "mask").unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[1].ends_with("mask_t0_z1.png"));

        let reread = image::open(&written[0]).unwrap().to_luma8();
        let max = reread.pixels().map(|p| p.0[0]).max().unwrap();
        assert_eq!(max, 254);
    }
}
