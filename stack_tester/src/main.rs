use anyhow::{Context, bail};
use clap::{ArgAction, Parser};
use flexi_logger::{Duplicate, Logger, LoggerHandle};
use log::{info, warn};
use stack_thresholder::core_modules::histogram::DEFAULT_BIN_PRECISION;
use stack_thresholder::core_modules::region_extractor::region_extractor::{
    FaceConnected, split_all,
};
use stack_thresholder::core_modules::utils::image_helper::image_helper;
use stack_thresholder::{
    MethodKind, ParallelThresholder, ThresholdMethod, ThresholderConfig, Volume,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const SLICE_EXTENSIONS: [&str; 4] = ["png", "tif", "tiff", "bmp"];

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-level thresholding of image slice stacks")]
struct Cli {
    /// Slice images in stack order, or a single directory of slices
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Where the label slices are written
    #[arg(short, long, default_value = "labels")]
    output: PathBuf,

    /// Threshold method: manual or kmeans
    #[arg(short, long, default_value = "manual")]
    method: String,

    /// Number of K-means classes
    #[arg(short = 'k', long, default_value_t = 2)]
    classes: usize,

    /// Histogram bins used by K-means
    #[arg(long, default_value_t = DEFAULT_BIN_PRECISION)]
    bins: usize,

    /// Manual thresholds, comma separated
    #[arg(short, long, value_delimiter = ',', default_values_t = [100.0, 200.0])]
    thresholds: Vec<f64>,

    /// Read manual thresholds as percentages of the intensity range
    #[arg(short, long)]
    percentile: bool,

    /// Compute thresholds separately for every time frame
    #[arg(short, long)]
    independent: bool,

    /// Number of time frames the slices are split into
    #[arg(short, long, default_value_t = 1)]
    frames: usize,

    /// Worker tasks; defaults to the number of CPUs
    #[arg(short, long)]
    workers: Option<usize>,

    /// Also split every tier into face-connected blobs and log them
    #[arg(long, action = ArgAction::SetTrue)]
    regions: bool,

    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn config(&self) -> anyhow::Result<ThresholderConfig> {
        let method = match self.method.parse::<MethodKind>()? {
            MethodKind::Manual => ThresholdMethod::Manual {
                thresholds: self.thresholds.clone(),
                percentile: self.percentile,
            },
            MethodKind::KMeans => ThresholdMethod::KMeans {
                classes: self.classes,
                bin_precision: self.bins,
            },
        };
        Ok(ThresholderConfig {
            method,
            independent_frames: self.independent,
            ..ThresholderConfig::default()
        })
    }
}

fn setup_logging(level: &str) -> anyhow::Result<LoggerHandle> {
    let handle = Logger::try_with_str(level)?
        .log_to_stdout()
        .duplicate_to_stderr(Duplicate::Warn)
        .start()?;
    Ok(handle)
}

/// Expands a lone directory argument into its slice files, sorted by name.
fn slice_paths(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let [dir] = inputs else {
        return Ok(inputs.to_vec());
    };
    if !dir.is_dir() {
        return Ok(inputs.to_vec());
    }

    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_slice(path))
        .collect();
    paths.sort();
    if paths.is_empty() {
        bail!("no slice images in {}", dir.display());
    }
    Ok(paths)
}

fn is_slice(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SLICE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Argument Parsing & Setup ---
    let cli = Cli::parse();
    let _logger = setup_logging(&cli.log_level)?;
    let config = cli.config()?;

    // --- 2. Stack Loading ---
    let paths = slice_paths(&cli.inputs)?;
    let stack = image_helper::load_stack(&paths, cli.frames).context("loading slice stack")?;
    info!(
        "stack: {}x{}, {} frame(s) of {} slice(s)",
        stack.width(),
        stack.height(),
        stack.frame_count(),
        stack.depth_at(0)
    );
    let stack = Arc::new(stack);

    // --- 3. Thresholding ---
    let mut thresholder = ParallelThresholder::new(config);
    if let Some(workers) = cli.workers {
        thresholder = thresholder.with_workers(workers);
    }
    let table = thresholder.thresholds(Arc::clone(&stack)).await?;
    for (t, set) in table.frames().iter().enumerate() {
        info!("frame {t}: thresholds {:?}", set.values());
    }

    // --- 4. Labeling & Output ---
    let labeled = thresholder.label_with(stack, &table).await?;
    let written = image_helper::save_labels(&labeled, &cli.output, "labels")?;
    info!("{} label slices written, max label {}", written.len(), labeled.max_label());

    // --- 5. Regions ---
    if cli.regions {
        let regions = thresholder.regions_from(&labeled, &table)?;
        if regions.is_empty() {
            warn!("no voxel reached the first threshold");
        }
        for region in &regions {
            let kind = if region.is_flat() { "flat" } else { "stack" };
            info!("{} ({kind}): {} voxels", region.name(), region.voxel_count());
        }
        let blobs = split_all(&FaceConnected, &regions);
        info!("{} regions, {} face-connected blobs", regions.len(), blobs.len());
    }

    Ok(())
}
