// THEORY:
// Every component of the thresholder fails fast and hands the failure straight
// back to the caller. Nothing is retried and nothing is partially written: an
// error means the call produced no output at all. One error enum covers the
// whole crate so the pipeline can forward leaf failures with `?`.

use thiserror::Error;

/// Every way a histogram, clustering, classification or extraction call can fail.
#[derive(Debug, Error)]
pub enum ThresholdError {
    /// Missing volume data, bad channel index, mismatched frame counts and similar.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The intensity range is empty, so no bin width exists.
    #[error("degenerate intensity range [{min}, {max}]")]
    DegenerateRange { min: f64, max: f64 },

    /// A percentile outside `[0, 100]`.
    #[error("value {0} is outside the accepted range [0, 100]")]
    OutOfRangeValue(f64),

    /// A frame was given no thresholds.
    #[error("no thresholds given for frame {frame}")]
    MissingThresholds { frame: usize },

    /// The requested classification method is not known.
    #[error("unsupported thresholding method: {0}")]
    UnsupportedMode(String),

    /// K-means hit its iteration cap without settling.
    #[error("k-means did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },

    /// A worker task panicked or was cancelled.
    #[error("worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ThresholdError>;
