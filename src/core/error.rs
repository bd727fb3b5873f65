//! Error types for framestack.
//!
//! Uses thiserror for structured errors. The kinds are kept apart on purpose:
//! - `ValidationError` for bad arguments, raised before any engine work
//! - `ShapeError` for per-element dimension mismatches
//! - `EngineError` for failures inside the partitioned backend
//! - `ExportError` for the file writers
//!
//! Non-fatal conditions are not errors; see [`crate::core::observe::Advisory`].

use crate::core::types::Mode;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for framestack.
///
/// Encompasses every error category and enables `?` conversion from each
/// specific kind.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cannot compute {operation} of an empty collection")]
    EmptyCollection { operation: &'static str },
}

/// Invalid arguments, detected synchronously at the call that received them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("All sampling factors must be positive; got {factors:?}")]
    NonPositiveFactor { factors: Vec<usize> },

    #[error("Parameter '{parameter}' has {got} values but images have {expected} dimensions")]
    ArityMismatch {
        parameter: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Axis for projection ({axis}) exceeds image dimensions (0-{max})")]
    AxisOutOfRange { axis: usize, max: usize },

    #[error("Number of samples must be larger than 0, got {0}")]
    SampleSize(usize),

    #[error("Filter size must be at least 1 on every filtered axis, got {sizes:?}")]
    FilterSize { sizes: Vec<usize> },

    #[error("Gaussian sigma must be finite and non-negative, got {sigma:?}")]
    Sigma { sigma: Vec<f64> },

    #[error("Invalid block size: {reason}")]
    BlockSize { reason: String },

    #[error("Must provide an execution engine to convert to distributed mode")]
    MissingEngine,

    #[error("Images need at least {required} axes, got {got}")]
    TooFewAxes { required: usize, got: usize },

    #[error("Cannot combine a {left} collection with a {right} collection")]
    ModeMismatch { left: Mode, right: Mode },
}

/// Per-element dimension mismatches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Element {index} has dimensions {got:?}, expected {expected:?}")]
    InconsistentElement {
        index: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Cannot subtract array with dimensions {got:?} from images with dimensions {expected:?}")]
    OperandMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("Function output has dimensions {got:?} but {declared:?} were declared")]
    DeclaredDims { declared: Vec<usize>, got: Vec<usize> },

    #[error("Cannot concatenate images with dimensions {left:?} and {right:?}")]
    Concatenate { left: Vec<usize>, right: Vec<usize> },

    #[error("Array of shape {shape:?} cannot be laid out as {expected:?}")]
    Layout { shape: Vec<usize>, expected: Vec<usize> },
}

/// Failures raised while a partitioned computation runs.
///
/// Cloneable so memoised shuffle results can hand the same failure to every
/// partition that depends on them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Failed to build worker pool: {0}")]
    PoolBuild(String),

    #[error("Partition {partition} failed: {reason}")]
    TaskFailed { partition: usize, reason: String },

    #[error("Shape mismatch during execution: {0}")]
    Shape(#[from] ShapeError),

    #[error("Partition {partition} is out of range for a collection with {partitions} partitions")]
    MissingPartition { partition: usize, partitions: usize },

    #[error("Execution aborted")]
    Aborted,
}

/// Errors from the export writers.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Output path {path} must sit one level below an existing directory")]
    DirectoryPlacement { path: PathBuf },

    #[error("Output directory {path} already exists; set overwrite to replace it")]
    AlreadyExists { path: PathBuf },

    #[error("Cannot write elements with dimensions {dims:?} as {format}")]
    UnsupportedDims { dims: Vec<usize>, format: &'static str },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {error}")]
    Read { path: PathBuf, error: std::io::Error },

    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Error Utilities
// ============================================================================

impl Error {
    /// Whether the error was raised by argument checking rather than execution.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// Whether the error concerns per-element dimensions, wherever it surfaced.
    pub fn is_shape(&self) -> bool {
        matches!(self, Error::Shape(_) | Error::Engine(EngineError::Shape(_)))
    }
}

impl ValidationError {
    /// Get suggestion for fixing this error.
    pub fn suggested_fix(&self) -> Option<String> {
        match self {
            ValidationError::ArityMismatch { parameter, expected, .. } => Some(format!(
                "Pass a single value or exactly {} values for '{}'",
                expected, parameter
            )),
            ValidationError::AxisOutOfRange { max, .. } => {
                Some(format!("Choose an axis between 0 and {}", max))
            }
            ValidationError::MissingEngine => {
                Some("Create an engine such as RayonEngine and pass it along".to_string())
            }
            _ => None,
        }
    }
}

/// Result type alias for framestack operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for argument checks.
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;

/// Result type alias for partitioned execution.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Result type alias for export operations.
pub type ExportResult<T> = std::result::Result<T, ExportError>;
