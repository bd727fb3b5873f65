//! Core value types shared by every collection.
//!
//! Parameters that may be given once for all axes or once per axis are
//! modelled as [`AxisParam`], so argument expansion happens in one place
//! and fails the same way in both execution modes.

use crate::core::error::{ShapeError, ValidationError, ValidationResult};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One image or volume.
pub type Element = ArrayD<f64>;

/// Default target block footprint in megabytes.
pub const DEFAULT_BLOCK_SIZE_MB: f64 = 150.0;

/// Where a collection's elements live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One contiguous in-memory array, operations run eagerly.
    Local,
    /// Keyed partitions evaluated lazily by an engine.
    Distributed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Local => write!(f, "local"),
            Mode::Distributed => write!(f, "distributed"),
        }
    }
}

/// A parameter given either once for every axis or once per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisParam<T> {
    /// Same value on every axis.
    Uniform(T),
    /// One value per axis.
    PerAxis(Vec<T>),
}

impl<T: Clone> AxisParam<T> {
    /// Expand to exactly `ndim` values.
    ///
    /// A per-axis list must already have `ndim` entries.
    pub fn expand(&self, ndim: usize, parameter: &'static str) -> ValidationResult<Vec<T>> {
        match self {
            AxisParam::Uniform(value) => Ok(vec![value.clone(); ndim]),
            AxisParam::PerAxis(values) if values.len() == ndim => Ok(values.clone()),
            AxisParam::PerAxis(values) => Err(ValidationError::ArityMismatch {
                parameter,
                expected: ndim,
                got: values.len(),
            }),
        }
    }

    /// Whether the parameter was given as a single value.
    pub fn is_uniform(&self) -> bool {
        matches!(self, AxisParam::Uniform(_))
    }
}

impl<T> From<T> for AxisParam<T> {
    fn from(value: T) -> Self {
        AxisParam::Uniform(value)
    }
}

impl<T> From<Vec<T>> for AxisParam<T> {
    fn from(values: Vec<T>) -> Self {
        AxisParam::PerAxis(values)
    }
}

impl<T: Clone, const N: usize> From<[T; N]> for AxisParam<T> {
    fn from(values: [T; N]) -> Self {
        AxisParam::PerAxis(values.to_vec())
    }
}

impl<T: Clone> From<&[T]> for AxisParam<T> {
    fn from(values: &[T]) -> Self {
        AxisParam::PerAxis(values.to_vec())
    }
}

/// Right-hand side of [`crate::Images::subtract`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Subtracted from every pixel.
    Scalar(f64),
    /// Subtracted from every element; must match the element dims.
    Array(Element),
}

impl Operand {
    /// Check the operand against the collection's element dims.
    pub fn check(&self, dims: &[usize]) -> Result<(), ShapeError> {
        match self {
            Operand::Scalar(_) => Ok(()),
            Operand::Array(values) if values.shape() == dims => Ok(()),
            Operand::Array(values) => Err(ShapeError::OperandMismatch {
                expected: dims.to_vec(),
                got: values.shape().to_vec(),
            }),
        }
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Scalar(value)
    }
}

impl From<Element> for Operand {
    fn from(values: Element) -> Self {
        Operand::Array(values)
    }
}

/// How to size blocks when repartitioning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSize {
    /// Target footprint per block in megabytes.
    Megabytes(f64),
    /// Explicit block extent per spatial axis (distributed mode only).
    Pixels(Vec<usize>),
}

impl Default for BlockSize {
    fn default() -> Self {
        BlockSize::Megabytes(DEFAULT_BLOCK_SIZE_MB)
    }
}

impl BlockSize {
    /// Whether this is the default size request.
    pub fn is_default(&self) -> bool {
        *self == BlockSize::default()
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockSize::Megabytes(mb) => write!(f, "{} MB", mb),
            BlockSize::Pixels(pixels) => write!(f, "{:?} pixels", pixels),
        }
    }
}

/// Ceiling division, so a final partial stride still yields one sample.
pub fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

/// Prepend the element count to the per-element dims.
pub fn full_shape(count: usize, dims: &[usize]) -> Vec<usize> {
    let mut shape = Vec::with_capacity(dims.len() + 1);
    shape.push(count);
    shape.extend_from_slice(dims);
    shape
}
