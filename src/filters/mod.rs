//! Per-element numerical filters.
//!
//! [`ElementFilter`] validates filter parameters against the element dims
//! once, then applies to any number of elements. Both execution modes build
//! the same `ElementFilter` and map it over their elements.

pub mod kernels;
pub mod nd;
pub mod stats;

use crate::core::error::{ValidationError, ValidationResult};
use crate::core::types::{AxisParam, Element};
use ndarray::{ArrayViewD, Axis};

pub use stats::pearson;

/// Which smoothing to run.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterKind {
    /// Gaussian with per-axis sigma and derivative order.
    Gaussian { sigma: Vec<f64>, order: Vec<usize> },
    /// Box mean with per-axis window size.
    Uniform { size: Vec<usize> },
    /// Median with per-axis window size.
    Median { size: Vec<usize> },
}

impl FilterKind {
    fn run(&self, input: ArrayViewD<'_, f64>) -> Element {
        match self {
            FilterKind::Gaussian { sigma, order } => nd::gaussian_filter(input, sigma, order),
            FilterKind::Uniform { size } => nd::uniform_filter(input, size),
            FilterKind::Median { size } => nd::median_filter(input, size),
        }
    }
}

/// A validated filter ready to apply to elements of fixed dims.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementFilter {
    kind: FilterKind,
    /// Run over 2-D slices along the third axis.
    slicewise: bool,
}

impl ElementFilter {
    /// Gaussian smoothing; sigma 0 leaves an axis untouched.
    pub fn gaussian(
        sigma: &AxisParam<f64>,
        order: &AxisParam<usize>,
        dims: &[usize],
    ) -> ValidationResult<Self> {
        let sigma = sigma.expand(dims.len(), "sigma")?;
        let order = order.expand(dims.len(), "order")?;
        if sigma.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(ValidationError::Sigma { sigma });
        }

        Ok(Self {
            kind: FilterKind::Gaussian { sigma, order },
            slicewise: false,
        })
    }

    /// Box mean smoothing.
    pub fn uniform(size: &AxisParam<usize>, dims: &[usize]) -> ValidationResult<Self> {
        let (size, slicewise) = window_sizes(size, dims)?;
        Ok(Self {
            kind: FilterKind::Uniform { size },
            slicewise,
        })
    }

    /// Median smoothing.
    pub fn median(size: &AxisParam<usize>, dims: &[usize]) -> ValidationResult<Self> {
        let (size, slicewise) = window_sizes(size, dims)?;
        Ok(Self {
            kind: FilterKind::Median { size },
            slicewise,
        })
    }

    /// The filter to run.
    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    /// Whether 3-D elements are filtered one 2-D slice at a time.
    pub fn is_slicewise(&self) -> bool {
        self.slicewise
    }

    /// Filter one element. Dims are unchanged.
    pub fn apply(&self, element: ArrayViewD<'_, f64>) -> Element {
        if !self.slicewise {
            return self.kind.run(element);
        }

        let mut output = element.to_owned();
        for z in 0..element.len_of(Axis(2)) {
            let filtered = self.kind.run(element.index_axis(Axis(2), z));
            output.index_axis_mut(Axis(2), z).assign(&filtered);
        }
        output
    }
}

/// Expand window sizes, detecting the 3-D slice-by-slice request.
///
/// A third-axis size of exactly 0 on a 3-D element means "filter each 2-D
/// slice with the first two sizes". Every other size must be at least 1.
fn window_sizes(size: &AxisParam<usize>, dims: &[usize]) -> ValidationResult<(Vec<usize>, bool)> {
    let sizes = size.expand(dims.len(), "size")?;
    let (sizes, slicewise) = if dims.len() == 3 && sizes[2] == 0 {
        (sizes[..2].to_vec(), true)
    } else {
        (sizes, false)
    };

    if sizes.iter().any(|s| *s == 0) {
        return Err(ValidationError::FilterSize { sizes });
    }
    Ok((sizes, slicewise))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn volume() -> Element {
        Array::from_shape_fn(IxDyn(&[4, 5, 3]), |index| {
            (index[0] * 7 + index[1] * 3 + index[2] * 11 % 5) as f64
        })
    }

    #[test]
    fn test_window_size_validation() {
        assert!(ElementFilter::uniform(&2.into(), &[4, 4]).is_ok());
        assert_eq!(
            ElementFilter::median(&vec![2, 0].into(), &[4, 4]),
            Err(ValidationError::FilterSize { sizes: vec![2, 0] })
        );
        assert!(matches!(
            ElementFilter::median(&vec![2, 2, 2].into(), &[4, 4]),
            Err(ValidationError::ArityMismatch { parameter: "size", .. })
        ));
    }

    #[test]
    fn test_sigma_validation() {
        assert!(ElementFilter::gaussian(&1.0.into(), &0.into(), &[4, 4]).is_ok());
        assert!(matches!(
            ElementFilter::gaussian(&(-1.0).into(), &0.into(), &[4, 4]),
            Err(ValidationError::Sigma { .. })
        ));
        assert!(matches!(
            ElementFilter::gaussian(&f64::NAN.into(), &0.into(), &[4]),
            Err(ValidationError::Sigma { .. })
        ));
    }

    #[test]
    fn test_zero_third_size_runs_per_slice() {
        let filter = ElementFilter::median(&vec![3, 3, 0].into(), &[4, 5, 3]).unwrap();
        assert!(filter.is_slicewise());

        let input = volume();
        let output = filter.apply(input.view());
        assert_eq!(output.shape(), input.shape());

        for z in 0..3 {
            let expected = nd::median_filter(input.index_axis(Axis(2), z), &[3, 3]);
            assert_eq!(output.index_axis(Axis(2), z), expected);
        }
    }

    #[test]
    fn test_zero_third_size_needs_positive_plane_sizes() {
        assert!(matches!(
            ElementFilter::uniform(&0.into(), &[4, 5, 3]),
            Err(ValidationError::FilterSize { .. })
        ));
    }
}
