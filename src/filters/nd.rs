//! N-dimensional smoothing filters with reflected boundaries.
//!
//! Gaussian and box smoothing run one axis at a time through
//! `ndarray-ndimage`. Its median filter only covers 3x3x3 windows on
//! volumes, so the median walks arbitrary N-d windows here.

use crate::filters::kernels::{reflect_index, window_bounds, SIGMA_EPSILON, TRUNCATE};
use ndarray::{ArrayD, ArrayViewD, Axis};
use ndarray_ndimage::{gaussian_filter1d, uniform_filter1d, BorderMode};

/// Separable Gaussian filter.
///
/// `sigma` and `order` carry one entry per axis; axes with a negligible sigma
/// are skipped.
pub fn gaussian_filter(input: ArrayViewD<'_, f64>, sigma: &[f64], order: &[usize]) -> ArrayD<f64> {
    let mut output = input.to_owned();
    for (axis, (&s, &o)) in sigma.iter().zip(order).enumerate() {
        if s <= SIGMA_EPSILON || input.len_of(Axis(axis)) == 0 {
            continue;
        }
        output = gaussian_filter1d(&output, s, Axis(axis), o, BorderMode::Reflect, TRUNCATE);
    }
    output
}

/// Box mean over a window of `size[axis]` samples per axis.
pub fn uniform_filter(input: ArrayViewD<'_, f64>, size: &[usize]) -> ArrayD<f64> {
    let mut output = input.to_owned();
    for (axis, &s) in size.iter().enumerate() {
        if s <= 1 || input.len_of(Axis(axis)) == 0 {
            continue;
        }
        output = uniform_filter1d(&output, s, Axis(axis), BorderMode::Reflect);
    }
    output
}

/// Median over a box window of `size[axis]` samples per axis.
///
/// Even windows take the upper of the two middle values.
pub fn median_filter(input: ArrayViewD<'_, f64>, size: &[usize]) -> ArrayD<f64> {
    let ndim = input.ndim();
    let shape = input.shape().to_vec();
    let lefts: Vec<usize> = size.iter().map(|&s| window_bounds(s).0).collect();
    let window: usize = size.iter().product();

    let mut values = Vec::with_capacity(window);
    let mut offset = vec![0usize; ndim];
    let mut source = vec![0usize; ndim];

    ArrayD::from_shape_fn(input.raw_dim(), |index| {
        values.clear();
        offset.iter_mut().for_each(|o| *o = 0);

        'window: loop {
            for k in 0..ndim {
                let position = index[k] as isize + offset[k] as isize - lefts[k] as isize;
                source[k] = reflect_index(position, shape[k]);
            }
            values.push(input[source.as_slice()]);

            let mut k = ndim;
            loop {
                if k == 0 {
                    break 'window;
                }
                k -= 1;
                offset[k] += 1;
                if offset[k] < size[k] {
                    break;
                }
                offset[k] = 0;
            }
        }

        let rank = values.len() / 2;
        let (_, median, _) = values.select_nth_unstable_by(rank, |a, b| a.total_cmp(b));
        *median
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, arr2, Array, IxDyn};

    #[test]
    fn test_uniform_filter_reflects() {
        let input = arr1(&[1.0, 2.0, 3.0, 4.0]).into_dyn();
        let output = uniform_filter(input.view(), &[3]);
        // window at 0 is [1, 1, 2] under reflection
        assert_relative_eq!(output[[0]], 4.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(output[[1]], 2.0, epsilon = 1e-12);
        assert_relative_eq!(output[[3]], 11.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_uniform_filter_preserves_constant() {
        let input = Array::from_elem(IxDyn(&[5, 4, 3]), 2.5);
        let output = uniform_filter(input.view(), &[3, 2, 5]);
        assert_eq!(output.shape(), &[5, 4, 3]);
        for value in output.iter() {
            assert_relative_eq!(*value, 2.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gaussian_filter_preserves_sum_away_from_edges() {
        let mut input = ArrayD::<f64>::zeros(IxDyn(&[21]));
        input[[10]] = 1.0;
        let output = gaussian_filter(input.view(), &[1.0], &[0]);
        assert_relative_eq!(output.sum(), 1.0, epsilon = 1e-12);
        assert!(output[[10]] > output[[9]]);
        assert_relative_eq!(output[[9]], output[[11]], epsilon = 1e-15);
    }

    #[test]
    fn test_gaussian_filter_zero_sigma_is_identity() {
        let input = arr2(&[[1.0, 5.0], [2.0, 8.0]]).into_dyn();
        let output = gaussian_filter(input.view(), &[0.0, 0.0], &[0, 0]);
        assert_eq!(output, input);
    }

    #[test]
    fn test_gaussian_derivative_of_constant_is_flat() {
        let input = Array::from_elem(IxDyn(&[9, 7]), 3.0);
        let output = gaussian_filter(input.view(), &[1.5, 0.0], &[1, 0]);
        assert_eq!(output.shape(), &[9, 7]);
        for value in output.iter() {
            assert_relative_eq!(*value, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_median_filter() {
        let input = arr2(&[[1.0, 9.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]]).into_dyn();
        let output = median_filter(input.view(), &[3, 3]);
        assert_eq!(output.shape(), &[3, 3]);
        assert!(output.iter().all(|v| *v == 1.0));

        let line = arr1(&[3.0, 1.0, 2.0, 5.0]).into_dyn();
        let output = median_filter(line.view(), &[3]);
        // windows: [3,3,1] [3,1,2] [1,2,5] [2,5,5]
        assert_eq!(output, arr1(&[3.0, 2.0, 2.0, 5.0]).into_dyn());
    }
}
