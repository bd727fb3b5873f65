//! Window geometry and boundary handling shared by the filters.

/// Gaussian radius in standard deviations.
pub const TRUNCATE: usize = 4;

/// Sigmas at or below this leave an axis untouched.
pub const SIGMA_EPSILON: f64 = 1e-15;

/// Map a possibly out-of-range index into `0..n` by half-sample reflection.
///
/// `(d c b a | a b c d | d c b a)`
pub fn reflect_index(index: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let folded = index.rem_euclid(period) as usize;
    if folded >= n {
        2 * n - 1 - folded
    } else {
        folded
    }
}

/// Samples before and after the centre of a window of `size`.
///
/// Even windows extend one further to the left.
pub fn window_bounds(size: usize) -> (usize, usize) {
    let left = size / 2;
    (left, size.saturating_sub(1 + left))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_index() {
        let mapped: Vec<usize> = (-4..8).map(|i| reflect_index(i, 4)).collect();
        assert_eq!(mapped, vec![3, 2, 1, 0, 0, 1, 2, 3, 3, 2, 1, 0]);
        assert_eq!(reflect_index(-1, 1), 0);
        assert_eq!(reflect_index(5, 1), 0);
    }

    #[test]
    fn test_window_bounds() {
        assert_eq!(window_bounds(1), (0, 0));
        assert_eq!(window_bounds(3), (1, 1));
        assert_eq!(window_bounds(4), (2, 1));
    }
}
