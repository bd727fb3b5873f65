//! The image collection.
//!
//! Every public operation is written once and dispatches on the backing
//! [`ElementStore`]. Arguments are validated before any engine work, so both
//! modes fail the same way for the same bad input.

use crate::collection::blocks::Blocks;
use crate::collection::series::{Series, TimeSeries};
use crate::core::error::{Error, Result, ShapeError, ValidationError};
use crate::core::observe::{default_sink, Advisory, AdvisorySink};
use crate::core::store::ElementStore;
use crate::core::types::{div_ceil, full_shape, AxisParam, BlockSize, Element, Mode, Operand};
use crate::execution::engine::Engine;
use crate::execution::partitioned::PartitionedCollection;
use crate::filters::{pearson, ElementFilter};
use crate::io::{self, ExportFormat, ExportOptions};
use ndarray::{arr1, Array1, ArrayView1, ArrayViewD, Axis, SliceInfoElem, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A collection of same-shaped images or volumes.
///
/// Cloning is cheap: local arrays and distributed pipelines are shared.
#[derive(Clone)]
pub struct Images {
    pub(crate) store: ElementStore,
    pub(crate) dims: Vec<usize>,
    pub(crate) sink: Arc<dyn AdvisorySink>,
}

impl fmt::Debug for Images {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Images")
            .field("mode", &self.mode())
            .field("dims", &self.dims)
            .field("store", &self.store)
            .finish()
    }
}

#[derive(Debug, Clone, Copy)]
enum Statistic {
    Mean,
    Var,
    Std,
    Sum,
    Max,
    Min,
}

impl Statistic {
    fn name(self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Var => "var",
            Statistic::Std => "std",
            Statistic::Sum => "sum",
            Statistic::Max => "max",
            Statistic::Min => "min",
        }
    }
}

/// Larger of two values; NaN if either is NaN.
fn nan_max(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.max(b)
    }
}

/// Smaller of two values; NaN if either is NaN.
fn nan_min(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        f64::NAN
    } else {
        a.min(b)
    }
}

impl Images {
    pub(crate) fn new(store: ElementStore, dims: Vec<usize>) -> Self {
        Self {
            store,
            dims,
            sink: default_sink(),
        }
    }

    pub(crate) fn derive(&self, store: ElementStore, dims: Vec<usize>) -> Self {
        Self {
            store,
            dims,
            sink: self.sink.clone(),
        }
    }

    pub(crate) fn advise(&self, advisory: Advisory) {
        self.sink.advise(advisory);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Execution mode.
    pub fn mode(&self) -> Mode {
        self.store.mode()
    }

    /// Per-element shape.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// `[count] ++ dims`. Counts distributed elements.
    pub fn shape(&self) -> Result<Vec<usize>> {
        Ok(full_shape(self.count()?, &self.dims))
    }

    /// Backing storage.
    pub fn store(&self) -> &ElementStore {
        &self.store
    }

    /// Engine of a distributed collection.
    pub fn engine(&self) -> Option<&Arc<dyn Engine>> {
        self.store.engine()
    }

    /// Where advisories go.
    pub fn sink(&self) -> &Arc<dyn AdvisorySink> {
        &self.sink
    }

    /// Route advisories of this collection and everything derived from it.
    pub fn with_sink(mut self, sink: Arc<dyn AdvisorySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Number of elements.
    pub fn count(&self) -> Result<usize> {
        self.store.count()
    }

    /// Lowest-indexed element.
    pub fn first(&self) -> Result<Element> {
        self.store
            .first()?
            .ok_or(Error::EmptyCollection { operation: "first" })
    }

    // ========================================================================
    // Element-wise transformations
    // ========================================================================

    /// Apply `func` to every element.
    ///
    /// Without `dims` the output dims are probed from one transformed element.
    pub fn map<F>(&self, func: F, dims: Option<Vec<usize>>) -> Result<Images>
    where
        F: Fn(ArrayViewD<'_, f64>) -> Element + Send + Sync + 'static,
    {
        self.map_with_keys(move |_, element| func(element), dims)
    }

    /// Apply `func` to every `(index, element)` pair.
    pub fn map_with_keys<F>(&self, func: F, dims: Option<Vec<usize>>) -> Result<Images>
    where
        F: Fn(usize, ArrayViewD<'_, f64>) -> Element + Send + Sync + 'static,
    {
        let store = self.store.map(func, dims.clone())?;
        let dims = match dims {
            Some(dims) => dims,
            None => match &store {
                ElementStore::Local(values) => values.shape()[1..].to_vec(),
                ElementStore::Distributed(_) => {
                    log::debug!("probing output dims of a distributed map");
                    store
                        .peek()?
                        .map(|element| element.shape().to_vec())
                        .unwrap_or_else(|| self.dims.clone())
                }
            },
        };
        Ok(self.derive(store, dims))
    }

    /// Keep elements where `predicate` holds.
    pub fn filter<F>(&self, predicate: F) -> Images
    where
        F: Fn(ArrayViewD<'_, f64>) -> bool + Send + Sync + 'static,
    {
        self.derive(self.store.filter(predicate), self.dims.clone())
    }

    /// Combine all elements with an associative, commutative function.
    pub fn reduce<F>(&self, func: F) -> Result<Images>
    where
        F: Fn(ArrayViewD<'_, f64>, ArrayViewD<'_, f64>) -> Element + Send + Sync,
    {
        let element = self
            .store
            .reduce(func)?
            .ok_or(Error::EmptyCollection { operation: "reduce" })?;
        Ok(self.singleton(element))
    }

    fn singleton(&self, element: Element) -> Images {
        let dims = element.shape().to_vec();
        let store = match &self.store {
            ElementStore::Local(_) => ElementStore::local(element.insert_axis(Axis(0))),
            ElementStore::Distributed(records) => {
                ElementStore::Distributed(PartitionedCollection::from_records(
                    records.engine().clone(),
                    vec![(0, element)],
                    1,
                ))
            }
        };
        self.derive(store, dims)
    }

    // ========================================================================
    // Aggregates across elements
    // ========================================================================

    /// Per-pixel mean.
    pub fn mean(&self) -> Result<Images> {
        self.statistic(Statistic::Mean)
    }

    /// Per-pixel population variance.
    pub fn var(&self) -> Result<Images> {
        self.statistic(Statistic::Var)
    }

    /// Per-pixel population standard deviation.
    pub fn std(&self) -> Result<Images> {
        self.statistic(Statistic::Std)
    }

    /// Per-pixel sum.
    pub fn sum(&self) -> Result<Images> {
        self.statistic(Statistic::Sum)
    }

    /// Per-pixel maximum.
    pub fn max(&self) -> Result<Images> {
        self.statistic(Statistic::Max)
    }

    /// Per-pixel minimum.
    pub fn min(&self) -> Result<Images> {
        self.statistic(Statistic::Min)
    }

    fn statistic(&self, statistic: Statistic) -> Result<Images> {
        let empty = Error::EmptyCollection {
            operation: statistic.name(),
        };

        let element = match statistic {
            Statistic::Mean | Statistic::Var | Statistic::Std => {
                let moments = self.store.moments()?.ok_or(empty)?;
                match statistic {
                    Statistic::Mean => moments.mean,
                    Statistic::Var => moments.variance(),
                    _ => moments.variance().mapv(f64::sqrt),
                }
            }
            Statistic::Sum => match &self.store {
                ElementStore::Local(values) if values.len_of(Axis(0)) > 0 => {
                    values.sum_axis(Axis(0))
                }
                _ => self.store.reduce(|a, b| &a + &b)?.ok_or(empty)?,
            },
            Statistic::Max | Statistic::Min => {
                let pick = match statistic {
                    Statistic::Max => nan_max,
                    _ => nan_min,
                };
                match &self.store {
                    ElementStore::Local(values) if values.len_of(Axis(0)) > 0 => {
                        let start = values.index_axis(Axis(0), 0).to_owned();
                        values
                            .axis_iter(Axis(0))
                            .fold(start, |acc, element| {
                                Zip::from(&acc).and(&element).map_collect(|&a, &b| pick(a, b))
                            })
                    }
                    _ => self
                        .store
                        .reduce(|a, b| Zip::from(&a).and(&b).map_collect(|&x, &y| pick(x, y)))?
                        .ok_or(empty)?,
                }
            }
        };

        Ok(self.singleton(element))
    }

    // ========================================================================
    // Reshaping
    // ========================================================================

    /// Collapse the element shape to `[1]` when it holds a single value.
    pub fn squeeze(&self) -> Result<Images> {
        if self.dims.iter().product::<usize>() == 1 {
            self.map(
                |element| Array1::from_iter(element.iter().copied()).into_dyn(),
                Some(vec![1]),
            )
        } else {
            self.map(|element| element.to_owned(), Some(self.dims.clone()))
        }
    }

    /// Drop `axis` by taking the maximum along it.
    pub fn max_projection(&self, axis: usize) -> Result<Images> {
        self.projection(axis, false)
    }

    /// Drop `axis`, keeping the maximum plus the minimum along it.
    pub fn max_min_projection(&self, axis: usize) -> Result<Images> {
        self.projection(axis, true)
    }

    fn projection(&self, axis: usize, with_min: bool) -> Result<Images> {
        if axis >= self.dims.len() {
            return Err(ValidationError::AxisOutOfRange {
                axis,
                max: self.dims.len().saturating_sub(1),
            }
            .into());
        }

        let mut dims = self.dims.clone();
        dims.remove(axis);
        self.map(
            move |element| {
                let max = element.fold_axis(Axis(axis), f64::NEG_INFINITY, |&a, &b| nan_max(a, b));
                if with_min {
                    let min = element.fold_axis(Axis(axis), f64::INFINITY, |&a, &b| nan_min(a, b));
                    max + min
                } else {
                    max
                }
            },
            Some(dims),
        )
    }

    /// Keep every `factor`-th pixel along each axis, starting at 0.
    pub fn subsample(&self, factor: impl Into<AxisParam<usize>>) -> Result<Images> {
        let factors = factor.into().expand(self.dims.len(), "factor")?;
        if factors.iter().any(|f| *f == 0) {
            return Err(ValidationError::NonPositiveFactor { factors }.into());
        }

        let dims = self
            .dims
            .iter()
            .zip(&factors)
            .map(|(&d, &f)| div_ceil(d, f))
            .collect();
        let slices: Vec<SliceInfoElem> = factors
            .iter()
            .map(|&f| SliceInfoElem::Slice {
                start: 0,
                end: None,
                step: f as isize,
            })
            .collect();

        self.map(
            move |element| element.slice(slices.as_slice()).to_owned(),
            Some(dims),
        )
    }

    // ========================================================================
    // Spatial filters
    // ========================================================================

    /// Gaussian smoothing of every element.
    pub fn gaussian_filter(
        &self,
        sigma: impl Into<AxisParam<f64>>,
        order: impl Into<AxisParam<usize>>,
    ) -> Result<Images> {
        let filter = ElementFilter::gaussian(&sigma.into(), &order.into(), &self.dims)?;
        self.apply_filter(filter)
    }

    /// Box mean smoothing of every element.
    ///
    /// For volumes a third-axis size of 0 filters each 2-D slice separately.
    pub fn uniform_filter(&self, size: impl Into<AxisParam<usize>>) -> Result<Images> {
        let filter = ElementFilter::uniform(&size.into(), &self.dims)?;
        self.apply_filter(filter)
    }

    /// Median smoothing of every element.
    ///
    /// For volumes a third-axis size of 0 filters each 2-D slice separately.
    pub fn median_filter(&self, size: impl Into<AxisParam<usize>>) -> Result<Images> {
        let filter = ElementFilter::median(&size.into(), &self.dims)?;
        self.apply_filter(filter)
    }

    fn apply_filter(&self, filter: ElementFilter) -> Result<Images> {
        log::debug!("applying {:?} to {} images", filter.kind(), self.mode());
        self.map(move |element| filter.apply(element), Some(self.dims.clone()))
    }

    /// Correlate every pixel's series with the mean series of its neighbourhood.
    ///
    /// The neighbourhood spans `2 * neighborhood + 1` pixels on every axis.
    /// Returns one coefficient per pixel.
    pub fn localcorr(&self, neighborhood: usize) -> Result<Element> {
        let blurred = self.uniform_filter(2 * neighborhood + 1)?;
        let combined = self.concatenate(&blurred)?;
        let series = combined.to_series(BlockSize::default())?;

        let correlations = series.map(
            |values| {
                let values = values.to_vec();
                let half = values.len() / 2;
                arr1(&[pearson(&values[..half], &values[half..])])
            },
            Some(1),
        )?;
        correlations.to_array()
    }

    /// Subtract a scalar or a same-shaped array from every element.
    pub fn subtract(&self, value: impl Into<Operand>) -> Result<Images> {
        let operand = value.into();
        operand.check(&self.dims)?;
        self.map(
            move |element| match &operand {
                Operand::Scalar(v) => element.mapv(|p| p - v),
                Operand::Array(values) => &element - values,
            },
            Some(self.dims.clone()),
        )
    }

    /// Stack `other`'s elements after this collection's.
    pub fn concatenate(&self, other: &Images) -> Result<Images> {
        if self.dims != other.dims {
            return Err(ShapeError::Concatenate {
                left: self.dims.clone(),
                right: other.dims.clone(),
            }
            .into());
        }

        let store = match (&self.store, &other.store) {
            (ElementStore::Local(left), ElementStore::Local(right)) => {
                let values = ndarray::concatenate(Axis(0), &[left.view(), right.view()])
                    .map_err(|_| ShapeError::Concatenate {
                        left: self.dims.clone(),
                        right: other.dims.clone(),
                    })?;
                ElementStore::local(values)
            }
            (ElementStore::Distributed(left), ElementStore::Distributed(right)) => {
                let offset = self.store.key_bound();
                let shifted = right.try_map_with(&offset, |offset, k, v| Ok((k + offset, v)));
                ElementStore::Distributed(left.union(&shifted))
            }
            _ => {
                return Err(ValidationError::ModeMismatch {
                    left: self.mode(),
                    right: other.mode(),
                }
                .into())
            }
        };
        Ok(self.derive(store, self.dims.clone()))
    }

    // ========================================================================
    // Sampling and traversal
    // ========================================================================

    /// Draw `nsamples` elements uniformly, with replacement.
    ///
    /// Draws are made over positions, so a seed picks the same elements in
    /// both modes.
    pub fn sample(&self, nsamples: usize, seed: Option<u64>) -> Result<Images> {
        if nsamples < 1 {
            return Err(ValidationError::SampleSize(nsamples).into());
        }
        let seed = seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let empty = Error::EmptyCollection { operation: "sample" };

        let store = match &self.store {
            ElementStore::Local(values) => {
                let n = values.len_of(Axis(0));
                if n == 0 {
                    return Err(empty);
                }
                let picks: Vec<usize> = (0..nsamples).map(|_| rng.gen_range(0..n)).collect();
                ElementStore::local(values.select(Axis(0), &picks))
            }
            ElementStore::Distributed(records) => {
                let keys: Vec<usize> = records
                    .map(|k, _| (k, ()))
                    .collect_sorted()?
                    .into_iter()
                    .map(|(k, _)| k)
                    .collect();
                if keys.is_empty() {
                    return Err(empty);
                }

                let mut wanted: HashMap<usize, Vec<usize>> = HashMap::new();
                for slot in 0..nsamples {
                    let key = keys[rng.gen_range(0..keys.len())];
                    wanted.entry(key).or_default().push(slot);
                }
                let wanted = Arc::new(wanted);
                ElementStore::Distributed(records.flat_map(move |k, v| {
                    wanted
                        .get(&k)
                        .map(|slots| slots.iter().map(|&s| (s, v.clone())).collect::<Vec<_>>())
                        .unwrap_or_default()
                }))
            }
        };
        log::debug!("sampled {} images with seed {}", nsamples, seed);
        Ok(self.derive(store, self.dims.clone()))
    }

    /// Run `func` once per `(index, element)`.
    ///
    /// Local collections visit in index order; distributed ones in no
    /// particular order.
    pub fn for_each<F>(&self, func: F) -> Result<()>
    where
        F: Fn(usize, ArrayViewD<'_, f64>) + Send + Sync,
    {
        match &self.store {
            ElementStore::Local(values) => {
                for (index, element) in values.axis_iter(Axis(0)).enumerate() {
                    func(index, element);
                }
                Ok(())
            }
            ElementStore::Distributed(records) => {
                Ok(records.for_each(|k, v| func(k, v.view()))?)
            }
        }
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Repartition into spatial blocks.
    ///
    /// Local collections always produce a single block; a non-default size is
    /// reported to the sink and ignored.
    pub fn to_blocks(&self, size: BlockSize) -> Result<Blocks> {
        match &self.store {
            ElementStore::Local(values) => {
                if !size.is_default() {
                    self.advise(Advisory::BlockSizeIgnored {
                        requested: size,
                        mode: Mode::Local,
                    });
                }
                Ok(Blocks::whole(values.clone(), self.dims.clone(), self.sink.clone()))
            }
            ElementStore::Distributed(records) => {
                Blocks::partition(records, &size, &self.dims, self.sink.clone())
            }
        }
    }

    /// One series per pixel, indexed by element position.
    pub fn to_series(&self, size: BlockSize) -> Result<Series> {
        self.to_blocks(size)?.to_series()
    }

    /// As [`Images::to_series`], wrapped as a time series.
    pub fn to_time_series(&self, size: BlockSize) -> Result<TimeSeries> {
        Ok(TimeSeries::from(self.to_series(size)?))
    }

    /// Apply `func` to every pixel's series and rebuild images from the results.
    ///
    /// The output has `value_size` elements, probed from one series when absent.
    pub fn map_as_series<F>(
        &self,
        func: F,
        value_size: Option<usize>,
        block_size: BlockSize,
    ) -> Result<Images>
    where
        F: Fn(ArrayView1<'_, f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        self.to_blocks(block_size)?
            .map_series(func, value_size)?
            .to_images()
    }

    /// Bring every element into one in-memory array.
    pub fn to_local(&self) -> Result<Images> {
        match &self.store {
            ElementStore::Local(_) => {
                self.advise(Advisory::ModeNoOp { mode: Mode::Local });
                Ok(self.clone())
            }
            ElementStore::Distributed(_) => {
                let values = self.store.to_array(&self.dims)?;
                Ok(self.derive(ElementStore::local(values), self.dims.clone()))
            }
        }
    }

    /// Hand the elements to `engine` as keyed partitions.
    pub fn to_distributed(&self, engine: Option<Arc<dyn Engine>>) -> Result<Images> {
        match (&self.store, engine) {
            (ElementStore::Distributed(_), _) => {
                self.advise(Advisory::ModeNoOp {
                    mode: Mode::Distributed,
                });
                Ok(self.clone())
            }
            (ElementStore::Local(_), None) => Err(ValidationError::MissingEngine.into()),
            (ElementStore::Local(values), Some(engine)) => {
                let store = ElementStore::distribute(values, engine, None);
                Ok(self.derive(store, self.dims.clone()))
            }
        }
    }

    /// Materialise as one `[count] ++ dims` array.
    pub fn to_array(&self) -> Result<Element> {
        self.store.to_array(&self.dims)
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Write one PNG per element into a new directory at `path`.
    pub fn to_png(&self, path: impl AsRef<Path>, options: &ExportOptions) -> Result<()> {
        io::export(self, path.as_ref(), ExportFormat::Png, options)
    }

    /// Write one TIFF per element into a new directory at `path`.
    pub fn to_tif(&self, path: impl AsRef<Path>, options: &ExportOptions) -> Result<()> {
        io::export(self, path.as_ref(), ExportFormat::Tiff, options)
    }

    /// Write raw little-endian `f64` files plus `conf.json` into `path`.
    pub fn to_binary(&self, path: impl AsRef<Path>, options: &ExportOptions) -> Result<()> {
        io::export(self, path.as_ref(), ExportFormat::Binary, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::readers::from_array;
    use crate::core::observe::RecordingSink;
    use crate::execution::engine::InlineEngine;
    use approx::assert_relative_eq;
    use ndarray::{Array, IxDyn};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ramp(shape: &[usize]) -> Element {
        let len = shape.iter().product::<usize>();
        Array::from_shape_vec(IxDyn(shape), (0..len).map(|v| v as f64).collect()).unwrap()
    }

    fn local(values: Element) -> Images {
        from_array(values, None, None).unwrap()
    }

    fn distributed(values: Element) -> Images {
        from_array(values, Some(InlineEngine::shared(3)), None).unwrap()
    }

    #[test]
    fn test_subtract_then_mean() {
        let values = ramp(&[10, 4, 4]);
        let expected = values.mean_axis(Axis(0)).unwrap() - 1.0;
        for images in [local(values.clone()), distributed(values.clone())] {
            let mean = images.subtract(1.0).unwrap().mean().unwrap();
            assert_eq!(mean.dims(), &[4, 4]);
            let result = mean.first().unwrap();
            for (a, b) in result.iter().zip(expected.iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_max_and_min_propagate_nan() {
        let mut values = ramp(&[3, 2, 2]);
        values[[1, 0, 1]] = f64::NAN;
        for images in [local(values.clone()), distributed(values.clone())] {
            for statistic in [images.max().unwrap(), images.min().unwrap()] {
                let result = statistic.first().unwrap();
                assert!(result[[0, 1]].is_nan());
                assert!(!result[[1, 1]].is_nan());
            }
            assert_eq!(images.max().unwrap().first().unwrap()[[0, 0]], 8.0);

            let projected = images.max_projection(1).unwrap().to_array().unwrap();
            assert!(projected[[1, 0]].is_nan());
            assert_eq!(projected[[1, 1]], 7.0);
        }
    }

    #[test]
    fn test_conversions_are_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let images = distributed(ramp(&[4, 3, 3]))
            .map(
                move |element| {
                    counter.fetch_add(1, Ordering::Relaxed);
                    element.to_owned()
                },
                Some(vec![3, 3]),
            )
            .unwrap();

        let blocks = images.to_blocks(BlockSize::Pixels(vec![2, 2])).unwrap();
        let series = images.to_series(BlockSize::default()).unwrap();
        let combined = images.concatenate(&images).unwrap();
        let summed = images
            .map_as_series(|s| Array1::from_elem(1, s.sum()), None, BlockSize::default())
            .unwrap();
        let restored = blocks.to_images().unwrap();
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        assert_eq!(combined.count().unwrap(), 8);
        assert_eq!(series.len().unwrap(), 4);
        assert_eq!(restored.to_array().unwrap(), ramp(&[4, 3, 3]));
        assert_eq!(summed.first().unwrap()[[0, 0]], 54.0);
        assert!(calls.load(Ordering::Relaxed) > 0);
    }

    #[test]
    fn test_concatenate_after_filter_keeps_order() {
        let images = distributed(ramp(&[5, 1, 2]));
        let kept = images.filter(|element| element[[0, 0]] as usize % 4 == 0);
        let combined = kept.concatenate(&images).unwrap();
        let firsts: Vec<f64> = combined
            .to_array()
            .unwrap()
            .axis_iter(Axis(0))
            .map(|element| element[[0, 0]])
            .collect();
        assert_eq!(firsts, vec![0.0, 4.0, 8.0, 0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn test_projection_axis_range() {
        let images = local(ramp(&[2, 4, 4, 3]));
        assert_eq!(images.max_projection(2).unwrap().dims(), &[4, 4]);
        let err = images.max_projection(3).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::AxisOutOfRange { axis: 3, max: 2 })
        ));
    }

    #[test]
    fn test_max_min_projection_values() {
        let images = local(ramp(&[1, 2, 3]));
        let projected = images.max_min_projection(1).unwrap().first().unwrap();
        // rows [0 1 2] and [3 4 5]
        assert_eq!(projected, arr1(&[2.0, 8.0]).into_dyn());
    }

    #[test]
    fn test_subsample_dims() {
        let images = distributed(ramp(&[3, 5, 4]));
        let sub = images.subsample([2, 3]).unwrap();
        assert_eq!(sub.dims(), &[3, 2]);
        assert_eq!(sub.to_array().unwrap().shape(), &[3, 3, 2]);
        assert!(matches!(
            images.subsample(0),
            Err(Error::Validation(ValidationError::NonPositiveFactor { .. }))
        ));
        assert!(matches!(
            images.subsample(vec![1, 1, 1]),
            Err(Error::Validation(ValidationError::ArityMismatch { .. }))
        ));
    }

    #[test]
    fn test_squeeze() {
        let images = local(ramp(&[4, 1, 1]));
        let squeezed = images.squeeze().unwrap();
        assert_eq!(squeezed.dims(), &[1]);
        assert_eq!(squeezed.squeeze().unwrap().dims(), &[1]);

        let untouched = local(ramp(&[4, 2, 1])).squeeze().unwrap();
        assert_eq!(untouched.dims(), &[2, 1]);
    }

    #[test]
    fn test_subtract_operand_mismatch() {
        let images = local(ramp(&[2, 4, 4]));
        let err = images.subtract(ramp(&[3, 3])).unwrap_err();
        assert!(matches!(err, Error::Shape(ShapeError::OperandMismatch { .. })));
    }

    #[test]
    fn test_empty_aggregates() {
        let images = local(ramp(&[3, 2])).filter(|_| false);
        assert_eq!(images.count().unwrap(), 0);
        assert!(matches!(
            images.mean(),
            Err(Error::EmptyCollection { operation: "mean" })
        ));
        assert!(matches!(
            images.first(),
            Err(Error::EmptyCollection { operation: "first" })
        ));
    }

    #[test]
    fn test_map_probes_dims() {
        for images in [local(ramp(&[3, 4, 4])), distributed(ramp(&[3, 4, 4]))] {
            let flat = images
                .map(|element| Array1::from_iter(element.iter().copied()).into_dyn(), None)
                .unwrap();
            assert_eq!(flat.dims(), &[16]);
        }
    }

    #[test]
    fn test_mode_conversions() {
        let sink = RecordingSink::new_shared();
        let images = local(ramp(&[3, 2])).with_sink(sink.clone());

        assert!(matches!(
            images.to_distributed(None),
            Err(Error::Validation(ValidationError::MissingEngine))
        ));

        let same = images.to_local().unwrap();
        assert_eq!(same.mode(), Mode::Local);
        assert_eq!(sink.advisories(), vec![Advisory::ModeNoOp { mode: Mode::Local }]);

        let remote = images.to_distributed(Some(InlineEngine::shared(2))).unwrap();
        assert_eq!(remote.mode(), Mode::Distributed);
        remote.to_distributed(None).unwrap();
        assert_eq!(sink.len(), 2);

        assert_eq!(remote.to_local().unwrap().to_array().unwrap(), ramp(&[3, 2]));
    }

    #[test]
    fn test_concatenate_requires_same_mode() {
        let a = local(ramp(&[2, 3]));
        let b = distributed(ramp(&[2, 3]));
        assert!(matches!(
            a.concatenate(&b),
            Err(Error::Validation(ValidationError::ModeMismatch { .. }))
        ));
        assert_eq!(a.concatenate(&a).unwrap().count().unwrap(), 4);
        assert_eq!(b.concatenate(&b).unwrap().count().unwrap(), 4);
    }

    #[test]
    fn test_sample() {
        let images = local(ramp(&[6, 2]));
        assert!(matches!(
            images.sample(0, None),
            Err(Error::Validation(ValidationError::SampleSize(0)))
        ));

        let a = images.sample(5, Some(7)).unwrap().to_array().unwrap();
        let b = distributed(ramp(&[6, 2])).sample(5, Some(7)).unwrap().to_array().unwrap();
        assert_eq!(a.shape(), &[5, 2]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_for_each_local_order() {
        let seen = parking_lot::Mutex::new(Vec::new());
        local(ramp(&[4, 2]))
            .for_each(|index, element| seen.lock().push((index, element[[0]])))
            .unwrap();
        assert_eq!(
            seen.into_inner(),
            vec![(0, 0.0), (1, 2.0), (2, 4.0), (3, 6.0)]
        );
    }

    #[test]
    fn test_localcorr_shape() {
        for images in [local(ramp(&[5, 4, 4])), distributed(ramp(&[5, 4, 4]))] {
            let corr = images.localcorr(1).unwrap();
            assert_eq!(corr.shape(), &[4, 4]);
            // every pixel rises linearly, as does its neighbourhood mean
            for value in corr.iter() {
                assert_relative_eq!(*value, 1.0, epsilon = 1e-9);
            }
        }
    }
}
