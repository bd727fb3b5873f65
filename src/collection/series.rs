//! Per-pixel series.
//!
//! A [`Series`] holds one 1-D series for every pixel position, indexed
//! `0..len`. Local storage keeps the series axis last (`dims ++ [len]`);
//! distributed storage keeps one record per position and learns `len` at the
//! first action that asks for it.

use crate::core::error::{EngineError, Error, Result, ShapeError};
use crate::core::observe::{default_sink, AdvisorySink};
use crate::core::types::{full_shape, Element, Mode};
use crate::execution::partitioned::{Deferred, PartitionedCollection};
use ndarray::{Array1, ArrayD, ArrayView1, Axis, IxDyn};
use std::fmt;
use std::sync::Arc;

/// Series keyed by pixel position.
pub type SeriesRecords = PartitionedCollection<Vec<usize>, Array1<f64>>;

#[derive(Clone)]
enum SeriesStore {
    Local(Arc<Element>),
    Distributed(SeriesRecords),
}

/// One series per pixel position.
#[derive(Clone)]
pub struct Series {
    store: SeriesStore,
    len: Deferred<usize>,
    dims: Vec<usize>,
    sink: Arc<dyn AdvisorySink>,
}

impl fmt::Debug for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Series")
            .field("mode", &self.mode())
            .field("dims", &self.dims)
            .field("len", &self.len)
            .finish()
    }
}

impl Series {
    /// Wrap a `dims ++ [len]` array.
    pub(crate) fn local(values: Element, dims: Vec<usize>) -> Self {
        let len = values.shape().get(dims.len()).copied().unwrap_or(0);
        Self {
            store: SeriesStore::Local(Arc::new(values)),
            len: Deferred::ready(len),
            dims,
            sink: default_sink(),
        }
    }

    /// Wrap one record per position; `len` resolves when first needed.
    pub(crate) fn distributed(
        records: SeriesRecords,
        len: Deferred<usize>,
        dims: Vec<usize>,
    ) -> Self {
        Self {
            store: SeriesStore::Distributed(records),
            len,
            dims,
            sink: default_sink(),
        }
    }

    /// Route advisories elsewhere.
    pub fn with_sink(mut self, sink: Arc<dyn AdvisorySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Where advisories go.
    pub fn sink(&self) -> &Arc<dyn AdvisorySink> {
        &self.sink
    }

    /// Execution mode.
    pub fn mode(&self) -> Mode {
        match self.store {
            SeriesStore::Local(_) => Mode::Local,
            SeriesStore::Distributed(_) => Mode::Distributed,
        }
    }

    /// Label of every sample along the series axis.
    pub fn index(&self) -> Result<Vec<usize>> {
        Ok((0..self.len()?).collect())
    }

    /// Samples per series.
    pub fn len(&self) -> Result<usize> {
        Ok(self.len.get()?)
    }

    /// Whether series have no samples.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Pixel grid the series are laid out on.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// `dims ++ [len]`.
    pub fn shape(&self) -> Result<Vec<usize>> {
        Ok(full_shape_last(&self.dims, self.len()?))
    }

    /// Number of series.
    pub fn count(&self) -> Result<usize> {
        match &self.store {
            SeriesStore::Local(_) => Ok(self.dims.iter().product()),
            SeriesStore::Distributed(records) => Ok(records.count()?),
        }
    }

    /// Series of the lowest position.
    pub fn first(&self) -> Result<Array1<f64>> {
        let empty = Error::EmptyCollection { operation: "first" };
        match &self.store {
            SeriesStore::Local(values) => values
                .lanes(Axis(self.dims.len()))
                .into_iter()
                .next()
                .map(|lane| lane.to_owned())
                .ok_or(empty),
            SeriesStore::Distributed(records) => {
                records.first()?.map(|(_, series)| series).ok_or(empty)
            }
        }
    }

    /// Apply `func` to every series.
    ///
    /// The new index is `0..value_size`; without `value_size` the length is
    /// probed from one transformed series.
    pub fn map<F>(&self, func: F, value_size: Option<usize>) -> Result<Series>
    where
        F: Fn(ArrayView1<'_, f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        let mismatch = move |index: usize, expected: usize, got: usize| match value_size {
            Some(declared) => ShapeError::DeclaredDims {
                declared: vec![declared],
                got: vec![got],
            },
            None => ShapeError::InconsistentElement {
                index,
                expected: vec![expected],
                got: vec![got],
            },
        };

        let (store, len) = match &self.store {
            SeriesStore::Local(values) => {
                let mut length = value_size;
                let mut buffer = Vec::new();
                for (index, lane) in values.lanes(Axis(self.dims.len())).into_iter().enumerate() {
                    let output = func(lane);
                    let expected = *length.get_or_insert(output.len());
                    if output.len() != expected {
                        return Err(mismatch(index, expected, output.len()).into());
                    }
                    buffer.extend(output.iter().copied());
                }

                let length = match length {
                    Some(length) => length,
                    None => self.len()?,
                };
                let shape = full_shape_last(&self.dims, length);
                let values = ArrayD::from_shape_vec(IxDyn(&shape), buffer).map_err(|_| {
                    ShapeError::Layout {
                        shape: shape.clone(),
                        expected: self.dims.clone(),
                    }
                })?;
                (SeriesStore::Local(Arc::new(values)), Deferred::ready(length))
            }
            SeriesStore::Distributed(records) => {
                let mapped = records.try_map(move |position, series| {
                    let output = func(series.view());
                    match value_size {
                        Some(declared) if output.len() != declared => {
                            Err(EngineError::Shape(mismatch(0, declared, output.len())))
                        }
                        _ => Ok((position, output)),
                    }
                });
                let len = match value_size {
                    Some(length) => Deferred::ready(length),
                    None => {
                        let (probe, parent) = (mapped.clone(), self.len.clone());
                        Deferred::new(move || match probe.peek()? {
                            Some((_, series)) => Ok(series.len()),
                            None => parent.get(),
                        })
                    }
                };
                (SeriesStore::Distributed(mapped), len)
            }
        };

        Ok(Self {
            store,
            len,
            dims: self.dims.clone(),
            sink: self.sink.clone(),
        })
    }

    /// Materialise as a `dims ++ [len]` array.
    ///
    /// Single-sample series drop the series axis, giving `dims`.
    pub fn to_array(&self) -> Result<Element> {
        let length = self.len()?;
        let values = match &self.store {
            SeriesStore::Local(values) => values.as_ref().clone(),
            SeriesStore::Distributed(records) => {
                let records = records.collect_sorted()?;
                let total: usize = self.dims.iter().product();
                if records.len() != total {
                    return Err(EngineError::Shape(ShapeError::Layout {
                        shape: vec![records.len()],
                        expected: self.dims.clone(),
                    })
                    .into());
                }

                let mut buffer = Vec::with_capacity(total * length);
                for (index, (_, series)) in records.iter().enumerate() {
                    if series.len() != length {
                        return Err(EngineError::Shape(ShapeError::InconsistentElement {
                            index,
                            expected: vec![length],
                            got: vec![series.len()],
                        })
                        .into());
                    }
                    buffer.extend(series.iter().copied());
                }

                let shape = full_shape_last(&self.dims, length);
                ArrayD::from_shape_vec(IxDyn(&shape), buffer).map_err(|_| {
                    EngineError::Shape(ShapeError::Layout {
                        shape,
                        expected: self.dims.clone(),
                    })
                })?
            }
        };

        if length == 1 {
            Ok(values.index_axis_move(Axis(self.dims.len()), 0))
        } else {
            Ok(values)
        }
    }

    /// Wrap as a time series.
    pub fn to_time_series(self) -> TimeSeries {
        TimeSeries::from(self)
    }
}

fn full_shape_last(dims: &[usize], length: usize) -> Vec<usize> {
    let mut shape = full_shape(length, dims);
    shape.rotate_left(1);
    shape
}

/// Series whose index is a time axis.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    series: Series,
}

impl From<Series> for TimeSeries {
    fn from(series: Series) -> Self {
        Self { series }
    }
}

impl TimeSeries {
    /// The underlying series.
    pub fn series(&self) -> &Series {
        &self.series
    }

    /// Unwrap the underlying series.
    pub fn into_series(self) -> Series {
        self.series
    }

    /// Time points.
    pub fn index(&self) -> Result<Vec<usize>> {
        self.series.index()
    }

    /// Number of time points.
    pub fn len(&self) -> Result<usize> {
        self.series.len()
    }

    /// Whether there are no time points.
    pub fn is_empty(&self) -> Result<bool> {
        self.series.is_empty()
    }

    /// Pixel grid.
    pub fn dims(&self) -> &[usize] {
        self.series.dims()
    }

    /// Apply `func` to every series, keeping the time series wrapper.
    pub fn map<F>(&self, func: F, value_size: Option<usize>) -> Result<TimeSeries>
    where
        F: Fn(ArrayView1<'_, f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        Ok(Self::from(self.series.map(func, value_size)?))
    }

    /// Materialise as a `dims ++ [len]` array.
    pub fn to_array(&self) -> Result<Element> {
        self.series.to_array()
    }
}
