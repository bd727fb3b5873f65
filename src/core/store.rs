//! Element storage for the two execution modes.
//!
//! [`ElementStore`] knows nothing about per-element dims; it offers the
//! primitives (`count`, `first`, `map`, `filter`, `reduce`, moments,
//! materialisation) that [`crate::Images`] composes. Every primitive is a
//! two-armed match: the local arm works eagerly on one array whose axis 0
//! indexes elements, the distributed arm extends a lazy pipeline.

use crate::core::error::{EngineError, Error, Result, ShapeError};
use crate::core::types::{full_shape, Element, Mode};
use crate::execution::engine::Engine;
use crate::execution::partitioned::{Deferred, PartitionedCollection};
use ndarray::{ArrayD, ArrayViewD, Axis};
use std::sync::Arc;

/// Elements keyed by position.
pub type ElementRecords = PartitionedCollection<usize, Element>;

/// Backing storage of an image collection.
#[derive(Clone)]
pub enum ElementStore {
    /// `[count] ++ dims` array held in memory.
    Local(Arc<Element>),
    /// Keyed elements evaluated by an engine.
    Distributed(ElementRecords),
}

impl std::fmt::Debug for ElementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementStore::Local(values) => f
                .debug_tuple("Local")
                .field(&values.shape())
                .finish(),
            ElementStore::Distributed(records) => {
                f.debug_tuple("Distributed").field(records).finish()
            }
        }
    }
}

/// Running count, mean and sum of squared deviations.
#[derive(Debug, Clone)]
pub struct Moments {
    /// Elements folded in.
    pub count: usize,
    /// Per-pixel mean.
    pub mean: Element,
    /// Per-pixel sum of squared deviations from the mean.
    pub m2: Element,
}

impl Moments {
    /// Moments of a single element.
    pub fn of(element: &Element) -> Self {
        Self {
            count: 1,
            mean: element.clone(),
            m2: ArrayD::zeros(element.raw_dim()),
        }
    }

    /// Fold one more element in.
    pub fn push(&mut self, element: &Element) {
        self.count += 1;
        let n = self.count as f64;
        let delta = element - &self.mean;
        self.mean.scaled_add(1.0 / n, &delta);
        let corrected = element - &self.mean;
        self.m2 += &(&delta * &corrected);
    }

    /// Combine two disjoint partial results.
    pub fn merge(self, other: Self) -> Self {
        if self.count == 0 {
            return other;
        }
        if other.count == 0 {
            return self;
        }

        let (na, nb) = (self.count as f64, other.count as f64);
        let n = na + nb;
        let delta = &other.mean - &self.mean;
        let mean = &self.mean + &(&delta * (nb / n));
        let m2 = &self.m2 + &other.m2 + &(&delta * &delta * (na * nb / n));
        Self {
            count: self.count + other.count,
            mean,
            m2,
        }
    }

    /// Population variance.
    pub fn variance(&self) -> Element {
        &self.m2 / self.count as f64
    }
}

impl ElementStore {
    /// Wrap a `[count] ++ dims` array.
    pub fn local(values: Element) -> Self {
        ElementStore::Local(Arc::new(values))
    }

    /// Execution mode of this store.
    pub fn mode(&self) -> Mode {
        match self {
            ElementStore::Local(_) => Mode::Local,
            ElementStore::Distributed(_) => Mode::Distributed,
        }
    }

    /// Engine of a distributed store.
    pub fn engine(&self) -> Option<&Arc<dyn Engine>> {
        match self {
            ElementStore::Local(_) => None,
            ElementStore::Distributed(records) => Some(records.engine()),
        }
    }

    /// Number of elements.
    pub fn count(&self) -> Result<usize> {
        match self {
            ElementStore::Local(values) => Ok(values.len_of(Axis(0))),
            ElementStore::Distributed(records) => Ok(records.count()?),
        }
    }

    /// Lowest-keyed element.
    pub fn first(&self) -> Result<Option<Element>> {
        match self {
            ElementStore::Local(values) => Ok((values.len_of(Axis(0)) > 0)
                .then(|| values.index_axis(Axis(0), 0).to_owned())),
            ElementStore::Distributed(records) => Ok(records.first()?.map(|(_, v)| v)),
        }
    }

    /// Any one element, computing as little as possible.
    pub fn peek(&self) -> Result<Option<Element>> {
        match self {
            ElementStore::Local(_) => self.first(),
            ElementStore::Distributed(records) => Ok(records.peek()?.map(|(_, v)| v)),
        }
    }

    /// Apply `func` to every element.
    ///
    /// When `declared` is given every output must have those dims. Local
    /// stores check eagerly; distributed stores check as partitions run.
    pub fn map<F>(&self, func: F, declared: Option<Vec<usize>>) -> Result<Self>
    where
        F: Fn(usize, ArrayViewD<'_, f64>) -> Element + Send + Sync + 'static,
    {
        match self {
            ElementStore::Local(values) => {
                let outputs: Vec<Element> = values
                    .axis_iter(Axis(0))
                    .enumerate()
                    .map(|(i, element)| func(i, element))
                    .collect();

                if let Some(declared) = &declared {
                    if let Some(bad) = outputs.iter().find(|o| o.shape() != declared.as_slice()) {
                        return Err(ShapeError::DeclaredDims {
                            declared: declared.clone(),
                            got: bad.shape().to_vec(),
                        }
                        .into());
                    }
                }

                let dims = match (&declared, outputs.first()) {
                    (Some(declared), _) => declared.clone(),
                    (None, Some(first)) => first.shape().to_vec(),
                    (None, None) => values.shape()[1..].to_vec(),
                };
                Ok(Self::local(stack(outputs, &dims)?))
            }
            ElementStore::Distributed(records) => {
                let mapped = records.try_map(move |k, v| {
                    let output = func(k, v.view());
                    match &declared {
                        Some(declared) if output.shape() != declared.as_slice() => {
                            Err(EngineError::Shape(ShapeError::DeclaredDims {
                                declared: declared.clone(),
                                got: output.shape().to_vec(),
                            }))
                        }
                        _ => Ok((k, output)),
                    }
                });
                Ok(ElementStore::Distributed(mapped))
            }
        }
    }

    /// Keep elements for which `predicate` holds.
    pub fn filter<F>(&self, predicate: F) -> Self
    where
        F: Fn(ArrayViewD<'_, f64>) -> bool + Send + Sync + 'static,
    {
        match self {
            ElementStore::Local(values) => {
                let keep: Vec<usize> = values
                    .axis_iter(Axis(0))
                    .enumerate()
                    .filter(|(_, element)| predicate(element.view()))
                    .map(|(i, _)| i)
                    .collect();
                Self::local(values.select(Axis(0), &keep))
            }
            ElementStore::Distributed(records) => {
                ElementStore::Distributed(records.filter(move |_, v| predicate(v.view())))
            }
        }
    }

    /// Combine all elements pairwise.
    pub fn reduce<F>(&self, func: F) -> Result<Option<Element>>
    where
        F: Fn(ArrayViewD<'_, f64>, ArrayViewD<'_, f64>) -> Element + Send + Sync,
    {
        match self {
            ElementStore::Local(values) => {
                let mut elements = values.axis_iter(Axis(0));
                let first = match elements.next() {
                    Some(first) => first.to_owned(),
                    None => return Ok(None),
                };
                Ok(Some(elements.fold(first, |acc, element| func(acc.view(), element))))
            }
            ElementStore::Distributed(records) => {
                Ok(records.reduce(|a, b| func(a.view(), b.view()))?)
            }
        }
    }

    /// Count, mean and squared deviations across elements.
    pub fn moments(&self) -> Result<Option<Moments>> {
        match self {
            ElementStore::Local(values) => {
                let count = values.len_of(Axis(0));
                let mean = match values.mean_axis(Axis(0)) {
                    Some(mean) if count > 0 => mean,
                    _ => return Ok(None),
                };
                let m2 = values.var_axis(Axis(0), 0.0) * count as f64;
                Ok(Some(Moments { count, mean, m2 }))
            }
            ElementStore::Distributed(records) => {
                let moments = records.aggregate(
                    None,
                    |acc: Option<Moments>, _, element| {
                        Ok(Some(match acc {
                            Some(mut moments) => {
                                moments.push(&element);
                                moments
                            }
                            None => Moments::of(&element),
                        }))
                    },
                    |a, b| match (a, b) {
                        (Some(a), Some(b)) => Some(a.merge(b)),
                        (a, None) => a,
                        (None, b) => b,
                    },
                )?;
                Ok(moments)
            }
        }
    }

    /// Largest key plus one; keys at or above it are free.
    ///
    /// Distributed stores compute it when an action first needs it.
    pub fn key_bound(&self) -> Deferred<usize> {
        match self {
            ElementStore::Local(values) => Deferred::ready(values.len_of(Axis(0))),
            ElementStore::Distributed(records) => {
                let records = records.clone();
                Deferred::new(move || {
                    Ok(records
                        .map(|k, _| (k, k + 1))
                        .reduce(usize::max)?
                        .unwrap_or(0))
                })
            }
        }
    }

    /// Elements in key order.
    pub fn elements(&self) -> Result<Vec<(usize, Element)>> {
        match self {
            ElementStore::Local(values) => Ok(values
                .axis_iter(Axis(0))
                .map(|element| element.to_owned())
                .enumerate()
                .collect()),
            ElementStore::Distributed(records) => Ok(records.collect_sorted()?),
        }
    }

    /// Materialise as one `[count] ++ dims` array.
    pub fn to_array(&self, dims: &[usize]) -> Result<Element> {
        match self {
            ElementStore::Local(values) => Ok(values.as_ref().clone()),
            ElementStore::Distributed(records) => {
                let elements = records.collect_sorted()?;
                let elements = elements.into_iter().map(|(_, v)| v).collect();
                stack(elements, dims).map_err(|e| Error::Engine(EngineError::Shape(e)))
            }
        }
    }

    /// Split a local array into keyed partitions.
    pub fn distribute(values: &Element, engine: Arc<dyn Engine>, partitions: Option<usize>) -> Self {
        let partitions = partitions.unwrap_or_else(|| engine.default_partitions());
        let records = values
            .axis_iter(Axis(0))
            .map(|element| element.to_owned())
            .enumerate()
            .collect();
        ElementStore::Distributed(PartitionedCollection::from_records(engine, records, partitions))
    }
}

/// Stack elements along a new leading axis, checking each against `dims`.
pub fn stack(elements: Vec<Element>, dims: &[usize]) -> std::result::Result<Element, ShapeError> {
    let mut values = ArrayD::<f64>::zeros(full_shape(elements.len(), dims));
    for (index, (element, mut slot)) in elements
        .iter()
        .zip(values.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        if element.shape() != dims {
            return Err(ShapeError::InconsistentElement {
                index,
                expected: dims.to_vec(),
                got: element.shape().to_vec(),
            });
        }
        slot.assign(element);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::engine::InlineEngine;
    use approx::assert_relative_eq;
    use ndarray::{Array, IxDyn};

    fn ramp(count: usize, dims: &[usize]) -> Element {
        let shape = full_shape(count, dims);
        let len = shape.iter().product::<usize>();
        Array::from_shape_vec(IxDyn(&shape), (0..len).map(|v| v as f64).collect()).unwrap()
    }

    fn both(values: &Element) -> [ElementStore; 2] {
        [
            ElementStore::local(values.clone()),
            ElementStore::distribute(values, InlineEngine::shared(3), None),
        ]
    }

    #[test]
    fn test_count_and_first_agree() {
        let values = ramp(5, &[2, 3]);
        for store in both(&values) {
            assert_eq!(store.count().unwrap(), 5);
            let first = store.first().unwrap().unwrap();
            assert_eq!(first, values.index_axis(Axis(0), 0));
            assert_eq!(store.key_bound().get().unwrap(), 5);
        }
    }

    #[test]
    fn test_map_declared_dims_mismatch() {
        let values = ramp(3, &[2, 2]);
        let [local, distributed] = both(&values);

        let err = local.map(|_, x| x.to_owned(), Some(vec![4])).unwrap_err();
        assert!(matches!(err, Error::Shape(ShapeError::DeclaredDims { .. })));

        let lazy = distributed.map(|_, x| x.to_owned(), Some(vec![4])).unwrap();
        let err = lazy.to_array(&[4]).unwrap_err();
        assert!(err.is_shape());
    }

    #[test]
    fn test_map_inconsistent_outputs() {
        let values = ramp(3, &[2]);
        let store = ElementStore::local(values);
        let result = store.map(
            |i, x: ArrayViewD<'_, f64>| {
                if i == 2 {
                    Array::zeros(IxDyn(&[5]))
                } else {
                    x.to_owned()
                }
            },
            None,
        );
        assert!(matches!(
            result,
            Err(Error::Shape(ShapeError::InconsistentElement { index: 2, .. }))
        ));
    }

    #[test]
    fn test_moments_agree() {
        let values = ramp(7, &[3]);
        let [local, distributed] = both(&values);
        let a = local.moments().unwrap().unwrap();
        let b = distributed.moments().unwrap().unwrap();
        assert_eq!(a.count, b.count);
        for (x, y) in a.mean.iter().zip(b.mean.iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-9);
        }
        for (x, y) in a.variance().iter().zip(b.variance().iter()) {
            assert_relative_eq!(*x, *y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_filter_and_reduce() {
        let values = ramp(6, &[1]);
        for store in both(&values) {
            let even = store.filter(|x| x[[0]] as usize % 2 == 0);
            assert_eq!(even.count().unwrap(), 3);
            let total = even
                .reduce(|a, b| &a + &b)
                .unwrap()
                .unwrap();
            assert_eq!(total[[0]], 6.0);
        }

        let empty = ElementStore::local(ramp(0, &[2]));
        assert!(empty.reduce(|a, b| &a + &b).unwrap().is_none());
        assert!(empty.moments().unwrap().is_none());
        assert!(empty.first().unwrap().is_none());
    }

    #[test]
    fn test_stack_checks_dims() {
        let elements = vec![ramp(1, &[2]).index_axis_move(Axis(0), 0); 2];
        assert_eq!(stack(elements.clone(), &[2]).unwrap().shape(), &[2, 2]);
        assert!(stack(elements, &[3]).is_err());
    }
}
