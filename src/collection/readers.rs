//! Construction boundary.
//!
//! Turn arrays, element lists or existing keyed collections into [`Images`].
//! Passing an engine selects distributed mode; without one the collection is
//! local.

use crate::collection::images::Images;
use crate::core::error::{Error, Result, ShapeError, ValidationError};
use crate::core::store::{stack, ElementRecords, ElementStore};
use crate::core::types::Element;
use crate::execution::engine::Engine;
use crate::execution::partitioned::PartitionedCollection;
use std::sync::Arc;

/// Wrap a `[count] ++ dims` array.
///
/// `partitions` only applies with an engine and defaults to the engine's
/// parallelism.
pub fn from_array(
    values: Element,
    engine: Option<Arc<dyn Engine>>,
    partitions: Option<usize>,
) -> Result<Images> {
    if values.ndim() < 2 {
        return Err(ValidationError::TooFewAxes {
            required: 2,
            got: values.ndim(),
        }
        .into());
    }

    let dims = values.shape()[1..].to_vec();
    let store = match engine {
        Some(engine) => {
            log::debug!(
                "Distributing {} elements of dims {:?}",
                values.len_of(ndarray::Axis(0)),
                dims
            );
            ElementStore::distribute(&values, engine, partitions)
        }
        None => ElementStore::local(values),
    };
    Ok(Images::new(store, dims))
}

/// Build a collection from individual elements, which must share dims.
pub fn from_elements(
    elements: Vec<Element>,
    engine: Option<Arc<dyn Engine>>,
    partitions: Option<usize>,
) -> Result<Images> {
    let dims = match elements.first() {
        Some(element) => element.shape().to_vec(),
        None => {
            return Err(Error::EmptyCollection {
                operation: "from_elements",
            })
        }
    };
    if dims.is_empty() {
        return Err(ValidationError::TooFewAxes {
            required: 2,
            got: 1,
        }
        .into());
    }

    match engine {
        None => Ok(Images::new(ElementStore::local(stack(elements, &dims)?), dims)),
        Some(engine) => {
            if let Some((index, element)) = elements
                .iter()
                .enumerate()
                .find(|(_, element)| element.shape() != dims.as_slice())
            {
                return Err(ShapeError::InconsistentElement {
                    index,
                    expected: dims,
                    got: element.shape().to_vec(),
                }
                .into());
            }

            let partitions = partitions.unwrap_or_else(|| engine.default_partitions());
            let records = elements.into_iter().enumerate().collect();
            let collection = PartitionedCollection::from_records(engine, records, partitions);
            Ok(Images::new(ElementStore::Distributed(collection), dims))
        }
    }
}

/// Adopt an existing keyed collection.
///
/// Without `dims` they are probed from one element. Every element is checked
/// against the dims before returning, which runs the collection once.
pub fn from_partitioned(collection: ElementRecords, dims: Option<Vec<usize>>) -> Result<Images> {
    let dims = match dims {
        Some(dims) => dims,
        None => match collection.peek()? {
            Some((_, element)) => element.shape().to_vec(),
            None => {
                return Err(Error::EmptyCollection {
                    operation: "from_partitioned",
                })
            }
        },
    };
    if dims.is_empty() {
        return Err(ValidationError::TooFewAxes {
            required: 2,
            got: 1,
        }
        .into());
    }

    let expected = dims.clone();
    collection.try_for_each(move |key, element: Element| {
        if element.shape() == expected.as_slice() {
            Ok(())
        } else {
            Err(Error::Shape(ShapeError::InconsistentElement {
                index: key,
                expected: expected.clone(),
                got: element.shape().to_vec(),
            }))
        }
    })?;

    Ok(Images::new(ElementStore::Distributed(collection), dims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Mode;
    use crate::execution::engine::InlineEngine;
    use ndarray::{Array, ArrayD, IxDyn};

    #[test]
    fn test_from_array_modes() {
        let values = ArrayD::<f64>::zeros(IxDyn(&[6, 4, 3]));
        let local = from_array(values.clone(), None, None).unwrap();
        assert_eq!(local.mode(), Mode::Local);
        assert_eq!(local.dims(), &[4, 3]);

        let distributed = from_array(values, Some(InlineEngine::shared(2)), Some(4)).unwrap();
        assert_eq!(distributed.mode(), Mode::Distributed);
        assert_eq!(distributed.count().unwrap(), 6);
        assert_eq!(distributed.engine().unwrap().default_partitions(), 2);
    }

    #[test]
    fn test_from_array_needs_two_axes() {
        let values = Array::from_vec(vec![1.0, 2.0]).into_dyn();
        assert!(matches!(
            from_array(values, None, None),
            Err(Error::Validation(ValidationError::TooFewAxes { required: 2, got: 1 }))
        ));
    }

    #[test]
    fn test_from_elements_checks_dims() {
        let good = vec![ArrayD::zeros(IxDyn(&[2, 2])), ArrayD::ones(IxDyn(&[2, 2]))];
        let images = from_elements(good, Some(InlineEngine::shared(2)), None).unwrap();
        assert_eq!(images.to_array().unwrap().shape(), &[2, 2, 2]);

        for engine in [None, Some(InlineEngine::shared(2))] {
            let bad = vec![ArrayD::zeros(IxDyn(&[2, 2])), ArrayD::zeros(IxDyn(&[2, 3]))];
            assert!(matches!(
                from_elements(bad, engine, None),
                Err(Error::Shape(ShapeError::InconsistentElement { index: 1, .. }))
            ));
        }

        assert!(matches!(
            from_elements(Vec::new(), None, None),
            Err(Error::EmptyCollection { .. })
        ));
    }

    #[test]
    fn test_from_partitioned_probes_and_validates() {
        let engine = InlineEngine::shared(2);
        let records = (0..4)
            .map(|i| (i, ArrayD::from_elem(IxDyn(&[3, 2]), i as f64)))
            .collect();
        let collection = PartitionedCollection::from_records(engine.clone(), records, 2);
        let images = from_partitioned(collection, None).unwrap();
        assert_eq!(images.dims(), &[3, 2]);

        let records = vec![
            (0, ArrayD::zeros(IxDyn(&[3, 2]))),
            (7, ArrayD::zeros(IxDyn(&[2, 2]))),
        ];
        let collection = PartitionedCollection::from_records(engine, records, 2);
        assert!(matches!(
            from_partitioned(collection, Some(vec![3, 2])),
            Err(Error::Shape(ShapeError::InconsistentElement { index: 7, .. }))
        ));
    }
}
