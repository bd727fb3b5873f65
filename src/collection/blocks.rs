//! Spatial blocks.
//!
//! A [`BlockPlan`] divides the per-element grid into rectangular regions. A
//! [`Blocks`] collection holds, for every region, the values of all elements
//! inside it: key = region origin, value = `[count] ++ extent` array.
//!
//! Distributed conversion cuts every element into pieces, shuffles pieces by
//! origin and stacks them in key order. The inverse shuffles by position along
//! the leading block axis and pastes pieces back at their origins.

use crate::collection::images::Images;
use crate::collection::series::Series;
use crate::core::error::{EngineError, Result, ShapeError, ValidationError, ValidationResult};
use crate::core::observe::AdvisorySink;
use crate::core::store::{ElementRecords, ElementStore};
use crate::core::types::{div_ceil, full_shape, BlockSize, Element, Mode};
use crate::execution::partitioned::{Deferred, PartitionedCollection};
use ndarray::iter::IndicesIter;
use ndarray::{Array1, ArrayD, ArrayView1, ArrayViewD, Axis, Dimension, IxDyn, SliceInfoElem};
use std::fmt;
use std::sync::Arc;

const BYTES_PER_VALUE: f64 = 8.0;

/// A rectangular region of the element grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockRegion {
    /// First index on every axis.
    pub origin: Vec<usize>,
    /// Length on every axis.
    pub extent: Vec<usize>,
}

impl BlockRegion {
    /// Create a new region.
    pub fn new(origin: Vec<usize>, extent: Vec<usize>) -> Self {
        Self { origin, extent }
    }

    /// One past the last index on every axis.
    pub fn end(&self) -> Vec<usize> {
        self.origin.iter().zip(&self.extent).map(|(o, e)| o + e).collect()
    }

    /// Number of pixels covered.
    pub fn area(&self) -> usize {
        self.extent.iter().product()
    }

    /// Whether the region lies within `dims`.
    pub fn is_within(&self, dims: &[usize]) -> bool {
        self.origin.len() == dims.len() && self.end().iter().zip(dims).all(|(e, d)| e <= d)
    }

    /// Slice arguments selecting this region of an element.
    fn slices(&self) -> Vec<SliceInfoElem> {
        self.origin
            .iter()
            .zip(&self.extent)
            .map(|(&o, &e)| SliceInfoElem::from(o..o + e))
            .collect()
    }
}

/// How the element grid is divided into blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPlan {
    dims: Vec<usize>,
    chunk: Vec<usize>,
}

impl BlockPlan {
    /// A single block covering everything.
    pub fn whole(dims: &[usize]) -> Self {
        Self {
            dims: dims.to_vec(),
            chunk: dims.iter().map(|&d| d.max(1)).collect(),
        }
    }

    /// Validate a size request against element dims.
    pub fn check(size: &BlockSize, dims: &[usize]) -> ValidationResult<()> {
        match size {
            BlockSize::Megabytes(mb) if !(mb.is_finite() && *mb > 0.0) => {
                Err(ValidationError::BlockSize {
                    reason: format!("memory size must be positive, got {} MB", mb),
                })
            }
            BlockSize::Pixels(pixels) if pixels.len() != dims.len() => {
                Err(ValidationError::ArityMismatch {
                    parameter: "size",
                    expected: dims.len(),
                    got: pixels.len(),
                })
            }
            BlockSize::Pixels(pixels) if pixels.iter().any(|p| *p == 0) => {
                Err(ValidationError::BlockSize {
                    reason: format!("pixels per axis must be positive, got {:?}", pixels),
                })
            }
            _ => Ok(()),
        }
    }

    /// Plan blocks for `count` elements of `dims`.
    pub fn new(size: &BlockSize, count: usize, dims: &[usize]) -> ValidationResult<Self> {
        Self::check(size, dims)?;
        Ok(match size {
            BlockSize::Megabytes(mb) => Self::from_megabytes(count, dims, *mb),
            BlockSize::Pixels(pixels) => Self::from_pixels(dims, pixels),
        })
    }

    /// Halve chunk extents, first axis first, until a block of `count`
    /// elements fits in `mb` megabytes or every extent is 1.
    pub fn from_megabytes(count: usize, dims: &[usize], mb: f64) -> Self {
        let limit = mb * 1e6;
        let mut plan = Self::whole(dims);
        let mut axis = 0;
        while plan.block_bytes(count) > limit && plan.chunk.iter().any(|&c| c > 1) {
            if plan.chunk[axis] > 1 {
                plan.chunk[axis] = div_ceil(plan.chunk[axis], 2);
            }
            axis = (axis + 1) % plan.chunk.len();
        }
        plan
    }

    /// Explicit chunk extent per axis, clamped to the grid.
    pub fn from_pixels(dims: &[usize], pixels: &[usize]) -> Self {
        Self {
            dims: dims.to_vec(),
            chunk: pixels
                .iter()
                .zip(dims)
                .map(|(&p, &d)| p.clamp(1, d.max(1)))
                .collect(),
        }
    }

    /// Footprint of one full block of `count` elements.
    pub fn block_bytes(&self, count: usize) -> f64 {
        count as f64 * self.chunk.iter().product::<usize>() as f64 * BYTES_PER_VALUE
    }

    /// Element dims being divided.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Extent of a full (non-edge) block.
    pub fn chunk(&self) -> &[usize] {
        &self.chunk
    }

    /// Number of blocks along every axis.
    pub fn grid(&self) -> Vec<usize> {
        self.dims
            .iter()
            .zip(&self.chunk)
            .map(|(&d, &c)| div_ceil(d, c))
            .collect()
    }

    /// Total number of blocks.
    pub fn len(&self) -> usize {
        self.grid().iter().product()
    }

    /// Whether the grid is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The region starting at `origin`; edge regions are clipped.
    pub fn region(&self, origin: &[usize]) -> BlockRegion {
        let extent = origin
            .iter()
            .zip(&self.chunk)
            .zip(&self.dims)
            .map(|((&o, &c), &d)| c.min(d.saturating_sub(o)))
            .collect();
        BlockRegion::new(origin.to_vec(), extent)
    }

    /// Regions in C order.
    pub fn regions(&self) -> BlockIterator<'_> {
        BlockIterator {
            plan: self,
            indices: ndarray::indices(IxDyn(&self.grid())).into_iter(),
        }
    }

    /// Origins of all regions in C order.
    pub fn origins(&self) -> Vec<Vec<usize>> {
        self.regions().map(|region| region.origin).collect()
    }
}

/// Iterator over the regions of a [`BlockPlan`].
pub struct BlockIterator<'a> {
    plan: &'a BlockPlan,
    indices: IndicesIter<IxDyn>,
}

impl Iterator for BlockIterator<'_> {
    type Item = BlockRegion;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.indices.next()?;
        let origin: Vec<usize> = index
            .slice()
            .iter()
            .zip(&self.plan.chunk)
            .map(|(i, c)| i * c)
            .collect();
        Some(self.plan.region(&origin))
    }
}

/// Position-addressable blocks of an image collection.
///
/// In distributed mode the plan and the element count are resolved by the
/// first action that needs them; building blocks runs nothing.
#[derive(Clone)]
pub struct Blocks {
    store: BlockStore,
    dims: Vec<usize>,
    plan: Deferred<BlockPlan>,
    count: Deferred<usize>,
    sink: Arc<dyn AdvisorySink>,
}

/// Pieces of one region: `None` marks the region, `Some((key, piece))`
/// carries one element's slice of it.
type Piece = Option<(usize, Element)>;

#[derive(Clone)]
enum BlockStore {
    /// The whole `[count] ++ dims` array as the only block.
    Local(Arc<Element>),
    /// Blocks keyed by origin.
    Distributed(PartitionedCollection<Vec<usize>, Element>),
}

impl fmt::Debug for Blocks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blocks")
            .field("mode", &self.mode())
            .field("dims", &self.dims)
            .field("plan", &self.plan)
            .field("count", &self.count)
            .finish()
    }
}

impl Blocks {
    /// One block holding the whole local array.
    pub(crate) fn whole(values: Arc<Element>, dims: Vec<usize>, sink: Arc<dyn AdvisorySink>) -> Self {
        Self {
            count: Deferred::ready(values.len_of(Axis(0))),
            plan: Deferred::ready(BlockPlan::whole(&dims)),
            store: BlockStore::Local(values),
            dims,
            sink,
        }
    }

    /// Cut distributed elements into blocks.
    ///
    /// Every region of the plan yields a block, even when there are no
    /// elements. Inside a block, elements are stacked in key order.
    pub(crate) fn partition(
        records: &ElementRecords,
        size: &BlockSize,
        dims: &[usize],
        sink: Arc<dyn AdvisorySink>,
    ) -> Result<Self> {
        BlockPlan::check(size, dims)?;

        let counted = records.clone();
        let count = Deferred::new(move || counted.count());
        let plan = match size {
            BlockSize::Pixels(pixels) => Deferred::ready(BlockPlan::from_pixels(dims, pixels)),
            BlockSize::Megabytes(mb) => {
                let (mb, grid) = (*mb, dims.to_vec());
                count.map(move |count| {
                    let plan = BlockPlan::from_megabytes(count, &grid, mb);
                    log::debug!(
                        "{} MB per block gives chunks of {:?} for {} elements",
                        mb,
                        plan.chunk(),
                        count
                    );
                    Ok(plan)
                })
            }
        };

        let expected = dims.to_vec();
        let pieces = records
            .try_map(move |k, element| {
                if element.shape() != expected.as_slice() {
                    return Err(EngineError::Shape(ShapeError::InconsistentElement {
                        index: k,
                        expected: expected.clone(),
                        got: element.shape().to_vec(),
                    }));
                }
                Ok((k, element))
            })
            .flat_map_with(&plan, |plan, k, element| {
                plan.regions()
                    .map(|region| {
                        let piece = element.slice(region.slices().as_slice()).to_owned();
                        (region.origin, Some((k, piece)))
                    })
                    .collect::<Vec<(Vec<usize>, Piece)>>()
            });
        let seed = vec![((), ())];
        let outline = PartitionedCollection::from_records(records.engine().clone(), seed, 1)
            .flat_map_with(&plan, |plan, _, _| {
                plan.origins()
                    .into_iter()
                    .map(|origin| (origin, None))
                    .collect::<Vec<(Vec<usize>, Piece)>>()
            });

        let blocks = outline
            .union(&pieces)
            .group_by_key(records.num_partitions())
            .try_map_with(&plan, |plan, origin, group| {
                let region = plan.region(&origin);
                let mut pieces: Vec<(usize, Element)> = group.into_iter().flatten().collect();
                pieces.sort_by_key(|(key, _)| *key);

                let mut values = ArrayD::<f64>::zeros(full_shape(pieces.len(), &region.extent));
                for (mut slot, (_, piece)) in values.axis_iter_mut(Axis(0)).zip(&pieces) {
                    if piece.shape() != region.extent.as_slice() {
                        return Err(EngineError::Shape(ShapeError::Layout {
                            shape: piece.shape().to_vec(),
                            expected: region.extent.clone(),
                        }));
                    }
                    slot.assign(piece);
                }
                Ok((origin, values))
            });

        Ok(Self {
            store: BlockStore::Distributed(blocks),
            dims: dims.to_vec(),
            plan,
            count,
            sink,
        })
    }

    /// Execution mode.
    pub fn mode(&self) -> Mode {
        match self.store {
            BlockStore::Local(_) => Mode::Local,
            BlockStore::Distributed(_) => Mode::Distributed,
        }
    }

    /// Element dims the blocks divide.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// The plan the blocks follow.
    ///
    /// A distributed plan sized in megabytes counts the elements first.
    pub fn plan(&self) -> Result<BlockPlan> {
        Ok(self.plan.get()?)
    }

    /// Shape of a full block: `[count] ++ chunk`.
    pub fn blockshape(&self) -> Result<Vec<usize>> {
        let count = self.count.get()?;
        Ok(full_shape(count, self.plan.get()?.chunk()))
    }

    /// Number of blocks.
    pub fn count(&self) -> Result<usize> {
        match &self.store {
            BlockStore::Local(_) => Ok(1),
            BlockStore::Distributed(blocks) => Ok(blocks.count()?),
        }
    }

    /// Every `(origin, block)` pair sorted by origin.
    pub fn collect(&self) -> Result<Vec<(Vec<usize>, Element)>> {
        match &self.store {
            BlockStore::Local(values) => {
                Ok(vec![(vec![0; self.dims.len()], values.as_ref().clone())])
            }
            BlockStore::Distributed(blocks) => Ok(blocks.collect_sorted()?),
        }
    }

    /// Apply `func` to every block.
    ///
    /// Outputs keep the spatial extent of their input block and may change
    /// the leading count. A declared `blockshape` fixes both.
    pub fn map<F>(&self, func: F, blockshape: Option<Vec<usize>>) -> Result<Blocks>
    where
        F: Fn(ArrayViewD<'_, f64>) -> Element + Send + Sync + 'static,
    {
        let (declared_count, declared_chunk) = match blockshape {
            Some(shape) => {
                let chunk = self.plan.resolved().map(|plan| plan.chunk);
                let fits = shape.len() == self.dims.len() + 1
                    && chunk.as_ref().map_or(true, |chunk| shape[1..] == chunk[..]);
                if !fits {
                    let spatial = chunk.unwrap_or_else(|| self.dims.clone());
                    let count = self.count.resolved();
                    return Err(ShapeError::DeclaredDims {
                        got: full_shape(count.or(shape.first().copied()).unwrap_or(0), &spatial),
                        declared: shape,
                    }
                    .into());
                }
                (Some(shape[0]), Some(shape[1..].to_vec()))
            }
            None => (None, None),
        };
        self.try_map(move |block| Ok(func(block)), declared_count, declared_chunk)
    }

    /// Apply `func` to every series along the leading axis of every block.
    pub fn map_series<F>(&self, func: F, value_size: Option<usize>) -> Result<Blocks>
    where
        F: Fn(ArrayView1<'_, f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        self.try_map(
            move |block| apply_along_leading_axis(&func, block, value_size),
            value_size,
            None,
        )
    }

    fn try_map<F>(
        &self,
        func: F,
        declared_count: Option<usize>,
        declared_chunk: Option<Vec<usize>>,
    ) -> Result<Blocks>
    where
        F: Fn(ArrayViewD<'_, f64>) -> std::result::Result<Element, ShapeError> + Send + Sync + 'static,
    {
        let checked = move |block: ArrayViewD<'_, f64>| -> std::result::Result<Element, ShapeError> {
            let output = func(block.view())?;
            let consistent = output.ndim() == block.ndim()
                && output.shape()[1..] == block.shape()[1..]
                && declared_count.map_or(true, |c| output.shape()[0] == c);
            if consistent {
                Ok(output)
            } else {
                let mut expected = block.shape().to_vec();
                expected[0] = declared_count.unwrap_or(expected[0]);
                Err(ShapeError::DeclaredDims {
                    declared: expected,
                    got: output.shape().to_vec(),
                })
            }
        };

        let (store, count) = match &self.store {
            BlockStore::Local(values) => {
                let output = checked(values.view())?;
                let count = Deferred::ready(output.len_of(Axis(0)));
                (BlockStore::Local(Arc::new(output)), count)
            }
            BlockStore::Distributed(blocks) => {
                // a megabyte plan is only known once an action runs
                let mapped = blocks.try_map_with(&self.plan, move |plan, origin, block| {
                    if let Some(chunk) = &declared_chunk {
                        if chunk != &plan.chunk {
                            return Err(EngineError::Shape(ShapeError::DeclaredDims {
                                declared: full_shape(declared_count.unwrap_or(0), chunk),
                                got: full_shape(block.len_of(Axis(0)), &plan.chunk),
                            }));
                        }
                    }
                    Ok((origin, checked(block.view()).map_err(EngineError::Shape)?))
                });
                let count = match declared_count {
                    Some(count) => Deferred::ready(count),
                    None => {
                        let (probe, parent) = (mapped.clone(), self.count.clone());
                        Deferred::new(move || match probe.peek()? {
                            Some((_, block)) => Ok(block.len_of(Axis(0))),
                            None => parent.get(),
                        })
                    }
                };
                (BlockStore::Distributed(mapped), count)
            }
        };

        Ok(Self {
            store,
            dims: self.dims.clone(),
            plan: self.plan.clone(),
            count,
            sink: self.sink.clone(),
        })
    }

    /// Reassemble the image collection.
    pub fn to_images(&self) -> Result<Images> {
        let dims = self.dims.clone();
        let store = match &self.store {
            BlockStore::Local(values) => ElementStore::Local(values.clone()),
            BlockStore::Distributed(blocks) => {
                let pieces = blocks.flat_map(|origin, block| {
                    block
                        .axis_iter(Axis(0))
                        .enumerate()
                        .map(|(t, piece)| (t, (origin.clone(), piece.to_owned())))
                        .collect::<Vec<_>>()
                });

                let grid = dims.clone();
                let elements = pieces
                    .group_by_key(blocks.num_partitions())
                    .try_map(move |t, pieces| {
                        let mut element = ArrayD::<f64>::zeros(IxDyn(&grid));
                        for (origin, piece) in pieces {
                            let region = BlockRegion::new(origin, piece.shape().to_vec());
                            if !region.is_within(&grid) {
                                return Err(EngineError::Shape(ShapeError::Layout {
                                    shape: region.end(),
                                    expected: grid.clone(),
                                }));
                            }
                            element
                                .slice_mut(region.slices().as_slice())
                                .assign(&piece);
                        }
                        Ok((t, element))
                    });
                ElementStore::Distributed(elements)
            }
        };

        Ok(Images::new(store, dims).with_sink(self.sink.clone()))
    }

    /// One series per pixel, ordered along the leading block axis.
    pub fn to_series(&self) -> Result<Series> {
        let dims = self.dims.clone();

        let series = match &self.store {
            BlockStore::Local(values) => {
                let ndim = values.ndim();
                let axes: Vec<usize> = (1..ndim).chain(std::iter::once(0)).collect();
                let moved = values
                    .view()
                    .permuted_axes(axes)
                    .as_standard_layout()
                    .into_owned();
                Series::local(moved, dims)
            }
            BlockStore::Distributed(blocks) => {
                let records = blocks.flat_map(|origin, block| {
                    let extent = block.shape()[1..].to_vec();
                    block
                        .lanes(Axis(0))
                        .into_iter()
                        .zip(ndarray::indices(IxDyn(&extent)))
                        .map(|(lane, offset)| {
                            let position: Vec<usize> = origin
                                .iter()
                                .zip(offset.slice())
                                .map(|(o, i)| o + i)
                                .collect();
                            (position, lane.to_owned())
                        })
                        .collect::<Vec<_>>()
                });
                Series::distributed(records, self.count.clone(), dims)
            }
        };
        Ok(series.with_sink(self.sink.clone()))
    }
}

/// Apply `func` to every lane along axis 0, stacking results along axis 0.
fn apply_along_leading_axis<F>(
    func: &F,
    block: ArrayViewD<'_, f64>,
    value_size: Option<usize>,
) -> std::result::Result<Element, ShapeError>
where
    F: Fn(ArrayView1<'_, f64>) -> Array1<f64>,
{
    let outputs: Vec<Array1<f64>> = block.lanes(Axis(0)).into_iter().map(func).collect();
    let length = value_size
        .or_else(|| outputs.first().map(|o| o.len()))
        .unwrap_or(0);

    let mut stacked = ArrayD::<f64>::zeros(full_shape(length, &block.shape()[1..]));
    for (index, (mut slot, values)) in stacked
        .lanes_mut(Axis(0))
        .into_iter()
        .zip(&outputs)
        .enumerate()
    {
        if values.len() != length {
            return Err(ShapeError::InconsistentElement {
                index,
                expected: vec![length],
                got: vec![values.len()],
            });
        }
        slot.assign(values);
    }
    Ok(stacked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::readers::from_array;
    use crate::execution::engine::{EngineOptions, InlineEngine, RayonEngine};
    use ndarray::Array;
    use std::collections::HashSet;

    fn ramp(shape: &[usize]) -> Element {
        let len = shape.iter().product::<usize>();
        Array::from_shape_vec(IxDyn(shape), (0..len).map(|v| v as f64).collect()).unwrap()
    }

    #[test]
    fn test_plan_tiles_grid() {
        let plan = BlockPlan::from_pixels(&[7, 5, 3], &[3, 2, 3]);
        assert_eq!(plan.grid(), vec![3, 3, 1]);
        assert_eq!(plan.len(), 9);

        let mut covered = HashSet::new();
        for region in plan.regions() {
            assert!(region.is_within(plan.dims()));
            for offset in ndarray::indices(IxDyn(&region.extent)) {
                let pixel: Vec<usize> = region
                    .origin
                    .iter()
                    .zip(offset.slice())
                    .map(|(o, i)| o + i)
                    .collect();
                assert!(covered.insert(pixel), "regions overlap");
            }
        }
        assert_eq!(covered.len(), 7 * 5 * 3);
    }

    #[test]
    fn test_plan_from_megabytes() {
        // 10 elements of 100x100 = 800 KB; 0.1 MB needs 8x fewer pixels
        let plan = BlockPlan::from_megabytes(10, &[100, 100], 0.1);
        assert!(plan.block_bytes(10) <= 0.1e6);
        assert_eq!(plan.chunk(), &[25, 50]);

        let whole = BlockPlan::from_megabytes(10, &[100, 100], 150.0);
        assert_eq!(whole.chunk(), &[100, 100]);
        assert_eq!(whole.origins(), vec![vec![0, 0]]);

        let tiny = BlockPlan::from_megabytes(1000, &[3, 2], 1e-9);
        assert_eq!(tiny.chunk(), &[1, 1]);
    }

    #[test]
    fn test_plan_validation() {
        assert!(BlockPlan::check(&BlockSize::Megabytes(0.0), &[4]).is_err());
        assert!(matches!(
            BlockPlan::check(&BlockSize::Pixels(vec![2]), &[4, 4]),
            Err(ValidationError::ArityMismatch { .. })
        ));
        assert!(matches!(
            BlockPlan::check(&BlockSize::Pixels(vec![2, 0]), &[4, 4]),
            Err(ValidationError::BlockSize { .. })
        ));
    }

    #[test]
    fn test_distributed_round_trip() {
        let values = ramp(&[4, 7, 5]);
        let engine = RayonEngine::shared(EngineOptions::new().with_threads(2)).unwrap();
        let images = from_array(values.clone(), Some(engine), Some(3)).unwrap();

        let blocks = images.to_blocks(BlockSize::Pixels(vec![3, 2])).unwrap();
        assert_eq!(blocks.blockshape().unwrap(), vec![4, 3, 2]);
        assert_eq!(blocks.count().unwrap(), 9);

        let origins: Vec<Vec<usize>> = blocks.collect().unwrap().into_iter().map(|(o, _)| o).collect();
        assert_eq!(origins, blocks.plan().unwrap().origins());

        let back = blocks.to_images().unwrap();
        assert_eq!(back.dims(), &[7, 5]);
        assert_eq!(back.to_array().unwrap(), values);
    }

    #[test]
    fn test_local_blocks_are_whole() {
        let values = ramp(&[3, 4, 4]);
        let images = from_array(values.clone(), None, None).unwrap();
        let blocks = images.to_blocks(BlockSize::default()).unwrap();
        assert_eq!(blocks.count().unwrap(), 1);
        assert_eq!(blocks.blockshape().unwrap(), vec![3, 4, 4]);
        assert_eq!(blocks.to_images().unwrap().to_array().unwrap(), values);
    }

    #[test]
    fn test_map_series_changes_count() {
        let values = ramp(&[4, 3, 3]);
        let images = from_array(values, Some(InlineEngine::shared(2)), None).unwrap();
        let blocks = images.to_blocks(BlockSize::Pixels(vec![2, 2])).unwrap();

        let summed = blocks
            .map_series(|series| Array1::from_elem(2, series.sum()), None)
            .unwrap();
        assert_eq!(summed.blockshape().unwrap(), vec![2, 2, 2]);

        let images = summed.to_images().unwrap();
        assert_eq!(images.count().unwrap(), 2);
        // pixel (0, 0) holds 0, 9, 18, 27
        assert_eq!(images.first().unwrap()[[0, 0]], 54.0);
    }

    #[test]
    fn test_map_rejects_wrong_blockshape() {
        let images = from_array(ramp(&[2, 4]), None, None).unwrap();
        let blocks = images.to_blocks(BlockSize::default()).unwrap();
        assert!(blocks.map(|b| b.to_owned(), Some(vec![2, 3])).is_err());
        assert!(blocks.map(|b| b.to_owned(), Some(vec![2, 4])).is_ok());
    }

    #[test]
    fn test_megabyte_plan_waits_for_an_action() {
        let values = ramp(&[10, 100, 100]);
        let images = from_array(values.clone(), Some(InlineEngine::shared(3)), None).unwrap();
        let blocks = images.to_blocks(BlockSize::Megabytes(0.1)).unwrap();
        assert!(blocks.plan.resolved().is_none());
        assert!(blocks.count.resolved().is_none());

        assert_eq!(blocks.blockshape().unwrap(), vec![10, 25, 50]);
        assert_eq!(blocks.count().unwrap(), 8);
        assert_eq!(blocks.to_images().unwrap().to_array().unwrap(), values);
    }

    #[test]
    fn test_declared_chunk_checked_against_deferred_plan() {
        let values = ramp(&[10, 100, 100]);
        let images = from_array(values, Some(InlineEngine::shared(2)), None).unwrap();
        let blocks = images.to_blocks(BlockSize::Megabytes(0.1)).unwrap();
        let mapped = blocks
            .map(|block| block.to_owned(), Some(vec![10, 100, 100]))
            .unwrap();
        assert!(mapped.collect().unwrap_err().is_shape());

        let kept = blocks.map(|block| block.to_owned(), Some(vec![10, 25, 50])).unwrap();
        assert_eq!(kept.count().unwrap(), 8);
    }

    #[test]
    fn test_empty_collection_keeps_every_region() {
        let values = ArrayD::zeros(IxDyn(&[0, 3, 3]));
        let images = from_array(values, Some(InlineEngine::shared(2)), None).unwrap();
        let blocks = images.to_blocks(BlockSize::Pixels(vec![2, 2])).unwrap();
        assert_eq!(blocks.count().unwrap(), 4);
        assert_eq!(blocks.blockshape().unwrap(), vec![0, 2, 2]);
        let plan = blocks.plan().unwrap();
        for (origin, block) in blocks.collect().unwrap() {
            assert_eq!(block.len_of(Axis(0)), 0);
            assert_eq!(&block.shape()[1..], plan.region(&origin).extent.as_slice());
        }
        assert_eq!(blocks.to_images().unwrap().count().unwrap(), 0);
    }

    #[test]
    fn test_blocks_stack_in_key_order_after_filter() {
        let values = ramp(&[6, 2, 2]);
        let images = from_array(values, Some(InlineEngine::shared(3)), None)
            .unwrap()
            .filter(|element| element[[0, 0]] as usize % 8 != 0);
        let blocks = images.to_blocks(BlockSize::Pixels(vec![1, 2])).unwrap();
        let (_, first) = blocks.collect().unwrap().remove(0);
        // elements 1, 3, 5 remain; pixel (0, 0) of element t is 4t
        assert_eq!(first.index_axis(Axis(0), 0)[[0, 0]], 4.0);
        assert_eq!(first.index_axis(Axis(0), 2)[[0, 0]], 20.0);
        assert_eq!(blocks.to_images().unwrap().count().unwrap(), 3);
    }
}
