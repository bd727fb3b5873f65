//! Lazily evaluated keyed partitions.
//!
//! A [`PartitionedCollection`] is a recipe: a function producing the records of
//! partition `p`, plus the engine that will run it. Transformations compose a
//! new recipe without running anything. Actions (`collect`, `count`,
//! `reduce`, ...) hand one task per partition to the engine.
//!
//! Shuffles (`group_by_key`) need their whole parent before any output
//! partition exists. They register a barrier that actions satisfy on the
//! calling thread before scheduling tasks, and memoise the shuffled records so
//! the parent runs once per shuffle.
//!
//! A [`Deferred`] value (a count, a key offset, a block plan) is produced by an
//! action the first time it is needed. Transformations that read one register
//! it as a barrier, so building a pipeline around it stays free.

use crate::core::error::{EngineError, EngineResult};
use crate::execution::engine::Engine;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

type ComputeFn<K, V> = Arc<dyn Fn(usize) -> EngineResult<Vec<(K, V)>> + Send + Sync>;
type Barrier = Arc<dyn Fn() -> EngineResult<()> + Send + Sync>;
type Shuffled<K, V> = Arc<OnceLock<EngineResult<Arc<Vec<Vec<(K, V)>>>>>>;
type Source<T> = Arc<dyn Fn() -> EngineResult<T> + Send + Sync>;

/// A value computed once, on first use, usually by running an action.
///
/// Clones share the memoised result, including a failure.
pub struct Deferred<T> {
    cell: Arc<OnceLock<EngineResult<T>>>,
    source: Source<T>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            source: self.source.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cell.get() {
            Some(value) => f.debug_tuple("Deferred").field(value).finish(),
            None => f.write_str("Deferred(<pending>)"),
        }
    }
}

impl<T> Deferred<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Compute the value with `source` when first asked.
    pub fn new<F>(source: F) -> Self
    where
        F: Fn() -> EngineResult<T> + Send + Sync + 'static,
    {
        Self {
            cell: Arc::new(OnceLock::new()),
            source: Arc::new(source),
        }
    }

    /// An already known value.
    pub fn ready(value: T) -> Self {
        let source = value.clone();
        Self {
            cell: Arc::new(OnceLock::from(Ok(value))),
            source: Arc::new(move || Ok(source.clone())),
        }
    }

    /// The value, computing it on the first call.
    pub fn get(&self) -> EngineResult<T> {
        self.cell.get_or_init(|| (self.source)()).clone()
    }

    /// The value if it is already known. Never computes.
    pub fn resolved(&self) -> Option<T> {
        match self.cell.get() {
            Some(Ok(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// A value derived from this one, computed when first asked.
    pub fn map<U, F>(&self, func: F) -> Deferred<U>
    where
        U: Clone + Send + Sync + 'static,
        F: Fn(T) -> EngineResult<U> + Send + Sync + 'static,
    {
        let parent = self.clone();
        Deferred::new(move || func(parent.get()?))
    }
}

/// Keyed records split into partitions, evaluated on demand.
pub struct PartitionedCollection<K, V> {
    engine: Arc<dyn Engine>,
    partitions: usize,
    compute: ComputeFn<K, V>,
    barriers: Vec<Barrier>,
}

impl<K, V> Clone for PartitionedCollection<K, V> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            partitions: self.partitions,
            compute: self.compute.clone(),
            barriers: self.barriers.clone(),
        }
    }
}

impl<K, V> std::fmt::Debug for PartitionedCollection<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedCollection")
            .field("engine", &self.engine.name())
            .field("partitions", &self.partitions)
            .field("shuffles", &self.barriers.len())
            .finish()
    }
}

impl<K, V> PartitionedCollection<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Distribute records over `partitions` contiguous partitions, keeping order.
    pub fn from_records(engine: Arc<dyn Engine>, records: Vec<(K, V)>, partitions: usize) -> Self {
        let partitions = partitions.max(1);
        let per_partition = ((records.len() + partitions - 1) / partitions).max(1);

        let mut layout: Vec<Vec<(K, V)>> = Vec::with_capacity(partitions);
        let mut records = records.into_iter().peekable();
        while records.peek().is_some() {
            layout.push(records.by_ref().take(per_partition).collect());
        }
        Self::from_partitions(engine, layout)
    }

    /// Use an explicit partition layout.
    pub fn from_partitions(engine: Arc<dyn Engine>, layout: Vec<Vec<(K, V)>>) -> Self {
        let layout = if layout.is_empty() { vec![Vec::new()] } else { layout };
        let partitions = layout.len();
        let data = Arc::new(layout);

        Self {
            engine,
            partitions,
            compute: Arc::new(move |p: usize| {
                data.get(p).cloned().ok_or(EngineError::MissingPartition {
                    partition: p,
                    partitions,
                })
            }),
            barriers: Vec::new(),
        }
    }
}

impl<K, V> PartitionedCollection<K, V>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// The engine actions run on.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Number of partitions.
    pub fn num_partitions(&self) -> usize {
        self.partitions
    }

    fn derive<K2, V2, F>(&self, partitions: usize, compute: F) -> PartitionedCollection<K2, V2>
    where
        F: Fn(usize) -> EngineResult<Vec<(K2, V2)>> + Send + Sync + 'static,
    {
        PartitionedCollection {
            engine: self.engine.clone(),
            partitions,
            compute: Arc::new(compute),
            barriers: self.barriers.clone(),
        }
    }

    // ========================================================================
    // Transformations (lazy)
    // ========================================================================

    /// Transform every record, failing the partition on the first error.
    pub fn try_map<K2, V2, F>(&self, func: F) -> PartitionedCollection<K2, V2>
    where
        K2: Send + Sync + 'static,
        V2: Send + Sync + 'static,
        F: Fn(K, V) -> EngineResult<(K2, V2)> + Send + Sync + 'static,
    {
        let parent = self.compute.clone();
        self.derive(self.partitions, move |p| {
            parent(p)?.into_iter().map(|(k, v)| func(k, v)).collect()
        })
    }

    /// Transform every record.
    pub fn map<K2, V2, F>(&self, func: F) -> PartitionedCollection<K2, V2>
    where
        K2: Send + Sync + 'static,
        V2: Send + Sync + 'static,
        F: Fn(K, V) -> (K2, V2) + Send + Sync + 'static,
    {
        self.try_map(move |k, v| Ok(func(k, v)))
    }

    /// Transform every value, keeping keys.
    pub fn map_values<V2, F>(&self, func: F) -> PartitionedCollection<K, V2>
    where
        V2: Send + Sync + 'static,
        F: Fn(V) -> V2 + Send + Sync + 'static,
    {
        self.map(move |k, v| (k, func(v)))
    }

    /// Keep records matching the predicate.
    pub fn filter<F>(&self, predicate: F) -> PartitionedCollection<K, V>
    where
        F: Fn(&K, &V) -> bool + Send + Sync + 'static,
    {
        let parent = self.compute.clone();
        self.derive(self.partitions, move |p| {
            Ok(parent(p)?
                .into_iter()
                .filter(|(k, v)| predicate(k, v))
                .collect())
        })
    }

    /// Expand every record into zero or more records.
    pub fn flat_map<K2, V2, I, F>(&self, func: F) -> PartitionedCollection<K2, V2>
    where
        K2: Send + Sync + 'static,
        V2: Send + Sync + 'static,
        I: IntoIterator<Item = (K2, V2)>,
        F: Fn(K, V) -> I + Send + Sync + 'static,
    {
        let parent = self.compute.clone();
        self.derive(self.partitions, move |p| {
            Ok(parent(p)?
                .into_iter()
                .flat_map(|(k, v)| func(k, v))
                .collect())
        })
    }

    /// Transform every record using a deferred value.
    ///
    /// The value is resolved on the calling thread before any partition of an
    /// action runs.
    pub fn try_map_with<T, K2, V2, F>(
        &self,
        value: &Deferred<T>,
        func: F,
    ) -> PartitionedCollection<K2, V2>
    where
        T: Clone + Send + Sync + 'static,
        K2: Send + Sync + 'static,
        V2: Send + Sync + 'static,
        F: Fn(&T, K, V) -> EngineResult<(K2, V2)> + Send + Sync + 'static,
    {
        let parent = self.compute.clone();
        let resolved = value.clone();
        let mut derived = self.derive(self.partitions, move |p| {
            let value = resolved.get()?;
            parent(p)?.into_iter().map(|(k, v)| func(&value, k, v)).collect()
        });
        derived.barriers.push(force(value));
        derived
    }

    /// Expand every record into zero or more records using a deferred value.
    pub fn flat_map_with<T, K2, V2, I, F>(
        &self,
        value: &Deferred<T>,
        func: F,
    ) -> PartitionedCollection<K2, V2>
    where
        T: Clone + Send + Sync + 'static,
        K2: Send + Sync + 'static,
        V2: Send + Sync + 'static,
        I: IntoIterator<Item = (K2, V2)>,
        F: Fn(&T, K, V) -> I + Send + Sync + 'static,
    {
        let parent = self.compute.clone();
        let resolved = value.clone();
        let mut derived = self.derive(self.partitions, move |p| {
            let value = resolved.get()?;
            Ok(parent(p)?
                .into_iter()
                .flat_map(|(k, v)| func(&value, k, v))
                .collect())
        });
        derived.barriers.push(force(value));
        derived
    }

    /// Partitions of `self` followed by partitions of `other`.
    pub fn union(&self, other: &PartitionedCollection<K, V>) -> PartitionedCollection<K, V> {
        let left = self.compute.clone();
        let right = other.compute.clone();
        let split = self.partitions;

        let mut union = self.derive(self.partitions + other.partitions, move |p| {
            if p < split {
                left(p)
            } else {
                right(p - split)
            }
        });
        union.barriers.extend(other.barriers.iter().cloned());
        union
    }

    /// Gather all values sharing a key into one record.
    ///
    /// Records are hashed into `partitions` buckets. Within a group, values
    /// keep their source order; groups are sorted by key inside a partition.
    pub fn group_by_key(&self, partitions: usize) -> PartitionedCollection<K, Vec<V>>
    where
        K: Hash + Ord + Clone,
        V: Clone,
    {
        let partitions = partitions.max(1);
        let shuffled: Shuffled<K, V> = Arc::new(OnceLock::new());

        let parent = self.clone();
        let memo = shuffled.clone();
        let barrier: Barrier = Arc::new(move || {
            memo.get_or_init(|| parent.shuffle(partitions))
                .as_ref()
                .map(|_| ())
                .map_err(Clone::clone)
        });

        let mut grouped = self.derive(partitions, move |p| {
            let buckets = match shuffled.get() {
                Some(Ok(buckets)) => buckets.clone(),
                Some(Err(error)) => return Err(error.clone()),
                None => {
                    return Err(EngineError::TaskFailed {
                        partition: p,
                        reason: "shuffle output requested before the shuffle ran".to_string(),
                    })
                }
            };

            let mut groups: BTreeMap<K, Vec<V>> = BTreeMap::new();
            for (key, value) in buckets[p].iter().cloned() {
                groups.entry(key).or_default().push(value);
            }
            Ok(groups.into_iter().collect())
        });
        grouped.barriers.push(barrier);
        grouped
    }

    fn shuffle(&self, partitions: usize) -> EngineResult<Arc<Vec<Vec<(K, V)>>>>
    where
        K: Hash,
    {
        log::debug!(
            "shuffling {} partitions into {}",
            self.partitions,
            partitions
        );
        let per_source = self.run_partitions(|records| {
            let mut buckets: Vec<Vec<(K, V)>> = (0..partitions).map(|_| Vec::new()).collect();
            for (key, value) in records {
                buckets[bucket_of(&key, partitions)].push((key, value));
            }
            Ok(buckets)
        })?;

        let mut merged: Vec<Vec<(K, V)>> = (0..partitions).map(|_| Vec::new()).collect();
        for buckets in per_source {
            for (target, bucket) in merged.iter_mut().zip(buckets) {
                target.extend(bucket);
            }
        }
        Ok(Arc::new(merged))
    }

    // ========================================================================
    // Actions (run the engine)
    // ========================================================================

    /// Satisfy pending shuffles, then run `per_partition` on every partition.
    ///
    /// Results come back in partition order.
    pub fn run_partitions<T, F>(&self, per_partition: F) -> EngineResult<Vec<T>>
    where
        T: Send,
        F: Fn(Vec<(K, V)>) -> EngineResult<T> + Send + Sync,
    {
        for barrier in &self.barriers {
            barrier()?;
        }

        let slots: Vec<Mutex<Option<T>>> = (0..self.partitions).map(|_| Mutex::new(None)).collect();
        let compute = &self.compute;
        self.engine.run(self.partitions, &|p| {
            let output = per_partition(compute(p)?)?;
            *slots[p].lock() = Some(output);
            Ok(())
        })?;

        slots
            .into_iter()
            .enumerate()
            .map(|(partition, slot)| {
                slot.into_inner().ok_or_else(|| EngineError::TaskFailed {
                    partition,
                    reason: "engine returned without running the partition".to_string(),
                })
            })
            .collect()
    }

    /// Materialise every record, in partition order.
    pub fn collect(&self) -> EngineResult<Vec<(K, V)>> {
        Ok(self.run_partitions(Ok)?.into_iter().flatten().collect())
    }

    /// Materialise every record, sorted by key.
    pub fn collect_sorted(&self) -> EngineResult<Vec<(K, V)>>
    where
        K: Ord,
    {
        let mut records = self.collect()?;
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    /// Count records. Always runs every partition.
    pub fn count(&self) -> EngineResult<usize> {
        Ok(self
            .run_partitions(|records| Ok(records.len()))?
            .into_iter()
            .sum())
    }

    /// The record with the lowest key.
    pub fn first(&self) -> EngineResult<Option<(K, V)>>
    where
        K: Ord,
    {
        let candidates = self.run_partitions(|records| {
            Ok(records.into_iter().min_by(|a, b| a.0.cmp(&b.0)))
        })?;
        Ok(candidates
            .into_iter()
            .flatten()
            .min_by(|a, b| a.0.cmp(&b.0)))
    }

    /// Any one record, computing as few partitions as possible.
    pub fn peek(&self) -> EngineResult<Option<(K, V)>> {
        for barrier in &self.barriers {
            barrier()?;
        }
        for p in 0..self.partitions {
            let slot: Mutex<Option<(K, V)>> = Mutex::new(None);
            let compute = &self.compute;
            self.engine.run(1, &|_| {
                *slot.lock() = compute(p)?.into_iter().next();
                Ok(())
            })?;
            if let Some(record) = slot.into_inner() {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    /// Combine all values with an associative, commutative function.
    ///
    /// Partition results are combined in unspecified order.
    pub fn reduce<F>(&self, func: F) -> EngineResult<Option<V>>
    where
        F: Fn(V, V) -> V + Send + Sync,
    {
        let partials =
            self.run_partitions(|records| Ok(records.into_iter().map(|(_, v)| v).reduce(&func)))?;
        Ok(partials.into_iter().flatten().reduce(&func))
    }

    /// Fold every partition from `zero` with `seq`, then merge partials with `comb`.
    pub fn aggregate<A, S, C>(&self, zero: A, seq: S, comb: C) -> EngineResult<A>
    where
        A: Clone + Send + Sync,
        S: Fn(A, K, V) -> EngineResult<A> + Send + Sync,
        C: Fn(A, A) -> A,
    {
        let partials = self.run_partitions(|records| {
            records
                .into_iter()
                .try_fold(zero.clone(), |acc, (k, v)| seq(acc, k, v))
        })?;
        Ok(partials.into_iter().fold(zero, comb))
    }

    /// Run a side effect once per record, in no particular order.
    pub fn for_each<F>(&self, func: F) -> EngineResult<()>
    where
        F: Fn(K, V) + Send + Sync,
    {
        self.run_partitions(|records| {
            records.into_iter().for_each(|(k, v)| func(k, v));
            Ok(())
        })
        .map(|_| ())
    }

    /// Run a fallible side effect once per record, stopping at the first error.
    pub fn try_for_each<E, F>(&self, func: F) -> Result<(), E>
    where
        E: From<EngineError> + Send,
        F: Fn(K, V) -> Result<(), E> + Send + Sync,
    {
        let failure: Mutex<Option<E>> = Mutex::new(None);
        let result = self.run_partitions(|records| {
            for (k, v) in records {
                if let Err(error) = func(k, v) {
                    failure.lock().get_or_insert(error);
                    return Err(EngineError::Aborted);
                }
            }
            Ok(())
        });

        if let Some(error) = failure.into_inner() {
            return Err(error);
        }
        result.map(|_| ()).map_err(E::from)
    }
}

fn force<T>(value: &Deferred<T>) -> Barrier
where
    T: Clone + Send + Sync + 'static,
{
    let value = value.clone();
    Arc::new(move || value.get().map(|_| ()))
}

fn bucket_of<K: Hash>(key: &K, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::engine::{EngineOptions, InlineEngine, RayonEngine};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn numbers(engine: Arc<dyn Engine>, n: usize, partitions: usize) -> PartitionedCollection<usize, i64> {
        let records = (0..n).map(|i| (i, i as i64)).collect();
        PartitionedCollection::from_records(engine, records, partitions)
    }

    #[test]
    fn test_from_records_layout() {
        let collection = numbers(InlineEngine::shared(1), 10, 3);
        assert_eq!(collection.num_partitions(), 3);
        let sizes = collection.run_partitions(|r| Ok(r.len())).unwrap();
        assert_eq!(sizes, vec![4, 4, 2]);

        let empty = numbers(InlineEngine::shared(1), 0, 4);
        assert_eq!(empty.num_partitions(), 1);
        assert_eq!(empty.count().unwrap(), 0);
    }

    #[test]
    fn test_transformations_are_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mapped = numbers(InlineEngine::shared(1), 6, 2).map_values(move |v| {
            counter.fetch_add(1, Ordering::Relaxed);
            v * 10
        });
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        let filtered = mapped.filter(|_, v| *v >= 30);
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        assert_eq!(
            filtered.collect().unwrap(),
            vec![(3, 30), (4, 40), (5, 50)]
        );
        assert_eq!(calls.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_reduce_and_first() {
        let engine = RayonEngine::shared(EngineOptions::new().with_threads(2)).unwrap();
        let collection = numbers(engine, 100, 7);
        assert_eq!(collection.reduce(|a, b| a + b).unwrap(), Some(4950));
        assert_eq!(collection.first().unwrap(), Some((0, 0)));
        assert_eq!(collection.count().unwrap(), 100);

        let none = collection.filter(|_, _| false);
        assert_eq!(none.reduce(|a, b| a + b).unwrap(), None);
        assert_eq!(none.first().unwrap(), None);
        assert_eq!(none.peek().unwrap(), None);
    }

    #[test]
    fn test_union_and_flat_map() {
        let engine = InlineEngine::shared(2);
        let left = numbers(engine.clone(), 3, 2);
        let right = numbers(engine, 2, 1).map(|k, v| (k + 3, v + 3));
        let union = left.union(&right);
        assert_eq!(union.num_partitions(), 3);
        assert_eq!(
            union.collect_sorted().unwrap().into_iter().map(|(_, v)| v).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );

        let doubled = union.flat_map(|k, v| vec![(k, v), (k, -v)]);
        assert_eq!(doubled.count().unwrap(), 10);
    }

    #[test]
    fn test_group_by_key_runs_parent_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let engine = RayonEngine::shared(EngineOptions::new().with_threads(3)).unwrap();
        let grouped = numbers(engine, 12, 4)
            .map(move |k, v| {
                counter.fetch_add(1, Ordering::Relaxed);
                (k % 3, v)
            })
            .group_by_key(2);

        let mut groups = grouped.collect().unwrap();
        groups.sort_by_key(|(k, _)| *k);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], (0, vec![0, 3, 6, 9]));
        assert_eq!(groups[2], (2, vec![2, 5, 8, 11]));

        assert_eq!(grouped.count().unwrap(), 3);
        assert_eq!(calls.load(Ordering::Relaxed), 12);
    }

    #[test]
    fn test_deferred_runs_once_at_action_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let source = numbers(InlineEngine::shared(2), 4, 2);
        let counted = source.clone();
        let offset = Deferred::new(move || {
            counter.fetch_add(1, Ordering::Relaxed);
            counted.count()
        });
        assert_eq!(offset.resolved(), None);

        let shifted = source.try_map_with(&offset, |offset, k, v| Ok((k + offset, v)));
        let doubled = shifted.flat_map_with(&offset, |_, k, v| vec![(k, v), (k, v)]);
        assert_eq!(calls.load(Ordering::Relaxed), 0);

        let keys: Vec<usize> = doubled
            .collect_sorted()
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![4, 4, 5, 5, 6, 6, 7, 7]);
        assert_eq!(doubled.count().unwrap(), 8);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(offset.resolved(), Some(4));

        let ready = Deferred::ready(3usize);
        assert_eq!(ready.resolved(), Some(3));
        assert_eq!(ready.map(|v| Ok(v * 2)).get().unwrap(), 6);
    }

    #[test]
    fn test_aggregate() {
        let collection = numbers(InlineEngine::shared(3), 10, 3);
        let (count, sum) = collection
            .aggregate((0usize, 0i64), |(c, s), _, v| Ok((c + 1, s + v)), |a, b| (a.0 + b.0, a.1 + b.1))
            .unwrap();
        assert_eq!((count, sum), (10, 45));
    }

    #[test]
    fn test_try_for_each_surfaces_first_error() {
        #[derive(Debug, PartialEq)]
        enum TestError {
            Engine,
            Rejected(usize),
        }
        impl From<EngineError> for TestError {
            fn from(_: EngineError) -> Self {
                TestError::Engine
            }
        }

        let collection = numbers(InlineEngine::shared(2), 6, 2);
        let result = collection.try_for_each(|k, _| {
            if k == 4 {
                Err(TestError::Rejected(k))
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err(TestError::Rejected(4)));

        let visited = AtomicUsize::new(0);
        collection
            .for_each(|_, _| {
                visited.fetch_add(1, Ordering::Relaxed);
            })
            .unwrap();
        assert_eq!(visited.load(Ordering::Relaxed), 6);
    }

    #[test]
    fn test_task_failure_propagates() {
        let collection = numbers(InlineEngine::shared(1), 4, 2).try_map(|k, v| {
            if k == 3 {
                Err(EngineError::TaskFailed {
                    partition: 1,
                    reason: "bad record".to_string(),
                })
            } else {
                Ok((k, v))
            }
        });
        assert!(matches!(
            collection.collect(),
            Err(EngineError::TaskFailed { partition: 1, .. })
        ));
    }
}
