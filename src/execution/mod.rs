//! Partitioned execution.
//!
//! This module holds the distributed backend: an [`Engine`] that schedules
//! partition tasks and the lazy [`PartitionedCollection`] built on it.

pub mod engine;
pub mod partitioned;

pub use engine::{Engine, EngineOptions, InlineEngine, PartitionTask, RayonEngine};
pub use partitioned::{Deferred, PartitionedCollection};
