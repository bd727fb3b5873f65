//! # Framestack - Image collections with interchangeable execution
//!
//! Framestack holds a collection of same-shaped images or volumes and runs
//! operations on it either eagerly over one in-memory array (local mode) or
//! lazily over keyed partitions scheduled by an engine (distributed mode).
//! Code is written once; both modes give the same answers.
//!
//! ## Features
//!
//! - **Two execution modes**: switch with `to_local` / `to_distributed`
//! - **Element operations**: map, filter, reduce, statistics, projections,
//!   subsampling, gaussian/uniform/median smoothing, local correlation
//! - **Blocks and series**: regroup elements by spatial region or per pixel
//! - **Export**: PNG, TIFF and raw binary directories
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use framestack::prelude::*;
//! use ndarray::ArrayD;
//!
//! let values = ArrayD::<f64>::zeros(vec![10, 64, 64]);
//!
//! // Local
//! let images = from_array(values.clone(), None, None)?;
//! let mean = images.subtract(1.0)?.mean()?;
//!
//! // Distributed
//! let engine = RayonEngine::shared(EngineOptions::new().with_threads(4))?;
//! let images = from_array(values, Some(engine), None)?;
//! let smoothed = images.gaussian_filter(2.0, 0)?;
//! let series = smoothed.to_series(BlockSize::default())?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: value types, element storage, errors, advisories, config
//! - [`execution`]: engines and the lazy partitioned collection
//! - [`filters`]: N-d smoothing filters and correlation
//! - [`collection`]: `Images`, `Blocks`, `Series`
//! - [`io`]: export writers

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collection;
pub mod core;
pub mod execution;
pub mod filters;
pub mod io;

pub use crate::collection::{
    from_array, from_elements, from_partitioned, BlockPlan, Blocks, Images, Series, TimeSeries,
};
pub use crate::core::config::Config;
pub use crate::core::error::{Error, Result};

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use framestack::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use crate::core::types::{AxisParam, BlockSize, Element, Mode, Operand};

    // Errors
    pub use crate::core::error::{
        EngineError, Error, ExportError, Result, ShapeError, ValidationError,
    };

    // Advisories
    pub use crate::core::observe::{Advisory, AdvisorySink, LogSink, RecordingSink};

    // Configuration
    pub use crate::core::config::Config;

    // Execution
    pub use crate::execution::engine::{Engine, EngineOptions, InlineEngine, RayonEngine};
    pub use crate::execution::partitioned::{Deferred, PartitionedCollection};

    // Collections
    pub use crate::collection::{
        from_array, from_elements, from_partitioned, BlockPlan, Blocks, Images, Series,
        TimeSeries,
    };

    // Export
    pub use crate::io::{ExportFormat, ExportOptions};
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
