//! Core types shared by every collection.
//!
//! This module contains the foundations the collections are built on:
//! - Value types (elements, per-axis parameters, block sizes, modes)
//! - Element storage for the two execution modes
//! - Error types
//! - Advisory reporting
//! - Configuration

pub mod config;
pub mod error;
pub mod observe;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::{BlockConfig, Config, EngineConfig, ExportConfig};
pub use error::{ConfigError, EngineError, Error, ExportError, Result, ShapeError, ValidationError};
pub use observe::{Advisory, AdvisorySink, CallbackSink, LogSink, RecordingSink};
pub use store::{ElementStore, Moments};
pub use types::{AxisParam, BlockSize, Element, Mode, Operand, DEFAULT_BLOCK_SIZE_MB};
