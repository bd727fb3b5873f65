//! Advisory reporting.
//!
//! Some requests are legal but pointless (converting to the mode a collection
//! is already in, or sizing blocks of an in-memory array). Those produce an
//! [`Advisory`] delivered to the collection's [`AdvisorySink`] and execution
//! continues. The sink is injected per collection rather than read from a
//! process-wide logger, so tests can inspect what was reported.

use crate::core::types::{BlockSize, Mode};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A non-fatal condition worth telling the caller about.
#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    /// Conversion requested into the mode the collection already has.
    ModeNoOp {
        mode: Mode,
    },
    /// A block size was given where it has no meaning.
    BlockSizeIgnored {
        requested: BlockSize,
        mode: Mode,
    },
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advisory::ModeNoOp { mode } => write!(f, "images already in {} mode", mode),
            Advisory::BlockSizeIgnored { requested, mode } => write!(
                f,
                "block size {} has no meaning for images in {} mode",
                requested, mode
            ),
        }
    }
}

/// Receiver for advisories.
pub trait AdvisorySink: Send + Sync {
    /// Deliver one advisory.
    fn advise(&self, advisory: Advisory);
}

/// Callback type accepted by [`CallbackSink`].
pub type AdvisoryCallback = Box<dyn Fn(Advisory) + Send + Sync>;

/// Routes advisories to the `log` facade at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AdvisorySink for LogSink {
    fn advise(&self, advisory: Advisory) {
        log::warn!(target: "framestack", "{}", advisory);
    }
}

/// Keeps every advisory it receives.
#[derive(Debug, Default)]
pub struct RecordingSink {
    received: Mutex<Vec<Advisory>>,
}

impl RecordingSink {
    /// Create an empty recording sink wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of everything received so far.
    pub fn advisories(&self) -> Vec<Advisory> {
        self.received.lock().clone()
    }

    /// Number of advisories received.
    pub fn len(&self) -> usize {
        self.received.lock().len()
    }

    /// Whether nothing was received.
    pub fn is_empty(&self) -> bool {
        self.received.lock().is_empty()
    }
}

impl AdvisorySink for RecordingSink {
    fn advise(&self, advisory: Advisory) {
        self.received.lock().push(advisory);
    }
}

/// Forwards advisories to a closure.
pub struct CallbackSink {
    callback: AdvisoryCallback,
}

impl CallbackSink {
    /// Wrap a closure.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Advisory) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl AdvisorySink for CallbackSink {
    fn advise(&self, advisory: Advisory) {
        (self.callback)(advisory);
    }
}

/// The sink collections start with.
pub fn default_sink() -> Arc<dyn AdvisorySink> {
    Arc::new(LogSink)
}
