//! Loggers and logging events for trace maintenance.
//!
//! Traces restructure themselves as writes arrive: frames fill up and split,
//! redundant checkpoints merge into their neighbors, and clears drop whole
//! frame ranges. A [`Logger`] installed at construction time observes these
//! events, which is enough to account for memory behavior without touching
//! the storage paths otherwise.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Handle through which a trace reports maintenance events.
#[derive(Clone)]
pub struct Logger {
    action: Rc<dyn Fn(&TraceEvent)>,
}

impl Logger {
    /// Creates a logger from an action applied to each event.
    pub fn new<F: Fn(&TraceEvent) + 'static>(action: F) -> Self {
        Logger { action: Rc::new(action) }
    }

    /// Flushes an event through the logger.
    pub fn log<E: Into<TraceEvent>>(&self, event: E) {
        (self.action)(&event.into())
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Possible different trace maintenance events.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub enum TraceEvent {
    /// Frame allocation.
    Frame(FrameEvent),
    /// Checkpoint merged into a neighbor.
    Merge(MergeEvent),
    /// Frames or checkpoints dropped.
    Drop(DropEvent),
}

/// A frame was allocated by an insert, split, or append.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct FrameEvent {
    /// Number of frames owned by the trace after the allocation.
    pub frames: usize,
}

impl From<FrameEvent> for TraceEvent {
    fn from(e: FrameEvent) -> Self {
        TraceEvent::Frame(e)
    }
}

/// A checkpoint was removed because a neighbor held the same value.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct MergeEvent {
    /// True when the earlier neighbor absorbed the write, false for the later.
    pub earlier: bool,
}

impl From<MergeEvent> for TraceEvent {
    fn from(e: MergeEvent) -> Self {
        TraceEvent::Merge(e)
    }
}

/// Frames or checkpoints were dropped by a clear or a truncation.
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Serialize, Deserialize)]
pub struct DropEvent {
    /// Number of frames released.
    pub frames: usize,
    /// Number of checkpoints discarded.
    pub checkpoints: usize,
}

impl From<DropEvent> for TraceEvent {
    fn from(e: DropEvent) -> Self {
        TraceEvent::Drop(e)
    }
}
