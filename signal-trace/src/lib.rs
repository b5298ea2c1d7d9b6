//! A store of value changes for a single signal in delta-cycle simulation time.
//!
//! Simulated signals change rarely compared to how often they are read, so the
//! store keeps *checkpoints*: the times at which the value changed, together
//! with the value written. Reading at an arbitrary time finds the nearest
//! checkpoint at or before that time; before the first checkpoint the signal
//! holds its *initvalue*.
//!
//! Time is two-dimensional: a coarse *simulation cycle* and a fine *delta
//! cycle* ordering same-instant events within it. Both dimensions are packed
//! into a single [`DeltaTime`] word, and times stored inside traces are
//! interned ([`InternedTime`]) so that equality and hashing are identity
//! operations and repeated times share storage.
//!
//! Checkpoints live in a sequence of fixed-capacity, time-sorted buckets
//! ("frames"). All operations are expressed as movements of a `(frame, pos)`
//! cursor plus frame-local edits, which keeps writes cheap in the common
//! append-heavy workload while still supporting insertion at arbitrary times.
//!
//! # Examples
//!
//! ```
//! use signal_trace::{Bit, ChangeMode, DeltaTime, Trace};
//!
//! let mut trace = Trace::new(Bit::Zero);
//! trace.set(Bit::One, DeltaTime::new(4, 0));
//! trace.set(Bit::Zero, DeltaTime::new(9, 2));
//!
//! assert_eq!(trace.get(DeltaTime::new(2, 0)), Bit::Zero);
//! assert_eq!(trace.get(DeltaTime::new(7, 0)), Bit::One);
//! assert_eq!(trace.get(DeltaTime::new(9, 2)), Bit::Zero);
//!
//! // Writing an unchanged value with merging enabled leaves no new checkpoint.
//! trace.set_with(Bit::One, DeltaTime::new(6, 0), ChangeMode::MERGE_BOTH);
//! assert_eq!(trace.num_checkpoints(), 2);
//! ```

#![deny(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod logging;
pub mod time;
pub mod trace;

pub use crate::time::intern::InternedTime;
pub use crate::time::DeltaTime;
pub use crate::trace::{compare_traces, ChangeMode, Trace, TracePtr};

/// A composite trait for values storable in a trace.
///
/// The store never orders or otherwise interprets the values it holds; it
/// only copies them around and compares them for equality when deciding
/// whether neighboring checkpoints can merge. Anything cheaply clonable and
/// equatable qualifies, and the blanket implementation makes the trait
/// automatic.
pub trait Value: Clone + Eq + fmt::Debug + 'static {}
impl<T: Clone + Eq + fmt::Debug + 'static> Value for T {}

/// A four-state logic level, the usual value type for traced signals.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bit {
    /// Driven low.
    #[default]
    Zero,
    /// Driven high.
    One,
    /// Unknown.
    X,
    /// Not driven (high impedance).
    Z,
}

impl From<bool> for Bit {
    fn from(level: bool) -> Self {
        if level {
            Bit::One
        } else {
            Bit::Zero
        }
    }
}

impl fmt::Display for Bit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bit::Zero => write!(f, "0"),
            Bit::One => write!(f, "1"),
            Bit::X => write!(f, "x"),
            Bit::Z => write!(f, "z"),
        }
    }
}
