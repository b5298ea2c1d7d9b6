//! Two-level simulation time.
//!
//! A [`DeltaTime`] is a pair of a *simulation cycle* and a *delta cycle*. The
//! simulation cycle advances once per simulated clock step; the delta cycle
//! orders the cascade of same-instant events within one step. Both fields are
//! packed into a single `u64`, simulation cycle in the high bits, so that the
//! derived ordering on the packed word is exactly the lexicographic ordering
//! on the pair.
//!
//! The largest delta cycle of a simulation cycle is the *end of cycle*: the
//! time at which the signal holds its final, settled value for that cycle.
//! Adding or subtracting whole simulation cycles always lands on an end of
//! cycle, whatever the delta cycle of the operand was. Callers shifting
//! times must be aware of this promotion; see [`DeltaTime::previous_delta`]
//! and [`DeltaTime::next_delta`] for delta-granular movement instead.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod intern;

/// Number of bits holding the simulation cycle.
pub const SIMCYCLE_BITS: u32 = 56;
/// Number of bits holding the delta cycle.
pub const DELTACYCLE_BITS: u32 = 8;

/// Largest representable simulation cycle.
pub const MAX_SIM_TIME: u64 = (1 << SIMCYCLE_BITS) - 1;
/// Largest representable delta cycle, the end-of-cycle marker.
pub const MAX_DELTA_TIME: u64 = (1 << DELTACYCLE_BITS) - 1;

/// A point in two-level simulation time.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DeltaTime {
    bits: u64,
}

impl DeltaTime {
    /// The sentinel used for not-yet-started time, the largest representable time.
    pub const INIT: DeltaTime = DeltaTime::new(MAX_SIM_TIME, MAX_DELTA_TIME);

    /// Packs a simulation cycle and a delta cycle into a time.
    ///
    /// Out-of-range components are truncated to their bit widths.
    #[inline]
    pub const fn new(simcycle: u64, deltacycle: u64) -> Self {
        DeltaTime {
            bits: ((simcycle & MAX_SIM_TIME) << DELTACYCLE_BITS) | (deltacycle & MAX_DELTA_TIME),
        }
    }

    /// The latest time within the given simulation cycle.
    #[inline]
    pub const fn end_of_cycle(simcycle: u64) -> Self {
        DeltaTime::new(simcycle, MAX_DELTA_TIME)
    }

    /// The simulation cycle component.
    #[inline]
    pub const fn simcycle(self) -> u64 {
        self.bits >> DELTACYCLE_BITS
    }

    /// The delta cycle component.
    #[inline]
    pub const fn deltacycle(self) -> u64 {
        self.bits & MAX_DELTA_TIME
    }

    /// True when this time is the last delta cycle of its simulation cycle.
    #[inline]
    pub const fn is_end_of_cycle(self) -> bool {
        self.deltacycle() == MAX_DELTA_TIME
    }

    /// True when this time is the first delta cycle of its simulation cycle.
    #[inline]
    pub const fn is_begin_of_cycle(self) -> bool {
        self.deltacycle() == 0
    }

    /// True at either boundary of a simulation cycle.
    #[inline]
    pub const fn is_begin_or_end_of_cycle(self) -> bool {
        self.is_begin_of_cycle() || self.is_end_of_cycle()
    }

    /// Steps to the next simulation cycle, keeping the delta cycle.
    pub fn advance_cycle(&mut self) {
        debug_assert!(self.simcycle() < MAX_SIM_TIME);
        self.bits += 1 << DELTACYCLE_BITS;
    }

    /// The time `delay` delta cycles earlier.
    ///
    /// Walking off the front of a simulation cycle lands on the end of the
    /// previous cycle (or stays at the origin when there is none); the delay
    /// never crosses more than one cycle boundary.
    pub fn previous_delta(self, delay: u64) -> Self {
        if delay <= self.deltacycle() {
            return DeltaTime::new(self.simcycle(), self.deltacycle() - delay);
        }
        if self.simcycle() == 0 {
            return DeltaTime::new(0, 0);
        }
        DeltaTime::new(self.simcycle() - 1, MAX_DELTA_TIME)
    }

    /// The time `delay` delta cycles later.
    ///
    /// From an end of cycle this steps to the begin of the next cycle; the
    /// delay never crosses more than one cycle boundary.
    pub fn next_delta(self, delay: u64) -> Self {
        if self.is_end_of_cycle() {
            return DeltaTime::new(self.simcycle() + 1, 0);
        }
        let room = MAX_DELTA_TIME - self.deltacycle();
        if delay > room {
            DeltaTime::new(self.simcycle() + 1, delay - room)
        } else {
            DeltaTime::new(self.simcycle(), self.deltacycle() + delay)
        }
    }

    /// Re-expresses this time, given relative to `old_base`, against `new_base`.
    ///
    /// Differences that would reach before the origin clamp to `(0, 0)`. An
    /// end-of-cycle time whose base shift loses delta headroom is bumped one
    /// simulation cycle forward to keep it final within its cycle.
    pub fn rebase(self, old_base: DeltaTime, new_base: DeltaTime) -> Self {
        if old_base == new_base {
            return self;
        }

        let simcycle = self.simcycle() + new_base.simcycle();
        if simcycle < old_base.simcycle() {
            // underflow
            return DeltaTime::new(0, 0);
        }

        let deltacycle = self.deltacycle() + new_base.deltacycle();
        if simcycle == old_base.simcycle() && deltacycle < old_base.deltacycle() {
            // underflow
            return DeltaTime::new(0, 0);
        }

        let mut cycle = simcycle - old_base.simcycle();
        let delta = deltacycle - old_base.deltacycle();

        if self.is_end_of_cycle() && old_base.deltacycle() < new_base.deltacycle() {
            // the delta overflowed past the end of the cycle
            if cycle == MAX_SIM_TIME {
                cycle = 0;
            } else {
                cycle += 1;
            }
        }

        DeltaTime::new(cycle, delta)
    }
}

impl Add<u64> for DeltaTime {
    type Output = DeltaTime;

    /// Adds whole simulation cycles, promoting the result to an end of cycle.
    fn add(self, simcycles: u64) -> DeltaTime {
        debug_assert!(self.simcycle() < MAX_SIM_TIME);
        DeltaTime::end_of_cycle(self.simcycle() + simcycles)
    }
}

impl Sub<u64> for DeltaTime {
    type Output = DeltaTime;

    /// Subtracts whole simulation cycles, promoting the result to an end of cycle.
    fn sub(self, simcycles: u64) -> DeltaTime {
        debug_assert!(self.simcycle() > 0);
        DeltaTime::end_of_cycle(self.simcycle().wrapping_sub(simcycles))
    }
}

impl fmt::Display for DeltaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end_of_cycle() {
            write!(f, "{}$", self.simcycle())
        } else {
            write!(f, "{}+{}", self.simcycle(), self.deltacycle())
        }
    }
}

impl fmt::Debug for DeltaTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeltaTime")
            .field(&self.simcycle())
            .field(&self.deltacycle())
            .finish()
    }
}

/// A failure to parse the textual form of a [`DeltaTime`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseTimeError {
    /// The input was empty.
    #[error("empty time literal")]
    Empty,
    /// A cycle component was not a number.
    #[error("invalid cycle number")]
    Number(#[from] std::num::ParseIntError),
}

impl FromStr for DeltaTime {
    type Err = ParseTimeError;

    /// Parses `"{s}$"` (end of cycle), `"{s}+{d}"`, or a bare `"{s}"` which
    /// reads as an end of cycle.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseTimeError::Empty);
        }
        if let Some(simcycle) = s.strip_suffix('$') {
            return Ok(DeltaTime::end_of_cycle(simcycle.parse()?));
        }
        if let Some((simcycle, deltacycle)) = s.split_once('+') {
            return Ok(DeltaTime::new(simcycle.parse()?, deltacycle.parse()?));
        }
        Ok(DeltaTime::end_of_cycle(s.parse()?))
    }
}
