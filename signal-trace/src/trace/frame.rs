//! Fixed-capacity buckets of time-ordered checkpoints.
//!
//! A frame holds up to [`TRACE_FRAME_SIZE`] checkpoints in two parallel
//! arrays, times separate from values, so that the binary searches which
//! dominate lookups touch only the densely packed times. Both arrays live
//! inline in the frame allocation and never spill.
//!
//! Frames sort among themselves by their first time. An empty frame has no
//! first time and falls back to a stored *leader*, which keeps a freshly
//! reset frame addressable by the search.

use std::fmt;

use smallvec::SmallVec;

use crate::time::intern::InternedTime;

/// Number of checkpoints a single frame can hold.
pub const TRACE_FRAME_SIZE: usize = 32;

/// A bucket of up to [`TRACE_FRAME_SIZE`] checkpoints, sorted by time.
pub(crate) struct TraceFrame<V> {
    /// Sort key while the frame is empty; shadowed by `times[0]` otherwise.
    leader: InternedTime,
    times: SmallVec<[InternedTime; TRACE_FRAME_SIZE]>,
    values: SmallVec<[V; TRACE_FRAME_SIZE]>,
}

impl<V> TraceFrame<V> {
    /// An empty frame sorting at the time origin.
    pub(crate) fn new() -> Self {
        Self::with_leader(InternedTime::default())
    }

    /// An empty frame sorting at `leader`.
    pub(crate) fn with_leader(leader: InternedTime) -> Self {
        TraceFrame {
            leader,
            times: SmallVec::new(),
            values: SmallVec::new(),
        }
    }

    /// A frame holding a single checkpoint.
    pub(crate) fn singleton(time: InternedTime, value: V) -> Self {
        let mut frame = Self::with_leader(time);
        frame.times.push(time);
        frame.values.push(value);
        frame
    }

    /// Empties the frame, leaving it sorting at `leader`.
    pub(crate) fn reset(&mut self, leader: InternedTime) {
        self.leader = leader;
        self.times.clear();
        self.values.clear();
    }

    /// Number of checkpoints held.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    #[inline]
    pub(crate) fn full(&self) -> bool {
        self.times.len() == TRACE_FRAME_SIZE
    }

    /// The earliest time covered, or the stored leader when empty.
    pub(crate) fn leader(&self) -> InternedTime {
        match self.times.first() {
            Some(&time) => time,
            None => self.leader,
        }
    }

    /// The latest time covered, or the stored leader when empty.
    pub(crate) fn closer(&self) -> InternedTime {
        match self.times.last() {
            Some(&time) => time,
            None => self.leader,
        }
    }

    #[inline]
    pub(crate) fn time_at(&self, pos: usize) -> InternedTime {
        self.times[pos]
    }

    #[inline]
    pub(crate) fn set_time_at(&mut self, pos: usize, time: InternedTime) {
        self.times[pos] = time;
    }

    #[inline]
    pub(crate) fn value_at(&self, pos: usize) -> &V {
        &self.values[pos]
    }

    #[inline]
    pub(crate) fn value_at_mut(&mut self, pos: usize) -> &mut V {
        &mut self.values[pos]
    }

    /// The live times, in order.
    #[inline]
    pub(crate) fn times(&self) -> &[InternedTime] {
        &self.times
    }

    /// Inserts a checkpoint at `pos`, shifting later entries right.
    pub(crate) fn insert(&mut self, pos: usize, time: InternedTime, value: V) {
        debug_assert!(!self.full());
        debug_assert!(pos <= self.times.len());
        self.times.insert(pos, time);
        self.values.insert(pos, value);
    }

    /// Removes the checkpoint at `pos`, shifting later entries left.
    pub(crate) fn erase(&mut self, pos: usize) {
        debug_assert!(!self.is_empty());
        debug_assert!(pos < self.times.len());
        self.times.remove(pos);
        self.values.remove(pos);
    }

    /// Drops all checkpoints past the first `keep`.
    pub(crate) fn truncate(&mut self, keep: usize) {
        if keep < self.times.len() {
            self.times.truncate(keep);
            self.values.truncate(keep);
        }
    }

    /// Stores `value` at `time`, keeping the times sorted.
    ///
    /// Overwrites in place when the time is already present. Returns false
    /// without storing anything when a new entry is needed but the frame is
    /// full; the caller must split or spill into a neighbor.
    pub(crate) fn set(&mut self, time: InternedTime, value: V) -> bool {
        let pos = self.times.partition_point(|&t| t < time);
        if pos < self.times.len() && self.times[pos] == time {
            self.values[pos] = value;
        } else {
            if self.full() {
                return false;
            }
            self.times.insert(pos, time);
            self.values.insert(pos, value);
        }
        true
    }

    /// Moves every checkpoint at or after `time` into a fresh frame.
    ///
    /// Returns `None` when `time` lies outside the covered range, in which
    /// case nothing is moved and the caller splices a neighbor instead.
    pub(crate) fn split(&mut self, time: InternedTime) -> Option<Box<Self>> {
        let pos = self.times.partition_point(|&t| t < time);
        if pos == self.times.len() || pos == 0 {
            return None;
        }
        let mut tail = Box::new(Self::with_leader(self.times[pos]));
        tail.times.extend(self.times.drain(pos..));
        tail.values.extend(self.values.drain(pos..));
        Some(tail)
    }
}

impl<V: fmt::Debug> fmt::Debug for TraceFrame<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ ")?;
        for (time, value) in self.times.iter().zip(self.values.iter()) {
            write!(f, "{:?}@{} ", value, time)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::time::DeltaTime;

    fn t(simcycle: u64, deltacycle: u64) -> InternedTime {
        InternedTime::new(DeltaTime::new(simcycle, deltacycle))
    }

    fn frame_of(entries: &[(u64, u8)]) -> TraceFrame<u8> {
        let mut frame = TraceFrame::new();
        for &(cycle, value) in entries {
            assert!(frame.set(t(cycle, 0), value));
        }
        frame
    }

    #[test]
    fn leader_and_closer_fall_back_when_empty() {
        let mut frame: TraceFrame<u8> = TraceFrame::with_leader(t(7, 0));
        assert_eq!(frame.leader(), t(7, 0));
        assert_eq!(frame.closer(), t(7, 0));

        assert!(frame.set(t(9, 0), 1));
        assert_eq!(frame.leader(), t(9, 0));
        assert_eq!(frame.closer(), t(9, 0));

        frame.reset(t(3, 0));
        assert!(frame.is_empty());
        assert_eq!(frame.leader(), t(3, 0));
    }

    #[test]
    fn set_keeps_times_sorted() {
        let frame = frame_of(&[(5, 1), (1, 2), (3, 3)]);
        assert_eq!(frame.times(), &[t(1, 0), t(3, 0), t(5, 0)]);
        assert_eq!(*frame.value_at(1), 3);
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut frame = frame_of(&[(1, 1), (2, 2)]);
        assert!(frame.set(t(2, 0), 9));
        assert_eq!(frame.len(), 2);
        assert_eq!(*frame.value_at(1), 9);
    }

    #[test]
    fn set_refuses_new_entries_when_full() {
        let mut frame = frame_of(&(0..32).map(|i| (i, i as u8)).collect::<Vec<_>>());
        assert!(frame.full());
        assert!(!frame.set(t(99, 0), 0));
        // overwriting an existing time still succeeds
        assert!(frame.set(t(4, 0), 77));
        assert_eq!(*frame.value_at(4), 77);
    }

    #[test]
    fn insert_and_erase_shift_entries() {
        let mut frame = frame_of(&[(1, 1), (3, 3)]);
        frame.insert(1, t(2, 0), 2);
        assert_eq!(frame.times(), &[t(1, 0), t(2, 0), t(3, 0)]);

        frame.erase(0);
        assert_eq!(frame.times(), &[t(2, 0), t(3, 0)]);
        assert_eq!(*frame.value_at(0), 2);
    }

    #[test]
    fn truncate_drops_the_tail() {
        let mut frame = frame_of(&[(1, 1), (2, 2), (3, 3)]);
        frame.truncate(5);
        assert_eq!(frame.len(), 3);
        frame.truncate(1);
        assert_eq!(frame.times(), &[t(1, 0)]);
    }

    #[test]
    fn split_moves_the_tail() {
        let mut frame = frame_of(&[(1, 1), (2, 2), (3, 3), (4, 4)]);
        let tail = frame.split(t(3, 0)).expect("interior split point");
        assert_eq!(frame.times(), &[t(1, 0), t(2, 0)]);
        assert_eq!(tail.times(), &[t(3, 0), t(4, 0)]);
        assert_eq!(tail.leader(), t(3, 0));
        assert_eq!(*tail.value_at(1), 4);
    }

    #[test]
    fn split_rejects_edge_points() {
        let mut frame = frame_of(&[(2, 2), (3, 3)]);
        assert!(frame.split(t(1, 0)).is_none());
        assert!(frame.split(t(9, 0)).is_none());
        assert_eq!(frame.len(), 2);
    }
}
