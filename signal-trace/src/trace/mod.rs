//! The trace: a frame-chunked sequence of value-change checkpoints.
//!
//! A [`Trace`] records, for one signal, the times at which its value changed
//! and the values written. Checkpoints live in an ordered sequence of
//! fixed-capacity frames whose flattened concatenation is strictly
//! time-ordered: every frame's last time precedes the next frame's first.
//! Reads locate the checkpoint at or before the queried time; before the
//! first checkpoint the signal holds its initvalue.
//!
//! Writes funnel through [`Trace::set_with`], parameterized by a
//! [`ChangeMode`] that steers how the write interacts with its neighbors:
//! whether equal-valued neighbors merge with it, whether later checkpoints
//! are discarded, and whether the overwritten value is re-established one
//! simulation cycle later. The merging modes keep the stored sequence
//! canonical, with no two adjacent checkpoints carrying the same value.
//!
//! All algorithms are phrased as cursor movement plus frame-local edits; see
//! the `cursor` module for the navigation primitives.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::logging::{DropEvent, FrameEvent, Logger, MergeEvent};
use crate::time::intern::InternedTime;
use crate::time::DeltaTime;
use crate::Value;

use self::cursor::{append_val, erase_at, insert_at, truncate_at, Cursor, FrameSeq};
use self::frame::TraceFrame;

mod cursor;
mod frame;

pub use self::frame::TRACE_FRAME_SIZE;

bitflags! {
    /// How a write treats the checkpoints around it.
    ///
    /// The merge flags keep the trace canonical by removing checkpoints that
    /// repeat their neighbor's value; the future flags reshape what follows
    /// the write. [`ChangeMode::CLEAR_FUTURE`] and
    /// [`ChangeMode::KEEP_FUTURE_CYCLE`] are mutually exclusive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangeMode: u8 {
        /// Merge the write with the previous checkpoint when it carries the
        /// same value, e.g. `{1@1}, set(1, @2)` stays `{1@1}`.
        const MERGE_EARLIER = 1;
        /// Merge the next checkpoint into the write when it carries the same
        /// value, e.g. `{1@3}, set(1, @2)` becomes `{1@2}`.
        const MERGE_LATER = 2;
        /// Merge in both directions.
        const MERGE_BOTH = Self::MERGE_EARLIER.bits() | Self::MERGE_LATER.bits();
        /// Remove all checkpoints after the write.
        const CLEAR_FUTURE = 4;
        /// Write the value at this time point, but re-establish the value it
        /// overwrote one simulation cycle later.
        const KEEP_FUTURE_CYCLE = 8;
    }
}

impl ChangeMode {
    /// Store the value and touch nothing else.
    pub const NO_CHANGE: ChangeMode = ChangeMode::empty();
}

/// A shared, mutably borrowable handle to a trace.
///
/// Traces are single-threaded; shared ownership uses plain reference
/// counting, and `Rc::strong_count` reports the number of live handles.
pub type TracePtr<V> = Rc<RefCell<Trace<V>>>;

/// Trace data for a single signal over two-level simulation time.
pub struct Trace<V> {
    initvalue: V,
    frames: FrameSeq<V>,
    logger: Option<Logger>,
}

impl<V: Value> Trace<V> {
    /// Allocates an empty trace holding `initvalue` at every time.
    pub fn new(initvalue: V) -> Self {
        Trace::with_logger(initvalue, None)
    }

    /// Allocates an empty trace that reports maintenance events to `logger`.
    pub fn with_logger(initvalue: V, logger: Option<Logger>) -> Self {
        let mut frames = FrameSeq::new();
        frames.push(Box::new(TraceFrame::new()));
        Trace { initvalue, frames, logger }
    }

    /// Wraps the trace in a shared handle.
    pub fn share(self) -> TracePtr<V> {
        Rc::new(RefCell::new(self))
    }

    /// The value the signal holds before its first checkpoint.
    pub fn initvalue(&self) -> &V {
        &self.initvalue
    }

    /// Replaces the initvalue.
    pub fn set_initvalue(&mut self, initvalue: V) {
        self.initvalue = initvalue;
    }

    /// True when at least one checkpoint is stored.
    pub fn has_checkpoints(&self) -> bool {
        self.frames.first().is_some_and(|frame| !frame.is_empty())
    }

    /// Number of stored checkpoints.
    pub fn num_checkpoints(&self) -> usize {
        self.frames.iter().map(|frame| frame.len()).sum()
    }

    /// Number of checkpoints the allocated frames could hold.
    pub fn capacity(&self) -> usize {
        self.frames.len() * TRACE_FRAME_SIZE
    }

    /// All checkpoint times, in order.
    pub fn checkpoints(&self) -> Vec<InternedTime> {
        self.frames
            .iter()
            .flat_map(|frame| frame.times().iter().copied())
            .collect()
    }

    /// The earliest checkpoint time, or `(0, 0)` when there is none.
    pub fn first_checkpoint(&self) -> InternedTime {
        match self.iter().next() {
            Some((time, _)) => time,
            None => InternedTime::default(),
        }
    }

    /// The latest checkpoint time, or `(0, 0)` when there is none.
    pub fn last_checkpoint(&self) -> InternedTime {
        for frame in self.frames.iter().rev() {
            if !frame.is_empty() {
                return frame.time_at(frame.len() - 1);
            }
        }
        InternedTime::default()
    }

    /// The value at `time`: the nearest checkpoint at or before it, or the
    /// initvalue when no checkpoint precedes it.
    pub fn get(&self, time: impl Into<InternedTime>) -> V {
        let time = time.into();
        let mut cursor = Cursor::seek(&self.frames, time);
        if cursor.valid(&self.frames) && cursor.time(&self.frames) == time {
            return cursor.value(&self.frames).clone();
        }
        cursor.step_back(&self.frames);
        if cursor.valid(&self.frames) {
            cursor.value(&self.frames).clone()
        } else {
            self.initvalue.clone()
        }
    }

    /// The time of the checkpoint governing `time`, or `(0, 0)` when no
    /// checkpoint is at or before it.
    pub fn checkpoint(&self, time: impl Into<InternedTime>) -> DeltaTime {
        let time = time.into();
        let mut cursor = Cursor::seek(&self.frames, time);
        if cursor.valid(&self.frames) && cursor.time(&self.frames) == time {
            return time.get();
        }
        cursor.step_back(&self.frames);
        if cursor.valid(&self.frames) {
            cursor.time(&self.frames).get()
        } else {
            DeltaTime::new(0, 0)
        }
    }

    /// The latest checkpoint time strictly before `base`, if any.
    pub fn prev_checkpoint(&self, base: impl Into<InternedTime>) -> Option<InternedTime> {
        if !self.has_checkpoints() {
            return None;
        }
        let base = base.into();
        let mut cursor = Cursor::seek(&self.frames, base);
        if !cursor.valid(&self.frames) {
            cursor.step_back(&self.frames);
        }
        while cursor.valid(&self.frames) && cursor.time(&self.frames) >= base {
            cursor.step_back(&self.frames);
        }
        if cursor.valid(&self.frames) {
            Some(cursor.time(&self.frames))
        } else {
            None
        }
    }

    /// The earliest checkpoint time strictly after `base`, if any.
    pub fn next_checkpoint(&self, base: impl Into<InternedTime>) -> Option<InternedTime> {
        let base = base.into();
        let mut cursor = Cursor::seek(&self.frames, base);
        while cursor.valid(&self.frames) && cursor.time(&self.frames) <= base {
            cursor.step(&self.frames);
        }
        if cursor.valid(&self.frames) {
            Some(cursor.time(&self.frames))
        } else {
            None
        }
    }

    /// True when the value at `time` differs from the value the signal held
    /// at the end of the previous simulation cycle.
    pub fn changed(&self, time: impl Into<InternedTime>) -> bool {
        let time = time.into();
        let mut cursor = Cursor::seek(&self.frames, time);

        let mut current = self.initvalue.clone();
        if cursor.valid(&self.frames) && cursor.time(&self.frames) == time {
            current = cursor.value(&self.frames).clone();
        } else {
            cursor.step_back(&self.frames);
            if cursor.valid(&self.frames) {
                current = cursor.value(&self.frames).clone();
            }
        }

        // walk out of the queried simulation cycle
        while cursor.valid(&self.frames)
            && cursor.time(&self.frames).simcycle() == time.simcycle()
        {
            cursor.step_back(&self.frames);
        }

        let previous = if cursor.valid(&self.frames) {
            cursor.value(&self.frames).clone()
        } else {
            self.initvalue.clone()
        };

        previous != current
    }

    /// Stores `value` at `time`, merging with both neighbors.
    pub fn set(&mut self, value: V, time: impl Into<InternedTime>) {
        self.set_with(value, time, ChangeMode::MERGE_BOTH);
    }

    /// Stores `value` at `time` under the given change mode.
    pub fn set_with(&mut self, value: V, time: impl Into<InternedTime>, mode: ChangeMode) {
        debug_assert!(
            !(mode.contains(ChangeMode::KEEP_FUTURE_CYCLE)
                && mode.contains(ChangeMode::CLEAR_FUTURE)),
            "KEEP_FUTURE_CYCLE and CLEAR_FUTURE cannot be combined"
        );

        let time = time.into();
        let cursor = Cursor::seek(&self.frames, time);

        if cursor.valid(&self.frames) {
            let cur_time = cursor.time(&self.frames);

            if cur_time == time {
                let cur_val = cursor.value(&self.frames).clone();
                if cur_val != value {
                    *cursor.value_mut(&mut self.frames) = value;
                }
                self.handle_changes(cursor, mode, time, cur_val);
            } else {
                debug_assert!(cur_time > time, "seek landed before the requested time");

                let mut cur_val = self.initvalue.clone();
                let mut prev = cursor;
                prev.step_back(&self.frames);
                if prev.valid(&self.frames) {
                    cur_val = prev.value(&self.frames).clone();
                } else if mode.contains(ChangeMode::MERGE_EARLIER) && value == self.initvalue {
                    // nothing precedes the write and it repeats the initvalue
                    return;
                }

                let frames_before = self.frames.len();
                insert_at(cursor, &mut self.frames, time, value);
                self.account_frames(frames_before);
                self.handle_changes(cursor, mode, time, cur_val);
            }
        } else {
            // the seek leaves invalid cursors only as insertion points
            debug_assert!(
                cursor.at_frame_end(&self.frames) || cursor.frame >= self.frames.len(),
                "seek produced an unusable cursor"
            );
            let mut cur_val = self.initvalue.clone();
            let mut prev = cursor;
            prev.step_back(&self.frames);
            if prev.valid(&self.frames) {
                cur_val = prev.value(&self.frames).clone();
            }
            if mode.contains(ChangeMode::MERGE_EARLIER) && cur_val == value {
                return;
            }

            let frames_before = self.frames.len();
            insert_at(cursor, &mut self.frames, time, value);
            self.account_frames(frames_before);
            self.handle_changes(cursor, mode, time, cur_val);
        }
    }

    /// Overwrites the half-open range `[begin, end)` with `value`.
    ///
    /// Afterwards no checkpoint survives strictly inside the range; `begin`
    /// carries a checkpoint exactly if the value changes there, and `end`
    /// carries one exactly if the value changes back to what followed.
    pub fn set_range(
        &mut self,
        value: V,
        begin: impl Into<InternedTime>,
        end: impl Into<InternedTime>,
    ) {
        let begin = begin.into();
        let end = end.into();
        debug_assert!(begin != end, "set_range needs a non-empty range");

        let mut cursor = Cursor::seek(&self.frames, begin);

        let mut last_value = self.initvalue.clone();
        {
            let mut prev = cursor;
            prev.step_back(&self.frames);
            if prev.valid(&self.frames) {
                last_value = prev.value(&self.frames).clone();
            }
        }

        let mut current_value = if cursor.valid(&self.frames) && cursor.time(&self.frames) == begin
        {
            cursor.value(&self.frames).clone()
        } else {
            last_value.clone()
        };

        let do_set_begin = last_value != value;

        // the first two checkpoints inside the range become recycled slots
        // for the boundary checkpoints; the rest are erased outright
        let mut begin_slot: Option<Cursor> = None;
        let mut end_slot: Option<Cursor> = None;

        while cursor.valid(&self.frames) && cursor.time(&self.frames) <= end {
            current_value = cursor.value(&self.frames).clone();
            if end_slot.is_some() {
                erase_at(cursor, &mut self.frames);
            } else {
                if begin_slot.is_none() {
                    begin_slot = Some(cursor);
                } else {
                    end_slot = Some(cursor);
                }
                cursor.step(&self.frames);
            }
        }

        let do_set_end = current_value != value;

        if let Some(end_slot) = end_slot {
            // a checkpoint directly after the range repeating the resumed
            // value folds into the range end
            if cursor.valid(&self.frames) && *cursor.value(&self.frames) == current_value {
                erase_at(cursor, &mut self.frames);
            }
            if do_set_end {
                end_slot.set_time(&mut self.frames, end);
                *end_slot.value_mut(&mut self.frames) = current_value;
            } else {
                erase_at(end_slot, &mut self.frames);
            }
        } else if do_set_end {
            insert_at(cursor, &mut self.frames, end, current_value);
        }

        if let Some(begin_slot) = begin_slot {
            if do_set_begin {
                begin_slot.set_time(&mut self.frames, begin);
                *begin_slot.value_mut(&mut self.frames) = value;
            } else {
                erase_at(begin_slot, &mut self.frames);
            }
        } else if do_set_begin {
            insert_at(cursor, &mut self.frames, begin, value);
        }
    }

    /// Removes every checkpoint.
    pub fn clear(&mut self) {
        let frames_before = self.frames.len();
        let checkpoints_before = self.num_checkpoints();

        self.frames[0].reset(InternedTime::default());
        self.frames.truncate(1);

        if let Some(logger) = &self.logger {
            logger.log(DropEvent {
                frames: frames_before - 1,
                checkpoints: checkpoints_before,
            });
        }
    }

    /// Collapses every simulation cycle to a single end-of-cycle checkpoint.
    ///
    /// A cycle keeps a checkpoint only when its settled value differs from
    /// the previous kept cycle's; intermediate delta transitions disappear.
    pub fn remove_delta_cycles(&mut self) {
        let mut write = Cursor::BEGIN;
        let mut read = Cursor::BEGIN;

        let mut current_cycle = 0;
        let mut current_value = self.initvalue.clone();
        let mut previous_value = self.initvalue.clone();

        while read.valid(&self.frames) {
            let cycle = read.time(&self.frames).simcycle();
            if current_cycle != cycle && current_value != previous_value {
                previous_value = current_value.clone();
                self.write_end_of_cycle(&mut write, current_cycle, current_value);
            }
            current_cycle = cycle;
            current_value = read.value(&self.frames).clone();
            read.step(&self.frames);
        }

        if current_value != previous_value {
            self.write_end_of_cycle(&mut write, current_cycle, current_value);
        }

        if write.valid(&self.frames) {
            let frames_before = self.frames.len();
            let checkpoints_before = self.num_checkpoints();
            truncate_at(write, &mut self.frames);
            if let Some(logger) = &self.logger {
                logger.log(DropEvent {
                    frames: frames_before - self.frames.len(),
                    checkpoints: checkpoints_before - self.num_checkpoints(),
                });
            }
        }
    }

    /// Copies every checkpoint at or before `upper` into a fresh trace.
    pub fn clone_through(&self, upper: impl Into<InternedTime>) -> Self {
        let upper = upper.into();
        let mut result = Trace::with_logger(self.initvalue.clone(), self.logger.clone());
        let mut cursor = Cursor::BEGIN;
        while cursor.valid(&self.frames) && cursor.time(&self.frames) <= upper {
            append_val(
                &mut result.frames,
                cursor.value(&self.frames).clone(),
                cursor.time(&self.frames),
            );
            cursor.step(&self.frames);
        }
        result
    }

    /// Iterates the stored `(time, value)` checkpoints in time order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            cursor: Cursor::BEGIN,
            frames: &self.frames,
        }
    }

    /// Panics when the trace violates its structural invariants.
    pub fn check_consistency(&self) {
        assert!(!self.frames.is_empty(), "a trace always owns a frame");
        for frame in self.frames.iter() {
            assert!(frame.len() <= TRACE_FRAME_SIZE, "frame overfilled");
            for pair in frame.times().windows(2) {
                assert!(pair[0] < pair[1], "frame times must strictly increase");
            }
        }
        for index in 1..self.frames.len() {
            assert!(!self.frames[index].is_empty(), "only a sole frame may be empty");
            assert!(
                self.frames[index - 1].closer() < self.frames[index].leader(),
                "adjacent frames must not overlap"
            );
        }
        if self.frames.len() > 1 {
            assert!(!self.frames[0].is_empty(), "only a sole frame may be empty");
        }
    }

    /// Applies the post-write actions of a change mode around `cursor`.
    ///
    /// `cur_val` is the value governing `time` before the write. The merge
    /// order, later before earlier, keeps the cursor valid between the two.
    fn handle_changes(&mut self, cursor: Cursor, mode: ChangeMode, time: InternedTime, cur_val: V) {
        if mode.contains(ChangeMode::KEEP_FUTURE_CYCLE) {
            self.set_with(
                cur_val,
                InternedTime::new(time.get() + 1),
                ChangeMode::MERGE_BOTH,
            );
        }

        if !cursor.valid(&self.frames) {
            return;
        }

        if mode.contains(ChangeMode::MERGE_LATER) {
            self.merge_later(cursor);
        }
        if mode.contains(ChangeMode::MERGE_EARLIER) {
            self.merge_earlier(cursor);
        }
        if mode.contains(ChangeMode::CLEAR_FUTURE) {
            self.clear_future(cursor);
        }
    }

    /// Erases the entry at `cursor` when its predecessor holds the same value.
    fn merge_earlier(&mut self, cursor: Cursor) {
        let mut prev = cursor;
        prev.step_back(&self.frames);
        if prev.valid(&self.frames) && prev.value(&self.frames) == cursor.value(&self.frames) {
            erase_at(cursor, &mut self.frames);
            if let Some(logger) = &self.logger {
                logger.log(MergeEvent { earlier: true });
            }
        }
    }

    /// Erases the successor of `cursor` when it holds the same value.
    fn merge_later(&mut self, cursor: Cursor) {
        let mut next = cursor;
        next.step(&self.frames);
        if next.valid(&self.frames) && next.value(&self.frames) == cursor.value(&self.frames) {
            erase_at(next, &mut self.frames);
            if let Some(logger) = &self.logger {
                logger.log(MergeEvent { earlier: false });
            }
        }
    }

    /// Drops every checkpoint strictly after `cursor`.
    fn clear_future(&mut self, cursor: Cursor) {
        let frames_before = self.frames.len();
        let checkpoints_before = self.num_checkpoints();

        self.frames.truncate(cursor.frame + 1);
        self.frames[cursor.frame].truncate(cursor.pos + 1);

        if let Some(logger) = &self.logger {
            logger.log(DropEvent {
                frames: frames_before - self.frames.len(),
                checkpoints: checkpoints_before - self.num_checkpoints(),
            });
        }
    }

    /// Emits one end-of-cycle checkpoint at the write cursor and advances it.
    fn write_end_of_cycle(&mut self, target: &mut Cursor, cycle: u64, value: V) {
        let eoc = InternedTime::new(DeltaTime::end_of_cycle(cycle));
        if target.valid(&self.frames) {
            target.set_time(&mut self.frames, eoc);
            *target.value_mut(&mut self.frames) = value;
        } else {
            let frames_before = self.frames.len();
            insert_at(*target, &mut self.frames, eoc, value);
            self.account_frames(frames_before);
        }
        target.step(&self.frames);
    }

    /// Account frame allocations. Only performs work if a logger exists.
    fn account_frames(&self, frames_before: usize) {
        if let Some(logger) = &self.logger {
            if self.frames.len() > frames_before {
                logger.log(FrameEvent {
                    frames: self.frames.len(),
                });
            }
        }
    }
}

impl<V: Value> Clone for Trace<V> {
    /// Deep-copies the trace; the copy compares equal to the source.
    fn clone(&self) -> Self {
        let mut result = Trace::with_logger(self.initvalue.clone(), self.logger.clone());
        let mut cursor = Cursor::BEGIN;
        while cursor.valid(&self.frames) {
            append_val(
                &mut result.frames,
                cursor.value(&self.frames).clone(),
                cursor.time(&self.frames),
            );
            cursor.step(&self.frames);
        }
        result
    }
}

impl<V: fmt::Debug> fmt::Debug for Trace<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.frames.iter()).finish()
    }
}

/// Iterator over the `(time, value)` checkpoints of a trace.
pub struct Iter<'a, V> {
    cursor: Cursor,
    frames: &'a FrameSeq<V>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (InternedTime, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let frames = self.frames;
        if self.cursor.valid(frames) {
            let item = (self.cursor.time(frames), self.cursor.value(frames));
            self.cursor.step(frames);
            Some(item)
        } else {
            None
        }
    }
}

impl<'a, V: Value> IntoIterator for &'a Trace<V> {
    type Item = (InternedTime, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Walks two traces in lock-step and reports every difference to `log`.
///
/// The traces are compared as step functions over time: at each checkpoint of
/// either trace, the currently held values are compared, and `log` receives
/// `(time, a_value, b_value)` for every inequality. Returns true when no
/// difference was reported.
pub fn compare_traces<V: Value>(
    a: &Trace<V>,
    b: &Trace<V>,
    mut log: impl FnMut(DeltaTime, &V, &V),
) -> bool {
    compare_inner(a, b, &mut |time, a_val, b_val| {
        log(time, a_val, b_val);
        true
    })
}

/// Lock-step comparison; `log` returns whether to keep scanning.
fn compare_inner<V: Value>(
    a: &Trace<V>,
    b: &Trace<V>,
    log: &mut dyn FnMut(DeltaTime, &V, &V) -> bool,
) -> bool {
    let mut iter_a = a.iter();
    let mut iter_b = b.iter();
    let mut next_a = iter_a.next();
    let mut next_b = iter_b.next();
    let mut current_a = a.initvalue.clone();
    let mut current_b = b.initvalue.clone();
    let mut equal = true;

    while next_a.is_some() || next_b.is_some() {
        let time = match (next_a, next_b) {
            (Some((time_a, value_a)), Some((time_b, value_b))) => {
                if time_a < time_b {
                    current_a = value_a.clone();
                    next_a = iter_a.next();
                    time_a
                } else if time_b < time_a {
                    current_b = value_b.clone();
                    next_b = iter_b.next();
                    time_b
                } else {
                    current_a = value_a.clone();
                    current_b = value_b.clone();
                    next_a = iter_a.next();
                    next_b = iter_b.next();
                    time_a
                }
            }
            (Some((time_a, value_a)), None) => {
                current_a = value_a.clone();
                next_a = iter_a.next();
                time_a
            }
            (None, Some((time_b, value_b))) => {
                current_b = value_b.clone();
                next_b = iter_b.next();
                time_b
            }
            (None, None) => unreachable!("the loop condition excludes this"),
        };

        if current_a != current_b {
            equal = false;
            if !log(time.get(), &current_a, &current_b) {
                return false;
            }
        }
    }

    equal
}

impl<V: Value> PartialEq for Trace<V> {
    fn eq(&self, other: &Self) -> bool {
        compare_inner(self, other, &mut |_, _, _| false)
    }
}
