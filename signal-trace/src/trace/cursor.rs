//! Cursor navigation over the frame sequence.
//!
//! A cursor is a `(frame, pos)` pair addressing one checkpoint inside a
//! trace's frames. It is the only navigation primitive: searches produce
//! cursors, reads dereference them, and every structural edit is phrased as
//! a frame-local operation at a cursor. Three states matter:
//!
//! * *valid*: `pos` addresses a live entry of `frames[frame]`;
//! * *end of frame*: `pos` is one past the last entry, a legal insertion
//!   point but not dereferenceable;
//! * *end of trace*: anything else.
//!
//! Cursors are plain indices. Any mutation of the frames invalidates cursors
//! other than those an operation deliberately maintains.

use std::fmt;

use smallvec::SmallVec;

use super::frame::{TraceFrame, TRACE_FRAME_SIZE};
use crate::time::intern::InternedTime;

/// The ordered frames of a trace. Boxed so splices move pointers, not buckets.
pub(crate) type FrameSeq<V> = SmallVec<[Box<TraceFrame<V>>; 4]>;

/// A position inside a frame sequence.
#[derive(Copy, Clone, PartialEq, Eq)]
pub(crate) struct Cursor {
    pub(crate) frame: usize,
    pub(crate) pos: usize,
}

impl Cursor {
    /// The cursor addressing the first checkpoint, when one exists.
    pub(crate) const BEGIN: Cursor = Cursor { frame: 0, pos: 0 };

    /// True when the cursor addresses a live entry.
    pub(crate) fn valid<V>(self, frames: &FrameSeq<V>) -> bool {
        self.frame < frames.len() && self.pos < frames[self.frame].len()
    }

    /// True when the cursor sits one past the last entry of its frame.
    pub(crate) fn at_frame_end<V>(self, frames: &FrameSeq<V>) -> bool {
        self.frame < frames.len() && self.pos == frames[self.frame].len()
    }

    /// Moves to the next entry, stepping across frame boundaries directly.
    pub(crate) fn step<V>(&mut self, frames: &FrameSeq<V>) {
        if self.pos + 1 < frames[self.frame].len() {
            self.pos += 1;
        } else {
            self.pos = 0;
            self.frame += 1;
        }
    }

    /// Moves to the previous entry, or past the beginning into an invalid state.
    pub(crate) fn step_back<V>(&mut self, frames: &FrameSeq<V>) {
        if self.pos > 0 {
            self.pos -= 1;
        } else if self.frame > 0 {
            self.pos = frames[self.frame - 1].len() - 1;
            self.frame -= 1;
        } else {
            self.pos = TRACE_FRAME_SIZE;
            self.frame = usize::MAX;
        }
    }

    /// The time at the cursor. The cursor must be valid.
    #[inline]
    pub(crate) fn time<V>(self, frames: &FrameSeq<V>) -> InternedTime {
        frames[self.frame].time_at(self.pos)
    }

    /// Overwrites the time at the cursor. The cursor must be valid.
    pub(crate) fn set_time<V>(self, frames: &mut FrameSeq<V>, time: InternedTime) {
        frames[self.frame].set_time_at(self.pos, time);
    }

    /// The value at the cursor. The cursor must be valid.
    #[inline]
    pub(crate) fn value<V>(self, frames: &FrameSeq<V>) -> &V {
        frames[self.frame].value_at(self.pos)
    }

    /// Mutable access to the value at the cursor. The cursor must be valid.
    #[inline]
    pub(crate) fn value_mut<V>(self, frames: &mut FrameSeq<V>) -> &mut V {
        frames[self.frame].value_at_mut(self.pos)
    }

    /// Positions a cursor at `time`, or at its insertion point.
    ///
    /// Appends dominate, so the search first probes the last frame and only
    /// then binary-searches the frames by leader and the chosen frame by
    /// time. A probe that ties the last covered time takes the slow path;
    /// the fast path is reserved for strictly later appends.
    ///
    /// Afterwards, either the cursor addresses the entry at `time`, or it
    /// marks the leftmost position whose time is greater, possibly one past
    /// the end of a frame.
    pub(crate) fn seek<V>(frames: &FrameSeq<V>, time: InternedTime) -> Cursor {
        if let Some(back) = frames.last() {
            if back.closer() < time {
                return Cursor {
                    frame: frames.len() - 1,
                    pos: back.len(),
                };
            }
        }

        let mut frame = frames.partition_point(|f| f.leader() < time);
        if frame > 0 {
            frame -= 1;
        }
        let pos = frames[frame].times().partition_point(|&t| t < time);

        if pos == frames[frame].len() {
            // everything here is earlier: move on when there is no room, or
            // when the successor frame leads with the probed time itself
            let successor = frame + 1;
            if frames[frame].full()
                || frames.get(successor).is_some_and(|f| f.leader() == time)
            {
                return Cursor { frame: successor, pos: 0 };
            }
        }
        Cursor { frame, pos }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}]", self.frame, self.pos)
    }
}

/// Inserts a checkpoint at the cursor, splitting or splicing frames on demand.
///
/// The cursor must come from a seek for `time`: either a valid position whose
/// time is greater, or an end-of-frame insertion point. Duplicate times are
/// the caller's responsibility.
pub(crate) fn insert_at<V>(
    cursor: Cursor,
    frames: &mut FrameSeq<V>,
    time: InternedTime,
    value: V,
) {
    let Cursor { frame, pos } = cursor;

    if frame >= frames.len() {
        frames.push(Box::new(TraceFrame::singleton(time, value)));
        return;
    }

    if !frames[frame].full() {
        frames[frame].insert(pos, time, value);
    } else if pos == 0 {
        frames.insert(frame, Box::new(TraceFrame::singleton(time, value)));
    } else if let Some(tail) = frames[frame].split(time) {
        let stored = frames[frame].set(time, value);
        debug_assert!(stored, "split must leave room in the head frame");
        frames.insert(frame + 1, tail);
    } else {
        // the split point is at the frame edge: splice a singleton beside it
        let singleton = Box::new(TraceFrame::singleton(time, value));
        if time < frames[frame].leader() {
            frames.insert(frame, singleton);
        } else {
            debug_assert!(time > frames[frame].closer());
            frames.insert(frame + 1, singleton);
        }
    }
}

/// Removes the checkpoint at the cursor. The cursor must be valid.
///
/// A frame losing its last entry is released, except for the sole remaining
/// frame, which is reset instead so the trace always keeps one frame.
pub(crate) fn erase_at<V>(cursor: Cursor, frames: &mut FrameSeq<V>) {
    debug_assert!(cursor.valid(frames));

    if frames[cursor.frame].len() == 1 {
        if frames.len() == 1 {
            frames[0].reset(InternedTime::default());
        } else {
            frames.remove(cursor.frame);
        }
    } else {
        frames[cursor.frame].erase(cursor.pos);
    }
}

/// Appends a checkpoint at a time past every stored one.
pub(crate) fn append_val<V>(frames: &mut FrameSeq<V>, value: V, time: InternedTime) {
    match frames.last_mut() {
        Some(back) if !back.full() => {
            let stored = back.set(time, value);
            debug_assert!(stored);
        }
        _ => frames.push(Box::new(TraceFrame::singleton(time, value))),
    }
}

/// Drops everything past the cursor, exclusive. The cursor must be valid.
pub(crate) fn truncate_at<V>(cursor: Cursor, frames: &mut FrameSeq<V>) {
    debug_assert!(cursor.valid(frames));

    frames.truncate(cursor.frame + 1);
    frames[cursor.frame].truncate(cursor.pos);

    if frames[cursor.frame].is_empty() {
        if frames.len() != 1 {
            frames.pop();
        } else {
            frames[0].reset(InternedTime::default());
        }
    }
}
