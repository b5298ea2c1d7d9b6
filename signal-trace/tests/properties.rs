//! Property tests over random operation sequences.
//!
//! Two harnesses: one drives arbitrary mode combinations and checks the
//! structural invariants after every step, the other restricts itself to
//! merging writes and compares the trace, as a step function over time,
//! against a naive map-backed model.

use std::collections::BTreeMap;

use proptest::prelude::*;

use signal_trace::{ChangeMode, DeltaTime, Trace};

#[derive(Debug, Clone)]
enum Op {
    Set {
        value: u8,
        time: DeltaTime,
        mode: ChangeMode,
    },
    SetRange {
        value: u8,
        begin: DeltaTime,
        end: DeltaTime,
    },
    Clear,
    RemoveDeltaCycles,
}

fn time_strategy() -> impl Strategy<Value = DeltaTime> {
    (0u64..24, prop_oneof![Just(0u64), 1u64..4, Just(255u64)])
        .prop_map(|(simcycle, deltacycle)| DeltaTime::new(simcycle, deltacycle))
}

fn mode_strategy() -> impl Strategy<Value = ChangeMode> {
    prop_oneof![
        Just(ChangeMode::NO_CHANGE),
        Just(ChangeMode::MERGE_EARLIER),
        Just(ChangeMode::MERGE_LATER),
        Just(ChangeMode::MERGE_BOTH),
        Just(ChangeMode::CLEAR_FUTURE),
        Just(ChangeMode::MERGE_BOTH.union(ChangeMode::CLEAR_FUTURE)),
        Just(ChangeMode::KEEP_FUTURE_CYCLE),
        Just(ChangeMode::MERGE_BOTH.union(ChangeMode::KEEP_FUTURE_CYCLE)),
    ]
}

fn range_strategy() -> impl Strategy<Value = (DeltaTime, DeltaTime)> {
    (time_strategy(), time_strategy())
        .prop_filter("ranges must be non-empty", |(begin, end)| begin != end)
        .prop_map(|(a, b)| if a < b { (a, b) } else { (b, a) })
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => (0u8..4, time_strategy(), mode_strategy())
            .prop_map(|(value, time, mode)| Op::Set { value, time, mode }),
        3 => (0u8..4, range_strategy())
            .prop_map(|(value, (begin, end))| Op::SetRange { value, begin, end }),
        1 => Just(Op::Clear),
        1 => Just(Op::RemoveDeltaCycles),
    ]
}

/// Structural invariants that must hold after every operation.
fn assert_invariants(trace: &Trace<u8>) {
    trace.check_consistency();
    assert!(trace.capacity() >= trace.num_checkpoints());
    assert_eq!(trace.capacity() % 32, 0);

    let listed = trace.checkpoints();
    let iterated: Vec<_> = trace.iter().map(|(time, _)| time).collect();
    assert_eq!(listed, iterated);
}

/// A naive reference: the trace as a sorted map of checkpoints.
///
/// Merging never changes the signal as a function of time, so reads through
/// this model must agree with reads through the real store.
#[derive(Debug, Clone)]
struct Model {
    init: u8,
    map: BTreeMap<DeltaTime, u8>,
}

impl Model {
    fn new(init: u8) -> Self {
        Model { init, map: BTreeMap::new() }
    }

    fn get(&self, time: DeltaTime) -> u8 {
        self.map
            .range(..=time)
            .next_back()
            .map(|(_, &value)| value)
            .unwrap_or(self.init)
    }

    fn set(&mut self, value: u8, time: DeltaTime) {
        self.map.insert(time, value);
    }

    fn set_range(&mut self, value: u8, begin: DeltaTime, end: DeltaTime) {
        let resume = self.get(end);
        let inside: Vec<DeltaTime> = self.map.range(begin..=end).map(|(&time, _)| time).collect();
        for time in inside {
            self.map.remove(&time);
        }
        self.map.insert(begin, value);
        self.map.insert(end, resume);
    }

    fn clear(&mut self) {
        self.map.clear();
    }

    fn remove_delta_cycles(&mut self) {
        let mut terminal: Vec<(u64, u8)> = Vec::new();
        for (&time, &value) in &self.map {
            match terminal.last_mut() {
                Some((cycle, settled)) if *cycle == time.simcycle() => *settled = value,
                _ => terminal.push((time.simcycle(), value)),
            }
        }
        let mut result = BTreeMap::new();
        let mut previous = self.init;
        for (cycle, settled) in terminal {
            if settled != previous {
                result.insert(DeltaTime::end_of_cycle(cycle), settled);
                previous = settled;
            }
        }
        self.map = result;
    }
}

fn probe_times() -> Vec<DeltaTime> {
    let mut probes = Vec::new();
    for simcycle in 0..26 {
        for deltacycle in [0, 2, 255] {
            probes.push(DeltaTime::new(simcycle, deltacycle));
        }
    }
    probes
}

proptest! {
    /// Any mode combination leaves the trace structurally sound, and a write
    /// is always readable back at its own time.
    #[test]
    fn random_ops_keep_the_trace_consistent(
        ops in prop::collection::vec(op_strategy(), 0..40),
    ) {
        let mut trace = Trace::new(0u8);
        for op in ops {
            match op {
                Op::Set { value, time, mode } => {
                    trace.set_with(value, time, mode);
                    prop_assert_eq!(trace.get(time), value);
                }
                Op::SetRange { value, begin, end } => trace.set_range(value, begin, end),
                Op::Clear => trace.clear(),
                Op::RemoveDeltaCycles => trace.remove_delta_cycles(),
            }
            assert_invariants(&trace);
        }
    }

    /// Merging writes agree with the map-backed model at every probe time,
    /// and keep the stored sequence free of adjacent duplicates.
    #[test]
    fn merging_writes_match_the_reference_model(
        ops in prop::collection::vec(op_strategy(), 0..40),
    ) {
        let mut trace = Trace::new(0u8);
        let mut model = Model::new(0);

        for op in ops {
            let was_set = matches!(op, Op::Set { .. });
            match op {
                Op::Set { value, time, .. } => {
                    trace.set(value, time);
                    model.set(value, time);
                }
                Op::SetRange { value, begin, end } => {
                    trace.set_range(value, begin, end);
                    model.set_range(value, begin, end);
                }
                Op::Clear => {
                    trace.clear();
                    model.clear();
                }
                Op::RemoveDeltaCycles => {
                    trace.remove_delta_cycles();
                    model.remove_delta_cycles();
                }
            }
            assert_invariants(&trace);
            for probe in probe_times() {
                prop_assert_eq!(trace.get(probe), model.get(probe));
            }
            if was_set {
                let values: Vec<u8> = trace.iter().map(|(_, &value)| value).collect();
                for pair in values.windows(2) {
                    prop_assert_ne!(pair[0], pair[1]);
                }
            }
        }
    }

    /// Clones compare equal, restricted clones match filtered iteration, and
    /// repeating a merging write changes nothing.
    #[test]
    fn clone_and_rewrite_laws(
        ops in prop::collection::vec(op_strategy(), 0..30),
        upper in time_strategy(),
        extra_value in 0u8..4,
        extra_time in time_strategy(),
    ) {
        let mut trace = Trace::new(0u8);
        for op in ops {
            match op {
                Op::Set { value, time, .. } => trace.set(value, time),
                Op::SetRange { value, begin, end } => trace.set_range(value, begin, end),
                Op::Clear => trace.clear(),
                Op::RemoveDeltaCycles => trace.remove_delta_cycles(),
            }
        }

        let copy = trace.clone();
        prop_assert!(copy == trace);

        let restricted = trace.clone_through(upper);
        let expected: Vec<(DeltaTime, u8)> = trace
            .iter()
            .filter(|(t, _)| t.get() <= upper)
            .map(|(t, &v)| (t.get(), v))
            .collect();
        let restricted: Vec<(DeltaTime, u8)> =
            restricted.iter().map(|(t, &v)| (t.get(), v)).collect();
        prop_assert_eq!(restricted, expected);

        let mut once = trace.clone();
        once.set(extra_value, extra_time);
        let mut twice = once.clone();
        twice.set(extra_value, extra_time);
        prop_assert!(once == twice);
        prop_assert_eq!(once.num_checkpoints(), twice.num_checkpoints());
    }

    /// Collapsing delta cycles is idempotent and leaves at most one
    /// end-of-cycle checkpoint per simulation cycle.
    #[test]
    fn remove_delta_cycles_is_idempotent(
        ops in prop::collection::vec(op_strategy(), 0..30),
    ) {
        let mut trace = Trace::new(0u8);
        for op in ops {
            match op {
                Op::Set { value, time, mode } => trace.set_with(value, time, mode),
                Op::SetRange { value, begin, end } => trace.set_range(value, begin, end),
                Op::Clear => trace.clear(),
                Op::RemoveDeltaCycles => trace.remove_delta_cycles(),
            }
        }

        trace.remove_delta_cycles();
        assert_invariants(&trace);

        let collapsed: Vec<(DeltaTime, u8)> =
            trace.iter().map(|(t, &v)| (t.get(), v)).collect();
        for (time, _) in &collapsed {
            prop_assert!(time.is_end_of_cycle());
        }
        for pair in collapsed.windows(2) {
            prop_assert!(pair[0].0.simcycle() < pair[1].0.simcycle());
        }

        trace.remove_delta_cycles();
        let again: Vec<(DeltaTime, u8)> =
            trace.iter().map(|(t, &v)| (t.get(), v)).collect();
        prop_assert_eq!(collapsed, again);
    }
}

proptest! {
    /// The textual form of a time parses back to itself.
    #[test]
    fn time_text_round_trips(time in time_strategy()) {
        let text = time.to_string();
        prop_assert_eq!(text.parse::<DeltaTime>(), Ok(time));
    }

    /// Delta-granular movement stays within one cycle boundary.
    #[test]
    fn delta_steps_stay_adjacent(time in time_strategy(), delay in 1u64..300) {
        let earlier = time.previous_delta(delay);
        prop_assert!(earlier <= time);
        prop_assert!(time.simcycle() - earlier.simcycle() <= 1);

        let later = time.next_delta(delay);
        prop_assert!(later > time);
        prop_assert!(later.simcycle() - time.simcycle() <= 1);
    }
}
