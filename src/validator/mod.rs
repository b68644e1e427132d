/*! Execution of a graph over input bytes.

A [`Validator`] borrows a finished [`Fsm`] and owns every piece of mutable
run state: the current state, the capture store, the streaming status, the
backtracking stack, the last error, the trace, and the metrics. The graph
itself is never mutated by execution, so any number of validators can run
over the same graph, one after another or side by side.

Three execution styles share the same per-byte semantics:

* [`Validator::validate`] — greedy, single-path, left to right;
* [`Validator::validate_with_backtracking`] — depth-first search across
  ambiguous alternatives;
* [`Validator::feed`] / [`Validator::end_of_stream`] — the greedy executor
  suspended between bytes.

Epsilon edges are followed only by the closure that runs once after the
final input byte: the executor walks input-free edges from the current
state in priority order until no further progress is possible, with a
visited set guarding against epsilon cycles. Callbacks fired during the
closure see the byte sentinel `\0`.
*/

use std::fmt::{self, Formatter};
use std::time::Instant;

use log::{debug, trace};
use rustc_hash::FxHashSet;
use thiserror::Error;

use crate::captures::Captures;
use crate::debug::{DebugConfig, Metrics, TraceEntry};
use crate::graph::{Fsm, StateEvent, StateId, TransitionEvent};

mod backtrack;
mod stream;

pub use backtrack::BacktrackStats;
pub use stream::StreamStatus;

use backtrack::ChoicePoint;

/// The kind of a validation failure.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No outgoing CLASS transition admitted the current byte.
    #[error("NO_MATCHING_TRANSITION")]
    NoMatchingTransition,

    /// `end_of_stream` was called before any byte was fed.
    #[error("UNEXPECTED_END_OF_INPUT")]
    UnexpectedEndOfInput,

    /// Input was consumed but the machine did not stop in an accept state.
    #[error("NOT_IN_ACCEPT_STATE")]
    NotInAcceptState,

    /// Reserved: an embedded machine failed. Composition happens at build
    /// time, so this kind is never produced by the executors.
    #[error("EMBEDDED_FSM_FAILED")]
    EmbeddedFsmFailed,

    /// A state reference was invalid.
    #[error("INVALID_STATE")]
    InvalidState,

    /// A transition reference was invalid.
    #[error("INVALID_TRANSITION")]
    InvalidTransition,

    /// Two same-priority transitions overlap. Reported by
    /// [`Fsm::validate_structure`] only; never a run-time failure.
    #[error("AMBIGUOUS_TRANSITION")]
    AmbiguousTransition,

    /// The graph has no start state.
    #[error("NO_START_STATE")]
    NoStartState,

    /// Some states cannot be reached from the start state. Reported by
    /// [`Fsm::validate_structure`] only; never a run-time failure.
    #[error("UNREACHABLE_STATES")]
    UnreachableStates,
}

/// A failed validation, retained until the next run or reset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} at position {position} in state {state}: {message}")]
pub struct ValidationError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Byte offset from the start of the input, 0-based.
    pub position: usize,
    /// The offending byte, `\0` when not applicable.
    pub byte: u8,
    /// The state the machine was in when the failure occurred.
    pub state: StateId,
    /// Human-readable explanation.
    pub message: String,
    /// Target states of the transitions that were considered. Populated
    /// only when verbose errors are enabled.
    pub attempted: Vec<StateId>,
    /// Input bytes around the failure position. Populated only when
    /// verbose errors are enabled.
    pub input_context: String,
}

/// Executes a graph over input bytes.
///
/// ```
/// use abnf_fsm::{CharClass, FsmBuilder, Validator};
///
/// let fsm = FsmBuilder::new("number")
///     .transition("START", "DIGITS", CharClass::digit())
///     .transition("DIGITS", "DIGITS", CharClass::digit())
///     .start("START")
///     .accept("DIGITS")
///     .build()
///     .unwrap();
///
/// let mut validator = Validator::new(&fsm);
/// assert!(validator.validate(b"12345"));
/// assert!(!validator.validate(b"12a45"));
/// ```
pub struct Validator<'f> {
    fsm: &'f Fsm,
    current: StateId,
    captures: Captures,
    stream: StreamStatus,
    streaming: bool,
    choices: Vec<ChoicePoint>,
    stats: BacktrackStats,
    max_backtrack_depth: usize,
    last_error: Option<ValidationError>,
    debug: DebugConfig,
    trace: Vec<TraceEntry>,
    metrics: Metrics,
}

impl<'f> Validator<'f> {
    /// Creates a validator over `fsm`, inheriting the graph's default
    /// debug configuration.
    pub fn new(fsm: &'f Fsm) -> Self {
        Self {
            fsm,
            current: fsm.start_state().clone(),
            captures: Captures::default(),
            stream: StreamStatus::Ready,
            streaming: false,
            choices: Vec::new(),
            stats: BacktrackStats::default(),
            max_backtrack_depth: 0,
            last_error: None,
            debug: *fsm.debug_config(),
            trace: Vec::new(),
            metrics: Metrics::default(),
        }
    }

    /// The graph being executed.
    pub fn fsm(&self) -> &'f Fsm {
        self.fsm
    }

    /// Validates `input` greedily: at every byte the highest-priority
    /// matching CLASS transition is taken and never reconsidered.
    ///
    /// Returns `true` if the whole input was consumed and the machine
    /// finished in an accept state (after the epsilon closure). On failure
    /// the machine stays where it stopped and [`Validator::last_error`]
    /// describes the failure.
    pub fn validate(&mut self, input: &[u8]) -> bool {
        self.reset();
        let started = Instant::now();

        if !self.fsm.start_state().is_valid() {
            self.fail_no_start();
            return false;
        }

        for (position, &byte) in input.iter().enumerate() {
            self.captures.set_position(position);
            if !self.step(byte, position, input, 0) {
                return false;
            }
            if self.debug.has_collect_metrics() {
                self.metrics.characters_processed += 1;
            }
            self.captures.record(byte);
        }

        self.captures.set_position(input.len());
        self.close_epsilon(input.len());

        if !self.in_accept_state() {
            self.fail_not_accept(input.len(), input, 0);
            return false;
        }

        self.record_timing(started);
        true
    }

    /// The state the machine is currently in.
    pub fn current_state(&self) -> &StateId {
        &self.current
    }

    /// Returns `true` if the current state is in the accept set.
    pub fn in_accept_state(&self) -> bool {
        self.fsm.is_accept(&self.current)
    }

    /// Returns the machine to its initial runnable state: current state
    /// back to start, captures, trace, metrics, streaming status, choice
    /// stack, and the last error all cleared.
    pub fn reset(&mut self) {
        self.current = self.fsm.start_state().clone();
        self.last_error = None;
        self.trace.clear();
        self.metrics.reset();
        self.captures.clear();
        self.captures.set_position(0);
        self.stream = StreamStatus::Ready;
        self.streaming = false;
        self.choices.clear();
        self.stats.reset();
    }

    /// The error recorded by the most recent failure, if any.
    pub fn last_error(&self) -> Option<&ValidationError> {
        self.last_error.as_ref()
    }

    /// The capture store of the current run.
    pub fn captures(&self) -> &Captures {
        &self.captures
    }

    /// Mutable access to the capture store, for opening and closing
    /// groups outside of callbacks.
    pub fn captures_mut(&mut self) -> &mut Captures {
        &mut self.captures
    }

    /// The recorded trace. Empty unless transition tracing is enabled.
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Discards the recorded trace.
    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    /// The collected metrics. All zero unless metrics collection is
    /// enabled.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Zeroes the collected metrics.
    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }

    /// This validator's debug configuration.
    pub fn debug_config(&self) -> &DebugConfig {
        &self.debug
    }

    /// Mutable access to the debug configuration.
    pub fn debug_config_mut(&mut self) -> &mut DebugConfig {
        &mut self.debug
    }

    /// Replaces the debug configuration.
    pub fn set_debug_config(&mut self, config: DebugConfig) {
        self.debug = config;
    }

    // Consumes one byte greedily: the first outgoing CLASS transition (in
    // priority order) whose predicate admits the byte is taken. Returns
    // false and records the error if none matches.
    pub(crate) fn step(
        &mut self,
        byte: u8,
        position: usize,
        window: &[u8],
        window_start: usize,
    ) -> bool {
        let fsm = self.fsm;
        let found = fsm
            .outgoing(&self.current)
            .iter()
            .copied()
            .find(|&i| fsm.transition_at(i).matches(byte));
        match found {
            Some(index) => {
                self.fire(index, byte, position, false);
                true
            }
            None => {
                self.fail_no_match(byte, position, window, window_start);
                false
            }
        }
    }

    // Takes one transition: fires the exit/transition/entry callback
    // triple (entry and exit only when the state changes), advances the
    // current state, and updates metrics, logging, and the trace.
    pub(crate) fn fire(&mut self, index: usize, byte: u8, position: usize, epsilon: bool) {
        let fsm = self.fsm;
        let transition = fsm.transition_at(index);
        let from = self.current.clone();
        let to = transition.to().clone();
        let changed = from != to;

        if changed {
            if let Some(state) = fsm.state(&from) {
                if let Some(hook) = &state.on_exit {
                    let event = StateEvent { state: from.clone(), position, byte };
                    hook(&mut self.captures, &event);
                }
            }
        }

        if let Some(hook) = &transition.on_step {
            let event = TransitionEvent {
                from: from.clone(),
                to: to.clone(),
                byte,
                position,
                transition: transition.id(),
            };
            hook(&mut self.captures, &event);
        }

        self.current = to.clone();

        if changed {
            if let Some(state) = fsm.state(&to) {
                if let Some(hook) = &state.on_entry {
                    let event = StateEvent { state: to.clone(), position, byte };
                    hook(&mut self.captures, &event);
                }
            }
        }

        if self.debug.has_collect_metrics() {
            if epsilon {
                self.metrics.epsilon_transitions += 1;
            } else {
                self.metrics.transitions_taken += 1;
                if changed {
                    self.metrics.states_visited += 1;
                }
            }
        }

        if changed && self.debug.has_trace_state_changes() {
            debug!("[{}] state change: {} -> {}", fsm.name(), from, self.current);
        }

        if self.debug.has_trace_transitions() {
            let entry = TraceEntry {
                step: self.trace.len(),
                from,
                to,
                byte,
                transition: transition.id(),
                description: transition.description().to_string(),
            };
            trace!("[{}] {}", fsm.name(), entry);
            self.trace.push(entry);
        }
    }

    // Follows epsilon edges from the current state until no further
    // progress is possible. The visited set stops epsilon cycles; the
    // closure never consults input, and callbacks see the byte `\0`.
    pub(crate) fn close_epsilon(&mut self, position: usize) {
        let fsm = self.fsm;
        let mut visited: FxHashSet<StateId> = FxHashSet::default();
        visited.insert(self.current.clone());
        loop {
            let next = fsm.outgoing(&self.current).iter().copied().find(|&i| {
                let t = fsm.transition_at(i);
                t.is_epsilon() && !visited.contains(t.to())
            });
            match next {
                Some(index) => {
                    self.fire(index, 0, position, true);
                    visited.insert(self.current.clone());
                }
                None => break,
            }
        }
    }

    pub(crate) fn record_timing(&mut self, started: Instant) {
        if self.debug.has_collect_metrics() {
            let elapsed = started.elapsed();
            self.metrics.validation_time_ns = elapsed.as_nanos() as u64;
            self.metrics.processing_time_us = elapsed.as_micros() as u64;
        }
    }

    pub(crate) fn fail_no_start(&mut self) {
        let error = ValidationError {
            kind: ErrorKind::NoStartState,
            position: 0,
            byte: 0,
            state: self.current.clone(),
            message: "no start state defined".to_string(),
            attempted: Vec::new(),
            input_context: String::new(),
        };
        self.record_error(error);
    }

    pub(crate) fn fail_no_match(
        &mut self,
        byte: u8,
        position: usize,
        window: &[u8],
        window_start: usize,
    ) {
        let attempted = if self.debug.has_verbose_errors() {
            self.fsm
                .transitions_from(&self.current)
                .iter()
                .filter(|t| !t.is_epsilon())
                .map(|t| t.to().clone())
                .collect()
        } else {
            Vec::new()
        };
        let error = ValidationError {
            kind: ErrorKind::NoMatchingTransition,
            position,
            byte,
            state: self.current.clone(),
            message: format!(
                "no transition from {} for byte {}",
                self.current,
                display_byte(byte)
            ),
            attempted,
            input_context: self.context(window, window_start, position),
        };
        self.record_error(error);
    }

    pub(crate) fn fail_not_accept(
        &mut self,
        position: usize,
        window: &[u8],
        window_start: usize,
    ) {
        let error = ValidationError {
            kind: ErrorKind::NotInAcceptState,
            position,
            byte: 0,
            state: self.current.clone(),
            message: format!(
                "input consumed but not in accept state; current state: {}",
                self.current
            ),
            attempted: Vec::new(),
            input_context: self.context(window, window_start, position),
        };
        self.record_error(error);
    }

    pub(crate) fn record_error(&mut self, error: ValidationError) {
        if self.debug.has_export_dot_on_error() {
            debug!(
                "[{}] validation failed: {}\n{}",
                self.fsm.name(),
                error,
                self.fsm.to_dot()
            );
        }
        self.last_error = Some(error);
    }

    // A window of input bytes around the failure position, for verbose
    // error records. `window` holds input starting at offset
    // `window_start` of the overall input.
    fn context(&self, window: &[u8], window_start: usize, position: usize) -> String {
        if !self.debug.has_verbose_errors() || window.is_empty() {
            return String::new();
        }
        let relative = position.saturating_sub(window_start).min(window.len());
        let start = relative.saturating_sub(10);
        let end = (relative + 10).min(window.len());
        String::from_utf8_lossy(&window[start..end]).into_owned()
    }
}

impl fmt::Debug for Validator<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Validator")
            .field("fsm", &self.fsm.name())
            .field("current", &self.current)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

fn display_byte(byte: u8) -> String {
    if (0x20..=0x7E).contains(&byte) {
        format!("'{}'", byte as char)
    } else {
        format!("0x{byte:02X}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::charclass::CharClass;
    use crate::debug::{DebugFlag, DebugFlags};
    use crate::graph::{FsmBuilder, Transition};
    use crate::validator::{ErrorKind, Validator};

    fn digits_fsm() -> crate::graph::Fsm {
        FsmBuilder::new("digits")
            .transition("START", "A", CharClass::digit())
            .transition("A", "A", CharClass::digit())
            .start("START")
            .accept("A")
            .debug_flags(DebugFlags::full())
            .build()
            .unwrap()
    }

    #[test]
    fn accepts_digit_runs_and_counts_them() {
        let fsm = digits_fsm();
        let mut validator = Validator::new(&fsm);

        assert!(validator.validate(b"123"));
        assert_eq!(3, validator.metrics().transitions_taken);
        assert_eq!(3, validator.metrics().characters_processed);
        assert_eq!(1, validator.metrics().states_visited);
        assert_eq!(0, validator.metrics().epsilon_transitions);
        assert!(validator.in_accept_state());
    }

    #[test]
    fn rejects_with_a_position_and_byte() {
        let fsm = digits_fsm();
        let mut validator = Validator::new(&fsm);

        assert!(!validator.validate(b"12a"));
        let error = validator.last_error().unwrap();
        assert_eq!(ErrorKind::NoMatchingTransition, error.kind);
        assert_eq!(2, error.position);
        assert_eq!(b'a', error.byte);
        assert_eq!("A", error.state.name());
        assert_eq!("12a", error.input_context);
        assert_eq!(1, error.attempted.len());
    }

    #[test]
    fn literal_sequence_is_case_sensitive() {
        let fsm = FsmBuilder::new("get")
            .transition("START", "G", CharClass::literal(b'G'))
            .transition("G", "GE", CharClass::literal(b'E'))
            .transition("GE", "GET", CharClass::literal(b'T'))
            .start("START")
            .accept("GET")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        assert!(validator.validate(b"GET"));
        assert!(!validator.validate(b"GE"));
        assert_eq!(
            ErrorKind::NotInAcceptState,
            validator.last_error().unwrap().kind
        );
        assert!(!validator.validate(b"GETS"));
        assert!(!validator.validate(b"get"));
        assert_eq!(0, validator.last_error().unwrap().position);
    }

    #[test]
    fn too_short_input_reports_not_in_accept_state() {
        let fsm = FsmBuilder::new("two")
            .transition("START", "D1", CharClass::digit())
            .transition("D1", "ACCEPT", CharClass::digit())
            .start("START")
            .accept("ACCEPT")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        assert!(!validator.validate(b"1"));
        let error = validator.last_error().unwrap();
        assert_eq!(ErrorKind::NotInAcceptState, error.kind);
        assert_eq!(1, error.position);
        assert_eq!("D1", error.state.name());
    }

    #[test]
    fn priority_decides_between_overlapping_edges() {
        let fsm = FsmBuilder::new("priority")
            .transition_with_priority(
                "START",
                "HIGH",
                CharClass::digit(),
                Transition::PRIORITY_HIGH,
            )
            .transition_with_priority(
                "START",
                "LOW",
                CharClass::digit(),
                Transition::PRIORITY_LOW,
            )
            .start("START")
            .accept("HIGH")
            .accept("LOW")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        assert!(validator.validate(b"5"));
        assert_eq!("HIGH", validator.current_state().name());
    }

    #[test]
    fn equal_priority_falls_back_to_insertion_order() {
        let fsm = FsmBuilder::new("tie")
            .transition("START", "FIRST", CharClass::digit())
            .transition("START", "SECOND", CharClass::digit())
            .start("START")
            .accept("FIRST")
            .accept("SECOND")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        assert!(validator.validate(b"7"));
        assert_eq!("FIRST", validator.current_state().name());
    }

    #[test]
    fn epsilon_edges_are_followed_at_end_of_input() {
        let fsm = FsmBuilder::new("epsilon")
            .transition("START", "MIDDLE", CharClass::digit())
            .epsilon("MIDDLE", "ACCEPT")
            .start("START")
            .accept("ACCEPT")
            .debug_flags(DebugFlags::none() | DebugFlag::CollectMetrics)
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        assert!(validator.validate(b"5"));
        assert_eq!("ACCEPT", validator.current_state().name());
        assert_eq!(1, validator.metrics().epsilon_transitions);
    }

    #[test]
    fn epsilon_chains_are_followed() {
        let fsm = FsmBuilder::new("chain")
            .transition("START", "A", CharClass::digit())
            .epsilon("A", "B")
            .epsilon("B", "ACCEPT")
            .start("START")
            .accept("ACCEPT")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);
        assert!(validator.validate(b"7"));
    }

    #[test]
    fn epsilon_cycles_terminate() {
        let fsm = FsmBuilder::new("cycle")
            .epsilon("A", "B")
            .epsilon("B", "A")
            .epsilon("B", "ACCEPT")
            .start("A")
            .accept("ACCEPT")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);
        assert!(validator.validate(b""));
        assert_eq!("ACCEPT", validator.current_state().name());
    }

    #[test]
    fn epsilon_edges_are_ignored_mid_input() {
        // The epsilon edge out of DIGITS must not be taken while CLASS
        // edges still consume input.
        let fsm = FsmBuilder::new("greedy")
            .transition("START", "DIGITS", CharClass::digit())
            .transition("DIGITS", "DIGITS", CharClass::digit())
            .epsilon("DIGITS", "ACCEPT")
            .start("START")
            .accept("ACCEPT")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);
        assert!(validator.validate(b"12345"));
        assert_eq!("ACCEPT", validator.current_state().name());
    }

    #[test]
    fn optional_suffix_via_two_accept_states() {
        let fsm = FsmBuilder::new("optional")
            .transition("START", "DIGIT", CharClass::digit())
            .transition("DIGIT", "LETTER", CharClass::alpha())
            .start("START")
            .accept("DIGIT")
            .accept("LETTER")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        assert!(validator.validate(b"5"));
        assert!(validator.validate(b"5a"));
        assert!(!validator.validate(b"a"));
    }

    #[test]
    fn alternating_pattern() {
        let fsm = FsmBuilder::new("alternating")
            .transition("START", "DIGIT", CharClass::digit())
            .transition("DIGIT", "LETTER", CharClass::alpha())
            .transition("LETTER", "DIGIT", CharClass::digit())
            .start("START")
            .accept("LETTER")
            .build()
            .unwrap();
        let mut validator = Validator::new(&fsm);

        assert!(validator.validate(b"1a"));
        assert!(validator.validate(b"1a2b3c"));
        assert!(!validator.validate(b"1"));
        assert!(!validator.validate(b"1a2"));
    }

    #[test]
    fn missing_start_state_is_reported() {
        let mut fsm = crate::graph::Fsm::new("no_start");
        let a = fsm.add_state("A");
        fsm.add_accept(&a).unwrap();
        let mut validator = Validator::new(&fsm);

        assert!(!validator.validate(b"x"));
        assert_eq!(ErrorKind::NoStartState, validator.last_error().unwrap().kind);
    }

    #[test]
    fn reset_allows_reuse_and_reproduces_runs() {
        let fsm = digits_fsm();
        let mut validator = Validator::new(&fsm);

        assert!(validator.validate(b"42"));
        let first_trace = validator.trace().to_vec();
        let first_transitions = validator.metrics().transitions_taken;
        let first_chars = validator.metrics().characters_processed;

        validator.reset();
        assert_eq!("START", validator.current_state().name());
        assert!(validator.trace().is_empty());
        assert!(validator.last_error().is_none());

        assert!(validator.validate(b"42"));
        assert_eq!(first_trace, validator.trace());
        assert_eq!(first_transitions, validator.metrics().transitions_taken);
        assert_eq!(first_chars, validator.metrics().characters_processed);
    }

    #[test]
    fn trace_records_each_step() {
        let fsm = digits_fsm();
        let mut validator = Validator::new(&fsm);

        validator.validate(b"12");
        let trace = validator.trace();
        assert_eq!(2, trace.len());
        assert_eq!(0, trace[0].step);
        assert_eq!("START", trace[0].from.name());
        assert_eq!("A", trace[0].to.name());
        assert_eq!(b'1', trace[0].byte);
        assert_eq!("A", trace[1].from.name());
        assert_eq!(b'2', trace[1].byte);

        validator.clear_trace();
        assert!(validator.trace().is_empty());
    }

    #[test]
    fn two_validators_share_one_graph() {
        let fsm = digits_fsm();
        let mut first = Validator::new(&fsm);
        let mut second = Validator::new(&fsm);

        assert!(first.validate(b"11"));
        assert!(!second.validate(b"x"));
        // The failure of one run is invisible to the other.
        assert!(first.last_error().is_none());
        assert!(second.last_error().is_some());
    }

    #[test]
    fn error_display() {
        let fsm = digits_fsm();
        let mut validator = Validator::new(&fsm);
        validator.validate(b"x");
        let error = validator.last_error().unwrap();
        let text = error.to_string();
        assert!(text.contains("NO_MATCHING_TRANSITION"));
        assert!(text.contains("position 0"));
    }
}
