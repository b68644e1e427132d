/*! Depth-first backtracking execution.

Where the greedy executor commits to the first matching transition at
every byte, [`Validator::validate_with_backtracking`] records the
alternatives it did not take and, on a dead end, rewinds to the most
recent choice point and tries the next one. A choice point snapshots
everything the engine mutates — the current state, the input position,
and the whole capture store — so a restore is byte-identical and work
done along a discarded path leaves no residue.

The search is a single iterative loop over an explicit input position;
resuming from a choice point, whether the dead end was found mid-input or
at the failed accept check after the closure, replays the byte at the
choice position through the chosen alternative and continues forward.
Space stays linear in the deepest live path, and unambiguous inputs run
with no stack activity at all.
*/

use std::fmt::{self, Display, Formatter};
use std::time::Instant;

use crate::captures::Captures;
use crate::graph::StateId;
use crate::validator::Validator;

/// Counters describing the most recent backtracking run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BacktrackStats {
    /// Choice points pushed onto the stack.
    pub choice_points_created: usize,
    /// Times the engine restored a choice point and took an alternative.
    pub backtracks_performed: usize,
    /// Transitions taken, over all explored paths.
    pub paths_explored: usize,
    /// High-water mark of the choice stack.
    pub max_stack_depth: usize,
}

impl BacktrackStats {
    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Display for BacktrackStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "choice_points={}, backtracks={}, paths={}, max_depth={}",
            self.choice_points_created,
            self.backtracks_performed,
            self.paths_explored,
            self.max_stack_depth,
        )
    }
}

// A saved decision: the alternatives not yet tried at `position`, plus a
// snapshot of everything a restore must rewind.
pub(crate) struct ChoicePoint {
    state: StateId,
    position: usize,
    remaining: Vec<usize>,
    captures: Captures,
}

impl Validator<'_> {
    /// Validates `input`, exploring alternative transitions depth-first
    /// when the graph is ambiguous.
    ///
    /// Greedy success implies success here; in addition, inputs that the
    /// greedy executor rejects because an early transition choice led to
    /// a dead end are accepted if any combination of choices reaches an
    /// accept state. Statistics about the search are available through
    /// [`Validator::backtrack_stats`].
    pub fn validate_with_backtracking(&mut self, input: &[u8]) -> bool {
        self.reset();
        let started = Instant::now();

        if !self.fsm.start_state().is_valid() {
            self.fail_no_start();
            return false;
        }

        let mut position = 0usize;
        loop {
            if position >= input.len() {
                self.captures.set_position(input.len());
                self.close_epsilon(input.len());
                if self.in_accept_state() {
                    self.record_timing(started);
                    return true;
                }
                if !self.backtrack_resume(input, &mut position) {
                    self.fail_not_accept(input.len(), input, 0);
                    return false;
                }
                continue;
            }

            let byte = input[position];
            self.captures.set_position(position);

            let alternatives = self.matching_alternatives(byte);
            if alternatives.is_empty() {
                if !self.backtrack_resume(input, &mut position) {
                    self.fail_no_match(byte, position, input, 0);
                    return false;
                }
                continue;
            }

            if alternatives.len() > 1 || self.fsm.is_choice_point(&self.current) {
                self.push_choice_point(alternatives[1..].to_vec(), position);
            }

            self.consume(alternatives[0], byte, position);
            position += 1;
        }
    }

    /// Statistics from the most recent backtracking run.
    pub fn backtrack_stats(&self) -> &BacktrackStats {
        &self.stats
    }

    /// Zeroes the backtracking statistics.
    pub fn reset_backtrack_stats(&mut self) {
        self.stats.reset();
    }

    /// Caps the choice stack depth. Beyond the cap the engine silently
    /// stops recording choice points and proceeds greedily. `0` means
    /// unbounded (the default).
    pub fn set_max_backtrack_depth(&mut self, depth: usize) {
        self.max_backtrack_depth = depth;
    }

    /// The current choice-stack depth cap; `0` means unbounded.
    pub fn max_backtrack_depth(&self) -> usize {
        self.max_backtrack_depth
    }

    // All CLASS transitions out of the current state admitting `byte`,
    // in priority order.
    fn matching_alternatives(&self, byte: u8) -> Vec<usize> {
        let fsm = self.fsm;
        fsm.outgoing(&self.current)
            .iter()
            .copied()
            .filter(|&i| fsm.transition_at(i).matches(byte))
            .collect()
    }

    fn push_choice_point(&mut self, remaining: Vec<usize>, position: usize) {
        if self.max_backtrack_depth > 0 && self.choices.len() >= self.max_backtrack_depth {
            return;
        }
        self.choices.push(ChoicePoint {
            state: self.current.clone(),
            position,
            remaining,
            captures: self.captures.clone(),
        });
        self.stats.choice_points_created += 1;
        self.stats.max_stack_depth = self.stats.max_stack_depth.max(self.choices.len());
    }

    // Pops exhausted choice points, restores the first one with an
    // untried alternative, replays the byte at its position through that
    // alternative, and points `position` past it. Returns false when the
    // stack is exhausted.
    fn backtrack_resume(&mut self, input: &[u8], position: &mut usize) -> bool {
        loop {
            let Some(top) = self.choices.last_mut() else {
                return false;
            };
            if top.remaining.is_empty() {
                self.choices.pop();
                continue;
            }

            let index = top.remaining.remove(0);
            let resume_position = top.position;
            self.current = top.state.clone();
            self.captures = top.captures.clone();
            self.stats.backtracks_performed += 1;

            let byte = input[resume_position];
            self.captures.set_position(resume_position);
            self.consume(index, byte, resume_position);
            *position = resume_position + 1;
            return true;
        }
    }

    // Takes one CLASS transition with full callback, trace, metric, and
    // capture treatment.
    fn consume(&mut self, index: usize, byte: u8, position: usize) {
        self.fire(index, byte, position, false);
        self.stats.paths_explored += 1;
        if self.debug.has_collect_metrics() {
            self.metrics.characters_processed += 1;
        }
        self.captures.record(byte);
    }
}
