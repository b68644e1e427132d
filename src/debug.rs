/*! Observability: debug flags, execution traces, and counters.

Debugging is opt-in through a small bit mask carried by each validator.
Tracing and metrics collection are off unless the corresponding flag is
set, so an unconfigured run pays nothing beyond a few flag tests. Trace
and state-change events are additionally emitted through the [`log`]
facade at `trace!`/`debug!` level.
*/

use std::fmt::{self, Display, Formatter};

use crate::graph::{StateId, TransitionId};

// DebugFlags is the mask type, DebugFlag the individual switches:
// TraceTransitions records a trace entry (and a `trace!` log line) per
// transition, TraceStateChanges emits a `debug!` line when the current
// state changes, VerboseErrors fills the attempted-states and
// input-context error fields, CollectMetrics maintains the `Metrics`
// counters, and ExportDotOnError logs the graph in DOT form when a
// validation fails.
mod flags {
    #![allow(missing_docs)]

    use bitmask::bitmask;

    bitmask! {
        pub mask DebugFlags: u8 where flags DebugFlag {
            TraceTransitions  = 0b0000_0001,
            TraceStateChanges = 0b0000_0010,
            VerboseErrors     = 0b0000_0100,
            CollectMetrics    = 0b0000_1000,
            ExportDotOnError  = 0b0001_0000,
        }
    }
}
pub use flags::{DebugFlag, DebugFlags};

impl DebugFlags {
    /// Transition tracing plus verbose errors.
    pub fn basic() -> DebugFlags {
        DebugFlag::TraceTransitions | DebugFlag::VerboseErrors
    }

    /// Everything except DOT-on-error.
    pub fn full() -> DebugFlags {
        DebugFlag::TraceTransitions
            | DebugFlag::TraceStateChanges
            | DebugFlag::VerboseErrors
            | DebugFlag::CollectMetrics
    }

    /// [`DebugFlags::basic`] in debug builds, nothing in release builds.
    pub fn auto() -> DebugFlags {
        if cfg!(debug_assertions) {
            DebugFlags::basic()
        } else {
            DebugFlags::none()
        }
    }
}

/// Debug configuration carried by a graph (as the default for new
/// validators) and by each validator.
#[derive(Debug, Clone, Copy)]
pub struct DebugConfig {
    flags: DebugFlags,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self { flags: DebugFlags::none() }
    }
}

impl DebugConfig {
    /// Creates a configuration with the given flags.
    pub fn new(flags: DebugFlags) -> Self {
        Self { flags }
    }

    /// The current flag mask.
    pub fn flags(&self) -> DebugFlags {
        self.flags
    }

    /// Returns `true` if any flag is set.
    pub fn is_enabled(&self) -> bool {
        !self.flags.is_none()
    }

    /// Sets a flag.
    pub fn enable(&mut self, flag: DebugFlag) {
        self.flags.set(flag);
    }

    /// Clears a flag.
    pub fn disable(&mut self, flag: DebugFlag) {
        self.flags.unset(flag);
    }

    /// Flips a flag.
    pub fn toggle(&mut self, flag: DebugFlag) {
        self.flags.toggle(flag);
    }

    /// Returns `true` if per-transition tracing is on.
    pub fn has_trace_transitions(&self) -> bool {
        self.flags.contains(DebugFlag::TraceTransitions)
    }

    /// Returns `true` if state-change logging is on.
    pub fn has_trace_state_changes(&self) -> bool {
        self.flags.contains(DebugFlag::TraceStateChanges)
    }

    /// Returns `true` if verbose error payloads are on.
    pub fn has_verbose_errors(&self) -> bool {
        self.flags.contains(DebugFlag::VerboseErrors)
    }

    /// Returns `true` if metrics collection is on.
    pub fn has_collect_metrics(&self) -> bool {
        self.flags.contains(DebugFlag::CollectMetrics)
    }

    /// Returns `true` if DOT-on-error logging is on.
    pub fn has_export_dot_on_error(&self) -> bool {
        self.flags.contains(DebugFlag::ExportDotOnError)
    }
}

/// One step of an execution trace.
///
/// A zero byte marks an epsilon step: epsilon edges never consume input,
/// so the sentinel can not collide with a consumed NUL, which would appear
/// on a CLASS step instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    /// Index of this entry within the trace.
    pub step: usize,
    /// State the step left.
    pub from: StateId,
    /// State the step entered.
    pub to: StateId,
    /// The consumed byte, or `\0` for an epsilon step.
    pub byte: u8,
    /// The transition taken.
    pub transition: TransitionId,
    /// The transition's description.
    pub description: String,
}

impl Display for TraceEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "step {}: {} -> {} on ", self.step, self.from, self.to)?;
        if self.byte == 0 {
            f.write_str("ε")?;
        } else if (0x20..=0x7E).contains(&self.byte) {
            write!(f, "'{}'", self.byte as char)?;
        } else {
            write!(f, "0x{:02X}", self.byte)?;
        }
        write!(f, " (transition #{})", self.transition)?;
        if !self.description.is_empty() {
            write!(f, " [{}]", self.description)?;
        }
        Ok(())
    }
}

/// Counters and timings collected when [`DebugFlag::CollectMetrics`] is
/// set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    /// CLASS transitions taken.
    pub transitions_taken: usize,
    /// Times the current state actually changed.
    pub states_visited: usize,
    /// Input bytes consumed.
    pub characters_processed: usize,
    /// Epsilon transitions followed.
    pub epsilon_transitions: usize,
    /// Wall-clock duration of the last successful validation, nanoseconds.
    pub validation_time_ns: u64,
    /// Wall-clock duration of the last successful validation, microseconds.
    pub processing_time_us: u64,
}

impl Metrics {
    /// Zeroes every counter and timing.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transitions={}, states={}, chars={}, epsilons={}, \
             validation_time={}ns, processing_time={}µs",
            self.transitions_taken,
            self.states_visited,
            self.characters_processed,
            self.epsilon_transitions,
            self.validation_time_ns,
            self.processing_time_us,
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{DebugConfig, DebugFlag, DebugFlags};

    #[test]
    fn flag_sets() {
        let mut config = DebugConfig::default();
        assert!(!config.is_enabled());

        config.enable(DebugFlag::CollectMetrics);
        assert!(config.is_enabled());
        assert!(config.has_collect_metrics());
        assert!(!config.has_trace_transitions());

        config.disable(DebugFlag::CollectMetrics);
        assert!(!config.is_enabled());

        config.toggle(DebugFlag::VerboseErrors);
        assert!(config.has_verbose_errors());
        config.toggle(DebugFlag::VerboseErrors);
        assert!(!config.has_verbose_errors());
    }

    #[test]
    fn composite_masks() {
        let basic = DebugConfig::new(DebugFlags::basic());
        assert!(basic.has_trace_transitions());
        assert!(basic.has_verbose_errors());
        assert!(!basic.has_collect_metrics());

        let full = DebugConfig::new(DebugFlags::full());
        assert!(full.has_trace_transitions());
        assert!(full.has_trace_state_changes());
        assert!(full.has_verbose_errors());
        assert!(full.has_collect_metrics());
        assert!(!full.has_export_dot_on_error());
    }

    #[test]
    fn trace_entry_display() {
        use crate::debug::TraceEntry;
        use crate::graph::StateId;

        let entry = TraceEntry {
            step: 0,
            from: StateId::default(),
            to: StateId::default(),
            byte: b'a',
            transition: 1,
            description: "DIGIT".to_string(),
        };
        assert_eq!(
            "step 0: State_0 -> State_0 on 'a' (transition #1) [DIGIT]",
            entry.to_string()
        );

        let epsilon = TraceEntry { byte: 0, description: String::new(), ..entry };
        assert_eq!(
            "step 0: State_0 -> State_0 on ε (transition #1)",
            epsilon.to_string()
        );
    }
}
