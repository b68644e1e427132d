/*! A validation engine for byte strings, built on finite-state machines
whose edges are labeled with RFC 2234 (ABNF) character classes.

A graph of states and transitions is assembled with [`FsmBuilder`] (or the
id-based operations on [`Fsm`]) and then executed by a [`Validator`], any
number of which can share one graph. Edges carry either a [`CharClass`]
predicate over single bytes or an epsilon marker, plus a priority that
orders the outgoing edges of each state.

Three execution styles are available: greedy single-path validation,
depth-first backtracking across ambiguous alternatives, and incremental
(streaming) validation that suspends between bytes with the same
semantics as a one-shot run. State callbacks can collect named capture
groups as a side effect of execution, and opt-in debugging provides an
execution trace, counters, structured error records, and DOT export.

# Example

```rust
use abnf_fsm::{CharClass, FsmBuilder, Validator};

// An unsigned integer: one or more digits.
let fsm = FsmBuilder::new("integer")
    .transition("START", "DIGITS", CharClass::digit())
    .transition("DIGITS", "DIGITS", CharClass::digit())
    .start("START")
    .accept("DIGITS")
    .build()
    .unwrap();

let mut validator = Validator::new(&fsm);
assert!(validator.validate(b"2024"));
assert!(!validator.validate(b"20x4"));

// The same semantics, fed one byte at a time.
let mut streaming = Validator::new(&fsm);
streaming.feed(b'7');
assert!(streaming.end_of_stream() == abnf_fsm::StreamStatus::Complete);
```
*/

#![deny(missing_docs)]

pub use captures::CaptureError;
pub use captures::CaptureGroup;
pub use captures::Captures;

pub use charclass::CharClass;
pub use charclass::ClassError;

pub use debug::DebugConfig;
pub use debug::DebugFlag;
pub use debug::DebugFlags;
pub use debug::Metrics;
pub use debug::TraceEntry;

pub use graph::Fsm;
pub use graph::FsmBuilder;
pub use graph::GraphError;
pub use graph::State;
pub use graph::StateEvent;
pub use graph::StateHook;
pub use graph::StateId;
pub use graph::StateKind;
pub use graph::Transition;
pub use graph::TransitionEvent;
pub use graph::TransitionHook;
pub use graph::TransitionId;
pub use graph::TransitionKind;

pub use validator::BacktrackStats;
pub use validator::ErrorKind;
pub use validator::StreamStatus;
pub use validator::ValidationError;
pub use validator::Validator;

mod captures;
mod charclass;
mod debug;
mod graph;
mod validator;
