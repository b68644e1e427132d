/*! The state-graph model.

An [`Fsm`] owns a set of tagged states and a list of transitions whose
edges carry either a [`CharClass`] predicate or an epsilon (input-free)
marker, plus a priority used to order the outgoing edges of each state.
The graph holds no execution state: validating input is the job of a
[`Validator`](crate::Validator), any number of which can be created over
one graph.

States are identified by a [`StateId`], a numeric identifier paired with
an advisory name. Outgoing transitions are indexed per state in priority
order (descending, insertion order on ties); the index is maintained on
every mutation, so it is always current and no executor ever holds a
pointer into it across a mutation.
*/

use std::fmt::{self, Display, Formatter};

use indexmap::IndexMap;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::captures::Captures;
use crate::charclass::CharClass;
use crate::debug::DebugConfig;

mod builder;
mod dot;

pub use builder::FsmBuilder;

/// Identifier of a transition within its owning [`Fsm`].
pub type TransitionId = u32;

/// Errors returned while constructing or mutating a graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A state id that does not exist in the graph was referenced.
    #[error("unknown state: {0}")]
    UnknownState(StateId),

    /// A transition id that does not exist in the graph was referenced.
    #[error("unknown transition: #{0}")]
    UnknownTransition(TransitionId),

    /// The builder was asked to produce a graph without a start state.
    #[error("no start state defined")]
    NoStartState,

    /// The builder was asked to produce a graph with an empty accept set.
    #[error("no accept states defined")]
    NoAcceptStates,

    /// A transition callback was attached before any transition was added.
    #[error("no transition to attach the callback to")]
    HookWithoutTransition,
}

/// Identifier of a state: a numeric id paired with an advisory name.
///
/// Equality, ordering, and hashing consider the numeric id only; the name
/// exists for humans. Id `0` denotes "invalid/unset" and is never assigned
/// to a real state.
#[derive(Debug, Clone, Default)]
pub struct StateId {
    id: u32,
    name: String,
}

impl StateId {
    pub(crate) fn new(id: u32, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }

    /// The numeric id. `0` means invalid.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The advisory name. May be empty.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` unless this is the reserved invalid id.
    pub fn is_valid(&self) -> bool {
        self.id != 0
    }
}

impl PartialEq for StateId {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StateId {}

impl std::hash::Hash for StateId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for StateId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StateId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl Display for StateId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "State_{}", self.id)
        } else {
            f.write_str(&self.name)
        }
    }
}

/// The role of a state within its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// An ordinary state.
    Normal,
    /// The graph's start state.
    Start,
    /// A member of the accept set.
    Accept,
    /// Reserved; never produced by this crate.
    Error,
}

/// Context passed to state entry/exit callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEvent {
    /// The state being entered or left.
    pub state: StateId,
    /// Input position at the time of the event.
    pub position: usize,
    /// The byte being consumed, or `\0` during an epsilon step.
    pub byte: u8,
}

/// Context passed to transition callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    /// Source state of the transition.
    pub from: StateId,
    /// Target state of the transition.
    pub to: StateId,
    /// The byte being consumed, or `\0` during an epsilon step.
    pub byte: u8,
    /// Input position at the time of the event.
    pub position: usize,
    /// The transition taken.
    pub transition: TransitionId,
}

/// Callback fired when a state is entered or left. The callback borrows
/// the run's capture store; any other side state lives in the closure's
/// environment.
pub type StateHook = Box<dyn Fn(&mut Captures, &StateEvent)>;

/// Callback fired when a transition is taken.
pub type TransitionHook = Box<dyn Fn(&mut Captures, &TransitionEvent)>;

/// A state of the graph.
pub struct State {
    id: StateId,
    kind: StateKind,
    description: Option<String>,
    choice_point: bool,
    pub(crate) on_entry: Option<StateHook>,
    pub(crate) on_exit: Option<StateHook>,
}

impl State {
    fn new(id: StateId, description: Option<String>) -> Self {
        Self {
            id,
            kind: StateKind::Normal,
            description,
            choice_point: false,
            on_entry: None,
            on_exit: None,
        }
    }

    /// The state's identifier.
    pub fn id(&self) -> &StateId {
        &self.id
    }

    /// The state's role.
    pub fn kind(&self) -> StateKind {
        self.kind
    }

    /// Optional human-readable description.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns `true` if the backtracking executor must record a choice
    /// point whenever it leaves this state.
    pub fn is_choice_point(&self) -> bool {
        self.choice_point
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("description", &self.description)
            .field("choice_point", &self.choice_point)
            .finish_non_exhaustive()
    }
}

/// The label of a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionKind {
    /// Consumes one byte admitted by the class.
    Class(CharClass),
    /// Consumes no input; followed only during epsilon closure.
    Epsilon,
}

/// A directed edge of the graph.
pub struct Transition {
    id: TransitionId,
    from: StateId,
    to: StateId,
    kind: TransitionKind,
    priority: u8,
    description: String,
    pub(crate) on_step: Option<TransitionHook>,
}

impl Transition {
    /// Lowest priority; tried last.
    pub const PRIORITY_LOWEST: u8 = 0;
    /// Below-normal priority.
    pub const PRIORITY_LOW: u8 = 25;
    /// The default priority.
    pub const PRIORITY_NORMAL: u8 = 50;
    /// Above-normal priority.
    pub const PRIORITY_HIGH: u8 = 75;
    /// Highest priority; tried first.
    pub const PRIORITY_HIGHEST: u8 = 100;

    /// The transition's identifier.
    pub fn id(&self) -> TransitionId {
        self.id
    }

    /// Source state.
    pub fn from(&self) -> &StateId {
        &self.from
    }

    /// Target state.
    pub fn to(&self) -> &StateId {
        &self.to
    }

    /// The edge label.
    pub fn kind(&self) -> &TransitionKind {
        &self.kind
    }

    /// The edge priority. Higher wins in greedy execution and is tried
    /// first under backtracking.
    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Human-readable description; defaults to the class description, or
    /// `Epsilon` for epsilon edges.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns `true` if this is an epsilon edge.
    pub fn is_epsilon(&self) -> bool {
        matches!(self.kind, TransitionKind::Epsilon)
    }

    /// Returns `true` if this is a CLASS edge whose predicate admits
    /// `byte`. Epsilon edges never match input.
    pub fn matches(&self, byte: u8) -> bool {
        match &self.kind {
            TransitionKind::Class(class) => class.contains(byte),
            TransitionKind::Epsilon => false,
        }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("id", &self.id)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("kind", &self.kind)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// A finite-state machine graph.
///
/// The graph is typically assembled through an [`FsmBuilder`], which adds
/// a name-to-id convenience layer and build-time composition on top of the
/// id-based operations here.
pub struct Fsm {
    name: String,
    states: IndexMap<StateId, State>,
    transitions: Vec<Transition>,
    // State id -> indices into `transitions`, priority descending,
    // insertion order on ties.
    outgoing: FxHashMap<u32, Vec<usize>>,
    start: StateId,
    accepts: FxHashSet<StateId>,
    next_state_id: u32,
    next_transition_id: TransitionId,
    debug: DebugConfig,
}

impl Fsm {
    /// Creates an empty graph.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            states: IndexMap::new(),
            transitions: Vec::new(),
            outgoing: FxHashMap::default(),
            start: StateId::default(),
            accepts: FxHashSet::default(),
            next_state_id: 1,
            next_transition_id: 1,
            debug: DebugConfig::default(),
        }
    }

    /// The graph's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a state and returns its fresh identifier.
    pub fn add_state(&mut self, name: impl Into<String>) -> StateId {
        self.add_state_impl(name.into(), None)
    }

    /// Adds a state with a description and returns its fresh identifier.
    pub fn add_state_with_description(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> StateId {
        self.add_state_impl(name.into(), Some(description.into()))
    }

    fn add_state_impl(&mut self, name: String, description: Option<String>) -> StateId {
        let id = StateId::new(self.next_state_id, name);
        self.next_state_id += 1;
        self.states.insert(id.clone(), State::new(id.clone(), description));
        id
    }

    /// Makes `state` the start state, marking its kind accordingly.
    pub fn set_start(&mut self, state: &StateId) -> Result<(), GraphError> {
        let entry = self
            .states
            .get_mut(state)
            .ok_or_else(|| GraphError::UnknownState(state.clone()))?;
        entry.kind = StateKind::Start;
        self.start = entry.id.clone();
        Ok(())
    }

    /// Adds `state` to the accept set.
    pub fn add_accept(&mut self, state: &StateId) -> Result<(), GraphError> {
        let entry = self
            .states
            .get_mut(state)
            .ok_or_else(|| GraphError::UnknownState(state.clone()))?;
        if entry.kind != StateKind::Start {
            entry.kind = StateKind::Accept;
        }
        self.accepts.insert(entry.id.clone());
        Ok(())
    }

    /// Removes `state` from the accept set.
    pub fn remove_accept(&mut self, state: &StateId) {
        self.accepts.remove(state);
    }

    /// Returns `true` if `state` is in the accept set.
    pub fn is_accept(&self, state: &StateId) -> bool {
        self.accepts.contains(state)
    }

    /// The start state id; invalid if unset.
    pub fn start_state(&self) -> &StateId {
        &self.start
    }

    /// The accept set.
    pub fn accept_states(&self) -> impl Iterator<Item = &StateId> {
        self.accepts.iter()
    }

    /// Adds a CLASS transition with the default priority.
    pub fn add_transition(
        &mut self,
        from: &StateId,
        to: &StateId,
        class: CharClass,
    ) -> Result<TransitionId, GraphError> {
        self.add_transition_full(from, to, class, Transition::PRIORITY_NORMAL, None)
    }

    /// Adds a CLASS transition with an explicit priority.
    pub fn add_transition_with_priority(
        &mut self,
        from: &StateId,
        to: &StateId,
        class: CharClass,
        priority: u8,
    ) -> Result<TransitionId, GraphError> {
        self.add_transition_full(from, to, class, priority, None)
    }

    /// Adds a CLASS transition with an explicit priority and description.
    pub fn add_transition_with_description(
        &mut self,
        from: &StateId,
        to: &StateId,
        class: CharClass,
        priority: u8,
        description: impl Into<String>,
    ) -> Result<TransitionId, GraphError> {
        self.add_transition_full(from, to, class, priority, Some(description.into()))
    }

    fn add_transition_full(
        &mut self,
        from: &StateId,
        to: &StateId,
        class: CharClass,
        priority: u8,
        description: Option<String>,
    ) -> Result<TransitionId, GraphError> {
        let (from, to) = self.resolve_endpoints(from, to)?;
        let description = description.unwrap_or_else(|| class.description().to_string());
        let id = self.push_transition(Transition {
            id: 0,
            from,
            to,
            kind: TransitionKind::Class(class),
            priority,
            description,
            on_step: None,
        });
        Ok(id)
    }

    /// Adds an epsilon transition between two existing states.
    pub fn add_epsilon(
        &mut self,
        from: &StateId,
        to: &StateId,
    ) -> Result<TransitionId, GraphError> {
        let (from, to) = self.resolve_endpoints(from, to)?;
        let id = self.push_transition(Transition {
            id: 0,
            from,
            to,
            kind: TransitionKind::Epsilon,
            priority: Transition::PRIORITY_NORMAL,
            description: "Epsilon".to_string(),
            on_step: None,
        });
        Ok(id)
    }

    fn resolve_endpoints(
        &self,
        from: &StateId,
        to: &StateId,
    ) -> Result<(StateId, StateId), GraphError> {
        let from = self
            .states
            .get(from)
            .ok_or_else(|| GraphError::UnknownState(from.clone()))?
            .id
            .clone();
        let to = self
            .states
            .get(to)
            .ok_or_else(|| GraphError::UnknownState(to.clone()))?
            .id
            .clone();
        Ok((from, to))
    }

    fn push_transition(&mut self, mut transition: Transition) -> TransitionId {
        let id = self.next_transition_id;
        self.next_transition_id += 1;
        transition.id = id;
        let from_id = transition.from.id;
        let priority = transition.priority;
        let index = self.transitions.len();
        self.transitions.push(transition);

        let transitions = &self.transitions;
        let list = self.outgoing.entry(from_id).or_default();
        let at = list.partition_point(|&i| transitions[i].priority >= priority);
        list.insert(at, index);
        id
    }

    /// Inlines `inner` into this graph between `from` and `to`.
    ///
    /// The inner start state is mapped onto `from` and every inner accept
    /// state onto `to`; all other inner states become fresh NORMAL states
    /// with a name derived from the inner graph's name. Transitions are
    /// copied with their kind, predicate, priority, and description
    /// preserved. Passing a `priority` other than the default overrides
    /// the priority of the entry edges (the translated transitions
    /// leaving `from`), which is where the inlined graph competes with
    /// this graph's own edges.
    ///
    /// Returns the ids of the transitions created. The accept set of this
    /// graph is left untouched.
    pub fn merge_embedded(
        &mut self,
        from: &StateId,
        to: &StateId,
        inner: &Fsm,
        priority: u8,
    ) -> Result<Vec<TransitionId>, GraphError> {
        if !self.has_state(from) {
            return Err(GraphError::UnknownState(from.clone()));
        }
        if !self.has_state(to) {
            return Err(GraphError::UnknownState(to.clone()));
        }

        let mut mapping: FxHashMap<u32, StateId> = FxHashMap::default();
        mapping.insert(inner.start.id, from.clone());
        for accept in &inner.accepts {
            mapping.insert(accept.id, to.clone());
        }

        for state in inner.states.values() {
            if mapping.contains_key(&state.id.id) {
                continue;
            }
            let derived = format!("{}_from_{}", state.id, inner.name);
            let mapped = match state.description.clone() {
                Some(description) => self.add_state_with_description(derived, description),
                None => self.add_state(derived),
            };
            mapping.insert(state.id.id, mapped);
        }

        let mut created = Vec::with_capacity(inner.transitions.len());
        for transition in &inner.transitions {
            let mapped_from = mapping[&transition.from.id].clone();
            let mapped_to = mapping[&transition.to.id].clone();
            let mapped_priority = if priority != Transition::PRIORITY_NORMAL
                && transition.from.id == inner.start.id
            {
                priority
            } else {
                transition.priority
            };
            let id = match &transition.kind {
                TransitionKind::Class(class) => self.add_transition_with_description(
                    &mapped_from,
                    &mapped_to,
                    class.clone(),
                    mapped_priority,
                    transition.description.clone(),
                )?,
                TransitionKind::Epsilon => self.add_epsilon(&mapped_from, &mapped_to)?,
            };
            created.push(id);
        }
        Ok(created)
    }

    /// Attaches an entry callback to a state.
    pub fn on_entry(
        &mut self,
        state: &StateId,
        hook: impl Fn(&mut Captures, &StateEvent) + 'static,
    ) -> Result<(), GraphError> {
        let entry = self
            .states
            .get_mut(state)
            .ok_or_else(|| GraphError::UnknownState(state.clone()))?;
        entry.on_entry = Some(Box::new(hook));
        Ok(())
    }

    /// Attaches an exit callback to a state.
    pub fn on_exit(
        &mut self,
        state: &StateId,
        hook: impl Fn(&mut Captures, &StateEvent) + 'static,
    ) -> Result<(), GraphError> {
        let entry = self
            .states
            .get_mut(state)
            .ok_or_else(|| GraphError::UnknownState(state.clone()))?;
        entry.on_exit = Some(Box::new(hook));
        Ok(())
    }

    /// Attaches a callback to a transition.
    pub fn on_transition(
        &mut self,
        transition: TransitionId,
        hook: impl Fn(&mut Captures, &TransitionEvent) + 'static,
    ) -> Result<(), GraphError> {
        let entry = self
            .transitions
            .iter_mut()
            .find(|t| t.id == transition)
            .ok_or(GraphError::UnknownTransition(transition))?;
        entry.on_step = Some(Box::new(hook));
        Ok(())
    }

    /// Marks a state so the backtracking executor records a choice point
    /// whenever it leaves it.
    pub fn mark_choice_point(&mut self, state: &StateId) -> Result<(), GraphError> {
        let entry = self
            .states
            .get_mut(state)
            .ok_or_else(|| GraphError::UnknownState(state.clone()))?;
        entry.choice_point = true;
        Ok(())
    }

    /// Returns `true` if `state` is marked as a choice point.
    pub fn is_choice_point(&self, state: &StateId) -> bool {
        self.states.get(state).map(|s| s.choice_point).unwrap_or(false)
    }

    /// Number of states in the graph.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Number of transitions in the graph.
    pub fn transition_count(&self) -> usize {
        self.transitions.len()
    }

    /// All state ids, in insertion order.
    pub fn state_ids(&self) -> Vec<StateId> {
        self.states.keys().cloned().collect()
    }

    /// All states, in insertion order.
    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.states.values()
    }

    /// All transitions, in insertion order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Looks up a state.
    pub fn state(&self, id: &StateId) -> Option<&State> {
        self.states.get(id)
    }

    /// Returns `true` if the state exists.
    pub fn has_state(&self, id: &StateId) -> bool {
        self.states.contains_key(id)
    }

    /// The outgoing transitions of a state, priority-sorted (descending;
    /// insertion order on ties).
    pub fn transitions_from(&self, state: &StateId) -> Vec<&Transition> {
        self.outgoing(state).iter().map(|&i| &self.transitions[i]).collect()
    }

    /// Indices into [`Fsm::transitions`] of the outgoing edges of `state`,
    /// priority-sorted.
    pub(crate) fn outgoing(&self, state: &StateId) -> &[usize] {
        self.outgoing.get(&state.id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn transition_at(&self, index: usize) -> &Transition {
        &self.transitions[index]
    }

    /// The default debug configuration inherited by new validators.
    pub fn debug_config(&self) -> &DebugConfig {
        &self.debug
    }

    /// Sets the default debug configuration.
    pub fn set_debug_config(&mut self, config: DebugConfig) {
        self.debug = config;
    }

    /// Returns `true` if [`Fsm::validate_structure`] reports no issues.
    pub fn is_valid(&self) -> bool {
        self.validate_structure().is_empty()
    }

    /// Checks the graph for structural problems and returns a
    /// human-readable description of each one found.
    ///
    /// Reported issues: a missing or unknown start state, an empty accept
    /// set, accept states or transition endpoints that do not exist,
    /// states unreachable from the start state, and pairs of same-priority
    /// CLASS edges from one state whose predicates overlap (which the
    /// greedy executor resolves by insertion order, and the backtracking
    /// executor by search).
    pub fn validate_structure(&self) -> Vec<String> {
        let mut issues = Vec::new();

        let start_ok = self.start.is_valid() && self.has_state(&self.start);
        if !start_ok {
            issues.push("no valid start state defined".to_string());
        }

        if self.accepts.is_empty() {
            issues.push("no accept states defined".to_string());
        }

        for accept in self.accepts.iter().sorted() {
            if !self.has_state(accept) {
                issues.push(format!("accept state does not exist: {accept}"));
            }
        }

        for transition in &self.transitions {
            if !self.has_state(&transition.from) {
                issues.push(format!(
                    "transition #{} leaves non-existent state: {}",
                    transition.id, transition.from
                ));
            }
            if !self.has_state(&transition.to) {
                issues.push(format!(
                    "transition #{} enters non-existent state: {}",
                    transition.id, transition.to
                ));
            }
        }

        if start_ok {
            let unreachable = self.unreachable_states();
            if !unreachable.is_empty() {
                issues.push(format!(
                    "state(s) unreachable from start: {}",
                    unreachable.iter().join(", ")
                ));
            }
        }

        issues.extend(self.ambiguous_transitions());
        issues
    }

    // States with no path from the start state.
    fn unreachable_states(&self) -> Vec<StateId> {
        let mut visited: FxHashSet<u32> = FxHashSet::default();
        let mut pending = vec![self.start.id];
        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            for transition in &self.transitions {
                if transition.from.id == id && !visited.contains(&transition.to.id) {
                    pending.push(transition.to.id);
                }
            }
        }
        self.states
            .keys()
            .filter(|id| !visited.contains(&id.id))
            .cloned()
            .sorted()
            .collect()
    }

    // Same-priority CLASS edges from one state with overlapping predicates.
    fn ambiguous_transitions(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for indices in self.outgoing.values() {
            for (pos, &a) in indices.iter().enumerate() {
                for &b in &indices[pos + 1..] {
                    let (ta, tb) = (&self.transitions[a], &self.transitions[b]);
                    if ta.priority != tb.priority {
                        continue;
                    }
                    if let (TransitionKind::Class(ca), TransitionKind::Class(cb)) =
                        (&ta.kind, &tb.kind)
                    {
                        if !ca.intersect(cb).is_empty() {
                            issues.push(format!(
                                "ambiguous transitions #{} and #{} from state {}",
                                ta.id, tb.id, ta.from
                            ));
                        }
                    }
                }
            }
        }
        issues
    }
}

impl fmt::Debug for Fsm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fsm")
            .field("name", &self.name)
            .field("states", &self.states.len())
            .field("transitions", &self.transitions.len())
            .field("start", &self.start)
            .field("accepts", &self.accepts.len())
            .finish()
    }
}

impl Display for Fsm {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fsm{{name={}, states={}, transitions={}, start={}, accepts={}}}",
            self.name,
            self.states.len(),
            self.transitions.len(),
            self.start,
            self.accepts.len()
        )
    }
}
