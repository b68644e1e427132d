/*! Fluent construction of [`Fsm`] graphs.

The builder adds a name-to-identifier convenience layer on top of the
id-based graph operations: states are referred to by name and created on
first use. Embedded graphs are registered as intents and inlined when
[`FsmBuilder::build`] runs, so a constructed graph only ever contains
CLASS and epsilon transitions.
*/

use rustc_hash::FxHashMap;

use crate::captures::Captures;
use crate::charclass::CharClass;
use crate::debug::{DebugConfig, DebugFlags};
use crate::graph::{
    Fsm, GraphError, StateEvent, StateId, Transition, TransitionEvent, TransitionId,
};

struct PendingEmbed {
    from: StateId,
    to: StateId,
    inner: Fsm,
    priority: u8,
}

/// Builds an [`Fsm`] from named states.
///
/// ```
/// use abnf_fsm::{CharClass, FsmBuilder};
///
/// let fsm = FsmBuilder::new("number")
///     .transition("START", "DIGITS", CharClass::digit())
///     .transition("DIGITS", "DIGITS", CharClass::digit())
///     .start("START")
///     .accept("DIGITS")
///     .build()
///     .unwrap();
///
/// assert!(fsm.is_valid());
/// ```
pub struct FsmBuilder {
    fsm: Fsm,
    names: FxHashMap<String, StateId>,
    start: Option<StateId>,
    accepts: Vec<StateId>,
    embeds: Vec<PendingEmbed>,
    last_transition: Option<TransitionId>,
    deferred_error: Option<GraphError>,
}

impl FsmBuilder {
    /// Creates a builder for a graph with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            fsm: Fsm::new(name),
            names: FxHashMap::default(),
            start: None,
            accepts: Vec::new(),
            embeds: Vec::new(),
            last_transition: None,
            deferred_error: None,
        }
    }

    fn resolve(&mut self, name: &str) -> StateId {
        if let Some(id) = self.names.get(name) {
            return id.clone();
        }
        let id = self.fsm.add_state(name);
        self.names.insert(name.to_string(), id.clone());
        id
    }

    /// Declares a state. States named by other builder calls are created
    /// implicitly; an explicit declaration is only needed to control
    /// insertion order or to attach a description.
    pub fn state(mut self, name: &str) -> Self {
        self.resolve(name);
        self
    }

    /// Declares a state with a description.
    pub fn state_with_description(mut self, name: &str, description: &str) -> Self {
        if self.names.contains_key(name) {
            return self;
        }
        let id = self.fsm.add_state_with_description(name, description);
        self.names.insert(name.to_string(), id);
        self
    }

    /// Selects the start state.
    pub fn start(mut self, name: &str) -> Self {
        let id = self.resolve(name);
        self.start = Some(id);
        self
    }

    /// Adds a state to the accept set.
    pub fn accept(mut self, name: &str) -> Self {
        let id = self.resolve(name);
        self.accepts.push(id);
        self
    }

    /// Adds a CLASS transition with the default priority.
    pub fn transition(self, from: &str, to: &str, class: CharClass) -> Self {
        self.transition_with_priority(from, to, class, Transition::PRIORITY_NORMAL)
    }

    /// Adds a CLASS transition with an explicit priority.
    pub fn transition_with_priority(
        mut self,
        from: &str,
        to: &str,
        class: CharClass,
        priority: u8,
    ) -> Self {
        let from = self.resolve(from);
        let to = self.resolve(to);
        match self.fsm.add_transition_with_priority(&from, &to, class, priority) {
            Ok(id) => self.last_transition = Some(id),
            Err(e) => self.defer(e),
        }
        self
    }

    /// Adds a CLASS transition with a custom description.
    pub fn transition_with_description(
        mut self,
        from: &str,
        to: &str,
        class: CharClass,
        description: &str,
    ) -> Self {
        let from = self.resolve(from);
        let to = self.resolve(to);
        match self.fsm.add_transition_with_description(
            &from,
            &to,
            class,
            Transition::PRIORITY_NORMAL,
            description,
        ) {
            Ok(id) => self.last_transition = Some(id),
            Err(e) => self.defer(e),
        }
        self
    }

    /// Adds an epsilon transition.
    pub fn epsilon(mut self, from: &str, to: &str) -> Self {
        let from = self.resolve(from);
        let to = self.resolve(to);
        match self.fsm.add_epsilon(&from, &to) {
            Ok(id) => self.last_transition = Some(id),
            Err(e) => self.defer(e),
        }
        self
    }

    /// Registers an embedded graph to be inlined between two states when
    /// the builder runs. The inner graph is consumed; after composition it
    /// has no separate identity.
    pub fn embed(self, from: &str, to: &str, inner: Fsm) -> Self {
        self.embed_with_priority(from, to, inner, Transition::PRIORITY_NORMAL)
    }

    /// Like [`FsmBuilder::embed`], with an explicit priority for the
    /// inlined graph's entry edges.
    pub fn embed_with_priority(
        mut self,
        from: &str,
        to: &str,
        inner: Fsm,
        priority: u8,
    ) -> Self {
        let from = self.resolve(from);
        let to = self.resolve(to);
        self.embeds.push(PendingEmbed { from, to, inner, priority });
        self
    }

    /// Attaches an entry callback to a state.
    pub fn on_entry(
        mut self,
        name: &str,
        hook: impl Fn(&mut Captures, &StateEvent) + 'static,
    ) -> Self {
        let id = self.resolve(name);
        if let Err(e) = self.fsm.on_entry(&id, hook) {
            self.defer(e);
        }
        self
    }

    /// Attaches an exit callback to a state.
    pub fn on_exit(
        mut self,
        name: &str,
        hook: impl Fn(&mut Captures, &StateEvent) + 'static,
    ) -> Self {
        let id = self.resolve(name);
        if let Err(e) = self.fsm.on_exit(&id, hook) {
            self.defer(e);
        }
        self
    }

    /// Attaches a callback to the most recently added transition.
    pub fn on_transition(
        mut self,
        hook: impl Fn(&mut Captures, &TransitionEvent) + 'static,
    ) -> Self {
        match self.last_transition {
            Some(id) => {
                if let Err(e) = self.fsm.on_transition(id, hook) {
                    self.defer(e);
                }
            }
            None => self.defer(GraphError::HookWithoutTransition),
        }
        self
    }

    /// Marks a state as an explicit backtracking choice point.
    pub fn mark_choice_point(mut self, name: &str) -> Self {
        let id = self.resolve(name);
        if let Err(e) = self.fsm.mark_choice_point(&id) {
            self.defer(e);
        }
        self
    }

    /// Sets the graph's default debug flags.
    pub fn debug_flags(mut self, flags: DebugFlags) -> Self {
        self.fsm.set_debug_config(DebugConfig::new(flags));
        self
    }

    fn defer(&mut self, error: GraphError) {
        if self.deferred_error.is_none() {
            self.deferred_error = Some(error);
        }
    }

    /// Finishes the graph.
    ///
    /// Fails if no start state was selected, the accept set is empty, or
    /// any earlier builder call failed.
    pub fn build(mut self) -> Result<Fsm, GraphError> {
        if let Some(error) = self.deferred_error {
            return Err(error);
        }
        let start = self.start.ok_or(GraphError::NoStartState)?;
        if self.accepts.is_empty() {
            return Err(GraphError::NoAcceptStates);
        }
        self.fsm.set_start(&start)?;
        for accept in &self.accepts {
            self.fsm.add_accept(accept)?;
        }
        for embed in self.embeds {
            self.fsm.merge_embedded(&embed.from, &embed.to, &embed.inner, embed.priority)?;
        }
        Ok(self.fsm)
    }
}
