/*! Graphviz DOT rendering of a graph.

States are drawn as circles, with the start and accept states as filled
double circles (light blue and light green respectively). Transition
labels show the edge's description, `ε` for epsilon edges, and the
priority when it differs from the default.
*/

use std::fmt::Write;
use std::io;
use std::path::Path;

use log::debug;

use crate::graph::{Fsm, Transition, TransitionKind};

impl Fsm {
    /// Renders the graph in Graphviz DOT form.
    pub fn to_dot(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph FSM_{} {{", self.name());
        out.push_str("    rankdir=LR;\n");
        out.push_str("    node [shape=circle];\n\n");

        for state in self.states() {
            let id = state.id();
            let is_start = id == self.start_state();
            let is_accept = self.is_accept(id);
            let _ = write!(out, "    {} [", id.id());
            if is_start || is_accept {
                out.push_str("shape=doublecircle, ");
            }
            if is_start {
                out.push_str("style=filled, fillcolor=lightblue, ");
            } else if is_accept {
                out.push_str("style=filled, fillcolor=lightgreen, ");
            }
            let _ = write!(out, "label=\"{id}");
            if let Some(description) = state.description() {
                let _ = write!(out, "\\n{description}");
            }
            out.push_str("\"];\n");
        }

        out.push('\n');

        for transition in self.transitions() {
            let _ = write!(
                out,
                "    {} -> {} [label=\"{}",
                transition.from().id(),
                transition.to().id(),
                edge_label(transition),
            );
            if transition.priority() != Transition::PRIORITY_NORMAL {
                let _ = write!(out, "\\n[pri:{}]", transition.priority());
            }
            out.push_str("\"];\n");
        }

        out.push_str("}\n");
        out
    }

    /// Writes the DOT rendering to a file.
    pub fn export_dot(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_dot())?;
        debug!("[{}] exported DOT graph to {}", self.name(), path.display());
        Ok(())
    }
}

fn edge_label(transition: &Transition) -> String {
    match transition.kind() {
        TransitionKind::Class(_) => transition.description().to_string(),
        TransitionKind::Epsilon => "ε".to_string(),
    }
}
