use bitvec::prelude::BitVec;
use petgraph::dot::Dot;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::prelude::StableGraph;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// The character which stands for epsilon unless the caller picks another one.
pub const EPSILON_MARKER: char = 'ε';

/// Label of an automaton edge.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
pub enum Symbol {
    Epsilon,
    Char(char),
}

impl Symbol {
    /// Text of the edge label, with `Epsilon` written as `epsilon`.
    pub fn label(self, epsilon: char) -> String {
        match self {
            Symbol::Epsilon => epsilon.to_string(),
            Symbol::Char(ch) => ch.to_string(),
        }
    }
}

/// Flat, serializable description of an automaton. States, alphabet and accept states are
/// sorted, transitions are ordered by source, then symbol (epsilon first), then destination.
/// Epsilon edges are labelled with `epsilon`, which never occurs in `alphabet`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatonView {
    pub states: Vec<usize>,
    pub alphabet: Vec<char>,
    pub epsilon: char,
    pub start: usize,
    pub accept_states: Vec<usize>,
    pub transitions: Vec<(usize, String, usize)>,
}

impl AutomatonView {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Render the automaton in Graphviz DOT format. Parallel edges between the same pair of
    /// states are folded into a single edge with a comma separated label.
    pub fn to_dot(&self) -> String {
        let mut stable_graph: StableGraph<String, String> = StableGraph::new();

        let mut edge_map: HashMap<(NodeIndex, NodeIndex), EdgeIndex> = HashMap::new();

        for &state_idx in &self.states {
            let mut node_label = format!("State {}", state_idx);
            if state_idx == self.start {
                node_label = format!("Start\n{}", node_label);
            }
            if self.accept_states.contains(&state_idx) {
                node_label = format!("Accept\n{}", node_label);
            }
            stable_graph.add_node(node_label);
        }

        for (source, edge_label, target) in &self.transitions {
            let key = (NodeIndex::new(*source), NodeIndex::new(*target));

            match edge_map.get(&key) {
                Some(&edge_idx) => {
                    let old_label = &stable_graph[edge_idx];
                    stable_graph[edge_idx] = format!("{}, {}", old_label, edge_label);
                }
                None => {
                    let edge_idx = stable_graph.add_edge(key.0, key.1, edge_label.clone());
                    edge_map.insert(key, edge_idx);
                }
            }
        }

        Dot::new(&stable_graph).to_string()
    }
}

pub trait FA {
    fn get_num_states(&self) -> usize;
    fn get_start_state(&self) -> usize;
    fn get_alphabet(&self) -> &BTreeSet<char>;
    fn get_acceptor_states(&self) -> &BitVec<u8>;
    /// Outgoing edges of a state, ordered by symbol and then target.
    fn get_state_transitions(&self, state_id: usize) -> Vec<(Symbol, usize)>;

    /// The character epsilon edges are printed with.
    fn get_epsilon(&self) -> char {
        EPSILON_MARKER
    }

    fn to_view(&self) -> AutomatonView {
        let num_states = self.get_num_states();
        let epsilon = self.get_epsilon();
        let mut transitions = Vec::new();

        for state_id in 0..num_states {
            for (symbol, target) in self.get_state_transitions(state_id) {
                transitions.push((state_id, symbol.label(epsilon), target));
            }
        }

        AutomatonView {
            states: (0..num_states).collect(),
            alphabet: self.get_alphabet().iter().copied().collect(),
            epsilon,
            start: self.get_start_state(),
            accept_states: self.get_acceptor_states().iter_ones().collect(),
            transitions,
        }
    }

    fn to_json(&self) -> serde_json::Result<String> {
        self.to_view().to_json()
    }

    fn to_dot(&self) -> String {
        self.to_view().to_dot()
    }
}
