/* Replay input strings against a finished automaton. A DFA is walked one state at a time and
 * can record every step it takes; an NFA is walked over sets of states. */

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use crate::dfa::{delta, epsilon_closure, DFA};
use crate::fa::FA;
use crate::nfa::NFA;

/// One entry of a simulation trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceStep {
    /// The automaton starts out in `state`.
    Start { state: usize },
    /// `symbol` was consumed in `from`. `to` is `None` when the input was rejected there.
    Step {
        from: usize,
        symbol: char,
        to: Option<usize>,
    },
}

impl fmt::Display for TraceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceStep::Start { state } => write!(f, "start -> state {}", state),
            TraceStep::Step {
                from,
                symbol,
                to: Some(to),
            } => write!(f, "({}) -{}-> ({})", from, symbol, to),
            TraceStep::Step {
                from,
                symbol,
                to: None,
            } => write!(f, "({}) -{}-> (none)", from, symbol),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Simulation {
    pub accepted: bool,
    pub trace: Vec<TraceStep>,
}

/// Run `input` through the DFA. A symbol outside the alphabet or without a transition
/// rejects the string immediately.
pub fn run(dfa: &DFA, input: &str) -> bool {
    let mut current = dfa.get_start_state();

    for ch in input.chars() {
        if !dfa.get_alphabet().contains(&ch) {
            return false;
        }
        match dfa.next_state(current, ch) {
            Some(next) => current = next,
            None => return false,
        }
    }
    dfa.is_accepting(current)
}

/// Same as [`run`], recording the start state and every symbol consumed. The trace ends with
/// the rejecting step when the input is rejected early.
pub fn run_with_trace(dfa: &DFA, input: &str) -> Simulation {
    let mut current = dfa.get_start_state();
    let mut trace = vec![TraceStep::Start { state: current }];

    for ch in input.chars() {
        let next = if dfa.get_alphabet().contains(&ch) {
            dfa.next_state(current, ch)
        } else {
            None
        };

        trace.push(TraceStep::Step {
            from: current,
            symbol: ch,
            to: next,
        });

        match next {
            Some(next) => current = next,
            None => {
                trace!(input, state = current, symbol = %ch, "rejected");
                return Simulation {
                    accepted: false,
                    trace,
                };
            }
        }
    }

    Simulation {
        accepted: dfa.is_accepting(current),
        trace,
    }
}

/// Run `input` through the NFA by tracking the set of states it could be in.
pub fn run_nfa(nfa: &NFA, input: &str) -> bool {
    let mut start = BitVec::repeat(false, nfa.get_num_states());
    start.set(nfa.get_start_state(), true);

    let mut current = epsilon_closure(nfa, start);

    for ch in input.chars() {
        if !nfa.get_alphabet().contains(&ch) {
            return false;
        }
        let moved = delta(nfa, &current, ch);
        if moved.not_any() {
            return false;
        }
        current = epsilon_closure(nfa, moved);
    }
    current[nfa.get_accept_state()]
}
