//! # regex2dfa
//!
//! Compiles a regular expression into a minimal deterministic finite automaton, following the
//! classic pipeline from "Engineering a Compiler 2e" by Keith Cooper and Linda Torczon.
//!
//! This library provides functionality to:
//! - Convert infix regular expressions into postfix with the shunting-yard algorithm
//! - Convert postfix expressions to NFAs using Thompson Construction
//! - Convert NFAs to DFAs using Subset Construction
//! - Minimize DFAs using Hopcroft's Algorithm
//! - Simulate strings against the automata, with a step by step trace
//! - Export the automata as JSON or Graphviz DOT
//!
//! The supported syntax is deliberately small: literal symbols, an epsilon marker (`ε` by
//! default), union written as `|` or `+`, concatenation (implicit or `.`), the Kleene star
//! and parentheses.

// Re-export the modules
pub mod batch;
pub mod dfa;
pub mod fa;
pub mod nfa;
pub mod regex;
pub mod simulator;

// Re-export commonly used functions for convenience
pub use batch::{process_batch, Pipeline};
pub use dfa::{construct_dfa, construct_minimal_dfa};
pub use fa::{AutomatonView, Symbol, EPSILON_MARKER, FA};
pub use nfa::{build_from_regex, construct_nfa};
pub use regex::{parse, to_postfix};
pub use simulator::{run, run_nfa, run_with_trace};
