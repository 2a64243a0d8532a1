/* Thompson construction. The postfix expression is evaluated with a stack of NFA fragments;
 * each fragment has exactly one entry and one exit state, so every operator can wire its
 * operands together with a constant number of new states and epsilon edges. */

use bitvec::prelude::*;
use color_eyre::eyre::{Report, Result};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, trace};

use crate::fa::{Symbol, FA};
use crate::regex::{parse, Postfix, Token};

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct NFAState {
    transitions: BTreeMap<Symbol, BTreeSet<usize>>,
}

/// Nondeterministic automaton with a single start and a single accept state.
#[derive(Debug, Clone)]
pub struct NFA {
    states: Vec<NFAState>,
    start_state: usize,
    accept_state: usize,
    accept_states: BitVec<u8>,
    alphabet: BTreeSet<char>,
    epsilon: char,
    regex: String,
}

#[derive(Debug)]
pub enum NFAError {
    InvalidExpression(String),
}

impl std::fmt::Display for NFAError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NFAError::InvalidExpression(postfix) => {
                write!(f, "Error: Invalid postfix expression provided: {}", postfix)
            }
        }
    }
}

impl std::error::Error for NFAError {}

/// Hands out state ids for a single build.
#[derive(Debug, Default)]
struct StateAllocator {
    next_id: usize,
}

impl StateAllocator {
    fn add_state(&mut self) -> usize {
        let state_id = self.next_id;
        self.next_id += 1;
        state_id
    }

    fn get_num_states(&self) -> usize {
        self.next_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transition {
    from: usize,
    symbol: Symbol,
    to: usize,
}

/// A partially built NFA. It owns its edges; composing fragments moves the operand edges
/// into the result.
#[derive(Debug)]
struct Fragment {
    start: usize,
    accept: usize,
    edges: Vec<Transition>,
}

impl Fragment {
    fn literal_construction(allocator: &mut StateAllocator, symbol: Symbol) -> Self {
        let start = allocator.add_state();
        let accept = allocator.add_state();
        Fragment {
            start,
            accept,
            edges: vec![Transition {
                from: start,
                symbol,
                to: accept,
            }],
        }
    }

    fn closure(mut self, allocator: &mut StateAllocator) -> Self {
        let start = allocator.add_state();
        let accept = allocator.add_state();

        self.add_epsilon(start, self.start);
        self.add_epsilon(start, accept); // bypass for zero repetitions
        self.add_epsilon(self.accept, self.start); // loop back for one more
        self.add_epsilon(self.accept, accept);

        Fragment {
            start,
            accept,
            edges: self.edges,
        }
    }

    fn concatenate(mut self, mut next: Fragment) -> Self {
        self.edges.append(&mut next.edges);
        self.add_epsilon(self.accept, next.start);

        Fragment {
            start: self.start,
            accept: next.accept,
            edges: self.edges,
        }
    }

    fn alternation(mut self, mut other: Fragment, allocator: &mut StateAllocator) -> Self {
        let start = allocator.add_state();
        let accept = allocator.add_state();

        self.edges.append(&mut other.edges);
        self.add_epsilon(start, self.start);
        self.add_epsilon(start, other.start);
        self.add_epsilon(self.accept, accept);
        self.add_epsilon(other.accept, accept);

        Fragment {
            start,
            accept,
            edges: self.edges,
        }
    }

    fn add_epsilon(&mut self, from: usize, to: usize) {
        self.edges.push(Transition {
            from,
            symbol: Symbol::Epsilon,
            to,
        });
    }
}

impl FA for NFA {
    fn get_num_states(&self) -> usize {
        self.states.len()
    }

    fn get_start_state(&self) -> usize {
        self.start_state
    }

    fn get_alphabet(&self) -> &BTreeSet<char> {
        &self.alphabet
    }

    fn get_acceptor_states(&self) -> &BitVec<u8> {
        &self.accept_states
    }

    fn get_epsilon(&self) -> char {
        self.epsilon
    }

    fn get_state_transitions(&self, state_id: usize) -> Vec<(Symbol, usize)> {
        let mut transition_list = Vec::new();
        if let Some(state) = self.states.get(state_id) {
            for (symbol, targets) in &state.transitions {
                for target in targets {
                    transition_list.push((*symbol, *target));
                }
            }
        }
        transition_list
    }
}

impl NFAState {
    fn add_transition(&mut self, symbol: Symbol, to: usize) {
        self.transitions.entry(symbol).or_default().insert(to);
    }

    pub fn get_transitions(&self) -> &BTreeMap<Symbol, BTreeSet<usize>> {
        &self.transitions
    }
}

impl NFA {
    fn from_fragment(fragment: Fragment, num_states: usize, postfix: &Postfix) -> Self {
        let mut states: Vec<NFAState> = vec![NFAState::default(); num_states];
        let mut alphabet = BTreeSet::new();

        for Transition { from, symbol, to } in fragment.edges {
            if let Symbol::Char(ch) = symbol {
                alphabet.insert(ch);
            }
            states[from].add_transition(symbol, to);
        }

        let mut accept_states = BitVec::repeat(false, num_states);
        accept_states.set(fragment.accept, true);

        NFA {
            states,
            start_state: fragment.start,
            accept_state: fragment.accept,
            accept_states,
            alphabet,
            epsilon: postfix.get_epsilon(),
            regex: postfix.to_string(),
        }
    }

    pub fn get_state(&self, id: usize) -> Option<&NFAState> {
        self.states.get(id)
    }

    pub fn get_accept_state(&self) -> usize {
        self.accept_state
    }

    /// The expression this NFA was built from.
    pub fn get_regex(&self) -> &String {
        &self.regex
    }

    pub fn get_num_transitions(&self) -> usize {
        self.states
            .iter()
            .map(|state| state.transitions.values().map(BTreeSet::len).sum::<usize>())
            .sum()
    }

    pub(crate) fn set_regex(&mut self, regex: String) {
        self.regex = regex;
    }
}

fn pop_operand(stack: &mut Vec<Fragment>, postfix: &Postfix) -> Result<Fragment> {
    match stack.pop() {
        Some(fragment) => Ok(fragment),
        None => {
            let err = Report::new(NFAError::InvalidExpression(postfix.to_string()));
            Err(err)
        }
    }
}

/// Build an NFA from a postfix expression with Thompson's construction. Fails when an
/// operator is missing operands or when the expression does not reduce to exactly one
/// automaton.
pub fn construct_nfa(postfix: &Postfix) -> Result<NFA> {
    let mut allocator = StateAllocator::default();
    let mut stack: Vec<Fragment> = Vec::new();

    for token in postfix.tokens() {
        let fragment = match *token {
            Token::Literal(ch) => Fragment::literal_construction(&mut allocator, Symbol::Char(ch)),
            Token::Epsilon => Fragment::literal_construction(&mut allocator, Symbol::Epsilon),
            Token::Star => {
                let operand = pop_operand(&mut stack, postfix)?;
                operand.closure(&mut allocator)
            }
            Token::Concat => {
                let right = pop_operand(&mut stack, postfix)?;
                let left = pop_operand(&mut stack, postfix)?;
                left.concatenate(right)
            }
            Token::Union(_) => {
                let right = pop_operand(&mut stack, postfix)?;
                let left = pop_operand(&mut stack, postfix)?;
                left.alternation(right, &mut allocator)
            }
            Token::LParen | Token::RParen => {
                let err = Report::new(NFAError::InvalidExpression(postfix.to_string()));
                return Err(err);
            }
        };
        trace!(
            ?token,
            start = fragment.start,
            accept = fragment.accept,
            "pushed fragment"
        );
        stack.push(fragment);
    }

    let fragment = match (stack.pop(), stack.is_empty()) {
        (Some(fragment), true) => fragment,
        _ => {
            let err = Report::new(NFAError::InvalidExpression(postfix.to_string()));
            return Err(err);
        }
    };

    let nfa = NFA::from_fragment(fragment, allocator.get_num_states(), postfix);
    debug!(
        states = nfa.get_num_states(),
        transitions = nfa.get_num_transitions(),
        "constructed NFA"
    );
    Ok(nfa)
}

/// Parse an infix expression and build its NFA.
pub fn build_from_regex(regex: &str, epsilon: char) -> Result<NFA> {
    let postfix = parse(regex, epsilon)?;
    let mut nfa = construct_nfa(&postfix)?;
    nfa.set_regex(regex.to_string());
    Ok(nfa)
}

#[cfg(test)]
mod nfa_tests {
    use super::*;
    use crate::fa::EPSILON_MARKER;
    use crate::regex::to_postfix;

    fn nfa_of(regex: &str) -> NFA {
        build_from_regex(regex, EPSILON_MARKER).unwrap()
    }

    fn targets(nfa: &NFA, state: usize, symbol: Symbol) -> Vec<usize> {
        nfa.get_state(state)
            .unwrap()
            .get_transitions()
            .get(&symbol)
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default()
    }

    fn assert_invalid(postfix: Postfix) {
        let result = construct_nfa(&postfix);
        assert!(result.is_err(), "Expected Error got {:?}", result);
        match result.unwrap_err().downcast_ref::<NFAError>().unwrap() {
            NFAError::InvalidExpression(source) => assert_eq!(*source, postfix.to_string()),
        }
    }

    #[test]
    fn test_state_allocator() {
        let mut allocator = StateAllocator::default();
        assert_eq!(allocator.add_state(), 0);
        assert_eq!(allocator.add_state(), 1);
        assert_eq!(allocator.get_num_states(), 2);
    }

    #[test]
    fn test_literal_construction() {
        let nfa = nfa_of("a");

        assert_eq!(nfa.get_num_states(), 2);
        assert_eq!(nfa.get_start_state(), 0);
        assert_eq!(nfa.get_accept_state(), 1);
        assert_eq!(targets(&nfa, 0, Symbol::Char('a')), vec![1]);
        assert!(nfa.get_alphabet().contains(&'a'));
        assert_eq!(nfa.get_regex(), "a");
    }

    #[test]
    fn test_epsilon_literal() {
        let nfa = nfa_of("ε");

        assert_eq!(nfa.get_num_states(), 2);
        assert_eq!(targets(&nfa, 0, Symbol::Epsilon), vec![1]);
        assert!(nfa.get_alphabet().is_empty());
    }

    #[test]
    fn test_closure() {
        let nfa = nfa_of("a*");

        // Literal takes 0 and 1, the star adds 2 and 3
        assert_eq!(nfa.get_num_states(), 4);
        assert_eq!(nfa.get_start_state(), 2);
        assert_eq!(nfa.get_accept_state(), 3);
        assert_eq!(targets(&nfa, 2, Symbol::Epsilon), vec![0, 3]);
        assert_eq!(targets(&nfa, 1, Symbol::Epsilon), vec![0, 3]);
        assert_eq!(nfa.get_num_transitions(), 5);
    }

    #[test]
    fn test_concatenate() {
        let nfa = nfa_of("ab");

        assert_eq!(nfa.get_num_states(), 4);
        assert_eq!(nfa.get_start_state(), 0);
        assert_eq!(nfa.get_accept_state(), 3);
        assert_eq!(targets(&nfa, 1, Symbol::Epsilon), vec![2]);
        assert_eq!(nfa.get_num_transitions(), 3);
    }

    #[test]
    fn test_alternation() {
        let nfa = nfa_of("a|b");

        assert_eq!(nfa.get_num_states(), 6);
        assert_eq!(nfa.get_start_state(), 4);
        assert_eq!(nfa.get_accept_state(), 5);
        assert_eq!(targets(&nfa, 4, Symbol::Epsilon), vec![0, 2]);
        assert_eq!(targets(&nfa, 1, Symbol::Epsilon), vec![5]);
        assert_eq!(targets(&nfa, 3, Symbol::Epsilon), vec![5]);

        let alphabet: Vec<char> = nfa.get_alphabet().iter().copied().collect();
        assert_eq!(alphabet, vec!['a', 'b']);
    }

    #[test]
    fn test_plus_is_union() {
        let pipe = nfa_of("a|b");
        let plus = nfa_of("a+b");

        for state in 0..pipe.get_num_states() {
            assert_eq!(
                pipe.get_state_transitions(state),
                plus.get_state_transitions(state)
            );
        }
    }

    #[test]
    fn test_single_accept_state() {
        let nfa = nfa_of("(a|b)*abb");

        assert_eq!(nfa.get_acceptor_states().count_ones(), 1);
        assert!(nfa.get_acceptor_states()[nfa.get_accept_state()]);
        // Nothing leaves the accept state of a Thompson NFA
        assert!(nfa.get_state_transitions(nfa.get_accept_state()).is_empty());
        // 5 literals, 1 union and 1 star: two states each
        assert_eq!(nfa.get_num_states(), 14);
    }

    #[test]
    fn test_dangling_operator() {
        assert_invalid(Postfix::from_tokens(vec![Token::Star], EPSILON_MARKER));
        assert_invalid(Postfix::from_tokens(
            vec![Token::Literal('a'), Token::Concat],
            EPSILON_MARKER,
        ));
        assert_invalid(Postfix::from_tokens(
            vec![Token::Literal('a'), Token::Union('|')],
            EPSILON_MARKER,
        ));
    }

    #[test]
    fn test_leftover_operands() {
        assert_invalid(Postfix::from_tokens(
            vec![Token::Literal('a'), Token::Literal('b')],
            EPSILON_MARKER,
        ));
    }

    #[test]
    fn test_empty_expression() {
        assert_invalid(to_postfix("").unwrap());
        assert_invalid(to_postfix("()").unwrap());
    }

    #[test]
    fn test_malformed_infix() {
        let result = build_from_regex("a||b", EPSILON_MARKER);
        assert!(result.is_err());
        assert!(result.unwrap_err().downcast_ref::<NFAError>().is_some());

        let result = build_from_regex("*a", EPSILON_MARKER);
        assert!(result.is_err());
    }

    #[test]
    fn test_postfix_regex_is_kept() {
        let postfix = to_postfix("a|b").unwrap();
        let nfa = construct_nfa(&postfix).unwrap();
        assert_eq!(nfa.get_regex(), "ab|");
    }
}
