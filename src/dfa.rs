/* Perform subset construction to convert an NFA into a DFA.
 * Apply Hopcroft's algorithm to generate the minimal DFA */

use crate::fa::{Symbol, EPSILON_MARKER, FA};
use crate::nfa::NFA;
use bitvec::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::hash::{DefaultHasher, Hash, Hasher};
use tracing::{debug, trace};

/// A struct which is a bitvec and its hash stored together to ease fetching the hash of the bitvec
/// quickly instead of calculating it each time.

#[derive(Clone)]
struct HashedBitVec {
    bv: BitVec<u8>,
    hash: u64,
}

impl HashedBitVec {
    fn new(bv: BitVec<u8>) -> Self {
        let mut hasher = DefaultHasher::new();
        bv.hash(&mut hasher);
        let hash = hasher.finish();
        Self { bv, hash }
    }
}

impl Hash for HashedBitVec {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl PartialEq for HashedBitVec {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bv == other.bv
    }
}

impl Eq for HashedBitVec {}

/// Deterministic automaton with a partial transition function.
///
/// A `(state, symbol)` pair without an entry rejects the input right away. Neither subset
/// construction nor minimization materializes a dead state for the missing entries, and
/// none should be added by hand: a dead state is only distinguishable from a missing
/// transition by a string that reaches it, so adding one changes which states
/// minimization merges.
#[derive(Debug, Clone)]
pub struct DFA {
    states: Vec<DFAState>,
    start_state: usize,
    accept_states: BitVec<u8>,
    alphabet: BTreeSet<char>,
    epsilon: char,
    regex: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DFAState {
    transitions: BTreeMap<char, usize>,
}

/// Indexed partition of the DFA states used by Hopcroft's algorithm. Every state knows its
/// set, every set knows its members, and a flag per set records whether it is waiting in
/// the work list.
struct LookupTable {
    state_to_set: Vec<usize>,
    set_to_states: Vec<Vec<usize>>,
    pending: BitVec<u8>,
    work_list: Vec<usize>,
}

impl LookupTable {
    /// Accepting and non accepting states form the initial sets, both of which start out
    /// pending. Empty sets are left out.
    fn new(dfa: &DFA) -> Self {
        let mut lookup_table = LookupTable {
            state_to_set: vec![0; dfa.get_num_states()],
            set_to_states: Vec::new(),
            pending: BitVec::new(),
            work_list: Vec::new(),
        };

        let accepting: Vec<usize> = dfa.accept_states.iter_ones().collect();
        let rejecting: Vec<usize> = dfa.accept_states.iter_zeros().collect();

        for members in [accepting, rejecting] {
            if members.is_empty() {
                continue;
            }
            let set = lookup_table.add_set(members);
            lookup_table.push_pending(set);
        }
        lookup_table
    }

    fn add_set(&mut self, members: Vec<usize>) -> usize {
        let set = self.set_to_states.len();
        for &state in &members {
            self.state_to_set[state] = set;
        }
        self.set_to_states.push(members);
        self.pending.push(false);
        set
    }

    fn push_pending(&mut self, set: usize) {
        self.pending.set(set, true);
        self.work_list.push(set);
    }

    fn pop_pending(&mut self) -> Option<usize> {
        let set = self.work_list.pop()?;
        self.pending.set(set, false);
        Some(set)
    }

    fn is_pending(&self, set: usize) -> bool {
        self.pending[set]
    }

    /// Move `inside` out of `set` into a new set and update the work list. `inside` must be
    /// a non empty proper subset of `set`.
    fn split(&mut self, set: usize, inside: Vec<usize>) {
        let inside_len = inside.len();
        let outside_len = self.set_to_states[set].len() - inside_len;

        let new_set = self.add_set(inside);
        let state_to_set = &self.state_to_set;
        self.set_to_states[set].retain(|state| state_to_set[*state] == set);

        if self.is_pending(set) {
            self.push_pending(new_set);
        } else if inside_len <= outside_len {
            self.push_pending(new_set);
        } else {
            self.push_pending(set);
        }
        trace!(set, new_set, inside_len, outside_len, "split set");
    }

    fn get_set_of_state(&self, state: usize) -> usize {
        self.state_to_set[state]
    }

    fn get_num_sets(&self) -> usize {
        self.set_to_states.len()
    }

    fn get_set(&self, set: usize) -> &[usize] {
        &self.set_to_states[set]
    }
}

impl FA for DFA {
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
        match self.states.get(state_id) {
            Some(state) => state
                .transitions
                .iter()
                .map(|(ch, target)| (Symbol::Char(*ch), *target))
                .collect(),
            None => Vec::new(),
        }
    }
}

impl DFAState {
    /// Get a list of all outgoing transitions for the given state
    pub fn get_transitions(&self) -> &BTreeMap<char, usize> {
        &self.transitions
    }
}

impl DFA {
    fn new() -> Self {
        DFA {
            states: Vec::new(),
            start_state: 0,
            accept_states: BitVec::new(),
            alphabet: BTreeSet::new(),
            epsilon: EPSILON_MARKER,
            regex: String::new(),
        }
    }

    fn add_state(&mut self, accepting: bool) -> usize {
        let state_id = self.states.len();
        self.states.push(DFAState::default());
        self.accept_states.push(accepting);
        state_id
    }

    /// Returns a reference to the DFA state whose id is provided
    pub fn get_state(&self, id: usize) -> Option<&DFAState> {
        self.states.get(id)
    }

    /// Returns a list of all states present in the DFA
    pub fn get_states(&self) -> &[DFAState] {
        &self.states
    }

    pub fn is_accepting(&self, id: usize) -> bool {
        self.accept_states.get(id).is_some_and(|bit| *bit)
    }

    /// Target of the transition from `state` on `ch`, or `None` when the input is rejected.
    pub fn next_state(&self, state: usize, ch: char) -> Option<usize> {
        self.states.get(state)?.transitions.get(&ch).copied()
    }

    /// The expression this DFA was derived from.
    pub fn get_regex(&self) -> &String {
        &self.regex
    }
}

/// Smallest superset of `nfa_states` closed under epsilon transitions.
pub(crate) fn epsilon_closure(nfa: &NFA, nfa_states: BitVec<u8>) -> BitVec<u8> {
    let mut closure = nfa_states;
    let mut work_list: VecDeque<usize> = closure.iter_ones().collect();

    while let Some(state_id) = work_list.pop_front() {
        let Some(state) = nfa.get_state(state_id) else {
            continue;
        };

        if let Some(targets) = state.get_transitions().get(&Symbol::Epsilon) {
            for &target in targets {
                if !closure[target] {
                    closure.set(target, true);
                    work_list.push_back(target);
                }
            }
        }
    }
    closure
}

// This function returns the set of states reachable via char c from the set q, epsilon
// transitions excluded.

pub(crate) fn delta(nfa: &NFA, q: &BitVec<u8>, c: char) -> BitVec<u8> {
    let mut result = BitVec::repeat(false, q.len());
    for node in q.iter_ones() {
        let Some(nfa_state) = nfa.get_state(node) else {
            continue;
        };
        if let Some(targets) = nfa_state.get_transitions().get(&Symbol::Char(c)) {
            for &target in targets {
                result.set(target, true);
            }
        }
    }
    result
}

///  Apply the subset construction algorithm on an NFA to build a DFA. States are numbered in
///  the order they are discovered, starting with 0 for the epsilon closure of the NFA start.
pub fn construct_dfa(nfa: &NFA) -> DFA {
    let mut result = DFA::new();
    result.alphabet = nfa.get_alphabet().clone(); // DFA has same alphabet as NFA
    result.epsilon = nfa.get_epsilon();
    result.regex = nfa.get_regex().to_string();

    let nfa_accept = nfa.get_accept_state();

    let mut q_list: HashMap<HashedBitVec, usize> = HashMap::new(); // Mapping from nfa state set to DFA state
    let mut work_list: VecDeque<(HashedBitVec, usize)> = VecDeque::new();

    let mut nfa_states = BitVec::repeat(false, nfa.get_num_states());
    nfa_states.set(nfa.get_start_state(), true);

    let q0 = HashedBitVec::new(epsilon_closure(nfa, nfa_states));
    let d0 = result.add_state(q0.bv[nfa_accept]);
    result.start_state = d0;

    q_list.insert(q0.clone(), d0);
    work_list.push_back((q0, d0));

    while let Some((q, dq)) = work_list.pop_front() {
        for &c in nfa.get_alphabet() {
            let end_states = delta(nfa, &q.bv, c);
            if end_states.not_any() {
                // No transition, the input is rejected here
                continue;
            }

            let t = HashedBitVec::new(epsilon_closure(nfa, end_states));

            let dt = match q_list.get(&t) {
                Some(&existing) => existing,
                None => {
                    let dt = result.add_state(t.bv[nfa_accept]);
                    trace!(state = dt, nfa_states = ?t.bv.iter_ones().collect::<Vec<_>>(), "discovered DFA state");
                    q_list.insert(t.clone(), dt);
                    work_list.push_back((t, dt));
                    dt
                }
            };

            result.states[dq].transitions.insert(c, dt);
        }
    }

    debug!(
        nfa_states = nfa.get_num_states(),
        dfa_states = result.get_num_states(),
        "constructed DFA"
    );
    result
}

fn get_lookup_table(dfa: &DFA) -> LookupTable {
    let mut lookup_table = LookupTable::new(dfa);

    // inverse[c][target] lists the states which move to target on c
    let mut inverse: BTreeMap<char, Vec<Vec<usize>>> = BTreeMap::new();
    for (source, state) in dfa.states.iter().enumerate() {
        for (&c, &target) in &state.transitions {
            inverse
                .entry(c)
                .or_insert_with(|| vec![Vec::new(); dfa.states.len()])[target]
                .push(source);
        }
    }

    while let Some(splitter) = lookup_table.pop_pending() {
        // The splits below may shrink the splitter set itself, so its members are taken up front
        let splitter: Vec<usize> = lookup_table.get_set(splitter).to_vec();

        for sources in inverse.values() {
            let mut touched: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

            for &target in &splitter {
                for &source in &sources[target] {
                    touched
                        .entry(lookup_table.get_set_of_state(source))
                        .or_default()
                        .push(source);
                }
            }

            for (set, inside) in touched {
                if inside.len() < lookup_table.get_set(set).len() {
                    lookup_table.split(set, inside);
                }
            }
        }
    }
    lookup_table
}

/// Number the sets breadth first from the set of the start state, so that the start of the
/// minimal DFA is always 0. Sets which cannot be reached come last.
fn reorder_sets(dfa: &DFA, lookup_table: &LookupTable) -> Vec<usize> {
    let num_sets = lookup_table.get_num_sets();
    let mut reorder_map: Vec<Option<usize>> = vec![None; num_sets];
    let mut queue: VecDeque<usize> = VecDeque::new();
    let mut next_id = 0;

    let start_set = lookup_table.get_set_of_state(dfa.start_state);
    reorder_map[start_set] = Some(next_id);
    next_id += 1;
    queue.push_back(start_set);

    while let Some(set) = queue.pop_front() {
        // Members of a set agree on where every symbol leads, any of them will do
        let representative = lookup_table.get_set(set)[0];

        for &target in dfa.states[representative].transitions.values() {
            let target_set = lookup_table.get_set_of_state(target);
            if reorder_map[target_set].is_none() {
                reorder_map[target_set] = Some(next_id);
                next_id += 1;
                queue.push_back(target_set);
            }
        }
    }

    reorder_map
        .into_iter()
        .map(|id| {
            id.unwrap_or_else(|| {
                let id = next_id;
                next_id += 1;
                id
            })
        })
        .collect()
}

/// Apply Hopcroft's algorithm on a provided DFA to minimize it. The result accepts the same
/// language and has at most as many states; the transition function stays partial.
pub fn construct_minimal_dfa(dfa: &DFA) -> DFA {
    let lookup_table = get_lookup_table(dfa);
    let reorder_map = reorder_sets(dfa, &lookup_table);

    let mut minimal_dfa = DFA::new();
    minimal_dfa.alphabet = dfa.alphabet.clone();
    minimal_dfa.epsilon = dfa.epsilon;
    minimal_dfa.regex = dfa.regex.to_string();

    for _ in 0..lookup_table.get_num_sets() {
        minimal_dfa.add_state(false);
    }

    let block_of = |state: usize| reorder_map[lookup_table.get_set_of_state(state)];

    minimal_dfa.start_state = block_of(dfa.start_state);

    for (state_id, state) in dfa.states.iter().enumerate() {
        let block = block_of(state_id);

        if dfa.accept_states[state_id] {
            minimal_dfa.accept_states.set(block, true);
        }

        for (&c, &target) in &state.transitions {
            minimal_dfa.states[block]
                .transitions
                .insert(c, block_of(target));
        }
    }

    debug!(
        dfa_states = dfa.get_num_states(),
        minimal_states = minimal_dfa.get_num_states(),
        "minimized DFA"
    );
    minimal_dfa
}

#[cfg(test)]
mod dfa_tests {
    use super::*;
    use crate::nfa::build_from_regex;

    fn dfa_of(regex: &str) -> DFA {
        construct_dfa(&build_from_regex(regex, EPSILON_MARKER).unwrap())
    }

    fn from_parts(
        num_states: usize,
        start_state: usize,
        accepts: &[usize],
        transitions: &[(usize, char, usize)],
    ) -> DFA {
        let mut dfa = DFA::new();
        for state in 0..num_states {
            dfa.add_state(accepts.contains(&state));
        }
        dfa.start_state = start_state;
        for &(from, c, to) in transitions {
            dfa.alphabet.insert(c);
            dfa.states[from].transitions.insert(c, to);
        }
        dfa
    }

    #[test]
    fn test_dfa_state_creation() {
        let state = DFAState::default();
        assert_eq!(state.get_transitions().len(), 0);
    }

    #[test]
    fn test_dfa_basic_construction() {
        let mut dfa = DFA::new();
        let start = dfa.add_state(false);
        let end = dfa.add_state(true);

        assert_eq!(dfa.get_num_states(), 2);
        assert_eq!(dfa.get_start_state(), 0);
        assert_eq!(dfa.get_acceptor_states().len(), 2);
        assert!(dfa.get_acceptor_states()[end]);
        assert!(!dfa.get_acceptor_states()[start]);

        dfa.states[start].transitions.insert('a', end);
        let transitions = dfa.get_state_transitions(start);
        assert_eq!(transitions, vec![(Symbol::Char('a'), end)]);
        assert_eq!(dfa.next_state(start, 'a'), Some(end));
        assert_eq!(dfa.next_state(start, 'b'), None);
        assert_eq!(dfa.next_state(7, 'a'), None);
    }

    #[test]
    fn test_epsilon_closure() {
        let nfa = build_from_regex("a*", EPSILON_MARKER).unwrap();

        let mut states = BitVec::repeat(false, nfa.get_num_states());
        states.set(nfa.get_start_state(), true);

        let closure: Vec<usize> = epsilon_closure(&nfa, states).iter_ones().collect();
        assert_eq!(closure, vec![0, 2, 3]);
    }

    #[test]
    fn test_delta_ignores_epsilon() {
        let nfa = build_from_regex("a*", EPSILON_MARKER).unwrap();

        let mut states = BitVec::repeat(false, nfa.get_num_states());
        states.set(0, true);
        states.set(2, true);

        let moved: Vec<usize> = delta(&nfa, &states, 'a').iter_ones().collect();
        assert_eq!(moved, vec![1]);
        assert!(delta(&nfa, &states, 'b').not_any());
    }

    #[test]
    fn test_subset_construction_union() {
        let dfa = dfa_of("a|b");

        assert_eq!(dfa.get_num_states(), 3);
        assert_eq!(dfa.get_start_state(), 0);
        assert!(!dfa.is_accepting(0));
        // Symbols are explored in order, so 'a' discovers state 1
        assert_eq!(dfa.next_state(0, 'a'), Some(1));
        assert_eq!(dfa.next_state(0, 'b'), Some(2));
        assert!(dfa.is_accepting(1));
        assert!(dfa.is_accepting(2));
        assert!(dfa.get_state(1).unwrap().get_transitions().is_empty());
    }

    #[test]
    fn test_subset_construction_has_no_trap_state() {
        let dfa = dfa_of("ab");

        assert_eq!(dfa.get_num_states(), 3);
        assert_eq!(dfa.next_state(0, 'b'), None);
        assert_eq!(dfa.next_state(1, 'a'), None);
    }

    #[test]
    fn test_subset_construction_textbook() {
        let dfa = dfa_of("(a|b)*abb");

        assert_eq!(dfa.get_num_states(), 5);
        assert_eq!(dfa.get_acceptor_states().count_ones(), 1);
        assert_eq!(dfa.get_regex(), "(a|b)*abb");
    }

    #[test]
    fn test_lookup_table() {
        let dfa = from_parts(4, 0, &[1, 3], &[]);
        let mut lookup_table = LookupTable::new(&dfa);

        assert_eq!(lookup_table.get_num_sets(), 2);
        assert_eq!(lookup_table.get_set(0), &[1, 3]);
        assert_eq!(lookup_table.get_set(1), &[0, 2]);
        assert!(lookup_table.is_pending(0) && lookup_table.is_pending(1));

        // Set 1 is popped first, splitting set 0 afterwards puts both pieces in the work list
        assert_eq!(lookup_table.pop_pending(), Some(1));
        lookup_table.split(0, vec![3]);

        assert_eq!(lookup_table.get_num_sets(), 3);
        assert_eq!(lookup_table.get_set(0), &[1]);
        assert_eq!(lookup_table.get_set_of_state(3), 2);
        assert!(lookup_table.is_pending(2));

        // Set 1 is no longer pending, so only the smaller piece is queued
        lookup_table.split(1, vec![0]);
        assert_eq!(lookup_table.get_set_of_state(0), 3);
        assert!(lookup_table.is_pending(3));
        assert!(!lookup_table.is_pending(1));
    }

    #[test]
    fn test_lookup_table_without_accept_states() {
        let dfa = from_parts(2, 0, &[], &[(0, 'a', 1)]);
        let lookup_table = LookupTable::new(&dfa);

        assert_eq!(lookup_table.get_num_sets(), 1);
        assert_eq!(lookup_table.get_set(0), &[0, 1]);
    }

    #[test]
    fn test_construct_minimal_dfa() {
        // s1 and s3 are duplicates, and so are s0 and s2
        let dfa = from_parts(
            4,
            0,
            &[1, 3],
            &[
                (0, 'a', 1),
                (0, 'b', 2),
                (1, 'a', 1),
                (1, 'b', 2),
                (2, 'a', 3),
                (2, 'b', 2),
                (3, 'a', 3),
                (3, 'b', 2),
            ],
        );

        let minimal_dfa = construct_minimal_dfa(&dfa);

        assert_eq!(minimal_dfa.get_num_states(), 2);
        assert_eq!(minimal_dfa.get_start_state(), 0);
        assert_eq!(minimal_dfa.get_acceptor_states().count_ones(), 1);
        assert!(minimal_dfa.is_accepting(1));
        assert_eq!(minimal_dfa.next_state(0, 'a'), Some(1));
        assert_eq!(minimal_dfa.next_state(0, 'b'), Some(0));
        assert_eq!(minimal_dfa.next_state(1, 'a'), Some(1));
        assert_eq!(minimal_dfa.next_state(1, 'b'), Some(0));
    }

    #[test]
    fn test_minimal_textbook() {
        let dfa = dfa_of("(a|b)*abb");
        let minimal_dfa = construct_minimal_dfa(&dfa);

        assert_eq!(minimal_dfa.get_num_states(), 4);
        assert_eq!(minimal_dfa.get_start_state(), 0);
        assert_eq!(minimal_dfa.get_acceptor_states().count_ones(), 1);
    }

    #[test]
    fn test_minimal_merges_accepting_leaves() {
        let minimal_dfa = construct_minimal_dfa(&dfa_of("a|b"));

        assert_eq!(minimal_dfa.get_num_states(), 2);
        assert_eq!(minimal_dfa.next_state(0, 'a'), Some(1));
        assert_eq!(minimal_dfa.next_state(0, 'b'), Some(1));
    }

    #[test]
    fn test_missing_transition_is_distinguishing() {
        // 1 has an 'a' edge into the rejecting state 2 which 2 itself lacks; both reject
        // every string, yet the partial transition function keeps them apart.
        let dfa = from_parts(3, 0, &[0], &[(0, 'a', 1), (1, 'a', 2)]);
        let minimal_dfa = construct_minimal_dfa(&dfa);

        assert_eq!(minimal_dfa.get_num_states(), 3);
    }

    #[test]
    fn test_unreachable_sets_are_numbered_last() {
        // 2 is unreachable and distinguishable from both other states
        let dfa = from_parts(3, 1, &[0], &[(1, 'a', 0), (2, 'b', 0)]);
        let minimal_dfa = construct_minimal_dfa(&dfa);

        assert_eq!(minimal_dfa.get_num_states(), 3);
        assert_eq!(minimal_dfa.get_start_state(), 0);
        assert_eq!(minimal_dfa.next_state(0, 'a'), Some(1));
        assert!(minimal_dfa.is_accepting(1));
        assert_eq!(minimal_dfa.next_state(2, 'b'), Some(1));
    }

    #[test]
    fn test_minimize_single_state() {
        let minimal_dfa = construct_minimal_dfa(&dfa_of("a*"));

        assert_eq!(minimal_dfa.get_num_states(), 1);
        assert!(minimal_dfa.is_accepting(0));
        assert_eq!(minimal_dfa.next_state(0, 'a'), Some(0));
    }

    #[test]
    fn test_minimize_is_idempotent() {
        for regex in ["(a|b)*abb", "a(b|c)*d", "(ab|ba)*", "ε|a*b"] {
            let once = construct_minimal_dfa(&dfa_of(regex));
            let twice = construct_minimal_dfa(&once);

            assert_eq!(once.get_num_states(), twice.get_num_states(), "{}", regex);
            assert_eq!(once.to_view(), twice.to_view(), "{}", regex);
        }
    }

    #[test]
    fn test_epsilon_marker_is_kept() {
        let nfa = build_from_regex("ε|#", '#').unwrap();
        let dfa = construct_dfa(&nfa);
        let minimal_dfa = construct_minimal_dfa(&dfa);

        assert_eq!(dfa.get_epsilon(), '#');
        assert_eq!(minimal_dfa.get_epsilon(), '#');

        let view = minimal_dfa.to_view();
        assert_eq!(view.epsilon, '#');
        assert_eq!(view.alphabet, vec!['ε']);
        assert!(!view.alphabet.contains(&view.epsilon));
    }
}
