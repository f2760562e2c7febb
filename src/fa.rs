/* The automaton graph shared by every stage of the pipeline. The same
 * type carries the Thompson NFAs, the subset-construction DFA and the
 * minimal DFA; the stages differ only in which invariants hold. */

use bitvec::prelude::BitVec;
use std::collections::{HashMap, VecDeque};
use std::fmt;

use crate::char_set::{CharRange, CharRangeSet};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Epsilon,
    Ranges(CharRangeSet),
}

impl Symbol {
    pub fn from_char(ch: char) -> Self {
        Symbol::Ranges(CharRangeSet::from_char(ch))
    }

    pub fn from_range(range: CharRange) -> Self {
        Symbol::Ranges(CharRangeSet::from_range(range))
    }

    pub fn is_epsilon(&self) -> bool {
        matches!(self, Symbol::Epsilon)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Epsilon => write!(f, "𝛆"),
            Symbol::Ranges(set) => match set.ranges() {
                [range] if range.is_single() => write!(f, "{}", range.min()),
                _ => write!(f, "{}", set),
            },
        }
    }
}

/// Errors produced while turning rules into automata.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    UnsupportedConstruct { rule: String, construct: String },
    MalformedRange { lower: u32, upper: u32 },
    EmptyLanguage(String),
    InternalInvariantViolation(String),
    Cancelled,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnsupportedConstruct { rule, construct } => {
                write!(f, "Error: rule {} uses unsupported {}", rule, construct)
            }
            CompileError::MalformedRange { lower, upper } => {
                write!(f, "Error: malformed repetition range {}-{}", lower, upper)
            }
            CompileError::EmptyLanguage(rule) => {
                write!(f, "Warning: rule {} matches no input", rule)
            }
            CompileError::InternalInvariantViolation(detail) => {
                write!(f, "Internal invariant violation: {}", detail)
            }
            CompileError::Cancelled => write!(f, "Generation cancelled"),
        }
    }
}

impl std::error::Error for CompileError {}

impl CompileError {
    /// Skippable errors abort the offending rule, not the whole run.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            CompileError::UnsupportedConstruct { .. } | CompileError::EmptyLanguage(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct FaState {
    id: usize,
    prefix: Option<String>,
    line: Option<usize>,
    transitions: Vec<(Symbol, usize)>,
}

impl FaState {
    fn new(id: usize) -> Self {
        FaState {
            id,
            prefix: None,
            line: None,
            transitions: Vec::new(),
        }
    }

    pub fn get_id(&self) -> usize {
        self.id
    }

    pub fn get_transitions(&self) -> &[(Symbol, usize)] {
        &self.transitions
    }

    pub fn get_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn get_line(&self) -> Option<usize> {
        self.line
    }

    /// Provenance label, rendered only when someone looks at the graph.
    pub fn label(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, self.id),
            None => format!("s{}", self.id),
        }
    }

    fn add_transition(&mut self, symbol: Symbol, to: usize) {
        self.transitions.push((symbol, to));
    }
}

/// Directed multigraph with range-set edge labels, one start state and
/// rule-tagged accept states. Composition is by `merge`, which consumes
/// the absorbed automaton and re-issues its state ids.
#[derive(Debug, Clone, Default)]
pub struct FA {
    states: Vec<FaState>,
    start_state: usize,
    accept_states: BitVec<u8>,
    accept_rules: HashMap<usize, usize>,
    alphabet: CharRangeSet,
}

impl FA {
    pub fn new() -> Self {
        FA {
            states: Vec::new(),
            start_state: 0,
            accept_states: BitVec::new(),
            accept_rules: HashMap::new(),
            alphabet: CharRangeSet::new(),
        }
    }

    pub fn add_state(&mut self) -> usize {
        let state_id = self.states.len();
        self.states.push(FaState::new(state_id));
        self.accept_states.push(false);
        state_id
    }

    pub fn add_transition(&mut self, from: usize, symbol: Symbol, to: usize) {
        if let Symbol::Ranges(set) = &symbol {
            self.alphabet = self.alphabet.union(set);
        }
        self.states[from].add_transition(symbol, to);
    }

    pub fn set_start_state(&mut self, state_id: usize) {
        self.start_state = state_id;
    }

    pub fn set_accept_state(&mut self, state_id: usize, rule: usize) {
        self.accept_states.set(state_id, true);
        self.accept_rules.insert(state_id, rule);
    }

    pub fn clear_accept_state(&mut self, state_id: usize) {
        self.accept_states.set(state_id, false);
        self.accept_rules.remove(&state_id);
    }

    pub fn get_num_states(&self) -> usize {
        self.states.len()
    }

    pub fn get_start_state(&self) -> usize {
        self.start_state
    }

    pub fn get_state(&self, id: usize) -> &FaState {
        match self.states.get(id) {
            Some(state) => state,
            None => panic!("Invalid state index provided"),
        }
    }

    pub fn states(&self) -> &[FaState] {
        &self.states
    }

    pub fn get_acceptor_states(&self) -> &BitVec<u8> {
        &self.accept_states
    }

    pub fn is_accept_state(&self, id: usize) -> bool {
        self.accept_states[id]
    }

    pub fn get_accept_rule(&self, id: usize) -> Option<usize> {
        self.accept_rules.get(&id).copied()
    }

    pub fn get_alphabet(&self) -> &CharRangeSet {
        &self.alphabet
    }

    /// Absorb `other`, re-issuing its state ids past the current ones.
    /// Returns the offset added to every absorbed id; the caller maps
    /// its references through it. Accept states and their rule tags
    /// carry over; the start state of the result is unchanged. With
    /// `preserve_labels` unset, absorbed provenance is dropped.
    pub fn merge(&mut self, other: FA, preserve_labels: bool) -> usize {
        let offset = self.states.len();
        for mut state in other.states {
            state.id += offset;
            for (_, target) in state.transitions.iter_mut() {
                *target += offset;
            }
            if !preserve_labels {
                state.prefix = None;
                state.line = None;
            }
            self.states.push(state);
            self.accept_states.push(false);
        }
        for (state_id, rule) in other.accept_rules {
            self.accept_states.set(state_id + offset, true);
            self.accept_rules.insert(state_id + offset, rule);
        }
        self.alphabet = self.alphabet.union(&other.alphabet);
        offset
    }

    /// Stamp every state with the owning rule's name and source line.
    pub fn set_prefix(&mut self, prefix: &str, line: Option<usize>) {
        for state in &mut self.states {
            state.prefix = Some(prefix.to_string());
            state.line = line;
        }
    }

    pub fn set_state_provenance(&mut self, id: usize, prefix: Option<String>, line: Option<usize>) {
        self.states[id].prefix = prefix;
        self.states[id].line = line;
    }

    /// Recompute the alphabet from the current edge labels.
    pub fn update_alphabet(&mut self) {
        let mut alphabet = CharRangeSet::new();
        for state in &self.states {
            for (symbol, _) in &state.transitions {
                if let Symbol::Ranges(set) = symbol {
                    alphabet = alphabet.union(set);
                }
            }
        }
        self.alphabet = alphabet;
    }

    /// Every distinct range set occurring on a non-epsilon edge.
    pub fn edge_labels(&self) -> Vec<CharRangeSet> {
        let mut labels: Vec<CharRangeSet> = Vec::new();
        for state in &self.states {
            for (symbol, _) in &state.transitions {
                if let Symbol::Ranges(set) = symbol {
                    if !labels.contains(set) {
                        labels.push(set.clone());
                    }
                }
            }
        }
        labels
    }

    /// True when some accept state is reachable from the start state.
    pub fn has_accept_path(&self) -> bool {
        if self.states.is_empty() {
            return false;
        }
        let mut visited: BitVec<u8> = BitVec::repeat(false, self.states.len());
        let mut queue = VecDeque::new();
        visited.set(self.start_state, true);
        queue.push_back(self.start_state);
        while let Some(state_id) = queue.pop_front() {
            if self.accept_states[state_id] {
                return true;
            }
            for (_, target) in self.states[state_id].get_transitions() {
                if !visited[*target] {
                    visited.set(*target, true);
                    queue.push_back(*target);
                }
            }
        }
        false
    }

    /// Structural soundness shared by every stage.
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.states.is_empty() {
            return Err(CompileError::InternalInvariantViolation(
                "automaton has no states".to_string(),
            ));
        }
        if self.start_state >= self.states.len() {
            return Err(CompileError::InternalInvariantViolation(format!(
                "start state {} out of bounds",
                self.start_state
            )));
        }
        for (index, state) in self.states.iter().enumerate() {
            if state.id != index {
                return Err(CompileError::InternalInvariantViolation(format!(
                    "state id {} stored at index {}",
                    state.id, index
                )));
            }
            for (symbol, target) in &state.transitions {
                if *target >= self.states.len() {
                    return Err(CompileError::InternalInvariantViolation(format!(
                        "transition from {} to missing state {}",
                        state.id, target
                    )));
                }
                if let Symbol::Ranges(set) = symbol {
                    if set.is_empty() {
                        return Err(CompileError::InternalInvariantViolation(format!(
                            "empty range set on edge from {}",
                            state.id
                        )));
                    }
                }
            }
        }
        for (&state_id, _) in &self.accept_rules {
            if state_id >= self.states.len() || !self.accept_states[state_id] {
                return Err(CompileError::InternalInvariantViolation(format!(
                    "rule tag on non-accept state {}",
                    state_id
                )));
            }
        }
        for accept in self.accept_states.iter_ones() {
            if !self.accept_rules.contains_key(&accept) {
                return Err(CompileError::InternalInvariantViolation(format!(
                    "accept state {} has no rule tag",
                    accept
                )));
            }
        }
        Ok(())
    }

    /// DFA soundness: no epsilon edges and pairwise-disjoint outgoing
    /// labels per state.
    pub fn validate_deterministic(&self) -> Result<(), CompileError> {
        self.validate()?;
        for state in &self.states {
            let mut seen = CharRangeSet::new();
            for (symbol, _) in &state.transitions {
                match symbol {
                    Symbol::Epsilon => {
                        return Err(CompileError::InternalInvariantViolation(format!(
                            "epsilon edge from {} in a DFA",
                            state.id
                        )));
                    }
                    Symbol::Ranges(set) => {
                        if !seen.intersect(set).is_empty() {
                            return Err(CompileError::InternalInvariantViolation(format!(
                                "overlapping labels out of state {}",
                                state.id
                            )));
                        }
                        seen = seen.union(set);
                    }
                }
            }
        }
        Ok(())
    }
}
