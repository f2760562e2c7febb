/* Subset construction to determinize the NFA, then Hopcroft partition
 * refinement to minimize it. Both operate over minterm classes: the
 * coarsest partition of the alphabet on which every edge label is all
 * in or all out, so a class like [a-z] costs one symbol instead of
 * twenty-six. */

use bitvec::prelude::BitVec;
use std::collections::{HashMap, VecDeque};

use crate::char_set::{minterms, CharRangeSet};
use crate::fa::{CompileError, Symbol, FA};
use crate::pipeline::CancelToken;

fn get_epsilon_closure(nfa: &FA, seed: &BitVec<u8>) -> BitVec<u8> {
    let mut closure = seed.clone();
    let mut work_list: VecDeque<usize> = seed.iter_ones().collect();

    while let Some(state_id) = work_list.pop_front() {
        for (symbol, target) in nfa.get_state(state_id).get_transitions() {
            if symbol.is_epsilon() && !closure[*target] {
                closure.set(*target, true);
                work_list.push_back(*target);
            }
        }
    }
    closure
}

// The set of states reachable from q on any character of the class.
// Classes never straddle an edge label, so membership of the smallest
// element decides membership of the whole class.
fn delta(nfa: &FA, q: &BitVec<u8>, class: &CharRangeSet) -> BitVec<u8> {
    let representative = match class.first() {
        Some(representative) => representative,
        None => return BitVec::repeat(false, nfa.get_num_states()),
    };
    let mut result = BitVec::repeat(false, nfa.get_num_states());
    for state_id in q.iter_ones() {
        for (symbol, target) in nfa.get_state(state_id).get_transitions() {
            if let Symbol::Ranges(set) = symbol {
                if set.contains(representative) {
                    result.set(*target, true);
                }
            }
        }
    }
    result
}

// Accept attribution: the earliest-declared rule among the accept
// states present wins, then the lowest state id.
fn accept_rule_of(nfa: &FA, q: &BitVec<u8>) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for state_id in q.iter_ones() {
        if let Some(rule) = nfa.get_accept_rule(state_id) {
            let candidate = (rule, state_id);
            if best.map_or(true, |current| candidate < current) {
                best = Some(candidate);
            }
        }
    }
    best.map(|(rule, _)| rule)
}

/// Determinize by the worklist subset construction. DFA state ids
/// follow discovery order, so the result is reproducible.
pub fn construct_dfa(nfa: &FA, cancel: &CancelToken) -> Result<FA, CompileError> {
    let classes = minterms(&nfa.edge_labels());

    let mut result = FA::new();
    let d0 = result.add_state();
    result.set_start_state(d0);

    let mut seed = BitVec::repeat(false, nfa.get_num_states());
    seed.set(nfa.get_start_state(), true);
    let q0 = get_epsilon_closure(nfa, &seed);
    if let Some(rule) = accept_rule_of(nfa, &q0) {
        result.set_accept_state(d0, rule);
    }

    let mut q_list: HashMap<BitVec<u8>, usize> = HashMap::new();
    q_list.insert(q0.clone(), d0);
    let mut work_list = VecDeque::new();
    work_list.push_back(q0);

    while let Some(q) = work_list.pop_front() {
        if cancel.is_cancelled() {
            return Err(CompileError::Cancelled);
        }
        let dq = q_list[&q];
        // one edge per target, with every class that reaches it
        let mut edges: Vec<(usize, CharRangeSet)> = Vec::new();
        for class in &classes {
            let moved = delta(nfa, &q, class);
            if moved.not_any() {
                continue;
            }
            let t = get_epsilon_closure(nfa, &moved);
            let dt = match q_list.get(&t) {
                Some(&dt) => dt,
                None => {
                    let dt = result.add_state();
                    if let Some(rule) = accept_rule_of(nfa, &t) {
                        result.set_accept_state(dt, rule);
                    }
                    q_list.insert(t.clone(), dt);
                    work_list.push_back(t);
                    dt
                }
            };
            match edges.iter_mut().find(|(target, _)| *target == dt) {
                Some((_, label)) => *label = label.union(class),
                None => edges.push((dt, class.clone())),
            }
        }
        for (target, label) in edges {
            result.add_transition(dq, Symbol::Ranges(label), target);
        }
    }

    result.update_alphabet();
    result.validate_deterministic()?;
    Ok(result)
}

/// Hopcroft minimization. The initial partition separates accept
/// states by rule tag, so two rules with the same suffix language stay
/// distinguishable in the result.
pub fn construct_minimal_dfa(dfa: &FA, cancel: &CancelToken) -> Result<FA, CompileError> {
    let classes = minterms(&dfa.edge_labels());
    let num_states = dfa.get_num_states();

    // transition and inverse-transition tables over class indexes
    let mut table: Vec<Vec<Option<usize>>> = vec![vec![None; classes.len()]; num_states];
    for state in dfa.states() {
        for (symbol, target) in state.get_transitions() {
            if let Symbol::Ranges(set) = symbol {
                for (class_id, class) in classes.iter().enumerate() {
                    let representative = match class.first() {
                        Some(representative) => representative,
                        None => continue,
                    };
                    if set.contains(representative) {
                        table[state.get_id()][class_id] = Some(*target);
                    }
                }
            }
        }
    }
    let mut preds: Vec<Vec<Vec<usize>>> = vec![vec![Vec::new(); num_states]; classes.len()];
    for state_id in 0..num_states {
        for (class_id, target) in table[state_id].iter().enumerate() {
            if let Some(target) = target {
                preds[class_id][*target].push(state_id);
            }
        }
    }

    // initial partition: one block per (accept, rule tag) combination
    let mut blocks: Vec<Vec<usize>> = Vec::new();
    let mut block_of: Vec<usize> = vec![0; num_states];
    let mut block_index: HashMap<Option<usize>, usize> = HashMap::new();
    for state_id in 0..num_states {
        let key = dfa.get_accept_rule(state_id);
        let block = *block_index.entry(key).or_insert_with(|| {
            blocks.push(Vec::new());
            blocks.len() - 1
        });
        block_of[state_id] = block;
        blocks[block].push(state_id);
    }

    let mut work_list: VecDeque<usize> = (0..blocks.len()).collect();
    let mut queued: Vec<bool> = vec![true; blocks.len()];
    let mut in_x: Vec<bool> = vec![false; num_states];

    while let Some(splitter) = work_list.pop_front() {
        if cancel.is_cancelled() {
            return Err(CompileError::Cancelled);
        }
        queued[splitter] = false;
        let splitter_states = blocks[splitter].clone();
        for class_id in 0..classes.len() {
            let mut x: Vec<usize> = Vec::new();
            for &state_id in &splitter_states {
                x.extend(preds[class_id][state_id].iter().copied());
            }
            if x.is_empty() {
                continue;
            }
            x.sort_unstable();
            x.dedup();
            for &state_id in &x {
                in_x[state_id] = true;
            }

            let mut touched: Vec<usize> = x.iter().map(|&state_id| block_of[state_id]).collect();
            touched.sort_unstable();
            touched.dedup();

            for block_id in touched {
                let inside = blocks[block_id]
                    .iter()
                    .filter(|&&state_id| in_x[state_id])
                    .count();
                if inside == blocks[block_id].len() {
                    continue; // nothing to split off
                }
                let new_id = blocks.len();
                let (outside, moved): (Vec<usize>, Vec<usize>) = blocks[block_id]
                    .iter()
                    .copied()
                    .partition(|&state_id| !in_x[state_id]);
                for &state_id in &moved {
                    block_of[state_id] = new_id;
                }
                blocks[block_id] = outside;
                blocks.push(moved);
                queued.push(false);

                if queued[block_id] {
                    work_list.push_back(new_id);
                    queued[new_id] = true;
                } else {
                    // enqueue the smaller half; the lower block id wins
                    // an exact tie
                    let smaller = if blocks[new_id].len() < blocks[block_id].len() {
                        new_id
                    } else if blocks[block_id].len() < blocks[new_id].len() {
                        block_id
                    } else {
                        block_id.min(new_id)
                    };
                    work_list.push_back(smaller);
                    queued[smaller] = true;
                }
            }

            for &state_id in &x {
                in_x[state_id] = false;
            }
        }
    }

    // rebuild, numbering blocks by their smallest member for stability
    let mut order: Vec<usize> = (0..blocks.len()).filter(|&b| !blocks[b].is_empty()).collect();
    order.sort_by_key(|&block_id| blocks[block_id].iter().min().copied());
    let mut new_id_of_block: HashMap<usize, usize> = HashMap::new();
    let mut result = FA::new();
    for (new_id, &block_id) in order.iter().enumerate() {
        let added = result.add_state();
        debug_assert_eq!(added, new_id);
        new_id_of_block.insert(block_id, new_id);
        let representative = blocks[block_id][0];
        let state = dfa.get_state(representative);
        result.set_state_provenance(
            new_id,
            state.get_prefix().map(str::to_string),
            state.get_line(),
        );
        if let Some(rule) = dfa.get_accept_rule(representative) {
            result.set_accept_state(new_id, rule);
        }
    }
    result.set_start_state(new_id_of_block[&block_of[dfa.get_start_state()]]);

    for &block_id in &order {
        let from = new_id_of_block[&block_id];
        let representative = blocks[block_id][0];
        let mut edges: Vec<(usize, CharRangeSet)> = Vec::new();
        for (class_id, class) in classes.iter().enumerate() {
            if let Some(target) = table[representative][class_id] {
                let to = new_id_of_block[&block_of[target]];
                match edges.iter_mut().find(|(existing, _)| *existing == to) {
                    Some((_, label)) => *label = label.union(class),
                    None => edges.push((to, class.clone())),
                }
            }
        }
        for (to, label) in edges {
            result.add_transition(from, Symbol::Ranges(label), to);
        }
    }

    result.update_alphabet();
    result.validate_deterministic()?;
    Ok(result)
}

#[cfg(test)]
mod dfa_tests {
    use super::*;
    use crate::nfa::{combine_rules, synthesize_rule};
    use crate::reg_ex::{parse_microsyntax_list, MicrosyntaxEntry};
    use crate::report::NullSink;

    fn build_nfa(rules: &[(&str, &str)]) -> FA {
        let entries = rules
            .iter()
            .enumerate()
            .map(|(index, (pattern, category))| MicrosyntaxEntry::new(pattern, category, index + 1))
            .collect();
        let description = parse_microsyntax_list(entries).unwrap();
        let cancel = CancelToken::new();
        let rule_fas: Vec<FA> = description
            .statements
            .iter()
            .enumerate()
            .map(|(index, statement)| {
                synthesize_rule(statement, index, false, &mut NullSink, &cancel).unwrap()
            })
            .collect();
        combine_rules(rule_fas, true).unwrap()
    }

    fn walk(dfa: &FA, input: &str) -> Option<usize> {
        let mut state = dfa.get_start_state();
        for ch in input.chars() {
            let mut next = None;
            for (symbol, target) in dfa.get_state(state).get_transitions() {
                if let Symbol::Ranges(set) = symbol {
                    if set.contains(ch) {
                        next = Some(*target);
                        break;
                    }
                }
            }
            state = next?;
        }
        dfa.get_accept_rule(state)
    }

    #[test]
    fn test_subset_removes_epsilon() {
        let nfa = build_nfa(&[("(a|b)*abb", "T")]);
        let dfa = construct_dfa(&nfa, &CancelToken::new()).unwrap();
        assert!(dfa.validate_deterministic().is_ok());
        assert_eq!(walk(&dfa, "abb"), Some(0));
        assert_eq!(walk(&dfa, "aabb"), Some(0));
        assert_eq!(walk(&dfa, "ab"), None);
    }

    #[test]
    fn test_subset_is_reproducible() {
        let nfa = build_nfa(&[("[a-c]+d?", "T")]);
        let first = construct_dfa(&nfa, &CancelToken::new()).unwrap();
        let second = construct_dfa(&nfa, &CancelToken::new()).unwrap();
        assert_eq!(first.get_num_states(), second.get_num_states());
        for (left, right) in first.states().iter().zip(second.states()) {
            assert_eq!(left.get_transitions(), right.get_transitions());
        }
    }

    #[test]
    fn test_minimal_dfa_classic() {
        // the textbook (a|b)*abb automaton minimizes to four states
        let nfa = build_nfa(&[("(a|b)*abb", "T")]);
        let dfa = construct_dfa(&nfa, &CancelToken::new()).unwrap();
        let minimal = construct_minimal_dfa(&dfa, &CancelToken::new()).unwrap();
        assert_eq!(minimal.get_num_states(), 4);
        assert_eq!(walk(&minimal, "abb"), Some(0));
        assert_eq!(walk(&minimal, "babb"), Some(0));
        assert_eq!(walk(&minimal, "ba"), None);
    }

    #[test]
    fn test_minimization_idempotent() {
        let nfa = build_nfa(&[("ab?c+", "T")]);
        let dfa = construct_dfa(&nfa, &CancelToken::new()).unwrap();
        let once = construct_minimal_dfa(&dfa, &CancelToken::new()).unwrap();
        let twice = construct_minimal_dfa(&once, &CancelToken::new()).unwrap();
        assert_eq!(once.get_num_states(), twice.get_num_states());
        for (left, right) in once.states().iter().zip(twice.states()) {
            assert_eq!(left.get_transitions(), right.get_transitions());
        }
    }

    #[test]
    fn test_rule_tags_block_merging() {
        // both accept states are dead ends with the same suffix
        // language; distinct tags keep them apart
        let nfa = build_nfa(&[("a", "A"), ("b", "B")]);
        let dfa = construct_dfa(&nfa, &CancelToken::new()).unwrap();
        let minimal = construct_minimal_dfa(&dfa, &CancelToken::new()).unwrap();
        assert_eq!(minimal.get_num_states(), 3);
        assert_eq!(walk(&minimal, "a"), Some(0));
        assert_eq!(walk(&minimal, "b"), Some(1));
    }

    #[test]
    fn test_earliest_rule_wins_overlap() {
        let nfa = build_nfa(&[("if", "KW"), ("[a-z]+", "ID")]);
        let dfa = construct_dfa(&nfa, &CancelToken::new()).unwrap();
        let minimal = construct_minimal_dfa(&dfa, &CancelToken::new()).unwrap();
        assert_eq!(walk(&minimal, "if"), Some(0));
        assert_eq!(walk(&minimal, "ifs"), Some(1));
        assert_eq!(walk(&minimal, "i"), Some(1));
    }

    #[test]
    fn test_minterms_keep_class_edges_whole() {
        let nfa = build_nfa(&[("[a-z]+", "ID")]);
        let dfa = construct_dfa(&nfa, &CancelToken::new()).unwrap();
        // a single class never fans out into per-character edges
        for state in dfa.states() {
            assert!(state.get_transitions().len() <= 1);
        }
    }

    #[test]
    fn test_cancel_stops_subset() {
        let nfa = build_nfa(&[("[a-z]+", "ID")]);
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            construct_dfa(&nfa, &cancel),
            Err(CompileError::Cancelled)
        ));
    }
}
