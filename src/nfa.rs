/* Thompson construction. Every template returns an automaton with
 * exactly one start state and exactly one accept state, no edge into
 * the start and no edge out of the accept; composition welds such
 * automata with epsilon edges and consumes the operands. */

use crate::char_set::{class_universe, CharRange, CharRangeSet};
use crate::fa::{CompileError, Symbol, FA};
use crate::pipeline::CancelToken;
use crate::reg_ex::{Base, Factor, Quantifier, RegEx, RegexpStatement, Term};
use crate::report::{StageSink, StageTag};

/// The single accept state of a template automaton.
fn single_accept(fa: &FA) -> Result<usize, CompileError> {
    let mut accepts = fa.get_acceptor_states().iter_ones();
    match (accepts.next(), accepts.next()) {
        (Some(accept), None) => Ok(accept),
        _ => Err(CompileError::InternalInvariantViolation(
            "template automaton must have exactly one accept state".to_string(),
        )),
    }
}

struct Synthesizer<'a> {
    sink: &'a mut dyn StageSink,
    cancel: &'a CancelToken,
    emit_steps: bool,
    rule_name: String,
    rule_index: usize,
}

impl<'a> Synthesizer<'a> {
    fn emit(&mut self, stage: StageTag, fa: &FA) {
        if self.emit_steps {
            self.sink.emit(stage, fa, &self.rule_name);
        }
    }

    fn check_cancel(&self) -> Result<(), CompileError> {
        if self.cancel.is_cancelled() {
            Err(CompileError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn leaf(&mut self, symbol: Option<Symbol>) -> FA {
        let mut result = FA::new();
        let start_state = result.add_state();
        let end_state = result.add_state();
        if let Some(symbol) = symbol {
            result.add_transition(start_state, symbol, end_state);
        }
        result.set_start_state(start_state);
        result.set_accept_state(end_state, self.rule_index);
        result
    }

    fn literal_construction(&mut self, character: char) -> FA {
        self.leaf(Some(Symbol::from_char(character)))
    }

    fn range_construction(&mut self, range: CharRange) -> FA {
        self.leaf(Some(Symbol::from_range(range)))
    }

    /// Lowers the class to its positive form first; a class that lowers
    /// to nothing yields a template with no edge at all, which the
    /// driver reports as an empty language at rule level.
    fn set_construction(&mut self, negated: bool, set: &CharRangeSet) -> FA {
        let lowered = if negated {
            class_universe().subtract(set)
        } else {
            set.clone()
        };
        if lowered.is_empty() {
            self.leaf(None)
        } else {
            self.leaf(Some(Symbol::Ranges(lowered)))
        }
    }

    /// Matches only the empty string.
    fn epsilon_construction(&mut self) -> FA {
        self.leaf(Some(Symbol::Epsilon))
    }

    fn concatenate(&mut self, left: FA, right: FA) -> Result<FA, CompileError> {
        let weld = single_accept(&left)?;
        let right_start = right.get_start_state();
        let mut result = left;
        result.clear_accept_state(weld);
        let offset = result.merge(right, true);
        result.add_transition(weld, Symbol::Epsilon, right_start + offset);
        self.emit(StageTag::Concat, &result);
        Ok(result)
    }

    fn alternation(&mut self, left: FA, right: FA) -> Result<FA, CompileError> {
        let left_start = left.get_start_state();
        let left_accept = single_accept(&left)?;
        let right_start = right.get_start_state();
        let right_accept = single_accept(&right)?;

        let mut result = FA::new();
        let new_start = result.add_state();
        let left_offset = result.merge(left, true);
        let right_offset = result.merge(right, true);
        result.clear_accept_state(left_accept + left_offset);
        result.clear_accept_state(right_accept + right_offset);

        result.add_transition(new_start, Symbol::Epsilon, left_start + left_offset);
        result.add_transition(new_start, Symbol::Epsilon, right_start + right_offset);

        let new_accept = result.add_state();
        result.add_transition(left_accept + left_offset, Symbol::Epsilon, new_accept);
        result.add_transition(right_accept + right_offset, Symbol::Epsilon, new_accept);

        result.set_start_state(new_start);
        result.set_accept_state(new_accept, self.rule_index);
        self.emit(StageTag::Alt, &result);
        Ok(result)
    }

    /// `*`, `+` and `?`. The three only differ in which of the skip
    /// edge (start to accept) and the loop edge (accept back to start)
    /// exist.
    fn closure(&mut self, inner: FA, quantifier: &Quantifier) -> Result<FA, CompileError> {
        let old_start = inner.get_start_state();
        let old_accept = single_accept(&inner)?;

        let mut result = FA::new();
        let new_start = result.add_state();
        let offset = result.merge(inner, true);
        result.clear_accept_state(old_accept + offset);
        result.add_transition(new_start, Symbol::Epsilon, old_start + offset);

        let new_accept = result.add_state();
        match quantifier {
            Quantifier::Star | Quantifier::Question => {
                result.add_transition(new_start, Symbol::Epsilon, new_accept);
            }
            _ => {}
        }
        match quantifier {
            Quantifier::Star | Quantifier::Plus => {
                result.add_transition(old_accept + offset, Symbol::Epsilon, old_start + offset);
            }
            _ => {}
        }
        result.add_transition(old_accept + offset, Symbol::Epsilon, new_accept);

        result.set_start_state(new_start);
        result.set_accept_state(new_accept, self.rule_index);
        self.emit(StageTag::Closure, &result);
        Ok(result)
    }

    /// Bounded repetition by unrolling: `lower` welded copies, then
    /// optional copies up to the bound, or a star tail when unbounded.
    fn repeat(
        &mut self,
        base: &Base,
        lower: u32,
        upper: Option<u32>,
    ) -> Result<FA, CompileError> {
        if let Some(upper) = upper {
            if lower > upper {
                return Err(CompileError::MalformedRange { lower, upper });
            }
        }

        let mut result: Option<FA> = None;
        for _ in 0..lower {
            let copy = self.walk_base(base)?;
            result = Some(match result {
                Some(acc) => self.concatenate(acc, copy)?,
                None => copy,
            });
        }
        match upper {
            Some(upper) => {
                for _ in lower..upper {
                    let copy = self.walk_base(base)?;
                    let optional = self.closure(copy, &Quantifier::Question)?;
                    result = Some(match result {
                        Some(acc) => self.concatenate(acc, optional)?,
                        None => optional,
                    });
                }
            }
            None => {
                let copy = self.walk_base(base)?;
                let tail = self.closure(copy, &Quantifier::Star)?;
                result = Some(match result {
                    Some(acc) => self.concatenate(acc, tail)?,
                    None => tail,
                });
            }
        }
        match result {
            Some(fa) => Ok(fa),
            // {0,0} and {,0} collapse to the empty string
            None => Ok(self.epsilon_construction()),
        }
    }

    fn walk_base(&mut self, tree: &Base) -> Result<FA, CompileError> {
        self.check_cancel()?;
        match tree {
            Base::Character(character) | Base::EscapeCharacter(character) => {
                let fa = self.literal_construction(*character);
                self.emit(StageTag::BasicChar, &fa);
                Ok(fa)
            }
            Base::Range(range) => {
                let fa = self.range_construction(*range);
                self.emit(StageTag::Range, &fa);
                Ok(fa)
            }
            Base::CharSet { negated, set } => {
                let fa = self.set_construction(*negated, set);
                self.emit(StageTag::BasicSet, &fa);
                Ok(fa)
            }
            // grouping contributes no structure of its own
            Base::Exp(inner) => self.walk_regex(inner),
        }
    }

    fn walk_factor(&mut self, tree: &Factor) -> Result<FA, CompileError> {
        self.check_cancel()?;
        let Factor::SimpleFactor(base, quantifier) = tree;
        match quantifier {
            None => self.walk_base(base),
            Some(quantifier @ (Quantifier::Star | Quantifier::Question | Quantifier::Plus)) => {
                let inner = self.walk_base(base)?;
                self.closure(inner, quantifier)
            }
            Some(Quantifier::LazyStar) => Err(CompileError::UnsupportedConstruct {
                rule: self.rule_name.clone(),
                construct: "non-greedy closure *?".to_string(),
            }),
            Some(Quantifier::LazyPlus) => Err(CompileError::UnsupportedConstruct {
                rule: self.rule_name.clone(),
                construct: "non-greedy closure +?".to_string(),
            }),
            Some(Quantifier::Exact(count)) => self.repeat(base, *count, Some(*count)),
            Some(Quantifier::Range(lower, upper)) => self.repeat(base, *lower, Some(*upper)),
            Some(Quantifier::Atleast(lower)) => self.repeat(base, *lower, None),
            Some(Quantifier::Atmost(upper)) => self.repeat(base, 0, Some(*upper)),
        }
    }

    fn walk_term(&mut self, tree: &Term) -> Result<FA, CompileError> {
        self.check_cancel()?;
        match tree {
            Term::SimpleTerm(factor) => self.walk_factor(factor),
            Term::ConcatTerm(rfactor, lterm) => {
                let left = self.walk_term(lterm)?;
                let right = self.walk_factor(rfactor)?;
                self.concatenate(left, right)
            }
        }
    }

    fn walk_regex(&mut self, tree: &RegEx) -> Result<FA, CompileError> {
        self.check_cancel()?;
        match tree {
            RegEx::SimpleRegex(term) => self.walk_term(term),
            RegEx::AlterRegex(lterm, rregex) => {
                let left = self.walk_term(lterm)?;
                let right = self.walk_regex(rregex)?;
                self.alternation(left, right)
            }
        }
    }
}

/// Build the NFA for one rule. States come back stamped with the rule
/// name and source line.
pub fn synthesize_rule(
    statement: &RegexpStatement,
    rule_index: usize,
    emit_steps: bool,
    sink: &mut dyn StageSink,
    cancel: &CancelToken,
) -> Result<FA, CompileError> {
    let mut synthesizer = Synthesizer {
        sink,
        cancel,
        emit_steps,
        rule_name: statement.name.clone(),
        rule_index,
    };
    let mut fa = synthesizer.walk_regex(&statement.regex)?;
    fa.set_prefix(&statement.name, Some(statement.line));
    fa.update_alphabet();
    fa.validate()?;
    Ok(fa)
}

/// Union a set of rule automata under a fresh start state joined by
/// epsilon edges. Accept states keep their per-rule tags, which is what
/// lets determinization attribute matches back to rules.
pub fn combine_rules(rule_fas: Vec<FA>, preserve_labels: bool) -> Result<FA, CompileError> {
    let mut result = FA::new();
    let start = result.add_state();
    result.set_start_state(start);
    for fa in rule_fas {
        let rule_start = fa.get_start_state();
        let offset = result.merge(fa, preserve_labels);
        result.add_transition(start, Symbol::Epsilon, rule_start + offset);
    }
    result.update_alphabet();
    result.validate()?;
    Ok(result)
}

#[cfg(test)]
mod nfa_tests {
    use super::*;
    use crate::pipeline::CancelToken;
    use crate::reg_ex::{parse_microsyntax_list, MicrosyntaxEntry};
    use crate::report::NullSink;

    fn synth(pattern: &str) -> Result<FA, CompileError> {
        let description =
            parse_microsyntax_list(vec![MicrosyntaxEntry::new(pattern, "T", 1)]).unwrap();
        synthesize_rule(
            &description.statements[0],
            0,
            false,
            &mut NullSink,
            &CancelToken::new(),
        )
    }

    fn assert_template_shape(fa: &FA) {
        let accept = single_accept(fa).unwrap();
        let start = fa.get_start_state();
        assert!(fa.get_state(accept).get_transitions().is_empty());
        for state in fa.states() {
            for (_, target) in state.get_transitions() {
                assert_ne!(*target, start, "edge into the start state");
            }
        }
    }

    fn epsilon_edge_count(fa: &FA) -> usize {
        fa.states()
            .iter()
            .flat_map(|state| state.get_transitions())
            .filter(|(symbol, _)| symbol.is_epsilon())
            .count()
    }

    #[test]
    fn test_literal_shape() {
        let fa = synth("a").unwrap();
        assert_eq!(fa.get_num_states(), 2);
        assert_template_shape(&fa);
        let transitions = fa.get_state(fa.get_start_state()).get_transitions();
        assert_eq!(transitions.len(), 1);
        match &transitions[0].0 {
            Symbol::Ranges(set) => assert!(set.contains('a')),
            Symbol::Epsilon => panic!("literal must not be epsilon"),
        }
    }

    #[test]
    fn test_alternation_shape() {
        let fa = synth("a|b").unwrap();
        assert_eq!(fa.get_num_states(), 6);
        assert_template_shape(&fa);
        assert_eq!(epsilon_edge_count(&fa), 4);
    }

    #[test]
    fn test_star_shape() {
        let fa = synth("a*").unwrap();
        assert_eq!(fa.get_num_states(), 4);
        assert_template_shape(&fa);
        // entry, skip, loop and exit
        assert_eq!(epsilon_edge_count(&fa), 4);
    }

    #[test]
    fn test_plus_has_no_skip_edge() {
        let fa = synth("a+").unwrap();
        assert_template_shape(&fa);
        assert_eq!(epsilon_edge_count(&fa), 3);
    }

    #[test]
    fn test_question_has_no_loop_edge() {
        let fa = synth("a?").unwrap();
        assert_template_shape(&fa);
        assert_eq!(epsilon_edge_count(&fa), 3);
    }

    #[test]
    fn test_bounded_repeat_unrolls() {
        let fa = synth("a{2,4}").unwrap();
        // two welded copies plus two optional-wrapped copies
        assert_eq!(fa.get_num_states(), 12);
        assert_template_shape(&fa);
    }

    #[test]
    fn test_class_keeps_single_edge() {
        let fa = synth("[a-zA-Z]").unwrap();
        assert_eq!(fa.get_num_states(), 2);
        let transitions = fa.get_state(fa.get_start_state()).get_transitions();
        assert_eq!(transitions.len(), 1);
    }

    #[test]
    fn test_rule_prefix_applied() {
        let fa = synth("ab").unwrap();
        for state in fa.states() {
            assert_eq!(state.get_prefix(), Some("T"));
            assert_eq!(state.get_line(), Some(1));
        }
    }

    #[test]
    fn test_lazy_closure_rejected() {
        match synth("a*?") {
            Err(CompileError::UnsupportedConstruct { rule, .. }) => assert_eq!(rule, "T"),
            other => panic!("Expected UnsupportedConstruct, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_class_has_no_accept_path() {
        let fa = synth("[]").unwrap();
        assert!(!fa.has_accept_path());
    }

    #[test]
    fn test_combine_keeps_rule_tags() {
        let first = synth("a").unwrap();
        let description =
            parse_microsyntax_list(vec![MicrosyntaxEntry::new("b", "U", 2)]).unwrap();
        let second = synthesize_rule(
            &description.statements[0],
            1,
            false,
            &mut NullSink,
            &CancelToken::new(),
        )
        .unwrap();
        let combined = combine_rules(vec![first, second], true).unwrap();
        assert_eq!(combined.get_num_states(), 5);
        let tags: Vec<usize> = combined
            .get_acceptor_states()
            .iter_ones()
            .map(|state| combined.get_accept_rule(state).unwrap())
            .collect();
        assert_eq!(tags, vec![0, 1]);
    }

    #[test]
    fn test_cancelled_synthesis() {
        let description =
            parse_microsyntax_list(vec![MicrosyntaxEntry::new("abc", "T", 1)]).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = synthesize_rule(
            &description.statements[0],
            0,
            false,
            &mut NullSink,
            &cancel,
        );
        assert!(matches!(result, Err(CompileError::Cancelled)));
    }
}
