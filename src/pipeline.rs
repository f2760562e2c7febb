/* The pipeline driver. Runs synthesis, subset construction and
 * minimization over a rule set in one of two shapes: flatten combines
 * every rule NFA first and determinizes once; structured minimizes each
 * rule on its own and then combines and determinizes the results.
 * Rules that cannot be compiled are reported and skipped; invariant
 * violations abort the run. */

use color_eyre::eyre::{eyre, Report, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::dfa::{construct_dfa, construct_minimal_dfa};
use crate::fa::{CompileError, FA};
use crate::nfa::{combine_rules, synthesize_rule};
use crate::reg_ex::LexerDescription;
use crate::report::{StageSink, StageTag};
use crate::table::DfaTable;

/// Key under which whole-rule-set artefacts reach the sink.
const COMBINED_KEY: &str = "lexer";

#[derive(Debug, Clone, Copy, Default)]
pub struct GenOptions {
    /// Hand every intermediate construction step to the sink.
    pub emit_steps: bool,
    /// Keep per-rule provenance labels across merges.
    pub propagate_labels: bool,
    /// Ask the sink to aggregate snapshots into one artefact.
    pub combine_graphs: bool,
    /// Minimize per rule before combining.
    pub structured: bool,
}

/// Shared flag a host may set to interrupt generation between steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// A rule the run reported and carried on without.
#[derive(Debug)]
pub struct SkippedRule {
    pub name: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct Generated {
    pub minimal_dfa: FA,
    pub table: DfaTable,
    pub skipped: Vec<SkippedRule>,
}

fn synthesize_surviving_rules(
    description: &LexerDescription,
    options: &GenOptions,
    sink: &mut dyn StageSink,
    cancel: &CancelToken,
) -> Result<(Vec<(String, FA)>, Vec<SkippedRule>)> {
    let mut rule_fas = Vec::new();
    let mut skipped = Vec::new();

    for (index, statement) in description.statements.iter().enumerate() {
        match synthesize_rule(statement, index, options.emit_steps, sink, cancel) {
            Ok(fa) => {
                if fa.has_accept_path() {
                    rule_fas.push((statement.name.clone(), fa));
                } else {
                    // a warning, not a failure: report with the partial
                    // automaton and move on
                    sink.emit(StageTag::Error, &fa, &statement.name);
                    let warning = CompileError::EmptyLanguage(statement.name.clone());
                    skipped.push(SkippedRule {
                        name: statement.name.clone(),
                        reason: warning.to_string(),
                    });
                }
            }
            Err(error) if error.is_skippable() => {
                skipped.push(SkippedRule {
                    name: statement.name.clone(),
                    reason: error.to_string(),
                });
            }
            Err(error) => return Err(Report::new(error)),
        }
    }
    Ok((rule_fas, skipped))
}

fn determinize_and_minimize(
    nfa: &FA,
    key: &str,
    options: &GenOptions,
    sink: &mut dyn StageSink,
    cancel: &CancelToken,
) -> Result<FA> {
    let mut dfa = construct_dfa(nfa, cancel).map_err(Report::new)?;
    dfa.set_prefix(key, None);
    if options.emit_steps {
        sink.emit(StageTag::Subset, &dfa, key);
    }
    let mut minimal = construct_minimal_dfa(&dfa, cancel).map_err(Report::new)?;
    minimal.set_prefix(key, None);
    if options.emit_steps {
        sink.emit(StageTag::Hopcroft, &minimal, key);
    }
    Ok(minimal)
}

/// Run the whole pipeline over a rule description.
pub fn generate(
    description: &LexerDescription,
    options: &GenOptions,
    sink: &mut dyn StageSink,
    cancel: &CancelToken,
) -> Result<Generated> {
    let (rule_fas, skipped) = synthesize_surviving_rules(description, options, sink, cancel)?;
    if rule_fas.is_empty() {
        return Err(eyre!("no rule in the description produced a usable automaton"));
    }

    let combined = if options.structured {
        let mut minimal_rules = Vec::new();
        for (name, fa) in rule_fas {
            minimal_rules.push(determinize_and_minimize(&fa, &name, options, sink, cancel)?);
        }
        combine_rules(minimal_rules, options.propagate_labels).map_err(Report::new)?
    } else {
        let fas = rule_fas.into_iter().map(|(_, fa)| fa).collect();
        combine_rules(fas, options.propagate_labels).map_err(Report::new)?
    };
    if options.emit_steps {
        sink.emit(StageTag::Merge, &combined, COMBINED_KEY);
    }

    let minimal_dfa = determinize_and_minimize(&combined, COMBINED_KEY, options, sink, cancel)?;

    let table = DfaTable::from_fa(&minimal_dfa, description.rule_names());
    Ok(Generated {
        minimal_dfa,
        table,
        skipped,
    })
}
