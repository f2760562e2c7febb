//! # rangelex
//!
//! A lexer generator library built around automata with character-range
//! transition labels, so classes like `[a-zA-Z0-9]` stay single edges
//! all the way through the pipeline.
//!
//! This library provides functionality to:
//! - Parse regular expression rule descriptions into syntax trees
//! - Convert rules to NFAs using Thompson Construction
//! - Convert NFAs to DFAs using Subset Construction over minterm classes
//! - Minimize DFAs using Hopcroft's Algorithm, preserving rule tags
//! - Scan and tokenize input based on the constructed automata
//! - Report every intermediate automaton through a pluggable sink
//! - Visualize the automata state machine

// Re-export the modules
pub mod char_set;
pub mod dfa;
pub mod fa;
pub mod nfa;
pub mod pipeline;
pub mod reg_ex;
pub mod report;
pub mod scanner;
pub mod table;
pub mod visualizer;

// Re-export commonly used functions for convenience
pub use dfa::{construct_dfa, construct_minimal_dfa};
pub use nfa::{combine_rules, synthesize_rule};
pub use pipeline::{generate, CancelToken, GenOptions, Generated};
pub use reg_ex::{parse_microsyntax_list, read_microsyntax_file};
pub use scanner::{construct_scanner, load_scanner};
pub use visualizer::visualize;
