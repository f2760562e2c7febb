/* Maximal munch table scanner. The minimal DFA is flattened into a
 * classifier table (character range to input class) and a compressed
 * state-by-class transition matrix; scanning keeps the longest match
 * and classifies it by the accept state's rule. */

use color_eyre::eyre::{Report, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::char_set::minterms;
use crate::fa::{Symbol, FA};

#[derive(Debug)]
pub enum ScanError {
    FileOpen(String),
    UnrecognizedToken { line: usize, ch: char },
    EmptyMatch { line: usize },
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::FileOpen(err_line) => write!(f, "{}", err_line),
            ScanError::UnrecognizedToken { line, ch } => {
                write!(f, "Error: Unrecognized character {:?} on line {}", ch, line)
            }
            ScanError::EmptyMatch { line } => {
                write!(f, "Error: Empty match on line {}, scanning cannot advance", line)
            }
        }
    }
}

impl std::error::Error for ScanError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    token: String,
    category: String,
    position: usize,
    line: usize,
}

impl Token {
    pub fn get_token(&self) -> &str {
        &self.token
    }

    pub fn get_category(&self) -> &str {
        &self.category
    }

    pub fn get_position(&self) -> usize {
        self.position
    }

    pub fn get_line(&self) -> usize {
        self.line
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct Scanner {
    /// Sorted `(min, max, class)` rows; lookup is a binary search.
    classifier_table: Vec<(char, char, usize)>,
    /// One row per state, one column per input class; `dead_state`
    /// marks the missing transitions.
    transition_table: Vec<Vec<usize>>,
    /// Rule index per accept state.
    token_type_table: Vec<Option<usize>>,
    start_state: usize,
    dead_state: usize,
    categories: Vec<String>,
}

impl Scanner {
    fn classify(&self, ch: char) -> Option<usize> {
        self.classifier_table
            .binary_search_by(|(min, max, _)| {
                if ch < *min {
                    std::cmp::Ordering::Greater
                } else if ch > *max {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()
            .map(|index| self.classifier_table[index].2)
    }

    /// Tokenize the whole input. Categories on the skip list are
    /// matched and dropped.
    pub fn scan(
        &self,
        source: &str,
        skip_list: Option<&[String]>,
    ) -> Result<Vec<Token>, ScanError> {
        let chars: Vec<char> = source.chars().collect();
        let mut tokens = Vec::new();
        let mut position = 0;
        let mut line = 1;

        while position < chars.len() {
            let mut state = self.start_state;
            let mut cursor = position;
            let mut last_accept: Option<(usize, usize)> = None;
            if let Some(rule) = self.token_type_table[state] {
                last_accept = Some((cursor, rule));
            }
            while cursor < chars.len() {
                let class = match self.classify(chars[cursor]) {
                    Some(class) => class,
                    None => break,
                };
                let next = self.transition_table[state][class];
                if next == self.dead_state {
                    break;
                }
                state = next;
                cursor += 1;
                if let Some(rule) = self.token_type_table[state] {
                    last_accept = Some((cursor, rule));
                }
            }
            match last_accept {
                Some((end, rule)) if end > position => {
                    let lexeme: String = chars[position..end].iter().collect();
                    let newlines = lexeme.matches('\n').count();
                    let category = &self.categories[rule];
                    let keep = skip_list.map_or(true, |skip| !skip.iter().any(|s| s == category));
                    if keep {
                        tokens.push(Token {
                            token: lexeme,
                            category: category.clone(),
                            position,
                            line,
                        });
                    }
                    line += newlines;
                    position = end;
                }
                Some(_) => return Err(ScanError::EmptyMatch { line }),
                None => {
                    return Err(ScanError::UnrecognizedToken {
                        line,
                        ch: chars[position],
                    })
                }
            }
        }
        Ok(tokens)
    }

    pub fn scan_file(
        &self,
        file_path: &str,
        skip_list: Option<&[String]>,
    ) -> Result<Vec<Token>> {
        let source = fs::read_to_string(file_path).map_err(|error| {
            let err_line = format!("Error: Failed to open the source file {}", error);
            Report::new(ScanError::FileOpen(err_line))
        })?;
        self.scan(&source, skip_list).map_err(Report::new)
    }

    pub fn save_scanner(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}

/// Flatten a deterministic automaton into scanning tables.
pub fn construct_scanner(dfa: &FA, categories: Vec<String>) -> Scanner {
    let classes = minterms(&dfa.edge_labels());
    let num_states = dfa.get_num_states();
    let dead_state = num_states;

    let mut classifier_table = Vec::new();
    for (class_id, class) in classes.iter().enumerate() {
        for range in class.ranges() {
            classifier_table.push((range.min(), range.max(), class_id));
        }
    }
    classifier_table.sort();

    let mut transition_table = vec![vec![dead_state; classes.len()]; num_states];
    for state in dfa.states() {
        for (symbol, target) in state.get_transitions() {
            if let Symbol::Ranges(set) = symbol {
                for (class_id, class) in classes.iter().enumerate() {
                    let representative = match class.first() {
                        Some(representative) => representative,
                        None => continue,
                    };
                    if set.contains(representative) {
                        transition_table[state.get_id()][class_id] = *target;
                    }
                }
            }
        }
    }

    let token_type_table = (0..num_states)
        .map(|state_id| dfa.get_accept_rule(state_id))
        .collect();

    Scanner {
        classifier_table,
        transition_table,
        token_type_table,
        start_state: dfa.get_start_state(),
        dead_state,
        categories,
    }
}

pub fn load_scanner(path: impl AsRef<Path>) -> Result<Scanner> {
    let file = fs::File::open(path)?;
    let scanner = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok(scanner)
}

#[cfg(test)]
mod scanner_tests {
    use super::*;
    use crate::pipeline::{generate, CancelToken, GenOptions};
    use crate::reg_ex::{parse_microsyntax_list, MicrosyntaxEntry};
    use crate::report::NullSink;

    fn scanner_for(rules: &[(&str, &str)]) -> Scanner {
        let entries = rules
            .iter()
            .enumerate()
            .map(|(index, (pattern, category))| MicrosyntaxEntry::new(pattern, category, index + 1))
            .collect();
        let description = parse_microsyntax_list(entries).unwrap();
        let generated = generate(
            &description,
            &GenOptions::default(),
            &mut NullSink,
            &CancelToken::new(),
        )
        .unwrap();
        construct_scanner(&generated.minimal_dfa, generated.table.rules.clone())
    }

    #[test]
    fn test_maximal_munch() {
        let scanner = scanner_for(&[("[0-9]+", "INT"), ("\\+", "PLUS")]);
        let tokens = scanner.scan("12+345", None).unwrap();
        let rendered: Vec<(&str, &str)> = tokens
            .iter()
            .map(|token| (token.get_token(), token.get_category()))
            .collect();
        assert_eq!(
            rendered,
            vec![("12", "INT"), ("+", "PLUS"), ("345", "INT")]
        );
        assert_eq!(tokens[2].get_position(), 3);
    }

    #[test]
    fn test_keyword_beats_identifier() {
        let scanner = scanner_for(&[("if", "KW"), ("[a-z]+", "ID"), ("[ ]+", "WS")]);
        let tokens = scanner.scan("if ifs", None).unwrap();
        let categories: Vec<&str> = tokens.iter().map(Token::get_category).collect();
        assert_eq!(categories, vec!["KW", "WS", "ID"]);
    }

    #[test]
    fn test_skip_list() {
        let scanner = scanner_for(&[("[a-z]+", "ID"), ("[ \\t\\n]+", "WS")]);
        let skip = vec!["WS".to_string()];
        let tokens = scanner.scan("foo bar\nbaz", Some(&skip)).unwrap();
        let rendered: Vec<&str> = tokens.iter().map(Token::get_token).collect();
        assert_eq!(rendered, vec!["foo", "bar", "baz"]);
        assert_eq!(tokens[2].get_line(), 2);
    }

    #[test]
    fn test_unrecognized_character() {
        let scanner = scanner_for(&[("[a-z]+", "ID")]);
        let result = scanner.scan("abc!", None);
        match result {
            Err(ScanError::UnrecognizedToken { line: 1, ch: '!' }) => {}
            other => panic!("Expected UnrecognizedToken, got {:?}", other),
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let scanner = scanner_for(&[("[0-9]+", "INT")]);
        let path = std::env::temp_dir().join("rangelex_scanner_test.scn");
        scanner.save_scanner(&path).unwrap();
        let loaded = load_scanner(&path).unwrap();
        assert_eq!(scanner, loaded);
        let tokens = loaded.scan("007", None).unwrap();
        assert_eq!(tokens[0].get_token(), "007");
        let _ = std::fs::remove_file(path);
    }
}
