/* The serializable form of a generated automaton: plain nodes, edges
 * with range-set labels, the start id and the rule names in
 * declaration order. */

use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::char_set::CharRangeSet;
use crate::fa::{Symbol, FA};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableNode {
    pub id: usize,
    pub accept: bool,
    pub rule: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEdge {
    pub from: usize,
    pub to: usize,
    pub label: CharRangeSet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DfaTable {
    pub nodes: Vec<TableNode>,
    pub edges: Vec<TableEdge>,
    pub start: usize,
    pub rules: Vec<String>,
}

impl DfaTable {
    pub fn from_fa(fa: &FA, rules: Vec<String>) -> Self {
        let mut nodes = Vec::with_capacity(fa.get_num_states());
        let mut edges = Vec::new();
        for state in fa.states() {
            let id = state.get_id();
            nodes.push(TableNode {
                id,
                accept: fa.is_accept_state(id),
                rule: fa.get_accept_rule(id),
            });
            for (symbol, target) in state.get_transitions() {
                if let Symbol::Ranges(label) = symbol {
                    edges.push(TableEdge {
                        from: id,
                        to: *target,
                        label: label.clone(),
                    });
                }
            }
        }
        DfaTable {
            nodes,
            edges,
            start: fa.get_start_state(),
            rules,
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let table = serde_json::from_reader(BufReader::new(file))?;
        Ok(table)
    }
}

#[cfg(test)]
mod table_tests {
    use super::*;
    use crate::char_set::CharRange;

    fn sample_fa() -> FA {
        let mut fa = FA::new();
        let start = fa.add_state();
        let end = fa.add_state();
        let digits = CharRange::new('0', '9').unwrap();
        fa.add_transition(start, Symbol::from_range(digits), end);
        fa.add_transition(end, Symbol::from_range(digits), end);
        fa.set_start_state(start);
        fa.set_accept_state(end, 0);
        fa
    }

    #[test]
    fn test_from_fa() {
        let table = DfaTable::from_fa(&sample_fa(), vec!["INT".to_string()]);
        assert_eq!(table.start, 0);
        assert_eq!(table.nodes.len(), 2);
        assert!(!table.nodes[0].accept);
        assert_eq!(table.nodes[1].rule, Some(0));
        assert_eq!(table.edges.len(), 2);
        assert!(table.edges[0].label.contains('7'));
        assert_eq!(table.rules, vec!["INT"]);
    }

    #[test]
    fn test_save_load_round_trip() {
        let table = DfaTable::from_fa(&sample_fa(), vec!["INT".to_string()]);
        let path = std::env::temp_dir().join("rangelex_table_test.json");
        table.save(&path).unwrap();
        let loaded = DfaTable::load(&path).unwrap();
        assert_eq!(table, loaded);
        let _ = std::fs::remove_file(path);
    }
}
