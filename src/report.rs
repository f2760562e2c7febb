/* Stage reporting. The pipeline hands intermediate automata to a sink;
 * sinks render, accumulate or discard them. The core itself does no
 * I/O. */

use petgraph::dot::Dot;
use petgraph::graph::DiGraph;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use crate::fa::FA;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTag {
    BasicChar,
    BasicSet,
    Range,
    Concat,
    Alt,
    Closure,
    Merge,
    Subset,
    Hopcroft,
    Error,
}

impl StageTag {
    pub fn as_str(self) -> &'static str {
        match self {
            StageTag::BasicChar => "basic_char",
            StageTag::BasicSet => "basic_set",
            StageTag::Range => "range",
            StageTag::Concat => "concat",
            StageTag::Alt => "alt",
            StageTag::Closure => "closure",
            StageTag::Merge => "merge",
            StageTag::Subset => "subset",
            StageTag::Hopcroft => "hopcroft",
            StageTag::Error => "error",
        }
    }
}

impl fmt::Display for StageTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Receives automaton snapshots as the pipeline runs. The snapshot is
/// only valid for the duration of the call; a sink that wants to keep
/// it must clone.
pub trait StageSink {
    fn emit(&mut self, stage: StageTag, fa: &FA, key: &str);
}

/// Discards everything.
pub struct NullSink;

impl StageSink for NullSink {
    fn emit(&mut self, _stage: StageTag, _fa: &FA, _key: &str) {}
}

/// Records `(stage, key, state count)` triples; used by tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub stages: Vec<(StageTag, String, usize)>,
}

impl StageSink for RecordingSink {
    fn emit(&mut self, stage: StageTag, fa: &FA, key: &str) {
        self.stages.push((stage, key.to_string(), fa.get_num_states()));
    }
}

/// Writes GraphViz artefacts, one `.dot` file per snapshot or all
/// snapshots appended into a single file.
pub struct DotSink {
    directory: PathBuf,
    combine: bool,
    render: bool,
    sequence: usize,
}

impl DotSink {
    pub fn new(directory: impl Into<PathBuf>, combine: bool, render: bool) -> Self {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).expect("Failed to create artefact directory");
        DotSink {
            directory,
            combine,
            render,
            sequence: 0,
        }
    }

    fn dot_of(fa: &FA) -> String {
        let mut graph = DiGraph::new();
        let mut node_map = std::collections::HashMap::new();

        // Add nodes
        for state in fa.states() {
            let node = graph.add_node(state.label());
            node_map.insert(state.get_id(), node);
        }

        // Add edges
        for state in fa.states() {
            for (symbol, target) in state.get_transitions() {
                graph.add_edge(node_map[&state.get_id()], node_map[target], symbol.to_string());
            }
        }

        // Mark Start and Accept States

        let start_node = node_map[&fa.get_start_state()];
        graph[start_node] = format!("Start\n{}", graph[start_node]);

        for accept in fa.get_acceptor_states().iter_ones() {
            let accept_node = node_map[&accept];
            let rule = fa.get_accept_rule(accept);
            graph[accept_node] = match rule {
                Some(rule) => format!("{}\nAccept({})", graph[accept_node], rule),
                None => format!("{}\nAccept", graph[accept_node]),
            };
        }

        Dot::new(&graph).to_string()
    }

    fn render_jpg(&self, dot_filename: &str, base: &str) {
        Command::new("dot")
            .args(["-Tjpg", dot_filename, "-o", &format!("{}.jpg", base)])
            .output()
            .expect("Failed to execute Graphviz");
    }
}

impl StageSink for DotSink {
    fn emit(&mut self, stage: StageTag, fa: &FA, key: &str) {
        let dot = Self::dot_of(fa);
        if self.combine {
            let path = self.directory.join("combined.dot");
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .expect("Failed to open combined dot file");
            writeln!(file, "// step {} stage {} key {}", self.sequence, stage, key)
                .and_then(|_| file.write_all(dot.as_bytes()))
                .expect("Failed to write combined dot file");
        } else {
            let base = self
                .directory
                .join(format!("{}_{:03}_{}", key, self.sequence, stage));
            let base = base.to_string_lossy().to_string();
            let dot_filename = format!("{}.dot", base);
            let mut dot_file = File::create(&dot_filename).expect("Failed to create dot file");
            dot_file
                .write_all(dot.as_bytes())
                .expect("Failed to write dot file");
            if self.render {
                self.render_jpg(&dot_filename, &base);
            }
        }
        self.sequence += 1;
    }
}

#[cfg(test)]
mod report_tests {
    use super::*;
    use crate::fa::Symbol;

    #[test]
    fn test_stage_tag_names() {
        assert_eq!(StageTag::BasicChar.as_str(), "basic_char");
        assert_eq!(StageTag::Hopcroft.as_str(), "hopcroft");
        assert_eq!(StageTag::Error.to_string(), "error");
    }

    #[test]
    fn test_dot_contains_labels() {
        let mut fa = FA::new();
        let start = fa.add_state();
        let end = fa.add_state();
        fa.add_transition(start, Symbol::from_char('a'), end);
        fa.set_start_state(start);
        fa.set_accept_state(end, 0);
        fa.set_prefix("ident", None);
        let dot = DotSink::dot_of(&fa);
        assert!(dot.contains("ident_0"));
        assert!(dot.contains("Accept(0)"));
        assert!(dot.contains("Start"));
    }

    #[test]
    fn test_recording_sink() {
        let mut sink = RecordingSink::default();
        let mut fa = FA::new();
        let only = fa.add_state();
        fa.set_start_state(only);
        sink.emit(StageTag::Merge, &fa, "lexer");
        assert_eq!(sink.stages, vec![(StageTag::Merge, "lexer".to_string(), 1)]);
    }
}
