/* Interactive rendering of an automaton. Accept states are captioned
 * with the category of their owning rule, and parallel edges between a
 * state pair collapse into one edge carrying every range label. */

use eframe::{run_native, App, CreationContext, NativeOptions};
use egui::Color32;
use egui_graphs::{Graph, GraphView, SettingsInteraction, SettingsNavigation, SettingsStyle};
use petgraph::{graph::NodeIndex, prelude::StableGraph};

use crate::fa::FA;

const START_COLOR: Color32 = Color32::from_rgb(176, 96, 16);
const ACCEPT_COLOR: Color32 = Color32::from_rgb(36, 120, 64);

struct Visualizer {
    graph: Graph,
    interaction: SettingsInteraction,
    navigation: SettingsNavigation,
    style: SettingsStyle,
}

impl Visualizer {
    fn new(_: &CreationContext<'_>, graph: Graph) -> Self {
        Visualizer {
            graph,
            interaction: SettingsInteraction::new()
                .with_dragging_enabled(true)
                .with_node_clicking_enabled(true)
                .with_node_selection_enabled(true),
            navigation: SettingsNavigation::new()
                .with_zoom_and_pan_enabled(true)
                .with_fit_to_screen_enabled(true),
            style: SettingsStyle::default().with_labels_always(true),
        }
    }
}

impl App for Visualizer {
    fn update(&mut self, ctx: &egui::Context, _: &mut eframe::Frame) {
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.add(
                &mut GraphView::new(&mut self.graph)
                    .with_styles(&self.style)
                    .with_interactions(&self.interaction)
                    .with_navigations(&self.navigation),
            );
        });
    }
}

fn node_caption(fa: &FA, rules: &[String], state_id: usize) -> String {
    let base = fa.get_state(state_id).label();
    match fa.get_accept_rule(state_id) {
        Some(rule) => match rules.get(rule) {
            Some(category) => format!("{} [{}]", base, category),
            None => format!("{} [rule {}]", base, rule),
        },
        None => base,
    }
}

fn generate_graph(fa: &FA, rules: &[String]) -> Graph {
    let mut stable_graph = StableGraph::new();
    for _ in 0..fa.get_num_states() {
        stable_graph.add_node(());
    }

    // collapse parallel edges up front so each state pair carries one
    // combined label
    let mut combined_edges: Vec<((usize, usize), String)> = Vec::new();
    for state in fa.states() {
        for (symbol, target) in state.get_transitions() {
            let key = (state.get_id(), *target);
            match combined_edges.iter_mut().find(|(pair, _)| *pair == key) {
                Some((_, label)) => {
                    label.push_str(", ");
                    label.push_str(&symbol.to_string());
                }
                None => combined_edges.push((key, symbol.to_string())),
            }
        }
    }
    let mut edge_indexes = Vec::with_capacity(combined_edges.len());
    for ((from, to), _) in &combined_edges {
        edge_indexes.push(stable_graph.add_edge(
            NodeIndex::new(*from),
            NodeIndex::new(*to),
            (),
        ));
    }

    let mut graph = Graph::from(&stable_graph);

    for state in fa.states() {
        let state_id = state.get_id();
        let node = graph.node_mut(NodeIndex::new(state_id)).unwrap();
        node.set_label(node_caption(fa, rules, state_id));
        if state_id == fa.get_start_state() {
            node.set_color(START_COLOR);
        } else if fa.is_accept_state(state_id) {
            node.set_color(ACCEPT_COLOR);
        }
    }

    for (edge_index, (_, label)) in edge_indexes.into_iter().zip(combined_edges) {
        graph.edge_mut(edge_index).unwrap().set_label(label);
    }

    graph
}

/// Opens a window rendering the automaton; `rules` supplies the
/// category names shown on accept states.
pub fn visualize(fa: &FA, rules: &[String]) {
    let title = format!("rangelex: {} states", fa.get_num_states());
    let graph = generate_graph(fa, rules);
    run_native(
        &title,
        NativeOptions::default(),
        Box::new(|cc| Ok(Box::new(Visualizer::new(cc, graph)))),
    )
    .unwrap();
}
