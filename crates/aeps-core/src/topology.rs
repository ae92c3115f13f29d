//! Graph-level diagnostics over the component catalog.
//!
//! The solver walks the catalog's port lists directly; this module answers
//! the coarser questions: which components form electrically contiguous
//! islands (ignoring tie/breaker state), and what does the as-built layout
//! look like as a Graphviz rendering.

use std::collections::HashMap;
use std::fmt::Write as _;

use anyhow::{bail, Result};
use petgraph::graph::{Graph, NodeIndex};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use petgraph::Undirected;

use crate::{DeviceKind, Network};

/// One electrically contiguous group of components.
#[derive(Debug)]
pub struct IslandSummary {
    pub island_id: usize,
    pub comp_count: usize,
}

/// Which island a given component landed in.
#[derive(Debug)]
pub struct NodeAssignment {
    pub comp_name: String,
    pub island_id: usize,
}

/// Result of [`find_islands`].
#[derive(Debug)]
pub struct IslandAnalysis {
    pub islands: Vec<IslandSummary>,
    pub assignments: Vec<NodeAssignment>,
}

/// Build an undirected petgraph view: one node per component, one edge per
/// port link. Tie and breaker states are ignored; this is the as-built
/// topology.
pub fn as_graph(network: &Network) -> Graph<String, (), Undirected> {
    let mut graph = Graph::new_undirected();
    let indices: Vec<NodeIndex> = network
        .comps()
        .map(|c| graph.add_node(c.name.clone()))
        .collect();

    // Buses list their devices and devices list their buses; adding edges
    // from the bus side only avoids duplicates.
    for comp in network.comps() {
        if matches!(comp.kind, DeviceKind::Bus(_)) {
            for &dev in &comp.ports {
                graph.add_edge(indices[comp.id.value()], indices[dev.value()], ());
            }
        }
    }
    graph
}

/// Partition the as-built topology into islands.
///
/// Runs a union-find over the port edges; island numbering follows the
/// lowest component index each group contains, so the result is stable
/// across runs.
pub fn find_islands(network: &Network) -> Result<IslandAnalysis> {
    let graph = as_graph(network);
    let mut sets: UnionFind<usize> = UnionFind::new(graph.node_count());
    for edge in graph.edge_references() {
        sets.union(edge.source().index(), edge.target().index());
    }
    let labels = sets.into_labeling();

    let mut id_by_root: HashMap<usize, usize> = HashMap::new();
    let mut islands: Vec<IslandSummary> = Vec::new();
    let mut assignments = Vec::with_capacity(labels.len());
    for (node, &root) in labels.iter().enumerate() {
        let fresh = islands.len();
        let island_id = *id_by_root.entry(root).or_insert(fresh);
        if island_id == islands.len() {
            islands.push(IslandSummary {
                island_id,
                comp_count: 0,
            });
        }
        islands[island_id].comp_count += 1;
        assignments.push(NodeAssignment {
            comp_name: graph[NodeIndex::new(node)].clone(),
            island_id,
        });
    }
    assignments.sort_by(|a, b| a.comp_name.cmp(&b.comp_name));
    Ok(IslandAnalysis {
        islands,
        assignments,
    })
}

/// Render the topology for external tooling. Only Graphviz DOT is spoken.
pub fn export_graph(network: &Network, format: &str) -> Result<String> {
    if !format.eq_ignore_ascii_case("dot") && !format.eq_ignore_ascii_case("graphviz") {
        bail!("graph export format '{}' is not supported (try \"dot\")", format);
    }
    Ok(render_dot(network))
}

/// Component names double as the DOT node ids (quoted), with the kind tag
/// in the label; edges are emitted from the bus side straight off the
/// catalog, one line per port.
fn render_dot(network: &Network) -> String {
    let mut dot = String::from("graph aeps {\n");
    for comp in network.comps() {
        let _ = writeln!(
            dot,
            "  {} [label={}];",
            quoted(&comp.name),
            quoted(&format!("{} ({})", comp.name, comp.kind.tag()))
        );
    }
    for comp in network.comps() {
        if matches!(comp.kind, DeviceKind::Bus(_)) {
            for &dev in &comp.ports {
                let _ = writeln!(
                    dot,
                    "  {} -- {};",
                    quoted(&comp.name),
                    quoted(&network.comp(dev).name)
                );
            }
        }
    }
    dot.push('}');
    dot
}

/// Wrap `text` in DOT double quotes, escaping embedded quotes and
/// backslashes.
fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        if matches!(ch, '"' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}
