//! Cycle detection and ordering over a computed relation table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::prelude::*;

use super::DependencyGraph;
use crate::ports::Distribution;

/// Fails on the first node, in discovery order, that lies inside its own transitive closure.
///
/// A node reaches itself exactly when its strongly connected component holds more than one node,
/// or when it depends on itself directly.
pub(super) fn check_for_cycles(graph: &DependencyGraph) -> crate::Result<()> {
	let cyclic = petgraph::algo::tarjan_scc(&graph.graph)
		.into_iter()
		.filter(|component| component.len() > 1 || graph.graph.find_edge(component[0], component[0]).is_some())
		.flatten()
		.collect::<HashSet<NodeIndex>>();

	match graph.discovered.iter().find(|i| cyclic.contains(*i)) {
		Some(i) => {
			log::debug!("{} is part of a dependency cycle", graph.graph[*i]);
			Err(crate::Error::CircularReference(graph.graph[*i].to_string()))
		},
		None => Ok(()),
	}
}

/// Orders the graph so every dependency comes before its dependents.
///
/// Nodes without dependencies come first, then each pass takes every node whose dependencies are all placed.
/// Within a pass nodes keep their discovery order.
///
/// # Panics
/// If a pass makes no progress, which can only happen on a cyclic graph.
pub(super) fn topological_sort(graph: &DependencyGraph) -> Vec<Arc<Distribution>> {
	let position = graph.discovered.iter()
		.enumerate()
		.map(|(p, i)| (*i, p))
		.collect::<HashMap<NodeIndex, usize>>();
	let mut remaining = graph.discovered.iter()
		.map(|i| (*i, graph.graph.neighbors_directed(*i, Outgoing).count()))
		.collect::<HashMap<NodeIndex, usize>>();

	let mut order = Vec::<NodeIndex>::with_capacity(graph.discovered.len());
	let mut ready = graph.discovered.iter()
		.filter(|i| remaining[*i] == 0)
		.copied()
		.collect::<Vec<_>>();

	while !ready.is_empty() {
		/* Strip the edges pointing into this pass */
		let mut next = Vec::<NodeIndex>::new();
		for i in &ready {
			for dependent in graph.graph.neighbors_directed(*i, Incoming) {
				if let Some(count) = remaining.get_mut(&dependent) {
					*count -= 1;
					if *count == 0 {
						next.push(dependent);
					}
				}
			}
		}
		next.sort_unstable_by_key(|i| position[i]);
		order.append(&mut ready);
		ready = next;
	}

	if order.len() < graph.discovered.len() {
		unreachable!("topological sort stalled with {} of {} nodes placed", order.len(), graph.discovered.len());
	}

	order.into_iter().map(|i| graph.graph[i].clone()).collect()
}
