use std::collections::HashSet;
use std::sync::Arc;

use super::DependencyGraph;
use crate::ports::Distribution;

/// A node of a [`DependencyTree`], children are indices into the same tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
	pub distribution: Arc<Distribution>,
	pub children: Vec<usize>,
}

/// The dependency graph folded into a forest for display.
///
/// Every distribution appears exactly once, shared dependencies hang off whichever dependent discovered them first.
/// Children of a node are in the order their dependencies are declared.
#[derive(Debug, Clone, Default)]
pub struct DependencyTree {
	nodes: Vec<TreeNode>,
	roots: Vec<usize>,
}

impl DependencyTree {
	/// Children are linked in discovery order, each under the first dependent that discovered it,
	/// while the arena itself is laid out in topological order.
	pub(super) fn build(graph: &DependencyGraph) -> DependencyTree {
		let mut tree = DependencyTree::default();

		/* One arena slot per distribution in installation order */
		let slots = graph.order.iter()
			.enumerate()
			.map(|(slot, dist)| (graph.indices[dist], slot))
			.collect::<std::collections::HashMap<_, _>>();
		tree.nodes = graph.order.iter()
			.map(|dist| TreeNode { distribution: dist.clone(), children: Vec::new() })
			.collect();

		/* Walk in discovery order so a shared dependency stays with the node that discovered it */
		let mut linked = HashSet::<usize>::new();
		for i in &graph.discovered {
			let slot = slots[i];
			for dep in graph.dependency_indices(*i) {
				let child = slots[&dep];
				if linked.insert(child) {
					tree.nodes[slot].children.push(child);
				}
			}
		}

		tree.roots = graph.discovered.iter()
			.filter(|i| !graph.has_dependents(**i))
			.map(|i| slots[i])
			.collect();

		tree
	}

	pub fn roots(&self) -> impl Iterator<Item = &TreeNode> {
		self.roots.iter().map(|i| &self.nodes[*i])
	}

	pub fn get(&self, index: usize) -> Option<&TreeNode> {
		self.nodes.get(index)
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Visits every node depth first, roots in discovery order, passing the depth of the node.
	pub fn walk(&self, mut visit: impl FnMut(usize, &TreeNode)) {
		let mut stack = self.roots.iter().rev().map(|i| (0usize, *i)).collect::<Vec<_>>();
		while let Some((depth, i)) = stack.pop() {
			let node = &self.nodes[i];
			visit(depth, node);
			stack.extend(node.children.iter().rev().map(|c| (depth + 1, *c)));
		}
	}
}

#[cfg(test)]
mod test {
	use crate::dependency_graph::DependencyGraph;
	use crate::ports::{Distribution, InMemoryPortsTree};

	fn dist(category: &str, name: &str, deps: &[&str]) -> Distribution {
		let mut dist = Distribution::new(category, name, "1.0".parse().unwrap(), 0);
		dist.dependencies = deps.iter().map(|d| d.parse().unwrap()).collect();
		dist
	}

	#[test]
	fn shared_dependency_linked_once() {
		let mut tree = InMemoryPortsTree::new();
		let a = tree.add(dist("app", "a", &["lib/b", "lib/c"]));
		tree.add(dist("lib", "b", &["lib/c"]));
		tree.add(dist("lib", "c", &[]));
		let other = tree.add(dist("app", "other", &["lib/c"]));

		let graph = DependencyGraph::compute(&[a, other], &tree).unwrap();
		let mut lines = Vec::new();
		graph.tree().walk(|depth, node| lines.push(format!("{}{}", " ".repeat(depth), node.distribution.name)));
		assert_eq!(lines, vec!["a", " b", " c", "other"]);
		assert_eq!(graph.tree().len(), 4);
	}

	#[test]
	fn children_follow_declaration_order() {
		let mut tree = InMemoryPortsTree::new();
		let a = tree.add(dist("app", "a", &["lib/z", "lib/b"]));
		tree.add(dist("lib", "z", &["lib/b"]));
		tree.add(dist("lib", "b", &[]));

		/* b is installed before z but was discovered by a */
		let graph = DependencyGraph::compute(&[a], &tree).unwrap();
		let order = graph.topological_order().iter().map(|d| d.name.clone()).collect::<Vec<_>>();
		assert_eq!(order, vec!["b", "z", "a"]);
		let mut lines = Vec::new();
		graph.tree().walk(|depth, node| lines.push(format!("{}{}", " ".repeat(depth), node.distribution.name)));
		assert_eq!(lines, vec!["a", " z", " b"]);
	}

	#[test]
	fn root_pulled_in_by_another_root_is_not_a_root() {
		let mut tree = InMemoryPortsTree::new();
		let a = tree.add(dist("app", "a", &["lib/b"]));
		let b = tree.add(dist("lib", "b", &[]));

		let graph = DependencyGraph::compute(&[b, a], &tree).unwrap();
		let roots = graph.tree().roots().map(|n| n.distribution.name.clone()).collect::<Vec<_>>();
		assert_eq!(roots, vec!["a"]);
	}
}
