//! # Dependency Graph
//!
//! [`DependencyGraph::compute()`] expands a set of root distributions into every distribution they transitively depend on.
//!
//! Once computed the graph is immutable and offers:
//! - The installation order, see [`topological_order()`](DependencyGraph::topological_order).
//! - A tree form for display, see [`tree()`](DependencyGraph::tree).
//! - Queries against the requirements recorded while expanding, see [`check_satisfies()`](DependencyGraph::check_satisfies)
//!   and [`query_pulled_in_by()`](DependencyGraph::query_pulled_in_by).
//! - Slot conflict detection, see [`find_slot_conflicts()`](DependencyGraph::find_slot_conflicts).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use petgraph::prelude::*;

use crate::package::Atom;
use crate::ports::{Distribution, PortsTree};

mod closure;

mod tree;
pub use tree::DependencyTree;
pub use tree::TreeNode;

mod slot_conflict;
pub use slot_conflict::SlotConflict;

/// A dependency atom as it was resolved while expanding the graph.
#[derive(Debug, Clone)]
pub struct Requirement {
	/// The atom as declared by `requested_by`.
	pub atom: Atom,
	/// Every distribution the ports tree returned for `atom`.
	pub matches: Vec<Arc<Distribution>>,
	/// The highest version in `matches`, the target of the edge.
	pub selected: Arc<Distribution>,
	pub requested_by: Arc<Distribution>,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
	/// Edges point from a dependent to its dependency and carry the declared atom.
	graph: StableDiGraph<Arc<Distribution>, Atom>,
	indices: HashMap<Arc<Distribution>, NodeIndex>,
	/// Nodes in the order they were discovered.
	discovered: Vec<NodeIndex>,
	roots: Vec<Arc<Distribution>>,
	/// Keyed by the `cat/pkg` of the required package.
	requirements: HashMap<String, Vec<Requirement>>,
	order: Vec<Arc<Distribution>>,
	tree: DependencyTree,
}

impl DependencyGraph {
	/// Computes the graph of `roots` and everything they depend on.
	///
	/// Each dependency atom is resolved with [`PortsTree::lookup_all()`] and the highest matching version becomes the dependency.
	///
	/// # Errors
	/// - [`EmptyInput`](crate::Error::EmptyInput) if `roots` is empty.
	/// - Any lookup error raised by `tree` for an unresolvable dependency.
	/// - [`CircularReference`](crate::Error::CircularReference) if a distribution ends up depending on itself.
	pub fn compute(roots: &[Arc<Distribution>], tree: &dyn PortsTree) -> crate::Result<DependencyGraph> {
		if roots.is_empty() {
			return Err(crate::Error::EmptyInput)
		}

		let mut graph = DependencyGraph {
			graph: Default::default(),
			indices: Default::default(),
			discovered: Default::default(),
			roots: Default::default(),
			requirements: Default::default(),
			order: Default::default(),
			tree: Default::default(),
		};

		let mut queue = VecDeque::<NodeIndex>::new();
		for root in roots {
			if graph.indices.contains_key(root) { continue; }
			graph.roots.push(root.clone());
			queue.push_back(graph.get_or_add_node(root));
		}

		/* Breadth first, every node is expanded exactly once */
		while let Some(src) = queue.pop_front() {
			let dist = graph.graph[src].clone();
			log::trace!("Expanding {}", dist);
			for atom in &dist.dependencies {
				let matches = tree.lookup_all(atom)?;
				let selected = matches.iter()
					.max_by(|a, b| a.version.cmp(&b.version))
					.cloned()
					.ok_or_else(|| crate::Error::DistributionNotFound { package: atom.full_name(), atom: atom.to_string() })?;
				log::trace!("  {} selects {} out of {} matches", atom, selected, matches.len());

				let is_new = !graph.indices.contains_key(&selected);
				let target = graph.get_or_add_node(&selected);
				if is_new {
					queue.push_back(target);
				}
				if graph.graph.find_edge(src, target).is_none() {
					graph.graph.add_edge(src, target, atom.clone());
				}

				graph.requirements.entry(selected.full_name()).or_default().push(Requirement {
					atom: atom.clone(),
					matches,
					selected,
					requested_by: dist.clone(),
				});
			}
		}

		closure::check_for_cycles(&graph)?;
		graph.order = closure::topological_sort(&graph);
		graph.tree = DependencyTree::build(&graph);

		log::debug!("Dependency graph of {} roots holds {} distributions", graph.roots.len(), graph.order.len());
		Ok(graph)
	}

	fn get_or_add_node(&mut self, dist: &Arc<Distribution>) -> NodeIndex {
		if let Some(i) = self.indices.get(dist) {
			return *i
		}
		let i = self.graph.add_node(dist.clone());
		self.indices.insert(dist.clone(), i);
		self.discovered.push(i);
		i
	}

	/// Direct dependencies of the node in declaration order.
	fn dependency_indices(&self, src: NodeIndex) -> Vec<NodeIndex> {
		/* petgraph walks edges newest first */
		let mut deps = self.graph.neighbors_directed(src, Outgoing).collect::<Vec<_>>();
		deps.reverse();
		deps
	}

	fn has_dependents(&self, src: NodeIndex) -> bool {
		self.graph.neighbors_directed(src, Incoming).next().is_some()
	}

	/// The distributions `compute()` was called with, without duplicates.
	pub fn roots(&self) -> &[Arc<Distribution>] {
		&self.roots
	}

	/// Every distribution in the graph, each dependency placed before its dependents.
	pub fn topological_order(&self) -> &[Arc<Distribution>] {
		&self.order
	}

	pub fn tree(&self) -> &DependencyTree {
		&self.tree
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}

	pub fn contains(&self, dist: &Distribution) -> bool {
		self.indices.contains_key(dist)
	}

	/// Direct dependencies of `dist`, `None` if it is not part of the graph.
	pub fn dependencies(&self, dist: &Distribution) -> Option<Vec<Arc<Distribution>>> {
		let i = self.indices.get(dist)?;
		Some(self.dependency_indices(*i).into_iter().map(|d| self.graph[d].clone()).collect())
	}

	/// Distributions depending directly on `dist`, `None` if it is not part of the graph.
	pub fn dependents(&self, dist: &Distribution) -> Option<Vec<Arc<Distribution>>> {
		let i = self.indices.get(dist)?;
		let mut dependents = self.graph.neighbors_directed(*i, Incoming).map(|d| self.graph[d].clone()).collect::<Vec<_>>();
		dependents.reverse();
		Some(dependents)
	}

	/// Requirements recorded against the package `cat/pkg`.
	pub fn requirements(&self, full_name: &str) -> Option<&[Requirement]> {
		self.requirements.get(full_name).map(|r| r.as_slice())
	}

	/// Requirements against the package named by `atom`, short names search every category.
	fn requirements_for(&self, atom: &Atom) -> Option<Vec<&Requirement>> {
		if atom.is_fully_qualified() {
			return self.requirements.get(&atom.full_name()).map(|r| r.iter().collect())
		}
		let suffix = format!("/{}", atom.package());
		let found = self.requirements.iter()
			.filter(|(name, _)| name.ends_with(&suffix))
			.flat_map(|(_, r)| r.iter())
			.collect::<Vec<_>>();
		if found.is_empty() { None } else { Some(found) }
	}

	/// Whether `atom` leaves every recorded requirement on its package satisfiable.
	///
	/// `None` when the package was never pulled in as a dependency.
	pub fn try_check_satisfies(&self, atom: &Atom) -> Option<bool> {
		let requirements = self.requirements_for(atom)?;
		Some(requirements.iter().all(|r| r.matches.iter().any(|d| atom.matches(&d.atom(), false))))
	}

	/// See [`try_check_satisfies()`](DependencyGraph::try_check_satisfies).
	///
	/// # Errors
	/// - [`PackageNotADependency`](crate::Error::PackageNotADependency) if the package was never pulled in as a dependency.
	pub fn check_satisfies(&self, atom: &Atom) -> crate::Result<bool> {
		self.try_check_satisfies(atom).ok_or_else(|| crate::Error::PackageNotADependency(atom.to_string()))
	}

	/// Distributions whose declared dependency matches `dist`, without duplicates.
	///
	/// `None` when the package of `dist` was never pulled in as a dependency.
	pub fn try_query_pulled_in_by(&self, dist: &Distribution) -> Option<Vec<Arc<Distribution>>> {
		let requirements = self.requirements.get(&dist.full_name())?;
		let atom = dist.atom();
		let mut seen = HashSet::<&Arc<Distribution>>::new();
		Some(requirements.iter()
			.filter(|r| r.atom.matches(&atom, false))
			.filter(|r| seen.insert(&r.requested_by))
			.map(|r| r.requested_by.clone())
			.collect()
		)
	}

	/// See [`try_query_pulled_in_by()`](DependencyGraph::try_query_pulled_in_by).
	///
	/// # Errors
	/// - [`PackageNotADependency`](crate::Error::PackageNotADependency) if the package was never pulled in as a dependency.
	pub fn query_pulled_in_by(&self, dist: &Distribution) -> crate::Result<Vec<Arc<Distribution>>> {
		self.try_query_pulled_in_by(dist).ok_or_else(|| crate::Error::PackageNotADependency(dist.to_string()))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::ports::InMemoryPortsTree;

	fn dist(atom: &str, deps: &[&str]) -> Distribution {
		let atom = Atom::parse(atom, crate::package::ParseMode::VersionRequired).unwrap();
		let mut dist = Distribution::new(atom.category().unwrap(), atom.package(), atom.version().unwrap().clone(), atom.slot());
		dist.dependencies = deps.iter().map(|d| d.parse().unwrap()).collect();
		dist
	}

	fn position(order: &[Arc<Distribution>], name: &str) -> usize {
		order.iter().position(|d| d.to_string() == name).unwrap()
	}

	#[test]
	fn compute_selects_highest_version() {
		let mut tree = InMemoryPortsTree::new();
		let foo = tree.add(dist("app/foo-1.0", &[">=lib/bar-1.0"]));
		tree.add(dist("lib/bar-1.0", &[]));
		tree.add(dist("lib/bar-2.0", &[]));

		let graph = DependencyGraph::compute(&[foo.clone()], &tree).unwrap();
		let order = graph.topological_order().iter().map(|d| d.to_string()).collect::<Vec<_>>();
		assert_eq!(order, vec!["lib/bar-2.0", "app/foo-1.0"]);
		assert_eq!(graph.dependencies(&foo).unwrap()[0].to_string(), "lib/bar-2.0");

		let requirement = &graph.requirements("lib/bar").unwrap()[0];
		assert_eq!(requirement.matches.len(), 2);
		assert_eq!(requirement.requested_by, foo);
	}

	#[test]
	fn compute_empty() {
		let tree = InMemoryPortsTree::new();
		assert!(matches!(DependencyGraph::compute(&[], &tree), Err(crate::Error::EmptyInput)));
	}

	#[test]
	fn compute_cycle() {
		let mut tree = InMemoryPortsTree::new();
		let a = tree.add(dist("dev/a-1.0", &["dev/b"]));
		tree.add(dist("dev/b-1.0", &["dev/a"]));

		match DependencyGraph::compute(&[a], &tree) {
			Err(crate::Error::CircularReference(node)) => assert!(node == "dev/a-1.0" || node == "dev/b-1.0"),
			other => panic!("expected a circular reference, got {:?}", other),
		}
	}

	#[test]
	fn compute_self_dependency() {
		let mut tree = InMemoryPortsTree::new();
		let a = tree.add(dist("dev/a-1.0", &["dev/a"]));
		assert!(matches!(DependencyGraph::compute(&[a], &tree), Err(crate::Error::CircularReference(_))));
	}

	#[test]
	fn compute_cycle_names_a_member() {
		let mut tree = InMemoryPortsTree::new();
		let a = tree.add(dist("dev/a-1.0", &["dev/b"]));
		tree.add(dist("dev/b-1.0", &["dev/c"]));
		tree.add(dist("dev/c-1.0", &["dev/d"]));
		tree.add(dist("dev/d-1.0", &["dev/c"]));

		/* a and b reach the cycle without being part of it */
		match DependencyGraph::compute(&[a], &tree) {
			Err(crate::Error::CircularReference(node)) => assert_eq!(node, "dev/c-1.0"),
			other => panic!("expected a circular reference, got {:?}", other),
		}
	}

	/// Adds `gen/p0` to `gen/p{count - 1}` where each `pN` depends on `pN+offset` for every offset in range.
	fn generated(tree: &mut InMemoryPortsTree, count: usize, offsets: &[usize]) -> Arc<Distribution> {
		let mut first = None;
		for i in 0..count {
			let deps = offsets.iter()
				.map(|o| i + o)
				.filter(|d| *d < count)
				.map(|d| format!("gen/p{}", d))
				.collect::<Vec<_>>();
			let deps = deps.iter().map(|d| d.as_str()).collect::<Vec<_>>();
			let added = tree.add(dist(&format!("gen/p{}-1.0", i), &deps));
			first.get_or_insert(added);
		}
		first.unwrap()
	}

	#[test]
	fn compute_large_graphs_in_time() {
		for offsets in [&[1][..], &[1, 7, 31][..]] {
			let mut tree = InMemoryPortsTree::new();
			let first = generated(&mut tree, 1500, offsets);

			let started = std::time::Instant::now();
			let graph = DependencyGraph::compute(&[first], &tree).unwrap();
			let elapsed = started.elapsed();

			assert_eq!(graph.len(), 1500);
			assert_eq!(graph.topological_order()[0].name, "p1499");
			assert_eq!(graph.topological_order()[1499].name, "p0");
			assert!(elapsed < std::time::Duration::from_secs(5), "computing {:?} took {:?}", offsets, elapsed);
		}
	}

	#[test]
	fn compute_missing_dependency() {
		let mut tree = InMemoryPortsTree::new();
		let a = tree.add(dist("dev/a-1.0", &["dev/missing"]));
		let b = tree.add(dist("dev/b-1.0", &[">=dev/a-2.0"]));
		assert!(matches!(DependencyGraph::compute(&[a], &tree), Err(crate::Error::PackageNotFound(_))));
		assert!(matches!(DependencyGraph::compute(&[b], &tree), Err(crate::Error::DistributionNotFound { .. })));
	}

	#[test]
	fn order_places_dependencies_first() {
		let mut tree = InMemoryPortsTree::new();
		let app = tree.add(dist("app/top-1.0", &["lib/mid", "lib/base", "lib/side"]));
		tree.add(dist("lib/mid-1.0", &["lib/base", "lib/leaf"]));
		tree.add(dist("lib/side-1.0", &["lib/leaf"]));
		tree.add(dist("lib/base-1.0", &["lib/leaf"]));
		tree.add(dist("lib/leaf-1.0", &[]));

		let graph = DependencyGraph::compute(&[app], &tree).unwrap();
		let order = graph.topological_order();
		assert_eq!(order.len(), 5);
		for dependent in order {
			for dependency in graph.dependencies(dependent).unwrap() {
				assert!(position(order, &dependency.to_string()) < position(order, &dependent.to_string()));
			}
		}
	}

	#[test]
	fn satisfies_and_pulled_in_by() {
		let mut tree = InMemoryPortsTree::new();
		let foo = tree.add(dist("app/foo-1.0", &[">=lib/bar-1.0"]));
		let baz = tree.add(dist("app/baz-1.0", &["<lib/bar-2.0"]));
		let bar1 = tree.add(dist("lib/bar-1.0", &[]));
		let bar2 = tree.add(dist("lib/bar-2.0", &[]));

		let graph = DependencyGraph::compute(&[foo.clone(), baz.clone()], &tree).unwrap();
		assert!(graph.contains(&bar1) && graph.contains(&bar2));
		assert!(graph.check_satisfies(&bar1.atom()).unwrap());
		assert!(!graph.check_satisfies(&bar2.atom()).unwrap());
		assert_eq!(graph.try_check_satisfies(&"bar".parse().unwrap()), Some(true));
		assert!(matches!(graph.check_satisfies(&foo.atom()), Err(crate::Error::PackageNotADependency(_))));

		assert_eq!(graph.query_pulled_in_by(&bar1).unwrap(), vec![foo.clone(), baz.clone()]);
		assert_eq!(graph.query_pulled_in_by(&bar2).unwrap(), vec![foo.clone()]);
		assert!(graph.try_query_pulled_in_by(&baz).is_none());
	}

	#[test]
	fn duplicate_roots_collapse() {
		let mut tree = InMemoryPortsTree::new();
		let foo = tree.add(dist("app/foo-1.0", &[]));
		let graph = DependencyGraph::compute(&[foo.clone(), foo.clone()], &tree).unwrap();
		assert_eq!(graph.roots().len(), 1);
		assert_eq!(graph.len(), 1);
	}
}
