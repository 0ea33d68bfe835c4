//! # Merge
//!
//! Turning the user's atoms into installed packages.
//!
//! 1. [`resolve_targets()`] picks the distribution for each requested atom.
//! 1. [`build_schedule()`] computes what has to happen to each distribution in the dependency graph.
//! 1. [`MergeWorker`] downloads and installs the schedule in order.
//!
//! [`UnmergePlan`] and [`UnmergeWorker`] do the same for removals.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::package::{Atom, Operator};
use crate::package_state::PackageState;
use crate::ports::{Distribution, PortsTree};

mod scheduler;
pub use scheduler::MergeFlag;
pub use scheduler::MergeFlags;
pub use scheduler::MergeItem;
pub use scheduler::MergeSchedule;
pub use scheduler::ScheduleTotals;
pub use scheduler::classify;
pub use scheduler::build_schedule;

mod worker;
pub use worker::MergeWorker;
pub use worker::MergeEvent;

mod unmerge;
pub use unmerge::UnmergePlan;
pub use unmerge::UnmergeWorker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
	/// Only compute and report the schedule.
	pub pretend: bool,
	/// Don't add the selected packages to the world set.
	pub oneshot: bool,
	/// Don't reinstall selected packages that are already installed at the same version.
	pub no_replace: bool,
	/// Treat every distribution as if nothing were installed.
	pub empty_tree: bool,
	/// Download but don't install.
	pub fetch_only: bool,
	/// Also update dependencies that are installed and still satisfy their dependents.
	pub deep: bool,
	/// Exact versions that no longer exist are skipped instead of failing.
	pub update: bool,
}

/// Shared flag for stopping a merge between two schedule items.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

fn is_exact(atom: &Atom) -> bool {
	atom.operator() == Some(Operator::Equal) && atom.version().is_some()
}

/// Picks the highest matching distribution for each atom, without duplicates.
///
/// # Errors
/// Any lookup error from `tree`. In [`update`](MergeOptions::update) mode an exact version atom
/// that fails with [`PackageNotFound`](crate::Error::PackageNotFound) or [`DistributionNotFound`](crate::Error::DistributionNotFound)
/// is skipped instead.
pub fn resolve_targets(tree: &dyn PortsTree, atoms: &[Atom], options: &MergeOptions) -> crate::Result<Vec<Arc<Distribution>>> {
	let mut targets = Vec::<Arc<Distribution>>::with_capacity(atoms.len());
	for atom in atoms {
		match tree.best_match(atom) {
			Ok(dist) => {
				if !targets.contains(&dist) {
					targets.push(dist);
				}
			},
			Err(e @ (crate::Error::PackageNotFound(_) | crate::Error::DistributionNotFound { .. })) if options.update && is_exact(atom) => {
				log::warn!("Skipping {}: {}", atom, e);
			},
			Err(e) => return Err(e),
		}
	}
	Ok(targets)
}

/// The world set as merge targets.
pub fn world_targets(state: &dyn PackageState) -> Vec<Atom> {
	state.world()
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::ports::InMemoryPortsTree;

	fn tree() -> InMemoryPortsTree {
		let mut tree = InMemoryPortsTree::new();
		for version in ["1.0", "2.0"] {
			tree.add(Distribution::new("lib", "bar", version.parse().unwrap(), 0));
		}
		tree
	}

	fn atoms(list: &[&str]) -> Vec<Atom> {
		list.iter().map(|a| a.parse().unwrap()).collect()
	}

	#[test]
	fn resolve_picks_best_without_duplicates() {
		let targets = resolve_targets(&tree(), &atoms(&["lib/bar", "bar", "=lib/bar-1.0"]), &MergeOptions::default()).unwrap();
		assert_eq!(targets.iter().map(|d| d.to_string()).collect::<Vec<_>>(), vec!["lib/bar-2.0", "lib/bar-1.0"]);
	}

	#[test]
	fn update_skips_vanished_exact_versions() {
		let requested = atoms(&["=lib/bar-1.5", "lib/bar"]);
		assert!(matches!(
			resolve_targets(&tree(), &requested, &MergeOptions::default()),
			Err(crate::Error::DistributionNotFound { .. })
		));

		let update = MergeOptions { update: true, ..Default::default() };
		assert_eq!(resolve_targets(&tree(), &requested, &update).unwrap().len(), 1);
		/* Only exact versions are tolerated */
		assert!(resolve_targets(&tree(), &atoms(&[">lib/bar-2.0"]), &update).is_err());
		assert!(resolve_targets(&tree(), &atoms(&["=lib/gone-1.0"]), &update).unwrap().is_empty());
	}

	#[test]
	fn cancel_token_is_shared() {
		let token = CancelToken::new();
		let clone = token.clone();
		clone.cancel();
		assert!(token.is_cancelled());
	}
}
