use std::collections::HashMap;
use std::sync::Arc;

use super::DependencyGraph;
use crate::ports::Distribution;

/// A package pulled into the graph more than once where no single distribution satisfies every requirement.
#[derive(Debug, Clone)]
pub struct SlotConflict {
	/// `cat/pkg`
	pub package: String,
	/// Slots of `distributions`, without duplicates.
	pub slots: Vec<u32>,
	pub distributions: Vec<Arc<Distribution>>,
	/// For each member of `distributions`, the distributions that pulled it in.
	pub pulled_in_by: Vec<(Arc<Distribution>, Vec<Arc<Distribution>>)>,
}

impl std::fmt::Display for SlotConflict {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		writeln!(f, "{} is pulled in at slots {:?}", self.package, self.slots)?;
		for (dist, by) in &self.pulled_in_by {
			let by = by.iter().map(|d| d.to_string()).collect::<Vec<_>>();
			if by.is_empty() {
				writeln!(f, "  {} (requested directly)", dist)?;
			} else {
				writeln!(f, "  {} pulled in by {}", dist, by.join(", "))?;
			}
		}
		Ok(())
	}
}

impl DependencyGraph {
	/// Packages present in the graph as more than one distribution, in installation order.
	pub fn duplicate_packages(&self) -> Vec<(String, Vec<Arc<Distribution>>)> {
		let mut groups = Vec::<(String, Vec<Arc<Distribution>>)>::new();
		let mut positions = HashMap::<String, usize>::new();
		for dist in &self.order {
			let name = dist.full_name();
			match positions.get(&name) {
				Some(p) => groups[*p].1.push(dist.clone()),
				None => {
					positions.insert(name.clone(), groups.len());
					groups.push((name, vec![dist.clone()]));
				},
			}
		}
		groups.retain(|(_, members)| members.len() > 1);
		groups
	}

	/// Duplicated packages where none of the duplicates satisfies every requirement recorded against the package.
	///
	/// A member that was never required by anything, such as a root, counts as satisfying.
	pub fn find_slot_conflicts(&self) -> Vec<SlotConflict> {
		self.duplicate_packages()
			.into_iter()
			.filter(|(_, members)| !members.iter().any(|d| self.try_check_satisfies(&d.atom()).unwrap_or(true)))
			.map(|(package, distributions)| {
				let mut slots = distributions.iter().map(|d| d.slot).collect::<Vec<_>>();
				slots.sort_unstable();
				slots.dedup();
				let pulled_in_by = distributions.iter()
					.map(|d| (d.clone(), self.try_query_pulled_in_by(d).unwrap_or_default()))
					.collect();
				log::debug!("Slot conflict in {}", package);
				SlotConflict { package, slots, distributions, pulled_in_by }
			})
			.collect()
	}
}
