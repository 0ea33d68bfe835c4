use super::{CancelToken, MergeEvent};
use crate::installation::trash::TrashCan;
use crate::package::Atom;
use crate::package_state::PackageState;

/// Installed atoms an unmerge will and won't touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnmergePlan {
	/// Removed by [`UnmergeWorker::execute()`].
	pub selected: Vec<Atom>,
	/// Matched but marked non-removable.
	pub protected: Vec<Atom>,
	/// Other installed versions of the requested packages, kept.
	pub omitted: Vec<Atom>,
}

impl UnmergePlan {
	/// Resolves `atoms` against the installed packages.
	///
	/// An atom without a version or slot names the package in every slot.
	///
	/// # Errors
	/// - [`PackageNotFound`](crate::Error::PackageNotFound) when an atom matches nothing installed.
	pub fn compute(state: &dyn PackageState, atoms: &[Atom]) -> crate::Result<UnmergePlan> {
		let installed = state.installed_atoms();
		let mut plan = UnmergePlan::default();

		for atom in atoms {
			let matched = if atom.version().is_none() && atom.slot() == 0 {
				installed.iter().filter(|i| atom.matches(i, true)).cloned().collect::<Vec<_>>()
			} else {
				state.find_installed(atom)
			};
			if matched.is_empty() {
				return Err(crate::Error::PackageNotFound(atom.to_string()))
			}

			for m in matched {
				if plan.selected.contains(&m) || plan.protected.contains(&m) { continue; }
				if state.is_protected(&m) {
					log::info!("{} is protected, not removing", m);
					plan.protected.push(m);
				} else {
					plan.selected.push(m);
				}
			}
		}

		plan.omitted = installed.into_iter()
			.filter(|i| !plan.selected.contains(i) && !plan.protected.contains(i))
			.filter(|i| atoms.iter().any(|a| a.matches(i, true)))
			.collect();

		Ok(plan)
	}

	pub fn is_empty(&self) -> bool {
		self.selected.is_empty()
	}
}

/// Removes the selected packages of an [`UnmergePlan`].
pub struct UnmergeWorker<'a> {
	config: &'a crate::Config,
	state: &'a mut dyn PackageState,
	pretend: bool,
	cancel: CancelToken,
}

impl<'a> UnmergeWorker<'a> {
	pub fn new(config: &'a crate::Config, state: &'a mut dyn PackageState, pretend: bool) -> Self {
		Self { config, state, pretend, cancel: CancelToken::default() }
	}

	pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
		self.cancel = cancel;
		self
	}

	/// Trashes the files of every selected package, records the removal and drops it from the world set.
	/// Only the selected set is ever touched, nothing at all in pretend mode.
	///
	/// # Errors
	/// - [`Interrupted`](crate::Error::Interrupted) when cancelled.
	/// - Errors from moving files or recording the removal.
	pub fn execute(&mut self, plan: &UnmergePlan, mut on_event: impl FnMut(&MergeEvent)) -> crate::Result<()> {
		if self.pretend {
			return Ok(())
		}

		let trash = TrashCan::new(self.config);
		for atom in &plan.selected {
			if self.cancel.is_cancelled() {
				return Err(crate::Error::Interrupted(atom.to_string()))
			}
			on_event(&MergeEvent::Removing { atom: atom.clone() });
			let files = self.state.installed_files(atom).unwrap_or_default();
			let moved = trash.trash_files(&files)?;
			self.state.record_uninstall(atom)?;
			self.state.remove_from_world(atom)?;
			log::info!("Removed {}", atom);
			on_event(&MergeEvent::Removed { atom: atom.clone(), files: moved });
		}

		let files = trash.purge()?;
		on_event(&MergeEvent::TrashPurged { files });
		Ok(())
	}
}
