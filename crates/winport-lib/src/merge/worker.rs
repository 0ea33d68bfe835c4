use std::path::PathBuf;
use std::sync::Arc;

use super::{CancelToken, MergeOptions, MergeSchedule, build_schedule};
use crate::dependency_graph::DependencyGraph;
use crate::installation::content::verify_digests;
use crate::installation::download::Downloader;
use crate::installation::trash::TrashCan;
use crate::installer::{Installer, run_project};
use crate::package::Atom;
use crate::package_state::PackageState;
use crate::ports::{Distribution, PortsTree};

/// Progress reported while merging or unmerging.
#[derive(Debug, Clone)]
pub enum MergeEvent {
	Resolved { distributions: usize },
	Scheduled { items: usize },
	FetchQueued { distribution: Arc<Distribution> },
	Fetched { distribution: Arc<Distribution>, files: Vec<PathBuf> },
	Installing { index: usize, total: usize, distribution: Arc<Distribution> },
	Installed { distribution: Arc<Distribution>, files: usize },
	Removing { atom: Atom },
	Removed { atom: Atom, files: usize },
	TrashPurged { files: usize },
}

/// Drives a merge from the requested distributions to installed packages.
///
/// Items are installed strictly in schedule order. A failure stops the merge, items installed before it stay installed.
pub struct MergeWorker<'a> {
	config: &'a crate::Config,
	tree: &'a dyn PortsTree,
	state: &'a mut dyn PackageState,
	downloader: &'a dyn Downloader,
	installer: &'a dyn Installer,
	options: MergeOptions,
	cancel: CancelToken,
}

impl<'a> MergeWorker<'a> {
	pub fn new(
		config: &'a crate::Config,
		tree: &'a dyn PortsTree,
		state: &'a mut dyn PackageState,
		downloader: &'a dyn Downloader,
		installer: &'a dyn Installer,
		options: MergeOptions,
	) -> Self {
		Self { config, tree, state, downloader, installer, options, cancel: CancelToken::default() }
	}

	/// Use `cancel` to stop the merge before its next item.
	pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
		self.cancel = cancel;
		self
	}

	pub fn options(&self) -> &MergeOptions {
		&self.options
	}

	/// Computes the dependency graph and schedule of `targets` without touching anything.
	pub fn compute_schedule(&self, targets: &[Arc<Distribution>]) -> crate::Result<(DependencyGraph, MergeSchedule)> {
		let graph = DependencyGraph::compute(targets, self.tree)?;
		let schedule = build_schedule(self.config, &graph, self.tree, &*self.state, self.downloader, targets, &self.options)?;
		Ok((graph, schedule))
	}

	/// Merges `targets` and everything they depend on.
	///
	/// In pretend mode this returns the schedule without downloading or installing anything.
	///
	/// # Errors
	/// - Everything [`DependencyGraph::compute()`] and [`build_schedule()`] return.
	/// - [`Download`](crate::Error::Download) or [`DigestMismatch`](crate::Error::DigestMismatch) when an item's sources can't be fetched.
	/// - [`Install`](crate::Error::Install) when a phase of the install fails.
	/// - [`Interrupted`](crate::Error::Interrupted) when cancelled, naming the item that was not started.
	pub fn merge(&mut self, targets: &[Arc<Distribution>], mut on_event: impl FnMut(&MergeEvent)) -> crate::Result<MergeSchedule> {
		let (graph, mut schedule) = self.compute_schedule(targets)?;
		on_event(&MergeEvent::Resolved { distributions: graph.len() });
		on_event(&MergeEvent::Scheduled { items: schedule.len() });

		if self.options.pretend {
			return Ok(schedule)
		}

		/* Everything is queued up front so downloads run while earlier items install */
		for item in schedule.items.iter_mut() {
			if item.distribution.sources.is_empty() { continue; }
			item.fetch_handle = Some(self.downloader.enqueue(&item.distribution));
			on_event(&MergeEvent::FetchQueued { distribution: item.distribution.clone() });
		}

		let trash = TrashCan::new(self.config);
		let total = schedule.len();
		for (index, item) in schedule.items.iter().enumerate() {
			let dist = &item.distribution;
			if self.cancel.is_cancelled() {
				log::warn!("Merge interrupted before {}", dist);
				return Err(crate::Error::Interrupted(dist.to_string()))
			}

			let files = match item.fetch_handle {
				Some(handle) => self.downloader.wait_for(handle)
					.map_err(|source| crate::Error::Download { distribution: dist.to_string(), source })?,
				None => Vec::new(),
			};
			verify_digests(self.config, dist, &files)?;
			on_event(&MergeEvent::Fetched { distribution: dist.clone(), files: files.clone() });

			if self.options.fetch_only {
				continue;
			}

			on_event(&MergeEvent::Installing { index, total, distribution: dist.clone() });
			log::info!("Installing {} ({} of {})", dist, index + 1, total);
			let install_error = |source| crate::Error::Install { distribution: dist.to_string(), source };
			let mut project = self.installer.project(dist, &files).map_err(install_error)?;
			let manifest = run_project(project.as_mut()).map_err(install_error)?;

			let previous_files = item.previous.as_ref()
				.and_then(|p| self.state.installed_files(p))
				.unwrap_or_default();
			self.state.record_install(dist, &manifest)?;
			trash.trash_files(previous_files.iter().filter(|f| !manifest.files.contains(*f)))?;

			if item.selected && !self.options.oneshot {
				self.state.add_to_world(&dist.atom().unversioned())?;
			}
			on_event(&MergeEvent::Installed { distribution: dist.clone(), files: manifest.files.len() });
		}

		if !self.options.fetch_only {
			let files = trash.purge()?;
			on_event(&MergeEvent::TrashPurged { files });
		}

		Ok(schedule)
	}
}
