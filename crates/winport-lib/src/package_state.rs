//! # Installed package state
//!
//! What is installed, which files belong to it and the world set.
//! [`InstalledDatabase`] is the provided implementation.

use std::path::PathBuf;

use crate::installer::InstallManifest;
use crate::package::{Atom, PackageVersion};
use crate::ports::Distribution;

mod database;
pub use database::InstalledDatabase;

pub trait PackageState {
	/// Exact atoms of every installed distribution.
	fn installed_atoms(&self) -> Vec<Atom>;

	/// Exact atoms of the installed distributions matching `atom`.
	fn find_installed(&self, atom: &Atom) -> Vec<Atom> {
		self.installed_atoms()
			.into_iter()
			.filter(|installed| atom.matches(installed, false))
			.collect()
	}

	/// The highest installed version matching `atom`.
	fn query_installed_version(&self, atom: &Atom) -> Option<PackageVersion> {
		self.find_installed(atom)
			.into_iter()
			.filter_map(|a| a.version().cloned())
			.max()
	}

	/// Files owned by the installed distribution `atom`, relative to the install root.
	fn installed_files(&self, atom: &Atom) -> Option<Vec<PathBuf>>;

	/// Records `dist` as installed, replacing whatever occupied its slot.
	fn record_install(&mut self, dist: &Distribution, manifest: &InstallManifest) -> crate::Result<()>;

	fn record_uninstall(&mut self, atom: &Atom) -> crate::Result<()>;

	/// Atoms the user asked for directly, in the order they were added.
	fn world(&self) -> Vec<Atom>;

	/// Adding an atom already in the world set does nothing.
	fn add_to_world(&mut self, atom: &Atom) -> crate::Result<()>;

	/// Removes every world entry naming the same package and slot as `atom`.
	fn remove_from_world(&mut self, atom: &Atom) -> crate::Result<()>;

	/// Protected packages are never removed by an unmerge.
	fn is_protected(&self, atom: &Atom) -> bool;
}
