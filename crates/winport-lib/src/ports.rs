//! # Ports tree
//!
//! The ports tree answers which distributions exist for an atom and whether they are masked.
//! Reading the tree from disk is left to the implementor of [`PortsTree`],
//! [`InMemoryPortsTree`] is a simple implementation that can be loaded from a JSON manifest.

use std::sync::Arc;

use serde::{Serialize, Deserialize};

use crate::package::Atom;

mod distribution;
pub use distribution::Distribution;
pub use distribution::Source;

mod memory;
pub use memory::InMemoryPortsTree;
pub use memory::TreeManifest;

/// Why a distribution is excluded from normal selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskKind {
	/// Listed in the hard mask list and not unmasked.
	Hard,
	/// None of the distribution's keywords are accepted.
	Keyword,
}

impl std::fmt::Display for MaskKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			MaskKind::Hard => write!(f, "hard masked"),
			MaskKind::Keyword => write!(f, "keyword masked"),
		}
	}
}

/// Read-only access to the installable distributions.
pub trait PortsTree {
	/// Every distribution matching `atom`.
	///
	/// # Errors
	/// - [`PackageNotFound`](crate::Error::PackageNotFound) when no package carries the atom's name.
	/// - [`AmbiguousMatch`](crate::Error::AmbiguousMatch) when a short name exists in several categories.
	/// - [`DistributionNotFound`](crate::Error::DistributionNotFound) when the package exists but nothing matches.
	fn lookup_all(&self, atom: &Atom) -> crate::Result<Vec<Arc<Distribution>>>;

	fn is_hard_masked(&self, dist: &Distribution) -> bool;

	fn is_keyword_masked(&self, dist: &Distribution) -> bool;

	fn is_masked(&self, dist: &Distribution) -> bool {
		self.mask_kind(dist).is_some()
	}

	/// The reason `dist` is masked, hard masks take precedence.
	fn mask_kind(&self, dist: &Distribution) -> Option<MaskKind> {
		if self.is_hard_masked(dist) {
			Some(MaskKind::Hard)
		} else if self.is_keyword_masked(dist) {
			Some(MaskKind::Keyword)
		} else {
			None
		}
	}

	/// The highest version among [`lookup_all()`](PortsTree::lookup_all).
	fn best_match(&self, atom: &Atom) -> crate::Result<Arc<Distribution>> {
		self.lookup_all(atom)?
			.into_iter()
			.max_by(|a, b| a.version.cmp(&b.version))
			.ok_or_else(|| crate::Error::DistributionNotFound { package: atom.full_name(), atom: atom.to_string() })
	}
}
