use serde::{Serialize, Deserialize};

use crate::package::{Atom, PackageVersion};

/// A single installable version of a package.
///
/// Distributions are compared, hashed and ordered by their exact atom alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
	pub category: String,
	pub name: String,
	pub version: PackageVersion,
	#[serde(default)]
	pub slot: u32,
	/// Atoms that must be installed before this distribution, in declaration order.
	#[serde(default)]
	pub dependencies: Vec<Atom>,
	#[serde(default)]
	pub keywords: Vec<String>,
	/// Size of the sources to download in bytes.
	#[serde(default)]
	pub archive_size: u64,
	/// Size once installed in bytes.
	#[serde(default)]
	pub total_size: u64,
	/// Sources can't be downloaded automatically and have to be placed in the download directory by hand.
	#[serde(default)]
	pub fetch_restriction: bool,
	/// The install asks the user for input.
	#[serde(default)]
	pub interactive: bool,
	#[serde(default)]
	pub sources: Vec<Source>,
	/// Index of the repository (main tree or overlay) the distribution came from.
	#[serde(default)]
	pub repository: usize,
}

/// A downloadable file belonging to a distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
	pub url: String,
	pub file_name: String,
	/// Hex encoded sha256 of the file.
	#[serde(default)]
	pub sha256: Option<String>,
}

impl Distribution {
	pub fn new(category: impl Into<String>, name: impl Into<String>, version: PackageVersion, slot: u32) -> Self {
		Self {
			category: category.into(),
			name: name.into(),
			version,
			slot,
			dependencies: Default::default(),
			keywords: Default::default(),
			archive_size: 0,
			total_size: 0,
			fetch_restriction: false,
			interactive: false,
			sources: Default::default(),
			repository: 0,
		}
	}

	/// `=cat/pkg-ver:slot`
	pub fn atom(&self) -> Atom {
		Atom::exact(self.category.clone(), self.name.clone(), self.version.clone(), self.slot)
	}

	/// `cat/pkg`
	pub fn full_name(&self) -> String {
		format!("{}/{}", self.category, self.name)
	}

	fn key(&self) -> (&str, &str, &PackageVersion, u32) {
		(&self.category, &self.name, &self.version, self.slot)
	}
}

impl PartialEq for Distribution {
	fn eq(&self, other: &Self) -> bool {
		self.key() == other.key()
	}
}

impl Eq for Distribution {}

impl std::hash::Hash for Distribution {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.key().hash(state);
	}
}

impl Ord for Distribution {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.key().cmp(&other.key())
	}
}

impl PartialOrd for Distribution {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl std::fmt::Display for Distribution {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.atom())
	}
}
