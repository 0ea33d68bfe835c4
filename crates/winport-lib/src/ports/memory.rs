use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Serialize, Deserialize};

use super::{Distribution, PortsTree};
use crate::package::Atom;

/// The on-disk form of an [`InMemoryPortsTree`].
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeManifest {
	pub distributions: Vec<Distribution>,
	/// Distributions matching these are hard masked.
	pub hard_masked: Vec<Atom>,
	/// Lifts hard masks from matching distributions.
	pub unmasked: Vec<Atom>,
	/// Keywords accepted for every package.
	pub accept_keywords: Vec<String>,
	/// Matching distributions are accepted whatever their keywords are.
	pub package_keywords: Vec<Atom>,
}

/// Ports tree held entirely in memory.
///
/// When some of the distributions matching an atom are masked, [`lookup_all()`](PortsTree::lookup_all)
/// only returns the unmasked ones. The masked ones are returned when nothing else matches,
/// so the caller can tell the user what needs unmasking.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPortsTree {
	packages: BTreeMap<String, Vec<Arc<Distribution>>>,
	hard_masked: Vec<Atom>,
	unmasked: Vec<Atom>,
	accept_keywords: HashSet<String>,
	package_keywords: Vec<Atom>,
}

impl InMemoryPortsTree {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn from_manifest(manifest: TreeManifest) -> Self {
		let mut tree = InMemoryPortsTree {
			hard_masked: manifest.hard_masked,
			unmasked: manifest.unmasked,
			accept_keywords: manifest.accept_keywords.into_iter().collect(),
			package_keywords: manifest.package_keywords,
			..Default::default()
		};
		for dist in manifest.distributions {
			tree.add(dist);
		}
		tree
	}

	/// Loads a [`TreeManifest`] from a JSON file.
	///
	/// # Errors
	/// - [`IO`](crate::Error::IO) when opening or reading from the file.
	/// - [`SerdeJSON`](crate::Error::SerdeJSON) when deserializing the file.
	pub fn load_from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
		log::debug!("Loading ports tree from {}", path.as_ref().display());
		let file = std::fs::File::open(path)?;
		let manifest: TreeManifest = serde_json::from_reader(std::io::BufReader::new(file))?;
		Ok(Self::from_manifest(manifest))
	}

	/// Adds a distribution, returning the shared handle the tree hands out for it.
	pub fn add(&mut self, dist: Distribution) -> Arc<Distribution> {
		let dist = Arc::new(dist);
		let versions = self.packages.entry(dist.full_name()).or_default();
		versions.retain(|d| **d != *dist);
		versions.push(dist.clone());
		dist
	}

	pub fn hard_mask(&mut self, atom: Atom) {
		self.hard_masked.push(atom);
	}

	pub fn unmask(&mut self, atom: Atom) {
		self.unmasked.push(atom);
	}

	pub fn accept_keywords(&mut self, keywords: impl IntoIterator<Item = impl Into<String>>) {
		self.accept_keywords.extend(keywords.into_iter().map(Into::into));
	}

	pub fn accept_keywords_for(&mut self, atom: Atom) {
		self.package_keywords.push(atom);
	}

	/// All distributions of the package `cat/pkg`.
	pub fn get(&self, full_name: &str) -> &[Arc<Distribution>] {
		self.packages.get(full_name).map_or(&[], |v| v.as_slice())
	}

	pub fn package_names(&self) -> impl Iterator<Item = &String> {
		self.packages.keys()
	}

	fn packages_named(&self, atom: &Atom) -> crate::Result<&Vec<Arc<Distribution>>> {
		if atom.is_fully_qualified() {
			return self.packages.get(&atom.full_name()).ok_or_else(|| crate::Error::PackageNotFound(atom.to_string()))
		}

		let mut found = self.packages.iter()
			.filter(|(_, versions)| versions.first().map_or(false, |d| d.name == atom.package()))
			.collect::<Vec<_>>();

		match found.len() {
			0 => Err(crate::Error::PackageNotFound(atom.to_string())),
			1 => Ok(found.remove(0).1),
			_ => Err(crate::Error::AmbiguousMatch {
				name: atom.package().to_string(),
				candidates: found.into_iter().map(|(name, _)| name.clone()).collect(),
			}),
		}
	}
}

impl PortsTree for InMemoryPortsTree {
	fn lookup_all(&self, atom: &Atom) -> crate::Result<Vec<Arc<Distribution>>> {
		let versions = self.packages_named(atom)?;

		let matching = versions.iter()
			.filter(|d| atom.matches(&d.atom(), false))
			.cloned()
			.collect::<Vec<_>>();

		if matching.is_empty() {
			return Err(crate::Error::DistributionNotFound {
				package: versions.first().map(|d| d.full_name()).unwrap_or_else(|| atom.full_name()),
				atom: atom.to_string(),
			})
		}

		let visible = matching.iter()
			.filter(|d| !self.is_masked(d))
			.cloned()
			.collect::<Vec<_>>();

		if visible.is_empty() {
			log::trace!("Every match for {} is masked", atom);
			Ok(matching)
		} else {
			Ok(visible)
		}
	}

	fn is_hard_masked(&self, dist: &Distribution) -> bool {
		let atom = dist.atom();
		self.hard_masked.iter().any(|m| m.matches(&atom, false))
			&& !self.unmasked.iter().any(|m| m.matches(&atom, false))
	}

	fn is_keyword_masked(&self, dist: &Distribution) -> bool {
		if dist.keywords.is_empty() {
			return false
		}
		if dist.keywords.iter().any(|k| self.accept_keywords.contains(k)) {
			return false
		}
		let atom = dist.atom();
		!self.package_keywords.iter().any(|m| m.matches(&atom, false))
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::ports::MaskKind;

	fn dist(category: &str, name: &str, version: &str) -> Distribution {
		Distribution::new(category, name, version.parse().unwrap(), 0)
	}

	fn atom(s: &str) -> Atom {
		s.parse().unwrap()
	}

	fn tree() -> InMemoryPortsTree {
		let mut tree = InMemoryPortsTree::new();
		tree.add(dist("lib", "bar", "1.0"));
		tree.add(dist("lib", "bar", "2.0"));
		tree.add(dist("app", "foo", "1.0"));
		tree.add(dist("net", "foo", "3.0"));
		tree
	}

	#[test]
	fn lookup_filters_by_atom() {
		let found = tree().lookup_all(&atom(">=lib/bar-1.5")).unwrap();
		assert_eq!(found.len(), 1);
		assert_eq!(found[0].to_string(), "lib/bar-2.0");
	}

	#[test]
	fn lookup_errors() {
		let tree = tree();
		assert!(matches!(tree.lookup_all(&atom("lib/nope")), Err(crate::Error::PackageNotFound(_))));
		assert!(matches!(tree.lookup_all(&atom("nope")), Err(crate::Error::PackageNotFound(_))));
		assert!(matches!(tree.lookup_all(&atom(">lib/bar-2.0")), Err(crate::Error::DistributionNotFound { .. })));
		match tree.lookup_all(&atom("foo")) {
			Err(crate::Error::AmbiguousMatch { name, candidates }) => {
				assert_eq!(name, "foo");
				assert_eq!(candidates, vec!["app/foo".to_string(), "net/foo".to_string()]);
			},
			other => panic!("expected ambiguous match, got {:?}", other),
		}
	}

	#[test]
	fn unslotted_lookup_misses_slotted_package() {
		let mut tree = InMemoryPortsTree::new();
		tree.add(Distribution::new("lib", "qt", "5.15".parse().unwrap(), 5));
		assert!(matches!(tree.lookup_all(&atom("lib/qt")), Err(crate::Error::DistributionNotFound { .. })));
		assert_eq!(tree.lookup_all(&atom("lib/qt:5")).unwrap().len(), 1);
	}

	#[test]
	fn short_name_resolves_when_unique() {
		assert_eq!(tree().best_match(&atom("bar")).unwrap().to_string(), "lib/bar-2.0");
	}

	#[test]
	fn masked_versions_are_hidden_while_others_match() {
		let mut tree = tree();
		tree.hard_mask(atom("=lib/bar-2.0"));
		assert_eq!(tree.best_match(&atom("lib/bar")).unwrap().to_string(), "lib/bar-1.0");

		let only_masked = tree.lookup_all(&atom(">=lib/bar-2.0")).unwrap();
		assert_eq!(only_masked.len(), 1);
		assert_eq!(tree.mask_kind(&only_masked[0]), Some(MaskKind::Hard));

		tree.unmask(atom("lib/bar"));
		assert!(!tree.is_masked(&only_masked[0]));
	}

	#[test]
	fn keyword_masking() {
		let mut tree = InMemoryPortsTree::new();
		let mut testing = dist("lib", "bar", "3.0");
		testing.keywords = vec!["~amd64".to_string()];
		let testing = tree.add(testing);
		tree.accept_keywords(["amd64"]);
		assert_eq!(tree.mask_kind(&testing), Some(MaskKind::Keyword));

		tree.accept_keywords_for(atom("lib/bar"));
		assert!(!tree.is_keyword_masked(&testing));
	}

	#[test]
	fn manifest_loads() {
		let manifest: TreeManifest = serde_json::from_str(r#"{
			"distributions": [
				{ "category": "lib", "name": "bar", "version": "1.0", "keywords": ["~x86"] },
				{ "category": "app", "name": "foo", "version": "1.0", "dependencies": ["lib/bar"] }
			],
			"hard_masked": ["app/foo"],
			"accept_keywords": ["~x86"]
		}"#).unwrap();
		let tree = InMemoryPortsTree::from_manifest(manifest);
		let foo = tree.best_match(&atom("app/foo")).unwrap();
		assert!(tree.is_hard_masked(&foo));
		assert!(!tree.is_masked(&tree.get("lib/bar")[0]));
	}
}
