use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

use super::PackageState;
use crate::installer::InstallManifest;
use crate::package::Atom;
use crate::ports::Distribution;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InstalledEntry {
	atom: Atom,
	repository: usize,
	files: Vec<PathBuf>,
}

/// Installed package database kept in memory and written to disk with bincode after every change.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InstalledDatabase {
	/// Keyed by the exact atom string.
	installed: BTreeMap<String, InstalledEntry>,
	world: Vec<Atom>,
	protected: Vec<Atom>,
	#[serde(skip)]
	path: Option<PathBuf>,
}

impl InstalledDatabase {
	/// A database that is never written to disk.
	pub fn in_memory() -> Self {
		Self::default()
	}

	/// Loads the database from `installed.bin` in the configured data directory, starting empty if there is none.
	///
	/// # Errors
	/// - [`IO`](crate::Error::IO) when opening or reading from the file.
	/// - [`Bincode`](crate::Error::Bincode) when deserializing the file.
	pub fn load_from_disk(config: &crate::Config) -> crate::Result<Self> {
		Self::load_from_file(config.data_dir().join("installed.bin"))
	}

	/// See [`load_from_disk()`](InstalledDatabase::load_from_disk).
	pub fn load_from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
		let path = path.as_ref();
		let mut db = if path.exists() {
			log::debug!("Loading installed database from {}", path.display());
			let file = std::fs::File::open(path)?;
			bincode::deserialize_from::<_, InstalledDatabase>(std::io::BufReader::new(file))?
		} else {
			log::info!("No installed database at {}, starting empty", path.display());
			InstalledDatabase::default()
		};
		db.path = Some(path.to_path_buf());
		Ok(db)
	}

	/// Writes the database to the file it was loaded from, in memory databases are left alone.
	///
	/// # Errors
	/// - [`IO`](crate::Error::IO) when creating the file or its parent directories.
	/// - [`Bincode`](crate::Error::Bincode) when serializing.
	pub fn save_to_disk(&self) -> crate::Result<()> {
		let Some(path) = &self.path else { return Ok(()) };
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let file = std::fs::File::create(path)?;
		bincode::serialize_into(std::io::BufWriter::new(file), self)?;
		Ok(())
	}

	pub fn protect(&mut self, atom: Atom) -> crate::Result<()> {
		self.protected.push(atom);
		self.save_to_disk()
	}

	/// Repository index the installed distribution came from.
	pub fn repository_of(&self, atom: &Atom) -> Option<usize> {
		self.installed.get(&atom.to_string()).map(|e| e.repository)
	}
}

impl PackageState for InstalledDatabase {
	fn installed_atoms(&self) -> Vec<Atom> {
		self.installed.values().map(|e| e.atom.clone()).collect()
	}

	fn installed_files(&self, atom: &Atom) -> Option<Vec<PathBuf>> {
		self.installed.get(&atom.to_string()).map(|e| e.files.clone())
	}

	fn record_install(&mut self, dist: &Distribution, manifest: &InstallManifest) -> crate::Result<()> {
		let atom = dist.atom();
		let slot = atom.unversioned();
		self.installed.retain(|_, e| !slot.matches(&e.atom, false));
		log::debug!("Recording {} as installed with {} files", atom, manifest.files.len());
		self.installed.insert(atom.to_string(), InstalledEntry {
			atom,
			repository: dist.repository,
			files: manifest.files.clone(),
		});
		self.save_to_disk()
	}

	fn record_uninstall(&mut self, atom: &Atom) -> crate::Result<()> {
		if self.installed.remove(&atom.to_string()).is_some() {
			log::debug!("Recording {} as uninstalled", atom);
		}
		self.save_to_disk()
	}

	fn world(&self) -> Vec<Atom> {
		self.world.clone()
	}

	fn add_to_world(&mut self, atom: &Atom) -> crate::Result<()> {
		if self.world.contains(atom) {
			return Ok(())
		}
		self.world.push(atom.clone());
		self.save_to_disk()
	}

	fn remove_from_world(&mut self, atom: &Atom) -> crate::Result<()> {
		self.world.retain(|w| !(w.matches(atom, true) && w.slot() == atom.slot()));
		self.save_to_disk()
	}

	fn is_protected(&self, atom: &Atom) -> bool {
		self.protected.iter().any(|p| p.matches(atom, true))
	}
}
