//! Paths and policy shared by every entry point.
//!
//! There is no process wide configuration, a [`Config`] is passed explicitly to whatever needs it.

use std::path::{Path, PathBuf};

use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
	/// Where sources are downloaded to. Fetch restricted sources must be placed here by hand.
	download_dir: PathBuf,
	/// Installed database and world set.
	data_dir: PathBuf,
	/// Files of replaced or removed packages are moved here until the post merge cleanup.
	trash_dir: PathBuf,
	/// Packages are installed relative to this directory.
	install_root: PathBuf,
	https_only: bool,
	do_checksums: bool,
	/// Keywords accepted for every package, e.g. `x86` or `~amd64`.
	accept_keywords: Vec<String>,
}

impl Default for Config {
	fn default() -> Self {
		let base = {
			#[cfg(target_os = "windows")]
			let path = std::env::var("APPDATA").map(PathBuf::from);

			#[cfg(not(target_os = "windows"))]
			let path = std::env::var("XDG_DATA_HOME").map(PathBuf::from)
				.or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".local/share")));

			path.unwrap_or_else(|_| PathBuf::from(".")).join("winport")
		};

		Self {
			download_dir: base.join("distfiles"),
			data_dir: base.join("data"),
			trash_dir: base.join("trash"),
			install_root: base.join("root"),
			https_only: true,
			do_checksums: true,
			accept_keywords: vec![default_keyword().to_string()],
		}
	}
}

/// The stable keyword for the architecture we were built for.
fn default_keyword() -> &'static str {
	if cfg!(target_arch = "x86_64") {
		"amd64"
	} else {
		"x86"
	}
}

impl Config {
	/// Builds a config rooted in a single directory, useful for sandboxes and tests.
	pub fn with_base_dir(base: impl AsRef<Path>) -> Self {
		let base = base.as_ref();
		Self {
			download_dir: base.join("distfiles"),
			data_dir: base.join("data"),
			trash_dir: base.join("trash"),
			install_root: base.join("root"),
			..Default::default()
		}
	}

	/// Reads `config.json` from the default data directory.
	///
	/// # Errors
	/// - [`IO`](crate::Error::IO) when the file can't be read.
	/// - [`SerdeJSON`](crate::Error::SerdeJSON) when the file is malformed.
	pub fn load_from_disk() -> crate::Result<Self> {
		Self::load_from_file(Self::default().data_dir.join("config.json"))
	}

	pub fn load_from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
		let file = std::fs::File::open(path.as_ref())?;
		log::debug!("Loading config from {}", path.as_ref().display());
		Ok(serde_json::from_reader(file)?)
	}

	/// Writes the config to `config.json` in its own data directory.
	pub fn save_to_disk(&self) -> crate::Result<()> {
		std::fs::create_dir_all(&self.data_dir)?;
		let file = std::fs::File::create(self.data_dir.join("config.json"))?;
		serde_json::to_writer_pretty(file, self)?;
		Ok(())
	}

	pub fn download_dir(&self) -> &Path {
		&self.download_dir
	}
	pub fn set_download_dir(&mut self, download_dir: PathBuf) {
		self.download_dir = download_dir;
	}

	pub fn data_dir(&self) -> &Path {
		&self.data_dir
	}
	pub fn set_data_dir(&mut self, data_dir: PathBuf) {
		self.data_dir = data_dir;
	}

	pub fn trash_dir(&self) -> &Path {
		&self.trash_dir
	}
	pub fn set_trash_dir(&mut self, trash_dir: PathBuf) {
		self.trash_dir = trash_dir;
	}

	pub fn install_root(&self) -> &Path {
		&self.install_root
	}
	pub fn set_install_root(&mut self, install_root: PathBuf) {
		self.install_root = install_root;
	}

	pub fn https_only(&self) -> bool {
		self.https_only
	}
	pub fn set_https_only(&mut self, https_only: bool) {
		self.https_only = https_only;
	}

	pub fn do_checksums(&self) -> bool {
		self.do_checksums
	}
	pub fn set_do_checksums(&mut self, do_checksums: bool) {
		self.do_checksums = do_checksums;
	}

	pub fn accept_keywords(&self) -> &[String] {
		&self.accept_keywords
	}
	pub fn set_accept_keywords(&mut self, keywords: Vec<String>) {
		self.accept_keywords = keywords;
	}
}
