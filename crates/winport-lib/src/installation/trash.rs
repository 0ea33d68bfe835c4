//! Files of replaced or removed packages are moved to the trash directory instead of being deleted in place,
//! the trash is purged once the merge is finished.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct TrashCan {
	trash_dir: PathBuf,
	install_root: PathBuf,
}

impl TrashCan {
	pub fn new(config: &crate::Config) -> Self {
		Self {
			trash_dir: config.trash_dir().to_path_buf(),
			install_root: config.install_root().to_path_buf(),
		}
	}

	pub fn trash_dir(&self) -> &Path {
		&self.trash_dir
	}

	/// Moves installed files into the trash.
	///
	/// `files` are relative to the install root, missing files are skipped.
	/// Directories left empty are removed up to the install root.
	///
	/// Returns the number of files moved.
	pub fn trash_files<'a>(&self, files: impl IntoIterator<Item = &'a PathBuf>) -> crate::Result<usize> {
		let mut moved = 0;
		for relative in files {
			let source = self.install_root.join(relative);
			if !source.is_file() {
				continue;
			}
			let destination = self.trash_dir.join(relative);
			if let Some(parent) = destination.parent() {
				std::fs::create_dir_all(parent)?;
			}
			log::trace!("Trashing {}", source.display());
			if std::fs::rename(&source, &destination).is_err() {
				/* Different volume */
				std::fs::copy(&source, &destination)?;
				std::fs::remove_file(&source)?;
			}
			moved += 1;
			self.remove_empty_parents(&source);
		}
		if moved > 0 {
			log::info!("Moved {} files to the trash", moved);
		}
		Ok(moved)
	}

	fn remove_empty_parents(&self, file: &Path) {
		let mut dir = file.parent();
		while let Some(d) = dir {
			if d == self.install_root || !d.starts_with(&self.install_root) {
				break;
			}
			/* Fails on the first directory that still has content */
			if std::fs::remove_dir(d).is_err() {
				break;
			}
			dir = d.parent();
		}
	}

	/// Deletes everything in the trash.
	///
	/// Returns the number of files deleted.
	pub fn purge(&self) -> crate::Result<usize> {
		if !self.trash_dir.exists() {
			return Ok(0)
		}
		let mut deleted = 0;
		for entry in WalkDir::new(&self.trash_dir).min_depth(1).contents_first(true) {
			let entry = entry?;
			if entry.file_type().is_dir() {
				std::fs::remove_dir(entry.path())?;
			} else {
				std::fs::remove_file(entry.path())?;
				deleted += 1;
			}
		}
		log::info!("Purged {} files from the trash", deleted);
		Ok(deleted)
	}
}
