use std::path::{Path, PathBuf};

use super::{InstallError, InstallManifest, InstallProject, Installer};
use crate::ports::Distribution;

/// Installs distributions whose sources are zip archives or plain files.
///
/// Sources are unpacked into a per distribution image under `<data_dir>/build`,
/// the image is then copied into the install root.
#[derive(Debug, Clone)]
pub struct ArchiveInstaller {
	build_dir: PathBuf,
	install_root: PathBuf,
}

impl ArchiveInstaller {
	pub fn new(config: &crate::Config) -> Self {
		Self {
			build_dir: config.data_dir().join("build"),
			install_root: config.install_root().to_path_buf(),
		}
	}
}

impl Installer for ArchiveInstaller {
	fn project(&self, dist: &Distribution, sources: &[PathBuf]) -> Result<Box<dyn InstallProject>, InstallError> {
		Ok(Box::new(ArchiveProject {
			name: dist.to_string(),
			sources: sources.to_vec(),
			image_dir: self.build_dir.join(format!("{}-{}-{}", dist.category, dist.name, dist.version)),
			install_root: self.install_root.clone(),
		}))
	}
}

struct ArchiveProject {
	name: String,
	sources: Vec<PathBuf>,
	image_dir: PathBuf,
	install_root: PathBuf,
}

fn is_zip(path: &Path) -> bool {
	path.extension().map_or(false, |e| e.eq_ignore_ascii_case("zip"))
}

impl InstallProject for ArchiveProject {
	fn unpack(&mut self) -> Result<(), InstallError> {
		if self.image_dir.exists() {
			std::fs::remove_dir_all(&self.image_dir)?;
		}
		std::fs::create_dir_all(&self.image_dir)?;

		for source in &self.sources {
			log::trace!("Unpacking {} for {}", source.display(), self.name);
			if is_zip(source) {
				let mut zip = zip::ZipArchive::new(std::fs::File::open(source)?)?;
				zip.extract(&self.image_dir)?;
			} else if let Some(file_name) = source.file_name() {
				std::fs::copy(source, self.image_dir.join(file_name))?;
			}
		}
		Ok(())
	}

	fn compile(&mut self) -> Result<(), InstallError> {
		log::trace!("Nothing to compile for {}", self.name);
		Ok(())
	}

	fn test(&mut self) -> Result<(), InstallError> {
		Ok(())
	}

	fn install(&mut self) -> Result<InstallManifest, InstallError> {
		let mut manifest = InstallManifest::default();

		for entry in walkdir::WalkDir::new(&self.image_dir).into_iter() {
			let entry = entry?;
			if !entry.file_type().is_file() { continue; }
			let relative = pathdiff::diff_paths(entry.path(), &self.image_dir)
				.filter(|p| !p.starts_with(".."))
				.ok_or_else(|| InstallError::PathOutsideImage(entry.path().to_path_buf()))?;

			let destination = self.install_root.join(&relative);
			if let Some(parent) = destination.parent() {
				std::fs::create_dir_all(parent)?;
			}
			std::fs::copy(entry.path(), &destination)?;
			manifest.files.push(relative);
		}

		std::fs::remove_dir_all(&self.image_dir)?;
		manifest.files.sort();
		log::info!("Installed {} files for {}", manifest.files.len(), self.name);
		Ok(manifest)
	}
}
