//! # Installer
//!
//! Installing a distribution is done by an [`InstallProject`], created per distribution by an [`Installer`].
//! The merge only cares whether each phase succeeded and which files ended up installed.
//!
//! [`ArchiveInstaller`] unpacks zip sources straight into the install root.

use std::path::PathBuf;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::ports::Distribution;

mod archive;
pub use archive::ArchiveInstaller;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
	Unpack,
	Compile,
	Test,
	Install,
}

impl std::fmt::Display for InstallPhase {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			InstallPhase::Unpack => write!(f, "unpack"),
			InstallPhase::Compile => write!(f, "compile"),
			InstallPhase::Test => write!(f, "test"),
			InstallPhase::Install => write!(f, "install"),
		}
	}
}

#[derive(Debug, Error)]
pub enum InstallError {
	#[error("{phase} phase failed: {message}")]
	PhaseFailed {
		phase: InstallPhase,
		message: String,
	},
	#[error("{} escapes the install image", .0.display())]
	PathOutsideImage(PathBuf),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("zip error: {0}")]
	Zip(#[from] zip::result::ZipError),
	#[error("error walking directory: {0}")]
	WalkDir(#[from] walkdir::Error),
}

/// Files placed by an install, relative to the install root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallManifest {
	pub files: Vec<PathBuf>,
}

/// The phases of installing a single distribution, run in declaration order.
pub trait InstallProject {
	fn unpack(&mut self) -> Result<(), InstallError>;
	fn compile(&mut self) -> Result<(), InstallError>;
	fn test(&mut self) -> Result<(), InstallError>;
	fn install(&mut self) -> Result<InstallManifest, InstallError>;
}

pub trait Installer {
	/// Creates the project installing `dist` from its downloaded `sources`.
	fn project(&self, dist: &Distribution, sources: &[PathBuf]) -> Result<Box<dyn InstallProject>, InstallError>;
}

/// Runs every phase of `project`.
pub fn run_project(project: &mut dyn InstallProject) -> Result<InstallManifest, InstallError> {
	project.unpack()?;
	project.compile()?;
	project.test()?;
	project.install()
}
