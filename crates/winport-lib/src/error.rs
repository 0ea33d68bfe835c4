//! Library error type.

pub type Result<T> = std::result::Result<T, Error>;

use std::path::PathBuf;

use thiserror::Error;

use crate::dependency_graph::SlotConflict;

#[derive(Debug, Error)]
pub enum Error {
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
	#[error("JSON error: {0}")]
	SerdeJSON(#[from] serde_json::Error),
	#[error("bincode error: {0}")]
	Bincode(#[from] bincode::Error),
	#[error("error walking directory: {0}")]
	WalkDir(#[from] walkdir::Error),

	/* Atoms and lookups */
	#[error("invalid atom \"{0}\"")]
	BadAtomFormat(String),
	#[error("no package matches \"{0}\"")]
	PackageNotFound(String),
	#[error("no distribution of {package} matches \"{atom}\"")]
	DistributionNotFound {
		package: String,
		atom: String,
	},
	#[error("\"{name}\" is ambiguous, candidates: {}", candidates.join(", "))]
	AmbiguousMatch {
		name: String,
		candidates: Vec<String>,
	},

	/* Graph */
	#[error("no distributions given to resolve")]
	EmptyInput,
	#[error("circular dependency involving {0}")]
	CircularReference(String),
	#[error("{0} was never pulled in as a dependency")]
	PackageNotADependency(String),

	/* Merge policy */
	#[error("{atom} is masked ({kind})")]
	MaskedPackage {
		atom: String,
		kind: crate::ports::MaskKind,
	},
	#[error("unresolvable slot conflict in {}", conflicts.iter().map(|c| c.package.as_str()).collect::<Vec<_>>().join(", "))]
	SlotConflict {
		conflicts: Vec<SlotConflict>,
	},
	#[error("{distribution} must be downloaded manually into {}", directory.display())]
	FetchRestricted {
		distribution: String,
		directory: PathBuf,
	},

	/* Installation */
	#[error("download of {distribution} failed: {source}")]
	Download {
		distribution: String,
		source: crate::installation::download::DownloadError,
	},
	#[error("digest of {} does not match for {distribution}", file.display())]
	DigestMismatch {
		distribution: String,
		file: PathBuf,
	},
	#[error("install of {distribution} failed: {source}")]
	Install {
		distribution: String,
		source: crate::installer::InstallError,
	},
	#[error("merge interrupted before {0}")]
	Interrupted(String),
}
