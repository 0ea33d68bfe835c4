//! Helpers shared by the integration tests.
//!
//! Builders here panic on malformed input since they are only ever fed literals.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use winport::installation::download::{Downloader, DownloadError, FetchHandle, source_path};
use winport::installer::{InstallError, InstallManifest, InstallProject, Installer};
use winport::package::ParseMode;
use winport::ports::{InMemoryPortsTree, Source};
use winport::{Atom, Config, Distribution};

/// Routes library logs through the test harness, safe to call from every test.
pub fn init_logging() {
	let _ = env_logger::builder().is_test(true).try_init();
}

/// A config rooted in a temporary directory that lives as long as this value.
pub struct TestEnvironment {
	pub dir: tempfile::TempDir,
	pub config: Config,
}

pub fn test_environment() -> std::io::Result<TestEnvironment> {
	init_logging();
	let dir = tempfile::tempdir()?;
	let config = Config::with_base_dir(dir.path());
	std::fs::create_dir_all(config.download_dir())?;
	std::fs::create_dir_all(config.install_root())?;
	Ok(TestEnvironment { dir, config })
}

/// Builds a [`Distribution`] from its exact atom, `cat/pkg-ver[:slot]`.
pub struct DistBuilder {
	dist: Distribution,
}

pub fn dist(atom: &str) -> DistBuilder {
	let atom = Atom::parse(atom, ParseMode::VersionRequired).expect("builder atom should parse");
	DistBuilder {
		dist: Distribution::new(
			atom.category().expect("builder atom should be qualified"),
			atom.package(),
			atom.version().expect("builder atom should be versioned").clone(),
			atom.slot(),
		),
	}
}

impl DistBuilder {
	pub fn depends(mut self, atoms: &[&str]) -> Self {
		self.dist.dependencies.extend(atoms.iter().map(|a| a.parse::<Atom>().expect("dependency atom should parse")));
		self
	}

	pub fn keywords(mut self, keywords: &[&str]) -> Self {
		self.dist.keywords = keywords.iter().map(|k| k.to_string()).collect();
		self
	}

	pub fn fetch_restricted(mut self) -> Self {
		self.dist.fetch_restriction = true;
		self
	}

	pub fn interactive(mut self) -> Self {
		self.dist.interactive = true;
		self
	}

	pub fn archive_size(mut self, size: u64) -> Self {
		self.dist.archive_size = size;
		self
	}

	/// Adds a source named `<pkg>-<ver>.zip`.
	pub fn with_source(mut self) -> Self {
		let file_name = format!("{}-{}.zip", self.dist.name, self.dist.version);
		self.dist.sources.push(Source {
			url: format!("https://ports.invalid/{}", file_name),
			file_name,
			sha256: None,
		});
		self
	}

	pub fn build(self) -> Distribution {
		self.dist
	}
}

/// A ports tree holding `dists`.
pub fn tree(dists: impl IntoIterator<Item = DistBuilder>) -> InMemoryPortsTree {
	let mut tree = InMemoryPortsTree::new();
	for d in dists {
		tree.add(d.build());
	}
	tree
}

/// Looks up the distribution the tree hands out for an exact atom.
pub fn get(tree: &InMemoryPortsTree, atom: &str) -> Arc<Distribution> {
	use winport::PortsTree;
	tree.best_match(&atom.parse().expect("atom should parse")).expect("distribution should exist")
}

/// Downloader that "downloads" by writing a placeholder file for every source.
///
/// Fetch restricted distributions only succeed when their files were put in the download directory beforehand.
pub struct StubDownloader {
	download_dir: PathBuf,
	next: Mutex<u64>,
	jobs: Mutex<HashMap<FetchHandle, Arc<Distribution>>>,
	handles: Mutex<Vec<FetchHandle>>,
	pub enqueued: Mutex<Vec<String>>,
}

impl StubDownloader {
	pub fn new(config: &Config) -> Self {
		Self {
			download_dir: config.download_dir().to_path_buf(),
			next: Mutex::new(0),
			jobs: Default::default(),
			handles: Default::default(),
			enqueued: Default::default(),
		}
	}

	/// Places the sources of `dist` in the download directory as if downloaded by hand.
	pub fn place_manually(&self, dist: &Distribution) -> std::io::Result<()> {
		for source in &dist.sources {
			std::fs::write(source_path(&self.download_dir, source), source.file_name.as_bytes())?;
		}
		Ok(())
	}
}

impl Downloader for StubDownloader {
	fn enqueue(&self, dist: &Arc<Distribution>) -> FetchHandle {
		let mut next = self.next.lock().expect("lock");
		*next += 1;
		let handle = FetchHandle::new(*next);
		self.jobs.lock().expect("lock").insert(handle, dist.clone());
		self.handles.lock().expect("lock").push(handle);
		self.enqueued.lock().expect("lock").push(dist.to_string());
		handle
	}

	fn wait_for(&self, handle: FetchHandle) -> Result<Vec<PathBuf>, DownloadError> {
		let dist = self.jobs.lock().expect("lock").remove(&handle).ok_or(DownloadError::UnknownHandle(handle))?;
		let mut files = Vec::new();
		for source in &dist.sources {
			let path = source_path(&self.download_dir, source);
			if !path.exists() {
				if dist.fetch_restriction {
					return Err(DownloadError::FetchRestricted(dist.to_string()))
				}
				std::fs::write(&path, source.file_name.as_bytes())?;
			}
			files.push(path);
		}
		Ok(files)
	}

	fn peek(&self, handle: FetchHandle) -> bool {
		self.handles.lock().expect("lock").contains(&handle)
	}

	fn has_local_copy(&self, dist: &Distribution) -> bool {
		dist.sources.iter().all(|s| source_path(&self.download_dir, s).exists())
	}
}

/// Installer that writes one marker file per distribution and remembers the install order.
pub struct RecordingInstaller {
	install_root: PathBuf,
	fail_on: Option<String>,
	pub installed: Arc<Mutex<Vec<String>>>,
}

impl RecordingInstaller {
	pub fn new(config: &Config) -> Self {
		Self { install_root: config.install_root().to_path_buf(), fail_on: None, installed: Default::default() }
	}

	/// Fails the install phase for the package `cat/pkg`.
	pub fn failing_on(mut self, full_name: &str) -> Self {
		self.fail_on = Some(full_name.to_string());
		self
	}

	pub fn installed(&self) -> Vec<String> {
		self.installed.lock().expect("lock").clone()
	}

	/// The marker file written for `dist`, relative to the install root.
	pub fn marker(dist: &Distribution) -> PathBuf {
		Path::new(&dist.category).join(&dist.name).join(format!("{}.txt", dist.version))
	}
}

impl Installer for RecordingInstaller {
	fn project(&self, dist: &Distribution, _sources: &[PathBuf]) -> Result<Box<dyn InstallProject>, InstallError> {
		Ok(Box::new(RecordingProject {
			name: dist.to_string(),
			marker: Self::marker(dist),
			install_root: self.install_root.clone(),
			fail: self.fail_on.as_deref() == Some(dist.full_name().as_str()),
			installed: self.installed.clone(),
		}))
	}
}

struct RecordingProject {
	name: String,
	marker: PathBuf,
	install_root: PathBuf,
	fail: bool,
	installed: Arc<Mutex<Vec<String>>>,
}

impl InstallProject for RecordingProject {
	fn unpack(&mut self) -> Result<(), InstallError> { Ok(()) }
	fn compile(&mut self) -> Result<(), InstallError> { Ok(()) }
	fn test(&mut self) -> Result<(), InstallError> { Ok(()) }

	fn install(&mut self) -> Result<InstallManifest, InstallError> {
		if self.fail {
			return Err(InstallError::PhaseFailed { phase: winport::installer::InstallPhase::Install, message: "refused by test".to_string() })
		}
		let path = self.install_root.join(&self.marker);
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(&path, self.name.as_bytes())?;
		self.installed.lock().expect("lock").push(self.name.clone());
		Ok(InstallManifest { files: vec![self.marker.clone()] })
	}
}
