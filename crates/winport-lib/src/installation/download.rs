//! Downloads a distribution's sources.
//!
//! [`DownloadQueue`] drains a FIFO of requested distributions on a single worker thread.
//! The caller keeps a [`FetchHandle`] per request and only blocks on it when the distribution is about to be installed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;

use crate::ports::Distribution;

/// How long [`DownloadQueue::wait_for()`] sleeps between checks.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors that can occur during the download process.
#[derive(Debug, Error)]
pub enum DownloadError {
	/// The distribution can't be fetched automatically and its files are not in the download directory.
	#[error("{0} is fetch restricted")]
	FetchRestricted(String),
	/// The handle was never issued or its result was already collected.
	#[error("unknown fetch handle {0:?}")]
	UnknownHandle(FetchHandle),
	/// The worker stopped before finishing the download.
	#[error("download worker stopped")]
	WorkerStopped,
	#[error("reqwest error: {0}")]
	Reqwest(#[from] reqwest::Error),
	#[error("IO error: {0}")]
	IO(#[from] std::io::Error),
}

/// Identifies a single [`Downloader::enqueue()`] request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchHandle(u64);

impl FetchHandle {
	/// For [`Downloader`] implementations issuing their own handles.
	pub fn new(id: u64) -> Self {
		Self(id)
	}

	pub fn id(&self) -> u64 {
		self.0
	}
}

pub trait Downloader {
	/// Queues the sources of `dist` for download.
	fn enqueue(&self, dist: &Arc<Distribution>) -> FetchHandle;

	/// Blocks until the download behind `handle` is done, returning the local source files in source order.
	///
	/// Each handle can only be waited for once.
	fn wait_for(&self, handle: FetchHandle) -> Result<Vec<PathBuf>, DownloadError>;

	/// Whether the download behind `handle` is done, never blocks.
	fn peek(&self, handle: FetchHandle) -> bool;

	/// Whether every source of `dist` is already in the download directory.
	fn has_local_copy(&self, dist: &Distribution) -> bool;
}

/// Local path a source is downloaded to.
pub fn source_path(download_dir: &Path, source: &crate::ports::Source) -> PathBuf {
	download_dir.join(&source.file_name)
}

struct Job {
	handle: FetchHandle,
	dist: Arc<Distribution>,
}

#[derive(Default)]
struct Shared {
	jobs: Mutex<VecDeque<Job>>,
	completed: Mutex<HashMap<FetchHandle, Result<Vec<PathBuf>, DownloadError>>>,
	stop: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// [`Downloader`] backed by a worker thread running its own tokio runtime.
pub struct DownloadQueue {
	shared: Arc<Shared>,
	pending: Mutex<HashSet<FetchHandle>>,
	next_handle: AtomicU64,
	download_dir: PathBuf,
	worker: Option<std::thread::JoinHandle<()>>,
}

impl DownloadQueue {
	/// Starts the worker thread.
	///
	/// # Errors
	/// - [`Reqwest`](DownloadError::Reqwest) when the client can't be built.
	/// - [`IO`](DownloadError::IO) when the runtime can't be built.
	pub fn new(config: &crate::Config) -> Result<DownloadQueue, DownloadError> {
		let client = reqwest::Client::builder()
			.https_only(config.https_only())
			.build()?;
		let runtime = tokio::runtime::Builder::new_current_thread()
			.enable_all()
			.build()?;

		let shared = Arc::new(Shared::default());
		let download_dir = config.download_dir().to_path_buf();

		let worker = {
			let shared = shared.clone();
			let download_dir = download_dir.clone();
			std::thread::Builder::new()
				.name("winport-download".to_string())
				.spawn(move || {
					while !shared.stop.load(Ordering::Relaxed) {
						/* Never hold the lock across the download */
						let job = lock(&shared.jobs).pop_front();
						let Some(job) = job else {
							std::thread::sleep(POLL_INTERVAL);
							continue;
						};
						let result = runtime.block_on(fetch(&client, &download_dir, &job.dist));
						if let Err(e) = &result {
							log::warn!("Download of {} failed: {}", job.dist, e);
						}
						lock(&shared.completed).insert(job.handle, result);
					}
					log::trace!("Download worker stopped");
				})?
		};

		Ok(DownloadQueue {
			shared,
			pending: Default::default(),
			next_handle: AtomicU64::new(0),
			download_dir,
			worker: Some(worker),
		})
	}

	pub fn download_dir(&self) -> &Path {
		&self.download_dir
	}

	fn worker_stopped(&self) -> bool {
		self.worker.as_ref().map_or(true, |w| w.is_finished())
	}
}

impl Downloader for DownloadQueue {
	fn enqueue(&self, dist: &Arc<Distribution>) -> FetchHandle {
		let handle = FetchHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
		log::debug!("Queueing download of {}", dist);
		lock(&self.pending).insert(handle);
		lock(&self.shared.jobs).push_back(Job { handle, dist: dist.clone() });
		handle
	}

	fn wait_for(&self, handle: FetchHandle) -> Result<Vec<PathBuf>, DownloadError> {
		if !lock(&self.pending).contains(&handle) {
			return Err(DownloadError::UnknownHandle(handle))
		}
		loop {
			let result = lock(&self.shared.completed).remove(&handle);
			if let Some(result) = result {
				lock(&self.pending).remove(&handle);
				return result
			}
			if self.worker_stopped() {
				return Err(DownloadError::WorkerStopped)
			}
			std::thread::sleep(POLL_INTERVAL);
		}
	}

	fn peek(&self, handle: FetchHandle) -> bool {
		lock(&self.shared.completed).contains_key(&handle)
	}

	fn has_local_copy(&self, dist: &Distribution) -> bool {
		dist.sources.iter().all(|s| source_path(&self.download_dir, s).exists())
	}
}

impl Drop for DownloadQueue {
	fn drop(&mut self) {
		self.shared.stop.store(true, Ordering::Relaxed);
		if let Some(worker) = self.worker.take() {
			if worker.join().is_err() {
				log::error!("Download worker panicked");
			}
		}
	}
}

async fn fetch(client: &reqwest::Client, download_dir: &Path, dist: &Distribution) -> Result<Vec<PathBuf>, DownloadError> {
	let mut paths = Vec::with_capacity(dist.sources.len());
	for source in &dist.sources {
		let path = source_path(download_dir, source);
		if path.exists() {
			log::info!("{} already downloaded, skipping.", source.file_name);
			paths.push(path);
			continue;
		}
		if dist.fetch_restriction {
			return Err(DownloadError::FetchRestricted(dist.to_string()))
		}

		log::info!("Downloading {} from {}", source.file_name, source.url);
		let content = client
			.get(&source.url)
			.send()
			.await?
			.error_for_status()?
			.bytes()
			.await?;

		tokio::fs::create_dir_all(download_dir).await?;
		/* Only renamed into place once complete */
		let partial = path.with_extension("part");
		tokio::fs::write(&partial, &content).await?;
		tokio::fs::rename(&partial, &path).await?;
		paths.push(path);
	}
	Ok(paths)
}
