use std::collections::HashSet;
use std::sync::Arc;

use super::MergeOptions;
use crate::dependency_graph::{DependencyGraph, SlotConflict};
use crate::installation::download::{Downloader, FetchHandle};
use crate::package::Atom;
use crate::package_state::PackageState;
use crate::ports::{Distribution, MaskKind, PortsTree};

/// What a merge will do to a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MergeFlag {
	/// Nothing is installed in the distribution's slot.
	New,
	/// The same version is already installed.
	Replacing,
	/// A different version is installed in the slot.
	Updating,
	/// The installed version is higher.
	Downgrading,
	/// Installed into a slot other than the default.
	Slot,
	/// The install asks for input.
	Interactive,
	/// Fetch restricted and the sources are missing from the download directory.
	FetchNeeded,
	/// Fetch restricted and the sources are already downloaded.
	FetchExists,
	/// Part of a slot conflict no duplicate can satisfy.
	BlockUnresolved,
	/// The package is in the graph more than once but one of them satisfies every requirement.
	BlockResolved,
}

impl MergeFlag {
	pub const ALL: [MergeFlag; 10] = [
		MergeFlag::New,
		MergeFlag::Replacing,
		MergeFlag::Updating,
		MergeFlag::Downgrading,
		MergeFlag::Slot,
		MergeFlag::Interactive,
		MergeFlag::FetchNeeded,
		MergeFlag::FetchExists,
		MergeFlag::BlockUnresolved,
		MergeFlag::BlockResolved,
	];

	fn bit(self) -> u16 {
		1 << self as u16
	}

	/// Single letter used in merge reports.
	pub fn letter(self) -> char {
		match self {
			MergeFlag::New => 'N',
			MergeFlag::Replacing => 'R',
			MergeFlag::Updating => 'U',
			MergeFlag::Downgrading => 'D',
			MergeFlag::Slot => 'S',
			MergeFlag::Interactive => 'I',
			MergeFlag::FetchNeeded => 'F',
			MergeFlag::FetchExists => 'f',
			MergeFlag::BlockUnresolved => 'B',
			MergeFlag::BlockResolved => 'b',
		}
	}
}

/// Set of [`MergeFlag`]s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MergeFlags(u16);

impl MergeFlags {
	pub fn empty() -> Self {
		Self(0)
	}

	pub fn contains(&self, flag: MergeFlag) -> bool {
		self.0 & flag.bit() != 0
	}

	pub fn insert(&mut self, flag: MergeFlag) {
		self.0 |= flag.bit();
	}

	pub fn remove(&mut self, flag: MergeFlag) {
		self.0 &= !flag.bit();
	}

	pub fn is_empty(&self) -> bool {
		self.0 == 0
	}

	pub fn iter(&self) -> impl Iterator<Item = MergeFlag> + '_ {
		MergeFlag::ALL.into_iter().filter(|f| self.contains(*f))
	}
}

impl FromIterator<MergeFlag> for MergeFlags {
	fn from_iter<T: IntoIterator<Item = MergeFlag>>(iter: T) -> Self {
		let mut flags = MergeFlags::empty();
		for flag in iter {
			flags.insert(flag);
		}
		flags
	}
}

/// One letter column per flag, blank when unset.
impl std::fmt::Display for MergeFlags {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for flag in MergeFlag::ALL {
			write!(f, "{}", if self.contains(flag) { flag.letter() } else { ' ' })?;
		}
		Ok(())
	}
}

#[derive(Debug, Clone)]
pub struct MergeItem {
	pub distribution: Arc<Distribution>,
	/// What is currently installed in the slot.
	pub previous: Option<Atom>,
	/// The user asked for this distribution rather than it being pulled in.
	pub selected: bool,
	pub flags: MergeFlags,
	/// Set once the sources are queued for download.
	pub fetch_handle: Option<FetchHandle>,
}

/// Ordered merge operations, dependencies first.
#[derive(Debug, Clone, Default)]
pub struct MergeSchedule {
	pub items: Vec<MergeItem>,
	/// Masked distributions the merge needs, only filled in pretend mode.
	pub hard_masked: Vec<Arc<Distribution>>,
	pub keyword_masked: Vec<Arc<Distribution>>,
	/// Summed archive size of every item whose sources aren't downloaded yet.
	pub download_size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScheduleTotals {
	pub new: usize,
	pub replacing: usize,
	pub updating: usize,
	pub downgrading: usize,
	pub slot: usize,
	pub interactive: usize,
	pub fetch_needed: usize,
	pub fetch_exists: usize,
	pub blocked: usize,
	pub download_size: u64,
}

impl MergeSchedule {
	pub fn len(&self) -> usize {
		self.items.len()
	}

	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &MergeItem> {
		self.items.iter()
	}

	pub fn get(&self, dist: &Distribution) -> Option<&MergeItem> {
		self.items.iter().find(|i| *i.distribution == *dist)
	}

	pub fn totals(&self) -> ScheduleTotals {
		let count = |flag| self.items.iter().filter(|i| i.flags.contains(flag)).count();
		ScheduleTotals {
			new: count(MergeFlag::New),
			replacing: count(MergeFlag::Replacing),
			updating: count(MergeFlag::Updating),
			downgrading: count(MergeFlag::Downgrading),
			slot: count(MergeFlag::Slot),
			interactive: count(MergeFlag::Interactive),
			fetch_needed: count(MergeFlag::FetchNeeded),
			fetch_exists: count(MergeFlag::FetchExists),
			blocked: count(MergeFlag::BlockUnresolved) + count(MergeFlag::BlockResolved),
			download_size: self.download_size,
		}
	}
}

/// Classifies every distribution of `graph` against what is installed, in topological order.
///
/// No item is dropped and no policy is enforced, see [`build_schedule()`] for that.
/// The installed distribution is looked up by name within the same slot, classification goes
/// `New`, then `Replacing`, then `Updating`, with `Downgrading` added to updates going to a lower version.
///
/// `conflicts` is the result of [`DependencyGraph::find_slot_conflicts()`] on `graph`, its members are flagged `BlockUnresolved`.
pub fn classify(
	graph: &DependencyGraph,
	conflicts: &[SlotConflict],
	state: &dyn PackageState,
	downloader: &dyn Downloader,
	selected: &[Arc<Distribution>],
	options: &MergeOptions,
) -> Vec<MergeItem> {
	let unresolved = conflicts.iter()
		.flat_map(|c| c.distributions.iter())
		.collect::<HashSet<_>>();
	let duplicates = graph.duplicate_packages();
	let duplicated = duplicates.iter()
		.flat_map(|(_, members)| members.iter())
		.collect::<HashSet<_>>();

	graph.topological_order().iter().map(|dist| {
		let previous = state.find_installed(&dist.atom().unversioned())
			.into_iter()
			.max_by(|a, b| a.version().cmp(&b.version()));

		let mut flags = MergeFlags::empty();
		match previous.as_ref().and_then(|p| p.version()) {
			Some(installed) if !options.empty_tree => {
				if *installed == dist.version {
					flags.insert(MergeFlag::Replacing);
				} else {
					flags.insert(MergeFlag::Updating);
					if *installed > dist.version {
						flags.insert(MergeFlag::Downgrading);
					}
				}
			},
			_ => flags.insert(MergeFlag::New),
		}

		if dist.slot > 0 {
			flags.insert(MergeFlag::Slot);
		}
		if dist.interactive {
			flags.insert(MergeFlag::Interactive);
		}
		if dist.fetch_restriction {
			if downloader.has_local_copy(dist) {
				flags.insert(MergeFlag::FetchExists);
			} else {
				flags.insert(MergeFlag::FetchNeeded);
			}
		}

		if unresolved.contains(dist) {
			flags.insert(MergeFlag::BlockUnresolved);
		} else if duplicated.contains(dist) {
			flags.insert(MergeFlag::BlockResolved);
		}

		log::debug!("{} [{}]", dist, flags);
		MergeItem {
			distribution: dist.clone(),
			previous,
			selected: selected.contains(dist),
			flags,
			fetch_handle: None,
		}
	}).collect()
}

/// Builds the schedule for merging `graph`.
///
/// - Replacing items are dropped unless selected and [`no_replace`](MergeOptions::no_replace) is off.
/// - Without [`deep`](MergeOptions::deep), dependencies whose installed version still satisfies every requirement are left alone.
///
/// # Errors
/// - [`MaskedPackage`](crate::Error::MaskedPackage) for the first masked distribution, outside pretend mode.
/// In pretend mode masked distributions are listed in the schedule instead.
/// - [`SlotConflict`](crate::Error::SlotConflict) when the graph has any.
/// - [`FetchRestricted`](crate::Error::FetchRestricted) for the first item with [`FetchNeeded`](MergeFlag::FetchNeeded), outside pretend mode.
pub fn build_schedule(
	config: &crate::Config,
	graph: &DependencyGraph,
	tree: &dyn PortsTree,
	state: &dyn PackageState,
	downloader: &dyn Downloader,
	selected: &[Arc<Distribution>],
	options: &MergeOptions,
) -> crate::Result<MergeSchedule> {
	let mut schedule = MergeSchedule::default();

	for dist in graph.topological_order() {
		let Some(kind) = tree.mask_kind(dist) else { continue };
		if !options.pretend {
			return Err(crate::Error::MaskedPackage { atom: dist.to_string(), kind })
		}
		match kind {
			MaskKind::Hard => schedule.hard_masked.push(dist.clone()),
			MaskKind::Keyword => schedule.keyword_masked.push(dist.clone()),
		}
	}

	let conflicts = graph.find_slot_conflicts();
	if !conflicts.is_empty() {
		return Err(crate::Error::SlotConflict { conflicts })
	}

	for item in classify(graph, &conflicts, state, downloader, selected, options) {
		let dist = &item.distribution;

		if item.flags.contains(MergeFlag::Replacing) && !(item.selected && !options.no_replace) {
			log::debug!("{} is already installed, skipping", dist);
			continue;
		}

		if !options.deep && !item.selected && item.flags.contains(MergeFlag::Updating) {
			let still_satisfies = item.previous.as_ref()
				.and_then(|p| graph.try_check_satisfies(p))
				.unwrap_or(false);
			if still_satisfies {
				log::debug!("Installed {} still satisfies its dependents, not updating to {}", item.previous.as_ref().map_or(String::new(), |p| p.to_string()), dist);
				continue;
			}
		}

		if item.flags.contains(MergeFlag::FetchNeeded) && !options.pretend {
			return Err(crate::Error::FetchRestricted {
				distribution: dist.to_string(),
				directory: config.download_dir().to_path_buf(),
			})
		}

		if !downloader.has_local_copy(dist) {
			schedule.download_size += dist.archive_size;
		}
		schedule.items.push(item);
	}

	log::info!("Scheduled {} of {} distributions", schedule.items.len(), graph.len());
	Ok(schedule)
}

#[cfg(test)]
mod test {
	use std::path::PathBuf;

	use super::*;
	use crate::installation::download::DownloadError;
	use crate::installer::InstallManifest;
	use crate::package_state::InstalledDatabase;
	use crate::ports::InMemoryPortsTree;

	/// Never downloads, reports every fetch restricted distribution as missing.
	struct NothingLocal;

	impl Downloader for NothingLocal {
		fn enqueue(&self, _dist: &Arc<Distribution>) -> FetchHandle {
			unimplemented!()
		}
		fn wait_for(&self, _handle: FetchHandle) -> Result<Vec<PathBuf>, DownloadError> {
			unimplemented!()
		}
		fn peek(&self, _handle: FetchHandle) -> bool {
			false
		}
		fn has_local_copy(&self, dist: &Distribution) -> bool {
			dist.sources.is_empty()
		}
	}

	fn dist(category: &str, name: &str, version: &str, slot: u32, deps: &[&str]) -> Distribution {
		let mut dist = Distribution::new(category, name, version.parse().unwrap(), slot);
		dist.dependencies = deps.iter().map(|d| d.parse().unwrap()).collect();
		dist
	}

	fn install(db: &mut InstalledDatabase, category: &str, name: &str, version: &str, slot: u32) {
		db.record_install(&dist(category, name, version, slot, &[]), &InstallManifest::default()).unwrap();
	}

	fn flags(list: &[MergeFlag]) -> MergeFlags {
		list.iter().copied().collect()
	}

	#[test]
	fn flags_set_operations() {
		let mut f = flags(&[MergeFlag::New, MergeFlag::Slot]);
		assert!(f.contains(MergeFlag::Slot));
		f.remove(MergeFlag::Slot);
		assert_eq!(f.iter().collect::<Vec<_>>(), vec![MergeFlag::New]);
		assert_eq!(f.to_string(), "N         ");
		assert!(MergeFlags::empty().is_empty());
	}

	#[test]
	fn classification_priority() {
		let mut tree = InMemoryPortsTree::new();
		let app = tree.add(dist("app", "top", "1.0", 0, &["lib/new", "lib/same", "lib/older", "lib/newer", "lib/slotted:2"]));
		tree.add(dist("lib", "new", "1.0", 0, &[]));
		tree.add(dist("lib", "same", "1.0", 0, &[]));
		tree.add(dist("lib", "older", "2.0", 0, &[]));
		tree.add(dist("lib", "newer", "1.0", 0, &[]));
		tree.add(dist("lib", "slotted", "2.0", 2, &[]));

		let mut db = InstalledDatabase::in_memory();
		install(&mut db, "lib", "same", "1.0", 0);
		install(&mut db, "lib", "older", "1.0", 0);
		install(&mut db, "lib", "newer", "3.0", 0);
		install(&mut db, "lib", "slotted", "1.0", 1);

		let graph = DependencyGraph::compute(&[app.clone()], &tree).unwrap();
		let items = classify(&graph, &[], &db, &NothingLocal, &[app], &MergeOptions::default());
		let flags_of = |name: &str| items.iter().find(|i| i.distribution.name == name).unwrap().flags;

		assert_eq!(flags_of("new"), flags(&[MergeFlag::New]));
		assert_eq!(flags_of("same"), flags(&[MergeFlag::Replacing]));
		assert_eq!(flags_of("older"), flags(&[MergeFlag::Updating]));
		assert_eq!(flags_of("newer"), flags(&[MergeFlag::Updating, MergeFlag::Downgrading]));
		/* Slot 1 being installed doesn't matter for slot 2 */
		assert_eq!(flags_of("slotted"), flags(&[MergeFlag::New, MergeFlag::Slot]));
		assert!(items.iter().find(|i| i.distribution.name == "top").unwrap().selected);

		let empty = classify(&graph, &[], &db, &NothingLocal, &[], &MergeOptions { empty_tree: true, ..Default::default() });
		assert!(empty.iter().all(|i| i.flags.contains(MergeFlag::New)));
	}

	#[test]
	fn replacing_selected_is_kept_unless_no_replace() {
		let mut tree = InMemoryPortsTree::new();
		let foo = tree.add(dist("app", "foo", "1.0", 0, &[]));
		let mut db = InstalledDatabase::in_memory();
		install(&mut db, "app", "foo", "1.0", 0);
		let config = crate::Config::default();
		let graph = DependencyGraph::compute(&[foo.clone()], &tree).unwrap();
		let selected = [foo];

		let schedule = build_schedule(&config, &graph, &tree, &db, &NothingLocal, &selected, &MergeOptions::default()).unwrap();
		assert_eq!(schedule.len(), 1);
		assert!(schedule.items[0].flags.contains(MergeFlag::Replacing));

		let options = MergeOptions { no_replace: true, ..Default::default() };
		assert!(build_schedule(&config, &graph, &tree, &db, &NothingLocal, &selected, &options).unwrap().is_empty());
	}

	#[test]
	fn deep_updates_satisfied_dependencies() {
		let mut tree = InMemoryPortsTree::new();
		let foo = tree.add(dist("app", "foo", "1.0", 0, &[">=lib/bar-1.0"]));
		tree.add(dist("lib", "bar", "1.0", 0, &[]));
		tree.add(dist("lib", "bar", "2.0", 0, &[]));
		let mut db = InstalledDatabase::in_memory();
		install(&mut db, "lib", "bar", "1.0", 0);
		let config = crate::Config::default();
		let graph = DependencyGraph::compute(&[foo.clone()], &tree).unwrap();
		let selected = [foo];

		let shallow = build_schedule(&config, &graph, &tree, &db, &NothingLocal, &selected, &MergeOptions::default()).unwrap();
		assert_eq!(shallow.iter().map(|i| i.distribution.name.as_str()).collect::<Vec<_>>(), vec!["foo"]);

		let deep = build_schedule(&config, &graph, &tree, &db, &NothingLocal, &selected, &MergeOptions { deep: true, ..Default::default() }).unwrap();
		assert_eq!(deep.len(), 2);
		assert!(deep.items[0].flags.contains(MergeFlag::Updating));
		assert_eq!(deep.items[0].previous, Some(dist("lib", "bar", "1.0", 0, &[]).atom()));
	}

	#[test]
	fn shallow_updates_unsatisfying_dependencies() {
		let mut tree = InMemoryPortsTree::new();
		let foo = tree.add(dist("app", "foo", "1.0", 0, &[">=lib/bar-2.0"]));
		tree.add(dist("lib", "bar", "1.0", 0, &[]));
		tree.add(dist("lib", "bar", "2.0", 0, &[]));
		let mut db = InstalledDatabase::in_memory();
		install(&mut db, "lib", "bar", "1.0", 0);
		let config = crate::Config::default();
		let graph = DependencyGraph::compute(&[foo.clone()], &tree).unwrap();
		assert_eq!(graph.try_check_satisfies(&dist("lib", "bar", "1.0", 0, &[]).atom()), Some(false));

		let shallow = build_schedule(&config, &graph, &tree, &db, &NothingLocal, &[foo], &MergeOptions::default()).unwrap();
		assert_eq!(shallow.iter().map(|i| i.distribution.to_string()).collect::<Vec<_>>(), vec!["lib/bar-2.0", "app/foo-1.0"]);
		assert_eq!(shallow.items[0].flags, flags(&[MergeFlag::Updating]));
		assert!(!shallow.items[0].selected);
	}

	#[test]
	fn shallow_downgrades_dependencies() {
		let mut tree = InMemoryPortsTree::new();
		let foo = tree.add(dist("app", "foo", "1.0", 0, &["<lib/bar-2.0"]));
		tree.add(dist("lib", "bar", "1.0", 0, &[]));
		tree.add(dist("lib", "bar", "1.5", 0, &[]));
		tree.add(dist("lib", "bar", "3.0", 0, &[]));
		let mut db = InstalledDatabase::in_memory();
		install(&mut db, "lib", "bar", "3.0", 0);
		let config = crate::Config::default();
		let graph = DependencyGraph::compute(&[foo.clone()], &tree).unwrap();

		for deep in [false, true] {
			let schedule = build_schedule(&config, &graph, &tree, &db, &NothingLocal, &[foo.clone()], &MergeOptions { deep, ..Default::default() }).unwrap();
			assert_eq!(schedule.len(), 2);
			let bar = &schedule.items[0];
			assert_eq!(bar.distribution.to_string(), "lib/bar-1.5");
			assert_eq!(bar.flags, flags(&[MergeFlag::Updating, MergeFlag::Downgrading]));
			assert_eq!(bar.previous, Some(dist("lib", "bar", "3.0", 0, &[]).atom()));
			assert_eq!(schedule.totals().downgrading, 1);
		}
	}

	#[test]
	fn masked_fails_unless_pretend() {
		let mut tree = InMemoryPortsTree::new();
		let foo = tree.add(dist("app", "foo", "1.0", 0, &["lib/bar"]));
		let mut bar = dist("lib", "bar", "1.0", 0, &[]);
		bar.keywords = vec!["~amd64".to_string()];
		tree.add(bar);
		tree.hard_mask("app/foo".parse().unwrap());
		let db = InstalledDatabase::in_memory();
		let config = crate::Config::default();
		let graph = DependencyGraph::compute(&[foo.clone()], &tree).unwrap();
		let selected = [foo];

		match build_schedule(&config, &graph, &tree, &db, &NothingLocal, &selected, &MergeOptions::default()) {
			Err(crate::Error::MaskedPackage { atom, kind }) => {
				assert_eq!(atom, "lib/bar-1.0");
				assert_eq!(kind, MaskKind::Keyword);
			},
			other => panic!("expected masked package, got {:?}", other),
		}

		let pretend = build_schedule(&config, &graph, &tree, &db, &NothingLocal, &selected, &MergeOptions { pretend: true, ..Default::default() }).unwrap();
		assert_eq!(pretend.hard_masked.len(), 1);
		assert_eq!(pretend.keyword_masked.len(), 1);
		assert_eq!(pretend.len(), 2);
	}

	#[test]
	fn resolved_duplicates_are_marked() {
		let mut tree = InMemoryPortsTree::new();
		let foo = tree.add(dist("app", "foo", "1.0", 0, &[">=lib/bar-1.0"]));
		let baz = tree.add(dist("app", "baz", "1.0", 0, &["=lib/bar-1.0"]));
		tree.add(dist("lib", "bar", "1.0", 0, &[]));
		tree.add(dist("lib", "bar", "2.0", 0, &[]));
		let graph = DependencyGraph::compute(&[foo, baz], &tree).unwrap();

		let items = classify(&graph, &graph.find_slot_conflicts(), &InstalledDatabase::in_memory(), &NothingLocal, &[], &MergeOptions::default());
		let blocked = items.iter().filter(|i| i.flags.contains(MergeFlag::BlockResolved)).count();
		assert_eq!(blocked, 2);
		assert!(items.iter().all(|i| !i.flags.contains(MergeFlag::BlockUnresolved)));
	}

	#[test]
	fn unresolved_conflicts_are_marked() {
		let mut tree = InMemoryPortsTree::new();
		let foo = tree.add(dist("app", "foo", "1.0", 0, &["lib/bar:1"]));
		let baz = tree.add(dist("app", "baz", "1.0", 0, &["lib/bar:2"]));
		tree.add(dist("lib", "bar", "1.0", 1, &[]));
		tree.add(dist("lib", "bar", "2.0", 2, &[]));
		let graph = DependencyGraph::compute(&[foo.clone(), baz], &tree).unwrap();

		let items = classify(&graph, &graph.find_slot_conflicts(), &InstalledDatabase::in_memory(), &NothingLocal, &[], &MergeOptions::default());
		assert_eq!(items.iter().filter(|i| i.flags.contains(MergeFlag::BlockUnresolved)).count(), 2);

		/* Only the conflicts handed in are flagged */
		let unchecked = classify(&graph, &[], &InstalledDatabase::in_memory(), &NothingLocal, &[], &MergeOptions::default());
		assert!(unchecked.iter().all(|i| !i.flags.contains(MergeFlag::BlockUnresolved)));
		assert_eq!(unchecked.iter().filter(|i| i.flags.contains(MergeFlag::BlockResolved)).count(), 2);

		let config = crate::Config::default();
		assert!(matches!(
			build_schedule(&config, &graph, &tree, &InstalledDatabase::in_memory(), &NothingLocal, &[foo], &MergeOptions::default()),
			Err(crate::Error::SlotConflict { .. })
		));
	}
}
