use std::io::Write;
use std::sync::Arc;

use winport::merge::*;
use winport::package_state::InstalledDatabase;
use winport::ports::{Distribution, InMemoryPortsTree};
use winport::{Atom, DependencyGraph, PackageState};

const USAGE: &str = "Usage: winport [options] merge|unmerge|depgraph|world [atoms...]";

#[tokio::main]
async fn main() {
	let mut opts;

	/* Parse console input */
	let parsed_options = {
		let args: Vec<String> = std::env::args().collect();

		opts = getopts::Options::new();
		opts.optflag( "h", "help",       "Show help");
		opts.optflag( "v", "verbose",    "Increased verbosity");
		opts.optopt(  "t", "tree",       "Ports tree manifest to read, defaults to tree.json in the data directory", "FILE");
		opts.optflag( "p", "pretend",    "Only show what would be done");
		opts.optflag( "1", "oneshot",    "Don't add the packages to the world set");
		opts.optflag( "",  "noreplace",  "Skip packages that are already installed");
		opts.optflag( "e", "emptytree",  "Reinstall the whole dependency tree");
		opts.optflag( "f", "fetchonly",  "Only download the sources");
		opts.optflag( "D", "deep",       "Also update installed dependencies");
		opts.optflag( "u", "update",     "Update to the best version, skipping versions that no longer exist");
		opts.parsing_style(getopts::ParsingStyle::FloatingFrees);

		let parsed_options = match opts.parse(&args[1..]) {
			Ok(m)  => { m }
			Err(e) => { println!("Unable to parse options: {}", e); return }
		};

		if parsed_options.opt_present("h") || parsed_options.free.is_empty() {
			eprintln!("{}", opts.usage(USAGE));
			return;
		}

		parsed_options
	};

	let mut logger = env_logger::Builder::from_default_env();
	if parsed_options.opt_present("v") {
		logger.filter_level(log::LevelFilter::Debug);
	}
	logger.init();

	let config = winport::Config::load_from_disk().unwrap_or_else(|e| {
		log::warn!("Failed to read config file: {}", e);
		log::warn!("Using default config.");
		winport::Config::default()
	});

	let mut db = match InstalledDatabase::load_from_disk(&config) {
		Ok(db) => db,
		Err(e) => { log::error!("Failed to open installed database: {}", e); return },
	};

	let options = MergeOptions {
		pretend: parsed_options.opt_present("p"),
		oneshot: parsed_options.opt_present("1"),
		no_replace: parsed_options.opt_present("noreplace"),
		empty_tree: parsed_options.opt_present("e"),
		fetch_only: parsed_options.opt_present("f"),
		deep: parsed_options.opt_present("D"),
		update: parsed_options.opt_present("u"),
	};

	let cancel = CancelToken::new();
	{
		let cancel = cancel.clone();
		tokio::spawn(async move {
			if tokio::signal::ctrl_c().await.is_ok() {
				eprintln!("Interrupted, stopping after the current package.");
				cancel.cancel();
			}
		});
	}

	let command = parsed_options.free[0].as_str();
	let arguments = &parsed_options.free[1..];

	let result = tokio::task::block_in_place(|| match command {
		"world" => {
			for atom in db.world() {
				println!("{}", atom);
			}
			Ok(())
		},
		"unmerge" => parse_atoms(arguments).and_then(|atoms| unmerge(&config, &mut db, &atoms, options.pretend, cancel)),
		"merge" | "depgraph" => {
			load_tree(&config, parsed_options.opt_str("t")).and_then(|tree| {
				if command == "depgraph" {
					parse_atoms(arguments).and_then(|atoms| depgraph(&tree, &atoms))
				} else {
					let atoms = if arguments.len() == 1 && arguments[0] == "world" {
						world_targets(&db)
					} else {
						parse_atoms(arguments)?
					};
					merge(&config, &tree, &mut db, &atoms, options, cancel)
				}
			})
		},
		other => Err(Error::UnknownCommand(other.to_string())),
	});

	if let Err(e) = result {
		if let Error::Winport(winport::Error::SlotConflict { conflicts }) = &e {
			for conflict in conflicts {
				eprint!("{}", conflict);
			}
		}
		log::error!("{}", e);
		std::process::exit(1);
	}
}

fn parse_atoms(arguments: &[String]) -> Result<Vec<Atom>, Error> {
	if arguments.is_empty() {
		return Err(Error::MissingArgument("atoms"))
	}
	Ok(arguments.iter().map(|a| a.parse::<Atom>()).collect::<winport::Result<Vec<_>>>()?)
}

fn load_tree(config: &winport::Config, path: Option<String>) -> Result<InMemoryPortsTree, Error> {
	let path = path.map(std::path::PathBuf::from).unwrap_or_else(|| config.data_dir().join("tree.json"));
	log::debug!("Reading ports tree from {}", path.display());
	let mut tree = InMemoryPortsTree::load_from_file(path)?;
	tree.accept_keywords(config.accept_keywords().iter().cloned());
	Ok(tree)
}

fn depgraph(tree: &InMemoryPortsTree, atoms: &[Atom]) -> Result<(), Error> {
	let targets = resolve_targets(tree, atoms, &MergeOptions::default())?;
	let graph = DependencyGraph::compute(&targets, tree)?;
	graph.tree().walk(|depth, node| {
		println!("{}{}", "  ".repeat(depth), node.distribution);
	});
	Ok(())
}

fn merge(config: &winport::Config, tree: &InMemoryPortsTree, db: &mut InstalledDatabase, atoms: &[Atom], options: MergeOptions, cancel: CancelToken) -> Result<(), Error> {
	let targets = resolve_targets(tree, atoms, &options)?;
	if targets.is_empty() {
		println!("Nothing to merge.");
		return Ok(())
	}

	let downloader = winport::installation::download::DownloadQueue::new(config)?;
	let installer = winport::installer::ArchiveInstaller::new(config);

	/* Always show the schedule first */
	let preview = MergeWorker::new(config, tree, db, &downloader, &installer, MergeOptions { pretend: true, ..options })
		.merge(&targets, |_| {})?;
	print_schedule(&preview);

	if options.pretend || preview.is_empty() {
		return Ok(())
	}
	if !preview.hard_masked.is_empty() || !preview.keyword_masked.is_empty() {
		return Err(winport::Error::MaskedPackage {
			atom: preview.hard_masked.iter().chain(&preview.keyword_masked).map(|d| d.to_string()).collect::<Vec<_>>().join(", "),
			kind: if preview.hard_masked.is_empty() { winport::ports::MaskKind::Keyword } else { winport::ports::MaskKind::Hard },
		}.into())
	}
	confirm()?;

	MergeWorker::new(config, tree, db, &downloader, &installer, options)
		.with_cancel_token(cancel)
		.merge(&targets, |event| match event {
			MergeEvent::FetchQueued { distribution } => log::debug!("Queued {}", distribution),
			MergeEvent::Installing { index, total, distribution } => println!(">>> Installing ({} of {}) {}", index + 1, total, distribution),
			MergeEvent::Installed { distribution, files } => println!(">>> Installed {} ({} files)", distribution, files),
			MergeEvent::TrashPurged { files } => log::info!("Purged {} files", files),
			_ => {},
		})?;

	Ok(())
}

fn print_schedule(schedule: &MergeSchedule) {
	fn kib(size: u64) -> String {
		format!("{} KiB", (size + 1023) / 1024)
	}

	println!("These are the packages that would be merged, in order:\n");
	for item in schedule.iter() {
		let previous = item.previous.as_ref()
			.filter(|_| !item.flags.contains(MergeFlag::Replacing))
			.and_then(|p| p.version().map(|v| format!(" [{}]", v)))
			.unwrap_or_default();
		println!("[{}] {}{} {} (repo {})", item.flags, item.distribution, previous, kib(item.distribution.archive_size), item.distribution.repository);
	}

	let totals = schedule.totals();
	println!(
		"\nTotal: {} packages ({} new, {} updates, {} downgrades, {} reinstalls, {} in new slots), size of downloads: {}",
		schedule.len(), totals.new, totals.updating, totals.downgrading, totals.replacing, totals.slot, kib(totals.download_size),
	);
	if totals.fetch_needed > 0 {
		println!("{} packages have to be downloaded by hand.", totals.fetch_needed);
	}
	if totals.interactive > 0 {
		println!("{} packages will ask for input while installing.", totals.interactive);
	}

	print_mask_list("The following packages are hard masked and have to be unmasked:", &schedule.hard_masked);
	print_mask_list("The following packages are keyword masked and need their keywords accepted:", &schedule.keyword_masked);
}

fn print_mask_list(header: &str, dists: &[Arc<Distribution>]) {
	if dists.is_empty() { return; }
	println!("\n{}", header);
	for dist in dists {
		println!("\t={}  keywords: {}", dist, dist.keywords.join(" "));
	}
}

fn unmerge(config: &winport::Config, db: &mut InstalledDatabase, atoms: &[Atom], pretend: bool, cancel: CancelToken) -> Result<(), Error> {
	let plan = UnmergePlan::compute(db, atoms)?;
	for atom in &plan.selected {
		println!("  selected: {}", atom);
	}
	for atom in &plan.protected {
		println!(" protected: {}", atom);
	}
	for atom in &plan.omitted {
		println!("   omitted: {}", atom);
	}

	if pretend || plan.is_empty() {
		return Ok(())
	}
	confirm()?;

	UnmergeWorker::new(config, db, false)
		.with_cancel_token(cancel)
		.execute(&plan, |event| if let MergeEvent::Removed { atom, files } = event {
			println!(">>> Removed {} ({} files)", atom, files);
		})?;
	Ok(())
}

fn confirm() -> Result<(), Error> {
	let stdin = std::io::stdin();
	print!("Commit changes? [(y)/n] ");
	let _ = std::io::stdout().flush();
	loop {
		let mut input = String::new();
		let _ = stdin.read_line(&mut input);
		let input = input.trim().to_lowercase();
		if input == "y" || input.is_empty() {
			return Ok(())
		} else if input == "n" {
			return Err(Error::UserCancelled)
		} else {
			println!("\nInput invalid.")
		}
	}
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Winport(#[from] winport::Error),
	#[error("download error: {0}")]
	Download(#[from] winport::installation::download::DownloadError),
	#[error("missing argument: {0}")]
	MissingArgument(&'static str),
	#[error("unknown command \"{0}\"")]
	UnknownCommand(String),
	#[error("user cancelled an action")]
	UserCancelled,
}
