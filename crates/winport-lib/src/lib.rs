//! Dependency resolution and merge scheduling for a ports-tree based package manager.
//!
//! # Usage
//! 1. Load a [`ports::PortsTree`] and a [`package_state::PackageState`].
//! 1. Turn the user's atoms into root distributions with [`merge::resolve_targets()`].
//! 1. Hand them to a [`merge::MergeWorker`] which computes the [`DependencyGraph`],
//! classifies every distribution and installs them in dependency order.

pub mod error;
pub use error::Result;
pub use error::Error;

pub mod config;
pub use config::Config;

pub mod package;
pub use package::Atom;
pub use package::PackageVersion;

pub mod ports;
pub use ports::Distribution;
pub use ports::PortsTree;

pub mod dependency_graph;
pub use dependency_graph::DependencyGraph;

pub mod package_state;
pub use package_state::PackageState;

pub mod installation;
pub mod installer;
pub mod merge;
