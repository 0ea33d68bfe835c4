//! # Installation
//!
//! Getting a distribution's sources onto disk and cleaning up after the files it replaces.
//!
//! - [`download`] fetches sources in the background while earlier installs run.
//! - [`content`] verifies what was fetched.
//! - [`trash`] holds the files of replaced and removed packages until the merge is done.

pub mod download;
pub mod content;
pub mod trash;
