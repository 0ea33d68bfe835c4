//! Value types describing packages: version strings and the atoms used to select them.

mod package_version;
pub use package_version::PackageVersion;
pub use package_version::Suffix;
pub use package_version::SuffixKind;

mod atom;
pub use atom::Atom;
pub use atom::Operator;
pub use atom::ParseMode;
