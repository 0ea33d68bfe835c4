use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Deserialize};

use super::PackageVersion;

/// Comparison applied between a candidate's version and the atom's version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
	Equal,
	NotEqual,
	Less,
	LessOrEqual,
	Greater,
	GreaterOrEqual,
}

impl Operator {
	/// Tests whether `candidate` satisfies `self constraint`.
	pub fn matches(&self, candidate: &PackageVersion, constraint: &PackageVersion) -> bool {
		match self {
			Operator::Equal => candidate == constraint,
			Operator::NotEqual => candidate != constraint,
			Operator::Less => candidate < constraint,
			Operator::LessOrEqual => candidate <= constraint,
			Operator::Greater => candidate > constraint,
			Operator::GreaterOrEqual => candidate >= constraint,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Operator::Equal => "=",
			Operator::NotEqual => "!=",
			Operator::Less => "<",
			Operator::LessOrEqual => "<=",
			Operator::Greater => ">",
			Operator::GreaterOrEqual => ">=",
		}
	}

	fn from_str(s: &str) -> Option<Operator> {
		match s {
			"" | "=" => Some(Operator::Equal),
			"!=" => Some(Operator::NotEqual),
			"<" => Some(Operator::Less),
			"<=" => Some(Operator::LessOrEqual),
			">" => Some(Operator::Greater),
			">=" => Some(Operator::GreaterOrEqual),
			_ => None,
		}
	}
}

/// Which atom grammars [`Atom::parse()`] accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
	/// Only `[op]cat/pkg-ver[:slot]`.
	VersionRequired,
	/// Versioned or bare names.
	VersionOptional,
	/// Only `cat/pkg[:slot]` and `pkg[:slot]`.
	WithoutVersion,
}

impl ParseMode {
	fn allows_version(&self) -> bool {
		matches!(self, ParseMode::VersionRequired | ParseMode::VersionOptional)
	}

	fn allows_bare(&self) -> bool {
		matches!(self, ParseMode::WithoutVersion | ParseMode::VersionOptional)
	}
}

/// A package name with an optional version constraint and a slot.
///
/// The operator is present exactly when the version is. Slot `0` is the default slot.
///
/// Atoms are written `[op]cat/pkg-ver[:slot]`, `cat/pkg[:slot]` or `pkg[:slot]`,
/// the `=` operator being implied when a version is given without one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Atom {
	operator: Option<Operator>,
	category: Option<String>,
	package: String,
	version: Option<PackageVersion>,
	slot: u32,
}

const NAME: &str = r"[a-z0-9]+(?:[-_][a-z0-9]+)*";

fn versioned_regex() -> &'static Regex {
	static REGEX: OnceLock<Regex> = OnceLock::new();
	REGEX.get_or_init(|| {
		Regex::new(&format!(r"^(?P<op><=|>=|!=|<|>|=)?(?P<category>{NAME})/(?P<package>{NAME})-(?P<version>\d+(?:\.\d+){{1,3}})(?::(?P<slot>\d+))?$"))
			.expect("versioned atom regex should compile")
	})
}

fn qualified_regex() -> &'static Regex {
	static REGEX: OnceLock<Regex> = OnceLock::new();
	REGEX.get_or_init(|| {
		Regex::new(&format!(r"^(?P<category>{NAME})/(?P<package>{NAME})(?::(?P<slot>\d+))?$"))
			.expect("qualified atom regex should compile")
	})
}

fn short_regex() -> &'static Regex {
	static REGEX: OnceLock<Regex> = OnceLock::new();
	REGEX.get_or_init(|| {
		Regex::new(&format!(r"^(?P<package>{NAME})(?::(?P<slot>\d+))?$"))
			.expect("short atom regex should compile")
	})
}

impl Atom {
	/// Parses an atom, case insensitively.
	///
	/// # Errors
	/// - [`BadAtomFormat`](crate::Error::BadAtomFormat) when `text` matches none of the grammars allowed by `mode`.
	pub fn parse(text: &str, mode: ParseMode) -> crate::Result<Atom> {
		let lowered = text.trim().to_lowercase();
		let bad = || crate::Error::BadAtomFormat(text.to_string());

		let slot = |captures: &regex::Captures| -> crate::Result<u32> {
			captures.name("slot").map_or(Ok(0), |s| s.as_str().parse().map_err(|_| bad()))
		};

		if mode.allows_version() {
			if let Some(captures) = versioned_regex().captures(&lowered) {
				let operator = Operator::from_str(captures.name("op").map_or("", |m| m.as_str())).ok_or_else(bad)?;
				let version = PackageVersion::try_parse(&captures["version"]).ok_or_else(bad)?;
				return Ok(Atom {
					operator: Some(operator),
					category: Some(captures["category"].to_string()),
					package: captures["package"].to_string(),
					version: Some(version),
					slot: slot(&captures)?,
				});
			}
		}

		if mode.allows_bare() {
			if let Some(captures) = qualified_regex().captures(&lowered) {
				return Ok(Atom::name_only(Some(captures["category"].to_string()), captures["package"].to_string(), slot(&captures)?));
			}
			if let Some(captures) = short_regex().captures(&lowered) {
				return Ok(Atom::name_only(None, captures["package"].to_string(), slot(&captures)?));
			}
		}

		Err(bad())
	}

	/// The exact atom `=cat/pkg-ver:slot` of a concrete distribution.
	pub fn exact(category: impl Into<String>, package: impl Into<String>, version: PackageVersion, slot: u32) -> Atom {
		Atom {
			operator: Some(Operator::Equal),
			category: Some(category.into()),
			package: package.into(),
			version: Some(version),
			slot,
		}
	}

	fn name_only(category: Option<String>, package: String, slot: u32) -> Atom {
		Atom { operator: None, category, package, version: None, slot }
	}

	/// Tests whether `other`, usually the exact atom of a distribution, satisfies this atom.
	///
	/// The package names must agree, and the categories too when both atoms carry one.
	/// With `ignore_version` only the names are compared, otherwise the slots must be equal
	/// and `other`'s version must pass this atom's operator.
	///
	/// An atom written without a slot is in slot 0, so `lib/qt` never matches a distribution
	/// that only exists in slot 5. Ask for `lib/qt:5` instead.
	pub fn matches(&self, other: &Atom, ignore_version: bool) -> bool {
		if self.package != other.package {
			return false
		}
		if let (Some(lhs), Some(rhs)) = (&self.category, &other.category) {
			if lhs != rhs {
				return false
			}
		}
		if ignore_version {
			return true
		}
		if self.slot != other.slot {
			return false
		}
		match (&self.operator, &self.version) {
			(Some(op), Some(constraint)) => other.version.as_ref().map_or(false, |candidate| op.matches(candidate, constraint)),
			_ => true,
		}
	}

	/// The same package and slot without any version constraint.
	pub fn unversioned(&self) -> Atom {
		Atom::name_only(self.category.clone(), self.package.clone(), self.slot)
	}

	pub fn with_slot(&self, slot: u32) -> Atom {
		Atom { slot, ..self.clone() }
	}

	pub fn operator(&self) -> Option<Operator> {
		self.operator
	}

	pub fn category(&self) -> Option<&str> {
		self.category.as_deref()
	}

	pub fn package(&self) -> &str {
		&self.package
	}

	pub fn version(&self) -> Option<&PackageVersion> {
		self.version.as_ref()
	}

	pub fn slot(&self) -> u32 {
		self.slot
	}

	pub fn is_fully_qualified(&self) -> bool {
		self.category.is_some()
	}

	/// `cat/pkg` when qualified, otherwise just `pkg`.
	pub fn full_name(&self) -> String {
		match &self.category {
			Some(category) => format!("{}/{}", category, self.package),
			None => self.package.clone(),
		}
	}
}

impl std::fmt::Display for Atom {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if let Some(op) = self.operator {
			if op != Operator::Equal {
				write!(f, "{}", op.as_str())?;
			}
		}
		write!(f, "{}", self.full_name())?;
		if let Some(version) = &self.version {
			write!(f, "-{}", version)?;
		}
		if self.slot > 0 {
			write!(f, ":{}", self.slot)?;
		}
		Ok(())
	}
}

impl std::str::FromStr for Atom {
	type Err = crate::Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Atom::parse(s, ParseMode::VersionOptional)
	}
}

impl TryFrom<String> for Atom {
	type Error = crate::Error;
	fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<Atom> for String {
	fn from(value: Atom) -> Self { value.to_string() }
}
