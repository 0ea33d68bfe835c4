use std::cmp::Ordering;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Serialize, Deserialize};

/// The version of a distribution.
///
/// # Format
/// `1.2b.3[_suffix[N]][-rN]`
/// - A dotted numeric part of at least one segment, each segment may carry a single trailing letter.
/// - An optional pre or post release suffix, one of `alpha`, `beta`, `pre`, `rc` or `p`, optionally numbered.
/// - An optional revision.
///
/// # Ordering
/// Segments are compared numerically left to right with missing segments counting as `0`,
/// a segment's letter is only looked at when the numbers are equal. Then the suffixes are ranked
/// `alpha < beta < pre < rc < (none) < p` followed by their number. The revision is compared last.
///
/// Equality and hashing agree with the ordering, so `1.2` and `1.2.0` are the same version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageVersion {
	components: Vec<Component>,
	suffix: Option<Suffix>,
	revision: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Component {
	number: u64,
	letter: Option<char>,
}

impl Component {
	const ZERO: Component = Component { number: 0, letter: None };
}

impl Ord for Component {
	fn cmp(&self, other: &Self) -> Ordering {
		self.number.cmp(&other.number)
			.then_with(|| self.letter.cmp(&other.letter))
	}
}

impl PartialOrd for Component {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

/// Release suffixes in ascending order. A version without a suffix ranks between [`Rc`](SuffixKind::Rc) and [`P`](SuffixKind::P).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuffixKind {
	Alpha,
	Beta,
	Pre,
	Rc,
	P,
}

impl SuffixKind {
	fn rank(kind: Option<SuffixKind>) -> u8 {
		match kind {
			Some(SuffixKind::Alpha) => 1,
			Some(SuffixKind::Beta) => 2,
			Some(SuffixKind::Pre) => 3,
			Some(SuffixKind::Rc) => 4,
			None => 5,
			Some(SuffixKind::P) => 6,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			SuffixKind::Alpha => "alpha",
			SuffixKind::Beta => "beta",
			SuffixKind::Pre => "pre",
			SuffixKind::Rc => "rc",
			SuffixKind::P => "p",
		}
	}

	fn from_str(s: &str) -> Option<SuffixKind> {
		match s {
			"alpha" => Some(SuffixKind::Alpha),
			"beta" => Some(SuffixKind::Beta),
			"pre" => Some(SuffixKind::Pre),
			"rc" => Some(SuffixKind::Rc),
			"p" => Some(SuffixKind::P),
			_ => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Suffix {
	pub kind: SuffixKind,
	pub number: Option<u64>,
}

fn version_regex() -> &'static Regex {
	static REGEX: OnceLock<Regex> = OnceLock::new();
	REGEX.get_or_init(|| {
		Regex::new(r"^(?P<numbers>\d+[a-z]?(?:\.\d+[a-z]?)*)(?:_(?P<suffix>alpha|beta|pre|rc|p)(?P<suffix_number>\d+)?)?(?:-r(?P<revision>\d+))?$")
			.expect("version regex should compile")
	})
}

impl PackageVersion {
	/// Parses a version string, `None` if it is malformed.
	pub fn try_parse(text: &str) -> Option<Self> {
		let captures = version_regex().captures(text)?;

		let mut components = Vec::<Component>::new();
		for segment in captures.name("numbers")?.as_str().split('.') {
			let (digits, letter) = match segment.chars().last() {
				Some(c) if c.is_ascii_lowercase() => (&segment[..segment.len() - 1], Some(c)),
				_ => (segment, None),
			};
			components.push(Component { number: digits.parse().ok()?, letter });
		}

		let suffix = match captures.name("suffix") {
			Some(kind) => Some(Suffix {
				kind: SuffixKind::from_str(kind.as_str())?,
				number: match captures.name("suffix_number") {
					Some(n) => Some(n.as_str().parse().ok()?),
					None => None,
				},
			}),
			None => None,
		};

		let revision = match captures.name("revision") {
			Some(r) => Some(r.as_str().parse().ok()?),
			None => None,
		};

		Some(PackageVersion { components, suffix, revision })
	}

	/// The numeric segments without their letters.
	pub fn numbers(&self) -> impl Iterator<Item = u64> + '_ {
		self.components.iter().map(|c| c.number)
	}

	pub fn suffix(&self) -> Option<Suffix> {
		self.suffix
	}

	/// The revision, `0` when none was given.
	pub fn revision(&self) -> u64 {
		self.revision.unwrap_or(0)
	}

	/// The same version with the revision dropped.
	pub fn base(&self) -> PackageVersion {
		PackageVersion { revision: None, ..self.clone() }
	}

	/// Components up to the last one that isn't a bare zero, used to hash consistently with [`Ord`].
	fn significant_components(&self) -> &[Component] {
		let len = self.components.iter()
			.rposition(|c| *c != Component::ZERO)
			.map_or(0, |i| i + 1);
		&self.components[..len]
	}
}

impl Ord for PackageVersion {
	fn cmp(&self, other: &Self) -> Ordering {
		let len = std::cmp::max(self.components.len(), other.components.len());
		for i in 0..len {
			let lhs = self.components.get(i).unwrap_or(&Component::ZERO);
			let rhs = other.components.get(i).unwrap_or(&Component::ZERO);
			match lhs.cmp(rhs) {
				Ordering::Equal => {},
				ord => return ord,
			}
		}

		let lhs_rank = SuffixKind::rank(self.suffix.map(|s| s.kind));
		let rhs_rank = SuffixKind::rank(other.suffix.map(|s| s.kind));
		match lhs_rank.cmp(&rhs_rank) {
			Ordering::Equal => {},
			ord => return ord,
		}

		match self.suffix.and_then(|s| s.number).cmp(&other.suffix.and_then(|s| s.number)) {
			Ordering::Equal => {},
			ord => return ord,
		}

		self.revision().cmp(&other.revision())
	}
}

impl PartialOrd for PackageVersion {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for PackageVersion {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for PackageVersion {}

impl std::hash::Hash for PackageVersion {
	fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
		self.significant_components().hash(state);
		SuffixKind::rank(self.suffix.map(|s| s.kind)).hash(state);
		self.suffix.and_then(|s| s.number).hash(state);
		self.revision().hash(state);
	}
}

impl std::fmt::Display for PackageVersion {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for (i, c) in self.components.iter().enumerate() {
			if i > 0 { write!(f, ".")?; }
			write!(f, "{}", c.number)?;
			if let Some(letter) = c.letter { write!(f, "{}", letter)?; }
		}
		if let Some(suffix) = &self.suffix {
			write!(f, "_{}", suffix.kind.as_str())?;
			if let Some(n) = suffix.number { write!(f, "{}", n)?; }
		}
		if let Some(r) = self.revision {
			write!(f, "-r{}", r)?;
		}
		Ok(())
	}
}

impl std::str::FromStr for PackageVersion {
	type Err = crate::Error;
	fn from_str(s: &str) -> Result<Self, Self::Err> {
		PackageVersion::try_parse(s).ok_or_else(|| crate::Error::BadAtomFormat(s.to_string()))
	}
}

impl TryFrom<String> for PackageVersion {
	type Error = crate::Error;
	fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

impl From<PackageVersion> for String {
	fn from(value: PackageVersion) -> Self { value.to_string() }
}

#[cfg(test)]
mod test {
	use super::*;
	use proptest::prelude::*;

	fn v(s: &str) -> PackageVersion {
		PackageVersion::try_parse(s).unwrap()
	}

	#[test] fn version_are_not_compared_lexically() { assert!(v("1.2.4") < v("1.2.10")) }
	#[test] fn version_missing_segments_are_zero() { assert_eq!(v("1.2"), v("1.2.0")) }
	#[test] fn version_short_version_is_lt() { assert!(v("1.2") < v("1.2.1")) }
	#[test] fn version_letter_is_secondary() { assert!(v("1.2") < v("1.2a") && v("1.2a") < v("1.2b") && v("1.2z") < v("1.3")) }
	#[test] fn version_suffix_ranks() {
		assert!(v("1.2_alpha") < v("1.2_alpha1"));
		assert!(v("1.2_alpha1") < v("1.2_beta"));
		assert!(v("1.2_beta") < v("1.2_pre"));
		assert!(v("1.2_pre") < v("1.2_rc3"));
		assert!(v("1.2_rc3") < v("1.2"));
		assert!(v("1.2") < v("1.2_p"));
	}
	#[test] fn version_suffix_number() { assert!(v("1.0_rc2") < v("1.0_rc10")) }
	#[test] fn version_revision_is_last() { assert!(v("1.2-r1") < v("1.2-r2") && v("1.2-r9") < v("1.2.1")) }
	#[test] fn version_missing_revision_is_zero() { assert_eq!(v("1.2-r0"), v("1.2")) }
	#[test] fn version_long_segment_round_trips() { assert_eq!(v("1.2.3.4567890").to_string(), "1.2.3.4567890") }
	#[test] fn version_full_round_trips() { assert_eq!(v("3.0b.1_rc2-r4").to_string(), "3.0b.1_rc2-r4") }

	#[test]
	fn version_rejects_malformed() {
		for bad in ["", "a", "1.", ".1", "1..2", "1.2ab", "1.2_gamma", "1.2-r", "1.2-rc1", "1_p_p", "99999999999999999999"] {
			assert!(PackageVersion::try_parse(bad).is_none(), "{bad} should not parse");
		}
	}

	#[test]
	fn equal_versions_hash_equal() {
		use std::collections::HashSet;
		let set: HashSet<_> = [v("1.2"), v("1.2.0"), v("1.2.0.0-r0")].into_iter().collect();
		assert_eq!(set.len(), 1);
	}

	fn arb_version() -> impl Strategy<Value = String> {
		(
			prop::collection::vec((0u64..20, prop::option::of(prop::sample::select(vec!['a', 'b', 'z']))), 1..5),
			prop::option::of((prop::sample::select(vec!["alpha", "beta", "pre", "rc", "p"]), prop::option::of(0u64..5))),
			prop::option::of(0u64..4),
		).prop_map(|(components, suffix, revision)| {
			let mut s = components.iter()
				.map(|(n, l)| format!("{}{}", n, l.map(String::from).unwrap_or_default()))
				.collect::<Vec<_>>()
				.join(".");
			if let Some((kind, n)) = suffix {
				s += &format!("_{}{}", kind, n.map(|n| n.to_string()).unwrap_or_default());
			}
			if let Some(r) = revision {
				s += &format!("-r{}", r);
			}
			s
		})
	}

	proptest! {
		#[test]
		fn ordering_is_total(a in arb_version(), b in arb_version()) {
			let (a, b) = (v(&a), v(&b));
			let holds = [a < b, a == b, a > b].iter().filter(|x| **x).count();
			prop_assert_eq!(holds, 1);
			prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
		}

		#[test]
		fn display_parses_back(a in arb_version()) {
			prop_assert_eq!(v(&a).to_string(), a);
		}
	}
}
