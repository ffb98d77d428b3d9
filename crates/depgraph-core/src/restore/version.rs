//! Package versions and interval version ranges.
//!
//! Versions are semver with lenient short forms. Ranges use interval
//! notation:
//!
//! | text          | meaning            |
//! |---------------|--------------------|
//! | `1.0`         | `>= 1.0.0`         |
//! | `[1.0]`       | exactly `1.0.0`    |
//! | `[1.0,2.0)`   | `>= 1.0.0, < 2.0.0`|
//! | `(,2.0]`      | `<= 2.0.0`         |
//! | `*` or empty  | any version        |

use semver::Version;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Version or range text that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    #[error("Invalid version range '{range}': {reason}")]
    InvalidRange { range: String, reason: String },
}

/// Parse a version, accepting `1`, `1.2`, `1.2.3`, and `1.2.3.0` forms.
///
/// Prerelease and build suffixes are kept. A nonzero fourth component is
/// rejected because semver has no slot for it.
pub fn parse_version(text: &str) -> Result<Version, VersionError> {
    let text = text.trim();
    let invalid = || VersionError::InvalidVersion(text.to_string());

    let split = text.find(['-', '+']).unwrap_or(text.len());
    let (core, suffix) = text.split_at(split);

    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 4 {
        return Err(invalid());
    }

    let mut numbers = [0u64; 4];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        *slot = part.parse().map_err(|_| invalid())?;
    }
    if numbers[3] != 0 {
        return Err(invalid());
    }

    Version::parse(&format!(
        "{}.{}.{}{suffix}",
        numbers[0], numbers[1], numbers[2]
    ))
    .map_err(|_| invalid())
}

/// An interval of acceptable versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    min: Option<Version>,
    min_inclusive: bool,
    max: Option<Version>,
    max_inclusive: bool,
}

impl VersionRange {
    /// A range accepting every version.
    #[must_use]
    pub fn any() -> Self {
        Self {
            min: None,
            min_inclusive: false,
            max: None,
            max_inclusive: false,
        }
    }

    /// `>= version`.
    #[must_use]
    pub fn at_least(version: Version) -> Self {
        Self {
            min: Some(version),
            min_inclusive: true,
            max: None,
            max_inclusive: false,
        }
    }

    /// Exactly `version`.
    #[must_use]
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            min_inclusive: true,
            max: Some(version),
            max_inclusive: true,
        }
    }

    /// Build a range from explicit bounds.
    ///
    /// # Errors
    /// Returns an error when the bounds describe an empty interval.
    pub fn between(
        min: Option<(Version, bool)>,
        max: Option<(Version, bool)>,
    ) -> Result<Self, VersionError> {
        let (min, min_inclusive) = min.map_or((None, false), |(v, inc)| (Some(v), inc));
        let (max, max_inclusive) = max.map_or((None, false), |(v, inc)| (Some(v), inc));
        let range = Self {
            min,
            min_inclusive,
            max,
            max_inclusive,
        };
        if range.is_empty() {
            return Err(VersionError::InvalidRange {
                range: range.to_string(),
                reason: "lower bound is above upper bound".to_string(),
            });
        }
        Ok(range)
    }

    /// Parse interval notation.
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let text = text.trim();
        let invalid = |reason: &str| VersionError::InvalidRange {
            range: text.to_string(),
            reason: reason.to_string(),
        };

        if text.is_empty() || text == "*" {
            return Ok(Self::any());
        }

        let open = text.chars().next().unwrap_or(' ');
        if open != '[' && open != '(' {
            return Ok(Self::at_least(parse_version(text)?));
        }

        let close = text.chars().last().unwrap_or(' ');
        if text.len() < 2 || (close != ']' && close != ')') {
            return Err(invalid("missing closing bracket"));
        }
        let inner = &text[1..text.len() - 1];

        let Some((lo, hi)) = inner.split_once(',') else {
            // "[1.0]" is the only bracket form without a comma
            if open == '[' && close == ']' && !inner.trim().is_empty() {
                return Ok(Self::exact(parse_version(inner)?));
            }
            return Err(invalid("exact versions must use square brackets"));
        };
        if hi.contains(',') {
            return Err(invalid("too many bounds"));
        }

        let bound = |s: &str, inclusive: bool| -> Result<Option<(Version, bool)>, VersionError> {
            let s = s.trim();
            if s.is_empty() {
                Ok(None)
            } else {
                Ok(Some((parse_version(s)?, inclusive)))
            }
        };

        Self::between(bound(lo, open == '[')?, bound(hi, close == ']')?)
            .map_err(|_| invalid("lower bound is above upper bound"))
    }

    /// Lower bound, if any.
    #[must_use]
    pub fn min(&self) -> Option<&Version> {
        self.min.as_ref()
    }

    #[must_use]
    pub fn has_lower_bound(&self) -> bool {
        self.min.is_some()
    }

    #[must_use]
    pub fn is_any(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// True when either bound names a prerelease, which opts the range into
    /// prerelease candidates.
    #[must_use]
    pub fn allows_prerelease(&self) -> bool {
        self.min.as_ref().is_some_and(|v| !v.pre.is_empty())
            || self.max.as_ref().is_some_and(|v| !v.pre.is_empty())
    }

    /// Check whether `version` lies in the interval.
    #[must_use]
    pub fn satisfies(&self, version: &Version) -> bool {
        let above_min = match &self.min {
            None => true,
            Some(min) if self.min_inclusive => version >= min,
            Some(min) => version > min,
        };
        let below_max = match &self.max {
            None => true,
            Some(max) if self.max_inclusive => version <= max,
            Some(max) => version < max,
        };
        above_min && below_max
    }

    /// Intersect two ranges. Returns `None` when no version can satisfy both.
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Option<Self> {
        let (min, min_inclusive) = match (&self.min, &other.min) {
            (None, None) => (None, false),
            (Some(a), None) => (Some(a.clone()), self.min_inclusive),
            (None, Some(b)) => (Some(b.clone()), other.min_inclusive),
            (Some(a), Some(b)) => match a.cmp(b) {
                Ordering::Greater => (Some(a.clone()), self.min_inclusive),
                Ordering::Less => (Some(b.clone()), other.min_inclusive),
                Ordering::Equal => (Some(a.clone()), self.min_inclusive && other.min_inclusive),
            },
        };
        let (max, max_inclusive) = match (&self.max, &other.max) {
            (None, None) => (None, false),
            (Some(a), None) => (Some(a.clone()), self.max_inclusive),
            (None, Some(b)) => (Some(b.clone()), other.max_inclusive),
            (Some(a), Some(b)) => match a.cmp(b) {
                Ordering::Less => (Some(a.clone()), self.max_inclusive),
                Ordering::Greater => (Some(b.clone()), other.max_inclusive),
                Ordering::Equal => (Some(a.clone()), self.max_inclusive && other.max_inclusive),
            },
        };

        let range = Self {
            min,
            min_inclusive,
            max,
            max_inclusive,
        };
        (!range.is_empty()).then_some(range)
    }

    fn is_empty(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => match min.cmp(max) {
                Ordering::Greater => true,
                Ordering::Equal => !(self.min_inclusive && self.max_inclusive),
                Ordering::Less => false,
            },
            _ => false,
        }
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            return f.write_str("*");
        }
        if let (Some(min), Some(max)) = (&self.min, &self.max) {
            if min == max && self.min_inclusive && self.max_inclusive {
                return write!(f, "[{min}]");
            }
        }
        f.write_str(if self.min_inclusive { "[" } else { "(" })?;
        if let Some(min) = &self.min {
            write!(f, "{min}")?;
        }
        f.write_str(", ")?;
        if let Some(max) = &self.max {
            write!(f, "{max}")?;
        }
        f.write_str(if self.max_inclusive { "]" } else { ")" })
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    #[test]
    fn test_parse_version_short_forms() {
        assert_eq!(v("1"), Version::new(1, 0, 0));
        assert_eq!(v("1.2"), Version::new(1, 2, 0));
        assert_eq!(v("1.2.3.0"), Version::new(1, 2, 3));
        assert_eq!(v("2.0.0-beta.1").pre.as_str(), "beta.1");
    }

    #[test]
    fn test_parse_version_rejects_garbage() {
        assert!(parse_version("").is_err());
        assert!(parse_version("1..2").is_err());
        assert!(parse_version("1.2.3.4").is_err());
        assert!(parse_version("one").is_err());
    }

    #[test]
    fn test_parse_range_forms() {
        assert!(VersionRange::parse("").unwrap().is_any());
        assert!(VersionRange::parse("*").unwrap().is_any());

        let min = VersionRange::parse("1.0").unwrap();
        assert!(min.satisfies(&v("1.0.0")));
        assert!(min.satisfies(&v("9.0.0")));
        assert!(!min.satisfies(&v("0.9.0")));

        let exact = VersionRange::parse("[1.0]").unwrap();
        assert!(exact.satisfies(&v("1.0.0")));
        assert!(!exact.satisfies(&v("1.0.1")));

        let half_open = VersionRange::parse("[1.0, 2.0)").unwrap();
        assert!(half_open.satisfies(&v("1.5.0")));
        assert!(!half_open.satisfies(&v("2.0.0")));

        let upper = VersionRange::parse("(,2.0]").unwrap();
        assert!(upper.satisfies(&v("0.1.0")));
        assert!(upper.satisfies(&v("2.0.0")));
        assert!(!upper.has_lower_bound());
    }

    #[test]
    fn test_parse_range_rejects_inverted_bounds() {
        assert!(VersionRange::parse("[2.0, 1.0]").is_err());
        assert!(VersionRange::parse("(1.0, 1.0)").is_err());
        assert!(VersionRange::parse("(1.0)").is_err());
        assert!(VersionRange::parse("[1.0, 2.0").is_err());
    }

    #[test]
    fn test_display_parses_back() {
        for text in ["*", "[1.0.0]", "[1.0.0, )", "(1.0.0, 2.0.0]", "(, 3.0.0)"] {
            let range = VersionRange::parse(text).unwrap();
            assert_eq!(range.to_string(), text);
        }
        assert_eq!(VersionRange::parse("1.0").unwrap().to_string(), "[1.0.0, )");
    }

    #[test]
    fn test_intersect() {
        let a = VersionRange::parse("[1.0, 3.0)").unwrap();
        let b = VersionRange::parse("(2.0, )").unwrap();
        let both = a.intersect(&b).unwrap();
        assert_eq!(both.to_string(), "(2.0.0, 3.0.0)");

        let exact_one = VersionRange::parse("[1.0]").unwrap();
        let exact_two = VersionRange::parse("[2.0]").unwrap();
        assert!(exact_one.intersect(&exact_two).is_none());

        let touching = VersionRange::parse("[1.0, 2.0)").unwrap();
        let from_two = VersionRange::parse("[2.0, )").unwrap();
        assert!(touching.intersect(&from_two).is_none());
    }

    #[test]
    fn test_prerelease_opt_in() {
        assert!(!VersionRange::parse("1.0").unwrap().allows_prerelease());
        assert!(VersionRange::parse("1.0.0-alpha").unwrap().allows_prerelease());
    }

    #[test]
    fn test_serde_as_string() {
        let range = VersionRange::parse("[1.0, 2.0)").unwrap();
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, "\"[1.0.0, 2.0.0)\"");
        let back: VersionRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, range);

        assert!(serde_json::from_str::<VersionRange>("\"[2.0, 1.0]\"").is_err());
    }
}
