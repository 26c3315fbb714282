use std::fmt::{Display, Formatter};
use std::ops::Bound;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::{Preference, Version, VersionParseError};

/// A range of versions.
///
/// Ranges are written either as a bare version (an exact match, e.g., `13.0.3`) or in interval
/// notation, where `[`/`]` are inclusive and `(`/`)` exclusive, and an omitted bound is unbounded:
///
/// ```text
/// [1.0]          exactly 1.0
/// [1.0, )        1.0 or greater
/// (1.0, )        greater than 1.0
/// (, 2.0]        2.0 or less
/// [1.0, 2.0)     at least 1.0, less than 2.0
/// *              any version
/// ```
///
/// Package manifests use a different shorthand, in which a bare version is a minimum; see
/// [`VersionRange::parse_minimum`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct VersionRange {
    lower: Bound<Version>,
    upper: Bound<Version>,
}

impl VersionRange {
    /// A range that matches every version.
    pub fn any() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// A range that matches exactly one version.
    pub fn exact(version: Version) -> Self {
        Self {
            lower: Bound::Included(version.clone()),
            upper: Bound::Included(version),
        }
    }

    /// A range that matches the given version or any greater version.
    pub fn at_least(version: Version) -> Self {
        Self {
            lower: Bound::Included(version),
            upper: Bound::Unbounded,
        }
    }

    /// A range with explicit bounds.
    pub fn from_bounds(
        lower: Bound<Version>,
        upper: Bound<Version>,
    ) -> Result<Self, RangeParseError> {
        let range = Self { lower, upper };
        range.validate()?;
        Ok(range)
    }

    /// Parse a range from a package manifest, where a bare version means "this version or
    /// greater" and an empty string matches every version.
    pub fn parse_minimum(range: &str) -> Result<Self, RangeParseError> {
        let range = range.trim();
        if range.is_empty() {
            return Ok(Self::any());
        }
        if range == "*" || range.starts_with(['[', '(']) {
            return Self::from_str(range);
        }
        let version = parse_version(range, range)?;
        Ok(Self::at_least(version))
    }

    pub fn lower(&self) -> Bound<&Version> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Bound<&Version> {
        self.upper.as_ref()
    }

    /// Returns the version if this range matches exactly one version.
    pub fn as_exact(&self) -> Option<&Version> {
        match (&self.lower, &self.upper) {
            (Bound::Included(lower), Bound::Included(upper)) if lower == upper => Some(lower),
            _ => None,
        }
    }

    /// Returns `true` if the version lies within the range.
    pub fn satisfies(&self, version: &Version) -> bool {
        let lower = match &self.lower {
            Bound::Included(lower) => version >= lower,
            Bound::Excluded(lower) => version > lower,
            Bound::Unbounded => true,
        };
        let upper = match &self.upper {
            Bound::Included(upper) => version <= upper,
            Bound::Excluded(upper) => version < upper,
            Bound::Unbounded => true,
        };
        lower && upper
    }

    /// Returns `true` if either bound is a pre-release, which opts the range into matching
    /// pre-release candidates.
    pub fn mentions_prerelease(&self) -> bool {
        [&self.lower, &self.upper].into_iter().any(|bound| match bound {
            Bound::Included(version) | Bound::Excluded(version) => version.is_prerelease(),
            Bound::Unbounded => false,
        })
    }

    /// Among the candidates that satisfy this range, return the one preferred under the given
    /// [`Preference`].
    ///
    /// Pre-release candidates are only considered if `allow_prereleases` is set or the range
    /// itself mentions a pre-release. Returns `None` when nothing matches; it's up to the caller
    /// to decide whether that's an error.
    pub fn find_best_match<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a Version>,
        preference: Preference,
        allow_prereleases: bool,
    ) -> Option<&'a Version> {
        let allow_prereleases = allow_prereleases || self.mentions_prerelease();
        candidates
            .into_iter()
            .filter(|version| allow_prereleases || !version.is_prerelease())
            .filter(|version| self.satisfies(version))
            .fold(None, |best, candidate| match best {
                Some(best) if !preference.is_better(candidate, best) => Some(best),
                _ => Some(candidate),
            })
    }

    fn validate(&self) -> Result<(), RangeParseError> {
        match (&self.lower, &self.upper) {
            (Bound::Unbounded, _) | (_, Bound::Unbounded) => Ok(()),
            (Bound::Included(lower), Bound::Included(upper)) => {
                if lower > upper {
                    Err(RangeParseError::MinGreaterThanMax {
                        range: self.to_string(),
                    })
                } else {
                    Ok(())
                }
            }
            (
                Bound::Included(lower) | Bound::Excluded(lower),
                Bound::Included(upper) | Bound::Excluded(upper),
            ) => {
                if lower > upper {
                    Err(RangeParseError::MinGreaterThanMax {
                        range: self.to_string(),
                    })
                } else if lower == upper {
                    Err(RangeParseError::EmptyInterval {
                        range: self.to_string(),
                    })
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn parse_version(text: &str, range: &str) -> Result<Version, RangeParseError> {
    Version::from_str(text).map_err(|source| RangeParseError::InvalidVersion {
        range: range.to_string(),
        source,
    })
}

impl FromStr for VersionRange {
    type Err = RangeParseError;

    fn from_str(range: &str) -> Result<Self, Self::Err> {
        let range = range.trim();
        if range.is_empty() {
            return Err(RangeParseError::Empty);
        }
        if range == "*" {
            return Ok(Self::any());
        }

        let Some(open) = range.chars().next().filter(|c| matches!(c, '[' | '(')) else {
            if range.ends_with([']', ')']) {
                return Err(RangeParseError::Unbalanced {
                    range: range.to_string(),
                });
            }
            return Ok(Self::exact(parse_version(range, range)?));
        };
        let Some(close) = range
            .chars()
            .next_back()
            .filter(|c| matches!(c, ']' | ')'))
        else {
            return Err(RangeParseError::Unbalanced {
                range: range.to_string(),
            });
        };
        if range.len() < 2 {
            return Err(RangeParseError::Unbalanced {
                range: range.to_string(),
            });
        }
        let inner = &range[1..range.len() - 1];
        if inner.contains(['[', '(', ']', ')']) {
            return Err(RangeParseError::Unbalanced {
                range: range.to_string(),
            });
        }

        let Some((lower, upper)) = inner.split_once(',') else {
            // `[1.0]` is the only valid form without a comma.
            if open == '[' && close == ']' && !inner.trim().is_empty() {
                return Ok(Self::exact(parse_version(inner, range)?));
            }
            return Err(RangeParseError::InvalidExact {
                range: range.to_string(),
            });
        };
        if upper.contains(',') {
            return Err(RangeParseError::TooManyBounds {
                range: range.to_string(),
            });
        }

        let (lower, upper) = (lower.trim(), upper.trim());
        if lower.is_empty() && upper.is_empty() {
            return Err(RangeParseError::NoBounds {
                range: range.to_string(),
            });
        }

        let lower = if lower.is_empty() {
            Bound::Unbounded
        } else if open == '[' {
            Bound::Included(parse_version(lower, range)?)
        } else {
            Bound::Excluded(parse_version(lower, range)?)
        };
        let upper = if upper.is_empty() {
            Bound::Unbounded
        } else if close == ']' {
            Bound::Included(parse_version(upper, range)?)
        } else {
            Bound::Excluded(parse_version(upper, range)?)
        };

        Self::from_bounds(lower, upper)
    }
}

/// Renders the canonical interval notation, e.g., `[9.0.0, )` or `[13.0.3]`.
impl Display for VersionRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if matches!((&self.lower, &self.upper), (Bound::Unbounded, Bound::Unbounded)) {
            return f.write_str("*");
        }
        if let Some(exact) = self.as_exact() {
            return write!(f, "[{exact}]");
        }
        match &self.lower {
            Bound::Included(lower) => write!(f, "[{lower}, ")?,
            Bound::Excluded(lower) => write!(f, "({lower}, ")?,
            Bound::Unbounded => write!(f, "(, ")?,
        }
        match &self.upper {
            Bound::Included(upper) => write!(f, "{upper}]"),
            Bound::Excluded(upper) => write!(f, "{upper})"),
            Bound::Unbounded => write!(f, ")"),
        }
    }
}

impl Serialize for VersionRange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

/// An error that occurs when parsing a [`VersionRange`] fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RangeParseError {
    #[error("Version range must not be empty")]
    Empty,
    #[error("Invalid version range `{range}`: unbalanced brackets")]
    Unbalanced { range: String },
    #[error("Invalid version range `{range}`: a single version must be written as `[version]`")]
    InvalidExact { range: String },
    #[error("Invalid version range `{range}`: expected at most two bounds")]
    TooManyBounds { range: String },
    #[error("Invalid version range `{range}`: at least one bound is required")]
    NoBounds { range: String },
    #[error("Invalid version range `{range}`: the minimum is greater than the maximum")]
    MinGreaterThanMax { range: String },
    #[error("Invalid version range `{range}`: the range matches no versions")]
    EmptyInterval { range: String },
    #[error("Invalid version range `{range}`")]
    InvalidVersion {
        range: String,
        #[source]
        source: VersionParseError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::from_str(s).unwrap()
    }

    fn r(s: &str) -> VersionRange {
        VersionRange::from_str(s).unwrap()
    }

    #[test]
    fn bare_version_is_exact() {
        let range = r("13.0.3");
        assert_eq!(range.as_exact(), Some(&v("13.0.3")));
        assert!(range.satisfies(&v("13.0.3")));
        assert!(!range.satisfies(&v("13.0.4")));
        assert!(!range.satisfies(&v("13.0.2")));
        assert_eq!(range.to_string(), "[13.0.3]");
    }

    #[test]
    fn manifest_bare_version_is_minimum() {
        let range = VersionRange::parse_minimum("9.0.0").unwrap();
        assert!(range.satisfies(&v("9.0.0")));
        assert!(range.satisfies(&v("10.0.0")));
        assert!(!range.satisfies(&v("8.0.0")));
        assert_eq!(range.to_string(), "[9.0.0, )");

        assert_eq!(VersionRange::parse_minimum("").unwrap(), VersionRange::any());
        assert_eq!(
            VersionRange::parse_minimum("[1.0, 2.0)").unwrap(),
            r("[1.0, 2.0)")
        );
    }

    #[test]
    fn inclusivity() {
        let range = r("[1.0, 2.0)");
        assert!(range.satisfies(&v("1.0")));
        assert!(range.satisfies(&v("1.9.9")));
        assert!(!range.satisfies(&v("2.0")));

        let range = r("(1.0, 2.0]");
        assert!(!range.satisfies(&v("1.0")));
        assert!(range.satisfies(&v("1.0.1")));
        assert!(range.satisfies(&v("2.0")));

        let range = r("(, 3.0]");
        assert!(range.satisfies(&v("0.0.1")));
        assert!(range.satisfies(&v("3.0")));
        assert!(!range.satisfies(&v("3.0.1")));

        let range = r("[9.0.0, )");
        assert!(range.satisfies(&v("9.0.0")));
        assert!(range.satisfies(&v("100.0")));
        assert!(!range.satisfies(&v("8.9")));
    }

    #[test]
    fn display() {
        for (input, expected) in [
            ("[1.0]", "[1.0.0]"),
            ("[1.0,)", "[1.0.0, )"),
            ("(1.0 , 2.0 ]", "(1.0.0, 2.0.0]"),
            ("(,2.0)", "(, 2.0.0)"),
            ("*", "*"),
        ] {
            assert_eq!(r(input).to_string(), expected);
            // The canonical form parses back to the same range.
            assert_eq!(r(expected), r(input));
        }
    }

    #[test]
    fn errors() {
        insta::assert_snapshot!(VersionRange::from_str("").unwrap_err(), @"Version range must not be empty");
        insta::assert_snapshot!(VersionRange::from_str("[1.0, 2.0").unwrap_err(), @"Invalid version range `[1.0, 2.0`: unbalanced brackets");
        insta::assert_snapshot!(VersionRange::from_str("1.0, 2.0]").unwrap_err(), @"Invalid version range `1.0, 2.0]`: unbalanced brackets");
        insta::assert_snapshot!(VersionRange::from_str("(1.0)").unwrap_err(), @"Invalid version range `(1.0)`: a single version must be written as `[version]`");
        insta::assert_snapshot!(VersionRange::from_str("[1.0, 2.0, 3.0]").unwrap_err(), @"Invalid version range `[1.0, 2.0, 3.0]`: expected at most two bounds");
        insta::assert_snapshot!(VersionRange::from_str("(,)").unwrap_err(), @"Invalid version range `(,)`: at least one bound is required");
        insta::assert_snapshot!(VersionRange::from_str("[2.0, 1.0]").unwrap_err(), @"Invalid version range `[2.0.0, 1.0.0]`: the minimum is greater than the maximum");
        insta::assert_snapshot!(VersionRange::from_str("[1.0, 1.0)").unwrap_err(), @"Invalid version range `[1.0.0, 1.0.0)`: the range matches no versions");
        insta::assert_snapshot!(VersionRange::from_str("[1.x, )").unwrap_err(), @"Invalid version range `[1.x, )`");
    }

    #[test]
    fn best_match_by_preference() {
        let candidates = [v("9.0.1"), v("9.1.0"), v("8.0.0"), v("9.0.0")];
        let range = r("[9.0.0, )");
        assert_eq!(
            range.find_best_match(&candidates, Preference::Lowest, false),
            Some(&v("9.0.0"))
        );
        assert_eq!(
            range.find_best_match(&candidates, Preference::Highest, false),
            Some(&v("9.1.0"))
        );
        assert_eq!(
            r("[10.0, )").find_best_match(&candidates, Preference::Lowest, false),
            None
        );
    }

    #[test]
    fn best_match_skips_prereleases() {
        let candidates = [v("1.0.0"), v("2.0.0-preview.1")];
        let range = r("[1.0.0, )");
        assert_eq!(
            range.find_best_match(&candidates, Preference::Highest, false),
            Some(&v("1.0.0"))
        );
        assert_eq!(
            range.find_best_match(&candidates, Preference::Highest, true),
            Some(&v("2.0.0-preview.1"))
        );

        // A range with a pre-release bound opts in.
        let range = r("[2.0.0-preview.1, )");
        assert_eq!(
            range.find_best_match(&candidates, Preference::Lowest, false),
            Some(&v("2.0.0-preview.1"))
        );
    }
}
