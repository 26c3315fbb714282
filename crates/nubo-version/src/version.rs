use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// A package version, e.g., `13.0.3`, `4.0.10.0` or `9.0.0-preview.1+sha.abc`.
///
/// Up to four numeric components are supported; omitted components are zero, so `1.0` and
/// `1.0.0` are equal. Build metadata is retained but never participates in comparisons.
#[derive(Clone, Debug)]
pub struct Version {
    release: [u64; 4],
    pre: Option<Prerelease>,
    build: Option<Box<str>>,
}

impl Version {
    /// Create a release version from its first three components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            release: [major, minor, patch, 0],
            pre: None,
            build: None,
        }
    }

    /// Set the fourth ("revision") component.
    #[must_use]
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.release[3] = revision;
        self
    }

    /// Set the pre-release label.
    #[must_use]
    pub fn with_pre(mut self, pre: Option<Prerelease>) -> Self {
        self.pre = pre;
        self
    }

    pub fn major(&self) -> u64 {
        self.release[0]
    }

    pub fn minor(&self) -> u64 {
        self.release[1]
    }

    pub fn patch(&self) -> u64 {
        self.release[2]
    }

    pub fn revision(&self) -> u64 {
        self.release[3]
    }

    /// Returns the pre-release label, if any.
    pub fn pre(&self) -> Option<&Prerelease> {
        self.pre.as_ref()
    }

    /// Returns the build metadata, if any.
    pub fn build(&self) -> Option<&str> {
        self.build.as_deref()
    }

    /// Whether this is a pre-release.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some()
    }

    /// Returns the version with the build metadata removed.
    #[must_use]
    pub fn without_build(&self) -> Self {
        Self {
            release: self.release,
            pre: self.pre.clone(),
            build: None,
        }
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(version: &str) -> Result<Self, Self::Err> {
        let input = version.trim();
        if input.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let (rest, build) = match input.split_once('+') {
            Some((rest, build)) => {
                if build.is_empty()
                    || !build
                        .split('.')
                        .all(|part| !part.is_empty() && part.chars().all(is_label_char))
                {
                    return Err(VersionParseError::InvalidBuild {
                        version: input.to_string(),
                    });
                }
                (rest, Some(Box::from(build)))
            }
            None => (input, None),
        };

        let (numbers, pre) = match rest.split_once('-') {
            Some((numbers, pre)) => {
                let pre = Prerelease::parse(pre).ok_or_else(|| {
                    VersionParseError::InvalidPrerelease {
                        version: input.to_string(),
                        label: pre.to_string(),
                    }
                })?;
                (numbers, Some(pre))
            }
            None => (rest, None),
        };

        let mut release = [0u64; 4];
        let mut count = 0;
        for component in numbers.split('.') {
            if count == release.len() {
                return Err(VersionParseError::TooManyComponents {
                    version: input.to_string(),
                });
            }
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionParseError::InvalidNumber {
                    version: input.to_string(),
                    component: component.to_string(),
                });
            }
            release[count] =
                component
                    .parse()
                    .map_err(|_| VersionParseError::InvalidNumber {
                        version: input.to_string(),
                        component: component.to_string(),
                    })?;
            count += 1;
        }

        Ok(Self {
            release,
            pre,
            build,
        })
    }
}

/// Renders the normalized form: at least three numeric components, the fourth only when
/// non-zero, followed by the pre-release label. Build metadata is omitted.
impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [major, minor, patch, revision] = self.release;
        write!(f, "{major}.{minor}.{patch}")?;
        if revision != 0 {
            write!(f, ".{revision}")?;
        }
        if let Some(pre) = &self.pre {
            write!(f, "-{pre}")?;
        }
        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.release.hash(state);
        if let Some(pre) = &self.pre {
            for segment in &pre.segments {
                match segment {
                    PrereleaseSegment::Numeric(number) => number.hash(state),
                    PrereleaseSegment::Alphanumeric(label) => {
                        for byte in label.bytes() {
                            byte.to_ascii_lowercase().hash(state);
                        }
                    }
                }
            }
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.release
            .cmp(&other.release)
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                // A release is newer than any of its pre-releases.
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-'
}

/// A dot-separated pre-release label, e.g., `preview.1.24080.9`.
#[derive(Clone, Debug)]
pub struct Prerelease {
    segments: Vec<PrereleaseSegment>,
}

impl Prerelease {
    fn parse(label: &str) -> Option<Self> {
        if label.is_empty() {
            return None;
        }
        let segments = label
            .split('.')
            .map(|segment| {
                if segment.is_empty() || !segment.chars().all(is_label_char) {
                    return None;
                }
                if segment.bytes().all(|b| b.is_ascii_digit()) {
                    segment.parse().ok().map(PrereleaseSegment::Numeric)
                } else {
                    Some(PrereleaseSegment::Alphanumeric(Box::from(segment)))
                }
            })
            .collect::<Option<Vec<_>>>()?;
        Some(Self { segments })
    }

    pub fn segments(&self) -> &[PrereleaseSegment] {
        &self.segments
    }
}

impl FromStr for Prerelease {
    type Err = VersionParseError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        Self::parse(label).ok_or_else(|| VersionParseError::InvalidPrerelease {
            version: label.to_string(),
            label: label.to_string(),
        })
    }
}

impl Display for Prerelease {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                PrereleaseSegment::Numeric(number) => write!(f, "{number}")?,
                PrereleaseSegment::Alphanumeric(label) => f.write_str(label)?,
            }
        }
        Ok(())
    }
}

impl PartialEq for Prerelease {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Prerelease {}

impl PartialOrd for Prerelease {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Prerelease {
    /// Segment-wise comparison; if one label is a prefix of the other, the shorter sorts first.
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments.iter().zip(&other.segments) {
            let ordering = a.cmp(b);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.segments.len().cmp(&other.segments.len())
    }
}

/// A single segment of a [`Prerelease`] label.
#[derive(Clone, Debug)]
pub enum PrereleaseSegment {
    /// A purely numeric segment, compared numerically.
    Numeric(u64),
    /// Any other segment, compared case-insensitively.
    Alphanumeric(Box<str>),
}

impl PartialEq for PrereleaseSegment {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PrereleaseSegment {}

impl PartialOrd for PrereleaseSegment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrereleaseSegment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::Alphanumeric(_)) => Ordering::Less,
            (Self::Alphanumeric(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::Alphanumeric(a), Self::Alphanumeric(b)) => a
                .bytes()
                .map(|b| b.to_ascii_lowercase())
                .cmp(b.bytes().map(|b| b.to_ascii_lowercase())),
        }
    }
}

/// An error that occurs when parsing a [`Version`] string fails.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Version must not be empty")]
    Empty,
    #[error("Invalid version `{version}`: `{component}` is not a number")]
    InvalidNumber { version: String, component: String },
    #[error("Invalid version `{version}`: at most four numeric components are allowed")]
    TooManyComponents { version: String },
    #[error("Invalid version `{version}`: malformed pre-release label `{label}`")]
    InvalidPrerelease { version: String, label: String },
    #[error("Invalid version `{version}`: malformed build metadata")]
    InvalidBuild { version: String },
}
