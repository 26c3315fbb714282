use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// A family of target frameworks whose versions are ordered amongst each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FrameworkFamily {
    /// `netcoreapp1.0` through `netcoreapp3.1`, and `net5.0` onwards.
    NetCoreApp,
    /// `netstandard1.0` through `netstandard2.1`.
    NetStandard,
    /// The Windows-only `net20` through `net481`.
    NetFramework,
    /// The wildcard framework, compatible with everything.
    Any,
}

/// A framework version, e.g., `8.0` or `4.6.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameworkVersion([u32; 3]);

impl FrameworkVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self([major, minor, patch])
    }

    pub fn major(self) -> u32 {
        self.0[0]
    }

    pub fn minor(self) -> u32 {
        self.0[1]
    }

    pub fn patch(self) -> u32 {
        self.0[2]
    }

    /// Parse a dotted version, e.g., `4.6.1`, optionally prefixed with `v`.
    fn parse_dotted(version: &str) -> Option<Self> {
        let version = version.strip_prefix('v').unwrap_or(version);
        let mut parts = [0u32; 3];
        let mut count = 0;
        for (i, part) in version.split('.').enumerate() {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            // A trailing fourth component (e.g., `4.0.0.0`) is tolerated if zero.
            if i == parts.len() {
                if part.bytes().all(|b| b == b'0') {
                    continue;
                }
                return None;
            }
            if i > parts.len() {
                return None;
            }
            parts[i] = part.parse().ok()?;
            count += 1;
        }
        (count > 0).then_some(Self(parts))
    }

    /// Parse a compact version in which every digit is a component, e.g., `461` or `48`.
    fn parse_compact(version: &str) -> Option<Self> {
        if version.is_empty() || version.len() > 3 || !version.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let mut parts = [0u32; 3];
        for (i, digit) in version.bytes().enumerate() {
            parts[i] = u32::from(digit - b'0');
        }
        Some(Self(parts))
    }
}

impl Display for FrameworkVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let [major, minor, patch] = self.0;
        if patch == 0 {
            write!(f, "{major}.{minor}")
        } else {
            write!(f, "{major}.{minor}.{patch}")
        }
    }
}

/// A target framework moniker, e.g., `net8.0`, `netstandard2.0` or `net461`.
///
/// Monikers are parsed from package folder names (`lib/net8.0/`) and from the long-form names
/// used in package manifests (`.NETStandard2.0`). Frameworks for `net5.0` and later may carry
/// an OS-specific platform suffix, e.g., `net8.0-windows`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetFramework {
    family: FrameworkFamily,
    version: FrameworkVersion,
    platform: Option<Box<str>>,
}

impl TargetFramework {
    pub fn new(family: FrameworkFamily, version: FrameworkVersion) -> Self {
        Self {
            family,
            version,
            platform: None,
        }
    }

    /// The wildcard framework.
    pub fn any() -> Self {
        Self::new(FrameworkFamily::Any, FrameworkVersion::default())
    }

    /// Attach an OS-specific platform, e.g., `windows`.
    #[must_use]
    pub fn with_platform(mut self, platform: impl AsRef<str>) -> Self {
        self.platform = Some(platform.as_ref().to_ascii_lowercase().into_boxed_str());
        self
    }

    pub fn family(&self) -> FrameworkFamily {
        self.family
    }

    pub fn version(&self) -> FrameworkVersion {
        self.version
    }

    /// The OS-specific platform, e.g., `windows10.0.19041`.
    pub fn platform(&self) -> Option<&str> {
        self.platform.as_deref()
    }

    /// The platform name without its version, e.g., `windows`.
    pub fn platform_name(&self) -> Option<&str> {
        self.platform
            .as_deref()
            .map(|platform| platform.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.'))
    }

    pub fn is_any(&self) -> bool {
        self.family == FrameworkFamily::Any
    }
}

impl FromStr for TargetFramework {
    type Err = FrameworkParseError;

    fn from_str(moniker: &str) -> Result<Self, Self::Err> {
        let moniker = moniker.trim();
        if moniker.is_empty() {
            return Err(FrameworkParseError::Empty);
        }
        let lowercase = moniker.to_ascii_lowercase();
        if lowercase == "any" {
            return Ok(Self::any());
        }

        let (name, platform) = match lowercase.split_once('-') {
            Some((name, platform)) if !platform.is_empty() => (name, Some(platform)),
            Some(_) => return Err(FrameworkParseError::Unknown(moniker.to_string())),
            None => (lowercase.as_str(), None),
        };

        let invalid = || FrameworkParseError::InvalidVersion(moniker.to_string());

        let (family, version) = if let Some(rest) = name
            .strip_prefix(".netstandard")
            .or_else(|| name.strip_prefix("netstandard"))
        {
            let version = FrameworkVersion::parse_dotted(rest)
                .filter(|_| rest.contains('.'))
                .or_else(|| FrameworkVersion::parse_compact(rest))
                .ok_or_else(invalid)?;
            (FrameworkFamily::NetStandard, version)
        } else if let Some(rest) = name
            .strip_prefix(".netcoreapp")
            .or_else(|| name.strip_prefix("netcoreapp"))
        {
            let version = FrameworkVersion::parse_dotted(rest)
                .filter(|_| rest.contains('.'))
                .or_else(|| FrameworkVersion::parse_compact(rest))
                .ok_or_else(invalid)?;
            (FrameworkFamily::NetCoreApp, version)
        } else if let Some(rest) = name.strip_prefix(".netframework") {
            let version = FrameworkVersion::parse_dotted(rest).ok_or_else(invalid)?;
            (FrameworkFamily::NetFramework, version)
        } else if let Some(rest) = name.strip_prefix("net") {
            let version = if rest.contains('.') {
                FrameworkVersion::parse_dotted(rest)
            } else {
                FrameworkVersion::parse_compact(rest)
            }
            .ok_or_else(invalid)?;
            if version.major() >= 5 {
                (FrameworkFamily::NetCoreApp, version)
            } else {
                (FrameworkFamily::NetFramework, version)
            }
        } else {
            return Err(FrameworkParseError::Unknown(moniker.to_string()));
        };

        if platform.is_some() && !(family == FrameworkFamily::NetCoreApp && version.major() >= 5) {
            return Err(FrameworkParseError::UnexpectedPlatform(moniker.to_string()));
        }

        Ok(Self {
            family,
            version,
            platform: platform.map(Box::from),
        })
    }
}

/// Renders the short folder name, e.g., `net8.0-windows`, `netcoreapp3.1` or `net461`.
impl Display for TargetFramework {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let version = self.version;
        match self.family {
            FrameworkFamily::Any => f.write_str("any")?,
            FrameworkFamily::NetStandard => write!(f, "netstandard{version}")?,
            FrameworkFamily::NetCoreApp if version.major() >= 5 => write!(f, "net{version}")?,
            FrameworkFamily::NetCoreApp => write!(f, "netcoreapp{version}")?,
            FrameworkFamily::NetFramework => {
                write!(f, "net{}{}", version.major(), version.minor())?;
                if version.patch() != 0 {
                    write!(f, "{}", version.patch())?;
                }
            }
        }
        if let Some(platform) = &self.platform {
            write!(f, "-{platform}")?;
        }
        Ok(())
    }
}

impl Serialize for TargetFramework {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TargetFramework {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameworkParseError {
    #[error("Target framework must not be empty")]
    Empty,
    #[error("Unknown target framework: `{0}`")]
    Unknown(String),
    #[error("Invalid version in target framework: `{0}`")]
    InvalidVersion(String),
    #[error("Only `net5.0` and later may specify a platform: `{0}`")]
    UnexpectedPlatform(String),
}
