use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use nubo_normalize::{InvalidIdError, PackageId};
use nubo_version::{RangeParseError, Version, VersionRange};

/// A specific version of a package, e.g., `Newtonsoft.Json@13.0.3`.
///
/// Equality and hashing ignore the casing of the id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PackageIdentity {
    pub id: PackageId,
    pub version: Version,
}

impl PackageIdentity {
    pub fn new(id: PackageId, version: Version) -> Self {
        Self { id, version }
    }
}

impl Display for PackageIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// A dependency on a range of versions of a package, e.g., `Microsoft.Extensions.Logging@[9.0.0, )`.
///
/// Direct requests use the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dependency {
    pub id: PackageId,
    pub range: VersionRange,
}

impl Dependency {
    pub fn new(id: PackageId, range: VersionRange) -> Self {
        Self { id, range }
    }
}

impl Display for Dependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.id, self.range)
    }
}

/// Parses `Id`, `Id@13.0.3` or `Id@[9.0.0, )`. A bare id matches any version.
impl FromStr for Dependency {
    type Err = DependencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, range) = match s.split_once('@') {
            Some((id, range)) => (id, VersionRange::from_str(range)?),
            None => (s, VersionRange::any()),
        };
        Ok(Self {
            id: PackageId::new(id)?,
            range,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DependencyParseError {
    #[error(transparent)]
    Id(#[from] InvalidIdError),
    #[error(transparent)]
    Range(#[from] RangeParseError),
}
