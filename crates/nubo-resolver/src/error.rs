use std::fmt::{Display, Formatter};

use itertools::Itertools;

use nubo_normalize::PackageId;
use nubo_package_types::PackageIdentity;
use nubo_version::VersionRange;

/// Where a version constraint came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstraintOrigin {
    /// A direct request.
    Requested,
    /// A dependency declared by a package.
    Package(PackageIdentity),
}

impl Display for ConstraintOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::Package(identity) => write!(f, "required by {identity}"),
        }
    }
}

/// A version range placed on a package id, and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub range: VersionRange,
    pub origin: ConstraintOrigin,
}

impl Display for Constraint {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` ({})", self.range, self.origin)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(
        "No version of `{id}` satisfying `{range}` was found (consulted: {})",
        format_feeds(feeds, unavailable)
    )]
    PackageNotFound {
        id: PackageId,
        range: VersionRange,
        /// The feeds that were queried.
        feeds: Vec<String>,
        /// The subset of `feeds` that failed to respond.
        unavailable: Vec<String>,
    },

    #[error(
        "`{identity}` was listed by a feed, but its package manifest is unavailable (consulted: {})",
        format_feeds(feeds, unavailable)
    )]
    MetadataNotFound {
        identity: PackageIdentity,
        feeds: Vec<String>,
        unavailable: Vec<String>,
    },

    #[error(
        "No version of `{id}` satisfies all constraints: {}",
        constraints.iter().join(", ")
    )]
    VersionConflict {
        id: PackageId,
        constraints: Vec<Constraint>,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

fn format_feeds(feeds: &[String], unavailable: &[String]) -> String {
    if feeds.is_empty() {
        return "no feeds".to_string();
    }
    feeds
        .iter()
        .map(|feed| {
            if unavailable.contains(feed) {
                format!("`{feed}` (unavailable)")
            } else {
                format!("`{feed}`")
            }
        })
        .join(", ")
}
