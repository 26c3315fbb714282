use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use itertools::Itertools;

use nubo_normalize::PackageId;
use nubo_package_types::{Dependency, PackageIdentity};
use nubo_version::Version;

/// A package version whose dependency metadata has been fetched, along with the feed it came
/// from and its dependencies for the target framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    pub identity: PackageIdentity,
    /// The name of the feed that served the package's metadata, and that its archive is
    /// downloaded from.
    pub feed: String,
    pub dependencies: Vec<Dependency>,
}

/// The version chosen for a package id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub node: DependencyNode,
    /// Whether the package was requested directly.
    pub direct: bool,
}

impl ResolvedPackage {
    pub fn identity(&self) -> &PackageIdentity {
        &self.node.identity
    }

    pub fn feed(&self) -> &str {
        &self.node.feed
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.node.dependencies
    }
}

/// A non-fatal observation made during resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionDiagnostic {
    /// A direct request resolved to a different version than it would have on its own, because
    /// other packages constrain the same id.
    DirectRequestOverridden {
        id: PackageId,
        requested: Version,
        resolved: Version,
    },
    /// Source mapping allowed no configured feed for a package, so every feed was consulted.
    SourceMappingFallback { id: PackageId },
    /// A feed failed to respond and was skipped.
    FeedUnavailable {
        feed: String,
        id: PackageId,
        message: String,
    },
}

impl Display for ResolutionDiagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DirectRequestOverridden {
                id,
                requested,
                resolved,
            } => write!(
                f,
                "`{id}` was requested at {requested}, but resolved to {resolved} to satisfy other packages"
            ),
            Self::SourceMappingFallback { id } => write!(
                f,
                "No feed is mapped to `{id}`; falling back to all configured feeds"
            ),
            Self::FeedUnavailable { feed, id, message } => {
                write!(f, "Feed `{feed}` was skipped while resolving `{id}`: {message}")
            }
        }
    }
}

/// The result of a resolution: exactly one version per package id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPackageSet {
    packages: BTreeMap<PackageId, ResolvedPackage>,
    diagnostics: Vec<ResolutionDiagnostic>,
}

impl ResolvedPackageSet {
    pub(crate) fn new(
        packages: BTreeMap<PackageId, ResolvedPackage>,
        diagnostics: Vec<ResolutionDiagnostic>,
    ) -> Self {
        Self {
            packages,
            diagnostics,
        }
    }

    pub fn get(&self, id: &PackageId) -> Option<&ResolvedPackage> {
        self.packages.get(id)
    }

    /// Iterate over the resolved packages, ordered by id.
    pub fn packages(&self) -> impl Iterator<Item = &ResolvedPackage> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn diagnostics(&self) -> &[ResolutionDiagnostic] {
        &self.diagnostics
    }

    /// The chosen version for each package id.
    pub fn versions(&self) -> BTreeMap<&PackageId, &Version> {
        self.packages
            .iter()
            .map(|(id, package)| (id, &package.node.identity.version))
            .collect()
    }
}

/// Renders one package per line, with the packages that depend on it:
///
/// ```text
/// Microsoft.Extensions.Logging==9.0.0
/// Microsoft.Extensions.Logging.Abstractions==9.0.0
///     # via Microsoft.Extensions.Logging
/// ```
impl Display for ResolvedPackageSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for package in self.packages.values() {
            let identity = package.identity();
            writeln!(f, "{}=={}", identity.id, identity.version)?;

            let dependents = self
                .packages
                .values()
                .filter(|dependent| {
                    dependent
                        .dependencies()
                        .iter()
                        .any(|dependency| dependency.id == identity.id)
                })
                .map(|dependent| dependent.identity().id.to_string())
                .collect::<Vec<_>>();
            match dependents.as_slice() {
                [] => {}
                [dependent] => writeln!(f, "    # via {dependent}")?,
                dependents => {
                    writeln!(f, "    # via")?;
                    writeln!(
                        f,
                        "{}",
                        dependents
                            .iter()
                            .map(|dependent| format!("    #   {dependent}"))
                            .join("\n")
                    )?;
                }
            }
        }
        Ok(())
    }
}
