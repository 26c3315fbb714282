use std::cmp::Reverse;

use crate::{FrameworkFamily, FrameworkVersion, TargetFramework};

/// The compatibility table between target frameworks.
///
/// A framework can always consume packages built for an older version of its own family. Across
/// families, `netcoreapp` and `netframework` versions additionally implement some version of
/// `netstandard`; the table records, per family, the first version implementing each
/// `netstandard` version.
#[derive(Debug, Clone)]
pub struct FrameworkCompatibility {
    /// `(family, first version, supported netstandard)`, sorted.
    netstandard: Vec<(FrameworkFamily, FrameworkVersion, FrameworkVersion)>,
}

impl FrameworkCompatibility {
    /// Create a table from `(family, first version, supported netstandard version)` entries.
    pub fn new(
        entries: impl IntoIterator<Item = (FrameworkFamily, FrameworkVersion, FrameworkVersion)>,
    ) -> Self {
        let mut netstandard: Vec<_> = entries.into_iter().collect();
        netstandard.sort();
        Self { netstandard }
    }

    /// The highest `netstandard` version implemented by the given framework, if any.
    pub fn netstandard_support(&self, framework: &TargetFramework) -> Option<FrameworkVersion> {
        match framework.family() {
            FrameworkFamily::NetStandard => Some(framework.version()),
            FrameworkFamily::Any => None,
            family => self
                .netstandard
                .iter()
                .filter(|(entry, first, _)| *entry == family && *first <= framework.version())
                .map(|(.., supported)| *supported)
                .next_back(),
        }
    }

    /// Returns `true` if a consumer targeting `request` may use an asset built for `package`.
    ///
    /// The wildcard framework is compatible with every request, but a wildcard request is only
    /// satisfied by wildcard packages.
    pub fn is_compatible(&self, package: &TargetFramework, request: &TargetFramework) -> bool {
        if package.is_any() {
            return true;
        }
        if request.is_any() {
            return false;
        }

        // Platform-specific assets require the same platform.
        if let Some(platform) = package.platform_name() {
            if request.platform_name() != Some(platform) {
                return false;
            }
        }

        if package.family() == request.family() {
            return package.version() <= request.version();
        }

        if package.family() == FrameworkFamily::NetStandard {
            return self
                .netstandard_support(request)
                .is_some_and(|supported| package.version() <= supported);
        }

        false
    }

    /// Among the candidates, return the compatible framework nearest to the request.
    ///
    /// A candidate of the request's own family is preferred (with a matching platform over no
    /// platform), then `netstandard`, then the wildcard; within each, the highest version wins.
    /// If two candidates are equally near, the first is returned.
    pub fn get_nearest<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a TargetFramework>,
        request: &TargetFramework,
    ) -> Option<&'a TargetFramework> {
        candidates
            .into_iter()
            .filter(|candidate| self.is_compatible(candidate, request))
            .min_by_key(|candidate| {
                let tier = if candidate.family() == request.family() {
                    if candidate.platform().is_some() { 3 } else { 2 }
                } else if candidate.family() == FrameworkFamily::NetStandard {
                    1
                } else {
                    0
                };
                Reverse((tier, candidate.version()))
            })
    }
}

impl Default for FrameworkCompatibility {
    fn default() -> Self {
        use FrameworkFamily::{NetCoreApp, NetFramework};

        const fn v(major: u32, minor: u32, patch: u32) -> FrameworkVersion {
            FrameworkVersion::new(major, minor, patch)
        }

        Self::new([
            (NetCoreApp, v(1, 0, 0), v(1, 6, 0)),
            (NetCoreApp, v(2, 0, 0), v(2, 0, 0)),
            (NetCoreApp, v(3, 0, 0), v(2, 1, 0)),
            (NetFramework, v(4, 5, 0), v(1, 1, 0)),
            (NetFramework, v(4, 5, 1), v(1, 2, 0)),
            (NetFramework, v(4, 6, 0), v(1, 3, 0)),
            (NetFramework, v(4, 6, 1), v(2, 0, 0)),
        ])
    }
}
