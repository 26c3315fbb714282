use crate::Version;

/// The direction in which candidate versions are preferred.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preference {
    /// Prefer the lowest version, for reproducible, minimal upgrades.
    #[default]
    Lowest,
    /// Prefer the highest version.
    Highest,
}

impl Preference {
    /// Returns `true` if `candidate` is strictly preferred over `current`.
    ///
    /// Equal versions are never better than each other, so callers that keep the first of two
    /// equal candidates get a stable result.
    pub fn is_better(self, candidate: &Version, current: &Version) -> bool {
        match self {
            Self::Lowest => candidate < current,
            Self::Highest => candidate > current,
        }
    }

    /// Returns the preferred of the given versions, or `None` if there are none.
    pub fn best<'a>(self, versions: impl IntoIterator<Item = &'a Version>) -> Option<&'a Version> {
        match self {
            Self::Lowest => versions.into_iter().min(),
            Self::Highest => versions.into_iter().max(),
        }
    }
}
