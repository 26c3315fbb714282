use tokio_util::sync::CancellationToken;

use nubo_platform::{FrameworkCompatibility, FrameworkFamily, FrameworkVersion, Rid, TargetFramework};
use nubo_version::Preference;

/// The default number of concurrent metadata requests.
pub const DEFAULT_CONCURRENCY: usize = 16;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ResolutionMode {
    /// Resolve the lowest version of each package that satisfies every constraint.
    #[default]
    Lowest,
    /// Resolve the highest version of each package that satisfies every constraint.
    Highest,
}

impl ResolutionMode {
    /// The direction in which candidates are preferred.
    pub fn preference(self) -> Preference {
        match self {
            Self::Lowest => Preference::Lowest,
            Self::Highest => Preference::Highest,
        }
    }
}

impl std::fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lowest => write!(f, "lowest"),
            Self::Highest => write!(f, "highest"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum PrereleaseMode {
    /// Disallow pre-release versions, unless a version range explicitly mentions one.
    #[default]
    Disallow,
    /// Allow all pre-release versions.
    Allow,
}

impl PrereleaseMode {
    pub fn allows_prereleases(self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl std::fmt::Display for PrereleaseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disallow => write!(f, "disallow"),
            Self::Allow => write!(f, "allow"),
        }
    }
}

/// Options for resolving a set of package requests.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    pub resolution_mode: ResolutionMode,
    pub prerelease_mode: PrereleaseMode,
    /// The framework whose dependency groups are followed. Defaults to `net8.0`.
    pub framework: TargetFramework,
    /// The runtime the resolution is for. Recorded alongside the result; it doesn't influence
    /// which versions are chosen.
    pub runtime: Option<Rid>,
    pub compatibility: FrameworkCompatibility,
    /// The maximum number of concurrent metadata requests.
    pub concurrency: usize,
    pub cancellation: CancellationToken,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            resolution_mode: ResolutionMode::default(),
            prerelease_mode: PrereleaseMode::default(),
            framework: TargetFramework::new(
                FrameworkFamily::NetCoreApp,
                FrameworkVersion::new(8, 0, 0),
            ),
            runtime: None,
            compatibility: FrameworkCompatibility::default(),
            concurrency: DEFAULT_CONCURRENCY,
            cancellation: CancellationToken::new(),
        }
    }
}

/// Builder for [`ResolverOptions`].
#[derive(Debug, Default, Clone)]
pub struct ResolverOptionsBuilder {
    options: ResolverOptions,
}

impl ResolverOptionsBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the [`ResolutionMode`].
    #[must_use]
    pub fn resolution_mode(mut self, resolution_mode: ResolutionMode) -> Self {
        self.options.resolution_mode = resolution_mode;
        self
    }

    /// Sets the [`PrereleaseMode`].
    #[must_use]
    pub fn prerelease_mode(mut self, prerelease_mode: PrereleaseMode) -> Self {
        self.options.prerelease_mode = prerelease_mode;
        self
    }

    /// Sets the framework whose dependency groups are followed, replacing the `net8.0` default.
    #[must_use]
    pub fn framework(mut self, framework: TargetFramework) -> Self {
        self.options.framework = framework;
        self
    }

    #[must_use]
    pub fn runtime(mut self, runtime: Option<Rid>) -> Self {
        self.options.runtime = runtime;
        self
    }

    #[must_use]
    pub fn compatibility(mut self, compatibility: FrameworkCompatibility) -> Self {
        self.options.compatibility = compatibility;
        self
    }

    #[must_use]
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.options.concurrency = concurrency.max(1);
        self
    }

    #[must_use]
    pub fn cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.options.cancellation = cancellation;
        self
    }

    /// Builds the options.
    pub fn build(self) -> ResolverOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn default_framework() {
        let options = ResolverOptions::default();
        assert_eq!(options.framework, TargetFramework::from_str("net8.0").unwrap());

        // Framework-specific groups apply without configuring a framework.
        let groups = [
            TargetFramework::from_str("netstandard2.0").unwrap(),
            TargetFramework::from_str("net6.0").unwrap(),
        ];
        assert_eq!(
            options.compatibility.get_nearest(&groups, &options.framework),
            Some(&groups[1])
        );
    }

    #[test]
    fn builder_framework() {
        let options = ResolverOptionsBuilder::new()
            .framework(TargetFramework::from_str("net472").unwrap())
            .build();
        assert_eq!(options.framework.to_string(), "net472");
    }
}
