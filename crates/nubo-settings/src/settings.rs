use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use nubo_client::{Credentials, Feed, FeedUrl, PackagePattern, SourceMapping};
use nubo_normalize::PackageId;
use nubo_package_types::Dependency;
use nubo_platform::{Rid, TargetFramework};
use nubo_resolver::{PrereleaseMode, ResolutionMode};
use nubo_version::VersionRange;

use crate::Error;

/// The contents of a `nubo.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Options {
    /// The target framework to restore for, e.g., `net8.0`.
    pub framework: Option<TargetFramework>,
    /// The runtime identifier to select runtime-specific assets for, e.g., `linux-x64`.
    pub runtime: Option<Rid>,
    pub resolution: Option<ResolutionMode>,
    pub prerelease: Option<PrereleaseMode>,
    pub cache_dir: Option<PathBuf>,
    /// The maximum number of in-flight downloads and feed requests.
    pub concurrent_downloads: Option<NonZeroUsize>,
    /// The number of times to retry transient HTTP failures.
    pub retries: Option<u32>,
    /// A `runtime.json` file that replaces the built-in runtime graph.
    pub runtime_graph: Option<PathBuf>,
    /// The feeds to query, in order.
    #[serde(rename = "feed")]
    pub feeds: Option<Vec<FeedOptions>>,
    /// For each feed name, the patterns of the package ids it may serve.
    pub package_source_mapping: Option<BTreeMap<String, Vec<String>>>,
    /// The packages to restore.
    pub dependencies: Option<BTreeMap<PackageId, VersionRange>>,
}

impl Options {
    /// Resolve any relative paths against `root`.
    #[must_use]
    pub fn relative_to(self, root: &Path) -> Self {
        Self {
            cache_dir: self.cache_dir.map(|path| root.join(path)),
            runtime_graph: self.runtime_graph.map(|path| root.join(path)),
            feeds: self.feeds.map(|feeds| {
                feeds
                    .into_iter()
                    .map(|feed| FeedOptions {
                        path: feed.path.map(|path| root.join(path)),
                        ..feed
                    })
                    .collect()
            }),
            ..self
        }
    }

    /// The configured feeds.
    pub fn feeds(&self) -> Result<Vec<Feed>, Error> {
        self.feeds
            .iter()
            .flatten()
            .map(FeedOptions::to_feed)
            .collect()
    }

    /// The configured package source mapping; empty if none is configured.
    pub fn source_mapping(&self) -> SourceMapping {
        SourceMapping::new(
            self.package_source_mapping
                .iter()
                .flatten()
                .map(|(feed, patterns)| {
                    (
                        feed.clone(),
                        patterns
                            .iter()
                            .map(|pattern| PackagePattern::new(pattern))
                            .collect(),
                    )
                }),
        )
    }

    /// The configured dependencies, as requests.
    pub fn requests(&self) -> Vec<Dependency> {
        self.dependencies
            .iter()
            .flatten()
            .map(|(id, range)| Dependency::new(id.clone(), range.clone()))
            .collect()
    }
}

/// A `[[feed]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FeedOptions {
    pub name: String,
    /// The service index of a remote feed.
    pub url: Option<Url>,
    /// A local directory of package archives.
    pub path: Option<PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl FeedOptions {
    pub fn to_feed(&self) -> Result<Feed, Error> {
        let url = match (&self.url, &self.path) {
            (Some(url), None) => FeedUrl::Remote(url.clone()),
            (None, Some(path)) => FeedUrl::Local(path.clone()),
            (Some(_), Some(_)) => return Err(Error::AmbiguousFeed(self.name.clone())),
            (None, None) => return Err(Error::MissingFeedLocation(self.name.clone())),
        };
        let credentials = self
            .username
            .as_ref()
            .map(|username| Credentials::new(username, self.password.clone()));
        Ok(Feed::new(&self.name, url).with_credentials(credentials))
    }
}
