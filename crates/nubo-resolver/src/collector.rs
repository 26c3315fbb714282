use std::collections::BTreeMap;

use futures::{StreamExt, stream};
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, instrument, trace, warn};

use nubo_client::Feed;
use nubo_normalize::PackageId;
use nubo_package_types::{Dependency, PackageIdentity};
use nubo_version::Version;

use crate::provider::ResolverProvider;
use crate::{DependencyNode, Reporter, ResolutionDiagnostic, ResolveError, ResolverOptions};

/// Every package version reached from the direct requests, along with the diagnostics raised
/// while reaching them.
#[derive(Debug, Default)]
pub(crate) struct Collection {
    pub(crate) nodes: BTreeMap<PackageIdentity, DependencyNode>,
    pub(crate) diagnostics: Vec<ResolutionDiagnostic>,
}

/// The versions of a package listed by each eligible feed.
#[derive(Debug)]
struct Listing<'a> {
    /// The feeds that were consulted, in priority order.
    consulted: Vec<&'a Feed>,
    /// The versions listed by each feed that responded, in priority order.
    versions: Vec<(&'a Feed, Vec<Version>)>,
    /// The names of the feeds that failed to respond.
    unavailable: Vec<String>,
    diagnostics: Vec<ResolutionDiagnostic>,
}

impl Listing<'_> {
    fn feed_names(&self) -> Vec<String> {
        self.consulted
            .iter()
            .map(|feed| feed.name().to_string())
            .collect()
    }
}

/// Walks the dependency graph one level at a time, starting from the direct requests.
///
/// Within a level, version listings and package manifests are fetched concurrently, then
/// processed in request order, so the outcome doesn't depend on response timing.
pub(crate) struct Collector<'a, P: ResolverProvider> {
    provider: &'a P,
    options: &'a ResolverOptions,
    reporter: Option<&'a dyn Reporter>,
    listings: FxHashMap<PackageId, Listing<'a>>,
    collection: Collection,
}

impl<'a, P: ResolverProvider> Collector<'a, P> {
    pub(crate) fn new(
        provider: &'a P,
        options: &'a ResolverOptions,
        reporter: Option<&'a dyn Reporter>,
    ) -> Self {
        Self {
            provider,
            options,
            reporter,
            listings: FxHashMap::default(),
            collection: Collection::default(),
        }
    }

    pub(crate) async fn collect(mut self, requests: &[Dependency]) -> Result<Collection, ResolveError> {
        let mut level = requests.to_vec();
        let mut depth = 0usize;

        while !level.is_empty() {
            debug!(
                "Collecting {} dependency requests at depth {depth}",
                level.len()
            );

            self.fetch_listings(&level).await;

            // Pick a version for every request, skipping versions that were already visited.
            let mut picks: Vec<(PackageIdentity, Vec<&'a Feed>)> = Vec::new();
            let mut queued = FxHashSet::default();
            for request in &level {
                let (identity, feeds) = self.pick(request)?;
                if self.collection.nodes.contains_key(&identity) {
                    trace!("Already visited: {identity}");
                    continue;
                }
                if queued.insert(identity.clone()) {
                    picks.push((identity, feeds));
                }
            }

            let provider = self.provider;
            let options = self.options;
            let fetched = stream::iter(picks)
                .map(|(identity, feeds)| fetch_node(provider, options, identity, feeds))
                .buffered(options.concurrency)
                .collect::<Vec<_>>()
                .await;

            let mut next = Vec::new();
            for (result, diagnostics) in fetched {
                self.collection.diagnostics.extend(diagnostics);
                let node = result?;
                if let Some(reporter) = self.reporter {
                    reporter.on_progress(&node.identity);
                }
                next.extend(node.dependencies.iter().cloned());
                self.collection.nodes.insert(node.identity.clone(), node);
            }

            level = next;
            depth += 1;
        }

        debug!(
            "Collected {} package versions across {depth} levels",
            self.collection.nodes.len()
        );
        Ok(self.collection)
    }

    /// Fetch the version listings for every package id in the level that hasn't been listed yet.
    async fn fetch_listings(&mut self, level: &[Dependency]) {
        let missing = level
            .iter()
            .map(|request| &request.id)
            .filter(|id| !self.listings.contains_key(*id))
            .unique()
            .cloned()
            .collect::<Vec<_>>();
        if missing.is_empty() {
            return;
        }

        let provider = self.provider;
        let fetched = stream::iter(missing)
            .map(|id| async move {
                let listing = list_versions(provider, &id).await;
                (id, listing)
            })
            .buffered(self.options.concurrency)
            .collect::<Vec<_>>()
            .await;

        for (id, mut listing) in fetched {
            self.collection
                .diagnostics
                .extend(std::mem::take(&mut listing.diagnostics));
            self.listings.insert(id, listing);
        }
    }

    /// Pick the preferred version satisfying `request` across every feed that lists the package.
    ///
    /// Returns the version together with the feeds that list it, in priority order; the first
    /// of them is the one the version is taken from.
    fn pick(&self, request: &Dependency) -> Result<(PackageIdentity, Vec<&'a Feed>), ResolveError> {
        let preference = self.options.resolution_mode.preference();
        let allow_prereleases = self.options.prerelease_mode.allows_prereleases();

        let Some(listing) = self.listings.get(&request.id) else {
            return Err(ResolveError::PackageNotFound {
                id: request.id.clone(),
                range: request.range.clone(),
                feeds: Vec::new(),
                unavailable: Vec::new(),
            });
        };

        let mut best: Option<&Version> = None;
        for (_, versions) in &listing.versions {
            let Some(candidate) =
                request
                    .range
                    .find_best_match(versions, preference, allow_prereleases)
            else {
                continue;
            };
            if best.is_none_or(|best| preference.is_better(candidate, best)) {
                best = Some(candidate);
            }
        }

        let Some(best) = best else {
            return Err(ResolveError::PackageNotFound {
                id: request.id.clone(),
                range: request.range.clone(),
                feeds: listing.feed_names(),
                unavailable: listing.unavailable.clone(),
            });
        };

        let feeds = listing
            .versions
            .iter()
            .filter(|(_, versions)| versions.contains(best))
            .map(|(feed, _)| *feed)
            .collect();
        let identity = PackageIdentity::new(request.id.clone(), best.clone());
        trace!("Selected {identity} for {request}");
        Ok((identity, feeds))
    }
}

/// Query every eligible feed for the versions of a package.
///
/// A feed that fails to respond is skipped with a warning.
#[instrument(skip_all, fields(id = %id))]
async fn list_versions<'a, P: ResolverProvider>(provider: &'a P, id: &PackageId) -> Listing<'a> {
    let eligible = provider.eligible_feeds(id);
    let mut diagnostics = Vec::new();
    if eligible.fallback {
        warn!("No feed is mapped to `{id}`; falling back to all configured feeds");
        diagnostics.push(ResolutionDiagnostic::SourceMappingFallback { id: id.clone() });
    }

    let responses =
        futures::future::join_all(eligible.feeds.iter().map(|feed| provider.list_versions(feed, id)))
            .await;

    let mut versions = Vec::new();
    let mut unavailable = Vec::new();
    for (feed, response) in eligible.feeds.iter().zip(responses) {
        match response {
            Ok(listed) => versions.push((*feed, listed)),
            Err(err) => {
                let message = error_chain(&err);
                warn!("Skipping feed `{feed}` for `{id}`: {message}");
                unavailable.push(feed.name().to_string());
                diagnostics.push(ResolutionDiagnostic::FeedUnavailable {
                    feed: feed.name().to_string(),
                    id: id.clone(),
                    message,
                });
            }
        }
    }

    Listing {
        consulted: eligible.feeds,
        versions,
        unavailable,
        diagnostics,
    }
}

/// Fetch the manifest for a package version, trying each feed that lists the version in order.
#[instrument(skip_all, fields(package = %identity))]
async fn fetch_node<P: ResolverProvider>(
    provider: &P,
    options: &ResolverOptions,
    identity: PackageIdentity,
    feeds: Vec<&Feed>,
) -> (Result<DependencyNode, ResolveError>, Vec<ResolutionDiagnostic>) {
    let mut diagnostics = Vec::new();
    let mut unavailable = Vec::new();

    for feed in &feeds {
        match provider.get_nuspec(feed, &identity).await {
            Ok(Some(nuspec)) => {
                let dependencies = nuspec
                    .dependencies_for(&options.framework, &options.compatibility)
                    .to_vec();
                trace!(
                    "{identity} has {} dependencies for {}",
                    dependencies.len(),
                    options.framework
                );
                let node = DependencyNode {
                    identity,
                    feed: feed.name().to_string(),
                    dependencies,
                };
                return (Ok(node), diagnostics);
            }
            Ok(None) => {
                debug!("Feed `{feed}` lists {identity} but has no manifest for it");
            }
            Err(err) => {
                let message = error_chain(&err);
                warn!("Skipping feed `{feed}` for `{identity}`: {message}");
                unavailable.push(feed.name().to_string());
                diagnostics.push(ResolutionDiagnostic::FeedUnavailable {
                    feed: feed.name().to_string(),
                    id: identity.id.clone(),
                    message,
                });
            }
        }
    }

    let err = ResolveError::MetadataNotFound {
        identity,
        feeds: feeds.iter().map(|feed| feed.name().to_string()).collect(),
        unavailable,
    };
    (Err(err), diagnostics)
}

/// Flatten an error and its causes into a single line.
fn error_chain(err: &dyn std::error::Error) -> String {
    std::iter::successors(Some(err), |err| err.source())
        .map(ToString::to_string)
        .join(": ")
}
