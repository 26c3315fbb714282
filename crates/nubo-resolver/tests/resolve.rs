use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use insta::assert_snapshot;
use test_log::test;
use tokio_util::sync::CancellationToken;

use nubo_client::{
    EligibleFeeds, ErrorKind, Feed, FeedUrl, PackagePattern, SourceMapping, eligible_feeds,
};
use nubo_normalize::PackageId;
use nubo_package_types::{Dependency, DependencyGroup, Nuspec, PackageIdentity};
use nubo_resolver::{
    NuspecResult, PackageVersionsResult, PrereleaseMode, Reporter, ResolutionDiagnostic,
    ResolutionMode, ResolveError, ResolvedPackageSet, Resolver, ResolverOptions,
    ResolverOptionsBuilder, ResolverProvider, resolve,
};
use nubo_version::Version;

/// A set of feeds held in memory.
#[derive(Default)]
struct InMemoryFeeds {
    feeds: Vec<Feed>,
    mapping: SourceMapping,
    /// The versions listed by each feed.
    versions: BTreeMap<(String, PackageId), Vec<Version>>,
    /// The manifests served by each feed.
    nuspecs: BTreeMap<(String, PackageIdentity), Nuspec>,
    unavailable: BTreeSet<String>,
    nuspec_requests: AtomicUsize,
}

impl InMemoryFeeds {
    fn new(names: &[&str]) -> Self {
        Self {
            feeds: names
                .iter()
                .map(|name| Feed::new(*name, FeedUrl::Local(PathBuf::from(name))))
                .collect(),
            ..Self::default()
        }
    }

    /// Add a package version, e.g. `A@1.0.0`, with dependencies such as `B@[1.0.0, )`.
    fn package(mut self, feed: &str, package: &str, dependencies: &[&str]) -> Self {
        let identity = identity(package);
        let dependencies = dependencies
            .iter()
            .map(|dependency| Dependency::from_str(dependency).unwrap())
            .collect();
        self.nuspecs.insert(
            (feed.to_string(), identity.clone()),
            Nuspec {
                id: identity.id.clone(),
                version: identity.version.clone(),
                dependency_groups: vec![DependencyGroup {
                    target_framework: None,
                    dependencies,
                }],
                framework_reference_groups: vec![],
            },
        );
        self.listing(feed, package)
    }

    /// List a package version without serving its manifest.
    fn listing(mut self, feed: &str, package: &str) -> Self {
        let identity = identity(package);
        let versions = self
            .versions
            .entry((feed.to_string(), identity.id))
            .or_default();
        if !versions.contains(&identity.version) {
            versions.push(identity.version);
        }
        self
    }

    fn unavailable(mut self, feed: &str) -> Self {
        self.unavailable.insert(feed.to_string());
        self
    }

    fn mapping(mut self, mapping: SourceMapping) -> Self {
        self.mapping = mapping;
        self
    }

    fn outage(&self, feed: &Feed) -> nubo_client::Error {
        nubo_client::Error::new(
            ErrorKind::Io(std::io::Error::other("connection refused")),
            feed.name(),
        )
    }
}

impl ResolverProvider for &InMemoryFeeds {
    fn eligible_feeds(&self, id: &PackageId) -> EligibleFeeds<'_> {
        eligible_feeds(id, &self.feeds, &self.mapping)
    }

    async fn list_versions<'io>(
        &'io self,
        feed: &'io Feed,
        id: &'io PackageId,
    ) -> PackageVersionsResult {
        if self.unavailable.contains(feed.name()) {
            return Err(self.outage(feed));
        }
        Ok(self
            .versions
            .get(&(feed.name().to_string(), id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_nuspec<'io>(
        &'io self,
        feed: &'io Feed,
        identity: &'io PackageIdentity,
    ) -> NuspecResult {
        self.nuspec_requests.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.contains(feed.name()) {
            return Err(self.outage(feed));
        }
        Ok(self
            .nuspecs
            .get(&(feed.name().to_string(), identity.clone()))
            .cloned())
    }
}

fn identity(package: &str) -> PackageIdentity {
    let (id, version) = package.split_once('@').unwrap();
    PackageIdentity::new(
        PackageId::from_str(id).unwrap(),
        Version::from_str(version).unwrap(),
    )
}

fn requests(requests: &[&str]) -> Vec<Dependency> {
    requests
        .iter()
        .map(|request| Dependency::from_str(request).unwrap())
        .collect()
}

fn options(mode: ResolutionMode) -> ResolverOptions {
    ResolverOptionsBuilder::new().resolution_mode(mode).build()
}

/// The resolution as `Id@version` strings.
fn versions(resolution: &ResolvedPackageSet) -> Vec<String> {
    resolution
        .packages()
        .map(|package| package.identity().to_string())
        .collect()
}

fn logging_feed() -> InMemoryFeeds {
    InMemoryFeeds::new(&["nuget.org"])
        .package(
            "nuget.org",
            "Microsoft.Extensions.Logging@9.0.0",
            &[
                "Microsoft.Extensions.Logging.Abstractions@[9.0.0, )",
                "Microsoft.Extensions.DependencyInjection.Abstractions@[9.0.0, )",
            ],
        )
        .package(
            "nuget.org",
            "Microsoft.Extensions.Logging.Abstractions@9.0.0",
            &[],
        )
        .package(
            "nuget.org",
            "Microsoft.Extensions.Logging.Abstractions@9.0.1",
            &[],
        )
        .package(
            "nuget.org",
            "Microsoft.Extensions.DependencyInjection.Abstractions@9.0.0",
            &[],
        )
}

#[test(tokio::test)]
async fn single_package() -> Result<()> {
    let feeds = InMemoryFeeds::new(&["nuget.org"]).package(
        "nuget.org",
        "Newtonsoft.Json@13.0.3",
        &[],
    );

    let resolution = resolve(
        &requests(&["Newtonsoft.Json@13.0.3"]),
        &feeds,
        &ResolverOptions::default(),
    )
    .await?;

    assert_eq!(versions(&resolution), vec!["Newtonsoft.Json@13.0.3"]);
    let package = resolution.packages().next().unwrap();
    assert!(package.direct);
    assert_eq!(package.feed(), "nuget.org");
    assert!(resolution.diagnostics().is_empty());
    Ok(())
}

#[test(tokio::test)]
async fn transitive_dependencies() -> Result<()> {
    let feeds = logging_feed();

    let resolution = resolve(
        &requests(&["Microsoft.Extensions.Logging@9.0.0"]),
        &feeds,
        &ResolverOptions::default(),
    )
    .await?;

    assert_eq!(
        versions(&resolution),
        vec![
            "Microsoft.Extensions.DependencyInjection.Abstractions@9.0.0",
            "Microsoft.Extensions.Logging@9.0.0",
            "Microsoft.Extensions.Logging.Abstractions@9.0.0",
        ]
    );
    assert_snapshot!(resolution.to_string(), @r"
    Microsoft.Extensions.DependencyInjection.Abstractions==9.0.0
        # via Microsoft.Extensions.Logging
    Microsoft.Extensions.Logging==9.0.0
    Microsoft.Extensions.Logging.Abstractions==9.0.0
        # via Microsoft.Extensions.Logging
    ");
    Ok(())
}

#[test(tokio::test)]
async fn incompatible_direct_requests() {
    let feeds = InMemoryFeeds::new(&["nuget.org"])
        .package("nuget.org", "X@1.0.0", &[])
        .package("nuget.org", "X@2.0.0", &[]);

    let err = resolve(
        &requests(&["X@1.0.0", "X@2.0.0"]),
        &feeds,
        &ResolverOptions::default(),
    )
    .await
    .unwrap_err();

    let ResolveError::VersionConflict { id, constraints } = &err else {
        panic!("expected a version conflict, got: {err}");
    };
    assert_eq!(id.as_str(), "X");
    assert_eq!(constraints.len(), 2);
    assert_snapshot!(err.to_string(), @"No version of `X` satisfies all constraints: `[1.0.0]` (requested), `[2.0.0]` (requested)");
}

#[test(tokio::test)]
async fn package_not_found() {
    let feeds = InMemoryFeeds::new(&["nuget.org", "local"]).package(
        "nuget.org",
        "Newtonsoft.Json@13.0.3",
        &[],
    );

    let err = resolve(
        &requests(&["Does.Not.Exist@[1.0.0, )"]),
        &feeds,
        &ResolverOptions::default(),
    )
    .await
    .unwrap_err();

    assert!(matches!(&err, ResolveError::PackageNotFound { id, .. } if id.as_str() == "Does.Not.Exist"));
    assert_snapshot!(err.to_string(), @"No version of `Does.Not.Exist` satisfying `[1.0.0, )` was found (consulted: `nuget.org`, `local`)");
}

#[test(tokio::test)]
async fn transitive_package_not_found_is_fatal() {
    let feeds = InMemoryFeeds::new(&["nuget.org"]).package("nuget.org", "A@1.0.0", &["Missing@[1.0.0, )"]);

    let err = resolve(&requests(&["A@1.0.0"]), &feeds, &ResolverOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(&err, ResolveError::PackageNotFound { id, .. } if id.as_str() == "Missing"));
}

#[test(tokio::test)]
async fn resolution_mode() -> Result<()> {
    let feeds = InMemoryFeeds::new(&["nuget.org"])
        .package("nuget.org", "Microsoft.Extensions.Logging@9.0.0", &[])
        .package("nuget.org", "Microsoft.Extensions.Logging@9.0.1", &[])
        .package("nuget.org", "Microsoft.Extensions.Logging@9.1.0", &[]);
    let request = requests(&["Microsoft.Extensions.Logging@[9.0.0, )"]);

    let lowest = resolve(&request, &feeds, &options(ResolutionMode::Lowest)).await?;
    assert_eq!(versions(&lowest), vec!["Microsoft.Extensions.Logging@9.0.0"]);

    let highest = resolve(&request, &feeds, &options(ResolutionMode::Highest)).await?;
    assert_eq!(versions(&highest), vec!["Microsoft.Extensions.Logging@9.1.0"]);
    Ok(())
}

#[test(tokio::test)]
async fn highest_mode_never_decreases_versions() -> Result<()> {
    let feeds = InMemoryFeeds::new(&["nuget.org"])
        .package("nuget.org", "A@1.0.0", &["B@[1.0.0, )", "C@[1.0.0, 3.0.0)"])
        .package("nuget.org", "A@1.5.0", &["B@[1.5.0, )", "C@[1.0.0, 3.0.0)"])
        .package("nuget.org", "B@1.0.0", &[])
        .package("nuget.org", "B@1.5.0", &[])
        .package("nuget.org", "B@2.0.0", &[])
        .package("nuget.org", "C@1.0.0", &[])
        .package("nuget.org", "C@2.0.0", &[])
        .package("nuget.org", "C@3.0.0", &[]);
    let request = requests(&["A@[1.0.0, )"]);

    let lowest = resolve(&request, &feeds, &options(ResolutionMode::Lowest)).await?;
    let highest = resolve(&request, &feeds, &options(ResolutionMode::Highest)).await?;

    assert_eq!(versions(&lowest), vec!["A@1.0.0", "B@1.0.0", "C@1.0.0"]);
    assert_eq!(versions(&highest), vec!["A@1.5.0", "B@2.0.0", "C@2.0.0"]);
    for (id, version) in lowest.versions() {
        assert!(highest.versions()[id] >= version);
    }
    Ok(())
}

#[test(tokio::test)]
async fn prereleases() -> Result<()> {
    let feeds = InMemoryFeeds::new(&["nuget.org"])
        .package("nuget.org", "A@1.0.0", &[])
        .package("nuget.org", "A@2.0.0-beta.1", &[]);
    let request = requests(&["A@[1.0.0, )"]);

    let resolution = resolve(&request, &feeds, &options(ResolutionMode::Highest)).await?;
    assert_eq!(versions(&resolution), vec!["A@1.0.0"]);

    let options = ResolverOptionsBuilder::new()
        .resolution_mode(ResolutionMode::Highest)
        .prerelease_mode(PrereleaseMode::Allow)
        .build();
    let resolution = resolve(&request, &feeds, &options).await?;
    assert_eq!(versions(&resolution), vec!["A@2.0.0-beta.1"]);
    Ok(())
}

#[test(tokio::test)]
async fn cycle() -> Result<()> {
    let feeds = InMemoryFeeds::new(&["nuget.org"])
        .package("nuget.org", "A@1.0.0", &["B@[1.0.0, )"])
        .package("nuget.org", "B@1.0.0", &["A@[1.0.0, )"]);

    let resolution = resolve(&requests(&["A@1.0.0"]), &feeds, &ResolverOptions::default()).await?;

    assert_eq!(versions(&resolution), vec!["A@1.0.0", "B@1.0.0"]);
    // One manifest fetch per node.
    assert_eq!(feeds.nuspec_requests.load(Ordering::Relaxed), 2);
    Ok(())
}

#[test(tokio::test)]
async fn diamond_is_visited_once() -> Result<()> {
    let feeds = InMemoryFeeds::new(&["nuget.org"])
        .package("nuget.org", "A@1.0.0", &["B@[1.0.0, )", "C@[1.0.0, )"])
        .package("nuget.org", "B@1.0.0", &["D@[1.0.0, )"])
        .package("nuget.org", "C@1.0.0", &["D@[1.0.0, )"])
        .package("nuget.org", "D@1.0.0", &[]);

    let resolution = resolve(&requests(&["A@1.0.0"]), &feeds, &ResolverOptions::default()).await?;

    assert_eq!(resolution.len(), 4);
    assert_eq!(feeds.nuspec_requests.load(Ordering::Relaxed), 4);
    Ok(())
}

/// A graph where the first versions picked conflict, but the conflict disappears once the
/// package imposing it is upgraded.
fn upgrade_feed() -> InMemoryFeeds {
    InMemoryFeeds::new(&["nuget.org"])
        .package("nuget.org", "A@1.0.0", &["C@[1.0.0, 1.5.0]"])
        .package("nuget.org", "A@2.0.0", &["C@[2.0.0, )"])
        .package("nuget.org", "B@1.0.0", &["A@[2.0.0, )"])
        .package("nuget.org", "C@1.0.0", &[])
        .package("nuget.org", "C@2.0.0", &[])
}

#[test(tokio::test)]
async fn constraints_of_replaced_versions_are_dropped() -> Result<()> {
    let feeds = upgrade_feed();

    let resolution = resolve(
        &requests(&["A@[1.0.0, )", "B@[1.0.0, )"]),
        &feeds,
        &ResolverOptions::default(),
    )
    .await?;

    assert_eq!(versions(&resolution), vec!["A@2.0.0", "B@1.0.0", "C@2.0.0"]);
    assert_eq!(
        resolution.diagnostics(),
        [ResolutionDiagnostic::DirectRequestOverridden {
            id: PackageId::from_str("A")?,
            requested: Version::from_str("1.0.0")?,
            resolved: Version::from_str("2.0.0")?,
        }]
    );
    assert_snapshot!(resolution.diagnostics()[0].to_string(), @"`A` was requested at 1.0.0, but resolved to 2.0.0 to satisfy other packages");
    Ok(())
}

#[test(tokio::test)]
async fn every_constraint_is_satisfied() -> Result<()> {
    let feeds = upgrade_feed();

    let resolution = resolve(
        &requests(&["A@[1.0.0, )", "B@[1.0.0, )"]),
        &feeds,
        &ResolverOptions::default(),
    )
    .await?;

    for package in resolution.packages() {
        for dependency in package.dependencies() {
            let resolved = resolution.get(&dependency.id).unwrap();
            assert!(
                dependency.range.satisfies(&resolved.identity().version),
                "{} requires {dependency}, but {} was resolved",
                package.identity(),
                resolved.identity()
            );
        }
    }
    Ok(())
}

#[test(tokio::test)]
async fn transitive_conflict() {
    let feeds = InMemoryFeeds::new(&["nuget.org"])
        .package("nuget.org", "A@1.0.0", &["C@1.0.0"])
        .package("nuget.org", "B@1.0.0", &["C@2.0.0"])
        .package("nuget.org", "C@1.0.0", &[])
        .package("nuget.org", "C@2.0.0", &[]);

    let err = resolve(
        &requests(&["A@1.0.0", "B@1.0.0"]),
        &feeds,
        &ResolverOptions::default(),
    )
    .await
    .unwrap_err();

    assert_snapshot!(err.to_string(), @"No version of `C` satisfies all constraints: `[1.0.0]` (required by A@1.0.0), `[2.0.0]` (required by B@1.0.0)");
}

#[test(tokio::test)]
async fn deterministic() -> Result<()> {
    let feeds = logging_feed()
        .package("nuget.org", "Microsoft.Extensions.Logging@9.1.0", &[
            "Microsoft.Extensions.Logging.Abstractions@[9.0.1, )",
        ]);
    let request = requests(&["Microsoft.Extensions.Logging@[9.0.0, )"]);

    let first = resolve(&request, &feeds, &options(ResolutionMode::Highest)).await?;
    for concurrency in [1, 2, 16] {
        let options = ResolverOptionsBuilder::new()
            .resolution_mode(ResolutionMode::Highest)
            .concurrency(concurrency)
            .build();
        let resolution = resolve(&request, &feeds, &options).await?;
        assert_eq!(resolution, first);
    }
    Ok(())
}

#[test(tokio::test)]
async fn best_version_across_feeds() -> Result<()> {
    let feeds = InMemoryFeeds::new(&["first", "second"])
        .package("first", "A@1.0.0", &[])
        .package("second", "A@1.0.0", &[])
        .package("second", "A@2.0.0", &[]);
    let request = requests(&["A@[1.0.0, )"]);

    let highest = resolve(&request, &feeds, &options(ResolutionMode::Highest)).await?;
    let package = highest.packages().next().unwrap();
    assert_eq!(package.identity().to_string(), "A@2.0.0");
    assert_eq!(package.feed(), "second");

    // On a tie, the feed configured first wins.
    let lowest = resolve(&request, &feeds, &options(ResolutionMode::Lowest)).await?;
    let package = lowest.packages().next().unwrap();
    assert_eq!(package.identity().to_string(), "A@1.0.0");
    assert_eq!(package.feed(), "first");
    Ok(())
}

#[test(tokio::test)]
async fn missing_manifest_falls_through_to_next_feed() -> Result<()> {
    let feeds = InMemoryFeeds::new(&["first", "second"])
        .listing("first", "A@1.0.0")
        .package("second", "A@1.0.0", &[]);

    let resolution = resolve(&requests(&["A@1.0.0"]), &feeds, &ResolverOptions::default()).await?;

    assert_eq!(resolution.packages().next().unwrap().feed(), "second");
    Ok(())
}

#[test(tokio::test)]
async fn missing_manifest_everywhere() {
    let feeds = InMemoryFeeds::new(&["first"]).listing("first", "A@1.0.0");

    let err = resolve(&requests(&["A@1.0.0"]), &feeds, &ResolverOptions::default())
        .await
        .unwrap_err();

    assert_snapshot!(err.to_string(), @"`A@1.0.0` was listed by a feed, but its package manifest is unavailable (consulted: `first`)");
}

#[test(tokio::test)]
async fn unavailable_feed_is_skipped() -> Result<()> {
    let feeds = InMemoryFeeds::new(&["broken", "nuget.org"])
        .package("nuget.org", "A@1.0.0", &[])
        .unavailable("broken");

    let resolution = resolve(&requests(&["A@1.0.0"]), &feeds, &ResolverOptions::default()).await?;

    assert_eq!(versions(&resolution), vec!["A@1.0.0"]);
    assert!(matches!(
        resolution.diagnostics(),
        [ResolutionDiagnostic::FeedUnavailable { feed, .. }] if feed == "broken"
    ));
    Ok(())
}

#[test(tokio::test)]
async fn only_feed_unavailable() {
    let feeds = InMemoryFeeds::new(&["broken"])
        .package("broken", "A@1.0.0", &[])
        .unavailable("broken");

    let err = resolve(&requests(&["A@1.0.0"]), &feeds, &ResolverOptions::default())
        .await
        .unwrap_err();

    assert_snapshot!(err.to_string(), @"No version of `A` satisfying `[1.0.0]` was found (consulted: `broken` (unavailable))");
}

#[test(tokio::test)]
async fn source_mapping() -> Result<()> {
    let mapping = SourceMapping::new([
        ("internal".to_string(), vec![PackagePattern::new("Contoso.*")]),
        ("nuget.org".to_string(), vec![PackagePattern::new("Newtonsoft.Json")]),
    ]);
    let feeds = InMemoryFeeds::new(&["nuget.org", "internal"])
        .package("nuget.org", "Contoso.Core@9.0.0", &["Newtonsoft.Json@[13.0.1, )", "Other@1.0.0"])
        .package("internal", "Contoso.Core@1.0.0", &["Newtonsoft.Json@[13.0.1, )", "Other@1.0.0"])
        .package("nuget.org", "Newtonsoft.Json@13.0.3", &[])
        .package("internal", "Newtonsoft.Json@13.0.1", &[])
        .package("nuget.org", "Other@1.0.0", &[])
        .mapping(mapping);

    let resolution = resolve(
        &requests(&["Contoso.Core@[1.0.0, )"]),
        &feeds,
        &options(ResolutionMode::Highest),
    )
    .await?;

    let feeds_by_package = resolution
        .packages()
        .map(|package| (package.identity().to_string(), package.feed().to_string()))
        .collect::<Vec<_>>();
    assert_eq!(
        feeds_by_package,
        vec![
            ("Contoso.Core@1.0.0".to_string(), "internal".to_string()),
            ("Newtonsoft.Json@13.0.3".to_string(), "nuget.org".to_string()),
            ("Other@1.0.0".to_string(), "nuget.org".to_string()),
        ]
    );
    assert_eq!(
        resolution.diagnostics(),
        [ResolutionDiagnostic::SourceMappingFallback {
            id: PackageId::from_str("Other")?,
        }]
    );
    Ok(())
}

#[test(tokio::test)]
async fn cancellation() {
    let feeds = logging_feed();
    let token = CancellationToken::new();
    token.cancel();
    let options = ResolverOptionsBuilder::new().cancellation(token).build();

    let err = resolve(
        &requests(&["Microsoft.Extensions.Logging@9.0.0"]),
        &feeds,
        &options,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ResolveError::Cancelled));
    assert_eq!(feeds.nuspec_requests.load(Ordering::Relaxed), 0);
}

#[test(tokio::test)]
async fn reporter() -> Result<()> {
    #[derive(Default)]
    struct CountingReporter {
        progress: AtomicUsize,
        complete: AtomicUsize,
    }

    impl Reporter for CountingReporter {
        fn on_progress(&self, _identity: &PackageIdentity) {
            self.progress.fetch_add(1, Ordering::Relaxed);
        }

        fn on_complete(&self) {
            self.complete.fetch_add(1, Ordering::Relaxed);
        }
    }

    let feeds = logging_feed();
    let reporter = Arc::new(CountingReporter::default());
    Resolver::new(
        requests(&["Microsoft.Extensions.Logging@9.0.0"]),
        ResolverOptions::default(),
        &feeds,
    )
    .with_reporter(reporter.clone())
    .resolve()
    .await?;

    assert_eq!(reporter.progress.load(Ordering::Relaxed), 3);
    assert_eq!(reporter.complete.load(Ordering::Relaxed), 1);
    Ok(())
}

#[test(tokio::test)]
async fn no_requests() -> Result<()> {
    let feeds = InMemoryFeeds::new(&["nuget.org"]);
    let resolution = resolve(&[], &feeds, &ResolverOptions::default()).await?;
    assert!(resolution.is_empty());
    Ok(())
}
