use std::future::Future;

use nubo_client::{EligibleFeeds, Feed, FeedClient, SourceMapping, eligible_feeds};
use nubo_normalize::PackageId;
use nubo_package_types::{Nuspec, PackageIdentity};
use nubo_version::Version;

pub type PackageVersionsResult = Result<Vec<Version>, nubo_client::Error>;
pub type NuspecResult = Result<Option<Nuspec>, nubo_client::Error>;

/// The I/O backend of the resolver.
pub trait ResolverProvider {
    /// The feeds allowed to serve `id`, in priority order.
    fn eligible_feeds(&self, id: &PackageId) -> EligibleFeeds<'_>;

    /// List the versions of a package available on a single feed.
    fn list_versions<'io>(
        &'io self,
        feed: &'io Feed,
        id: &'io PackageId,
    ) -> impl Future<Output = PackageVersionsResult> + 'io;

    /// Fetch a package's manifest from a single feed, or `None` if the feed doesn't have it.
    fn get_nuspec<'io>(
        &'io self,
        feed: &'io Feed,
        identity: &'io PackageIdentity,
    ) -> impl Future<Output = NuspecResult> + 'io;
}

/// The main I/O backend for the resolver, querying the configured feeds over the network or
/// the file system.
pub struct DefaultResolverProvider<'a> {
    client: &'a FeedClient,
    feeds: &'a [Feed],
    mapping: &'a SourceMapping,
}

impl<'a> DefaultResolverProvider<'a> {
    pub fn new(client: &'a FeedClient, feeds: &'a [Feed], mapping: &'a SourceMapping) -> Self {
        Self {
            client,
            feeds,
            mapping,
        }
    }
}

impl ResolverProvider for DefaultResolverProvider<'_> {
    fn eligible_feeds(&self, id: &PackageId) -> EligibleFeeds<'_> {
        eligible_feeds(id, self.feeds, self.mapping)
    }

    async fn list_versions<'io>(
        &'io self,
        feed: &'io Feed,
        id: &'io PackageId,
    ) -> PackageVersionsResult {
        self.client.list_versions(feed, id).await
    }

    async fn get_nuspec<'io>(
        &'io self,
        feed: &'io Feed,
        identity: &'io PackageIdentity,
    ) -> NuspecResult {
        self.client.get_nuspec(feed, identity).await
    }
}
