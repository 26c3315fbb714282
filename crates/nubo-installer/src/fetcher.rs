use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use nubo_cache::{Cache, CachedPackage, NupkgMetadata};
use nubo_client::{Feed, FeedClient};
use nubo_extract::hash::HashReader;
use nubo_fs::Simplified;
use nubo_package_types::PackageIdentity;

use crate::locks::Locks;
use crate::{DownloadError, Error};

/// Fetches package archives from feeds and extracts them into the cache.
pub struct Fetcher<'a> {
    client: &'a FeedClient,
    cache: &'a Cache,
    feeds: &'a [Feed],
    locks: Arc<Locks>,
    hashes: FxHashMap<PackageIdentity, String>,
    cancellation: CancellationToken,
    concurrency: usize,
    reporter: Option<Arc<dyn Reporter>>,
}

impl<'a> Fetcher<'a> {
    /// The default number of concurrent downloads.
    pub const DEFAULT_CONCURRENCY: usize = 50;

    pub fn new(client: &'a FeedClient, cache: &'a Cache, feeds: &'a [Feed]) -> Self {
        Self {
            client,
            cache,
            feeds,
            locks: Arc::new(Locks::default()),
            hashes: FxHashMap::default(),
            cancellation: CancellationToken::new(),
            concurrency: Self::DEFAULT_CONCURRENCY,
            reporter: None,
        }
    }

    /// Set the [`Reporter`] to use for this fetcher.
    #[must_use]
    pub fn with_reporter(self, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter: Some(reporter),
            ..self
        }
    }

    #[must_use]
    pub fn with_cancellation(self, cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            ..self
        }
    }

    /// Set the maximum number of concurrent downloads.
    #[must_use]
    pub fn with_concurrency(self, concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            ..self
        }
    }

    /// Require the archives of the given packages to match a base64-encoded SHA-512.
    #[must_use]
    pub fn with_hashes(self, hashes: impl IntoIterator<Item = (PackageIdentity, String)>) -> Self {
        Self {
            hashes: hashes.into_iter().collect(),
            ..self
        }
    }

    pub fn cache(&self) -> &Cache {
        self.cache
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub(crate) fn reporter(&self) -> Option<&dyn Reporter> {
        self.reporter.as_deref()
    }

    /// The configured feed with the given name.
    pub fn feed(&self, identity: &PackageIdentity, name: &str) -> Result<&'a Feed, Error> {
        self.feeds
            .iter()
            .find(|feed| feed.name() == name)
            .ok_or_else(|| Error::UnknownFeed {
                identity: identity.clone(),
                feed: name.to_string(),
            })
    }

    /// Ensure the package is extracted in the cache, downloading it from `feed` if needed.
    ///
    /// A complete cache entry is returned without any network access. Otherwise the archive is
    /// downloaded and extracted into a staging directory, which is moved into place once its
    /// completion marker is written; an interrupted fetch never leaves a complete-looking entry
    /// behind.
    pub async fn ensure_extracted(
        &self,
        identity: &PackageIdentity,
        feed: &Feed,
    ) -> Result<CachedPackage, Error> {
        let package = self.cache.package(identity);
        if package.is_complete() {
            trace!("Cache hit for {identity}");
            return Ok(package);
        }

        tokio::select! {
            biased;
            () = self.cancellation.cancelled() => Err(Error::Cancelled),
            result = self.fetch(package, feed) => result,
        }
    }

    #[instrument(skip_all, fields(package = %package.identity(), feed = feed.name()))]
    async fn fetch(&self, package: CachedPackage, feed: &Feed) -> Result<CachedPackage, Error> {
        let identity = package.identity().clone();

        let lock = self.locks.acquire(&identity).await;
        let _guard = lock.lock().await;
        let _lock = self
            .cache
            .lock(&identity)
            .await
            .map_err(|err| Error::Cache {
                identity: identity.clone(),
                err,
            })?;

        // Another task or process may have finished the extraction while we waited.
        if package.is_complete() {
            debug!("Extracted concurrently: {identity}");
            return Ok(package);
        }

        if let Some(reporter) = self.reporter.as_ref() {
            reporter.on_download_start(&identity);
        }

        self.download_and_extract(&package, feed)
            .await
            .map_err(|err| Error::DownloadFailed {
                identity: identity.clone(),
                feed: feed.name().to_string(),
                err,
            })?;

        if let Some(reporter) = self.reporter.as_ref() {
            reporter.on_download_complete(&identity);
        }
        Ok(package)
    }

    async fn download_and_extract(
        &self,
        package: &CachedPackage,
        feed: &Feed,
    ) -> Result<(), DownloadError> {
        let identity = package.identity();
        let parent = self.cache.package_versions(&identity.id);

        // Stream the archive to a temporary file, hashing it along the way.
        let reader = self.client.download(feed, identity).await?;
        let mut reader = HashReader::new(reader);
        let archive = nubo_fs::tempfile_in(&parent)?;
        let mut writer = tokio::fs::File::from_std(archive.reopen()?);
        tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        drop(writer);
        let content_hash = reader.digest();
        debug!("Downloaded {identity} ({content_hash})");

        if let Some(expected) = self.hashes.get(identity) {
            if *expected != content_hash {
                return Err(DownloadError::HashMismatch {
                    expected: expected.clone(),
                    actual: content_hash,
                });
            }
        }

        let staging = self.cache.staging(identity)?;
        let extracted = nubo_extract::unzip_file(archive.path(), staging.path()).await?;

        // Store the manifest under its canonical, lowercase name.
        let nuspec = nubo_extract::read_nuspec(std::io::BufReader::new(fs_err::File::open(
            archive.path(),
        )?))?;
        for file in &extracted {
            if !file.contains('/')
                && file.to_ascii_lowercase().ends_with(".nuspec")
                && *file != package.nuspec_name()
            {
                fs_err::remove_file(staging.path().join(file))?;
            }
        }
        fs_err::write(staging.path().join(package.nuspec_name()), nuspec)?;
        fs_err::write(staging.path().join(package.sha512_name()), &content_hash)?;
        drop(archive);

        NupkgMetadata::new(identity.clone(), content_hash, Some(feed.name().to_string()))
            .write(staging.path())?;

        self.cache.persist(staging.path(), package).await?;
        debug!("Extracted {identity} to: {}", package.dir().user_display());
        Ok(())
    }
}

pub trait Reporter: Send + Sync {
    /// Callback to invoke when a package archive starts downloading.
    fn on_download_start(&self, identity: &PackageIdentity);

    /// Callback to invoke when a package archive has been downloaded and extracted.
    fn on_download_complete(&self, identity: &PackageIdentity);

    /// Callback to invoke when the assets of every package have been materialized.
    fn on_complete(&self);
}
