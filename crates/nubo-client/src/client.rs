use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::TryStreamExt;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::RetryTransientMiddleware;
use reqwest_retry::policies::ExponentialBackoff;
use tokio::io::AsyncRead;
use tokio::sync::OnceCell;
use tokio_util::io::StreamReader;
use tracing::{debug, instrument, trace};
use url::Url;

use nubo_fs::Simplified;
use nubo_normalize::PackageId;
use nubo_package_types::{Nuspec, PackageIdentity, ServiceIndex, VersionIndex};
use nubo_static::EnvVars;
use nubo_version::Version;

use crate::{Error, ErrorKind, Feed, FeedUrl};

/// The default number of retries for transient request failures.
pub const DEFAULT_RETRIES: u32 = 3;

/// A streaming package archive.
pub type ArchiveReader = Pin<Box<dyn AsyncRead + Send>>;

/// A builder for a [`FeedClient`].
#[derive(Debug, Clone)]
pub struct FeedClientBuilder {
    retries: u32,
    connect_timeout: Duration,
    read_timeout: Duration,
    user_agent: String,
}

impl Default for FeedClientBuilder {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            user_agent: format!("nubo/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl FeedClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Create a [`ExponentialBackoff`] retry policy for the client.
    fn retry_policy(&self) -> ExponentialBackoff {
        let mut builder = ExponentialBackoff::builder();
        if std::env::var_os(EnvVars::NUBO_TEST_NO_HTTP_RETRY_DELAY).is_some() {
            builder = builder.retry_bounds(Duration::from_millis(0), Duration::from_millis(0));
        }
        builder.build_with_max_retries(self.retries)
    }

    pub fn build(&self) -> Result<FeedClient, Error> {
        debug!(
            "Using request connect timeout of {}s and read timeout of {}s",
            self.connect_timeout.as_secs(),
            self.read_timeout.as_secs()
        );

        let client = reqwest::ClientBuilder::new()
            .user_agent(&self.user_agent)
            .pool_max_idle_per_host(20)
            .read_timeout(self.read_timeout)
            .connect_timeout(self.connect_timeout)
            .build()
            .map_err(ErrorKind::ClientBuild)?;

        let mut client = reqwest_middleware::ClientBuilder::new(client);
        if self.retries > 0 {
            client = client.with(RetryTransientMiddleware::new_with_policy(
                self.retry_policy(),
            ));
        }

        Ok(FeedClient {
            client: client.build(),
            base_addresses: Arc::new(DashMap::new()),
        })
    }
}

/// A client for querying feeds and downloading package archives.
///
/// Remote feeds speak the V3 protocol through their `PackageBaseAddress/3.0.0` resource; local
/// feeds are directories of `.nupkg` archives.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: ClientWithMiddleware,
    /// The package base address of each remote feed, keyed by service index URL and resolved
    /// at most once per client.
    base_addresses: Arc<DashMap<Url, Arc<OnceCell<Url>>>>,
}

impl FeedClient {
    /// List the versions of a package available on a feed.
    ///
    /// A package the feed doesn't know yields an empty list.
    #[instrument(skip_all, fields(feed = feed.name(), id = %id))]
    pub async fn list_versions(&self, feed: &Feed, id: &PackageId) -> Result<Vec<Version>, Error> {
        let result = match feed.url() {
            FeedUrl::Remote(_) => self.remote_versions(feed, id).await,
            FeedUrl::Local(dir) => local_versions(dir, id),
        };
        let versions = result.map_err(|kind| Error::new(kind, feed.name()))?;
        trace!("Found {} versions of {id} on {feed}", versions.len());
        Ok(versions)
    }

    /// Fetch the manifest of a package version from a feed.
    ///
    /// Returns `None` if the feed doesn't have that version.
    #[instrument(skip_all, fields(feed = feed.name(), package = %identity))]
    pub async fn get_nuspec(
        &self,
        feed: &Feed,
        identity: &PackageIdentity,
    ) -> Result<Option<Nuspec>, Error> {
        let result = match feed.url() {
            FeedUrl::Remote(_) => self.remote_nuspec(feed, identity).await,
            FeedUrl::Local(dir) => local_nuspec(dir, identity).await,
        };
        result.map_err(|kind| Error::new(kind, feed.name()))
    }

    /// Open the package archive for streaming.
    #[instrument(skip_all, fields(feed = feed.name(), package = %identity))]
    pub async fn download(
        &self,
        feed: &Feed,
        identity: &PackageIdentity,
    ) -> Result<ArchiveReader, Error> {
        let result = match feed.url() {
            FeedUrl::Remote(_) => self.remote_download(feed, identity).await,
            FeedUrl::Local(dir) => match find_local_archive(dir, identity) {
                Some(path) => {
                    debug!("Reading archive from: {}", path.user_display());
                    fs_err::tokio::File::open(path)
                        .await
                        .map(|file| Box::pin(file) as ArchiveReader)
                        .map_err(ErrorKind::Io)
                }
                None => Err(ErrorKind::Io(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("No archive for {identity} in {}", dir.user_display()),
                ))),
            },
        };
        result.map_err(|kind| Error::new(kind, feed.name()))
    }

    /// Resolve the package base address of a remote feed, fetching its service index once.
    async fn base_address(&self, feed: &Feed) -> Result<Url, ErrorKind> {
        let Some(index_url) = feed.url().service_index() else {
            return Err(ErrorKind::NotRemote(feed.name().to_string()));
        };
        let cell = self
            .base_addresses
            .entry(index_url.clone())
            .or_default()
            .clone();
        cell.get_or_try_init(|| async {
            debug!("Fetching service index: {index_url}");
            let bytes = self.get_bytes(feed, &index_url).await?;
            let index: ServiceIndex =
                serde_json::from_slice(&bytes).map_err(|source| ErrorKind::BadJson {
                    source,
                    url: index_url.clone(),
                })?;
            let Some(address) = index.package_base_address() else {
                return Err(ErrorKind::MissingPackageBaseAddress(index_url.clone()));
            };
            let mut address = Url::parse(address).map_err(|_| {
                ErrorKind::MissingPackageBaseAddress(index_url.clone())
            })?;
            if !address.path().ends_with('/') {
                address.set_path(&format!("{}/", address.path()));
            }
            Ok(address)
        })
        .await
        .cloned()
    }

    /// Build `{base}/{id-lower}/{segments...}`.
    async fn package_url(
        &self,
        feed: &Feed,
        id: &PackageId,
        segments: &[&str],
    ) -> Result<Url, ErrorKind> {
        let mut url = self.base_address(feed).await?;
        if url.cannot_be_a_base() {
            return Err(ErrorKind::CannotBeABase(url));
        }
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.push(id.as_lowercase());
            path.extend(segments);
        }
        Ok(url)
    }

    async fn remote_versions(&self, feed: &Feed, id: &PackageId) -> Result<Vec<Version>, ErrorKind> {
        let url = self.package_url(feed, id, &["index.json"]).await?;
        let bytes = match self.get_bytes(feed, &url).await {
            Ok(bytes) => bytes,
            Err(ErrorKind::WrappedReqwestError(_, err))
                if err.status() == Some(reqwest::StatusCode::NOT_FOUND) =>
            {
                debug!("No versions of {id} on {feed}");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };
        let index: VersionIndex = serde_json::from_slice(&bytes)
            .map_err(|source| ErrorKind::BadJson { source, url })?;
        Ok(index.parse_versions())
    }

    async fn remote_nuspec(
        &self,
        feed: &Feed,
        identity: &PackageIdentity,
    ) -> Result<Option<Nuspec>, ErrorKind> {
        let version = identity.version.to_string().to_lowercase();
        let file = format!("{}.nuspec", identity.id.as_lowercase());
        let url = self
            .package_url(feed, &identity.id, &[&version, &file])
            .await?;
        let bytes = match self.get_bytes(feed, &url).await {
            Ok(bytes) => bytes,
            Err(ErrorKind::WrappedReqwestError(_, err))
                if err.status() == Some(reqwest::StatusCode::NOT_FOUND) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(err),
        };
        Nuspec::parse(&bytes)
            .map(Some)
            .map_err(|source| ErrorKind::BadNuspec {
                source,
                location: url.to_string(),
            })
    }

    async fn remote_download(
        &self,
        feed: &Feed,
        identity: &PackageIdentity,
    ) -> Result<ArchiveReader, ErrorKind> {
        let version = identity.version.to_string().to_lowercase();
        let file = format!("{}.{version}.nupkg", identity.id.as_lowercase());
        let url = self
            .package_url(feed, &identity.id, &[&version, &file])
            .await?;
        debug!("Downloading: {url}");
        let response = self.get(feed, &url).await?;
        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn get(&self, feed: &Feed, url: &Url) -> Result<reqwest::Response, ErrorKind> {
        let mut request = self.client.get(url.clone());
        if let Some(credentials) = feed.credentials() {
            request = request.basic_auth(credentials.username(), credentials.password());
        }
        request
            .send()
            .await
            .map_err(|err| ErrorKind::from_reqwest_middleware(url.clone(), err))?
            .error_for_status()
            .map_err(|err| ErrorKind::from_reqwest(url.clone(), err))
    }

    async fn get_bytes(&self, feed: &Feed, url: &Url) -> Result<Vec<u8>, ErrorKind> {
        let response = self.get(feed, url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|err| ErrorKind::from_reqwest(url.clone(), err))?;
        Ok(bytes.to_vec())
    }
}

/// List versions from a local folder feed, in either the flat (`{id}.{version}.nupkg`) or the
/// hierarchical (`{id}/{version}/{id}.{version}.nupkg`) layout.
fn local_versions(dir: &Path, id: &PackageId) -> Result<Vec<Version>, ErrorKind> {
    if !dir.is_dir() {
        return Err(ErrorKind::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Feed directory does not exist: {}", dir.user_display()),
        )));
    }

    let mut versions = local_archives(dir, id)
        .map(|(version, _)| version)
        .collect::<Vec<_>>();
    versions.sort();
    versions.dedup();
    Ok(versions)
}

/// Find the archive for a package version in a local folder feed.
///
/// Archive names aren't necessarily normalized (`Foo.1.0.nupkg` is version `1.0.0`), so
/// archives are matched on their parsed version.
fn find_local_archive(dir: &Path, identity: &PackageIdentity) -> Option<PathBuf> {
    local_archives(dir, &identity.id)
        .find(|(version, _)| *version == identity.version)
        .map(|(_, path)| path)
}

/// Every archive of a package in a local folder feed, with the version its name declares.
fn local_archives<'a>(
    dir: &'a Path,
    id: &'a PackageId,
) -> impl Iterator<Item = (Version, PathBuf)> + 'a {
    let flat = nubo_fs::files(dir).filter_map(move |path| {
        let version = archive_version(&path, id)?;
        Some((version, path))
    });

    let hierarchical = nubo_fs::directories(dir)
        .filter(move |id_dir| {
            id_dir
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.eq_ignore_ascii_case(id.as_str()))
        })
        .flat_map(nubo_fs::directories)
        .filter_map(move |version_dir| {
            let version = version_dir
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| Version::from_str(name).ok())?;
            let path = nubo_fs::files(&version_dir)
                .find(|path| archive_version(path, id).is_some_and(|found| found == version))?;
            Some((version, path))
        });

    flat.chain(hierarchical)
}

/// The version of `id` an archive file name declares, if it's an archive of `id`.
fn archive_version(path: &Path, id: &PackageId) -> Option<Version> {
    let name = path.file_name()?.to_str()?.to_lowercase();
    let prefix = format!("{}.", id.as_lowercase());
    let version = name.strip_suffix(".nupkg")?.strip_prefix(&prefix)?;
    // `Foo.Bar.1.0.0.nupkg` also starts with `foo.`, but isn't a version of `Foo`.
    Version::from_str(version).ok()
}

async fn local_nuspec(dir: &Path, identity: &PackageIdentity) -> Result<Option<Nuspec>, ErrorKind> {
    let Some(path) = find_local_archive(dir, identity) else {
        return Ok(None);
    };
    let bytes = fs_err::tokio::read(&path).await?;
    let contents = tokio::task::spawn_blocking(move || nubo_extract::read_nuspec(Cursor::new(bytes)))
        .await?
        .map_err(|err| ErrorKind::Archive(path.clone(), err))?;
    Nuspec::parse(&contents)
        .map(Some)
        .map_err(|source| ErrorKind::BadNuspec {
            source,
            location: path.user_display().to_string(),
        })
}
