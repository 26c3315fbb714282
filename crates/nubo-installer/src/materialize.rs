use std::collections::BTreeMap;
use std::path::PathBuf;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, instrument};

use nubo_assets::{AssetSelection, AssetSelector, RuntimeAssets};
use nubo_cache::CachedPackage;
use nubo_normalize::PackageId;
use nubo_package_types::{Nuspec, PackageIdentity};
use nubo_resolver::{ResolvedPackage, ResolvedPackageSet};

use crate::{Error, Fetcher};

/// The assets selected from one extracted package.
#[derive(Debug, Clone)]
pub struct PackageAssets {
    pub identity: PackageIdentity,
    /// The package's directory in the cache.
    pub dir: PathBuf,
    pub selection: AssetSelection,
}

/// The assets of every package in a resolution.
#[derive(Debug, Clone, Default)]
pub struct MaterializedAssets {
    pub packages: BTreeMap<PackageId, PackageAssets>,
    /// Every selected asset, keyed by the name the runtime looks it up by.
    pub runtime: RuntimeAssets,
}

/// Ensure every resolved package is extracted in the cache, and select its assets.
///
/// Packages are fetched concurrently; the result is ordered by package id regardless of the
/// order in which fetches complete.
#[instrument(skip_all, fields(packages = resolution.len()))]
pub async fn materialize_assets(
    resolution: &ResolvedPackageSet,
    fetcher: &Fetcher<'_>,
    selector: &AssetSelector,
) -> Result<MaterializedAssets, Error> {
    let mut packages = stream::iter(resolution.packages())
        .map(|package| materialize(package, fetcher, selector))
        .buffer_unordered(fetcher.concurrency())
        .try_collect::<Vec<_>>()
        .await?;
    packages.sort_unstable_by(|a, b| a.identity.cmp(&b.identity));

    let mut materialized = MaterializedAssets::default();
    for package in packages {
        materialized
            .runtime
            .add(&package.dir, &package.selection, selector.is_windows());
        materialized
            .packages
            .insert(package.identity.id.clone(), package);
    }

    if let Some(reporter) = fetcher.reporter() {
        reporter.on_complete();
    }
    Ok(materialized)
}

async fn materialize(
    package: &ResolvedPackage,
    fetcher: &Fetcher<'_>,
    selector: &AssetSelector,
) -> Result<PackageAssets, Error> {
    let identity = package.identity();
    let feed = fetcher.feed(identity, package.feed())?;
    let cached = fetcher.ensure_extracted(identity, feed).await?;
    let selection = select(&cached, selector)?;
    debug!(
        "Selected {} managed and {} native assets from {identity}",
        selection.managed.len(),
        selection.native.len()
    );
    Ok(PackageAssets {
        identity: identity.clone(),
        dir: cached.dir().to_path_buf(),
        selection,
    })
}

/// Select the assets of an extracted package.
pub fn select(cached: &CachedPackage, selector: &AssetSelector) -> Result<AssetSelection, Error> {
    let identity = cached.identity();
    let cache_error = |err| Error::Cache {
        identity: identity.clone(),
        err,
    };

    let files = nubo_fs::list_files_recursive(cached.dir()).map_err(cache_error)?;
    let contents = fs_err::read(cached.dir().join(cached.nuspec_name())).map_err(cache_error)?;
    let nuspec = Nuspec::parse(&contents).map_err(|err| Error::Nuspec {
        identity: identity.clone(),
        err,
    })?;

    Ok(selector.select(&files, &nuspec.framework_reference_groups))
}
