use std::fmt::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use nubo_assets::AssetSelector;
use nubo_cache::Cache;
use nubo_client::{FeedClient, FeedClientBuilder};
use nubo_fs::Simplified;
use nubo_installer::{Fetcher, materialize_assets};
use nubo_lock::{Lock, LockedPackage};
use nubo_platform::{FrameworkCompatibility, RuntimeGraph};
use nubo_resolver::{DefaultResolverProvider, Resolver, ResolverOptionsBuilder};
use nubo_warnings::warn_user;

use crate::commands::reporters::{DownloadReporter, ResolverReporter};
use crate::commands::{ExitStatus, elapsed};
use crate::printer::Printer;
use crate::settings::{NetworkSettings, RestoreSettings};

/// Resolve the requested packages, fetch them into the cache, and write the lock file.
pub(crate) async fn restore(
    settings: RestoreSettings,
    cache: &Cache,
    cancellation: CancellationToken,
    printer: Printer,
) -> Result<ExitStatus> {
    if settings.requests.is_empty() {
        writeln!(
            printer.stderr(),
            "No packages to restore; pass them on the command line or list them under `[dependencies]` in `nubo.toml`"
        )?;
        return Ok(ExitStatus::Failure);
    }

    let client = build_client(&settings.network)?;
    let graph = match settings.runtime_graph.as_deref() {
        Some(path) => RuntimeGraph::from_path(path).with_context(|| {
            format!("Failed to read runtime graph: `{}`", path.user_display())
        })?,
        None => RuntimeGraph::embedded(),
    };
    if let Some(runtime) = settings.runtime.as_ref() {
        if !graph.contains(runtime) {
            debug!("`{runtime}` is not in the runtime graph; deriving its fallbacks from its name");
        }
    }

    let compatibility = FrameworkCompatibility::default();
    let options = ResolverOptionsBuilder::new()
        .resolution_mode(settings.resolution)
        .prerelease_mode(settings.prerelease)
        .framework(settings.framework.clone())
        .runtime(settings.runtime.clone())
        .compatibility(compatibility.clone())
        .concurrency(settings.concurrency)
        .cancellation(cancellation.clone())
        .build();

    // Resolve the requests.
    let start = std::time::Instant::now();
    let provider =
        DefaultResolverProvider::new(&client, &settings.feeds, &settings.source_mapping);
    let resolution = Resolver::new(settings.requests.clone(), options, provider)
        .with_reporter(Arc::new(ResolverReporter::from(printer)))
        .resolve()
        .await?;

    for diagnostic in resolution.diagnostics() {
        warn_user!("{diagnostic}");
    }

    let s = if resolution.len() == 1 { "" } else { "s" };
    writeln!(
        printer.stderr(),
        "{}",
        format!(
            "Resolved {} in {}",
            format!("{} package{}", resolution.len(), s).bold(),
            elapsed(start.elapsed())
        )
        .dimmed()
    )?;

    // Fetch every resolved package and select its assets.
    let start = std::time::Instant::now();
    let missing = resolution
        .packages()
        .filter(|package| !cache.package(package.identity()).is_complete())
        .count();
    let fetcher = Fetcher::new(&client, cache, &settings.feeds)
        .with_concurrency(settings.concurrency)
        .with_cancellation(cancellation)
        .with_reporter(Arc::new(
            DownloadReporter::from(printer).with_length(missing as u64),
        ));
    let selector = AssetSelector::new(
        settings.framework.clone(),
        settings.runtime.clone(),
        &graph,
        compatibility,
    );
    let assets = materialize_assets(&resolution, &fetcher, &selector).await?;

    if missing > 0 {
        let s = if missing == 1 { "" } else { "s" };
        writeln!(
            printer.stderr(),
            "{}",
            format!(
                "Downloaded {} in {}",
                format!("{missing} package{s}").bold(),
                elapsed(start.elapsed())
            )
            .dimmed()
        )?;
    }

    // Record the resolution, along with the selected assets and archive hashes.
    let packages = resolution
        .packages()
        .map(|package| {
            let identity = package.identity();
            let selection = assets
                .packages
                .get(&identity.id)
                .map(|assets| assets.selection.clone())
                .unwrap_or_default();
            let hash = cache
                .package(identity)
                .metadata()
                .map(|metadata| metadata.content_hash);
            LockedPackage::new(package, selection, hash)
        })
        .collect();
    let lock = Lock::new(
        settings.framework,
        settings.runtime,
        settings.resolution,
        packages,
    )?;
    lock.write(&settings.lock_file).await.with_context(|| {
        format!(
            "Failed to write lock file: `{}`",
            settings.lock_file.user_display()
        )
    })?;

    for package in lock.packages() {
        writeln!(
            printer.stderr(),
            " {} {}{}",
            "+".green(),
            package.id.as_str().bold(),
            format!("=={}", package.version).dimmed()
        )?;
    }

    Ok(ExitStatus::Success)
}

/// Build a [`FeedClient`] from the network settings.
pub(super) fn build_client(network: &NetworkSettings) -> Result<FeedClient> {
    let mut builder = FeedClientBuilder::new().retries(network.retries);
    if let Some(timeout) = network.timeout {
        builder = builder.read_timeout(timeout);
    }
    Ok(builder.build()?)
}
