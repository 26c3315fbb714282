use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::{StreamExt, TryStreamExt, stream};
use owo_colors::OwoColorize;
use tokio_util::sync::CancellationToken;

use nubo_assets::RuntimeAssets;
use nubo_cache::{Cache, CachedPackage};
use nubo_fs::Simplified;
use nubo_installer::{Fetcher, Reporter};
use nubo_lock::{Lock, LockedPackage};
use nubo_platform::Rid;

use crate::commands::reporters::DownloadReporter;
use crate::commands::restore::build_client;
use crate::commands::{ExitStatus, elapsed};
use crate::printer::Printer;
use crate::settings::LayoutSettings;

/// The name of the asset map written into the output directory.
pub(crate) const ASSETS_FILE_NAME: &str = "nubo.assets.json";

/// Copy the selected assets of every locked package into a directory.
pub(crate) async fn layout(
    settings: LayoutSettings,
    cache: &Cache,
    cancellation: CancellationToken,
    printer: Printer,
) -> Result<ExitStatus> {
    let start = std::time::Instant::now();

    let Some(lock) = Lock::read(&settings.lock_file).await? else {
        writeln!(
            printer.stderr(),
            "No lock file found at: {} (run `nubo restore` first)",
            settings.lock_file.user_display().cyan()
        )?;
        return Ok(ExitStatus::Failure);
    };

    // Fetch any package that's missing from the cache, checking it against the locked hash.
    let client = build_client(&settings.network)?;
    let missing = lock
        .packages()
        .iter()
        .filter(|package| !cache.package(&package.identity()).is_complete())
        .count();
    let reporter = Arc::new(DownloadReporter::from(printer).with_length(missing as u64));
    let fetcher = Fetcher::new(&client, cache, &settings.feeds)
        .with_concurrency(settings.concurrency)
        .with_cancellation(cancellation)
        .with_hashes(lock.hashes())
        .with_reporter(reporter.clone());

    let cached = stream::iter(lock.packages())
        .map(|package| extract(package, &fetcher))
        .buffered(settings.concurrency)
        .try_collect::<Vec<_>>()
        .await?;
    reporter.on_complete();

    // Name the assets the way the runtime looks them up, then copy them into place.
    let windows = lock.runtime().map_or(cfg!(windows), Rid::is_windows);
    let mut assets = RuntimeAssets::default();
    for (package, cached) in lock.packages().iter().zip(&cached) {
        assets.add(cached.dir(), &package.selection(), windows);
    }

    fs_err::tokio::create_dir_all(&settings.output).await?;
    let output = std::path::absolute(&settings.output)?;
    let laid_out = RuntimeAssets {
        managed: copy_all(&assets.managed, &output)?,
        native: copy_all(&assets.native, &output)?,
        framework_references: assets.framework_references,
    };
    let json = serde_json::to_string_pretty(&laid_out)?;
    fs_err::tokio::write(output.join(ASSETS_FILE_NAME), json).await?;

    let count = laid_out.managed.len() + laid_out.native.len();
    let s = if count == 1 { "" } else { "s" };
    writeln!(
        printer.stderr(),
        "{}",
        format!(
            "Laid out {} into {} in {}",
            format!("{count} asset{s}").bold(),
            output.user_display(),
            elapsed(start.elapsed())
        )
        .dimmed()
    )?;

    Ok(ExitStatus::Success)
}

async fn extract(package: &LockedPackage, fetcher: &Fetcher<'_>) -> Result<CachedPackage> {
    let identity = package.identity();
    let feed = fetcher.feed(&identity, &package.source)?;
    Ok(fetcher.ensure_extracted(&identity, feed).await?)
}

/// Copy each asset into `output` by its file name, returning the copied paths.
fn copy_all(
    assets: &BTreeMap<String, PathBuf>,
    output: &Path,
) -> Result<BTreeMap<String, PathBuf>> {
    assets
        .iter()
        .map(|(name, source)| {
            let file_name = source
                .file_name()
                .with_context(|| format!("Asset has no file name: `{}`", source.user_display()))?;
            let target = output.join(file_name);
            fs_err::copy(source, &target)?;
            Ok((name.clone(), target))
        })
        .collect()
}
