use std::fmt::Write;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use nubo_cache::{Cache, Removal};
use nubo_fs::Simplified;
use nubo_normalize::PackageId;

use crate::commands::reporters::CleaningReporter;
use crate::commands::{ExitStatus, human_readable_bytes};
use crate::printer::Printer;

/// Clear the cache, removing all entries or those of specific packages.
pub(crate) fn cache_clean(
    packages: &[PackageId],
    cache: &Cache,
    printer: Printer,
) -> Result<ExitStatus> {
    if !cache.root().exists() {
        writeln!(
            printer.stderr(),
            "No cache found at: {}",
            cache.root().user_display().cyan()
        )?;
        return Ok(ExitStatus::Success);
    }

    if packages.is_empty() {
        writeln!(
            printer.stderr(),
            "Clearing cache at: {}",
            cache.root().user_display().cyan()
        )?;

        let reporter = Box::new(CleaningReporter::from(printer));
        let summary = cache.clear(Some(reporter)).with_context(|| {
            format!("Failed to clear cache at: {}", cache.root().user_display())
        })?;

        write_summary(&summary, None, printer)?;
    } else {
        for package in packages {
            let summary = cache.remove(package)?;
            write_summary(&summary, Some(package), printer)?;
        }
    }

    Ok(ExitStatus::Success)
}

/// Write a summary of the number of files and directories removed, and of the bytes freed.
fn write_summary(summary: &Removal, package: Option<&PackageId>, printer: Printer) -> Result<()> {
    let suffix = package
        .map(|package| format!(" for {}", package.cyan()))
        .unwrap_or_default();

    match (summary.num_files, summary.num_dirs) {
        (0, 0) => {
            write!(printer.stderr(), "No cache entries found{suffix}")?;
        }
        (0, 1) => {
            write!(printer.stderr(), "Removed 1 directory{suffix}")?;
        }
        (0, num_dirs_removed) => {
            write!(
                printer.stderr(),
                "Removed {num_dirs_removed} directories{suffix}"
            )?;
        }
        (1, _) => {
            write!(printer.stderr(), "Removed 1 file{suffix}")?;
        }
        (num_files_removed, _) => {
            write!(printer.stderr(), "Removed {num_files_removed} files{suffix}")?;
        }
    }

    // If any, write a summary of the total byte count removed.
    if summary.total_bytes > 0 {
        let bytes = if summary.total_bytes < 1024 {
            format!("{}B", summary.total_bytes)
        } else {
            let (bytes, unit) = human_readable_bytes(summary.total_bytes);
            format!("{bytes:.1}{unit}")
        };
        write!(printer.stderr(), " ({})", bytes.green())?;
    }

    writeln!(printer.stderr())?;
    Ok(())
}
