use std::fmt::Write;

use anyhow::Result;
use owo_colors::OwoColorize;

use nubo_cache::Cache;
use nubo_fs::Simplified;

use crate::commands::ExitStatus;
use crate::printer::Printer;

/// Show the cache directory.
pub(crate) fn cache_dir(cache: &Cache, printer: Printer) -> Result<ExitStatus> {
    writeln!(
        printer.stdout(),
        "{}",
        cache.root().simplified_display().cyan()
    )?;
    Ok(ExitStatus::Success)
}
