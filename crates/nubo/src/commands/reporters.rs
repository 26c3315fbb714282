use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use nubo_package_types::PackageIdentity;

use crate::printer::Printer;

#[derive(Debug)]
pub(crate) struct ResolverReporter {
    progress: ProgressBar,
}

impl From<Printer> for ResolverReporter {
    fn from(printer: Printer) -> Self {
        let progress = ProgressBar::with_draw_target(None, printer.target());
        progress.enable_steady_tick(Duration::from_millis(200));
        progress.set_style(
            ProgressStyle::with_template("{spinner:.white} {wide_msg:.dim}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        progress.set_message("Resolving dependencies...");
        Self { progress }
    }
}

impl nubo_resolver::Reporter for ResolverReporter {
    fn on_progress(&self, identity: &PackageIdentity) {
        self.progress
            .set_message(format!("Resolving dependencies ({identity})"));
    }

    fn on_complete(&self) {
        self.progress.finish_and_clear();
    }
}

#[derive(Debug)]
pub(crate) struct DownloadReporter {
    progress: ProgressBar,
}

impl From<Printer> for DownloadReporter {
    fn from(printer: Printer) -> Self {
        let progress = ProgressBar::with_draw_target(None, printer.target());
        progress.set_message("Downloading packages...");
        progress.set_style(
            ProgressStyle::with_template("{bar:20} [{pos}/{len}] {wide_msg:.dim}").unwrap(),
        );
        Self { progress }
    }
}

impl DownloadReporter {
    #[must_use]
    pub(crate) fn with_length(self, length: u64) -> Self {
        self.progress.set_length(length);
        self
    }
}

impl nubo_installer::Reporter for DownloadReporter {
    fn on_download_start(&self, identity: &PackageIdentity) {
        self.progress.set_message(identity.to_string());
    }

    fn on_download_complete(&self, identity: &PackageIdentity) {
        self.progress.set_message(identity.to_string());
        self.progress.inc(1);
    }

    fn on_complete(&self) {
        self.progress.finish_and_clear();
    }
}

#[derive(Debug)]
pub(crate) struct CleaningReporter {
    progress: ProgressBar,
}

impl From<Printer> for CleaningReporter {
    fn from(printer: Printer) -> Self {
        let progress = ProgressBar::with_draw_target(None, printer.target());
        progress.enable_steady_tick(Duration::from_millis(200));
        progress.set_style(ProgressStyle::with_template("{spinner:.white} {wide_msg:.dim}").unwrap());
        progress.set_message("Clearing cache...");
        Self { progress }
    }
}

impl nubo_cache::CleanReporter for CleaningReporter {
    fn on_clean(&self) {
        self.progress.inc(1);
    }

    fn on_complete(&self) {
        self.progress.finish_and_clear();
    }
}
