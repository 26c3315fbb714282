use std::error::Error;
use std::fmt::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use nubo_cache::Cache;
use nubo_cli::{CacheCommand, CacheNamespace, Cli, Commands};
use nubo_fs::Simplified;
use nubo_resolver::ResolveError;
use nubo_settings::FilesystemOptions;

use crate::commands::ExitStatus;
use crate::logging::Level;
use crate::printer::{Printer, Stderr};
use crate::settings::{CacheSettings, GlobalSettings, LayoutSettings, RestoreSettings};

mod commands;
mod logging;
mod printer;
mod settings;

async fn run(cli: Cli, cancellation: CancellationToken) -> Result<ExitStatus> {
    let Cli {
        command,
        top_level,
    } = cli;

    let globals = GlobalSettings::resolve(&top_level.global_args);

    // Configure the `tracing` crate, which controls internal logging.
    logging::setup_logging(Level::from(globals.verbose))?;

    // Configure the `Printer`, which controls user-facing output in the CLI.
    let printer = if globals.quiet {
        Printer::Quiet
    } else if globals.verbose > 0 {
        Printer::Verbose
    } else if globals.no_progress {
        Printer::NoProgress
    } else {
        Printer::Default
    };

    // Configure the `warn_user!` macros, which control user-facing warnings in the CLI.
    if !globals.quiet {
        nubo_warnings::enable();
    }

    anstream::ColorChoice::write_global(globals.color.into());

    // Load configuration from an explicit file, or discover it from the working directory.
    let cwd = std::env::current_dir().context("Failed to determine the working directory")?;
    let filesystem = if let Some(config_file) = top_level.config_file.as_ref() {
        Some(FilesystemOptions::from_file(config_file).with_context(|| {
            format!(
                "Failed to read configuration: `{}`",
                config_file.user_display()
            )
        })?)
    } else if top_level.no_config {
        None
    } else {
        FilesystemOptions::find(&cwd)?
    };

    let cache_settings = CacheSettings::resolve(*top_level.cache_args, filesystem.as_ref());
    let cache = Cache::from_settings(cache_settings.no_cache, cache_settings.cache_dir)?;
    debug!("Using cache at: {}", cache.root().user_display());

    match *command {
        Commands::Restore(args) => {
            let settings = RestoreSettings::resolve(args, filesystem, &cwd)?;
            let cache = cache.init()?;
            commands::restore(settings, &cache, cancellation, printer).await
        }
        Commands::Layout(args) => {
            let settings = LayoutSettings::resolve(args, filesystem, &cwd)?;
            let cache = cache.init()?;
            commands::layout(settings, &cache, cancellation, printer).await
        }
        Commands::Cache(CacheNamespace {
            command: CacheCommand::Clean(args),
        }) => commands::cache_clean(&args.package, &cache, printer),
        Commands::Cache(CacheNamespace {
            command: CacheCommand::Dir,
        }) => commands::cache_dir(&cache, printer),
    }
}

/// Returns `true` if the error was caused by the user interrupting the operation.
fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<ResolveError>(),
            Some(ResolveError::Cancelled)
        ) || matches!(
            cause.downcast_ref::<nubo_installer::Error>(),
            Some(nubo_installer::Error::Cancelled)
        )
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // The first interrupt cancels in-flight work; a second one exits immediately.
    let cancellation = CancellationToken::new();
    let token = cancellation.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        if token.is_cancelled() {
            #[allow(clippy::exit)]
            std::process::exit(130);
        }
        token.cancel();
    }) {
        debug!("Failed to install the interrupt handler: {err}");
    }

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed building the Runtime")
        .block_on(run(cli, cancellation));

    match result {
        Ok(code) => code.into(),
        Err(err) => {
            let status = if is_cancelled(&err) {
                ExitStatus::Cancelled
            } else {
                ExitStatus::Error
            };
            let err: &(dyn Error + 'static) = err.as_ref();
            let mut stderr = Stderr::Enabled;
            if status == ExitStatus::Cancelled {
                let _ = writeln!(stderr, "Operation cancelled");
            } else {
                let _ = nubo_warnings::write_error_chain(err, stderr);
            }
            status.into()
        }
    }
}
