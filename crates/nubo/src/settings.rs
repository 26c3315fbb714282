use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rustc_hash::FxHashSet;

use nubo_cli::{CacheArgs, ColorChoice, GlobalArgs, LayoutArgs, RestoreArgs};
use nubo_client::{DEFAULT_RETRIES, Feed, SourceMapping};
use nubo_lock::LOCK_FILE_NAME;
use nubo_package_types::Dependency;
use nubo_platform::{FrameworkFamily, FrameworkVersion, Rid, TargetFramework};
use nubo_resolver::{DEFAULT_CONCURRENCY, PrereleaseMode, ResolutionMode};
use nubo_settings::{Combine, FilesystemOptions, Options};
use nubo_static::EnvVars;
use nubo_warnings::warn_user_once;

/// The framework to restore for when none is configured.
fn default_framework() -> TargetFramework {
    TargetFramework::new(FrameworkFamily::NetCoreApp, FrameworkVersion::new(8, 0, 0))
}

/// The resolved global settings to use for any invocation of the CLI.
#[derive(Debug, Clone)]
pub(crate) struct GlobalSettings {
    pub(crate) quiet: bool,
    pub(crate) verbose: u8,
    pub(crate) color: ColorChoice,
    pub(crate) no_progress: bool,
}

impl GlobalSettings {
    /// Resolve the [`GlobalSettings`] from the CLI.
    pub(crate) fn resolve(args: &GlobalArgs) -> Self {
        Self {
            quiet: args.quiet,
            verbose: args.verbose,
            color: match args.color {
                ColorChoice::Auto if env_flag(EnvVars::NO_COLOR) => ColorChoice::Never,
                ColorChoice::Auto if env_flag(EnvVars::FORCE_COLOR) => ColorChoice::Always,
                color => color,
            },
            // Disable the progress bar with `RUST_LOG` to avoid progress fragments interleaving
            // with log messages.
            no_progress: args.no_progress || std::env::var_os(EnvVars::RUST_LOG).is_some(),
        }
    }
}

/// The resolved cache settings to use for any invocation of the CLI.
#[derive(Debug, Clone)]
pub(crate) struct CacheSettings {
    pub(crate) no_cache: bool,
    pub(crate) cache_dir: Option<PathBuf>,
}

impl CacheSettings {
    /// Resolve the [`CacheSettings`] from the CLI and filesystem configuration.
    pub(crate) fn resolve(args: CacheArgs, filesystem: Option<&FilesystemOptions>) -> Self {
        Self {
            no_cache: args.no_cache,
            cache_dir: args
                .cache_dir
                .or_else(|| filesystem.and_then(|filesystem| filesystem.cache_dir.clone())),
        }
    }
}

/// The resolved settings to use for a `restore` invocation.
#[derive(Debug, Clone)]
pub(crate) struct RestoreSettings {
    pub(crate) requests: Vec<Dependency>,
    pub(crate) feeds: Vec<Feed>,
    pub(crate) source_mapping: SourceMapping,
    pub(crate) framework: TargetFramework,
    pub(crate) runtime: Option<Rid>,
    pub(crate) resolution: ResolutionMode,
    pub(crate) prerelease: PrereleaseMode,
    pub(crate) runtime_graph: Option<PathBuf>,
    pub(crate) lock_file: PathBuf,
    pub(crate) concurrency: usize,
    pub(crate) network: NetworkSettings,
}

impl RestoreSettings {
    /// Resolve the [`RestoreSettings`] from the CLI and filesystem configuration.
    pub(crate) fn resolve(
        args: RestoreArgs,
        filesystem: Option<FilesystemOptions>,
        cwd: &Path,
    ) -> anyhow::Result<Self> {
        let RestoreArgs {
            packages,
            feed,
            framework,
            runtime,
            resolution,
            prerelease,
            lock_file,
            concurrent_downloads,
            http_retries,
        } = args;

        let lock_file = default_lock_file(lock_file, filesystem.as_ref(), cwd);
        let options = Options {
            framework,
            runtime,
            resolution,
            prerelease,
            concurrent_downloads,
            retries: http_retries,
            ..Options::default()
        }
        .combine(
            filesystem
                .map(FilesystemOptions::into_options)
                .unwrap_or_default(),
        );

        // Packages on the command line replace configured dependencies with the same id.
        let requested = packages
            .iter()
            .map(|dependency| dependency.id.clone())
            .collect::<FxHashSet<_>>();
        let requests = packages
            .into_iter()
            .chain(
                options
                    .requests()
                    .into_iter()
                    .filter(|dependency| !requested.contains(&dependency.id)),
            )
            .collect();

        Ok(Self {
            requests,
            feeds: resolve_feeds(&options, feed)?,
            source_mapping: options.source_mapping(),
            framework: options.framework.unwrap_or_else(default_framework),
            runtime: options.runtime,
            resolution: options.resolution.unwrap_or_default(),
            prerelease: options.prerelease.unwrap_or_default(),
            runtime_graph: options.runtime_graph,
            lock_file,
            concurrency: options
                .concurrent_downloads
                .map_or(DEFAULT_CONCURRENCY, NonZeroUsize::get),
            network: NetworkSettings::resolve(options.retries),
        })
    }
}

/// The resolved settings to use for a `layout` invocation.
#[derive(Debug, Clone)]
pub(crate) struct LayoutSettings {
    pub(crate) lock_file: PathBuf,
    pub(crate) output: PathBuf,
    pub(crate) feeds: Vec<Feed>,
    pub(crate) concurrency: usize,
    pub(crate) network: NetworkSettings,
}

impl LayoutSettings {
    /// Resolve the [`LayoutSettings`] from the CLI and filesystem configuration.
    pub(crate) fn resolve(
        args: LayoutArgs,
        filesystem: Option<FilesystemOptions>,
        cwd: &Path,
    ) -> anyhow::Result<Self> {
        let LayoutArgs {
            lock_file,
            output,
            feed,
            concurrent_downloads,
        } = args;

        let lock_file = default_lock_file(lock_file, filesystem.as_ref(), cwd);
        let options = Options {
            concurrent_downloads,
            ..Options::default()
        }
        .combine(
            filesystem
                .map(FilesystemOptions::into_options)
                .unwrap_or_default(),
        );

        Ok(Self {
            lock_file,
            output: cwd.join(output),
            feeds: resolve_feeds(&options, feed)?,
            concurrency: options
                .concurrent_downloads
                .map_or(DEFAULT_CONCURRENCY, NonZeroUsize::get),
            network: NetworkSettings::resolve(options.retries),
        })
    }
}

/// The resolved network settings shared by commands that talk to feeds.
#[derive(Debug, Clone)]
pub(crate) struct NetworkSettings {
    pub(crate) retries: u32,
    pub(crate) timeout: Option<Duration>,
}

impl NetworkSettings {
    fn resolve(retries: Option<u32>) -> Self {
        let timeout = match std::env::var(EnvVars::NUBO_HTTP_TIMEOUT) {
            Ok(value) => match value.parse::<u64>() {
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => {
                    warn_user_once!(
                        "Ignoring invalid value for `{}`: `{value}` (expected a number of seconds)",
                        EnvVars::NUBO_HTTP_TIMEOUT
                    );
                    None
                }
            },
            Err(_) => None,
        };
        Self {
            retries: retries.unwrap_or(DEFAULT_RETRIES),
            timeout,
        }
    }
}

/// The configured feeds followed by those given on the command line, or the public gallery if
/// there are none.
fn resolve_feeds(options: &Options, cli: Vec<nubo_client::FeedUrl>) -> anyhow::Result<Vec<Feed>> {
    let mut feeds = options.feeds()?;
    feeds.extend(cli.into_iter().map(Feed::from_url));
    if feeds.is_empty() {
        feeds.push(Feed::default_feed());
    }
    Ok(feeds)
}

/// The lock file given on the command line, or `nubo.lock` next to `nubo.toml`, or in the
/// working directory.
fn default_lock_file(
    lock_file: Option<PathBuf>,
    filesystem: Option<&FilesystemOptions>,
    cwd: &Path,
) -> PathBuf {
    match (lock_file, filesystem) {
        (Some(lock_file), _) => cwd.join(lock_file),
        (None, Some(filesystem)) => filesystem.root().join(LOCK_FILE_NAME),
        (None, None) => cwd.join(LOCK_FILE_NAME),
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var_os(name).is_some_and(|value| !value.is_empty())
}
