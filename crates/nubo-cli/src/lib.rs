use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::builder::Styles;
use clap::builder::styling::{AnsiColor, Effects};
use clap::{Args, Parser, Subcommand};

use nubo_client::FeedUrl;
use nubo_normalize::PackageId;
use nubo_package_types::Dependency;
use nubo_platform::{Rid, TargetFramework};
use nubo_resolver::{PrereleaseMode, ResolutionMode};
use nubo_static::EnvVars;

// Configures Clap v3-style help menu colors
const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

#[derive(Parser)]
#[command(name = "nubo", author, version)]
#[command(about = "Restore .NET packages and lay out their runtime assets.")]
#[command(propagate_version = true)]
#[command(
    disable_help_flag = true,
    disable_help_subcommand = true,
    disable_version_flag = true
)]
#[command(styles = STYLES)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Box<Commands>,

    #[command(flatten)]
    pub top_level: TopLevelArgs,
}

#[derive(Parser)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct TopLevelArgs {
    #[command(flatten)]
    pub cache_args: Box<CacheArgs>,

    #[command(flatten)]
    pub global_args: Box<GlobalArgs>,

    /// The path to a `nubo.toml` file to use for configuration.
    #[arg(
        global = true,
        long,
        env = EnvVars::NUBO_CONFIG_FILE,
        help_heading = "Global options"
    )]
    pub config_file: Option<PathBuf>,

    /// Avoid discovering a `nubo.toml` file.
    ///
    /// Normally, configuration is discovered in the current directory or its parents.
    #[arg(
        global = true,
        long,
        env = EnvVars::NUBO_NO_CONFIG,
        value_parser = clap::builder::BoolishValueParser::new(),
        conflicts_with = "config_file",
        help_heading = "Global options"
    )]
    pub no_config: bool,

    /// Display the concise help for this command.
    #[arg(global = true, short, long, action = clap::ArgAction::HelpShort, help_heading = "Global options")]
    help: Option<bool>,

    /// Display the nubo version.
    #[arg(global = true, short = 'V', long, action = clap::ArgAction::Version, help_heading = "Global options")]
    version: Option<bool>,
}

#[derive(Parser, Debug, Clone)]
#[command(next_help_heading = "Global options", next_display_order = 1000)]
pub struct GlobalArgs {
    /// Do not print any output.
    #[arg(global = true, long, short, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Use verbose output.
    ///
    /// You can configure fine-grained logging using the `RUST_LOG` environment variable.
    /// (<https://docs.rs/tracing-subscriber/latest/tracing_subscriber/filter/struct.EnvFilter.html#directives>)
    #[arg(global = true, action = clap::ArgAction::Count, long, short, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Control colors in output.
    #[arg(
        global = true,
        long,
        value_enum,
        default_value = "auto",
        value_name = "COLOR_CHOICE"
    )]
    pub color: ColorChoice,

    /// Hide all progress outputs.
    ///
    /// For example, spinners or progress bars.
    #[arg(global = true, long)]
    pub no_progress: bool,
}

#[derive(Parser, Debug, Clone)]
#[command(next_help_heading = "Cache options")]
pub struct CacheArgs {
    /// Avoid reading from or writing to the cache, instead using a temporary directory for the
    /// duration of the operation.
    #[arg(
        global = true,
        long,
        short,
        env = EnvVars::NUBO_NO_CACHE,
        value_parser = clap::builder::BoolishValueParser::new(),
    )]
    pub no_cache: bool,

    /// Path to the cache directory.
    ///
    /// Defaults to `$XDG_CACHE_HOME/nubo` or `$HOME/.cache/nubo` on Linux and macOS, and
    /// `%LOCALAPPDATA%\nubo\cache` on Windows.
    #[arg(global = true, long, env = EnvVars::NUBO_CACHE_DIR)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, clap::ValueEnum)]
pub enum ColorChoice {
    /// Enables colored output only when the output is going to a terminal or TTY with support.
    Auto,

    /// Enables colored output regardless of the detected environment.
    Always,

    /// Disables colored output.
    Never,
}

impl From<ColorChoice> for anstream::ColorChoice {
    fn from(value: ColorChoice) -> Self {
        match value {
            ColorChoice::Auto => Self::Auto,
            ColorChoice::Always => Self::Always,
            ColorChoice::Never => Self::Never,
        }
    }
}

#[derive(Subcommand)]
#[allow(clippy::large_enum_variant)]
pub enum Commands {
    /// Resolve packages, fetch them into the cache, and write a lock file.
    ///
    /// Packages are taken from the command line and from the `[dependencies]` table of
    /// `nubo.toml`.
    Restore(RestoreArgs),
    /// Copy the assets of every locked package into a directory.
    Layout(LayoutArgs),
    /// Manage nubo's cache.
    Cache(CacheNamespace),
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// The packages to restore, as `ID@RANGE`, e.g., `Newtonsoft.Json@13.0.3` or
    /// `Microsoft.Extensions.Logging@[9.0.0, )`.
    ///
    /// A bare version requests that exact version; a bare id requests any version.
    #[arg(value_name = "PACKAGE")]
    pub packages: Vec<Dependency>,

    /// A feed to query, as the URL of a V3 service index or the path of a local directory.
    ///
    /// Feeds given on the command line are queried after the feeds from `nubo.toml`. If no feed
    /// is configured at all, the public package gallery is used.
    #[arg(long, env = EnvVars::NUBO_FEED, value_delimiter = ' ')]
    pub feed: Vec<FeedUrl>,

    /// The target framework to restore for, e.g., `net8.0`.
    #[arg(long, env = EnvVars::NUBO_FRAMEWORK)]
    pub framework: Option<TargetFramework>,

    /// The runtime identifier to select runtime-specific assets for, e.g., `linux-x64`.
    #[arg(long, short, env = EnvVars::NUBO_RUNTIME)]
    pub runtime: Option<Rid>,

    /// The strategy to use when selecting between the different compatible versions of a
    /// package.
    ///
    /// By default, nubo will use the lowest compatible version of each package (`lowest`).
    #[arg(long, value_enum, env = EnvVars::NUBO_RESOLUTION)]
    pub resolution: Option<ResolutionMode>,

    /// The strategy to use when considering pre-release versions.
    ///
    /// By default, nubo will accept pre-releases only for packages whose requested range
    /// mentions one (`disallow`).
    #[arg(long, value_enum, env = EnvVars::NUBO_PRERELEASE)]
    pub prerelease: Option<PrereleaseMode>,

    /// The path of the lock file to write.
    ///
    /// Defaults to `nubo.lock` next to `nubo.toml`, or in the current directory.
    #[arg(long, env = EnvVars::NUBO_LOCK_FILE)]
    pub lock_file: Option<PathBuf>,

    /// The maximum number of in-flight downloads and feed requests.
    #[arg(long, env = EnvVars::NUBO_CONCURRENT_DOWNLOADS)]
    pub concurrent_downloads: Option<NonZeroUsize>,

    /// The number of times to retry transient HTTP failures.
    #[arg(long, env = EnvVars::NUBO_HTTP_RETRIES)]
    pub http_retries: Option<u32>,
}

#[derive(Args, Debug)]
pub struct LayoutArgs {
    /// The path of the lock file to read.
    #[arg(long, env = EnvVars::NUBO_LOCK_FILE)]
    pub lock_file: Option<PathBuf>,

    /// The directory to copy the assets into.
    #[arg(long, short)]
    pub output: PathBuf,

    /// A feed to download missing packages from, in addition to the configured feeds.
    #[arg(long, env = EnvVars::NUBO_FEED, value_delimiter = ' ')]
    pub feed: Vec<FeedUrl>,

    /// The maximum number of in-flight downloads.
    #[arg(long, env = EnvVars::NUBO_CONCURRENT_DOWNLOADS)]
    pub concurrent_downloads: Option<NonZeroUsize>,
}

#[derive(Args)]
pub struct CacheNamespace {
    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Clear the cache, removing all entries or those of specific packages.
    Clean(CleanArgs),
    /// Show the cache directory.
    ///
    /// An alternative cache directory may be specified via the `cache-dir` setting, the
    /// `--cache-dir` option, or the `$NUBO_CACHE_DIR` environment variable.
    Dir,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    /// The packages to remove from the cache.
    pub package: Vec<PackageId>,
}
