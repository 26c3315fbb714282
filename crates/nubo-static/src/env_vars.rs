/// Declares all environment variables used throughout `nubo` and its crates.
pub struct EnvVars;

impl EnvVars {
    /// Equivalent to the `--cache-dir` command-line argument. If set, nubo will use this
    /// directory for caching instead of the default cache directory.
    pub const NUBO_CACHE_DIR: &'static str = "NUBO_CACHE_DIR";

    /// Equivalent to the `--no-cache` command-line argument. If set, nubo will use a temporary
    /// cache directory, removed when the command exits.
    pub const NUBO_NO_CACHE: &'static str = "NUBO_NO_CACHE";

    /// Equivalent to the `--config-file` command-line argument. Expects a path to a local
    /// `nubo.toml` file to use as the configuration file.
    pub const NUBO_CONFIG_FILE: &'static str = "NUBO_CONFIG_FILE";

    /// Equivalent to the `--no-config` command-line argument. If set, nubo will not read any
    /// configuration files from the current directory or its parents.
    pub const NUBO_NO_CONFIG: &'static str = "NUBO_NO_CONFIG";

    /// Equivalent to the `--feed` command-line argument. A space-separated list of feed URLs or
    /// local directories, queried after the feeds from the configuration file.
    pub const NUBO_FEED: &'static str = "NUBO_FEED";

    /// Equivalent to the `--framework` command-line argument, e.g., `net8.0`.
    pub const NUBO_FRAMEWORK: &'static str = "NUBO_FRAMEWORK";

    /// Equivalent to the `--runtime` command-line argument, e.g., `linux-x64`.
    pub const NUBO_RUNTIME: &'static str = "NUBO_RUNTIME";

    /// Equivalent to the `--resolution` command-line argument. For example, if set to
    /// `highest`, nubo will prefer the highest satisfying version of each package.
    pub const NUBO_RESOLUTION: &'static str = "NUBO_RESOLUTION";

    /// Equivalent to the `--prerelease` command-line argument. For example, if set to
    /// `allow`, nubo will allow pre-release versions for all packages.
    pub const NUBO_PRERELEASE: &'static str = "NUBO_PRERELEASE";

    /// Equivalent to the `--lock-file` command-line argument.
    pub const NUBO_LOCK_FILE: &'static str = "NUBO_LOCK_FILE";

    /// Sets the maximum number of in-flight concurrent downloads and feed requests.
    pub const NUBO_CONCURRENT_DOWNLOADS: &'static str = "NUBO_CONCURRENT_DOWNLOADS";

    /// The number of times to retry transient HTTP failures.
    pub const NUBO_HTTP_RETRIES: &'static str = "NUBO_HTTP_RETRIES";

    /// Timeout (in seconds) for HTTP requests.
    pub const NUBO_HTTP_TIMEOUT: &'static str = "NUBO_HTTP_TIMEOUT";

    /// Used to disable delay for HTTP retries in tests.
    pub const NUBO_TEST_NO_HTTP_RETRY_DELAY: &'static str = "NUBO_TEST_NO_HTTP_RETRY_DELAY";

    /// Disables line wrapping of diagnostics.
    pub const NUBO_NO_WRAP: &'static str = "NUBO_NO_WRAP";

    /// Used to determine the terminal width when wrapping diagnostics.
    pub const COLUMNS: &'static str = "COLUMNS";

    /// Path to the user-level cache directory.
    pub const XDG_CACHE_HOME: &'static str = "XDG_CACHE_HOME";

    /// Disables colored output (takes precedence over `FORCE_COLOR`).
    pub const NO_COLOR: &'static str = "NO_COLOR";

    /// Forces colored output regardless of terminal support.
    pub const FORCE_COLOR: &'static str = "FORCE_COLOR";

    /// If set, nubo will use this value as the log level for its `--verbose` output. Accepts
    /// any filter compatible with the `tracing_subscriber` crate. For example:
    ///
    /// * `RUST_LOG=nubo=debug` is the equivalent of adding `--verbose` to the command line
    /// * `RUST_LOG=trace` will enable trace-level logging.
    pub const RUST_LOG: &'static str = "RUST_LOG";
}
