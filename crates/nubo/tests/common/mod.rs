// The `unreachable_pub` is to silence false positives in RustRover.
#![allow(dead_code, unreachable_pub)]

use std::borrow::BorrowMut;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Output};

use assert_fs::fixture::{ChildPath, PathChild, PathCreateDir};
use indoc::formatdoc;
use regex::Regex;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

#[doc(hidden)] // Macro and test context only, don't use directly.
pub const INSTA_FILTERS: &[(&str, &str)] = &[
    // Operation times
    (r"(\s|\()(\d+m )?(\d+\.)?\d+(ms|s)", "$1[TIME]"),
    // File sizes
    (r"(\s|\()(\d+\.)?\d+([KM]i)?B", "$1[SIZE]"),
    // Rewrite Windows output to Unix output
    (r"\\([\w\d])", "/$1"),
    (r"nubo.exe", "nubo"),
    // The exact message is host language dependent
    (
        r"Caused by: .* \(os error 2\)",
        "Caused by: No such file or directory (os error 2)",
    ),
];

/// Create a context for tests which simplifies shared behavior across tests.
///
/// * Set the current directory to a temporary directory (`temp_dir`).
/// * Set the cache dir to a different temporary directory (`cache_dir`).
/// * Serve packages from a local folder feed (`feed_dir`), so tests never touch the network.
pub struct TestContext {
    pub temp_dir: ChildPath,
    pub cache_dir: ChildPath,
    pub feed_dir: ChildPath,

    /// Standard filters for this test context.
    filters: Vec<(String, String)>,

    #[allow(dead_code)]
    _root: assert_fs::TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let root = assert_fs::TempDir::new().expect("Failed to create test root directory");

        let temp_dir = root.child("temp");
        temp_dir.create_dir_all().expect("Failed to create test working directory");

        let cache_dir = root.child("cache");

        let feed_dir = root.child("feed");
        feed_dir.create_dir_all().expect("Failed to create test feed directory");

        let mut filters = Vec::new();
        for (path, name) in [
            (cache_dir.path(), "CACHE_DIR"),
            (feed_dir.path(), "FEED_DIR"),
            (temp_dir.path(), "TEMP_DIR"),
        ] {
            filters.extend(Self::path_patterns(path).into_iter().map(|pattern| {
                (format!("{pattern}[\\\\/]?"), format!("[{name}]/"))
            }));
        }

        Self {
            temp_dir,
            cache_dir,
            feed_dir,
            filters,
            _root: root,
        }
    }

    /// Generate escaped regex patterns for the given path.
    fn path_patterns(path: &std::path::Path) -> Vec<String> {
        let mut patterns = Vec::new();
        if let Ok(canonical) = dunce_canonicalize(path) {
            if canonical != path {
                patterns.push(regex::escape(&canonical.display().to_string()));
            }
        }
        patterns.push(regex::escape(&path.display().to_string()));
        patterns
    }

    /// Standard snapshot filters, including the paths of this context.
    pub fn filters(&self) -> Vec<(&str, &str)> {
        self.filters
            .iter()
            .map(|(p, r)| (p.as_str(), r.as_str()))
            .chain(INSTA_FILTERS.iter().copied())
            .collect()
    }

    /// Add the archive of a package to the local feed.
    ///
    /// Every file is given a small placeholder body.
    pub fn add_package(
        &self,
        id: &str,
        version: &str,
        dependencies: &[(&str, &str)],
        files: &[&str],
    ) {
        let archive = nupkg(id, version, dependencies, files);
        fs_err::write(
            self.feed_dir.child(format!("{id}.{version}.nupkg")).path(),
            archive,
        )
        .expect("Failed to write package archive");
    }

    /// Create a `nubo` command with the test context's cache and working directory.
    pub fn command(&self) -> Command {
        let mut command = Command::new(get_bin());
        command
            .arg("--cache-dir")
            .arg(self.cache_dir.path())
            .env_remove("RUST_LOG")
            .env_remove("NUBO_CACHE_DIR")
            .env_remove("NUBO_CONFIG_FILE")
            .env_remove("NUBO_FEED")
            .env_remove("NUBO_FRAMEWORK")
            .env_remove("NUBO_RUNTIME")
            .env_remove("NUBO_RESOLUTION")
            .env_remove("NUBO_PRERELEASE")
            .env_remove("NUBO_LOCK_FILE")
            .env_remove("NUBO_CONCURRENT_DOWNLOADS")
            .env_remove("NUBO_HTTP_RETRIES")
            .env_remove("NUBO_HTTP_TIMEOUT")
            .env("NUBO_NO_WRAP", "1")
            .env("NO_COLOR", "1")
            .current_dir(self.temp_dir.path());
        command
    }

    /// Create a `nubo restore` command that queries the local feed.
    pub fn restore(&self) -> Command {
        let mut command = self.command();
        command
            .arg("restore")
            .arg("--feed")
            .arg(self.feed_dir.path());
        command
    }

    /// Create a `nubo layout` command.
    pub fn layout(&self) -> Command {
        let mut command = self.command();
        command.arg("layout");
        command
    }

    /// Create a `nubo cache clean` command.
    pub fn clean(&self) -> Command {
        let mut command = self.command();
        command.arg("cache").arg("clean");
        command
    }

    /// Read a file from the working directory.
    pub fn read(&self, path: &str) -> String {
        fs_err::read_to_string(self.temp_dir.child(path).path())
            .unwrap_or_else(|err| panic!("Failed to read `{path}`: {err}"))
    }
}

fn dunce_canonicalize(path: &std::path::Path) -> std::io::Result<PathBuf> {
    let canonical = fs_err::canonicalize(path)?;
    Ok(PathBuf::from(
        canonical
            .to_string_lossy()
            .trim_start_matches(r"\\?\")
            .to_string(),
    ))
}

pub fn get_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_nubo"))
}

/// A package manifest with a `net8.0` dependency group.
fn nuspec(id: &str, version: &str, dependencies: &[(&str, &str)]) -> String {
    let dependencies = dependencies
        .iter()
        .map(|(id, range)| format!(r#"<dependency id="{id}" version="{range}" />"#))
        .collect::<String>();
    formatdoc! {r#"
        <?xml version="1.0" encoding="utf-8"?>
        <package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
          <metadata>
            <id>{id}</id>
            <version>{version}</version>
            <dependencies>
              <group targetFramework="net8.0">{dependencies}</group>
            </dependencies>
          </metadata>
        </package>
    "#}
}

/// Build a package archive containing a manifest and the given files.
fn nupkg(id: &str, version: &str, dependencies: &[(&str, &str)], files: &[&str]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    writer.start_file(format!("{id}.nuspec"), options).unwrap();
    writer
        .write_all(nuspec(id, version, dependencies).as_bytes())
        .unwrap();
    writer.start_file("[Content_Types].xml", options).unwrap();
    writer.write_all(b"<Types />").unwrap();
    for file in files {
        writer.start_file(*file, options).unwrap();
        writer.write_all(b"MZ").unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn apply_filters<T: AsRef<str>>(mut snapshot: String, filters: impl AsRef<[(T, T)]>) -> String {
    for (matcher, replacement) in filters.as_ref() {
        let re = Regex::new(matcher.as_ref()).expect("Do you need to regex::escape your filter?");
        if re.is_match(&snapshot) {
            snapshot = re.replace_all(&snapshot, replacement.as_ref()).to_string();
        }
    }
    snapshot
}

/// Execute the command and format its output status, stdout and stderr into a snapshot string.
///
/// This function is derived from `insta_cmd`s `spawn_with_info`.
pub fn run_and_format<T: AsRef<str>>(
    mut command: impl BorrowMut<Command>,
    filters: impl AsRef<[(T, T)]>,
) -> (String, Output) {
    let program = command
        .borrow_mut()
        .get_program()
        .to_string_lossy()
        .to_string();

    let output = command
        .borrow_mut()
        .output()
        .unwrap_or_else(|err| panic!("Failed to spawn {program}: {err}"));

    let snapshot = apply_filters(
        format!(
            "success: {:?}\nexit_code: {}\n----- stdout -----\n{}\n----- stderr -----\n{}",
            output.status.success(),
            output.status.code().unwrap_or(!0),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
        filters,
    );

    (snapshot, output)
}

/// Run [`assert_cmd_snapshot!`], with default filters or with custom filters.
#[allow(unused_macros)]
macro_rules! nubo_snapshot {
    ($spawnable:expr, @$snapshot:literal) => {{
        nubo_snapshot!($crate::common::INSTA_FILTERS.to_vec(), $spawnable, @$snapshot)
    }};
    ($filters:expr, $spawnable:expr, @$snapshot:literal) => {{
        let (snapshot, output) = $crate::common::run_and_format($spawnable, &$filters);
        ::insta::assert_snapshot!(snapshot, @$snapshot);
        output
    }};
}

/// <https://stackoverflow.com/a/31749071/3549270>
#[allow(unused_imports)]
pub(crate) use nubo_snapshot;
