use std::path::{Path, PathBuf};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tempfile::NamedTempFile;
use tracing::warn;

pub use crate::locked_file::LockedFile;
pub use crate::path::{Simplified, relative_slash_path};

pub mod cachedir;
mod locked_file;
mod path;

/// Return a [`NamedTempFile`] in the specified directory.
///
/// Sets the permissions of the temporary file to `0o666`, to match the non-temporary file default.
/// ([`NamedTempFile`] defaults to `0o600`.)
#[cfg(unix)]
pub fn tempfile_in(path: &Path) -> std::io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;
    tempfile::Builder::new()
        .permissions(std::fs::Permissions::from_mode(0o666))
        .tempfile_in(path)
}

/// Return a [`NamedTempFile`] in the specified directory.
#[cfg(not(unix))]
pub fn tempfile_in(path: &Path) -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new().tempfile_in(path)
}

fn parent(path: &Path) -> std::io::Result<&Path> {
    path.parent().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("Path has no parent directory: {}", path.user_display()),
        )
    })
}

fn persist(temp_file: NamedTempFile, path: &Path) -> std::io::Result<()> {
    temp_file.persist(path).map_err(|err| {
        std::io::Error::other(format!(
            "Failed to persist temporary file to {}: {}",
            path.user_display(),
            err.error
        ))
    })?;
    Ok(())
}

/// Write `data` to `path` atomically using a temporary file and atomic rename.
pub async fn write_atomic(path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> std::io::Result<()> {
    let path = path.as_ref();
    let temp_file = tempfile_in(parent(path)?)?;
    fs_err::tokio::write(temp_file.path(), data.as_ref()).await?;
    persist(temp_file, path)
}

/// Write `data` to `path` atomically using a temporary file and atomic rename.
pub fn write_atomic_sync(path: impl AsRef<Path>, data: impl AsRef<[u8]>) -> std::io::Result<()> {
    let path = path.as_ref();
    let temp_file = tempfile_in(parent(path)?)?;
    fs_err::write(temp_file.path(), data.as_ref())?;
    persist(temp_file, path)
}

/// Copy `from` to `to` atomically using a temporary file and atomic rename.
pub fn copy_atomic_sync(from: impl AsRef<Path>, to: impl AsRef<Path>) -> std::io::Result<()> {
    let to = to.as_ref();
    let temp_file = tempfile_in(parent(to)?)?;
    fs_err::copy(from.as_ref(), temp_file.path())?;
    persist(temp_file, to)
}

/// Rename a file or directory, retrying (on Windows) if it fails due to transient operating
/// system errors.
pub async fn rename_with_retry(
    from: impl AsRef<Path>,
    to: impl AsRef<Path>,
) -> Result<(), std::io::Error> {
    let from = from.as_ref();
    let to = to.as_ref();
    if cfg!(windows) {
        // On Windows, antivirus software can lock files temporarily, making them inaccessible.
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_secs(1))
            .with_max_times(10);
        (|| async move { fs_err::tokio::rename(from, to).await })
            .retry(backoff)
            .when(|err| err.kind() == std::io::ErrorKind::PermissionDenied)
            .notify(|err, _| {
                warn!(
                    "Retrying rename from {} to {} due to transient error: {err}",
                    from.display(),
                    to.display(),
                );
            })
            .await
    } else {
        fs_err::tokio::rename(from, to).await
    }
}

/// Iterate over the subdirectories of a directory.
///
/// If the directory does not exist, returns an empty iterator.
pub fn directories(path: impl AsRef<Path>) -> impl Iterator<Item = PathBuf> {
    path.as_ref()
        .read_dir()
        .ok()
        .into_iter()
        .flatten()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Failed to read entry: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_ok_and(|file_type| file_type.is_dir()))
        .map(|entry| entry.path())
}

/// Iterate over the files in a directory.
///
/// If the directory does not exist, returns an empty iterator.
pub fn files(path: impl AsRef<Path>) -> impl Iterator<Item = PathBuf> {
    path.as_ref()
        .read_dir()
        .ok()
        .into_iter()
        .flatten()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("Failed to read entry: {err}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_ok_and(|file_type| file_type.is_file()))
        .map(|entry| entry.path())
}

/// List every file below `root`, as sorted, `/`-separated paths relative to `root`.
pub fn list_files_recursive(root: impl AsRef<Path>) -> std::io::Result<Vec<String>> {
    let root = root.as_ref();
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(relative) = relative_slash_path(entry.path(), root) {
            files.push(relative);
        } else {
            warn!("Skipping non-UTF-8 path: {}", entry.path().display());
        }
    }
    files.sort_unstable();
    Ok(files)
}

/// Returns `true` if a path is a temporary file or directory.
pub fn is_temporary(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(".tmp"))
}

#[cfg(test)]
mod tests {
    use assert_fs::prelude::*;

    use super::*;

    #[test]
    fn list_recursive() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child("lib/net8.0/Foo.dll").touch().unwrap();
        dir.child("runtimes/linux-x64/native/libfoo.so").touch().unwrap();
        dir.child("foo.nuspec").touch().unwrap();
        dir.child("empty").create_dir_all().unwrap();

        let files = list_files_recursive(dir.path()).unwrap();
        assert_eq!(
            files,
            [
                "foo.nuspec",
                "lib/net8.0/Foo.dll",
                "runtimes/linux-x64/native/libfoo.so"
            ]
        );
    }

    #[tokio::test]
    async fn atomic_write() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.child("nubo.lock");
        write_atomic(target.path(), "version = 1\n").await.unwrap();
        target.assert("version = 1\n");
        write_atomic_sync(target.path(), "version = 2\n").unwrap();
        target.assert("version = 2\n");

        // No temporary files are left behind.
        assert_eq!(files(dir.path()).count(), 1);
    }

    #[tokio::test]
    async fn rename_directory() {
        let dir = assert_fs::TempDir::new().unwrap();
        dir.child(".tmpabc/file").write_str("contents").unwrap();
        assert!(is_temporary(dir.child(".tmpabc").path()));

        rename_with_retry(dir.child(".tmpabc").path(), dir.child("final").path())
            .await
            .unwrap();
        dir.child("final/file").assert("contents");
        assert_eq!(directories(dir.path()).count(), 1);
    }
}
