use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use nubo_fs::{LockedFile, Simplified, cachedir, directories};
use nubo_normalize::PackageId;
use nubo_package_types::PackageIdentity;

pub use crate::removal::{Removal, rm_rf};

mod removal;

/// The name of the completion marker inside an extracted package directory.
///
/// The marker is written last, so its presence proves the extraction finished.
pub const METADATA_MARKER: &str = ".nupkg.metadata";

/// The version of the completion marker format.
pub const METADATA_VERSION: u32 = 2;

/// The main cache abstraction.
///
/// Extracted packages live at `{root}/packages/{id-lower}/{version}/`, and are immutable once
/// their completion marker is present.
#[derive(Debug, Clone)]
pub struct Cache {
    /// The cache directory.
    root: PathBuf,
    /// A temporary cache directory, if the user requested `--no-cache`.
    ///
    /// Held so that the directory outlives the operation.
    temp_dir: Option<Arc<tempfile::TempDir>>,
}

impl Cache {
    /// A persistent cache directory at `root`.
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            temp_dir: None,
        }
    }

    /// Create a temporary cache directory.
    pub fn temp() -> Result<Self, io::Error> {
        let temp_dir = tempfile::tempdir()?;
        Ok(Self {
            root: temp_dir.path().to_path_buf(),
            temp_dir: Some(Arc::new(temp_dir)),
        })
    }

    /// Prefer, in order:
    /// 1. A temporary cache directory, if `no_cache` is set.
    /// 2. The given cache directory.
    /// 3. The system-appropriate cache directory.
    /// 4. A `.nubo_cache` directory in the current working directory.
    pub fn from_settings(no_cache: bool, cache_dir: Option<PathBuf>) -> Result<Self, io::Error> {
        if no_cache {
            Self::temp()
        } else if let Some(cache_dir) = cache_dir {
            Ok(Self::from_path(cache_dir))
        } else if let Some(cache_dir) = user_cache_dir() {
            Ok(Self::from_path(cache_dir))
        } else {
            Ok(Self::from_path(".nubo_cache"))
        }
    }

    /// Return the root of the cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if the [`Cache`] is temporary.
    pub fn is_temporary(&self) -> bool {
        self.temp_dir.is_some()
    }

    /// The directory holding all extracted packages.
    pub fn packages(&self) -> PathBuf {
        self.root.join("packages")
    }

    /// The directory holding every cached version of a package.
    pub fn package_versions(&self, id: &PackageId) -> PathBuf {
        self.packages().join(id.as_lowercase())
    }

    /// The cache entry for a specific package version.
    pub fn package(&self, identity: &PackageIdentity) -> CachedPackage {
        let dir = self
            .package_versions(&identity.id)
            .join(version_key(identity));
        CachedPackage {
            identity: identity.clone(),
            dir,
        }
    }

    /// Acquire the cross-process lock guarding writes to a package's cache entry.
    pub async fn lock(&self, identity: &PackageIdentity) -> Result<LockedFile, io::Error> {
        let parent = self.package_versions(&identity.id);
        fs_err::tokio::create_dir_all(&parent).await?;
        LockedFile::acquire(
            parent.join(format!("{}.lock", version_key(identity))),
            identity,
        )
        .await
    }

    /// Create a staging directory next to the package's final location, so that the final
    /// rename never crosses filesystems.
    pub fn staging(&self, identity: &PackageIdentity) -> Result<tempfile::TempDir, io::Error> {
        let parent = self.package_versions(&identity.id);
        fs_err::create_dir_all(&parent)?;
        tempfile::tempdir_in(parent)
    }

    /// Move a fully populated staging directory into place.
    ///
    /// Any incomplete directory left at the target by an earlier, interrupted run is removed
    /// first.
    pub async fn persist(
        &self,
        staging: impl AsRef<Path>,
        package: &CachedPackage,
    ) -> io::Result<()> {
        if fs_err::tokio::symlink_metadata(&package.dir).await.is_ok() {
            debug!(
                "Replacing incomplete cache entry at: {}",
                package.dir.user_display()
            );
            rm_rf(&package.dir)?;
        }
        nubo_fs::rename_with_retry(staging.as_ref(), &package.dir).await
    }

    /// Initialize the [`Cache`].
    pub fn init(self) -> Result<Self, io::Error> {
        let root = &self.root;

        // Create the cache directory, if it doesn't exist.
        fs_err::create_dir_all(root)?;

        // Add the CACHEDIR.TAG.
        cachedir::ensure_tag(root)?;

        // Add the .gitignore.
        match fs_err::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(root.join(".gitignore"))
        {
            Ok(mut file) => file.write_all(b"*")?,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => (),
            Err(err) => return Err(err),
        }

        fs_err::create_dir_all(root.join("packages"))?;

        Ok(Self {
            root: std::path::absolute(root)?,
            ..self
        })
    }

    /// Clear the cache, removing all entries.
    pub fn clear(&self, reporter: Option<Box<dyn CleanReporter>>) -> Result<Removal, io::Error> {
        removal::Remover::new(reporter).rm_rf(&self.root)
    }

    /// Remove every cached version of a package.
    ///
    /// Returns the number of entries removed from the cache.
    pub fn remove(&self, id: &PackageId) -> Result<Removal, io::Error> {
        let path = self.package_versions(id);
        debug!("Removing cache entries at: {}", path.user_display());
        rm_rf(path)
    }

    /// Return every package with a complete entry in the cache, sorted by id and version.
    pub fn cached_packages(&self) -> Vec<CachedPackage> {
        let mut packages = Vec::new();
        for id_dir in directories(self.packages()) {
            for version_dir in directories(&id_dir) {
                if nubo_fs::is_temporary(&version_dir) {
                    continue;
                }
                let Some(metadata) = read_marker(&version_dir) else {
                    continue;
                };
                let Some(identity) = metadata.identity else {
                    continue;
                };
                packages.push(CachedPackage {
                    identity,
                    dir: version_dir,
                });
            }
        }
        packages.sort_by(|a, b| a.identity.cmp(&b.identity));
        packages
    }
}

/// The normalized version string used as a directory name, e.g., `13.0.3` or `1.0.0-beta.1`.
fn version_key(identity: &PackageIdentity) -> String {
    identity.version.to_string().to_lowercase()
}

fn read_marker(dir: &Path) -> Option<NupkgMetadata> {
    let contents = fs_err::read(dir.join(METADATA_MARKER)).ok()?;
    match serde_json::from_slice(&contents) {
        Ok(metadata) => Some(metadata),
        Err(err) => {
            debug!(
                "Ignoring unreadable marker in {}: {err}",
                dir.user_display()
            );
            None
        }
    }
}

/// Returns the user-level cache directory, i.e., `$XDG_CACHE_HOME/nubo` on Unix.
pub fn user_cache_dir() -> Option<PathBuf> {
    use etcetera::BaseStrategy;

    etcetera::base_strategy::choose_base_strategy()
        .ok()
        .map(|dirs| dirs.cache_dir().join("nubo"))
}

/// An extracted package in the cache, which may or may not exist yet.
#[derive(Debug, Clone)]
pub struct CachedPackage {
    identity: PackageIdentity,
    dir: PathBuf,
}

impl CachedPackage {
    pub fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    /// The directory the package is extracted into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The name of the package's manifest within the package directory.
    pub fn nuspec_name(&self) -> String {
        format!("{}.nuspec", self.identity.id.as_lowercase())
    }

    /// The name of the archive checksum file within the package directory.
    pub fn sha512_name(&self) -> String {
        format!(
            "{}.{}.nupkg.sha512",
            self.identity.id.as_lowercase(),
            version_key(&self.identity)
        )
    }

    /// Returns `true` if the package was completely extracted.
    pub fn is_complete(&self) -> bool {
        self.dir.join(METADATA_MARKER).is_file()
    }

    /// Read the completion marker, if the package was completely extracted.
    pub fn metadata(&self) -> Option<NupkgMetadata> {
        read_marker(&self.dir)
    }
}

/// The completion marker written into an extracted package directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NupkgMetadata {
    pub version: u32,
    /// The base64-encoded SHA-512 of the package archive.
    pub content_hash: String,
    /// The name of the feed the archive was downloaded from.
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<PackageIdentity>,
}

impl NupkgMetadata {
    pub fn new(identity: PackageIdentity, content_hash: String, source: Option<String>) -> Self {
        Self {
            version: METADATA_VERSION,
            content_hash,
            source,
            identity: Some(identity),
        }
    }

    /// Write the marker into `dir`. Must be the last write of an extraction.
    pub fn write(&self, dir: &Path) -> io::Result<()> {
        let contents = serde_json::to_vec(self).map_err(io::Error::other)?;
        nubo_fs::write_atomic_sync(dir.join(METADATA_MARKER), contents)
    }
}

pub trait CleanReporter: Send + Sync {
    /// Called after one file or directory is removed.
    fn on_clean(&self);

    /// Called after all files and directories are removed.
    fn on_complete(&self);
}
