//! The `nubo.lock` file: the packages chosen by a restore, where they came from, and the assets
//! selected from each.
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::Deserialize;
use toml_edit::{Array, ArrayOfTables, InlineTable, Item, Table, Value, value};
use tracing::debug;

use nubo_assets::AssetSelection;
use nubo_fs::Simplified;
use nubo_normalize::PackageId;
use nubo_package_types::{Dependency, PackageIdentity};
use nubo_platform::{Rid, TargetFramework};
use nubo_resolver::{ResolutionMode, ResolvedPackage};
use nubo_version::Version;

/// The current version of the lock file format.
const VERSION: u32 = 1;

/// The name of the lock file written next to the configuration.
pub const LOCK_FILE_NAME: &str = "nubo.lock";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "LockWire")]
pub struct Lock {
    framework: TargetFramework,
    runtime: Option<Rid>,
    resolution_mode: ResolutionMode,
    /// The locked packages, sorted by id.
    packages: Vec<LockedPackage>,
    /// A map from package id to its index in `packages`.
    by_id: FxHashMap<PackageId, usize>,
}

impl Lock {
    /// Create a lock from a set of packages, validating that every dependency edge points at a
    /// locked package whose version satisfies it.
    pub fn new(
        framework: TargetFramework,
        runtime: Option<Rid>,
        resolution_mode: ResolutionMode,
        mut packages: Vec<LockedPackage>,
    ) -> Result<Self, LockError> {
        packages.sort_by(|a, b| a.id.cmp(&b.id));

        let mut by_id = FxHashMap::default();
        for (index, package) in packages.iter().enumerate() {
            if by_id.insert(package.id.clone(), index).is_some() {
                return Err(LockError::DuplicatePackage {
                    id: package.id.clone(),
                });
            }
        }

        for package in &packages {
            for dependency in &package.dependencies {
                let Some(locked) = by_id.get(&dependency.id).map(|index| &packages[*index]) else {
                    return Err(LockError::MissingDependency {
                        identity: package.identity(),
                        dependency: dependency.clone(),
                    });
                };
                if !dependency.range.satisfies(&locked.version) {
                    return Err(LockError::UnsatisfiedDependency {
                        identity: package.identity(),
                        dependency: dependency.clone(),
                        locked: locked.version.clone(),
                    });
                }
            }
        }

        Ok(Self {
            framework,
            runtime,
            resolution_mode,
            packages,
            by_id,
        })
    }

    /// Read the lock file at `path`, returning `None` if it doesn't exist.
    pub async fn read(path: impl AsRef<Path>) -> Result<Option<Self>, LockError> {
        let path = path.as_ref();
        let contents = match fs_err::tokio::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(LockError::Io(err)),
        };
        let lock = Self::from_str(&contents).map_err(|err| LockError::Parse {
            path: path.to_path_buf(),
            err: Box::new(err),
        })?;
        debug!(
            "Read {} locked packages from: {}",
            lock.packages.len(),
            path.user_display()
        );
        Ok(Some(lock))
    }

    /// Write the lock file to `path`, replacing any existing file atomically.
    pub async fn write(&self, path: impl AsRef<Path>) -> Result<(), LockError> {
        let path = path.as_ref();
        nubo_fs::write_atomic(path, self.to_toml()).await?;
        debug!("Wrote lock file to: {}", path.user_display());
        Ok(())
    }

    /// Returns the TOML representation of this lock file.
    pub fn to_toml(&self) -> String {
        // The document is built by hand rather than through serde, so that dependencies render
        // as inline tables.
        let mut doc = toml_edit::DocumentMut::new();
        doc.insert("version", value(i64::from(VERSION)));
        doc.insert("framework", value(self.framework.to_string()));
        if let Some(runtime) = &self.runtime {
            doc.insert("runtime", value(runtime.as_str()));
        }
        doc.insert("resolution-mode", value(self.resolution_mode.to_string()));

        let mut packages = ArrayOfTables::new();
        for package in &self.packages {
            packages.push(package.to_toml());
        }
        doc.insert("package", Item::ArrayOfTables(packages));
        doc.to_string()
    }

    pub fn framework(&self) -> &TargetFramework {
        &self.framework
    }

    pub fn runtime(&self) -> Option<&Rid> {
        self.runtime.as_ref()
    }

    pub fn resolution_mode(&self) -> ResolutionMode {
        self.resolution_mode
    }

    /// The locked packages, sorted by id.
    pub fn packages(&self) -> &[LockedPackage] {
        &self.packages
    }

    pub fn find(&self, id: &PackageId) -> Option<&LockedPackage> {
        self.by_id.get(id).map(|index| &self.packages[*index])
    }

    /// The recorded archive hash of each package that has one.
    pub fn hashes(&self) -> impl Iterator<Item = (PackageIdentity, String)> + '_ {
        self.packages.iter().filter_map(|package| {
            package
                .hash
                .as_ref()
                .map(|hash| (package.identity(), hash.clone()))
        })
    }
}

impl FromStr for Lock {
    type Err = toml::de::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        toml::from_str(s)
    }
}

/// A single package in the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LockedPackage {
    pub id: PackageId,
    pub version: Version,
    /// The name of the feed the package is downloaded from.
    pub source: String,
    #[serde(default)]
    pub direct: bool,
    /// The base64-encoded SHA-512 of the package archive.
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    #[serde(default)]
    pub managed: Vec<String>,
    #[serde(default)]
    pub native: Vec<String>,
    #[serde(default)]
    pub framework_references: Vec<String>,
}

impl LockedPackage {
    pub fn new(package: &ResolvedPackage, selection: AssetSelection, hash: Option<String>) -> Self {
        let identity = package.identity();
        Self {
            id: identity.id.clone(),
            version: identity.version.clone(),
            source: package.feed().to_string(),
            direct: package.direct,
            hash,
            dependencies: package.dependencies().to_vec(),
            managed: selection.managed,
            native: selection.native,
            framework_references: selection.framework_references,
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(self.id.clone(), self.version.clone())
    }

    /// The assets recorded for this package.
    pub fn selection(&self) -> AssetSelection {
        AssetSelection {
            managed: self.managed.clone(),
            native: self.native.clone(),
            framework_references: self.framework_references.clone(),
        }
    }

    fn to_toml(&self) -> Table {
        let mut table = Table::new();
        table.insert("id", value(self.id.to_string()));
        table.insert("version", value(self.version.to_string()));
        table.insert("source", value(self.source.as_str()));
        table.insert("direct", value(self.direct));
        if let Some(hash) = &self.hash {
            table.insert("hash", value(hash.as_str()));
        }

        let dependencies = self.dependencies.iter().map(|dependency| {
            let mut table = InlineTable::new();
            table.insert("id", Value::from(dependency.id.to_string()));
            table.insert("range", Value::from(dependency.range.to_string()));
            table
        });
        table.insert("dependencies", value(array(dependencies)));
        table.insert("managed", value(array(self.managed.iter().map(String::as_str))));
        table.insert("native", value(array(self.native.iter().map(String::as_str))));
        table.insert(
            "framework-references",
            value(array(self.framework_references.iter().map(String::as_str))),
        );
        table
    }
}

/// Render a single element inline, and more than one element with each on its own line.
fn array<V: Into<Value>>(elements: impl ExactSizeIterator<Item = V>) -> Array {
    if elements.len() <= 1 {
        return elements.collect();
    }
    let mut array = elements
        .map(|element| {
            let mut value = element.into();
            value.decor_mut().set_prefix("\n    ");
            value
        })
        .collect::<Array>();
    array.set_trailing_comma(true);
    array.set_trailing("\n");
    array
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LockWire {
    version: u32,
    framework: TargetFramework,
    #[serde(default)]
    runtime: Option<Rid>,
    #[serde(default)]
    resolution_mode: ResolutionMode,
    #[serde(rename = "package", default)]
    packages: Vec<LockedPackage>,
}

impl TryFrom<LockWire> for Lock {
    type Error = LockError;

    fn try_from(wire: LockWire) -> Result<Self, LockError> {
        if wire.version != VERSION {
            return Err(LockError::UnsupportedVersion {
                found: wire.version,
            });
        }
        Self::new(
            wire.framework,
            wire.runtime,
            wire.resolution_mode,
            wire.packages,
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Unsupported lock file version `{found}` (expected `{VERSION}`)")]
    UnsupportedVersion { found: u32 },
    #[error("Found duplicate package `{id}`")]
    DuplicatePackage { id: PackageId },
    #[error("For package `{identity}`, dependency `{dependency}` is not in the lock file")]
    MissingDependency {
        identity: PackageIdentity,
        dependency: Dependency,
    },
    #[error(
        "For package `{identity}`, dependency `{dependency}` is not satisfied by the locked version `{locked}`"
    )]
    UnsatisfiedDependency {
        identity: PackageIdentity,
        dependency: Dependency,
        locked: Version,
    },
    #[error("Failed to parse `{}`", path.user_display())]
    Parse {
        path: PathBuf,
        #[source]
        err: Box<toml::de::Error>,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
