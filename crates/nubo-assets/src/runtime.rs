use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AssetSelection, assembly_name, native_library_name};

/// The assets of every package of an application, keyed by the name the runtime looks them up
/// by.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeAssets {
    /// Managed assemblies, by assembly name.
    pub managed: BTreeMap<String, PathBuf>,
    /// Native libraries, by library name.
    pub native: BTreeMap<String, PathBuf>,
    /// The shared frameworks required by any package.
    pub framework_references: BTreeSet<String>,
}

impl RuntimeAssets {
    /// Add the assets selected from the package extracted at `root`.
    ///
    /// If two packages provide an asset under the same name, the one added first is kept.
    pub fn add(&mut self, root: &Path, selection: &AssetSelection, windows: bool) {
        for path in &selection.managed {
            insert(&mut self.managed, assembly_name(path), root.join(path));
        }
        for path in &selection.native {
            insert(&mut self.native, native_library_name(path, windows), root.join(path));
        }
        self.framework_references
            .extend(selection.framework_references.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.managed.is_empty() && self.native.is_empty() && self.framework_references.is_empty()
    }
}

fn insert(assets: &mut BTreeMap<String, PathBuf>, name: &str, path: PathBuf) {
    if let Some(existing) = assets.get(name) {
        if *existing != path {
            debug!(
                "`{name}` is provided by both `{}` and `{}`; keeping the former",
                existing.display(),
                path.display()
            );
        }
        return;
    }
    assets.insert(name.to_string(), path);
}
