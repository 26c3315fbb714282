use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use tracing::debug;

/// The architectures that may terminate a runtime identifier.
const ARCHITECTURES: &[&str] = &[
    "x64",
    "x86",
    "arm",
    "arm64",
    "armel",
    "armv6",
    "loongarch64",
    "mips64",
    "ppc64le",
    "riscv64",
    "s390x",
    "wasm",
];

/// A runtime identifier, e.g., `linux-x64` or `win-arm64`.
///
/// Runtime identifiers are lowercase; the wildcard identifier is `any`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rid(Box<str>);

impl Rid {
    pub fn new(rid: impl AsRef<str>) -> Result<Self, RidParseError> {
        let rid = rid.as_ref().trim();
        if rid.is_empty() {
            return Err(RidParseError::Empty);
        }
        if rid
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\'))
        {
            return Err(RidParseError::InvalidCharacter(rid.to_string()));
        }
        Ok(Self(rid.to_ascii_lowercase().into_boxed_str()))
    }

    /// The wildcard runtime identifier.
    pub fn any() -> Self {
        Self(Box::from("any"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_any(&self) -> bool {
        &*self.0 == "any"
    }

    /// Returns `true` if this identifier belongs to the Windows family.
    pub fn is_windows(&self) -> bool {
        self.0.starts_with("win")
    }

    /// Split off a trailing architecture, e.g., `("ubuntu.22.04", Some("x64"))`.
    fn split_arch(&self) -> (&str, Option<&str>) {
        match self.0.rsplit_once('-') {
            Some((os, arch)) if ARCHITECTURES.contains(&arch) => (os, Some(arch)),
            _ => (&self.0, None),
        }
    }

    /// The runtime identifier of the current host, e.g., `linux-x64`.
    ///
    /// Returns `None` on platforms without a runtime identifier.
    pub fn host() -> Option<Self> {
        let os = if cfg!(windows) {
            "win"
        } else if cfg!(target_os = "macos") {
            "osx"
        } else if cfg!(all(target_os = "linux", target_env = "musl")) {
            "linux-musl"
        } else if cfg!(target_os = "linux") {
            "linux"
        } else if cfg!(target_os = "freebsd") {
            "freebsd"
        } else {
            return None;
        };
        let arch = if cfg!(target_arch = "x86_64") {
            "x64"
        } else if cfg!(target_arch = "x86") {
            "x86"
        } else if cfg!(target_arch = "aarch64") {
            "arm64"
        } else if cfg!(target_arch = "arm") {
            "arm"
        } else if cfg!(target_arch = "s390x") {
            "s390x"
        } else if cfg!(target_arch = "powerpc64") {
            "ppc64le"
        } else if cfg!(target_arch = "riscv64") {
            "riscv64"
        } else if cfg!(target_arch = "loongarch64") {
            "loongarch64"
        } else {
            return None;
        };
        Some(Self(format!("{os}-{arch}").into_boxed_str()))
    }
}

impl FromStr for Rid {
    type Err = RidParseError;

    fn from_str(rid: &str) -> Result<Self, Self::Err> {
        Self::new(rid)
    }
}

impl Display for Rid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Rid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Rid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Rid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RidParseError {
    #[error("Runtime identifier must not be empty")]
    Empty,
    #[error("Runtime identifier contains an invalid character: `{0}`")]
    InvalidCharacter(String),
}

/// The import graph between runtime identifiers, in the shape of a `runtime.json` document:
///
/// ```json
/// { "runtimes": { "linux-x64": { "#import": ["linux", "unix-x64"] } } }
/// ```
#[derive(Debug, Clone)]
pub struct RuntimeGraph {
    imports: FxHashMap<Rid, Vec<Rid>>,
}

#[derive(Deserialize)]
struct RuntimeJson {
    #[serde(default)]
    runtimes: BTreeMap<String, RuntimeJsonEntry>,
}

#[derive(Deserialize)]
struct RuntimeJsonEntry {
    #[serde(rename = "#import", default)]
    imports: Vec<String>,
}

static EMBEDDED: LazyLock<RuntimeGraph> = LazyLock::new(|| {
    RuntimeGraph::from_json(include_str!("runtime.json"))
        .expect("embedded runtime graph is valid")
});

impl RuntimeGraph {
    /// Create a graph from `(rid, imports)` entries.
    pub fn new(entries: impl IntoIterator<Item = (Rid, Vec<Rid>)>) -> Self {
        Self {
            imports: entries.into_iter().collect(),
        }
    }

    /// The built-in graph, covering the common Windows, Linux, macOS and FreeBSD identifiers.
    pub fn embedded() -> Self {
        EMBEDDED.clone()
    }

    /// Parse a graph from a `runtime.json` document.
    pub fn from_json(json: &str) -> Result<Self, RuntimeGraphError> {
        let document: RuntimeJson = serde_json::from_str(json)?;
        let imports = document
            .runtimes
            .into_iter()
            .map(|(rid, entry)| {
                let rid = Rid::new(rid)?;
                let imports = entry
                    .imports
                    .into_iter()
                    .map(Rid::new)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((rid, imports))
            })
            .collect::<Result<FxHashMap<_, _>, RidParseError>>()?;
        Ok(Self { imports })
    }

    /// Read a graph from a `runtime.json` file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, RuntimeGraphError> {
        let contents = fs_err::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    /// Returns `true` if the graph has an entry for the identifier.
    pub fn contains(&self, rid: &Rid) -> bool {
        self.imports.contains_key(rid)
    }

    /// Returns the fallback chain for a runtime identifier: the identifier itself, followed by
    /// its imports in breadth-first order, without duplicates, ending with `any`.
    ///
    /// Identifiers absent from the graph get an approximate chain: the identifier, then the
    /// identifier with its OS version removed (`ubuntu.25.04-x64` to `ubuntu-x64`), then the OS
    /// without the architecture, each expanded through the graph from the first one it knows.
    pub fn fallback_chain(&self, rid: &Rid) -> Vec<Rid> {
        let mut chain = Vec::new();
        let mut seen = FxHashSet::default();

        if self.contains(rid) {
            self.expand(rid, &mut chain, &mut seen);
        } else {
            debug!("Runtime identifier `{rid}` is not in the runtime graph; approximating");
            seen.insert(rid.clone());
            chain.push(rid.clone());

            let (os, arch) = rid.split_arch();
            let family = os.split('.').next().unwrap_or(os);

            let mut parents = Vec::new();
            if let Some(arch) = arch {
                if family != os {
                    parents.push(format!("{family}-{arch}"));
                }
                parents.push(os.to_string());
            }
            if family != os {
                parents.push(family.to_string());
            }

            for parent in parents {
                let Ok(parent) = Rid::new(parent) else {
                    continue;
                };
                if self.contains(&parent) {
                    self.expand(&parent, &mut chain, &mut seen);
                    break;
                }
                if seen.insert(parent.clone()) {
                    chain.push(parent);
                }
            }
        }

        chain.retain(|rid| !rid.is_any());
        chain.push(Rid::any());
        chain
    }

    /// Returns `true` if assets for `target` may be used on `rid`.
    pub fn is_compatible(&self, rid: &Rid, target: &Rid) -> bool {
        self.fallback_chain(rid).contains(target)
    }

    fn expand(&self, rid: &Rid, chain: &mut Vec<Rid>, seen: &mut FxHashSet<Rid>) {
        let mut queue = VecDeque::from([rid.clone()]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(imports) = self.imports.get(&next) {
                queue.extend(imports.iter().cloned());
            }
            chain.push(next);
        }
    }
}

impl Default for RuntimeGraph {
    fn default() -> Self {
        Self::embedded()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeGraphError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Failed to parse runtime graph")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Rid(#[from] RidParseError),
}
