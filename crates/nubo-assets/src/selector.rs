use std::collections::BTreeMap;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use nubo_package_types::FrameworkReferenceGroup;
use nubo_platform::{FrameworkCompatibility, Rid, RuntimeGraph, TargetFramework};

/// The extensions of files loaded as managed assemblies.
const MANAGED_EXTENSIONS: &[&str] = &["dll", "exe", "winmd"];

/// An empty file marking a folder as supporting its framework without contributing any files.
const PLACEHOLDER: &str = "_._";

/// The files a single package contributes, as `/`-separated paths relative to the package
/// directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssetSelection {
    pub managed: Vec<String>,
    pub native: Vec<String>,
    pub framework_references: Vec<String>,
}

impl AssetSelection {
    pub fn is_empty(&self) -> bool {
        self.managed.is_empty() && self.native.is_empty() && self.framework_references.is_empty()
    }
}

/// Selects the assets of a package for a target framework and, optionally, a runtime.
#[derive(Debug, Clone)]
pub struct AssetSelector {
    framework: TargetFramework,
    runtime: Option<Rid>,
    /// The fallback chain of `runtime`, most specific first; empty without a runtime.
    chain: Vec<Rid>,
    compatibility: FrameworkCompatibility,
}

impl AssetSelector {
    pub fn new(
        framework: TargetFramework,
        runtime: Option<Rid>,
        graph: &RuntimeGraph,
        compatibility: FrameworkCompatibility,
    ) -> Self {
        let chain = runtime
            .as_ref()
            .map(|rid| graph.fallback_chain(rid))
            .unwrap_or_default();
        Self {
            framework,
            runtime,
            chain,
            compatibility,
        }
    }

    pub fn framework(&self) -> &TargetFramework {
        &self.framework
    }

    pub fn runtime(&self) -> Option<&Rid> {
        self.runtime.as_ref()
    }

    /// The runtime identifiers consulted for runtime-specific assets, most specific first.
    pub fn fallback_chain(&self) -> &[Rid] {
        &self.chain
    }

    /// Whether native library names follow Windows conventions.
    ///
    /// Without a runtime, the host's conventions apply.
    pub fn is_windows(&self) -> bool {
        self.runtime
            .as_ref()
            .map_or(cfg!(windows), Rid::is_windows)
    }

    /// Select the assets of a package, given every file in its extracted directory and its
    /// declared framework references.
    pub fn select(
        &self,
        files: &[String],
        framework_references: &[FrameworkReferenceGroup],
    ) -> AssetSelection {
        let managed = self
            .runtime_managed(files)
            .or_else(|| self.portable_managed(files))
            .unwrap_or_default();
        let native = self.native(files);
        let framework_references = self.framework_references(framework_references);
        AssetSelection {
            managed,
            native,
            framework_references,
        }
    }

    /// Managed assemblies under `runtimes/{rid}/lib/{tfm}/`, from the first runtime in the
    /// fallback chain with a compatible framework folder.
    fn runtime_managed(&self, files: &[String]) -> Option<Vec<String>> {
        for rid in &self.chain {
            let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
            for file in files {
                if let [runtimes, candidate, lib, tfm, _] = segments(file).as_slice() {
                    if runtimes.eq_ignore_ascii_case("runtimes")
                        && candidate.eq_ignore_ascii_case(rid.as_str())
                        && lib.eq_ignore_ascii_case("lib")
                    {
                        groups.entry(*tfm).or_default().push(file);
                    }
                }
            }
            if let Some(selected) = self.nearest(&groups) {
                debug!("Selected managed assets for `{rid}`");
                return Some(selected);
            }
        }
        None
    }

    /// Managed assemblies under `lib/{tfm}/`.
    fn portable_managed(&self, files: &[String]) -> Option<Vec<String>> {
        let mut groups: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for file in files {
            if let [lib, tfm, _] = segments(file).as_slice() {
                if lib.eq_ignore_ascii_case("lib") {
                    groups.entry(*tfm).or_default().push(file);
                }
            }
        }
        self.nearest(&groups)
    }

    /// The managed assemblies in the framework folder nearest to the target framework, or `None`
    /// if no folder is compatible.
    fn nearest(&self, groups: &BTreeMap<&str, Vec<&str>>) -> Option<Vec<String>> {
        let frameworks = groups
            .iter()
            .filter_map(|(folder, files)| match TargetFramework::from_str(folder) {
                Ok(framework) => Some((framework, files)),
                Err(err) => {
                    trace!("Ignoring framework folder `{folder}`: {err}");
                    None
                }
            })
            .collect::<Vec<_>>();

        let nearest = self
            .compatibility
            .get_nearest(frameworks.iter().map(|(framework, _)| framework), &self.framework)?;
        let (_, files) = frameworks
            .iter()
            .find(|(framework, _)| framework == nearest)?;

        Some(
            files
                .iter()
                .filter(|file| is_managed(file))
                .map(ToString::to_string)
                .collect(),
        )
    }

    /// Native libraries under `runtimes/{rid}/native/`, from the first runtime in the fallback
    /// chain that has any.
    fn native(&self, files: &[String]) -> Vec<String> {
        for rid in &self.chain {
            let matching = files
                .iter()
                .filter(|file| {
                    let segments = segments(file);
                    segments.len() > 3
                        && segments[0].eq_ignore_ascii_case("runtimes")
                        && segments[1].eq_ignore_ascii_case(rid.as_str())
                        && segments[2].eq_ignore_ascii_case("native")
                })
                .collect::<Vec<_>>();
            if !matching.is_empty() {
                debug!("Selected native assets for `{rid}`");
                return matching
                    .into_iter()
                    .filter(|file| file_name(file) != PLACEHOLDER)
                    .cloned()
                    .collect();
            }
        }
        Vec::new()
    }

    /// The names of the shared frameworks referenced for a compatible framework, or by every
    /// group if the target framework is the wildcard.
    fn framework_references(&self, groups: &[FrameworkReferenceGroup]) -> Vec<String> {
        groups
            .iter()
            .filter(|group| {
                self.framework.is_any()
                    || self
                        .compatibility
                        .is_compatible(&group.target_framework, &self.framework)
            })
            .flat_map(|group| group.references.iter().cloned())
            .sorted()
            .dedup()
            .collect()
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').collect()
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_managed(path: &str) -> bool {
    file_name(path)
        .rsplit_once('.')
        .is_some_and(|(_, extension)| {
            MANAGED_EXTENSIONS
                .iter()
                .any(|managed| extension.eq_ignore_ascii_case(managed))
        })
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn graph() -> RuntimeGraph {
        let rid = |rid: &str| Rid::from_str(rid).unwrap();
        RuntimeGraph::new([
            (rid("linux-x64"), vec![rid("linux"), rid("unix-x64")]),
            (rid("linux"), vec![rid("unix")]),
            (rid("unix-x64"), vec![rid("unix")]),
            (rid("unix"), vec![rid("any")]),
            (rid("win-x64"), vec![rid("win")]),
            (rid("win"), vec![rid("any")]),
        ])
    }

    fn selector(framework: &str, runtime: Option<&str>) -> AssetSelector {
        AssetSelector::new(
            TargetFramework::from_str(framework).unwrap(),
            runtime.map(|rid| Rid::from_str(rid).unwrap()),
            &graph(),
            FrameworkCompatibility::default(),
        )
    }

    fn files(files: &[&str]) -> Vec<String> {
        files.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn single_assembly() {
        let files = files(&[
            "lib/net45/Newtonsoft.Json.dll",
            "lib/net45/Newtonsoft.Json.xml",
            "lib/net6.0/Newtonsoft.Json.dll",
            "lib/net6.0/Newtonsoft.Json.xml",
            "lib/netstandard2.0/Newtonsoft.Json.dll",
            "newtonsoft.json.nuspec",
        ]);
        let selection = selector("net8.0", None).select(&files, &[]);
        assert_eq!(selection.managed, vec!["lib/net6.0/Newtonsoft.Json.dll"]);
        assert!(selection.native.is_empty());
    }

    #[test]
    fn nearest_framework() {
        let files = files(&[
            "lib/net462/A.dll",
            "lib/netstandard2.0/A.dll",
            "lib/net8.0/A.dll",
            "lib/net9.0/A.dll",
        ]);
        let selected = |framework| selector(framework, None).select(&files, &[]).managed;
        assert_eq!(selected("net8.0"), vec!["lib/net8.0/A.dll"]);
        assert_eq!(selected("net7.0"), vec!["lib/netstandard2.0/A.dll"]);
        assert_eq!(selected("net472"), vec!["lib/net462/A.dll"]);
        assert!(selected("net45").is_empty());
    }

    #[test]
    fn runtime_specific_assets_win() {
        let files = files(&[
            "lib/net8.0/A.dll",
            "runtimes/unix/lib/net8.0/A.dll",
            "runtimes/win/lib/net8.0/A.dll",
        ]);
        let selection = selector("net8.0", Some("linux-x64")).select(&files, &[]);
        assert_eq!(selection.managed, vec!["runtimes/unix/lib/net8.0/A.dll"]);

        // Without a runtime, only portable assets are considered.
        let selection = selector("net8.0", None).select(&files, &[]);
        assert_eq!(selection.managed, vec!["lib/net8.0/A.dll"]);

        // Runtime-specific folders for incompatible frameworks are skipped.
        let selection = selector("net6.0", Some("win-x64")).select(&files, &[]);
        assert!(selection.managed.is_empty());
    }

    #[test]
    fn first_runtime_wins() {
        let files = files(&[
            "runtimes/linux-x64/lib/net8.0/A.dll",
            "runtimes/linux/lib/net8.0/B.dll",
        ]);
        let selection = selector("net8.0", Some("linux-x64")).select(&files, &[]);
        assert_eq!(selection.managed, vec!["runtimes/linux-x64/lib/net8.0/A.dll"]);
    }

    #[test]
    fn placeholder() {
        let files = files(&["lib/net8.0/A.dll", "runtimes/win/lib/net8.0/_._"]);
        let selection = selector("net8.0", Some("win-x64")).select(&files, &[]);
        assert!(selection.managed.is_empty());

        let selection = selector("net8.0", Some("linux-x64")).select(&files, &[]);
        assert_eq!(selection.managed, vec!["lib/net8.0/A.dll"]);
    }

    #[test]
    fn native() {
        let files = files(&[
            "lib/net8.0/A.dll",
            "runtimes/linux-x64/native/libe_sqlite3.so",
            "runtimes/linux-x64/native/nested/libfoo.so.1",
            "runtimes/linux/native/libother.so",
            "runtimes/win-x64/native/e_sqlite3.dll",
        ]);
        let selection = selector("net8.0", Some("linux-x64")).select(&files, &[]);
        assert_eq!(
            selection.native,
            vec![
                "runtimes/linux-x64/native/libe_sqlite3.so",
                "runtimes/linux-x64/native/nested/libfoo.so.1",
            ]
        );
        assert_eq!(selection.managed, vec!["lib/net8.0/A.dll"]);

        let selection = selector("net8.0", Some("win-x64")).select(&files, &[]);
        assert_eq!(selection.native, vec!["runtimes/win-x64/native/e_sqlite3.dll"]);

        let selection = selector("net8.0", None).select(&files, &[]);
        assert!(selection.native.is_empty());
    }

    #[test]
    fn native_fallback_chain() {
        let files = files(&["runtimes/linux/native/libfoo.so"]);
        let selection = selector("net8.0", Some("linux-x64")).select(&files, &[]);
        assert_eq!(selection.native, vec!["runtimes/linux/native/libfoo.so"]);
    }

    #[test]
    fn framework_references() {
        let groups = vec![
            FrameworkReferenceGroup {
                target_framework: TargetFramework::from_str("net6.0").unwrap(),
                references: vec!["Microsoft.AspNetCore.App".to_string()],
            },
            FrameworkReferenceGroup {
                target_framework: TargetFramework::from_str("net8.0").unwrap(),
                references: vec![
                    "Microsoft.WindowsDesktop.App".to_string(),
                    "Microsoft.AspNetCore.App".to_string(),
                ],
            },
        ];

        let selection = selector("net7.0", None).select(&[], &groups);
        assert_eq!(selection.framework_references, vec!["Microsoft.AspNetCore.App"]);

        let selection = selector("any", None).select(&[], &groups);
        assert_eq!(
            selection.framework_references,
            vec!["Microsoft.AspNetCore.App", "Microsoft.WindowsDesktop.App"]
        );

        let selection = selector("net5.0", None).select(&[], &groups);
        assert!(selection.framework_references.is_empty());
    }

    #[test]
    fn serialize() {
        let selection = AssetSelection {
            managed: vec!["lib/net8.0/A.dll".to_string()],
            native: vec![],
            framework_references: vec!["Microsoft.AspNetCore.App".to_string()],
        };
        insta::assert_snapshot!(serde_json::to_string(&selection).unwrap(), @r#"{"managed":["lib/net8.0/A.dll"],"native":[],"framework-references":["Microsoft.AspNetCore.App"]}"#);
    }
}
