use std::str::FromStr;

use serde::Deserialize;
use tracing::debug;

use nubo_version::Version;

/// The resource type that serves package contents by id and version.
const PACKAGE_BASE_ADDRESS: &str = "PackageBaseAddress/3.0.0";

/// A V3 feed's service index (`index.json`), listing the resources the feed provides.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceIndex {
    pub version: String,
    #[serde(default)]
    pub resources: Vec<ServiceResource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceResource {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@type")]
    pub kind: String,
}

impl ServiceIndex {
    /// The base URL of the package content resource, if the feed has one.
    pub fn package_base_address(&self) -> Option<&str> {
        self.resources
            .iter()
            .find(|resource| resource.kind == PACKAGE_BASE_ADDRESS)
            .map(|resource| resource.id.as_str())
    }
}

/// The list of versions of a package, as served by the package content resource
/// (`{base}/{id}/index.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct VersionIndex {
    pub versions: Vec<String>,
}

impl VersionIndex {
    /// Parse the listed versions, skipping any that aren't valid.
    pub fn parse_versions(&self) -> Vec<Version> {
        self.versions
            .iter()
            .filter_map(|version| match Version::from_str(version) {
                Ok(version) => Some(version),
                Err(err) => {
                    debug!("Skipping invalid version in version index: {err}");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_index() {
        let index: ServiceIndex = serde_json::from_str(
            r#"{
              "version": "3.0.0",
              "resources": [
                { "@id": "https://azuresearch-usnc.nuget.org/query", "@type": "SearchQueryService", "comment": "Query endpoint" },
                { "@id": "https://api.nuget.org/v3-flatcontainer/", "@type": "PackageBaseAddress/3.0.0", "comment": "Base URL" }
              ]
            }"#,
        )
        .unwrap();
        assert_eq!(
            index.package_base_address(),
            Some("https://api.nuget.org/v3-flatcontainer/")
        );

        let index: ServiceIndex = serde_json::from_str(r#"{ "version": "3.0.0" }"#).unwrap();
        assert_eq!(index.package_base_address(), None);
    }

    #[test]
    fn version_index() {
        let index: VersionIndex = serde_json::from_str(
            r#"{ "versions": ["12.0.1", "13.0.3", "13.0.4-beta1", "not-a-version"] }"#,
        )
        .unwrap();
        let versions = index
            .parse_versions()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        assert_eq!(versions, ["12.0.1", "13.0.3", "13.0.4-beta1"]);
    }
}
