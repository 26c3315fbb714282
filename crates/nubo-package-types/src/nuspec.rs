use std::str::FromStr;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

use nubo_normalize::{InvalidIdError, PackageId};
use nubo_platform::{FrameworkCompatibility, TargetFramework};
use nubo_version::{RangeParseError, Version, VersionParseError, VersionRange};

use crate::Dependency;

/// The dependencies declared for a target framework.
///
/// A group without a target framework applies to every framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGroup {
    pub target_framework: Option<TargetFramework>,
    pub dependencies: Vec<Dependency>,
}

/// The shared frameworks a package requires for a target framework, e.g.,
/// `Microsoft.AspNetCore.App`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameworkReferenceGroup {
    pub target_framework: TargetFramework,
    pub references: Vec<String>,
}

/// The subset of a package manifest (`.nuspec`) needed to resolve and lay out a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nuspec {
    pub id: PackageId,
    pub version: Version,
    pub dependency_groups: Vec<DependencyGroup>,
    pub framework_reference_groups: Vec<FrameworkReferenceGroup>,
}

impl Nuspec {
    /// Parse a `.nuspec` document.
    pub fn parse(contents: &[u8]) -> Result<Self, NuspecError> {
        let text = std::str::from_utf8(contents)?;
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut state = ParseState::default();
        loop {
            match reader.read_event()? {
                Event::Start(element) => {
                    state.element(&element, false)?;
                    state.path.push(element.local_name().as_ref().to_vec());
                }
                Event::Empty(element) => {
                    state.element(&element, true)?;
                }
                Event::End(_) => {
                    state.close();
                }
                Event::Text(text) => {
                    let text = text.unescape()?;
                    state.text(text.trim())?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(Self {
            id: state.id.ok_or(NuspecError::MissingId)?,
            version: state.version.ok_or(NuspecError::MissingVersion)?,
            dependency_groups: state.dependency_groups,
            framework_reference_groups: state.framework_reference_groups,
        })
    }

    /// Returns the dependencies for the group nearest to the given framework.
    ///
    /// A group without a target framework is treated as the wildcard framework, so it's only
    /// chosen if no framework-specific group is compatible.
    pub fn dependencies_for(
        &self,
        framework: &TargetFramework,
        compatibility: &FrameworkCompatibility,
    ) -> &[Dependency] {
        let any = TargetFramework::any();
        let frameworks = self
            .dependency_groups
            .iter()
            .map(|group| group.target_framework.as_ref().unwrap_or(&any))
            .collect::<Vec<_>>();
        let Some(nearest) = compatibility.get_nearest(frameworks.iter().copied(), framework)
        else {
            return &[];
        };
        frameworks
            .iter()
            .position(|candidate| std::ptr::eq(*candidate, nearest))
            .map(|index| self.dependency_groups[index].dependencies.as_slice())
            .unwrap_or_default()
    }
}

/// What's being collected when inside a `<group>` element.
#[derive(Debug)]
enum OpenGroup {
    Dependencies(DependencyGroup),
    FrameworkReferences(FrameworkReferenceGroup),
    /// A group for a framework we can't represent; its children are dropped.
    Unsupported,
}

#[derive(Debug, Default)]
struct ParseState {
    path: Vec<Vec<u8>>,
    id: Option<PackageId>,
    version: Option<Version>,
    dependency_groups: Vec<DependencyGroup>,
    /// Dependencies listed directly under `<dependencies>`, without a group.
    ungrouped: Option<usize>,
    framework_reference_groups: Vec<FrameworkReferenceGroup>,
    group: Option<OpenGroup>,
}

impl ParseState {
    fn parent(&self) -> Option<&[u8]> {
        self.path.last().map(Vec::as_slice)
    }

    fn in_metadata(&self) -> bool {
        self.path.len() >= 2 && self.path[self.path.len() - 2] == b"metadata"
    }

    fn element(&mut self, element: &BytesStart, empty: bool) -> Result<(), NuspecError> {
        match (self.parent(), element.local_name().as_ref()) {
            (Some(b"dependencies"), b"group") => {
                let group = match attribute(element, "targetFramework")? {
                    None => OpenGroup::Dependencies(DependencyGroup {
                        target_framework: None,
                        dependencies: Vec::new(),
                    }),
                    Some(framework) => match TargetFramework::from_str(&framework) {
                        Ok(framework) => OpenGroup::Dependencies(DependencyGroup {
                            target_framework: Some(framework),
                            dependencies: Vec::new(),
                        }),
                        Err(err) => {
                            debug!("Ignoring dependency group: {err}");
                            OpenGroup::Unsupported
                        }
                    },
                };
                self.group = Some(group);
                if empty {
                    self.finish_group();
                }
            }
            (Some(b"frameworkReferences"), b"group") => {
                let group = match attribute(element, "targetFramework")? {
                    None => OpenGroup::FrameworkReferences(FrameworkReferenceGroup {
                        target_framework: TargetFramework::any(),
                        references: Vec::new(),
                    }),
                    Some(framework) => match TargetFramework::from_str(&framework) {
                        Ok(framework) => OpenGroup::FrameworkReferences(FrameworkReferenceGroup {
                            target_framework: framework,
                            references: Vec::new(),
                        }),
                        Err(err) => {
                            debug!("Ignoring framework reference group: {err}");
                            OpenGroup::Unsupported
                        }
                    },
                };
                self.group = Some(group);
                if empty {
                    self.finish_group();
                }
            }
            (Some(b"group"), b"dependency") => {
                let dependency = dependency(element)?;
                if let Some(OpenGroup::Dependencies(group)) = &mut self.group {
                    group.dependencies.push(dependency);
                }
            }
            (Some(b"dependencies"), b"dependency") => {
                let dependency = dependency(element)?;
                let index = *self.ungrouped.get_or_insert_with(|| {
                    self.dependency_groups.push(DependencyGroup {
                        target_framework: None,
                        dependencies: Vec::new(),
                    });
                    self.dependency_groups.len() - 1
                });
                self.dependency_groups[index].dependencies.push(dependency);
            }
            (Some(b"group"), b"frameworkReference") => {
                let name = attribute(element, "name")?.ok_or(NuspecError::MissingAttribute {
                    element: "frameworkReference",
                    attribute: "name",
                })?;
                if let Some(OpenGroup::FrameworkReferences(group)) = &mut self.group {
                    group.references.push(name);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.path.pop().as_deref() == Some(b"group".as_slice()) {
            self.finish_group();
        }
    }

    fn finish_group(&mut self) {
        match self.group.take() {
            Some(OpenGroup::Dependencies(group)) => self.dependency_groups.push(group),
            Some(OpenGroup::FrameworkReferences(group)) => {
                self.framework_reference_groups.push(group);
            }
            Some(OpenGroup::Unsupported) | None => {}
        }
    }

    fn text(&mut self, text: &str) -> Result<(), NuspecError> {
        if !self.in_metadata() {
            return Ok(());
        }
        match self.parent() {
            Some(b"id") => self.id = Some(PackageId::new(text)?),
            Some(b"version") => {
                self.version = Some(Version::from_str(text).map_err(NuspecError::Version)?);
            }
            _ => {}
        }
        Ok(())
    }
}

fn attribute(element: &BytesStart, name: &str) -> Result<Option<String>, NuspecError> {
    let Some(attribute) = element
        .try_get_attribute(name)
        .map_err(quick_xml::Error::from)?
    else {
        return Ok(None);
    };
    Ok(Some(attribute.unescape_value()?.into_owned()))
}

fn dependency(element: &BytesStart) -> Result<Dependency, NuspecError> {
    let id = attribute(element, "id")?.ok_or(NuspecError::MissingAttribute {
        element: "dependency",
        attribute: "id",
    })?;
    let id = PackageId::new(id)?;
    let range = match attribute(element, "version")? {
        Some(version) => VersionRange::parse_minimum(&version).map_err(|source| {
            NuspecError::Range {
                id: id.clone(),
                source,
            }
        })?,
        None => VersionRange::any(),
    };
    Ok(Dependency::new(id, range))
}

#[derive(Debug, thiserror::Error)]
pub enum NuspecError {
    #[error("Package manifest is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Failed to parse package manifest")]
    Xml(#[from] quick_xml::Error),
    #[error("Package manifest is missing `<id>`")]
    MissingId,
    #[error("Package manifest is missing `<version>`")]
    MissingVersion,
    #[error("Package manifest has a `<{element}>` without `{attribute}`")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },
    #[error(transparent)]
    Id(#[from] InvalidIdError),
    #[error("Package manifest has an invalid version")]
    Version(#[source] VersionParseError),
    #[error("Package manifest has an invalid version range for `{id}`")]
    Range {
        id: PackageId,
        #[source]
        source: RangeParseError,
    },
}
