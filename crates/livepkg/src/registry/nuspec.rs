//! Package manifest (`.nuspec`) parsing

use crate::framework::Framework;
use crate::library::DependencyRange;
use crate::semver::{SemverError, Version, VersionRange};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while parsing a package manifest
#[derive(Debug, Error)]
pub enum NuspecError {
    /// Malformed XML
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Required element is absent
    #[error("Missing <{0}> element in package manifest")]
    MissingElement(&'static str),

    /// Required attribute is absent
    #[error("Missing '{attribute}' attribute on <{element}>")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// Version or version range could not be parsed
    #[error("Invalid version in package manifest: {0}")]
    InvalidVersion(#[from] SemverError),
}

/// Dependencies declared for one target framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGroup {
    pub target_framework: Framework,
    pub dependencies: Vec<DependencyRange>,
}

/// Parsed package manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    pub id: String,
    pub version: Version,
    pub authors: Vec<String>,
    pub description: Option<String>,
    pub require_license_acceptance: bool,
    /// License expression or embedded license file name
    pub license: Option<String>,
    pub license_url: Option<String>,
    pub dependency_groups: Vec<DependencyGroup>,
}

impl PackageMetadata {
    /// Minimal metadata with no dependencies and no license requirement
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            authors: Vec::new(),
            description: None,
            require_license_acceptance: false,
            license: None,
            license_url: None,
            dependency_groups: Vec::new(),
        }
    }

    /// License expression, file name or URL, whichever the manifest gives
    pub fn license_text(&self) -> Option<&str> {
        self.license.as_deref().or(self.license_url.as_deref())
    }

    /// Dependency group nearest to `target`, if any is compatible
    pub fn nearest_group(&self, target: &Framework) -> Option<&DependencyGroup> {
        let framework = Framework::nearest(
            target,
            self.dependency_groups.iter().map(|group| &group.target_framework),
        )?;
        self.dependency_groups
            .iter()
            .find(|group| &group.target_framework == framework)
    }

    /// Parse manifest XML
    pub fn parse(xml: &str) -> Result<Self, NuspecError> {
        let mut reader = Reader::from_str(xml);
        let mut path: Vec<String> = Vec::new();

        let mut id = None;
        let mut version = None;
        let mut authors = Vec::new();
        let mut description = None;
        let mut require_license_acceptance = false;
        let mut license = None;
        let mut license_url = None;

        let mut groups: Vec<DependencyGroup> = Vec::new();
        let mut flat: Vec<DependencyRange> = Vec::new();
        // None while inside a group whose framework could not be parsed
        let mut current_group: Option<Option<DependencyGroup>> = None;

        loop {
            match reader.read_event()? {
                Event::Start(ref e) => {
                    let name = local_name(e);
                    if name == "group" && parent_is(&path, "dependencies") {
                        current_group = Some(start_group(e)?);
                    } else if name == "dependency" {
                        add_dependency(e, &path, &mut current_group, &mut flat)?;
                    }
                    path.push(name);
                }
                Event::Empty(ref e) => {
                    let name = local_name(e);
                    if name == "group" && parent_is(&path, "dependencies") {
                        if let Some(group) = start_group(e)? {
                            groups.push(group);
                        }
                    } else if name == "dependency" {
                        add_dependency(e, &path, &mut current_group, &mut flat)?;
                    }
                }
                Event::Text(ref e) => {
                    if !parent_is(&path[..path.len().saturating_sub(1)], "metadata") {
                        continue;
                    }
                    let text = e.unescape()?.trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    match path.last().map(String::as_str) {
                        Some("id") => id = Some(text),
                        Some("version") => version = Some(Version::parse(&text)?),
                        Some("authors") => {
                            authors = text
                                .split(',')
                                .map(str::trim)
                                .filter(|author| !author.is_empty())
                                .map(str::to_string)
                                .collect();
                        }
                        Some("description") => description = Some(text),
                        Some("requireLicenseAcceptance") => {
                            require_license_acceptance = text.eq_ignore_ascii_case("true");
                        }
                        Some("license") => license = Some(text),
                        Some("licenseUrl") => license_url = Some(text),
                        _ => {}
                    }
                }
                Event::End(_) => {
                    if path.pop().as_deref() == Some("group") {
                        if let Some(Some(group)) = current_group.take() {
                            groups.push(group);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !flat.is_empty() {
            groups.push(DependencyGroup {
                target_framework: Framework::any(),
                dependencies: flat,
            });
        }

        Ok(Self {
            id: id.ok_or(NuspecError::MissingElement("id"))?,
            version: version.ok_or(NuspecError::MissingElement("version"))?,
            authors,
            description,
            require_license_acceptance,
            license,
            license_url,
            dependency_groups: groups,
        })
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

fn parent_is(path: &[String], name: &str) -> bool {
    path.last().is_some_and(|last| last == name)
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, NuspecError> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == name.as_bytes() {
            return Ok(Some(attr.unescape_value()?.trim().to_string()));
        }
    }
    Ok(None)
}

/// Begin a dependency group; `None` if its framework is not understood
fn start_group(e: &BytesStart<'_>) -> Result<Option<DependencyGroup>, NuspecError> {
    let target_framework = match attribute(e, "targetFramework")? {
        None => Framework::any(),
        Some(token) if token.is_empty() => Framework::any(),
        Some(token) => match Framework::parse(&token) {
            Ok(framework) => framework,
            Err(err) => {
                warn!(framework = %token, error = %err, "skipping dependency group");
                return Ok(None);
            }
        },
    };
    Ok(Some(DependencyGroup {
        target_framework,
        dependencies: Vec::new(),
    }))
}

fn add_dependency(
    e: &BytesStart<'_>,
    path: &[String],
    current_group: &mut Option<Option<DependencyGroup>>,
    flat: &mut Vec<DependencyRange>,
) -> Result<(), NuspecError> {
    let name = attribute(e, "id")?.ok_or(NuspecError::MissingAttribute {
        element: "dependency",
        attribute: "id",
    })?;
    let range = match attribute(e, "version")? {
        Some(range) if !range.is_empty() => VersionRange::parse(&range)?,
        _ => VersionRange::any(),
    };
    let dependency = DependencyRange::new(name, range);

    if parent_is(path, "group") {
        if let Some(Some(group)) = current_group {
            group.dependencies.push(dependency);
        }
    } else if parent_is(path, "dependencies") {
        flat.push(dependency);
    }
    Ok(())
}
