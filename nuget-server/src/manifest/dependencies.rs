//! Dependency extraction and the stored dependency blob.
//!
//! Manifests declare dependencies in two shapes that may coexist inside one
//! `dependencies` element:
//!
//! ```xml
//! <dependencies>
//!   <dependency id="Shared" version="1.0.0" />
//!   <group targetFramework="DNX4.5.1">
//!     <dependency id="Platform" version="[2.0,3.0)" />
//!   </group>
//! </dependencies>
//! ```
//!
//! Direct children apply to every framework. Grouped ones carry the group's
//! target framework, copied verbatim.

use super::tree::Element;
use crate::error::{AppError, AppResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "version", default)]
    pub version_range: String,
    /// `None` when the dependency applies to all target frameworks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
}

impl Dependency {
    pub fn new(id: impl Into<String>, version_range: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version_range: version_range.into(),
            framework: None,
        }
    }

    pub fn with_framework(mut self, framework: impl Into<String>) -> Self {
        self.framework = Some(framework.into());
        self
    }
}

// Older rows were written with numeric ids.
fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number id, got {other}"
        ))),
    }
}

fn read_dependency(element: &Element, framework: Option<&str>) -> AppResult<Dependency> {
    let id = element.attribute("id").ok_or_else(|| {
        AppError::BadRequest("Manifest dependency is missing its 'id' attribute".to_string())
    })?;

    Ok(Dependency {
        id: id.to_string(),
        version_range: element.attribute("version").unwrap_or_default().to_string(),
        framework: framework.map(str::to_string),
    })
}

/// Collect the dependencies declared under `metadata`.
///
/// Direct dependencies come first, then grouped ones, each in document
/// order. A manifest without a `dependencies` element has none.
pub fn determine_dependencies(metadata: &Element, namespace: &str) -> AppResult<Vec<Dependency>> {
    debug!("Parsing dependencies");
    let Some(container) = metadata.find(namespace, "dependencies") else {
        debug!("No dependencies found");
        return Ok(Vec::new());
    };

    let mut dependencies = container
        .find_all(namespace, "dependency")
        .map(|dependency| read_dependency(dependency, None))
        .collect::<AppResult<Vec<_>>>()?;

    for group in container.find_all(namespace, "group") {
        let framework = group.attribute("targetFramework");
        for dependency in group.find_all(namespace, "dependency") {
            dependencies.push(read_dependency(dependency, framework)?);
        }
    }

    debug!(count = dependencies.len(), "Parsed dependencies");
    Ok(dependencies)
}

/// Encode a dependency list into the blob stored on the version row.
pub fn encode_dependencies(dependencies: &[Dependency]) -> AppResult<String> {
    Ok(serde_json::to_string(dependencies)?)
}

/// Decode a stored dependency blob.
///
/// Returns `None` for an absent, empty or unparsable blob; legacy rows are
/// not guaranteed to hold valid data.
pub fn decode_dependencies(raw: Option<&str>) -> Option<Vec<Dependency>> {
    let raw = raw.map(str::trim).filter(|raw| !raw.is_empty())?;
    match serde_json::from_str::<Option<Vec<Dependency>>>(raw) {
        Ok(dependencies) => dependencies,
        Err(e) => {
            warn!(error = %e, "Ignoring malformed dependency blob");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::tree::parse_document;

    const NS: &str = "http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd";

    fn metadata(dependencies_xml: &str) -> Element {
        let xml = format!(
            r#"<package xmlns="{NS}"><metadata><id>A</id><version>1.0.0</version>{dependencies_xml}</metadata></package>"#
        );
        let root = parse_document(&xml).unwrap();
        root.find(NS, "metadata").cloned().unwrap()
    }

    #[test]
    fn test_mixed_shapes_keep_order() {
        let metadata = metadata(
            r#"<dependencies>
                 <group targetFramework="DNX4.5.1">
                   <dependency id="dep3" version="2.5.0" />
                 </group>
                 <dependency id="dep1" version="0.2.3" />
                 <dependency id="dep2" version="1.2.3" />
               </dependencies>"#,
        );

        let deps = determine_dependencies(&metadata, NS).unwrap();
        assert_eq!(
            deps,
            vec![
                Dependency::new("dep1", "0.2.3"),
                Dependency::new("dep2", "1.2.3"),
                Dependency::new("dep3", "2.5.0").with_framework("DNX4.5.1"),
            ]
        );
    }

    #[test]
    fn test_multiple_groups() {
        let metadata = metadata(
            r#"<dependencies>
                 <group targetFramework="net45"><dependency id="a" version="1.0" /></group>
                 <group targetFramework="DNXCore5.0">
                   <dependency id="b" version="[1.0,2.0)" />
                   <dependency id="c" version="3.0" />
                 </group>
                 <group><dependency id="d" version="4.0" /></group>
               </dependencies>"#,
        );

        let deps = determine_dependencies(&metadata, NS).unwrap();
        let summary: Vec<(&str, &str, Option<&str>)> = deps
            .iter()
            .map(|d| (d.id.as_str(), d.version_range.as_str(), d.framework.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("a", "1.0", Some("net45")),
                ("b", "[1.0,2.0)", Some("DNXCore5.0")),
                ("c", "3.0", Some("DNXCore5.0")),
                ("d", "4.0", None),
            ]
        );
    }

    #[test]
    fn test_no_dependencies_element() {
        assert!(determine_dependencies(&metadata(""), NS).unwrap().is_empty());
        assert!(determine_dependencies(&metadata("<dependencies/>"), NS)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_dependency_without_version_or_id() {
        let deps =
            determine_dependencies(&metadata(r#"<dependencies><dependency id="x"/></dependencies>"#), NS)
                .unwrap();
        assert_eq!(deps, vec![Dependency::new("x", "")]);

        let missing_id = metadata(r#"<dependencies><dependency version="1.0"/></dependencies>"#);
        assert!(determine_dependencies(&missing_id, NS).is_err());
    }

    #[test]
    fn test_blob_encoding() {
        let deps = vec![
            Dependency::new("a", "1.0.0"),
            Dependency::new("b", "2.0.0").with_framework("net45"),
        ];
        let blob = encode_dependencies(&deps).unwrap();
        assert_eq!(
            blob,
            r#"[{"id":"a","version":"1.0.0"},{"id":"b","version":"2.0.0","framework":"net45"}]"#
        );
        assert_eq!(decode_dependencies(Some(blob.as_str())), Some(deps));
    }

    #[test]
    fn test_decode_is_lenient() {
        assert_eq!(decode_dependencies(None), None);
        assert_eq!(decode_dependencies(Some("")), None);
        assert_eq!(decode_dependencies(Some("null")), None);
        assert_eq!(decode_dependencies(Some("invalid json}")), None);
        assert_eq!(decode_dependencies(Some(r#"[{"id": true}]"#)), None);

        let legacy = decode_dependencies(Some(r#"[{"id": 1, "version": "0.2.3", "framework": null}]"#));
        assert_eq!(legacy, Some(vec![Dependency::new("1", "0.2.3")]));
    }
}
