//! Typed OData properties and the field formats used inside them.

use super::node::XmlNode;
use crate::manifest::decode_dependencies;
use chrono::{DateTime, Utc};

/// OData type annotations carried by non-string properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdmType {
    Boolean,
    Int32,
    Int64,
    DateTime,
}

impl EdmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdmType::Boolean => "Edm.Boolean",
            EdmType::Int32 => "Edm.Int32",
            EdmType::Int64 => "Edm.Int64",
            EdmType::DateTime => "Edm.DateTime",
        }
    }
}

/// Value of one feed property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    /// Absent value, keeping the declared type if the field has one
    Null(Option<EdmType>),
}

impl PropertyValue {
    /// Text for present values, `Null(None)` for absent ones.
    pub fn text(value: Option<&str>) -> Self {
        match value {
            Some(value) => PropertyValue::Text(value.to_string()),
            None => PropertyValue::Null(None),
        }
    }

    pub fn edm_type(&self) -> Option<EdmType> {
        match self {
            PropertyValue::Text(_) => None,
            // Counters stay Int32 until they outgrow it.
            PropertyValue::Integer(n) if i32::try_from(*n).is_ok() => Some(EdmType::Int32),
            PropertyValue::Integer(_) => Some(EdmType::Int64),
            PropertyValue::Bool(_) => Some(EdmType::Boolean),
            PropertyValue::Timestamp(_) => Some(EdmType::DateTime),
            PropertyValue::Null(type_) => *type_,
        }
    }

    /// Rendered text content, `None` for null values.
    pub fn render(&self) -> Option<String> {
        match self {
            PropertyValue::Text(text) => Some(text.clone()),
            PropertyValue::Integer(n) => Some(n.to_string()),
            PropertyValue::Bool(true) => Some("True".to_string()),
            PropertyValue::Bool(false) => Some("False".to_string()),
            PropertyValue::Timestamp(at) => Some(format_date(at)),
            PropertyValue::Null(_) => None,
        }
    }
}

/// ISO-8601 in UTC with seconds precision and a trailing `Z`.
pub fn format_date(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Attach a data-namespace property to `node`.
///
/// The type annotation is written first; an absent value adds the null
/// marker and no text.
pub fn add_meta(node: &mut XmlNode, name: &str, value: Option<&str>, type_: Option<EdmType>) {
    let mut child = XmlNode::new(format!("d:{name}"));
    if let Some(type_) = type_ {
        child.set_attribute("m:type", type_.as_str());
    }
    match value {
        Some(value) => child.text = Some(value.to_string()),
        None => child.set_attribute("m:null", "true"),
    }
    node.add_child(child);
}

pub fn add_property(node: &mut XmlNode, name: &str, value: &PropertyValue) {
    add_meta(node, name, value.render().as_deref(), value.edm_type());
}

/// Attach an unqualified structural element with plain attributes.
pub fn add_with_attributes<'a>(
    node: &'a mut XmlNode,
    name: &str,
    value: Option<&str>,
    attributes: &[(&str, &str)],
) -> &'a mut XmlNode {
    let mut child = XmlNode::new(name);
    for (key, attr_value) in attributes {
        child.set_attribute(*key, *attr_value);
    }
    child.text = value.map(str::to_string);
    node.add_child(child)
}

/// Compact target framework token: ASCII letters and digits only, lowercased.
///
/// ```
/// # use nuget_server::feed::format_target_framework;
/// assert_eq!(format_target_framework("DNX4.5.1"), "dnx451");
/// assert_eq!(format_target_framework("DNXCore5.0"), "dnxcore50");
/// ```
pub fn format_target_framework(framework: &str) -> String {
    framework
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Render a stored dependency blob as `id:range:framework` segments joined by `|`.
///
/// Absent, empty or malformed blobs render as an empty string.
pub fn render_dependencies(raw: Option<&str>) -> String {
    let Some(dependencies) = decode_dependencies(raw) else {
        return String::new();
    };

    dependencies
        .iter()
        .map(|dependency| {
            let framework = dependency
                .framework
                .as_deref()
                .map(format_target_framework)
                .unwrap_or_default();
            format!("{}:{}:{}", dependency.id, dependency.version_range, framework)
        })
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn root() -> XmlNode {
        XmlNode::new("root")
    }

    #[test]
    fn test_render_dependencies() {
        let raw = r#"
            [
                {"id": 1, "version": "0.2.3"},
                {"id": 2, "version": "1.2.3"},
                {"id": 3, "version": "2.5.0", "framework": "DNX4.5.1"}
            ]
        "#;
        assert_eq!(render_dependencies(Some(raw)), "1:0.2.3:|2:1.2.3:|3:2.5.0:dnx451");
        assert_eq!(render_dependencies(Some("")), "");
        assert_eq!(render_dependencies(None), "");
        assert_eq!(render_dependencies(Some("invalid json}")), "");
        assert_eq!(render_dependencies(Some("[]")), "");
    }

    #[test]
    fn test_format_target_framework() {
        assert_eq!(format_target_framework("DNX4.5.1"), "dnx451");
        assert_eq!(format_target_framework("DNXCore5.0"), "dnxcore50");
        assert_eq!(format_target_framework(".NETFramework4.5"), "netframework45");
        assert_eq!(format_target_framework(""), "");
    }

    #[test]
    fn test_property_values() {
        let epoch = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(PropertyValue::Bool(false).render().as_deref(), Some("False"));
        assert_eq!(PropertyValue::Bool(true).edm_type(), Some(EdmType::Boolean));
        assert_eq!(PropertyValue::Integer(1024).render().as_deref(), Some("1024"));
        assert_eq!(PropertyValue::Integer(1024).edm_type(), Some(EdmType::Int32));
        assert_eq!(
            PropertyValue::Integer(i64::from(i32::MAX)).edm_type(),
            Some(EdmType::Int32)
        );
        let large = PropertyValue::Integer(i64::from(i32::MAX) + 1);
        assert_eq!(large.edm_type(), Some(EdmType::Int64));
        assert_eq!(large.render().as_deref(), Some("2147483648"));
        assert_eq!(EdmType::Int64.as_str(), "Edm.Int64");
        assert_eq!(
            PropertyValue::Timestamp(epoch).render().as_deref(),
            Some("1970-01-01T00:00:00Z")
        );
        assert_eq!(PropertyValue::text(None), PropertyValue::Null(None));
        assert_eq!(PropertyValue::Null(Some(EdmType::DateTime)).render(), None);
    }

    #[test]
    fn test_add_meta() {
        let mut node = root();
        add_meta(&mut node, "SomeName", Some("SomeValue"), Some(EdmType::Int32));
        assert_eq!(
            node.to_xml_string().unwrap(),
            r#"<root><d:SomeName m:type="Edm.Int32">SomeValue</d:SomeName></root>"#
        );

        let mut node = root();
        add_meta(&mut node, "SomeName", None, Some(EdmType::Int32));
        assert_eq!(
            node.to_xml_string().unwrap(),
            r#"<root><d:SomeName m:type="Edm.Int32" m:null="true"/></root>"#
        );

        let mut node = root();
        add_meta(&mut node, "Language", None, None);
        add_meta(&mut node, "Tags", Some("a b"), None);
        assert_eq!(
            node.to_xml_string().unwrap(),
            r#"<root><d:Language m:null="true"/><d:Tags>a b</d:Tags></root>"#
        );
    }

    #[test]
    fn test_add_property_boolean() {
        let mut node = root();
        add_property(&mut node, "IsPrerelease", &PropertyValue::Bool(false));
        add_property(&mut node, "LastEdited", &PropertyValue::Null(Some(EdmType::DateTime)));
        assert_eq!(
            node.to_xml_string().unwrap(),
            concat!(
                r#"<root><d:IsPrerelease m:type="Edm.Boolean">False</d:IsPrerelease>"#,
                r#"<d:LastEdited m:type="Edm.DateTime" m:null="true"/></root>"#
            )
        );
    }

    #[test]
    fn test_add_with_attributes() {
        let mut node = root();
        add_with_attributes(&mut node, "SomeName", Some("SomeValue"), &[("a", "5"), ("b", "foo")]);
        assert_eq!(
            node.to_xml_string().unwrap(),
            r#"<root><SomeName a="5" b="foo">SomeValue</SomeName></root>"#
        );
    }
}
