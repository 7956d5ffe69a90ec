//! Owned XML element tree written with `quick_xml`.
//!
//! Attributes keep insertion order and elements are written without
//! indentation, so a tree always serializes to the same bytes.

use crate::error::AppResult;
use quick_xml::escape::partial_escape;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Write;

// Apostrophes stay literal: entry ids such as `Packages(Id='A')` are compared textually.
fn escape_attribute(value: &str) -> String {
    partial_escape(value).replace('"', "&quot;")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlNode {
    /// Qualified name, e.g. `entry` or `d:Version`
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlNode>,
}

impl XmlNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(name, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: XmlNode) -> Self {
        self.children.push(child);
        self
    }

    /// Set an attribute, replacing an earlier value in place.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| *key == name) {
            Some(existing) => existing.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Append a child and return it for further building.
    pub fn add_child(&mut self, child: XmlNode) -> &mut XmlNode {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|child| child.name == name)
    }

    fn is_empty(&self) -> bool {
        self.children.is_empty() && self.text.as_deref().map_or(true, str::is_empty)
    }

    pub fn write_to<W: Write>(&self, writer: &mut Writer<W>) -> AppResult<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            let value = escape_attribute(value);
            start.push_attribute(Attribute::from((key.as_bytes(), value.as_bytes())));
        }

        if self.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            writer.write_event(Event::Text(BytesText::from_escaped(partial_escape(text))))?;
        }
        for child in &self.children {
            child.write_to(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }

    /// Serialize as a standalone document with an XML declaration.
    pub fn to_document(&self) -> AppResult<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        self.write_to(&mut writer)?;
        Ok(writer.into_inner())
    }

    /// Serialize without a declaration.
    pub fn to_xml_string(&self) -> AppResult<String> {
        let mut writer = Writer::new(Vec::new());
        self.write_to(&mut writer)?;
        Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_nested_tree() {
        let node = XmlNode::new("root")
            .with_attribute("b", "Id='2'")
            .with_attribute("a", "1 & \"x\"")
            .with_child(XmlNode::new("child").with_text("a < b's"))
            .with_child(XmlNode::new("empty"))
            .with_child(XmlNode::new("blank").with_text(""));

        assert_eq!(
            node.to_xml_string().unwrap(),
            r#"<root b="Id='2'" a="1 &amp; &quot;x&quot;"><child>a &lt; b's</child><empty/><blank/></root>"#
        );
    }

    #[test]
    fn test_set_attribute_keeps_position() {
        let mut node = XmlNode::new("n").with_attribute("first", "1").with_attribute("second", "2");
        node.set_attribute("first", "one");
        assert_eq!(node.to_xml_string().unwrap(), r#"<n first="one" second="2"/>"#);
        assert_eq!(node.attribute("second"), Some("2"));
    }

    #[test]
    fn test_document_declaration() {
        let bytes = XmlNode::new("feed").to_document().unwrap();
        assert_eq!(bytes, br#"<?xml version="1.0" encoding="utf-8"?><feed/>"#.to_vec());
    }
}
