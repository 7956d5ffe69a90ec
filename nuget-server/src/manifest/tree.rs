//! Minimal namespace-resolved element tree for manifest documents.
//!
//! Manifests are small, so the whole document is read into owned elements
//! and then queried by `(namespace, local name)`.

use crate::error::{AppError, AppResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Resolved namespace URI, `None` for unqualified elements
    pub namespace: Option<String>,
    pub name: String,
    /// Attributes keyed by local name, in document order; namespace declarations excluded
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    pub fn in_namespace(&self, namespace: &str) -> bool {
        match self.namespace.as_deref() {
            Some(ns) => ns == namespace,
            None => namespace.is_empty(),
        }
    }

    /// First direct child with the given namespace and local name.
    pub fn find(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find(|child| child.name == name && child.in_namespace(namespace))
    }

    /// All direct children with the given namespace and local name, in document order.
    pub fn find_all<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.children
            .iter()
            .filter(move |child| child.name == name && child.in_namespace(namespace))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Text content, `None` when the element is empty.
    pub fn text(&self) -> Option<&str> {
        if self.text.is_empty() {
            None
        } else {
            Some(&self.text)
        }
    }
}

fn resolve_namespace(resolved: ResolveResult<'_>) -> AppResult<Option<String>> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(String::from_utf8_lossy(ns.as_ref()).into_owned())),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(AppError::BadRequest(format!(
            "Manifest uses undeclared namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn open_element(namespace: Option<String>, start: &BytesStart<'_>) -> AppResult<Element> {
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        namespace,
        name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
        attributes,
        ..Element::default()
    })
}

/// Parse a document and return its root element.
pub fn parse_document(xml: &str) -> AppResult<Element> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (resolved, event) = reader.read_resolved_event()?;
        let namespace = resolve_namespace(resolved)?;

        match event {
            Event::Start(start) => stack.push(open_element(namespace, &start)?),
            Event::Empty(start) => {
                let element = open_element(namespace, &start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let element = stack.pop().ok_or_else(|| {
                    AppError::BadRequest("Manifest has an unmatched closing tag".to_string())
                })?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::Eof => break,
            _ => {}
        }

        if root.is_some() && stack.is_empty() {
            break;
        }
    }

    if !stack.is_empty() {
        return Err(AppError::BadRequest(
            "Manifest ended before its root element was closed".to_string(),
        ));
    }

    root.ok_or_else(|| AppError::BadRequest("Manifest has no root element".to_string()))
}
