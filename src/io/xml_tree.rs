//! Small element tree over `quick-xml` events, and an emitter for writing.

use std::str::FromStr;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{MapError, Result};
use crate::properties::Properties;

/// Parsed element with its attributes, children and text content.
#[derive(Debug, Clone, Default)]
pub(crate) struct XmlElement {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut el = XmlElement {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..Default::default()
        };
        for attr in start.attributes() {
            let attr = attr?;
            el.attrs.push((
                String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                attr.unescape_value()?.into_owned(),
            ));
        }
        Ok(el)
    }

    /// Parses a whole document and returns its root element.
    pub fn parse(bytes: &[u8]) -> Result<XmlElement> {
        let mut reader = Reader::from_reader(bytes);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root = None;
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) => stack.push(XmlElement::from_start(&e)?),
                Event::Empty(e) => {
                    let el = XmlElement::from_start(&e)?;
                    attach(&mut stack, &mut root, el);
                }
                Event::End(_) => {
                    if let Some(el) = stack.pop() {
                        attach(&mut stack, &mut root, el);
                    }
                }
                Event::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&t.unescape()?);
                    }
                }
                Event::CData(c) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        root.ok_or_else(|| MapError::InvalidMap("document has no root element".to_owned()))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn required(&self, name: &str) -> Result<&str> {
        self.attr(name)
            .ok_or_else(|| MapError::missing(&self.name, name))
    }

    /// Parsed optional attribute; present but unparsable is an error.
    pub fn parse_attr<T: FromStr>(&self, name: &str) -> Result<Option<T>> {
        self.attr(name)
            .map(|v| {
                v.trim()
                    .parse()
                    .map_err(|_| MapError::invalid(&self.name, name, v))
            })
            .transpose()
    }

    pub fn parse_required<T: FromStr>(&self, name: &str) -> Result<T> {
        let v = self.required(name)?;
        v.trim()
            .parse()
            .map_err(|_| MapError::invalid(&self.name, name, v))
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// `<properties>` child flattened to a property map.
    pub fn properties(&self) -> Properties {
        self.children_named("properties")
            .flat_map(|p| p.children_named("property"))
            .filter_map(|p| {
                let name = p.attr("name")?;
                let value = p.attr("value").unwrap_or(p.text.as_str());
                Some((name.to_owned(), value.to_owned()))
            })
            .collect()
    }
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, el: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(el),
        None => {
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}

/// Indented XML emitter.
pub(crate) struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    pub fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 1);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(Self { writer })
    }

    fn element<'a>(name: &'a str, attrs: &[(&str, String)]) -> BytesStart<'a> {
        let mut start = BytesStart::new(name);
        for (k, v) in attrs {
            start.push_attribute((*k, v.as_str()));
        }
        start
    }

    pub fn start(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<()> {
        self.writer
            .write_event(Event::Start(Self::element(name, attrs)))?;
        Ok(())
    }

    pub fn empty(&mut self, name: &str, attrs: &[(&str, String)]) -> Result<()> {
        self.writer
            .write_event(Event::Empty(Self::element(name, attrs)))?;
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub fn text(&mut self, text: &str) -> Result<()> {
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        Ok(())
    }

    /// `<properties>` block; nothing when empty.
    pub fn properties(&mut self, props: &Properties) -> Result<()> {
        if props.is_empty() {
            return Ok(());
        }
        self.start("properties", &[])?;
        for (name, value) in props.iter() {
            self.empty(
                "property",
                &[("name", name.to_owned()), ("value", value.to_owned())],
            )?;
        }
        self.end("properties")
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_tree_with_text_and_empty_elements() {
        let doc = br#"<?xml version="1.0"?>
            <map width="3"><data encoding="csv">1,2,
            3</data><unknown a="b"/></map>"#;
        let root = XmlElement::parse(doc).unwrap();
        assert_eq!(root.name, "map");
        assert_eq!(root.parse_required::<i32>("width").unwrap(), 3);
        let data = root.child("data").unwrap();
        assert_eq!(data.attr("encoding"), Some("csv"));
        assert!(data.text.contains('3'));
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn bad_attribute_names_element() {
        let root = XmlElement::parse(br#"<layer width="wide"/>"#).unwrap();
        match root.parse_required::<i32>("width") {
            Err(MapError::InvalidAttribute { element, value, .. }) => {
                assert_eq!(element, "layer");
                assert_eq!(value, "wide");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            root.parse_required::<i32>("height"),
            Err(MapError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn emitter_escapes_attribute_values() {
        let mut out = XmlOut::new().unwrap();
        out.empty("property", &[("name", "a&b".to_owned())]).unwrap();
        let text = String::from_utf8(out.into_bytes()).unwrap();
        assert!(text.contains("a&amp;b"));
        let root = XmlElement::parse(text.as_bytes()).unwrap();
        assert_eq!(root.attr("name"), Some("a&b"));
    }
}
