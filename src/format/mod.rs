//! Reading and writing of the XML files found in Maven and Ivy repositories.

use quick_xml::{
    events::{attributes::AttrError, BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};
use thiserror::Error;

use crate::model::ParseError;

pub mod ivy;
pub mod metadata;
pub mod pom;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML attribute error: {0}")]
    Attribute(#[from] AttrError),
    #[error("Document is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("Missing element `{0}`")]
    Missing(String),
    #[error("Invalid value `{1}` for `{0}`")]
    InvalidValue(String, String),
    #[error("Invalid coordinate in document: {0}")]
    Coordinate(#[from] ParseError),
}

/// A parsed XML element. Element names are local names, attribute keys are kept as written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn parse(bytes: &[u8]) -> Result<Element, FormatError> {
        let content = std::str::from_utf8(bytes)?;
        let mut reader = Reader::from_str(content);
        reader.trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;
        loop {
            match reader.read_event()? {
                Event::Start(start) => stack.push(Element::from_start(&start)?),
                Event::Empty(start) => {
                    let element = Element::from_start(&start)?;
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
                        current
                            .text
                            .push_str(std::str::from_utf8(&data.into_inner())?);
                    }
                }
                Event::End(_) => {
                    if let Some(element) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(element),
                            None => root = Some(element),
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }
        root.ok_or_else(|| FormatError::Missing("root element".to_string()))
    }

    fn from_start(start: &BytesStart) -> Result<Element, FormatError> {
        let name = std::str::from_utf8(start.local_name().as_ref())?.to_string();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute?;
            let key = std::str::from_utf8(attribute.key.as_ref())?.to_string();
            let value = attribute.unescape_value()?.into_owned();
            attributes.push((key, value));
        }
        Ok(Element {
            name,
            attributes,
            children: Vec::new(),
            text: String::new(),
        })
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Text of a direct child, if present and not blank.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key || k.rsplit(':').next() == Some(key))
            .map(|(_, v)| v.as_str())
    }
}

/// Thin layer over the quick-xml writer producing indented documents.
pub(crate) struct XmlWriter {
    writer: Writer<Vec<u8>>,
}

impl XmlWriter {
    pub fn new() -> Result<Self, FormatError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(XmlWriter { writer })
    }

    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), FormatError> {
        let mut start = BytesStart::new(name);
        for attribute in attributes {
            start.push_attribute(*attribute);
        }
        self.writer.write_event(Event::Start(start))?;
        Ok(())
    }

    pub fn end(&mut self, name: &str) -> Result<(), FormatError> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), FormatError> {
        let mut start = BytesStart::new(name);
        for attribute in attributes {
            start.push_attribute(*attribute);
        }
        self.writer.write_event(Event::Empty(start))?;
        Ok(())
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> Result<(), FormatError> {
        self.writer
            .write_event(Event::Start(BytesStart::new(name)))?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    pub fn optional_text_element(
        &mut self,
        name: &str,
        text: Option<&str>,
    ) -> Result<(), FormatError> {
        match text {
            Some(text) => self.text_element(name, text),
            None => Ok(()),
        }
    }

    pub fn finish(self) -> String {
        let mut bytes = self.writer.into_inner();
        bytes.push(b'\n');
        match String::from_utf8(bytes) {
            Ok(document) => document,
            Err(error) => String::from_utf8_lossy(error.as_bytes()).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn parse_nested_elements() {
        let document = br#"<?xml version="1.0"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <!-- comment -->
  <artifactId>core</artifactId>
  <dependencies>
    <dependency><artifactId>a &amp; b</artifactId></dependency>
    <dependency><artifactId><![CDATA[c]]></artifactId></dependency>
  </dependencies>
  <empty attr="1"/>
</project>"#;
        let root = Element::parse(document).unwrap();
        assert_eq!(root.name, "project");
        assert_eq!(root.child_text("artifactId"), Some("core"));
        let names = root
            .child("dependencies")
            .unwrap()
            .children("dependency")
            .filter_map(|d| d.child_text("artifactId"))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a & b", "c"]);
        assert_eq!(root.child("empty").unwrap().attribute("attr"), Some("1"));
    }

    #[test]
    fn namespaced_attributes_match_local_key() {
        let root = Element::parse(br#"<artifact name="a" e:classifier="sources"/>"#).unwrap();
        assert_eq!(root.attribute("classifier"), Some("sources"));
        assert_eq!(root.attribute("e:classifier"), Some("sources"));
    }

    #[test]
    fn write_indented_document() {
        let mut writer = XmlWriter::new().unwrap();
        writer.start("metadata", &[("modelVersion", "1.1.0")]).unwrap();
        writer.text_element("groupId", "com.acme").unwrap();
        writer.start("versioning", &[]).unwrap();
        writer.text_element("latest", "1.0").unwrap();
        writer.end("versioning").unwrap();
        writer.end("metadata").unwrap();
        assert_eq!(
            writer.finish(),
            r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata modelVersion="1.1.0">
  <groupId>com.acme</groupId>
  <versioning>
    <latest>1.0</latest>
  </versioning>
</metadata>
"#
        );
    }

    #[test]
    fn missing_root() {
        assert!(matches!(
            Element::parse(b"<?xml version=\"1.0\"?>"),
            Err(FormatError::Missing(_))
        ));
    }
}
