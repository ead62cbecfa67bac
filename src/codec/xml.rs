//! Minimal element tree built from `quick-xml` events.
//!
//! Both XML-RPC and LLSD-XML are small, attribute-light vocabularies, so a
//! tiny owned tree is simpler to walk than a streaming state machine.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

/// Error parsing an XML document into an [`XmlNode`] tree.
#[derive(Debug, Error, PartialEq)]
pub enum XmlError {
    #[error("malformed xml: {0}")]
    Syntax(String),

    #[error("document has no root element")]
    Empty,

    #[error("unexpected closing tag </{0}>")]
    UnbalancedClose(String),

    #[error("unclosed element <{0}>")]
    Unclosed(String),

    #[error("elements nested deeper than {MAX_DEPTH}")]
    TooDeep,
}

/// Deepest element nesting accepted. Value decoding recurses per level.
pub const MAX_DEPTH: usize = 128;

/// An element with its attributes, child elements and text content.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    /// Concatenated character data directly inside this element.
    pub text: String,
}

impl XmlNode {
    fn new(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// First child element with the given name.
    pub fn child(&self, name: &str) -> Option<&XmlNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Value of the named attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Parse a document and return its root element.
pub fn parse_document(input: &str) -> Result<XmlNode, XmlError> {
    let mut reader = Reader::from_str(input);
    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::TooDeep);
                }
                let mut node = XmlNode::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                for attr in start.attributes() {
                    let attr = attr.map_err(|e| XmlError::Syntax(e.to_string()))?;
                    let value = attr
                        .unescape_value()
                        .map_err(|e| XmlError::Syntax(e.to_string()))?;
                    node.attributes.push((
                        String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                        value.into_owned(),
                    ));
                }
                stack.push(node);
            }
            Ok(Event::Empty(empty)) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::TooDeep);
                }
                let node = XmlNode::new(String::from_utf8_lossy(empty.name().as_ref()).into_owned());
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::End(end)) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                let node = stack
                    .pop()
                    .ok_or_else(|| XmlError::UnbalancedClose(name.clone()))?;
                if node.name != name {
                    return Err(XmlError::UnbalancedClose(name));
                }
                attach(&mut stack, &mut root, node)?;
            }
            Ok(Event::Text(text)) => {
                if let Some(current) = stack.last_mut() {
                    let text = text.unescape().map_err(|e| XmlError::Syntax(e.to_string()))?;
                    current.text.push_str(&text);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(XmlError::Syntax(e.to_string())),
        }
    }

    if let Some(open) = stack.pop() {
        return Err(XmlError::Unclosed(open.name));
    }
    root.ok_or(XmlError::Empty)
}

fn attach(stack: &mut [XmlNode], root: &mut Option<XmlNode>, node: XmlNode) -> Result<(), XmlError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(XmlError::Syntax(format!("second root element <{}>", node.name))),
    }
}

/// Escape text for element content.
pub fn escape(text: &str) -> std::borrow::Cow<'_, str> {
    quick_xml::escape::escape(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_with_text() {
        let root = parse_document(
            r#"<?xml version="1.0"?><a kind="x"><b>one &amp; two</b><c/><d><![CDATA[<raw>]]></d></a>"#,
        )
        .unwrap();
        assert_eq!(root.name, "a");
        assert_eq!(root.attribute("kind"), Some("x"));
        assert_eq!(root.child("b").unwrap().text, "one & two");
        assert!(root.child("c").unwrap().children.is_empty());
        assert_eq!(root.child("d").unwrap().text, "<raw>");
    }

    #[test]
    fn test_rejects_unbalanced() {
        assert!(parse_document("<a><b></a>").is_err());
        assert!(parse_document("<a>").is_err());
        assert_eq!(parse_document("   ").unwrap_err(), XmlError::Empty);
    }

    #[test]
    fn test_depth_limit() {
        let nested = |depth: usize| format!("{}{}", "<a>".repeat(depth), "</a>".repeat(depth));
        assert!(parse_document(&nested(MAX_DEPTH)).is_ok());
        assert_eq!(parse_document(&nested(MAX_DEPTH + 1)).unwrap_err(), XmlError::TooDeep);
        assert_eq!(parse_document(&nested(20_000)).unwrap_err(), XmlError::TooDeep);
        assert_eq!(
            parse_document(&format!("{}<b/>{}", "<a>".repeat(MAX_DEPTH), "</a>".repeat(MAX_DEPTH))).unwrap_err(),
            XmlError::TooDeep
        );
    }
}
