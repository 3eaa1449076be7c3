//! Message envelope handling.
//!
//! Raw report payloads come off the FTP drop either as plain XML or gzip
//! compressed, and concentrator firmwares are inconsistent about encoding:
//! most send UTF-8, older ones send ISO-8859-15. [`parse`] normalizes all
//! of that into an owned element tree.
//!
//! Some firmwares also emit truncated attribute values with raw control
//! characters in them. The decoded text is scanned for those before
//! parsing, and every affected attribute is cut short at the offending
//! character; syntax errors stay fatal.

use encoding_rs::ISO_8859_15;
use flate2::read::GzDecoder;
use lazy_static::lazy_static;
use log::warn;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("xml syntax error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("bad attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("gzip inflate failed: {0}")]
    Gzip(std::io::Error),
    #[error("document has no root element")]
    EmptyDocument,
    #[error("unbalanced element nesting")]
    Unbalanced,
}

/// An owned XML element. Attribute order is not preserved; the decoders
/// only ever look attributes up by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub children: Vec<Node>,
    pub text: String,
}

impl Node {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// First child with the given tag, if any.
    pub fn child(&self, tag: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// All children with the given tag, in document order.
    pub fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children.iter().filter(move |c| c.tag == tag)
    }

    pub fn has_child(&self, tag: &str) -> bool {
        self.child(tag).is_some()
    }
}

lazy_static! {
    // A control character inside an attribute value marks a firmware-side
    // truncation. Everything from it to the closing quote is garbage.
    static ref TRUNCATED_ATTR: Regex =
        Regex::new("[\\x00-\\x08\\x0B-\\x1F\\x7F-\\u{9F}][^\"]*\"").unwrap();
}

/// Parses a raw message payload into an element tree.
pub fn parse(raw: &[u8]) -> Result<Node, MessageError> {
    let bytes = if raw.starts_with(&[0x1f, 0x8b]) {
        let mut inflated = Vec::new();
        GzDecoder::new(raw)
            .read_to_end(&mut inflated)
            .map_err(MessageError::Gzip)?;
        inflated
    } else {
        raw.to_vec()
    };
    let text = decode_text(&bytes);
    if has_control_garbage(&text) {
        warn!("control characters in document, truncating affected attribute values");
        let cleaned = TRUNCATED_ATTR.replace_all(&text, "\"");
        return build_tree(&cleaned);
    }
    build_tree(&text)
}

fn has_control_garbage(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c, '\u{00}'..='\u{08}' | '\u{0B}'..='\u{1F}' | '\u{7F}'..='\u{9F}')
    })
}

fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => ISO_8859_15.decode(bytes).0.into_owned(),
    }
}

fn node_from_start(start: &BytesStart) -> Result<Node, MessageError> {
    let mut node = Node {
        tag: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
        ..Node::default()
    };
    for attribute in start.attributes() {
        let attribute = attribute?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value()?.into_owned();
        node.attributes.insert(key, value);
    }
    Ok(node)
}

fn build_tree(xml: &str) -> Result<Node, MessageError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Node> = Vec::new();
    let mut root: Option<Node> = None;
    loop {
        match reader.read_event()? {
            Event::Start(start) => stack.push(node_from_start(&start)?),
            Event::Empty(start) => {
                let node = node_from_start(&start)?;
                close(&mut stack, &mut root, node)?;
            }
            Event::End(_) => {
                let node = stack.pop().ok_or(MessageError::Unbalanced)?;
                close(&mut stack, &mut root, node)?;
            }
            Event::Text(text) => {
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&text.unescape()?);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    if !stack.is_empty() {
        return Err(MessageError::Unbalanced);
    }
    root.ok_or(MessageError::EmptyDocument)
}

fn close(
    stack: &mut Vec<Node>,
    root: &mut Option<Node>,
    node: Node,
) -> Result<(), MessageError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None if root.is_none() => *root = Some(node),
        None => return Err(MessageError::Unbalanced),
    }
    Ok(())
}
