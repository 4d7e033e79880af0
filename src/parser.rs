//! Fetch query parser
//!
//! Turns fetch query text into a [`FetchTree`]. Tokenizing is delegated to
//! `quick-xml`; this module only assembles the events into an owned tree
//! and rejects anything that is not a single well-formed document.
//!
//! ```text
//! parse()
//!   ├─ Start  → push a new open element (at most MAX_DEPTH open)
//!   ├─ Empty  → attach a childless element to the open parent
//!   ├─ End    → pop the open element and attach it
//!   ├─ Text   → attach unescaped text (whitespace-only text is dropped)
//!   └─ Eof    → every element must be closed, exactly one root
//! ```

use crate::ast::{Attribute, Element, FetchTree, Node};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Deepest element nesting accepted. Fetch queries are shallow; the tree
/// is dropped, serialized and lowered recursively.
pub const MAX_DEPTH: usize = 256;

/// Malformed fetch query text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    /// Byte offset at which the reader stopped, when known.
    pub position: Option<usize>,
}

impl ParseError {
    fn new(message: String, position: Option<usize>) -> Self {
        Self { message, position }
    }

    fn at_position(message: String, position: usize) -> Self {
        Self {
            message,
            position: Some(position),
        }
    }

    /// Prefixes the message with the name of the saved view the text came from.
    pub fn in_definition(self, name: &str) -> Self {
        Self {
            message: format!("hidden filter '{}': {}", name, self.message),
            position: self.position,
        }
    }
}

/// Parses fetch query text into a tree.
pub fn parse(input: &str) -> Result<FetchTree, ParseError> {
    Parser::new(input).parse()
}

pub struct Parser<'a> {
    reader: Reader<&'a [u8]>,
    /// Currently open elements, innermost last
    open: Vec<Element>,
    root: Option<Element>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        let mut reader = Reader::from_str(input);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            open: Vec::new(),
            root: None,
        }
    }

    fn position(&self) -> usize {
        self.reader.buffer_position() as usize
    }

    pub fn parse(mut self) -> Result<FetchTree, ParseError> {
        loop {
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    return Err(ParseError::at_position(
                        format!("xml error: {}", e),
                        self.position(),
                    ))
                }
            };

            match event {
                Event::Start(ref start) => {
                    if self.open.len() >= MAX_DEPTH {
                        return Err(ParseError::at_position(
                            format!("elements nested deeper than {} levels", MAX_DEPTH),
                            self.position(),
                        ));
                    }
                    let element = self.element_from(start)?;
                    self.open.push(element);
                }
                Event::Empty(ref start) => {
                    let element = self.element_from(start)?;
                    self.attach(element)?;
                }
                Event::End(_) => {
                    let Some(element) = self.open.pop() else {
                        return Err(ParseError::at_position(
                            "closing tag without a matching opening tag".to_string(),
                            self.position(),
                        ));
                    };
                    self.attach(element)?;
                }
                Event::Text(ref text) => {
                    let content = text.unescape().map_err(|e| {
                        ParseError::at_position(format!("invalid text: {}", e), self.position())
                    })?;
                    self.attach_text(content.into_owned())?;
                }
                Event::CData(cdata) => {
                    let content = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                    self.attach_text(content)?;
                }
                Event::Eof => break,
                // 声明、注释、处理指令与 DOCTYPE 不影响查询语义
                _ => {}
            }
        }

        if let Some(unclosed) = self.open.last() {
            return Err(ParseError::new(
                format!("unclosed <{}> element at end of input", unclosed.name),
                Some(self.position()),
            ));
        }

        match self.root {
            Some(root) => Ok(FetchTree::new(root)),
            None => Err(ParseError::new("empty fetch query".to_string(), None)),
        }
    }

    fn element_from(&self, start: &BytesStart<'_>) -> Result<Element, ParseError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut element = Element::new(name);

        for attr in start.attributes() {
            let attr = attr.map_err(|e| {
                ParseError::at_position(
                    format!("invalid attribute on <{}>: {}", element.name, e),
                    self.position(),
                )
            })?;
            let value = attr.unescape_value().map_err(|e| {
                ParseError::at_position(
                    format!("invalid attribute value on <{}>: {}", element.name, e),
                    self.position(),
                )
            })?;
            element.attributes.push(Attribute {
                name: String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                value: value.into_owned(),
            });
        }

        Ok(element)
    }

    fn attach(&mut self, element: Element) -> Result<(), ParseError> {
        if let Some(parent) = self.open.last_mut() {
            parent.children.push(Node::Element(element));
            return Ok(());
        }
        if self.root.is_some() {
            return Err(ParseError::at_position(
                format!("multiple root elements, found a second <{}>", element.name),
                self.position(),
            ));
        }
        self.root = Some(element);
        Ok(())
    }

    fn attach_text(&mut self, text: String) -> Result<(), ParseError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        match self.open.last_mut() {
            Some(parent) => {
                parent.children.push(Node::Text(text));
                Ok(())
            }
            None => Err(ParseError::at_position(
                "text outside of the root element".to_string(),
                self.position(),
            )),
        }
    }
}
