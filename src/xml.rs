//! A small owned XML element tree.
//!
//! KML conversion needs to look things up by path (`ExtendedData/Data`), walk
//! every `Placemark` at any depth, and edit the tree in place before writing
//! it back out. [`Element`] keeps just enough for that: a name, attributes,
//! text and child elements. Mixed content (text interleaved with children) is
//! collapsed into a single text value, and comments and processing
//! instructions are dropped. Leaf text keeps its surrounding whitespace.
//!
//! Names are matched on their local part, so `kml:Placemark` and `Placemark`
//! are the same element for lookups, while the full name is written back.
use std::io::Write;

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};

use crate::error::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<Element>,
}

fn local(name: &str) -> &str {
    name.rsplit_once(':').map_or(name, |(_, local)| local)
}

impl Element {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    #[must_use]
    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    #[must_use]
    pub fn local_name(&self) -> &str {
        local(&self.name)
    }

    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.local_name() == name
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| local(k) == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.attributes.push((key, value)),
        }
    }

    /// Appends a child and returns a handle to it.
    pub fn push(&mut self, child: Element) -> &mut Element {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(name))
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find(|c| c.is(name))
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.is(name))
    }

    /// First element matching a `/`-separated path of child names.
    #[must_use]
    pub fn find(&self, path: &str) -> Option<&Element> {
        path.split('/')
            .try_fold(self, |element, name| element.child(name))
    }

    pub fn find_mut(&mut self, path: &str) -> Option<&mut Element> {
        path.split('/')
            .try_fold(self, |element, name| element.child_mut(name))
    }

    /// Every element matching a `/`-separated path, in document order.
    #[must_use]
    pub fn find_all(&self, path: &str) -> Vec<&Element> {
        path.split('/').fold(vec![self], |current, name| {
            current
                .into_iter()
                .flat_map(|element| element.children.iter().filter(move |c| c.is(name)))
                .collect()
        })
    }

    /// Text of the first element matching `path`; `None` when the element is
    /// missing or has no text.
    #[must_use]
    pub fn find_text(&self, path: &str) -> Option<&str> {
        self.find(path).and_then(|element| element.text.as_deref())
    }

    /// Every descendant with the given name, in document order.
    #[must_use]
    pub fn descendants(&self, name: &str) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect_descendants(name, &mut found);
        found
    }

    fn collect_descendants<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.is(name) {
                found.push(child);
            }
            child.collect_descendants(name, found);
        }
    }

    /// Calls `f` on every descendant with the given name, in document order.
    /// Matching elements are not searched further.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first error raised by `f`.
    pub fn for_each_descendant_mut<F>(&mut self, name: &str, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Element) -> Result<()>,
    {
        for child in &mut self.children {
            if child.is(name) {
                f(child)?;
            } else {
                child.for_each_descendant_mut(name, f)?;
            }
        }
        Ok(())
    }

    /// Parses a document and returns its root element.
    ///
    /// # Errors
    ///
    /// Fails on malformed XML, on unbalanced tags and on input without a root.
    pub fn parse(text: &str) -> Result<Element> {
        let mut reader = Reader::from_str(text);

        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => stack.push(Element::from_start(&e)?),
                Event::Empty(e) => {
                    let element = Element::from_start(&e)?;
                    attach(&mut stack, &mut root, element);
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| Error::Message("unbalanced end tag".to_string()))?;
                    drop_indentation(&mut element);
                    attach(&mut stack, &mut root, element);
                }
                Event::Text(e) => {
                    if let Some(top) = stack.last_mut() {
                        append_text(top, &e.unescape()?);
                    }
                }
                Event::CData(e) => {
                    if let Some(top) = stack.last_mut() {
                        append_text(top, &String::from_utf8(e.into_inner().into_owned())?);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(Error::Message(format!("unclosed element <{}>", open.name)));
        }
        root.ok_or_else(|| Error::Message("document has no root element".to_string()))
    }

    fn from_start(start: &BytesStart) -> Result<Element> {
        let mut element = Element::new(String::from_utf8(start.name().as_ref().to_vec())?);
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8(attr.key.as_ref().to_vec())?;
            let value = attr.unescape_value()?.into_owned();
            element.attributes.push((key, value));
        }
        Ok(element)
    }

    /// Serializes the tree with an XML declaration, indenting by two spaces
    /// when `pretty` is set.
    ///
    /// # Errors
    ///
    /// Fails if the writer rejects an event.
    pub fn to_xml(&self, pretty: bool) -> Result<String> {
        let mut writer = if pretty {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        self.write(&mut writer)?;
        Ok(String::from_utf8(writer.into_inner())?)
    }

    fn write<W: Write>(&self, writer: &mut Writer<W>) -> Result<()> {
        let mut start = BytesStart::new(self.name.as_str());
        for (key, value) in &self.attributes {
            start.push_attribute((key.as_str(), value.as_str()));
        }

        if self.text.is_none() && self.children.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        writer.write_event(Event::Start(start))?;
        if let Some(text) = &self.text {
            writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        for child in &self.children {
            child.write(writer)?;
        }
        writer.write_event(Event::End(BytesEnd::new(self.name.as_str())))?;
        Ok(())
    }
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Whitespace between child elements is layout, not content. Text of leaf
/// elements is kept as is.
fn drop_indentation(element: &mut Element) {
    let blank = element.text.as_deref().is_some_and(|t| t.trim().is_empty());
    if blank && !element.children.is_empty() {
        element.text = None;
    }
}

fn append_text(element: &mut Element, text: &str) {
    match &mut element.text {
        Some(existing) => existing.push_str(text),
        None => element.text = Some(text.to_string()),
    }
}
