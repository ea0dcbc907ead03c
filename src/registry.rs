//! Converter registry.
//!
//! Converters are registered as factories keyed by the content type they
//! accept and the content type they produce. Lookup walks the entries in
//! priority order (lowest value first, registration order among equals) and
//! picks the first one whose input type is a supertype of the requested
//! input and whose output type equals the requested output.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::host::Host;
use crate::mime::Type;
use crate::tree::{Element, read_tree, write_tree};

/// Lookup priority; lower values are tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    pub const REALLY_FIRST: Priority = Priority(-20);
    pub const FIRST: Priority = Priority(-10);
    pub const MIDDLE: Priority = Priority(0);
    pub const LAST: Priority = Priority(10);
    pub const REALLY_LAST: Priority = Priority(20);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::MIDDLE
    }
}

/// Data flowing between pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
    Tree(Element),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Bytes(_) => "bytes",
            Payload::Tree(_) => "tree",
        }
    }

    /// Text content; bytes are decoded with encoding detection.
    pub fn into_text(self) -> Result<String> {
        match self {
            Payload::Text(text) => Ok(text),
            Payload::Bytes(bytes) => Ok(crate::util::decode_text(&bytes, None).into_owned()),
            Payload::Tree(_) => Err(Error::WrongPayload {
                expected: "text",
                found: "tree",
            }),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Payload::Text(text) => Ok(text.into_bytes()),
            Payload::Bytes(bytes) => Ok(bytes),
            Payload::Tree(tree) => Ok(write_tree(&tree).into_bytes()),
        }
    }

    /// Tree content; serialized trees are parsed back.
    pub fn into_tree(self) -> Result<Element> {
        match self {
            Payload::Tree(tree) => Ok(tree),
            Payload::Text(text) => read_tree(&text),
            Payload::Bytes(bytes) => read_tree(&crate::util::decode_text(&bytes, None)),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<Element> for Payload {
    fn from(tree: Element) -> Self {
        Payload::Tree(tree)
    }
}

/// Everything a stage may consult besides its input.
pub struct ConvertContext<'a> {
    pub registry: &'a Registry,
    pub host: &'a dyn Host,
    pub options: &'a crate::pipeline::ConvertOptions,
}

/// One conversion stage.
pub trait Converter {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload>;
}

/// Builds a converter for the concrete (input, output) pair requested.
pub type Factory = Arc<dyn Fn(&Type, &Type) -> Box<dyn Converter> + Send + Sync>;

#[derive(Clone)]
struct Entry {
    priority: Priority,
    factory: Factory,
    input: Type,
    output: Type,
}

/// Priority-ordered table of converter factories.
#[derive(Clone, Default)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(
                self.entries
                    .iter()
                    .map(|e| format!("{:?} {} -> {}", e.priority.0, e.input, e.output)),
            )
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a factory; entries stay sorted by priority, stable on ties.
    pub fn register<F>(&mut self, factory: F, input: Type, output: Type, priority: Priority)
    where
        F: Fn(&Type, &Type) -> Box<dyn Converter> + Send + Sync + 'static,
    {
        let entry = Entry {
            priority,
            factory: Arc::new(factory),
            input,
            output,
        };
        let pos = self
            .entries
            .iter()
            .position(|e| e.priority > priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, entry);
    }

    /// The first matching factory, instantiated for the requested pair.
    pub fn get(&self, input: &Type, output: &Type) -> Option<Box<dyn Converter>> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.input.issupertype(input) && &e.output == output)?;
        log::debug!(
            "converter {} -> {} selected for {input} -> {output}",
            entry.input,
            entry.output
        );
        Some((entry.factory)(input, output))
    }

    /// Like [`Registry::get`] but failing with [`Error::UnknownContentType`].
    pub fn require(&self, input: &Type, output: &Type) -> Result<Box<dyn Converter>> {
        self.get(input, output).ok_or_else(|| Error::UnknownContentType {
            input: input.to_string(),
            output: output.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use crate::mime;
    use crate::pipeline::ConvertOptions;

    struct Tag(&'static str);

    impl Converter for Tag {
        fn convert(&self, _input: Payload, _ctx: &ConvertContext<'_>) -> Result<Payload> {
            Ok(Payload::Text(self.0.to_string()))
        }
    }

    fn run(registry: &Registry, input: &Type, output: &Type) -> Option<String> {
        let host = MemoryHost::new();
        let options = ConvertOptions::default();
        let ctx = ConvertContext {
            registry,
            host: &host,
            options: &options,
        };
        let conv = registry.get(input, output)?;
        conv.convert(Payload::Text(String::new()), &ctx)
            .ok()?
            .into_text()
            .ok()
    }

    #[test]
    fn test_priority_order() {
        let mut registry = Registry::new();
        let doc = mime::moin_document();
        registry.register(|_, _| Box::new(Tag("last")), mime::text_any(), doc.clone(), Priority::LAST);
        registry.register(|_, _| Box::new(Tag("middle")), mime::moin_wiki(), doc.clone(), Priority::MIDDLE);
        registry.register(|_, _| Box::new(Tag("first")), mime::moin_wiki(), doc.clone(), Priority::FIRST);

        assert_eq!(run(&registry, &mime::moin_wiki(), &doc).as_deref(), Some("first"));
        assert_eq!(run(&registry, &mime::csv(), &doc).as_deref(), Some("last"));
    }

    #[test]
    fn test_registration_order_on_ties() {
        let mut registry = Registry::new();
        let doc = mime::moin_document();
        registry.register(|_, _| Box::new(Tag("a")), mime::moin_wiki(), doc.clone(), Priority::MIDDLE);
        registry.register(|_, _| Box::new(Tag("b")), mime::moin_wiki(), doc.clone(), Priority::MIDDLE);
        assert_eq!(run(&registry, &mime::moin_wiki(), &doc).as_deref(), Some("a"));
    }

    #[test]
    fn test_output_must_match_exactly() {
        let mut registry = Registry::new();
        let doc = mime::moin_document();
        registry.register(|_, _| Box::new(Tag("x")), doc.clone(), doc.clone().with_parameter("links", "extern"), Priority::MIDDLE);
        assert!(registry.get(&doc, &doc).is_none());
        let err = registry.require(&mime::moin_wiki(), &doc).err().unwrap();
        assert!(matches!(err, Error::UnknownContentType { .. }));
    }

    #[test]
    fn test_input_parameters_match_by_supertype() {
        let mut registry = Registry::new();
        let doc = mime::moin_document();
        registry.register(|_, _| Box::new(Tag("wiki")), mime::moin_wiki(), doc.clone(), Priority::MIDDLE);
        let with_charset = mime::moin_wiki().with_parameter("charset", "utf-8");
        assert_eq!(run(&registry, &with_charset, &doc).as_deref(), Some("wiki"));
    }

    #[test]
    fn test_payload_conversions() {
        let tree = Element::page("page");
        let text = Payload::Tree(tree.clone()).into_bytes().unwrap();
        assert_eq!(Payload::Bytes(text).into_tree().unwrap(), tree);
        assert!(Payload::Tree(tree).into_text().is_err());
    }
}
