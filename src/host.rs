//! Interfaces to the wiki that hosts the converter.
//!
//! Conversion itself never touches storage. Include expansion and link
//! rewriting call out through the [`Host`] trait: item lookup, item name
//! enumeration, the inter-wiki map and the read permission check.
//! [`MemoryHost`] is an in-memory implementation used by the command line
//! tool and by tests.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;

use crate::iri::IriComponent;

/// Metadata key holding an item's content type.
pub const META_CONTENTTYPE: &str = "contenttype";

/// A single stored revision.
#[derive(Debug, Clone, Default)]
pub struct Revision {
    pub revno: i64,
    data: Vec<u8>,
    meta: BTreeMap<String, String>,
}

impl Revision {
    pub fn new(revno: i64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            revno,
            data: data.into(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn read(&self) -> &[u8] {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.meta.get(key).map(String::as_str)
    }

    /// Content type from metadata, defaulting to Moin-wiki markup.
    pub fn content_type(&self) -> &str {
        self.get(META_CONTENTTYPE).unwrap_or("text/x.moin.wiki")
    }
}

/// A named item with its revision history.
#[derive(Debug, Clone, Default)]
pub struct Item {
    pub name: String,
    revisions: BTreeMap<i64, Revision>,
}

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revisions: BTreeMap::new(),
        }
    }

    pub fn add_revision(&mut self, revision: Revision) {
        self.revisions.insert(revision.revno, revision);
    }

    pub fn list_revisions(&self) -> Vec<i64> {
        self.revisions.keys().copied().collect()
    }

    /// A revision by number; `-1` is the latest.
    pub fn get_revision(&self, revno: i64) -> Option<&Revision> {
        if revno == -1 {
            self.revisions.values().next_back()
        } else {
            self.revisions.get(&revno)
        }
    }
}

/// Result of an inter-wiki lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterwikiTarget {
    /// URL template; `$PAGE` marks where the page name goes.
    pub url: String,
    /// Page part to insert into the template.
    pub page: String,
    /// The wiki name was unknown; `url`/`page` point at the local help page.
    pub error: bool,
}

impl InterwikiTarget {
    /// Fill the template with the URL-quoted page name.
    pub fn join(&self) -> String {
        let tail = IriComponent::Path.url_quote(&self.page);
        if self.url.contains("$PAGE") {
            self.url.replace("$PAGE", &tail)
        } else {
            format!("{}{}", self.url, tail)
        }
    }
}

/// Services the converter needs from the wiki.
pub trait Host {
    fn get_item(&self, name: &str) -> Option<Item>;

    /// Item names, optionally restricted to those matching `filter`.
    fn list_item_names(&self, filter: Option<&Regex>) -> Vec<String>;

    fn resolve_interwiki(&self, wiki: &str, page: &str) -> InterwikiTarget;

    fn may_read(&self, name: &str) -> bool;
}

/// The classic `intermap.txt` table of wiki names to URL templates.
#[derive(Debug, Clone, Default)]
pub struct InterwikiMap {
    entries: BTreeMap<String, String>,
    /// This wiki's own inter-wiki name, resolved like `Self`.
    pub own_name: Option<String>,
}

impl InterwikiMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `Name URL` lines; blank lines and `#` comments are ignored.
    pub fn parse(text: &str) -> Self {
        let mut map = Self::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            if let (Some(name), Some(url)) = (parts.next(), parts.next()) {
                map.entries.insert(name.to_string(), url.to_string());
            }
        }
        map
    }

    pub fn with_entry(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.entries.insert(name.into(), url.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    /// Whether `name` refers to this wiki.
    pub fn is_self(&self, name: &str) -> bool {
        name == "Self" || self.own_name.as_deref() == Some(name)
    }

    /// Look up `wiki`; unknown names resolve to the local `InterWiki` page.
    pub fn resolve(&self, wiki: &str, page: &str, script_root: &str) -> InterwikiTarget {
        let local = format!("{}/", script_root.trim_end_matches('/'));
        if self.is_self(wiki) {
            return InterwikiTarget {
                url: local,
                page: page.to_string(),
                error: false,
            };
        }
        match self.get(wiki) {
            Some(url) => InterwikiTarget {
                url: url.to_string(),
                page: page.to_string(),
                error: false,
            },
            None => InterwikiTarget {
                url: local,
                page: "InterWiki".to_string(),
                error: true,
            },
        }
    }
}

/// Split `Wiki:Page` into its parts; names without a colon belong to `Self`.
pub fn split_interwiki(wikiurl: &str) -> (&str, &str) {
    wikiurl.split_once(':').unwrap_or(("Self", wikiurl))
}

/// In-memory wiki.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    items: BTreeMap<String, Item>,
    denied: HashSet<String>,
    interwiki: InterwikiMap,
    script_root: String,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page as a new latest revision.
    pub fn with_page(mut self, name: &str, content_type: &str, text: &str) -> Self {
        self.add_page(name, content_type, text);
        self
    }

    pub fn add_page(&mut self, name: &str, content_type: &str, text: &str) {
        let item = self
            .items
            .entry(name.to_string())
            .or_insert_with(|| Item::new(name));
        let revno = item.list_revisions().last().map_or(0, |r| r + 1);
        item.add_revision(
            Revision::new(revno, text.as_bytes()).with_meta(META_CONTENTTYPE, content_type),
        );
    }

    pub fn with_interwiki(mut self, map: InterwikiMap) -> Self {
        self.interwiki = map;
        self
    }

    pub fn with_script_root(mut self, root: impl Into<String>) -> Self {
        self.script_root = root.into();
        self
    }

    /// Refuse read access to `name`.
    pub fn deny(mut self, name: &str) -> Self {
        self.denied.insert(name.to_string());
        self
    }
}

impl Host for MemoryHost {
    fn get_item(&self, name: &str) -> Option<Item> {
        self.items.get(name).cloned()
    }

    fn list_item_names(&self, filter: Option<&Regex>) -> Vec<String> {
        self.items
            .keys()
            .filter(|name| filter.is_none_or(|re| re.is_match(name)))
            .cloned()
            .collect()
    }

    fn resolve_interwiki(&self, wiki: &str, page: &str) -> InterwikiTarget {
        self.interwiki.resolve(wiki, page, &self.script_root)
    }

    fn may_read(&self, name: &str) -> bool {
        !self.denied.contains(name)
    }
}
