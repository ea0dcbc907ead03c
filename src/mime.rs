//! MIME content types used as pipeline keys.
//!
//! A [`Type`] is `major/subtype` plus parameters. A missing (`*`) major or
//! subtype acts as a wildcard for [`Type::issupertype`], which is how the
//! registry matches generic converters such as the `text/*` fallback.
//!
//! # Example
//!
//! ```
//! use wikiconv::mime::Type;
//!
//! let generic: Type = "text/*".parse().unwrap();
//! let wiki: Type = "text/x.moin.wiki;charset=utf-8".parse().unwrap();
//! assert!(generic.issupertype(&wiki));
//! assert!(!wiki.issupertype(&generic));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Parameter name used to request the link rewriting stage.
pub const PARAM_LINKS: &str = "links";
/// Parameter name used to request include expansion.
pub const PARAM_INCLUDES: &str = "includes";
/// Parameter name used to request search term highlighting.
pub const PARAM_HIGHLIGHT: &str = "highlight";
/// Parameter name used to request macro expansion.
pub const PARAM_MACROS: &str = "macros";
/// Parameter name used to request icon substitution (`icons=smiley`).
pub const PARAM_ICONS: &str = "icons";

/// A MIME type with parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Type {
    /// Major type; `None` matches any.
    pub major: Option<String>,
    /// Subtype; `None` matches any.
    pub subtype: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

impl Type {
    pub fn new(major: &str, subtype: &str) -> Self {
        Self {
            major: wildcard(major),
            subtype: wildcard(subtype),
            parameters: BTreeMap::new(),
        }
    }

    /// Parse `major/sub; key=value; key2="quoted value"`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut parts = split_parameters(input).into_iter();
        let head = parts.next().unwrap_or_default();
        let head = head.trim().to_lowercase();
        let Some((major, subtype)) = head.split_once('/') else {
            return Err(Error::InvalidType(input.to_string()));
        };
        if major.is_empty() || subtype.is_empty() {
            return Err(Error::InvalidType(input.to_string()));
        }

        let mut parsed = Type::new(major.trim(), subtype.trim());
        for param in parts {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let Some((key, value)) = param.split_once('=') else {
                return Err(Error::InvalidType(input.to_string()));
            };
            parsed
                .parameters
                .insert(key.trim().to_lowercase(), unquote_value(value.trim()));
        }
        Ok(parsed)
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// The same type with all parameters dropped.
    pub fn without_parameters(&self) -> Self {
        Self {
            major: self.major.clone(),
            subtype: self.subtype.clone(),
            parameters: BTreeMap::new(),
        }
    }

    /// Whether this type matches `other` as a (possibly wildcard) prefix:
    /// major and subtype are equal or unset here, and every parameter here
    /// is present with the same value in `other`.
    pub fn issupertype(&self, other: &Type) -> bool {
        if let Some(major) = &self.major
            && other.major.as_ref() != Some(major)
        {
            return false;
        }
        if let Some(subtype) = &self.subtype
            && other.subtype.as_ref() != Some(subtype)
        {
            return false;
        }
        self.parameters
            .iter()
            .all(|(k, v)| other.parameters.get(k) == Some(v))
    }

    /// Render back to a header value, quoting parameters where required.
    pub fn content_type(&self) -> String {
        let mut out = format!(
            "{}/{}",
            self.major.as_deref().unwrap_or("*"),
            self.subtype.as_deref().unwrap_or("*")
        );
        for (key, value) in &self.parameters {
            out.push(';');
            out.push_str(key);
            out.push('=');
            out.push_str(&quote_value(value));
        }
        out
    }
}

fn wildcard(part: &str) -> Option<String> {
    if part.is_empty() || part == "*" {
        None
    } else {
        Some(part.to_lowercase())
    }
}

/// Split on `;` outside of double quotes.
fn split_parameters(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for c in input.chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            }
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            ';' if !in_quotes => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn needs_quoting(value: &str) -> bool {
    value.is_empty()
        || value.chars().any(|c| {
            c.is_whitespace()
                || c.is_control()
                || matches!(
                    c,
                    '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']'
                        | '?' | '='
                )
        })
}

fn quote_value(value: &str) -> String {
    if !needs_quoting(value) {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn unquote_value(value: &str) -> String {
    let Some(inner) = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
    else {
        return value.to_string();
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content_type())
    }
}

impl FromStr for Type {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Type::parse(s)
    }
}

/// `application/x.moin.document`, the intermediate tree.
pub fn moin_document() -> Type {
    Type::new("application", "x.moin.document")
}

/// `text/x.moin.wiki`
pub fn moin_wiki() -> Type {
    Type::new("text", "x.moin.wiki")
}

/// `text/x.moin.creole`
pub fn moin_creole() -> Type {
    Type::new("text", "x.moin.creole")
}

/// `text/x-mediawiki`
pub fn mediawiki() -> Type {
    Type::new("text", "x-mediawiki")
}

/// `text/rst`
pub fn rst() -> Type {
    Type::new("text", "rst")
}

/// `application/docbook+xml`
pub fn docbook() -> Type {
    Type::new("application", "docbook+xml")
}

/// `text/x.moin.xhtml`, an HTML page fragment.
pub fn moin_xhtml() -> Type {
    Type::new("text", "x.moin.xhtml")
}

/// `application/xhtml+xml`, a complete HTML document.
pub fn xhtml() -> Type {
    Type::new("application", "xhtml+xml")
}

/// `text/html`
pub fn html() -> Type {
    Type::new("text", "html")
}

/// `text/csv`
pub fn csv() -> Type {
    Type::new("text", "csv")
}

/// `text/plain`
pub fn text_plain() -> Type {
    Type::new("text", "plain")
}

/// `text/*`
pub fn text_any() -> Type {
    Type::new("text", "*")
}

/// `application/zip`
pub fn zip() -> Type {
    Type::new("application", "zip")
}
