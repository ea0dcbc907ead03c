//! Internationalized resource identifiers.
//!
//! An [`Iri`] stores every component in its logical (unquoted, unicode)
//! form. Rendering applies per-component quoting: [`Iri::to_string`] keeps
//! non-ASCII characters as they are (the RFC 3987 "fully quoted" form),
//! while [`Iri::url_quoted`] also percent-encodes them as UTF-8 bytes so the
//! result is a plain ASCII URI.
//!
//! # Example
//!
//! ```
//! use wikiconv::iri::Iri;
//!
//! let iri = Iri::parse("wiki://MoinMoin/StartSeite?action=raw#body");
//! assert_eq!(iri.scheme.as_deref(), Some("wiki"));
//! assert_eq!(iri.authority.as_deref(), Some("MoinMoin"));
//! assert_eq!(iri.path.as_deref(), Some("/StartSeite"));
//! assert_eq!(iri.to_string(), "wiki://MoinMoin/StartSeite?action=raw#body");
//! ```

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use regex::Regex;

static IRI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^(?:([^:/?#]+):)?(?://([^/?#]*))?([^?#]+)?(?:\?([^#]*))?(?:#(.*))?")
        .expect("IRI pattern is valid")
});

/// Characters that are never safe in any component.
const BASE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Path: sub-delims plus `:@/` stay literal.
const PATH: &AsciiSet = &BASE.add(b'?');

/// Authority: like path, but `/` must be escaped.
const AUTHORITY: &AsciiSet = &PATH.add(b'/');

/// Query and fragment additionally allow `?`.
const QUERY: &AsciiSet = BASE;

/// First path segment of a relative reference without scheme, where `:`
/// would otherwise be read back as a scheme delimiter.
const PATH_NOSCHEME: &AsciiSet = &PATH.add(b':');

/// The five IRI components, each with its own quoting rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IriComponent {
    Authority,
    Path,
    Query,
    Fragment,
}

impl IriComponent {
    fn ascii_set(self) -> &'static AsciiSet {
        match self {
            IriComponent::Authority => AUTHORITY,
            IriComponent::Path => PATH,
            IriComponent::Query | IriComponent::Fragment => QUERY,
        }
    }

    /// Quote `value` for this component, leaving non-ASCII characters intact.
    pub fn quote(self, value: &str) -> String {
        quote_iri(value, self.ascii_set())
    }

    /// Quote `value` for this component as a plain URI (UTF-8 percent escapes).
    pub fn url_quote(self, value: &str) -> String {
        utf8_percent_encode(value, self.ascii_set()).to_string()
    }
}

/// Percent-encode only the ASCII characters in `set`; other code points pass.
fn quote_iri(value: &str, set: &'static AsciiSet) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while !rest.is_empty() {
        let split = rest.find(|c: char| !c.is_ascii()).unwrap_or(rest.len());
        let (ascii, tail) = rest.split_at(split);
        out.extend(utf8_percent_encode(ascii, set));
        let unicode_len = tail
            .find(|c: char| c.is_ascii())
            .unwrap_or(tail.len());
        out.push_str(&tail[..unicode_len]);
        rest = &tail[unicode_len..];
    }
    out
}

/// Decode `%HH` escapes, leaving malformed sequences as literal text.
pub fn unquote(value: &str) -> Cow<'_, str> {
    percent_decode_str(value).decode_utf8_lossy()
}

/// Parsed IRI with logical component values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Iri {
    pub scheme: Option<String>,
    pub authority: Option<String>,
    pub path: Option<String>,
    pub query: Option<String>,
    pub fragment: Option<String>,
}

impl Iri {
    /// Parse an IRI string. Never fails: unmatched parts are simply absent.
    pub fn parse(input: &str) -> Self {
        let Some(caps) = IRI_RE.captures(input) else {
            return Self::default();
        };
        let component = |i: usize| caps.get(i).map(|m| unquote(m.as_str()).into_owned());
        Self {
            scheme: caps.get(1).map(|m| m.as_str().to_lowercase()),
            authority: component(2),
            path: component(3),
            query: component(4),
            fragment: component(5),
        }
    }

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    /// Scheme as a plain string slice, empty when absent.
    pub fn scheme_str(&self) -> &str {
        self.scheme.as_deref().unwrap_or("")
    }

    /// Path as a plain string slice, empty when absent.
    pub fn path_str(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }

    /// Render as an ASCII-only URI.
    pub fn url_quoted(&self) -> String {
        self.render(true)
    }

    fn render(&self, ascii: bool) -> String {
        let quote = |component: IriComponent, value: &str| {
            if ascii {
                component.url_quote(value)
            } else {
                component.quote(value)
            }
        };

        let mut out = String::new();
        if let Some(scheme) = &self.scheme {
            out.push_str(scheme);
            out.push(':');
        }
        if let Some(authority) = &self.authority {
            out.push_str("//");
            out.push_str(&quote(IriComponent::Authority, authority));
        }
        if let Some(path) = &self.path {
            out.push_str(&self.render_path(path, ascii));
        }
        if let Some(query) = &self.query {
            out.push('?');
            out.push_str(&quote(IriComponent::Query, query));
        }
        if let Some(fragment) = &self.fragment {
            out.push('#');
            out.push_str(&quote(IriComponent::Fragment, fragment));
        }
        out
    }

    /// Quote the path, escaping the characters that would be re-read as
    /// component delimiters when no scheme or authority precedes them.
    fn render_path(&self, path: &str, ascii: bool) -> String {
        let encode = |value: &str, set: &'static AsciiSet| {
            if ascii {
                utf8_percent_encode(value, set).to_string()
            } else {
                quote_iri(value, set)
            }
        };

        if self.authority.is_none() && path.starts_with("//") {
            return format!("%2F{}", encode(&path[1..], PATH));
        }
        if self.scheme.is_none() && self.authority.is_none() {
            let end = path.find('/').unwrap_or(path.len());
            let (first, rest) = path.split_at(end);
            if first.contains(':') {
                return format!("{}{}", encode(first, PATH_NOSCHEME), encode(rest, PATH));
            }
        }
        encode(path, PATH)
    }

    /// Resolve `reference` against `self` as base (RFC 3986 section 5.2).
    pub fn resolve(&self, reference: &Iri) -> Iri {
        if reference.scheme.is_some() {
            return Iri {
                path: reference.path.as_deref().map(remove_dot_segments),
                ..reference.clone()
            };
        }

        let mut target = Iri {
            scheme: self.scheme.clone(),
            fragment: reference.fragment.clone(),
            ..Iri::default()
        };

        if reference.authority.is_some() {
            target.authority = reference.authority.clone();
            target.path = reference.path.as_deref().map(remove_dot_segments);
            target.query = reference.query.clone();
            return target;
        }

        target.authority = self.authority.clone();
        match reference.path.as_deref() {
            None | Some("") => {
                target.path = self.path.clone();
                target.query = reference.query.clone().or_else(|| self.query.clone());
            }
            Some(path) => {
                let merged = if path.starts_with('/') {
                    path.to_string()
                } else {
                    self.merge_path(path)
                };
                target.path = Some(remove_dot_segments(&merged));
                target.query = reference.query.clone();
            }
        }
        target
    }

    fn merge_path(&self, path: &str) -> String {
        match self.path.as_deref() {
            None | Some("") if self.authority.is_some() => format!("/{path}"),
            Some(base) => match base.rfind('/') {
                Some(idx) => format!("{}{}", &base[..=idx], path),
                None => path.to_string(),
            },
            None => path.to_string(),
        }
    }
}

/// Remove `.` and `..` segments from a path (RFC 3986 section 5.2.4).
pub fn remove_dot_segments(path: &str) -> String {
    let mut input = path;
    let mut output: Vec<&str> = Vec::new();
    let absolute = path.starts_with('/');

    // Segments are tracked with their leading slash so the output can be
    // joined back without guessing.
    while !input.is_empty() {
        if let Some(rest) = input.strip_prefix("../") {
            input = rest;
        } else if let Some(rest) = input.strip_prefix("./") {
            input = rest;
        } else if input.starts_with("/./") {
            input = &input[2..];
        } else if input == "/." {
            input = "/";
        } else if input.starts_with("/../") {
            input = &input[3..];
            output.pop();
        } else if input == "/.." {
            input = "/";
            output.pop();
        } else if input == "." || input == ".." {
            input = "";
        } else {
            let start = usize::from(input.starts_with('/'));
            let end = input[start..]
                .find('/')
                .map(|i| i + start)
                .unwrap_or(input.len());
            output.push(&input[..end]);
            input = &input[end..];
        }
    }

    let mut joined = output.concat();
    if absolute && !joined.starts_with('/') {
        joined.insert(0, '/');
    }
    joined
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(false))
    }
}

impl FromStr for Iri {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Iri::parse(s))
    }
}

impl From<&str> for Iri {
    fn from(s: &str) -> Self {
        Iri::parse(s)
    }
}
