//! Argument strings of macros, parser directives and table cells.
//!
//! [`ArgParser`] turns a string such as `a, "b c", key=value` into a list
//! of [`Arg`] items and, via [`ArgParser::parse`], into [`Arguments`]:
//! positional values, keyword values in source order, and trailing
//! positional values that follow the first keyword.
//!
//! # Example
//!
//! ```
//! use wikiconv::args::ArgParser;
//!
//! let args = ArgParser::new().parse(r#"one, "two, three", key=v, four"#).unwrap();
//! assert_eq!(args.positional, vec!["one", "two, three"]);
//! assert_eq!(args.keyword, vec![("key".to_string(), "v".to_string())]);
//! assert_eq!(args.trailing, vec!["four"]);
//! ```

use std::fmt;

use crate::error::ArgsError;

/// One parsed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Plain value; `None` when nothing was given between two separators.
    Value(Option<String>),
    /// Unquoted value whose first character was a configured prefix.
    Prefixed { prefix: char, value: Option<String> },
    Keyword { key: String, value: Option<String> },
    /// Bracketed sub-list.
    Group {
        open: char,
        close: char,
        items: Vec<Arg>,
    },
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Value(value) => f.write_str(&quote_if_needed(value.as_deref().unwrap_or(""))),
            Arg::Prefixed { prefix, value } => {
                write!(f, "{prefix}{}", value.as_deref().unwrap_or(""))
            }
            Arg::Keyword { key, value } => {
                write!(f, "{key}={}", quote_if_needed(value.as_deref().unwrap_or("")))
            }
            Arg::Group { open, close, items } => {
                write!(f, "{open}")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "{close}")
            }
        }
    }
}

/// Positional, keyword and trailing arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    pub positional: Vec<String>,
    pub keyword: Vec<(String, String)>,
    pub trailing: Vec<String>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.keyword
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty() && self.trailing.is_empty()
    }

    /// All positional values, leading and trailing.
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.positional
            .iter()
            .chain(self.trailing.iter())
            .map(String::as_str)
    }
}

/// Configurable argument tokenizer.
#[derive(Debug, Clone)]
pub struct ArgParser {
    /// Item separator; `None` splits on runs of whitespace.
    separator: Option<char>,
    name_value: Option<char>,
    brackets: Vec<(char, char)>,
    prefixes: Vec<char>,
    quotes: Vec<char>,
}

impl Default for ArgParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ArgParser {
    /// Comma separated, `key=value`, single or double quotes.
    pub fn new() -> Self {
        Self {
            separator: Some(','),
            name_value: Some('='),
            brackets: Vec::new(),
            prefixes: Vec::new(),
            quotes: vec!['"', '\''],
        }
    }

    /// Whitespace separated, as used by link and parser arguments.
    pub fn wiki() -> Self {
        Self::new().with_separator(None)
    }

    pub fn with_separator(mut self, separator: Option<char>) -> Self {
        self.separator = separator;
        self
    }

    pub fn with_name_value(mut self, name_value: Option<char>) -> Self {
        self.name_value = name_value;
        self
    }

    pub fn with_brackets(mut self, brackets: &[(char, char)]) -> Self {
        self.brackets = brackets.to_vec();
        self
    }

    pub fn with_prefixes(mut self, prefixes: &str) -> Self {
        self.prefixes = prefixes.chars().collect();
        self
    }

    pub fn with_quotes(mut self, quotes: &str) -> Self {
        self.quotes = quotes.chars().collect();
        self
    }

    fn is_separator(&self, c: char) -> bool {
        match self.separator {
            Some(sep) => c == sep,
            None => c == ' ' || c == '\t',
        }
    }

    /// Tokenize `input` into items, keeping bracket groups and prefixes.
    pub fn parse_items(&self, input: &str) -> Result<Vec<Arg>, ArgsError> {
        let chars: Vec<char> = input.chars().collect();
        let mut result: Vec<Arg> = Vec::new();
        let mut groups: Vec<(char, char, Vec<Arg>)> = Vec::new();
        let mut cur = Item::default();
        let mut quoted: Option<char> = None;
        let mut pending_space = String::new();
        let mut open_slot = false;

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if let Some(q) = quoted {
                if c == '\\' && next.is_some_and(|n| n == q || n == '\\') {
                    cur.push(next.unwrap_or(c));
                    i += 1;
                } else if c == q {
                    if next == Some(q) {
                        cur.push(q);
                        i += 1;
                    } else {
                        quoted = None;
                    }
                } else {
                    cur.push(c);
                }
                i += 1;
                continue;
            }

            if self.is_separator(c) {
                pending_space.clear();
                if self.separator.is_none() {
                    // Whitespace runs separate once.
                    if cur.started {
                        result.push(cur.finish());
                        cur = Item::default();
                    }
                } else {
                    if cur.started || !open_slot_after_group(&result, open_slot) {
                        result.push(cur.finish());
                    }
                    cur = Item::default();
                    open_slot = true;
                }
            } else if c == ' ' || c == '\t' {
                if cur.has_text() {
                    pending_space.push(c);
                }
            } else if Some(c) == self.name_value && !cur.has_key {
                pending_space.clear();
                cur.key = Some(cur.value.take().unwrap_or_default());
                cur.has_key = true;
                cur.noquote = false;
                cur.started = true;
            } else if self.quotes.contains(&c) && !cur.noquote {
                quoted = Some(c);
                cur.value.get_or_insert_with(String::new);
                cur.started = true;
            } else if let Some(&(open, close)) = self.brackets.iter().find(|(o, _)| *o == c) {
                pending_space.clear();
                if cur.started {
                    result.push(cur.finish());
                }
                cur = Item::default();
                groups.push((open, close, std::mem::take(&mut result)));
                open_slot = false;
            } else if self.brackets.iter().any(|(_, close)| *close == c) {
                pending_space.clear();
                if cur.started {
                    result.push(cur.finish());
                }
                cur = Item::default();
                match groups.pop() {
                    Some((open, close, outer)) if close == c => {
                        let items = std::mem::replace(&mut result, outer);
                        result.push(Arg::Group { open, close, items });
                        open_slot = false;
                    }
                    _ => return Err(ArgsError::UnexpectedClose(c)),
                }
            } else if self.prefixes.contains(&c) && !cur.started {
                cur.prefix = Some(c);
                cur.started = true;
            } else {
                if !pending_space.is_empty() {
                    cur.push_str(&pending_space);
                    pending_space.clear();
                }
                cur.push(c);
                cur.noquote = true;
                cur.started = true;
            }
            i += 1;
        }

        if let Some((_, close, _)) = groups.last() {
            return Err(ArgsError::MissingClose(*close));
        }

        if let Some(q) = quoted {
            // Unterminated quote: keep the quote character as literal text.
            log::debug!("unterminated {q} in argument string {input:?}");
            let value = cur.value.take().unwrap_or_default();
            cur.value = Some(format!("{q}{value}"));
        }

        if cur.started || open_slot {
            result.push(cur.finish());
        }
        Ok(result)
    }

    /// Parse into positional, keyword and trailing values.
    pub fn parse(&self, input: &str) -> Result<Arguments, ArgsError> {
        let mut args = Arguments::new();
        for item in self.parse_items(input)? {
            match item {
                Arg::Keyword { key, value } => {
                    args.keyword.push((key, value.unwrap_or_default()));
                }
                Arg::Value(value) => {
                    let value = value.unwrap_or_default();
                    if args.keyword.is_empty() {
                        args.positional.push(value);
                    } else {
                        args.trailing.push(value);
                    }
                }
                other => {
                    let value = other.to_string();
                    if args.keyword.is_empty() {
                        args.positional.push(value);
                    } else {
                        args.trailing.push(value);
                    }
                }
            }
        }
        Ok(args)
    }

    /// Render arguments back into a string this parser reads identically.
    pub fn unparse(&self, args: &Arguments) -> String {
        let mut parts = Vec::new();
        for value in &args.positional {
            parts.push(self.quote(value));
        }
        for (key, value) in &args.keyword {
            let nv = self.name_value.unwrap_or('=');
            parts.push(format!("{}{nv}{}", self.quote(key), self.quote(value)));
        }
        for value in &args.trailing {
            parts.push(self.quote(value));
        }
        let joiner = match self.separator {
            Some(sep) => format!("{sep} "),
            None => " ".to_string(),
        };
        parts.join(&joiner)
    }

    fn quote(&self, value: &str) -> String {
        let starts_with_prefix = value
            .chars()
            .next()
            .is_some_and(|c| self.prefixes.contains(&c));
        if starts_with_prefix {
            quote_string(value)
        } else {
            quote_if_needed(value)
        }
    }
}

fn open_slot_after_group(result: &[Arg], open_slot: bool) -> bool {
    !open_slot && matches!(result.last(), Some(Arg::Group { .. }))
}

/// Wrap in double quotes, escaping `"` and `\` with a backslash.
pub fn quote_string(value: &str) -> String {
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

fn quote_if_needed(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        value.to_string()
    } else {
        quote_string(value)
    }
}

#[derive(Debug, Default)]
struct Item {
    key: Option<String>,
    value: Option<String>,
    prefix: Option<char>,
    has_key: bool,
    noquote: bool,
    started: bool,
}

impl Item {
    fn push(&mut self, c: char) {
        self.value.get_or_insert_with(String::new).push(c);
    }

    fn push_str(&mut self, s: &str) {
        self.value.get_or_insert_with(String::new).push_str(s);
    }

    fn has_text(&self) -> bool {
        self.value.as_ref().is_some_and(|v| !v.is_empty())
    }

    fn finish(self) -> Arg {
        match (self.key, self.prefix) {
            (Some(key), _) => Arg::Keyword {
                key,
                value: self.value,
            },
            (None, Some(prefix)) => Arg::Prefixed {
                prefix,
                value: self.value,
            },
            (None, None) => Arg::Value(self.value),
        }
    }
}
