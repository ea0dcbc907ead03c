//! Shared text helpers.

use std::borrow::Cow;

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from a charset parameter)
/// 3. Falls back to Windows-1252 (common for pages saved by old editors)
///
/// # Examples
///
/// ```ignore
/// use wikiconv::util::decode_text;
///
/// assert_eq!(decode_text("Hello, World!".as_bytes(), None), "Hello, World!");
/// assert_eq!(decode_text(b"caf\xe9", None), "café");
/// ```
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Escape text for XML/HTML element content and attribute values.
pub fn escape_xml(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}

/// Resolve an entity reference name (without `&` and `;`).
///
/// Handles the XML predefined entities, numeric references and the
/// handful of HTML entities common in hand-written DocBook.
pub fn resolve_entity(entity: &str) -> Option<String> {
    let named = match entity {
        "apos" => Some('\''),
        "quot" => Some('"'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "nbsp" => Some('\u{a0}'),
        "copy" => Some('©'),
        "reg" => Some('®'),
        "trade" => Some('™'),
        "mdash" => Some('—'),
        "ndash" => Some('–'),
        "hellip" => Some('…'),
        _ => None,
    };
    if let Some(c) = named {
        return Some(c.to_string());
    }

    let code = if let Some(hex) = entity
        .strip_prefix("#x")
        .or_else(|| entity.strip_prefix("#X"))
    {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32).map(|c| c.to_string())
}

/// Length of the longest run of `ch` in `text`.
pub fn longest_run(text: &str, ch: char) -> usize {
    let mut max_run = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == ch {
            current += 1;
            max_run = max_run.max(current);
        } else {
            current = 0;
        }
    }
    max_run
}

/// Calculate the fence length needed to enclose `content`.
///
/// Returns the smallest number of fence characters (at least 3) that is
/// longer than any run of `fence_char` inside the content.
pub fn calculate_fence_length(content: &str, fence_char: char) -> usize {
    (longest_run(content, fence_char) + 1).max(3)
}

/// Replace tabs with spaces up to the next multiple of eight columns.
pub fn expand_tabs(text: &str) -> String {
    if !text.contains('\t') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut column = 0;
    for c in text.chars() {
        match c {
            '\t' => {
                let width = 8 - column % 8;
                out.extend(std::iter::repeat_n(' ', width));
                column += width;
            }
            '\n' => {
                out.push(c);
                column = 0;
            }
            _ => {
                out.push(c);
                column += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_doc_example() {
        assert_eq!(decode_text("Hello, World!".as_bytes(), None), "Hello, World!");
        assert_eq!(decode_text(b"caf\xe9", None), "café");
    }

    #[test]
    fn test_decode_utf8_with_bom() {
        assert_eq!(decode_text(b"\xef\xbb\xbfabc", None), "abc");
    }

    #[test]
    fn test_decode_with_hint() {
        assert_eq!(decode_text(b"\xe4", Some("iso-8859-1")), "ä");
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("<a href=\"x\">&</a>"), "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_resolve_entity() {
        assert_eq!(resolve_entity("amp").as_deref(), Some("&"));
        assert_eq!(resolve_entity("#x41").as_deref(), Some("A"));
        assert_eq!(resolve_entity("#65").as_deref(), Some("A"));
        assert_eq!(resolve_entity("bogus"), None);
    }

    #[test]
    fn test_fence_length() {
        assert_eq!(calculate_fence_length("plain", '}'), 3);
        assert_eq!(calculate_fence_length("a }} b", '}'), 3);
        assert_eq!(calculate_fence_length("}}}", '}'), 4);
        assert_eq!(calculate_fence_length("x }}}}} y", '}'), 6);
    }
}
