//! CSV input: one table, one row per record.

use memchr::memchr_iter;

use crate::error::Result;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::{Element, error_element};

use super::{build_table, page_with_body};

/// Candidate delimiters, in tie-breaking order.
const DELIMITERS: [u8; 4] = [b';', b',', b'\t', b'|'];

/// Pick the delimiter that occurs most often in the first line.
fn sniff_delimiter(text: &str) -> u8 {
    let first = text.lines().next().unwrap_or("").as_bytes();
    let mut best = (b';', 0);
    for delim in DELIMITERS {
        let count = memchr_iter(delim, first).count();
        if count > best.1 {
            best = (delim, count);
        }
    }
    best.0
}

/// `text/csv` to a page holding a single table.
///
/// A single-character positional argument (`{{{#!csv ,`) overrides the
/// sniffed delimiter.
pub struct CsvParser;

impl Converter for CsvParser {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let text = input.into_text()?;
        let delimiter = ctx
            .options
            .arguments
            .as_ref()
            .and_then(|args| args.positional.first())
            .filter(|arg| arg.len() == 1)
            .map(|arg| arg.as_bytes()[0])
            .unwrap_or_else(|| sniff_delimiter(&text));
        log::debug!("csv: delimiter {:?}", delimiter as char);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        let mut failure = None;
        for record in reader.records() {
            match record {
                Ok(record) => rows.push(record.iter().map(str::to_string).collect()),
                Err(e) => {
                    log::warn!("csv: {e}");
                    failure = Some(e);
                    break;
                }
            }
        }

        let mut body = Element::page("body");
        if !rows.is_empty() {
            body.push(build_table(rows));
        }
        if let Some(e) = failure {
            body.push(error_element(e.to_string()));
        }
        Ok(Payload::Tree(page_with_body(ctx.options.page_href.as_ref(), body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::test_support::parse_body;

    fn cells(body: &Element) -> Vec<Vec<String>> {
        let table = body.find_page("table").unwrap();
        table
            .find_page("table-body")
            .unwrap()
            .child_elements()
            .map(|row| row.child_elements().map(Element::text).collect())
            .collect()
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a;b;c\n1,2"), b';');
        assert_eq!(sniff_delimiter("a,b,c"), b',');
        assert_eq!(sniff_delimiter("a\tb"), b'\t');
        assert_eq!(sniff_delimiter("a|b|c"), b'|');
        assert_eq!(sniff_delimiter("plain"), b';');
        assert_eq!(sniff_delimiter(""), b';');
    }

    #[test]
    fn test_semicolon_table() {
        let body = parse_body(&CsvParser, "Name;Age\nAda;36\nAlan;41");
        assert_eq!(
            cells(&body),
            vec![vec!["Name", "Age"], vec!["Ada", "36"], vec!["Alan", "41"]]
        );
    }

    #[test]
    fn test_ragged_rows_and_quotes() {
        let body = parse_body(&CsvParser, "a,b,c\n\"x, y\",z\n");
        assert_eq!(cells(&body), vec![vec!["a", "b", "c"], vec!["x, y", "z"]]);
    }

    #[test]
    fn test_empty_input() {
        let body = parse_body(&CsvParser, "");
        assert!(body.find_page("table").is_none());
    }
}
