//! ZIP archives: a table listing the members.

use std::io::Cursor;

use zip::ZipArchive;

use crate::error::Result;
use crate::registry::{ConvertContext, Converter, Payload};
use crate::tree::Element;

use super::{build_table, page_with_body};

/// `application/zip` to a table of `size | date | name` rows.
pub struct ArchiveParser;

impl Converter for ArchiveParser {
    fn convert(&self, input: Payload, ctx: &ConvertContext<'_>) -> Result<Payload> {
        let bytes = input.into_bytes()?;
        let rows = match list_members(bytes) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("archive: {e}");
                vec![vec![e.to_string()]]
            }
        };
        let body = Element::page("body").with_child(build_table(rows));
        Ok(Payload::Tree(page_with_body(ctx.options.page_href.as_ref(), body)))
    }
}

fn list_members(bytes: Vec<u8>) -> Result<Vec<Vec<String>>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut rows = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index_raw(i)?;
        let date = file
            .last_modified()
            .map(|t| {
                format!(
                    "{}-{:02}-{:02} {:02}:{:02}:{:02}",
                    t.year(),
                    t.month(),
                    t.day(),
                    t.hour(),
                    t.minute(),
                    t.second()
                )
            })
            .unwrap_or_default();
        rows.push(vec![file.size().to_string(), date, file.name().to_string()]);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use zip::DateTime;
    use zip::write::{SimpleFileOptions, ZipWriter};

    use super::*;
    use crate::import::test_support::parse_body;

    fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let stamp = DateTime::from_date_and_time(2021, 3, 4, 5, 6, 8).unwrap();
        let options = SimpleFileOptions::default().last_modified_time(stamp);
        for (name, data) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn rows(body: &Element) -> Vec<Vec<String>> {
        body.find_page("table")
            .unwrap()
            .find_page("table-body")
            .unwrap()
            .child_elements()
            .map(|row| row.child_elements().map(Element::text).collect())
            .collect()
    }

    #[test]
    fn test_lists_members() {
        let data = build_zip(&[("a.txt", b"hello"), ("dir/b.bin", b"0123456789")]);
        let body = parse_body(&ArchiveParser, data);
        assert_eq!(
            rows(&body),
            vec![
                vec!["5", "2021-03-04 05:06:08", "a.txt"],
                vec!["10", "2021-03-04 05:06:08", "dir/b.bin"],
            ]
        );
    }

    #[test]
    fn test_broken_archive_reports_error_row() {
        let body = parse_body(&ArchiveParser, b"not a zip file".to_vec());
        let rows = rows(&body);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 1);
        assert!(!rows[0][0].is_empty());
    }
}
