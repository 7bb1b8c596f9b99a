//! Minimal PDF 1.4 serializer for laid out pages.
//!
//! Object numbering is fixed: 1 catalog, 2 page tree, 3 and 4 fonts, 5 info,
//! then a page object and its content stream per page.

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use time::{OffsetDateTime, UtcOffset};

use super::font::{Font, encode_winansi, escape_into};
use super::layout::{Op, PAGE_HEIGHT, PAGE_WIDTH, Page};
use crate::error::CvError;

const CATALOG: usize = 1;
const PAGES: usize = 2;
const FONT_REGULAR: usize = 3;
const FONT_BOLD: usize = 4;
const INFO: usize = 5;
const FIRST_PAGE: usize = 6;

pub struct DocumentInfo<'a> {
    pub title: &'a str,
    pub producer: &'a str,
    pub created_at: OffsetDateTime,
}

struct PdfWriter {
    buf: Vec<u8>,
    /// Byte offset of object `n` at index `n - 1`.
    offsets: Vec<usize>,
}

impl PdfWriter {
    fn new() -> Self {
        let mut buf = Vec::with_capacity(16 * 1024);
        buf.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");
        Self {
            buf,
            offsets: Vec::new(),
        }
    }

    fn begin(&mut self, id: usize) {
        debug_assert_eq!(id, self.offsets.len() + 1, "objects must be written in order");
        self.offsets.push(self.buf.len());
        self.buf.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
    }

    fn object(&mut self, id: usize, body: &[u8]) {
        self.begin(id);
        self.buf.extend_from_slice(body);
        self.buf.extend_from_slice(b"\nendobj\n");
    }

    fn stream(&mut self, id: usize, data: &[u8], compressed: bool) {
        self.begin(id);
        let filter = if compressed { " /Filter /FlateDecode" } else { "" };
        self.buf
            .extend_from_slice(format!("<< /Length {}{filter} >>\nstream\n", data.len()).as_bytes());
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\nendstream\nendobj\n");
    }

    fn finish(mut self) -> Vec<u8> {
        let xref = self.buf.len();
        let count = self.offsets.len() + 1;
        self.buf
            .extend_from_slice(format!("xref\n0 {count}\n0000000000 65535 f \n").as_bytes());
        for offset in &self.offsets {
            self.buf
                .extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        self.buf.extend_from_slice(
            format!(
                "trailer\n<< /Size {count} /Root {CATALOG} 0 R /Info {INFO} 0 R >>\nstartxref\n{xref}\n%%EOF\n"
            )
            .as_bytes(),
        );
        self.buf
    }
}

/// Formats a coordinate with at most two decimals.
fn num(v: f32) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

fn literal(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + 2);
    out.push(b'(');
    escape_into(&mut out, text);
    out.push(b')');
    out
}

fn pdf_date(at: OffsetDateTime) -> String {
    let at = at.to_offset(UtcOffset::UTC);
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}Z",
        at.year(),
        u8::from(at.month()),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

fn content_stream(page: &Page) -> Vec<u8> {
    let mut out = Vec::new();
    for op in &page.ops {
        match op {
            Op::Text {
                font, size, x, y, text, ..
            } => {
                out.extend_from_slice(
                    format!("BT /{} {} Tf {} {} Td ", font.resource(), num(*size), num(*x), num(*y))
                        .as_bytes(),
                );
                out.extend_from_slice(&literal(text));
                out.extend_from_slice(b" Tj ET\n");
            }
            Op::Rule { x1, x2, y } => {
                out.extend_from_slice(
                    format!(
                        "q 0.6 G 0.75 w {} {y} m {} {y} l S Q\n",
                        num(*x1),
                        num(*x2),
                        y = num(*y)
                    )
                    .as_bytes(),
                );
            }
        }
    }
    out
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, CvError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Serializes pages into a complete PDF file.
pub fn write_pdf(pages: &[Page], info: &DocumentInfo<'_>, compress: bool) -> Result<Vec<u8>, CvError> {
    let mut w = PdfWriter::new();
    let page_id = |i: usize| FIRST_PAGE + 2 * i;

    w.object(CATALOG, format!("<< /Type /Catalog /Pages {PAGES} 0 R >>").as_bytes());

    let kids: Vec<String> = (0..pages.len()).map(|i| format!("{} 0 R", page_id(i))).collect();
    w.object(
        PAGES,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} /MediaBox [0 0 {} {}] >>",
            kids.join(" "),
            pages.len(),
            num(PAGE_WIDTH),
            num(PAGE_HEIGHT)
        )
        .as_bytes(),
    );

    for (id, font) in [(FONT_REGULAR, Font::Regular), (FONT_BOLD, Font::Bold)] {
        w.object(
            id,
            format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                font.base_font()
            )
            .as_bytes(),
        );
    }

    let mut info_dict = b"<< /Title ".to_vec();
    info_dict.extend_from_slice(&literal(&encode_winansi(info.title)));
    info_dict.extend_from_slice(b" /Producer ");
    info_dict.extend_from_slice(&literal(&encode_winansi(info.producer)));
    info_dict.extend_from_slice(format!(" /CreationDate ({}) >>", pdf_date(info.created_at)).as_bytes());
    w.object(INFO, &info_dict);

    for (i, page) in pages.iter().enumerate() {
        let id = page_id(i);
        w.object(
            id,
            format!(
                "<< /Type /Page /Parent {PAGES} 0 R /Resources << /Font << /F1 {FONT_REGULAR} 0 R /F2 {FONT_BOLD} 0 R >> >> /Contents {} 0 R >>",
                id + 1
            )
            .as_bytes(),
        );
        let raw = content_stream(page);
        if compress {
            w.stream(id + 1, &deflate(&raw)?, true);
        } else {
            w.stream(id + 1, &raw, false);
        }
    }

    Ok(w.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::layout::LineRole;

    fn page(text: &str) -> Page {
        Page {
            ops: vec![
                Op::Text {
                    role: LineRole::Body,
                    font: Font::Bold,
                    size: 10.0,
                    x: 50.0,
                    y: 700.5,
                    text: text.as_bytes().to_vec(),
                },
                Op::Rule { x1: 50.0, x2: 545.0, y: 690.0 },
            ],
        }
    }

    fn info() -> DocumentInfo<'static> {
        DocumentInfo {
            title: "Test (CV)",
            producer: "MedLearn",
            created_at: time::macros::datetime!(2024-03-05 14:07:09 UTC),
        }
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[test]
    fn numbers_are_compact() {
        assert_eq!(num(50.0), "50");
        assert_eq!(num(700.5), "700.5");
        assert_eq!(num(12.346), "12.35");
        assert_eq!(num(-0.001), "0");
    }

    #[test]
    fn xref_offsets_point_at_objects() {
        let pdf = write_pdf(&[page("a"), page("b")], &info(), false).unwrap();
        let text = String::from_utf8_lossy(&pdf);

        let startxref: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|t| t.lines().next())
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert!(pdf[startxref..].starts_with(b"xref\n0 10\n"));

        let table = String::from_utf8_lossy(&pdf[startxref..]);
        for (n, entry) in table.lines().skip(3).take(9).enumerate() {
            assert_eq!(entry.len(), 19, "xref entries are 20 bytes with newline");
            let offset: usize = entry[..10].parse().unwrap();
            let expected = format!("{} 0 obj", n + 1);
            assert!(pdf[offset..].starts_with(expected.as_bytes()), "object {}", n + 1);
        }
        assert!(pdf.ends_with(b"%%EOF\n"));
    }

    #[test]
    fn uncompressed_stream_is_readable() {
        let pdf = write_pdf(&[page("Hi (there)")], &info(), false).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.4\n"));
        assert!(find(&pdf, br"BT /F2 10 Tf 50 700.5 Td (Hi \(there\)) Tj ET").is_some());
        assert!(find(&pdf, b"q 0.6 G 0.75 w 50 690 m 545 690 l S Q").is_some());
        assert!(find(&pdf, b"/Count 1").is_some());
        assert!(find(&pdf, br"/Title (Test \(CV\))").is_some());
        assert!(find(&pdf, b"/CreationDate (D:20240305140709Z)").is_some());
        assert!(find(&pdf, b"/FlateDecode").is_none());
    }

    #[test]
    fn compressed_stream_inflates_back() {
        use flate2::read::ZlibDecoder;
        use std::io::Read;

        let pdf = write_pdf(&[page("Compressed")], &info(), true).unwrap();
        let header = find(&pdf, b"/Filter /FlateDecode >>\nstream\n").unwrap();
        let start = header + b"/Filter /FlateDecode >>\nstream\n".len();
        let end = start + find(&pdf[start..], b"\nendstream").unwrap();

        let mut out = String::new();
        ZlibDecoder::new(&pdf[start..end]).read_to_string(&mut out).unwrap();
        assert!(out.contains("(Compressed) Tj"));
    }
}
