//! Standard-14 Helvetica metrics and WinAnsi text encoding.
//!
//! Widths are taken from the Adobe AFM files and expressed in 1/1000 em.
//! Only the printable ASCII range has exact entries; other WinAnsi glyphs use
//! [`DEFAULT_WIDTH`].

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Font {
    Regular,
    Bold,
}

impl Font {
    /// Resource name used in content streams.
    #[must_use]
    pub fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }

    #[must_use]
    pub fn base_font(self) -> &'static str {
        match self {
            Font::Regular => "Helvetica",
            Font::Bold => "Helvetica-Bold",
        }
    }

    fn widths(self) -> &'static [u16; 95] {
        match self {
            Font::Regular => &HELVETICA,
            Font::Bold => &HELVETICA_BOLD,
        }
    }

    /// Advance width of one encoded byte, in 1/1000 em.
    #[must_use]
    pub fn glyph_width(self, byte: u8) -> u16 {
        match byte {
            32..=126 => self.widths()[usize::from(byte - 32)],
            _ => DEFAULT_WIDTH,
        }
    }

    /// Width of encoded text at `size` points.
    #[must_use]
    pub fn measure(self, text: &[u8], size: f32) -> f32 {
        let units: u32 = text.iter().map(|b| u32::from(self.glyph_width(*b))).sum();
        units as f32 * size / 1000.0
    }
}

pub const DEFAULT_WIDTH: u16 = 556;

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    // space ! " # $ % & ' ( ) * + , - . /
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    // 0-9
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    // : ; < = > ? @
    278, 278, 584, 584, 584, 556, 1015,
    // A-Z
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    // [ \ ] ^ _ `
    278, 278, 278, 469, 556, 333,
    // a-z
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    // { | } ~
    334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    333, 333, 584, 584, 584, 611, 975,
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    333, 278, 333, 584, 556, 333,
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    389, 280, 389, 584,
];

/// Encodes text as WinAnsi bytes.
///
/// Latin-1 maps directly, a few common typographic characters map to their
/// WinAnsi slots, whitespace control characters become spaces and anything
/// else becomes `?`.
#[must_use]
pub fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c {
            '\t' | '\n' | '\r' => b' ',
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '\u{20ac}' => 0x80,
            '\u{201a}' => 0x82,
            '\u{201e}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201c}' => 0x93,
            '\u{201d}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{2122}' => 0x99,
            _ => b'?',
        })
        .collect()
}

/// Writes encoded text as the body of a PDF literal string.
///
/// Delimiters and backslash are escaped; bytes outside printable ASCII are
/// written as octal escapes so the content stream stays 7-bit.
pub fn escape_into(out: &mut Vec<u8>, text: &[u8]) {
    for &b in text {
        match b {
            b'(' | b')' | b'\\' => {
                out.push(b'\\');
                out.push(b);
            }
            32..=126 => out.push(b),
            _ => out.extend_from_slice(format!("\\{b:03o}").as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_known_strings() {
        // H=722 e=556 l=222 l=222 o=556 -> 2278
        let w = Font::Regular.measure(b"Hello", 10.0);
        assert!((w - 22.78).abs() < 1e-3);
        // Bold is wider
        assert!(Font::Bold.measure(b"Hello", 10.0) > w);
        assert_eq!(Font::Regular.measure(b"", 10.0), 0.0);
    }

    #[test]
    fn encodes_latin1_and_typography() {
        assert_eq!(encode_winansi("Zoë"), vec![b'Z', b'o', 0xEB]);
        assert_eq!(encode_winansi("a\u{2013}b"), vec![b'a', 0x96, b'b']);
        assert_eq!(encode_winansi("\u{201c}x\u{201d}"), vec![0x93, b'x', 0x94]);
        assert_eq!(encode_winansi("日本"), b"??".to_vec());
        assert_eq!(encode_winansi("a\tb\nc"), b"a b c".to_vec());
    }

    #[test]
    fn escapes_delimiters_and_high_bytes() {
        let mut out = Vec::new();
        escape_into(&mut out, &encode_winansi(r"(a\b) é"));
        assert_eq!(out, br"\(a\\b\) \351".to_vec());
    }
}
