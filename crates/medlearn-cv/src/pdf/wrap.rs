use super::font::Font;

/// Greedy word wrap of WinAnsi-encoded text.
///
/// Runs of spaces collapse. A word wider than `max_width` is split at the
/// last byte that still fits, so every returned line fits unless a single
/// glyph is wider than the column.
pub fn wrap(text: &[u8], font: Font, size: f32, max_width: f32) -> Vec<Vec<u8>> {
    let space = font.measure(b" ", size);
    let mut lines = Vec::new();
    let mut current: Vec<u8> = Vec::new();
    let mut current_width = 0.0_f32;

    for word in text.split(|b| *b == b' ').filter(|w| !w.is_empty()) {
        let width = font.measure(word, size);

        if width > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let mut chunks = split_word(word, font, size, max_width);
            // The tail of a split word can share its line with what follows.
            if let Some(last) = chunks.pop() {
                lines.extend(chunks);
                current_width = font.measure(&last, size);
                current = last;
            }
            continue;
        }

        if current.is_empty() {
            current.extend_from_slice(word);
            current_width = width;
        } else if current_width + space + width <= max_width {
            current.push(b' ');
            current.extend_from_slice(word);
            current_width += space + width;
        } else {
            lines.push(std::mem::replace(&mut current, word.to_vec()));
            current_width = width;
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn split_word(word: &[u8], font: Font, size: f32, max_width: f32) -> Vec<Vec<u8>> {
    let mut chunks = Vec::new();
    let mut chunk = Vec::new();
    let mut width = 0.0_f32;
    for &b in word {
        let w = font.measure(&[b], size);
        if !chunk.is_empty() && width + w > max_width {
            chunks.push(std::mem::take(&mut chunk));
            width = 0.0;
        }
        chunk.push(b);
        width += w;
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(lines: Vec<Vec<u8>>) -> Vec<String> {
        lines
            .into_iter()
            .map(|l| String::from_utf8(l).unwrap())
            .collect()
    }

    #[test]
    fn short_text_stays_on_one_line() {
        let lines = wrap(b"Clinical audit lead", Font::Regular, 10.0, 500.0);
        assert_eq!(strings(lines), vec!["Clinical audit lead"]);
    }

    #[test]
    fn breaks_between_words_and_respects_width() {
        let text = b"Managed acute admissions on a busy medical take with daily consultant ward rounds";
        let max = 120.0;
        let lines = wrap(text, Font::Regular, 10.0, max);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(Font::Regular.measure(line, 10.0) <= max);
            assert!(!line.starts_with(b" ") && !line.ends_with(b" "));
        }
        let rejoined = strings(lines).join(" ");
        assert_eq!(rejoined.as_bytes(), text);
    }

    #[test]
    fn overlong_word_is_split() {
        let word = "Pneumonoultramicroscopicsilicovolcanoconiosis";
        let lines = wrap(format!("{word} ok").as_bytes(), Font::Bold, 10.0, 60.0);
        assert!(lines.len() > 2);
        for line in &lines {
            assert!(Font::Bold.measure(line, 10.0) <= 60.0);
        }
        assert_eq!(strings(lines).concat().replace(' ', ""), format!("{word}ok"));
    }

    #[test]
    fn blank_input_yields_no_lines() {
        assert!(wrap(b"   ", Font::Regular, 10.0, 100.0).is_empty());
        assert!(wrap(b"", Font::Regular, 10.0, 100.0).is_empty());
    }
}
