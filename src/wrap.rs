//! Line breaking for prose and code.
//!
//! Both wrappers return byte ranges into the text they were given instead of
//! new strings. The renderer walks those ranges against run boundaries or
//! highlight colors, so every wrapped line can be traced back to its source.

use std::ops::Range;

use crate::metrics::{FontFace, char_width, text_width};

/// Widths summed in a different order differ in the last bits.
const FIT_TOLERANCE: f64 = 1e-9;

/// Greedy word wrap. Explicit `\n` always breaks; the whitespace a line is
/// broken at belongs to no line. Words wider than `max_width` are split at
/// the last character that fits.
pub fn wrap_text(text: &str, max_width: f64, face: FontFace, size: f64) -> Vec<Range<usize>> {
    wrap_with(text, max_width, &|_, ch| char_width(ch, face, size))
}

/// [`wrap_text`] for text whose face changes along the way. `advance` gets
/// the byte offset and the character and returns its width in millimetres.
pub fn wrap_with(
    text: &str,
    max_width: f64,
    advance: &dyn Fn(usize, char) -> f64,
) -> Vec<Range<usize>> {
    let mut lines = Vec::new();
    if text.is_empty() {
        return lines;
    }

    let wrapper = Wrapper {
        text,
        max_width,
        advance,
    };
    let mut segment_start = 0;
    for segment in text.split('\n') {
        wrapper.segment(segment_start, segment_start + segment.len(), &mut lines);
        segment_start += segment.len() + 1;
    }
    lines
}

struct Wrapper<'a> {
    text: &'a str,
    max_width: f64,
    advance: &'a dyn Fn(usize, char) -> f64,
}

impl Wrapper<'_> {
    fn width(&self, range: Range<usize>) -> f64 {
        self.text[range.clone()]
            .char_indices()
            .map(|(offset, ch)| (self.advance)(range.start + offset, ch))
            .sum()
    }

    fn segment(&self, start: usize, end: usize, lines: &mut Vec<Range<usize>>) {
        let text = self.text;
        let mut current: Option<(Range<usize>, f64)> = None;
        let mut pos = start;

        while pos < end {
            let word_start = match text[pos..end].find(|c: char| c != ' ') {
                Some(offset) => pos + offset,
                None => break,
            };
            let word_end = text[word_start..end]
                .find(' ')
                .map_or(end, |offset| word_start + offset);
            let word_width = self.width(word_start..word_end);

            if let Some((line, width)) = current.as_mut() {
                let gap = self.width(line.end..word_start);
                if *width + gap + word_width <= self.max_width + FIT_TOLERANCE {
                    line.end = word_end;
                    *width += gap + word_width;
                    pos = word_end;
                    continue;
                }
                lines.push(line.clone());
                current = None;
            }

            current = Some(self.place_word(word_start, word_end, word_width, lines));
            pos = word_end;
        }

        match current {
            Some((line, _)) => lines.push(line),
            // Blank line between explicit breaks.
            None => lines.push(start..start),
        }
    }

    /// Start a fresh line with the given word, hard-splitting it when it alone
    /// is wider than the line. Returns the still-open last piece.
    fn place_word(
        &self,
        word_start: usize,
        word_end: usize,
        word_width: f64,
        lines: &mut Vec<Range<usize>>,
    ) -> (Range<usize>, f64) {
        if word_width <= self.max_width + FIT_TOLERANCE {
            return (word_start..word_end, word_width);
        }

        let mut piece_start = word_start;
        let mut width = 0.0;
        for (offset, ch) in self.text[word_start..word_end].char_indices() {
            let at = word_start + offset;
            let advance = (self.advance)(at, ch);
            if width + advance > self.max_width && at > piece_start {
                lines.push(piece_start..at);
                piece_start = at;
                width = 0.0;
            }
            width += advance;
        }
        (piece_start..word_end, width)
    }
}

/// One visual line of a code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeLine {
    pub range: Range<usize>,
    /// The source line continues with a `\n` right after this visual line.
    pub ends_source_line: bool,
}

const CODE_BREAK_CHARS: [char; 6] = [' ', '\t', ',', ';', '(', '{'];

fn is_code_break(ch: char) -> bool {
    CODE_BREAK_CHARS.contains(&ch) || ch == '['
}

/// Wrap code preserving explicit newlines. An overlong line breaks after the
/// last whitespace or `, ; ( { [` that still fits, otherwise at the cutoff.
/// No character is dropped: the visual lines plus the source newlines
/// reproduce `code` exactly.
pub fn wrap_code(code: &str, max_width: f64, size: f64) -> Vec<CodeLine> {
    let mut lines = Vec::new();
    let mut line_start = 0;
    let source_lines: Vec<&str> = code.split('\n').collect();
    let last = source_lines.len().saturating_sub(1);

    for (index, source) in source_lines.iter().enumerate() {
        let end = line_start + source.len();
        let mut start = line_start;

        while text_width(&code[start..end], FontFace::Mono, size) > max_width {
            let cutoff = fitting_cutoff(code, start, end, max_width, size);
            let break_at = code[start..cutoff]
                .char_indices()
                .rev()
                .find(|&(offset, ch)| offset > 0 && is_code_break(ch))
                .map(|(offset, ch)| start + offset + ch.len_utf8())
                .unwrap_or(cutoff);
            lines.push(CodeLine {
                range: start..break_at,
                ends_source_line: false,
            });
            start = break_at;
        }

        lines.push(CodeLine {
            range: start..end,
            ends_source_line: index < last,
        });
        line_start = end + 1;
    }
    lines
}

/// Byte offset just past the last character of `code[start..end]` that fits
/// in `max_width`; always at least one character past `start`.
fn fitting_cutoff(code: &str, start: usize, end: usize, max_width: f64, size: f64) -> usize {
    let mut width = 0.0;
    for (offset, ch) in code[start..end].char_indices() {
        let advance = char_width(ch, FontFace::Mono, size);
        if width + advance > max_width {
            return if offset == 0 {
                start + ch.len_utf8()
            } else {
                start + offset
            };
        }
        width += advance;
    }
    end
}
