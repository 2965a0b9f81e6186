//! Glyph advance widths for the faces the layout engine measures with.
//!
//! Advances come straight from the fonts Typst embeds: Libertinus Serif for
//! prose and DejaVu Sans Mono for code. Characters neither face covers fall
//! back to an average advance scaled by their display width, so CJK and emoji
//! take two cells.

use std::sync::LazyLock;

use ttf_parser::{Face, name_id};
use unicode_width::UnicodeWidthChar;

use crate::geometry::PT_TO_MM;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontFace {
    Regular,
    Bold,
    Italic,
    BoldItalic,
    Mono,
}

impl FontFace {
    pub fn for_style(bold: bool, italic: bool, code: bool) -> Self {
        match (code, bold, italic) {
            (true, _, _) => FontFace::Mono,
            (false, true, true) => FontFace::BoldItalic,
            (false, true, false) => FontFace::Bold,
            (false, false, true) => FontFace::Italic,
            (false, false, false) => FontFace::Regular,
        }
    }

    pub fn is_bold(self) -> bool {
        matches!(self, FontFace::Bold | FontFace::BoldItalic)
    }

    pub fn is_italic(self) -> bool {
        matches!(self, FontFace::Italic | FontFace::BoldItalic)
    }
}

const PROSE_FAMILY: &str = "Libertinus Serif";
const MONO_FAMILY: &str = "DejaVu Sans Mono";

/// Per-cell advance, in ems, for characters the face has no glyph for.
const FALLBACK_ADVANCE: f64 = 0.556;

struct LoadedFace {
    face: FontFace,
    font: Face<'static>,
    units_per_em: f64,
}

static FACES: LazyLock<Vec<LoadedFace>> = LazyLock::new(|| {
    let faces: Vec<LoadedFace> = typst_assets::fonts()
        .filter_map(|data| Face::parse(data, 0).ok())
        .filter_map(|font| {
            let face = classify(&font)?;
            let units_per_em = f64::from(font.units_per_em());
            Some(LoadedFace {
                face,
                font,
                units_per_em,
            })
        })
        .collect();
    tracing::debug!(faces = faces.len(), "loaded font metrics");
    faces
});

fn family(font: &Face<'_>) -> Option<String> {
    font.names()
        .into_iter()
        .filter(|name| name.name_id == name_id::FAMILY)
        .find_map(|name| name.to_string())
}

fn classify(font: &Face<'_>) -> Option<FontFace> {
    let family = family(font)?;
    let bold = match font.weight().to_number() {
        400 => false,
        700 => true,
        _ => return None,
    };
    match family.as_str() {
        PROSE_FAMILY => Some(FontFace::for_style(bold, font.is_italic(), false)),
        MONO_FAMILY if !bold && !font.is_italic() => Some(FontFace::Mono),
        _ => None,
    }
}

fn loaded(face: FontFace) -> Option<&'static LoadedFace> {
    FACES.iter().find(|loaded| loaded.face == face)
}

fn glyph_advance(face: FontFace, ch: char) -> Option<f64> {
    let loaded = loaded(face)?;
    let glyph = loaded.font.glyph_index(ch)?;
    let advance = loaded.font.glyph_hor_advance(glyph)?;
    Some(f64::from(advance) / loaded.units_per_em)
}

/// Advance of `ch` in ems.
pub fn char_advance(face: FontFace, ch: char) -> f64 {
    match ch {
        '\n' | '\r' => return 0.0,
        '\t' => return char_advance(face, ' ') * 4.0,
        '\u{a0}' => return char_advance(face, ' '),
        _ => {}
    }

    let cells = ch.width().unwrap_or(0);
    if cells == 0 {
        return 0.0;
    }
    if let Some(advance) = glyph_advance(face, ch) {
        return advance;
    }

    let cell = match face {
        FontFace::Mono => glyph_advance(face, ' ').unwrap_or(0.6),
        _ => FALLBACK_ADVANCE,
    };
    cell * cells as f64
}

/// Width of `text` in millimetres when set in `face` at `size` points.
pub fn text_width(text: &str, face: FontFace, size: f64) -> f64 {
    let ems: f64 = text.chars().map(|ch| char_advance(face, ch)).sum();
    ems * size * PT_TO_MM
}

pub fn char_width(ch: char, face: FontFace, size: f64) -> f64 {
    char_advance(face, ch) * size * PT_TO_MM
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[rstest]
    #[case(FontFace::Regular)]
    #[case(FontFace::Bold)]
    #[case(FontFace::Italic)]
    #[case(FontFace::BoldItalic)]
    #[case(FontFace::Mono)]
    fn every_face_is_embedded(#[case] face: FontFace) {
        assert!(loaded(face).is_some(), "{face:?} missing");
    }

    #[test]
    fn prose_matches_libertinus() {
        let ems: f64 = "The quick brown fox jumps over the lazy dog"
            .chars()
            .map(|ch| char_advance(FontFace::Regular, ch))
            .sum();
        assert!(close(ems, 18.582), "{ems}");
    }

    #[test]
    fn bold_is_wider_than_regular() {
        let text = "Measured widths follow the drawn face";
        assert!(text_width(text, FontFace::Bold, 11.0) > text_width(text, FontFace::Regular, 11.0));
    }

    #[test]
    fn mono_is_fixed() {
        let advance = char_advance(FontFace::Mono, 'i');
        assert!(close(advance, 1233.0 / 2048.0), "{advance}");
        assert!(close(char_advance(FontFace::Mono, 'W'), advance));
        let width = text_width("abcdefghij", FontFace::Mono, 9.0);
        assert!(close(width, 10.0 * advance * 9.0 * PT_TO_MM));
    }

    #[test]
    fn uncovered_wide_characters_take_two_cells() {
        assert!(close(char_advance(FontFace::Regular, '漢'), 2.0 * FALLBACK_ADVANCE));
        let mono_cell = char_advance(FontFace::Mono, ' ');
        assert!(close(char_advance(FontFace::Mono, '漢'), 2.0 * mono_cell));
    }

    #[test]
    fn nbsp_and_tab_follow_the_space() {
        let space = char_advance(FontFace::Regular, ' ');
        assert!(close(char_advance(FontFace::Regular, '\u{a0}'), space));
        assert!(close(char_advance(FontFace::Regular, '\t'), 4.0 * space));
    }

    #[test]
    fn newline_has_no_width() {
        assert_eq!(text_width("\n", FontFace::Regular, 11.0), 0.0);
    }
}
