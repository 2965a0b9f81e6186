//! Syntax highlighting for code blocks.
//!
//! A [`Highlighter`] turns code into markup with inline `color` styles.
//! [`color_map`] reads any such markup back into per-byte colors over the
//! original code, so the renderer can color lines it wrapped itself.

use std::sync::LazyLock;

use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::color::Color;
use crate::dom::{MarkupNode, MarkupTree, inline_style};
use crate::error::RenderError;

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

const FALLBACK_THEME: &str = "InspiredGitHub";

/// How far ahead the color walk looks to resynchronise after markup text
/// that does not match the code.
const RESYNC_WINDOW: usize = 16;

pub trait Highlighter {
    /// Markup for `code` with per-token inline colors. Unknown languages
    /// come back as escaped, uncolored text.
    fn highlight(&self, code: &str, language: &str) -> Result<String, RenderError>;
}

/// Leaves code uncolored.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHighlight;

impl Highlighter for NoHighlight {
    fn highlight(&self, code: &str, _language: &str) -> Result<String, RenderError> {
        Ok(escape(code))
    }
}

pub struct SyntectHighlighter {
    theme: &'static Theme,
}

impl SyntectHighlighter {
    pub fn new(theme: &str) -> Self {
        let theme = THEME_SET.themes.get(theme).unwrap_or_else(|| {
            tracing::warn!(theme, "unknown syntax theme, using {FALLBACK_THEME}");
            &THEME_SET.themes[FALLBACK_THEME]
        });
        Self { theme }
    }

    fn syntax_for(language: &str) -> Option<&'static SyntaxReference> {
        let language = language.trim().to_ascii_lowercase();
        let alias = match language.as_str() {
            "c++" => "cpp",
            "c#" | "csharp" => "cs",
            "shell" | "zsh" => "sh",
            "golang" => "go",
            "yml" => "yaml",
            "jsx" => "js",
            other => other,
        };
        SYNTAX_SET
            .find_syntax_by_token(alias)
            .or_else(|| SYNTAX_SET.find_syntax_by_extension(alias))
    }
}

impl Default for SyntectHighlighter {
    fn default() -> Self {
        Self::new(FALLBACK_THEME)
    }
}

impl Highlighter for SyntectHighlighter {
    fn highlight(&self, code: &str, language: &str) -> Result<String, RenderError> {
        let Some(syntax) = Self::syntax_for(language) else {
            tracing::debug!(language, "no syntax definition, code left uncolored");
            return Ok(escape(code));
        };

        let mut lines = HighlightLines::new(syntax, self.theme);
        let mut out = String::with_capacity(code.len() * 2);
        for line in LinesWithEndings::from(code) {
            let ranges = lines
                .highlight_line(line, &SYNTAX_SET)
                .map_err(|e| RenderError::Highlight {
                    language: language.to_string(),
                    message: e.to_string(),
                })?;
            for (style, text) in ranges {
                let fg = style.foreground;
                out.push_str(&format!(
                    "<span style=\"color:#{:02x}{:02x}{:02x}\">{}</span>",
                    fg.r,
                    fg.g,
                    fg.b,
                    escape(text)
                ));
            }
        }
        Ok(out)
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Colors of `code` indexed by byte offset. Bytes the markup did not color
/// are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    colors: Vec<Option<Color>>,
}

impl ColorMap {
    pub fn uncolored(code: &str) -> Self {
        Self {
            colors: vec![None; code.len()],
        }
    }

    pub fn at(&self, offset: usize) -> Option<Color> {
        self.colors.get(offset).copied().flatten()
    }
}

/// Walk highlighter markup depth-first and assign each character of `code`
/// the color in effect where the same character appears in the markup.
/// Malformed markup only loses colors; it never fails.
pub fn color_map(code: &str, markup: &str) -> ColorMap {
    let mut map = ColorMap::uncolored(code);
    let tree = MarkupTree::parse_html(&format!("<div>{markup}</div>"));
    let chars: Vec<(usize, char)> = code.char_indices().collect();
    let mut cursor = 0;
    for root in tree.body().children() {
        walk(root, None, &chars, &mut cursor, &mut map);
    }
    map
}

fn walk<N: MarkupNode>(
    node: N,
    inherited: Option<Color>,
    chars: &[(usize, char)],
    cursor: &mut usize,
    map: &mut ColorMap,
) {
    if let Some(text) = node.text() {
        for ch in text.chars() {
            align(ch, inherited, chars, cursor, map);
        }
        return;
    }

    let own = node
        .attribute("style")
        .and_then(|style| inline_style(style, "color"))
        .and_then(|value| Color::parse(&value))
        .or_else(|| node.attribute("color").and_then(Color::parse));
    let color = own.or(inherited);
    for child in node.children() {
        walk(child, color, chars, cursor, map);
    }
}

fn align(
    ch: char,
    color: Option<Color>,
    chars: &[(usize, char)],
    cursor: &mut usize,
    map: &mut ColorMap,
) {
    let mut window = chars.iter().skip(*cursor).take(RESYNC_WINDOW);
    let Some(skip) = window.position(|&(_, c)| c == ch) else {
        return;
    };
    let index = *cursor + skip;
    let (offset, c) = chars[index];
    for byte in offset..offset + c.len_utf8() {
        map.colors[byte] = color;
    }
    *cursor = index + 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const RED: Color = Color::rgb(255, 0, 0);
    const BLUE: Color = Color::rgb(0, 0, 255);

    #[test]
    fn spans_color_their_characters() {
        let code = "let x = 1;";
        let markup = r#"<span style="color:#ff0000">let</span> x = <span style="color: blue">1</span>;"#;
        let map = color_map(code, markup);
        assert_eq!(map.at(0), Some(RED));
        assert_eq!(map.at(2), Some(RED));
        assert_eq!(map.at(3), None);
        assert_eq!(map.at(8), Some(BLUE));
        assert_eq!(map.at(9), None);
    }

    #[test]
    fn nested_spans_inherit_until_overridden() {
        let code = "ab";
        let markup = r#"<span style="color:red">a<b>b</b></span>"#;
        let map = color_map(code, markup);
        assert_eq!(map.at(0), Some(RED));
        assert_eq!(map.at(1), Some(RED));
    }

    #[test]
    fn entities_decode_before_alignment() {
        let code = "a < b && c";
        let markup = r#"a <span style="color:red">&lt;</span> b &amp;&amp; c"#;
        let map = color_map(code, markup);
        assert_eq!(map.at(2), Some(RED));
        assert_eq!(map.at(4), None);
    }

    #[test]
    fn malformed_markup_loses_colors_only() {
        let code = "fn main() {}";
        let map = color_map(code, "<span style=\"color:red\">fn <<< main(</div>");
        assert_eq!(map.at(0), Some(RED));
        assert_eq!(map.at(code.len() - 1), None);

        let map = color_map(code, "completely unrelated");
        assert_eq!(map.colors.len(), code.len());
    }

    #[test]
    fn multibyte_characters_cover_every_byte() {
        let code = "é!";
        let map = color_map(code, r#"<span style="color:red">é</span>!"#);
        assert_eq!(map.at(0), Some(RED));
        assert_eq!(map.at(1), Some(RED));
        assert_eq!(map.at(2), None);
    }

    #[test]
    fn syntect_colors_known_languages() {
        let code = "fn main() {\n    let x = 1;\n}";
        let markup = SyntectHighlighter::default().highlight(code, "rust").unwrap();
        assert!(markup.contains("<span style=\"color:#"));
        let map = color_map(code, &markup);
        assert!(map.at(0).is_some());
    }

    #[test]
    fn unknown_language_passes_through_escaped() {
        let markup = SyntectHighlighter::default()
            .highlight("a < b", "no-such-language")
            .unwrap();
        assert_eq!(markup, "a &lt; b");
        assert_eq!(color_map("a < b", &markup), ColorMap::uncolored("a < b"));
    }

    #[test]
    fn unknown_theme_falls_back() {
        let highlighter = SyntectHighlighter::new("no such theme");
        assert!(highlighter.highlight("x = 1", "python").is_ok());
    }
}
