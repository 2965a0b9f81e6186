//! Block footprints for a given width.
//!
//! Everything here is a pure function of `(block, max_width)`. The renderer
//! calls the same wrapping helpers, so a block drawn without a page break
//! consumes exactly the height measured for it.

use std::ops::Range;

use crate::block::{ContentBlock, MessageRole, TextRun, runs_text};
use crate::geometry::*;
use crate::metrics::{FontFace, char_width, text_width};
use crate::wrap::{CodeLine, wrap_code, wrap_text, wrap_with};

/// A block's computed height and breakability at one width. Recomputed for
/// every pass, never cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredBlock<'a> {
    pub block: &'a ContentBlock,
    pub height: f64,
    pub can_break: bool,
    /// Smallest leading slice worth starting on the current page.
    pub min_height: Option<f64>,
}

pub fn measure(block: &ContentBlock, max_width: f64) -> MeasuredBlock<'_> {
    let (height, can_break, min_height) = match block {
        ContentBlock::Paragraph { runs } => {
            let lines = wrap_runs(runs, max_width, FontFace::Regular, BODY_FONT_SIZE).len();
            text_block(lines, BODY_FONT_SIZE, PARAGRAPH_SPACING)
        }
        ContentBlock::Blockquote { runs } => {
            let width = max_width - BLOCKQUOTE_INDENT;
            let lines = wrap_runs(runs, width, FontFace::Italic, BODY_FONT_SIZE).len();
            text_block(lines, BODY_FONT_SIZE, PARAGRAPH_SPACING)
        }
        ContentBlock::Link { text, .. } => {
            let lines = wrap_text(text, max_width, FontFace::Regular, BODY_FONT_SIZE).len();
            text_block(lines, BODY_FONT_SIZE, PARAGRAPH_SPACING)
        }
        ContentBlock::Heading { level, runs } => {
            let size = heading_font_size(*level);
            let lines = wrap_runs(runs, max_width, FontFace::Bold, size).len();
            let height =
                lines as f64 * line_height(size) + HEADING_SPACING_BEFORE + HEADING_SPACING_AFTER;
            (height, false, None)
        }
        ContentBlock::CodeBlock { code, .. } => {
            let lines = code_lines(code, max_width).len();
            let content = code_content_height(lines);
            let breakable = content > CONTENT_HEIGHT / 2.0;
            let min = CODE_BLOCK_PADDING + 3.0 * line_height(CODE_FONT_SIZE);
            (content + CODE_BLOCK_MARGIN, breakable, Some(min))
        }
        ContentBlock::List { items, .. } => {
            let height = list_height(items, max_width);
            // Items move as a whole when they fit a page, so the first one
            // is the smallest slice that can start here.
            let first = match items.first() {
                Some(ContentBlock::ListItem { runs }) => {
                    list_item_height(runs, max_width - LIST_INDENT)
                }
                _ => line_height(BODY_FONT_SIZE) + PARAGRAPH_SPACING / 2.0,
            };
            (height, true, Some(first.min(CONTENT_HEIGHT)))
        }
        ContentBlock::ListItem { runs } => {
            let height = list_item_height(runs, max_width - LIST_INDENT);
            (height, false, None)
        }
        ContentBlock::Image { width, height, .. } => {
            let (_, box_height) = image_box(*width, *height, max_width);
            (box_height + PARAGRAPH_SPACING, false, None)
        }
        ContentBlock::HorizontalRule => (RULE_HEIGHT, false, None),
        ContentBlock::Message { items, .. } => {
            let frame = MessageFrame::new(block, 0.0, max_width);
            let children: f64 = items
                .iter()
                .map(|item| measure(item, frame.inner_width).height)
                .sum();
            let height = MESSAGE_PADDING * 2.0 + MESSAGE_MARGIN + children;
            let min = MESSAGE_PADDING * 2.0 + line_height(BODY_FONT_SIZE);
            (height, true, Some(min))
        }
    };

    MeasuredBlock {
        block,
        height,
        can_break,
        min_height,
    }
}

fn text_block(lines: usize, size: f64, spacing: f64) -> (f64, bool, Option<f64>) {
    let line = line_height(size);
    (lines as f64 * line + spacing, lines > 1, Some(line))
}

/// Wrap the concatenated text of `runs` once, measuring each run in the face
/// it is drawn with; the renderer re-walks these ranges against the run list.
pub fn wrap_runs(runs: &[TextRun], width: f64, base: FontFace, size: f64) -> Vec<Range<usize>> {
    let text = runs_text(runs);
    let spans = run_spans(runs);
    let advance = |offset: usize, ch: char| {
        let index = spans.partition_point(|(range, _)| range.end <= offset);
        let face = spans.get(index).map_or(base, |(_, run)| run_face(base, run));
        char_width(ch, face, size)
    };
    wrap_with(&text, width, &advance)
}

/// Face a run is drawn in inside a block whose own face is `base`.
pub fn run_face(base: FontFace, run: &TextRun) -> FontFace {
    FontFace::for_style(base.is_bold() || run.bold, base.is_italic() || run.italic, run.code)
}

/// Byte range of every run within the concatenated run text.
pub fn run_spans(runs: &[TextRun]) -> Vec<(Range<usize>, &TextRun)> {
    let mut offset = 0;
    runs.iter()
        .map(|run| {
            let range = offset..offset + run.text.len();
            offset = range.end;
            (range, run)
        })
        .collect()
}

/// Width available to code text inside a block of `max_width`.
pub fn code_text_width(max_width: f64) -> f64 {
    (max_width - 2.0 * CODE_BLOCK_PADDING).max(1.0)
}

pub fn code_lines(code: &str, max_width: f64) -> Vec<CodeLine> {
    wrap_code(code, code_text_width(max_width), CODE_FONT_SIZE)
}

/// Background height for `lines` code lines including padding.
pub fn code_content_height(lines: usize) -> f64 {
    lines as f64 * line_height(CODE_FONT_SIZE) + 2.0 * CODE_BLOCK_PADDING
}

fn list_height(items: &[ContentBlock], max_width: f64) -> f64 {
    items
        .iter()
        .map(|item| match item {
            ContentBlock::ListItem { runs } => list_item_height(runs, max_width - LIST_INDENT),
            ContentBlock::List { items, .. } => list_height(items, max_width - LIST_INDENT),
            other => measure(other, max_width - LIST_INDENT).height,
        })
        .sum()
}

/// Height of one item whose text column is `text_width` wide.
pub fn list_item_height(runs: &[TextRun], text_width: f64) -> f64 {
    let lines = wrap_runs(runs, text_width, FontFace::Regular, BODY_FONT_SIZE).len().max(1);
    lines as f64 * line_height(BODY_FONT_SIZE) + PARAGRAPH_SPACING / 2.0
}

/// Display size in millimetres for an image with the given natural pixel
/// size. Unknown dimensions use a fixed estimate.
pub fn image_box(width_px: Option<u32>, height_px: Option<u32>, max_width: f64) -> (f64, f64) {
    let (Some(w), Some(h)) = (width_px.filter(|w| *w > 0), height_px.filter(|h| *h > 0)) else {
        return (max_width.min(IMAGE_FALLBACK_HEIGHT), IMAGE_FALLBACK_HEIGHT);
    };
    let aspect = f64::from(h) / f64::from(w);
    let mut width = (f64::from(w) * PX_TO_MM).min(max_width);
    let mut height = width * aspect;
    if height > MAX_IMAGE_HEIGHT {
        height = MAX_IMAGE_HEIGHT;
        width = height / aspect;
    }
    (width, height)
}

/// Where a message's children go, and the bubble box when one is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MessageFrame {
    pub inner_x: f64,
    pub inner_width: f64,
    /// `(x, width)` of the bubble background.
    pub bubble: Option<(f64, f64)>,
}

impl MessageFrame {
    /// User turns with a bubble style are right-aligned and capped at 70% of
    /// `width`, shrinking to fit short content. Everything else renders its
    /// children in place at full width.
    pub fn new(block: &ContentBlock, x: f64, width: f64) -> Self {
        let ContentBlock::Message {
            role: MessageRole::User,
            items,
            bubble: Some(_),
        } = block
        else {
            return Self {
                inner_x: x,
                inner_width: width,
                bubble: None,
            };
        };

        let cap = width * BUBBLE_MAX_WIDTH_RATIO;
        let inner_cap = cap - 2.0 * MESSAGE_PADDING;
        let natural = items
            .iter()
            .map(|item| natural_width(item, inner_cap))
            .fold(0.0, f64::max);
        let bubble_width = (natural + 2.0 * MESSAGE_PADDING).min(cap);
        let bubble_x = x + width - bubble_width;
        Self {
            inner_x: bubble_x + MESSAGE_PADDING,
            inner_width: bubble_width - 2.0 * MESSAGE_PADDING,
            bubble: Some((bubble_x, bubble_width)),
        }
    }
}

/// Widest line a block would draw at `max_width`.
fn natural_width(block: &ContentBlock, max_width: f64) -> f64 {
    match block {
        ContentBlock::Paragraph { runs } => {
            let spans = run_spans(runs);
            wrap_runs(runs, max_width, FontFace::Regular, BODY_FONT_SIZE)
                .into_iter()
                .map(|line| styled_width(&spans, line))
                .fold(0.0, f64::max)
                .min(max_width)
        }
        ContentBlock::Link { text, .. } => {
            wrap_text(text, max_width, FontFace::Regular, BODY_FONT_SIZE)
                .into_iter()
                .map(|range| text_width(&text[range], FontFace::Regular, BODY_FONT_SIZE))
                .fold(0.0, f64::max)
        }
        _ => max_width,
    }
}

/// Width of one wrapped line of body text, each run in its own face.
fn styled_width(spans: &[(Range<usize>, &TextRun)], line: Range<usize>) -> f64 {
    spans
        .iter()
        .filter_map(|(range, run)| {
            let start = range.start.max(line.start);
            let end = range.end.min(line.end);
            let offset = range.start;
            (start < end).then(|| {
                let face = run_face(FontFace::Regular, run);
                text_width(&run.text[start - offset..end - offset], face, BODY_FONT_SIZE)
            })
        })
        .sum()
}
