//! Draws measured blocks onto pages.
//!
//! The renderer owns the [`LayoutState`] for one pass. Every block asks the
//! layout rules where to start, then draws line by line; breakable blocks
//! re-check the remaining space before each line, which is where mid-block
//! page breaks happen. Link regions are collected as text is drawn and
//! attached to pages only after the last block.

use std::ops::Range;

use crate::block::{BubbleStyle, ContentBlock, TextRun, runs_text};
use crate::color::Color;
use crate::config::Config;
use crate::document::{Document, DrawOp, Placement};
use crate::error::{ExportError, RenderError};
use crate::geometry::*;
use crate::highlight::{ColorMap, Highlighter, color_map};
use crate::images::ImageStore;
use crate::layout::{
    LayoutState, LinkAnnotation, PageBreak, follow_heading, heading_break, smart_page_break,
};
use crate::measure::{
    MessageFrame, code_content_height, code_lines, image_box, list_item_height, measure, run_face,
    run_spans, wrap_runs,
};
use crate::metrics::{FontFace, text_width};
use crate::progress::{Reporter, Stage};

const FOOTER_FONT_SIZE: f64 = 9.0;

/// Colors and switches the renderer takes from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOptions {
    pub link_color: Color,
    pub underline_links: bool,
    pub code_background: Color,
    pub bubble_background: Color,
    pub bubble_text: Color,
    pub page_numbers: bool,
}

impl RenderOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            link_color: config.link_color(),
            underline_links: config.links.underline,
            code_background: config.code_background(),
            bubble_background: config.bubble_background(),
            bubble_text: config.bubble_text(),
            page_numbers: config.page.numbers,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from_config(&Config::compiled_default())
    }
}

/// Styling inherited by everything inside a message.
#[derive(Debug, Clone, Copy, Default)]
struct Context {
    text_color: Option<Color>,
}

impl Context {
    fn text_color(&self) -> Color {
        self.text_color.unwrap_or(Color::TEXT)
    }
}

#[derive(Debug, Clone, Copy)]
struct TextStyle {
    size: f64,
    bold: bool,
    italic: bool,
    color: Color,
}

impl TextStyle {
    fn body(color: Color) -> Self {
        Self {
            size: BODY_FONT_SIZE,
            bold: false,
            italic: false,
            color,
        }
    }

    fn face(&self) -> FontFace {
        FontFace::for_style(self.bold, self.italic, false)
    }
}

pub struct Renderer<'a> {
    options: &'a RenderOptions,
    highlighter: &'a dyn Highlighter,
    images: &'a ImageStore,
    state: LayoutState,
    doc: Document,
}

impl<'a> Renderer<'a> {
    pub fn new(
        options: &'a RenderOptions,
        highlighter: &'a dyn Highlighter,
        images: &'a ImageStore,
    ) -> Self {
        Self {
            options,
            highlighter,
            images,
            state: LayoutState::new(),
            doc: Document::new(),
        }
    }

    /// Lay out and draw `blocks` in order, then attach link regions.
    pub fn render(
        mut self,
        blocks: &[ContentBlock],
        progress: &mut Reporter<'_>,
    ) -> Result<Document, ExportError> {
        let total = blocks.len();
        progress.report(Stage::Rendering, 0, total);
        for index in 0..total {
            self.place_and_draw(
                blocks,
                index,
                MARGIN_LEFT,
                CONTENT_WIDTH,
                Context::default(),
                Some(index),
            );
            progress.report(Stage::Rendering, index + 1, total);
        }

        self.doc.page_mut(self.state.page_number);
        if self.options.page_numbers {
            self.draw_page_numbers();
        }

        let links = std::mem::take(&mut self.state.links);
        progress.report(Stage::Links, 0, links.len());
        let count = links.len();
        self.doc.apply_links(links)?;
        progress.report(Stage::Links, count, count);

        tracing::debug!(pages = self.doc.page_count(), links = count, "rendered");
        Ok(self.doc)
    }

    /// Decide where `blocks[index]` starts, then draw it. A failure inside
    /// the block is replaced by a placeholder.
    fn place_and_draw(
        &mut self,
        blocks: &[ContentBlock],
        index: usize,
        x: f64,
        width: f64,
        ctx: Context,
        placement: Option<usize>,
    ) {
        let block = &blocks[index];
        let measured = measure(block, width);
        let decision = if block.is_heading() {
            let next = blocks.get(index + 1).map(|next| measure(next, width));
            if heading_break(&self.state, &measured, next.as_ref()) {
                PageBreak::NewPage
            } else {
                PageBreak::Stay
            }
        } else if index > 0 && blocks[index - 1].is_heading() {
            follow_heading(&self.state, &measured)
        } else {
            smart_page_break(&self.state, &measured)
        };

        if !measured.can_break && measured.height > CONTENT_HEIGHT {
            tracing::warn!(
                kind = block.kind(),
                height = measured.height,
                "block is taller than a page and will overflow the bottom margin"
            );
        }
        self.state.apply(decision);

        let start_page = self.state.page_number;
        let start_y = self.state.current_y;
        if let Err(e) = self.draw_block(block, x, width, ctx, measured.can_break) {
            tracing::warn!(kind = block.kind(), "drawing placeholder: {e}");
            self.draw_placeholder(block, x, width, ctx);
        }

        if let Some(block_index) = placement {
            self.doc.placements.push(Placement {
                block_index,
                start_page,
                start_y,
                end_page: self.state.page_number,
                end_y: self.state.current_y,
            });
        }
    }

    fn draw_block(
        &mut self,
        block: &ContentBlock,
        x: f64,
        width: f64,
        ctx: Context,
        breakable: bool,
    ) -> Result<(), RenderError> {
        match block {
            ContentBlock::Paragraph { runs } => {
                self.draw_runs(runs, x, width, TextStyle::body(ctx.text_color()), breakable);
                self.state.current_y += PARAGRAPH_SPACING;
            }
            ContentBlock::Heading { level, runs } => {
                let style = TextStyle {
                    size: heading_font_size(*level),
                    bold: true,
                    ..TextStyle::body(ctx.text_color())
                };
                self.state.current_y += HEADING_SPACING_BEFORE;
                self.draw_runs(runs, x, width, style, false);
                self.state.current_y += HEADING_SPACING_AFTER;
            }
            ContentBlock::Blockquote { runs } => {
                self.draw_blockquote(runs, x, width, ctx, breakable)
            }
            ContentBlock::Link { text, url } => {
                if text.trim().is_empty() {
                    return Err(RenderError::Empty { kind: block.kind() });
                }
                let runs = [TextRun {
                    link: Some(url.clone()),
                    ..TextRun::plain(text.as_str())
                }];
                self.draw_runs(&runs, x, width, TextStyle::body(ctx.text_color()), breakable);
                self.state.current_y += PARAGRAPH_SPACING;
            }
            ContentBlock::CodeBlock {
                code,
                language,
                background,
            } => {
                let background = background.unwrap_or(self.options.code_background);
                self.draw_code(code, language, background, x, width, breakable);
            }
            ContentBlock::List { ordered, items } => {
                if items.is_empty() {
                    return Err(RenderError::Empty { kind: block.kind() });
                }
                self.draw_list(*ordered, items, x, width, ctx);
            }
            ContentBlock::ListItem { runs } => {
                self.draw_list_item(runs, "-", x, width, ctx);
            }
            ContentBlock::Image {
                src,
                width: natural_width,
                height: natural_height,
                ..
            } => {
                let image = self
                    .images
                    .get(src)
                    .ok_or_else(|| RenderError::ImageUnavailable { src: src.clone() })?;
                let (w, h) = image_box(
                    natural_width.or(Some(image.width)),
                    natural_height.or(Some(image.height)),
                    width,
                );
                let name = self.doc.add_image(src, &image.png);
                let y = self.state.current_y;
                self.doc.draw(
                    self.state.page_number,
                    DrawOp::Image {
                        x,
                        y,
                        width: w,
                        height: h,
                        name,
                    },
                );
                self.state.current_y += h + PARAGRAPH_SPACING;
            }
            ContentBlock::HorizontalRule => {
                let y = self.state.current_y + RULE_HEIGHT / 2.0;
                self.doc.draw(
                    self.state.page_number,
                    DrawOp::Line {
                        x1: x,
                        y1: y,
                        x2: x + width,
                        y2: y,
                        color: Color::RULE,
                        thickness: 0.3,
                    },
                );
                self.state.current_y += RULE_HEIGHT;
            }
            ContentBlock::Message { items, bubble, .. } => {
                if items.is_empty() {
                    return Err(RenderError::Empty { kind: block.kind() });
                }
                self.draw_message(block, items, *bubble, x, width, ctx);
            }
        }
        Ok(())
    }

    /// Wrap the concatenated run text once, then split every wrapped line
    /// back into per-run chunks so each chunk keeps its own style.
    /// Returns the page and top of every line drawn.
    fn draw_runs(
        &mut self,
        runs: &[TextRun],
        x: f64,
        width: f64,
        style: TextStyle,
        breakable: bool,
    ) -> Vec<(usize, f64)> {
        let text = runs_text(runs);
        let lines = wrap_runs(runs, width, style.face(), style.size);
        let spans = run_spans(runs);
        let lh = line_height(style.size);

        let mut origins = Vec::with_capacity(lines.len());
        for line in &lines {
            if breakable {
                self.state.ensure_space(lh);
            }
            let y = self.state.current_y;
            origins.push((self.state.page_number, y));
            let mut cursor = x;
            for (range, run) in &spans {
                let start = range.start.max(line.start);
                let end = range.end.min(line.end);
                if start < end {
                    cursor += self.draw_chunk(&text[start..end], run, cursor, y, style);
                }
            }
            self.state.current_y += lh;
        }
        origins
    }

    /// Draw one single-style piece of a line; returns its width.
    fn draw_chunk(&mut self, chunk: &str, run: &TextRun, x: f64, y: f64, style: TextStyle) -> f64 {
        let face = run_face(style.face(), run);
        let width = text_width(chunk, face, style.size);
        let lh = line_height(style.size);
        let page = self.state.page_number;

        if run.code {
            self.doc.draw(
                page,
                DrawOp::Rect {
                    x,
                    y: y + lh * 0.1,
                    width,
                    height: lh * 0.8,
                    fill: Color::INLINE_CODE_BACKGROUND,
                    radius: 0.8,
                },
            );
        }

        let color = match run.link {
            Some(_) => self.options.link_color,
            None => run.color.unwrap_or(style.color),
        };
        self.doc.draw(
            page,
            DrawOp::Text {
                x,
                y,
                text: chunk.to_string(),
                face,
                size: style.size,
                line_height: lh,
                color,
                underline: run.link.is_some() && self.options.underline_links,
            },
        );

        if let Some(url) = &run.link {
            self.state.links.push(LinkAnnotation {
                page,
                x,
                y,
                width,
                height: lh,
                url: url.clone(),
            });
        }
        width
    }

    fn draw_blockquote(
        &mut self,
        runs: &[TextRun],
        x: f64,
        width: f64,
        ctx: Context,
        breakable: bool,
    ) {
        let style = TextStyle {
            italic: true,
            ..TextStyle::body(ctx.text_color.unwrap_or(Color::MUTED))
        };
        let lh = line_height(style.size);
        let text_x = x + BLOCKQUOTE_INDENT;
        let lines = self.draw_runs(runs, text_x, width - BLOCKQUOTE_INDENT, style, breakable);
        for (page, y) in lines {
            self.doc.draw(
                page,
                DrawOp::Line {
                    x1: x + 1.0,
                    y1: y,
                    x2: x + 1.0,
                    y2: y + lh,
                    color: Color::RULE,
                    thickness: 0.8,
                },
            );
        }
        self.state.current_y += PARAGRAPH_SPACING;
    }

    fn draw_code(
        &mut self,
        code: &str,
        language: &str,
        background: Color,
        x: f64,
        width: f64,
        breakable: bool,
    ) {
        let lines = code_lines(code, width);
        let colors = self.code_colors(code, language);
        let lh = line_height(CODE_FONT_SIZE);
        let text_x = x + CODE_BLOCK_PADDING;

        let mut next = 0;
        loop {
            // One background segment per page the block touches.
            let page = self.state.page_number;
            let top = self.state.current_y;
            let mark = self.doc.mark(page);
            let mut y = top + CODE_BLOCK_PADDING;
            let mut drawn = 0;
            while let Some(line) = lines.get(next) {
                if breakable && drawn > 0 && y + lh + CODE_BLOCK_PADDING > PAGE_BOTTOM + 1e-6 {
                    break;
                }
                for (range, color) in code_line_chunks(code, line.range.clone(), &colors) {
                    let before = &code[line.range.start..range.start];
                    let offset = text_width(before, FontFace::Mono, CODE_FONT_SIZE);
                    self.doc.draw(
                        page,
                        DrawOp::Text {
                            x: text_x + offset,
                            y,
                            text: code[range].to_string(),
                            face: FontFace::Mono,
                            size: CODE_FONT_SIZE,
                            line_height: lh,
                            color: color.unwrap_or(Color::TEXT),
                            underline: false,
                        },
                    );
                }
                y += lh;
                next += 1;
                drawn += 1;
            }

            let height = code_content_height(drawn);
            self.doc.insert(
                page,
                mark,
                DrawOp::Rect {
                    x,
                    y: top,
                    width,
                    height,
                    fill: background,
                    radius: 2.0,
                },
            );
            self.state.current_y = top + height;

            if next >= lines.len() {
                break;
            }
            self.state.advance_page();
        }
        self.state.current_y += CODE_BLOCK_MARGIN;
    }

    fn code_colors(&self, code: &str, language: &str) -> ColorMap {
        if language.is_empty() {
            return ColorMap::uncolored(code);
        }
        match self.highlighter.highlight(code, language) {
            Ok(markup) => color_map(code, &markup),
            Err(e) => {
                tracing::warn!("{e}, drawing code uncolored");
                ColorMap::uncolored(code)
            }
        }
    }

    fn draw_list(
        &mut self,
        ordered: bool,
        items: &[ContentBlock],
        x: f64,
        width: f64,
        ctx: Context,
    ) {
        let mut number = 0;
        for item in items {
            match item {
                ContentBlock::ListItem { runs } => {
                    number += 1;
                    let marker = if ordered {
                        format!("{number}.")
                    } else {
                        "-".to_string()
                    };
                    self.draw_list_item(runs, &marker, x, width, ctx);
                }
                ContentBlock::List { ordered, items } => {
                    self.draw_list(*ordered, items, x + LIST_INDENT, width - LIST_INDENT, ctx);
                }
                other => {
                    let (x, width) = (x + LIST_INDENT, width - LIST_INDENT);
                    if let Err(e) = self.draw_block(other, x, width, ctx, true) {
                        tracing::warn!(kind = other.kind(), "drawing placeholder: {e}");
                        self.draw_placeholder(other, x, width, ctx);
                    }
                }
            }
        }
    }

    /// One item: the marker in the indent, the text beside it. An item that
    /// fits on a fresh page is never split.
    fn draw_list_item(&mut self, runs: &[TextRun], marker: &str, x: f64, width: f64, ctx: Context) {
        let text_width = width - LIST_INDENT;
        let height = list_item_height(runs, text_width);
        let lh = line_height(BODY_FONT_SIZE);
        if height <= CONTENT_HEIGHT {
            self.state.ensure_space(height);
        } else {
            self.state.ensure_space(lh);
        }

        let style = TextStyle::body(ctx.text_color());
        let marker_run = TextRun::plain(marker);
        let y = self.state.current_y;
        self.draw_chunk(marker, &marker_run, x, y, style);

        if self.draw_runs(runs, x + LIST_INDENT, text_width, style, true).is_empty() {
            self.state.current_y += lh;
        }
        self.state.current_y += PARAGRAPH_SPACING / 2.0;
    }

    fn draw_message(
        &mut self,
        block: &ContentBlock,
        items: &[ContentBlock],
        bubble: Option<BubbleStyle>,
        x: f64,
        width: f64,
        ctx: Context,
    ) {
        let frame = MessageFrame::new(block, x, width);
        let estimate = measure(block, width).height - MESSAGE_MARGIN;
        let top_page = self.state.page_number;
        let top = self.state.current_y;
        let mark = self.doc.mark(top_page);

        // Only a drawn bubble substitutes its text color.
        let boxed = frame.bubble.zip(bubble);
        let inner = match boxed {
            Some((_, style)) => Context {
                text_color: Some(style.text.unwrap_or(self.options.bubble_text)),
            },
            None => ctx,
        };

        self.state.current_y += MESSAGE_PADDING;
        for index in 0..items.len() {
            self.place_and_draw(items, index, frame.inner_x, frame.inner_width, inner, None);
        }
        // Closing padding stops at the bottom margin; the next block moves on.
        self.state.current_y = (self.state.current_y + MESSAGE_PADDING).min(PAGE_BOTTOM);

        if let Some(((bubble_x, bubble_width), style)) = boxed {
            let fill = style.background.unwrap_or(self.options.bubble_background);
            self.fill_bubble(top_page, top, mark, (bubble_x, bubble_width), fill, estimate);
        }
        self.state.current_y += MESSAGE_MARGIN;
    }

    /// Put the bubble background under content drawn since `mark`, one
    /// rectangle per page the message touched.
    fn fill_bubble(
        &mut self,
        top_page: usize,
        top: f64,
        mark: usize,
        (x, width): (f64, f64),
        fill: Color,
        estimate: f64,
    ) {
        let rect = |y: f64, height: f64| DrawOp::Rect {
            x,
            y,
            width,
            height,
            fill,
            radius: BUBBLE_RADIUS,
        };

        let last_page = self.state.page_number;
        if last_page == top_page {
            let height = (self.state.current_y - top).max(estimate).min(PAGE_BOTTOM - top);
            self.doc.insert(top_page, mark, rect(top, height));
            self.state.current_y = top + height;
            return;
        }

        self.doc.insert(top_page, mark, rect(top, PAGE_BOTTOM - top));
        for page in top_page + 1..last_page {
            self.doc.insert(page, 0, rect(MARGIN_TOP, CONTENT_HEIGHT));
        }
        let bottom = self.state.current_y.min(PAGE_BOTTOM);
        self.doc.insert(last_page, 0, rect(MARGIN_TOP, bottom - MARGIN_TOP));
    }

    fn draw_placeholder(&mut self, block: &ContentBlock, x: f64, width: f64, ctx: Context) {
        let (text, height) = match block {
            ContentBlock::Image { alt, .. } if alt.trim().is_empty() => {
                ("[Image]".to_string(), IMAGE_PLACEHOLDER_HEIGHT)
            }
            ContentBlock::Image { alt, .. } => {
                (format!("[Image: {}]", alt.trim()), IMAGE_PLACEHOLDER_HEIGHT)
            }
            other => (
                format!("[Unable to render {}]", other.kind()),
                line_height(BODY_FONT_SIZE) + PARAGRAPH_SPACING,
            ),
        };
        self.state.ensure_space(height);
        let top = self.state.current_y;
        let style = TextStyle {
            italic: true,
            ..TextStyle::body(ctx.text_color.unwrap_or(Color::MUTED))
        };
        self.draw_runs(&[TextRun::plain(text)], x, width, style, false);
        self.state.current_y = top + height;
    }

    fn draw_page_numbers(&mut self) {
        let pages = self.doc.page_count();
        let lh = line_height(FOOTER_FONT_SIZE);
        let y = PAGE_BOTTOM + (MARGIN_BOTTOM - lh) / 2.0;
        for number in 1..=pages {
            let text = format!("{number} / {pages}");
            let width = text_width(&text, FontFace::Regular, FOOTER_FONT_SIZE);
            self.doc.draw(
                number,
                DrawOp::Text {
                    x: (PAGE_WIDTH - width) / 2.0,
                    y,
                    text,
                    face: FontFace::Regular,
                    size: FOOTER_FONT_SIZE,
                    line_height: lh,
                    color: Color::MUTED,
                    underline: false,
                },
            );
        }
    }
}

/// Byte range of every run within the concatenated run text.
/// Split one wrapped code line into color-contiguous chunks by looking up
/// each character's offset in the unwrapped code.
pub fn code_line_chunks(
    code: &str,
    line: Range<usize>,
    colors: &ColorMap,
) -> Vec<(Range<usize>, Option<Color>)> {
    let mut chunks = Vec::new();
    let mut start = line.start;
    let mut current = colors.at(start);
    for (offset, _) in code[line.clone()].char_indices() {
        let at = line.start + offset;
        let color = colors.at(at);
        if color != current {
            if at > start {
                chunks.push((start..at, current));
            }
            start = at;
            current = color;
        }
    }
    if line.end > start {
        chunks.push((start..line.end, current));
    }
    chunks
}

/// Convenience wrapper around [`Renderer`].
pub fn render(
    blocks: &[ContentBlock],
    options: &RenderOptions,
    highlighter: &dyn Highlighter,
    images: &ImageStore,
    progress: &mut Reporter<'_>,
) -> Result<Document, ExportError> {
    Renderer::new(options, highlighter, images).render(blocks, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::MessageRole;
    use crate::document::Page;
    use crate::highlight::{NoHighlight, SyntectHighlighter};
    use crate::wrap::wrap_code;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const LOREM: &str = "The quick brown fox jumps over the lazy dog while the tortoise \
        keeps walking along the road, slowly but surely, until the race is over and \
        everyone goes home to write it all down in a very long report.";

    fn options() -> RenderOptions {
        RenderOptions {
            page_numbers: false,
            ..RenderOptions::default()
        }
    }

    fn render_with(blocks: &[ContentBlock], options: &RenderOptions) -> Document {
        let images = ImageStore::default();
        render(blocks, options, &NoHighlight, &images, &mut Reporter::default()).unwrap()
    }

    fn render_blocks(blocks: &[ContentBlock]) -> Document {
        render_with(blocks, &options())
    }

    fn texts(page: &Page) -> Vec<(f64, f64, &str)> {
        page.ops
            .iter()
            .filter_map(|op| match op {
                DrawOp::Text { x, y, text, .. } => Some((*x, *y, text.as_str())),
                _ => None,
            })
            .collect()
    }

    fn heading(text: &str) -> ContentBlock {
        ContentBlock::Heading {
            level: 2,
            runs: vec![TextRun::plain(text)],
        }
    }

    fn code(lines: usize, columns: usize) -> ContentBlock {
        ContentBlock::CodeBlock {
            code: vec!["x".repeat(columns); lines].join("\n"),
            language: String::new(),
            background: None,
        }
    }

    fn item(text: &str) -> ContentBlock {
        ContentBlock::ListItem {
            runs: vec![TextRun::plain(text)],
        }
    }

    fn long_document() -> Vec<ContentBlock> {
        let mut blocks = Vec::new();
        for i in 0..30 {
            blocks.push(heading(&format!("Section {i}")));
            blocks.push(ContentBlock::paragraph(LOREM));
            if i % 3 == 0 {
                blocks.push(code(12, 40));
            }
            if i % 4 == 0 {
                blocks.push(ContentBlock::List {
                    ordered: true,
                    items: vec![item(LOREM), item("short"), item(LOREM)],
                });
            }
            if i % 5 == 0 {
                blocks.push(ContentBlock::Message {
                    role: MessageRole::User,
                    items: (0..i + 3).map(|_| ContentBlock::paragraph("filler")).collect(),
                    bubble: Some(BubbleStyle::default()),
                });
                blocks.push(ContentBlock::Message {
                    role: MessageRole::Assistant,
                    items: vec![ContentBlock::paragraph(LOREM), code(4, 30)],
                    bubble: None,
                });
            }
        }
        blocks.push(code(70, 60));
        blocks
    }

    #[test]
    fn content_stays_inside_the_page() {
        let doc = render_blocks(&long_document());
        assert!(doc.page_count() > 3);
        for page in &doc.pages {
            for op in &page.ops {
                let (top, bottom) = match op {
                    DrawOp::Text { y, line_height, .. } => (*y, y + line_height),
                    DrawOp::Rect { y, height, .. } => (*y, y + height),
                    _ => continue,
                };
                assert!(top >= MARGIN_TOP - 1e-6, "{op:?}");
                assert!(bottom <= PAGE_BOTTOM + 1e-6, "{op:?}");
            }
        }
    }

    #[test]
    fn headings_share_a_page_with_their_follower() {
        let blocks = long_document();
        let doc = render_blocks(&blocks);
        for (index, block) in blocks.iter().enumerate().take(blocks.len() - 1) {
            if !block.is_heading() {
                continue;
            }
            let heading = doc.placements[index];
            let next = doc.placements[index + 1];
            let starts_page = (heading.start_y - MARGIN_TOP).abs() < 1e-6;
            assert!(
                heading.end_page == next.start_page || starts_page,
                "heading {index} separated from its follower"
            );
        }
    }

    #[test]
    fn heading_moves_when_its_code_block_does_not_fit() {
        let mut blocks: Vec<ContentBlock> =
            (0..20).map(|_| ContentBlock::paragraph("Hello world")).collect();
        blocks.push(heading("Example"));
        blocks.push(code(10, 20));
        let doc = render_blocks(&blocks);
        assert_eq!(doc.placements[19].end_page, 1);
        assert_eq!(doc.placements[20].start_page, 2);
        assert_eq!(doc.placements[21].start_page, 2);
    }

    #[test]
    fn drawn_height_matches_measured_height() {
        let blocks = vec![
            ContentBlock::paragraph(LOREM),
            code(5, 30),
            ContentBlock::List {
                ordered: false,
                items: vec![item("a"), item(LOREM)],
            },
        ];
        let doc = render_blocks(&blocks);
        for (block, placement) in blocks.iter().zip(&doc.placements) {
            let measured = measure(block, CONTENT_WIDTH).height;
            let drawn = placement.end_y - placement.start_y;
            assert!((drawn - measured).abs() < 1e-6, "{}", block.kind());
        }
    }

    #[test]
    fn long_code_breaks_between_whole_lines() {
        let doc = render_blocks(&[code(50, 80)]);
        assert!(doc.page_count() >= 2);

        let mut lines = 0;
        for page in &doc.pages {
            for op in &page.ops {
                if let DrawOp::Text { y, text, line_height, .. } = op {
                    assert_eq!(text.len(), 80);
                    assert!(y + line_height <= PAGE_BOTTOM - CODE_BLOCK_PADDING + 1e-6);
                    lines += 1;
                }
            }
            let backgrounds = page
                .ops
                .iter()
                .filter(|op| {
                    matches!(op, DrawOp::Rect { fill, .. } if *fill == Color::CODE_BACKGROUND)
                })
                .count();
            assert_eq!(backgrounds, 1);
            assert!(matches!(page.ops[0], DrawOp::Rect { .. }));
        }
        assert_eq!(lines, 50);
    }

    #[test]
    fn nested_list_markers() {
        let blocks = [ContentBlock::List {
            ordered: false,
            items: vec![
                item("one"),
                ContentBlock::List {
                    ordered: true,
                    items: vec![item("inner a"), item("inner b")],
                },
                item("two"),
            ],
        }];
        let doc = render_blocks(&blocks);
        let all = texts(&doc.pages[0]);
        let markers: Vec<(f64, &str)> = all
            .iter()
            .filter(|(_, _, text)| ["-", "1.", "2."].contains(text))
            .map(|(x, _, text)| (*x, *text))
            .collect();
        assert_eq!(
            markers,
            vec![
                (MARGIN_LEFT, "-"),
                (MARGIN_LEFT + LIST_INDENT, "1."),
                (MARGIN_LEFT + LIST_INDENT, "2."),
                (MARGIN_LEFT, "-"),
            ]
        );
        let inner = all.iter().find(|(_, _, text)| *text == "inner a").unwrap();
        assert_eq!(inner.0, MARGIN_LEFT + 2.0 * LIST_INDENT);
    }

    #[test]
    fn user_message_without_bubble_draws_no_box() {
        let blocks = [ContentBlock::Message {
            role: MessageRole::User,
            items: vec![ContentBlock::paragraph("plain question")],
            bubble: None,
        }];
        let doc = render_blocks(&blocks);
        let page = &doc.pages[0];
        assert!(!page.ops.iter().any(|op| matches!(op, DrawOp::Rect { .. })));
        assert_eq!(texts(page)[0].0, MARGIN_LEFT);
    }

    #[test]
    fn user_bubble_is_drawn_under_its_text() {
        let blocks = [ContentBlock::Message {
            role: MessageRole::User,
            items: vec![ContentBlock::paragraph("hello there")],
            bubble: Some(BubbleStyle::default()),
        }];
        let options = options();
        let doc = render_with(&blocks, &options);
        let page = &doc.pages[0];
        let DrawOp::Rect { x, width, fill, .. } = &page.ops[0] else {
            panic!("expected bubble first, got {:?}", page.ops[0]);
        };
        assert_eq!(*fill, options.bubble_background);
        assert!((x + width - (MARGIN_LEFT + CONTENT_WIDTH)).abs() < 1e-6);

        let DrawOp::Text { color, .. } = &page.ops[1] else {
            panic!("expected text");
        };
        assert_eq!(*color, options.bubble_text);
    }

    #[test]
    fn bubble_spanning_pages_gets_a_background_per_page() {
        let blocks = [ContentBlock::Message {
            role: MessageRole::User,
            items: (0..40).map(|_| ContentBlock::paragraph(LOREM)).collect(),
            bubble: Some(BubbleStyle::default()),
        }];
        let doc = render_blocks(&blocks);
        assert!(doc.page_count() >= 2);
        for page in &doc.pages {
            assert!(matches!(page.ops[0], DrawOp::Rect { .. }));
        }
    }

    #[rstest]
    fn bubble_never_crosses_the_bottom_margin(
        #[values(20, 22, 23, 24, 25, 26, 28, 50)] fillers: usize,
    ) {
        let blocks = [ContentBlock::Message {
            role: MessageRole::User,
            items: (0..fillers).map(|_| ContentBlock::paragraph("filler")).collect(),
            bubble: Some(BubbleStyle::default()),
        }];
        let doc = render_blocks(&blocks);
        for (number, page) in (1..).zip(&doc.pages) {
            for op in &page.ops {
                if let DrawOp::Rect { y, height, .. } = op {
                    let bottom = y + height;
                    assert!(bottom <= PAGE_BOTTOM + 1e-6, "page {number} rect ends at {bottom}");
                }
            }
        }
    }

    #[test]
    fn bold_heavy_lines_stay_inside_the_column() {
        let runs: Vec<TextRun> = (0..40)
            .map(|i| TextRun {
                bold: i % 2 == 0,
                ..TextRun::plain("Wide MMMM words ")
            })
            .collect();
        let doc = render_blocks(&[ContentBlock::Paragraph { runs }]);
        let right = MARGIN_LEFT + CONTENT_WIDTH;
        for op in &doc.pages[0].ops {
            if let DrawOp::Text { x, text, face, size, .. } = op {
                let end = x + text_width(text.trim_end(), *face, *size);
                assert!(end <= right + 1e-6, "{text:?} ends at {end}");
            }
        }
    }

    #[test]
    fn runs_keep_their_styles_across_wrapped_lines() {
        let mut runs: Vec<TextRun> = (0..30).map(|_| TextRun::plain("word ")).collect();
        runs.push(TextRun {
            bold: true,
            ..TextRun::plain("strong")
        });
        runs.push(TextRun {
            link: Some("https://example.com".to_string()),
            ..TextRun::plain(" linked text")
        });
        let doc = render_blocks(&[ContentBlock::Paragraph { runs: runs.clone() }]);
        let page = &doc.pages[0];

        let mut lines: Vec<(f64, String)> = Vec::new();
        for (_, y, text) in texts(page) {
            match lines.last_mut() {
                Some((line_y, line)) if *line_y == y => line.push_str(text),
                _ => lines.push((y, text.to_string())),
            }
        }
        assert!(lines.len() > 1);
        let joined: Vec<String> = lines.into_iter().map(|(_, line)| line).collect();
        assert_eq!(joined.join(" "), runs_text(&runs));

        let bold = page.ops.iter().find_map(|op| match op {
            DrawOp::Text { text, face, .. } if text == "strong" => Some(*face),
            _ => None,
        });
        assert_eq!(bold, Some(FontFace::Bold));
        assert_eq!(page.links.len(), 1);
        assert_eq!(page.links[0].url, "https://example.com");
    }

    #[test]
    fn links_land_on_the_page_they_are_drawn_on() {
        let mut blocks: Vec<ContentBlock> =
            (0..30).map(|_| ContentBlock::paragraph("filler")).collect();
        blocks.push(ContentBlock::Link {
            text: "docs".to_string(),
            url: "https://docs.example.com".to_string(),
        });
        let doc = render_blocks(&blocks);
        assert_eq!(doc.pages[0].links.len(), 0);
        assert_eq!(doc.pages[1].links.len(), 1);
        assert_eq!(doc.links().count(), 1);
    }

    #[test]
    fn missing_image_becomes_a_placeholder() {
        let blocks = [
            ContentBlock::Image {
                src: "https://example.com/cat.png".to_string(),
                alt: "a cat".to_string(),
                width: Some(100),
                height: Some(100),
            },
            ContentBlock::paragraph("after"),
        ];
        let doc = render_blocks(&blocks);
        let all = texts(&doc.pages[0]);
        assert_eq!(all[0].2, "[Image: a cat]");
        assert_eq!(all[1].2, "after");
        let placement = doc.placements[0];
        assert!((placement.end_y - placement.start_y - IMAGE_PLACEHOLDER_HEIGHT).abs() < 1e-6);
    }

    #[test]
    fn loaded_image_is_embedded() {
        let mut images = ImageStore::default();
        images.insert(
            "a.png",
            crate::images::LoadedImage {
                png: vec![1, 2, 3],
                width: 400,
                height: 200,
            },
        );
        let blocks = [ContentBlock::Image {
            src: "a.png".to_string(),
            alt: String::new(),
            width: None,
            height: None,
        }];
        let mut progress = Reporter::default();
        let doc = render(&blocks, &options(), &NoHighlight, &images, &mut progress).unwrap();
        assert_eq!(doc.images.len(), 1);
        let DrawOp::Image { width, height, name, .. } = &doc.pages[0].ops[0] else {
            panic!("expected image");
        };
        assert_eq!(name, &doc.images[0].name);
        assert!((width - 400.0 * PX_TO_MM).abs() < 1e-6);
        assert!((height - width / 2.0).abs() < 1e-6);
    }

    #[test]
    fn broken_block_does_not_stop_the_document() {
        let blocks = [
            ContentBlock::List {
                ordered: false,
                items: Vec::new(),
            },
            ContentBlock::paragraph("still here"),
        ];
        let doc = render_blocks(&blocks);
        let all = texts(&doc.pages[0]);
        assert_eq!(all[0].2, "[Unable to render list]");
        assert_eq!(all[1].2, "still here");
    }

    #[test]
    fn page_numbers_are_added_last() {
        let blocks: Vec<ContentBlock> =
            (0..40).map(|_| ContentBlock::paragraph("filler")).collect();
        let doc = render_with(&blocks, &RenderOptions::default());
        assert_eq!(doc.page_count(), 2);
        let last = texts(&doc.pages[1]);
        assert_eq!(last.last().map(|t| t.2), Some("2 / 2"));
    }

    #[test]
    fn code_chunks_reproduce_the_code_exactly() {
        let code =
            "fn main() {\n    let total = compute(alpha, beta, gamma);\n\n    println!(\"{total}\");\n}";
        let markup = SyntectHighlighter::default().highlight(code, "rust").unwrap();
        let colors = color_map(code, &markup);

        let mut rebuilt = String::new();
        for line in wrap_code(code, 40.0, CODE_FONT_SIZE) {
            for (range, _) in code_line_chunks(code, line.range.clone(), &colors) {
                rebuilt.push_str(&code[range]);
            }
            if line.ends_source_line {
                rebuilt.push('\n');
            }
        }
        assert_eq!(rebuilt, code);
    }

    #[test]
    fn chunks_split_where_color_changes() {
        let code = "let x";
        let colors = color_map(code, r#"<span style="color:red">let</span> x"#);
        let chunks = code_line_chunks(code, 0..code.len(), &colors);
        assert_eq!(
            chunks,
            vec![(0..3, Some(Color::rgb(255, 0, 0))), (3..5, None)]
        );
    }
}
