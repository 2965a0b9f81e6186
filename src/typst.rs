//! Page model to Typst markup, and Typst markup to PDF.
//!
//! Layout is already final when a [`Document`] reaches this module, so every
//! element is emitted with `#place` at its absolute position on a margin-less
//! page. Typst only shapes glyphs, embeds images and writes the PDF.

use std::fmt::Write as _;

use typst_as_lib::TypstEngine;
use typst_as_lib::typst_kit_options::TypstKitFontOptions;
use typst_library::layout::PagedDocument;
use typst_pdf::PdfOptions;

use crate::color::Color;
use crate::config::Config;
use crate::document::{Document, DrawOp};
use crate::error::ExportError;
use crate::geometry::{PAGE_HEIGHT, PAGE_WIDTH};
use crate::metrics::FontFace;

/// Convert a rendered document to Typst markup.
pub fn document_to_typst(doc: &Document, config: &Config) -> String {
    let mut out = String::new();

    if let Some(title) = config.document.title.as_deref().filter(|t| !t.trim().is_empty()) {
        let _ = writeln!(out, "#set document(title: {})", string_literal(title));
    }
    let _ = writeln!(
        out,
        "#set page(width: {}, height: {}, margin: 0mm)",
        mm(PAGE_WIDTH),
        mm(PAGE_HEIGHT)
    );
    let _ = writeln!(
        out,
        "#set text(font: {}, hyphenate: false)",
        string_literal(&config.font.body)
    );
    out.push('\n');

    for (index, image) in doc.images.iter().enumerate() {
        let _ = writeln!(out, "#let {} = bytes(({}))", image_binding(index), byte_list(&image.png));
    }
    if !doc.images.is_empty() {
        out.push('\n');
    }

    for (number, page) in doc.pages.iter().enumerate() {
        if number > 0 {
            out.push_str("#pagebreak()\n");
        }
        for op in &page.ops {
            emit_op(op, doc, config, &mut out);
        }
        for link in &page.links {
            let _ = writeln!(
                out,
                "#place(top + left, dx: {}, dy: {}, link({}, box(width: {}, height: {})))",
                mm(link.x),
                mm(link.y),
                string_literal(&link.url),
                mm(link.width),
                mm(link.height)
            );
        }
    }
    out
}

fn emit_op(op: &DrawOp, doc: &Document, config: &Config, out: &mut String) {
    match op {
        DrawOp::Text {
            x,
            y,
            text,
            face,
            size,
            line_height,
            color,
            underline,
        } => {
            let mut styled = format!("text(size: {size:.2}pt, fill: {}", rgb(*color));
            if *face == FontFace::Mono {
                let _ = write!(styled, ", font: {}", string_literal(&config.font.mono));
            }
            if face.is_bold() {
                styled.push_str(", weight: \"bold\"");
            }
            if face.is_italic() {
                styled.push_str(", style: \"italic\"");
            }
            let _ = write!(styled, ", {})", string_literal(&text.replace(' ', "\u{a0}")));
            if *underline {
                styled = format!("underline({styled})");
            }
            let _ = writeln!(
                out,
                "#place(top + left, dx: {}, dy: {}, box(height: {}, align(horizon, {styled})))",
                mm(*x),
                mm(*y),
                mm(*line_height)
            );
        }
        DrawOp::Rect {
            x,
            y,
            width,
            height,
            fill,
            radius,
        } => {
            let _ = writeln!(
                out,
                "#place(top + left, dx: {}, dy: {}, rect(width: {}, height: {}, fill: {}, radius: {}))",
                mm(*x),
                mm(*y),
                mm(*width),
                mm(*height),
                rgb(*fill),
                mm(*radius)
            );
        }
        DrawOp::Line {
            x1,
            y1,
            x2,
            y2,
            color,
            thickness,
        } => {
            let _ = writeln!(
                out,
                "#place(top + left, dx: {}, dy: {}, line(start: (0mm, 0mm), end: ({}, {}), stroke: {} + {}))",
                mm(*x1),
                mm(*y1),
                mm(x2 - x1),
                mm(y2 - y1),
                mm(*thickness),
                rgb(*color)
            );
        }
        DrawOp::Image {
            x,
            y,
            width,
            height,
            name,
        } => {
            let Some(index) = doc.images.iter().position(|image| &image.name == name) else {
                tracing::warn!(name, "draw operation refers to an unknown image");
                return;
            };
            let _ = writeln!(
                out,
                "#place(top + left, dx: {}, dy: {}, image({}, width: {}, height: {}, fit: \"stretch\"))",
                mm(*x),
                mm(*y),
                image_binding(index),
                mm(*width),
                mm(*height)
            );
        }
    }
}

fn mm(value: f64) -> String {
    format!("{value:.3}mm")
}

fn rgb(color: Color) -> String {
    format!("rgb(\"{}\")", color.to_hex())
}

fn image_binding(index: usize) -> String {
    format!("image-{index}")
}

fn byte_list(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 4);
    for (index, byte) in bytes.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        let _ = write!(out, "{byte}");
    }
    // A one-element array needs a trailing comma.
    if bytes.len() == 1 {
        out.push(',');
    }
    out
}

/// A Typst string literal.
fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Compile Typst markup to a paged document.
pub fn compile(markup: String, config: &Config) -> Result<PagedDocument, ExportError> {
    let font_options = TypstKitFontOptions::new()
        .include_embedded_fonts(true)
        .include_system_fonts(config.font.system_fonts);

    let engine = TypstEngine::builder()
        .main_file(markup)
        .search_fonts_with(font_options)
        .build();

    engine
        .compile()
        .output
        .map_err(|e| ExportError::Compile(format!("{e:?}")))
}

/// Compile Typst markup straight to PDF bytes.
pub fn markup_to_pdf(markup: String, config: &Config) -> Result<Vec<u8>, ExportError> {
    let doc = compile(markup, config)?;
    typst_pdf::pdf(&doc, &PdfOptions::default()).map_err(|e| ExportError::Pdf(format!("{e:?}")))
}
