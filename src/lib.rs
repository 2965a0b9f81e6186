//! Chat transcript markup to paginated PDF.
//!
//! The pipeline runs in one forward pass: markup fragments are parsed into
//! [`ContentBlock`]s, images are fetched, blocks are measured and laid out
//! onto A4 pages, and the finished page model is compiled by Typst.

pub mod block;
pub mod color;
pub mod config;
pub mod document;
pub mod dom;
pub mod error;
pub mod geometry;
pub mod highlight;
pub mod images;
mod language;
pub mod layout;
pub mod measure;
pub mod metrics;
pub mod parser;
pub mod progress;
pub mod render;
pub mod typst;
pub mod wrap;

pub use block::{BubbleStyle, ContentBlock, MessageRole, TextRun};
pub use config::Config;
pub use document::{Document, DrawOp, Placement};
pub use error::{ExportError, RenderError};
pub use highlight::{Highlighter, NoHighlight, SyntectHighlighter};
pub use images::{DefaultImageSource, ImageSource, ImageStore, LoadedImage};
pub use layout::{LayoutState, LinkAnnotation, PageBreak};
pub use measure::{MeasuredBlock, measure};
pub use parser::{ParseOptions, parse_fragments, parse_html};
pub use progress::{Progress, Reporter, Stage};
pub use render::{RenderOptions, Renderer};

use url::Url;

/// A finished export.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub pdf: Vec<u8>,
    pub links: Vec<LinkAnnotation>,
    pub page_count: usize,
}

/// Runs the whole pipeline for one set of fragments.
pub struct Exporter<'a> {
    config: Config,
    parse: ParseOptions,
    highlighter: Box<dyn Highlighter + Send + Sync + 'a>,
    progress: Reporter<'a>,
}

impl<'a> Exporter<'a> {
    pub fn new(config: Config) -> Self {
        let highlighter: Box<dyn Highlighter + Send + Sync> = if config.code.highlight {
            Box::new(SyntectHighlighter::new(&config.code.theme))
        } else {
            Box::new(NoHighlight)
        };
        Self {
            config,
            parse: ParseOptions::default(),
            highlighter,
            progress: Reporter::default(),
        }
    }

    pub fn base_url(mut self, url: Url) -> Self {
        self.parse.base_url = Some(url);
        self
    }

    pub fn highlighter(mut self, highlighter: impl Highlighter + Send + Sync + 'a) -> Self {
        self.highlighter = Box::new(highlighter);
        self
    }

    pub fn on_progress(mut self, sink: &'a mut (dyn FnMut(Progress) + Send)) -> Self {
        self.progress = Reporter::new(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parse each fragment in order into one block sequence.
    pub fn parse(&mut self, fragments: &[&str]) -> Vec<ContentBlock> {
        let total = fragments.len();
        let mut blocks = Vec::new();
        self.progress.report(Stage::Parsing, 0, total);
        for (index, fragment) in fragments.iter().enumerate() {
            blocks.extend(parse_html(fragment, &self.parse));
            self.progress.report(Stage::Parsing, index + 1, total);
        }
        tracing::debug!(fragments = total, blocks = blocks.len(), "parsed");
        blocks
    }

    /// Parse, fetch images and lay out pages.
    pub async fn render<S: ImageSource>(
        &mut self,
        fragments: &[&str],
        source: &S,
    ) -> Result<Document, ExportError> {
        let blocks = self.parse(fragments);
        self.render_blocks(blocks, source).await
    }

    /// Lay out already parsed blocks. An empty sequence is
    /// [`ExportError::NothingToExport`].
    pub async fn render_blocks<S: ImageSource>(
        &mut self,
        mut blocks: Vec<ContentBlock>,
        source: &S,
    ) -> Result<Document, ExportError> {
        if blocks.is_empty() {
            return Err(ExportError::NothingToExport);
        }

        let timeout = self.config.images.timeout();
        let store = images::prefetch(&blocks, source, timeout, &mut self.progress).await;
        images::fill_dimensions(&mut blocks, &store);

        let options = RenderOptions::from_config(&self.config);
        Renderer::new(&options, &*self.highlighter, &store).render(&blocks, &mut self.progress)
    }

    pub fn to_typst(&self, doc: &Document) -> String {
        typst::document_to_typst(doc, &self.config)
    }

    pub fn to_pdf(&mut self, doc: &Document) -> Result<ExportOutput, ExportError> {
        self.progress.report(Stage::Encoding, 0, 1);
        let pdf = typst::markup_to_pdf(self.to_typst(doc), &self.config)?;
        self.progress.report(Stage::Encoding, 1, 1);
        tracing::info!(pages = doc.page_count(), bytes = pdf.len(), "pdf encoded");
        Ok(ExportOutput {
            pdf,
            links: doc.links().cloned().collect(),
            page_count: doc.page_count(),
        })
    }

    pub async fn export<S: ImageSource>(
        &mut self,
        fragments: &[&str],
        source: &S,
    ) -> Result<ExportOutput, ExportError> {
        let doc = self.render(fragments, source).await?;
        self.to_pdf(&doc)
    }
}

/// Convert markup fragments to Typst markup.
pub async fn html_to_typst(fragments: &[&str], config: &Config) -> Result<String, ExportError> {
    let source = DefaultImageSource::new(config.images.fetch_remote);
    let mut exporter = Exporter::new(config.clone());
    let doc = exporter.render(fragments, &source).await?;
    Ok(exporter.to_typst(&doc))
}

/// Convert markup fragments to PDF bytes.
pub async fn html_to_pdf(fragments: &[&str], config: &Config) -> Result<ExportOutput, ExportError> {
    let source = DefaultImageSource::new(config.images.fetch_remote);
    Exporter::new(config.clone()).export(fragments, &source).await
}
