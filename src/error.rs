use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    /// The input produced no blocks at all.
    #[error("nothing to export: no content was found in the input")]
    NothingToExport,

    #[error("link annotation refers to page {page}, but the document has {pages} pages")]
    MissingPage { page: usize, pages: usize },

    #[error("typst compilation failed: {0}")]
    Compile(String),

    #[error("PDF export failed: {0}")]
    Pdf(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    Config { path: PathBuf, message: String },
}

impl ExportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A failure confined to one block. The renderer draws a placeholder and
/// carries on with the next block.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("image {src} is not available")]
    ImageUnavailable { src: String },

    #[error("highlighter failed for {language}: {message}")]
    Highlight { language: String, message: String },

    #[error("{kind} block has no drawable content")]
    Empty { kind: &'static str },
}
