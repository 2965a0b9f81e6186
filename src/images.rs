//! Image acquisition. Everything asynchronous in an export happens here,
//! before layout starts; the renderer only reads the finished store.

use std::collections::HashMap;
use std::future::Future;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use url::Url;

use crate::block::ContentBlock;
use crate::progress::{Reporter, Stage};

const PNG_MAGIC: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("fetch failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed data URL")]
    DataUrl,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decode: {0}")]
    Decode(#[from] image::ImageError),
    #[error("remote images are disabled")]
    RemoteDisabled,
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("decode task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A decoded image, re-encoded as PNG for embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub trait ImageSource {
    fn load(&self, src: &str) -> impl Future<Output = Result<LoadedImage, LoadError>> + Send;
}

/// Loads `http(s)` URLs, `data:` URLs and local files.
#[derive(Debug, Clone)]
pub struct DefaultImageSource {
    http: reqwest::Client,
    fetch_remote: bool,
}

impl DefaultImageSource {
    pub fn new(fetch_remote: bool) -> Self {
        Self {
            http: reqwest::Client::new(),
            fetch_remote,
        }
    }

    async fn bytes(&self, src: &str) -> Result<Vec<u8>, LoadError> {
        if let Some(payload) = src.strip_prefix("data:") {
            return decode_data_url(payload);
        }
        if src.starts_with("http://") || src.starts_with("https://") {
            if !self.fetch_remote {
                return Err(LoadError::RemoteDisabled);
            }
            let response = self.http.get(src).send().await?.error_for_status()?;
            return Ok(response.bytes().await?.to_vec());
        }

        let path = Url::parse(src)
            .ok()
            .filter(|url| url.scheme() == "file")
            .and_then(|url| url.to_file_path().ok())
            .unwrap_or_else(|| PathBuf::from(src));
        tokio::fs::read(&path)
            .await
            .map_err(|source| LoadError::Io { path, source })
    }
}

impl Default for DefaultImageSource {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ImageSource for DefaultImageSource {
    async fn load(&self, src: &str) -> Result<LoadedImage, LoadError> {
        let data = self.bytes(src).await?;
        // Decoding is CPU-bound and runs on the blocking pool.
        tokio::task::spawn_blocking(move || decode_to_png(data)).await?
    }
}

fn decode_data_url(payload: &str) -> Result<Vec<u8>, LoadError> {
    let (meta, data) = payload.split_once(',').ok_or(LoadError::DataUrl)?;
    if meta.ends_with(";base64") {
        let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
        Ok(STANDARD.decode(compact)?)
    } else {
        Ok(data.as_bytes().to_vec())
    }
}

/// Decode any supported format and return PNG bytes with the natural size.
/// PNG input is passed through unchanged.
pub fn decode_to_png(data: Vec<u8>) -> Result<LoadedImage, LoadError> {
    let reader = image::ImageReader::new(Cursor::new(&data))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?;
    if data.starts_with(&PNG_MAGIC) {
        let (width, height) = reader.into_dimensions()?;
        return Ok(LoadedImage {
            png: data,
            width,
            height,
        });
    }

    let decoded = reader.decode()?;
    let (width, height) = (decoded.width(), decoded.height());
    let mut png = Vec::new();
    decoded.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;
    Ok(LoadedImage { png, width, height })
}

/// Images loaded ahead of rendering, keyed by `src`. Sources that failed are
/// absent.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    images: HashMap<String, LoadedImage>,
}

impl ImageStore {
    pub fn get(&self, src: &str) -> Option<&LoadedImage> {
        self.images.get(src)
    }

    pub fn insert(&mut self, src: impl Into<String>, image: LoadedImage) {
        self.images.insert(src.into(), image);
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// Every distinct image `src` in document order.
pub fn image_sources(blocks: &[ContentBlock]) -> Vec<&str> {
    let mut sources: Vec<&str> = Vec::new();
    for block in blocks {
        block.walk(&mut |block| {
            if let ContentBlock::Image { src, .. } = block
                && !src.is_empty()
                && !sources.contains(&src.as_str())
            {
                sources.push(src);
            }
        });
    }
    sources
}

/// Give images without markup dimensions the natural size of what was
/// loaded, so measuring and drawing agree on their height.
pub fn fill_dimensions(blocks: &mut [ContentBlock], store: &ImageStore) {
    for block in blocks {
        match block {
            ContentBlock::Image {
                src, width, height, ..
            } => {
                if let Some(image) = store.get(src)
                    && (width.is_none() || height.is_none())
                {
                    *width = Some(image.width);
                    *height = Some(image.height);
                }
            }
            ContentBlock::List { items, .. } | ContentBlock::Message { items, .. } => {
                fill_dimensions(items, store);
            }
            _ => {}
        }
    }
}

/// Load every image one at a time, each bounded by `timeout`. Loads never
/// overlap, so a slow image delays the export but cannot reorder it.
pub async fn prefetch<S: ImageSource>(
    blocks: &[ContentBlock],
    source: &S,
    timeout: Duration,
    progress: &mut Reporter<'_>,
) -> ImageStore {
    let sources = image_sources(blocks);
    let total = sources.len();
    let mut store = ImageStore::default();
    progress.report(Stage::LoadingImages, 0, total);

    for (index, src) in sources.into_iter().enumerate() {
        let result = match tokio::time::timeout(timeout, source.load(src)).await {
            Ok(result) => result,
            Err(_) => Err(LoadError::Timeout(timeout)),
        };
        match result {
            Ok(image) => {
                tracing::debug!(src, width = image.width, height = image.height, "image loaded");
                store.insert(src, image);
            }
            Err(e) => tracing::warn!(src, "image unavailable: {e}"),
        }
        progress.report(Stage::LoadingImages, index + 1, total);
    }
    store
}
