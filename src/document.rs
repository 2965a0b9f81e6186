//! The rendered page model: absolutely positioned drawing operations per
//! page, the image files they reference, and link regions.

use crate::color::Color;
use crate::error::ExportError;
use crate::layout::LinkAnnotation;
use crate::metrics::FontFace;

/// One positioned drawing primitive. Coordinates are millimetres from the
/// page's top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// A single-line text chunk whose line box starts at `y`.
    Text {
        x: f64,
        y: f64,
        text: String,
        face: FontFace,
        size: f64,
        line_height: f64,
        color: Color,
        underline: bool,
    },
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        fill: Color,
        radius: f64,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        color: Color,
        thickness: f64,
    },
    Image {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        /// Virtual file name of an entry in [`Document::images`].
        name: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub ops: Vec<DrawOp>,
    pub links: Vec<LinkAnnotation>,
}

/// An encoded image embedded in the output.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageResource {
    pub name: String,
    pub png: Vec<u8>,
}

/// Where a top-level block landed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub block_index: usize,
    pub start_page: usize,
    pub start_y: f64,
    pub end_page: usize,
    pub end_y: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub pages: Vec<Page>,
    pub images: Vec<ImageResource>,
    pub placements: Vec<Placement>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// The page with 1-based `number`, creating it and any pages before it.
    pub fn page_mut(&mut self, number: usize) -> &mut Page {
        let number = number.max(1);
        if self.pages.len() < number {
            self.pages.resize_with(number, Page::default);
        }
        &mut self.pages[number - 1]
    }

    pub fn draw(&mut self, page: usize, op: DrawOp) {
        self.page_mut(page).ops.push(op);
    }

    /// Position in `page`'s operation list; pass it to [`Document::insert`]
    /// to draw something underneath everything added since.
    pub fn mark(&mut self, page: usize) -> usize {
        self.page_mut(page).ops.len()
    }

    pub fn insert(&mut self, page: usize, at: usize, op: DrawOp) {
        let ops = &mut self.page_mut(page).ops;
        let at = at.min(ops.len());
        ops.insert(at, op);
    }

    /// Register an image and return the name draw operations refer to it by.
    /// Identical image data is stored once.
    pub fn add_image(&mut self, key: &str, png: &[u8]) -> String {
        let existing = self.images.iter().position(|image| image.png == png);
        if let Some(index) = existing {
            return self.images[index].name.clone();
        }
        let name = format!("image-{}-{}.png", self.images.len(), short_hash(key));
        self.images.push(ImageResource {
            name: name.clone(),
            png: png.to_vec(),
        });
        name
    }

    /// Attach collected link regions to their pages. Every referenced page
    /// must already exist.
    pub fn apply_links(&mut self, links: Vec<LinkAnnotation>) -> Result<(), ExportError> {
        let pages = self.pages.len();
        if let Some(bad) = links.iter().find(|link| link.page == 0 || link.page > pages) {
            return Err(ExportError::MissingPage {
                page: bad.page,
                pages,
            });
        }
        for link in links {
            self.pages[link.page - 1].links.push(link);
        }
        Ok(())
    }

    pub fn links(&self) -> impl Iterator<Item = &LinkAnnotation> {
        self.pages.iter().flat_map(|page| page.links.iter())
    }
}

fn short_hash(key: &str) -> u32 {
    key.bytes()
        .fold(0x811c_9dc5_u32, |hash, byte| (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193))
}
