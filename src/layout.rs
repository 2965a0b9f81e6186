//! The layout cursor and page-break decisions.

use crate::geometry::{BODY_FONT_SIZE, CONTENT_HEIGHT, MARGIN_TOP, PAGE_BOTTOM, line_height};
use crate::measure::MeasuredBlock;

/// Slack for accumulated floating point error when comparing positions.
const EPSILON: f64 = 1e-6;

/// A clickable region, recorded while drawing and applied once every page
/// exists. Coordinates are millimetres from the page's top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkAnnotation {
    /// 1-based page number.
    pub page: usize,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub url: String,
}

/// The cursor threaded through one conversion pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutState {
    pub current_y: f64,
    /// 1-based.
    pub page_number: usize,
    pub links: Vec<LinkAnnotation>,
}

impl Default for LayoutState {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutState {
    pub fn new() -> Self {
        Self {
            current_y: MARGIN_TOP,
            page_number: 1,
            links: Vec::new(),
        }
    }

    /// Space left above the bottom margin.
    pub fn remaining(&self) -> f64 {
        PAGE_BOTTOM - self.current_y
    }

    pub fn fits(&self, height: f64) -> bool {
        height <= self.remaining() + EPSILON
    }

    pub fn at_page_top(&self) -> bool {
        (self.current_y - MARGIN_TOP).abs() < EPSILON
    }

    pub fn advance_page(&mut self) {
        self.page_number += 1;
        self.current_y = MARGIN_TOP;
    }

    /// Start a new page unless `height` fits here or the cursor is already at
    /// the top of a page. Returns whether a page was started.
    pub fn ensure_space(&mut self, height: f64) -> bool {
        if self.fits(height) || self.at_page_top() {
            return false;
        }
        self.advance_page();
        true
    }

    pub fn apply(&mut self, decision: PageBreak) {
        if decision == PageBreak::NewPage {
            self.advance_page();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageBreak {
    /// Draw on the current page.
    Stay,
    /// Move to the top of a new page first.
    NewPage,
    /// Start here; the renderer breaks inside the block as it draws.
    SplitInPlace,
}

/// Where `block` should start given the cursor in `state`.
///
/// A block that fits stays. A block that cannot split, or that would fit on a
/// fresh page, moves to one. Anything else starts here and splits, provided
/// its minimum leading slice fits. Nothing moves off a page it would start at
/// the top of; an unsplittable block taller than a page overflows there.
pub fn smart_page_break(state: &LayoutState, block: &MeasuredBlock<'_>) -> PageBreak {
    if state.fits(block.height) {
        return PageBreak::Stay;
    }
    if state.at_page_top() {
        return if block.can_break {
            PageBreak::SplitInPlace
        } else {
            PageBreak::Stay
        };
    }
    if !block.can_break || block.height <= CONTENT_HEIGHT + EPSILON {
        return PageBreak::NewPage;
    }
    match block.min_height {
        Some(min) if !state.fits(min) => PageBreak::NewPage,
        _ => PageBreak::SplitInPlace,
    }
}

/// How much of `next` has to share a page with the heading before it.
fn leading_slice(next: &MeasuredBlock<'_>) -> f64 {
    if next.can_break {
        next.min_height.unwrap_or_else(|| line_height(BODY_FONT_SIZE))
    } else {
        next.height
    }
}

/// Whether a heading must move to a new page so it is not separated from
/// the block after it.
pub fn heading_break(
    state: &LayoutState,
    heading: &MeasuredBlock<'_>,
    next: Option<&MeasuredBlock<'_>>,
) -> bool {
    if state.at_page_top() {
        return false;
    }
    let need = heading.height + next.map_or(0.0, leading_slice);
    !state.fits(need)
}

/// Decision for the block right after a heading. A breakable follower
/// splits where it is instead of leaving the heading behind.
pub fn follow_heading(state: &LayoutState, block: &MeasuredBlock<'_>) -> PageBreak {
    match smart_page_break(state, block) {
        PageBreak::NewPage if block.can_break => PageBreak::SplitInPlace,
        decision => decision,
    }
}
