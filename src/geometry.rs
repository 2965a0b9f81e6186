//! Fixed A4 page geometry. All lengths are millimetres, font sizes points.
//!
//! These values are part of the output contract and are not configurable.

pub const PAGE_WIDTH: f64 = 210.0;
pub const PAGE_HEIGHT: f64 = 297.0;

pub const MARGIN_LEFT: f64 = 20.0;
pub const MARGIN_RIGHT: f64 = 20.0;
pub const MARGIN_TOP: f64 = 25.0;
pub const MARGIN_BOTTOM: f64 = 25.0;

pub const CONTENT_WIDTH: f64 = PAGE_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
pub const CONTENT_HEIGHT: f64 = PAGE_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;
/// Lowest Y any content may reach.
pub const PAGE_BOTTOM: f64 = PAGE_HEIGHT - MARGIN_BOTTOM;

pub const BODY_FONT_SIZE: f64 = 11.0;
pub const CODE_FONT_SIZE: f64 = 9.0;
pub const HEADING_FONT_SIZES: [f64; 6] = [22.0, 18.0, 15.0, 13.0, 12.0, 11.0];

pub const LINE_HEIGHT_FACTOR: f64 = 1.5;
pub const PT_TO_MM: f64 = 0.352778;
pub const PX_TO_MM: f64 = 0.264583;

pub const PARAGRAPH_SPACING: f64 = 4.0;
pub const HEADING_SPACING_BEFORE: f64 = 8.0;
pub const HEADING_SPACING_AFTER: f64 = 4.0;
pub const CODE_BLOCK_PADDING: f64 = 8.0;
pub const CODE_BLOCK_MARGIN: f64 = 6.0;
pub const LIST_INDENT: f64 = 8.0;
pub const MESSAGE_PADDING: f64 = 10.0;
pub const MESSAGE_MARGIN: f64 = 8.0;

pub const BLOCKQUOTE_INDENT: f64 = 6.0;
pub const RULE_HEIGHT: f64 = 8.0;
pub const MAX_IMAGE_HEIGHT: f64 = 150.0;
pub const IMAGE_FALLBACK_HEIGHT: f64 = 50.0;
/// Height reserved for the placeholder of an image that failed to load.
pub const IMAGE_PLACEHOLDER_HEIGHT: f64 = 12.0;
/// User bubbles never exceed this share of the available width.
pub const BUBBLE_MAX_WIDTH_RATIO: f64 = 0.7;
pub const BUBBLE_RADIUS: f64 = 3.0;

/// Line height for text set at `font_size` points.
pub fn line_height(font_size: f64) -> f64 {
    font_size * PT_TO_MM * LINE_HEIGHT_FACTOR
}

pub fn heading_font_size(level: u8) -> f64 {
    let index = usize::from(level.clamp(1, 6)) - 1;
    HEADING_FONT_SIZES[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usable_area() {
        assert_eq!(CONTENT_WIDTH, 170.0);
        assert_eq!(CONTENT_HEIGHT, 247.0);
        assert_eq!(PAGE_BOTTOM, 272.0);
    }

    #[test]
    fn heading_levels_clamp() {
        assert_eq!(heading_font_size(1), 22.0);
        assert_eq!(heading_font_size(6), 11.0);
        assert_eq!(heading_font_size(0), 22.0);
        assert_eq!(heading_font_size(9), 11.0);
    }
}
