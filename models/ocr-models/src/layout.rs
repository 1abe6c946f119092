//! Splits a page into the text lines a line-level recognizer can read.
//!
//! The page is binarized with Otsu's threshold, rows with ink are grouped into bands, and each band is
//! trimmed to its ink and split when it is wider than the recognizer's working width.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage};
use imageproc::contrast::{otsu_level, threshold};

/// Empty rows inside a band that still count as the same line (dots, accents, broken strokes).
const MAX_ROW_GAP: u32 = 2;
/// Bands shorter than this are treated as noise.
const MIN_LINE_HEIGHT: u32 = 3;

/// A box on the page, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRegion {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl TextRegion {
    /// The right edge, exclusive
    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    /// The bottom edge, exclusive
    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }
}

/// Scale the page so its longest side is at most `base_size`. Smaller pages are left alone.
pub fn page_view(image: &DynamicImage, base_size: u32) -> DynamicImage {
    if image.width().max(image.height()) <= base_size {
        return image.clone();
    }
    image.resize(base_size, base_size, FilterType::Triangle)
}

/// Find the text lines on a page, top to bottom.
///
/// No line chunk spans more than `max_width` columns of ink; the returned boxes add a small margin around
/// the ink. A page without contrast has no lines.
pub fn text_lines(page: &GrayImage, max_width: u32) -> Vec<TextRegion> {
    let Some(ink) = InkMask::new(page) else {
        return Vec::new();
    };
    let max_width = max_width.max(1);

    let mut regions = Vec::new();
    for (top, bottom) in ink.row_bands() {
        let height = bottom - top;
        if height < MIN_LINE_HEIGHT {
            continue;
        }
        let Some((left, right)) = ink.column_extent(top, bottom) else {
            continue;
        };
        let margin = (height / 4).max(2);
        for (start, end) in ink.split_columns(top, bottom, left, right, max_width) {
            let x = start.saturating_sub(margin);
            let y = top.saturating_sub(margin);
            let padded_right = (end + margin).min(ink.width);
            let padded_bottom = (bottom + margin).min(ink.height);
            regions.push(TextRegion {
                x,
                y,
                width: padded_right - x,
                height: padded_bottom - y,
            });
        }
    }
    regions
}

struct InkMask {
    width: u32,
    height: u32,
    ink: Vec<bool>,
}

impl InkMask {
    fn new(page: &GrayImage) -> Option<Self> {
        let (darkest, lightest) = page
            .pixels()
            .fold((u8::MAX, u8::MIN), |(lo, hi), pixel| {
                (lo.min(pixel.0[0]), hi.max(pixel.0[0]))
            });
        if darkest >= lightest {
            return None;
        }

        // Pixels at or below the level become 0, the rest 255
        let binary = threshold(page, otsu_level(page));
        let mut ink: Vec<bool> = binary.pixels().map(|pixel| pixel.0[0] == 0).collect();
        // Light text on a dark background
        let inked = ink.iter().filter(|&&is_ink| is_ink).count();
        if inked * 2 > ink.len() {
            ink.iter_mut().for_each(|is_ink| *is_ink = !*is_ink);
        }
        Some(Self {
            width: page.width(),
            height: page.height(),
            ink,
        })
    }

    fn at(&self, x: u32, y: u32) -> bool {
        self.ink[y as usize * self.width as usize + x as usize]
    }

    fn row_has_ink(&self, y: u32) -> bool {
        (0..self.width).any(|x| self.at(x, y))
    }

    fn column_has_ink(&self, x: u32, top: u32, bottom: u32) -> bool {
        (top..bottom).any(|y| self.at(x, y))
    }

    /// Runs of rows with ink as `(top, bottom)` with `bottom` exclusive.
    fn row_bands(&self) -> Vec<(u32, u32)> {
        let mut bands: Vec<(u32, u32)> = Vec::new();
        for y in (0..self.height).filter(|&y| self.row_has_ink(y)) {
            match bands.last_mut() {
                Some((_, bottom)) if y - *bottom <= MAX_ROW_GAP => *bottom = y + 1,
                _ => bands.push((y, y + 1)),
            }
        }
        bands
    }

    fn column_extent(&self, top: u32, bottom: u32) -> Option<(u32, u32)> {
        let left = (0..self.width).find(|&x| self.column_has_ink(x, top, bottom))?;
        let right = (left..self.width)
            .rev()
            .find(|&x| self.column_has_ink(x, top, bottom))?;
        Some((left, right + 1))
    }

    /// Cut `left..right` into spans of at most `max_width`, preferring blank columns in the second half
    /// of each span. Spans start and end on ink.
    fn split_columns(
        &self,
        top: u32,
        bottom: u32,
        left: u32,
        right: u32,
        max_width: u32,
    ) -> Vec<(u32, u32)> {
        let mut spans = Vec::new();
        let mut start = left;
        while right - start > max_width {
            let limit = start + max_width;
            let earliest = start + max_width / 2;
            let cut = (earliest..limit)
                .rev()
                .find(|&x| x > start && !self.column_has_ink(x, top, bottom))
                .unwrap_or(limit);
            let end = (start..cut)
                .rev()
                .find(|&x| self.column_has_ink(x, top, bottom))
                .map_or(cut, |x| x + 1);
            spans.push((start, end));
            start = (cut..right)
                .find(|&x| self.column_has_ink(x, top, bottom))
                .unwrap_or(right);
        }
        if start < right {
            spans.push((start, right));
        }
        spans
    }
}
