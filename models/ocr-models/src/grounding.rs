use crate::layout::TextRegion;

/// Grounded boxes are reported on a 0..=999 grid regardless of page size.
pub const COORDINATE_BINS: u32 = 999;

/// One line of recognized text and where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedLine {
    /// Where the line is on the page
    pub region: TextRegion,
    /// The recognized text
    pub text: String,
}

/// Assemble the model output for a page of `(width, height)` pixels.
///
/// Plain output is one line of text per recognized line. Grounded output prefixes every line with a
/// `<|ref|>text<|/ref|><|det|>[[x1, y1, x2, y2]]<|/det|>` header and separates lines with a blank line.
pub fn render(lines: &[RecognizedLine], page: (u32, u32), grounding: bool) -> String {
    if !grounding {
        return lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
    }

    lines
        .iter()
        .map(|line| {
            let [x1, y1, x2, y2] = normalized_box(&line.region, page);
            format!(
                "<|ref|>text<|/ref|><|det|>[[{x1}, {y1}, {x2}, {y2}]]<|/det|>\n{}",
                line.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn normalized_box(region: &TextRegion, (width, height): (u32, u32)) -> [u32; 4] {
    let scale = |value: u32, extent: u32| {
        let scaled = value as u64 * COORDINATE_BINS as u64 / extent.max(1) as u64;
        scaled.min(COORDINATE_BINS as u64) as u32
    };
    [
        scale(region.x, width),
        scale(region.y, height),
        scale(region.right(), width),
        scale(region.bottom(), height),
    ]
}
