//! Heuristic text measurement for label placement.
//!
//! No font is available when elements are generated, so widths are estimated
//! from the character count and an average glyph width ratio. The ratio is a
//! tunable approximation, not a measurement.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextMetrics {
    /// Average glyph width relative to the font size.
    pub char_width_ratio: f64,
    /// Line height multiplier (1.0 = single-spaced).
    pub line_height: f64,
}

impl Default for TextMetrics {
    fn default() -> Self {
        Self {
            char_width_ratio: 0.6,
            line_height: 1.25,
        }
    }
}

impl TextMetrics {
    /// Estimated width of `text` laid out on a single line.
    #[must_use]
    pub fn estimate_width(&self, text: &str, font_size: f64) -> f64 {
        text.chars().count() as f64 * font_size * self.char_width_ratio
    }

    /// Height of one line of text.
    #[must_use]
    pub fn line_height_px(&self, font_size: f64) -> f64 {
        font_size * self.line_height
    }

    /// Width and height of a label centred inside a container of width
    /// `container_width`, leaving `padding` of horizontal room.
    #[must_use]
    pub fn bound_label_size(
        &self,
        text: &str,
        font_size: f64,
        container_width: f64,
        padding: f64,
    ) -> (f64, f64) {
        let available = (container_width - padding).max(0.0);
        let width = available.min(self.estimate_width(text, font_size));
        (width, self.line_height_px(font_size))
    }

    /// Width and height of a free-standing label, multi-line aware.
    #[must_use]
    pub fn free_label_size(&self, text: &str, font_size: f64) -> (f64, f64) {
        let width = text
            .lines()
            .map(|line| self.estimate_width(line, font_size))
            .fold(0.0_f64, f64::max);
        let line_count = text.lines().count().max(1);
        (width, line_count as f64 * self.line_height_px(font_size))
    }
}
