mod detect;
pub mod engine;
mod filter;
mod geom;
mod pipeline;
mod preprocess;
mod recognize;
mod text;

pub use detect::{DetectionStrategy, DetectorConfig, RegionDetector};
pub use filter::{FilterConfig, NoiseFilter, dedupe};
pub use pipeline::{Extraction, Pipeline, PipelineConfig, PipelineError};
pub use recognize::{RecognitionAdapter, RecognitionOutcome};
pub use text::{NormalizerConfig, TextNormalizer, UNIT_SEPARATOR};

use serde::{Deserialize, Serialize};

/// One consolidated piece of recognized text, tagged with the centroid of
/// the region it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextElement {
    pub text: String,
    pub x: u32,
    pub y: u32,
}

impl TextElement {
    pub fn new(text: impl Into<String>, x: u32, y: u32) -> Self {
        Self {
            text: text.into(),
            x,
            y,
        }
    }
}

/// Axis-aligned pixel rectangle. `x + w` and `y + h` never exceed the
/// dimensions of the image the region was detected on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn whole(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }

    pub fn centroid(&self) -> (u32, u32) {
        (self.x + self.w / 2, self.y + self.h / 2)
    }
}
