mod tesseract;

use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

pub use tesseract::{Tesseract, TesseractConfig, available_languages, normalize_languages};

/// Expected text layout, passed to the engine as a segmentation hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutMode {
    /// Fully automatic page segmentation.
    Auto,
    /// A single uniform block of text.
    Block,
    /// A single text line.
    Line,
    /// A single word.
    Word,
    /// Sparse text in no particular order.
    Sparse,
}

impl LayoutMode {
    pub fn psm(self) -> u32 {
        match self {
            LayoutMode::Auto => 3,
            LayoutMode::Block => 6,
            LayoutMode::Line => 7,
            LayoutMode::Word => 8,
            LayoutMode::Sparse => 11,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionOptions {
    pub layout: LayoutMode,
    /// Ordered by priority; the first entry is the primary language.
    pub languages: Vec<String>,
}

impl RecognitionOptions {
    pub fn new(layout: LayoutMode, languages: Vec<String>) -> Self {
        Self { layout, languages }
    }

    pub fn language_arg(&self) -> String {
        self.languages.join("+")
    }

    /// Same layout restricted to the primary language, if there is more
    /// than one language to drop.
    pub fn primary_only(&self) -> Option<Self> {
        if self.languages.len() < 2 {
            return None;
        }
        Some(Self {
            layout: self.layout,
            languages: self.languages[..1].to_vec(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineFailure {
    #[error("recognition timed out after {0:?}")]
    Timeout(Duration),
    #[error("language data unavailable for '{0}'")]
    LanguageUnavailable(String),
    #[error("recognition engine exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("failed to launch recognition engine: {0}")]
    Launch(#[from] std::io::Error),
}

pub type EngineFuture = Pin<Box<dyn Future<Output = Result<String, EngineFailure>> + Send>>;

/// Turns an image file into raw text. Implementations must bound every
/// call in time.
pub trait RecognitionEngine: Send + Sync + 'static {
    fn run(&self, image: PathBuf, options: RecognitionOptions) -> EngineFuture;

    fn is_available(&self) -> bool {
        true
    }
}

impl<E: RecognitionEngine> RecognitionEngine for std::sync::Arc<E> {
    fn run(&self, image: PathBuf, options: RecognitionOptions) -> EngineFuture {
        (**self).run(image, options)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_only_drops_secondary_languages() {
        let options = RecognitionOptions::new(
            LayoutMode::Word,
            vec!["kor".to_string(), "eng".to_string()],
        );
        assert_eq!(options.language_arg(), "kor+eng");
        let fallback = options.primary_only().expect("fallback");
        assert_eq!(fallback.language_arg(), "kor");
        assert_eq!(fallback.layout, LayoutMode::Word);
        assert!(fallback.primary_only().is_none());
    }

    #[test]
    fn layout_names_map_to_segmentation_modes() {
        let ladder: Vec<LayoutMode> =
            serde_json::from_str(r#"["auto", "block", "line", "word", "sparse"]"#).unwrap();
        let modes = ladder.into_iter().map(LayoutMode::psm).collect::<Vec<_>>();
        assert_eq!(modes, vec![3, 6, 7, 8, 11]);
    }
}
