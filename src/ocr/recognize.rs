use image::DynamicImage;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::engine::{EngineFailure, LayoutMode, RecognitionEngine, RecognitionOptions};

/// Terminal state of one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionOutcome {
    Success(String),
    Empty,
    Timeout,
    EngineError(String),
}

impl RecognitionOutcome {
    fn from_result(result: Result<String, EngineFailure>) -> Self {
        match result {
            Ok(text) if text.trim().is_empty() => RecognitionOutcome::Empty,
            Ok(text) => RecognitionOutcome::Success(text.trim().to_string()),
            Err(EngineFailure::Timeout(_)) => RecognitionOutcome::Timeout,
            Err(err) => RecognitionOutcome::EngineError(err.to_string()),
        }
    }
}

/// Drives the engine through a ladder of layout hints, stopping at the
/// first non-blank result.
pub struct RecognitionAdapter<E: RecognitionEngine> {
    engine: Arc<E>,
    languages: Vec<String>,
}

impl<E: RecognitionEngine> Clone for RecognitionAdapter<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            languages: self.languages.clone(),
        }
    }
}

impl<E: RecognitionEngine> RecognitionAdapter<E> {
    pub fn new(engine: Arc<E>, languages: Vec<String>) -> Self {
        Self { engine, languages }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Writes `image` to a scoped temporary PNG and runs the ladder on it.
    /// The file is removed when this returns, whatever the outcome.
    pub async fn recognize_image(&self, image: &DynamicImage, ladder: &[LayoutMode]) -> String {
        let file = match write_temp_png(image) {
            Ok(file) => file,
            Err(err) => {
                warn!("recognition skipped: {}", err);
                return String::new();
            }
        };
        self.recognize_path(file.path(), ladder).await
    }

    /// Empty string when every ladder entry fails or comes back blank.
    pub async fn recognize_path(&self, path: &Path, ladder: &[LayoutMode]) -> String {
        for (idx, layout) in ladder.iter().enumerate() {
            let options = RecognitionOptions::new(*layout, self.languages.clone());
            let outcome = self.attempt(path, options).await;
            debug!(
                "recognition attempt {}/{} ({:?}): {:?}",
                idx + 1,
                ladder.len(),
                layout,
                outcome
            );
            if let RecognitionOutcome::Success(text) = outcome {
                return text;
            }
        }
        String::new()
    }

    async fn attempt(&self, path: &Path, options: RecognitionOptions) -> RecognitionOutcome {
        let fallback = options.primary_only();
        let result = self.engine.run(path.to_path_buf(), options).await;
        match (result, fallback) {
            (Err(EngineFailure::LanguageUnavailable(langs)), Some(fallback)) => {
                warn!(
                    "language data for '{}' unavailable; retrying with '{}'",
                    langs,
                    fallback.language_arg()
                );
                RecognitionOutcome::from_result(
                    self.engine.run(path.to_path_buf(), fallback).await,
                )
            }
            (result, _) => RecognitionOutcome::from_result(result),
        }
    }
}

fn write_temp_png(image: &DynamicImage) -> anyhow::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("ocr-region-")
        .suffix(".png")
        .tempfile()?;
    image.write_to(&mut file, image::ImageFormat::Png)?;
    file.flush()?;
    Ok(file)
}
