use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub mod logging;
pub mod ocr;
mod providers;
pub mod semantic;
mod server;
pub mod settings;
#[cfg(test)]
mod test_util;

pub use providers::{
    Claude, CompletionOptions, Gemini, OpenAI, Provider, ProviderFuture, ProviderImpl,
    ProviderKind, ProviderResponse, ProviderUsage,
};
pub use server::{ImageExtractResponse, TextExtractResponse};

use ocr::engine::{Tesseract, TesseractConfig, available_languages, normalize_languages};
use ocr::Pipeline;
use semantic::SemanticService;
use settings::Settings;

/// Resolves the engine binary, its data directory and the usable languages
/// once, then builds the shared pipeline. Any failure here is fatal.
pub fn build_pipeline(settings: &Settings) -> Result<Pipeline<Tesseract>> {
    let config = TesseractConfig::resolve(
        &settings.binary_candidates,
        &settings.tessdata_candidates,
        settings.engine_timeout,
    )
    .with_context(|| "OCR engine configuration failed")?;
    let available = available_languages(&config.tessdata)?;
    let languages = normalize_languages(&settings.languages, &available)?;
    info!(
        "tesseract: {} (data: {}, languages: {})",
        config.binary.display(),
        config.tessdata.display(),
        languages.join("+")
    );
    Ok(Pipeline::new(
        Arc::new(Tesseract::new(config)),
        languages,
        settings.pipeline_config(),
    ))
}

pub fn build_semantic(settings: &Settings) -> Result<SemanticService<ProviderImpl>> {
    let provider =
        providers::provider_from_env(settings.llm_model.as_deref(), settings.completion_options())?;
    Ok(SemanticService::new(provider, settings.reconcile.clone()))
}

pub async fn serve(settings: Settings) -> Result<()> {
    let pipeline = build_pipeline(&settings)?;
    let semantic = match build_semantic(&settings) {
        Ok(semantic) => Some(semantic),
        Err(err) => {
            warn!("semantic endpoints disabled: {:#}", err);
            None
        }
    };
    let state = server::ServerState { pipeline, semantic };
    let addr = format!("0.0.0.0:{}", settings.port);
    server::run_server(state, settings.max_upload_bytes, addr).await
}

/// Runs one image through the pipeline (and the category filter when
/// `category` is given) and returns the response envelope as JSON.
pub async fn run_extract(settings: Settings, image: &Path, category: Option<&str>) -> Result<String> {
    let category = server::parse_image_category(category).map_err(|err| anyhow!(err.message))?;
    let bytes = std::fs::read(image)
        .with_context(|| format!("failed to read image: {}", image.display()))?;
    let pipeline = build_pipeline(&settings)?;
    let semantic = match category {
        Some(_) => Some(build_semantic(&settings)?),
        None => None,
    };
    let state = server::ServerState { pipeline, semantic };
    let response = server::extract_image(&state, bytes, category)
        .await
        .map_err(|err| anyhow!(err.message))?;
    Ok(serde_json::to_string_pretty(&response)?)
}

pub async fn run_text(settings: Settings, text: &str, category: &str) -> Result<String> {
    let category = server::parse_text_category(Some(category)).map_err(|err| anyhow!(err.message))?;
    let text = text.trim();
    if text.is_empty() {
        return Err(anyhow!("text is empty"));
    }
    let semantic = build_semantic(&settings)?;
    semantic.extract_from_text(text, category).await
}
