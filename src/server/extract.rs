use axum::http::StatusCode;
use std::time::Instant;
use tracing::{info, warn};

use crate::ocr::PipelineError;
use crate::ocr::engine::RecognitionEngine;
use crate::providers::Provider;
use crate::semantic::{Category, SemanticService};

use super::models::{ImageExtractResponse, TextExtractRequest, TextExtractResponse};
use super::state::ServerState;

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) message: String,
}

impl ServerError {
    pub(crate) fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(err: anyhow::Error) -> Self {
        ServerError::internal(err.to_string())
    }
}

/// Optional `type` for image extraction; only image-filterable categories.
pub(crate) fn parse_image_category(raw: Option<&str>) -> Result<Option<Category>, ServerError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    match raw.parse::<Category>() {
        Ok(category) if category.filters_images() => Ok(Some(category)),
        _ => Err(ServerError::bad_request(
            "type parameter must be 'store' or 'food'",
        )),
    }
}

pub(crate) fn parse_text_category(raw: Option<&str>) -> Result<Category, ServerError> {
    let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
        return Err(ServerError::bad_request("type query parameter is required"));
    };
    raw.parse::<Category>()
        .map_err(|_| ServerError::bad_request("type must be 'store', 'number', or 'food'"))
}

/// Rejects empty uploads and anything whose magic bytes are not an image.
pub(crate) fn check_upload(bytes: &[u8]) -> Result<(), ServerError> {
    if bytes.is_empty() {
        return Err(ServerError::bad_request("Image file required"));
    }
    match infer::get(bytes).map(|kind| kind.mime_type()) {
        Some(mime) if mime.starts_with("image/") => Ok(()),
        Some(mime) => Err(ServerError::bad_request(format!(
            "uploaded file is not an image ({})",
            mime
        ))),
        None => Err(ServerError::bad_request("uploaded file is not an image")),
    }
}

pub(crate) async fn extract_image<E: RecognitionEngine, P: Provider>(
    state: &ServerState<E, P>,
    bytes: Vec<u8>,
    category: Option<Category>,
) -> Result<ImageExtractResponse, ServerError> {
    let started = Instant::now();
    check_upload(&bytes)?;
    let upload_size = bytes.len();

    let extraction = state.pipeline.extract(bytes).await.map_err(|err| match err {
        PipelineError::Decode(_) | PipelineError::EmptyImage => {
            ServerError::bad_request(format!("Invalid image: {}", err))
        }
        PipelineError::Task(_) => {
            warn!("image extraction failed: {}", err);
            ServerError::internal("OCR failed")
        }
    })?;

    let elements = match category {
        None => extraction.elements,
        Some(category) => {
            let semantic = semantic_service(state)?;
            semantic
                .filter_elements(&extraction.elements, category)
                .await
                .map_err(|err| {
                    warn!("{} filtering failed: {:#}", category, err);
                    ServerError::internal(filter_failure_message(category))
                })?
        }
    };

    info!(
        "image extract: {} bytes, type={}, {} elements in {:?}",
        upload_size,
        category.map(|value| value.as_str()).unwrap_or("none"),
        elements.len(),
        started.elapsed()
    );
    Ok(ImageExtractResponse::found(elements))
}

pub(crate) async fn extract_text<E: RecognitionEngine, P: Provider>(
    state: &ServerState<E, P>,
    category: Category,
    body: &[u8],
) -> Result<TextExtractResponse, ServerError> {
    let request: TextExtractRequest = serde_json::from_slice(body)
        .map_err(|err| ServerError::bad_request(format!("invalid JSON body: {}", err)))?;
    let text = request
        .text
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ServerError::bad_request("text is required"))?;

    let semantic = semantic_service(state)?;
    let result = semantic.extract_from_text(&text, category).await?;
    Ok(TextExtractResponse { result })
}

fn semantic_service<E: RecognitionEngine, P: Provider>(
    state: &ServerState<E, P>,
) -> Result<&SemanticService<P>, ServerError> {
    state
        .semantic
        .as_ref()
        .ok_or_else(|| ServerError::internal("language model is not configured (no API key)"))
}

fn filter_failure_message(category: Category) -> &'static str {
    match category {
        Category::Store => "Store name filtering failed",
        Category::Food => "Food name filtering failed",
        Category::Number => "Number filtering failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engine::LayoutMode;
    use crate::ocr::{Pipeline, PipelineConfig, Region, TextElement};
    use crate::semantic::ReconcileConfig;
    use crate::test_util::{CannedProvider, ScriptedEngine, bar_image, png_bytes, white_image};
    use std::sync::Arc;

    fn state(
        engine: ScriptedEngine,
        provider: Option<CannedProvider>,
    ) -> ServerState<ScriptedEngine, CannedProvider> {
        ServerState {
            pipeline: Pipeline::new(
                Arc::new(engine),
                vec!["kor".to_string(), "eng".to_string()],
                PipelineConfig::default(),
            ),
            semantic: provider
                .map(|provider| SemanticService::new(provider, ReconcileConfig::default())),
        }
    }

    #[test]
    fn image_category_is_optional_but_restricted() {
        assert_eq!(parse_image_category(None).unwrap(), None);
        assert_eq!(parse_image_category(Some("")).unwrap(), None);
        assert_eq!(
            parse_image_category(Some("food")).unwrap(),
            Some(Category::Food)
        );
        let err = parse_image_category(Some("number")).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "type parameter must be 'store' or 'food'");
    }

    #[test]
    fn text_category_is_required() {
        assert_eq!(
            parse_text_category(None).unwrap_err().message,
            "type query parameter is required"
        );
        assert_eq!(
            parse_text_category(Some("drink")).unwrap_err().message,
            "type must be 'store', 'number', or 'food'"
        );
        assert_eq!(parse_text_category(Some("number")).unwrap(), Category::Number);
    }

    #[test]
    fn non_image_uploads_are_rejected() {
        assert_eq!(
            check_upload(&[]).unwrap_err().message,
            "Image file required"
        );
        assert!(check_upload(b"%PDF-1.7\n").is_err());
        assert!(check_upload(b"plain text").is_err());
        assert!(check_upload(&png_bytes(&white_image(4, 4))).is_ok());
    }

    #[tokio::test]
    async fn blank_image_succeeds_with_no_text() {
        let state = state(ScriptedEngine::always(""), None);
        let response = extract_image(&state, png_bytes(&white_image(64, 48)), None)
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.total_count, 0);
        assert!(response.text_list.is_empty());
    }

    #[tokio::test]
    async fn truncated_image_is_a_bad_request() {
        let state = state(ScriptedEngine::always("x"), None);
        let mut bytes = png_bytes(&white_image(32, 32));
        bytes.truncate(24);
        let err = extract_image(&state, bytes, None).await.unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn store_filter_reconciles_coordinates() {
        let engine = ScriptedEngine::by_layout(&[(LayoutMode::Auto, "맥도냘드")]);
        let provider = CannedProvider::answering("맥도날드");
        let state = state(engine, Some(provider.clone()));
        let response = extract_image(
            &state,
            png_bytes(&white_image(100, 40)),
            Some(Category::Store),
        )
        .await
        .unwrap();
        assert_eq!(response.text_list, vec![TextElement::new("맥도날드", 50, 20)]);
        assert_eq!(provider.sent().len(), 1);
    }

    #[tokio::test]
    async fn filter_failure_hides_provider_error() {
        let image = bar_image(160, 80, &[Region::new(20, 20, 90, 14)]);
        let engine = ScriptedEngine::always("김치찌개");
        let state = state(engine, Some(CannedProvider::failing("upstream 502")));
        let err = extract_image(&state, png_bytes(&image), Some(Category::Food))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Food name filtering failed");
    }

    #[tokio::test]
    async fn text_extract_validates_body_then_asks_model() {
        let state = state(
            ScriptedEngine::always(""),
            Some(CannedProvider::answering("교촌")),
        );
        let err = extract_text(&state, Category::Store, b"not json")
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        let err = extract_text(&state, Category::Store, br#"{"text": "  "}"#)
            .await
            .unwrap_err();
        assert_eq!(err.message, "text is required");

        let response = extract_text(
            &state,
            Category::Store,
            r#"{"text": "아 그 교촌 어 교촌치킨"}"#.as_bytes(),
        )
        .await
        .unwrap();
        assert_eq!(response.result, "교촌");
    }

    #[tokio::test]
    async fn missing_model_is_a_server_error() {
        let state = state(ScriptedEngine::always(""), None);
        let err = extract_text(&state, Category::Number, r#"{"text": "4번"}"#.as_bytes())
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
