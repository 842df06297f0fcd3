use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::{info, warn};

use crate::ocr::engine::RecognitionEngine;
use crate::providers::Provider;

use super::extract::{
    ServerError, extract_image, extract_text, parse_image_category, parse_text_category,
};
use super::models::{
    ErrorResponse, HealthResponse, ImageExtractResponse, TextExtractResponse, TypeQuery,
};
use super::state::ServerState;

const IMAGE_FIELD: &str = "image";

pub(crate) fn router<E: RecognitionEngine, P: Provider>(
    state: ServerState<E, P>,
    max_upload_bytes: usize,
) -> Router {
    Router::new()
        .route("/health", get(health::<E, P>))
        .route("/image/extract", post(image_extract::<E, P>))
        .route("/text/extract", post(text_extract::<E, P>))
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(axum::middleware::from_fn(cors_middleware))
}

pub(crate) async fn run_server<E: RecognitionEngine, P: Provider>(
    state: ServerState<E, P>,
    max_upload_bytes: usize,
    addr: String,
) -> Result<()> {
    let app = router(state, max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address {}", addr))?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health<E: RecognitionEngine, P: Provider>(
    State(state): State<Arc<ServerState<E, P>>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        ocr: state.pipeline.is_available(),
    })
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

async fn image_extract<E: RecognitionEngine, P: Provider>(
    State(state): State<Arc<ServerState<E, P>>>,
    query: Result<Query<TypeQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageExtractResponse>, (StatusCode, Json<ImageExtractResponse>)> {
    match image_extract_request(state.as_ref(), query, multipart).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => Err((err.status, Json(ImageExtractResponse::failure(err.message)))),
    }
}

async fn image_extract_request<E: RecognitionEngine, P: Provider>(
    state: &ServerState<E, P>,
    query: Result<Query<TypeQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ImageExtractResponse, ServerError> {
    let Query(query) = query.map_err(query_failure)?;
    let category = parse_image_category(query.kind.as_deref())?;
    let bytes = read_image_field(multipart).await?;
    extract_image(state, bytes, category).await
}

async fn text_extract<E: RecognitionEngine, P: Provider>(
    State(state): State<Arc<ServerState<E, P>>>,
    query: Result<Query<TypeQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<TextExtractResponse>, (StatusCode, Json<ErrorResponse>)> {
    match text_extract_request(state.as_ref(), query, body).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => Err((err.status, Json(ErrorResponse { error: err.message }))),
    }
}

async fn text_extract_request<E: RecognitionEngine, P: Provider>(
    state: &ServerState<E, P>,
    query: Result<Query<TypeQuery>, QueryRejection>,
    body: Result<Bytes, BytesRejection>,
) -> Result<TextExtractResponse, ServerError> {
    let Query(query) = query.map_err(query_failure)?;
    let category = parse_text_category(query.kind.as_deref())?;
    let body = body.map_err(|err| ServerError {
        status: err.status(),
        message: err.body_text(),
    })?;
    extract_text(state, category, &body).await
}

fn query_failure(err: QueryRejection) -> ServerError {
    ServerError::bad_request(err.body_text())
}

async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<u8>, ServerError> {
    let mut multipart = multipart.map_err(|err| {
        warn!("image extract: unreadable multipart body: {}", err);
        ServerError::bad_request("Image file required")
    })?;
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|err| ServerError::bad_request(format!("failed to read upload: {}", err)))?;
        let Some(field) = field else {
            return Err(ServerError::bad_request("Image file required"));
        };
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ServerError::bad_request(format!("failed to read upload: {}", err)))?;
        return Ok(bytes.to_vec());
    }
}
