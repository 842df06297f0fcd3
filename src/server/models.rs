use serde::{Deserialize, Serialize};

use crate::ocr::TextElement;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct TypeQuery {
    #[serde(rename = "type")]
    pub(crate) kind: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct TextExtractRequest {
    pub(crate) text: Option<String>,
}

/// Envelope for `/image/extract`, used for failures too.
#[derive(Debug, Serialize)]
pub struct ImageExtractResponse {
    pub success: bool,
    pub text_list: Vec<TextElement>,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ImageExtractResponse {
    pub fn found(text_list: Vec<TextElement>) -> Self {
        Self {
            success: true,
            total_count: text_list.len(),
            text_list,
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            text_list: Vec::new(),
            total_count: 0,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TextExtractResponse {
    pub result: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) status: &'static str,
    pub(crate) ocr: bool,
}
