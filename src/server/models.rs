use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ocr::TranslatedRegion;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct TranslateRequest {
    pub(crate) text: Option<String>,
    pub(crate) from: Option<String>,
    pub(crate) to: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranslateResponse {
    pub(crate) result: String,
}

/// `texts` stays untyped so entries that are not strings can be echoed back.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct BatchTranslateRequest {
    pub(crate) texts: Option<Value>,
    pub(crate) from: Option<String>,
    pub(crate) to: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BatchTranslateResponse {
    pub(crate) results: Vec<Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct TranslateImageRequest {
    pub(crate) data_base64: Option<String>,
    pub(crate) granularity: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranslateImageResponse {
    pub(crate) image_base64: String,
    pub(crate) file_name: String,
    pub(crate) mime: String,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) regions: Vec<TranslatedRegion>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) message: Option<String>,
}
