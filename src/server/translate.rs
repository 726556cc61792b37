use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use tracing::{info, warn};

use crate::ocr::Granularity;
use crate::pipeline::{ErrorKind, OUTPUT_MIME, Pipeline, PipelineOptions};
use crate::translate::TranslateError;

use super::models::{
    BatchTranslateRequest, BatchTranslateResponse, TranslateImageRequest, TranslateImageResponse,
    TranslateRequest, TranslateResponse,
};
use super::state::ServerState;

const TRANSLATION_SERVICE_ERROR: &str = "translation service error";

#[derive(Debug)]
pub(crate) struct ServerError {
    pub(crate) status: StatusCode,
    pub(crate) error: String,
    pub(crate) message: Option<String>,
}

impl ServerError {
    pub(crate) fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
            message: None,
        }
    }

    fn internal(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
            message: Some(message.into()),
        }
    }
}

impl From<TranslateError> for ServerError {
    fn from(err: TranslateError) -> Self {
        warn!("translation request failed: {}", err);
        ServerError::internal(TRANSLATION_SERVICE_ERROR, err.to_string())
    }
}

pub(crate) async fn translate_text(
    state: &ServerState,
    request: TranslateRequest,
) -> Result<TranslateResponse, ServerError> {
    let text = request
        .text
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ServerError::bad_request("text is required"))?;
    let (from, to) = languages(state, request.from, request.to);
    let result = state.batcher.try_translate_one(&text, &from, &to).await?;
    Ok(TranslateResponse { result })
}

pub(crate) async fn translate_texts(
    state: &ServerState,
    request: BatchTranslateRequest,
) -> Result<BatchTranslateResponse, ServerError> {
    let Some(Value::Array(entries)) = request.texts else {
        return Err(ServerError::bad_request("texts must be an array"));
    };
    let (from, to) = languages(state, request.from, request.to);
    let strings: Vec<String> = entries
        .iter()
        .filter_map(|entry| entry.as_str().map(str::to_string))
        .collect();
    let mut translated = state
        .batcher
        .try_translate_batch(&strings, &from, &to)
        .await?
        .into_iter();
    let results = entries
        .into_iter()
        .map(|entry| match entry {
            Value::String(original) => Value::String(translated.next().unwrap_or(original)),
            other => other,
        })
        .collect();
    Ok(BatchTranslateResponse { results })
}

pub(crate) async fn translate_image(
    state: &ServerState,
    request: TranslateImageRequest,
) -> Result<TranslateImageResponse, ServerError> {
    let data = request
        .data_base64
        .filter(|data| !data.trim().is_empty())
        .ok_or_else(|| ServerError::bad_request("data_base64 is required"))?;
    let bytes = decode_base64_payload(&data)?;

    let mut options = PipelineOptions::from_settings(&state.settings);
    if let Some(granularity) = request.granularity.as_deref() {
        options.granularity = granularity
            .parse::<Granularity>()
            .map_err(|err| ServerError::bad_request(err.to_string()))?;
    }
    // Results are returned directly, nobody observes the final state.
    options.settle_delay = std::time::Duration::ZERO;

    let pipeline = Pipeline::new(
        state.detector.clone(),
        state.batcher.clone(),
        state.compositor.clone(),
        options,
    );
    let output = pipeline.run(&bytes).await.map_err(|err| match err.kind() {
        ErrorKind::Input | ErrorKind::Decode => ServerError::bad_request(err.to_string()),
        ErrorKind::Ocr | ErrorKind::Compositing => {
            ServerError::internal("image translation failed", err.to_string())
        }
    })?;
    info!(regions = output.regions.len(), "translated image");
    Ok(TranslateImageResponse {
        image_base64: BASE64.encode(&output.png),
        file_name: output.file_name,
        mime: OUTPUT_MIME.to_string(),
        width: output.width,
        height: output.height,
        regions: output.regions,
    })
}

fn languages(state: &ServerState, from: Option<String>, to: Option<String>) -> (String, String) {
    let from = from
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| state.settings.source_lang.clone());
    let to = to
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| state.settings.target_lang.clone());
    (from, to)
}

/// Accepts bare base64 or a `data:<mime>;base64,` URL.
fn decode_base64_payload(data: &str) -> Result<Vec<u8>, ServerError> {
    let trimmed = data.trim();
    let encoded = match trimmed.strip_prefix("data:") {
        Some(rest) => rest
            .split_once(',')
            .map(|(_, payload)| payload)
            .ok_or_else(|| ServerError::bad_request("malformed data URL"))?,
        None => trimmed,
    };
    BASE64
        .decode(encoded.trim())
        .map_err(|err| ServerError::bad_request(format!("invalid base64 payload: {}", err)))
}
