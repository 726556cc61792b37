use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::info;

use super::models::{
    BatchTranslateRequest, BatchTranslateResponse, ErrorResponse, TranslateImageRequest,
    TranslateImageResponse, TranslateRequest, TranslateResponse,
};
use super::state::ServerState;
use super::translate::{ServerError, translate_image, translate_text, translate_texts};

type HandlerError = (StatusCode, Json<ErrorResponse>);

pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/translate", post(translate).fallback(method_not_allowed))
        .route(
            "/batch-translate",
            post(batch_translate).fallback(method_not_allowed),
        )
        .route(
            "/translate-image",
            post(translate_image_handler).fallback(method_not_allowed),
        )
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

pub async fn run_server(state: ServerState, addr: String) -> Result<()> {
    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address: {}", addr))?;
    info!(addr = %addr, "proxy server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn method_not_allowed() -> HandlerError {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(ErrorResponse {
            error: "only POST is supported".to_string(),
            message: None,
        }),
    )
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
        HeaderValue::from_static("content-type"),
    );
}

async fn translate(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<TranslateRequest>, JsonRejection>,
) -> Result<Json<TranslateResponse>, HandlerError> {
    let request = parse_body(payload)?;
    translate_text(&state, request)
        .await
        .map(Json)
        .map_err(into_response)
}

async fn batch_translate(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<BatchTranslateRequest>, JsonRejection>,
) -> Result<Json<BatchTranslateResponse>, HandlerError> {
    let request = parse_body(payload)?;
    translate_texts(&state, request)
        .await
        .map(Json)
        .map_err(into_response)
}

async fn translate_image_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<TranslateImageRequest>, JsonRejection>,
) -> Result<Json<TranslateImageResponse>, HandlerError> {
    let request = parse_body(payload)?;
    translate_image(&state, request)
        .await
        .map(Json)
        .map_err(into_response)
}

fn parse_body<T: DeserializeOwned>(payload: Result<Json<T>, JsonRejection>) -> Result<T, HandlerError> {
    payload
        .map(|Json(request)| request)
        .map_err(|err| into_response(ServerError::bad_request(format!("invalid JSON body: {}", err.body_text()))))
}

fn into_response(err: ServerError) -> HandlerError {
    (
        err.status,
        Json(ErrorResponse {
            error: err.error,
            message: err.message,
        }),
    )
}
