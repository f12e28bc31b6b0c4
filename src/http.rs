//! JSON HTTP API, the interactions endpoint and the static frontend.

use crate::bot::ChatBot;
use crate::config::Config;
use crate::discord;
use crate::recognizer::CancelToken;
use crate::service::{Decoded, Service, DISABLED_MESSAGE};
use crate::translate::Language;
use crate::{Result, XenoglyphError};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const INVALID_DECODE_TYPE: &str = "not a valid decode request type";

/// Every failure answers 400 with `{"error": ...}`.
#[derive(Debug)]
pub struct ApiError(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: self.0 })).into_response()
    }
}

impl From<XenoglyphError> for ApiError {
    fn from(e: XenoglyphError) -> Self {
        ApiError(e.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
pub struct DecodeRequest {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: String,
}

#[derive(Debug, Deserialize)]
pub struct EncodeRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub language: Language,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncodeTextResponse {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncodeImageResponse {
    /// Base64 PNG.
    pub image: String,
}

/// Body as the handlers receive it; oversized or unreadable bodies arrive
/// as the rejection so they share the error envelope.
type RawBody = std::result::Result<Bytes, BytesRejection>;

fn parse<T: DeserializeOwned>(body: RawBody) -> std::result::Result<T, ApiError> {
    let body = body.map_err(|e| ApiError(e.body_text()))?;
    serde_json::from_slice(&body).map_err(|e| ApiError(e.to_string()))
}

/// Cancels the recognition when the request future is dropped.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

async fn decode_image(service: Service, image: &str) -> std::result::Result<Decoded, ApiError> {
    let bytes = STANDARD
        .decode(image.trim())
        .map_err(|e| XenoglyphError::Decode(format!("invalid base64: {e}")))?;
    let guard = CancelOnDrop(CancelToken::new());
    let cancel = guard.0.clone();
    let decoded = tokio::task::spawn_blocking(move || service.decode_image(&bytes, &cancel))
        .await
        .map_err(|e| XenoglyphError::OcrInternal(e.to_string()))??;
    Ok(decoded)
}

async fn decode(State(service): State<Service>, body: RawBody) -> std::result::Result<Json<Decoded>, ApiError> {
    let request: DecodeRequest = parse(body)?;
    if service.kill_switch().is_killed() {
        return Ok(Json(Decoded { phonetics: DISABLED_MESSAGE.into(), alien: DISABLED_MESSAGE.into() }));
    }
    let decoded = match request.kind.as_str() {
        "text" => service.decode_text(&request.text),
        "image" => decode_image(service, &request.image).await?,
        other => {
            info!(kind = other, "invalid decode request type");
            return Err(ApiError(INVALID_DECODE_TYPE.into()));
        }
    };
    info!(kind = %request.kind, phonetics = %decoded.phonetics, "decode request");
    Ok(Json(decoded))
}

async fn encode_text(
    State(service): State<Service>,
    body: RawBody,
) -> std::result::Result<Json<EncodeTextResponse>, ApiError> {
    let request: EncodeRequest = parse(body)?;
    if service.kill_switch().is_killed() {
        return Ok(Json(EncodeTextResponse { text: DISABLED_MESSAGE.into() }));
    }
    info!(text = %request.text, "text encode request");
    Ok(Json(EncodeTextResponse { text: service.encode_text(&request.text, request.language) }))
}

async fn encode_image(
    State(service): State<Service>,
    body: RawBody,
) -> std::result::Result<Json<EncodeImageResponse>, ApiError> {
    let request: EncodeRequest = parse(body)?;
    if service.kill_switch().is_killed() {
        return Ok(Json(EncodeImageResponse { image: DISABLED_MESSAGE.into() }));
    }
    info!(text = %request.text, "image encode request");
    let png = service.encode_image(&request.text, request.language)?;
    Ok(Json(EncodeImageResponse { image: STANDARD.encode(png) }))
}

/// The three translation endpoints.
pub fn api_router(service: Service) -> Router {
    Router::new()
        .route("/api/v1/decode", post(decode))
        .route("/api/v1/encode/text", post(encode_text))
        .route("/api/v1/encode/image", post(encode_image))
        .with_state(service)
}

pub fn cors_layer(origin: &str) -> Result<CorsLayer> {
    let origin = HeaderValue::from_str(origin)
        .map_err(|e| XenoglyphError::Config(format!("invalid cors origin {origin:?}: {e}")))?;
    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true))
}

/// Full application: API, interactions, frontend, CORS and request tracing.
/// Request bodies are capped at `config.max_body_bytes`.
pub fn router(service: Service, config: &Config) -> Result<Router> {
    let interactions = discord::router(ChatBot::new(service.clone()), &config.discord)?;
    let mut app = api_router(service).merge(interactions);

    match &config.frontend_dir {
        Some(dir) if dir.is_dir() => app = app.fallback_service(ServeDir::new(dir)),
        Some(dir) => warn!(dir = %dir.display(), "frontend directory missing, not serving it"),
        None => {}
    }

    Ok(app
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors_layer(&config.cors_origin)?)
        .layer(TraceLayer::new_for_http()))
}

/// Serves until ctrl-c.
pub async fn serve(service: Service, config: &Config) -> Result<()> {
    let app = router(service, config)?;
    let listener = tokio::net::TcpListener::bind(config.bind.as_str()).await?;
    info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;
    Ok(())
}
