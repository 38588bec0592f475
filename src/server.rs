//! HTTP Endpoints
//!
//! REST surface of the TTS service.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::TtsError;
use crate::lifecycle::ModelManager;
use crate::pipeline::{self, SynthesisRequest};

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub models: Arc<ModelManager>,
}

impl AppState {
    pub fn new(models: Arc<ModelManager>) -> Self {
        Self { models }
    }
}

impl From<Arc<ModelManager>> for AppState {
    fn from(models: Arc<ModelManager>) -> Self {
        Self::new(models)
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(read_root))
        .route("/voices", get(list_voices))
        .route("/ready", get(readiness))
        .route("/tts/synthesize", post(synthesize_speech))
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoicesResponse {
    pub voices: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub device: String,
    pub default_voice: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

/// Liveness
async fn read_root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Kokoro TTS API is running!".to_string(),
    })
}

/// Returns the voice catalog in order.
async fn list_voices(State(state): State<AppState>) -> Result<Json<VoicesResponse>, TtsError> {
    let context = state.models.context()?;
    Ok(Json(VoicesResponse {
        voices: context.voices().list().to_vec(),
    }))
}

async fn readiness(State(state): State<AppState>) -> Result<Json<ReadinessResponse>, TtsError> {
    let context = state.models.context()?;
    Ok(Json(ReadinessResponse {
        ready: true,
        device: context.device().to_string(),
        default_voice: context.voices().default_voice().to_string(),
    }))
}

/// Synthesize speech and return it as `audio/wav`.
async fn synthesize_speech(
    State(state): State<AppState>,
    payload: Result<Json<SynthesisRequest>, JsonRejection>,
) -> Result<Response, TtsError> {
    let Json(request) = payload.map_err(|rejection| TtsError::InvalidInput(rejection.body_text()))?;
    log::debug!(
        "Synthesis request: {} chars, speaker_id={:?}, language={}",
        request.text.chars().count(),
        request.speaker_id,
        request.language
    );

    let wav = pipeline::synthesize(request, &state.models).await?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], wav).into_response())
}

/// HTTP status for each failure class.
pub fn status_for(error: &TtsError) -> StatusCode {
    match error {
        TtsError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        TtsError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        TtsError::SynthesisTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        TtsError::SynthesisFailure(_)
        | TtsError::EncodingFailure(_)
        | TtsError::Initialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for TtsError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() && !matches!(self, TtsError::NotReady) {
            log::error!("{self}");
        } else {
            log::warn!("{self}");
        }
        (
            status,
            Json(ErrorResponse {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        assert_eq!(status_for(&TtsError::NotReady), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_for(&TtsError::InvalidInput("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&TtsError::SynthesisFailure("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&TtsError::EncodingFailure("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&TtsError::SynthesisTimeout(Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
