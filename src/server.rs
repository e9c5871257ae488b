use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    detect::{DetectError, Keypoint, PoseDetector},
    ingest,
    model::PoseModel,
};

/// Name of the multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectResponse {
    pub keypoints: Vec<Keypoint>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub requests: u64,
}

/// Errors returned to HTTP clients as `{"error": ...}`.
#[derive(Debug)]
pub enum ApiError {
    NoFile,
    Upload(StatusCode, String),
    InvalidImage(String),
    Inference(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NoFile => (StatusCode::BAD_REQUEST, "No file uploaded".to_string()),
            ApiError::Upload(status, message) => (status, message),
            ApiError::InvalidImage(reason) => {
                (StatusCode::BAD_REQUEST, format!("Invalid image: {reason}"))
            }
            ApiError::Inference(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Builds the HTTP router around a shared detector.
pub fn router<M: PoseModel>(detector: Arc<PoseDetector<M>>) -> Router {
    Router::new()
        .route("/", get(|| async { "Welcome to infernum-pose!" }))
        .route("/detect", post(post_detect::<M>))
        .route("/status", get(get_status::<M>))
        .layer(DefaultBodyLimit::disable())
        .with_state(detector)
}

async fn post_detect<M: PoseModel>(
    State(detector): State<Arc<PoseDetector<M>>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectResponse>, ApiError> {
    let Ok(mut multipart) = multipart else {
        log::warn!("Rejected a request without a multipart body");
        return Err(ApiError::NoFile);
    };

    let bytes = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Upload(e.status(), e.body_text()))?;
        match field {
            // only file parts count, a text field named `file` is not an upload
            Some(field) if field.name() == Some(FILE_FIELD) && field.file_name().is_some() => {
                break field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Upload(e.status(), e.body_text()))?;
            }
            Some(_) => continue,
            None => {
                log::warn!("Rejected an upload without a `{FILE_FIELD}` field");
                return Err(ApiError::NoFile);
            }
        }
    };

    let image = ingest::decode_rgb(&bytes).map_err(|e| {
        log::warn!("Rejected an undecodable upload: {e}");
        ApiError::InvalidImage(e.to_string())
    })?;

    let keypoints = detector.detect(image).await.map_err(|e| match e {
        DetectError::Image(e) => ApiError::InvalidImage(e.to_string()),
        DetectError::Engine(e) => {
            log::error!("Pose detection failed: {e}");
            ApiError::Inference(e.to_string())
        }
    })?;

    Ok(Json(DetectResponse { keypoints }))
}

async fn get_status<M: PoseModel>(
    State(detector): State<Arc<PoseDetector<M>>>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: detector.state().as_str().to_string(),
        requests: detector.requests(),
    })
}
