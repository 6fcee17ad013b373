//! HTTP surface: `GET /` and `POST /predict`
//!
//! Handlers stay thin. Multipart parsing happens here; everything after the
//! upload is extracted runs inside [`LabelDetectionProcessor::detect`] on the
//! blocking pool.

use crate::{
    config::ServerConfig,
    error::{Result, SegLabelError},
    processor::LabelDetectionProcessor,
    types::{DetectionResult, UploadedFile},
};
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error, info};

/// Body of `GET /`
pub const WELCOME_MESSAGE: &str =
    "Welcome to the Segformer API! Use the /predict endpoint to make predictions.";

/// Multipart field carrying the image
pub const FILE_FIELD: &str = "file";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    processor: Arc<LabelDetectionProcessor>,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    detected_label: DetectionResult,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for SegLabelError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            err if err.is_client_error() => (StatusCode::BAD_REQUEST, err.to_string()),
            // Detail was logged by the segmentation adapter
            SegLabelError::Inference(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Inference failed".to_string())
            },
            err => {
                error!(error = %err, "Unexpected error while handling request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            },
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

/// Build the application router around a loaded processor
pub fn router(processor: LabelDetectionProcessor, max_upload_bytes: usize) -> Router {
    let state = AppState {
        processor: Arc::new(processor),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(home))
        .route("/predict", post(predict))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C
///
/// # Errors
/// - Bind failures or server I/O errors
pub async fn serve(processor: LabelDetectionProcessor, config: &ServerConfig) -> Result<()> {
    let app = router(processor, config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    info!(address = %listener.local_addr()?, "Garment label API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn home() -> &'static str {
    WELCOME_MESSAGE
}

async fn predict(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>> {
    let upload = match multipart {
        Ok(multipart) => read_file_field(multipart).await?,
        // A non-multipart body carries no files at all
        Err(rejection) => {
            debug!(%rejection, "Request body is not multipart form data");
            None
        },
    };

    let processor = Arc::clone(&state.processor);
    let detected_label = tokio::task::spawn_blocking(move || processor.detect(upload))
        .await
        .map_err(|e| SegLabelError::internal(format!("Detection task failed: {e}")))??;

    Ok(Json(PredictResponse { detected_label }))
}

/// Pull the first `file` part that carries a filename
///
/// Parts named `file` without a filename attribute are form values, not
/// uploads, and are skipped.
async fn read_file_field(mut multipart: Multipart) -> Result<Option<UploadedFile>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SegLabelError::bad_request(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            debug!("Ignoring 'file' part without a filename");
            continue;
        };
        let data = field
            .bytes()
            .await
            .map_err(|e| SegLabelError::bad_request(e.body_text()))?;
        debug!(filename = %filename, bytes = data.len(), "Received upload");
        return Ok(Some(UploadedFile::new(Some(filename), data.to_vec())));
    }
    Ok(None)
}
