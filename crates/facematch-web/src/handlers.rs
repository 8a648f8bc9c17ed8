use crate::engine::EngineError;
use crate::page::{self, DisplayImage, Outcome};
use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use facematch_core::staging::{self, StagedPair, StagingError};
use facematch_core::upload::{self, ImageKind, UploadError};
use facematch_core::Verification;
use std::sync::Arc;
use thiserror::Error;
use tracing::Instrument;

pub const MSG_MISSING: &str = "Please upload both images.";
pub const MSG_INVALID: &str = "Please upload valid image files.";

/// Why a check could not produce a result.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("both images are required")]
    Missing,
    #[error("{side} upload is invalid: {source}")]
    Invalid {
        side: &'static str,
        #[source]
        source: UploadError,
    },
    #[error("malformed upload request: {message}")]
    Multipart { status: StatusCode, message: String },
    #[error("staging failed: {0}")]
    Staging(#[from] StagingError),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("verification failed: {0}")]
    Verification(#[from] EngineError),
}

impl CheckError {
    pub fn status(&self) -> StatusCode {
        match self {
            CheckError::Missing | CheckError::Invalid { .. } => StatusCode::BAD_REQUEST,
            CheckError::Multipart { status, .. } => *status,
            CheckError::Verification(e) if e.is_input_error() => StatusCode::UNPROCESSABLE_ENTITY,
            CheckError::Verification(EngineError::ChannelClosed) => StatusCode::SERVICE_UNAVAILABLE,
            CheckError::Staging(_) | CheckError::Task(_) | CheckError::Verification(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Headline shown to the user.
    pub fn message(&self) -> String {
        match self {
            CheckError::Missing => MSG_MISSING.to_string(),
            CheckError::Invalid { .. } => MSG_INVALID.to_string(),
            CheckError::Verification(e) => format!("Error during face verification: {e}"),
            CheckError::Multipart { message, .. } => format!("Error processing images: {message}"),
            CheckError::Staging(e) => format!("Error processing images: {e}"),
            CheckError::Task(e) => format!("Error processing images: {e}"),
        }
    }

    /// Extra explanation under the headline, when there is one.
    pub fn detail(&self) -> Option<String> {
        match self {
            CheckError::Invalid { .. } => Some(self.to_string()),
            _ => None,
        }
    }
}

/// One uploaded file as received.
pub struct Upload {
    pub bytes: Bytes,
    pub file_name: Option<String>,
}

/// A completed check with the uploads kept for display.
pub struct Checked {
    pub verification: Verification,
    pub source: (Bytes, ImageKind),
    pub comparison: (Bytes, ImageKind),
}

pub async fn index() -> Html<String> {
    Html(page::render(&Outcome::None))
}

/// Form submission: render the page with the result or the error.
pub async fn verify_page(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    match check(&state, multipart).await {
        Ok(done) => {
            let html = page::render(&Outcome::Result {
                verification: &done.verification,
                source: DisplayImage {
                    bytes: &done.source.0,
                    kind: done.source.1,
                },
                comparison: DisplayImage {
                    bytes: &done.comparison.0,
                    kind: done.comparison.1,
                },
            });
            (StatusCode::OK, Html(html)).into_response()
        }
        Err(err) => {
            let message = err.message();
            let detail = err.detail();
            let html = page::render(&Outcome::Error {
                message: &message,
                detail: detail.as_deref(),
            });
            (err.status(), Html(html)).into_response()
        }
    }
}

/// Same check as [`verify_page`], answered as JSON.
pub async fn verify_api(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    match check(&state, multipart).await {
        Ok(done) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "verified": done.verification.verified,
                "distance": done.verification.distance,
                "threshold": done.verification.threshold,
                "metric": done.verification.metric,
                "model": done.verification.model,
                "source_face": done.verification.source_face,
                "comparison_face": done.verification.comparison_face,
                "elapsed_ms": done.verification.elapsed_ms,
                "checked_at": chrono::Utc::now().to_rfc3339(),
            })),
        )
            .into_response(),
        Err(err) => (
            err.status(),
            Json(serde_json::json!({
                "error": err.message(),
                "detail": err.detail(),
            })),
        )
            .into_response(),
    }
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "metric": state.metric,
            "threshold": state.threshold,
            "enforce_detection": state.enforce_detection,
        })),
    )
}

/// Read, validate, stage and verify one upload pair.
async fn check(state: &Arc<AppState>, multipart: Multipart) -> Result<Checked, CheckError> {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("check", %request_id);

    async move {
        let (source, comparison) = read_uploads(multipart).await?;
        let (Some(source), Some(comparison)) = (source, comparison) else {
            tracing::info!("rejected: missing upload");
            return Err(CheckError::Missing);
        };

        let limits = state.limits;
        let temp_dir = state.temp_dir.clone();
        let source_bytes = source.bytes.clone();
        let comparison_bytes = comparison.bytes.clone();

        // Decoding and JPEG re-encoding are CPU-bound.
        let prepared = tokio::task::spawn_blocking(move || {
            let a = upload::validate(&source.bytes, source.file_name.as_deref(), &limits)
                .map_err(|source| CheckError::Invalid { side: "source", source })?;
            let b = upload::validate(&comparison.bytes, comparison.file_name.as_deref(), &limits)
                .map_err(|source| CheckError::Invalid { side: "comparison", source })?;
            let staged = StagedPair::stage(&a, &b, temp_dir.as_deref())?;
            Ok::<_, CheckError>((staged, a.kind, b.kind))
        })
        .await
        .map_err(|e| CheckError::Task(e.to_string()))?;
        let (staged, source_kind, comparison_kind) = match prepared {
            Ok(p) => p,
            Err(err) => {
                tracing::info!(error = %err, "rejected upload");
                return Err(err);
            }
        };

        let result = state
            .engine
            .verify(
                staged.source_path().to_path_buf(),
                staged.comparison_path().to_path_buf(),
            )
            .await;
        staging::discard(staged);

        let verification = match result {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(error = %err, "verification failed");
                return Err(err.into());
            }
        };

        Ok(Checked {
            verification,
            source: (source_bytes, source_kind),
            comparison: (comparison_bytes, comparison_kind),
        })
    }
    .instrument(span)
    .await
}

/// Collect the `source` and `comparison` parts. Empty parts (a form submitted
/// without choosing a file) count as missing.
async fn read_uploads(mut multipart: Multipart) -> Result<(Option<Upload>, Option<Upload>), CheckError> {
    let mut source = None;
    let mut comparison = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().filter(|n| !n.is_empty()).map(str::to_string);
        let slot = match name.as_str() {
            "source" => &mut source,
            "comparison" => &mut comparison,
            other => {
                tracing::debug!(field = other, "ignoring unknown form field");
                continue;
            }
        };
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.is_empty() {
            continue;
        }
        *slot = Some(Upload { bytes, file_name });
    }

    Ok((source, comparison))
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> CheckError {
    CheckError::Multipart {
        status: err.status(),
        message: err.body_text(),
    }
}
