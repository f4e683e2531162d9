use crate::auth::AuthError;
use crate::pipeline::PipelineError;
use crate::range::RangeError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors the export endpoint reports before any of the file has been sent.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("export worker stopped without producing output")]
    WorkerLost,
}

impl ExportError {
    pub fn status(&self) -> StatusCode {
        match self {
            ExportError::Auth(AuthError::Forbidden { .. }) => StatusCode::FORBIDDEN,
            ExportError::Auth(AuthError::Issue(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ExportError::Auth(_) => StatusCode::UNAUTHORIZED,
            ExportError::Range(_) => StatusCode::BAD_REQUEST,
            ExportError::Pipeline(PipelineError::Store(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ExportError::Pipeline(PipelineError::TimedOut(_)) => StatusCode::GATEWAY_TIMEOUT,
            ExportError::Pipeline(_) | ExportError::WorkerLost => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message put in the response body. Auth and server failures stay generic.
    fn public_message(&self) -> String {
        match self {
            ExportError::Range(err) => err.to_string(),
            ExportError::Auth(AuthError::Forbidden { .. }) => "forbidden".to_string(),
            ExportError::Auth(_) => "unauthorized".to_string(),
            ExportError::Pipeline(PipelineError::Store(_)) => {
                "attendance store unavailable".to_string()
            }
            ExportError::Pipeline(PipelineError::TimedOut(_)) => "export timed out".to_string(),
            ExportError::Pipeline(_) | ExportError::WorkerLost => "export failed".to_string(),
        }
    }
}

impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "export failed before streaming");
        }

        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
