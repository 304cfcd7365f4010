use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{error, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;
use crate::mailer::SendError;

/// Every answer of the report route uses this envelope.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
}

impl ApiResponse {
    pub fn ok(message: &str) -> Json<ApiResponse> {
        Json(ApiResponse {
            success: true,
            message: message.to_string(),
        })
    }
}

pub fn json_error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ApiResponse {
            success: false,
            message: message.to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),
    #[error("malformed multipart body: {0}")]
    MalformedBody(String),
    #[error("request body exceeds the upload limit")]
    PayloadTooLarge,
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("photo attachment is required")]
    MissingAttachment,
    #[error("unexpected file part {field:?}")]
    UnexpectedFile { field: String },
    #[error("only one photo may be attached")]
    TooManyFiles,
    #[error("attachment type {0:?} is not accepted")]
    UnsupportedMediaType(String),
    #[error("delivery is not configured: {0}")]
    Configuration(ConfigError),
    #[error("email delivery failed: {0}")]
    Delivery(#[from] SendError),
    #[error("failed to render email body: {0}")]
    Render(#[from] askama::Error),
}

impl ReportError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReportError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ReportError::MalformedBody(_)
            | ReportError::MissingFields(_)
            | ReportError::MissingAttachment
            | ReportError::UnexpectedFile { .. }
            | ReportError::TooManyFiles
            | ReportError::UnsupportedMediaType(_) => StatusCode::BAD_REQUEST,
            ReportError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ReportError::Configuration(_) | ReportError::Delivery(_) | ReportError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Caller-facing text. Server-side detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ReportError::MethodNotAllowed(_) => "Method not allowed.".to_string(),
            ReportError::MalformedBody(_) => {
                "The request must be a valid multipart/form-data submission.".to_string()
            }
            ReportError::PayloadTooLarge => "The upload is too large.".to_string(),
            ReportError::MissingFields(fields) => {
                format!("All fields are required. Missing: {}.", fields.join(", "))
            }
            ReportError::MissingAttachment => "A photo of the problem is required.".to_string(),
            ReportError::UnexpectedFile { field } => {
                format!("Unexpected file field {:?}.", field)
            }
            ReportError::TooManyFiles => "Only one photo may be attached.".to_string(),
            ReportError::UnsupportedMediaType(mime) => {
                format!("Attachments of type {:?} are not accepted.", mime)
            }
            ReportError::Configuration(_) => {
                "The report service is not configured to send email.".to_string()
            }
            ReportError::Delivery(_) | ReportError::Render(_) => {
                "An error occurred while sending the email.".to_string()
            }
        }
    }
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("[report] {}", self);
        } else {
            warn!("[report] rejected submission: {}", self);
        }
        json_error(status, &self.public_message())
    }
}
