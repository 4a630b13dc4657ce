// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StudioError {
    #[error("No API credential available for the generation service")]
    MissingCredential,

    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Image synthesis failed: {0}")]
    Synthesis(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("A generation session is already running")]
    SessionBusy,

    #[error("Session was cancelled")]
    Cancelled,
}

impl ResponseError for StudioError {
    fn error_response(&self) -> HttpResponse {
        match self {
            StudioError::MissingCredential => {
                HttpResponse::Unauthorized().json(serde_json::json!({
                    "error": "Missing credential",
                    "message": self.to_string()
                }))
            }
            StudioError::Planning(_) | StudioError::Synthesis(_) => {
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": "AI service error",
                    "message": self.to_string()
                }))
            }
            StudioError::Unexpected(_) => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Internal error",
                    "message": self.to_string()
                }))
            }
            StudioError::ImageProcessing(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Image processing error",
                    "message": self.to_string()
                }))
            }
            StudioError::Validation(_) => HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Validation error",
                "message": self.to_string()
            })),
            StudioError::SessionBusy => HttpResponse::Conflict().json(serde_json::json!({
                "error": "Session busy",
                "message": self.to_string()
            })),
            StudioError::Cancelled => HttpResponse::Conflict().json(serde_json::json!({
                "error": "Cancelled",
                "message": self.to_string()
            })),
        }
    }
}
