// src/handlers.rs
use crate::{AppState, errors::StudioError, models::*, services::ApiKey};
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use log::info;
use serde::Deserialize;
use tokio_stream::wrappers::WatchStream;

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/credential", web::post().to(set_credential))
            .route("/credential", web::delete().to(clear_credential))
            .route("/upload", web::post().to(upload_image))
            .route("/generate", web::post().to(start_generation))
            .route("/session", web::get().to(get_session))
            .route("/session/events", web::get().to(session_events))
            .route("/session/cancel", web::post().to(cancel_session))
            .route("/session/reset", web::post().to(reset_session)),
    )
    .route("/health", web::get().to(health_check));
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "portrait-studio",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Debug, Deserialize)]
pub struct CredentialRequest {
    pub api_key: String,
}

pub async fn set_credential(
    body: web::Json<CredentialRequest>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let key = ApiKey::new(body.into_inner().api_key)
        .ok_or_else(|| StudioError::Validation("api_key must not be empty".to_string()))?;
    data.credentials.set(key);
    info!("API credential updated");
    Ok(HttpResponse::NoContent().finish())
}

pub async fn clear_credential(data: web::Data<AppState>) -> HttpResponse {
    data.credentials.clear();
    HttpResponse::NoContent().finish()
}

/// Replaces the reference photo and resets the session.
pub async fn upload_image(
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    if data.orchestrator.is_running() {
        return Err(StudioError::SessionBusy.into());
    }

    let mut image_data = Vec::new();
    if let Some(mut field) = payload.try_next().await? {
        while let Some(chunk) = field.try_next().await? {
            if image_data.len() + chunk.len() > MAX_UPLOAD_BYTES {
                return Err(StudioError::Validation(format!(
                    "Upload exceeds {} bytes",
                    MAX_UPLOAD_BYTES
                ))
                .into());
            }
            image_data.extend_from_slice(&chunk);
        }
    }

    if image_data.is_empty() {
        return Err(StudioError::Validation("No image provided".to_string()).into());
    }

    let reference = data.image_processor.prepare_reference(&image_data)?;
    let body = serde_json::json!({
        "reference_id": reference.id,
        "mime_type": reference.mime_type,
        "width": reference.width,
        "height": reference.height,
        "size": reference.data.len(),
        "preview_url": reference.data_url(),
    });

    info!(
        "Reference image {} captured ({}x{}, {})",
        reference.id, reference.width, reference.height, reference.mime_type
    );
    // A run may have started while the body was streaming.
    data.orchestrator
        .reset_if_idle(|| data.replace_reference(Some(reference)))?;

    Ok(HttpResponse::Ok().json(body))
}

pub async fn start_generation(
    body: web::Json<GenerationSettings>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let settings = body.into_inner();
    settings.validate()?;

    let reference = data.reference().ok_or_else(|| {
        StudioError::Validation("Upload a reference image first".to_string())
    })?;

    // The run reports through the orchestrator's state stream, so the join
    // handle is detached.
    let handle = data.orchestrator.spawn(reference, settings)?;
    info!(
        "Session {} started: {} images, gender {}",
        handle.session_id,
        settings.count,
        settings.gender.as_str()
    );

    Ok(HttpResponse::Accepted().json(serde_json::json!({
        "session_id": handle.session_id,
        "count": settings.count,
        "gender": settings.gender,
    })))
}

pub async fn get_session(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.orchestrator.snapshot())
}

/// Server-sent events, one message per snapshot change.
pub async fn session_events(data: web::Data<AppState>) -> HttpResponse {
    let stream = WatchStream::new(data.orchestrator.subscribe()).map(|snapshot| {
        serde_json::to_string(&snapshot)
            .map(|json| Bytes::from(format!("data: {}\n\n", json)))
            .map_err(actix_web::error::ErrorInternalServerError)
    });

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(stream)
}

pub async fn cancel_session(data: web::Data<AppState>) -> HttpResponse {
    let cancelled = data.orchestrator.cancel();
    HttpResponse::Ok().json(serde_json::json!({ "cancelled": cancelled }))
}

pub async fn reset_session(data: web::Data<AppState>) -> HttpResponse {
    data.orchestrator.reset();
    data.replace_reference(None);
    HttpResponse::Ok().json(data.orchestrator.snapshot())
}
