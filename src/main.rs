// src/main.rs
use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use log::{info, warn};
use std::sync::Arc;

use portrait_studio::AppState;
use portrait_studio::config::Config;
use portrait_studio::handlers;
use portrait_studio::orchestrator::SessionOrchestrator;
use portrait_studio::services::{ApiKey, CredentialStore, GeminiClient, ImageProcessor};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting portrait studio...");

    let config = Config::from_env().context("invalid configuration")?;

    let credentials = Arc::new(CredentialStore::new(
        config.api_key.clone().and_then(ApiKey::new),
    ));
    if credentials.get().is_none() {
        warn!("GEMINI_API_KEY is not set; POST /api/v1/credential before generating");
    }

    let gemini = Arc::new(GeminiClient::from_config(&config));
    let orchestrator = Arc::new(
        SessionOrchestrator::new(gemini.clone(), gemini, credentials.clone())
            .with_pacing(config.pacing_delay),
    );
    let image_processor = Arc::new(ImageProcessor::new(config.max_image_dimension));

    let app_state = AppState::new(orchestrator, image_processor, credentials);

    info!("Starting HTTP server on {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::routes)
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("failed to bind {}", config.bind_addr))?
    .run()
    .await?;

    Ok(())
}
