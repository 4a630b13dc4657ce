// src/lib.rs
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod services;

use crate::models::ReferenceImage;
use crate::orchestrator::SessionOrchestrator;
use crate::services::{CredentialStore, ImageProcessor};
use std::sync::{Arc, RwLock};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub image_processor: Arc<ImageProcessor>,
    pub credentials: Arc<CredentialStore>,
    reference: Arc<RwLock<Option<Arc<ReferenceImage>>>>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<SessionOrchestrator>,
        image_processor: Arc<ImageProcessor>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            orchestrator,
            image_processor,
            credentials,
            reference: Arc::new(RwLock::new(None)),
        }
    }

    pub fn reference(&self) -> Option<Arc<ReferenceImage>> {
        self.reference
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn replace_reference(&self, image: Option<ReferenceImage>) {
        *self.reference.write().unwrap_or_else(|p| p.into_inner()) = image.map(Arc::new);
    }
}
