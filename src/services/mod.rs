// src/services/mod.rs
pub mod credentials;
pub mod gemini_service;
pub mod image_processor;

pub use credentials::{ApiKey, CredentialSelector, CredentialSource, CredentialStore};
pub use gemini_service::GeminiClient;
pub use image_processor::ImageProcessor;

use crate::errors::StudioError;
use crate::models::{GenderPreference, ReferenceImage, RenderedImage, Scenario, SessionPlan};
use async_trait::async_trait;

/// Phase one: turn the reference photo into a shooting plan.
///
/// Implementations make a single request and keep no state between calls.
/// They should fail with [`StudioError::Planning`]. The returned plan is
/// passed through as-is, even when its scenario count differs from `count`.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        credential: &ApiKey,
        image: &ReferenceImage,
        count: usize,
        gender: GenderPreference,
    ) -> Result<SessionPlan, StudioError>;
}

/// Phase two: render one scenario against the reference photo.
///
/// Fails with [`StudioError::Synthesis`]; no retries, no local fallback.
#[async_trait]
pub trait ImageSynthesizer: Send + Sync {
    async fn render(
        &self,
        credential: &ApiKey,
        image: &ReferenceImage,
        scenario: &Scenario,
        physical_description: &str,
    ) -> Result<RenderedImage, StudioError>;
}
