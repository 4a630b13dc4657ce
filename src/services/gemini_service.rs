// src/services/gemini_service.rs
use crate::config::Config;
use crate::errors::StudioError;
use crate::models::{GenderPreference, ReferenceImage, RenderedImage, Scenario, SessionPlan};
use crate::services::{ApiKey, ImageSynthesizer, Planner};
use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use std::time::Instant;

const PORTRAIT_ASPECT_RATIO: &str = "3:4";

/// Gemini `generateContent` client. One instance serves both phases, using a
/// text model for planning and an image model for rendering.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    planner_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        planner_model: impl Into<String>,
        image_model: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            planner_model: planner_model.into(),
            image_model: image_model.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.base_url.clone(),
            config.planner_model.clone(),
            config.image_model.clone(),
        )
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }

    async fn generate_content(
        &self,
        credential: &ApiKey,
        model: &str,
        body: &Value,
        wrap: fn(String) -> StudioError,
    ) -> Result<Value, StudioError> {
        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", credential.expose())
            .json(body)
            .send()
            .await
            .map_err(|e| wrap(format!("Gemini request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(wrap(describe_http_error(status, &error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| wrap(format!("Failed to parse Gemini response: {}", e)))
    }
}

#[async_trait]
impl Planner for GeminiClient {
    async fn plan(
        &self,
        credential: &ApiKey,
        image: &ReferenceImage,
        count: usize,
        gender: GenderPreference,
    ) -> Result<SessionPlan, StudioError> {
        let start = Instant::now();
        let body = plan_request_body(image, count, gender);

        let result = self
            .generate_content(credential, &self.planner_model, &body, StudioError::Planning)
            .await?;

        let text = extract_text(&result)
            .ok_or_else(|| StudioError::Planning(no_content_reason(&result, "plan")))?;

        let plan: SessionPlan = serde_json::from_str(&text)
            .map_err(|e| StudioError::Planning(format!("Failed to parse plan JSON: {}", e)))?;

        info!(
            "Planned {} scenarios (requested {}) with {} in {}ms",
            plan.scenarios.len(),
            count,
            self.planner_model,
            start.elapsed().as_millis()
        );
        Ok(plan)
    }
}

#[async_trait]
impl ImageSynthesizer for GeminiClient {
    async fn render(
        &self,
        credential: &ApiKey,
        image: &ReferenceImage,
        scenario: &Scenario,
        physical_description: &str,
    ) -> Result<RenderedImage, StudioError> {
        let start = Instant::now();
        let body = render_request_body(image, scenario, physical_description);

        let result = self
            .generate_content(credential, &self.image_model, &body, StudioError::Synthesis)
            .await?;

        let rendered = extract_inline_image(&result)
            .ok_or_else(|| StudioError::Synthesis(no_content_reason(&result, "image")))?;

        debug!(
            "Rendered '{}' with {} in {}ms",
            scenario.style_name,
            self.image_model,
            start.elapsed().as_millis()
        );
        Ok(rendered)
    }
}

fn plan_prompt(count: usize, gender: GenderPreference) -> String {
    let wardrobe = match gender {
        GenderPreference::Auto => String::new(),
        other => format!(
            "The subject should be styled as {}; every outfit must suit that.\n",
            other.as_str()
        ),
    };

    format!(
        r#"
        Study the person in the attached photo.

        1. Write a compact but precise physical description (face shape, hair,
           build, estimated age, ethnicity) that lets another model keep the
           same identity.
        2. Propose exactly {count} distinct professional photo shoots for this
           person, spread across business, casual, sport, evening, travel and
           artistic themes. Each shoot needs an outfit, a location, a lighting
           setup, a pose and a short style title such as "Business Suit".
           Make outfits, places, poses and lighting clearly different from
           one shoot to the next.

        {wardrobe}
        Respond with JSON only.
        "#
    )
}

fn plan_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "physicalDescription": {
                "type": "STRING",
                "description": "Detailed physical description of the person"
            },
            "scenarios": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "outfit": { "type": "STRING" },
                        "location": { "type": "STRING" },
                        "lighting": { "type": "STRING" },
                        "pose": { "type": "STRING" },
                        "styleName": {
                            "type": "STRING",
                            "description": "Short title for this style"
                        }
                    },
                    "required": ["outfit", "location", "lighting", "pose", "styleName"]
                }
            }
        },
        "required": ["physicalDescription", "scenarios"]
    })
}

fn plan_request_body(image: &ReferenceImage, count: usize, gender: GenderPreference) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "inlineData": { "mimeType": image.mime_type, "data": image.base64 } },
                { "text": plan_prompt(count, gender) }
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": plan_schema()
        }
    })
}

fn render_prompt(scenario: &Scenario, physical_description: &str) -> String {
    format!(
        r#"
        Photorealistic portrait based on the attached reference photo.
        The face and identity must match the reference exactly: same facial
        structure, features, skin tone and hair.

        New setting:
        Outfit: {outfit}
        Location: {location}
        Lighting: {lighting}
        Pose: {pose}

        Subject reference: {physical_description}

        Professional photography, sharp focus, high detail.
        "#,
        outfit = scenario.outfit,
        location = scenario.location,
        lighting = scenario.lighting,
        pose = scenario.pose,
    )
}

fn render_request_body(
    image: &ReferenceImage,
    scenario: &Scenario,
    physical_description: &str,
) -> Value {
    json!({
        "contents": [{
            "parts": [
                { "text": render_prompt(scenario, physical_description) },
                { "inlineData": { "mimeType": image.mime_type, "data": image.base64 } }
            ]
        }],
        "generationConfig": {
            "imageConfig": { "aspectRatio": PORTRAIT_ASPECT_RATIO }
        }
    })
}

fn first_candidate_parts(result: &Value) -> &[Value] {
    result["candidates"][0]["content"]["parts"]
        .as_array()
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Concatenated text of the first candidate, or `None` when it is empty.
fn extract_text(result: &Value) -> Option<String> {
    let text: String = first_candidate_parts(result)
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();

    if text.trim().is_empty() { None } else { Some(text) }
}

fn extract_inline_image(result: &Value) -> Option<RenderedImage> {
    first_candidate_parts(result).iter().find_map(|part| {
        let inline = &part["inlineData"];
        let data = inline["data"].as_str().filter(|d| !d.is_empty())?;
        let mime_type = inline["mimeType"]
            .as_str()
            .filter(|m| !m.is_empty())
            .unwrap_or("image/png");
        Some(RenderedImage {
            mime_type: mime_type.to_string(),
            base64: data.to_string(),
        })
    })
}

fn no_content_reason(result: &Value, what: &str) -> String {
    if let Some(reason) = result["promptFeedback"]["blockReason"].as_str() {
        return format!("No {} returned, request blocked: {}", what, reason);
    }
    if let Some(reason) = result["candidates"][0]["finishReason"].as_str() {
        return format!("No {} returned (finish reason {})", what, reason);
    }
    format!("No {} returned in response", what)
}

fn describe_http_error(status: StatusCode, body: &str) -> String {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string());

    if message.is_empty() {
        format!("Gemini error: HTTP {}", status)
    } else {
        format!("Gemini error: HTTP {}: {}", status, message)
    }
}
