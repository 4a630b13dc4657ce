// src/models.rs
use crate::errors::StudioError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Output sizes a session may request.
pub const ALLOWED_COUNTS: [usize; 3] = [10, 20, 30];

/// The user's photo, captured once per upload and never mutated afterwards.
#[derive(Clone)]
pub struct ReferenceImage {
    pub id: Uuid,
    pub data: Bytes,
    pub mime_type: String,
    /// Standard base64 of `data`, the form the generation service expects.
    pub base64: String,
    pub width: u32,
    pub height: u32,
    pub uploaded_at: DateTime<Utc>,
}

impl ReferenceImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

impl fmt::Debug for ReferenceImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceImage")
            .field("id", &self.id)
            .field("mime_type", &self.mime_type)
            .field("size", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("uploaded_at", &self.uploaded_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenderPreference {
    #[default]
    Auto,
    Male,
    Female,
}

impl GenderPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenderPreference::Auto => "auto",
            GenderPreference::Male => "male",
            GenderPreference::Female => "female",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub count: usize,
    #[serde(default)]
    pub gender: GenderPreference,
}

impl GenerationSettings {
    pub fn new(count: usize, gender: GenderPreference) -> Result<Self, StudioError> {
        let settings = Self { count, gender };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), StudioError> {
        if ALLOWED_COUNTS.contains(&self.count) {
            Ok(())
        } else {
            Err(StudioError::Validation(format!(
                "count must be one of {:?}, got {}",
                ALLOWED_COUNTS, self.count
            )))
        }
    }
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            count: ALLOWED_COUNTS[0],
            gender: GenderPreference::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub outfit: String,
    pub location: String,
    pub lighting: String,
    pub pose: String,
    pub style_name: String,
}

impl Scenario {
    pub fn prompt_summary(&self) -> String {
        format!("Outfit: {}, Location: {}", self.outfit, self.location)
    }
}

/// Shooting plan returned by the planner. The scenario count is whatever the
/// service returned, which may differ from the requested count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPlan {
    pub physical_description: String,
    pub scenarios: Vec<Scenario>,
}

/// Raw output of one synthesis call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub mime_type: String,
    pub base64: String,
}

impl RenderedImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: Uuid,
    pub scenario_index: usize,
    /// Base64 data URL, directly displayable.
    pub image_url: String,
    pub prompt: String,
    pub style: String,
    pub created_at: DateTime<Utc>,
}

impl GeneratedImage {
    pub fn from_render(index: usize, scenario: &Scenario, rendered: RenderedImage) -> Self {
        Self {
            id: Uuid::new_v4(),
            scenario_index: index,
            image_url: rendered.data_url(),
            prompt: scenario.prompt_summary(),
            style: scenario.style_name.clone(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Analyzing,
    Generating,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl Progress {
    pub fn new(current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
        }
    }
}

/// Everything an observer needs to render the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub state: SessionState,
    pub progress: Progress,
    /// Most recent image first.
    pub images: Vec<GeneratedImage>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        session_id: Uuid,
        state: SessionState,
    },
    Progress {
        session_id: Uuid,
        progress: Progress,
    },
    ImageAdded {
        session_id: Uuid,
        image: GeneratedImage,
    },
    ScenarioFailed {
        session_id: Uuid,
        index: usize,
        style_name: String,
        error: String,
    },
}

#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub index: usize,
    pub style_name: String,
    pub result: Result<GeneratedImage, StudioError>,
}

/// Final account of a run that reached `Complete`.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub plan: SessionPlan,
    pub outcomes: Vec<ScenarioOutcome>,
}

impl SessionReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &GeneratedImage> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ScenarioOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_accept_only_allowed_counts() {
        for count in ALLOWED_COUNTS {
            assert!(GenerationSettings::new(count, GenderPreference::Auto).is_ok());
        }
        let err = GenerationSettings::new(15, GenderPreference::Male).unwrap_err();
        assert!(matches!(err, StudioError::Validation(_)));
    }

    #[test]
    fn settings_deserialize_with_default_gender() {
        let settings: GenerationSettings = serde_json::from_str(r#"{"count":20}"#).unwrap();
        assert_eq!(settings.count, 20);
        assert_eq!(settings.gender, GenderPreference::Auto);

        let settings: GenerationSettings =
            serde_json::from_str(r#"{"count":30,"gender":"female"}"#).unwrap();
        assert_eq!(settings.gender, GenderPreference::Female);
    }

    #[test]
    fn plan_uses_camel_case_wire_names() {
        let plan: SessionPlan = serde_json::from_str(
            r#"{
                "physicalDescription": "short dark hair",
                "scenarios": [{
                    "outfit": "navy suit",
                    "location": "glass office",
                    "lighting": "soft window light",
                    "pose": "arms crossed",
                    "styleName": "Business Suit"
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(plan.scenarios.len(), 1);
        assert_eq!(plan.scenarios[0].style_name, "Business Suit");
        assert_eq!(
            plan.scenarios[0].prompt_summary(),
            "Outfit: navy suit, Location: glass office"
        );
    }

    #[test]
    fn snapshot_serializes_state_in_snake_case() {
        let snapshot = SessionSnapshot {
            state: SessionState::Generating,
            ..Default::default()
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["state"], "generating");
        assert!(value["images"].as_array().unwrap().is_empty());
    }
}
