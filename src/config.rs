// src/config.rs
use crate::errors::StudioError;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_PLANNER_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_PACING_MS: u64 = 1000;
const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 2048;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub planner_model: String,
    pub image_model: String,
    pub pacing_delay: Duration,
    pub max_image_dimension: u32,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, StudioError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, StudioError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let pacing_ms = match get("PACING_DELAY_MS") {
            Some(raw) => parse_number::<u64>("PACING_DELAY_MS", &raw)?,
            None => DEFAULT_PACING_MS,
        };
        let max_image_dimension = match get("MAX_IMAGE_DIMENSION") {
            Some(raw) => parse_number::<u32>("MAX_IMAGE_DIMENSION", &raw)?,
            None => DEFAULT_MAX_IMAGE_DIMENSION,
        };

        Ok(Self {
            api_key: get("GEMINI_API_KEY").or_else(|| get("API_KEY")),
            base_url: get("GEMINI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            planner_model: get("PLANNER_MODEL").unwrap_or_else(|| DEFAULT_PLANNER_MODEL.to_string()),
            image_model: get("IMAGE_MODEL").unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            pacing_delay: Duration::from_millis(pacing_ms),
            max_image_dimension,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, StudioError> {
    raw.trim()
        .parse()
        .map_err(|_| StudioError::Validation(format!("{} must be a number, got '{}'", key, raw)))
}
