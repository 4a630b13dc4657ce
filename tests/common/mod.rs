//! In-process doubles for the generation service and credential flow.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use portrait_studio::errors::StudioError;
use portrait_studio::models::{
    GenderPreference, ReferenceImage, RenderedImage, Scenario, SessionPlan,
};
use portrait_studio::orchestrator::SessionOrchestrator;
use portrait_studio::services::{
    ApiKey, CredentialSelector, CredentialSource, ImageSynthesizer, Planner,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

pub fn reference() -> Arc<ReferenceImage> {
    Arc::new(ReferenceImage {
        id: Uuid::new_v4(),
        data: Bytes::from_static(b"\xff\xd8\xff\xe0"),
        mime_type: "image/jpeg".to_string(),
        base64: "/9j/4A==".to_string(),
        width: 768,
        height: 1024,
        uploaded_at: Utc::now(),
    })
}

pub fn style(index: usize) -> String {
    format!("Style {}", index)
}

pub fn plan_with(scenarios: usize) -> SessionPlan {
    SessionPlan {
        physical_description: "oval face, short brown hair, early thirties".to_string(),
        scenarios: (0..scenarios)
            .map(|i| Scenario {
                outfit: format!("outfit {}", i),
                location: format!("location {}", i),
                lighting: "soft key light".to_string(),
                pose: "three-quarter turn".to_string(),
                style_name: style(i),
            })
            .collect(),
    }
}

pub fn key() -> ApiKey {
    ApiKey::new("test-key").unwrap()
}

pub struct FakePlanner {
    result: Result<SessionPlan, StudioError>,
    panics: bool,
    latency: Duration,
    pub calls: AtomicUsize,
    pub requests: Mutex<Vec<(String, usize, GenderPreference)>>,
}

impl FakePlanner {
    pub fn returning(plan: SessionPlan) -> Arc<Self> {
        Arc::new(Self::build(Ok(plan), false))
    }

    pub fn failing(error: StudioError) -> Arc<Self> {
        Arc::new(Self::build(Err(error), false))
    }

    pub fn panicking() -> Arc<Self> {
        Arc::new(Self::build(Ok(plan_with(0)), true))
    }

    pub fn slow(plan: SessionPlan, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            ..Self::build(Ok(plan), false)
        })
    }

    fn build(result: Result<SessionPlan, StudioError>, panics: bool) -> Self {
        Self {
            result,
            panics,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Planner for FakePlanner {
    async fn plan(
        &self,
        credential: &ApiKey,
        _image: &ReferenceImage,
        count: usize,
        gender: GenderPreference,
    ) -> Result<SessionPlan, StudioError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((credential.expose().to_string(), count, gender));
        if self.panics {
            panic!("planner exploded");
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.result.clone()
    }
}

#[derive(Debug, Clone)]
pub struct RenderCall {
    pub style: String,
    pub started: Instant,
    pub finished: Instant,
}

pub struct FakeSynthesizer {
    failing: HashSet<String>,
    panicking: HashSet<String>,
    latency: Duration,
    pub attempts: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: Mutex<Vec<RenderCall>>,
}

impl FakeSynthesizer {
    pub fn new() -> Arc<Self> {
        Self::build(&[], Duration::ZERO)
    }

    /// Fails the scenarios at the given plan indices.
    pub fn failing_at(indices: &[usize]) -> Arc<Self> {
        Self::build(indices, Duration::ZERO)
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Self::build(&[], latency)
    }

    /// Panics inside `render` for the scenario at `index`.
    pub fn panicking_at(index: usize) -> Arc<Self> {
        let mut synthesizer = Self::unshared(&[], Duration::ZERO);
        synthesizer.panicking.insert(style(index));
        Arc::new(synthesizer)
    }

    fn build(indices: &[usize], latency: Duration) -> Arc<Self> {
        Arc::new(Self::unshared(indices, latency))
    }

    fn unshared(indices: &[usize], latency: Duration) -> Self {
        Self {
            failing: indices.iter().map(|&i| style(i)).collect(),
            panicking: HashSet::new(),
            latency,
            attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn rendered_styles(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.style.clone())
            .collect()
    }
}

#[async_trait]
impl ImageSynthesizer for FakeSynthesizer {
    async fn render(
        &self,
        _credential: &ApiKey,
        _image: &ReferenceImage,
        scenario: &Scenario,
        physical_description: &str,
    ) -> Result<RenderedImage, StudioError> {
        assert!(!physical_description.is_empty());
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.panicking.contains(&scenario.style_name) {
            panic!("renderer crashed on {}", scenario.style_name);
        }
        let started = Instant::now();
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(RenderCall {
            style: scenario.style_name.clone(),
            started,
            finished: Instant::now(),
        });

        if self.failing.contains(&scenario.style_name) {
            return Err(StudioError::Synthesis(format!(
                "no image for {}",
                scenario.style_name
            )));
        }
        Ok(RenderedImage {
            mime_type: "image/png".to_string(),
            base64: "iVBORw0KGgo=".to_string(),
        })
    }
}

pub struct FixedCredentials(pub Option<ApiKey>);

#[async_trait]
impl CredentialSource for FixedCredentials {
    async fn current(&self) -> Option<ApiKey> {
        self.0.clone()
    }
}

pub struct FakeSelector {
    key: Option<ApiKey>,
    pub calls: AtomicUsize,
}

impl FakeSelector {
    pub fn new(key: Option<ApiKey>) -> Arc<Self> {
        Arc::new(Self {
            key,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl CredentialSelector for FakeSelector {
    async fn select(&self) -> Option<ApiKey> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.key.clone()
    }
}

/// Orchestrator with a valid key and no pacing.
pub fn orchestrator(
    planner: Arc<FakePlanner>,
    synthesizer: Arc<FakeSynthesizer>,
) -> SessionOrchestrator {
    SessionOrchestrator::new(
        planner,
        synthesizer,
        Arc::new(FixedCredentials(Some(key()))),
    )
    .with_pacing(Duration::ZERO)
}
