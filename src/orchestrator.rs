// src/orchestrator.rs
//! Drives one generation session: plan once, then render every scenario in
//! order, one at a time, publishing state as it goes.
//!
//! Observers either follow the latest [`SessionSnapshot`] through
//! [`SessionOrchestrator::subscribe`] or read the ordered [`SessionEvent`] log
//! from [`SessionOrchestrator::events`]. Only one run may hold the session slot
//! at a time; a second `start` is rejected with [`StudioError::SessionBusy`].

use crate::errors::StudioError;
use crate::models::{
    GeneratedImage, GenerationSettings, Progress, ReferenceImage, ScenarioOutcome, SessionEvent,
    SessionPlan, SessionReport, SessionSnapshot, SessionState,
};
use crate::services::{ApiKey, CredentialSelector, CredentialSource, ImageSynthesizer, Planner};
use futures_util::FutureExt;
use log::{error, info, warn};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{OwnedMutexGuard, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const DEFAULT_PACING: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 1024;
const ANALYZING_MESSAGE: &str = "Analyzing facial features and planning scenarios...";

/// A run spawned onto the runtime.
pub struct SessionHandle {
    pub session_id: Uuid,
    pub join: JoinHandle<Result<SessionReport, StudioError>>,
}

/// Claimed session slot. Dropping it frees the orchestrator for the next run.
struct RunContext {
    session_id: Uuid,
    cancel: CancellationToken,
    _slot: OwnedMutexGuard<()>,
}

struct ActiveRun {
    session_id: Uuid,
    cancel: CancellationToken,
}

pub struct SessionOrchestrator {
    planner: Arc<dyn Planner>,
    synthesizer: Arc<dyn ImageSynthesizer>,
    credentials: Arc<dyn CredentialSource>,
    credential_selector: Option<Arc<dyn CredentialSelector>>,
    pacing: Duration,
    slot: Arc<tokio::sync::Mutex<()>>,
    active: Mutex<Option<ActiveRun>>,
    state_tx: watch::Sender<SessionSnapshot>,
    events_tx: broadcast::Sender<SessionEvent>,
}

impl SessionOrchestrator {
    pub fn new(
        planner: Arc<dyn Planner>,
        synthesizer: Arc<dyn ImageSynthesizer>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionSnapshot::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            planner,
            synthesizer,
            credentials,
            credential_selector: None,
            pacing: DEFAULT_PACING,
            slot: Arc::new(tokio::sync::Mutex::new(())),
            active: Mutex::new(None),
            state_tx,
            events_tx,
        }
    }

    /// Delay between consecutive scenario attempts.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Hook consulted when the credential source comes up empty.
    pub fn on_credential_needed(mut self, selector: Arc<dyn CredentialSelector>) -> Self {
        self.credential_selector = Some(selector);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state_tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.slot.try_lock().is_err()
    }

    /// Runs a whole session on the caller's task.
    pub async fn start(
        &self,
        image: Arc<ReferenceImage>,
        settings: GenerationSettings,
    ) -> Result<SessionReport, StudioError> {
        let ctx = self.claim(settings)?;
        self.run(ctx, image, settings).await
    }

    /// Claims the session slot now and runs the session in the background.
    pub fn spawn(
        self: &Arc<Self>,
        image: Arc<ReferenceImage>,
        settings: GenerationSettings,
    ) -> Result<SessionHandle, StudioError> {
        let ctx = self.claim(settings)?;
        let session_id = ctx.session_id;
        let this = Arc::clone(self);
        let join = tokio::spawn(async move { this.run(ctx, image, settings).await });
        Ok(SessionHandle { session_id, join })
    }

    /// Stops the active run at its next suspension point. Images already
    /// produced stay in the snapshot.
    pub fn cancel(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        match active.as_ref() {
            Some(run) => {
                info!("Cancelling session {}", run.session_id);
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels any active run and returns to an empty `Idle` snapshot.
    pub fn reset(&self) {
        self.cancel();
        self.clear_snapshot();
    }

    /// Returns to `Idle` only when no run holds the session slot. `on_reset`
    /// runs while the slot is held, so no run can start in between.
    pub fn reset_if_idle<F>(&self, on_reset: F) -> Result<(), StudioError>
    where
        F: FnOnce(),
    {
        let _slot = self.slot.try_lock().map_err(|_| StudioError::SessionBusy)?;
        self.clear_snapshot();
        on_reset();
        Ok(())
    }

    fn clear_snapshot(&self) {
        let previous = self.state_tx.borrow().session_id;
        self.state_tx.send_modify(|snap| *snap = SessionSnapshot::default());
        if let Some(session_id) = previous {
            self.emit_state(session_id, SessionState::Idle);
        }
    }

    fn claim(&self, settings: GenerationSettings) -> Result<RunContext, StudioError> {
        settings.validate()?;

        let slot = Arc::clone(&self.slot)
            .try_lock_owned()
            .map_err(|_| StudioError::SessionBusy)?;

        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        *self.active.lock().unwrap_or_else(|p| p.into_inner()) = Some(ActiveRun {
            session_id,
            cancel: cancel.clone(),
        });

        self.state_tx.send_modify(|snap| {
            *snap = SessionSnapshot {
                session_id: Some(session_id),
                ..SessionSnapshot::default()
            }
        });

        Ok(RunContext {
            session_id,
            cancel,
            _slot: slot,
        })
    }

    async fn run(
        &self,
        ctx: RunContext,
        image: Arc<ReferenceImage>,
        settings: GenerationSettings,
    ) -> Result<SessionReport, StudioError> {
        let result = AssertUnwindSafe(self.drive(&ctx, &image, settings))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(StudioError::Unexpected(panic_message(panic))));

        if let Err(e) = &result {
            error!("Session {} failed: {}", ctx.session_id, e);
            self.fail(ctx.session_id, e);
        }

        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if active.as_ref().is_some_and(|run| run.session_id == ctx.session_id) {
            *active = None;
        }

        result
    }

    async fn drive(
        &self,
        ctx: &RunContext,
        image: &ReferenceImage,
        settings: GenerationSettings,
    ) -> Result<SessionReport, StudioError> {
        let session_id = ctx.session_id;
        let credential = self.acquire_credential(&ctx.cancel).await?;

        self.publish(session_id, |snap| {
            snap.state = SessionState::Analyzing;
            snap.progress = Progress::new(0, settings.count + 1, ANALYZING_MESSAGE);
        });
        self.emit_state(session_id, SessionState::Analyzing);
        self.emit_progress(session_id);

        let plan = tokio::select! {
            _ = ctx.cancel.cancelled() => return Err(StudioError::Cancelled),
            plan = self.planner.plan(&credential, image, settings.count, settings.gender) => plan?,
        };

        info!(
            "Session {}: plan ready with {} scenarios",
            session_id,
            plan.scenarios.len()
        );
        self.publish(session_id, |snap| snap.state = SessionState::Generating);
        self.emit_state(session_id, SessionState::Generating);

        let outcomes = self.generate_all(ctx, image, &credential, &plan).await?;

        let total = plan.scenarios.len();
        let succeeded = outcomes.iter().filter(|o| o.result.is_ok()).count();
        info!(
            "Session {} complete: {} of {} images generated",
            session_id, succeeded, total
        );
        self.publish(session_id, |snap| {
            snap.state = SessionState::Complete;
            snap.progress = Progress::new(
                total,
                total,
                format!("Generated {} of {} images", succeeded, total),
            );
        });
        self.emit_progress(session_id);
        self.emit_state(session_id, SessionState::Complete);

        Ok(SessionReport {
            session_id,
            plan,
            outcomes,
        })
    }

    async fn acquire_credential(&self, cancel: &CancellationToken) -> Result<ApiKey, StudioError> {
        if let Some(key) = self.credentials.current().await {
            return Ok(key);
        }

        let Some(selector) = &self.credential_selector else {
            return Err(StudioError::MissingCredential);
        };

        info!("No credential available, requesting selection");
        tokio::select! {
            _ = cancel.cancelled() => Err(StudioError::Cancelled),
            key = selector.select() => key.ok_or(StudioError::MissingCredential),
        }
    }

    async fn generate_all(
        &self,
        ctx: &RunContext,
        image: &ReferenceImage,
        credential: &ApiKey,
        plan: &SessionPlan,
    ) -> Result<Vec<ScenarioOutcome>, StudioError> {
        let session_id = ctx.session_id;
        let total = plan.scenarios.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, scenario) in plan.scenarios.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                return Err(StudioError::Cancelled);
            }

            self.publish(session_id, |snap| {
                snap.progress = Progress::new(
                    index + 1,
                    total,
                    format!(
                        "Generating image {} of {}: {}",
                        index + 1,
                        total,
                        scenario.style_name
                    ),
                );
            });
            self.emit_progress(session_id);

            let render = AssertUnwindSafe(self.synthesizer.render(
                credential,
                image,
                scenario,
                &plan.physical_description,
            ))
            .catch_unwind();

            // A panicking render only costs its own scenario.
            let rendered = tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(StudioError::Cancelled),
                rendered = render => rendered.unwrap_or_else(|panic| {
                    Err(StudioError::Synthesis(format!(
                        "render panicked: {}",
                        panic_message(panic)
                    )))
                }),
            };

            let result = match rendered {
                Ok(rendered) => {
                    let generated = GeneratedImage::from_render(index, scenario, rendered);
                    self.publish(session_id, |snap| snap.images.insert(0, generated.clone()));
                    self.emit(SessionEvent::ImageAdded {
                        session_id,
                        image: generated.clone(),
                    });
                    Ok(generated)
                }
                Err(e) => {
                    warn!(
                        "Session {}: scenario {} ('{}') failed: {}",
                        session_id, index, scenario.style_name, e
                    );
                    self.emit(SessionEvent::ScenarioFailed {
                        session_id,
                        index,
                        style_name: scenario.style_name.clone(),
                        error: e.to_string(),
                    });
                    Err(e)
                }
            };

            outcomes.push(ScenarioOutcome {
                index,
                style_name: scenario.style_name.clone(),
                result,
            });

            if index + 1 < total && !self.pacing.is_zero() {
                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Err(StudioError::Cancelled),
                    _ = tokio::time::sleep(self.pacing) => {}
                }
            }
        }

        Ok(outcomes)
    }

    fn fail(&self, session_id: Uuid, err: &StudioError) {
        let published = self.publish(session_id, |snap| {
            // Failing before generation discards the analyzing progress.
            if snap.state == SessionState::Generating {
                snap.progress.message = err.to_string();
            } else {
                snap.progress = Progress::new(0, 0, err.to_string());
            }
            snap.state = SessionState::Failed;
            snap.error = Some(err.to_string());
        });
        if published {
            self.emit_state(session_id, SessionState::Failed);
        }
    }

    /// Applies `update` only while `session_id` still owns the snapshot, so a
    /// run that was reset away cannot overwrite its successor.
    fn publish<F>(&self, session_id: Uuid, update: F) -> bool
    where
        F: FnOnce(&mut SessionSnapshot),
    {
        self.state_tx.send_if_modified(|snap| {
            if snap.session_id != Some(session_id) {
                return false;
            }
            update(snap);
            true
        })
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    fn emit_state(&self, session_id: Uuid, state: SessionState) {
        self.emit(SessionEvent::StateChanged { session_id, state });
    }

    fn emit_progress(&self, session_id: Uuid) {
        let progress = {
            let snap = self.state_tx.borrow();
            if snap.session_id != Some(session_id) {
                return;
            }
            snap.progress.clone()
        };
        self.emit(SessionEvent::Progress {
            session_id,
            progress,
        });
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic while driving session".to_string()
    }
}
