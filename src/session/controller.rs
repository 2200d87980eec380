use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{
    sync::{watch, Mutex},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    alerts::{AlertSink, NOTIFICATION_TITLE},
    error::{DeliveryError, PersistenceError, SessionError},
    models::{FrameRequest, SessionSummary, StopRequest},
    sensing::{CameraSource, FrameSampler, VideoStream},
    settings::Settings,
    transport::{send_with_retry, AnalysisBackend, RetryPolicy},
};

use super::state::{
    BlinkStats, MessageClass, SessionPhase, SessionState, Warning, WarningKind,
};

const ENABLE_LOGS: bool = true;
const LOG_TARGET: &str = "eyecare::session";

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub sample_period: Duration,
    pub frame_policy: RetryPolicy,
    pub stop_policy: RetryPolicy,
    pub sampler: FrameSampler,
    pub user_id: Option<String>,
    pub device_id: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl ControllerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let timeout = settings.backend.request_timeout();
        Self {
            sample_period: Duration::from_millis(settings.session.sample_period_ms.max(1)),
            frame_policy: RetryPolicy {
                max_attempts: settings.session.frame_attempts.max(1),
                backoff_base: Duration::from_millis(settings.session.backoff_base_ms),
                timeout,
            },
            stop_policy: RetryPolicy::single_attempt(timeout),
            sampler: FrameSampler::from_settings(&settings.session),
            user_id: settings.backend.user_id.clone(),
            device_id: settings.backend.device_id.clone(),
        }
    }
}

/// What the UI sees of the controller.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stats: BlinkStats,
    pub warning: Option<Warning>,
    pub media_live: bool,
    pub ticker_live: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopOutcome {
    /// Nothing was running.
    AlreadyIdle,
    /// Torn down without saving.
    Discarded,
    Saved(SessionSummary),
    /// Torn down, but the backend did not record the session.
    SaveFailed(PersistenceError),
}

struct Ticker {
    handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Session state plus the two resources it owns. Kept under one lock so the
/// phase and the handles always change together.
struct SessionSlot<S> {
    state: SessionState,
    media: Option<S>,
    ticker: Option<Ticker>,
}

impl<S> SessionSlot<S> {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.state.phase,
            session_id: self.state.session_id.clone(),
            started_at: self.state.started_at,
            stats: self.state.stats,
            warning: self.state.warning.clone(),
            media_live: self.media.is_some(),
            ticker_live: self.ticker.is_some(),
        }
    }
}

enum TickOutcome {
    Continue,
    Finished,
}

/// Owns one detection session at a time: the camera stream, the sampling
/// ticker and the stats/warning shown to the user.
pub struct SessionController<B, C, A>
where
    C: CameraSource,
{
    slot: Arc<Mutex<SessionSlot<C::Stream>>>,
    backend: Arc<B>,
    camera: Arc<C>,
    alerts: Arc<A>,
    config: Arc<ControllerConfig>,
    updates: Arc<watch::Sender<SessionSnapshot>>,
}

impl<B, C, A> Clone for SessionController<B, C, A>
where
    C: CameraSource,
{
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            backend: self.backend.clone(),
            camera: self.camera.clone(),
            alerts: self.alerts.clone(),
            config: self.config.clone(),
            updates: self.updates.clone(),
        }
    }
}

impl<B, C, A> SessionController<B, C, A>
where
    B: AnalysisBackend,
    C: CameraSource,
    A: AlertSink,
{
    pub fn new(backend: Arc<B>, camera: Arc<C>, alerts: Arc<A>, config: ControllerConfig) -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::default());
        Self {
            slot: Arc::new(Mutex::new(SessionSlot {
                state: SessionState::new(),
                media: None,
                ticker: None,
            })),
            backend,
            camera,
            alerts,
            config: Arc::new(config),
            updates: Arc::new(updates),
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.slot.lock().await.snapshot()
    }

    /// Receives a fresh snapshot after every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    pub async fn start(&self) -> Result<SessionSnapshot, SessionError> {
        let epoch = {
            let mut slot = self.slot.lock().await;
            if slot.state.phase != SessionPhase::Idle {
                return Err(SessionError::AlreadyRunning);
            }
            let epoch = slot.state.begin_acquiring();
            self.publish(&slot);
            epoch
        };

        let acquired = self.camera.acquire().await;

        let mut slot = self.slot.lock().await;
        let still_wanted = slot.state.phase == SessionPhase::Acquiring && slot.state.epoch == epoch;

        let mut stream = match acquired {
            Ok(stream) => stream,
            Err(err) => {
                log_warn!("camera acquisition failed: {err}");
                if still_wanted {
                    slot.state.reset_to_idle();
                    slot.state
                        .set_warning(WarningKind::Error, format!("Cannot access the camera: {err}"));
                    self.publish(&slot);
                }
                return Err(err.into());
            }
        };

        if !still_wanted {
            // stop() ran while the camera was opening.
            stream.stop();
            log_info!("session start cancelled during camera acquisition");
            return Err(SessionError::Cancelled);
        }

        let session_id = Uuid::new_v4().to_string();
        slot.state.activate(session_id.clone(), Utc::now());
        slot.media = Some(stream);
        slot.ticker = Some(self.spawn_ticker(epoch));

        log_info!(
            "session {} started, sampling every {}ms",
            session_id,
            self.config.sample_period.as_millis()
        );
        self.publish(&slot);
        Ok(slot.snapshot())
    }

    /// End the session. Teardown always completes before the optional save
    /// call; repeated or concurrent calls are no-ops.
    pub async fn stop(&self, save_record: bool) -> StopOutcome {
        self.stop_inner(save_record, false).await
    }

    /// Release the camera and ticker without saving, whatever is in flight.
    pub async fn shutdown(&self) {
        self.stop_inner(false, false).await;
    }

    async fn stop_inner(&self, save_record: bool, from_ticker: bool) -> StopOutcome {
        let (session_id, started_at, stats, stopped_epoch) = {
            let mut slot = self.slot.lock().await;
            match slot.state.phase {
                SessionPhase::Idle | SessionPhase::Stopping => return StopOutcome::AlreadyIdle,
                SessionPhase::Acquiring => {
                    // start() sees the phase change and releases the stream it gets.
                    slot.state.reset_to_idle();
                    self.publish(&slot);
                    return StopOutcome::Discarded;
                }
                SessionPhase::Active => {}
            }

            slot.state.phase = SessionPhase::Stopping;
            let finished = (
                slot.state.session_id.clone().unwrap_or_default(),
                slot.state.started_at,
                slot.state.stats,
                slot.state.epoch,
            );

            if let Some(ticker) = slot.ticker.take() {
                ticker.cancel.cancel();
                // The ticker can end its own session; it must not abort itself.
                if !from_ticker {
                    ticker.handle.abort();
                }
            }
            if let Some(mut media) = slot.media.take() {
                media.stop();
            }

            slot.state.reset_to_idle();
            self.publish(&slot);
            finished
        };

        log_info!("session {} stopped (save: {})", session_id, save_record);

        if !save_record {
            return StopOutcome::Discarded;
        }

        let stopped_at = Utc::now();
        let request = StopRequest {
            total_blinks: stats.total_blinks,
            blink_rate: stats.blink_rate,
            start_time: started_at,
            timestamp: stopped_at,
            user_id: self.config.user_id.clone(),
            device_id: self.config.device_id.clone(),
            session_id: Some(session_id.clone()),
        };

        let result = send_with_retry(&self.config.stop_policy, "stop_detection", || {
            self.backend.stop_detection(request.clone())
        })
        .await;

        let mut slot = self.slot.lock().await;
        // A newer session owns the warning slot once it has started, even if it
        // has already ended again.
        let may_report =
            slot.state.phase == SessionPhase::Idle && slot.state.epoch == stopped_epoch;

        let outcome = match result {
            Ok(response) => {
                let summary =
                    SessionSummary::from_response(session_id, started_at, stopped_at, &response);
                if may_report {
                    slot.state.warning = Some(Warning {
                        message: format!(
                            "✅ Detection stopped. Total blinks: {} (duration {} s)",
                            summary.total_blinks, summary.duration_secs
                        ),
                        kind: WarningKind::Success,
                        show_history_link: true,
                    });
                }
                log_info!(
                    "session {} saved: {} blinks over {}s",
                    summary.session_id,
                    summary.total_blinks,
                    summary.duration_secs
                );
                StopOutcome::Saved(summary)
            }
            Err(err) => {
                let err = PersistenceError::from(err);
                log_error!("session {} could not be saved: {err}", session_id);
                if may_report {
                    slot.state.set_warning(
                        WarningKind::Error,
                        format!("The session could not be saved: {err}"),
                    );
                }
                StopOutcome::SaveFailed(err)
            }
        };

        self.publish(&slot);
        outcome
    }

    fn spawn_ticker(&self, epoch: u64) -> Ticker {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            controller.tick_loop(epoch, token).await;
        });

        Ticker { handle, cancel }
    }

    async fn tick_loop(&self, epoch: u64, cancel: CancellationToken) {
        let mut ticker = time::interval(self.config.sample_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; sampling starts one period in.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // Each tick settles (retries included) before the next is taken.
            match self.run_tick(epoch).await {
                TickOutcome::Continue => {}
                TickOutcome::Finished => break,
            }
        }

        log_debug!("ticker for epoch {epoch} finished");
    }

    async fn run_tick(&self, epoch: u64) -> TickOutcome {
        let still = {
            let slot = self.slot.lock().await;
            if !slot.state.is_current(epoch) {
                return TickOutcome::Finished;
            }
            let Some(media) = slot.media.as_ref() else {
                return TickOutcome::Finished;
            };
            self.config.sampler.grab(media)
        };

        let Some(still) = still else {
            log_debug!("camera not ready, skipping tick");
            return TickOutcome::Continue;
        };

        // Resize and JPEG encoding run without the lock so stop() never waits on them.
        let sampler = self.config.sampler;
        let frame = match tokio::task::spawn_blocking(move || sampler.encode(&still)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(err)) => {
                log_warn!("frame encoding failed, skipping tick: {err}");
                return TickOutcome::Continue;
            }
            Err(err) => {
                log_warn!("frame encoder task failed, skipping tick: {err}");
                return TickOutcome::Continue;
            }
        };

        let request = FrameRequest {
            image: frame.data_url,
        };
        let result = send_with_retry(&self.config.frame_policy, "process_frame", || {
            self.backend.process_frame(request.clone())
        })
        .await;

        let mut slot = self.slot.lock().await;
        if !slot.state.is_current(epoch) {
            log_debug!("discarding frame result for a finished session");
            return TickOutcome::Finished;
        }

        match result {
            Ok(response) => {
                let class = slot.state.apply_frame_response(&response);
                self.publish(&slot);
                drop(slot);

                if class == MessageClass::Warning {
                    self.raise_alert(&response.message);
                }
                TickOutcome::Continue
            }
            Err(err) => {
                let err = DeliveryError::from(err);
                log_error!("{err}; ending session without saving");
                slot.state.set_warning(
                    WarningKind::Error,
                    format!("Lost connection to the analysis service: {err}"),
                );
                drop(slot);

                self.stop_inner(false, true).await;
                TickOutcome::Finished
            }
        }
    }

    fn raise_alert(&self, message: &str) {
        if let Err(err) = self.alerts.play_chime() {
            log_debug!("alert chime skipped: {err}");
        }

        if self.alerts.is_foreground() {
            log_debug!("app in foreground, desktop notification suppressed");
            return;
        }
        if let Err(err) = self.alerts.notify_desktop(NOTIFICATION_TITLE, message) {
            log_debug!("desktop notification skipped: {err}");
        }
    }

    fn publish(&self, slot: &SessionSlot<C::Stream>) {
        self.updates.send_replace(slot.snapshot());
    }
}
