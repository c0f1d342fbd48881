//! Client-side driver for a remote update that may restart the backend.
//!
//! The backend's persisted progress record is the source of truth and is
//! polled on a fixed period; the push channel is an optional accelerant.
//! Both feed the same last-write-wins state. Backend downtime while an update
//! runs is expected and absorbed; only a terminal `error` record or a failed
//! start request reach the consumer.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::push_channel::PushConnector;
use crate::types::UpdateError;

use super::api::UpdateApi;
use super::state::{
    CheckTransition, OrchestratorState, Phase, ProgressTransition, PushHandle, UpdateEvent,
    UpdateSnapshot,
};
use super::types::{
    ProgressKind, ProgressStatus, TriggerOutcome, UpdateInstructions, UpdateProgress,
};

const EVENT_CAPACITY: usize = 16;

/// Timing knobs for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub check_interval: Duration,
    pub poll_interval: Duration,
    /// Bound for progress fetch and clear requests.
    pub request_timeout: Duration,
    pub health_timeout: Duration,
    pub check_timeout: Duration,
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    /// How long the "nothing to update" notice stays up.
    pub no_update_reset: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60 * 60),
            poll_interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(3),
            health_timeout: Duration::from_secs(2),
            check_timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(2),
            no_update_reset: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Poll,
    Push,
}

/// Owns the update lifecycle. Public operations never fail: outcomes are
/// published through [`UpdateSnapshot`] and [`UpdateEvent`].
///
/// Dropping the orchestrator cancels every timer and closes the push channel;
/// [`UpdateOrchestrator::shutdown`] does the same and waits for the close.
pub struct UpdateOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn UpdateApi>,
    connector: Arc<dyn PushConnector>,
    settings: OrchestratorSettings,
    state: Mutex<OrchestratorState>,
    snapshot_tx: watch::Sender<UpdateSnapshot>,
    events_tx: broadcast::Sender<UpdateEvent>,
}

impl UpdateOrchestrator {
    pub fn new(
        api: Arc<dyn UpdateApi>,
        connector: Arc<dyn PushConnector>,
        settings: OrchestratorSettings,
    ) -> Self {
        let state = OrchestratorState::new();
        let (snapshot_tx, _) = watch::channel(state.snapshot());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                api,
                connector,
                settings,
                state: Mutex::new(state),
                snapshot_tx,
                events_tx,
            }),
        }
    }

    /// Resume an update left running by a previous session, run a first
    /// version check and schedule the periodic one.
    pub async fn initialize(&self) {
        self.inner.initialize().await;
    }

    pub async fn check_for_updates(&self) {
        self.inner.check_for_updates().await;
    }

    /// Start the offered update. Ignored unless an update is offered.
    pub async fn start_update(&self) {
        self.inner.start_update().await;
    }

    /// Decline the offered update. Has no effect once an update runs.
    pub fn cancel_update(&self) {
        let cancelled = self.inner.update(|s| s.cancel());
        if cancelled {
            info!("Update offer declined");
        }
    }

    /// Hide the dialog while keeping the update on offer.
    pub fn dismiss_dialog(&self) {
        self.inner.update(|s| s.dialog_visible = false);
    }

    pub fn show_dialog(&self) {
        self.inner.update(|s| {
            if s.phase == Phase::DialogShown {
                s.dialog_visible = true;
            }
        });
    }

    /// Manual update procedure, if the backend can provide it.
    pub async fn fetch_instructions(&self) -> Option<UpdateInstructions> {
        let limit = self.inner.settings.request_timeout;
        match bounded(limit, "instructions fetch", self.inner.api.fetch_instructions()).await {
            Ok(instructions) => Some(instructions),
            Err(err) => {
                warn!(error = ?err, "Failed to fetch update instructions");
                None
            }
        }
    }

    pub fn snapshot(&self) -> UpdateSnapshot {
        self.inner.read(|s| s.snapshot())
    }

    pub fn subscribe_state(&self) -> watch::Receiver<UpdateSnapshot> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<UpdateEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Stop every timer and close the push channel. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(push_task) = self.inner.teardown() {
            let _ = push_task.await;
        }
    }
}

impl Drop for UpdateOrchestrator {
    fn drop(&mut self) {
        self.inner.teardown();
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, OrchestratorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read<R>(&self, f: impl FnOnce(&OrchestratorState) -> R) -> R {
        f(&self.lock())
    }

    /// Mutate the state and publish the new snapshot.
    fn update<R>(&self, f: impl FnOnce(&mut OrchestratorState) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self.lock();
            let result = f(&mut state);
            (result, state.snapshot())
        };
        self.snapshot_tx.send_replace(snapshot);
        result
    }

    fn is_alive(&self) -> bool {
        self.read(|s| s.alive)
    }

    fn emit(&self, event: UpdateEvent) {
        let _ = self.events_tx.send(event);
    }

    fn teardown(&self) -> Option<tokio::task::JoinHandle<()>> {
        let detached = self.update(|s| {
            if s.alive {
                debug!("Tearing down update orchestrator");
            }
            s.alive = false;
            s.detach_all()
        });
        detached.release()
    }

    async fn initialize(self: &Arc<Self>) {
        let proceed = self.update(|s| {
            if s.alive && s.phase == Phase::Idle {
                s.phase = Phase::Reconciling;
            }
            s.alive
        });
        if !proceed {
            return;
        }

        let fetched = bounded(
            self.settings.request_timeout,
            "progress fetch",
            self.api.fetch_progress(),
        )
        .await;

        match fetched {
            Ok(progress) if progress.status == ProgressStatus::Running => {
                info!(
                    message = %progress.message,
                    percentage = ?progress.percentage,
                    "Update in progress from a previous session, resuming monitoring"
                );
                let resumed = self.update(|s| {
                    if !s.alive || s.phase != Phase::Reconciling {
                        return false;
                    }
                    s.phase = Phase::Updating;
                    s.latest_progress = Some(progress);
                    true
                });
                if resumed {
                    self.start_progress_polling();
                }
            }
            Ok(progress) if progress.status == ProgressStatus::Completed => {
                info!("Found a completed update record from a previous session, clearing it");
                self.leave_reconciling();
                self.clear_progress().await;
            }
            Ok(progress) => {
                debug!(status = ?progress.status, "No update in progress");
                self.leave_reconciling();
            }
            Err(err) => {
                debug!(error = ?err, "No update in progress or backend unreachable");
                self.leave_reconciling();
            }
        }

        self.check_for_updates().await;
        self.schedule_periodic_check();
    }

    fn leave_reconciling(&self) {
        self.update(|s| {
            if s.phase == Phase::Reconciling {
                s.phase = Phase::Idle;
            }
        });
    }

    async fn check_for_updates(self: &Arc<Self>) {
        let proceed = self.update(|s| {
            if s.alive && s.phase == Phase::Idle {
                s.phase = Phase::CheckingUpdates;
            }
            s.alive
        });
        if !proceed {
            return;
        }

        let result = bounded(
            self.settings.check_timeout,
            "version check",
            self.api.check_version(),
        )
        .await;

        let offered = self.update(|s| {
            if s.phase == Phase::CheckingUpdates {
                s.phase = Phase::Idle;
            }
            if !s.alive {
                return None;
            }
            match result {
                Ok(info) if info.update_available => {
                    let transition = s.offer(info.clone());
                    Some((info, transition))
                }
                Ok(info) => {
                    info!(version = %info.current_version, "Backend is up to date");
                    None
                }
                Err(err) => {
                    warn!(error = ?err, "Update check failed");
                    None
                }
            }
        });

        match offered {
            Some((info, CheckTransition::Offered)) => {
                info!(
                    current = %info.current_version,
                    latest = %info.latest_version,
                    change = ?info.version_change(),
                    "Update available"
                );
                self.emit(UpdateEvent::UpdateAvailable(info));
            }
            Some((info, CheckTransition::StoredWhileUpdating)) => {
                debug!(latest = %info.latest_version, "Update check answered during an update");
            }
            None => {}
        }
    }

    async fn start_update(self: &Arc<Self>) {
        let started = self.update(|s| {
            if !s.alive || s.phase != Phase::DialogShown {
                return Err(s.phase);
            }
            s.phase = Phase::Updating;
            s.dialog_visible = false;
            s.latest_progress = Some(UpdateProgress::starting());
            Ok(())
        });
        if let Err(phase) = started {
            warn!(?phase, "Ignoring start request: no update on offer");
            return;
        }

        info!("Starting update");
        self.open_push_channel();

        match self.api.trigger_update().await {
            Ok(outcome) => self.handle_trigger_outcome(outcome),
            Err(err) => {
                error!(error = ?err, "Failed to start update");
                let message = format!("Failed to start update: {err}");
                let detached = self.update(|s| {
                    if !s.alive || s.phase != Phase::Updating {
                        return None;
                    }
                    s.phase = Phase::Idle;
                    s.latest_progress = Some(UpdateProgress::new(
                        ProgressStatus::Error,
                        ProgressKind::Error,
                        message.clone(),
                    ));
                    Some(s.detach_monitors())
                });
                if let Some(detached) = detached {
                    detached.release();
                    self.emit(UpdateEvent::StartFailed(message));
                }
            }
        }
    }

    fn handle_trigger_outcome(self: &Arc<Self>, outcome: TriggerOutcome) {
        let still_updating = self.read(|s| s.alive && s.phase == Phase::Updating);
        if !still_updating {
            info!(?outcome, "Update trigger answered after the update was abandoned");
            return;
        }

        match outcome {
            TriggerOutcome::Accepted { message } => {
                info!(message = ?message, "Update accepted by backend");
                self.start_progress_polling();
            }
            TriggerOutcome::ManualRequired { message, command } => {
                info!(%message, command = ?command, "Backend requires a manual update");
                self.update(|s| {
                    s.latest_progress = Some(
                        UpdateProgress::new(
                            ProgressStatus::Running,
                            ProgressKind::Info,
                            message.clone(),
                        )
                        .with_percentage(10.0)
                        .with_command(command.clone()),
                    );
                });
                self.emit(UpdateEvent::ManualRequired { message, command });
            }
            TriggerOutcome::NoUpdate { message } => {
                info!(message = ?message, "Backend reports nothing to update");
                let detached = self.update(|s| {
                    s.pending_info = None;
                    s.latest_progress = Some(
                        UpdateProgress::new(
                            ProgressStatus::Completed,
                            ProgressKind::Info,
                            message.unwrap_or_else(|| "No update available".to_string()),
                        )
                        .with_percentage(100.0),
                    );
                    s.detach_monitors()
                });
                detached.release();
                self.schedule_reset();
            }
        }
    }

    /// Return to `Idle` after the no-update notice has been visible for a while.
    fn schedule_reset(self: &Arc<Self>) {
        let mut state = self.lock();
        if !state.alive {
            return;
        }
        if let Some(previous) = state.reset_timer.take() {
            previous.abort();
        }
        let inner = Arc::clone(self);
        let delay = self.settings.no_update_reset;
        state.reset_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.update(|s| {
                s.reset_timer = None;
                if s.alive && s.phase == Phase::Updating {
                    s.phase = Phase::Idle;
                }
            });
        }));
    }

    fn schedule_periodic_check(self: &Arc<Self>) {
        let mut state = self.lock();
        if !state.alive {
            return;
        }
        if let Some(previous) = state.check_timer.take() {
            previous.abort();
        }
        let inner = Arc::clone(self);
        let period = self.settings.check_interval;
        state.check_timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !inner.is_alive() {
                    break;
                }
                inner.check_for_updates().await;
            }
        }));
    }

    /// (Re)start the reconciliation poll loop, cancelling any previous loop
    /// and pending reconnect.
    fn start_progress_polling(self: &Arc<Self>) {
        let mut state = self.lock();
        if !state.alive {
            return;
        }
        for previous in [state.poll.take(), state.reconnect.take()]
            .into_iter()
            .flatten()
        {
            previous.abort();
        }
        state.backend_was_offline = true;
        state.poll = Some(tokio::spawn(Arc::clone(self).run_poll_loop()));
    }

    async fn run_poll_loop(self: Arc<Self>) {
        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !self.is_alive() {
                break;
            }
            if !self.poll_progress_once().await {
                break;
            }
            self.probe_backend().await;
        }
    }

    /// One reconciliation step. Returns whether the loop should keep going.
    async fn poll_progress_once(self: &Arc<Self>) -> bool {
        let fetched = bounded(
            self.settings.request_timeout,
            "progress fetch",
            self.api.fetch_progress(),
        )
        .await;

        let progress = match fetched {
            Ok(progress) => progress,
            Err(err) => {
                if err.is_transport() {
                    debug!(error = ?err, "Backend unreachable, continuing to poll");
                } else {
                    warn!(error = ?err, "Unexpected progress response, continuing to poll");
                }
                self.update(|s| s.backend_was_offline = true);
                return true;
            }
        };

        debug!(
            status = ?progress.status,
            percentage = ?progress.percentage,
            "Polled update progress"
        );
        match self.update(|s| s.apply_progress(progress)) {
            ProgressTransition::Continue => true,
            ProgressTransition::Ignored => {
                self.update(|s| {
                    s.poll.take();
                });
                false
            }
            ProgressTransition::NoRecord => {
                debug!("Backend holds no update record, polling stopped");
                self.update(|s| {
                    s.poll.take();
                });
                false
            }
            ProgressTransition::Finished(status) => {
                self.finish_update(status, Origin::Poll).await;
                false
            }
        }
    }

    /// While the push channel is down, probe the backend and schedule a
    /// single reconnect once it is reachable again.
    async fn probe_backend(self: &Arc<Self>) {
        let connected = self.read(|s| s.push_connected);
        if connected {
            return;
        }

        let probe = bounded(
            self.settings.health_timeout,
            "health probe",
            self.api.health(),
        )
        .await;

        match probe {
            Ok(()) => {
                let reconnect = self.update(|s| {
                    // A pending connect keeps the flag until it resolves.
                    if s.alive
                        && s.phase == Phase::Updating
                        && s.backend_was_offline
                        && s.push.is_none()
                    {
                        s.backend_was_offline = false;
                        true
                    } else {
                        false
                    }
                });
                if reconnect {
                    info!("Backend reachable, scheduling push channel reconnect");
                    self.schedule_push_reconnect();
                }
            }
            Err(err) => {
                debug!(error = ?err, "Health probe failed");
                self.update(|s| s.backend_was_offline = true);
            }
        }
    }

    fn schedule_push_reconnect(self: &Arc<Self>) {
        let mut state = self.lock();
        if !state.alive {
            return;
        }
        if let Some(previous) = state.reconnect.take() {
            previous.abort();
        }
        let inner = Arc::clone(self);
        let delay = self.settings.reconnect_delay;
        state.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let proceed = inner.update(|s| {
                s.reconnect = None;
                s.alive && s.phase == Phase::Updating
            });
            if proceed {
                inner.open_push_channel();
            }
        }));
    }

    /// Spawn a push channel task unless one is already open or connecting.
    fn open_push_channel(self: &Arc<Self>) {
        let mut state = self.lock();
        if !state.alive || state.push.is_some() {
            return;
        }
        state.push_generation += 1;
        let generation = state.push_generation;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(Arc::clone(self).run_push_channel(generation, shutdown_rx));
        state.push = Some(PushHandle {
            generation,
            shutdown: shutdown_tx,
            task,
        });
    }

    async fn run_push_channel(
        self: Arc<Self>,
        generation: u64,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let connect = bounded(
            self.settings.connect_timeout,
            "push channel connect",
            self.connector.connect(),
        );
        let mut stream = tokio::select! {
            _ = &mut shutdown => return,
            result = connect => match result {
                Ok(stream) => stream,
                Err(err) => {
                    debug!(error = ?err, "Push channel unavailable, relying on polling");
                    self.push_ended(generation, false);
                    return;
                }
            },
        };

        let opened = self.update(|s| {
            let current = s.push.as_ref().map(|push| push.generation) == Some(generation);
            if s.alive && current {
                s.push_connected = true;
            }
            s.alive && current
        });
        if !opened {
            stream.close().await;
            return;
        }
        info!("Receiving update progress over push channel");

        let closed_by_us = loop {
            tokio::select! {
                _ = &mut shutdown => break true,
                frame = stream.next_frame() => match frame {
                    Some(Ok(text)) => {
                        if self.handle_push_frame(&text).await {
                            break true;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = ?err, "Push channel error");
                        break false;
                    }
                    None => break false,
                },
            }
        };

        if closed_by_us {
            stream.close().await;
        } else {
            info!("Push channel disconnected");
        }
        self.push_ended(generation, true);
    }

    /// Returns true when the frame ended the update.
    async fn handle_push_frame(self: &Arc<Self>, text: &str) -> bool {
        let progress = match UpdateProgress::from_frame(text) {
            Ok(progress) => progress,
            Err(err) => {
                warn!(error = ?err, frame = text, "Dropping malformed push frame");
                return false;
            }
        };

        debug!(
            status = ?progress.status,
            percentage = ?progress.percentage,
            "Pushed update progress"
        );
        match self.update(|s| s.apply_progress(progress)) {
            ProgressTransition::Finished(status) => {
                self.finish_update(status, Origin::Push).await;
                true
            }
            ProgressTransition::Continue
            | ProgressTransition::NoRecord
            | ProgressTransition::Ignored => false,
        }
    }

    /// Forget the push channel task if it is still the current one. A lost
    /// established connection suggests the backend went away.
    fn push_ended(&self, generation: u64, was_open: bool) {
        self.update(|s| {
            if s.push.as_ref().map(|push| push.generation) != Some(generation) {
                return;
            }
            s.push = None;
            s.push_connected = false;
            if was_open {
                s.backend_was_offline = true;
            }
        });
    }

    /// Side effects of leaving `Updating` on a terminal record. Only the
    /// caller that performed the transition gets here, so this runs once.
    async fn finish_update(self: &Arc<Self>, status: ProgressStatus, origin: Origin) {
        let detached = self.update(|s| {
            if origin == Origin::Poll {
                // Called from the poll task itself; let it return on its own.
                s.poll.take();
            }
            s.detach_monitors()
        });
        detached.release();

        match status {
            ProgressStatus::Completed => {
                info!(?origin, "Update completed");
                self.clear_progress().await;
                self.emit(UpdateEvent::Completed);
            }
            ProgressStatus::Error => {
                let message = self
                    .read(|s| s.latest_progress.as_ref().map(|p| p.message.clone()))
                    .unwrap_or_default();
                error!(%message, ?origin, "Update failed");
                self.emit(UpdateEvent::Failed(message));
            }
            ProgressStatus::Idle | ProgressStatus::Running => {}
        }
    }

    async fn clear_progress(&self) {
        if !self.is_alive() {
            return;
        }
        let cleared = bounded(
            self.settings.request_timeout,
            "progress clear",
            self.api.clear_progress(),
        )
        .await;
        if let Err(err) = cleared {
            debug!(error = ?err, "Failed to clear update progress");
        }
    }
}

async fn bounded<T>(
    limit: Duration,
    what: &'static str,
    request: impl Future<Output = Result<T, UpdateError>>,
) -> Result<T, UpdateError> {
    match tokio::time::timeout(limit, request).await {
        Ok(result) => result,
        Err(_) => Err(UpdateError::Timeout(what)),
    }
}
