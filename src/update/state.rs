use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::types::{ProgressStatus, UpdateCheckResult, UpdateProgress};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub enum Phase {
    #[default]
    Idle,
    CheckingUpdates,
    DialogShown,
    Updating,
    Reconciling,
}

/// Read-only view of the orchestrator handed to consumers.
#[derive(Debug, Clone, Default)]
pub struct UpdateSnapshot {
    pub phase: Phase,
    pub update_available: bool,
    pub update_info: Option<UpdateCheckResult>,
    pub show_update_dialog: bool,
    pub update_progress: Option<UpdateProgress>,
    pub is_updating: bool,
    pub push_connected: bool,
}

/// One-shot notifications for consumers.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    UpdateAvailable(UpdateCheckResult),
    /// The backend finished updating; client state should be reloaded.
    Completed,
    Failed(String),
    StartFailed(String),
    ManualRequired {
        message: String,
        command: Option<String>,
    },
}

pub(crate) struct PushHandle {
    pub generation: u64,
    pub shutdown: oneshot::Sender<()>,
    pub task: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckTransition {
    Offered,
    StoredWhileUpdating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgressTransition {
    /// No update is being monitored; the record was dropped.
    Ignored,
    Continue,
    /// The backend holds no record for the running update; polling stops
    /// but the update and its push channel stay in place.
    NoRecord,
    Finished(ProgressStatus),
}

#[derive(Default)]
pub(crate) struct OrchestratorState {
    pub alive: bool,
    pub phase: Phase,
    pub pending_info: Option<UpdateCheckResult>,
    pub dialog_visible: bool,
    pub latest_progress: Option<UpdateProgress>,
    pub push_connected: bool,
    pub push_generation: u64,
    pub push: Option<PushHandle>,
    pub poll: Option<JoinHandle<()>>,
    pub reconnect: Option<JoinHandle<()>>,
    pub check_timer: Option<JoinHandle<()>>,
    pub reset_timer: Option<JoinHandle<()>>,
    pub backend_was_offline: bool,
}

impl OrchestratorState {
    pub fn new() -> Self {
        Self {
            alive: true,
            ..Default::default()
        }
    }

    pub fn snapshot(&self) -> UpdateSnapshot {
        UpdateSnapshot {
            phase: self.phase,
            update_available: self.pending_info.is_some(),
            update_info: self.pending_info.clone(),
            show_update_dialog: self.phase == Phase::DialogShown && self.dialog_visible,
            update_progress: self.latest_progress.clone(),
            is_updating: self.phase == Phase::Updating,
            push_connected: self.push_connected,
        }
    }

    /// Record a positive version check. A running update is never interrupted.
    pub fn offer(&mut self, info: UpdateCheckResult) -> CheckTransition {
        self.pending_info = Some(info);
        if self.phase == Phase::Updating {
            return CheckTransition::StoredWhileUpdating;
        }
        self.phase = Phase::DialogShown;
        self.dialog_visible = true;
        CheckTransition::Offered
    }

    /// Apply a progress record from either transport, last write wins.
    /// `completed` and `error` leave `Updating` exactly once.
    pub fn apply_progress(&mut self, progress: UpdateProgress) -> ProgressTransition {
        if !self.alive || self.phase != Phase::Updating {
            return ProgressTransition::Ignored;
        }
        let status = progress.status;
        if status == ProgressStatus::Idle {
            return ProgressTransition::NoRecord;
        }
        self.latest_progress = Some(progress);
        if !status.is_terminal() {
            return ProgressTransition::Continue;
        }
        self.phase = Phase::Idle;
        if status == ProgressStatus::Completed {
            self.pending_info = None;
        }
        ProgressTransition::Finished(status)
    }

    pub fn cancel(&mut self) -> bool {
        if self.phase != Phase::DialogShown {
            return false;
        }
        self.pending_info = None;
        self.dialog_visible = false;
        self.phase = Phase::Idle;
        true
    }

    /// Take every monitor of the current operation out of the state.
    pub fn detach_monitors(&mut self) -> Detached {
        self.push_connected = false;
        Detached {
            poll: self.poll.take(),
            reconnect: self.reconnect.take(),
            push: self.push.take(),
            ..Default::default()
        }
    }

    /// Take everything, including the periodic check; used on teardown.
    pub fn detach_all(&mut self) -> Detached {
        let mut detached = self.detach_monitors();
        detached.check_timer = self.check_timer.take();
        detached.reset_timer = self.reset_timer.take();
        detached
    }
}

/// Task handles removed from the state, released outside the lock.
#[derive(Default)]
pub(crate) struct Detached {
    poll: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    push: Option<PushHandle>,
    check_timer: Option<JoinHandle<()>>,
    reset_timer: Option<JoinHandle<()>>,
}

impl Detached {
    /// Abort the timers and ask the push channel task to close its socket.
    /// Returns the push task so callers may wait for the close to finish.
    pub fn release(self) -> Option<JoinHandle<()>> {
        for timer in [self.poll, self.reconnect, self.check_timer, self.reset_timer]
            .into_iter()
            .flatten()
        {
            timer.abort();
        }
        self.push.map(|push| {
            let _ = push.shutdown.send(());
            push.task
        })
    }
}
