use std::sync::Mutex;

use tokio::sync::Notify;

/// Where an entity is in the unit-of-work state machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    Staging,
    Committing,
}

/// Per-entity phase holder. Serializes change sessions on one entity.
///
/// Only [`ChangeSession`](crate::ChangeSession) moves the phase; everything
/// else can only observe it.
#[derive(Debug, Default)]
pub struct ChangeTracker {
    phase: Mutex<Phase>,
    idle: Notify,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().expect("lock poisoned")
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == Phase::Idle
    }

    /// Idle -> Staging. Returns `false` if another session owns the entity.
    pub(crate) fn try_begin(&self) -> bool {
        let mut phase = self.phase.lock().expect("lock poisoned");
        if *phase == Phase::Idle {
            *phase = Phase::Staging;
            true
        } else {
            false
        }
    }

    /// Wait until the entity is idle, then move it to Staging.
    pub(crate) async fn begin_queued(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a release between the check and the
            // await is not missed.
            notified.as_mut().enable();
            if self.try_begin() {
                return;
            }
            notified.await;
        }
    }

    /// Staging -> Committing.
    pub(crate) fn start_commit(&self) -> bool {
        let mut phase = self.phase.lock().expect("lock poisoned");
        if *phase == Phase::Staging {
            *phase = Phase::Committing;
            true
        } else {
            false
        }
    }

    /// Back to Idle, waking queued sessions.
    pub(crate) fn release(&self) {
        *self.phase.lock().expect("lock poisoned") = Phase::Idle;
        self.idle.notify_waiters();
    }
}
