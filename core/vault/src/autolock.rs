//! Inactivity auto-lock.
//!
//! A background task sleeps until `last activity + idle timeout` and locks
//! the session when that deadline passes. Each vault operation pushes a new
//! activity instant through a watch channel, which moves the deadline.

use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::session::SessionManager;

/// Handle to the idle watcher. Dropping it stops the watcher.
pub struct AutoLock {
    activity: watch::Sender<Instant>,
    idle_timeout: Duration,
    task: JoinHandle<()>,
}

impl AutoLock {
    /// Start watching `session`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(session: Weak<SessionManager>, idle_timeout: Duration) -> Self {
        let (activity, receiver) = watch::channel(Instant::now());
        let task = tokio::spawn(watch_idle(session, idle_timeout, receiver));
        debug!(idle_secs = idle_timeout.as_secs(), "Auto-lock started");

        Self {
            activity,
            idle_timeout,
            task,
        }
    }

    /// Record activity now, pushing the deadline back.
    pub fn touch(&self) {
        self.activity.send_replace(Instant::now());
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

impl Drop for AutoLock {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn watch_idle(
    session: Weak<SessionManager>,
    idle_timeout: Duration,
    mut activity: watch::Receiver<Instant>,
) {
    loop {
        let deadline = *activity.borrow_and_update() + idle_timeout;

        tokio::select! {
            _ = sleep_until(deadline) => {
                let Some(session) = session.upgrade() else {
                    break;
                };
                if session.is_unlocked().await {
                    info!(idle_secs = idle_timeout.as_secs(), "Locking idle vault");
                    if let Err(e) = session.lock().await {
                        warn!(error = %e, "Auto-lock could not clear the wrapped key");
                    }
                }
                drop(session);

                // Nothing to do until the next operation.
                if activity.changed().await.is_err() {
                    break;
                }
            }
            changed = activity.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}
