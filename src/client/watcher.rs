use std::time::Duration;

use time::OffsetDateTime;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::session::SessionContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session ran out and was cleared; show the login view.
    RedirectToLogin,
}

/// Periodically checks the session and clears it once it expires.
/// Dropping the watcher stops it.
pub struct SessionWatcher {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SessionWatcher {
    pub fn spawn(ctx: SessionContext, every: Duration, events: mpsc::Sender<SessionEvent>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("session watcher cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if !ctx.is_expired(OffsetDateTime::now_utc()).await {
                            continue;
                        }
                        info!("session expired; redirecting to login");
                        if let Err(e) = ctx.clear().await {
                            error!(error = ?e, "failed to clear expired session");
                        }
                        // a full channel must not keep cancellation from being seen
                        let sent = tokio::select! {
                            _ = token.cancelled() => {
                                debug!("session watcher cancelled with a redirect pending");
                                break;
                            }
                            sent = events.send(SessionEvent::RedirectToLogin) => sent,
                        };
                        if sent.is_err() {
                            debug!("session event receiver gone; stopping watcher");
                            break;
                        }
                    }
                }
            }
        });
        Self {
            cancel,
            handle: Some(handle),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels and waits for the task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for SessionWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
