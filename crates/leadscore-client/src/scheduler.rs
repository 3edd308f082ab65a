//! Background renewal on a fixed interval.

use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::refresh::RefreshCoordinator;
use crate::session::SessionEvent;

/// Calls [`RefreshCoordinator::ensure_fresh`] every `period` until the
/// session ends, a renewal fails, or the scheduler is dropped.
///
/// Scheduled renewals go through the same coordinator as reactive ones, so a
/// tick that lands while a 401-triggered renewal is running joins it. Every
/// completed renewal, scheduled or reactive, pushes the next tick a full
/// period out.
#[derive(Debug)]
pub struct RefreshScheduler {
    handle: JoinHandle<()>,
}

impl RefreshScheduler {
    /// Must be called within a tokio runtime.
    #[must_use]
    pub fn spawn(
        coordinator: RefreshCoordinator,
        mut events: broadcast::Receiver<SessionEvent>,
        period: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(period_secs = period.as_secs(), "refresh scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = coordinator.ensure_fresh().await {
                            tracing::warn!(error = %e, "scheduled token renewal failed");
                            break;
                        }
                        // Next renewal is a full period after this one settled.
                        ticker.reset();
                    }
                    event = events.recv() => match event {
                        Ok(SessionEvent::Expired | SessionEvent::LoggedOut)
                        | Err(RecvError::Closed) => break,
                        // A 401-triggered renewal also restarts the period.
                        Ok(SessionEvent::Refreshed) => ticker.reset(),
                        Ok(SessionEvent::Authenticated) | Err(RecvError::Lagged(_)) => {}
                    },
                }
            }

            tracing::debug!("refresh scheduler stopped");
        });
        Self { handle }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
