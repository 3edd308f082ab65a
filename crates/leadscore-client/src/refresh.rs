//! Single-flight access token renewal.
//!
//! One [`RefreshCoordinator`] exists per client. Whoever finds it idle starts
//! the renewal; everyone arriving while it runs awaits the same shared future
//! and observes the same outcome. The renewal is spawned on the runtime so it
//! settles the credential store even if every waiter goes away.

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{Client, Url};

use crate::credentials::{Credential, CredentialStore};
use crate::error::RefreshError;
use crate::session::{SessionEvent, SessionEvents};
use crate::types::{RefreshRequest, TokenPair};

pub(crate) const REFRESH_PATH: &str = "auth/token/refresh/";

type Renewal = Shared<BoxFuture<'static, Result<(), RefreshError>>>;

enum RefreshState {
    Idle,
    InFlight(Renewal),
    Failed,
}

/// Observable phase of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    InFlight,
    /// The last renewal failed. The next attempt starts a fresh one.
    Failed,
}

#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    http: Client,
    base_url: Url,
    credentials: CredentialStore,
    events: SessionEvents,
    state: Mutex<RefreshState>,
}

enum Join {
    Done(Result<(), RefreshError>),
    Wait(Renewal),
}

impl RefreshCoordinator {
    pub(crate) fn new(
        http: Client,
        base_url: Url,
        credentials: CredentialStore,
        events: SessionEvents,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                credentials,
                events,
                state: Mutex::new(RefreshState::Idle),
            }),
        }
    }

    /// Renews the access token, or joins the renewal already running.
    ///
    /// On success the new token is in the credential store and
    /// [`SessionEvent::Refreshed`] has been emitted. On failure the store has
    /// been cleared and [`SessionEvent::Expired`] emitted once.
    ///
    /// # Errors
    ///
    /// Returns the shared [`RefreshError`] of the renewal this call started
    /// or joined.
    pub async fn ensure_fresh(&self) -> Result<(), RefreshError> {
        let renewal = {
            let mut state = self.lock_state();
            if let RefreshState::InFlight(renewal) = &*state {
                renewal.clone()
            } else {
                self.start(&mut state)
            }
        };
        renewal.await
    }

    /// Recovers from a 401 on a request sent with `sent_with`.
    ///
    /// If the stored token already differs from the rejected one, a renewal
    /// finished while the request was in flight and no new one is started.
    pub(crate) async fn renew_after_rejection(
        &self,
        sent_with: Option<&str>,
    ) -> Result<(), RefreshError> {
        let join = {
            let mut state = self.lock_state();
            if let RefreshState::InFlight(renewal) = &*state {
                Join::Wait(renewal.clone())
            } else {
                match self.inner.credentials.access_token() {
                    None => Join::Done(Err(RefreshError::MissingAccessToken)),
                    Some(current) if Some(current.as_str()) != sent_with => {
                        tracing::debug!("access token rotated while request was in flight");
                        Join::Done(Ok(()))
                    }
                    Some(_) => Join::Wait(self.start(&mut state)),
                }
            }
        };
        match join {
            Join::Done(outcome) => outcome,
            Join::Wait(renewal) => renewal.await,
        }
    }

    #[must_use]
    pub fn phase(&self) -> RefreshPhase {
        match &*self.lock_state() {
            RefreshState::Idle => RefreshPhase::Idle,
            RefreshState::InFlight(_) => RefreshPhase::InFlight,
            RefreshState::Failed => RefreshPhase::Failed,
        }
    }

    fn start(&self, state: &mut RefreshState) -> Renewal {
        let inner = Arc::clone(&self.inner);
        let renewal = async move {
            let outcome = inner.renew().await;
            inner.settle(&outcome);
            outcome
        }
        .boxed()
        .shared();

        *state = RefreshState::InFlight(renewal.clone());
        tokio::spawn(renewal.clone());
        renewal
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    async fn renew(&self) -> Result<(), RefreshError> {
        let refresh_token = self
            .credentials
            .get()
            .and_then(|c| c.refresh_token().map(str::to_owned))
            .ok_or(RefreshError::MissingRefreshToken)?;

        let url = self
            .base_url
            .join(REFRESH_PATH)
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        tracing::info!(path = REFRESH_PATH, "renewing access token");
        let response = self
            .http
            .post(url)
            .json(&RefreshRequest {
                refresh: &refresh_token,
            })
            .send()
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
            });
        }

        let pair: TokenPair = response
            .json()
            .await
            .map_err(|e| RefreshError::Malformed(e.to_string()))?;

        let rotated = pair.refresh.filter(|t| !t.is_empty());
        let credential = pair
            .access
            .and_then(|access| Credential::new(access, rotated.or(Some(refresh_token))))
            .ok_or(RefreshError::MissingAccessToken)?;

        self.credentials.set(credential);
        Ok(())
    }

    /// Applies the outcome to the store before other callers can observe an
    /// idle coordinator.
    fn settle(&self, outcome: &Result<(), RefreshError>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome {
            Ok(()) => {
                *state = RefreshState::Idle;
                drop(state);
                tracing::info!("access token renewed");
                self.events.emit(SessionEvent::Refreshed);
            }
            Err(e) => {
                let torn_down = self.credentials.take().is_some();
                *state = RefreshState::Failed;
                drop(state);
                tracing::warn!(error = %e, "token renewal failed, session cleared");
                if torn_down {
                    self.events.emit(SessionEvent::Expired);
                }
            }
        }
    }
}
