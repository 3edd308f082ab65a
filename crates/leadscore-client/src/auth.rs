//! Login, signup and session lifecycle for [`ApiClient`].

use crate::client::{ApiClient, ApiRequest};
use crate::credentials::Credential;
use crate::error::ApiError;
use crate::session::SessionEvent;
use crate::types::{LoginRequest, SignupRequest, TokenPair};

const LOGIN_PATH: &str = "auth/login/";
const REGISTER_PATH: &str = "auth/register/";

impl ApiClient {
    /// Exchanges username and password for a token pair, stores it and
    /// starts the background renewal.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Remote`] if the service rejects the credentials.
    /// - [`ApiError::Network`] on network failure.
    /// - [`ApiError::Deserialize`] if the response carries no access token.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), ApiError> {
        let body = serde_json::to_value(LoginRequest { username, password })
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let pair: TokenPair = self
            .send_as(ApiRequest::post(LOGIN_PATH).public().json(body), "login")
            .await?;
        self.begin_session(pair, "login")?;
        tracing::info!(username, "logged in");
        Ok(())
    }

    /// Registers a new account; the service logs it in immediately.
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::login`]; field errors such as a taken username
    /// arrive as [`ApiError::Remote`].
    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Result<(), ApiError> {
        let body = serde_json::to_value(SignupRequest {
            username,
            email,
            password,
        })
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        let pair: TokenPair = self
            .send_as(ApiRequest::post(REGISTER_PATH).public().json(body), "signup")
            .await?;
        self.begin_session(pair, "signup")?;
        tracing::info!(username, "account created");
        Ok(())
    }

    /// Drops the stored credential and stops the background renewal.
    pub fn logout(&self) {
        self.stop_refresh_scheduler();
        self.credentials().clear();
        self.events().emit(SessionEvent::LoggedOut);
        tracing::info!("logged out");
    }

    /// Resumes a session persisted by a previous run. Returns `false` when
    /// there is nothing to resume.
    pub fn restore_session(&self) -> bool {
        if self.credentials().get().is_none() {
            return false;
        }
        self.start_refresh_scheduler();
        self.events().emit(SessionEvent::Authenticated);
        tracing::debug!("restored persisted session");
        true
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.credentials().access_token().is_some()
    }

    fn begin_session(&self, pair: TokenPair, context: &str) -> Result<(), ApiError> {
        let credential = pair
            .access
            .and_then(|access| Credential::new(access, pair.refresh))
            .ok_or_else(|| ApiError::Deserialize {
                context: context.to_owned(),
                source: serde::de::Error::custom("response did not contain an access token"),
            })?;
        self.credentials().set(credential);
        self.start_refresh_scheduler();
        self.events().emit(SessionEvent::Authenticated);
        Ok(())
    }
}
