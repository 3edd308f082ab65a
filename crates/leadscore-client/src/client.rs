//! Request pipeline for the lead-scoring service.
//!
//! Every call goes through [`ApiClient::send`], which attaches the stored
//! bearer credential, logs the exchange and classifies failures. A 401 on an
//! authenticated request is handed to the [`RefreshCoordinator`]; once a
//! renewal succeeds the request is replayed exactly once with the new token.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::Stream;
use leadscore_core::config::DEFAULT_API_BASE_URL;
use leadscore_core::AppConfig;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::progress::ProgressSender;
use crate::refresh::RefreshCoordinator;
use crate::scheduler::RefreshScheduler;
use crate::session::{SessionEvent, SessionEvents};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(50 * 60);
const DEFAULT_USER_AGENT: &str = "leadscore/0.1 (lead-qualification)";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const UPLOAD_CHUNK_BYTES: usize = 16 * 1024;
const MAX_ERROR_TEXT_CHARS: usize = 300;
const REDACTED_KEYS: [&str; 3] = ["password", "refresh", "access"];

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    /// Applies to every outbound call, including token renewal.
    pub timeout: Duration,
    /// Period of the background token renewal.
    pub refresh_interval: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    /// Default settings pointed at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
            refresh_interval: Duration::from_secs(config.refresh_interval_secs),
            user_agent: config.user_agent.clone(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// A request relative to the service's base URL. Cheap to clone, so the
/// pipeline can replay it after a token renewal.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: RequestBody,
    public: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum RequestBody {
    Empty,
    Json(Value),
    CsvUpload {
        file_name: String,
        contents: Arc<[u8]>,
        progress: Option<ProgressSender>,
    },
}

impl ApiRequest {
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
            public: false,
        }
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Sends without a bearer token and never attempts a renewal. A 401 from
    /// a public endpoint is an ordinary [`ApiError::Remote`].
    #[must_use]
    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    /// Attaches `contents` as the multipart field `file`, reporting bytes
    /// handed to the connection on `progress`.
    #[must_use]
    pub fn csv_upload(
        mut self,
        file_name: impl Into<String>,
        contents: Arc<[u8]>,
        progress: Option<ProgressSender>,
    ) -> Self {
        self.body = RequestBody::CsvUpload {
            file_name: file_name.into(),
            contents,
            progress,
        };
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn is_public(&self) -> bool {
        self.public
    }

    fn payload_summary(&self) -> String {
        match &self.body {
            RequestBody::Empty => "-".to_owned(),
            RequestBody::Json(value) => redact(value).to_string(),
            RequestBody::CsvUpload {
                file_name,
                contents,
                ..
            } => format!("{file_name} ({} bytes)", contents.len()),
        }
    }
}

enum Dispatched {
    Success(Value),
    /// 401 on an authenticated request, with the token it carried.
    Unauthorized { sent_with: Option<String> },
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Authenticated client for the lead-scoring service. Clones share the
/// credential store, the refresh coordinator and the session channel.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: Client,
    base_url: Url,
    credentials: CredentialStore,
    events: SessionEvents,
    refresh: RefreshCoordinator,
    refresh_interval: Duration,
    scheduler: Mutex<Option<RefreshScheduler>>,
}

impl ApiClient {
    /// Builds a client over `credentials`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] if the underlying `reqwest::Client`
    /// cannot be constructed, or [`ApiError::InvalidRequest`] if the base URL
    /// does not parse.
    pub fn new(config: ClientConfig, credentials: CredentialStore) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(config.timeout))
            .user_agent(config.user_agent.as_str())
            .build()?;

        let normalised = format!("{}/", config.base_url.trim().trim_end_matches('/'));
        let base_url = Url::parse(&normalised).map_err(|e| {
            ApiError::InvalidRequest(format!("invalid base URL '{}': {e}", config.base_url))
        })?;

        let events = SessionEvents::new();
        let refresh = RefreshCoordinator::new(
            http.clone(),
            base_url.clone(),
            credentials.clone(),
            events.clone(),
        );

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                credentials,
                events,
                refresh,
                refresh_interval: config.refresh_interval,
                scheduler: Mutex::new(None),
            }),
        })
    }

    /// Client with default settings and an in-memory store, pointed at
    /// `base_url` (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Same as [`ApiClient::new`].
    pub fn with_base_url(base_url: &str) -> Result<Self, ApiError> {
        Self::new(ClientConfig::new(base_url), CredentialStore::in_memory())
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    #[must_use]
    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    #[must_use]
    pub fn refresh_coordinator(&self) -> &RefreshCoordinator {
        &self.inner.refresh
    }

    /// Session lifecycle notifications for this client.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn events(&self) -> &SessionEvents {
        &self.inner.events
    }

    /// Sends `request` and returns the parsed JSON body (`Null` for an empty
    /// body).
    ///
    /// # Errors
    ///
    /// - [`ApiError::AuthExpired`] if the credential was rejected and could
    ///   not be renewed, or the replay after a renewal was rejected again.
    /// - [`ApiError::Network`] on timeout or connection failure.
    /// - [`ApiError::Remote`] on any other non-2xx status.
    /// - [`ApiError::Deserialize`] if a 2xx body is not JSON.
    pub async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        match self.dispatch(&request).await? {
            Dispatched::Success(value) => Ok(value),
            Dispatched::Unauthorized { sent_with } => {
                self.recover_and_replay(&request, sent_with).await
            }
        }
    }

    /// [`ApiClient::send`] followed by deserialization into `T`.
    ///
    /// # Errors
    ///
    /// As [`ApiClient::send`], plus [`ApiError::Deserialize`] naming
    /// `context` if the body does not match `T`.
    pub async fn send_as<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        context: &str,
    ) -> Result<T, ApiError> {
        let body = self.send(request).await?;
        serde_json::from_value(body).map_err(|e| ApiError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<Dispatched, ApiError> {
        let url = self.url(&request.path)?;
        let token = if request.public {
            None
        } else {
            self.inner.credentials.access_token()
        };

        let mut builder = self.inner.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &token {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::CsvUpload {
                file_name,
                contents,
                progress,
            } => builder.multipart(upload_form(file_name, contents, progress.clone())?),
        };

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            payload = %request.payload_summary(),
            "sending request"
        );

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(method = %request.method, path = %request.path, error = %e, "request failed");
            ApiError::Network(e)
        })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED && !request.public {
            tracing::debug!(method = %request.method, path = %request.path, "credential rejected");
            return Ok(Dispatched::Unauthorized { sent_with: token });
        }

        let text = response.text().await?;
        if !status.is_success() {
            let message = remote_message(status, &text);
            tracing::warn!(
                method = %request.method,
                path = %request.path,
                status = status.as_u16(),
                message = %message,
                "request rejected"
            );
            return Err(ApiError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        let value = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| ApiError::Deserialize {
                context: format!("{} {}", request.method, request.path),
                source: e,
            })?
        };

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            "request succeeded"
        );
        Ok(Dispatched::Success(value))
    }

    async fn recover_and_replay(
        &self,
        request: &ApiRequest,
        sent_with: Option<String>,
    ) -> Result<Value, ApiError> {
        if let Err(e) = self
            .inner
            .refresh
            .renew_after_rejection(sent_with.as_deref())
            .await
        {
            tracing::warn!(
                method = %request.method,
                path = %request.path,
                error = %e,
                "could not renew rejected credential"
            );
            return Err(ApiError::AuthExpired);
        }

        tracing::info!(method = %request.method, path = %request.path, "replaying request with renewed credential");
        match self.dispatch(request).await? {
            Dispatched::Success(value) => Ok(value),
            Dispatched::Unauthorized { .. } => {
                tracing::warn!(
                    method = %request.method,
                    path = %request.path,
                    "renewed credential rejected, ending session"
                );
                self.expire_session();
                Err(ApiError::AuthExpired)
            }
        }
    }

    /// Clears the session, emitting [`SessionEvent::Expired`] only if this
    /// call is the one that removed the credential.
    pub(crate) fn expire_session(&self) {
        self.stop_refresh_scheduler();
        if self.inner.credentials.take().is_some() {
            self.inner.events.emit(SessionEvent::Expired);
        }
    }

    /// Starts (or restarts) the background renewal.
    pub fn start_refresh_scheduler(&self) {
        let scheduler = RefreshScheduler::spawn(
            self.inner.refresh.clone(),
            self.inner.events.subscribe(),
            self.inner.refresh_interval,
        );
        let previous = self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(scheduler);
        drop(previous);
    }

    pub fn stop_refresh_scheduler(&self) {
        let previous = self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(previous);
    }

    #[must_use]
    pub fn is_refresh_scheduled(&self) -> bool {
        self.inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(RefreshScheduler::is_running)
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.inner
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidRequest(format!("invalid path '{path}': {e}")))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("credentials", &self.inner.credentials)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn upload_form(
    file_name: &str,
    contents: &Arc<[u8]>,
    progress: Option<ProgressSender>,
) -> Result<Form, ApiError> {
    let total = contents.len() as u64;
    let body = Body::wrap_stream(chunked(Arc::clone(contents), progress));
    let part = Part::stream_with_length(body, total)
        .file_name(file_name.to_owned())
        .mime_str("text/csv")
        .map_err(|e| ApiError::InvalidRequest(format!("invalid upload content type: {e}")))?;
    Ok(Form::new().part("file", part))
}

/// Yields `contents` in fixed-size chunks, reporting the running byte count
/// as each chunk is handed to the connection.
fn chunked(
    contents: Arc<[u8]>,
    progress: Option<ProgressSender>,
) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
    let total = contents.len();
    let bounds: Vec<(usize, usize)> = (0..total)
        .step_by(UPLOAD_CHUNK_BYTES)
        .map(|start| (start, (start + UPLOAD_CHUNK_BYTES).min(total)))
        .collect();

    futures::stream::iter(bounds.into_iter().map(move |(start, end)| {
        if let Some(progress) = &progress {
            progress.advance_bytes(end as u64, total as u64);
        }
        Ok(contents[start..end].to_vec())
    }))
}

/// Normalises an error body to a single message: an object's `message` or
/// `detail`, then its first field error, then a bare JSON string, then the
/// raw text, then the status reason.
fn remote_message(status: StatusCode, body: &str) -> String {
    let reason = || {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned()
    };

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return reason();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => ["message", "detail"]
            .iter()
            .find_map(|key| map.get(*key).and_then(value_text))
            .or_else(|| {
                map.iter()
                    .find_map(|(field, value)| value_text(value).map(|text| format!("{field}: {text}")))
            })
            .unwrap_or_else(reason),
        Ok(Value::String(text)) if !text.trim().is_empty() => text,
        Ok(Value::Array(items)) => items.iter().find_map(value_text).unwrap_or_else(reason),
        Ok(_) => reason(),
        Err(_) => trimmed.chars().take(MAX_ERROR_TEXT_CHARS).collect(),
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Array(items) => items.iter().find_map(value_text),
        _ => None,
    }
}

fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    if REDACTED_KEYS.contains(&key.as_str()) {
                        (key.clone(), Value::String("[redacted]".to_owned()))
                    } else {
                        (key.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
