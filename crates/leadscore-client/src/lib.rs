//! Authenticated HTTP client for the lead-scoring service.
//!
//! [`ApiClient`] attaches the stored bearer credential to every call and
//! renews it through a single-flight [`RefreshCoordinator`] when the service
//! answers 401, replaying the rejected request once. Session changes are
//! broadcast as [`SessionEvent`]s.

mod auth;
pub mod client;
pub mod credentials;
pub mod error;
mod intent;
pub mod progress;
pub mod refresh;
pub mod scheduler;
pub mod session;
pub mod types;

pub use client::{ApiClient, ApiRequest, ClientConfig};
pub use credentials::{Credential, CredentialStore};
pub use error::{ApiError, RefreshError};
pub use progress::{ProgressEvent, ProgressEvents, ProgressSender};
pub use refresh::{RefreshCoordinator, RefreshPhase};
pub use scheduler::RefreshScheduler;
pub use session::{SessionEvent, SessionEvents};
pub use types::{ScoreRun, TokenPair, UploadReport};
