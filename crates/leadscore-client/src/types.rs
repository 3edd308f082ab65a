//! Wire shapes of the service's responses that are not domain records.

use leadscore_core::{Lead, ScoredResult};
use serde::{Deserialize, Serialize};

/// Token pair returned by login, signup and token refresh. Refresh responses
/// usually omit `refresh`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenPair {
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub refresh: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SignupRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Response of a batch upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UploadReport {
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub leads: Vec<Lead>,
}

/// Response of a scoring run.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScoreRun {
    #[serde(default)]
    pub processed: usize,
    /// Names of leads the service could not score.
    #[serde(default)]
    pub skipped: Vec<String>,
    #[serde(default)]
    pub results: Vec<ScoredResult>,
}
