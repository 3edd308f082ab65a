use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: Environment,
    /// Root of the remote scoring service, always ending in `/`.
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    /// Interval of the proactive token refresh, in seconds.
    pub refresh_interval_secs: u64,
    /// Where the access/refresh credential pair is persisted between runs.
    pub credentials_path: PathBuf,
    pub user_agent: String,
    pub log_level: String,
}
