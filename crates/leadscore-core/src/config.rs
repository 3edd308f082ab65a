use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

pub const DEFAULT_API_BASE_URL: &str = "https://lead-analysis-with-ai.onrender.com/";

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if a value is present but invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Every variable has a default, so an empty environment yields a usable
/// development configuration pointed at the hosted service.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_secs = |var: &str, default: &str| -> Result<u64, ConfigError> {
        let raw = or_default(var, default);
        let secs = raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })?;
        if secs == 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(secs)
    };

    let env = parse_environment(&or_default("LEADSCORE_ENV", "development"))?;
    let api_base_url =
        normalize_base_url(&or_default("LEADSCORE_API_BASE_URL", DEFAULT_API_BASE_URL))?;
    let request_timeout_secs = parse_secs("LEADSCORE_REQUEST_TIMEOUT_SECS", "30")?;
    let refresh_interval_secs = parse_secs("LEADSCORE_REFRESH_INTERVAL_SECS", "3000")?;
    let credentials_path = PathBuf::from(or_default(
        "LEADSCORE_CREDENTIALS_PATH",
        ".leadscore/credentials.json",
    ));
    let user_agent = or_default(
        "LEADSCORE_USER_AGENT",
        "leadscore/0.1 (lead-qualification)",
    );
    let log_level = or_default("LEADSCORE_LOG_LEVEL", "info");

    Ok(AppConfig {
        env,
        api_base_url,
        request_timeout_secs,
        refresh_interval_secs,
        credentials_path,
        user_agent,
        log_level,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "LEADSCORE_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

/// Checks the scheme and forces exactly one trailing slash, so relative
/// endpoint paths join onto the base instead of replacing its last segment.
fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidEnvVar {
            var: "LEADSCORE_API_BASE_URL".to_string(),
            reason: format!("'{trimmed}' must start with http:// or https://"),
        });
    }
    Ok(format!("{}/", trimmed.trim_end_matches('/')))
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
