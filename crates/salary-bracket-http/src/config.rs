//! Configuration loading and resolution.
//!
//! Every setting resolves in the same order: explicit flag, then environment
//! variable, then a built-in default.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use salary_bracket::{BracketError, BracketResult, Credentials};

pub const ENV_DB: &str = "SALARY_BRACKET_DB";
pub const ENV_HOST: &str = "SALARY_BRACKET_HOST";
pub const ENV_SESSION_COOKIE: &str = "SESSION_COOKIE";

pub const DEFAULT_HOST: &str = "https://www.getonbrd.com";
pub const DEFAULT_SEARCH_PATH: &str = "/webpros/search_jobs";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Settings for the HTTP listing adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub search_path: String,
    /// Category tags sent with every search.
    pub tenant_ids: Vec<String>,
    pub remote_jobs: bool,
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            tenant_ids: vec![String::new(), "1".to_string(), "5".to_string()],
            remote_jobs: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Resolve the store path.
pub fn resolve_db_path(explicit: Option<&str>) -> PathBuf {
    if let Some(path) = explicit {
        return PathBuf::from(path);
    }

    if let Ok(env_path) = std::env::var(ENV_DB) {
        if !env_path.is_empty() {
            return PathBuf::from(env_path);
        }
    }

    resolve_default_db_path()
}

fn resolve_default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".salary-bracket")
        .join("brackets.db")
}

/// Resolve the listing host.
pub fn resolve_host(explicit: Option<&str>) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(ENV_HOST).ok().filter(|h| !h.is_empty()))
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
}

/// Resolve the session cookie; missing cookie is a config error.
pub fn resolve_credentials(explicit: Option<&str>) -> BracketResult<Credentials> {
    explicit
        .map(str::to_string)
        .or_else(|| std::env::var(ENV_SESSION_COOKIE).ok())
        .filter(|cookie| !cookie.trim().is_empty())
        .map(Credentials::new)
        .ok_or_else(|| {
            BracketError::Config(format!(
                "no session cookie: pass --cookie or set {ENV_SESSION_COOKIE}"
            ))
        })
}
