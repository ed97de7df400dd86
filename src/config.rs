//! Client configuration loaded from the environment.
//!
//! `SCHOOLDESK_API_URL` is required. Everything else has a default. All
//! problems are collected and reported together so a misconfigured
//! deployment fails once with the full list.

use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

pub const API_URL_VAR: &str = "SCHOOLDESK_API_URL";
pub const SESSION_URL_VAR: &str = "SCHOOLDESK_SESSION_URL";
pub const LOGIN_PATH_VAR: &str = "SCHOOLDESK_LOGIN_PATH";
pub const LOGOUT_PATH_VAR: &str = "SCHOOLDESK_LOGOUT_PATH";
pub const REFRESH_PATH_VAR: &str = "SCHOOLDESK_REFRESH_PATH";
pub const TIMEOUT_VAR: &str = "SCHOOLDESK_TIMEOUT_SECS";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Paths of the auth routes on the session origin.
///
/// Requests to these paths never trigger a refresh: a 401 from login is a
/// bad password, and a 401 from refresh or logout means the session is
/// already gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub login: String,
    pub logout: String,
    pub refresh: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            logout: "/auth/logout".to_string(),
            refresh: "/auth/refresh".to_string(),
        }
    }
}

impl AuthEndpoints {
    /// Whether `path` names one of the auth routes. Query strings and
    /// trailing slashes are ignored.
    pub fn is_exempt(&self, path: &str) -> bool {
        let path = normalize_path(path);
        [&self.login, &self.logout, &self.refresh]
            .iter()
            .any(|endpoint| normalize_path(endpoint) == path)
    }
}

fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin for resource requests, without a trailing slash.
    pub api_base_url: String,
    /// Origin serving the auth routes. Defaults to `api_base_url`.
    pub session_base_url: String,
    pub endpoints: AuthEndpoints,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Configuration for a backend at `api_base_url` with default routes.
    pub fn new(api_base_url: &str) -> Result<Self, ConfigError> {
        let base =
            parse_base_url(API_URL_VAR, api_base_url).map_err(|e| ConfigError::Invalid(vec![e]))?;
        Ok(Self {
            session_base_url: base.clone(),
            api_base_url: base,
            endpoints: AuthEndpoints::default(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        })
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, validating every variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems = Vec::new();

        let api_base_url = match lookup(API_URL_VAR).filter(|v| !v.trim().is_empty()) {
            Some(raw) => parse_base_url(API_URL_VAR, &raw)
                .map_err(|e| problems.push(e))
                .ok(),
            None => {
                problems.push(format!("{} is required", API_URL_VAR));
                None
            }
        };

        let session_base_url = match lookup(SESSION_URL_VAR).filter(|v| !v.trim().is_empty()) {
            Some(raw) => parse_base_url(SESSION_URL_VAR, &raw)
                .map_err(|e| problems.push(e))
                .ok(),
            None => api_base_url.clone(),
        };

        let defaults = AuthEndpoints::default();
        let mut path_var = |var: &str, default: String| match lookup(var) {
            Some(p) if p.starts_with('/') => p,
            Some(p) => {
                problems.push(format!("{} must start with '/': {:?}", var, p));
                default
            }
            None => default,
        };
        let endpoints = AuthEndpoints {
            login: path_var(LOGIN_PATH_VAR, defaults.login),
            logout: path_var(LOGOUT_PATH_VAR, defaults.logout),
            refresh: path_var(REFRESH_PATH_VAR, defaults.refresh),
        };

        let timeout = match lookup(TIMEOUT_VAR) {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    problems.push(format!("{} must be a positive integer: {:?}", TIMEOUT_VAR, raw));
                    DEFAULT_TIMEOUT
                }
            },
            None => DEFAULT_TIMEOUT,
        };

        match (api_base_url, session_base_url) {
            (Some(api_base_url), Some(session_base_url)) if problems.is_empty() => Ok(Self {
                api_base_url,
                session_base_url,
                endpoints,
                timeout,
                connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            }),
            _ => Err(ConfigError::Invalid(problems)),
        }
    }
}

/// Validate an absolute http(s) URL and strip its trailing slash.
fn parse_base_url(var: &str, raw: &str) -> Result<String, String> {
    let url = Url::parse(raw.trim())
        .map_err(|e| format!("{} is not a valid URL ({}): {:?}", var, e, raw))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("{} must use http or https: {:?}", var, raw));
    }
    if url.host_str().is_none() {
        return Err(format!("{} has no host: {:?}", var, raw));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}
