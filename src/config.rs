//! Configuration management for the Lookout MCP server.
//!
//! This module handles loading configuration from environment variables,
//! with validation to ensure values are well-formed. Credentials are optional
//! at load time: a client without credentials fails each call with an
//! `Unauthorized` error instead of refusing to start.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::auth::Credentials;
use crate::cache::CacheConfig;
use crate::error::LookoutError;
use crate::pool::PoolConfig;
use crate::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://api.helpscout.net/v2";
const DEFAULT_TOKEN_URL: &str = "https://api.helpscout.net/v2/oauth2/token";
const DEFAULT_DOCS_BASE_URL: &str = "https://docsapi.helpscout.net/v1";

/// Configuration for connecting to the Help Scout APIs.
///
/// Secrets are stored but never logged or exposed in error messages.
#[derive(Clone)]
#[cfg_attr(test, derive(Debug))]
pub struct Config {
    /// Base URL of the conversations/mailbox API.
    pub base_url: String,

    /// OAuth2 token endpoint for the client-credentials flow.
    pub token_url: String,

    /// Base URL of the Docs API.
    pub docs_base_url: String,

    /// OAuth2 application id.
    pub app_id: Option<String>,

    /// OAuth2 application secret. Never log this value.
    pub app_secret: Option<String>,

    /// Static personal access token, used when no OAuth2 pair is set.
    pub api_token: Option<String>,

    /// Docs API key. Never log this value.
    pub docs_api_key: Option<String>,

    /// Whether destructive operations are permitted.
    pub allow_deletes: bool,

    /// Response cache settings, shared by both clients.
    pub cache: CacheConfig,

    /// Retry policy applied to every outbound call.
    pub retry: RetryPolicy,

    /// Connection pool for the conversations/mailbox API.
    pub api_pool: PoolConfig,

    /// Connection pool for the Docs API.
    pub docs_pool: PoolConfig,

    /// Site used when resolution finds no textual match.
    pub default_site_id: Option<String>,

    /// Collection used when resolution finds no textual match.
    pub default_collection_id: Option<String>,

    /// Maximum age of the site/collection directory before it is reloaded.
    pub directory_refresh: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `LookoutError::Config` if a value fails validation.
    ///
    /// # Example
    ///
    /// ```ignore
    /// dotenvy::dotenv().ok();
    /// let config = Config::from_env()?;
    /// ```
    pub fn from_env() -> Result<Self, LookoutError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LookoutError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| Self::get_optional(&lookup, name);

        let base_url = Self::validate_base_url(
            "HELPSCOUT_BASE_URL",
            get("HELPSCOUT_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        )?;
        let token_url = Self::validate_base_url(
            "HELPSCOUT_TOKEN_URL",
            get("HELPSCOUT_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string()),
        )?;
        let docs_base_url = Self::validate_base_url(
            "HELPSCOUT_DOCS_BASE_URL",
            get("HELPSCOUT_DOCS_BASE_URL").unwrap_or_else(|| DEFAULT_DOCS_BASE_URL.to_string()),
        )?;

        let app_id = get("HELPSCOUT_APP_ID");
        let app_secret = get("HELPSCOUT_APP_SECRET");
        let api_token = get("HELPSCOUT_API_TOKEN");
        let docs_api_key = get("HELPSCOUT_DOCS_API_KEY");

        if app_id.is_some() != app_secret.is_some() {
            return Err(LookoutError::invalid_config(
                "HELPSCOUT_APP_ID and HELPSCOUT_APP_SECRET must be set together",
            ));
        }

        for (name, value) in [
            ("HELPSCOUT_APP_SECRET", &app_secret),
            ("HELPSCOUT_API_TOKEN", &api_token),
            ("HELPSCOUT_DOCS_API_KEY", &docs_api_key),
        ] {
            if let Some(secret) = value {
                Self::validate_secret(name, secret)?;
            }
        }

        let cache = CacheConfig {
            default_ttl: Duration::from_secs(Self::parse_or(
                &lookup,
                "HELPSCOUT_CACHE_TTL_SECONDS",
                300u64,
            )?),
            max_entries: Self::parse_or(&lookup, "HELPSCOUT_CACHE_MAX_ENTRIES", 10_000usize)?,
        };

        let jitter: f64 = Self::parse_or(&lookup, "HELPSCOUT_RETRY_JITTER", 0.1)?;
        if !(0.0..=1.0).contains(&jitter) {
            return Err(LookoutError::invalid_config(
                "HELPSCOUT_RETRY_JITTER must be between 0 and 1",
            ));
        }
        let retry = RetryPolicy::new(
            Self::parse_or(&lookup, "HELPSCOUT_MAX_RETRIES", 3u32)?,
            Duration::from_millis(Self::parse_or(
                &lookup,
                "HELPSCOUT_RETRY_BASE_DELAY_MS",
                1_000u64,
            )?),
            Duration::from_millis(Self::parse_or(
                &lookup,
                "HELPSCOUT_RETRY_MAX_DELAY_MS",
                10_000u64,
            )?),
        )
        .with_jitter(jitter);

        let socket_timeout = Duration::from_millis(Self::parse_or(
            &lookup,
            "HELPSCOUT_SOCKET_TIMEOUT_MS",
            30_000u64,
        )?);
        let keep_alive = Self::parse_bool(&lookup, "HELPSCOUT_KEEP_ALIVE", true)?;
        let keep_alive_interval = Duration::from_millis(Self::parse_or(
            &lookup,
            "HELPSCOUT_KEEP_ALIVE_MS",
            1_000u64,
        )?);

        let api_pool = PoolConfig {
            max_open: Self::parse_or(&lookup, "HELPSCOUT_MAX_SOCKETS", 50usize)?,
            max_idle: Self::parse_or(&lookup, "HELPSCOUT_MAX_FREE_SOCKETS", 10usize)?,
            idle_timeout: Duration::from_millis(Self::parse_or(
                &lookup,
                "HELPSCOUT_IDLE_TIMEOUT_MS",
                60_000u64,
            )?),
            timeout: socket_timeout,
            keep_alive,
            keep_alive_interval,
        };
        let docs_pool = PoolConfig {
            max_open: Self::parse_or(&lookup, "HELPSCOUT_DOCS_MAX_SOCKETS", 10usize)?,
            max_idle: Self::parse_or(&lookup, "HELPSCOUT_DOCS_MAX_FREE_SOCKETS", 5usize)?,
            idle_timeout: Duration::from_millis(Self::parse_or(
                &lookup,
                "HELPSCOUT_DOCS_IDLE_TIMEOUT_MS",
                60_000u64,
            )?),
            timeout: socket_timeout,
            keep_alive,
            keep_alive_interval,
        };
        if api_pool.max_open == 0 || docs_pool.max_open == 0 {
            return Err(LookoutError::invalid_config(
                "socket limits must be at least 1",
            ));
        }

        Ok(Config {
            base_url,
            token_url,
            docs_base_url,
            app_id,
            app_secret,
            api_token,
            docs_api_key,
            allow_deletes: Self::parse_bool(&lookup, "HELPSCOUT_ALLOW_DELETES", false)?,
            cache,
            retry,
            api_pool,
            docs_pool,
            default_site_id: get("HELPSCOUT_DEFAULT_SITE_ID"),
            default_collection_id: get("HELPSCOUT_DEFAULT_COLLECTION_ID"),
            directory_refresh: Duration::from_secs(Self::parse_or(
                &lookup,
                "HELPSCOUT_DIRECTORY_REFRESH_SECONDS",
                300u64,
            )?),
        })
    }

    /// Credentials for the conversations/mailbox API.
    ///
    /// An OAuth2 pair takes precedence over a personal token.
    pub fn api_credentials(&self) -> Credentials {
        match (&self.app_id, &self.app_secret, &self.api_token) {
            (Some(id), Some(secret), _) => Credentials::ClientCredentials {
                token_url: self.token_url.clone(),
                client_id: id.clone(),
                client_secret: secret.clone(),
            },
            (_, _, Some(token)) => Credentials::PersonalToken(token.clone()),
            _ => Credentials::None,
        }
    }

    /// Credentials for the Docs API.
    pub fn docs_credentials(&self) -> Credentials {
        match &self.docs_api_key {
            Some(key) => Credentials::ApiKey(key.clone()),
            None => Credentials::None,
        }
    }

    /// Every configured secret, for sanitizing outgoing messages.
    pub fn secrets(&self) -> Vec<String> {
        [&self.app_secret, &self.api_token, &self.docs_api_key]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Gets an optional variable, treating blank values as unset.
    fn get_optional<F>(lookup: &F, name: &str) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(name)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Parses an optional variable, falling back to `default` when unset.
    fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, LookoutError>
    where
        F: Fn(&str) -> Option<String>,
        T: FromStr,
    {
        match Self::get_optional(lookup, name) {
            Some(raw) => raw
                .parse()
                .map_err(|_| LookoutError::invalid_config(format!("{} has an invalid value", name))),
            None => Ok(default),
        }
    }

    fn parse_bool<F>(lookup: &F, name: &str, default: bool) -> Result<bool, LookoutError>
    where
        F: Fn(&str) -> Option<String>,
    {
        match Self::get_optional(lookup, name).map(|v| v.to_lowercase()) {
            None => Ok(default),
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
            Some(_) => Err(LookoutError::invalid_config(format!(
                "{} must be true or false",
                name
            ))),
        }
    }

    /// Validates and normalizes a base URL.
    fn validate_base_url(name: &str, url: String) -> Result<String, LookoutError> {
        // Remove trailing slash for consistency
        let url = url.trim().trim_end_matches('/').to_string();

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(LookoutError::invalid_config(format!(
                "{} must start with http:// or https://",
                name
            )));
        }

        let parsed = Url::parse(&url)
            .map_err(|e| LookoutError::invalid_config(format!("{} is not a valid URL: {}", name, e)))?;
        if parsed.host_str().is_none() {
            return Err(LookoutError::invalid_config(format!(
                "{} must include a host",
                name
            )));
        }

        Ok(url)
    }

    /// Validates a secret is not a placeholder value.
    fn validate_secret(name: &str, key: &str) -> Result<(), LookoutError> {
        let key_lower = key.to_lowercase();
        let placeholder_patterns = [
            "your_api_key",
            "your_key",
            "your-secret",
            "placeholder",
            "xxx",
            "changeme",
        ];

        for pattern in placeholder_patterns {
            if key_lower.contains(pattern) {
                return Err(LookoutError::invalid_config(format!(
                    "{} appears to be a placeholder value",
                    name
                )));
            }
        }

        Ok(())
    }
}
