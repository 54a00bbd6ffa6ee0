//! HTTP client for the Help Scout APIs.
//!
//! One `ApiClient` exists per upstream API (conversations/mailboxes and Docs).
//! Every call follows the same path:
//!
//! 1. cache lookup (reads only)
//! 2. retry engine around a single attempt
//! 3. connection pool lease, authentication, HTTP
//! 4. status mapping into [`LookoutError`] kinds
//! 5. listing normalization and cache store (reads) or cache invalidation (writes)
//!
//! # Security
//!
//! Credentials are never logged. Error bodies are sanitized and truncated
//! before they reach an error message.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::auth::{AuthManager, Credentials};
use crate::cache::ResponseCache;
use crate::config::Config;
use crate::error::{ErrorContext, FieldError, LookoutError};
use crate::normalize::{normalize, ApiFamily};
use crate::pool::{ConnectionPool, PoolConfig, PoolStatus};
use crate::reports::unwrap_report;
use crate::retry::RetryPolicy;

/// Maximum length for HTTP error response bodies quoted in error messages.
const MAX_ERROR_BODY_LEN: usize = 500;

/// Default TTL for report payloads.
const REPORT_TTL: Duration = Duration::from_secs(900);

/// Maximum accepted length of a path identifier.
const MAX_ID_LEN: usize = 64;

/// Cache TTL per resource, matched against the innermost known path segment.
///
/// Volatile listings expire quickly; structural data is kept longer.
const TTL_RULES: &[(ApiFamily, &str, u64)] = &[
    (ApiFamily::Mailbox, "threads", 60),
    (ApiFamily::Mailbox, "conversations", 60),
    (ApiFamily::Mailbox, "customers", 300),
    (ApiFamily::Mailbox, "mailboxes", 3600),
    (ApiFamily::Mailbox, "users", 3600),
    (ApiFamily::Mailbox, "teams", 3600),
    (ApiFamily::Mailbox, "tags", 3600),
    (ApiFamily::Mailbox, "workflows", 3600),
    (ApiFamily::Docs, "search", 60),
    (ApiFamily::Docs, "articles", 300),
    (ApiFamily::Docs, "categories", 3600),
    (ApiFamily::Docs, "collections", 3600),
    (ApiFamily::Docs, "sites", 3600),
];

/// Per-call cache behaviour for reads.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheOptions {
    /// TTL override; `Some(Duration::ZERO)` disables storing the result.
    pub ttl: Option<Duration>,
    /// Skip the lookup and always call upstream. The fresh result is still stored.
    pub bypass: bool,
}

impl CacheOptions {
    /// Uses the endpoint-class TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Forces a network call.
    #[must_use]
    pub fn bypass(mut self) -> Self {
        self.bypass = true;
        self
    }
}

/// HTTP client for one Help Scout API.
///
/// # Example
///
/// ```ignore
/// let config = Config::from_env()?;
/// let cache = Arc::new(ResponseCache::new(&config.cache));
/// let client = ApiClient::mailbox(&config, cache)?;
///
/// let page: Page<Mailbox> = client.get("/mailboxes", &json!({}), CacheOptions::new()).await?;
/// ```
pub struct ApiClient {
    family: ApiFamily,
    base_url: String,
    pool: ConnectionPool,
    auth: AuthManager,
    cache: Arc<ResponseCache>,
    retry: RetryPolicy,
    allow_deletes: bool,
}

impl ApiClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns `LookoutError::HttpClient` if the HTTP client fails to initialize.
    pub fn new(
        family: ApiFamily,
        base_url: impl Into<String>,
        credentials: Credentials,
        pool: PoolConfig,
        cache: Arc<ResponseCache>,
        retry: RetryPolicy,
    ) -> Result<Self, LookoutError> {
        Ok(Self {
            family,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            pool: ConnectionPool::new(family.as_str(), pool)?,
            auth: AuthManager::new(credentials),
            cache,
            retry,
            allow_deletes: false,
        })
    }

    /// Client for the conversations/mailbox API.
    pub fn mailbox(config: &Config, cache: Arc<ResponseCache>) -> Result<Self, LookoutError> {
        Ok(Self::new(
            ApiFamily::Mailbox,
            &config.base_url,
            config.api_credentials(),
            config.api_pool.clone(),
            cache,
            config.retry.clone(),
        )?
        .with_deletes(config.allow_deletes))
    }

    /// Client for the Docs API.
    pub fn docs(config: &Config, cache: Arc<ResponseCache>) -> Result<Self, LookoutError> {
        Ok(Self::new(
            ApiFamily::Docs,
            &config.docs_base_url,
            config.docs_credentials(),
            config.docs_pool.clone(),
            cache,
            config.retry.clone(),
        )?
        .with_deletes(config.allow_deletes))
    }

    /// Enables or disables `delete`.
    #[must_use]
    pub fn with_deletes(mut self, allowed: bool) -> Self {
        self.allow_deletes = allowed;
        self
    }

    /// Which API this client talks to.
    pub fn family(&self) -> ApiFamily {
        self.family
    }

    /// Returns true if a credential is configured.
    pub fn is_configured(&self) -> bool {
        self.auth.is_configured()
    }

    /// Returns the credential secret for sanitization purposes.
    ///
    /// This should ONLY be used for sanitizing messages, never for logging.
    pub(crate) fn secret(&self) -> Option<&str> {
        self.auth.secret()
    }

    /// Cache namespace of an endpoint: client name plus path, without query.
    pub fn namespace(&self, endpoint: &str) -> String {
        let path = endpoint.split('?').next().unwrap_or(endpoint);
        format!("{}:{}", self.family.as_str(), path.trim_end_matches('/'))
    }

    /// Reads a resource or listing.
    ///
    /// Listings are normalized into `{ items, page, pages, count }` before
    /// being cached and deserialized.
    pub async fn get<T>(
        &self,
        endpoint: &str,
        params: &Value,
        options: CacheOptions,
    ) -> Result<T, LookoutError>
    where
        T: DeserializeOwned,
    {
        let context = ErrorContext::new("GET", endpoint);
        let family = self.family;
        let ttl = options.ttl.or_else(|| self.ttl_for(endpoint));
        let value = self
            .fetch(endpoint, params, options.bypass, ttl, &context, |raw, _| {
                Ok(normalize(family, endpoint, raw))
            })
            .await?;
        decode(value, &context)
    }

    /// Reads an analytics report, unwrapping its payload.
    ///
    /// # Errors
    ///
    /// - `NotFound` when the upstream reports the endpoint as unknown
    /// - `Upstream` when it answers with any other bare text
    pub async fn get_report<T>(
        &self,
        endpoint: &str,
        params: &Value,
        options: CacheOptions,
    ) -> Result<T, LookoutError>
    where
        T: DeserializeOwned,
    {
        let context = ErrorContext::new("GET", endpoint);
        let ttl = Some(options.ttl.unwrap_or(REPORT_TTL));
        let value = self
            .fetch(endpoint, params, options.bypass, ttl, &context, unwrap_report)
            .await?;
        decode(value, &context)
    }

    async fn fetch<F>(
        &self,
        endpoint: &str,
        params: &Value,
        bypass: bool,
        ttl: Option<Duration>,
        context: &ErrorContext,
        shape: F,
    ) -> Result<Value, LookoutError>
    where
        F: FnOnce(Value, &ErrorContext) -> Result<Value, LookoutError>,
    {
        let namespace = self.namespace(endpoint);
        if !bypass {
            if let Some(hit) = self.cache.get(&namespace, params) {
                tracing::debug!(
                    correlation_id = %context.correlation_id,
                    endpoint = endpoint,
                    "Serving from cache"
                );
                return Ok(hit);
            }
        }

        self.auth.ensure_configured(context)?;
        let query = query_pairs(params);
        let raw = self
            .retry
            .run(&operation(&Method::GET, endpoint), &context.correlation_id, |attempt| {
                self.send_once(Method::GET, endpoint, &query, None, context, attempt)
            })
            .await?;

        let value = shape(raw, context)?;
        self.cache.set(&namespace, params, value.clone(), ttl);
        Ok(value)
    }

    /// Creates a resource with POST.
    ///
    /// An empty response body is replaced by `{ "id", "location" }` taken from
    /// the `Resource-ID` and `Location` headers.
    pub async fn create<T>(&self, endpoint: &str, body: &Value) -> Result<T, LookoutError>
    where
        T: DeserializeOwned,
    {
        let (context, value) = self.mutate(Method::POST, endpoint, Some(body)).await?;
        decode(value, &context)
    }

    /// Replaces a resource with PUT.
    pub async fn update<T>(&self, endpoint: &str, body: &Value) -> Result<T, LookoutError>
    where
        T: DeserializeOwned,
    {
        let (context, value) = self.mutate(Method::PUT, endpoint, Some(body)).await?;
        decode(value, &context)
    }

    /// Partially updates a resource with PATCH.
    pub async fn patch<T>(&self, endpoint: &str, body: &Value) -> Result<T, LookoutError>
    where
        T: DeserializeOwned,
    {
        let (context, value) = self.mutate(Method::PATCH, endpoint, Some(body)).await?;
        decode(value, &context)
    }

    /// Deletes a resource.
    ///
    /// # Errors
    ///
    /// Fails with `Unauthorized`, without any network traffic, unless
    /// deletions are enabled.
    pub async fn delete(&self, endpoint: &str) -> Result<(), LookoutError> {
        if !self.allow_deletes {
            let context = ErrorContext::new("DELETE", endpoint);
            tracing::warn!(
                correlation_id = %context.correlation_id,
                endpoint = endpoint,
                "Refusing delete while deletions are disabled"
            );
            return Err(LookoutError::deletion_disabled(context));
        }
        self.mutate(Method::DELETE, endpoint, None).await?;
        Ok(())
    }

    async fn mutate(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<(ErrorContext, Value), LookoutError> {
        let context = ErrorContext::new(method.as_str(), endpoint);
        self.auth.ensure_configured(&context)?;

        let value = self
            .retry
            .run(&operation(&method, endpoint), &context.correlation_id, |attempt| {
                self.send_once(method.clone(), endpoint, &[], body, &context, attempt)
            })
            .await?;

        self.invalidate(endpoint);
        Ok((context, value))
    }

    /// Drops cached reads of an endpoint and of its parent collection.
    pub fn invalidate(&self, endpoint: &str) {
        let namespace = self.namespace(endpoint);
        let mut removed = self.cache.clear(Some(&namespace));
        if let Some((parent, _)) = namespace.rsplit_once('/') {
            if !parent.ends_with(':') {
                removed += self.cache.clear(Some(parent));
            }
        }
        tracing::debug!(namespace = %namespace, removed = removed, "Invalidated cached reads");
    }

    /// One HTTP exchange, including a single resend after refreshing a rejected token.
    async fn send_once(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        context: &ErrorContext,
        attempt: u32,
    ) -> Result<Value, LookoutError> {
        let lease = self.pool.acquire(context).await?;
        let mut refreshed = false;

        loop {
            tracing::debug!(
                correlation_id = %context.correlation_id,
                method = %method,
                endpoint = endpoint,
                attempt = attempt + 1,
                "Making API request"
            );

            let request = self.build_request(lease.client(), &method, endpoint, query, body, context);
            let request = self.auth.authorize(lease.client(), request, context).await?;
            let response = request
                .send()
                .await
                .map_err(|e| self.transport_error(e, context))?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED && self.auth.can_refresh() && !refreshed {
                tracing::info!(
                    correlation_id = %context.correlation_id,
                    "Access token rejected, refreshing"
                );
                self.auth.invalidate();
                refreshed = true;
                continue;
            }

            if !status.is_success() {
                return Err(self.handle_http_error(status, response, context).await);
            }

            return self.read_body(status, response, context).await;
        }
    }

    fn build_request(
        &self,
        http: &Client,
        method: &Method,
        endpoint: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        context: &ErrorContext,
    ) -> RequestBuilder {
        let url = if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        };

        let mut request = http
            .request(method.clone(), url)
            .header("Accept", "application/json")
            .header("X-Correlation-ID", &context.correlation_id);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request
    }

    async fn read_body(
        &self,
        status: StatusCode,
        response: Response,
        context: &ErrorContext,
    ) -> Result<Value, LookoutError> {
        let created = created_resource(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| self.transport_error(e, context))?;

        if text.trim().is_empty() {
            return Ok(match created {
                Some(resource) => resource,
                None if status == StatusCode::CREATED => json!({"id": null, "location": null}),
                None => Value::Null,
            });
        }

        tracing::trace!(correlation_id = %context.correlation_id, "Received response body");
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    fn transport_error(&self, error: reqwest::Error, context: &ErrorContext) -> LookoutError {
        let message = if error.is_timeout() {
            format!("request timed out after {:?}", self.pool.timeout())
        } else if error.is_connect() {
            "could not connect to the API".to_string()
        } else {
            self.sanitize(&format!("request failed: {}", error))
        };
        tracing::warn!(
            correlation_id = %context.correlation_id,
            endpoint = %context.endpoint,
            error = %message,
            "Transport error"
        );
        LookoutError::transient(message, None, context.clone())
    }

    /// Converts a non-success response into the matching error kind.
    async fn handle_http_error(
        &self,
        status: StatusCode,
        response: Response,
        context: &ErrorContext,
    ) -> LookoutError {
        let retry_after = retry_after(response.headers());
        let raw = response.text().await.unwrap_or_default();
        let parsed: Option<Value> = serde_json::from_str(&raw).ok();
        let body = truncate(&self.sanitize(&raw));
        let context = context.clone();

        match status {
            StatusCode::UNAUTHORIZED => LookoutError::unauthorized(
                "authentication failed",
                context.with_suggestion("verify the configured Help Scout credentials"),
            ),
            StatusCode::FORBIDDEN => LookoutError::unauthorized(
                "insufficient scope for this operation",
                context.with_suggestion("grant the application access to this resource"),
            ),
            StatusCode::NOT_FOUND => {
                let message = format!("{} does not exist", context.endpoint);
                LookoutError::not_found(message, context)
            }
            StatusCode::UNPROCESSABLE_ENTITY => LookoutError::InvalidInput {
                message: "validation failed".to_string(),
                field_errors: parsed.as_ref().map(field_errors).unwrap_or_default(),
                context,
            },
            StatusCode::TOO_MANY_REQUESTS => {
                tracing::warn!(
                    correlation_id = %context.correlation_id,
                    retry_after_secs = retry_after.map(|d| d.as_secs()),
                    "Rate limited by API"
                );
                LookoutError::RateLimited {
                    retry_after,
                    context,
                }
            }
            s if s.is_server_error() => {
                tracing::warn!(
                    correlation_id = %context.correlation_id,
                    status = %s,
                    "API temporarily unavailable"
                );
                LookoutError::transient(
                    format!("API returned {}", s.as_u16()),
                    Some(s.as_u16()),
                    context,
                )
            }
            s if s.is_client_error() => LookoutError::InvalidInput {
                message: format!("API returned {}: {}", s.as_u16(), body),
                field_errors: Vec::new(),
                context,
            },
            s => LookoutError::Upstream {
                message: format!("unexpected status {}", s.as_u16()),
                status: Some(s.as_u16()),
                transient: false,
                context,
            },
        }
    }

    fn sanitize(&self, message: &str) -> String {
        match self.secret() {
            Some(secret) => LookoutError::sanitize_message(message, secret),
            None => message.to_string(),
        }
    }

    fn ttl_for(&self, endpoint: &str) -> Option<Duration> {
        let path = endpoint.split('?').next().unwrap_or(endpoint);
        path.split('/').rev().find_map(|segment| {
            TTL_RULES
                .iter()
                .find(|(family, name, _)| *family == self.family && *name == segment)
                .map(|(_, _, secs)| Duration::from_secs(*secs))
        })
    }

    /// Current pool usage.
    pub fn pool_status(&self) -> PoolStatus {
        self.pool.status()
    }

    /// Closes idle connections. Returns the number released.
    pub fn evict_idle(&self) -> usize {
        self.pool.evict_idle()
    }

    /// Drains in-flight requests and closes the pool.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }

    /// Tests connectivity and credentials with a cheap, uncached read.
    ///
    /// # Errors
    ///
    /// Returns the error of the connectivity check, with a suggestion for the most
    /// likely misconfiguration.
    pub async fn test_connection(&self) -> Result<(), LookoutError> {
        let endpoint = match self.family {
            ApiFamily::Mailbox => "/mailboxes",
            ApiFamily::Docs => "/sites",
        };
        tracing::debug!(api = self.family.as_str(), "Testing API connection");

        let options = CacheOptions::new().bypass().with_ttl(Duration::ZERO);
        self.get::<Value>(endpoint, &json!({"page": 1}), options).await?;
        tracing::info!(api = self.family.as_str(), "Connection test successful");
        Ok(())
    }
}

/// Validates an identifier before it is interpolated into a URL path.
///
/// Help Scout ids are numeric (mailbox API) or hexadecimal (Docs API); only
/// ASCII alphanumerics, `-` and `_` are accepted.
///
/// # Errors
///
/// Returns `LookoutError::Validation` if the id is empty, too long or contains
/// other characters.
pub fn validate_id(id: &str, field_name: &str) -> Result<(), LookoutError> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if !valid {
        return Err(LookoutError::validation(format!(
            "{} must be an alphanumeric identifier, got: {:?}",
            field_name,
            id.chars().take(50).collect::<String>()
        )));
    }
    Ok(())
}

fn operation(method: &Method, endpoint: &str) -> String {
    format!("{} {}", method, endpoint)
}

fn decode<T>(value: Value, context: &ErrorContext) -> Result<T, LookoutError>
where
    T: DeserializeOwned,
{
    serde_json::from_value(value).map_err(|e| {
        LookoutError::unexpected_shape(
            format!("response did not have the expected shape: {}", e),
            context.clone(),
        )
    })
}

/// Flattens a params object into query pairs. Nulls are skipped, arrays are
/// comma-joined.
fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let Some(object) = params.as_object() else {
        return Vec::new();
    };

    object
        .iter()
        .filter_map(|(name, value)| {
            let rendered = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                Value::Array(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(","),
                other => other.to_string(),
            };
            Some((name.clone(), rendered))
        })
        .collect()
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn created_resource(headers: &HeaderMap) -> Option<Value> {
    let id = header_str(headers, "resource-id");
    let location = header_str(headers, "location");
    if id.is_none() && location.is_none() {
        return None;
    }
    Some(json!({"id": id, "location": location}))
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    ["retry-after", "x-ratelimit-retry-after"]
        .iter()
        .find_map(|name| header_str(headers, name))
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn field_errors(body: &Value) -> Vec<FieldError> {
    body.pointer("/_embedded/errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .map(|e| FieldError {
                    path: e.get("path").and_then(Value::as_str).unwrap_or("").to_string(),
                    message: e
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("invalid value")
                        .to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn truncate(body: &str) -> String {
    if body.chars().count() > MAX_ERROR_BODY_LEN {
        let head: String = body.chars().take(MAX_ERROR_BODY_LEN).collect();
        format!("{}...[truncated]", head)
    } else {
        body.to_string()
    }
}
