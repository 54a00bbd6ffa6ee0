//! Credential handling for outbound calls.
//!
//! The conversations API accepts either an OAuth2 client-credentials pair,
//! exchanged for a bearer token that is refreshed before it expires, or a
//! static personal access token. The Docs API uses its API key as the basic
//! auth username.
//!
//! With no credential configured every call fails with `Unauthorized` before
//! anything is sent.
//!
//! # Security
//!
//! Tokens and secrets are never logged.

use std::sync::RwLock;
use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::time::Instant;

use crate::error::{ErrorContext, LookoutError};

/// Tokens this close to expiry are refreshed instead of reused.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Configured credential for one upstream API.
#[derive(Clone)]
pub enum Credentials {
    /// OAuth2 client-credentials pair, exchanged at `token_url`.
    ClientCredentials {
        /// Token endpoint.
        token_url: String,
        /// Application id.
        client_id: String,
        /// Application secret.
        client_secret: String,
    },
    /// Static bearer token without refresh.
    PersonalToken(String),
    /// API key sent as the basic auth username.
    ApiKey(String),
    /// Nothing configured.
    None,
}

/// A bearer token and its expiry.
#[derive(Clone)]
pub struct AuthToken {
    /// The token value.
    pub bearer: String,
    /// Expiry instant; `None` for tokens that never expire.
    pub expires_at: Option<Instant>,
}

impl AuthToken {
    /// Returns true if the token can be sent without refreshing first.
    pub fn is_fresh(&self) -> bool {
        self.expires_at
            .map_or(true, |expires_at| Instant::now() + REFRESH_MARGIN < expires_at)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Resolves credentials into request authentication, refreshing tokens as needed.
pub struct AuthManager {
    credentials: Credentials,
    token: RwLock<Option<AuthToken>>,
}

impl AuthManager {
    /// Creates a manager for the given credentials.
    pub fn new(credentials: Credentials) -> Self {
        let token = match &credentials {
            Credentials::PersonalToken(bearer) => Some(AuthToken {
                bearer: bearer.clone(),
                expires_at: None,
            }),
            _ => None,
        };

        Self {
            credentials,
            token: RwLock::new(token),
        }
    }

    /// Returns true if any credential is configured.
    pub fn is_configured(&self) -> bool {
        !matches!(self.credentials, Credentials::None)
    }

    /// Returns true if a rejected token can be replaced by a fresh one.
    pub fn can_refresh(&self) -> bool {
        matches!(self.credentials, Credentials::ClientCredentials { .. })
    }

    /// The secret to strip from any message derived from this credential.
    pub fn secret(&self) -> Option<&str> {
        match &self.credentials {
            Credentials::ClientCredentials { client_secret, .. } => Some(client_secret),
            Credentials::PersonalToken(token) => Some(token),
            Credentials::ApiKey(key) => Some(key),
            Credentials::None => None,
        }
    }

    /// Fails fast when nothing is configured.
    pub fn ensure_configured(&self, context: &ErrorContext) -> Result<(), LookoutError> {
        if self.is_configured() {
            Ok(())
        } else {
            Err(LookoutError::missing_credentials(context.clone()))
        }
    }

    /// Adds authentication to a request, obtaining a token first if needed.
    pub async fn authorize(
        &self,
        http: &Client,
        request: RequestBuilder,
        context: &ErrorContext,
    ) -> Result<RequestBuilder, LookoutError> {
        match &self.credentials {
            Credentials::None => Err(LookoutError::missing_credentials(context.clone())),
            Credentials::ApiKey(key) => Ok(request.basic_auth(key, Some("X"))),
            Credentials::PersonalToken(token) => Ok(request.bearer_auth(token)),
            Credentials::ClientCredentials { .. } => {
                let bearer = self.bearer(http, context).await?;
                Ok(request.bearer_auth(bearer))
            }
        }
    }

    /// Drops the cached token so the next call fetches a new one.
    pub fn invalidate(&self) {
        if !self.can_refresh() {
            return;
        }
        if let Ok(mut token) = self.token.write() {
            *token = None;
        }
    }

    fn cached(&self) -> Option<AuthToken> {
        let token = self.token.read().ok()?;
        token.as_ref().filter(|t| t.is_fresh()).cloned()
    }

    async fn bearer(&self, http: &Client, context: &ErrorContext) -> Result<String, LookoutError> {
        if let Some(token) = self.cached() {
            return Ok(token.bearer);
        }

        // Concurrent callers may both refresh here; the last stored token wins.
        let token = self.fetch_token(http, context).await?;
        let bearer = token.bearer.clone();
        if let Ok(mut slot) = self.token.write() {
            *slot = Some(token);
        }
        Ok(bearer)
    }

    async fn fetch_token(
        &self,
        http: &Client,
        context: &ErrorContext,
    ) -> Result<AuthToken, LookoutError> {
        let Credentials::ClientCredentials {
            token_url,
            client_id,
            client_secret,
        } = &self.credentials
        else {
            return Err(LookoutError::missing_credentials(context.clone()));
        };

        tracing::debug!(
            correlation_id = %context.correlation_id,
            "Requesting OAuth2 access token"
        );

        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];

        let response = http.post(token_url).form(&form).send().await.map_err(|e| {
            let message = if e.is_timeout() {
                "token request timed out".to_string()
            } else {
                LookoutError::sanitize_message(&format!("token request failed: {}", e), client_secret)
            };
            LookoutError::transient(message, None, context.clone())
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    LookoutError::unauthorized(
                        format!("OAuth2 client credentials were rejected ({})", status.as_u16()),
                        context
                            .clone()
                            .with_suggestion("verify HELPSCOUT_APP_ID and HELPSCOUT_APP_SECRET"),
                    )
                }
                StatusCode::TOO_MANY_REQUESTS => LookoutError::RateLimited {
                    retry_after: None,
                    context: context.clone(),
                },
                s if s.is_server_error() => LookoutError::transient(
                    format!("token endpoint returned {}", s.as_u16()),
                    Some(s.as_u16()),
                    context.clone(),
                ),
                s => LookoutError::unauthorized(
                    format!("token endpoint returned {}", s.as_u16()),
                    context.clone(),
                ),
            });
        }

        let payload: TokenResponse = response.json().await.map_err(|_| {
            LookoutError::unexpected_shape("OAuth2 token response was not valid JSON", context.clone())
        })?;

        if payload.access_token.is_empty() {
            return Err(LookoutError::unauthorized(
                "OAuth2 token response did not contain an access token",
                context.clone(),
            ));
        }

        tracing::info!(
            correlation_id = %context.correlation_id,
            expires_in = payload.expires_in,
            "Obtained OAuth2 access token"
        );

        Ok(AuthToken {
            bearer: payload.access_token,
            expires_at: payload
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx() -> ErrorContext {
        ErrorContext::new("GET", "/mailboxes")
    }

    fn oauth(server: &MockServer) -> AuthManager {
        AuthManager::new(Credentials::ClientCredentials {
            token_url: format!("{}/oauth2/token", server.uri()),
            client_id: "app-id".to_string(),
            client_secret: "app-secret".to_string(),
        })
    }

    #[test]
    fn test_token_without_expiry_is_fresh() {
        let token = AuthToken {
            bearer: "t".to_string(),
            expires_at: None,
        };
        assert!(token.is_fresh());
    }

    #[tokio::test]
    async fn test_token_inside_refresh_margin_is_not_fresh() {
        let token = AuthToken {
            bearer: "t".to_string(),
            expires_at: Some(Instant::now() + Duration::from_secs(30)),
        };
        assert!(!token.is_fresh());
    }

    #[test]
    fn test_missing_credentials_fail_fast() {
        let auth = AuthManager::new(Credentials::None);
        let err = auth.ensure_configured(&ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(err.context().unwrap().suggestion.is_some());
    }

    #[tokio::test]
    async fn test_client_credentials_token_is_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "bearer",
                "access_token": "fresh-token",
                "expires_in": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = oauth(&server);
        let http = Client::new();
        for _ in 0..3 {
            let request = auth
                .authorize(&http, http.get(server.uri()), &ctx())
                .await
                .unwrap()
                .build()
                .unwrap();
            assert_eq!(
                request.headers()["authorization"].to_str().unwrap(),
                "Bearer fresh-token"
            );
        }
    }

    #[tokio::test]
    async fn test_short_lived_token_is_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "short",
                "expires_in": 30
            })))
            .expect(2)
            .mount(&server)
            .await;

        let auth = oauth(&server);
        let http = Client::new();
        auth.authorize(&http, http.get(server.uri()), &ctx()).await.unwrap();
        auth.authorize(&http, http.get(server.uri()), &ctx()).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok",
                "expires_in": 7200
            })))
            .expect(2)
            .mount(&server)
            .await;

        let auth = oauth(&server);
        let http = Client::new();
        auth.authorize(&http, http.get(server.uri()), &ctx()).await.unwrap();
        auth.invalidate();
        auth.authorize(&http, http.get(server.uri()), &ctx()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_credentials_are_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let auth = oauth(&server);
        let http = Client::new();
        let err = auth
            .authorize(&http, http.get(server.uri()), &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(!err.to_string().contains("app-secret"));
    }

    #[test]
    fn test_api_key_uses_basic_auth() {
        let auth = AuthManager::new(Credentials::ApiKey("docs-key".to_string()));
        let http = Client::new();
        let request = tokio_test::block_on(auth.authorize(&http, http.get("http://localhost"), &ctx()))
            .unwrap()
            .build()
            .unwrap();
        let header = request.headers()["authorization"].to_str().unwrap();
        assert!(header.starts_with("Basic "));
    }
}
