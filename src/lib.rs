//! # Lookout
//!
//! Lookout is an MCP (Model Context Protocol) server for Help Scout.
//!
//! It exposes conversations, mailboxes, the Docs knowledge base and analytics
//! reports as MCP tools, so an assistant can work a support queue through
//! natural language.
//!
//! ## Features
//!
//! - **Conversations**: search, view, update and (when enabled) delete
//! - **Docs**: resolve free-text site and collection references, list articles
//! - **Reports**: fetch analytics with tolerant response unwrapping
//! - **Resilience**: bounded retries with exponential backoff, jitter and
//!   `Retry-After` handling, OAuth2 token refresh, bounded connection pools
//! - **Caching**: TTL + LRU response cache with per-endpoint invalidation
//! - **Security**: credentials are never logged or exposed in error messages
//!
//! ## Architecture
//!
//! - [`config`] - Configuration loading from environment variables
//! - [`error`] - Error kinds, call diagnostics and message sanitization
//! - [`cache`] - Response cache keyed by a digest of namespace and params
//! - [`auth`] - OAuth2 client credentials, personal tokens and API keys
//! - [`retry`] - Retry engine with backoff and jitter
//! - [`pool`] - Bounded connection pool with introspection
//! - [`normalize`] - Listing shape normalization table
//! - [`reports`] - Report payload unwrapping
//! - [`api_client`] - HTTP client tying the above together
//! - [`resolver`] - Fuzzy site/collection resolution
//! - [`context`] - Process-wide wiring
//! - [`server`] - MCP server implementation with tool routing
//! - [`models`] - Data models for API responses
//! - [`tools`] - Tool input parameter structs
//!
//! ## Usage
//!
//! ```bash
//! # OAuth2 application credentials (or HELPSCOUT_API_TOKEN)
//! export HELPSCOUT_APP_ID=...
//! export HELPSCOUT_APP_SECRET=...
//! # Docs API key for the knowledge base tools
//! export HELPSCOUT_DOCS_API_KEY=...
//!
//! ./lookout
//! ```
//!
//! Optional:
//! - `HELPSCOUT_ALLOW_DELETES`: enable destructive tools (default `false`)
//! - `RUST_LOG`: Log level (e.g., `lookout=debug`)
//!
//! ## Example
//!
//! Using the [`ApiClient`](api_client::ApiClient) directly:
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use lookout::api_client::{ApiClient, CacheOptions};
//! use lookout::cache::ResponseCache;
//! use lookout::config::Config;
//! use lookout::models::{Mailbox, Page};
//!
//! async fn example() -> Result<(), lookout::error::LookoutError> {
//!     let config = Config::from_env()?;
//!     let cache = Arc::new(ResponseCache::new(&config.cache));
//!     let client = ApiClient::mailbox(&config, cache)?;
//!
//!     let mailboxes: Page<Mailbox> = client
//!         .get("/mailboxes", &serde_json::json!({}), CacheOptions::new())
//!         .await?;
//!     for mailbox in mailboxes.items {
//!         println!("{}: {}", mailbox.id, mailbox.name);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod api_client;
pub mod auth;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pool;
pub mod reports;
pub mod resolver;
pub mod retry;
pub mod server;
pub mod tools;
