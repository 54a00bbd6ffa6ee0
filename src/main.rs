//! Lookout - MCP server for Help Scout
//!
//! This binary runs as an MCP server using stdio transport, allowing an MCP
//! client to work with Help Scout conversations, Docs and reports through
//! natural language.
//!
//! # Configuration
//!
//! Set the following environment variables (or use a `.env` file):
//!
//! - `HELPSCOUT_APP_ID` / `HELPSCOUT_APP_SECRET`: OAuth2 application credentials
//! - `HELPSCOUT_API_TOKEN`: personal access token, used when no OAuth2 pair is set
//! - `HELPSCOUT_DOCS_API_KEY`: Docs API key
//!
//! # Usage
//!
//! ```bash
//! HELPSCOUT_API_TOKEN=... HELPSCOUT_DOCS_API_KEY=... ./lookout
//! ```

use anyhow::{Context, Result};
use rmcp::{transport::stdio, ServiceExt};
use tracing_subscriber::{fmt, EnvFilter};

use lookout::{config, context, server};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (ignore errors if not found)
    dotenvy::dotenv().ok();

    // stdout is reserved for MCP JSON-RPC messages
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lookout=info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting Lookout MCP server v{}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::from_env().context("Failed to load configuration")?;

    tracing::debug!(
        base_url = %config.base_url,
        docs_base_url = %config.docs_base_url,
        allow_deletes = config.allow_deletes,
        "Configuration loaded"
    );

    let context =
        context::AppContext::from_config(&config).context("Failed to create API clients")?;

    for (name, client) in [("Help Scout API", &context.api), ("Docs API", &context.docs)] {
        let api = client.family().as_str();
        if !client.is_configured() {
            tracing::warn!(api = api, "No credentials configured for the {}; its tools will fail", name);
            continue;
        }
        tracing::info!(api = api, "Testing connection to the {}...", name);
        if let Err(e) = client.test_connection().await {
            let message = e.sanitized_display(&context.secrets());
            tracing::error!(api = api, error = %message, "Connection test failed");
            // Continue anyway - the API might become reachable later
            tracing::warn!(
                "Server will start but may not be able to reach the {}. \
                 Check configuration and network connectivity.",
                name
            );
        }
    }

    let server = server::LookoutServer::new(context.clone());

    tracing::info!("Server initialized, starting stdio transport");

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("serving error: {:?}", e);
        })
        .context("Failed to start server")?;

    tracing::info!("Server running, waiting for requests");

    service
        .waiting()
        .await
        .context("Server error during operation")?;

    tracing::info!("Server shutting down");
    context.shutdown().await;

    Ok(())
}
