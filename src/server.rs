//! MCP server implementation for Lookout.
//!
//! This module defines the `LookoutServer` struct that implements the MCP
//! `ServerHandler` trait, exposing Help Scout operations as tools.
//!
//! Every tool answers with pretty-printed JSON. Failures are returned as a
//! JSON error payload carrying the error kind, the correlation id of the
//! failed call and, where one applies, a suggestion.

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api_client::{validate_id, CacheOptions};
use crate::context::AppContext;
use crate::error::LookoutError;
use crate::models::{ArticleRef, ConversationSummary, Mailbox, Page};
use crate::tools::{
    CacheClearInput, DeleteConversationInput, GetConversationInput, GetReportInput,
    ListArticlesInput, ListMailboxesInput, PoolStatusInput, ResolveCollectionInput,
    ResolveSiteInput, SearchConversationsInput, UpdateConversationInput, CONVERSATION_STATUSES,
};

/// Maximum subject length accepted by the API.
const MAX_SUBJECT_LEN: usize = 255;

/// The Lookout MCP server.
///
/// This server exposes Help Scout conversations, mailboxes, Docs and reports
/// as MCP tools.
#[derive(Clone)]
pub struct LookoutServer {
    /// Shared clients, cache and resolver.
    context: AppContext,
    /// Tool router for MCP tool dispatch.
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl LookoutServer {
    /// Creates a new Lookout server instance.
    pub fn new(context: AppContext) -> Self {
        Self {
            context,
            tool_router: Self::tool_router(),
        }
    }

    /// A simple ping tool to verify the server is running.
    #[tool(description = "Test connectivity to the Lookout MCP server. Returns 'pong' if the server is running correctly.")]
    fn ping(&self) -> String {
        tracing::debug!("ping tool called");
        "pong".to_string()
    }

    /// Search conversations with Help Scout query syntax and filters.
    #[tool(description = "Search Help Scout conversations. Supports Help Scout query syntax plus mailbox, status and tag filters. Returns a page of conversation summaries with id, number, subject, status, customer and tags.")]
    async fn search_conversations(
        &self,
        Parameters(input): Parameters<SearchConversationsInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        tracing::debug!(?input, "search_conversations tool called");

        let status = input.status.unwrap_or_else(|| "all".to_string());
        if status != "all" && !CONVERSATION_STATUSES.contains(&status.as_str()) {
            return Err(self.fail(
                "search_conversations",
                LookoutError::validation(format!(
                    "status must be one of {} or \"all\", got {:?}",
                    CONVERSATION_STATUSES.join(", "),
                    status
                )),
            ));
        }

        let params = json!({
            "query": input.query,
            "mailbox": input.mailbox_id,
            "status": status,
            "tag": input.tag,
            "page": input.page.unwrap_or(1).max(1),
        });

        let page: Page<ConversationSummary> = self
            .context
            .api
            .get("/conversations", &params, CacheOptions::new())
            .await
            .map_err(|e| self.fail("search_conversations", e))?;

        to_json(&page)
    }

    /// Get a single conversation, optionally with its threads.
    #[tool(description = "Get one Help Scout conversation by ID. Set include_threads to also return the message threads.")]
    async fn get_conversation(
        &self,
        Parameters(input): Parameters<GetConversationInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        tracing::debug!(conversation_id = %input.conversation_id, "get_conversation tool called");

        validate_id(&input.conversation_id, "conversation_id")
            .map_err(|e| self.fail("get_conversation", e))?;

        let endpoint = format!("/conversations/{}", urlencoding::encode(&input.conversation_id));
        let params = if input.include_threads {
            json!({ "embed": "threads" })
        } else {
            json!({})
        };

        let raw: Value = self
            .context
            .api
            .get(&endpoint, &params, CacheOptions::new())
            .await
            .map_err(|e| self.fail("get_conversation", e))?;

        let threads = raw.pointer("/_embedded/threads").cloned();
        let conversation: ConversationSummary = serde_json::from_value(raw)
            .map_err(|e| self.fail("get_conversation", LookoutError::from(e)))?;

        let mut output = json!({ "conversation": conversation });
        if input.include_threads {
            output["threads"] = threads.unwrap_or_else(|| json!([]));
        }
        to_json(&output)
    }

    /// Change status, subject, assignee or mailbox of a conversation.
    #[tool(description = "Update a Help Scout conversation: status, subject, assignee (user ID) or mailbox. Conversation ID and at least one field are required.")]
    async fn update_conversation(
        &self,
        Parameters(input): Parameters<UpdateConversationInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        tracing::debug!(conversation_id = %input.conversation_id, "update_conversation tool called");

        validate_id(&input.conversation_id, "conversation_id")
            .map_err(|e| self.fail("update_conversation", e))?;

        if !input.has_updates() {
            return Err(self.fail(
                "update_conversation",
                LookoutError::validation(
                    "at least one of status, subject, assign_to or mailbox_id must be provided",
                ),
            ));
        }
        let operations = patch_operations(&input).map_err(|e| self.fail("update_conversation", e))?;

        let endpoint = format!("/conversations/{}", urlencoding::encode(&input.conversation_id));
        let mut updated = Vec::with_capacity(operations.len());
        for (field, operation) in operations {
            self.context
                .api
                .patch::<Value>(&endpoint, &operation)
                .await
                .map_err(|e| self.fail("update_conversation", e))?;
            updated.push(field);
        }

        to_json(&json!({
            "conversation_id": input.conversation_id,
            "updated": updated,
        }))
    }

    /// Delete a conversation. Requires deletions to be enabled by the operator.
    #[tool(description = "Permanently delete a Help Scout conversation. Only works when the server was started with HELPSCOUT_ALLOW_DELETES=true.")]
    async fn delete_conversation(
        &self,
        Parameters(input): Parameters<DeleteConversationInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        tracing::debug!(conversation_id = %input.conversation_id, "delete_conversation tool called");

        validate_id(&input.conversation_id, "conversation_id")
            .map_err(|e| self.fail("delete_conversation", e))?;

        let endpoint = format!("/conversations/{}", urlencoding::encode(&input.conversation_id));
        self.context
            .api
            .delete(&endpoint)
            .await
            .map_err(|e| self.fail("delete_conversation", e))?;

        to_json(&json!({ "deleted": input.conversation_id }))
    }

    /// List mailboxes (shared inboxes).
    #[tool(description = "List Help Scout mailboxes. Returns mailbox IDs, names and addresses; use the ID to filter conversation searches.")]
    async fn list_mailboxes(
        &self,
        Parameters(input): Parameters<ListMailboxesInput>,
    ) -> Result<String, String> {
        tracing::debug!(?input, "list_mailboxes tool called");

        let params = json!({ "page": input.page.unwrap_or(1).max(1) });
        let page: Page<Mailbox> = self
            .context
            .api
            .get("/mailboxes", &params, CacheOptions::new())
            .await
            .map_err(|e| self.fail("list_mailboxes", e))?;

        to_json(&page)
    }

    /// Resolve a free-text reference to a Docs site.
    #[tool(description = "Find the Docs site a free-text reference points to (e.g. 'the Acme help center'). Returns the site, its public URL, a match score and the reason, or null when nothing matches.")]
    async fn resolve_site(
        &self,
        Parameters(input): Parameters<ResolveSiteInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        tracing::debug!(query = %input.query, "resolve_site tool called");

        let found = self
            .context
            .resolver
            .resolve_site(&input.query, self.context.defaults.site_id.as_deref())
            .await;
        let url = found.as_ref().and_then(|m| m.entity.public_url());

        to_json(&json!({ "match": found, "url": url }))
    }

    /// Resolve a free-text reference to a Docs collection.
    #[tool(description = "Find the Docs collection a free-text reference points to (e.g. 'billing docs'), optionally within one site. Returns the collection, a match score and the reason, or null when nothing matches.")]
    async fn resolve_collection(
        &self,
        Parameters(input): Parameters<ResolveCollectionInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        tracing::debug!(query = %input.query, site_id = ?input.site_id, "resolve_collection tool called");

        if let Some(site_id) = &input.site_id {
            validate_id(site_id, "site_id").map_err(|e| self.fail("resolve_collection", e))?;
        }

        let found = self
            .context
            .resolver
            .resolve_collection(
                &input.query,
                input.site_id.as_deref(),
                self.context.defaults.collection_id.as_deref(),
            )
            .await;

        to_json(&json!({ "match": found }))
    }

    /// List articles of a Docs collection.
    #[tool(description = "List articles in a Docs collection. Give a collection ID, or a free-text collection reference that is resolved first; without either the default collection is used.")]
    async fn list_articles(
        &self,
        Parameters(input): Parameters<ListArticlesInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        tracing::debug!(?input, "list_articles tool called");

        let (collection_id, justification) = self
            .collection_for(&input)
            .await
            .map_err(|e| self.fail("list_articles", e))?;

        let endpoint = format!("/collections/{}/articles", urlencoding::encode(&collection_id));
        let params = json!({
            "status": input.status.unwrap_or_else(|| "all".to_string()),
            "page": input.page.unwrap_or(1).max(1),
        });

        let articles: Page<ArticleRef> = self
            .context
            .docs
            .get(&endpoint, &params, CacheOptions::new())
            .await
            .map_err(|e| self.fail("list_articles", e))?;

        to_json(&json!({
            "collection_id": collection_id,
            "resolved_by": justification,
            "articles": articles,
        }))
    }

    /// Fetch an analytics report.
    #[tool(description = "Fetch a Help Scout report (e.g. 'conversations', 'happiness', 'productivity') for a time window. Start and end are ISO 8601 timestamps.")]
    async fn get_report(
        &self,
        Parameters(input): Parameters<GetReportInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        tracing::debug!(report = %input.report, "get_report tool called");

        for segment in input.report.split('/') {
            validate_id(segment, "report").map_err(|e| self.fail("get_report", e))?;
        }
        if input.start.is_empty() || input.end.is_empty() {
            return Err(self.fail(
                "get_report",
                LookoutError::validation("start and end are required"),
            ));
        }

        let endpoint = format!("/reports/{}", input.report);
        let params = json!({
            "start": input.start,
            "end": input.end,
            "mailboxes": input.mailboxes,
            "tags": input.tags,
        });

        let report: Value = self
            .context
            .api
            .get_report(&endpoint, &params, CacheOptions::new())
            .await
            .map_err(|e| self.fail("get_report", e))?;

        to_json(&report)
    }

    /// Clear cached responses.
    #[tool(description = "Clear cached API responses, either everything or one namespace such as 'mailbox:/conversations'. Clearing everything also reloads the Docs directory on next use.")]
    async fn cache_clear(
        &self,
        Parameters(input): Parameters<CacheClearInput>,
    ) -> Result<String, String> {
        let input = input.sanitize();
        tracing::debug!(namespace = ?input.namespace, "cache_clear tool called");

        let removed = self.context.cache.clear(input.namespace.as_deref());
        if input.namespace.is_none() {
            self.context.resolver.invalidate();
        }
        tracing::info!(removed = removed, namespace = ?input.namespace, "Cache cleared");

        to_json(&json!({
            "removed": removed,
            "namespace": input.namespace,
            "stats": self.context.cache.stats(),
        }))
    }

    /// Report connection pool and cache usage.
    #[tool(description = "Show connection pool usage (open, idle, pending) for both Help Scout APIs plus cache statistics. Set evict_idle to close idle connections first.")]
    async fn connection_pool_status(
        &self,
        Parameters(input): Parameters<PoolStatusInput>,
    ) -> Result<String, String> {
        tracing::debug!(?input, "connection_pool_status tool called");

        let evicted = if input.evict_idle {
            self.context.api.evict_idle() + self.context.docs.evict_idle()
        } else {
            0
        };

        to_json(&json!({
            "api": self.context.api.pool_status(),
            "docs": self.context.docs.pool_status(),
            "evicted": evicted,
            "cache": self.context.cache.stats(),
        }))
    }

    /// Picks the collection for list_articles: explicit ID, resolved reference, then default.
    async fn collection_for(
        &self,
        input: &ListArticlesInput,
    ) -> Result<(String, Option<String>), LookoutError> {
        if let Some(id) = &input.collection_id {
            validate_id(id, "collection_id")?;
            return Ok((id.clone(), None));
        }

        let default = self.context.defaults.collection_id.as_deref();
        if let Some(reference) = &input.collection {
            return match self
                .context
                .resolver
                .resolve_collection(reference, None, default)
                .await
            {
                Some(found) => Ok((found.entity.id, Some(found.justification))),
                None => Err(LookoutError::validation(format!(
                    "no collection matches {:?}; use resolve_collection to inspect candidates",
                    reference
                ))),
            };
        }

        match default {
            Some(id) => Ok((id.to_string(), Some("Default collection".to_string()))),
            None => Err(LookoutError::validation(
                "collection_id or collection is required when no default collection is configured",
            )),
        }
    }

    /// Logs a tool failure and renders the sanitized error payload.
    fn fail(&self, tool: &str, error: LookoutError) -> String {
        let secrets = self.context.secrets();
        let payload = error.to_payload(&secrets);
        tracing::error!(
            tool = tool,
            kind = error.kind().as_str(),
            correlation_id = payload["correlation_id"].as_str().unwrap_or("-"),
            error = %payload["message"].as_str().unwrap_or_default(),
            "Tool call failed"
        );
        serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
    }
}

#[tool_handler]
impl ServerHandler for LookoutServer {
    /// Returns server information for the MCP initialize handshake.
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Lookout provides access to Help Scout. \
                 Use search_conversations to find conversations, get_conversation for details, \
                 update_conversation to change status or assignee, and list_mailboxes to see inboxes. \
                 For the Docs knowledge base, resolve_site and resolve_collection turn free-text \
                 references into IDs, and list_articles lists a collection's articles. \
                 get_report fetches analytics. cache_clear and connection_pool_status help with \
                 troubleshooting. Start with 'ping' to verify connectivity."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Builds one JSON Patch operation per changed field.
fn patch_operations(input: &UpdateConversationInput) -> Result<Vec<(&'static str, Value)>, LookoutError> {
    let mut operations = Vec::new();

    if let Some(status) = &input.status {
        if !CONVERSATION_STATUSES.contains(&status.as_str()) {
            return Err(LookoutError::validation(format!(
                "status must be one of {}, got {:?}",
                CONVERSATION_STATUSES.join(", "),
                status
            )));
        }
        operations.push(("status", replace("/status", json!(status))));
    }
    if let Some(subject) = &input.subject {
        if subject.is_empty() {
            return Err(LookoutError::validation("subject cannot be empty"));
        }
        if subject.chars().count() > MAX_SUBJECT_LEN {
            return Err(LookoutError::validation(format!(
                "subject exceeds maximum length of {} characters (got {})",
                MAX_SUBJECT_LEN,
                subject.chars().count()
            )));
        }
        operations.push(("subject", replace("/subject", json!(subject))));
    }
    if let Some(user_id) = input.assign_to {
        operations.push(("assign_to", replace("/assignTo", json!(user_id))));
    }
    if let Some(mailbox_id) = input.mailbox_id {
        operations.push(("mailbox_id", replace("/mailboxId", json!(mailbox_id))));
    }

    Ok(operations)
}

fn replace(path: &str, value: Value) -> Value {
    json!({ "op": "replace", "path": path, "value": value })
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("Failed to render response: {}", e))
}
