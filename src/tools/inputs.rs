//! Tool input parameter structs for MCP tools.
//!
//! This module defines the input types for each MCP tool, with
//! JSON Schema derivation for MCP tool discovery.
//!
//! # Input Sanitization
//!
//! All input structs implement `sanitize()` which trims whitespace
//! from string fields. This should be called before processing input.

use rmcp::schemars::{self, JsonSchema};
use serde::Deserialize;

/// Conversation statuses accepted by the API.
pub const CONVERSATION_STATUSES: &[&str] = &["active", "pending", "closed", "spam"];

/// Helper function to trim an optional string.
fn trim_option(s: &Option<String>) -> Option<String> {
    s.as_ref().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Input parameters for the search_conversations tool.
///
/// All fields are optional - use them to narrow the results.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SearchConversationsInput {
    /// Search query in Help Scout syntax (e.g., `(subject:"refund")`, `email:"jo@example.com"`).
    #[serde(default)]
    pub query: Option<String>,

    /// Restrict to one mailbox ID.
    #[serde(default)]
    pub mailbox_id: Option<u64>,

    /// Status filter: "active", "pending", "closed", "spam" or "all" (default: "all").
    #[serde(default)]
    pub status: Option<String>,

    /// Only conversations carrying this tag.
    #[serde(default)]
    pub tag: Option<String>,

    /// Page number, starting at 1 (default: 1).
    #[serde(default)]
    pub page: Option<u32>,
}

impl SearchConversationsInput {
    /// Sanitizes input by trimming whitespace from all string fields.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            query: trim_option(&self.query),
            mailbox_id: self.mailbox_id,
            status: trim_option(&self.status).map(|s| s.to_lowercase()),
            tag: trim_option(&self.tag),
            page: self.page,
        }
    }
}

/// Input parameters for the get_conversation tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetConversationInput {
    /// The unique ID of the conversation to retrieve.
    pub conversation_id: String,

    /// Include the message threads (default: false).
    #[serde(default)]
    pub include_threads: bool,
}

impl GetConversationInput {
    /// Sanitizes input by trimming whitespace from all string fields.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            conversation_id: self.conversation_id.trim().to_string(),
            include_threads: self.include_threads,
        }
    }
}

/// Input parameters for the update_conversation tool.
///
/// Conversation ID is required. At least one other field must be provided.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateConversationInput {
    /// The unique ID of the conversation to update.
    pub conversation_id: String,

    /// New status: "active", "pending", "closed" or "spam".
    #[serde(default)]
    pub status: Option<String>,

    /// New subject line (max 255 characters).
    #[serde(default)]
    pub subject: Option<String>,

    /// User ID to assign the conversation to.
    #[serde(default)]
    pub assign_to: Option<u64>,

    /// Move the conversation to this mailbox ID.
    #[serde(default)]
    pub mailbox_id: Option<u64>,
}

impl UpdateConversationInput {
    /// Sanitizes input by trimming whitespace from all string fields.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            conversation_id: self.conversation_id.trim().to_string(),
            status: trim_option(&self.status).map(|s| s.to_lowercase()),
            subject: self.subject.map(|s| s.trim().to_string()),
            assign_to: self.assign_to,
            mailbox_id: self.mailbox_id,
        }
    }

    /// Returns true if at least one field is being changed.
    pub fn has_updates(&self) -> bool {
        self.status.is_some()
            || self.subject.is_some()
            || self.assign_to.is_some()
            || self.mailbox_id.is_some()
    }
}

/// Input parameters for the delete_conversation tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteConversationInput {
    /// The unique ID of the conversation to delete.
    pub conversation_id: String,
}

impl DeleteConversationInput {
    /// Sanitizes input by trimming whitespace from all string fields.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            conversation_id: self.conversation_id.trim().to_string(),
        }
    }
}

/// Input parameters for the list_mailboxes tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListMailboxesInput {
    /// Page number, starting at 1 (default: 1).
    #[serde(default)]
    pub page: Option<u32>,
}

/// Input parameters for the resolve_site tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResolveSiteInput {
    /// Free-text reference to a Docs site (e.g., "the Acme help center").
    pub query: String,
}

impl ResolveSiteInput {
    /// Sanitizes input by trimming whitespace from all string fields.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            query: self.query.trim().to_string(),
        }
    }
}

/// Input parameters for the resolve_collection tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ResolveCollectionInput {
    /// Free-text reference to a Docs collection (e.g., "billing docs").
    pub query: String,

    /// Only consider collections of this site ID.
    #[serde(default)]
    pub site_id: Option<String>,
}

impl ResolveCollectionInput {
    /// Sanitizes input by trimming whitespace from all string fields.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            query: self.query.trim().to_string(),
            site_id: trim_option(&self.site_id),
        }
    }
}

/// Input parameters for the list_articles tool.
///
/// Provide either a collection ID or a free-text collection reference.
/// Without either, the configured default collection is used.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListArticlesInput {
    /// Collection ID.
    #[serde(default)]
    pub collection_id: Option<String>,

    /// Free-text collection reference, resolved when no ID is given.
    #[serde(default)]
    pub collection: Option<String>,

    /// "published", "notpublished" or "all" (default: "all").
    #[serde(default)]
    pub status: Option<String>,

    /// Page number, starting at 1 (default: 1).
    #[serde(default)]
    pub page: Option<u32>,
}

impl ListArticlesInput {
    /// Sanitizes input by trimming whitespace from all string fields.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            collection_id: trim_option(&self.collection_id),
            collection: trim_option(&self.collection),
            status: trim_option(&self.status).map(|s| s.to_lowercase()),
            page: self.page,
        }
    }
}

/// Input parameters for the get_report tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetReportInput {
    /// Report path under /reports (e.g., "conversations", "happiness", "productivity/first-response-time").
    pub report: String,

    /// Start of the reporting window (ISO 8601, e.g. "2024-01-01T00:00:00Z").
    pub start: String,

    /// End of the reporting window (ISO 8601).
    pub end: String,

    /// Comma-separated mailbox IDs to restrict the report to.
    #[serde(default)]
    pub mailboxes: Option<String>,

    /// Comma-separated tag IDs to restrict the report to.
    #[serde(default)]
    pub tags: Option<String>,
}

impl GetReportInput {
    /// Sanitizes input by trimming whitespace and surrounding slashes.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            report: self.report.trim().trim_matches('/').to_string(),
            start: self.start.trim().to_string(),
            end: self.end.trim().to_string(),
            mailboxes: trim_option(&self.mailboxes),
            tags: trim_option(&self.tags),
        }
    }
}

/// Input parameters for the cache_clear tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct CacheClearInput {
    /// Namespace to clear (e.g., "mailbox:/conversations"). Clears everything when omitted.
    #[serde(default)]
    pub namespace: Option<String>,
}

impl CacheClearInput {
    /// Sanitizes input by trimming whitespace from all string fields.
    #[must_use]
    pub fn sanitize(self) -> Self {
        Self {
            namespace: trim_option(&self.namespace),
        }
    }
}

/// Input parameters for the connection_pool_status tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct PoolStatusInput {
    /// Close idle connections before reporting (default: false).
    #[serde(default)]
    pub evict_idle: bool,
}
