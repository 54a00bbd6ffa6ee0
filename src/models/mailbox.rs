//! Conversation and mailbox models.
//!
//! Tools return these trimmed summaries instead of the full upstream
//! payloads, which carry many fields a caller never needs.

use serde::{Deserialize, Serialize};

/// A shared inbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mailbox {
    /// Unique mailbox ID.
    pub id: u64,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Inbound email address.
    #[serde(default)]
    pub email: Option<String>,

    /// URL slug.
    #[serde(default)]
    pub slug: Option<String>,
}

/// A person referenced by a conversation (customer or assignee).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    /// Unique ID.
    #[serde(default)]
    pub id: Option<u64>,

    /// Email address.
    #[serde(default)]
    pub email: Option<String>,

    /// First name.
    #[serde(default)]
    pub first: Option<String>,

    /// Last name.
    #[serde(default)]
    pub last: Option<String>,
}

impl Person {
    /// Returns "First Last", falling back to the email.
    pub fn display_name(&self) -> Option<String> {
        match (self.first.as_deref(), self.last.as_deref()) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(name), None) | (None, Some(name)) => Some(name.to_string()),
            (None, None) => self.email.clone(),
        }
    }
}

/// Conversation summary used in listings and detail views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Unique conversation ID.
    pub id: u64,

    /// Human-facing conversation number.
    #[serde(default)]
    pub number: Option<u64>,

    /// Subject line.
    #[serde(default)]
    pub subject: Option<String>,

    /// `active`, `pending`, `closed` or `spam`.
    #[serde(default)]
    pub status: Option<String>,

    /// Owning mailbox.
    #[serde(default)]
    pub mailbox_id: Option<u64>,

    /// First lines of the latest thread.
    #[serde(default)]
    pub preview: Option<String>,

    /// Customer the conversation is with.
    #[serde(default)]
    pub primary_customer: Option<Person>,

    /// Assigned user.
    #[serde(default)]
    pub assignee: Option<Person>,

    /// Tags applied to the conversation.
    #[serde(default, deserialize_with = "tag_names")]
    pub tags: Vec<String>,

    /// Creation timestamp (ISO 8601).
    #[serde(default)]
    pub created_at: Option<String>,

    /// Last customer or user activity (ISO 8601).
    #[serde(default)]
    pub user_updated_at: Option<String>,
}

/// Accepts tags either as plain strings or as `{ "tag": "name" }` objects.
fn tag_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Vec<serde_json::Value> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|tag| match tag {
            serde_json::Value::String(name) => Some(name),
            serde_json::Value::Object(mut fields) => match fields.remove("tag") {
                Some(serde_json::Value::String(name)) => Some(name),
                _ => None,
            },
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_summary_drops_unknown_fields() {
        let conversation: ConversationSummary = serde_json::from_value(json!({
            "id": 10,
            "number": 1234,
            "subject": "Refund request",
            "status": "active",
            "mailboxId": 3,
            "primaryCustomer": {"id": 5, "email": "jo@example.com", "first": "Jo"},
            "tags": [{"id": 1, "tag": "billing"}, "vip"],
            "_links": {"self": {"href": "https://api.example.com"}}
        }))
        .unwrap();
        assert_eq!(conversation.tags, vec!["billing", "vip"]);
        assert_eq!(
            conversation.primary_customer.unwrap().display_name().as_deref(),
            Some("Jo")
        );
    }

    #[test]
    fn test_person_display_name_falls_back_to_email() {
        let person = Person {
            id: None,
            email: Some("a@b.c".to_string()),
            first: None,
            last: None,
        };
        assert_eq!(person.display_name().as_deref(), Some("a@b.c"));
    }
}
