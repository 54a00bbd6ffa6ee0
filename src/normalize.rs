//! Response shape normalization.
//!
//! Listing endpoints wrap their payloads inconsistently. The Docs API sometimes
//! returns `{ items, page, pages, count }` directly and sometimes nests it under
//! a named field (`{ "collections": { items, ... } }`); the conversations API
//! uses HAL (`{ "_embedded": { "conversations": [...] }, "page": {...} }`).
//!
//! [`SHAPE_RULES`] maps an API family and the final path segment of an endpoint
//! to the rule that rewrites its payload into `{ items, page, pages, count }`.
//! Supporting a new upstream shape means adding a row to the table.

use serde_json::{json, Map, Value};

/// Which upstream API a client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFamily {
    /// Conversations, mailboxes, customers, reports.
    Mailbox,
    /// Docs knowledge base: sites, collections, categories, articles.
    Docs,
}

impl ApiFamily {
    /// Short name used in cache namespaces and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiFamily::Mailbox => "mailbox",
            ApiFamily::Docs => "docs",
        }
    }
}

/// How a listing payload is unwrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnwrapRule {
    /// `{ field: { items, page, pages, count } }`, `{ field: [...] }`, or already flat.
    Nested(&'static str),
    /// `{ _embedded: { field: [...] }, page: { number, totalPages, totalElements } }`.
    Embedded(&'static str),
}

/// One row of the normalization table.
#[derive(Debug, Clone, Copy)]
pub struct ShapeRule {
    /// API family the row applies to.
    pub family: ApiFamily,
    /// Final path segment of the endpoint (`/collections/1/articles` -> `articles`).
    pub segment: &'static str,
    /// Rule to apply.
    pub rule: UnwrapRule,
}

const fn docs(segment: &'static str) -> ShapeRule {
    ShapeRule {
        family: ApiFamily::Docs,
        segment,
        rule: UnwrapRule::Nested(segment),
    }
}

const fn hal(segment: &'static str) -> ShapeRule {
    ShapeRule {
        family: ApiFamily::Mailbox,
        segment,
        rule: UnwrapRule::Embedded(segment),
    }
}

/// Endpoint pattern to unwrap rule.
pub const SHAPE_RULES: &[ShapeRule] = &[
    docs("sites"),
    docs("collections"),
    docs("categories"),
    docs("articles"),
    docs("redirects"),
    hal("conversations"),
    hal("mailboxes"),
    hal("customers"),
    hal("users"),
    hal("teams"),
    hal("tags"),
    hal("threads"),
    hal("folders"),
    hal("workflows"),
    hal("fields"),
];

/// Returns the final path segment of an endpoint, ignoring any query string.
fn last_segment(endpoint: &str) -> &str {
    let path = endpoint.split('?').next().unwrap_or(endpoint);
    path.trim_end_matches('/').rsplit('/').next().unwrap_or("")
}

/// Looks up the unwrap rule for an endpoint.
pub fn rule_for(family: ApiFamily, endpoint: &str) -> Option<UnwrapRule> {
    let segment = last_segment(endpoint);
    SHAPE_RULES
        .iter()
        .find(|row| row.family == family && row.segment == segment)
        .map(|row| row.rule)
}

/// Rewrites a listing payload into `{ items, page, pages, count }`.
///
/// Payloads of endpoints without a rule, and payloads a rule does not
/// recognize, are returned unchanged.
pub fn normalize(family: ApiFamily, endpoint: &str, value: Value) -> Value {
    match rule_for(family, endpoint) {
        Some(UnwrapRule::Nested(field)) => unwrap_nested(field, value),
        Some(UnwrapRule::Embedded(field)) => unwrap_embedded(field, value),
        None => value,
    }
}

fn unwrap_nested(field: &str, mut value: Value) -> Value {
    let Some(object) = value.as_object_mut() else {
        return value;
    };

    match object.remove(field) {
        Some(Value::Object(inner)) if inner.contains_key("items") => with_page_defaults(inner),
        Some(Value::Array(items)) => page_of(items, None, None, None),
        Some(other) => {
            object.insert(field.to_string(), other);
            value
        }
        None if object.contains_key("items") => match value {
            Value::Object(flat) => with_page_defaults(flat),
            other => other,
        },
        None => value,
    }
}

fn unwrap_embedded(field: &str, value: Value) -> Value {
    let embedded = value.get("_embedded");
    let page = value.get("page");
    if embedded.is_none() && page.is_none() {
        return match value {
            Value::Object(flat) if flat.contains_key("items") => with_page_defaults(flat),
            other => other,
        };
    }

    let items = embedded
        .and_then(|e| e.get(field))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let number = page.and_then(|p| p.get("number")).and_then(Value::as_u64);
    let pages = page.and_then(|p| p.get("totalPages")).and_then(Value::as_u64);
    let count = page.and_then(|p| p.get("totalElements")).and_then(Value::as_u64);

    page_of(items, number, pages, count)
}

fn page_of(items: Vec<Value>, page: Option<u64>, pages: Option<u64>, count: Option<u64>) -> Value {
    let len = items.len() as u64;
    json!({
        "items": items,
        "page": page.unwrap_or(1),
        "pages": pages.unwrap_or(1),
        "count": count.unwrap_or(len),
    })
}

fn with_page_defaults(mut object: Map<String, Value>) -> Value {
    let len = object
        .get("items")
        .and_then(Value::as_array)
        .map_or(0, |items| items.len() as u64);
    object.entry("page").or_insert(json!(1));
    object.entry("pages").or_insert(json!(1));
    object.entry("count").or_insert(json!(len));
    Value::Object(object)
}
