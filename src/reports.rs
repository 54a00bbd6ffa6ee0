//! Reports response unwrapping.
//!
//! Analytics endpoints are inconsistent: the payload may sit under a `report`
//! field, arrive as the bare report object, arrive as a paginated listing, or
//! be replaced by a plain diagnostic string when the endpoint is not
//! available. [`unwrap_report`] turns all of these into the report value, and
//! separates "endpoint does not exist" from other unexpected answers.

use serde_json::Value;

use crate::error::{ErrorContext, LookoutError};

/// Diagnostic strings the upstream returns for endpoints it does not serve.
const UNKNOWN_ENDPOINT_MARKERS: &[&str] = &["unknown url", "unknown endpoint"];

/// Top-level fields that identify a bare report object.
const REPORT_FIELDS: &[&str] = &[
    "current",
    "previous",
    "deltas",
    "filterTags",
    "totalConversations",
    "conversationsCreated",
    "busiestDay",
    "busyTimes",
    "responseTime",
    "resolutionTime",
    "firstResponseTime",
    "handleTime",
    "happiness",
    "ratings",
    "stats",
];

/// Top-level fields that identify a paginated listing.
const LISTING_FIELDS: &[&str] = &["_embedded", "items", "results"];

/// How a report payload was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportShape {
    /// Payload nested under `report`.
    Wrapped,
    /// Bare report object.
    Bare,
    /// Paginated listing.
    Listing,
    /// Nothing recognized; passed through.
    Unknown,
}

/// Classifies an object-shaped report payload.
pub fn classify(raw: &Value) -> ReportShape {
    let Some(object) = raw.as_object() else {
        return ReportShape::Unknown;
    };
    if object.contains_key("report") {
        ReportShape::Wrapped
    } else if REPORT_FIELDS.iter().any(|f| object.contains_key(*f)) {
        ReportShape::Bare
    } else if LISTING_FIELDS.iter().any(|f| object.contains_key(*f)) {
        ReportShape::Listing
    } else {
        ReportShape::Unknown
    }
}

/// Extracts the report data from a raw upstream payload.
///
/// # Errors
///
/// - `NotFound` when the payload is a string carrying an unknown-endpoint marker
/// - `Upstream` when the payload is any other bare string
pub fn unwrap_report(raw: Value, context: &ErrorContext) -> Result<Value, LookoutError> {
    if let Value::String(text) = &raw {
        let lower = text.to_lowercase();
        if UNKNOWN_ENDPOINT_MARKERS.iter().any(|m| lower.contains(m)) {
            return Err(LookoutError::not_found(
                format!("report endpoint {} is not available", context.endpoint),
                context
                    .clone()
                    .with_suggestion("check the report type; this endpoint is not served upstream"),
            ));
        }
        return Err(LookoutError::unexpected_shape(
            format!(
                "report endpoint {} returned an unexpected text response",
                context.endpoint
            ),
            context.clone(),
        ));
    }

    let shape = classify(&raw);
    tracing::debug!(
        correlation_id = %context.correlation_id,
        endpoint = %context.endpoint,
        shape = ?shape,
        "Unwrapping report payload"
    );

    match (shape, raw) {
        (ReportShape::Wrapped, Value::Object(mut object)) => {
            Ok(object.remove("report").unwrap_or(Value::Null))
        }
        (_, raw) => Ok(raw),
    }
}
