//! Types shared across API models.

use serde::{Deserialize, Serialize};

/// A normalized listing page.
///
/// Every listing endpoint is rewritten into this shape before it reaches the
/// caller, whatever wrapper the upstream used (see [`crate::normalize`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Entities on this page.
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,

    /// 1-based page number.
    #[serde(default = "first_page")]
    pub page: u32,

    /// Total number of pages.
    #[serde(default = "first_page")]
    pub pages: u32,

    /// Total number of entities across all pages.
    #[serde(default)]
    pub count: u64,
}

fn first_page() -> u32 {
    1
}

impl<T> Page<T> {
    /// Returns true if a later page exists.
    pub fn has_more(&self) -> bool {
        self.page < self.pages
    }

    /// Maps the items while keeping the pagination metadata.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            pages: self.pages,
            count: self.count,
        }
    }
}

/// Identity of a resource created by a POST that returned no body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedResource {
    /// Value of the `Resource-ID` header.
    #[serde(default)]
    pub id: Option<String>,

    /// Value of the `Location` header.
    #[serde(default)]
    pub location: Option<String>,
}
