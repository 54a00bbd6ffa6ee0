//! Docs knowledge base models.
//!
//! Sites and collections form the directory the entity resolver matches
//! natural-language references against.

use serde::{Deserialize, Serialize};

/// A Docs site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    /// Unique site ID.
    pub id: String,

    /// Display name of the site.
    #[serde(default, alias = "name")]
    pub title: String,

    /// Subdomain under the Docs host (e.g. `acme` for acme.helpscoutdocs.com).
    #[serde(default)]
    pub sub_domain: Option<String>,

    /// Custom domain, if one is configured.
    #[serde(default)]
    pub cname: Option<String>,

    /// Publication status (`active`, `inactive`).
    #[serde(default)]
    pub status: Option<String>,
}

impl Site {
    /// Public URL of the site, preferring the custom domain.
    pub fn public_url(&self) -> Option<String> {
        self.cname
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|c| format!("https://{}", c))
            .or_else(|| {
                self.sub_domain
                    .as_deref()
                    .map(|s| format!("https://{}.helpscoutdocs.com", s))
            })
    }
}

/// A collection of articles within a site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Unique collection ID.
    pub id: String,

    /// ID of the owning site.
    #[serde(default)]
    pub site_id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// URL slug.
    #[serde(default)]
    pub slug: Option<String>,

    /// `public` or `private`.
    #[serde(default)]
    pub visibility: Option<String>,

    /// Number of articles in the collection.
    #[serde(default)]
    pub article_count: Option<u64>,
}

/// Article reference as returned by listing endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleRef {
    /// Unique article ID.
    pub id: String,

    /// Article title.
    #[serde(default, alias = "title")]
    pub name: String,

    /// Owning collection.
    #[serde(default)]
    pub collection_id: Option<String>,

    /// `published` or `notpublished`.
    #[serde(default)]
    pub status: Option<String>,

    /// Public URL.
    #[serde(default)]
    pub public_url: Option<String>,

    /// Last update timestamp (ISO 8601).
    #[serde(default)]
    pub updated_at: Option<String>,
}
