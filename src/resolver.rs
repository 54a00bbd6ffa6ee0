//! Natural-language resolution of Docs sites and collections.
//!
//! Callers refer to knowledge bases loosely ("the billing docs", "acme help
//! center"). The resolver keeps a snapshot of every site and, per site, every
//! collection, and scores each candidate against the input. The first
//! applicable rule decides a candidate's score:
//!
//! | Rule | Sites | Collections |
//! |------|-------|-------------|
//! | own name appears in the input | 100 | 100 |
//! | owning site's name appears | - | 80 |
//! | subdomain appears | 80 | 70 |
//! | custom domain appears | 70 | - |
//! | slug appears | - | 60 |
//! | word overlap | matched / total * 50 | matched / total * 50 |
//!
//! The configured default gains 10 points when it matches at all, and is the
//! fallback (score 10) when nothing matches.
//!
//! Word overlap counts entity words (longer than two characters) that share a
//! substring relation with any input word, in either direction, so "billings"
//! matches "Billing" and "globexcorp" matches "Globex".
//!
//! Snapshots are reloaded only when older than the freshness window. Reloads
//! skip the response cache. A failed reload is logged and the previous
//! snapshot stays in use.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tokio::time::Instant;

use crate::api_client::{ApiClient, CacheOptions};
use crate::error::LookoutError;
use crate::models::{Collection, Page, Site};

/// Pages fetched per directory listing before giving up.
const MAX_DIRECTORY_PAGES: u32 = 50;

/// Score given to the default when nothing else matches.
const DEFAULT_FALLBACK_SCORE: f64 = 10.0;

/// Bonus for a matching candidate that is also the configured default.
const DEFAULT_BONUS: f64 = 10.0;

/// Entity words this short are ignored by the overlap rule.
const MIN_WORD_LEN: usize = 3;

/// Key of the all-sites collection snapshot.
const ALL_SITES: &str = "*";

/// Where directory snapshots are loaded from.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Every site.
    async fn list_sites(&self) -> Result<Vec<Site>, LookoutError>;

    /// Every collection of one site, or of all sites.
    async fn list_collections(&self, site_id: Option<&str>) -> Result<Vec<Collection>, LookoutError>;
}

#[async_trait]
impl DirectorySource for ApiClient {
    async fn list_sites(&self) -> Result<Vec<Site>, LookoutError> {
        let mut sites = Vec::new();
        for page in 1..=MAX_DIRECTORY_PAGES {
            let listing: Page<Site> = self
                .get("/sites", &json!({ "page": page }), CacheOptions::new().bypass())
                .await?;
            let more = listing.has_more();
            sites.extend(listing.items);
            if !more {
                break;
            }
        }
        Ok(sites)
    }

    async fn list_collections(&self, site_id: Option<&str>) -> Result<Vec<Collection>, LookoutError> {
        let mut collections = Vec::new();
        for page in 1..=MAX_DIRECTORY_PAGES {
            let params = json!({ "siteId": site_id, "page": page });
            let listing: Page<Collection> =
                self.get("/collections", &params, CacheOptions::new().bypass()).await?;
            let more = listing.has_more();
            collections.extend(listing.items);
            if !more {
                break;
            }
        }
        Ok(collections)
    }
}

/// A resolved entity with the reason it was chosen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult<T> {
    /// The chosen entity.
    pub entity: T,
    /// Match strength; higher is better.
    pub score: f64,
    /// Human-readable reason.
    pub justification: String,
}

struct Snapshot<T> {
    entries: Vec<T>,
    loaded_at: Instant,
}

impl<T> Snapshot<T> {
    fn new(entries: Vec<T>) -> Self {
        Self {
            entries,
            loaded_at: Instant::now(),
        }
    }

    fn is_fresh(&self, window: Duration) -> bool {
        self.loaded_at.elapsed() < window
    }
}

/// Fuzzy resolver over the Docs directory.
pub struct EntityResolver {
    source: Arc<dyn DirectorySource>,
    freshness: Duration,
    sites: RwLock<Option<Arc<Snapshot<Site>>>>,
    collections: RwLock<HashMap<String, Arc<Snapshot<Collection>>>>,
}

impl EntityResolver {
    /// Creates a resolver that reloads snapshots older than `freshness`.
    pub fn new(source: Arc<dyn DirectorySource>, freshness: Duration) -> Self {
        Self {
            source,
            freshness,
            sites: RwLock::new(None),
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Drops every snapshot so the next resolution reloads.
    pub fn invalidate(&self) {
        if let Ok(mut sites) = self.sites.write() {
            *sites = None;
        }
        if let Ok(mut collections) = self.collections.write() {
            collections.clear();
        }
    }

    /// Resolves a site reference.
    ///
    /// Returns `None` when nothing matches and no default is configured.
    pub async fn resolve_site(
        &self,
        input: &str,
        default_id: Option<&str>,
    ) -> Option<MatchResult<Site>> {
        let sites = self.sites().await;
        let query = Query::new(input);

        let scored = sites
            .entries
            .iter()
            .map(|site| (site, score_site(site, &query)))
            .collect::<Vec<_>>();

        pick(scored, default_id, |site| site.id.as_str(), "Default site")
    }

    /// Resolves a collection reference, optionally within one site.
    ///
    /// Returns `None` when nothing matches and no default is configured.
    pub async fn resolve_collection(
        &self,
        input: &str,
        site_id: Option<&str>,
        default_id: Option<&str>,
    ) -> Option<MatchResult<Collection>> {
        let sites = self.sites().await;
        let collections = self.collections(site_id).await;
        let query = Query::new(input);

        let scored = collections
            .entries
            .iter()
            .map(|collection| {
                let site = sites.entries.iter().find(|s| s.id == collection.site_id);
                (collection, score_collection(collection, site, &query))
            })
            .collect::<Vec<_>>();

        pick(scored, default_id, |c| c.id.as_str(), "Default collection")
    }

    async fn sites(&self) -> Arc<Snapshot<Site>> {
        let current = self.sites.read().ok().and_then(|slot| slot.clone());
        if let Some(snapshot) = &current {
            if snapshot.is_fresh(self.freshness) {
                return Arc::clone(snapshot);
            }
        }

        match self.source.list_sites().await {
            Ok(sites) => {
                tracing::debug!(count = sites.len(), "Loaded site directory");
                let snapshot = Arc::new(Snapshot::new(sites));
                if let Ok(mut slot) = self.sites.write() {
                    *slot = Some(Arc::clone(&snapshot));
                }
                snapshot
            }
            Err(e) => {
                tracing::warn!(error = %e, "Site directory reload failed, keeping previous snapshot");
                current.unwrap_or_else(|| Arc::new(Snapshot::new(Vec::new())))
            }
        }
    }

    async fn collections(&self, site_id: Option<&str>) -> Arc<Snapshot<Collection>> {
        let key = site_id.unwrap_or(ALL_SITES).to_string();
        let current = self
            .collections
            .read()
            .ok()
            .and_then(|map| map.get(&key).cloned());
        if let Some(snapshot) = &current {
            if snapshot.is_fresh(self.freshness) {
                return Arc::clone(snapshot);
            }
        }

        match self.source.list_collections(site_id).await {
            Ok(collections) => {
                tracing::debug!(site = %key, count = collections.len(), "Loaded collection directory");
                let snapshot = Arc::new(Snapshot::new(collections));
                if let Ok(mut map) = self.collections.write() {
                    map.insert(key, Arc::clone(&snapshot));
                }
                snapshot
            }
            Err(e) => {
                tracing::warn!(
                    site = %key,
                    error = %e,
                    "Collection directory reload failed, keeping previous snapshot"
                );
                current.unwrap_or_else(|| Arc::new(Snapshot::new(Vec::new())))
            }
        }
    }
}

/// Lowercased input and its whitespace-separated words.
struct Query {
    text: String,
    words: Vec<String>,
}

impl Query {
    fn new(input: &str) -> Self {
        let text = input.to_lowercase();
        let words = text.split_whitespace().map(str::to_string).collect();
        Self { text, words }
    }

    fn mentions(&self, needle: Option<&str>) -> bool {
        match needle.map(str::trim) {
            Some(needle) if !needle.is_empty() => self.text.contains(&needle.to_lowercase()),
            _ => false,
        }
    }

    fn matches_word(&self, word: &str) -> bool {
        self.words
            .iter()
            .any(|input| input.contains(word) || word.contains(input.as_str()))
    }

    /// Fraction of `candidate` words found in the input, scaled to 50.
    fn overlap(&self, candidate: &[String]) -> Option<(f64, String)> {
        if candidate.is_empty() {
            return None;
        }
        let matched = candidate.iter().filter(|w| self.matches_word(w)).count();
        if matched == 0 {
            return None;
        }
        let score = matched as f64 / candidate.len() as f64 * 50.0;
        Some((score, format!("{} of {} words match", matched, candidate.len())))
    }
}

/// Significant words of an entity name or subdomain.
fn words(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
    {
        let word = word.to_lowercase();
        if !out.contains(&word) {
            out.push(word);
        }
    }
    out
}

fn score_site(site: &Site, query: &Query) -> Option<(f64, String)> {
    if query.mentions(Some(&site.title)) {
        return Some((100.0, format!("site name '{}' mentioned", site.title)));
    }
    if query.mentions(site.sub_domain.as_deref()) {
        return Some((80.0, "subdomain mentioned".to_string()));
    }
    if query.mentions(site.cname.as_deref()) {
        return Some((70.0, "custom domain mentioned".to_string()));
    }

    let mut candidate = words(&site.title);
    for word in words(site.sub_domain.as_deref().unwrap_or("")) {
        if !candidate.contains(&word) {
            candidate.push(word);
        }
    }
    query.overlap(&candidate)
}

fn score_collection(
    collection: &Collection,
    site: Option<&Site>,
    query: &Query,
) -> Option<(f64, String)> {
    if query.mentions(Some(&collection.name)) {
        return Some((100.0, format!("collection name '{}' mentioned", collection.name)));
    }
    if let Some(site) = site {
        if query.mentions(Some(&site.title)) {
            return Some((80.0, format!("site name '{}' mentioned", site.title)));
        }
        if query.mentions(site.sub_domain.as_deref()) {
            return Some((70.0, "site subdomain mentioned".to_string()));
        }
    }
    if query.mentions(collection.slug.as_deref()) {
        return Some((60.0, "slug mentioned".to_string()));
    }
    query.overlap(&words(&collection.name))
}

/// Applies the default bonus, drops non-matches and picks the best candidate.
///
/// Ties keep directory order.
fn pick<T, F>(
    scored: Vec<(&T, Option<(f64, String)>)>,
    default_id: Option<&str>,
    id_of: F,
    fallback: &str,
) -> Option<MatchResult<T>>
where
    T: Clone,
    F: Fn(&T) -> &str,
{
    let is_default = |entity: &T| default_id.is_some_and(|id| id == id_of(entity));

    let mut matches: Vec<MatchResult<T>> = scored
        .iter()
        .filter_map(|(entity, score)| {
            let (score, justification) = score.clone()?;
            if score <= 0.0 {
                return None;
            }
            Some(if is_default(*entity) {
                MatchResult {
                    entity: (*entity).clone(),
                    score: score + DEFAULT_BONUS,
                    justification: format!("{} (default)", justification),
                }
            } else {
                MatchResult {
                    entity: (*entity).clone(),
                    score,
                    justification,
                }
            })
        })
        .collect();

    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    if let Some(best) = matches.into_iter().next() {
        return Some(best);
    }

    scored
        .iter()
        .find(|(entity, _)| is_default(*entity))
        .map(|(entity, _)| MatchResult {
            entity: (*entity).clone(),
            score: DEFAULT_FALLBACK_SCORE,
            justification: fallback.to_string(),
        })
}
