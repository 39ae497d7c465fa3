use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One listing block from the index page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawListing {
    pub title: String,
    pub link_url: String,
    pub location: Option<String>,
    pub published_at: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// Fields extracted from an article's own page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailContent {
    pub content: String,
    pub category: Option<String>,
}

impl DetailContent {
    /// Marker used when the detail page could not be fetched or had no body.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Result of fetching a detail page. Only `Extracted` carries data; the other
/// variants collapse to [`DetailContent::empty`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailOutcome {
    Extracted(DetailContent),
    NoArticleBody,
    FetchFailed(String),
}

impl DetailOutcome {
    pub fn into_content(self) -> DetailContent {
        match self {
            DetailOutcome::Extracted(detail) => detail,
            DetailOutcome::NoArticleBody | DetailOutcome::FetchFailed(_) => DetailContent::empty(),
        }
    }
}

/// The persisted unit, keyed by `link_url`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    pub link_url: String,
    pub title: String,
    pub location: Option<String>,
    #[serde(rename = "datetime")]
    pub published_at: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub category: Option<String>,
    pub content: String,
    pub summary: Option<String>,
}

impl ArticleRecord {
    pub fn from_parts(listing: RawListing, detail: DetailContent) -> Self {
        Self {
            link_url: listing.link_url,
            title: listing.title,
            location: listing.location,
            published_at: listing.published_at,
            description: listing.description,
            image_url: listing.image_url,
            category: detail.category,
            content: detail.content,
            summary: None,
        }
    }

    /// Checks the fields a record cannot be stored without.
    pub fn validate(&self) -> Result<()> {
        if self.link_url.trim().is_empty() {
            return Err(Error::Parse("article has no link_url".to_string()));
        }
        if self.title.trim().is_empty() {
            return Err(Error::Parse(format!("article {} has no title", self.link_url)));
        }
        Ok(())
    }
}

/// A record as returned by the store: identity plus bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArticle {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub article: ArticleRecord,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleFilter {
    pub category: Option<String>,
    pub search_text: Option<String>,
}

impl ArticleFilter {
    pub fn new(category: Option<String>, search_text: Option<String>) -> Self {
        Self {
            category: category.filter(|c| !c.is_empty()),
            search_text: search_text.filter(|q| !q.is_empty()),
        }
    }

    /// Compiles the search text into a case-insensitive pattern. A search
    /// string that is not a valid regex is matched literally.
    pub fn compile(&self) -> ArticleMatcher {
        let pattern = self.search_text.as_deref().map(|q| {
            match RegexBuilder::new(q).case_insensitive(true).build() {
                Ok(regex) => SearchPattern::Regex(regex),
                Err(_) => SearchPattern::Literal(q.to_lowercase()),
            }
        });
        ArticleMatcher {
            category: self.category.clone(),
            pattern,
        }
    }
}

#[derive(Debug, Clone)]
enum SearchPattern {
    Regex(Regex),
    Literal(String),
}

impl SearchPattern {
    fn is_match(&self, text: &str) -> bool {
        match self {
            SearchPattern::Regex(regex) => regex.is_match(text),
            SearchPattern::Literal(needle) => text.to_lowercase().contains(needle),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArticleMatcher {
    category: Option<String>,
    pattern: Option<SearchPattern>,
}

impl ArticleMatcher {
    pub fn matches(&self, article: &ArticleRecord) -> bool {
        if let Some(category) = &self.category {
            if article.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        match &self.pattern {
            Some(pattern) => pattern.is_match(&article.title) || pattern.is_match(&article.content),
            None => true,
        }
    }
}

/// Aggregate counts from one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub candidates: usize,
    pub stored_count: usize,
    pub skipped_count: usize,
}
