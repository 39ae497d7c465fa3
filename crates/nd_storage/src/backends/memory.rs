use async_trait::async_trait;
use chrono::Utc;
use nd_core::{ArticleFilter, ArticleRecord, ArticleStorage, Result, StoredArticle};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::StorageBackend;

#[derive(Default)]
pub struct MemoryStore {
    articles: Vec<StoredArticle>,
    by_url: HashMap<String, usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, article: &ArticleRecord) -> StoredArticle {
        let now = Utc::now();
        if let Some(&index) = self.by_url.get(&article.link_url) {
            let existing = &mut self.articles[index];
            existing.article = article.clone();
            existing.updated_at = now;
            existing.clone()
        } else {
            let stored = StoredArticle {
                id: Uuid::new_v4().to_string(),
                article: article.clone(),
                created_at: now,
                updated_at: now,
            };
            self.by_url.insert(article.link_url.clone(), self.articles.len());
            self.articles.push(stored.clone());
            stored
        }
    }

    pub fn list(&self, filter: &ArticleFilter) -> Vec<StoredArticle> {
        let matcher = filter.compile();
        // Reverse insertion order first so equal timestamps keep newest-first.
        let mut articles: Vec<StoredArticle> = self
            .articles
            .iter()
            .rev()
            .filter(|stored| matcher.matches(&stored.article))
            .cloned()
            .collect();
        articles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        articles
    }

    pub fn categories(&self) -> Vec<String> {
        self.articles
            .iter()
            .filter_map(|stored| stored.article.category.as_deref())
            .filter(|category| !category.trim().is_empty())
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn get(&self, link_url: &str) -> Option<StoredArticle> {
        self.by_url
            .get(link_url)
            .map(|&index| self.articles[index].clone())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStorage {
    store: Arc<RwLock<MemoryStore>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should be available"
    }

    async fn open(_settings: &nd_core::Settings) -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl ArticleStorage for MemoryStorage {
    async fn upsert_article(&self, article: &ArticleRecord) -> Result<StoredArticle> {
        article.validate()?;
        let mut store = self.store.write().await;
        Ok(store.upsert(article))
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<StoredArticle>> {
        let store = self.store.read().await;
        Ok(store.list(filter))
    }

    async fn list_categories(&self) -> Result<Vec<String>> {
        let store = self.store.read().await;
        Ok(store.categories())
    }

    async fn get_by_url(&self, link_url: &str) -> Result<Option<StoredArticle>> {
        let store = self.store.read().await;
        Ok(store.get(link_url))
    }

    async fn count(&self) -> Result<usize> {
        let store = self.store.read().await;
        Ok(store.articles.len())
    }
}
