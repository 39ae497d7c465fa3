use async_trait::async_trait;
use crate::types::{ArticleFilter, ArticleRecord, StoredArticle};
use crate::Result;

#[async_trait]
pub trait ArticleStorage: Send + Sync {
    /// Insert or update the record keyed by `link_url`. `created_at` is set on
    /// first insert only; `updated_at` on every write.
    async fn upsert_article(&self, article: &ArticleRecord) -> Result<StoredArticle>;

    /// Records matching `filter`, newest `created_at` first.
    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<StoredArticle>>;

    /// Sorted distinct non-empty categories.
    async fn list_categories(&self) -> Result<Vec<String>>;

    async fn get_by_url(&self, link_url: &str) -> Result<Option<StoredArticle>>;

    async fn count(&self) -> Result<usize>;
}
