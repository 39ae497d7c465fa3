use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nd_core::{ArticleFilter, ArticleRecord, ArticleStorage, Error, Result, Settings, StoredArticle};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::StorageBackend;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id TEXT NOT NULL,
        link_url TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        location TEXT,
        published_at TEXT,
        description TEXT,
        image_url TEXT,
        category TEXT,
        content TEXT NOT NULL,
        summary TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS category_lookup ON articles (category)",
    "CREATE INDEX IF NOT EXISTS created_at_sort ON articles (created_at DESC)",
];

pub struct SQLiteStorage {
    pool: SqlitePool,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SQLiteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be writable at DATABASE_PATH"
    }

    async fn open(settings: &Settings) -> Result<Self> {
        Self::new_with_path(&settings.database_path).await
    }
}

impl SQLiteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| Error::persistence(format!("Failed to connect to database: {}", e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::persistence(format!("Failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self {
            pool,
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    fn row_to_article(row: &SqliteRow) -> Result<StoredArticle> {
        Ok(StoredArticle {
            id: row.get("id"),
            article: ArticleRecord {
                link_url: row.get("link_url"),
                title: row.get("title"),
                location: row.get("location"),
                published_at: row.get("published_at"),
                description: row.get("description"),
                image_url: row.get("image_url"),
                category: row.get("category"),
                content: row.get("content"),
                summary: row.get("summary"),
            },
            created_at: parse_timestamp(row.get("created_at"))?,
            updated_at: parse_timestamp(row.get("updated_at"))?,
        })
    }
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::persistence(format!("Failed to parse timestamp {}: {}", value, e)))
}

#[async_trait]
impl ArticleStorage for SQLiteStorage {
    async fn upsert_article(&self, article: &ArticleRecord) -> Result<StoredArticle> {
        article.validate()?;
        // Fixed-width timestamps so ORDER BY on the text column is chronological.
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);

        // ON CONFLICT keeps id and created_at from the first insert.
        sqlx::query(
            r#"
            INSERT INTO articles
            (id, link_url, title, location, published_at, description, image_url,
             category, content, summary, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(link_url) DO UPDATE SET
                title = excluded.title,
                location = excluded.location,
                published_at = excluded.published_at,
                description = excluded.description,
                image_url = excluded.image_url,
                category = excluded.category,
                content = excluded.content,
                summary = excluded.summary,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&article.link_url)
        .bind(&article.title)
        .bind(article.location.as_deref())
        .bind(article.published_at.as_deref())
        .bind(article.description.as_deref())
        .bind(article.image_url.as_deref())
        .bind(article.category.as_deref())
        .bind(&article.content)
        .bind(article.summary.as_deref())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::persistence(format!("Failed to store article: {}", e)))?;

        self.get_by_url(&article.link_url)
            .await?
            .ok_or_else(|| Error::persistence(format!("Article vanished after upsert: {}", article.link_url)))
    }

    async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<StoredArticle>> {
        let rows = match &filter.category {
            Some(category) => {
                sqlx::query("SELECT * FROM articles WHERE category = ? ORDER BY created_at DESC, rowid DESC")
                    .bind(category)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT * FROM articles ORDER BY created_at DESC, rowid DESC")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| Error::persistence(format!("Failed to list articles: {}", e)))?;

        // Text search runs in Rust so both backends share the same regex semantics.
        let matcher = filter.compile();
        let mut articles = Vec::with_capacity(rows.len());
        for row in &rows {
            let stored = Self::row_to_article(row)?;
            if matcher.matches(&stored.article) {
                articles.push(stored);
            }
        }
        Ok(articles)
    }

    async fn list_categories(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT category FROM articles WHERE category IS NOT NULL AND TRIM(category) != '' ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::persistence(format!("Failed to list categories: {}", e)))?;

        Ok(rows.iter().map(|row| row.get("category")).collect())
    }

    async fn get_by_url(&self, link_url: &str) -> Result<Option<StoredArticle>> {
        let row = sqlx::query("SELECT * FROM articles WHERE link_url = ?")
            .bind(link_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::persistence(format!("Failed to load article: {}", e)))?;

        row.as_ref().map(Self::row_to_article).transpose()
    }

    async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM articles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::persistence(format!("Failed to count articles: {}", e)))?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn article(url: &str, title: &str, category: Option<&str>) -> ArticleRecord {
        ArticleRecord {
            link_url: url.to_string(),
            title: title.to_string(),
            content: "Nội dung bài viết".to_string(),
            category: category.map(str::to_string),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_sqlite_upsert_preserves_identity() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let first = storage
            .upsert_article(&article("https://vnexpress.net/a", "Old", None))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = storage
            .upsert_article(&article("https://vnexpress.net/a", "New", Some("Thời sự")))
            .await
            .unwrap();

        assert_eq!(storage.count().await.unwrap(), 1);
        assert_eq!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.article.title, "New");
    }

    #[tokio::test]
    async fn test_sqlite_list_and_categories() {
        let temp_dir = tempdir().unwrap();
        let storage = SQLiteStorage::new_with_path(&temp_dir.path().join("test.db"))
            .await
            .unwrap();

        storage
            .upsert_article(&article("https://vnexpress.net/1", "Giá vàng", Some("Kinh doanh")))
            .await
            .unwrap();
        storage
            .upsert_article(&article("https://vnexpress.net/2", "World Cup", Some("Thể thao")))
            .await
            .unwrap();
        storage
            .upsert_article(&article("https://vnexpress.net/3", "No category", None))
            .await
            .unwrap();

        let hits = storage
            .list_articles(&ArticleFilter::new(None, Some("world".to_string())))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].article.link_url, "https://vnexpress.net/2");

        let newest = storage.list_articles(&ArticleFilter::default()).await.unwrap();
        assert_eq!(newest[0].article.link_url, "https://vnexpress.net/3");

        assert_eq!(
            storage.list_categories().await.unwrap(),
            vec!["Kinh doanh".to_string(), "Thể thao".to_string()]
        );
    }
}
