use nd_core::logging::short;
use nd_core::{ArticleRecord, ArticleStorage, BatchResult, Result, Settings};
use nd_inference::summarizer::MIN_CONTENT_CHARS;
use nd_inference::{Summarizer, UsageBudget};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::scrapers::vnexpress::VnExpressLayout;
use crate::scrapers::{HtmlScraper, Scraper};

/// Proof that the holder is the only pipeline run in progress.
pub struct RunPermit(#[allow(dead_code)] OwnedMutexGuard<()>);

/// Scrape, summarize and persist one batch of articles.
pub struct Pipeline {
    scraper: Arc<dyn Scraper>,
    summarizer: Arc<Summarizer>,
    storage: Arc<dyn ArticleStorage>,
    batch_delay: Duration,
    run_guard: Arc<Mutex<()>>,
}

impl Pipeline {
    pub fn new(
        scraper: Arc<dyn Scraper>,
        summarizer: Arc<Summarizer>,
        storage: Arc<dyn ArticleStorage>,
        batch_delay: Duration,
    ) -> Self {
        Self {
            scraper,
            summarizer,
            storage,
            batch_delay,
            run_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Wires the VnExpress scraper and the configured summarizer around `storage`.
    pub fn from_settings(settings: &Settings, storage: Arc<dyn ArticleStorage>) -> Result<Self> {
        let budget = Arc::new(UsageBudget::new(
            settings.summary_budget_ceiling,
            settings.summary_budget_window(),
        ));
        let scraper = HtmlScraper::new(settings, VnExpressLayout::new())?;
        let summarizer = Summarizer::from_settings(settings, budget)?;
        Ok(Self::new(
            Arc::new(scraper),
            Arc::new(summarizer),
            storage,
            settings.batch_delay(),
        ))
    }

    pub fn storage(&self) -> &Arc<dyn ArticleStorage> {
        &self.storage
    }

    pub fn summarizer(&self) -> &Arc<Summarizer> {
        &self.summarizer
    }

    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    /// Waits for any in-flight run to finish and claims the next one.
    pub async fn acquire(&self) -> RunPermit {
        RunPermit(self.run_guard.clone().lock_owned().await)
    }

    /// Claims a run only if none is in progress.
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.run_guard.clone().try_lock_owned().ok().map(RunPermit)
    }

    pub async fn run(&self, batch_size: usize) -> Result<BatchResult> {
        let permit = self.acquire().await;
        self.run_with(&permit, batch_size).await
    }

    /// Runs one batch while holding `permit`. Only a failed index fetch is an
    /// error; every per-article problem is logged and counted as skipped.
    pub async fn run_with(&self, _permit: &RunPermit, batch_size: usize) -> Result<BatchResult> {
        let started = Instant::now();
        let batch_size = batch_size.max(1);
        let source = self.scraper.source_metadata();

        let candidates = self.scraper.list_candidates().await.map_err(|e| {
            error!("❌ Failed to list articles from {}: {}", source.name, e);
            e
        })?;

        let mut result = BatchResult {
            candidates: candidates.len(),
            ..Default::default()
        };
        let total = candidates.len();

        for (index, listing) in candidates.into_iter().enumerate() {
            let detail = self.scraper.fetch_detail(&listing.link_url).await.into_content();
            let mut record = ArticleRecord::from_parts(listing, detail);

            if record.content.chars().count() > MIN_CONTENT_CHARS {
                record.summary = self
                    .summarizer
                    .summarize(&record.content, &record.title)
                    .await
                    .into_text();
            }

            match self.storage.upsert_article(&record).await {
                Ok(stored) => {
                    result.stored_count += 1;
                    info!(
                        "💾 Stored [{}/{}] {}",
                        index + 1,
                        total,
                        short(&stored.article.title, 80)
                    );
                }
                Err(e) => {
                    result.skipped_count += 1;
                    warn!(url = %record.link_url, error = %e, "Skipping article");
                    continue;
                }
            }

            if result.stored_count % batch_size == 0 && index + 1 < total {
                info!(
                    "⏸️ Processed {} articles, pausing for {:?}",
                    result.stored_count, self.batch_delay
                );
                sleep(self.batch_delay).await;
            }
        }

        info!(
            "{} {} run finished in {:.1}s: {} stored, {} skipped of {} candidates",
            source.emoji,
            source.name,
            started.elapsed().as_secs_f64(),
            result.stored_count,
            result.skipped_count,
            result.candidates
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::SourceMetadata;
    use async_trait::async_trait;
    use nd_core::{
        ArticleFilter, DetailContent, DetailOutcome, Error, RawListing, StoredArticle,
    };
    use nd_inference::models::{GenerationOutcome, TextGenerator};
    use nd_inference::SummarizerConfig;
    use nd_storage::backends::memory::MemoryStorage;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    const BODY: &str = "Nội dung bài báo đủ dài để được tóm tắt. Câu thứ hai của bài báo. \
        Câu thứ ba mô tả thêm chi tiết. Câu thứ tư không cần thiết cho phần tóm tắt.";

    struct MockScraper {
        listings: StdMutex<Result<Vec<RawListing>>>,
        details: HashMap<String, DetailOutcome>,
    }

    impl MockScraper {
        fn new(listings: Vec<RawListing>) -> Self {
            let details = listings
                .iter()
                .map(|l| {
                    (
                        l.link_url.clone(),
                        DetailOutcome::Extracted(DetailContent {
                            content: BODY.to_string(),
                            category: Some("Thời sự".to_string()),
                        }),
                    )
                })
                .collect();
            Self {
                listings: StdMutex::new(Ok(listings)),
                details,
            }
        }

        fn failing() -> Self {
            Self {
                listings: StdMutex::new(Err(Error::fetch("https://vnexpress.net", "HTTP 503"))),
                details: HashMap::new(),
            }
        }

        fn retitle(&self, suffix: &str) {
            let mut listings = self.listings.lock().unwrap();
            if let Ok(listings) = listings.as_mut() {
                for listing in listings.iter_mut() {
                    listing.title.push_str(suffix);
                }
            }
        }
    }

    #[async_trait]
    impl Scraper for MockScraper {
        fn source_metadata(&self) -> SourceMetadata {
            SourceMetadata {
                name: "Mock",
                emoji: "🧪",
                index_url: "https://vnexpress.net/tin-tuc-24h".to_string(),
            }
        }

        async fn list_candidates(&self) -> Result<Vec<RawListing>> {
            match &*self.listings.lock().unwrap() {
                Ok(listings) => Ok(listings.clone()),
                Err(e) => Err(Error::fetch("https://vnexpress.net", e)),
            }
        }

        async fn fetch_detail(&self, url: &str) -> DetailOutcome {
            self.details
                .get(url)
                .cloned()
                .unwrap_or_else(|| DetailOutcome::FetchFailed("404".to_string()))
        }
    }

    #[derive(Debug, Default)]
    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for CountingGenerator {
        fn name(&self) -> &str {
            "counting"
        }

        async fn generate(&self, _prompt: &str) -> GenerationOutcome {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            GenerationOutcome::Text(format!("API summary {}", n))
        }
    }

    /// Store that rejects one URL and delegates the rest.
    struct FlakyStorage {
        inner: MemoryStorage,
        reject: String,
    }

    #[async_trait]
    impl ArticleStorage for FlakyStorage {
        async fn upsert_article(&self, article: &ArticleRecord) -> Result<StoredArticle> {
            if article.link_url == self.reject {
                return Err(Error::persistence("disk full"));
            }
            self.inner.upsert_article(article).await
        }

        async fn list_articles(&self, filter: &ArticleFilter) -> Result<Vec<StoredArticle>> {
            self.inner.list_articles(filter).await
        }

        async fn list_categories(&self) -> Result<Vec<String>> {
            self.inner.list_categories().await
        }

        async fn get_by_url(&self, link_url: &str) -> Result<Option<StoredArticle>> {
            self.inner.get_by_url(link_url).await
        }

        async fn count(&self) -> Result<usize> {
            self.inner.count().await
        }
    }

    fn listing(n: usize) -> RawListing {
        RawListing {
            title: format!("Bài {}", n),
            link_url: format!("https://vnexpress.net/bai-{}.html", n),
            ..Default::default()
        }
    }

    fn summarizer(generator: Arc<CountingGenerator>) -> Arc<Summarizer> {
        Arc::new(Summarizer::new(
            Some(generator as Arc<dyn TextGenerator>),
            Arc::new(UsageBudget::new(50, Duration::from_secs(3600))),
            SummarizerConfig {
                max_retries: 3,
                min_delay: Duration::from_millis(10),
                backoff_factor: 2.0,
                max_input_chars: 4000,
                use_fallback: true,
            },
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stores_all_candidates_then_upserts_on_rerun() {
        let scraper = Arc::new(MockScraper::new((1..=3).map(listing).collect()));
        let generator = Arc::new(CountingGenerator::default());
        let storage = Arc::new(MemoryStorage::new());
        let pipeline = Pipeline::new(
            scraper.clone(),
            summarizer(generator.clone()),
            storage.clone(),
            Duration::from_secs(10),
        );

        let first = pipeline.run(5).await.unwrap();
        assert_eq!(
            first,
            BatchResult {
                candidates: 3,
                stored_count: 3,
                skipped_count: 0
            }
        );
        assert_eq!(storage.count().await.unwrap(), 3);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);

        let mut before = Vec::new();
        for n in 1..=3 {
            let url = format!("https://vnexpress.net/bai-{}.html", n);
            before.push(storage.get_by_url(&url).await.unwrap().unwrap());
        }
        let stored = &before[1];
        assert_eq!(stored.created_at, stored.updated_at);
        assert!(stored.article.summary.as_deref().unwrap().starts_with("API summary"));
        assert_eq!(stored.article.category.as_deref(), Some("Thời sự"));

        scraper.retitle(" (cập nhật)");
        // Record timestamps come from the wall clock, not tokio's.
        std::thread::sleep(Duration::from_millis(5));
        let second = pipeline.run(5).await.unwrap();
        assert_eq!(second.stored_count, 3);
        assert_eq!(storage.count().await.unwrap(), 3);

        for old in &before {
            let updated = storage
                .get_by_url(&old.article.link_url)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(updated.id, old.id);
            assert_eq!(updated.created_at, old.created_at);
            assert!(updated.updated_at > old.updated_at);
        }
        let updated = storage
            .get_by_url("https://vnexpress.net/bai-2.html")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.article.title, "Bài 2 (cập nhật)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_is_counted_as_skipped() {
        let scraper = Arc::new(MockScraper::new((1..=3).map(listing).collect()));
        let storage = Arc::new(FlakyStorage {
            inner: MemoryStorage::new(),
            reject: "https://vnexpress.net/bai-2.html".to_string(),
        });
        let pipeline = Pipeline::new(
            scraper,
            summarizer(Arc::new(CountingGenerator::default())),
            storage.clone(),
            Duration::from_secs(10),
        );

        let result = pipeline.run(5).await.unwrap();
        assert_eq!(result.stored_count, 2);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(storage.count().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_detail_is_stored_without_content_or_summary() {
        let mut scraper = MockScraper::new(vec![listing(1)]);
        scraper.details.clear();
        let generator = Arc::new(CountingGenerator::default());
        let storage = Arc::new(MemoryStorage::new());
        let pipeline = Pipeline::new(
            Arc::new(scraper),
            summarizer(generator.clone()),
            storage.clone(),
            Duration::from_secs(10),
        );

        let result = pipeline.run(5).await.unwrap();
        assert_eq!(result.stored_count, 1);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);

        let stored = storage
            .get_by_url("https://vnexpress.net/bai-1.html")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.article.content, "");
        assert_eq!(stored.article.summary, None);
        assert_eq!(stored.article.category, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_failure_fails_the_run() {
        let pipeline = Pipeline::new(
            Arc::new(MockScraper::failing()),
            summarizer(Arc::new(CountingGenerator::default())),
            Arc::new(MemoryStorage::new()),
            Duration::from_secs(10),
        );
        assert!(matches!(pipeline.run(5).await, Err(Error::Fetch { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_delay_after_every_batch() {
        let scraper = Arc::new(MockScraper::new((1..=5).map(listing).collect()));
        let pipeline = Pipeline::new(
            scraper,
            summarizer(Arc::new(CountingGenerator::default())),
            Arc::new(MemoryStorage::new()),
            Duration::from_secs(10),
        );

        let start = tokio::time::Instant::now();
        let result = pipeline.run(2).await.unwrap();
        assert_eq!(result.stored_count, 5);
        // Pauses after items 2 and 4, none after the last one.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(20));
        assert!(elapsed < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_try_acquire_is_exclusive() {
        let pipeline = Pipeline::new(
            Arc::new(MockScraper::new(vec![])),
            summarizer(Arc::new(CountingGenerator::default())),
            Arc::new(MemoryStorage::new()),
            Duration::from_secs(10),
        );

        let permit = pipeline.try_acquire().unwrap();
        assert!(pipeline.is_running());
        assert!(pipeline.try_acquire().is_none());
        drop(permit);
        assert!(!pipeline.is_running());
        assert!(pipeline.try_acquire().is_some());
    }
}
