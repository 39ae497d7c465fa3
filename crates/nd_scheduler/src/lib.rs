//! Recurring scrape job.
//!
//! A timer task ticks every `interval_minutes` and hands each firing to the
//! pipeline's run guard. A firing that finds a run already in progress is
//! skipped, never queued. Manual triggers wait for the guard instead.

use chrono::{DateTime, Utc};
use nd_scrapers::{Pipeline, RunPermit};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

pub const MIN_INTERVAL_MINUTES: u64 = 5;
pub const MAX_INTERVAL_MINUTES: u64 = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,
    #[error("Scheduler is not running")]
    NotRunning,
    #[error("Interval must be between 5 and 1440 minutes, got {0}")]
    InvalidInterval(u64),
}

impl From<SchedulerError> for nd_core::Error {
    fn from(e: SchedulerError) -> Self {
        nd_core::Error::Scheduler(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    NoArticles,
    Error,
}

/// Read-only snapshot returned by [`Scheduler::status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub interval_minutes: u64,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunStatus>,
    pub next_run_time: Option<DateTime<Utc>>,
    pub total_articles_scraped: usize,
    pub active_jobs: usize,
    pub skipped_runs: usize,
}

#[derive(Debug, Default)]
struct RunHistory {
    last_run_time: Option<DateTime<Utc>>,
    last_run_status: Option<RunStatus>,
    total_articles_scraped: usize,
    skipped_runs: usize,
    next_run_time: Option<DateTime<Utc>>,
}

struct Job {
    interval_minutes: u64,
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct Runner {
    pipeline: Arc<Pipeline>,
    batch_size: usize,
    history: Mutex<RunHistory>,
}

impl Runner {
    fn history(&self) -> MutexGuard<'_, RunHistory> {
        match self.history.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// One timer firing: start a run in the background, or skip it.
    fn fire(self: &Arc<Self>) {
        match self.pipeline.try_acquire() {
            Some(permit) => {
                let runner = Arc::clone(self);
                tokio::spawn(async move {
                    runner.execute(permit).await;
                });
            }
            None => {
                self.history().skipped_runs += 1;
                warn!("Previous scrape still in progress, skipping this firing");
            }
        }
    }

    async fn execute(&self, permit: RunPermit) -> RunStatus {
        let started = Utc::now();
        info!("🤖 Scheduled article scraping started");

        let (status, stored) = match self.pipeline.run_with(&permit, self.batch_size).await {
            Ok(result) if result.candidates == 0 => {
                warn!("No new articles found during scheduled scraping");
                (RunStatus::NoArticles, 0)
            }
            Ok(result) => {
                info!(
                    "✅ Scheduled scraping finished in {}s: {} stored, {} skipped",
                    (Utc::now() - started).num_seconds(),
                    result.stored_count,
                    result.skipped_count
                );
                (RunStatus::Success, result.stored_count)
            }
            Err(e) => {
                error!("❌ Scheduled scraping failed: {}", e);
                (RunStatus::Error, 0)
            }
        };

        let mut history = self.history();
        history.last_run_time = Some(started);
        history.last_run_status = Some(status);
        history.total_articles_scraped += stored;
        drop(history);
        drop(permit);
        status
    }

    async fn tick_loop(self: Arc<Self>, period: Duration, mut stop_rx: oneshot::Receiver<()>) {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = ticker.tick() => {
                    self.set_next_run(period);
                    self.fire();
                }
            }
        }
        self.history().next_run_time = None;
    }

    fn set_next_run(&self, period: Duration) {
        let next = chrono::Duration::from_std(period)
            .ok()
            .and_then(|period| Utc::now().checked_add_signed(period));
        self.history().next_run_time = next;
    }
}

/// Owns the recurring job and its run history.
pub struct Scheduler {
    runner: Arc<Runner>,
    job: AsyncMutex<Option<Job>>,
    interval_minutes: Mutex<u64>,
}

impl Scheduler {
    pub fn new(pipeline: Arc<Pipeline>, batch_size: usize, default_interval_minutes: u64) -> Self {
        Self {
            runner: Arc::new(Runner {
                pipeline,
                batch_size,
                history: Mutex::new(RunHistory::default()),
            }),
            job: AsyncMutex::new(None),
            interval_minutes: Mutex::new(default_interval_minutes),
        }
    }

    pub fn validate_interval(interval_minutes: u64) -> Result<(), SchedulerError> {
        if (MIN_INTERVAL_MINUTES..=MAX_INTERVAL_MINUTES).contains(&interval_minutes) {
            Ok(())
        } else {
            Err(SchedulerError::InvalidInterval(interval_minutes))
        }
    }

    fn spawn_job(&self, interval_minutes: u64) -> Job {
        let (stop_tx, stop_rx) = oneshot::channel();
        let period = Duration::from_secs(interval_minutes * 60);
        self.runner.set_next_run(period);
        let handle = tokio::spawn(Arc::clone(&self.runner).tick_loop(period, stop_rx));
        match self.interval_minutes.lock() {
            Ok(mut guard) => *guard = interval_minutes,
            Err(poisoned) => *poisoned.into_inner() = interval_minutes,
        }
        Job {
            interval_minutes,
            stop_tx,
            handle,
        }
    }

    async fn cancel(job: Job) {
        let _ = job.stop_tx.send(());
        if let Err(e) = job.handle.await {
            error!("Scheduler timer task ended abnormally: {}", e);
        }
    }

    pub async fn start(&self, interval_minutes: u64) -> Result<(), SchedulerError> {
        Self::validate_interval(interval_minutes)?;
        let mut job = self.job.lock().await;
        if job.is_some() {
            warn!("Scheduler is already running");
            return Err(SchedulerError::AlreadyRunning);
        }
        *job = Some(self.spawn_job(interval_minutes));
        info!("🚀 Article scheduler started - will run every {} minutes", interval_minutes);
        Ok(())
    }

    /// Cancels the timer and waits for an in-flight run to finish.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        // The job slot is released before waiting so status stays readable.
        let current = self.job.lock().await.take().ok_or_else(|| {
            warn!("Scheduler is not running");
            SchedulerError::NotRunning
        })?;
        Self::cancel(current).await;
        drop(self.runner.pipeline.acquire().await);
        info!("🛑 Article scheduler stopped");
        Ok(())
    }

    /// Replaces the timer with one at the new interval, or starts one if
    /// the scheduler is stopped.
    pub async fn update_interval(&self, interval_minutes: u64) -> Result<(), SchedulerError> {
        Self::validate_interval(interval_minutes)?;
        let mut job = self.job.lock().await;
        match job.take() {
            Some(current) => {
                Self::cancel(current).await;
                *job = Some(self.spawn_job(interval_minutes));
                info!("📅 Scheduler updated - new interval: {} minutes", interval_minutes);
            }
            None => {
                *job = Some(self.spawn_job(interval_minutes));
                info!("🚀 Article scheduler started - will run every {} minutes", interval_minutes);
            }
        }
        Ok(())
    }

    pub async fn restart(&self, interval_minutes: u64) -> Result<(), SchedulerError> {
        Self::validate_interval(interval_minutes)?;
        match self.stop().await {
            Ok(()) | Err(SchedulerError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.start(interval_minutes).await
    }

    /// Runs the job body once, waiting for any in-flight run first.
    pub async fn trigger_now(&self) -> RunStatus {
        let permit = self.runner.pipeline.acquire().await;
        self.runner.execute(permit).await
    }

    pub async fn is_running(&self) -> bool {
        self.job.lock().await.is_some()
    }

    pub async fn status(&self) -> SchedulerStatus {
        let job = self.job.lock().await;
        let interval_minutes = match &*job {
            Some(job) => job.interval_minutes,
            None => match self.interval_minutes.lock() {
                Ok(guard) => *guard,
                Err(poisoned) => *poisoned.into_inner(),
            },
        };
        let history = self.runner.history();
        SchedulerStatus {
            is_running: job.is_some(),
            interval_minutes,
            last_run_time: history.last_run_time,
            last_run_status: history.last_run_status,
            next_run_time: job.as_ref().and(history.next_run_time),
            total_articles_scraped: history.total_articles_scraped,
            active_jobs: usize::from(job.is_some()),
            skipped_runs: history.skipped_runs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nd_core::{DetailContent, DetailOutcome, Error, RawListing, Result};
    use nd_inference::{Summarizer, SummarizerConfig, UsageBudget};
    use nd_scrapers::{Scraper, SourceMetadata};
    use nd_storage::backends::memory::MemoryStorage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Default)]
    struct GatedScraper {
        calls: AtomicUsize,
        listings: usize,
        gated: bool,
        fail: AtomicBool,
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Scraper for GatedScraper {
        fn source_metadata(&self) -> SourceMetadata {
            SourceMetadata {
                name: "Gated",
                emoji: "🧪",
                index_url: "https://vnexpress.net/tin-tuc-24h".to_string(),
            }
        }

        async fn list_candidates(&self) -> Result<Vec<RawListing>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.gated {
                self.entered.notify_one();
                self.release.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::fetch("https://vnexpress.net/tin-tuc-24h", "HTTP 503"));
            }
            Ok((0..self.listings)
                .map(|n| RawListing {
                    title: format!("Bài {}", n),
                    link_url: format!("https://vnexpress.net/bai-{}.html", n),
                    ..Default::default()
                })
                .collect())
        }

        async fn fetch_detail(&self, _url: &str) -> DetailOutcome {
            DetailOutcome::Extracted(DetailContent {
                content: "Ngắn.".to_string(),
                category: None,
            })
        }
    }

    fn scheduler(scraper: Arc<GatedScraper>) -> Scheduler {
        let summarizer = Summarizer::new(
            None,
            Arc::new(UsageBudget::new(50, Duration::from_secs(3600))),
            SummarizerConfig::default(),
        );
        let pipeline = Pipeline::new(
            scraper,
            Arc::new(summarizer),
            Arc::new(MemoryStorage::new()),
            Duration::from_secs(1),
        );
        Scheduler::new(Arc::new(pipeline), 5, 30)
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_transitions() {
        let scheduler = scheduler(Arc::new(GatedScraper::default()));
        assert!(!scheduler.is_running().await);
        assert_eq!(scheduler.stop().await, Err(SchedulerError::NotRunning));

        scheduler.start(30).await.unwrap();
        assert_eq!(scheduler.start(30).await, Err(SchedulerError::AlreadyRunning));

        let status = scheduler.status().await;
        assert!(status.is_running);
        assert_eq!(status.active_jobs, 1);
        assert!(status.next_run_time.is_some());

        scheduler.update_interval(60).await.unwrap();
        let status = scheduler.status().await;
        assert!(status.is_running);
        assert_eq!(status.interval_minutes, 60);

        scheduler.stop().await.unwrap();
        let status = scheduler.status().await;
        assert!(!status.is_running);
        assert_eq!(status.active_jobs, 0);
        assert_eq!(status.next_run_time, None);
        assert_eq!(status.interval_minutes, 60);

        scheduler.update_interval(15).await.unwrap();
        assert!(scheduler.is_running().await);
        scheduler.restart(45).await.unwrap();
        assert_eq!(scheduler.status().await.interval_minutes, 45);
        scheduler.stop().await.unwrap();
        scheduler.restart(20).await.unwrap();
        assert!(scheduler.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_bounds() {
        let scheduler = scheduler(Arc::new(GatedScraper::default()));
        assert_eq!(scheduler.start(4).await, Err(SchedulerError::InvalidInterval(4)));
        assert_eq!(
            scheduler.update_interval(1441).await,
            Err(SchedulerError::InvalidInterval(1441))
        );
        assert!(!scheduler.is_running().await);
        scheduler.start(MIN_INTERVAL_MINUTES).await.unwrap();
        scheduler.update_interval(MAX_INTERVAL_MINUTES).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_records_history() {
        let scraper = Arc::new(GatedScraper {
            listings: 2,
            ..Default::default()
        });
        let scheduler = scheduler(scraper.clone());

        assert_eq!(scheduler.trigger_now().await, RunStatus::Success);
        let status = scheduler.status().await;
        assert_eq!(status.total_articles_scraped, 2);
        assert_eq!(status.last_run_status, Some(RunStatus::Success));
        assert!(status.last_run_time.is_some());
        assert!(!status.is_running);

        scraper.fail.store(true, Ordering::SeqCst);
        assert_eq!(scheduler.trigger_now().await, RunStatus::Error);
        assert_eq!(scheduler.status().await.total_articles_scraped, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_listing_is_no_articles() {
        let scheduler = scheduler(Arc::new(GatedScraper::default()));
        assert_eq!(scheduler.trigger_now().await, RunStatus::NoArticles);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_firing_waits_one_interval() {
        let scraper = Arc::new(GatedScraper::default());
        let scheduler = scheduler(scraper.clone());
        scheduler.start(10).await.unwrap();

        tokio::time::sleep(Duration::from_secs(9 * 60)).await;
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2 * 60)).await;
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.status().await.last_run_status, Some(RunStatus::NoArticles));
        scheduler.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_readable_while_stop_waits_for_run() {
        let scraper = Arc::new(GatedScraper {
            gated: true,
            listings: 1,
            ..Default::default()
        });
        let scheduler = Arc::new(scheduler(scraper.clone()));
        scheduler.start(30).await.unwrap();

        let trigger = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.trigger_now().await }
        });
        scraper.entered.notified().await;

        let stop = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.stop().await }
        });
        while scheduler.is_running().await {
            tokio::task::yield_now().await;
        }
        assert!(!stop.is_finished());

        let status = tokio::time::timeout(Duration::from_millis(500), scheduler.status())
            .await
            .expect("status blocked behind stop");
        assert!(!status.is_running);
        assert_eq!(status.next_run_time, None);
        assert_eq!(
            scheduler.update_interval(15).await,
            Ok(()),
            "control calls are not blocked either"
        );

        scraper.release.notify_one();
        assert_eq!(trigger.await.unwrap(), RunStatus::Success);
        assert_eq!(stop.await.unwrap(), Ok(()));
        assert_eq!(scheduler.status().await.total_articles_scraped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_firing_is_skipped() {
        let scraper = Arc::new(GatedScraper {
            gated: true,
            ..Default::default()
        });
        let scheduler = scheduler(scraper.clone());
        scheduler.start(5).await.unwrap();

        // First firing starts and blocks inside the listing fetch.
        scraper.entered.notified().await;
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 1);

        while scheduler.status().await.skipped_runs == 0 {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 1);

        scraper.release.notify_one();
        scheduler.stop().await.unwrap();

        let status = scheduler.status().await;
        assert_eq!(scraper.calls.load(Ordering::SeqCst), 1);
        assert_eq!(status.last_run_status, Some(RunStatus::NoArticles));
        assert!(status.skipped_runs >= 1);
    }
}
