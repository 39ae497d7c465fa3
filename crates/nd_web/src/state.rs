use nd_core::ArticleStorage;
use nd_scheduler::Scheduler;
use nd_scrapers::Pipeline;
use std::sync::Arc;

pub const DEFAULT_SCRAPE_BATCH: usize = 5;
pub const MAX_SCRAPE_BATCH: usize = 20;

pub struct AppState {
    pub storage: Arc<dyn ArticleStorage>,
    pub pipeline: Arc<Pipeline>,
    pub scheduler: Arc<Scheduler>,
    pub default_interval_minutes: u64,
}

impl AppState {
    pub fn new(pipeline: Arc<Pipeline>, scheduler: Arc<Scheduler>, default_interval_minutes: u64) -> Self {
        Self {
            storage: pipeline.storage().clone(),
            pipeline,
            scheduler,
            default_interval_minutes,
        }
    }
}
