use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use nd_core::{ArticleFilter, StoredArticle};
use nd_scheduler::SchedulerStatus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::{ApiError, ApiResult};
use crate::state::{DEFAULT_SCRAPE_BATCH, MAX_SCRAPE_BATCH};
use crate::AppState;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ScrapeParams {
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub run_in_background: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub category: Option<String>,
    pub q: Option<String>,
    pub page: Option<usize>,
    pub size: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
    pub pages: usize,
}

impl<T> Page<T> {
    pub fn slice(all: Vec<T>, page: usize, size: usize) -> Self {
        let total = all.len();
        let items = all.into_iter().skip(page.saturating_sub(1).saturating_mul(size)).take(size).collect();
        Self {
            items,
            total,
            page,
            size,
            pages: total.div_ceil(size),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IntervalBody {
    pub interval_minutes: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBody {
    pub interval_minutes: u64,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn scrape_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ScrapeParams>,
) -> ApiResult<Json<Value>> {
    let batch_size = params.batch_size.unwrap_or(DEFAULT_SCRAPE_BATCH);
    if !(1..=MAX_SCRAPE_BATCH).contains(&batch_size) {
        return Err(ApiError::bad_request(format!(
            "batch_size must be between 1 and {}",
            MAX_SCRAPE_BATCH
        )));
    }

    if params.run_in_background {
        let pipeline = state.pipeline.clone();
        tokio::spawn(async move {
            match pipeline.run(batch_size).await {
                Ok(result) => info!(
                    "Background scrape finished: {} stored, {} skipped",
                    result.stored_count, result.skipped_count
                ),
                Err(e) => error!("❌ Background scrape failed: {}", e),
            }
        });
        return Ok(Json(json!({
            "status": "Background task started",
            "batch_size": batch_size,
            "timestamp": Utc::now(),
        })));
    }

    let result = state.pipeline.run(batch_size).await?;
    if result.candidates == 0 {
        return Err(ApiError::not_found("No articles found"));
    }
    Ok(Json(json!({
        "status": "success",
        "message": format!("Scraped and stored {} articles", result.stored_count),
        "articles_count": result.stored_count,
        "skipped_count": result.skipped_count,
    })))
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<StoredArticle>>> {
    let page = params.page.unwrap_or(1);
    let size = params.size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page < 1 {
        return Err(ApiError::bad_request("page must be at least 1"));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&size) {
        return Err(ApiError::bad_request(format!(
            "size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }

    let filter = ArticleFilter::new(params.category, params.q);
    let articles = state.storage.list_articles(&filter).await?;
    Ok(Json(Page::slice(articles, page, size)))
}

pub async fn list_categories(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.storage.list_categories().await?))
}

pub async fn start_scheduler(
    State(state): State<Arc<AppState>>,
    body: Option<Json<IntervalBody>>,
) -> ApiResult<Json<Value>> {
    let interval = body
        .and_then(|Json(body)| body.interval_minutes)
        .unwrap_or(state.default_interval_minutes);
    state.scheduler.start(interval).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Scheduler started successfully with {} minute interval", interval),
        "interval_minutes": interval,
        "started_at": Utc::now(),
    })))
}

pub async fn stop_scheduler(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    state.scheduler.stop().await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Scheduler stopped successfully",
        "stopped_at": Utc::now(),
    })))
}

pub async fn scheduler_status(State(state): State<Arc<AppState>>) -> Json<SchedulerStatus> {
    Json(state.scheduler.status().await)
}

pub async fn trigger_scheduler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let run_status = state.scheduler.trigger_now().await;
    Json(json!({
        "status": "success",
        "message": "Immediate scraping completed",
        "run_status": run_status,
        "triggered_at": Utc::now(),
    }))
}

pub async fn update_scheduler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<UpdateBody>,
) -> ApiResult<Json<Value>> {
    state.scheduler.update_interval(body.interval_minutes).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Scheduler interval updated to {} minutes", body.interval_minutes),
        "new_interval_minutes": body.interval_minutes,
        "updated_at": Utc::now(),
    })))
}

pub async fn restart_scheduler(
    State(state): State<Arc<AppState>>,
    body: Option<Json<IntervalBody>>,
) -> ApiResult<Json<Value>> {
    let interval = body
        .and_then(|Json(body)| body.interval_minutes)
        .unwrap_or(state.default_interval_minutes);
    state.scheduler.restart(interval).await?;
    Ok(Json(json!({
        "status": "success",
        "message": format!("Scheduler restarted successfully with {} minute interval", interval),
        "interval_minutes": interval,
        "restarted_at": Utc::now(),
    })))
}
