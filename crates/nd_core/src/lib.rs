pub mod config;
pub mod error;
pub mod logging;
pub mod ratelimit;
pub mod storage;
pub mod types;

pub use config::Settings;
pub use error::{Error, Result};
pub use ratelimit::{compute_backoff, RateLimiter};
pub use storage::ArticleStorage;
pub use types::{
    ArticleFilter, ArticleRecord, BatchResult, DetailContent, DetailOutcome, RawListing,
    StoredArticle,
};
