use async_trait::async_trait;
use nd_core::config::StorageKind;
use nd_core::{ArticleStorage, Error, Result, Settings};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub mod backends;

pub use backends::*;

const OPEN_RETRIES: u32 = 3;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn get_error_message() -> &'static str;
    async fn open(settings: &Settings) -> Result<Self> where Self: Sized;
}

async fn open_with_retry<T: StorageBackend + ArticleStorage + 'static>(settings: &Settings) -> Result<Arc<dyn ArticleStorage>> {
    let storage_type = std::any::type_name::<T>().rsplit("::").next().unwrap_or("unknown");
    let mut last_error = None;

    for attempt in 1..=OPEN_RETRIES {
        match T::open(settings).await {
            Ok(storage) => {
                info!("🏦 Storage backend initialized successfully (using {})", storage_type);
                return Ok(Arc::new(storage));
            }
            Err(e) => {
                warn!(attempt, error = %e, "Storage initialization failed: {}", T::get_error_message());
                last_error = Some(e);
                if attempt < OPEN_RETRIES {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| Error::persistence("Storage initialization failed after all retries")))
}

/// Opens the backend selected by `settings.storage`.
pub async fn create_storage(settings: &Settings) -> Result<Arc<dyn ArticleStorage>> {
    match settings.storage {
        StorageKind::Memory => open_with_retry::<MemoryStorage>(settings).await,
        #[cfg(feature = "sqlite")]
        StorageKind::Sqlite => open_with_retry::<SQLiteStorage>(settings).await,
        #[cfg(not(feature = "sqlite"))]
        StorageKind::Sqlite => Err(Error::Config(
            "sqlite storage requested but nd_storage was built without the `sqlite` feature".to_string(),
        )),
    }
}

pub mod prelude {
    pub use super::backends::*;
    pub use super::{create_storage, StorageBackend};
}

#[cfg(test)]
mod tests {
    use super::*;
    use nd_core::ArticleFilter;

    #[tokio::test]
    async fn test_create_memory_storage() {
        let storage = create_storage(&Settings::default()).await.unwrap();
        assert!(storage.list_articles(&ArticleFilter::default()).await.unwrap().is_empty());
    }
}
