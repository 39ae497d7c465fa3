pub mod manager;
pub mod scrapers;

pub use manager::{Pipeline, RunPermit};
pub use scrapers::vnexpress::VnExpressLayout;
pub use scrapers::{HtmlScraper, Scraper, SiteLayout, SourceMetadata};

pub mod prelude {
    pub use super::scrapers::Scraper;
    pub use nd_core::{BatchResult, DetailOutcome, Error, RawListing, Result};
}
