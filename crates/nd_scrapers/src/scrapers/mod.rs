use async_trait::async_trait;
use nd_core::{DetailOutcome, Error, RateLimiter, RawListing, Result, Settings};
use tracing::{info, warn};
use url::Url;

pub mod vnexpress;

pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; ArticleScraper/1.0;)";

#[derive(Debug, Clone)]
pub struct SourceMetadata {
    pub name: &'static str,
    pub emoji: &'static str,
    pub index_url: String,
}

#[async_trait]
pub trait Scraper: Send + Sync {
    /// Returns the name and entry point of the news source
    fn source_metadata(&self) -> SourceMetadata;

    /// Fetches the index page and returns its well-formed listing blocks.
    /// A failed index fetch is the only error here.
    async fn list_candidates(&self) -> Result<Vec<RawListing>>;

    /// Fetches an article page. Never fails; problems come back as
    /// [`DetailOutcome::FetchFailed`] or [`DetailOutcome::NoArticleBody`].
    async fn fetch_detail(&self, url: &str) -> DetailOutcome;
}

/// Markup-to-field mapping for one site. Swapping the layout is all a site
/// redesign should require.
pub trait SiteLayout: Send + Sync {
    fn name(&self) -> &'static str;

    fn emoji(&self) -> &'static str {
        "📰"
    }

    fn parse_listings(&self, html: &str, base: &Url) -> Vec<RawListing>;

    fn parse_detail(&self, html: &str) -> DetailOutcome;
}

/// Generic HTTP scraper: fetches pages politely and hands the markup to a
/// [`SiteLayout`].
pub struct HtmlScraper<L> {
    client: reqwest::Client,
    limiter: RateLimiter,
    index_url: Url,
    layout: L,
}

impl<L: SiteLayout> HtmlScraper<L> {
    pub fn new(settings: &Settings, layout: L) -> Result<Self> {
        let index_url = Url::parse(&settings.base_url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", settings.base_url, e)))?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.request_timeout())
            .build()?;

        Ok(Self {
            client,
            limiter: RateLimiter::new(settings.rate_limit_delay()?),
            index_url,
            layout,
        })
    }

    pub fn layout(&self) -> &L {
        &self.layout
    }

    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.limiter.await_slot().await;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::fetch(url, e))?;
        response.text().await.map_err(|e| Error::fetch(url, e))
    }
}

#[async_trait]
impl<L: SiteLayout> Scraper for HtmlScraper<L> {
    fn source_metadata(&self) -> SourceMetadata {
        SourceMetadata {
            name: self.layout.name(),
            emoji: self.layout.emoji(),
            index_url: self.index_url.to_string(),
        }
    }

    async fn list_candidates(&self) -> Result<Vec<RawListing>> {
        info!("Scraping articles from {}", self.index_url);
        let html = self.fetch_page(self.index_url.as_str()).await?;
        let listings = self.layout.parse_listings(&html, &self.index_url);
        info!("{} Found {} articles to process", self.layout.emoji(), listings.len());
        Ok(listings)
    }

    async fn fetch_detail(&self, url: &str) -> DetailOutcome {
        match self.fetch_page(url).await {
            Ok(html) => {
                let outcome = self.layout.parse_detail(&html);
                if let DetailOutcome::NoArticleBody = outcome {
                    warn!(url, "No article body found");
                }
                outcome
            }
            Err(e) => {
                warn!(url, error = %e, "Failed to fetch article page");
                DetailOutcome::FetchFailed(e.to_string())
            }
        }
    }
}

/// Common utilities for layouts
pub(crate) mod utils {
    use scraper::{ElementRef, Selector};
    use url::Url;

    /// Text content of an element with runs of whitespace collapsed.
    pub fn clean_text(element: ElementRef<'_>) -> String {
        element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ")
    }

    /// Trimmed text of the first match, `None` when missing or blank.
    pub fn select_text(element: ElementRef<'_>, selector: &Selector) -> Option<String> {
        element
            .select(selector)
            .next()
            .map(clean_text)
            .filter(|text| !text.is_empty())
    }

    pub fn select_attr(element: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
        element
            .select(selector)
            .next()
            .and_then(|el| el.value().attr(attr))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
        let href = href.trim();
        if href.is_empty() {
            return None;
        }
        base.join(href).ok().map(String::from)
    }
}
