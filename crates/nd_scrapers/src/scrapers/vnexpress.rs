use lazy_static::lazy_static;
use nd_core::{DetailContent, DetailOutcome, RawListing};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use super::utils::{clean_text, resolve_link, select_attr, select_text};
use super::SiteLayout;

lazy_static! {
    static ref LISTING_BLOCK: Selector = Selector::parse("article.thumb-left").unwrap();
    static ref AD_MARKER: Selector = Selector::parse("ins.adsbyeclick, script").unwrap();
    static ref TITLE_LINK: Selector = Selector::parse("h3.title-news a").unwrap();
    static ref TITLE: Selector = Selector::parse("h3.title-news").unwrap();
    static ref LOCATION: Selector = Selector::parse("span.location-stamp").unwrap();
    static ref TIME_AGO: Selector = Selector::parse("span.time-ago[datetime]").unwrap();
    static ref DESCRIPTION: Selector = Selector::parse("p.description a").unwrap();
    static ref THUMB_IMG: Selector = Selector::parse("div.thumb-art img").unwrap();
    static ref ARTICLE_BODY: Selector = Selector::parse("article.fck_detail").unwrap();
    static ref PARAGRAPH: Selector = Selector::parse("p.Normal").unwrap();
    static ref BREADCRUMB_CATEGORY: Selector = Selector::parse("ul.breadcrumb a[data-medium]").unwrap();
}

/// Layout of the VnExpress "latest news" index and article pages.
#[derive(Debug, Clone, Default)]
pub struct VnExpressLayout;

impl VnExpressLayout {
    pub fn new() -> Self {
        Self
    }

    fn is_advertisement(block: ElementRef<'_>) -> bool {
        block.select(&AD_MARKER).next().is_some()
    }

    fn parse_block(block: ElementRef<'_>, base: &Url) -> Option<RawListing> {
        let title = select_text(block, &TITLE)?;
        let href = select_attr(block, &TITLE_LINK, "href")?;
        let link_url = resolve_link(base, &href)?;

        let image_url = block.select(&THUMB_IMG).next().and_then(|img| {
            let img = img.value();
            img.attr("data-src")
                .or_else(|| img.attr("src"))
                .map(str::trim)
                .filter(|src| !src.is_empty())
                .map(str::to_string)
        });

        Some(RawListing {
            title,
            link_url,
            location: select_text(block, &LOCATION),
            published_at: select_attr(block, &TIME_AGO, "datetime"),
            description: select_text(block, &DESCRIPTION),
            image_url,
        })
    }
}

impl SiteLayout for VnExpressLayout {
    fn name(&self) -> &'static str {
        "VnExpress"
    }

    fn emoji(&self) -> &'static str {
        "🇻🇳"
    }

    fn parse_listings(&self, html: &str, base: &Url) -> Vec<RawListing> {
        let document = Html::parse_document(html);
        let mut listings = Vec::new();

        for block in document.select(&LISTING_BLOCK) {
            if Self::is_advertisement(block) {
                continue;
            }
            match Self::parse_block(block, base) {
                Some(listing) => listings.push(listing),
                None => debug!("Skipping listing block without title or link"),
            }
        }
        listings
    }

    fn parse_detail(&self, html: &str) -> DetailOutcome {
        let document = Html::parse_document(html);
        if document.select(&ARTICLE_BODY).next().is_none() {
            return DetailOutcome::NoArticleBody;
        }

        // Whitespace is normalised per paragraph and blank paragraphs dropped.
        let content = document
            .select(&PARAGRAPH)
            .map(clean_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let category = select_text(document.root_element(), &BREADCRUMB_CATEGORY);

        DetailOutcome::Extracted(DetailContent { content, category })
    }
}
