use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use std::time::Duration;

static PARAGRAPH_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());
static TITLE_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static META_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("meta").unwrap());
static TIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").unwrap());

/// Meta `property`/`name`/`itemprop` values that carry a publication date,
/// most specific first.
const DATE_META_KEYS: &[&str] = &[
    "article:published_time",
    "og:published_time",
    "og:article:published_time",
    "datepublished",
    "date",
    "pubdate",
    "publish-date",
    "dc.date",
    "dc.date.issued",
];

/// Text extracted from one downloaded page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedPage {
    pub title: String,
    pub text: String,
    pub published: Option<NaiveDate>,
}

/// Downloads pages and reduces them to their paragraph text.
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
}

/// Shared client for searching and fetching; the timeout applies per request.
pub fn build_client(user_agent: &str, timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .context("failed to build http client")
}

impl PageFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Never fails: any transport error or non-200 answer gives an empty page.
    pub async fn fetch(&self, url: &str) -> FetchedPage {
        match self.try_fetch(url).await {
            Ok(Some(html)) => parse_page(&html),
            Ok(None) => FetchedPage::default(),
            Err(e) => {
                log::warn!("error fetching page {url}, error: {:#}", e);
                FetchedPage::default()
            }
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<Option<String>> {
        let res = self.client.get(url).send().await?;
        if res.status() != StatusCode::OK {
            log::debug!("skipping {url}: status {}", res.status());
            return Ok(None);
        }
        let body = res.text().await?;
        Ok(Some(body))
    }
}

pub fn parse_page(html: &str) -> FetchedPage {
    let document = Html::parse_document(html);
    FetchedPage {
        title: extract_title(&document),
        text: extract_paragraph_text(&document),
        published: detect_published_date(&document),
    }
}

fn extract_title(document: &Html) -> String {
    document
        .select(&TITLE_SELECTOR)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Text of every `<p>`, each paragraph's fragments space-joined, paragraphs
/// joined by a single space.
pub fn extract_paragraph_text(document: &Html) -> String {
    document
        .select(&PARAGRAPH_SELECTOR)
        .map(|p| {
            p.text()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn detect_published_date(document: &Html) -> Option<NaiveDate> {
    let mut candidates: Vec<(usize, &str)> = Vec::new();
    for meta in document.select(&META_SELECTOR) {
        let el = meta.value();
        let key = el
            .attr("property")
            .or_else(|| el.attr("name"))
            .or_else(|| el.attr("itemprop"))
            .map(str::to_lowercase);
        let (Some(key), Some(content)) = (key, el.attr("content")) else {
            continue;
        };
        if let Some(rank) = DATE_META_KEYS.iter().position(|k| *k == key) {
            candidates.push((rank, content));
        }
    }
    candidates.sort_by_key(|(rank, _)| *rank);

    candidates
        .into_iter()
        .find_map(|(_, content)| parse_date(content))
        .or_else(|| {
            document
                .select(&TIME_SELECTOR)
                .filter_map(|t| t.value().attr("datetime"))
                .find_map(parse_date)
        })
}

/// RFC 3339 timestamps, or anything starting with `YYYY-MM-DD`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}
