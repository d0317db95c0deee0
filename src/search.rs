use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{StatusCode, Url};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::data_models::{SearchHit, domain_of};
use crate::fetcher::PageFetcher;
use crate::mentions::CountingMode;

/// How many raw results to ask the search source for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchDepth {
    Quick,
    #[default]
    Normal,
    Deep,
}

impl SearchDepth {
    pub fn max_results(&self) -> usize {
        match self {
            SearchDepth::Quick => 50,
            SearchDepth::Normal => 100,
            SearchDepth::Deep => 200,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Quick => "quick",
            SearchDepth::Normal => "normal",
            SearchDepth::Deep => "deep",
        }
    }

    /// Unknown labels mean [`SearchDepth::Normal`].
    pub fn parse_or_default(label: &str) -> Self {
        label.parse().unwrap_or_default()
    }
}

impl fmt::Display for SearchDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchDepth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quick" | "rapido" | "rápido" => Ok(SearchDepth::Quick),
            "normal" => Ok(SearchDepth::Normal),
            "deep" | "profundo" => Ok(SearchDepth::Deep),
            other => Err(format!("unknown search depth: {other}")),
        }
    }
}

pub struct SearchQuery<'a> {
    pub terms: &'a [String],
    pub max_results: usize,
    pub mode: CountingMode,
    pub domain_filter: Option<&'a str>,
}

/// Anything that can turn a term group into fetched pages.
///
/// Implementations cap their output at `query.max_results` raw results and
/// skip URLs that do not contain `query.domain_filter`. Pages that could not
/// be downloaded come back with empty text rather than as errors.
#[async_trait]
pub trait SearchSource: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &SearchQuery<'_>) -> Result<Vec<SearchHit>>;
}

/// Quotes every term; `any_word` joins them with `OR`.
pub fn build_query(terms: &[String], mode: CountingMode) -> String {
    let quoted: Vec<String> = terms.iter().map(|t| format!("\"{t}\"")).collect();
    match mode {
        CountingMode::AnyWord => quoted.join(" OR "),
        CountingMode::ExactPhrase | CountingMode::AllWords => quoted.join(" "),
    }
}

/// Case-insensitive substring match of the filter against the URL.
pub fn domain_matches(url: &str, filter: &str) -> bool {
    url.to_lowercase().contains(&filter.to_lowercase())
}

static RESULT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("div.result").unwrap());
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a.result__a").unwrap());
static SNIPPET_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".result__snippet").unwrap());

/// One entry of a search result listing, before its page is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultLink {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

/// Reads the result links out of a DuckDuckGo HTML listing, skipping ads.
pub fn parse_results(html: &str) -> Vec<ResultLink> {
    let document = Html::parse_document(html);
    let mut links = Vec::new();
    for result in document.select(&RESULT_SELECTOR) {
        if result.value().classes().any(|c| c == "result--ad") {
            continue;
        }
        let Some(anchor) = result.select(&LINK_SELECTOR).next() else {
            continue;
        };
        let Some(url) = anchor.value().attr("href").and_then(decode_result_url) else {
            continue;
        };
        let title = anchor.text().collect::<String>().trim().to_string();
        let snippet = result
            .select(&SNIPPET_SELECTOR)
            .next()
            .map(|s| s.text().collect::<String>().trim().to_string())
            .unwrap_or_default();
        links.push(ResultLink {
            url,
            title,
            snippet,
        });
    }
    links
}

/// Resolves DuckDuckGo redirect links (`//duckduckgo.com/l/?uddg=...`) to
/// their target. Other http(s) links pass through unchanged.
pub fn decode_result_url(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else if href.starts_with('/') {
        format!("https://duckduckgo.com{href}")
    } else {
        href.to_string()
    };
    let url = Url::parse(&absolute).ok()?;
    if let Some((_, target)) = url.query_pairs().find(|(k, _)| k == "uddg") {
        return Some(target.into_owned());
    }
    let is_internal = url
        .host_str()
        .is_some_and(|h| h == "duckduckgo.com" || h.ends_with(".duckduckgo.com"));
    match url.scheme() {
        "http" | "https" if !is_internal => Some(absolute),
        _ => None,
    }
}

/// Searches the DuckDuckGo HTML endpoint and fetches every result it lists.
pub struct DuckDuckGoSource {
    client: reqwest::Client,
    fetcher: PageFetcher,
    endpoint: String,
}

impl DuckDuckGoSource {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            fetcher: PageFetcher::new(client.clone()),
            client,
            endpoint: endpoint.into(),
        }
    }

    async fn fetch_listing(&self, query: &str, offset: usize) -> Result<String> {
        let offset = offset.to_string();
        let url = Url::parse_with_params(&self.endpoint, &[("q", query), ("s", offset.as_str())])
            .context("invalid search endpoint")?;
        let res = self.client.get(url).send().await?;
        if res.status() != StatusCode::OK {
            anyhow::bail!("search endpoint answered {}", res.status());
        }
        Ok(res.text().await?)
    }
}

#[async_trait]
impl SearchSource for DuckDuckGoSource {
    fn name(&self) -> &str {
        "ddg"
    }

    async fn search(&self, query: &SearchQuery<'_>) -> Result<Vec<SearchHit>> {
        let q = build_query(query.terms, query.mode);
        let mut seen: HashSet<String> = HashSet::new();
        let mut hits = Vec::new();
        let mut offset = 0usize;

        while seen.len() < query.max_results {
            let listing = match self.fetch_listing(&q, offset).await {
                Ok(html) => html,
                Err(e) => {
                    log::warn!("search listing at offset {offset} failed: {:#}", e);
                    break;
                }
            };
            let links = parse_results(&listing);
            if links.is_empty() {
                break;
            }
            offset += links.len();

            let mut fresh = 0usize;
            for link in links {
                if seen.len() >= query.max_results {
                    break;
                }
                if !seen.insert(link.url.clone()) {
                    continue;
                }
                fresh += 1;
                if let Some(filter) = query.domain_filter
                    && !domain_matches(&link.url, filter)
                {
                    continue;
                }

                log::info!("fetching result: {}", link.url);
                let page = self.fetcher.fetch(&link.url).await;
                let title = if link.title.is_empty() {
                    page.title
                } else {
                    link.title
                };
                hits.push(SearchHit {
                    domain: domain_of(&link.url),
                    url: link.url,
                    title,
                    snippet: link.snippet,
                    text: page.text,
                    published: page.published,
                    source: self.name().to_string(),
                });
            }
            if fresh == 0 {
                break;
            }
        }

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_results() {
        assert_eq!(SearchDepth::Quick.max_results(), 50);
        assert_eq!(SearchDepth::Normal.max_results(), 100);
        assert_eq!(SearchDepth::Deep.max_results(), 200);
        assert_eq!(SearchDepth::parse_or_default("Profundo"), SearchDepth::Deep);
        assert_eq!(SearchDepth::parse_or_default("whatever"), SearchDepth::Normal);
    }

    #[test]
    fn test_build_query() {
        let terms = vec!["Lionel Messi".to_string(), "Barcelona".to_string()];
        assert_eq!(
            build_query(&terms, CountingMode::ExactPhrase),
            "\"Lionel Messi\" \"Barcelona\""
        );
        assert_eq!(
            build_query(&terms, CountingMode::AnyWord),
            "\"Lionel Messi\" OR \"Barcelona\""
        );
    }

    #[test]
    fn test_domain_matches() {
        assert!(domain_matches("https://www.Clarin.com/x", "clarin.com"));
        assert!(!domain_matches("https://lanacion.com.ar/x", "clarin"));
    }

    #[test]
    fn test_decode_result_url() {
        assert_eq!(
            decode_result_url("//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.clarin.com%2Fnota%3Fid%3D1&rut=abc"),
            Some("https://www.clarin.com/nota?id=1".to_string())
        );
        assert_eq!(
            decode_result_url("https://example.com/a"),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(decode_result_url("//duckduckgo.com/y.js?ad=1"), None);
        assert_eq!(decode_result_url("javascript:void(0)"), None);
    }

    #[test]
    fn test_parse_results_skips_ads() {
        let html = r#"<html><body>
            <div class="result result--ad">
                <a class="result__a" href="https://ads.example.com">Anuncio</a>
            </div>
            <div class="result results_links">
                <h2><a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fa.com%2F1">Primera <b>nota</b></a></h2>
                <a class="result__snippet">Resumen de la nota</a>
            </div>
            <div class="result">
                <a class="result__a" href="https://b.com/2">Segunda</a>
            </div>
            <div class="result"><span>sin enlace</span></div>
        </body></html>"#;
        let links = parse_results(html);
        assert_eq!(
            links,
            vec![
                ResultLink {
                    url: "https://a.com/1".into(),
                    title: "Primera nota".into(),
                    snippet: "Resumen de la nota".into(),
                },
                ResultLink {
                    url: "https://b.com/2".into(),
                    title: "Segunda".into(),
                    snippet: String::new(),
                },
            ]
        );
    }
}
