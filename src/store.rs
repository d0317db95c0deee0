use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::data_models::{MentionCount, Page, domain_of};

pub type PageId = String;

/// Where analysed pages and their mention counts are kept between runs.
///
/// Both writes are idempotent: upserting the same URL again returns the same
/// id, and recording mentions for a (page, term) pair overwrites the count.
#[async_trait]
pub trait MentionStore: Send + Sync {
    /// Creates the page or refreshes it. Title, text, domain and publication
    /// date of an existing page are only filled in when still unknown.
    async fn upsert_page(
        &self,
        url: &str,
        title: &str,
        text: &str,
        published: Option<NaiveDate>,
    ) -> Result<PageId>;

    /// Stores the positive counts of `mentions`; zero counts are not written.
    async fn record_mentions(&self, page_id: &PageId, mentions: &MentionCount) -> Result<()>;

    /// Stored pages with a mention of any of `terms` (all pages with mentions
    /// when `terms` is empty), most mentioned first. The mention map of each
    /// page only holds the requested terms.
    async fn find_pages(
        &self,
        terms: &[String],
        domain_filter: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Page>>;
}

#[derive(Debug, Clone)]
struct MemoryPage {
    url: String,
    domain: String,
    title: String,
    text: String,
    published: Option<NaiveDate>,
    last_seen_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    pages: Vec<MemoryPage>,
    by_url: HashMap<String, usize>,
    mentions: Vec<(usize, String, u64)>,
}

/// Process-local store, used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page_count(&self) -> usize {
        self.state.lock().map(|s| s.pages.len()).unwrap_or(0)
    }

    pub fn last_seen(&self, url: &str) -> Option<DateTime<Utc>> {
        let state = self.state.lock().ok()?;
        state.by_url.get(url).map(|&i| state.pages[i].last_seen_at)
    }

    fn parse_id(page_id: &PageId) -> Result<usize> {
        page_id
            .parse()
            .map_err(|_| anyhow!("invalid page id: {page_id}"))
    }
}

#[async_trait]
impl MentionStore for MemoryStore {
    async fn upsert_page(
        &self,
        url: &str,
        title: &str,
        text: &str,
        published: Option<NaiveDate>,
    ) -> Result<PageId> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        let now = Utc::now();
        if let Some(&idx) = state.by_url.get(url) {
            let page = &mut state.pages[idx];
            if page.title.is_empty() {
                page.title = title.to_string();
            }
            if page.text.is_empty() {
                page.text = text.to_string();
            }
            if page.domain.is_empty() {
                page.domain = domain_of(url);
            }
            if page.published.is_none() {
                page.published = published;
            }
            page.last_seen_at = now;
            return Ok(idx.to_string());
        }

        let idx = state.pages.len();
        state.pages.push(MemoryPage {
            url: url.to_string(),
            domain: domain_of(url),
            title: title.to_string(),
            text: text.to_string(),
            published,
            last_seen_at: now,
        });
        state.by_url.insert(url.to_string(), idx);
        Ok(idx.to_string())
    }

    async fn record_mentions(&self, page_id: &PageId, mentions: &MentionCount) -> Result<()> {
        let idx = Self::parse_id(page_id)?;
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        if idx >= state.pages.len() {
            return Ok(());
        }
        for m in mentions.iter().filter(|m| m.count > 0) {
            match state
                .mentions
                .iter_mut()
                .find(|(p, term, _)| *p == idx && *term == m.term)
            {
                Some(existing) => existing.2 = m.count,
                None => state.mentions.push((idx, m.term.clone(), m.count)),
            }
        }
        Ok(())
    }

    async fn find_pages(
        &self,
        terms: &[String],
        domain_filter: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Page>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        let domain_filter = domain_filter.map(str::to_lowercase);

        let mut order: Vec<usize> = Vec::new();
        let mut per_page: HashMap<usize, MentionCount> = HashMap::new();
        for (idx, term, count) in &state.mentions {
            if !terms.is_empty() && !terms.contains(term) {
                continue;
            }
            let page = &state.pages[*idx];
            if let Some(filter) = &domain_filter
                && !page.domain.to_lowercase().contains(filter)
            {
                continue;
            }
            per_page
                .entry(*idx)
                .or_insert_with(|| {
                    order.push(*idx);
                    MentionCount::default()
                })
                .push(term.clone(), *count);
        }

        let mut pages: Vec<Page> = order
            .into_iter()
            .filter_map(|idx| {
                let mentions = per_page.remove(&idx)?;
                let p = &state.pages[idx];
                Some(Page::new(
                    p.url.clone(),
                    p.title.clone(),
                    String::new(),
                    p.text.clone(),
                    p.published,
                    mentions,
                ))
            })
            .collect();
        pages.sort_by(|a, b| b.total_mentions().cmp(&a.total_mentions()));
        if let Some(limit) = limit {
            pages.truncate(limit);
        }
        Ok(pages)
    }
}
