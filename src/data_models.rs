use chrono::NaiveDate;
use mongodb::bson::{DateTime, oid::ObjectId};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::mentions::CountingMode;
use crate::search::SearchDepth;

/// Mentions of one term on one page.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TermMentions {
    pub term: String,
    pub count: u64,
}

/// Per-term mention counts in term-group order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct MentionCount(Vec<TermMentions>);

impl MentionCount {
    /// Adds a term, or overwrites its count if already present.
    pub fn push(&mut self, term: String, count: u64) {
        match self.0.iter_mut().find(|m| m.term == term) {
            Some(existing) => existing.count = count,
            None => self.0.push(TermMentions { term, count }),
        }
    }

    pub fn get(&self, term: &str) -> Option<u64> {
        self.0.iter().find(|m| m.term == term).map(|m| m.count)
    }

    pub fn total(&self) -> u64 {
        self.0.iter().map(|m| m.count).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TermMentions> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, u64)> for MentionCount {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        let mut mentions = MentionCount::default();
        for (term, count) in iter {
            mentions.push(term, count);
        }
        mentions
    }
}

/// One raw result handed over by a search source, page text already fetched.
#[derive(Debug, Clone, Default)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub domain: String,
    pub snippet: String,
    pub text: String,
    pub published: Option<NaiveDate>,
    pub source: String,
}

/// A page that mentions at least one term of the group.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page {
    pub url: String,
    pub title: String,
    pub domain: String,
    pub snippet: String,
    /// Search source that found the page; empty for pages read back from storage.
    #[serde(default)]
    pub source: String,
    #[serde(skip_serializing, default)]
    pub text: String,
    pub published: Option<NaiveDate>,
    mentions: MentionCount,
    total_mentions: u64,
}

impl Page {
    pub fn new(
        url: String,
        title: String,
        snippet: String,
        text: String,
        published: Option<NaiveDate>,
        mentions: MentionCount,
    ) -> Page {
        let domain = domain_of(&url);
        let total_mentions = mentions.total();
        Page {
            url,
            title,
            domain,
            snippet,
            source: String::new(),
            text,
            published,
            mentions,
            total_mentions,
        }
    }

    pub fn from_hit(hit: SearchHit, mentions: MentionCount) -> Page {
        let mut page = Page::new(hit.url, hit.title, hit.snippet, hit.text, hit.published, mentions);
        if !hit.domain.is_empty() {
            page.domain = hit.domain;
        }
        page.source = hit.source;
        page
    }

    pub fn mentions(&self) -> &MentionCount {
        &self.mentions
    }

    pub fn total_mentions(&self) -> u64 {
        self.total_mentions
    }

    /// Fills in a title or publication date learned later, never overwriting
    /// one already known.
    pub fn merge_discovered(&mut self, title: &str, published: Option<NaiveDate>) {
        if self.title.trim().is_empty() && !title.trim().is_empty() {
            self.title = title.to_string();
        }
        if self.published.is_none() {
            self.published = published;
        }
    }
}

/// Host part of a URL, or empty when it does not parse.
pub fn domain_of(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str().map(|h| match u.port() {
                Some(port) => format!("{h}:{port}"),
                None => h.to_string(),
            })
        })
        .unwrap_or_default()
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WordFrequency {
    pub word: String,
    pub frequency: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DomainCount {
    pub domain: String,
    pub pages: usize,
}

/// Whether and how publication dates narrow the page set.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DateFilter {
    /// Dates are reported but nothing is excluded.
    #[default]
    Off,
    /// Pages outside the range, or without a detected date, are dropped.
    Strict,
    /// Pages outside the range are dropped, undated pages are kept.
    KeepUndated,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateFilterStats {
    pub pages_before: usize,
    pub pages_after: usize,
    pub undated_pages: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AnalysisRequest {
    pub terms: Vec<String>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default)]
    pub depth: SearchDepth,
    #[serde(default)]
    pub mode: CountingMode,
    #[serde(default)]
    pub domain_filter: Option<String>,
    #[serde(default = "default_top_words")]
    pub top_n: usize,
    #[serde(default = "default_top_bigrams")]
    pub bigram_top_n: usize,
    #[serde(default)]
    pub date_filter: DateFilter,
}

fn default_top_words() -> usize {
    30
}

fn default_top_bigrams() -> usize {
    20
}

impl AnalysisRequest {
    pub fn new(terms: Vec<String>, date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            terms,
            date_from,
            date_to,
            depth: SearchDepth::default(),
            mode: CountingMode::default(),
            domain_filter: None,
            top_n: default_top_words(),
            bigram_top_n: default_top_bigrams(),
            date_filter: DateFilter::default(),
        }
    }

    pub fn check_date_range(&self) -> Result<(), AnalysisError> {
        if self.date_from > self.date_to {
            return Err(AnalysisError::InvalidDateRange {
                from: self.date_from,
                to: self.date_to,
            });
        }
        Ok(())
    }

    /// Full input validation for callers that want an empty term group
    /// reported as an error instead of an empty report.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.terms.iter().all(|t| t.trim().is_empty()) {
            return Err(AnalysisError::EmptyTermGroup);
        }
        self.check_date_range()
    }

    /// Domain filter with surrounding blanks removed, `None` when blank.
    pub fn domain_filter(&self) -> Option<&str> {
        self.domain_filter
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Summary {
    pub terms: Vec<String>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub depth: SearchDepth,
    pub max_results: usize,
    pub counting_mode: CountingMode,
    pub domain_filter: Option<String>,
    pub pages_consulted: usize,
    pub pages_with_mentions: usize,
    pub mentions_per_term: MentionCount,
    pub total_mentions: u64,
    pub mean_mentions_per_page: f64,
    pub top_domains: Vec<DomainCount>,
    pub date_filter: Option<DateFilterStats>,
}

impl Summary {
    /// Zero-filled summary echoing the request parameters.
    pub fn empty(request: &AnalysisRequest, terms: Vec<String>) -> Summary {
        let mentions_per_term = terms.iter().map(|t| (t.clone(), 0)).collect();
        Summary {
            terms,
            date_from: request.date_from,
            date_to: request.date_to,
            depth: request.depth,
            max_results: request.depth.max_results(),
            counting_mode: request.mode,
            domain_filter: request.domain_filter().map(str::to_string),
            pages_consulted: 0,
            pages_with_mentions: 0,
            mentions_per_term,
            total_mentions: 0,
            mean_mentions_per_page: 0.0,
            top_domains: Vec::new(),
            date_filter: None,
        }
    }
}

/// Everything one analysis run hands to the presentation layer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AnalysisReport {
    pub pages: Vec<Page>,
    pub top_words: Vec<WordFrequency>,
    pub top_bigrams: Vec<WordFrequency>,
    pub summary: Summary,
}

impl AnalysisReport {
    pub fn empty(request: &AnalysisRequest, terms: Vec<String>) -> AnalysisReport {
        AnalysisReport {
            pages: Vec::new(),
            top_words: Vec::new(),
            top_bigrams: Vec::new(),
            summary: Summary::empty(request, terms),
        }
    }
}

/// Page as persisted in the `pages` collection.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PageDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub url: String,
    pub domain: String,
    pub title: String,
    pub text: String,
    pub published_at: Option<DateTime>,
    pub first_seen_at: DateTime,
    pub last_seen_at: DateTime,
}

impl PageDoc {
    pub fn new(url: String, title: String, text: String, published: Option<NaiveDate>) -> PageDoc {
        let now = DateTime::now();
        PageDoc {
            id: ObjectId::new(),
            domain: domain_of(&url),
            url,
            title,
            text,
            published_at: published.map(date_to_bson),
            first_seen_at: now,
            last_seen_at: now,
        }
    }

    pub fn published(&self) -> Option<NaiveDate> {
        self.published_at.and_then(bson_to_date)
    }
}

/// Mentions of one term on one stored page, in the `mentions` collection.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MentionDoc {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub page_id: ObjectId,
    pub term: String,
    pub count: i64,
}

/// Midnight UTC of the given day.
pub fn date_to_bson(date: NaiveDate) -> DateTime {
    DateTime::from_millis(date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis())
}

pub fn bson_to_date(dt: DateTime) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp_millis(dt.timestamp_millis()).map(|d| d.date_naive())
}
