//! The analysis run: search, count mentions, persist, aggregate, summarize.
//!
//! One call to [`MentionPipeline::run`] is a single sequential pass over
//! whatever the search source returns. Collaborator failures (a page that
//! would not download, a store write that failed, a search that errored) are
//! logged and absorbed; the only errors surfaced are input errors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::analyzer::TextAnalyzer;
use crate::data_models::{
    AnalysisReport, AnalysisRequest, DateFilter, DateFilterStats, DomainCount, MentionCount, Page,
    Summary,
};
use crate::error::AnalysisError;
use crate::frequency::FrequencyAggregator;
use crate::mentions::MentionCounter;
use crate::normalizer::normalize_text;
use crate::search::{SearchQuery, SearchSource};
use crate::stopwords::StopWordCache;
use crate::store::MentionStore;

const TOP_DOMAINS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    /// Largest term group analysed; extra terms are dropped.
    pub max_terms: usize,
    /// Words must be longer than this to enter the association tables.
    pub min_word_len: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_terms: 5,
            min_word_len: 2,
        }
    }
}

/// Trims the terms, drops blanks and repeats (first position wins) and caps
/// the group at `max_terms`.
pub fn normalize_term_group(terms: &[String], max_terms: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_string()))
        .take(max_terms)
        .map(str::to_string)
        .collect()
}

pub struct MentionPipeline {
    source: Arc<dyn SearchSource>,
    store: Arc<dyn MentionStore>,
    stop_words: Arc<StopWordCache>,
    settings: PipelineSettings,
}

impl MentionPipeline {
    pub fn new(
        source: Arc<dyn SearchSource>,
        store: Arc<dyn MentionStore>,
        stop_words: Arc<StopWordCache>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            store,
            stop_words,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn MentionStore> {
        &self.store
    }

    pub async fn run(&self, request: &AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
        request.check_date_range()?;

        let terms = normalize_term_group(&request.terms, self.settings.max_terms);
        if terms.is_empty() {
            info!("empty term group, nothing to search");
            return Ok(AnalysisReport::empty(request, terms));
        }

        let query = SearchQuery {
            terms: &terms,
            max_results: request.depth.max_results(),
            mode: request.mode,
            domain_filter: request.domain_filter(),
        };
        info!(
            source = self.source.name(),
            terms = ?terms,
            mode = %request.mode,
            max_results = query.max_results,
            "starting mention analysis"
        );
        let hits = match self.source.search(&query).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("search failed, analysing no pages: {:#}", e);
                Vec::new()
            }
        };

        let counter = MentionCounter::new(&terms, request.mode);
        let mut consulted: HashSet<String> = HashSet::new();
        let mut retained: HashMap<String, usize> = HashMap::new();
        let mut pages: Vec<Page> = Vec::new();

        for hit in hits {
            if hit.text.trim().is_empty() {
                debug!(url = %hit.url, "no text fetched, skipping");
                continue;
            }
            if !consulted.insert(hit.url.clone()) {
                if let Some(&idx) = retained.get(&hit.url) {
                    pages[idx].merge_discovered(&hit.title, hit.published);
                }
                continue;
            }

            let normalized = normalize_text(&hit.text);
            let mentions = counter.count(&normalized);
            if mentions.total() == 0 {
                debug!(url = %hit.url, "no mentions, discarding");
                continue;
            }
            retained.insert(hit.url.clone(), pages.len());
            pages.push(Page::from_hit(hit, mentions));
        }

        for page in &pages {
            self.persist(page).await;
        }

        // stable: equal totals keep discovery order
        pages.sort_by(|a, b| b.total_mentions().cmp(&a.total_mentions()));

        let date_stats = match request.date_filter {
            DateFilter::Off => None,
            filter => Some(apply_date_filter(&mut pages, request, filter)),
        };

        let analyzer = TextAnalyzer::word_association(
            self.stop_words.clone(),
            &terms,
            self.settings.min_word_len,
        );
        let aggregator = FrequencyAggregator::new(&analyzer);
        let top_words = aggregator.top_words(pages.iter().map(|p| p.text.as_str()), request.top_n);
        let top_bigrams =
            aggregator.top_bigrams(pages.iter().map(|p| p.text.as_str()), request.bigram_top_n);

        let mut summary = summarize(request, terms, consulted.len(), &pages);
        summary.date_filter = date_stats;
        info!(
            consulted = summary.pages_consulted,
            with_mentions = summary.pages_with_mentions,
            total_mentions = summary.total_mentions,
            "mention analysis finished"
        );

        Ok(AnalysisReport {
            pages,
            top_words,
            top_bigrams,
            summary,
        })
    }

    async fn persist(&self, page: &Page) {
        let page_id = match self
            .store
            .upsert_page(&page.url, &page.title, &page.text, page.published)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(url = %page.url, "failed to store page: {:#}", e);
                return;
            }
        };
        if let Err(e) = self.store.record_mentions(&page_id, page.mentions()).await {
            warn!(url = %page.url, "failed to store mentions: {:#}", e);
        }
    }
}

/// Drops pages dated outside the request range; undated pages survive only
/// under [`DateFilter::KeepUndated`].
pub fn apply_date_filter(
    pages: &mut Vec<Page>,
    request: &AnalysisRequest,
    filter: DateFilter,
) -> DateFilterStats {
    let pages_before = pages.len();
    let undated_pages = pages.iter().filter(|p| p.published.is_none()).count();
    pages.retain(|p| match p.published {
        Some(date) => date >= request.date_from && date <= request.date_to,
        None => filter == DateFilter::KeepUndated,
    });
    DateFilterStats {
        pages_before,
        pages_after: pages.len(),
        undated_pages,
    }
}

pub fn summarize(
    request: &AnalysisRequest,
    terms: Vec<String>,
    pages_consulted: usize,
    pages: &[Page],
) -> Summary {
    let mentions_per_term: MentionCount = terms
        .iter()
        .map(|term| {
            let total = pages
                .iter()
                .map(|p| p.mentions().get(term).unwrap_or(0))
                .sum();
            (term.clone(), total)
        })
        .collect();
    let total_mentions: u64 = pages.iter().map(|p| p.total_mentions()).sum();
    let mean_mentions_per_page = if pages.is_empty() {
        0.0
    } else {
        total_mentions as f64 / pages.len() as f64
    };

    let mut summary = Summary::empty(request, terms);
    summary.pages_consulted = pages_consulted;
    summary.pages_with_mentions = pages.len();
    summary.mentions_per_term = mentions_per_term;
    summary.total_mentions = total_mentions;
    summary.mean_mentions_per_page = mean_mentions_per_page;
    summary.top_domains = top_domains(pages, TOP_DOMAINS);
    summary
}

/// Domains by page count, most frequent first, ties in first-seen order.
pub fn top_domains(pages: &[Page], limit: usize) -> Vec<DomainCount> {
    let mut counts: Vec<DomainCount> = Vec::new();
    for page in pages {
        match counts.iter_mut().find(|d| d.domain == page.domain) {
            Some(existing) => existing.pages += 1,
            None => counts.push(DomainCount {
                domain: page.domain.clone(),
                pages: 1,
            }),
        }
    }
    counts.sort_by(|a, b| b.pages.cmp(&a.pages));
    counts.truncate(limit);
    counts
}
