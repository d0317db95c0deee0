use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use mentionscope::data_models::{
    AnalysisRequest, DateFilter, DateFilterStats, MentionCount, Page, SearchHit,
};
use mentionscope::error::AnalysisError;
use mentionscope::mentions::CountingMode;
use mentionscope::pipeline::{MentionPipeline, PipelineSettings};
use mentionscope::search::{SearchQuery, SearchSource};
use mentionscope::stopwords::StopWordCache;
use mentionscope::store::{MemoryStore, MentionStore, PageId};

mod test_helpers {
    use super::*;

    /// Replays a fixed list of hits and records every query it receives.
    pub struct ScriptedSource {
        hits: Vec<SearchHit>,
        fail: bool,
        pub calls: AtomicUsize,
        pub seen_terms: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedSource {
        pub fn new(hits: Vec<SearchHit>) -> Self {
            Self {
                hits,
                fail: false,
                calls: AtomicUsize::new(0),
                seen_terms: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(Vec::new())
            }
        }
    }

    #[async_trait]
    impl SearchSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn search(&self, query: &SearchQuery<'_>) -> Result<Vec<SearchHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_terms.lock().unwrap().push(query.terms.to_vec());
            if self.fail {
                return Err(anyhow!("search backend unavailable"));
            }
            Ok(self.hits.clone())
        }
    }

    /// Rejects every write.
    pub struct BrokenStore;

    #[async_trait]
    impl MentionStore for BrokenStore {
        async fn upsert_page(
            &self,
            _url: &str,
            _title: &str,
            _text: &str,
            _published: Option<NaiveDate>,
        ) -> Result<PageId> {
            Err(anyhow!("disk full"))
        }

        async fn record_mentions(&self, _page_id: &PageId, _mentions: &MentionCount) -> Result<()> {
            Err(anyhow!("disk full"))
        }

        async fn find_pages(
            &self,
            _terms: &[String],
            _domain_filter: Option<&str>,
            _limit: Option<usize>,
        ) -> Result<Vec<Page>> {
            Ok(Vec::new())
        }
    }

    pub fn hit(url: &str, text: &str) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            title: format!("Title of {url}"),
            text: text.to_string(),
            source: "scripted".to_string(),
            ..Default::default()
        }
    }

    pub fn dated_hit(url: &str, text: &str, published: &str) -> SearchHit {
        SearchHit {
            published: Some(date(published)),
            ..hit(url, text)
        }
    }

    pub fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub fn request(terms: &[&str]) -> AnalysisRequest {
        AnalysisRequest::new(
            terms.iter().map(|t| t.to_string()).collect(),
            date("2024-01-01"),
            date("2024-01-31"),
        )
    }

    pub fn pipeline_with(
        source: Arc<ScriptedSource>,
        store: Arc<dyn MentionStore>,
    ) -> MentionPipeline {
        MentionPipeline::new(
            source,
            store,
            Arc::new(StopWordCache::fixed(["el", "al", "y", "de", "la"])),
            PipelineSettings::default(),
        )
    }

    /// Same wiring as the binary: built-in Spanish stopwords.
    pub fn spanish_pipeline(source: Arc<ScriptedSource>) -> MentionPipeline {
        MentionPipeline::new(
            source,
            Arc::new(MemoryStore::new()),
            Arc::new(StopWordCache::spanish()),
            PipelineSettings::default(),
        )
    }

    pub fn pipeline(source: Arc<ScriptedSource>) -> MentionPipeline {
        pipeline_with(source, Arc::new(MemoryStore::new()))
    }
}

use test_helpers::*;

#[tokio::test]
async fn test_single_page_single_term() -> Result<()> {
    let source = Arc::new(ScriptedSource::new(vec![hit(
        "https://news.example.com/gatos",
        "el gato subio al tejado y el gato bajo",
    )]));
    let report = pipeline(source).run(&request(&["gato"])).await?;

    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.pages[0].mentions().get("gato"), Some(2));
    assert_eq!(report.pages[0].total_mentions(), 2);
    assert_eq!(report.pages[0].domain, "news.example.com");
    assert_eq!(report.pages[0].source, "scripted");

    let words: Vec<&str> = report.top_words.iter().map(|w| w.word.as_str()).collect();
    assert!(!words.contains(&"gato"));
    assert!(words.contains(&"tejado"));
    assert!(words.contains(&"bajo"));
    assert!(!words.contains(&"el"));

    let summary = &report.summary;
    assert_eq!(summary.pages_consulted, 1);
    assert_eq!(summary.pages_with_mentions, 1);
    assert_eq!(summary.total_mentions, 2);
    assert_eq!(summary.mean_mentions_per_page, 2.0);
    assert_eq!(summary.counting_mode, CountingMode::ExactPhrase);
    assert_eq!(summary.max_results, 100);
    Ok(())
}

#[tokio::test]
async fn test_single_page_with_builtin_stopwords() -> Result<()> {
    let source = Arc::new(ScriptedSource::new(vec![hit(
        "https://news.example.com/gatos",
        "el gato subio al tejado y el gato bajo",
    )]));
    let report = spanish_pipeline(source).run(&request(&["gato"])).await?;

    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.summary.total_mentions, 2);
    let words: Vec<&str> = report.top_words.iter().map(|w| w.word.as_str()).collect();
    assert!(words.contains(&"tejado"));
    assert!(words.contains(&"bajo"));
    assert!(!words.contains(&"gato"));
    assert!(!words.contains(&"el"));
    assert!(!words.contains(&"al"));
    Ok(())
}

#[tokio::test]
async fn test_term_group_capped_at_five() -> Result<()> {
    let source = Arc::new(ScriptedSource::new(Vec::new()));
    let report = pipeline(source.clone())
        .run(&request(&["a", "b", "c", "d", "e", "f"]))
        .await?;

    assert_eq!(report.summary.terms, vec!["a", "b", "c", "d", "e"]);
    let seen = source.seen_terms.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(!seen[0].contains(&"f".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_blank_term_group_skips_search() -> Result<()> {
    let source = Arc::new(ScriptedSource::new(vec![hit("https://a.com", "gato")]));
    let report = pipeline(source.clone()).run(&request(&["  ", ""])).await?;

    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    assert!(report.pages.is_empty());
    assert!(report.top_words.is_empty());
    assert!(report.top_bigrams.is_empty());
    assert!(report.summary.terms.is_empty());
    assert_eq!(report.summary.total_mentions, 0);
    assert_eq!(report.summary.mean_mentions_per_page, 0.0);
    assert_eq!(
        request(&["  "]).validate(),
        Err(AnalysisError::EmptyTermGroup)
    );
    Ok(())
}

#[tokio::test]
async fn test_invalid_date_range_is_rejected_before_search() {
    let source = Arc::new(ScriptedSource::new(Vec::new()));
    let mut req = request(&["gato"]);
    req.date_from = date("2024-02-01");

    let err = pipeline(source.clone()).run(&req).await.unwrap_err();
    assert_eq!(
        err,
        AnalysisError::InvalidDateRange {
            from: date("2024-02-01"),
            to: date("2024-01-31"),
        }
    );
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_pages_ordered_by_total_mentions() -> Result<()> {
    let source = Arc::new(ScriptedSource::new(vec![
        hit("https://a.com/3", "gato gato gato"),
        hit("https://b.com/5", "gato gato gato gato gato"),
        hit("https://c.com/3", "un gato otro gato y un gato"),
    ]));
    let report = pipeline(source).run(&request(&["gato"])).await?;

    let urls: Vec<&str> = report.pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec!["https://b.com/5", "https://a.com/3", "https://c.com/3"]);
    Ok(())
}

#[tokio::test]
async fn test_pages_without_mentions_are_dropped() -> Result<()> {
    let source = Arc::new(ScriptedSource::new(vec![
        hit("https://a.com/si", "el gato duerme tranquilo"),
        hit("https://b.com/no", "el ornitorrinco nada tranquilo"),
        hit("https://c.com/vacia", "   "),
    ]));
    let report = pipeline(source).run(&request(&["gato"])).await?;

    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.pages[0].url, "https://a.com/si");
    // the blank page was never consulted
    assert_eq!(report.summary.pages_consulted, 2);
    assert_eq!(report.summary.pages_with_mentions, 1);
    assert!(report.top_words.iter().all(|w| w.word != "ornitorrinco"));
    assert!(report.top_words.iter().any(|w| w.word == "tranquilo"));
    Ok(())
}

#[tokio::test]
async fn test_mean_is_zero_without_mentions() -> Result<()> {
    let source = Arc::new(ScriptedSource::new(vec![hit("https://a.com", "nada que ver")]));
    let report = pipeline(source).run(&request(&["gato"])).await?;

    assert!(report.pages.is_empty());
    assert!(report.top_words.is_empty());
    assert_eq!(report.summary.pages_consulted, 1);
    assert_eq!(report.summary.mean_mentions_per_page, 0.0);
    assert_eq!(report.summary.mentions_per_term.get("gato"), Some(0));
    Ok(())
}

#[tokio::test]
async fn test_any_term_keeps_a_page() -> Result<()> {
    let source = Arc::new(ScriptedSource::new(vec![hit(
        "https://a.com",
        "solo hablamos del perro",
    )]));
    let report = pipeline(source).run(&request(&["gato", "perro"])).await?;

    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.pages[0].mentions().get("gato"), Some(0));
    assert_eq!(report.summary.mentions_per_term.get("perro"), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_duplicate_urls_counted_once() -> Result<()> {
    let mut second = dated_hit("https://a.com/x", "gato gato gato gato", "2024-01-10");
    second.title = "Later title".to_string();
    let mut first = hit("https://a.com/x", "el gato");
    first.title = String::new();

    let source = Arc::new(ScriptedSource::new(vec![first, second]));
    let report = pipeline(source).run(&request(&["gato"])).await?;

    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.pages[0].total_mentions(), 1);
    assert_eq!(report.pages[0].title, "Later title");
    assert_eq!(report.pages[0].published, Some(date("2024-01-10")));
    assert_eq!(report.summary.pages_consulted, 1);
    Ok(())
}

#[tokio::test]
async fn test_date_filter_variants() -> Result<()> {
    let hits = vec![
        dated_hit("https://a.com/in", "gato", "2024-01-15"),
        dated_hit("https://b.com/out", "gato gato", "2023-06-01"),
        hit("https://c.com/undated", "gato"),
    ];

    let mut req = request(&["gato"]);
    let off = pipeline(Arc::new(ScriptedSource::new(hits.clone())))
        .run(&req)
        .await?;
    assert_eq!(off.pages.len(), 3);
    assert_eq!(off.summary.date_filter, None);

    req.date_filter = DateFilter::Strict;
    let strict = pipeline(Arc::new(ScriptedSource::new(hits.clone())))
        .run(&req)
        .await?;
    assert_eq!(strict.pages.len(), 1);
    assert_eq!(strict.pages[0].url, "https://a.com/in");
    assert_eq!(
        strict.summary.date_filter,
        Some(DateFilterStats {
            pages_before: 3,
            pages_after: 1,
            undated_pages: 1,
        })
    );
    assert_eq!(strict.summary.total_mentions, 1);

    req.date_filter = DateFilter::KeepUndated;
    let keep = pipeline(Arc::new(ScriptedSource::new(hits))).run(&req).await?;
    let urls: Vec<&str> = keep.pages.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec!["https://a.com/in", "https://c.com/undated"]);
    Ok(())
}

#[tokio::test]
async fn test_retained_pages_are_persisted() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let source = Arc::new(ScriptedSource::new(vec![
        hit("https://a.com/1", "gato y perro"),
        hit("https://b.com/2", "perro perro"),
        hit("https://c.com/3", "nada"),
    ]));
    let p = pipeline_with(source, store.clone());
    p.run(&request(&["gato", "perro"])).await?;

    assert_eq!(store.page_count(), 2);
    let stored = p
        .store()
        .find_pages(&["perro".to_string()], None, None)
        .await?;
    let urls: Vec<&str> = stored.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(urls, vec!["https://b.com/2", "https://a.com/1"]);

    // a second run over the same pages does not duplicate them
    let source = Arc::new(ScriptedSource::new(vec![hit("https://a.com/1", "gato y perro")]));
    pipeline_with(source, store.clone())
        .run(&request(&["gato"]))
        .await?;
    assert_eq!(store.page_count(), 2);
    Ok(())
}

#[tokio::test]
async fn test_storage_failures_do_not_abort() -> Result<()> {
    let source = Arc::new(ScriptedSource::new(vec![hit("https://a.com", "gato")]));
    let report = pipeline_with(source, Arc::new(BrokenStore))
        .run(&request(&["gato"]))
        .await?;
    assert_eq!(report.pages.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_search_failure_yields_empty_report() -> Result<()> {
    let source = Arc::new(ScriptedSource::failing());
    let report = pipeline(source.clone()).run(&request(&["gato"])).await?;

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert!(report.pages.is_empty());
    assert_eq!(report.summary.terms, vec!["gato"]);
    assert_eq!(report.summary.pages_consulted, 0);
    Ok(())
}

#[tokio::test]
async fn test_bigrams_and_top_domains() -> Result<()> {
    let source = Arc::new(ScriptedSource::new(vec![
        hit("https://a.com/1", "gato negro cruza calle oscura"),
        hit("https://a.com/2", "gato negro cruza avenida"),
        hit("https://b.com/1", "gato"),
    ]));
    let report = pipeline(source).run(&request(&["gato"])).await?;

    assert_eq!(report.top_bigrams[0].word, "negro cruza");
    assert_eq!(report.top_bigrams[0].frequency, 2);
    assert_eq!(report.summary.top_domains[0].domain, "a.com");
    assert_eq!(report.summary.top_domains[0].pages, 2);
    assert_eq!(report.summary.top_domains[1].domain, "b.com");
    Ok(())
}
