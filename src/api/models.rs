use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::data_models::{AnalysisReport, AnalysisRequest, DateFilter, Page};
use crate::mentions::CountingMode;
use crate::search::SearchDepth;

/// Body of `POST /api/analyze`. Depth and mode are free-form labels; unknown
/// ones fall back to their defaults instead of rejecting the request.
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub terms: Vec<String>,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    #[serde(default)]
    pub depth: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub domain_filter: Option<String>,
    #[serde(default)]
    pub top_n: Option<usize>,
    #[serde(default)]
    pub bigram_top_n: Option<usize>,
    #[serde(default)]
    pub date_filter: DateFilter,
}

impl AnalyzeRequest {
    pub fn into_analysis(self) -> AnalysisRequest {
        let mut request = AnalysisRequest::new(self.terms, self.date_from, self.date_to);
        if let Some(depth) = self.depth.as_deref() {
            request.depth = SearchDepth::parse_or_default(depth);
        }
        if let Some(mode) = self.mode.as_deref() {
            request.mode = CountingMode::parse_or_default(mode);
        }
        request.domain_filter = self.domain_filter;
        if let Some(n) = self.top_n {
            request.top_n = n;
        }
        if let Some(n) = self.bigram_top_n {
            request.bigram_top_n = n;
        }
        request.date_filter = self.date_filter;
        request
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    #[serde(flatten)]
    pub report: AnalysisReport,
    pub processing_time_ms: u128,
}

/// Query string of `GET /api/pages`; `terms` is comma separated.
#[derive(Debug, Deserialize, Default)]
pub struct PagesQuery {
    pub terms: Option<String>,
    pub domain: Option<String>,
    pub limit: Option<usize>,
}

impl PagesQuery {
    pub fn term_list(&self) -> Vec<String> {
        self.terms
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub struct PagesResponse {
    pub terms: Vec<String>,
    pub pages: Vec<Page>,
    pub total_results: usize,
}
