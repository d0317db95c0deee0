use chrono::NaiveDate;
use thiserror::Error;

/// Input problems reported back to the caller before any search runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("at least one non-empty search term is required")]
    EmptyTermGroup,

    #[error("date range start {from} is after its end {to}")]
    InvalidDateRange { from: NaiveDate, to: NaiveDate },
}
