use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::data_models::MentionCount;
use crate::normalizer::{normalize_text, words};

/// How a (possibly multi-word) term is matched against page text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountingMode {
    /// Whole-word, non-overlapping occurrences of the full phrase.
    #[default]
    ExactPhrase,
    /// Co-occurrence floor: the smallest per-word count among the term's words.
    AllWords,
    /// Sum of the per-word counts of the term's words.
    AnyWord,
}

impl CountingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountingMode::ExactPhrase => "exact_phrase",
            CountingMode::AllWords => "all_words",
            CountingMode::AnyWord => "any_word",
        }
    }

    /// Parses a mode label, falling back to [`CountingMode::ExactPhrase`] for
    /// anything unrecognised.
    pub fn parse_or_default(label: &str) -> Self {
        label.parse().unwrap_or_else(|_| {
            tracing::debug!(label, "unknown counting mode, using exact_phrase");
            CountingMode::default()
        })
    }
}

impl fmt::Display for CountingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "exact_phrase" | "exact" | "frase_exacta" => Ok(CountingMode::ExactPhrase),
            "all_words" | "all" | "todas_las_palabras" => Ok(CountingMode::AllWords),
            "any_word" | "any" | "cualquiera" => Ok(CountingMode::AnyWord),
            other => Err(format!("unknown counting mode: {other}")),
        }
    }
}

/// Counts mentions of one raw term in already-normalized text.
///
/// The term is normalized the same way the text was. An empty normalized term
/// never matches.
pub fn count_mentions(normalized_text: &str, term: &str, mode: CountingMode) -> u64 {
    TermMatcher::new(term, mode).count(normalized_text)
}

/// A single term prepared for repeated counting.
#[derive(Debug, Clone)]
pub struct TermMatcher {
    words: Vec<String>,
    mode: CountingMode,
    phrase: Option<Regex>,
}

impl TermMatcher {
    pub fn new(term: &str, mode: CountingMode) -> Self {
        let normalized = normalize_text(term);
        let words: Vec<String> = words(&normalized).map(str::to_string).collect();
        let phrase = match mode {
            CountingMode::ExactPhrase if !words.is_empty() => {
                // normalized text is plain a-z so the escaped phrase is always valid
                Regex::new(&format!(r"\b{}\b", regex::escape(&words.join(" ")))).ok()
            }
            _ => None,
        };
        Self {
            words,
            mode,
            phrase,
        }
    }

    pub fn count(&self, normalized_text: &str) -> u64 {
        match self.mode {
            CountingMode::ExactPhrase => self.count_with(normalized_text, &WordCounts::default()),
            CountingMode::AllWords | CountingMode::AnyWord => {
                self.count_with(normalized_text, &word_counts(normalized_text))
            }
        }
    }

    /// Like [`TermMatcher::count`], with the per-word counts of the text
    /// already tallied. Exact phrases ignore `counts`.
    pub fn count_with(&self, normalized_text: &str, counts: &WordCounts<'_>) -> u64 {
        if self.words.is_empty() || normalized_text.is_empty() {
            return 0;
        }
        let per_word = self
            .words
            .iter()
            .map(|w| counts.get(w.as_str()).copied().unwrap_or(0));
        match self.mode {
            CountingMode::ExactPhrase => self
                .phrase
                .as_ref()
                .map(|re| re.find_iter(normalized_text).count() as u64)
                .unwrap_or(0),
            CountingMode::AllWords => per_word.min().unwrap_or(0),
            CountingMode::AnyWord => per_word.sum(),
        }
    }
}

/// Occurrences of each word in a normalized text.
pub type WordCounts<'a> = HashMap<&'a str, u64>;

pub fn word_counts(normalized_text: &str) -> WordCounts<'_> {
    let mut counts = HashMap::new();
    for word in words(normalized_text) {
        *counts.entry(word).or_insert(0) += 1;
    }
    counts
}

/// Counts every term of a group against a page, reusing compiled matchers
/// across pages.
pub struct MentionCounter {
    matchers: Vec<(String, TermMatcher)>,
}

impl MentionCounter {
    pub fn new(terms: &[String], mode: CountingMode) -> Self {
        Self {
            matchers: terms
                .iter()
                .map(|t| (t.clone(), TermMatcher::new(t, mode)))
                .collect(),
        }
    }

    /// One entry per term, in group order, zero when absent.
    pub fn count(&self, normalized_text: &str) -> MentionCount {
        let counts = if self.needs_word_counts() {
            word_counts(normalized_text)
        } else {
            WordCounts::default()
        };
        let mut mentions = MentionCount::default();
        for (term, matcher) in &self.matchers {
            mentions.push(term.clone(), matcher.count_with(normalized_text, &counts));
        }
        mentions
    }

    fn needs_word_counts(&self) -> bool {
        self.matchers
            .iter()
            .any(|(_, m)| m.mode != CountingMode::ExactPhrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "el gato subio al tejado y el gato bajo";

    #[test]
    fn test_exact_phrase_single_word() {
        assert_eq!(count_mentions(TEXT, "gato", CountingMode::ExactPhrase), 2);
    }

    #[test]
    fn test_exact_phrase_respects_word_boundaries() {
        let text = "gatos gato gatito el gato";
        assert_eq!(count_mentions(text, "gato", CountingMode::ExactPhrase), 2);
    }

    #[test]
    fn test_exact_phrase_multi_word_and_term_normalized() {
        let text = "lionel messi marco y messi lionel messi celebro";
        assert_eq!(count_mentions(text, "  Lionel   MESSI ", CountingMode::ExactPhrase), 2);
    }

    #[test]
    fn test_exact_phrase_non_overlapping() {
        assert_eq!(count_mentions("la la la", "la la", CountingMode::ExactPhrase), 1);
    }

    #[test]
    fn test_all_words_is_min() {
        let text = "messi gol messi lionel pase messi";
        assert_eq!(count_mentions(text, "Lionel Messi", CountingMode::AllWords), 1);
        assert_eq!(count_mentions(text, "Diego Messi", CountingMode::AllWords), 0);
    }

    #[test]
    fn test_any_word_is_sum() {
        let text = "messi gol messi lionel pase messi";
        assert_eq!(count_mentions(text, "Lionel Messi", CountingMode::AnyWord), 4);
        assert_eq!(count_mentions(text, "Diego Messi", CountingMode::AnyWord), 3);
    }

    #[test]
    fn test_empty_term_counts_zero() {
        for mode in [
            CountingMode::ExactPhrase,
            CountingMode::AllWords,
            CountingMode::AnyWord,
        ] {
            assert_eq!(count_mentions(TEXT, "  ", mode), 0);
            assert_eq!(count_mentions(TEXT, "1234 !!", mode), 0);
        }
    }

    #[test]
    fn test_unknown_mode_falls_back_to_exact_phrase() {
        assert_eq!(CountingMode::parse_or_default("fuzzy"), CountingMode::ExactPhrase);
        assert_eq!(CountingMode::parse_or_default(""), CountingMode::ExactPhrase);
        assert_eq!(CountingMode::parse_or_default("cualquiera"), CountingMode::AnyWord);
        assert_eq!(CountingMode::parse_or_default("ALL_WORDS"), CountingMode::AllWords);
        assert!("fuzzy".parse::<CountingMode>().is_err());
    }

    #[test]
    fn test_counter_matches_single_term_counts_in_every_mode() {
        let text = "messi gol messi lionel pase messi diego";
        let terms = vec![
            "Lionel Messi".to_string(),
            "Diego".to_string(),
            "Pele".to_string(),
        ];
        for mode in [
            CountingMode::ExactPhrase,
            CountingMode::AllWords,
            CountingMode::AnyWord,
        ] {
            let mentions = MentionCounter::new(&terms, mode).count(text);
            for term in &terms {
                assert_eq!(
                    mentions.get(term),
                    Some(count_mentions(text, term, mode)),
                    "{term} in {mode}"
                );
            }
        }
        let any = MentionCounter::new(&terms, CountingMode::AnyWord).count(text);
        assert_eq!(any.get("Lionel Messi"), Some(4));
        assert_eq!(any.get("Diego"), Some(1));
        let all = MentionCounter::new(&terms, CountingMode::AllWords).count(text);
        assert_eq!(all.get("Lionel Messi"), Some(1));
        assert_eq!(all.get("Pele"), Some(0));
    }

    #[test]
    fn test_counter_fills_every_term() {
        let terms = vec!["gato".to_string(), "perro".to_string()];
        let counter = MentionCounter::new(&terms, CountingMode::ExactPhrase);
        let mentions = counter.count(TEXT);
        assert_eq!(mentions.get("gato"), Some(2));
        assert_eq!(mentions.get("perro"), Some(0));
        assert_eq!(mentions.total(), 2);
        assert_eq!(mentions.len(), 2);
    }
}
