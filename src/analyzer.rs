use std::collections::HashSet;
use std::sync::Arc;

use crate::normalizer::{normalize_text, words};
use crate::stopwords::StopWordCache;

/// Tokens that survive normalization but carry no meaning for association.
const NOISE_TOKENS: &[&str] = &["http", "https", "www", "amp", "utm"];

/// A character filter receives the original text and transforms it as a whole
/// before tokenization.
pub trait CharacterFilter: Send + Sync {
    fn filter(&self, text: String) -> String;
}

/// Reduces text to lowercase unaccented Spanish words, see [`normalize_text`].
#[derive(Debug, Default)]
pub struct SpanishTextFilter;

impl CharacterFilter for SpanishTextFilter {
    fn filter(&self, text: String) -> String {
        normalize_text(&text)
    }
}

/// A tokenizer breaks a stream of characters up into individual tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: String) -> Vec<String>;
}

pub struct WhiteSpaceTokenizer;

impl Tokenizer for WhiteSpaceTokenizer {
    fn tokenize(&self, text: String) -> Vec<String> {
        words(&text).map(|w| w.to_string()).collect::<Vec<String>>()
    }
}

/// A token filter receives the token stream and may remove or change tokens.
pub trait TokenFilter: Send + Sync {
    fn filter(&self, tokens: Vec<String>) -> Vec<String>;
}

/// Keeps tokens strictly longer than `min_length` characters.
pub struct MinLengthFilter {
    min_length: usize,
}

impl MinLengthFilter {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }
}

impl Default for MinLengthFilter {
    fn default() -> Self {
        Self { min_length: 2 }
    }
}

impl TokenFilter for MinLengthFilter {
    fn filter(&self, mut tokens: Vec<String>) -> Vec<String> {
        tokens.retain(|t| t.chars().count() > self.min_length);
        tokens
    }
}

/// Filters out tokens that are purely numeric
pub struct NumericTokenFilter;

impl TokenFilter for NumericTokenFilter {
    fn filter(&self, mut tokens: Vec<String>) -> Vec<String> {
        tokens.retain(|t| t.chars().any(|c| c.is_alphabetic()));
        tokens
    }
}

pub struct NoiseTokenFilter;

impl TokenFilter for NoiseTokenFilter {
    fn filter(&self, mut tokens: Vec<String>) -> Vec<String> {
        tokens.retain(|t| !NOISE_TOKENS.contains(&t.as_str()));
        tokens
    }
}

pub struct StopWordTokenFilter {
    stop_words: Arc<StopWordCache>,
}

impl StopWordTokenFilter {
    pub fn new(stop_words: Arc<StopWordCache>) -> Self {
        Self { stop_words }
    }
}

impl TokenFilter for StopWordTokenFilter {
    fn filter(&self, mut tokens: Vec<String>) -> Vec<String> {
        let stop_words = self.stop_words.words();
        tokens.retain(|t| !stop_words.contains(t));
        tokens
    }
}

/// Drops the words the searched terms are made of, so the association table
/// shows what surrounds the terms rather than the terms themselves.
pub struct TermExclusionFilter {
    excluded: HashSet<String>,
}

impl TermExclusionFilter {
    pub fn new(terms: &[String]) -> Self {
        let excluded = terms
            .iter()
            .flat_map(|t| {
                words(&normalize_text(t))
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        Self { excluded }
    }

    pub fn excluded(&self) -> &HashSet<String> {
        &self.excluded
    }
}

impl TokenFilter for TermExclusionFilter {
    fn filter(&self, mut tokens: Vec<String>) -> Vec<String> {
        tokens.retain(|t| !self.excluded.contains(t));
        tokens
    }
}

/// Pure text analysis pipeline - no async, no DB, just text transformations
pub struct TextAnalyzer {
    char_filters: Vec<Box<dyn CharacterFilter>>,
    tokenizer: Box<dyn Tokenizer>,
    token_filters: Vec<Box<dyn TokenFilter>>,
}

impl TextAnalyzer {
    pub fn new(
        char_filters: Vec<Box<dyn CharacterFilter>>,
        tokenizer: Box<dyn Tokenizer>,
        token_filters: Vec<Box<dyn TokenFilter>>,
    ) -> Self {
        Self {
            char_filters,
            tokenizer,
            token_filters,
        }
    }

    /// The pipeline used for word association: normalize, split on spaces,
    /// then drop short, numeric, noise, stopword and term words.
    pub fn word_association(
        stop_words: Arc<StopWordCache>,
        terms: &[String],
        min_length: usize,
    ) -> Self {
        Self::new(
            vec![Box::new(SpanishTextFilter)],
            Box::new(WhiteSpaceTokenizer),
            vec![
                Box::new(MinLengthFilter::new(min_length)),
                Box::new(NumericTokenFilter),
                Box::new(NoiseTokenFilter),
                Box::new(StopWordTokenFilter::new(stop_words)),
                Box::new(TermExclusionFilter::new(terms)),
            ],
        )
    }

    pub fn char_filter(&self, mut content: String) -> String {
        for filter in self.char_filters.iter() {
            content = filter.filter(content);
        }
        content
    }

    pub fn tokenize(&self, content: String) -> Vec<String> {
        self.tokenizer.tokenize(content)
    }

    pub fn token_filter(&self, mut tokens: Vec<String>) -> Vec<String> {
        for filter in self.token_filters.iter() {
            tokens = filter.filter(tokens);
        }
        tokens
    }

    /// Analyzes raw content and returns the surviving words in text order
    pub fn analyze(&self, raw_content: &str) -> Vec<String> {
        let content = self.char_filter(raw_content.to_string());
        let tokens = self.tokenize(content);
        self.token_filter(tokens)
    }
}
