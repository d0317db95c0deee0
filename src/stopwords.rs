use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::normalizer::normalize_text;

/// Somewhere stopwords can be loaded from.
pub trait StopWordSource: Send + Sync {
    fn load(&self) -> Result<Vec<String>>;
}

/// NLTK Spanish list bundled with the `stop-words` crate.
#[derive(Debug, Default)]
pub struct SpanishStopWords;

impl StopWordSource for SpanishStopWords {
    fn load(&self) -> Result<Vec<String>> {
        Ok(stop_words::get(stop_words::LANGUAGE::Spanish)
            .into_iter()
            .map(|x| x.to_string())
            .collect())
    }
}

/// Newline separated list on disk. Blank lines and `#` comments are ignored.
#[derive(Debug)]
pub struct FileStopWords {
    path: PathBuf,
}

impl FileStopWords {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StopWordSource for FileStopWords {
    fn load(&self) -> Result<Vec<String>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read stopwords from {}", self.path.display()))?;
        Ok(raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect())
    }
}

/// A fixed list, mostly for tests.
#[derive(Debug, Default)]
pub struct FixedStopWords(pub Vec<String>);

impl StopWordSource for FixedStopWords {
    fn load(&self) -> Result<Vec<String>> {
        Ok(self.0.clone())
    }
}

/// Loads its source at most once and serves the normalized set afterwards.
///
/// A failing source leaves the cache holding an empty set: analysis goes on
/// without stopword removal instead of failing.
pub struct StopWordCache {
    source: Box<dyn StopWordSource>,
    words: OnceLock<HashSet<String>>,
}

impl StopWordCache {
    pub fn new(source: impl StopWordSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            words: OnceLock::new(),
        }
    }

    pub fn spanish() -> Self {
        Self::new(SpanishStopWords)
    }

    pub fn fixed<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(FixedStopWords(words.into_iter().map(Into::into).collect()))
    }

    pub fn words(&self) -> &HashSet<String> {
        self.words.get_or_init(|| match self.source.load() {
            Ok(words) => {
                let set: HashSet<String> = words
                    .iter()
                    .map(|w| normalize_text(w))
                    .filter(|w| !w.is_empty())
                    .collect();
                tracing::debug!(count = set.len(), "stopwords loaded");
                set
            }
            Err(e) => {
                tracing::warn!("stopwords unavailable, continuing without them: {:#}", e);
                HashSet::new()
            }
        })
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words().contains(word)
    }
}
