use std::collections::HashMap;

use crate::analyzer::TextAnalyzer;
use crate::data_models::WordFrequency;

/// Occurrence counter that remembers the order keys were first seen in.
#[derive(Debug, Default, Clone)]
pub struct OrderedCounter {
    index: HashMap<String, usize>,
    entries: Vec<(String, usize)>,
}

impl OrderedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str) {
        match self.index.get(key) {
            Some(&i) => self.entries[i].1 += 1,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), 1));
            }
        }
    }

    pub fn get(&self, key: &str) -> usize {
        self.index.get(key).map(|&i| self.entries[i].1).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest counts first, ties in first-seen order, at most `n` entries.
    pub fn most_common(&self, n: usize) -> Vec<WordFrequency> {
        let mut sorted: Vec<&(String, usize)> = self.entries.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted
            .into_iter()
            .take(n)
            .map(|(word, frequency)| WordFrequency {
                word: word.clone(),
                frequency: *frequency,
            })
            .collect()
    }
}

/// Word and bigram counts over a corpus of page texts.
pub struct FrequencyAggregator<'a> {
    analyzer: &'a TextAnalyzer,
}

impl<'a> FrequencyAggregator<'a> {
    pub fn new(analyzer: &'a TextAnalyzer) -> Self {
        Self { analyzer }
    }

    pub fn count_words<I, S>(&self, texts: I) -> OrderedCounter
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counter = OrderedCounter::new();
        for text in texts {
            for word in self.analyzer.analyze(text.as_ref()) {
                counter.add(&word);
            }
        }
        counter
    }

    /// Pairs are formed from neighbours in each text's filtered word stream;
    /// no pair spans two texts.
    pub fn count_bigrams<I, S>(&self, texts: I) -> OrderedCounter
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counter = OrderedCounter::new();
        for text in texts {
            let words = self.analyzer.analyze(text.as_ref());
            for pair in words.windows(2) {
                counter.add(&format!("{} {}", pair[0], pair[1]));
            }
        }
        counter
    }

    pub fn top_words<I, S>(&self, texts: I, top_n: usize) -> Vec<WordFrequency>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.count_words(texts).most_common(top_n)
    }

    pub fn top_bigrams<I, S>(&self, texts: I, top_n: usize) -> Vec<WordFrequency>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.count_bigrams(texts).most_common(top_n)
    }
}
