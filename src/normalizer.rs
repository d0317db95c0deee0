//! Text normalization shared by mention counting and word association.
//!
//! Every text and every search term goes through [`normalize_text`] before it
//! is compared to anything, so both sides always live in the same reduced
//! alphabet: lowercase `a-z` words separated by single spaces.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"http\S+|www\.\S+").unwrap());
static HANDLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[@#]\w+").unwrap());
static DIGITS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static OUTSIDE_ALPHABET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-záéíóúñü\s]").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Lowercases, drops URLs, handles, hashtags, digits and anything outside the
/// Spanish alphabet, strips diacritics and collapses whitespace.
///
/// The output only contains `a-z` and single spaces, so normalizing it again
/// returns it unchanged.
///
/// ```
/// use mentionscope::normalizer::normalize_text;
///
/// assert_eq!(normalize_text("¡Año 2024! Visitá https://x.com @yo"), "ano visita");
/// ```
pub fn normalize_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    let cleaned = URL_RE.replace_all(&lowered, " ");
    let cleaned = HANDLE_RE.replace_all(&cleaned, " ");
    let cleaned = DIGITS_RE.replace_all(&cleaned, " ");
    let cleaned = OUTSIDE_ALPHABET_RE.replace_all(&cleaned, " ");
    let ascii = strip_diacritics(&cleaned);
    WHITESPACE_RE.replace_all(&ascii, " ").trim().to_string()
}

fn strip_diacritics(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Splits already-normalized text into its words.
pub fn words(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(' ').filter(|w| !w.is_empty())
}
