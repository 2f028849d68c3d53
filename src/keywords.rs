//! Keyword derivation from free text

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

/// Keywords kept per text
pub const MAX_KEYWORDS: usize = 10;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z]{5,}\b").expect("static keyword regex"));

/// Words of five or more ASCII letters, first-seen order, case-insensitively unique
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    WORD.find_iter(text)
        .map(|m| m.as_str())
        .filter(|w| seen.insert(w.to_ascii_lowercase()))
        .take(MAX_KEYWORDS)
        .map(str::to_owned)
        .collect()
}
