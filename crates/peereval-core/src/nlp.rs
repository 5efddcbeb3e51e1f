//! Comment analysis: keyword flags and a local extractive summarizer.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::traits::Summarizer;

/// Substrings that mark a comment for a human to look at. Matching is
/// advisory only.
pub const RED_FLAG_KEYWORDS: &[&str] = &[
    "harass", "threat", "unsafe", "violence", "abuse", "bully", "discrim", "cheat", "plagiar",
    "drugs", "weapon", "suicide", "self-harm", "assault", "racist", "sexist", "hate", "stalker",
];

/// Default number of sentences kept by the local summarizer.
pub const DEFAULT_MAX_SENTENCES: usize = 3;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z']+").expect("valid regex"));

/// Keywords found in `text`, sorted and deduplicated.
pub fn detect_red_flags(text: &str) -> Vec<&'static str> {
    if text.is_empty() {
        return Vec::new();
    }
    let lower = text.to_lowercase();
    let found: BTreeSet<&'static str> = RED_FLAG_KEYWORDS
        .iter()
        .copied()
        .filter(|k| lower.contains(k))
        .collect();
    found.into_iter().collect()
}

/// Keywords found across several comments, sorted and deduplicated.
pub fn detect_red_flags_all<S: AsRef<str>>(texts: &[S]) -> Vec<&'static str> {
    let found: BTreeSet<&'static str> = texts
        .iter()
        .flat_map(|t| detect_red_flags(t.as_ref()))
        .collect();
    found.into_iter().collect()
}

/// Split text into sentences after `.`, `!` or `?` followed by whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            if let Some(&(_, next)) = chars.peek() {
                if next.is_whitespace() {
                    sentences.push(&text[start..i + c.len_utf8()]);
                    while let Some(&(j, ws)) = chars.peek() {
                        if !ws.is_whitespace() {
                            break;
                        }
                        chars.next();
                        start = j + ws.len_utf8();
                    }
                }
            }
        }
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    WORD_RE.find_iter(text).map(|m| m.as_str().to_lowercase())
}

/// Frequency-based extractive summary.
///
/// Joins the texts, and if there are more than `max_sentences` sentences,
/// keeps the ones whose words are most frequent across the whole text, in
/// rank order. Ties keep their original order.
pub fn simple_summarize<S: AsRef<str>>(texts: &[S], max_sentences: usize) -> String {
    let full_text = texts
        .iter()
        .map(|t| t.as_ref())
        .collect::<Vec<_>>()
        .join(" ");
    let sentences = split_sentences(&full_text);
    if sentences.len() <= max_sentences {
        return full_text.trim().to_string();
    }

    let mut freq: HashMap<String, usize> = HashMap::new();
    for w in words(&full_text) {
        *freq.entry(w).or_default() += 1;
    }

    let mut scored: Vec<(usize, &str)> = sentences
        .iter()
        .map(|s| {
            let score = words(s).map(|w| freq.get(&w).copied().unwrap_or(0)).sum();
            (score, *s)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    scored
        .into_iter()
        .take(max_sentences)
        .map(|(_, s)| s)
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

/// Summarizer that runs [`simple_summarize`] in-process.
#[derive(Debug, Clone)]
pub struct LocalSummarizer {
    max_sentences: usize,
}

impl LocalSummarizer {
    pub fn new(max_sentences: usize) -> Self {
        Self { max_sentences }
    }
}

impl Default for LocalSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SENTENCES)
    }
}

#[async_trait]
impl Summarizer for LocalSummarizer {
    fn name(&self) -> &str {
        "local"
    }

    async fn summarize(&self, comments: &[String]) -> anyhow::Result<String> {
        Ok(simple_summarize(comments, self.max_sentences))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_flags_are_case_insensitive_and_sorted() {
        let flags = detect_red_flags("He made a THREAT and was bullying others.");
        assert_eq!(flags, vec!["bully", "threat"]);
    }

    #[test]
    fn red_flags_empty_text() {
        assert!(detect_red_flags("").is_empty());
        assert!(detect_red_flags("Great teammate, always on time.").is_empty());
    }

    #[test]
    fn red_flags_across_comments_dedup() {
        let comments = vec![
            "Felt unsafe in meetings.".to_string(),
            "Unsafe behaviour, possible plagiarism.".to_string(),
        ];
        assert_eq!(detect_red_flags_all(&comments), vec!["plagiar", "unsafe"]);
    }

    #[test]
    fn sentence_split() {
        let s = split_sentences("One. Two!  Three? Four");
        assert_eq!(s, vec!["One.", "Two!", "Three?", "Four"]);
        assert_eq!(split_sentences("v1.2 is out"), vec!["v1.2 is out"]);
    }

    #[test]
    fn short_text_returned_whole() {
        let texts = ["Good work.", "Very helpful. "];
        assert_eq!(simple_summarize(&texts, 3), "Good work. Very helpful.");
    }

    #[test]
    fn long_text_keeps_most_frequent_sentences() {
        let texts = [
            "Great code reviews.",
            "Great code and great tests.",
            "Was late once.",
            "Great code every sprint.",
            "Liked pizza.",
        ];
        let summary = simple_summarize(&texts, 2);
        assert!(summary.contains("Great code and great tests."));
        assert!(!summary.contains("pizza"));
        assert!(!summary.contains("late"));
    }

    #[tokio::test]
    async fn local_summarizer_trait() {
        let s = LocalSummarizer::default();
        assert_eq!(s.name(), "local");
        let out = s
            .summarize(&["Solid contributor.".to_string()])
            .await
            .unwrap();
        assert_eq!(out, "Solid contributor.");
    }
}
