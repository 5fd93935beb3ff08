//! Small deterministic text helpers shared by the review analyzers:
//! stopword-filtered tokenization, n-grams, and a topic/need normalization
//! heuristic (§4.5.1).

use crate::dataset::Review;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "had", "has", "have",
    "i", "if", "in", "into", "is", "it", "its", "me", "my", "not", "of", "on", "or", "our", "so",
    "that", "the", "their", "this", "to", "too", "was", "we", "were", "with", "you", "your",
];

pub fn safe_snippet(text: &str, max_len: usize) -> String {
    let s: String = text.replace(['\r', '\n'], " ").trim().to_string();
    let graphemes: Vec<&str> = s.graphemes(true).collect();
    if graphemes.len() <= max_len {
        return s;
    }
    let mut truncated: String = graphemes[..max_len.saturating_sub(1)].concat();
    truncated = truncated.trim_end().to_string();
    truncated.push('…');
    truncated
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().all(|c| c.is_ascii_alphanumeric()) && w.len() > 2)
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

pub fn ngrams(tokens: &[String], n: usize) -> Vec<String> {
    if tokens.len() < n {
        return Vec::new();
    }
    (0..=tokens.len() - n).map(|i| tokens[i..i + n].join(" ")).collect()
}

/// Extracts stable phrase keys (2- and 3-grams, falling back to leading
/// unigrams) from `text`, filtering out any n-gram containing a stopword.
pub fn extract_phrases(text: &str) -> HashSet<String> {
    let tokens = tokenize(text);
    let mut phrases: HashSet<String> = HashSet::new();
    for n in [2usize, 3usize] {
        for phrase in ngrams(&tokens, n) {
            if phrase.split(' ').any(|w| STOPWORDS.contains(&w)) {
                continue;
            }
            phrases.insert(phrase);
        }
    }
    if phrases.is_empty() {
        phrases.extend(tokens.into_iter().take(20));
    }
    phrases
}

/// Maps a raw phrase onto a stable topic/need key via a small heuristic table,
/// falling back to a snake-cased version of the phrase itself.
pub fn normalize_topic(phrase: &str) -> String {
    let p = phrase.to_lowercase();
    let p = p.trim();
    if p.is_empty() {
        return String::new();
    }
    let rules: &[(&[&str], &str)] = &[
        (&["water resist", "waterproof", "water proof"], "water_resistance"),
        (&["zip"], "zipper"),
        (&["stitch", "seam", "sew"], "stitching"),
        (&["pad", "cushion", "padding"], "padding"),
        (&["fit", "size"], "fit"),
        (&["price", "value"], "value"),
        (&["soft", "lining"], "soft_lining"),
        (&["smell", "odor"], "odor"),
        (&["quality"], "quality"),
        (&["protect"], "protection"),
    ];
    for (needles, topic) in rules {
        if needles.iter().any(|needle| {
            if needle.contains(' ') {
                p.contains(needle)
            } else {
                p.split(' ').any(|w| w.contains(needle))
            }
        }) {
            return topic.to_string();
        }
    }
    p.replace(' ', "_")
}

/// helpful desc, time desc, id desc — the tie-break the original applies
/// everywhere it samples evidence reviews.
pub fn evidence_sort_key(r: &Review) -> (i64, i64, i64) {
    (r.helpful_votes, r.review_time.unwrap_or(0), r.review_id)
}

pub fn sort_reviews_for_evidence<'a>(reviews: &mut Vec<&'a Review>) {
    reviews.sort_by_key(|r| std::cmp::Reverse(evidence_sort_key(r)));
}
