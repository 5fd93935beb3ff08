use super::text_util::{ngrams, safe_snippet, tokenize, evidence_sort_key};
use super::{AnalysisContext, AnalysisError, ModuleAnalyzer};
use crate::dataset::Review;
use kb_jobstore::NewEvidence;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

pub struct CustomerExpectationsAnalyzer;

const TOP_K: usize = 12;
const MAX_EVIDENCE_PER_NEED: usize = 6;

const WORD_MARKERS: &[&str] = &["expected", "expecting", "wish", "hoped", "hope", "should", "could"];
const PHRASE_MARKERS: &[&str] = &["would be better", "needs to"];

impl ModuleAnalyzer for CustomerExpectationsAnalyzer {
    fn module_code(&self) -> &'static str {
        "review.customer_expectations"
    }

    fn analyze(&self, ctx: &AnalysisContext) -> Result<(Value, Vec<NewEvidence>), AnalysisError> {
        let reviews = &ctx.review_dataset.reviews;
        let total_n = reviews.len();
        let meta = json!({
            "site_code": ctx.review_dataset.site_code,
            "asins": ctx.review_dataset.asins,
            "review_time_from": ctx.review_dataset.review_time_from,
            "review_time_to": ctx.review_dataset.review_time_to,
        });

        if total_n == 0 {
            return Ok((json!({ "unavailable_reason": "no_reviews", "meta": meta }), Vec::new()));
        }

        let candidates: Vec<&Review> = reviews.iter().filter(|r| r.stars <= 3).collect();
        if candidates.is_empty() {
            return Ok((json!({ "items": [], "meta": meta }), Vec::new()));
        }

        let mut need_to_review_ids: HashMap<String, HashSet<i64>> = HashMap::new();
        for r in &candidates {
            let text = format!("{}. {}", r.review_title.as_deref().unwrap_or(""), r.review_body.as_deref().unwrap_or(""));
            for sentence in sentences(text.trim()) {
                if !has_expectation_marker(&sentence) {
                    continue;
                }
                let tokens = tokenize(&sentence);
                let mut phrases: HashSet<String> = HashSet::new();
                for n in [2usize, 3usize] {
                    phrases.extend(ngrams(&tokens, n));
                }
                if phrases.is_empty() {
                    phrases.extend(tokens.into_iter().take(15));
                }
                for phrase in phrases {
                    let need = normalize_need(&phrase);
                    if need.is_empty() {
                        continue;
                    }
                    need_to_review_ids.entry(need).or_default().insert(r.review_id);
                }
            }
        }

        if need_to_review_ids.is_empty() {
            return Ok((json!({ "items": [], "meta": meta }), Vec::new()));
        }

        let id_map: HashMap<i64, &Review> = candidates.iter().map(|r| (r.review_id, *r)).collect();
        let mut evidence_rows = Vec::new();
        let mut rows: Vec<Value> = Vec::new();

        for (need, ids) in need_to_review_ids {
            let rs: Vec<&Review> = ids.iter().filter_map(|id| id_map.get(id).copied()).collect();
            if rs.is_empty() {
                continue;
            }
            let mention_count = rs.len();
            let avg_rating = rs.iter().map(|r| r.stars as f64).sum::<f64>() / mention_count as f64;
            let pct = mention_count as f64 / total_n as f64;

            let mut picked = rs;
            picked.sort_by_key(|r| std::cmp::Reverse(evidence_sort_key(r)));
            picked.truncate(MAX_EVIDENCE_PER_NEED);

            let mut snippets = Vec::new();
            for r in &picked {
                let snippet = safe_snippet(r.review_body.as_deref().or(r.review_title.as_deref()).unwrap_or(""), 220);
                snippets.push(snippet.clone());
                evidence_rows.push(NewEvidence {
                    source_type: "review".to_string(),
                    source_id: r.review_id.to_string(),
                    kind: Some("expectation".to_string()),
                    snippet,
                    meta: json!({
                        "unmet_need": need,
                        "asin": r.asin,
                        "stars": r.stars,
                        "helpful_votes": r.helpful_votes,
                        "review_time": r.review_time,
                        "review_url": r.review_url,
                    }),
                });
            }
            let reason = snippets.iter().take(2).cloned().collect::<Vec<_>>().join(" ");
            let reason = if reason.trim().is_empty() { None } else { Some(reason) };

            rows.push(json!({
                "unmet_need": need,
                "percentage": pct,
                "mention_count": mention_count,
                "avg_rating": avg_rating,
                "reason": reason,
            }));
        }

        rows.sort_by(|a, b| {
            let pct_a = a["percentage"].as_f64().unwrap_or(0.0);
            let pct_b = b["percentage"].as_f64().unwrap_or(0.0);
            pct_b.partial_cmp(&pct_a).unwrap_or(std::cmp::Ordering::Equal).then(
                b["mention_count"].as_u64().unwrap_or(0).cmp(&a["mention_count"].as_u64().unwrap_or(0)),
            )
        });
        rows.truncate(TOP_K);

        Ok((json!({ "items": rows, "meta": meta }), evidence_rows))
    }
}

fn sentences(text: &str) -> Vec<String> {
    text.replace(['\r', '\n'], " ")
        .split(['.', '!', '?'])
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn has_expectation_marker(sentence: &str) -> bool {
    let lower = sentence.to_lowercase();
    if PHRASE_MARKERS.iter().any(|p| lower.contains(p)) {
        return true;
    }
    let words: HashSet<&str> = lower.split(|c: char| !c.is_ascii_alphanumeric()).collect();
    WORD_MARKERS.iter().any(|m| words.contains(m))
}

/// Like `text_util::normalize_topic` but with the expectations-specific
/// buckets (pocket count, padding thickness) the sentiment analyzer doesn't use.
fn normalize_need(phrase: &str) -> String {
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
        (&["quality"], "quality"),
        (&["smell", "odor"], "odor"),
        (&["pocket"], "more_pockets"),
        (&["thick"], "thicker_padding"),
        (&["soft", "lining"], "soft_lining"),
    ];
    for (needles, need) in rules {
        if needles.iter().any(|needle| {
            if needle.contains(' ') {
                p.contains(needle)
            } else {
                p.split(' ').any(|w| w.contains(needle))
            }
        }) {
            return need.to_string();
        }
    }
    p.replace(' ', "_")
}
