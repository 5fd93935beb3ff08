use super::text_util::{safe_snippet, evidence_sort_key};
use super::{AnalysisContext, AnalysisError, ModuleAnalyzer};
use crate::dataset::Review;
use kb_jobstore::NewEvidence;
use serde_json::{json, Value};
use std::collections::HashMap;

pub struct BuyersMotivationAnalyzer;

const TOP_K: usize = 12;
const MAX_EVIDENCE_PER_MOTIVATION: usize = 6;

/// Minimal motivation dictionary (§4.5.1); could move to config if it grows.
const MOTIVATION_DICT: &[(&str, &[&str])] = &[
    ("protection", &["protect", "protection", "keep safe", "safe", "secure"]),
    ("value_for_price", &["price", "value", "affordable", "cheap", "for the price"]),
    ("replacement", &["replace", "replacement", "replaced", "old one", "broke", "broken"]),
    ("gift", &["gift", "present", "christmas", "birthday"]),
    ("daily_carry", &["daily", "every day", "everyday", "commute", "commuting"]),
    ("organization", &["cable", "charger", "pocket", "pockets", "organize", "organization"]),
];

impl ModuleAnalyzer for BuyersMotivationAnalyzer {
    fn module_code(&self) -> &'static str {
        "review.buyers_motivation"
    }

    fn analyze(&self, ctx: &AnalysisContext) -> Result<(Value, Vec<NewEvidence>), AnalysisError> {
        let reviews = &ctx.review_dataset.reviews;
        let total_n = reviews.len();

        if total_n == 0 {
            let payload = json!({
                "unavailable_reason": "no_reviews",
                "meta": {
                    "site_code": ctx.review_dataset.site_code,
                    "asins": ctx.review_dataset.asins,
                    "review_time_from": ctx.review_dataset.review_time_from,
                    "review_time_to": ctx.review_dataset.review_time_to,
                },
            });
            return Ok((payload, Vec::new()));
        }

        let mut matched: HashMap<&'static str, Vec<&Review>> = HashMap::new();
        for r in reviews {
            let text = format!(
                "{} {}",
                r.review_title.as_deref().unwrap_or(""),
                r.review_body.as_deref().unwrap_or("")
            )
            .to_lowercase();
            for (motivation, keys) in MOTIVATION_DICT {
                if keys.iter().any(|k| text.contains(k)) {
                    matched.entry(motivation).or_default().push(r);
                }
            }
        }

        let mut evidence_rows = Vec::new();
        let mut rows: Vec<Value> = Vec::new();

        for (motivation, rs) in matched {
            let mut uniq: HashMap<i64, &Review> = HashMap::new();
            for r in rs {
                uniq.insert(r.review_id, r);
            }
            if uniq.is_empty() {
                continue;
            }
            let mention_count = uniq.len();
            let avg_rating = uniq.values().map(|r| r.stars as f64).sum::<f64>() / mention_count as f64;
            let pct = mention_count as f64 / total_n as f64;

            let mut picked: Vec<&Review> = uniq.into_values().collect();
            picked.sort_by_key(|r| std::cmp::Reverse(evidence_sort_key(r)));
            picked.truncate(MAX_EVIDENCE_PER_MOTIVATION);

            let mut snippets = Vec::new();
            for r in &picked {
                let snippet = safe_snippet(r.review_body.as_deref().or(r.review_title.as_deref()).unwrap_or(""), 220);
                snippets.push(snippet.clone());
                evidence_rows.push(NewEvidence {
                    source_type: "review".to_string(),
                    source_id: r.review_id.to_string(),
                    kind: Some("motivation".to_string()),
                    snippet,
                    meta: json!({
                        "motivation": motivation,
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
                "motivation": motivation,
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

        let payload = json!({
            "items": rows,
            "meta": {
                "site_code": ctx.review_dataset.site_code,
                "asins": ctx.review_dataset.asins,
                "review_time_from": ctx.review_dataset.review_time_from,
                "review_time_to": ctx.review_dataset.review_time_to,
            },
        });

        Ok((payload, evidence_rows))
    }
}
