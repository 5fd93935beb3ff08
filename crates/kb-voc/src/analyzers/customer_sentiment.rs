use super::text_util::{extract_phrases, normalize_topic, safe_snippet, evidence_sort_key};
use super::{AnalysisContext, AnalysisError, ModuleAnalyzer};
use crate::dataset::Review;
use kb_jobstore::NewEvidence;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

pub struct CustomerSentimentAnalyzer;

const TOP_K: usize = 12;
const MAX_EVIDENCE_PER_TOPIC: usize = 5;

impl ModuleAnalyzer for CustomerSentimentAnalyzer {
    fn module_code(&self) -> &'static str {
        "review.customer_sentiment"
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

        let pos: Vec<&Review> = reviews.iter().filter(|r| r.stars >= 4).collect();
        let neg: Vec<&Review> = reviews.iter().filter(|r| r.stars <= 2).collect();

        let mut evidence_rows = Vec::new();
        let pos_topics = extract_topics(&pos, total_n, &mut evidence_rows, "positive_topic");
        let neg_topics = extract_topics(&neg, total_n, &mut evidence_rows, "negative_topic");

        let payload = json!({
            "positive_topics": pos_topics,
            "negative_topics": neg_topics,
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

fn extract_topics<'a>(
    group: &[&'a Review],
    total_n: usize,
    evidence_rows: &mut Vec<NewEvidence>,
    kind: &'static str,
) -> Vec<Value> {
    let mut topic_to_review_ids: HashMap<String, HashSet<i64>> = HashMap::new();
    for r in group {
        let text = format!("{} {}", r.review_title.as_deref().unwrap_or(""), r.review_body.as_deref().unwrap_or(""));
        for phrase in extract_phrases(text.trim()) {
            let topic = normalize_topic(&phrase);
            if topic.is_empty() {
                continue;
            }
            topic_to_review_ids.entry(topic).or_default().insert(r.review_id);
        }
    }

    let id_map: HashMap<i64, &Review> = group.iter().map(|r| (r.review_id, *r)).collect();

    let mut rows: Vec<(String, usize, Option<f64>, Vec<&Review>)> = Vec::new();
    for (topic, ids) in topic_to_review_ids {
        let rs: Vec<&Review> = ids.iter().filter_map(|id| id_map.get(id).copied()).collect();
        if rs.is_empty() {
            continue;
        }
        let mention_count = rs.len();
        let avg_rating = Some(rs.iter().map(|r| r.stars as f64).sum::<f64>() / mention_count as f64);
        rows.push((topic, mention_count, avg_rating, rs));
    }

    rows.sort_by(|a, b| {
        b.1.cmp(&a.1).then(
            b.2.unwrap_or(0.0)
                .partial_cmp(&a.2.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal),
        )
    });
    rows.truncate(TOP_K);

    rows.into_iter()
        .map(|(topic, mention_count, avg_rating, mut rs)| {
            rs.sort_by_key(|r| std::cmp::Reverse(evidence_sort_key(r)));
            rs.truncate(MAX_EVIDENCE_PER_TOPIC);

            let mut snippets = Vec::new();
            for r in &rs {
                let snippet = safe_snippet(r.review_body.as_deref().or(r.review_title.as_deref()).unwrap_or(""), 220);
                snippets.push(snippet.clone());
                evidence_rows.push(NewEvidence {
                    source_type: "review".to_string(),
                    source_id: r.review_id.to_string(),
                    kind: Some(kind.to_string()),
                    snippet,
                    meta: json!({
                        "topic": topic,
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

            json!({
                "topic": topic,
                "percentage": mention_count as f64 / total_n as f64,
                "mention_count": mention_count,
                "avg_rating": avg_rating,
                "reason": reason,
            })
        })
        .collect()
}
