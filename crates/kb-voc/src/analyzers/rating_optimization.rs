use super::text_util::{extract_phrases, normalize_topic, safe_snippet, evidence_sort_key};
use super::{AnalysisContext, AnalysisError, ModuleAnalyzer};
use crate::dataset::Review;
use kb_jobstore::NewEvidence;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

pub struct RatingOptimizationAnalyzer;

const TOP_K_POINTS: usize = 25;
const MAX_EVIDENCE_PER_TOPIC: usize = 5;
const LOW_RATING_THRESHOLD: f64 = 3.5;
const MAX_ACTIONABLE_TOPICS: usize = 8;

impl ModuleAnalyzer for RatingOptimizationAnalyzer {
    fn module_code(&self) -> &'static str {
        "review.rating_optimization"
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

        let id_map: HashMap<i64, &Review> = reviews.iter().map(|r| (r.review_id, r)).collect();
        let mut topic_to_ids: HashMap<String, HashSet<i64>> = HashMap::new();

        for r in reviews {
            let text = format!("{} {}", r.review_title.as_deref().unwrap_or(""), r.review_body.as_deref().unwrap_or(""));
            for phrase in extract_phrases(text.trim()) {
                let topic = normalize_topic(&phrase);
                if !topic.is_empty() {
                    topic_to_ids.entry(topic).or_default().insert(r.review_id);
                }
            }
        }

        let mut points: Vec<(String, usize, Option<f64>)> = topic_to_ids
            .iter()
            .filter_map(|(topic, ids)| {
                let rs: Vec<&Review> = ids.iter().filter_map(|id| id_map.get(id).copied()).collect();
                if rs.is_empty() {
                    return None;
                }
                let mentions = rs.len();
                let avg_rating = Some(rs.iter().map(|r| r.stars as f64).sum::<f64>() / mentions as f64);
                Some((topic.clone(), mentions, avg_rating))
            })
            .collect();

        points.sort_by(|a, b| {
            b.1.cmp(&a.1).then(
                a.2.unwrap_or(0.0)
                    .partial_cmp(&b.2.unwrap_or(0.0))
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
        });
        points.truncate(TOP_K_POINTS);

        let mut actionable: Vec<&(String, usize, Option<f64>)> = points
            .iter()
            .filter(|(_, _, avg)| avg.map(|a| a <= LOW_RATING_THRESHOLD).unwrap_or(false))
            .collect();
        actionable.sort_by(|a, b| b.1.cmp(&a.1));
        actionable.truncate(MAX_ACTIONABLE_TOPICS);

        let mut evidence_rows = Vec::new();
        for (topic, _, _) in &actionable {
            let ids = topic_to_ids.get(topic).cloned().unwrap_or_default();
            let mut rs: Vec<&Review> = ids.iter().filter_map(|id| id_map.get(id).copied()).collect();
            rs.sort_by_key(|r| std::cmp::Reverse(evidence_sort_key(r)));
            rs.truncate(MAX_EVIDENCE_PER_TOPIC);
            for r in rs {
                evidence_rows.push(NewEvidence {
                    source_type: "review".to_string(),
                    source_id: r.review_id.to_string(),
                    kind: Some("rating_opt_topic".to_string()),
                    snippet: safe_snippet(r.review_body.as_deref().or(r.review_title.as_deref()).unwrap_or(""), 220),
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
        }

        let point_rows: Vec<Value> = points
            .into_iter()
            .map(|(topic, mentions, avg_rating)| json!({ "topic": topic, "mentions": mentions, "avg_rating": avg_rating }))
            .collect();

        let payload = json!({
            "points": point_rows,
            "low_rating_threshold": LOW_RATING_THRESHOLD,
            "meta": meta,
        });

        Ok((payload, evidence_rows))
    }
}
