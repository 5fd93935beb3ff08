use super::text_util::{safe_snippet, sort_reviews_for_evidence};
use super::{AnalysisContext, AnalysisError, ModuleAnalyzer};
use crate::dataset::Review;
use chrono::{Duration, TimeZone, Utc};
use kb_jobstore::NewEvidence;
use serde_json::{json, Value};
use std::collections::HashMap;

pub struct ReviewOverviewAnalyzer;

const DAYS_FOR_TREND: i64 = 30;

impl ModuleAnalyzer for ReviewOverviewAnalyzer {
    fn module_code(&self) -> &'static str {
        "review.overview"
    }

    fn analyze(&self, ctx: &AnalysisContext) -> Result<(Value, Vec<NewEvidence>), AnalysisError> {
        let reviews = &ctx.review_dataset.reviews;
        let n = reviews.len();

        let avg_stars = if n > 0 {
            Some(reviews.iter().map(|r| r.stars as f64).sum::<f64>() / n as f64)
        } else {
            None
        };

        let mut dist: HashMap<i32, usize> = HashMap::new();
        for r in reviews {
            *dist.entry(r.stars).or_default() += 1;
        }
        let dist_rows: Vec<Value> = (1..=5)
            .rev()
            .map(|stars| {
                let count = *dist.get(&stars).unwrap_or(&0);
                let pct = if n > 0 { count as f64 / n as f64 } else { 0.0 };
                json!({ "stars": stars, "count": count, "pct": pct })
            })
            .collect();

        let mut by_day_count: HashMap<String, i64> = HashMap::new();
        let mut by_day_sum: HashMap<String, i64> = HashMap::new();
        for r in reviews {
            let Some(ts) = r.review_time else { continue };
            let day = day_from_epoch(ts);
            *by_day_count.entry(day.clone()).or_default() += 1;
            *by_day_sum.entry(day).or_default() += r.stars as i64;
        }
        let today = Utc::now().date_naive();
        let trend_rows: Vec<Value> = (0..DAYS_FOR_TREND)
            .rev()
            .map(|offset| {
                let day = (today - Duration::days(offset)).format("%Y-%m-%d").to_string();
                let count = *by_day_count.get(&day).unwrap_or(&0);
                let avg = if count > 0 { Some(*by_day_sum.get(&day).unwrap_or(&0) as f64 / count as f64) } else { None };
                json!({ "day": day, "count": count, "avg_stars": avg })
            })
            .collect();

        let mut neg: Vec<&Review> = reviews.iter().filter(|r| r.stars <= 2).collect();
        let mut pos: Vec<&Review> = reviews.iter().filter(|r| r.stars >= 4).collect();
        sort_reviews_for_evidence(&mut neg);
        sort_reviews_for_evidence(&mut pos);
        neg.truncate(10);
        pos.truncate(10);

        let to_sample = |r: &Review| {
            json!({
                "review_id": r.review_id,
                "asin": r.asin,
                "stars": r.stars,
                "helpful_votes": r.helpful_votes,
                "review_time": r.review_time,
                "title": r.review_title,
                "snippet": safe_snippet(r.review_body.as_deref().or(r.review_title.as_deref()).unwrap_or(""), 220),
                "review_url": r.review_url,
                "verified_purchase": r.verified_purchase,
            })
        };

        let mut evidence_rows = Vec::new();
        for (r, kind) in neg.iter().map(|r| (r, "negative")).chain(pos.iter().map(|r| (r, "positive"))) {
            evidence_rows.push(NewEvidence {
                source_type: "review".to_string(),
                source_id: r.review_id.to_string(),
                kind: Some(kind.to_string()),
                snippet: safe_snippet(r.review_body.as_deref().or(r.review_title.as_deref()).unwrap_or(""), 220),
                meta: json!({
                    "asin": r.asin,
                    "stars": r.stars,
                    "helpful_votes": r.helpful_votes,
                    "review_time": r.review_time,
                    "review_url": r.review_url,
                }),
            });
        }

        let payload = json!({
            "summary": { "review_count": n, "avg_stars": avg_stars },
            "rating_distribution": dist_rows,
            "trend_last_days": { "days": DAYS_FOR_TREND, "rows": trend_rows },
            "evidence_samples": {
                "negative": neg.iter().map(|r| to_sample(r)).collect::<Vec<_>>(),
                "positive": pos.iter().map(|r| to_sample(r)).collect::<Vec<_>>(),
            },
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

fn day_from_epoch(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0).single().map(|dt| dt.format("%Y-%m-%d").to_string()).unwrap_or_default()
}
