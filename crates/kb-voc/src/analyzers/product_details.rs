use super::text_util::safe_snippet;
use super::{AnalysisContext, AnalysisError, ModuleAnalyzer};
use crate::dataset::ListingSnapshot;
use kb_jobstore::NewEvidence;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};

pub struct ProductDetailsAnalyzer;

const MAX_EVIDENCE: usize = 100;

impl ModuleAnalyzer for ProductDetailsAnalyzer {
    fn module_code(&self) -> &'static str {
        "market.product_details"
    }

    fn analyze(&self, ctx: &AnalysisContext) -> Result<(Value, Vec<NewEvidence>), AnalysisError> {
        let ds = &ctx.listing_dataset;
        let target_set: BTreeSet<&str> = ctx.target_asins.iter().map(|s| s.as_str()).collect();
        let competitor_set: BTreeSet<&str> = ctx.competitor_asins.iter().map(|s| s.as_str()).collect();
        let mut all_asins: BTreeSet<&str> = target_set.iter().chain(competitor_set.iter()).copied().collect();
        all_asins.extend(ds.asins.iter().map(|s| s.as_str()));

        let mut snaps_by_asin: HashMap<&str, Vec<&ListingSnapshot>> = HashMap::new();
        for s in &ds.snapshots {
            snaps_by_asin.entry(s.asin.as_str()).or_default().push(s);
        }

        let mut rows = Vec::new();
        let mut missing = Vec::new();
        let mut evidence_rows = Vec::new();

        for asin in &all_asins {
            let snap = pick_latest_snapshot(snaps_by_asin.get(asin));
            let Some(snap) = snap else {
                missing.push(asin.to_string());
                continue;
            };

            let group = if target_set.contains(asin) {
                "target"
            } else if competitor_set.contains(asin) {
                "competitor"
            } else {
                "other"
            };

            rows.push(json!({
                "asin": asin,
                "group": group,
                "captured_day": snap.captured_day,
                "title": snap.title.as_deref().map(|t| safe_snippet(t, 220)),
                "brand_name": snap.brand_name,
                "price_amount": snap.price_amount,
                "price_currency": snap.price_currency,
                "stars": snap.stars,
                "ratings_count": snap.ratings_count,
                "review_count": snap.review_count,
                "bought_past_month": snap.bought_past_month,
                "availability_text": snap.availability_text.as_deref().map(|t| safe_snippet(t, 120)),
                "seller_name": snap.seller_name,
                "variation_summary": snap.variation_summary.as_deref().map(|t| safe_snippet(t, 140)),
                "category_path": snap.category_path.as_deref().map(|t| safe_snippet(t, 180)),
                "main_image_url": snap.main_image_url,
                "listing_id": snap.listing_id,
            }));

            if evidence_rows.len() < MAX_EVIDENCE {
                evidence_rows.push(NewEvidence {
                    source_type: "listing".to_string(),
                    source_id: snap.listing_id.to_string(),
                    kind: Some("listing_snapshot".to_string()),
                    snippet: snap.title.as_deref().map(|t| safe_snippet(t, 220)).unwrap_or_default(),
                    meta: json!({
                        "asin": asin,
                        "group": group,
                        "captured_day": snap.captured_day,
                        "price_amount": snap.price_amount,
                        "price_currency": snap.price_currency,
                        "stars": snap.stars,
                        "review_count": snap.review_count,
                        "bought_past_month": snap.bought_past_month,
                        "main_image_url": snap.main_image_url,
                    }),
                });
            }
        }

        let available = !rows.is_empty();
        let payload = json!({
            "captured_day": ds.start_day.as_ref().or(ds.end_day.as_ref()),
            "rows": rows,
            "missing_asins": missing,
            "unavailable_reason": if available { None } else { Some("no_listing_data") },
            "meta": {
                "site_code": ds.site_code,
                "target_asins": target_set,
                "competitor_asins": competitor_set,
                "listing_days": { "start_day": ds.start_day, "end_day": ds.end_day },
            },
        });

        Ok((payload, evidence_rows))
    }
}

fn pick_latest_snapshot<'a>(snapshots: Option<&Vec<&'a ListingSnapshot>>) -> Option<&'a ListingSnapshot> {
    snapshots?.iter().max_by_key(|s| (s.captured_at, s.listing_id)).copied()
}
