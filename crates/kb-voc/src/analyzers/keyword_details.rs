use super::text_util::safe_snippet;
use super::{AnalysisContext, AnalysisError, ModuleAnalyzer};
use crate::dataset::SerpItem;
use kb_jobstore::NewEvidence;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};

pub struct KeywordDetailsAnalyzer;

const TOP_ITEMS_PER_KEYWORD: usize = 8;
const MAX_EVIDENCE_PER_KEYWORD: usize = 20;

impl ModuleAnalyzer for KeywordDetailsAnalyzer {
    fn module_code(&self) -> &'static str {
        "keyword.keyword_details"
    }

    fn analyze(&self, ctx: &AnalysisContext) -> Result<(Value, Vec<NewEvidence>), AnalysisError> {
        let ds = &ctx.keyword_dataset;
        let target_set: BTreeSet<&str> = ctx.target_asins.iter().map(|s| s.as_str()).collect();

        let mut items_by_kw: HashMap<&str, Vec<&SerpItem>> = HashMap::new();
        for it in &ds.items {
            items_by_kw.entry(it.keyword.as_str()).or_default().push(it);
        }

        let mut out_items = Vec::new();
        let mut evidence_rows = Vec::new();
        let mut missing_keywords = Vec::new();

        for kw in &ds.keywords {
            let mut items: Vec<&SerpItem> = items_by_kw.get(kw.as_str()).cloned().unwrap_or_default();
            if items.is_empty() {
                missing_keywords.push(kw.clone());
                continue;
            }
            items.sort_by_key(|it| (it.page_num, it.position, it.kw_item_id));

            let total = items.len();
            let sponsored = items.iter().filter(|it| it.is_sponsored).count();
            let sponsored_ratio = sponsored as f64 / total as f64;

            let prices: Vec<f64> = items.iter().filter_map(|it| it.price_amount).collect();
            let avg_price = (!prices.is_empty()).then(|| prices.iter().sum::<f64>() / prices.len() as f64);

            let ratings: Vec<f64> = items.iter().filter_map(|it| it.stars).collect();
            let avg_rating = (!ratings.is_empty()).then(|| ratings.iter().sum::<f64>() / ratings.len() as f64);

            let terms = keyword_terms(kw);
            let title_hits = items.iter().filter(|it| title_matches_terms(it.title.as_deref(), &terms)).count();
            let title_density = title_hits as f64 / total as f64;

            let sales_proxy: i64 = items.iter().filter_map(|it| it.bought_past_month).sum();

            let target_share = if !target_set.is_empty() {
                let target_hits = items.iter().filter(|it| target_set.contains(it.asin.as_str())).count();
                Some(target_hits as f64 / total as f64)
            } else {
                None
            };

            let top_items: Vec<Value> = items
                .iter()
                .take(TOP_ITEMS_PER_KEYWORD)
                .map(|it| {
                    json!({
                        "kw_item_id": it.kw_item_id,
                        "page_num": it.page_num,
                        "position": it.position,
                        "is_sponsored": it.is_sponsored,
                        "asin": it.asin,
                        "title": it.title.as_deref().map(|t| safe_snippet(t, 220)),
                        "brand_name": it.brand_name,
                        "price_amount": it.price_amount,
                        "price_currency": it.price_currency,
                        "stars": it.stars,
                        "review_count": it.review_count,
                        "bought_past_month": it.bought_past_month,
                        "product_url": it.product_url,
                        "image_url": it.image_url,
                    })
                })
                .collect();

            out_items.push(json!({
                "keyword": kw,
                "total_items": total,
                "sponsored_ratio": sponsored_ratio,
                "avg_price": avg_price,
                "avg_rating": avg_rating,
                "title_density": title_density,
                "serp_sales_proxy": sales_proxy,
                "target_asin_share": target_share,
                "top_items": top_items,
            }));

            for it in items.iter().take(MAX_EVIDENCE_PER_KEYWORD) {
                evidence_rows.push(NewEvidence {
                    source_type: "keyword_serp".to_string(),
                    source_id: it.kw_item_id.to_string(),
                    kind: Some("serp_item".to_string()),
                    snippet: it.title.as_deref().map(|t| safe_snippet(t, 220)).unwrap_or_default(),
                    meta: json!({
                        "keyword": kw,
                        "page_num": it.page_num,
                        "position": it.position,
                        "is_sponsored": it.is_sponsored,
                        "asin": it.asin,
                        "price_amount": it.price_amount,
                        "price_currency": it.price_currency,
                        "stars": it.stars,
                        "review_count": it.review_count,
                        "bought_past_month": it.bought_past_month,
                        "product_url": it.product_url,
                        "image_url": it.image_url,
                    }),
                });
            }
        }

        let available = !out_items.is_empty();
        let payload = json!({
            "captured_day": ds.start_day.as_ref().or(ds.end_day.as_ref()),
            "items": out_items,
            "missing_keywords": missing_keywords,
            "unavailable_reason": if available { None } else { Some("no_keyword_serp_data") },
            "meta": {
                "site_code": ds.site_code,
                "keywords": ds.keywords,
                "target_asins": target_set,
                "kw_days": { "start_day": ds.start_day, "end_day": ds.end_day },
            },
        });

        Ok((payload, evidence_rows))
    }
}

fn keyword_terms(keyword: &str) -> Vec<String> {
    keyword.replace('/', " ").split_whitespace().map(|p| p.to_lowercase()).collect()
}

fn title_matches_terms(title: Option<&str>, terms: &[String]) -> bool {
    let Some(title) = title else { return false };
    let t = title.to_lowercase();
    terms.iter().all(|term| t.contains(term.as_str()))
}
