//! Crawl decisioning (§4.5 `decide_crawl_units`).

use crate::dataset::{ResultsReader, ResultsReaderError};
use kb_core::entities::TriggerMode;
use kb_core::time::is_fresh;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlUnit {
    pub run_type: &'static str,
    pub scope_type: &'static str,
    pub scope_value: String,
}

impl CrawlUnit {
    fn listing(asin: &str) -> Self {
        Self { run_type: "amazon_listing", scope_type: "asin", scope_value: asin.to_string() }
    }
    fn review(asin: &str) -> Self {
        Self { run_type: "amazon_review", scope_type: "asin", scope_value: asin.to_string() }
    }
    fn keyword(keyword: &str) -> Self {
        Self { run_type: "amazon_keyword_search", scope_type: "keyword", scope_value: keyword.to_string() }
    }
}

/// `target_asins`/`competitor_asins` are merged and de-duplicated before deciding
/// units, matching the original's `asins = sorted(set(target + competitor))`.
pub async fn decide_crawl_units(
    reader: &dyn ResultsReader,
    site_code: &str,
    target_asins: &[String],
    competitor_asins: &[String],
    keywords: &[String],
    trigger_mode: TriggerMode,
    now_ts: i64,
) -> Result<Vec<CrawlUnit>, ResultsReaderError> {
    let asins: Vec<String> = target_asins
        .iter()
        .chain(competitor_asins.iter())
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let keywords: Vec<String> = keywords
        .iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    match trigger_mode {
        TriggerMode::Off => Ok(Vec::new()),
        TriggerMode::Force => {
            let mut units = Vec::new();
            for asin in &asins {
                units.push(CrawlUnit::listing(asin));
                units.push(CrawlUnit::review(asin));
            }
            for keyword in &keywords {
                units.push(CrawlUnit::keyword(keyword));
            }
            Ok(units)
        }
        TriggerMode::Auto => {
            // Reviews are incremental and never force-crawled in AUTO (§4.5).
            let mut units = Vec::new();
            if !asins.is_empty() {
                let latest = reader.latest_listing_day_map(site_code, &asins).await?;
                for asin in &asins {
                    if !is_day_fresh(latest.get(asin), now_ts) {
                        units.push(CrawlUnit::listing(asin));
                    }
                }
            }
            if !keywords.is_empty() {
                let latest = reader.latest_keyword_day_map(site_code, &keywords).await?;
                for keyword in &keywords {
                    if !is_day_fresh(latest.get(keyword), now_ts) {
                        units.push(CrawlUnit::keyword(keyword));
                    }
                }
            }
            Ok(units)
        }
    }
}

fn is_day_fresh(day: Option<&String>, now_ts: i64) -> bool {
    let Some(day) = day else { return false };
    let Ok(captured) = chrono::NaiveDate::parse_from_str(day, "%Y-%m-%d") else { return false };
    let captured_ts = captured.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp();
    is_fresh(captured_ts, now_ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{KeywordSerpDataset, ListingDataset, ReviewDataset};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FixtureReader {
        listing_days: HashMap<String, String>,
        keyword_days: HashMap<String, String>,
    }

    #[async_trait]
    impl ResultsReader for FixtureReader {
        async fn load_review_dataset(&self, _: &str, _: &[String], _: i64, _: i64) -> Result<ReviewDataset, ResultsReaderError> {
            Ok(ReviewDataset::default())
        }
        async fn load_listing_dataset(&self, _: &str, _: &[String]) -> Result<ListingDataset, ResultsReaderError> {
            Ok(ListingDataset::default())
        }
        async fn load_keyword_serp_dataset(&self, _: &str, _: &[String]) -> Result<KeywordSerpDataset, ResultsReaderError> {
            Ok(KeywordSerpDataset::default())
        }
        async fn latest_listing_day_map(&self, _: &str, _: &[String]) -> Result<HashMap<String, String>, ResultsReaderError> {
            Ok(self.listing_days.clone())
        }
        async fn latest_keyword_day_map(&self, _: &str, _: &[String]) -> Result<HashMap<String, String>, ResultsReaderError> {
            Ok(self.keyword_days.clone())
        }
    }

    fn today_str(now_ts: i64) -> String {
        chrono::DateTime::from_timestamp(now_ts, 0).unwrap().format("%Y-%m-%d").to_string()
    }

    #[tokio::test]
    async fn off_mode_returns_no_units() {
        let reader = FixtureReader { listing_days: HashMap::new(), keyword_days: HashMap::new() };
        let units = decide_crawl_units(&reader, "US", &["A1".into()], &[], &["k1".into()], TriggerMode::Off, 1_700_000_000)
            .await
            .unwrap();
        assert!(units.is_empty());
    }

    #[tokio::test]
    async fn force_mode_covers_listing_review_and_keyword() {
        let reader = FixtureReader { listing_days: HashMap::new(), keyword_days: HashMap::new() };
        let units = decide_crawl_units(&reader, "US", &["A1".into()], &["A2".into()], &["k1".into()], TriggerMode::Force, 1_700_000_000)
            .await
            .unwrap();
        assert_eq!(units.len(), 5);
    }

    #[tokio::test]
    async fn auto_mode_skips_fresh_asins_matches_s4() {
        let now = 1_700_000_000i64;
        let mut listing_days = HashMap::new();
        listing_days.insert("A1".to_string(), today_str(now));
        listing_days.insert("A2".to_string(), today_str(now - 3 * 86_400));
        let mut keyword_days = HashMap::new();
        keyword_days.insert("k1".to_string(), today_str(now));

        let reader = FixtureReader { listing_days, keyword_days };
        let units = decide_crawl_units(
            &reader,
            "US",
            &["A1".to_string(), "A2".to_string()],
            &[],
            &["k1".to_string()],
            TriggerMode::Auto,
            now,
        )
        .await
        .unwrap();

        assert_eq!(units, vec![CrawlUnit::listing("A2")]);
    }
}
