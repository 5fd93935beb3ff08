//! Read-model for the external, read-only spider results database (§3.1).
//! `ResultsReader` is the seam: production talks Postgres over `SPIDER_DB_URL`,
//! tests supply an in-memory fixture.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub review_id: i64,
    pub asin: String,
    pub stars: i32,
    pub review_title: Option<String>,
    pub review_body: Option<String>,
    pub review_time: Option<i64>,
    pub helpful_votes: i64,
    pub verified_purchase: bool,
    pub review_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewDataset {
    pub site_code: String,
    pub asins: Vec<String>,
    pub review_time_from: Option<i64>,
    pub review_time_to: Option<i64>,
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingSnapshot {
    pub listing_id: i64,
    pub captured_at: i64,
    pub captured_day: String,
    pub asin: String,
    pub brand_name: Option<String>,
    pub title: Option<String>,
    pub price_amount: Option<f64>,
    pub price_currency: Option<String>,
    pub stars: Option<f64>,
    pub ratings_count: Option<i64>,
    pub review_count: Option<i64>,
    pub bought_past_month: Option<i64>,
    pub availability_text: Option<String>,
    pub seller_name: Option<String>,
    pub variation_summary: Option<String>,
    pub category_path: Option<String>,
    pub main_image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingDataset {
    pub site_code: String,
    pub asins: Vec<String>,
    pub start_day: Option<String>,
    pub end_day: Option<String>,
    pub snapshots: Vec<ListingSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerpItem {
    pub kw_item_id: i64,
    pub keyword: String,
    pub page_num: i32,
    pub position: i32,
    pub is_sponsored: bool,
    pub asin: String,
    pub title: Option<String>,
    pub brand_name: Option<String>,
    pub image_url: Option<String>,
    pub product_url: Option<String>,
    pub price_amount: Option<f64>,
    pub price_currency: Option<String>,
    pub stars: Option<f64>,
    pub ratings_count: Option<i64>,
    pub review_count: Option<i64>,
    pub bought_past_month: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordSerpDataset {
    pub site_code: String,
    pub keywords: Vec<String>,
    pub start_day: Option<String>,
    pub end_day: Option<String>,
    pub items: Vec<SerpItem>,
}

#[derive(Debug, thiserror::Error)]
#[error("results reader error: {0}")]
pub struct ResultsReaderError(pub String);

/// Read-only access to the spider's results database (§6). Every query is
/// strictly SELECT; no implementation in scope writes through this trait.
#[async_trait]
pub trait ResultsReader: Send + Sync {
    async fn load_review_dataset(
        &self,
        site_code: &str,
        asins: &[String],
        review_time_from: i64,
        review_time_to: i64,
    ) -> Result<ReviewDataset, ResultsReaderError>;

    async fn load_listing_dataset(&self, site_code: &str, asins: &[String]) -> Result<ListingDataset, ResultsReaderError>;

    async fn load_keyword_serp_dataset(&self, site_code: &str, keywords: &[String]) -> Result<KeywordSerpDataset, ResultsReaderError>;

    /// `asin -> latest captured_day` (§4.5 AUTO freshness check).
    async fn latest_listing_day_map(&self, site_code: &str, asins: &[String]) -> Result<std::collections::HashMap<String, String>, ResultsReaderError>;

    /// `keyword -> latest captured_day` (§4.5 AUTO freshness check).
    async fn latest_keyword_day_map(&self, site_code: &str, keywords: &[String]) -> Result<std::collections::HashMap<String, String>, ResultsReaderError>;
}
