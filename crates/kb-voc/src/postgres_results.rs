//! Postgres-backed `ResultsReader` against the external spider results
//! database (§6: `SPIDER_DB_URL`; §6 "Results DB": tables `spider_runs`,
//! `amazon_review_items`, `amazon_review_media`, `amazon_listing_items`,
//! `amazon_keyword_search_items`). Strictly SELECT, matching
//! `kb-jobstore/src/backends/postgres.rs`'s query/bind/map_err idiom.

use crate::dataset::{
    KeywordSerpDataset, ListingDataset, ListingSnapshot, Review, ResultsReader, ResultsReaderError,
    ReviewDataset, SerpItem,
};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::collections::HashMap;

pub struct PostgresResultsReader {
    pool: PgPool,
}

impl PostgresResultsReader {
    pub async fn connect(database_url: &str) -> Result<Self, ResultsReaderError> {
        let pool = PgPool::connect(database_url).await.map_err(|e| ResultsReaderError(e.to_string()))?;
        Ok(Self { pool })
    }
}

fn map_err(e: sqlx::Error) -> ResultsReaderError {
    ResultsReaderError(e.to_string())
}

#[async_trait]
impl ResultsReader for PostgresResultsReader {
    async fn load_review_dataset(
        &self,
        site_code: &str,
        asins: &[String],
        review_time_from: i64,
        review_time_to: i64,
    ) -> Result<ReviewDataset, ResultsReaderError> {
        let rows = sqlx::query(
            "SELECT review_id, asin, stars, review_title, review_body, review_time,
                    helpful_votes, verified_purchase, review_url
             FROM amazon_review_items
             WHERE site_code = $1 AND asin = ANY($2) AND review_time BETWEEN $3 AND $4
             ORDER BY review_time ASC",
        )
        .bind(site_code)
        .bind(asins)
        .bind(review_time_from)
        .bind(review_time_to)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut reviews = Vec::with_capacity(rows.len());
        for row in &rows {
            reviews.push(Review {
                review_id: row.try_get("review_id").map_err(map_err)?,
                asin: row.try_get("asin").map_err(map_err)?,
                stars: row.try_get("stars").map_err(map_err)?,
                review_title: row.try_get("review_title").map_err(map_err)?,
                review_body: row.try_get("review_body").map_err(map_err)?,
                review_time: row.try_get("review_time").map_err(map_err)?,
                helpful_votes: row.try_get("helpful_votes").map_err(map_err)?,
                verified_purchase: row.try_get("verified_purchase").map_err(map_err)?,
                review_url: row.try_get("review_url").map_err(map_err)?,
            });
        }

        Ok(ReviewDataset {
            site_code: site_code.to_string(),
            asins: asins.to_vec(),
            review_time_from: Some(review_time_from),
            review_time_to: Some(review_time_to),
            reviews,
        })
    }

    async fn load_listing_dataset(&self, site_code: &str, asins: &[String]) -> Result<ListingDataset, ResultsReaderError> {
        let rows = sqlx::query(
            "SELECT listing_id, captured_at, captured_day, asin, brand_name, title,
                    price_amount, price_currency, stars, ratings_count, review_count,
                    bought_past_month, availability_text, seller_name, variation_summary,
                    category_path, main_image_url
             FROM amazon_listing_items
             WHERE site_code = $1 AND asin = ANY($2)
             ORDER BY captured_at ASC",
        )
        .bind(site_code)
        .bind(asins)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in &rows {
            snapshots.push(ListingSnapshot {
                listing_id: row.try_get("listing_id").map_err(map_err)?,
                captured_at: row.try_get("captured_at").map_err(map_err)?,
                captured_day: row.try_get("captured_day").map_err(map_err)?,
                asin: row.try_get("asin").map_err(map_err)?,
                brand_name: row.try_get("brand_name").map_err(map_err)?,
                title: row.try_get("title").map_err(map_err)?,
                price_amount: row.try_get("price_amount").map_err(map_err)?,
                price_currency: row.try_get("price_currency").map_err(map_err)?,
                stars: row.try_get("stars").map_err(map_err)?,
                ratings_count: row.try_get("ratings_count").map_err(map_err)?,
                review_count: row.try_get("review_count").map_err(map_err)?,
                bought_past_month: row.try_get("bought_past_month").map_err(map_err)?,
                availability_text: row.try_get("availability_text").map_err(map_err)?,
                seller_name: row.try_get("seller_name").map_err(map_err)?,
                variation_summary: row.try_get("variation_summary").map_err(map_err)?,
                category_path: row.try_get("category_path").map_err(map_err)?,
                main_image_url: row.try_get("main_image_url").map_err(map_err)?,
            });
        }

        Ok(ListingDataset {
            site_code: site_code.to_string(),
            asins: asins.to_vec(),
            start_day: snapshots.first().map(|s| s.captured_day.clone()),
            end_day: snapshots.last().map(|s| s.captured_day.clone()),
            snapshots,
        })
    }

    async fn load_keyword_serp_dataset(&self, site_code: &str, keywords: &[String]) -> Result<KeywordSerpDataset, ResultsReaderError> {
        let rows = sqlx::query(
            "SELECT kw_item_id, keyword, page_num, position, is_sponsored, asin, title,
                    brand_name, image_url, product_url, price_amount, price_currency,
                    stars, ratings_count, review_count, bought_past_month, captured_day
             FROM amazon_keyword_search_items
             WHERE site_code = $1 AND keyword = ANY($2)
             ORDER BY keyword ASC, page_num ASC, position ASC",
        )
        .bind(site_code)
        .bind(keywords)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut items = Vec::with_capacity(rows.len());
        let mut days = Vec::new();
        for row in &rows {
            let day: Option<String> = row.try_get("captured_day").map_err(map_err)?;
            if let Some(day) = &day {
                days.push(day.clone());
            }
            items.push(SerpItem {
                kw_item_id: row.try_get("kw_item_id").map_err(map_err)?,
                keyword: row.try_get("keyword").map_err(map_err)?,
                page_num: row.try_get("page_num").map_err(map_err)?,
                position: row.try_get("position").map_err(map_err)?,
                is_sponsored: row.try_get("is_sponsored").map_err(map_err)?,
                asin: row.try_get("asin").map_err(map_err)?,
                title: row.try_get("title").map_err(map_err)?,
                brand_name: row.try_get("brand_name").map_err(map_err)?,
                image_url: row.try_get("image_url").map_err(map_err)?,
                product_url: row.try_get("product_url").map_err(map_err)?,
                price_amount: row.try_get("price_amount").map_err(map_err)?,
                price_currency: row.try_get("price_currency").map_err(map_err)?,
                stars: row.try_get("stars").map_err(map_err)?,
                ratings_count: row.try_get("ratings_count").map_err(map_err)?,
                review_count: row.try_get("review_count").map_err(map_err)?,
                bought_past_month: row.try_get("bought_past_month").map_err(map_err)?,
            });
        }
        days.sort();

        Ok(KeywordSerpDataset {
            site_code: site_code.to_string(),
            keywords: keywords.to_vec(),
            start_day: days.first().cloned(),
            end_day: days.last().cloned(),
            items,
        })
    }

    async fn latest_listing_day_map(&self, site_code: &str, asins: &[String]) -> Result<HashMap<String, String>, ResultsReaderError> {
        let rows = sqlx::query(
            "SELECT asin, MAX(captured_day) AS latest_day
             FROM amazon_listing_items
             WHERE site_code = $1 AND asin = ANY($2)
             GROUP BY asin",
        )
        .bind(site_code)
        .bind(asins)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut map = HashMap::with_capacity(rows.len());
        for row in &rows {
            let asin: String = row.try_get("asin").map_err(map_err)?;
            let latest_day: String = row.try_get("latest_day").map_err(map_err)?;
            map.insert(asin, latest_day);
        }
        Ok(map)
    }

    async fn latest_keyword_day_map(&self, site_code: &str, keywords: &[String]) -> Result<HashMap<String, String>, ResultsReaderError> {
        let rows = sqlx::query(
            "SELECT keyword, MAX(captured_day) AS latest_day
             FROM amazon_keyword_search_items
             WHERE site_code = $1 AND keyword = ANY($2)
             GROUP BY keyword",
        )
        .bind(site_code)
        .bind(keywords)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut map = HashMap::with_capacity(rows.len());
        for row in &rows {
            let keyword: String = row.try_get("keyword").map_err(map_err)?;
            let latest_day: String = row.try_get("latest_day").map_err(map_err)?;
            map.insert(keyword, latest_day);
        }
        Ok(map)
    }
}
