//! `ModuleAnalyzer` registry (§4.5.1). Each implementation computes one
//! `module_code`'s payload plus the evidence rows backing it, purely from the
//! datasets already loaded into `AnalysisContext` — no I/O here.

mod buyers_motivation;
mod customer_expectations;
mod customer_sentiment;
mod keyword_details;
mod product_details;
mod rating_optimization;
mod review_overview;
mod text_util;
mod usage_scenario;

use crate::dataset::{KeywordSerpDataset, ListingDataset, ReviewDataset};
use kb_jobstore::NewEvidence;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("analyzer error: {0}")]
pub struct AnalysisError(pub String);

pub struct AnalysisContext {
    pub review_dataset: ReviewDataset,
    pub listing_dataset: ListingDataset,
    pub keyword_dataset: KeywordSerpDataset,
    pub target_asins: Vec<String>,
    pub competitor_asins: Vec<String>,
    pub keywords: Vec<String>,
}

pub trait ModuleAnalyzer: Send + Sync {
    fn module_code(&self) -> &'static str;
    fn analyze(&self, ctx: &AnalysisContext) -> Result<(Value, Vec<NewEvidence>), AnalysisError>;
}

/// Fixed execution order (§4.5.1); also becomes the report's `module_order`.
pub fn analyzer_registry() -> Vec<Box<dyn ModuleAnalyzer>> {
    vec![
        Box::new(review_overview::ReviewOverviewAnalyzer),
        Box::new(customer_sentiment::CustomerSentimentAnalyzer),
        Box::new(usage_scenario::UsageScenarioAnalyzer),
        Box::new(buyers_motivation::BuyersMotivationAnalyzer),
        Box::new(customer_expectations::CustomerExpectationsAnalyzer),
        Box::new(rating_optimization::RatingOptimizationAnalyzer),
        Box::new(product_details::ProductDetailsAnalyzer),
        Box::new(keyword_details::KeywordDetailsAnalyzer),
    ]
}
