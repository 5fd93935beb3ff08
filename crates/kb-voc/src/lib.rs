//! Voice-of-Customer analysis pipeline (§4.5, §4.8): crawl decisioning over a
//! hand-rolled Redis RESP gateway, an idempotent signed HTTP callback receiver,
//! deterministic keyword/n-gram analyzers, and a `report.v1` aggregator — all
//! driven by `VocPipeline` off the same lease-claimed `JobStore` the ingest side
//! uses.

pub mod ai_enrichment;
pub mod analyzers;
pub mod callback;
pub mod crawl;
pub mod dataset;
pub mod error;
pub mod pipeline;
pub mod postgres_results;
pub mod report;
pub mod spider_gateway;

pub use callback::{CallbackError, CallbackPayload, CallbackReceiver};
pub use crawl::{decide_crawl_units, CrawlUnit};
pub use dataset::{KeywordSerpDataset, ListingDataset, ResultsReader, ResultsReaderError, Review, ReviewDataset};
pub use error::VocError;
pub use pipeline::VocPipeline;
pub use postgres_results::PostgresResultsReader;
pub use spider_gateway::{SpiderEnqueuePayload, SpiderGateway, SpiderGatewayError};
