use crate::config::SchedulerConfig;
use kb_ingest::IngestPipeline;
use kb_jobstore::JobStore;
use kb_resilience::CircuitBreaker;
use kb_voc::VocPipeline;
use std::sync::Arc;

/// Holds everything a worker needs to claim, run, and finish a job of either
/// pipeline kind. One instance is shared (via `Arc`) across the whole pool.
pub struct LeaseScheduler {
    pub job_store: Arc<dyn JobStore>,
    pub ingest_pipeline: Arc<IngestPipeline>,
    pub voc_pipeline: Arc<VocPipeline>,
    pub ingest_breaker: CircuitBreaker,
    pub voc_breaker: CircuitBreaker,
    pub config: SchedulerConfig,
}

impl LeaseScheduler {
    pub fn new(
        job_store: Arc<dyn JobStore>,
        ingest_pipeline: Arc<IngestPipeline>,
        voc_pipeline: Arc<VocPipeline>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            job_store,
            ingest_pipeline,
            voc_pipeline,
            ingest_breaker: CircuitBreaker::new_default(),
            voc_breaker: CircuitBreaker::new_default(),
            config,
        }
    }
}
