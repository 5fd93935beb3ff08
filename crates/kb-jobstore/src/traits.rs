//! The `JobStore` trait (§4.1). One async trait, two backends: `PostgresJobStore`
//! (production — row-locking with `SKIP LOCKED` requires it) and `MemoryJobStore`
//! (tests), dispatched the same way the teacher's `magnetar::open()` picks between
//! its sqlite/redb backends from a connection string.

use crate::error::JobStoreError;
use async_trait::async_trait;
use kb_core::entities::{
    Chunk, Document, DocumentStatus, IngestJob, JobStatus, KbSpace, SpiderTask, SpiderTaskStatus,
    VocJob, VocJobStatus, VocOutput,
};
use serde_json::Value;

/// A not-yet-persisted evidence row (§3 `VocEvidence`, minus `evidence_id`).
#[derive(Debug, Clone)]
pub struct NewEvidence {
    pub source_type: String,
    pub source_id: String,
    pub kind: Option<String>,
    pub snippet: String,
    pub meta: Value,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    // -- Documents / spaces --
    async fn is_space_enabled(&self, space_code: &str) -> Result<bool, JobStoreError>;
    /// Creates (or returns the existing) space row. Not reachable over HTTP in
    /// this workspace's transport shim (§2.1); exists so tests and operators can
    /// seed a space without going around the trait.
    async fn create_space(&self, space_code: &str, display_name: &str, enabled: bool) -> Result<KbSpace, JobStoreError>;
    async fn create_document(
        &self,
        space_code: &str,
        filename: &str,
        content_type: &str,
        size: i64,
        storage_uri: &str,
        sha256: &str,
        uploader_id: Option<i64>,
    ) -> Result<Document, JobStoreError>;
    async fn get_document(&self, document_id: i64) -> Result<Option<kb_core::entities::Document>, JobStoreError>;
    async fn mark_document_status(
        &self,
        document_id: i64,
        status: DocumentStatus,
        last_error: Option<&str>,
    ) -> Result<(), JobStoreError>;
    async fn set_active_index_version(&self, document_id: i64, version: i64) -> Result<(), JobStoreError>;

    // -- Ingest jobs --
    async fn allocate_index_version(&self, document_id: i64) -> Result<i64, JobStoreError>;
    async fn create_ingest_job(
        &self,
        document_id: i64,
        space_code: &str,
        pipeline_version: i32,
        index_version: i64,
        max_retries: i32,
    ) -> Result<IngestJob, JobStoreError>;
    async fn get_ingest_job(&self, job_id: i64) -> Result<Option<IngestJob>, JobStoreError>;
    async fn claim_next_ingest_job(&self, worker_id: &str, lease_seconds: i64) -> Result<Option<IngestJob>, JobStoreError>;
    async fn renew_ingest_lease(&self, job_id: i64, worker_id: &str, lease_seconds: i64) -> Result<u64, JobStoreError>;
    async fn finish_ingest_job(
        &self,
        job_id: i64,
        new_status: JobStatus,
        last_error: Option<&str>,
        clear_lock: bool,
    ) -> Result<(), JobStoreError>;
    async fn cancel_ingest_jobs_by_document(&self, document_id: i64, reason: &str) -> Result<u64, JobStoreError>;
    async fn cancel_ingest_jobs_by_space(&self, space_code: &str, reason: &str) -> Result<u64, JobStoreError>;

    // -- Chunks --
    async fn replace_chunks(&self, document_id: i64, index_version: i64, chunks: Vec<Chunk>) -> Result<(), JobStoreError>;
    async fn list_searchable_chunks(&self, space_code: &str, chunk_ids: &[String]) -> Result<Vec<Chunk>, JobStoreError>;
    async fn delete_stale_chunks(&self, document_id: i64, keep_index_version: i64) -> Result<u64, JobStoreError>;

    // -- VOC jobs --
    async fn create_voc_job_by_hash(
        &self,
        input_hash: &str,
        site_code: &str,
        scope_type: &str,
        scope_value: &str,
        params: Value,
    ) -> Result<VocJob, JobStoreError>;
    async fn get_voc_job(&self, job_id: i64) -> Result<Option<VocJob>, JobStoreError>;
    async fn update_voc_job_status(&self, job_id: i64, status: VocJobStatus, stage: Option<&str>) -> Result<(), JobStoreError>;
    async fn update_voc_job_params(&self, job_id: i64, params: Value) -> Result<(), JobStoreError>;
    async fn fail_voc_job(
        &self,
        job_id: i64,
        error_code: &str,
        error_message: &str,
        failed_stage: &str,
    ) -> Result<(), JobStoreError>;
    async fn claim_next_voc_job(
        &self,
        worker_id: &str,
        lease_seconds: i64,
    ) -> Result<Option<VocJob>, JobStoreError>;
    async fn renew_voc_lease(&self, job_id: i64, worker_id: &str, lease_seconds: i64) -> Result<u64, JobStoreError>;
    /// Releases the lease without changing `status` — used when a worker finishes
    /// a phase (e.g. the crawl decision) but the job waits on an external callback
    /// before its next phase is claimable.
    async fn release_voc_lock(&self, job_id: i64) -> Result<(), JobStoreError>;

    // -- Spider tasks --
    async fn create_spider_task(
        &self,
        job_id: i64,
        task_id: &str,
        run_type: &str,
        scope_type: &str,
        scope_value: &str,
        callback_token_hash: &str,
    ) -> Result<SpiderTask, JobStoreError>;
    async fn get_spider_task_by_task_id(&self, task_id: &str) -> Result<Option<SpiderTask>, JobStoreError>;
    async fn update_spider_task_status(
        &self,
        task_id: &str,
        status: SpiderTaskStatus,
        run_id: Option<i64>,
        last_error: Option<&str>,
    ) -> Result<(), JobStoreError>;

    // -- VOC outputs / evidence / reports --
    async fn upsert_voc_output(&self, job_id: i64, module_code: &str, schema_version: i32, payload: Value) -> Result<(), JobStoreError>;
    async fn clear_voc_evidence(&self, job_id: i64, module_code: &str) -> Result<(), JobStoreError>;
    async fn insert_voc_evidence_many(&self, job_id: i64, module_code: &str, rows: Vec<NewEvidence>) -> Result<(), JobStoreError>;
    async fn list_voc_outputs(&self, job_id: i64) -> Result<Vec<VocOutput>, JobStoreError>;
    async fn count_voc_evidence(&self, job_id: i64, module_code: &str) -> Result<i64, JobStoreError>;
    async fn upsert_voc_report(&self, job_id: i64, report_type: &str, payload: Value, meta: Value) -> Result<(), JobStoreError>;
}
