//! In-memory `JobStore` for tests. Single `Mutex<State>` guarding plain `Vec`s —
//! no attempt at row-level concurrency, since the point is deterministic tests,
//! not throughput.

use crate::error::JobStoreError;
use crate::traits::{JobStore, NewEvidence};
use async_trait::async_trait;
use kb_core::entities::{
    Chunk, Document, DocumentStatus, IngestJob, JobStatus, KbSpace, SpiderTask, SpiderTaskStatus,
    VocEvidence, VocJob, VocJobStatus, VocOutput,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    spaces: Vec<KbSpace>,
    spaces_disabled: HashSet<String>,
    documents: Vec<Document>,
    ingest_jobs: Vec<IngestJob>,
    chunks: Vec<Chunk>,
    voc_jobs: Vec<VocJob>,
    spider_tasks: Vec<SpiderTask>,
    voc_outputs: Vec<VocOutput>,
    voc_evidence: Vec<VocEvidence>,
    voc_reports: Vec<(i64, String, Value, Value)>,
    next_document_id: i64,
    next_ingest_job_id: i64,
    next_voc_job_id: i64,
    next_task_row_id: i64,
    next_evidence_id: i64,
}

pub struct MemoryJobStore {
    state: Mutex<State>,
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_document_id: 1,
                next_ingest_job_id: 1,
                next_voc_job_id: 1,
                next_task_row_id: 1,
                next_evidence_id: 1,
                ..Default::default()
            }),
        }
    }

    /// Seeds a document directly, bypassing any upload pipeline — test helper only.
    pub fn seed_document(&self, document: Document) {
        self.state.lock().unwrap().documents.push(document);
    }

    pub fn seed_space_disabled(&self, space_code: &str) {
        self.state.lock().unwrap().spaces_disabled.insert(space_code.to_string());
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn is_space_enabled(&self, space_code: &str) -> Result<bool, JobStoreError> {
        Ok(!self.state.lock().unwrap().spaces_disabled.contains(space_code))
    }

    async fn create_space(&self, space_code: &str, display_name: &str, enabled: bool) -> Result<KbSpace, JobStoreError> {
        let mut state = self.state.lock().unwrap();
        if enabled {
            state.spaces_disabled.remove(space_code);
        } else {
            state.spaces_disabled.insert(space_code.to_string());
        }
        if let Some(existing) = state.spaces.iter_mut().find(|s| s.space_code == space_code) {
            existing.display_name = display_name.to_string();
            existing.enabled = enabled;
            return Ok(existing.clone());
        }
        let space = KbSpace {
            space_code: space_code.to_string(),
            display_name: display_name.to_string(),
            description: None,
            enabled,
            status: "active".to_string(),
        };
        state.spaces.push(space.clone());
        Ok(space)
    }

    async fn create_document(
        &self,
        space_code: &str,
        filename: &str,
        content_type: &str,
        size: i64,
        storage_uri: &str,
        sha256: &str,
        uploader_id: Option<i64>,
    ) -> Result<Document, JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let document_id = state.next_document_id;
        state.next_document_id += 1;
        let document = Document {
            document_id,
            space_code: space_code.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size,
            storage_uri: storage_uri.to_string(),
            sha256: sha256.to_string(),
            status: DocumentStatus::Uploaded,
            active_index_version: None,
            uploader_id,
            last_error: None,
            deleted_at: None,
        };
        state.documents.push(document.clone());
        Ok(document)
    }

    async fn get_document(&self, document_id: i64) -> Result<Option<Document>, JobStoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .documents
            .iter()
            .find(|d| d.document_id == document_id)
            .cloned())
    }

    async fn mark_document_status(
        &self,
        document_id: i64,
        status: DocumentStatus,
        last_error: Option<&str>,
    ) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let doc = state
            .documents
            .iter_mut()
            .find(|d| d.document_id == document_id)
            .ok_or_else(|| JobStoreError::NotFound(format!("document {document_id}")))?;
        doc.status = status;
        doc.last_error = last_error.map(String::from);
        Ok(())
    }

    async fn set_active_index_version(&self, document_id: i64, version: i64) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let doc = state
            .documents
            .iter_mut()
            .find(|d| d.document_id == document_id)
            .ok_or_else(|| JobStoreError::NotFound(format!("document {document_id}")))?;
        doc.active_index_version = Some(version);
        Ok(())
    }

    async fn allocate_index_version(&self, document_id: i64) -> Result<i64, JobStoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .ingest_jobs
            .iter()
            .filter(|j| j.document_id == document_id)
            .map(|j| j.index_version)
            .max()
            .unwrap_or(0)
            + 1)
    }

    async fn create_ingest_job(
        &self,
        document_id: i64,
        space_code: &str,
        pipeline_version: i32,
        index_version: i64,
        max_retries: i32,
    ) -> Result<IngestJob, JobStoreError> {
        let idempotency_key =
            kb_core::entities::ingest_idempotency_key(document_id, pipeline_version, index_version);
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.ingest_jobs.iter().find(|j| j.idempotency_key == idempotency_key) {
            return Ok(existing.clone());
        }
        let job_id = state.next_ingest_job_id;
        state.next_ingest_job_id += 1;
        let job = IngestJob {
            job_id,
            document_id,
            space_code: space_code.to_string(),
            pipeline_version,
            index_version,
            idempotency_key,
            status: JobStatus::Pending,
            try_count: 0,
            max_retries,
            locked_by: None,
            locked_until: None,
            last_error: None,
        };
        state.ingest_jobs.push(job.clone());
        Ok(job)
    }

    async fn get_ingest_job(&self, job_id: i64) -> Result<Option<IngestJob>, JobStoreError> {
        Ok(self.state.lock().unwrap().ingest_jobs.iter().find(|j| j.job_id == job_id).cloned())
    }

    async fn claim_next_ingest_job(&self, worker_id: &str, lease_seconds: i64) -> Result<Option<IngestJob>, JobStoreError> {
        let now = kb_core::time::now_ts();
        let mut state = self.state.lock().unwrap();
        let claimable = state
            .ingest_jobs
            .iter_mut()
            .filter(|j| {
                j.status == JobStatus::Pending
                    || (j.status == JobStatus::Failed && j.try_count < j.max_retries)
                    || (j.status == JobStatus::Running
                        && j.locked_until.map(|t| t < now).unwrap_or(true)
                        && j.try_count < j.max_retries)
            })
            .min_by_key(|j| j.job_id);
        match claimable {
            Some(job) => {
                job.status = JobStatus::Running;
                job.locked_by = Some(worker_id.to_string());
                job.locked_until = Some(now + lease_seconds);
                job.try_count += 1;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn renew_ingest_lease(&self, job_id: i64, worker_id: &str, lease_seconds: i64) -> Result<u64, JobStoreError> {
        let now = kb_core::time::now_ts();
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state
            .ingest_jobs
            .iter_mut()
            .find(|j| j.job_id == job_id && j.locked_by.as_deref() == Some(worker_id) && j.status == JobStatus::Running)
        {
            job.locked_until = Some(now + lease_seconds);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn finish_ingest_job(
        &self,
        job_id: i64,
        new_status: JobStatus,
        last_error: Option<&str>,
        clear_lock: bool,
    ) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .ingest_jobs
            .iter_mut()
            .find(|j| j.job_id == job_id)
            .ok_or_else(|| JobStoreError::NotFound(format!("ingest job {job_id}")))?;
        job.status = new_status;
        job.last_error = last_error.map(String::from);
        if clear_lock {
            job.locked_by = None;
            job.locked_until = None;
        }
        Ok(())
    }

    async fn cancel_ingest_jobs_by_document(&self, document_id: i64, reason: &str) -> Result<u64, JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let mut n = 0;
        for job in state.ingest_jobs.iter_mut() {
            if job.document_id == document_id
                && matches!(job.status, JobStatus::Pending | JobStatus::Running | JobStatus::Failed)
            {
                job.status = JobStatus::Cancelled;
                job.last_error = Some(reason.to_string());
                n += 1;
            }
        }
        Ok(n)
    }

    async fn cancel_ingest_jobs_by_space(&self, space_code: &str, reason: &str) -> Result<u64, JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let mut n = 0;
        for job in state.ingest_jobs.iter_mut() {
            if job.space_code == space_code
                && matches!(job.status, JobStatus::Pending | JobStatus::Running | JobStatus::Failed)
            {
                job.status = JobStatus::Cancelled;
                job.last_error = Some(reason.to_string());
                n += 1;
            }
        }
        Ok(n)
    }

    async fn replace_chunks(&self, document_id: i64, index_version: i64, chunks: Vec<Chunk>) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .chunks
            .retain(|c| !(c.document_id == document_id && c.index_version == index_version));
        state.chunks.extend(chunks);
        Ok(())
    }

    async fn list_searchable_chunks(&self, space_code: &str, chunk_ids: &[String]) -> Result<Vec<Chunk>, JobStoreError> {
        let state = self.state.lock().unwrap();
        let active_versions: std::collections::HashMap<i64, i64> = state
            .documents
            .iter()
            .filter(|d| d.deleted_at.is_none())
            .filter_map(|d| d.active_index_version.map(|v| (d.document_id, v)))
            .collect();
        Ok(state
            .chunks
            .iter()
            .filter(|c| {
                c.space_code == space_code
                    && chunk_ids.contains(&c.chunk_id)
                    && active_versions.get(&c.document_id) == Some(&c.index_version)
            })
            .cloned()
            .collect())
    }

    async fn delete_stale_chunks(&self, document_id: i64, keep_index_version: i64) -> Result<u64, JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let before = state.chunks.len();
        state
            .chunks
            .retain(|c| !(c.document_id == document_id && c.index_version != keep_index_version));
        Ok((before - state.chunks.len()) as u64)
    }

    async fn create_voc_job_by_hash(
        &self,
        input_hash: &str,
        site_code: &str,
        scope_type: &str,
        scope_value: &str,
        params: Value,
    ) -> Result<VocJob, JobStoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.voc_jobs.iter().find(|j| j.input_hash == input_hash) {
            return Ok(existing.clone());
        }
        let job_id = state.next_voc_job_id;
        state.next_voc_job_id += 1;
        let job = VocJob {
            job_id,
            input_hash: input_hash.to_string(),
            site_code: site_code.to_string(),
            scope_type: scope_type.to_string(),
            scope_value: scope_value.to_string(),
            params,
            status: VocJobStatus::Pending,
            stage: None,
            preferred_task_id: None,
            preferred_run_id: None,
            error_code: None,
            error_message: None,
            failed_stage: None,
            try_count: 0,
            max_retries: 3,
            locked_by: None,
            locked_until: None,
        };
        state.voc_jobs.push(job.clone());
        Ok(job)
    }

    async fn get_voc_job(&self, job_id: i64) -> Result<Option<VocJob>, JobStoreError> {
        Ok(self.state.lock().unwrap().voc_jobs.iter().find(|j| j.job_id == job_id).cloned())
    }

    async fn update_voc_job_status(&self, job_id: i64, status: VocJobStatus, stage: Option<&str>) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .voc_jobs
            .iter_mut()
            .find(|j| j.job_id == job_id)
            .ok_or_else(|| JobStoreError::NotFound(format!("voc job {job_id}")))?;
        job.status = status;
        job.stage = stage.map(String::from);
        Ok(())
    }

    async fn update_voc_job_params(&self, job_id: i64, params: Value) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .voc_jobs
            .iter_mut()
            .find(|j| j.job_id == job_id)
            .ok_or_else(|| JobStoreError::NotFound(format!("voc job {job_id}")))?;
        job.params = params;
        Ok(())
    }

    async fn fail_voc_job(
        &self,
        job_id: i64,
        error_code: &str,
        error_message: &str,
        failed_stage: &str,
    ) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let job = state
            .voc_jobs
            .iter_mut()
            .find(|j| j.job_id == job_id)
            .ok_or_else(|| JobStoreError::NotFound(format!("voc job {job_id}")))?;
        job.status = VocJobStatus::Failed;
        job.error_code = Some(error_code.to_string());
        job.error_message = Some(error_message.to_string());
        job.failed_stage = Some(failed_stage.to_string());
        job.locked_by = None;
        job.locked_until = None;
        Ok(())
    }

    async fn claim_next_voc_job(&self, worker_id: &str, lease_seconds: i64) -> Result<Option<VocJob>, JobStoreError> {
        let now = kb_core::time::now_ts();
        let mut state = self.state.lock().unwrap();
        let claimable = state
            .voc_jobs
            .iter_mut()
            .filter(|j| {
                j.status == VocJobStatus::Pending
                    || (!j.status.is_terminal()
                        && j.locked_until.map(|t| t < now).unwrap_or(true)
                        && j.try_count < j.max_retries)
            })
            .min_by_key(|j| j.job_id);
        match claimable {
            Some(job) => {
                if job.status == VocJobStatus::Pending {
                    job.status = VocJobStatus::Crawling;
                }
                job.locked_by = Some(worker_id.to_string());
                job.locked_until = Some(now + lease_seconds);
                job.try_count += 1;
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn renew_voc_lease(&self, job_id: i64, worker_id: &str, lease_seconds: i64) -> Result<u64, JobStoreError> {
        let now = kb_core::time::now_ts();
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state
            .voc_jobs
            .iter_mut()
            .find(|j| j.job_id == job_id && j.locked_by.as_deref() == Some(worker_id))
        {
            job.locked_until = Some(now + lease_seconds);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn release_voc_lock(&self, job_id: i64) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.voc_jobs.iter_mut().find(|j| j.job_id == job_id) {
            job.locked_by = None;
            job.locked_until = None;
        }
        Ok(())
    }

    async fn create_spider_task(
        &self,
        job_id: i64,
        task_id: &str,
        run_type: &str,
        scope_type: &str,
        scope_value: &str,
        callback_token_hash: &str,
    ) -> Result<SpiderTask, JobStoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.spider_tasks.iter().find(|t| t.task_id == task_id) {
            return Ok(existing.clone());
        }
        let task_row_id = state.next_task_row_id;
        state.next_task_row_id += 1;
        let task = SpiderTask {
            task_row_id,
            job_id,
            task_id: task_id.to_string(),
            run_type: run_type.to_string(),
            scope_type: scope_type.to_string(),
            scope_value: scope_value.to_string(),
            status: SpiderTaskStatus::Pending,
            run_id: None,
            callback_token_hash: callback_token_hash.to_string(),
            callback_token_created_at: kb_core::time::now_ts(),
            last_error: None,
        };
        state.spider_tasks.push(task.clone());
        Ok(task)
    }

    async fn get_spider_task_by_task_id(&self, task_id: &str) -> Result<Option<SpiderTask>, JobStoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .spider_tasks
            .iter()
            .find(|t| t.task_id == task_id)
            .cloned())
    }

    async fn update_spider_task_status(
        &self,
        task_id: &str,
        status: SpiderTaskStatus,
        run_id: Option<i64>,
        last_error: Option<&str>,
    ) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let task = state
            .spider_tasks
            .iter_mut()
            .find(|t| t.task_id == task_id)
            .ok_or_else(|| JobStoreError::NotFound(format!("spider task {task_id}")))?;
        task.status = status;
        if let Some(run_id) = run_id {
            task.run_id = Some(run_id);
        }
        task.last_error = last_error.map(String::from);
        Ok(())
    }

    async fn upsert_voc_output(&self, job_id: i64, module_code: &str, schema_version: i32, payload: Value) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        let now = kb_core::time::now_ts();
        if let Some(existing) = state
            .voc_outputs
            .iter_mut()
            .find(|o| o.job_id == job_id && o.module_code == module_code)
        {
            existing.schema_version = schema_version;
            existing.payload = payload;
            existing.updated_at = now;
        } else {
            state.voc_outputs.push(VocOutput {
                job_id,
                module_code: module_code.to_string(),
                schema_version,
                payload,
                updated_at: now,
            });
        }
        Ok(())
    }

    async fn clear_voc_evidence(&self, job_id: i64, module_code: &str) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .voc_evidence
            .retain(|e| !(e.job_id == job_id && e.module_code == module_code));
        Ok(())
    }

    async fn insert_voc_evidence_many(&self, job_id: i64, module_code: &str, rows: Vec<NewEvidence>) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        for row in rows {
            let evidence_id = state.next_evidence_id;
            state.next_evidence_id += 1;
            state.voc_evidence.push(VocEvidence {
                evidence_id,
                job_id,
                module_code: module_code.to_string(),
                source_type: row.source_type,
                source_id: row.source_id,
                kind: row.kind,
                snippet: row.snippet,
                meta: row.meta,
            });
        }
        Ok(())
    }

    async fn list_voc_outputs(&self, job_id: i64) -> Result<Vec<VocOutput>, JobStoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .voc_outputs
            .iter()
            .filter(|o| o.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn count_voc_evidence(&self, job_id: i64, module_code: &str) -> Result<i64, JobStoreError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .voc_evidence
            .iter()
            .filter(|e| e.job_id == job_id && e.module_code == module_code)
            .count() as i64)
    }

    async fn upsert_voc_report(&self, job_id: i64, report_type: &str, payload: Value, meta: Value) -> Result<(), JobStoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.voc_reports.iter_mut().find(|(id, _, _, _)| *id == job_id) {
            *existing = (job_id, report_type.to_string(), payload, meta);
        } else {
            state.voc_reports.push((job_id, report_type.to_string(), payload, meta));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_is_idempotent_until_finished() {
        let store = MemoryJobStore::new();
        store.seed_document(Document {
            document_id: 1,
            space_code: "default".to_string(),
            filename: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            size: 3,
            storage_uri: "mem://a".to_string(),
            sha256: "deadbeef".to_string(),
            status: DocumentStatus::Uploaded,
            active_index_version: None,
            uploader_id: None,
            last_error: None,
            deleted_at: None,
        });
        let job = store.create_ingest_job(1, "default", 1, 1, 3).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);

        let claimed = store.claim_next_ingest_job("worker-1", 60).await.unwrap().unwrap();
        assert_eq!(claimed.job_id, job.job_id);
        assert_eq!(claimed.try_count, 1);

        let second = store.claim_next_ingest_job("worker-2", 60).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn expired_lease_becomes_claimable_again() {
        let store = MemoryJobStore::new();
        store.seed_document(Document {
            document_id: 1,
            space_code: "default".to_string(),
            filename: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            size: 3,
            storage_uri: "mem://a".to_string(),
            sha256: "deadbeef".to_string(),
            status: DocumentStatus::Uploaded,
            active_index_version: None,
            uploader_id: None,
            last_error: None,
            deleted_at: None,
        });
        store.create_ingest_job(1, "default", 1, 1, 3).await.unwrap();
        let claimed = store.claim_next_ingest_job("worker-1", -10).await.unwrap().unwrap();
        let reclaimed = store.claim_next_ingest_job("worker-2", 60).await.unwrap().unwrap();
        assert_eq!(reclaimed.job_id, claimed.job_id);
        assert_eq!(reclaimed.try_count, 2);
    }

    #[tokio::test]
    async fn voc_job_creation_is_idempotent_by_hash() {
        let store = MemoryJobStore::new();
        let a = store
            .create_voc_job_by_hash("h1", "amazon", "asin", "A2", serde_json::json!({}))
            .await
            .unwrap();
        let b = store
            .create_voc_job_by_hash("h1", "amazon", "asin", "A2", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(a.job_id, b.job_id);
    }

    #[tokio::test]
    async fn create_space_then_create_document_round_trips() {
        let store = MemoryJobStore::new();
        let space = store.create_space("default", "Default", true).await.unwrap();
        assert!(space.enabled);
        assert!(store.is_space_enabled("default").await.unwrap());

        let document = store
            .create_document("default", "a.txt", "text/plain", 3, "mem://a", "deadbeef", None)
            .await
            .unwrap();
        assert_eq!(document.space_code, "default");
        assert_eq!(document.status, DocumentStatus::Uploaded);

        let fetched = store.get_document(document.document_id).await.unwrap().unwrap();
        assert_eq!(fetched.document_id, document.document_id);
    }

    #[tokio::test]
    async fn create_space_disabled_then_enabled_updates_in_place() {
        let store = MemoryJobStore::new();
        store.create_space("quiet", "Quiet", false).await.unwrap();
        assert!(!store.is_space_enabled("quiet").await.unwrap());

        let space = store.create_space("quiet", "Quiet Space", true).await.unwrap();
        assert_eq!(space.display_name, "Quiet Space");
        assert!(store.is_space_enabled("quiet").await.unwrap());
    }

    #[tokio::test]
    async fn get_ingest_job_finds_by_id_and_misses_unknown() {
        let store = MemoryJobStore::new();
        store.seed_document(Document {
            document_id: 1,
            space_code: "default".to_string(),
            filename: "a.txt".to_string(),
            content_type: "text/plain".to_string(),
            size: 3,
            storage_uri: "mem://a".to_string(),
            sha256: "deadbeef".to_string(),
            status: DocumentStatus::Uploaded,
            active_index_version: None,
            uploader_id: None,
            last_error: None,
            deleted_at: None,
        });
        let job = store.create_ingest_job(1, "default", 1, 1, 3).await.unwrap();

        let found = store.get_ingest_job(job.job_id).await.unwrap().unwrap();
        assert_eq!(found.job_id, job.job_id);
        assert!(store.get_ingest_job(job.job_id + 999).await.unwrap().is_none());
    }
}
