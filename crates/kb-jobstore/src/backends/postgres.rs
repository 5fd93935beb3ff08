//! Postgres-backed `JobStore`. `claim_next_ingest_job`/`claim_next_voc_job` use
//! `FOR UPDATE SKIP LOCKED` so a pool of workers can race the same table without
//! blocking each other, adapted from the teacher's sqlite `claim_pending` pattern
//! to Postgres's locking subquery form.

use crate::error::{classify_sqlx_error, JobStoreError};
use crate::traits::{JobStore, NewEvidence};
use async_trait::async_trait;
use kb_core::entities::{
    Chunk, Document, DocumentStatus, IngestJob, JobStatus, KbSpace, Locator, Modality, SpiderTask,
    SpiderTaskStatus, VocJob, VocJobStatus, VocOutput,
};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};

pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub async fn connect(database_url: &str) -> Result<Self, JobStoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), JobStoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| JobStoreError::Storage(e.to_string()))
    }
}

fn row_to_ingest_job(row: &sqlx::postgres::PgRow) -> Result<IngestJob, JobStoreError> {
    let status_i16: i16 = row.try_get("status").map_err(classify_sqlx_error)?;
    Ok(IngestJob {
        job_id: row.try_get("job_id").map_err(classify_sqlx_error)?,
        document_id: row.try_get("document_id").map_err(classify_sqlx_error)?,
        space_code: row.try_get("space_code").map_err(classify_sqlx_error)?,
        pipeline_version: row.try_get("pipeline_version").map_err(classify_sqlx_error)?,
        index_version: row.try_get("index_version").map_err(classify_sqlx_error)?,
        idempotency_key: row.try_get("idempotency_key").map_err(classify_sqlx_error)?,
        status: JobStatus::from_i16(status_i16)
            .ok_or_else(|| JobStoreError::Storage(format!("unknown job status {status_i16}")))?,
        try_count: row.try_get("try_count").map_err(classify_sqlx_error)?,
        max_retries: row.try_get("max_retries").map_err(classify_sqlx_error)?,
        locked_by: row.try_get("locked_by").map_err(classify_sqlx_error)?,
        locked_until: row.try_get("locked_until").map_err(classify_sqlx_error)?,
        last_error: row.try_get("last_error").map_err(classify_sqlx_error)?,
    })
}

fn row_to_voc_job(row: &sqlx::postgres::PgRow) -> Result<VocJob, JobStoreError> {
    let status_i16: i16 = row.try_get("status").map_err(classify_sqlx_error)?;
    Ok(VocJob {
        job_id: row.try_get("job_id").map_err(classify_sqlx_error)?,
        input_hash: row.try_get("input_hash").map_err(classify_sqlx_error)?,
        site_code: row.try_get("site_code").map_err(classify_sqlx_error)?,
        scope_type: row.try_get("scope_type").map_err(classify_sqlx_error)?,
        scope_value: row.try_get("scope_value").map_err(classify_sqlx_error)?,
        params: row.try_get("params").map_err(classify_sqlx_error)?,
        status: VocJobStatus::from_i16(status_i16)
            .ok_or_else(|| JobStoreError::Storage(format!("unknown voc job status {status_i16}")))?,
        stage: row.try_get("stage").map_err(classify_sqlx_error)?,
        preferred_task_id: row.try_get("preferred_task_id").map_err(classify_sqlx_error)?,
        preferred_run_id: row.try_get("preferred_run_id").map_err(classify_sqlx_error)?,
        error_code: row.try_get("error_code").map_err(classify_sqlx_error)?,
        error_message: row.try_get("error_message").map_err(classify_sqlx_error)?,
        failed_stage: row.try_get("failed_stage").map_err(classify_sqlx_error)?,
        try_count: row.try_get("try_count").map_err(classify_sqlx_error)?,
        max_retries: row.try_get("max_retries").map_err(classify_sqlx_error)?,
        locked_by: row.try_get("locked_by").map_err(classify_sqlx_error)?,
        locked_until: row.try_get("locked_until").map_err(classify_sqlx_error)?,
    })
}

fn row_to_document(row: &sqlx::postgres::PgRow) -> Result<Document, JobStoreError> {
    let status_i16: i16 = row.try_get("status").map_err(classify_sqlx_error)?;
    Ok(Document {
        document_id: row.try_get("document_id").map_err(classify_sqlx_error)?,
        space_code: row.try_get("space_code").map_err(classify_sqlx_error)?,
        filename: row.try_get("filename").map_err(classify_sqlx_error)?,
        content_type: row.try_get("content_type").map_err(classify_sqlx_error)?,
        size: row.try_get("size").map_err(classify_sqlx_error)?,
        storage_uri: row.try_get("storage_uri").map_err(classify_sqlx_error)?,
        sha256: row.try_get("sha256").map_err(classify_sqlx_error)?,
        status: DocumentStatus::from_i16(status_i16)
            .ok_or_else(|| JobStoreError::Storage(format!("unknown document status {status_i16}")))?,
        active_index_version: row.try_get("active_index_version").map_err(classify_sqlx_error)?,
        uploader_id: row.try_get("uploader_id").map_err(classify_sqlx_error)?,
        last_error: row.try_get("last_error").map_err(classify_sqlx_error)?,
        deleted_at: row.try_get("deleted_at").map_err(classify_sqlx_error)?,
    })
}

fn row_to_spider_task(row: &sqlx::postgres::PgRow) -> Result<SpiderTask, JobStoreError> {
    let status_i16: i16 = row.try_get("status").map_err(classify_sqlx_error)?;
    Ok(SpiderTask {
        task_row_id: row.try_get("task_row_id").map_err(classify_sqlx_error)?,
        job_id: row.try_get("job_id").map_err(classify_sqlx_error)?,
        task_id: row.try_get("task_id").map_err(classify_sqlx_error)?,
        run_type: row.try_get("run_type").map_err(classify_sqlx_error)?,
        scope_type: row.try_get("scope_type").map_err(classify_sqlx_error)?,
        scope_value: row.try_get("scope_value").map_err(classify_sqlx_error)?,
        status: SpiderTaskStatus::from_i16(status_i16)
            .ok_or_else(|| JobStoreError::Storage(format!("unknown spider task status {status_i16}")))?,
        run_id: row.try_get("run_id").map_err(classify_sqlx_error)?,
        callback_token_hash: row.try_get("callback_token_hash").map_err(classify_sqlx_error)?,
        callback_token_created_at: row.try_get("callback_token_created_at").map_err(classify_sqlx_error)?,
        last_error: row.try_get("last_error").map_err(classify_sqlx_error)?,
    })
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn is_space_enabled(&self, space_code: &str) -> Result<bool, JobStoreError> {
        let row = sqlx::query("SELECT enabled FROM kb_spaces WHERE space_code = $1")
            .bind(space_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(row.map(|r| r.get::<bool, _>("enabled")).unwrap_or(false))
    }

    async fn create_space(&self, space_code: &str, display_name: &str, enabled: bool) -> Result<KbSpace, JobStoreError> {
        let row = sqlx::query(
            "INSERT INTO kb_spaces (space_code, display_name, enabled)
             VALUES ($1, $2, $3)
             ON CONFLICT (space_code) DO UPDATE SET display_name = EXCLUDED.display_name
             RETURNING *",
        )
        .bind(space_code)
        .bind(display_name)
        .bind(enabled)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        Ok(KbSpace {
            space_code: row.try_get("space_code").map_err(classify_sqlx_error)?,
            display_name: row.try_get("display_name").map_err(classify_sqlx_error)?,
            description: row.try_get("description").map_err(classify_sqlx_error)?,
            enabled: row.try_get("enabled").map_err(classify_sqlx_error)?,
            status: row.try_get("status").map_err(classify_sqlx_error)?,
        })
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
        let row = sqlx::query(
            "INSERT INTO documents (space_code, filename, content_type, size, storage_uri, sha256, uploader_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING *",
        )
        .bind(space_code)
        .bind(filename)
        .bind(content_type)
        .bind(size)
        .bind(storage_uri)
        .bind(sha256)
        .bind(uploader_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        row_to_document(&row)
    }

    async fn get_document(&self, document_id: i64) -> Result<Option<Document>, JobStoreError> {
        let row = sqlx::query("SELECT * FROM documents WHERE document_id = $1")
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn mark_document_status(
        &self,
        document_id: i64,
        status: DocumentStatus,
        last_error: Option<&str>,
    ) -> Result<(), JobStoreError> {
        sqlx::query("UPDATE documents SET status = $1, last_error = $2 WHERE document_id = $3")
            .bind(status as i16)
            .bind(last_error)
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn set_active_index_version(&self, document_id: i64, version: i64) -> Result<(), JobStoreError> {
        sqlx::query("UPDATE documents SET active_index_version = $1 WHERE document_id = $2")
            .bind(version)
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn allocate_index_version(&self, document_id: i64) -> Result<i64, JobStoreError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(index_version), 0) + 1 AS next_version
             FROM ingest_jobs WHERE document_id = $1",
        )
        .bind(document_id)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        Ok(row.get("next_version"))
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
        let row = sqlx::query(
            "INSERT INTO ingest_jobs (document_id, space_code, pipeline_version, index_version, idempotency_key, max_retries)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (idempotency_key) DO UPDATE SET idempotency_key = EXCLUDED.idempotency_key
             RETURNING *",
        )
        .bind(document_id)
        .bind(space_code)
        .bind(pipeline_version)
        .bind(index_version)
        .bind(&idempotency_key)
        .bind(max_retries)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        row_to_ingest_job(&row)
    }

    async fn get_ingest_job(&self, job_id: i64) -> Result<Option<IngestJob>, JobStoreError> {
        let row = sqlx::query("SELECT * FROM ingest_jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        row.as_ref().map(row_to_ingest_job).transpose()
    }

    async fn claim_next_ingest_job(&self, worker_id: &str, lease_seconds: i64) -> Result<Option<IngestJob>, JobStoreError> {
        let now = kb_core::time::now_ts();
        let mut tx = self.pool.begin().await.map_err(classify_sqlx_error)?;
        let row = sqlx::query(
            "UPDATE ingest_jobs
             SET status = 20, locked_by = $1, locked_until = $2, try_count = try_count + 1
             WHERE job_id = (
                 SELECT job_id FROM ingest_jobs
                 WHERE status = 10
                    OR (status = 40 AND try_count < max_retries)
                    OR (status = 20 AND (locked_until IS NULL OR locked_until < $3) AND try_count < max_retries)
                 ORDER BY job_id ASC
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING *",
        )
        .bind(worker_id)
        .bind(now + lease_seconds)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify_sqlx_error)?;
        tx.commit().await.map_err(classify_sqlx_error)?;
        row.as_ref().map(row_to_ingest_job).transpose()
    }

    async fn renew_ingest_lease(&self, job_id: i64, worker_id: &str, lease_seconds: i64) -> Result<u64, JobStoreError> {
        let now = kb_core::time::now_ts();
        let result = sqlx::query(
            "UPDATE ingest_jobs SET locked_until = $1 WHERE job_id = $2 AND locked_by = $3 AND status = 20",
        )
        .bind(now + lease_seconds)
        .bind(job_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn finish_ingest_job(
        &self,
        job_id: i64,
        new_status: JobStatus,
        last_error: Option<&str>,
        clear_lock: bool,
    ) -> Result<(), JobStoreError> {
        if clear_lock {
            sqlx::query(
                "UPDATE ingest_jobs SET status = $1, last_error = $2, locked_by = NULL, locked_until = NULL WHERE job_id = $3",
            )
            .bind(new_status as i16)
            .bind(last_error)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        } else {
            sqlx::query("UPDATE ingest_jobs SET status = $1, last_error = $2 WHERE job_id = $3")
                .bind(new_status as i16)
                .bind(last_error)
                .bind(job_id)
                .execute(&self.pool)
                .await
                .map_err(classify_sqlx_error)?;
        }
        Ok(())
    }

    async fn cancel_ingest_jobs_by_document(&self, document_id: i64, reason: &str) -> Result<u64, JobStoreError> {
        let result = sqlx::query(
            "UPDATE ingest_jobs SET status = 50, last_error = $1 WHERE document_id = $2 AND status IN (10, 20, 40)",
        )
        .bind(reason)
        .bind(document_id)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn cancel_ingest_jobs_by_space(&self, space_code: &str, reason: &str) -> Result<u64, JobStoreError> {
        let result = sqlx::query(
            "UPDATE ingest_jobs SET status = 50, last_error = $1 WHERE space_code = $2 AND status IN (10, 20, 40)",
        )
        .bind(reason)
        .bind(space_code)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn replace_chunks(&self, document_id: i64, index_version: i64, chunks: Vec<Chunk>) -> Result<(), JobStoreError> {
        let mut tx = self.pool.begin().await.map_err(classify_sqlx_error)?;
        sqlx::query("DELETE FROM chunks WHERE document_id = $1 AND index_version = $2")
            .bind(document_id)
            .bind(index_version)
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;
        for chunk in &chunks {
            let modality = match chunk.modality {
                Modality::Text => "text",
                Modality::Image => "image",
                Modality::Audio => "audio",
            };
            let locator_json = serde_json::to_value(&chunk.locator).map_err(|e| JobStoreError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT INTO chunks (chunk_id, document_id, space_code, index_version, chunk_index, modality, locator, content, content_hash, token_count)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(&chunk.chunk_id)
            .bind(chunk.document_id)
            .bind(&chunk.space_code)
            .bind(chunk.index_version)
            .bind(chunk.chunk_index)
            .bind(modality)
            .bind(locator_json)
            .bind(&chunk.content)
            .bind(&chunk.content_hash)
            .bind(chunk.token_count)
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;
        }
        tx.commit().await.map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn list_searchable_chunks(&self, space_code: &str, chunk_ids: &[String]) -> Result<Vec<Chunk>, JobStoreError> {
        let rows = sqlx::query(
            "SELECT c.* FROM chunks c
             JOIN documents d ON d.document_id = c.document_id
             WHERE c.space_code = $1 AND c.chunk_id = ANY($2)
               AND c.index_version = d.active_index_version
               AND d.deleted_at IS NULL",
        )
        .bind(space_code)
        .bind(chunk_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn delete_stale_chunks(&self, document_id: i64, keep_index_version: i64) -> Result<u64, JobStoreError> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = $1 AND index_version != $2")
            .bind(document_id)
            .bind(keep_index_version)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn create_voc_job_by_hash(
        &self,
        input_hash: &str,
        site_code: &str,
        scope_type: &str,
        scope_value: &str,
        params: Value,
    ) -> Result<VocJob, JobStoreError> {
        let row = sqlx::query(
            "INSERT INTO voc_jobs (input_hash, site_code, scope_type, scope_value, params)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (input_hash) DO UPDATE SET input_hash = EXCLUDED.input_hash
             RETURNING *",
        )
        .bind(input_hash)
        .bind(site_code)
        .bind(scope_type)
        .bind(scope_value)
        .bind(params)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        row_to_voc_job(&row)
    }

    async fn get_voc_job(&self, job_id: i64) -> Result<Option<VocJob>, JobStoreError> {
        let row = sqlx::query("SELECT * FROM voc_jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        row.as_ref().map(row_to_voc_job).transpose()
    }

    async fn update_voc_job_status(&self, job_id: i64, status: VocJobStatus, stage: Option<&str>) -> Result<(), JobStoreError> {
        sqlx::query("UPDATE voc_jobs SET status = $1, stage = $2 WHERE job_id = $3")
            .bind(status as i16)
            .bind(stage)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn update_voc_job_params(&self, job_id: i64, params: Value) -> Result<(), JobStoreError> {
        sqlx::query("UPDATE voc_jobs SET params = $1 WHERE job_id = $2")
            .bind(params)
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn fail_voc_job(
        &self,
        job_id: i64,
        error_code: &str,
        error_message: &str,
        failed_stage: &str,
    ) -> Result<(), JobStoreError> {
        sqlx::query(
            "UPDATE voc_jobs SET status = 90, error_code = $1, error_message = $2, failed_stage = $3,
                                  locked_by = NULL, locked_until = NULL
             WHERE job_id = $4",
        )
        .bind(error_code)
        .bind(error_message)
        .bind(failed_stage)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn claim_next_voc_job(&self, worker_id: &str, lease_seconds: i64) -> Result<Option<VocJob>, JobStoreError> {
        let now = kb_core::time::now_ts();
        let mut tx = self.pool.begin().await.map_err(classify_sqlx_error)?;
        let row = sqlx::query(
            "UPDATE voc_jobs
             SET locked_by = $1, locked_until = $2, try_count = try_count + 1,
                 status = CASE WHEN status = 10 THEN 20 ELSE status END
             WHERE job_id = (
                 SELECT job_id FROM voc_jobs
                 WHERE status = 10
                    OR (status NOT IN (60, 90) AND (locked_until IS NULL OR locked_until < $3) AND try_count < max_retries)
                 ORDER BY job_id ASC
                 FOR UPDATE SKIP LOCKED
                 LIMIT 1
             )
             RETURNING *",
        )
        .bind(worker_id)
        .bind(now + lease_seconds)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify_sqlx_error)?;
        tx.commit().await.map_err(classify_sqlx_error)?;
        row.as_ref().map(row_to_voc_job).transpose()
    }

    async fn renew_voc_lease(&self, job_id: i64, worker_id: &str, lease_seconds: i64) -> Result<u64, JobStoreError> {
        let now = kb_core::time::now_ts();
        let result = sqlx::query("UPDATE voc_jobs SET locked_until = $1 WHERE job_id = $2 AND locked_by = $3")
            .bind(now + lease_seconds)
            .bind(job_id)
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn release_voc_lock(&self, job_id: i64) -> Result<(), JobStoreError> {
        sqlx::query("UPDATE voc_jobs SET locked_by = NULL, locked_until = NULL WHERE job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
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
        let now = kb_core::time::now_ts();
        let row = sqlx::query(
            "INSERT INTO spider_tasks (job_id, task_id, run_type, scope_type, scope_value, callback_token_hash, callback_token_created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (task_id) DO UPDATE SET task_id = EXCLUDED.task_id
             RETURNING *",
        )
        .bind(job_id)
        .bind(task_id)
        .bind(run_type)
        .bind(scope_type)
        .bind(scope_value)
        .bind(callback_token_hash)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        row_to_spider_task(&row)
    }

    async fn get_spider_task_by_task_id(&self, task_id: &str) -> Result<Option<SpiderTask>, JobStoreError> {
        let row = sqlx::query("SELECT * FROM spider_tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        row.as_ref().map(row_to_spider_task).transpose()
    }

    async fn update_spider_task_status(
        &self,
        task_id: &str,
        status: SpiderTaskStatus,
        run_id: Option<i64>,
        last_error: Option<&str>,
    ) -> Result<(), JobStoreError> {
        sqlx::query("UPDATE spider_tasks SET status = $1, run_id = COALESCE($2, run_id), last_error = $3 WHERE task_id = $4")
            .bind(status as i16)
            .bind(run_id)
            .bind(last_error)
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn upsert_voc_output(&self, job_id: i64, module_code: &str, schema_version: i32, payload: Value) -> Result<(), JobStoreError> {
        let now = kb_core::time::now_ts();
        sqlx::query(
            "INSERT INTO voc_outputs (job_id, module_code, schema_version, payload, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (job_id, module_code) DO UPDATE
             SET schema_version = EXCLUDED.schema_version, payload = EXCLUDED.payload, updated_at = EXCLUDED.updated_at",
        )
        .bind(job_id)
        .bind(module_code)
        .bind(schema_version)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn clear_voc_evidence(&self, job_id: i64, module_code: &str) -> Result<(), JobStoreError> {
        sqlx::query("DELETE FROM voc_evidence WHERE job_id = $1 AND module_code = $2")
            .bind(job_id)
            .bind(module_code)
            .execute(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn insert_voc_evidence_many(&self, job_id: i64, module_code: &str, rows: Vec<NewEvidence>) -> Result<(), JobStoreError> {
        let mut tx = self.pool.begin().await.map_err(classify_sqlx_error)?;
        for row in &rows {
            sqlx::query(
                "INSERT INTO voc_evidence (job_id, module_code, source_type, source_id, kind, snippet, meta)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(job_id)
            .bind(module_code)
            .bind(&row.source_type)
            .bind(&row.source_id)
            .bind(&row.kind)
            .bind(&row.snippet)
            .bind(&row.meta)
            .execute(&mut *tx)
            .await
            .map_err(classify_sqlx_error)?;
        }
        tx.commit().await.map_err(classify_sqlx_error)?;
        Ok(())
    }

    async fn list_voc_outputs(&self, job_id: i64) -> Result<Vec<VocOutput>, JobStoreError> {
        let rows = sqlx::query("SELECT * FROM voc_outputs WHERE job_id = $1")
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        rows.iter()
            .map(|row| {
                Ok(VocOutput {
                    job_id: row.try_get("job_id").map_err(classify_sqlx_error)?,
                    module_code: row.try_get("module_code").map_err(classify_sqlx_error)?,
                    schema_version: row.try_get("schema_version").map_err(classify_sqlx_error)?,
                    payload: row.try_get("payload").map_err(classify_sqlx_error)?,
                    updated_at: row.try_get("updated_at").map_err(classify_sqlx_error)?,
                })
            })
            .collect()
    }

    async fn count_voc_evidence(&self, job_id: i64, module_code: &str) -> Result<i64, JobStoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM voc_evidence WHERE job_id = $1 AND module_code = $2")
            .bind(job_id)
            .bind(module_code)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(row.get("n"))
    }

    async fn upsert_voc_report(&self, job_id: i64, report_type: &str, payload: Value, meta: Value) -> Result<(), JobStoreError> {
        sqlx::query(
            "INSERT INTO voc_reports (job_id, report_type, payload, meta)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (job_id) DO UPDATE SET report_type = EXCLUDED.report_type, payload = EXCLUDED.payload, meta = EXCLUDED.meta",
        )
        .bind(job_id)
        .bind(report_type)
        .bind(payload)
        .bind(meta)
        .execute(&self.pool)
        .await
        .map_err(classify_sqlx_error)?;
        Ok(())
    }
}

fn row_to_chunk(row: &sqlx::postgres::PgRow) -> Result<Chunk, JobStoreError> {
    let modality_str: String = row.try_get("modality").map_err(classify_sqlx_error)?;
    let modality = match modality_str.as_str() {
        "text" => Modality::Text,
        "image" => Modality::Image,
        "audio" => Modality::Audio,
        other => return Err(JobStoreError::Storage(format!("unknown modality {other}"))),
    };
    let locator_value: Value = row.try_get("locator").map_err(classify_sqlx_error)?;
    let locator: Locator = serde_json::from_value(locator_value).map_err(|e| JobStoreError::Storage(e.to_string()))?;
    Ok(Chunk {
        chunk_id: row.try_get("chunk_id").map_err(classify_sqlx_error)?,
        document_id: row.try_get("document_id").map_err(classify_sqlx_error)?,
        space_code: row.try_get("space_code").map_err(classify_sqlx_error)?,
        index_version: row.try_get("index_version").map_err(classify_sqlx_error)?,
        chunk_index: row.try_get("chunk_index").map_err(classify_sqlx_error)?,
        modality,
        locator,
        content: row.try_get("content").map_err(classify_sqlx_error)?,
        content_hash: row.try_get("content_hash").map_err(classify_sqlx_error)?,
        token_count: row.try_get("token_count").map_err(classify_sqlx_error)?,
    })
}
