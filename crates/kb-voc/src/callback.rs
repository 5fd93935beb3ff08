//! Spider callback handling (§4.5, §4.8): idempotent, token-verified updates to
//! `SpiderTask`/`VocJob` state driven by the external spider's HTTP callback.

use kb_core::entities::{SpiderTaskStatus, VocJobStatus};
use kb_jobstore::JobStore;
use kb_observability::CallbackTokenSigner;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct CallbackPayload {
    pub status: String,
    pub task_id: String,
    pub run_id: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("unknown spider task")]
    UnknownTask,
    #[error("callback token mismatch")]
    TokenMismatch,
    #[error("READY callback missing a run_id")]
    MissingRunId,
    #[error(transparent)]
    JobStore(#[from] kb_jobstore::JobStoreError),
}

pub struct CallbackReceiver {
    pub job_store: Arc<dyn JobStore>,
    pub signer: CallbackTokenSigner,
}

impl CallbackReceiver {
    /// Applies one callback delivery. Safe to call more than once for the same
    /// `task_id` with the same payload (§8 invariant 6 / scenario S5).
    pub async fn handle(&self, job_id: i64, token: &str, payload: CallbackPayload) -> Result<(), CallbackError> {
        let task = self
            .job_store
            .get_spider_task_by_task_id(&payload.task_id)
            .await?
            .filter(|t| t.job_id == job_id)
            .ok_or(CallbackError::UnknownTask)?;

        if !self.signer.verify(token, &task.callback_token_hash) {
            warn!(job_id, task_id = %payload.task_id, "callback token mismatch");
            return Err(CallbackError::TokenMismatch);
        }

        let status_str = payload.status.to_uppercase();
        match status_str.as_str() {
            "READY" => self.handle_ready(job_id, &task.task_id, task.status, payload).await,
            "FAILED" => self.handle_failed(job_id, &task.task_id, payload).await,
            _ => {
                // RUNNING and any other non-terminal status: record progress only.
                self.job_store
                    .update_spider_task_status(&task.task_id, SpiderTaskStatus::Running, payload.run_id, None)
                    .await?;
                Ok(())
            }
        }
    }

    async fn handle_ready(
        &self,
        job_id: i64,
        task_id: &str,
        previous_status: SpiderTaskStatus,
        payload: CallbackPayload,
    ) -> Result<(), CallbackError> {
        if previous_status == SpiderTaskStatus::Ready {
            return Ok(()); // already applied; idempotent no-op.
        }
        let run_id = payload.run_id.filter(|id| *id > 0).ok_or(CallbackError::MissingRunId)?;

        self.job_store.update_spider_task_status(task_id, SpiderTaskStatus::Ready, Some(run_id), None).await?;

        let Some(job) = self.job_store.get_voc_job(job_id).await? else { return Ok(()) };
        if job.status != VocJobStatus::Crawling {
            // Past CRAWLING already: accepted silently (§4.5).
            return Ok(());
        }

        let mut params = job.params.clone();
        let pending = params
            .get("pending_crawl")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let remaining: Vec<_> = pending
            .into_iter()
            .filter(|unit| {
                !(unit.get("task_id").and_then(|v| v.as_str()) == Some(task_id))
            })
            .collect();
        let became_empty = remaining.is_empty();
        params["pending_crawl"] = serde_json::Value::Array(remaining);
        self.job_store.update_voc_job_params(job_id, params).await?;

        if became_empty {
            self.job_store.update_voc_job_status(job_id, VocJobStatus::Extracting, Some("extracting")).await?;
            info!(job_id, "voc job: all crawl units ready, moving to EXTRACTING");
        }
        Ok(())
    }

    async fn handle_failed(&self, job_id: i64, task_id: &str, payload: CallbackPayload) -> Result<(), CallbackError> {
        self.job_store
            .update_spider_task_status(task_id, SpiderTaskStatus::Failed, payload.run_id, payload.error_message.as_deref())
            .await?;

        if let Some(job) = self.job_store.get_voc_job(job_id).await? {
            if !job.status.is_terminal() {
                self.job_store
                    .fail_voc_job(
                        job_id,
                        payload.error_code.as_deref().unwrap_or("spider.failed"),
                        payload.error_message.as_deref().unwrap_or("spider callback reported failure"),
                        "CRAWLING",
                    )
                    .await?;
            }
        }
        Ok(())
    }
}
