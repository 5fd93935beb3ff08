//! `IngestPipeline` (§4.3): load → parse → chunk → persist chunks → vectorize
//! → text-index → promote → best-effort cleanup.

use crate::error::IngestError;
use kb_chunker::{chunk_document, parse, ChunkerConfig, OptionalBackends};
use kb_core::entities::{Document, DocumentStatus, IngestJob, JobStatus, PipelineOutcome};
use kb_embed::Embedder;
use kb_index::{TextDoc, TextIndex, VectorDoc, VectorIndex};
use kb_jobstore::JobStore;
use kb_storage::BlobStorage;
use std::sync::Arc;
use tracing::{info, warn};

pub struct IngestPipeline {
    pub job_store: Arc<dyn JobStore>,
    pub storage: Arc<dyn BlobStorage>,
    pub embedder: Arc<dyn Embedder>,
    pub vector_index: Option<Arc<dyn VectorIndex>>,
    pub text_index: Option<Arc<dyn TextIndex>>,
    pub chunker_config: ChunkerConfig,
    pub optional_backends: OptionalBackends,
}

impl IngestPipeline {
    /// Runs a single claimed job to completion and returns the uniform
    /// pipeline outcome the scheduler uses to finish it.
    pub async fn run(&self, job: &IngestJob) -> PipelineOutcome {
        match self.run_inner(job).await {
            Ok(()) => PipelineOutcome::Succeeded,
            Err(e) => {
                warn!(job_id = job.job_id, document_id = job.document_id, error = %e, "ingest job failed");
                let outcome = e.to_outcome();
                if !matches!(e, IngestError::DocumentDeleted) {
                    let _ = self
                        .job_store
                        .mark_document_status(job.document_id, DocumentStatus::Failed, Some(&e.to_string()))
                        .await;
                }
                outcome
            }
        }
    }

    async fn run_inner(&self, job: &IngestJob) -> Result<(), IngestError> {
        info!(job_id = job.job_id, document_id = job.document_id, "ingest: load");
        let document = self.load(job).await?;

        self.job_store.mark_document_status(document.document_id, DocumentStatus::Processing, None).await?;

        info!(job_id = job.job_id, "ingest: parse");
        let content = self.storage.download(&document.storage_uri).await?;
        let parsed = parse(&content, &document.content_type, &document.filename, &self.optional_backends)?;

        info!(job_id = job.job_id, "ingest: chunk");
        let chunks = chunk_document(&parsed, document.document_id, &document.space_code, job.index_version, &self.chunker_config)?;

        info!(job_id = job.job_id, chunk_count = chunks.len(), "ingest: persist chunks");
        self.job_store.replace_chunks(document.document_id, job.index_version, chunks.clone()).await?;

        if let Some(vector_index) = &self.vector_index {
            info!(job_id = job.job_id, "ingest: vectorize");
            let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_documents(&texts).await?;
            let docs = chunks
                .iter()
                .zip(vectors)
                .map(|(chunk, vector)| VectorDoc {
                    chunk_id: chunk.chunk_id.clone(),
                    document_id: chunk.document_id,
                    index_version: chunk.index_version,
                    vector,
                })
                .collect();
            vector_index.upsert(&document.space_code, docs).await?;
        }

        if let Some(text_index) = &self.text_index {
            info!(job_id = job.job_id, "ingest: text-index");
            let docs = chunks
                .iter()
                .map(|chunk| TextDoc {
                    chunk_id: chunk.chunk_id.clone(),
                    document_id: chunk.document_id,
                    index_version: chunk.index_version,
                    content: chunk.content.clone(),
                })
                .collect();
            text_index.upsert(&document.space_code, docs).await?;
        }

        info!(job_id = job.job_id, index_version = job.index_version, "ingest: promote");
        self.job_store.set_active_index_version(document.document_id, job.index_version).await?;
        self.job_store.mark_document_status(document.document_id, DocumentStatus::Indexed, None).await?;
        self.job_store.finish_ingest_job(job.job_id, JobStatus::Succeeded, None, true).await?;

        self.cleanup_stale(&document, job.index_version).await;
        Ok(())
    }

    async fn load(&self, job: &IngestJob) -> Result<Document, IngestError> {
        let document = self.job_store.get_document(job.document_id).await?.ok_or(IngestError::DocumentDeleted)?;
        if document.deleted_at.is_some() || document.status == DocumentStatus::Deleted {
            self.job_store.finish_ingest_job(job.job_id, JobStatus::Cancelled, Some("document deleted"), true).await?;
            return Err(IngestError::DocumentDeleted);
        }
        Ok(document)
    }

    /// Best-effort: deletes vectors/text docs whose index_version isn't the
    /// one just promoted. Failures here never fail the job (§4.3 step 8).
    async fn cleanup_stale(&self, document: &Document, promoted_version: i64) {
        if let Some(vector_index) = &self.vector_index {
            if let Err(e) = vector_index.delete_by_document(&document.space_code, document.document_id, promoted_version).await {
                warn!(document_id = document.document_id, error = %e, "stale vector cleanup failed");
            }
        }
        if let Some(text_index) = &self.text_index {
            if let Err(e) = text_index.delete_by_document(&document.space_code, document.document_id, promoted_version).await {
                warn!(document_id = document.document_id, error = %e, "stale text cleanup failed");
            }
        }
        if let Err(e) = self.job_store.delete_stale_chunks(document.document_id, promoted_version).await {
            warn!(document_id = document.document_id, error = %e, "stale chunk cleanup failed");
        }
    }
}
