//! Shared handles every handler needs, grounded in `orbit-web`'s `AppState`:
//! a plain `#[derive(Clone)]` struct of `Arc`-wrapped resources, constructed
//! once at startup and handed to the router via `.with_state(...)`.

use kb_embed::Embedder;
use kb_jobstore::JobStore;
use kb_retrieval::Retriever;
use kb_storage::BlobStorage;
use kb_voc::CallbackReceiver;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub job_store: Arc<dyn JobStore>,
    pub storage: Arc<dyn BlobStorage>,
    pub embedder: Arc<dyn Embedder>,
    pub retriever: Arc<Retriever>,
    pub callback_receiver: Arc<CallbackReceiver>,
    pub pipeline_version: i32,
    pub max_ingest_retries: i32,
}
