//! Process wiring for `kb-server` (§6): `Config::load()` selects concrete
//! backends, the two pipelines and the lease scheduler are assembled around
//! them, and a minimal axum router (§2.1) exposes the transport shim. Follows
//! `orbit-web/src/server.rs`'s `run_server()` shape: build state, build
//! router, layer CORS + tracing, bind, serve.

pub mod error;
pub mod routes;
pub mod state;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use kb_chunker::{ChunkerConfig, OptionalBackends};
use kb_core::config::{Config, IndexBackend, StorageBackendKind};
use kb_embed::{Embedder, LocalHashEmbedder, OpenAiEmbedder};
use kb_index::{ElasticsearchTextIndex, InMemoryBm25Index, InMemoryVectorIndex, MilvusVectorIndex, TextIndex, VectorIndex};
use kb_ingest::IngestPipeline;
use kb_llm::routing::ModelRoutingTable;
use kb_observability::CallbackTokenSigner;
use kb_retrieval::Retriever;
use kb_scheduler::{LeaseScheduler, SchedulerConfig, WorkerPool};
use kb_storage::{BlobStorage, LocalBlobStorage, S3BlobStorage};
use kb_voc::{CallbackReceiver, PostgresResultsReader, ResultsReader, SpiderGateway, VocPipeline};
use state::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const PIPELINE_VERSION: i32 = 1;
const MAX_INGEST_RETRIES: i32 = 3;
const DEFAULT_REVIEWS_WINDOW_DAYS: i64 = 90;

fn build_embedder(config: &Config) -> Result<Arc<dyn Embedder>, anyhow::Error> {
    match config.embedding.backend.as_str() {
        "local" => Ok(Arc::new(LocalHashEmbedder::new(config.embedding.dim))),
        "openai" => {
            let api_key = config
                .llm
                .openai_api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("EMBEDDING_BACKEND=openai requires OPENAI_API_KEY"))?;
            let base_url = config.llm.openai_base_url.clone().unwrap_or_else(|| "https://api.openai.com".to_string());
            Ok(Arc::new(OpenAiEmbedder::new(base_url, api_key, config.embedding.model.clone(), config.embedding.dim)))
        }
        other => Err(anyhow::anyhow!("unknown EMBEDDING_BACKEND: {other}")),
    }
}

async fn build_storage(config: &Config) -> Result<Arc<dyn BlobStorage>, anyhow::Error> {
    match config.storage.backend {
        StorageBackendKind::Local => Ok(Arc::new(LocalBlobStorage::new(config.storage.storage_dir.clone(), config.storage.file_base_url.clone()))),
        StorageBackendKind::S3 => {
            let bucket = config.storage.s3_bucket.clone().ok_or_else(|| anyhow::anyhow!("STORAGE_BACKEND=s3 requires S3_BUCKET"))?;
            let access_key_id = config.storage.s3_access_key_id.clone().ok_or_else(|| anyhow::anyhow!("STORAGE_BACKEND=s3 requires S3_ACCESS_KEY_ID"))?;
            let secret_access_key = config.storage.s3_secret_access_key.clone().ok_or_else(|| anyhow::anyhow!("STORAGE_BACKEND=s3 requires S3_SECRET_ACCESS_KEY"))?;
            let region = config.storage.s3_region.clone().unwrap_or_else(|| "us-east-1".to_string());
            let storage = S3BlobStorage::new(
                config.storage.s3_endpoint_url.as_deref(),
                &region,
                &bucket,
                &access_key_id,
                &secret_access_key,
                config.storage.s3_force_path_style,
                config.storage.s3_base_url.clone(),
            )
            .await;
            Ok(Arc::new(storage))
        }
    }
}

fn build_indexes(config: &Config) -> (Option<Arc<dyn VectorIndex>>, Option<Arc<dyn TextIndex>>) {
    let want_vector = matches!(config.index.backend, IndexBackend::Vector | IndexBackend::Hybrid);
    let want_text = matches!(config.index.backend, IndexBackend::Bm25 | IndexBackend::Hybrid);

    let vector_index: Option<Arc<dyn VectorIndex>> = if want_vector {
        if config.index.milvus_enabled {
            let uri = config.index.milvus_uri.clone().unwrap_or_else(|| "http://127.0.0.1:19530".to_string());
            Some(Arc::new(MilvusVectorIndex::new(&uri, &config.index.milvus_database, &config.index.milvus_collection_prefix)))
        } else {
            Some(Arc::new(InMemoryVectorIndex::new()))
        }
    } else {
        None
    };

    let text_index: Option<Arc<dyn TextIndex>> = if want_text {
        if config.index.es_enabled {
            Some(Arc::new(ElasticsearchTextIndex::new(&config.index.es_scheme, &config.index.es_host, config.index.es_port, &config.index.es_index_prefix)))
        } else {
            Some(Arc::new(InMemoryBm25Index::new()))
        }
    } else {
        None
    };

    (vector_index, text_index)
}

/// Builds every shared component, wires the two pipelines and the lease
/// scheduler around them, starts the worker pool, and serves the router.
/// Returns only on shutdown (ctrl-c) or a fatal setup error.
pub async fn run(config: Config) -> anyhow::Result<()> {
    tracing::info!(app_env = %config.app_env, "starting kb-server");

    let job_store = kb_jobstore::open(&config.db.db_url).await?;
    let storage = build_storage(&config).await?;
    let embedder = build_embedder(&config)?;
    let (vector_index, text_index) = build_indexes(&config);

    let retriever = Arc::new(Retriever::new(job_store.clone(), vector_index.clone(), text_index.clone(), config.search_max_per_doc));

    let signer = CallbackTokenSigner::from_bytes(config.jwt_secret_key.as_bytes())?;

    let ingest_pipeline = Arc::new(IngestPipeline {
        job_store: job_store.clone(),
        storage: storage.clone(),
        embedder: embedder.clone(),
        vector_index: vector_index.clone(),
        text_index: text_index.clone(),
        chunker_config: ChunkerConfig::default(),
        optional_backends: OptionalBackends {
            ocr_enabled: config.ocr.provider != "none",
            asr_enabled: false,
        },
    });

    let results_reader: Arc<dyn ResultsReader> = match &config.db.spider_db_url {
        Some(url) => Arc::new(PostgresResultsReader::connect(url).await?),
        None => return Err(anyhow::anyhow!("VOC analysis requires SPIDER_DB_URL")),
    };

    let public_base_url = config.public_base_url.clone().ok_or_else(|| anyhow::anyhow!("PUBLIC_BASE_URL is required when VOC is enabled"))?;

    let voc_pipeline = Arc::new(VocPipeline {
        job_store: job_store.clone(),
        results_reader,
        spider_gateway: SpiderGateway::new(config.redis.url.clone(), config.redis.list_key.clone(), config.redis.timeout_seconds),
        signer: signer.clone(),
        public_base_url: Some(public_base_url),
        routing: ModelRoutingTable::new(&config.llm.default_llm),
        llm_config: config.llm.clone(),
        default_reviews_days: DEFAULT_REVIEWS_WINDOW_DAYS,
    });

    let scheduler_config = SchedulerConfig {
        ingest_workers: config.worker.ingest_workers,
        ingest_lease_seconds: config.worker.ingest_lease_secs as i64,
        voc_workers: config.worker.voc_workers,
        voc_lease_seconds: config.worker.voc_lease_secs as i64,
        idle_sleep: std::time::Duration::from_secs(config.worker.poll_interval_secs),
    };
    let scheduler = Arc::new(LeaseScheduler::new(job_store.clone(), ingest_pipeline, voc_pipeline, scheduler_config));
    let worker_pool = WorkerPool::spawn(scheduler);

    let callback_receiver = Arc::new(CallbackReceiver { job_store: job_store.clone(), signer });

    let state = AppState {
        job_store,
        storage,
        embedder,
        retriever,
        callback_receiver,
        pipeline_version: PIPELINE_VERSION,
        max_ingest_retries: MAX_INGEST_RETRIES,
    };

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/voc/spider/callback/:job_id", post(routes::spider_callback))
        .route("/voc/spider/callback", post(routes::spider_callback_legacy))
        .route("/rag/documents", post(routes::submit_document))
        .route("/rag/search", get(routes::search))
        .route("/jobs/:id", get(routes::get_job))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods([Method::GET, Method::POST]))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!(%addr, "kb-server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    serve.await?;

    worker_pool.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
