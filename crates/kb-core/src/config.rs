//! Immutable process configuration, built once at startup (§1.1, §6, §6.1).
//!
//! Dynamic attribute-style configuration in the source system becomes a struct
//! constructed once here; components are handed only the sub-slice they need
//! (Design Note 2), never `Config` itself, so a parser adapter cannot accidentally
//! reach into Redis settings. Loading fails fast and loud, matching the original's
//! `_load_settings()` raising `RuntimeError` on a missing `DB_URL`/`JWT_SECRET_KEY`.

use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBackend {
    Vector,
    Bm25,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackendKind {
    Local,
    S3,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub db_url: String,
    pub spider_db_url: Option<String>,
    pub sql_echo: bool,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
    pub list_key: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub es_enabled: bool,
    pub es_host: String,
    pub es_port: u16,
    pub es_scheme: String,
    pub es_username: Option<String>,
    pub es_password: Option<String>,
    pub es_index_prefix: String,
    pub es_number_of_shards: u32,
    pub es_number_of_replicas: u32,
    pub milvus_enabled: bool,
    pub milvus_uri: Option<String>,
    pub milvus_username: Option<String>,
    pub milvus_password: Option<String>,
    pub milvus_database: String,
    pub milvus_collection_prefix: String,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub backend: String,
    pub model: String,
    pub dim: usize,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub storage_dir: String,
    pub file_base_url: Option<String>,
    pub s3_endpoint_url: Option<String>,
    pub s3_region: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
    pub s3_force_path_style: bool,
    pub s3_base_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub default_llm: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub local_llm_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub provider: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub poll_interval_secs: u64,
    pub ingest_lease_secs: u64,
    pub voc_lease_secs: u64,
    pub ingest_workers: usize,
    pub voc_workers: usize,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_env: String,
    pub debug: bool,
    pub log_level: String,
    pub host: String,
    pub port: u16,

    pub db: DbConfig,
    pub redis: RedisConfig,
    pub public_base_url: Option<String>,
    pub jwt_secret_key: String,

    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub search_max_per_doc: usize,
    pub worker: WorkerConfig,
    pub storage: StorageConfig,
    pub llm: LlmConfig,
    pub ocr: OcrConfig,
}

fn env_str(key: &'static str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_bool(key: &'static str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue(key, v)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads `.env` (if present) and builds `Config` from the environment,
    /// matching the original's `load_dotenv()` + eager-validation posture.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let db_url = env::var("DB_URL").map_err(|_| ConfigError::MissingVar("DB_URL"))?;
        let jwt_secret_key =
            env::var("JWT_SECRET_KEY").map_err(|_| ConfigError::MissingVar("JWT_SECRET_KEY"))?;

        let debug = env_bool("DEBUG", true) || env_bool("APP_DEBUG", true);

        let index_backend = match env_str("INDEX_BACKEND", "hybrid").as_str() {
            "vector" => IndexBackend::Vector,
            "bm25" => IndexBackend::Bm25,
            other => {
                if other != "hybrid" {
                    return Err(ConfigError::InvalidValue("INDEX_BACKEND", other.to_string()));
                }
                IndexBackend::Hybrid
            }
        };

        let storage_backend = match env_str("STORAGE_BACKEND", "local").as_str() {
            "local" => StorageBackendKind::Local,
            "s3" => StorageBackendKind::S3,
            other => return Err(ConfigError::InvalidValue("STORAGE_BACKEND", other.to_string())),
        };

        Ok(Config {
            app_env: env_str("APP_ENV", "dev"),
            debug,
            log_level: env_str("LOG_LEVEL", "INFO"),
            host: env_str("HOST", "0.0.0.0"),
            port: env_parse("PORT", 8085)?,

            db: DbConfig {
                db_url,
                spider_db_url: env_opt("SPIDER_DB_URL"),
                sql_echo: env_bool("SQL_ECHO", debug),
            },
            redis: RedisConfig {
                url: env_str("SPIDER_REDIS_URL", "redis://127.0.0.1:6379"),
                list_key: env_str("SPIDER_REDIS_LIST_KEY", "voc:spider:queue"),
                timeout_seconds: env_parse("SPIDER_REDIS_TIMEOUT_SECONDS", 5)?,
            },
            public_base_url: env_opt("PUBLIC_BASE_URL"),
            jwt_secret_key,

            index: IndexConfig {
                backend: index_backend,
                es_enabled: env_bool("ES_ENABLED", false),
                es_host: env_str("ES_HOST", "127.0.0.1"),
                es_port: env_parse("ES_PORT", 9200)?,
                es_scheme: env_str("ES_SCHEME", "http"),
                es_username: env_opt("ES_USERNAME"),
                es_password: env_opt("ES_PASSWORD"),
                es_index_prefix: env_str("ES_INDEX_PREFIX", "mah"),
                es_number_of_shards: env_parse("ES_NUMBER_OF_SHARDS", 1)?,
                es_number_of_replicas: env_parse("ES_NUMBER_OF_REPLICAS", 0)?,
                milvus_enabled: env_bool("MILVUS_ENABLED", false),
                milvus_uri: env_opt("MILVUS_URI"),
                milvus_username: env_opt("MILVUS_USERNAME"),
                milvus_password: env_opt("MILVUS_PASSWORD"),
                milvus_database: env_str("MILVUS_DATABASE", "default"),
                milvus_collection_prefix: env_str("MILVUS_COLLECTION_PREFIX", "rag"),
            },
            embedding: EmbeddingConfig {
                backend: env_str("EMBEDDING_BACKEND", "local"),
                model: env_str("EMBEDDING_MODEL", "local-hash-embed"),
                dim: env_parse("EMBEDDING_DIM", 256)?,
            },
            search_max_per_doc: env_parse("SEARCH_MAX_PER_DOC", 3)?,
            worker: WorkerConfig {
                poll_interval_secs: env_parse("WORKER_POLL_INTERVAL", 3)?,
                ingest_lease_secs: env_parse("INGEST_LEASE_SECONDS", 60)?,
                voc_lease_secs: env_parse("VOC_LEASE_SECONDS", 600)?,
                ingest_workers: env_parse("INGEST_WORKERS", 4)?,
                voc_workers: env_parse("VOC_WORKERS", 2)?,
            },
            storage: StorageConfig {
                backend: storage_backend,
                storage_dir: env_str("STORAGE_DIR", "./data/files"),
                file_base_url: env_opt("FILE_BASE_URL"),
                s3_endpoint_url: env_opt("S3_ENDPOINT_URL"),
                s3_region: env_opt("S3_REGION"),
                s3_bucket: env_opt("S3_BUCKET"),
                s3_access_key_id: env_opt("S3_ACCESS_KEY_ID"),
                s3_secret_access_key: env_opt("S3_SECRET_ACCESS_KEY"),
                s3_force_path_style: env_bool("S3_FORCE_PATH_STYLE", false),
                s3_base_url: env_opt("S3_BASE_URL"),
            },
            llm: LlmConfig {
                default_llm: env_str("DEFAULT_LLM", "openai:gpt-4o-mini"),
                openai_api_key: env_opt("OPENAI_API_KEY"),
                openai_base_url: env_opt("OPENAI_BASE_URL"),
                local_llm_endpoint: env_opt("LOCAL_LLM_ENDPOINT"),
            },
            ocr: OcrConfig {
                provider: env_str("OCR_PROVIDER", "none"),
                endpoint: env_opt("OCR_ENDPOINT"),
                api_key: env_opt("OCR_API_KEY"),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_db_url_fails_fast() {
        // SAFETY: tests run single-threaded within this process for env mutation purposes.
        let prior = env::var("DB_URL").ok();
        env::remove_var("DB_URL");
        env::remove_var("JWT_SECRET_KEY");

        let result = Config::load();
        assert!(matches!(result, Err(ConfigError::MissingVar("DB_URL"))));

        if let Some(v) = prior {
            env::set_var("DB_URL", v);
        }
    }

    #[test]
    fn defaults_apply_when_optional_vars_absent() {
        env::set_var("DB_URL", "postgres://localhost/test");
        env::set_var("JWT_SECRET_KEY", "test-secret");
        env::remove_var("SEARCH_MAX_PER_DOC");

        let cfg = Config::load().expect("config should load with required vars set");
        assert_eq!(cfg.search_max_per_doc, 3);
        assert_eq!(cfg.worker.poll_interval_secs, 3);

        env::remove_var("DB_URL");
        env::remove_var("JWT_SECRET_KEY");
    }
}
