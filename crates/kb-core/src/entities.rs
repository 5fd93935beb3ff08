//! Persisted entities (§3 DATA MODEL).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest as Sha1Digest, Sha1};
use sha2::Sha256;

/// `space_code` identifies a knowledge-base namespace. Documents and indices are
/// keyed by it.
pub type SpaceCode = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum DocumentStatus {
    Uploaded = 10,
    Processing = 20,
    Indexed = 30,
    Failed = 40,
    Deleted = 90,
}

impl DocumentStatus {
    pub fn from_i16(v: i16) -> Option<Self> {
        Some(match v {
            10 => Self::Uploaded,
            20 => Self::Processing,
            30 => Self::Indexed,
            40 => Self::Failed,
            90 => Self::Deleted,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbSpace {
    pub space_code: SpaceCode,
    pub display_name: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: i64,
    pub space_code: SpaceCode,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
    pub storage_uri: String,
    pub sha256: String,
    pub status: DocumentStatus,
    pub active_index_version: Option<i64>,
    pub uploader_id: Option<i64>,
    pub last_error: Option<String>,
    pub deleted_at: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum JobStatus {
    Pending = 10,
    Running = 20,
    Succeeded = 30,
    Failed = 40,
    Cancelled = 50,
}

impl JobStatus {
    pub fn from_i16(v: i16) -> Option<Self> {
        Some(match v {
            10 => Self::Pending,
            20 => Self::Running,
            30 => Self::Succeeded,
            40 => Self::Failed,
            50 => Self::Cancelled,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub job_id: i64,
    pub document_id: i64,
    pub space_code: SpaceCode,
    pub pipeline_version: i32,
    pub index_version: i64,
    pub idempotency_key: String,
    pub status: JobStatus,
    pub try_count: i32,
    pub max_retries: i32,
    pub locked_by: Option<String>,
    pub locked_until: Option<i64>,
    pub last_error: Option<String>,
}

/// `idempotency_key = hash(document_id, pipeline_version, index_version)` (§3).
/// Plain SHA-256 over a stable string form, hex-encoded.
pub fn ingest_idempotency_key(document_id: i64, pipeline_version: i32, index_version: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{document_id}:{pipeline_version}:{index_version}").as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Modality {
    Text,
    Image,
    Audio,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Locator {
    pub pages: Vec<i64>,
    pub time_range: Option<(f64, f64)>,
    pub bboxes: Vec<[f64; 4]>,
    pub char_start: usize,
    pub char_end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document_id: i64,
    pub space_code: SpaceCode,
    pub index_version: i64,
    pub chunk_index: i64,
    pub modality: Modality,
    pub locator: Locator,
    pub content: String,
    pub content_hash: String,
    pub token_count: i64,
}

/// `chunk_id = sha1("{document_id}:{index_version}:{chunk_index}")` (§3).
pub fn chunk_id(document_id: i64, index_version: i64, chunk_index: i64) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{document_id}:{index_version}:{chunk_index}").as_bytes());
    hex::encode(hasher.finalize())
}

/// `content_hash = sha256(content)` (§4.4).
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum VocJobStatus {
    Pending = 10,
    Crawling = 20,
    Extracting = 30,
    Analyzing = 40,
    Persisting = 50,
    Done = 60,
    Failed = 90,
}

impl VocJobStatus {
    pub fn from_i16(v: i16) -> Option<Self> {
        Some(match v {
            10 => Self::Pending,
            20 => Self::Crawling,
            30 => Self::Extracting,
            40 => Self::Analyzing,
            50 => Self::Persisting,
            60 => Self::Done,
            90 => Self::Failed,
            _ => return None,
        })
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerMode {
    Auto,
    Force,
    Off,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocJob {
    pub job_id: i64,
    pub input_hash: String,
    pub site_code: String,
    pub scope_type: String,
    pub scope_value: String,
    pub params: Value,
    pub status: VocJobStatus,
    pub stage: Option<String>,
    pub preferred_task_id: Option<i64>,
    pub preferred_run_id: Option<i64>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub failed_stage: Option<String>,
    /// Lease bookkeeping, mirroring `IngestJob`'s so the same `LeaseScheduler`
    /// drives both pipeline kinds uniformly (§4.2).
    pub try_count: i32,
    pub max_retries: i32,
    pub locked_by: Option<String>,
    pub locked_until: Option<i64>,
}

/// `input_hash` makes VOC job creation idempotent (§3). Hashes the normalized
/// scope/params shape, not the raw request body, so equivalent requests collide.
pub fn voc_input_hash(site_code: &str, scope_type: &str, scope_value: &str, params: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(site_code.as_bytes());
    hasher.update(b":");
    hasher.update(scope_type.as_bytes());
    hasher.update(b":");
    hasher.update(scope_value.as_bytes());
    hasher.update(b":");
    hasher.update(params.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum SpiderTaskStatus {
    Pending = 10,
    Running = 20,
    Ready = 30,
    Failed = 40,
}

impl SpiderTaskStatus {
    pub fn from_i16(v: i16) -> Option<Self> {
        Some(match v {
            10 => Self::Pending,
            20 => Self::Running,
            30 => Self::Ready,
            40 => Self::Failed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpiderTask {
    pub task_row_id: i64,
    pub job_id: i64,
    pub task_id: String,
    pub run_type: String,
    pub scope_type: String,
    pub scope_value: String,
    pub status: SpiderTaskStatus,
    pub run_id: Option<i64>,
    pub callback_token_hash: String,
    pub callback_token_created_at: i64,
    pub last_error: Option<String>,
}

/// `task_id = "voc:{job_id}:{run_type}:{scope_value}"` (§4.5) — deterministic per
/// (job_id, unit), so re-deciding the same crawl plan is idempotent.
pub fn spider_task_id(job_id: i64, run_type: &str, scope_value: &str) -> String {
    format!("voc:{job_id}:{run_type}:{scope_value}")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocOutput {
    pub job_id: i64,
    pub module_code: String,
    pub schema_version: i32,
    pub payload: Value,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocEvidence {
    pub evidence_id: i64,
    pub job_id: i64,
    pub module_code: String,
    pub source_type: String,
    pub source_id: String,
    pub kind: Option<String>,
    pub snippet: String,
    pub meta: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocReport {
    pub job_id: i64,
    pub report_type: String,
    pub payload: Value,
    pub meta: Value,
}

/// Uniform pipeline outcome (§7) that `LeaseScheduler` translates into `JobStore`
/// state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Succeeded,
    Retryable,
    Permanent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_is_deterministic() {
        assert_eq!(chunk_id(7, 1, 0), chunk_id(7, 1, 0));
        assert_ne!(chunk_id(7, 1, 0), chunk_id(7, 1, 1));
    }

    #[test]
    fn ingest_idempotency_key_varies_by_version() {
        let a = ingest_idempotency_key(1, 1, 1);
        let b = ingest_idempotency_key(1, 1, 2);
        assert_ne!(a, b);
    }

    #[test]
    fn spider_task_id_matches_spec_shape() {
        assert_eq!(spider_task_id(42, "amazon_listing", "A2"), "voc:42:amazon_listing:A2");
    }
}
