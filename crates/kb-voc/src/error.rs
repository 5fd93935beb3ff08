use kb_core::entities::PipelineOutcome;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VocError {
    #[error("job store error: {0}")]
    JobStore(#[from] kb_jobstore::JobStoreError),
    #[error("results database error: {0}")]
    ResultsDb(String),
    #[error("spider gateway error: {0}")]
    SpiderGateway(String),
    #[error("analysis error in module {module_code}: {message}")]
    Analysis { module_code: &'static str, message: String },
    #[error("missing required configuration: {0}")]
    MissingConfig(&'static str),
}

impl VocError {
    /// Every `VocPipeline` failure is permanent: the job moves to FAILED and is
    /// not retried automatically, matching the original's single FAILED sink (§4.5).
    pub fn to_outcome(&self) -> PipelineOutcome {
        match self {
            VocError::JobStore(e) if e.is_retryable() => PipelineOutcome::Retryable,
            _ => PipelineOutcome::Permanent,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            VocError::JobStore(_) => "voc.jobstore_error",
            VocError::ResultsDb(_) => "voc.results_db_error",
            VocError::SpiderGateway(_) => "voc.spider_gateway_error",
            VocError::Analysis { .. } => "voc.analysis_error",
            VocError::MissingConfig(_) => "voc.missing_config",
        }
    }
}

impl From<crate::dataset::ResultsReaderError> for VocError {
    fn from(e: crate::dataset::ResultsReaderError) -> Self {
        VocError::ResultsDb(e.0)
    }
}

impl From<crate::spider_gateway::SpiderGatewayError> for VocError {
    fn from(e: crate::spider_gateway::SpiderGatewayError) -> Self {
        VocError::SpiderGateway(e.to_string())
    }
}

