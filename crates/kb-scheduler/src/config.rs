use std::time::Duration;

/// Tuning knobs for the worker pool (§4.2). Defaults match the teacher's posture
/// of a small, fixed-size pool per kind rather than dynamic scaling.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub ingest_workers: usize,
    pub ingest_lease_seconds: i64,
    pub voc_workers: usize,
    pub voc_lease_seconds: i64,
    pub idle_sleep: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            ingest_workers: 4,
            ingest_lease_seconds: 60,
            voc_workers: 2,
            voc_lease_seconds: 600,
            idle_sleep: Duration::from_secs(3),
        }
    }
}
