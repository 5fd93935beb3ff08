//! Per-kind worker loops: claim -> run (raced against lease renewal) -> finish.
//!
//! The lease-renewal ticker is spawned alongside the pipeline future and the two
//! are joined with `tokio::select!`, the same "spawn a background task, race it
//! against the main future" shape the teacher's `JobManager::spawn` uses for its
//! batched write-behind flush, adapted here from batching disk writes to renewing
//! a database lease. Whichever resolves first wins; the loser is dropped, so a
//! revoked lease aborts the in-flight pipeline without it ever reaching a
//! terminal-state write.

use crate::scheduler::LeaseScheduler;
use kb_core::entities::{IngestJob, JobStatus, PipelineOutcome, VocJob};
use kb_jobstore::JobStore;
use kb_resilience::ResilienceError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Sleeps for `idle_sleep`, or returns early (with `true`) if shutdown fires first.
async fn wait_or_shutdown(idle_sleep: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(idle_sleep) => false,
        _ = shutdown_rx.changed() => true,
    }
}

pub async fn ingest_worker_loop(scheduler: Arc<LeaseScheduler>, worker_id: String, mut shutdown_rx: watch::Receiver<bool>) {
    info!(worker_id = %worker_id, "ingest worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if matches!(scheduler.ingest_breaker.get_state().await, kb_resilience::CircuitState::Open { .. }) {
            if wait_or_shutdown(scheduler.config.idle_sleep, &mut shutdown_rx).await {
                break;
            }
            continue;
        }

        let claimed = scheduler
            .job_store
            .claim_next_ingest_job(&worker_id, scheduler.config.ingest_lease_seconds)
            .await;

        match claimed {
            Ok(Some(job)) => run_ingest_job(&scheduler, job, worker_id.clone()).await,
            Ok(None) => {
                if wait_or_shutdown(scheduler.config.idle_sleep, &mut shutdown_rx).await {
                    break;
                }
            }
            Err(e) => {
                warn!(worker_id = %worker_id, error = %e, "claim_next_ingest_job failed");
                if wait_or_shutdown(scheduler.config.idle_sleep, &mut shutdown_rx).await {
                    break;
                }
            }
        }
    }
    info!(worker_id = %worker_id, "ingest worker stopped");
}

async fn run_ingest_job(scheduler: &Arc<LeaseScheduler>, job: IngestJob, worker_id: String) {
    let job_id = job.job_id;
    let lease_seconds = scheduler.config.ingest_lease_seconds;
    let (revoke_tx, mut revoke_rx) = watch::channel(false);
    let renew_handle = tokio::spawn(renew_ingest_loop(
        scheduler.job_store.clone(),
        job_id,
        worker_id.clone(),
        lease_seconds,
        revoke_tx,
    ));

    let breaker = scheduler.ingest_breaker.clone();
    let pipeline = scheduler.ingest_pipeline.clone();

    tokio::select! {
        result = breaker.call(|| async {
            match pipeline.run(&job).await {
                PipelineOutcome::Succeeded => Ok(()),
                PipelineOutcome::Retryable => Err(ResilienceError::Transient(format!("ingest job {job_id} retryable pipeline failure"))),
                PipelineOutcome::Permanent => Err(ResilienceError::Permanent(format!("ingest job {job_id} permanent pipeline failure"))),
            }
        }) => {
            renew_handle.abort();
            match result {
                // `IngestPipeline::run` already finished the job as SUCCEEDED itself.
                Ok(()) => {}
                Err(ResilienceError::Transient(msg)) => {
                    if let Err(e) = scheduler.job_store.finish_ingest_job(job_id, JobStatus::Failed, Some(&msg), true).await {
                        warn!(job_id, error = %e, "failed to mark retryable ingest job as FAILED");
                    }
                }
                Err(ResilienceError::Permanent(msg)) => {
                    if let Err(e) = scheduler.job_store.finish_ingest_job(job_id, JobStatus::Cancelled, Some(&msg), true).await {
                        warn!(job_id, error = %e, "failed to cancel permanently-failed ingest job");
                    }
                }
                Err(ResilienceError::CircuitOpen) => {
                    warn!(job_id, "ingest circuit open, abandoning claimed job for this round; its lease will expire and it will be reclaimed");
                }
            }
        }
        _ = revoke_rx.changed() => {
            renew_handle.abort();
            warn!(job_id, worker_id = %worker_id, "lease renewal failed, abandoning ingest job without writing terminal state");
        }
    }
}

async fn renew_ingest_loop(
    job_store: Arc<dyn JobStore>,
    job_id: i64,
    worker_id: String,
    lease_seconds: i64,
    revoke_tx: watch::Sender<bool>,
) {
    let interval = Duration::from_secs((lease_seconds / 3).max(1) as u64);
    loop {
        tokio::time::sleep(interval).await;
        match job_store.renew_ingest_lease(job_id, &worker_id, lease_seconds).await {
            Ok(rows) if rows > 0 => continue,
            Ok(_) => {
                warn!(job_id, worker_id = %worker_id, "ingest lease renewal affected no rows, another worker may have reclaimed it");
                let _ = revoke_tx.send(true);
                return;
            }
            Err(e) => {
                warn!(job_id, worker_id = %worker_id, error = %e, "ingest lease renewal failed");
                let _ = revoke_tx.send(true);
                return;
            }
        }
    }
}

pub async fn voc_worker_loop(scheduler: Arc<LeaseScheduler>, worker_id: String, mut shutdown_rx: watch::Receiver<bool>) {
    info!(worker_id = %worker_id, "voc worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        if matches!(scheduler.voc_breaker.get_state().await, kb_resilience::CircuitState::Open { .. }) {
            if wait_or_shutdown(scheduler.config.idle_sleep, &mut shutdown_rx).await {
                break;
            }
            continue;
        }

        let claimed = scheduler
            .job_store
            .claim_next_voc_job(&worker_id, scheduler.config.voc_lease_seconds)
            .await;

        match claimed {
            Ok(Some(job)) => {
                let now_ts = chrono::Utc::now().timestamp();
                run_voc_job(&scheduler, job, worker_id.clone(), now_ts).await;
            }
            Ok(None) => {
                if wait_or_shutdown(scheduler.config.idle_sleep, &mut shutdown_rx).await {
                    break;
                }
            }
            Err(e) => {
                warn!(worker_id = %worker_id, error = %e, "claim_next_voc_job failed");
                if wait_or_shutdown(scheduler.config.idle_sleep, &mut shutdown_rx).await {
                    break;
                }
            }
        }
    }
    info!(worker_id = %worker_id, "voc worker stopped");
}

async fn run_voc_job(scheduler: &Arc<LeaseScheduler>, job: VocJob, worker_id: String, now_ts: i64) {
    let job_id = job.job_id;
    let lease_seconds = scheduler.config.voc_lease_seconds;
    let (revoke_tx, mut revoke_rx) = watch::channel(false);
    let renew_handle = tokio::spawn(renew_voc_loop(
        scheduler.job_store.clone(),
        job_id,
        worker_id.clone(),
        lease_seconds,
        revoke_tx,
    ));

    let breaker = scheduler.voc_breaker.clone();
    let pipeline = scheduler.voc_pipeline.clone();

    tokio::select! {
        result = breaker.call(|| async {
            match pipeline.run(&job, now_ts).await {
                PipelineOutcome::Succeeded => Ok(()),
                PipelineOutcome::Retryable => Err(ResilienceError::Transient(format!("voc job {job_id} retryable pipeline failure"))),
                PipelineOutcome::Permanent => Err(ResilienceError::Permanent(format!("voc job {job_id} permanent pipeline failure"))),
            }
        }) => {
            renew_handle.abort();
            // `VocPipeline::run` is self-contained: every path already calls
            // `fail_voc_job` or advances `VocJobStatus` itself (§4.5). The scheduler
            // only needs the breaker's open/closed signal, not a terminal-state write.
            if let Err(ResilienceError::CircuitOpen) = result {
                warn!(job_id, "voc circuit open, abandoning claimed job for this round");
            }
        }
        _ = revoke_rx.changed() => {
            renew_handle.abort();
            warn!(job_id, worker_id = %worker_id, "lease renewal failed, abandoning voc job without writing terminal state");
        }
    }
}

async fn renew_voc_loop(
    job_store: Arc<dyn JobStore>,
    job_id: i64,
    worker_id: String,
    lease_seconds: i64,
    revoke_tx: watch::Sender<bool>,
) {
    let interval = Duration::from_secs((lease_seconds / 3).max(1) as u64);
    loop {
        tokio::time::sleep(interval).await;
        match job_store.renew_voc_lease(job_id, &worker_id, lease_seconds).await {
            Ok(rows) if rows > 0 => continue,
            Ok(_) => {
                warn!(job_id, worker_id = %worker_id, "voc lease renewal affected no rows, another worker may have reclaimed it");
                let _ = revoke_tx.send(true);
                return;
            }
            Err(e) => {
                warn!(job_id, worker_id = %worker_id, error = %e, "voc lease renewal failed");
                let _ = revoke_tx.send(true);
                return;
            }
        }
    }
}
