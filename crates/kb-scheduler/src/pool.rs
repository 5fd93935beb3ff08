use crate::scheduler::LeaseScheduler;
use crate::worker::{ingest_worker_loop, voc_worker_loop};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Owns the spawned worker tasks for both pipeline kinds and the shutdown signal
/// that stops them, mirroring the `JobManager::spawn` / `shutdown` convention:
/// spawn returns a handle-bearing value, graceful stop is a separate explicit call.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn spawn(scheduler: Arc<LeaseScheduler>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(scheduler.config.ingest_workers + scheduler.config.voc_workers);

        for i in 0..scheduler.config.ingest_workers {
            let worker_id = format!("ingest-{i}");
            let scheduler = scheduler.clone();
            let shutdown_rx = shutdown_rx.clone();
            handles.push(tokio::spawn(ingest_worker_loop(scheduler, worker_id, shutdown_rx)));
        }

        for i in 0..scheduler.config.voc_workers {
            let worker_id = format!("voc-{i}");
            let scheduler = scheduler.clone();
            let shutdown_rx = shutdown_rx.clone();
            handles.push(tokio::spawn(voc_worker_loop(scheduler, worker_id, shutdown_rx)));
        }

        info!(
            ingest_workers = scheduler.config.ingest_workers,
            voc_workers = scheduler.config.voc_workers,
            "worker pool started"
        );

        Self { handles, shutdown_tx }
    }

    /// Signals all workers to stop polling for new work and waits for any
    /// in-flight job each is running to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
        info!("worker pool stopped");
    }
}
