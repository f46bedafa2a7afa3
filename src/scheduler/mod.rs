mod backoff;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::domain::{ExportJob, JobKind, ProgressEvent};
use crate::drivers::{CancelSignal, DriverRegistry, ProgressCallback};
use crate::error::DriverError;
use crate::progress_hub::ProgressHub;
use crate::store::JobStore;

use backoff::Backoff;

const ALL_KINDS: [JobKind; 4] =
    [JobKind::Framing, JobKind::Overlay, JobKind::MultiClip, JobKind::AnnotateExtract];

/// A pool of N cooperative worker loops driving pending jobs to completion
/// (§4.2). Each loop claims, resolves a driver, invokes it, and records the
/// outcome; workers never share mutable state beyond the Job Store and
/// Progress Hub, both already safe for concurrent access.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    hub: Arc<ProgressHub>,
    registry: Arc<DriverRegistry>,
    concurrency: usize,
    claim_poll_interval: Duration,
    claim_poll_max: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn JobStore>,
        hub: Arc<ProgressHub>,
        registry: Arc<DriverRegistry>,
        concurrency: usize,
        claim_poll_interval: Duration,
        claim_poll_max: Duration,
    ) -> Self {
        Self {
            store,
            hub,
            registry,
            concurrency: concurrency.max(1),
            claim_poll_interval,
            claim_poll_max,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Cooperative shutdown: workers finish their current claim loop
    /// iteration and in-flight drivers observe the flag the same way they
    /// observe per-job cancellation (SPEC_FULL.md §10.2).
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.concurrency)
            .map(|i| {
                let scheduler = self.clone();
                let worker_id = format!("worker-{}-{}", std::process::id(), i);
                tokio::spawn(async move { scheduler.worker_loop(worker_id).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker_id: String) {
        let mut backoff = Backoff::new(self.claim_poll_interval, self.claim_poll_max);
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::info!(worker_id, "worker stopping for shutdown");
                return;
            }
            match self.store.claim_next(&worker_id, &ALL_KINDS).await {
                Ok(Some(job)) => {
                    backoff.reset();
                    self.run_job(&worker_id, job).await;
                }
                Ok(None) => backoff.wait().await,
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "claim_next failed; backing off");
                    backoff.wait().await;
                }
            }
        }
    }

    async fn run_job(&self, worker_id: &str, job: ExportJob) {
        tracing::info!(job_id = %job.id, kind = job.kind.as_str(), worker_id, "claimed job");

        let driver = self.registry.resolve(job.kind);
        let progress_cb: ProgressCallback = {
            let hub = self.hub.clone();
            let job_id = job.id.clone();
            Arc::new(move |percent: u8, message: &str, phase: &str| {
                hub.publish(&job_id, ProgressEvent::processing(job_id.clone(), 0, percent, message, phase));
            })
        };
        let cancel_signal = CancelSignal::new(self.store.clone(), job.id.clone(), self.shutdown.clone());

        match driver.drive(&job, progress_cb, cancel_signal.clone()).await {
            Ok(output) => self.finish_complete(&job, output.output_ref, output.output_filename).await,
            Err(DriverError::Cancelled) if cancel_signal.shutdown_requested() => {
                self.finish_error(&job, "server shutting down").await
            }
            Err(DriverError::Cancelled) => self.finish_cancelled(&job).await,
            Err(other) => self.finish_error(&job, &other.sanitized_message()).await,
        }
    }

    async fn finish_complete(&self, job: &ExportJob, output_ref: String, output_filename: String) {
        match self.store.mark_complete(&job.id, &output_ref, &output_filename).await {
            Ok(_) => {
                tracing::info!(job_id = %job.id, "job complete");
                self.hub.publish(&job.id, ProgressEvent::complete(job.id.clone(), 0, output_ref, output_filename));
            }
            Err(e) => tracing::error!(job_id = %job.id, error = %e, "failed to record completion"),
        }
    }

    async fn finish_error(&self, job: &ExportJob, message: &str) {
        match self.store.mark_error(&job.id, message).await {
            Ok(_) => {
                tracing::info!(job_id = %job.id, error = message, "job failed");
                self.hub.publish(&job.id, ProgressEvent::error(job.id.clone(), 0, message.to_string()));
            }
            Err(e) => tracing::error!(job_id = %job.id, error = %e, "failed to record job error"),
        }
    }

    async fn finish_cancelled(&self, job: &ExportJob) {
        match self.store.mark_cancelled(&job.id).await {
            Ok(_) => {
                tracing::info!(job_id = %job.id, "job cancelled");
                self.hub.publish(&job.id, ProgressEvent::cancelled(job.id.clone(), 0));
            }
            Err(e) => tracing::error!(job_id = %job.id, error = %e, "failed to record cancellation"),
        }
    }
}
