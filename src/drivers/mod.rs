pub mod annotate_extract;
pub mod encoder;
pub mod framing;
pub mod interpolation;
pub mod multi_clip;
pub mod overlay;

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ExportJob, JobKind};
use crate::error::DriverError;
use crate::store::JobStore;

/// `progress_cb(percent, message, phase)` — see §4.3. Implementations must
/// be safe to call from any task and must never block on I/O; the
/// scheduler binds this to `ProgressHub::publish`, which is itself
/// non-blocking.
pub type ProgressCallback = Arc<dyn Fn(u8, &str, &str) + Send + Sync>;

/// Polls the Job Store's `cancel_requested` flag for one job, OR-ed with a
/// process-wide shutdown flag. Cheap enough to call at every phase boundary
/// and periodically inside long phases, per §4.3's "at least once every few
/// seconds" rule. The scheduler distinguishes the two causes after the
/// fact via `shutdown_requested` to choose the right terminal message
/// (SPEC_FULL.md §10.2).
#[derive(Clone)]
pub struct CancelSignal {
    store: Arc<dyn JobStore>,
    job_id: String,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
}

impl CancelSignal {
    pub fn new(store: Arc<dyn JobStore>, job_id: String, shutdown: Arc<std::sync::atomic::AtomicBool>) -> Self {
        Self { store, job_id, shutdown }
    }

    pub async fn is_requested(&self) -> bool {
        self.shutdown_requested() || self.store.is_cancel_requested(&self.job_id).await.unwrap_or(false)
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(std::sync::atomic::Ordering::Relaxed)
    }
}

pub struct DriverOutput {
    pub output_ref: String,
    pub output_filename: String,
}

/// One per export kind. See `spec.md` §4.3 for the per-kind input shape and
/// phase sequence; this trait is the common contract every kind implements.
#[async_trait]
pub trait PipelineDriver: Send + Sync {
    async fn drive(
        &self,
        job: &ExportJob,
        progress_cb: ProgressCallback,
        cancel_signal: CancelSignal,
    ) -> Result<DriverOutput, DriverError>;
}

/// Resolves the driver for a job's kind. The scheduler calls this once per
/// claimed job; drivers are cheap `Arc` handles, not per-job state.
pub struct DriverRegistry {
    framing: Arc<dyn PipelineDriver>,
    overlay: Arc<dyn PipelineDriver>,
    multi_clip: Arc<dyn PipelineDriver>,
    annotate_extract: Arc<dyn PipelineDriver>,
}

impl DriverRegistry {
    pub fn new(
        framing: Arc<dyn PipelineDriver>,
        overlay: Arc<dyn PipelineDriver>,
        multi_clip: Arc<dyn PipelineDriver>,
        annotate_extract: Arc<dyn PipelineDriver>,
    ) -> Self {
        Self { framing, overlay, multi_clip, annotate_extract }
    }

    pub fn resolve(&self, kind: JobKind) -> Arc<dyn PipelineDriver> {
        match kind {
            JobKind::Framing => self.framing.clone(),
            JobKind::Overlay => self.overlay.clone(),
            JobKind::MultiClip => self.multi_clip.clone(),
            JobKind::AnnotateExtract => self.annotate_extract.clone(),
        }
    }
}
