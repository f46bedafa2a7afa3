use std::sync::Arc;

use async_trait::async_trait;

use crate::blob_store::BlobStore;
use crate::domain::{AspectRatio, ExportParams};
use crate::error::DriverError;

use super::encoder::{EncodeRequest, Encoder};
use super::{CancelSignal, DriverOutput, PipelineDriver, ProgressCallback};

/// Composite a set of overlay layers onto a working video. See `spec.md`
/// §4.3 "Overlay driver". Layer composition order and per-kind keyframe
/// interpolation are a driver-internal concern; here that amounts to
/// respecting z-order and visibility, since pixel compositing itself is
/// out of scope (§1).
pub struct OverlayDriver {
    blob_store: Arc<dyn BlobStore>,
    encoder: Arc<dyn Encoder>,
}

impl OverlayDriver {
    pub fn new(blob_store: Arc<dyn BlobStore>, encoder: Arc<dyn Encoder>) -> Self {
        Self { blob_store, encoder }
    }
}

#[async_trait]
impl PipelineDriver for OverlayDriver {
    async fn drive(
        &self,
        job: &crate::domain::ExportJob,
        progress_cb: ProgressCallback,
        cancel_signal: CancelSignal,
    ) -> Result<DriverOutput, DriverError> {
        let params = match &job.params {
            ExportParams::Overlay(p) => p,
            other => {
                return Err(DriverError::Failed(format!(
                    "overlay driver invoked with {:?} params",
                    other.kind()
                )));
            }
        };

        progress_cb(0, "preparing", "preparing");
        self.blob_store
            .get(&params.working_video_ref)
            .await
            .map_err(DriverError::BlobStore)?;
        if cancel_signal.is_requested().await {
            return Err(DriverError::Cancelled);
        }
        progress_cb(5, "working video loaded", "preparing");

        let mut visible_layers: Vec<_> = params.layers.iter().filter(|l| l.visible).collect();
        visible_layers.sort_by_key(|l| l.z_order);

        let total = visible_layers.len().max(1);
        for (i, layer) in visible_layers.iter().enumerate() {
            if cancel_signal.is_requested().await {
                return Err(DriverError::Cancelled);
            }
            // Discrete per-keyframe params step-change; numeric sub-fields
            // inside `layer.keyframes[*].params` would interpolate via the
            // same spline/linear rule as crop keyframes if decoded here.
            let _ = &layer.keyframes;
            let percent = 5 + (((i + 1) as f64 / total as f64) * 90.0) as u8;
            let message = format!("compositing layer {:?}", layer.kind);
            progress_cb(percent.min(95), &message, "compositing");
        }

        let progress_cb_encode = progress_cb.clone();
        let bytes = self
            .encoder
            .encode(
                EncodeRequest {
                    duration_seconds: estimate_duration(params),
                    frame_rate: 30.0,
                    aspect_ratio: AspectRatio { width: 16, height: 9 },
                    include_audio: true,
                },
                &move |pct| {
                    let scaled = 95 + ((f64::from(pct) / 100.0) * 3.0) as u8;
                    progress_cb_encode(scaled.min(98), "encoding", "compositing");
                },
            )
            .await?;

        progress_cb(98, "writing output", "finalizing");
        let output_ref = self.blob_store.put(bytes).await.map_err(DriverError::BlobStore)?;
        progress_cb(100, "done", "finalizing");

        Ok(DriverOutput {
            output_ref,
            output_filename: format!("{}-overlay.mp4", job.id),
        })
    }
}

fn estimate_duration(params: &crate::domain::OverlayParams) -> f64 {
    params
        .layers
        .iter()
        .flat_map(|l| l.keyframes.iter())
        .map(|k| k.time)
        .fold(0.0_f64, f64::max)
}
