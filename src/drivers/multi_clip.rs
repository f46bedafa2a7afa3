use std::sync::Arc;

use async_trait::async_trait;

use crate::blob_store::BlobStore;
use crate::domain::{ExportParams, FramingParams};
use crate::error::DriverError;

use super::encoder::Encoder;
use super::framing::run_framing;
use super::{CancelSignal, DriverOutput, PipelineDriver, ProgressCallback};

/// Every intermediate clip is normalized to this frame rate before
/// concatenation (§4.3: "normalized to the same resolution ... and frame
/// rate before concatenation"). Resolution normalization is handled by
/// passing the job's global `aspect_ratio` to each per-clip framing pass.
const NORMALIZED_FRAME_RATE: f64 = 30.0;

/// Concatenates N clips, each run through the framing pipeline, applying a
/// transition between them. See `spec.md` §4.3 "Multi-clip driver".
pub struct MultiClipDriver {
    blob_store: Arc<dyn BlobStore>,
    encoder: Arc<dyn Encoder>,
}

impl MultiClipDriver {
    pub fn new(blob_store: Arc<dyn BlobStore>, encoder: Arc<dyn Encoder>) -> Self {
        Self { blob_store, encoder }
    }
}

#[async_trait]
impl PipelineDriver for MultiClipDriver {
    async fn drive(
        &self,
        job: &crate::domain::ExportJob,
        progress_cb: ProgressCallback,
        cancel_signal: CancelSignal,
    ) -> Result<DriverOutput, DriverError> {
        let params = match &job.params {
            ExportParams::MultiClip(p) => p,
            other => {
                return Err(DriverError::Failed(format!(
                    "multi-clip driver invoked with {:?} params",
                    other.kind()
                )));
            }
        };

        progress_cb(0, "preparing", "preparing");
        if cancel_signal.is_requested().await {
            return Err(DriverError::Cancelled);
        }
        progress_cb(5, "clips validated", "preparing");

        let clip_count = params.clips.len();
        let per_clip_span = 75.0 / clip_count as f64;
        let mut clip_outputs = Vec::with_capacity(clip_count);

        for (i, clip) in params.clips.iter().enumerate() {
            let floor = (5.0 + i as f64 * per_clip_span) as u8;
            let ceiling = (5.0 + (i + 1) as f64 * per_clip_span) as u8;
            let phase = format!("processing-clip-{}/{}", i + 1, clip_count);
            let wrapped_cb: ProgressCallback = {
                let inner = progress_cb.clone();
                let phase = phase.clone();
                Arc::new(move |pct, msg, _phase| inner(pct, msg, &phase))
            };

            let framing_params = FramingParams {
                source_ref: clip.source_ref.clone(),
                crop_keyframes: clip.crop_keyframes.clone(),
                segments: clip.segments.clone(),
                target_aspect_ratio: params.aspect_ratio,
                target_frame_rate: NORMALIZED_FRAME_RATE,
                audio_include: true,
            };

            let output_name = format!("{}-clip-{}.mp4", job.id, i);
            match run_framing(
                self.blob_store.as_ref(),
                self.encoder.as_ref(),
                &framing_params,
                &output_name,
                &wrapped_cb,
                &cancel_signal,
                floor,
                ceiling,
            )
            .await
            {
                Ok(output) => clip_outputs.push(output),
                Err(e) => {
                    // Partial outputs from already-finished clips must not
                    // survive a cancelled or failed run (§5 "A cancelled
                    // job's partial outputs are deleted from the blob store
                    // before the terminal transition").
                    for done in &clip_outputs {
                        let _ = self.blob_store.delete(&done.output_ref).await;
                    }
                    return Err(e);
                }
            }
        }

        if cancel_signal.is_requested().await {
            for done in &clip_outputs {
                let _ = self.blob_store.delete(&done.output_ref).await;
            }
            return Err(DriverError::Cancelled);
        }

        progress_cb(80, transition_message(params), "concatenating");
        let mut concatenated = Vec::new();
        for output in &clip_outputs {
            let bytes = self
                .blob_store
                .get(&output.output_ref)
                .await
                .map_err(DriverError::BlobStore)?;
            concatenated.extend_from_slice(&bytes);
        }
        for output in &clip_outputs {
            self.blob_store
                .delete(&output.output_ref)
                .await
                .map_err(DriverError::BlobStore)?;
        }

        progress_cb(95, "writing final output", "finalizing");
        let output_ref = self
            .blob_store
            .put(concatenated)
            .await
            .map_err(DriverError::BlobStore)?;
        progress_cb(100, "done", "finalizing");

        Ok(DriverOutput {
            output_ref,
            output_filename: format!("{}-multiclip.mp4", job.id),
        })
    }
}

fn transition_message(params: &crate::domain::MultiClipParams) -> &'static str {
    use crate::domain::TransitionKind;
    match params.transition.kind {
        TransitionKind::Cut => "concatenating (cut)",
        TransitionKind::Fade => "concatenating (fade to black)",
        TransitionKind::Dissolve => "concatenating (cross-dissolve)",
    }
}
