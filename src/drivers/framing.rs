use std::sync::Arc;

use async_trait::async_trait;

use crate::blob_store::BlobStore;
use crate::domain::{ExportParams, FramingParams};
use crate::error::DriverError;

use super::encoder::{EncodeRequest, Encoder};
use super::interpolation::interpolate_crop;
use super::{CancelSignal, DriverOutput, PipelineDriver, ProgressCallback};

/// Crop + retime + encode a single source into a target aspect ratio and
/// frame rate. See `spec.md` §4.3 "Framing driver".
pub struct FramingDriver {
    blob_store: Arc<dyn BlobStore>,
    encoder: Arc<dyn Encoder>,
}

impl FramingDriver {
    pub fn new(blob_store: Arc<dyn BlobStore>, encoder: Arc<dyn Encoder>) -> Self {
        Self { blob_store, encoder }
    }
}

/// Sum of each segment's trimmed, speed-adjusted length, or (absent
/// segments) the span covered by the crop keyframes. Encoding internals are
/// out of scope, so this is the closest the orchestrator gets to "knowing"
/// the source's duration without decoding it.
pub fn output_duration_seconds(params: &FramingParams) -> f64 {
    if params.segments.is_empty() {
        return params.crop_keyframes.last().map(|k| k.source_time).unwrap_or(0.0);
    }
    params
        .segments
        .iter()
        .map(|segment| {
            let (start, end) = match &segment.trim {
                Some(trim) => (trim.start, trim.end),
                None => (segment.start, segment.end),
            };
            (end - start).max(0.0) / segment.speed_multiplier.max(f64::EPSILON)
        })
        .sum()
}

/// Shared core of the framing pipeline: crop interpolation + retime +
/// encode. Used directly by `FramingDriver` and, per clip, by
/// `super::multi_clip::MultiClipDriver` (§4.3 "each clip invokes the
/// framing pipeline internally").
pub async fn run_framing(
    blob_store: &dyn BlobStore,
    encoder: &dyn Encoder,
    params: &FramingParams,
    output_name: &str,
    progress_cb: &ProgressCallback,
    cancel_signal: &CancelSignal,
    progress_floor: u8,
    progress_ceiling: u8,
) -> Result<DriverOutput, DriverError> {
    let span = f64::from(progress_ceiling.saturating_sub(progress_floor));
    let scale = |local: f64| -> u8 { (f64::from(progress_floor) + local * span / 100.0) as u8 };

    progress_cb(scale(0.0), "preparing", "preparing");
    blob_store.get(&params.source_ref).await.map_err(DriverError::BlobStore)?;
    if cancel_signal.is_requested().await {
        return Err(DriverError::Cancelled);
    }
    progress_cb(scale(5.0), "source loaded", "preparing");

    let duration = output_duration_seconds(params);
    const CROP_STEPS: u32 = 12;
    for step in 0..=CROP_STEPS {
        if cancel_signal.is_requested().await {
            return Err(DriverError::Cancelled);
        }
        let t = duration * f64::from(step) / f64::from(CROP_STEPS);
        let _rect = interpolate_crop(&params.crop_keyframes, t);
        let local_percent = 5.0 + (f64::from(step) / f64::from(CROP_STEPS)) * 85.0;
        progress_cb(scale(local_percent.min(90.0)), "cropping and retiming", "processing");
    }

    if cancel_signal.is_requested().await {
        return Err(DriverError::Cancelled);
    }

    let bytes = encoder
        .encode(
            EncodeRequest {
                duration_seconds: duration,
                frame_rate: params.target_frame_rate,
                aspect_ratio: params.target_aspect_ratio,
                include_audio: params.audio_include,
            },
            &|pct| {
                let local_percent = 90.0 + (f64::from(pct) / 100.0) * 8.0;
                progress_cb(scale(local_percent.min(98.0)), "encoding", "encoding");
            },
        )
        .await?;

    progress_cb(scale(98.0), "writing output", "finalizing");
    let output_ref = blob_store.put(bytes).await.map_err(DriverError::BlobStore)?;
    progress_cb(scale(100.0).min(progress_ceiling), "done", "finalizing");

    Ok(DriverOutput {
        output_ref,
        output_filename: output_name.to_string(),
    })
}

#[async_trait]
impl PipelineDriver for FramingDriver {
    async fn drive(
        &self,
        job: &crate::domain::ExportJob,
        progress_cb: ProgressCallback,
        cancel_signal: CancelSignal,
    ) -> Result<DriverOutput, DriverError> {
        let params = match &job.params {
            ExportParams::Framing(p) => p,
            other => {
                return Err(DriverError::Failed(format!(
                    "framing driver invoked with {:?} params",
                    other.kind()
                )));
            }
        };

        run_framing(
            self.blob_store.as_ref(),
            self.encoder.as_ref(),
            params,
            &format!("{}-framing.mp4", job.id),
            &progress_cb,
            &cancel_signal,
            0,
            100,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AspectRatio, CropKeyframe, Rect, Segment, TrimRange};

    fn params_with(segments: Vec<Segment>, keyframes: Vec<CropKeyframe>) -> FramingParams {
        FramingParams {
            source_ref: "blob://src".into(),
            crop_keyframes: keyframes,
            segments,
            target_aspect_ratio: AspectRatio { width: 9, height: 16 },
            target_frame_rate: 30.0,
            audio_include: false,
        }
    }

    #[test]
    fn duration_without_segments_uses_last_keyframe() {
        let params = params_with(
            vec![],
            vec![
                CropKeyframe { source_time: 0.0, rect: Rect { x: 0.0, y: 0.0, width: 10.0, height: 10.0 } },
                CropKeyframe { source_time: 2.0, rect: Rect { x: 0.0, y: 0.0, width: 10.0, height: 10.0 } },
            ],
        );
        assert_eq!(output_duration_seconds(&params), 2.0);
    }

    #[test]
    fn duration_with_segments_accounts_for_trim_and_speed() {
        let params = params_with(
            vec![Segment {
                start: 0.0,
                end: 10.0,
                speed_multiplier: 2.0,
                trim: Some(TrimRange { start: 2.0, end: 6.0 }),
                preserve_pitch: true,
            }],
            vec![CropKeyframe { source_time: 0.0, rect: Rect { x: 0.0, y: 0.0, width: 10.0, height: 10.0 } }],
        );
        // (6 - 2) / 2.0 == 2.0 seconds of output
        assert_eq!(output_duration_seconds(&params), 2.0);
    }
}
