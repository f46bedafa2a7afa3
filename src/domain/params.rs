use serde::{Deserialize, Serialize};

use super::job::JobKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub fn ratio(self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CropKeyframe {
    pub source_time: f64,
    pub rect: Rect,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrimRange {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub speed_multiplier: f64,
    pub trim: Option<TrimRange>,
    /// Preserve pitch when retiming audio for this segment's speed change.
    #[serde(default)]
    pub preserve_pitch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FramingParams {
    pub source_ref: String,
    pub crop_keyframes: Vec<CropKeyframe>,
    #[serde(default)]
    pub segments: Vec<Segment>,
    pub target_aspect_ratio: AspectRatio,
    pub target_frame_rate: f64,
    pub audio_include: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayKind {
    HighlightEllipse,
    Text,
    BallEffect,
    ScanArc,
    SpacePolygon,
    DefenderMarker,
    ThroughBallLine,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverlayKeyframe {
    pub time: f64,
    /// Per-kind parameter payload. Numeric fields inside this document
    /// interpolate with the same spline/linear rule as crop keyframes;
    /// discrete fields (colors, text, shape ids) step-change at the
    /// keyframe boundary. See `crate::drivers::interpolation`.
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverlayLayer {
    pub kind: OverlayKind,
    pub z_order: i32,
    #[serde(default = "default_true")]
    pub visible: bool,
    pub keyframes: Vec<OverlayKeyframe>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OverlayParams {
    pub working_video_ref: String,
    pub layers: Vec<OverlayLayer>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Cut,
    Fade,
    Dissolve,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub kind: TransitionKind,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipSpec {
    pub source_ref: String,
    pub crop_keyframes: Vec<CropKeyframe>,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiClipParams {
    pub clips: Vec<ClipSpec>,
    pub aspect_ratio: AspectRatio,
    pub transition: Transition,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipRegion {
    pub start: f64,
    pub end: f64,
    pub display_name: String,
    pub rating: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnotateExtractParams {
    pub source_ref: String,
    pub regions: Vec<ClipRegion>,
}

/// Opaque, kind-specific input document. Persisted verbatim by the Job
/// Store as JSON; drivers consume the matching variant and may assume it is
/// well-formed, since `validate` runs once at `submit` and a job row is
/// never created for invalid params.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExportParams {
    Framing(FramingParams),
    Overlay(OverlayParams),
    MultiClip(MultiClipParams),
    AnnotateExtract(AnnotateExtractParams),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ParamsValidationError {
    #[error("crop_keyframes must not be empty")]
    EmptyCropKeyframes,
    #[error("target_frame_rate must be positive")]
    NonPositiveFrameRate,
    #[error("target aspect ratio must have positive width and height")]
    InvalidAspectRatio,
    #[error("overlay layers must not be empty")]
    EmptyLayers,
    #[error("overlay layer keyframes must not be empty")]
    EmptyOverlayKeyframes,
    #[error("multi-clip export requires at least one clip")]
    EmptyClips,
    #[error("clip {0} has no crop keyframes")]
    ClipMissingCropKeyframes(usize),
    #[error("annotate-extract requires at least one region")]
    EmptyRegions,
    #[error("region {0} has end <= start")]
    RegionNotPositiveDuration(usize),
}

impl ExportParams {
    pub fn kind(&self) -> JobKind {
        match self {
            ExportParams::Framing(_) => JobKind::Framing,
            ExportParams::Overlay(_) => JobKind::Overlay,
            ExportParams::MultiClip(_) => JobKind::MultiClip,
            ExportParams::AnnotateExtract(_) => JobKind::AnnotateExtract,
        }
    }

    /// Synchronous, cheap structural validation run once at `submit`. A job
    /// row is created only if this returns `Ok`.
    pub fn validate(&self) -> Result<(), ParamsValidationError> {
        use ParamsValidationError as E;
        match self {
            ExportParams::Framing(p) => {
                if p.crop_keyframes.is_empty() {
                    return Err(E::EmptyCropKeyframes);
                }
                if p.target_frame_rate <= 0.0 {
                    return Err(E::NonPositiveFrameRate);
                }
                if p.target_aspect_ratio.width == 0 || p.target_aspect_ratio.height == 0 {
                    return Err(E::InvalidAspectRatio);
                }
                Ok(())
            }
            ExportParams::Overlay(p) => {
                if p.layers.is_empty() {
                    return Err(E::EmptyLayers);
                }
                if p.layers.iter().any(|l| l.keyframes.is_empty()) {
                    return Err(E::EmptyOverlayKeyframes);
                }
                Ok(())
            }
            ExportParams::MultiClip(p) => {
                if p.clips.is_empty() {
                    return Err(E::EmptyClips);
                }
                for (i, clip) in p.clips.iter().enumerate() {
                    if clip.crop_keyframes.is_empty() {
                        return Err(E::ClipMissingCropKeyframes(i));
                    }
                }
                if p.aspect_ratio.width == 0 || p.aspect_ratio.height == 0 {
                    return Err(E::InvalidAspectRatio);
                }
                Ok(())
            }
            ExportParams::AnnotateExtract(p) => {
                if p.regions.is_empty() {
                    return Err(E::EmptyRegions);
                }
                for (i, region) in p.regions.iter().enumerate() {
                    if region.end <= region.start {
                        return Err(E::RegionNotPositiveDuration(i));
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_crop_keyframes() {
        let params = ExportParams::Framing(FramingParams {
            source_ref: "blob://src".into(),
            crop_keyframes: vec![],
            segments: vec![],
            target_aspect_ratio: AspectRatio {
                width: 9,
                height: 16,
            },
            target_frame_rate: 30.0,
            audio_include: false,
        });
        assert_eq!(
            params.validate(),
            Err(ParamsValidationError::EmptyCropKeyframes)
        );
    }

    #[test]
    fn accepts_well_formed_framing_params() {
        let params = ExportParams::Framing(FramingParams {
            source_ref: "blob://src".into(),
            crop_keyframes: vec![CropKeyframe {
                source_time: 0.0,
                rect: Rect {
                    x: 0.0,
                    y: 0.0,
                    width: 100.0,
                    height: 100.0,
                },
            }],
            segments: vec![],
            target_aspect_ratio: AspectRatio {
                width: 9,
                height: 16,
            },
            target_frame_rate: 30.0,
            audio_include: false,
        });
        assert!(params.validate().is_ok());
    }

    #[test]
    fn rejects_multi_clip_with_no_clips() {
        let params = ExportParams::MultiClip(MultiClipParams {
            clips: vec![],
            aspect_ratio: AspectRatio {
                width: 16,
                height: 9,
            },
            transition: Transition {
                kind: TransitionKind::Cut,
                duration_seconds: 0.0,
            },
        });
        assert_eq!(params.validate(), Err(ParamsValidationError::EmptyClips));
    }
}
