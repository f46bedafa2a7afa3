mod job;
mod params;
mod progress;

pub use job::{ExportJob, JobFilter, JobKind, JobStatus};
pub use params::{
    AnnotateExtractParams, AspectRatio, ClipRegion, ClipSpec, CropKeyframe, ExportParams,
    FramingParams, MultiClipParams, OverlayKeyframe, OverlayKind, OverlayLayer,
    OverlayParams, ParamsValidationError, Rect, Segment, Transition, TransitionKind, TrimRange,
};
pub use progress::ProgressEvent;
