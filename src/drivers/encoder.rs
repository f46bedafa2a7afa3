use async_trait::async_trait;

use crate::domain::AspectRatio;
use crate::error::DriverError;

/// Parameters for a single opaque encode pass. Codec selection, filter
/// graph construction, and bitrate/quality tuning are out of scope (§1);
/// an `Encoder` only needs to honor duration, frame rate, and aspect ratio.
pub struct EncodeRequest {
    pub duration_seconds: f64,
    pub frame_rate: f64,
    pub aspect_ratio: AspectRatio,
    pub include_audio: bool,
}

/// The opaque pipeline invoked by a driver to turn a request into encoded
/// bytes. Real implementations shell out to an encoder or a GPU subprocess;
/// this crate only needs the contract, per §1's scope boundary.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(
        &self,
        request: EncodeRequest,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<Vec<u8>, DriverError>;
}

/// Deterministic stand-in encoder used by the local backend and by tests.
/// Produces a small synthetic artifact that records the request's shape
/// rather than real pixels, and reports progress in coarse steps.
pub struct LocalEncoder;

#[async_trait]
impl Encoder for LocalEncoder {
    async fn encode(
        &self,
        request: EncodeRequest,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<Vec<u8>, DriverError> {
        for step in [25u8, 50, 75, 100] {
            tokio::task::yield_now().await;
            on_progress(step);
        }
        let header = format!(
            "synthetic-export duration={:.3} fps={} aspect={}:{} audio={}\n",
            request.duration_seconds,
            request.frame_rate,
            request.aspect_ratio.width,
            request.aspect_ratio.height,
            request.include_audio,
        );
        Ok(header.into_bytes())
    }
}
