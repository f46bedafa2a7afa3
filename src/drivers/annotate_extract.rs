use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::blob_store::BlobStore;
use crate::domain::{AspectRatio, ExportParams};
use crate::error::DriverError;

use super::encoder::{EncodeRequest, Encoder};
use super::{CancelSignal, DriverOutput, PipelineDriver, ProgressCallback};

#[derive(Serialize)]
struct ManifestEntry {
    display_name: String,
    start: f64,
    end: f64,
    rating: Option<f64>,
    output_ref: String,
}

#[derive(Serialize)]
struct Manifest {
    source_ref: String,
    regions: Vec<ManifestEntry>,
}

/// Extracts a set of named regions from a source video as individually
/// downloadable clips, registered with the project layer via a manifest
/// (§4.3 "Annotate-extract driver (boundary case)"). The job's
/// `output_ref` is the manifest blob, not a single video.
pub struct AnnotateExtractDriver {
    blob_store: Arc<dyn BlobStore>,
    encoder: Arc<dyn Encoder>,
}

impl AnnotateExtractDriver {
    pub fn new(blob_store: Arc<dyn BlobStore>, encoder: Arc<dyn Encoder>) -> Self {
        Self { blob_store, encoder }
    }
}

#[async_trait]
impl PipelineDriver for AnnotateExtractDriver {
    async fn drive(
        &self,
        job: &crate::domain::ExportJob,
        progress_cb: ProgressCallback,
        cancel_signal: CancelSignal,
    ) -> Result<DriverOutput, DriverError> {
        let params = match &job.params {
            ExportParams::AnnotateExtract(p) => p,
            other => {
                return Err(DriverError::Failed(format!(
                    "annotate-extract driver invoked with {:?} params",
                    other.kind()
                )));
            }
        };

        self.blob_store
            .get(&params.source_ref)
            .await
            .map_err(DriverError::BlobStore)?;

        let region_count = params.regions.len();
        let mut entries = Vec::with_capacity(region_count);

        for (i, region) in params.regions.iter().enumerate() {
            if cancel_signal.is_requested().await {
                for entry in &entries {
                    let entry: &ManifestEntry = entry;
                    let _ = self.blob_store.delete(&entry.output_ref).await;
                }
                return Err(DriverError::Cancelled);
            }
            let phase = format!("extracting-{}/{}", i + 1, region_count);
            progress_cb(
                ((i as f64 / region_count as f64) * 95.0) as u8,
                &region.display_name,
                &phase,
            );

            let bytes = self
                .encoder
                .encode(
                    EncodeRequest {
                        duration_seconds: (region.end - region.start).max(0.0),
                        frame_rate: 30.0,
                        aspect_ratio: AspectRatio { width: 16, height: 9 },
                        include_audio: true,
                    },
                    &|_pct| {},
                )
                .await?;
            let output_ref = self.blob_store.put(bytes).await.map_err(DriverError::BlobStore)?;

            entries.push(ManifestEntry {
                display_name: region.display_name.clone(),
                start: region.start,
                end: region.end,
                rating: region.rating,
                output_ref,
            });
        }

        progress_cb(95, "writing manifest", "finalizing");
        let manifest = Manifest {
            source_ref: params.source_ref.clone(),
            regions: entries,
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| DriverError::Failed(format!("manifest serialization failed: {e}")))?;
        let output_ref = self
            .blob_store
            .put(manifest_bytes)
            .await
            .map_err(DriverError::BlobStore)?;
        progress_cb(100, "done", "finalizing");

        Ok(DriverOutput {
            output_ref,
            output_filename: format!("{}-regions-manifest.json", job.id),
        })
    }
}
