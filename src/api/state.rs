use std::sync::Arc;
use std::time::Duration;

use crate::admission::AdmissionGate;
use crate::blob_store::BlobStore;
use crate::progress_hub::ProgressHub;
use crate::store::JobStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub hub: Arc<ProgressHub>,
    pub blob_store: Arc<dyn BlobStore>,
    pub admission: Arc<dyn AdmissionGate>,
    pub websocket_keepalive: Duration,
}
