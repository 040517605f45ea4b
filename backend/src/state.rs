use std::sync::Arc;
use std::time::Duration;

use crate::inference::InferenceClient;
use crate::intake::upload::IntakeConfig;
use crate::storage::detection_store::DetectionStore;

/// Shared by every worker; constructed once in `main`.
pub struct AppState {
    pub inference: Arc<dyn InferenceClient>,
    pub store: Arc<dyn DetectionStore>,
    pub intake: IntakeConfig,
    pub upstream_timeout: Duration,
}
