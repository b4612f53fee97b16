use crate::error::DispatchError;
use crate::model::{DetectionRecord, SystemStatus};
use crate::session::ApiClient;

use super::path_segment;

/// Plain JSON lookups that are not tied to one detection kind.
#[derive(Debug, Clone)]
pub struct SystemDispatcher {
    api: ApiClient,
}

impl SystemDispatcher {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn modules_status(&self) -> Result<SystemStatus, DispatchError> {
        self.api
            .get_json("/modules/status/")
            .await
            .map_err(DispatchError::into_detection_failure)
    }

    pub async fn detection_result(&self, detection_id: &str) -> Result<DetectionRecord, DispatchError> {
        let path = format!("/result/{}/", path_segment(detection_id)?);
        self.api
            .get_json(&path)
            .await
            .map_err(DispatchError::into_detection_failure)
    }
}
