use reqwest::multipart::Form;

use crate::error::DispatchError;
use crate::fetch::ProxyFetch;
use crate::model::{AiImageDetection, AiImageDetectionRecord};
use crate::session::ApiClient;

use super::{path_segment, read_detection, require_media, MediaFile};

const DETECT_PATH: &str = "/ai-detect/detect";

#[derive(Debug, Clone)]
pub struct AiImageRequest {
    image: MediaFile,
}

impl AiImageRequest {
    pub fn new(image: MediaFile) -> Result<Self, DispatchError> {
        require_media(&image, "image")?;
        Ok(Self { image })
    }

    fn into_form(self) -> Result<Form, DispatchError> {
        Ok(Form::new().part("image", self.image.into_part()?))
    }
}

/// AI-generated image detection through the `/ai-detect` proxy.
#[derive(Debug, Clone)]
pub struct AiImageDispatcher {
    fetch: ProxyFetch,
    api: ApiClient,
}

impl AiImageDispatcher {
    pub fn new(fetch: ProxyFetch, api: ApiClient) -> Self {
        Self { fetch, api }
    }

    pub async fn analyze(&self, request: AiImageRequest) -> Result<AiImageDetection, DispatchError> {
        tracing::info!(
            file = request.image.file_name(),
            mime = request.image.mime(),
            bytes = request.image.len(),
            "submitting image for AI detection"
        );
        let response = self.fetch.post_form(DETECT_PATH, request.into_form()?).await?;
        read_detection(response).await
    }

    /// Fetches a stored detection from the same-origin API.
    pub async fn detection_result(
        &self,
        detection_id: &str,
    ) -> Result<AiImageDetectionRecord, DispatchError> {
        let path = format!("/ai-image/result/{}", path_segment(detection_id)?);
        let record: AiImageDetectionRecord = self
            .api
            .get_json(&path)
            .await
            .map_err(DispatchError::into_detection_failure)?;
        record.validate().map_err(DispatchError::Contract)?;
        Ok(record)
    }
}
