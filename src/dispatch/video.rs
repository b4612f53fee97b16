use std::fmt;
use std::time::Duration;

use reqwest::multipart::Form;
use reqwest::Method;

use crate::error::DispatchError;
use crate::model::VideoAnalysis;
use crate::session::{ApiClient, RequestBody};

use super::{into_detection, require_media, MediaFile};

/// Which of the two video analysis backends handles the upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoModule {
    One,
    Two,
}

impl VideoModule {
    pub fn id(self) -> u8 {
        match self {
            VideoModule::One => 1,
            VideoModule::Two => 2,
        }
    }

    fn detect_path(self) -> String {
        format!("/video-analysis/module{}/detect", self.id())
    }
}

impl TryFrom<u8> for VideoModule {
    type Error = DispatchError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VideoModule::One),
            2 => Ok(VideoModule::Two),
            other => Err(DispatchError::InvalidRequest(format!(
                "video module must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl fmt::Display for VideoModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module{}", self.id())
    }
}

#[derive(Debug, Clone)]
pub struct VideoRequest {
    module: VideoModule,
    video: MediaFile,
}

impl VideoRequest {
    pub fn new(module: VideoModule, video: MediaFile) -> Result<Self, DispatchError> {
        require_media(&video, "video")?;
        Ok(Self { module, video })
    }
}

/// Video analysis over the same-origin API, with a longer per-request timeout.
#[derive(Debug, Clone)]
pub struct VideoDispatcher {
    api: ApiClient,
    timeout: Duration,
}

impl VideoDispatcher {
    pub fn new(api: ApiClient, timeout: Duration) -> Self {
        Self { api, timeout }
    }

    pub async fn analyze(&self, request: VideoRequest) -> Result<VideoAnalysis, DispatchError> {
        let VideoRequest { module, video } = request;
        tracing::info!(
            %module,
            file = video.file_name(),
            bytes = video.len(),
            timeout_secs = self.timeout.as_secs(),
            "submitting video for analysis"
        );

        let form = Form::new().part("video", video.into_part()?);
        let value = self
            .api
            .request(
                Method::POST,
                &module.detect_path(),
                Some(RequestBody::Multipart(form)),
                Some(self.timeout),
            )
            .await
            .map_err(DispatchError::into_detection_failure)?;

        into_detection(value)
    }
}
